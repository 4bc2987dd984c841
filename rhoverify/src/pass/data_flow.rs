//! Pass 3b: data-flow verification of a method's code.
//! The analysis itself is not part of this crate. An embedding supplies it as a
//! [`DataFlowVerifier`] through [`Registry::set_data_flow_verifier`].

use rhoverify_base::{
    code::{parse_code, CodeInfo},
    ClassFile,
};
use tracing::{span, Level};

use crate::{
    error::FatalError,
    local_vars::LocalVariablesInfo,
    outcome::{Outcome, Status},
    registry::Registry,
    verifier::Verifier,
};

use super::{pass3a::bad_bytecode, Pass, PassVerifier};

/// Everything the earlier passes established about a method
pub struct DataFlowContext<'a> {
    pub registry: &'a Registry,
    pub class: &'a ClassFile,
    pub method_index: usize,
    pub code: &'a CodeInfo,
    pub local_variables: &'a LocalVariablesInfo,
    /// For advisory messages, which are reported as part of Pass 3b
    pub state: &'a PassVerifier,
}

pub trait DataFlowVerifier {
    /// Only called once Pass 3a has passed for the method
    fn verify(&self, ctx: &DataFlowContext<'_>) -> Result<Outcome, FatalError>;
}

/// Reported when there is nothing to delegate to
pub const NO_DATA_FLOW_VERIFIER: &str = "No data-flow verifier is attached, so Pass 3b can not run.";

pub(crate) struct Pass3b<'a> {
    pub registry: &'a Registry,
    pub verifier: &'a Verifier,
    pub method_index: usize,
}
impl<'a> Pass for Pass3b<'a> {
    fn do_verify(&self, state: &PassVerifier) -> Result<Outcome, FatalError> {
        let class_name = self.verifier.class_name();
        let span = span!(Level::TRACE, "pass3b", class = class_name, method = self.method_index);
        let _enter = span.enter();

        if !self.verifier.do_pass2(self.registry)?.is_ok() {
            return Ok(Outcome::not_yet());
        }

        let class = self
            .registry
            .find_class(class_name)
            .ok_or_else(|| FatalError::MissingClass(class_name.to_owned()))?;
        let method = class
            .get_method(self.method_index)
            .ok_or_else(|| FatalError::InvalidMethod {
                class_name: class_name.to_owned(),
                index: self.method_index,
            })?;

        let code = match method.code() {
            Some(code) => code,
            // Abstract and native methods have nothing to check
            None => return Ok(Outcome::ok()),
        };

        let code = match parse_code(code) {
            Ok(code) => code,
            Err(err) => {
                let name = method.name(&class.const_pool).unwrap_or_default();
                return Ok(bad_bytecode(&name, &err));
            }
        };

        if !self
            .verifier
            .do_pass3a(self.registry, self.method_index)?
            .is_ok()
        {
            return Ok(Outcome::not_yet());
        }

        let data_flow = match self.registry.data_flow_verifier() {
            Some(data_flow) => data_flow,
            None => {
                tracing::debug!("{}", NO_DATA_FLOW_VERIFIER);
                return Ok(Outcome::new(Status::NotYet, NO_DATA_FLOW_VERIFIER));
            }
        };

        let local_variables = self
            .verifier
            .local_variables_info(self.registry, self.method_index)?
            .ok_or_else(|| {
                FatalError::AssertionViolated(format!(
                    "Method {} of '{}' has code but Pass 2 recorded no local variable information.",
                    self.method_index, class_name
                ))
            })?;

        data_flow.verify(&DataFlowContext {
            registry: self.registry,
            class: &class,
            method_index: self.method_index,
            code: &code,
            local_variables: &local_variables,
            state,
        })
    }
}
