use std::{cell::RefCell, collections::BTreeMap, fmt, rc::Rc};

use crate::{
    error::FatalError,
    local_vars::LocalVariablesInfo,
    outcome::Outcome,
    pass::{
        data_flow::Pass3b, pass1::Pass1, pass2::Pass2, pass3a::Pass3a, PassVerifier,
    },
    registry::Registry,
};

/// The local variable information of each method, as found by Pass 2.
/// Methods without code have none.
pub(crate) type MethodLocalVariables = Vec<Option<Rc<LocalVariablesInfo>>>;

/// The passes over a single class.
/// Obtained through [`Registry::get`], which makes sure there is only one per class name.
pub struct Verifier {
    class_name: String,
    pass1: PassVerifier,
    pass2: PassVerifier,
    local_variables: RefCell<Option<MethodLocalVariables>>,
    pass3a: RefCell<BTreeMap<usize, Rc<PassVerifier>>>,
    pass3b: RefCell<BTreeMap<usize, Rc<PassVerifier>>>,
}
impl Verifier {
    pub(crate) fn new(class_name: &str) -> Verifier {
        Verifier {
            class_name: class_name.to_owned(),
            pass1: PassVerifier::new(),
            pass2: PassVerifier::new(),
            local_variables: RefCell::new(None),
            pass3a: RefCell::new(BTreeMap::new()),
            pass3b: RefCell::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn do_pass1(&self, registry: &Registry) -> Result<Outcome, FatalError> {
        let _guard = registry.enter(&self.class_name)?;
        self.pass1.verify(&Pass1 {
            registry,
            class_name: &self.class_name,
        })
    }

    pub fn do_pass2(&self, registry: &Registry) -> Result<Outcome, FatalError> {
        let _guard = registry.enter(&self.class_name)?;
        self.pass2.verify(&Pass2 {
            registry,
            verifier: self,
        })
    }

    pub fn do_pass3a(&self, registry: &Registry, method_index: usize) -> Result<Outcome, FatalError> {
        let _guard = registry.enter(&self.class_name)?;
        let state = Rc::clone(
            self.pass3a
                .borrow_mut()
                .entry(method_index)
                .or_insert_with(Default::default),
        );
        state.verify(&Pass3a {
            registry,
            verifier: self,
            method_index,
        })
    }

    pub fn do_pass3b(&self, registry: &Registry, method_index: usize) -> Result<Outcome, FatalError> {
        let _guard = registry.enter(&self.class_name)?;
        let state = Rc::clone(
            self.pass3b
                .borrow_mut()
                .entry(method_index)
                .or_insert_with(Default::default),
        );
        state.verify(&Pass3b {
            registry,
            verifier: self,
            method_index,
        })
    }

    /// Forget every outcome and message, so that the passes run again when next requested
    pub fn flush(&self) {
        self.pass1.flush();
        self.pass2.flush();
        self.local_variables.borrow_mut().take();
        self.pass3a.borrow_mut().clear();
        self.pass3b.borrow_mut().clear();
    }

    /// Every advisory message so far, prefixed with the pass (and method) it came from.
    pub fn messages(&self, registry: &Registry) -> Vec<String> {
        let mut messages = Vec::new();
        for message in self.pass1.messages() {
            messages.push(format!("Pass 1: {}", message));
        }
        for message in self.pass2.messages() {
            messages.push(format!("Pass 2: {}", message));
        }

        let class = registry.find_class(&self.class_name);
        let method_name = |index: usize| {
            class
                .as_ref()
                .and_then(|class| {
                    class
                        .get_method(index)
                        .and_then(|method| method.name(&class.const_pool))
                        .map(|name| name.into_owned())
                })
                .unwrap_or_else(|| "<<unknown method>>".to_owned())
        };

        for (pass, states) in [("3a", &self.pass3a), ("3b", &self.pass3b)] {
            for (index, state) in states.borrow().iter() {
                let name = method_name(*index);
                for message in state.messages() {
                    messages.push(format!(
                        "Pass {}, method {} ('{}'): {}",
                        pass, index, name, message
                    ));
                }
            }
        }

        messages
    }

    /// The local variable information Pass 2 collected for the method.
    /// `None` if Pass 2 did not pass or the method has no code.
    pub fn local_variables_info(
        &self,
        registry: &Registry,
        method_index: usize,
    ) -> Result<Option<Rc<LocalVariablesInfo>>, FatalError> {
        if !self.do_pass2(registry)?.is_ok() {
            return Ok(None);
        }

        let local_variables = self.local_variables.borrow();
        let local_variables = local_variables.as_ref().ok_or_else(|| {
            FatalError::AssertionViolated(format!(
                "Pass 2 of '{}' passed without recording local variable information.",
                self.class_name
            ))
        })?;
        local_variables
            .get(method_index)
            .cloned()
            .ok_or_else(|| FatalError::InvalidMethod {
                class_name: self.class_name.clone(),
                index: method_index,
            })
    }

    pub(crate) fn set_local_variables(&self, local_variables: MethodLocalVariables) {
        *self.local_variables.borrow_mut() = Some(local_variables);
    }
}
impl fmt::Debug for Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Verifier")
            .field("class_name", &self.class_name)
            .field("pass1", &self.pass1.cached())
            .field("pass2", &self.pass2.cached())
            .field("pass3a", &self.pass3a.borrow().keys().collect::<Vec<_>>())
            .field("pass3b", &self.pass3b.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}
