#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
// Too error prone
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_lines)]
// Annoying. Really shouldn't highlight the entire thing.
#![allow(clippy::unnecessary_wraps)]

//! Static verification of class files.
//!
//! A [`Registry`] hands out one [`Verifier`](verifier::Verifier) per class name. Each verifier
//! runs its passes lazily and in order, caching the [`Outcome`] of each:
//! * Pass 1: the class can be found and has a sane header
//! * Pass 2: the constant pool, members, attributes and the superclass chain are well-formed
//! * Pass 3a: a method's code array decodes and every instruction's operands are legal
//! * Pass 3b: data-flow verification of a method, delegated to a [`DataFlowVerifier`]
//!
//! Passes may ask the registry for other classes, which registers them and notifies any
//! attached [`RegistryObserver`]s.

pub mod error;
pub mod formatter;
pub mod local_vars;
pub mod outcome;
pub mod pass;
pub mod registry;
mod resolve;
pub mod verifier;

pub use error::{ConstraintKind, ConstraintViolation, FatalError};
pub use outcome::{Outcome, Status};
pub use pass::data_flow::{DataFlowContext, DataFlowVerifier};
pub use registry::{Registry, RegistryObserver, VerifierHandle};

/// The name of the root of the class hierarchy
pub const OBJECT_CLASS: &str = "java/lang/Object";
/// The name of the root of the exception hierarchy
pub const THROWABLE_CLASS: &str = "java/lang/Throwable";

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// How many pass requests may be nested inside each other before giving up.
    /// Verifying one class can trigger verification of its ancestors and the classes it
    /// refers to, and a pathological class graph can make that arbitrarily deep.
    pub max_depth: usize,
    /// The highest class file major version that Pass 1 accepts
    pub max_major_version: u16,
    /// The class that only the root of the hierarchy may lack a superclass for
    pub object_class: String,
    /// Every exception class must descend from this
    pub throwable_class: String,
    /// Whether to log each class as it is registered
    /// Uses `tracing::info!`, rather than `tracing::trace!`
    pub log_registration: bool,
}
impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_depth: 256,
            // Java 17
            max_major_version: 61,
            object_class: OBJECT_CLASS.to_owned(),
            throwable_class: THROWABLE_CLASS.to_owned(),
            log_registration: false,
        }
    }
}
