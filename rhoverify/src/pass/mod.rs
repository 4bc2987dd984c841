use std::cell::RefCell;

use crate::{
    error::{CheckError, CheckResult, FatalError},
    outcome::Outcome,
};

pub mod data_flow;
pub(crate) mod pass1;
pub(crate) mod pass2;
pub(crate) mod pass3a;

/// The checks of a single pass
pub trait Pass {
    /// Run the checks. Advisory messages are added to `state`.
    fn do_verify(&self, state: &PassVerifier) -> Result<Outcome, FatalError>;
}

/// The cached state of one pass over a class, or over one method of a class.
#[derive(Debug, Default)]
pub struct PassVerifier {
    outcome: RefCell<Option<Outcome>>,
    messages: RefCell<Vec<String>>,
}
impl PassVerifier {
    #[must_use]
    pub fn new() -> PassVerifier {
        PassVerifier::default()
    }

    /// Get the outcome of the pass, running it if it has not been run since the last flush.
    /// Fatal errors are not cached, so a later call runs the pass again.
    pub fn verify(&self, pass: &impl Pass) -> Result<Outcome, FatalError> {
        if let Some(outcome) = self.outcome.borrow().as_ref() {
            return Ok(outcome.clone());
        }

        let outcome = pass.do_verify(self)?;
        // A nested request could have stored an outcome while we were running, in which case
        // that one stays.
        Ok(self.outcome.borrow_mut().get_or_insert(outcome).clone())
    }

    /// The cached outcome, without running anything
    #[must_use]
    pub fn cached(&self) -> Option<Outcome> {
        self.outcome.borrow().clone()
    }

    pub fn add_message(&self, message: impl Into<String>) {
        self.messages.borrow_mut().push(message.into());
    }

    /// Advisory messages, in the order they were added
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages.borrow().clone()
    }

    /// Forget the outcome and messages
    pub fn flush(&self) {
        self.outcome.borrow_mut().take();
        self.messages.borrow_mut().clear();
    }
}

/// Turn the result of a pass's checks into its outcome
pub(crate) fn conclude(result: CheckResult) -> Result<Outcome, FatalError> {
    match result {
        Ok(()) => Ok(Outcome::ok()),
        Err(CheckError::Violation(violation)) => {
            tracing::info!(kind = ?violation.kind, "Rejected: {}", violation.message);
            Ok(Outcome::rejected(violation.message))
        }
        Err(CheckError::Fatal(err)) => {
            tracing::error!("Verification could not complete: {}", err);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct Counting<'a> {
        runs: &'a Cell<usize>,
        fail: bool,
    }
    impl<'a> Pass for Counting<'a> {
        fn do_verify(&self, state: &PassVerifier) -> Result<Outcome, FatalError> {
            self.runs.set(self.runs.get() + 1);
            state.add_message("looked");
            if self.fail {
                return Err(FatalError::Unsupported("nope".to_owned()));
            }
            Ok(Outcome::rejected("bad"))
        }
    }

    #[test]
    fn runs_once_until_flushed() {
        let runs = Cell::new(0);
        let pass = Counting {
            runs: &runs,
            fail: false,
        };
        let state = PassVerifier::new();

        let first = state.verify(&pass).unwrap();
        let second = state.verify(&pass).unwrap();
        assert_eq!(first, second);
        assert_eq!(runs.get(), 1);
        assert_eq!(state.messages(), vec!["looked".to_owned()]);

        state.flush();
        assert!(state.cached().is_none());
        assert!(state.messages().is_empty());
        state.verify(&pass).unwrap();
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn fatal_errors_are_not_cached() {
        let runs = Cell::new(0);
        let pass = Counting {
            runs: &runs,
            fail: true,
        };
        let state = PassVerifier::new();
        assert!(state.verify(&pass).is_err());
        assert!(state.cached().is_none());
        assert!(state.verify(&pass).is_err());
        assert_eq!(runs.get(), 2);
    }
}
