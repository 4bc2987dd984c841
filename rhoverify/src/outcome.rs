use std::fmt;

/// Message of every [`Outcome::ok`]
pub const OK_MESSAGE: &str = "Passed verification.";
/// Message of every [`Outcome::not_yet`]
pub const NOT_YET_MESSAGE: &str = "Not yet verified.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// A pass that this one depends on has not passed
    NotYet,
    Ok,
    Rejected,
}

/// The verdict of a pass
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Outcome {
    status: Status,
    message: String,
}
impl Outcome {
    #[must_use]
    pub fn new(status: Status, message: impl Into<String>) -> Outcome {
        Outcome {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn ok() -> Outcome {
        Outcome::new(Status::Ok, OK_MESSAGE)
    }

    #[must_use]
    pub fn not_yet() -> Outcome {
        Outcome::new(Status::NotYet, NOT_YET_MESSAGE)
    }

    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Outcome {
        Outcome::new(Status::Rejected, message)
    }

    #[must_use]
    pub fn status(&self) -> Status {
        self.status
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.status == Status::Rejected
    }

    #[must_use]
    pub fn is_not_yet(&self) -> bool {
        self.status == Status::NotYet
    }
}
impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status {
            Status::NotYet => "VERIFIED_NOTYET",
            Status::Ok => "VERIFIED_OK",
            Status::Rejected => "VERIFIED_REJECTED",
        };
        write!(f, "{}: {}", status, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_value() {
        assert_eq!(Outcome::ok(), Outcome::ok());
        assert_eq!(Outcome::rejected("bad"), Outcome::rejected("bad"));
        assert_ne!(Outcome::rejected("bad"), Outcome::rejected("worse"));
        assert_ne!(Outcome::not_yet(), Outcome::new(Status::Ok, NOT_YET_MESSAGE));
    }

    #[test]
    fn display() {
        assert_eq!(
            Outcome::ok().to_string(),
            "VERIFIED_OK: Passed verification."
        );
        assert_eq!(
            Outcome::rejected("Wrong name.").to_string(),
            "VERIFIED_REJECTED: Wrong name."
        );
        assert!(Outcome::not_yet().is_not_yet());
    }
}
