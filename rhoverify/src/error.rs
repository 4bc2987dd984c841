use std::fmt;

/// A fault that means no verdict can be given.
/// These are never cached and never turned into an [`Outcome`](crate::Outcome).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatalError {
    /// Data contradicted something that an earlier pass guaranteed
    AssertionViolated(String),
    /// A class that was found by an earlier pass could no longer be found
    MissingClass(String),
    /// A method index that does not exist in the class
    InvalidMethod { class_name: String, index: usize },
    /// A construct that verification does not handle
    Unsupported(String),
    /// Too many pass requests were nested
    RecursionLimit { class_name: String, limit: usize },
}
impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalError::AssertionViolated(msg) => write!(f, "assertion violated: {}", msg),
            FatalError::MissingClass(name) => write!(
                f,
                "class '{}' could not be found although it was found before",
                name
            ),
            FatalError::InvalidMethod { class_name, index } => write!(
                f,
                "class '{}' has no method with index {}",
                class_name, index
            ),
            FatalError::Unsupported(msg) => write!(f, "unsupported: {}", msg),
            FatalError::RecursionLimit { class_name, limit } => write!(
                f,
                "verifying '{}' would nest more than {} pass requests",
                class_name, limit
            ),
        }
    }
}
impl std::error::Error for FatalError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    /// The class file structure or constant pool
    Class,
    /// The code array as a whole
    StaticCodeInstruction,
    /// The operands of a single instruction
    StaticCodeInstructionOperand,
}

/// A rule that the class breaks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintViolation {
    pub kind: ConstraintKind,
    pub message: String,
}
impl ConstraintViolation {
    #[must_use]
    pub fn class(message: impl Into<String>) -> ConstraintViolation {
        ConstraintViolation {
            kind: ConstraintKind::Class,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn instruction(message: impl Into<String>) -> ConstraintViolation {
        ConstraintViolation {
            kind: ConstraintKind::StaticCodeInstruction,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn operand(message: impl Into<String>) -> ConstraintViolation {
        ConstraintViolation {
            kind: ConstraintKind::StaticCodeInstructionOperand,
            message: message.into(),
        }
    }
}
impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Two declarations of a local variable disagree at some offset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVariableInfoInconsistent(pub String);
impl fmt::Display for LocalVariableInfoInconsistent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The error of the individual checks inside a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CheckError {
    Violation(ConstraintViolation),
    Fatal(FatalError),
}
impl From<ConstraintViolation> for CheckError {
    fn from(err: ConstraintViolation) -> Self {
        Self::Violation(err)
    }
}
impl From<FatalError> for CheckError {
    fn from(err: FatalError) -> Self {
        Self::Fatal(err)
    }
}

pub(crate) type CheckResult<T = ()> = Result<T, CheckError>;

/// Shorthand for rejecting with a class constraint violation
pub(crate) fn class_violation<T>(message: impl Into<String>) -> CheckResult<T> {
    Err(ConstraintViolation::class(message).into())
}
