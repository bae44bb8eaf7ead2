use std::fmt;

/// How the native autograd system writes into a variable's gradient buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GradReq {
    /// No gradient is computed for the variable
    Null,
    /// Each backward pass overwrites the gradient
    #[default]
    Write,
    /// Each backward pass accumulates into the gradient
    Add,
}

impl GradReq {
    /// Native request code (`kNullOp`, `kWriteTo`, `kAddTo`).
    pub fn code(&self) -> u32 {
        match self {
            GradReq::Null => 0,
            GradReq::Write => 1,
            GradReq::Add => 3,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(GradReq::Null),
            // write-inplace behaves as write for a fresh buffer
            1 | 2 => Some(GradReq::Write),
            3 => Some(GradReq::Add),
            _ => None,
        }
    }
}

impl fmt::Display for GradReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GradReq::Null => write!(f, "null"),
            GradReq::Write => write!(f, "write"),
            GradReq::Add => write!(f, "add"),
        }
    }
}
