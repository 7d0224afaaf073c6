use core::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// An operand token with an unknown letter code or marker.
    MalformedOperand(String),
    /// A definition line that cannot be turned into an instruction.
    MalformedInstruction(String),
    /// A splitter applied to an instruction of the wrong shape.
    UnsupportedSplit(String),
}

impl Error {
    pub fn operand<S: Into<String>>(msg: S) -> Self {
        Self::MalformedOperand(msg.into())
    }

    pub fn instruction<S: Into<String>>(msg: S) -> Self {
        Self::MalformedInstruction(msg.into())
    }

    pub fn split<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedSplit(msg.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MalformedOperand(msg) => write!(fmt, "malformed operand: {msg}"),
            Self::MalformedInstruction(msg) => write!(fmt, "malformed instruction: {msg}"),
            Self::UnsupportedSplit(msg) => write!(fmt, "unsupported split: {msg}"),
        }
    }
}

impl std::error::Error for Error {}
