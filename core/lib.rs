pub mod error;
pub mod insn;
pub mod operand;
pub mod prefix;

use core::fmt;

/// Target processor mode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Bitness {
    B32,
    B64,
}

impl Bitness {
    pub const fn bits(&self) -> u32 {
        match self {
            Self::B32 => 32,
            Self::B64 => 64,
        }
    }
}

impl fmt::Display for Bitness {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "{}", self.bits())
    }
}
