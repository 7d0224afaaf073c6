use core::fmt;

use crate::error::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub const fn is_read(&self) -> bool {
        !matches!(*self, Self::Write)
    }

    pub const fn is_write(&self) -> bool {
        !matches!(*self, Self::Read)
    }

    const fn marker(&self) -> char {
        match self {
            Self::Read => '=',
            Self::Write => '!',
            Self::ReadWrite => '&',
        }
    }

    const fn from_marker(c: char) -> Option<Self> {
        match c {
            '=' => Some(Self::Read),
            '!' => Some(Self::Write),
            '&' => Some(Self::ReadWrite),
            _ => None,
        }
    }
}

/// A fixed machine register not encoded in any instruction byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ImplicitReg {
    /// al/ax/eax/rax depending on operand size.
    Accumulator,
    /// cl/cx/ecx/rcx.
    Count,
    /// dl/dx/edx/rdx.
    Data,
}

impl ImplicitReg {
    pub fn name(&self, bits: u32) -> &'static str {
        match (self, bits) {
            (Self::Accumulator, 8) => "al",
            (Self::Accumulator, 16) => "ax",
            (Self::Accumulator, 32) => "eax",
            (Self::Accumulator, 64) => "rax",
            (Self::Count, 8) => "cl",
            (Self::Count, 16) => "cx",
            (Self::Count, 32) => "ecx",
            (Self::Count, 64) => "rcx",
            (Self::Data, 8) => "dl",
            (Self::Data, 16) => "dx",
            (Self::Data, 32) => "edx",
            (Self::Data, 64) => "rdx",
            _ => "invalid",
        }
    }
}

/// How an operand value is recovered from the encoded instruction.
///
/// Decoded once from a single-letter code; everything downstream
/// dispatches on the enum and never re-inspects the source text.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EncodingKind {
    /// `I`, immediate value.
    Immediate,
    /// `i`, second immediate (e.g. `enter`).
    SecondImmediate,
    /// `J`, relative jump/call target.
    CodeOffset,
    /// `O`, direct memory offset without a ModRM byte.
    AbsoluteAddress,
    /// `G`, general register selected by ModRM.reg.
    ModrmReg,
    /// `E`, general register or memory selected by ModRM.rm.
    ModrmRm,
    /// `R`, general register selected by ModRM.rm with mod=3.
    RegisterOnly,
    /// `M`, memory selected by ModRM.rm with mod!=3.
    MemoryOnly,
    /// `r`, register in the low three bits of the last opcode byte.
    RegisterInOpcode,
    /// `V`, vector register selected by ModRM.reg.
    VecReg,
    /// `W`, vector register or memory selected by ModRM.rm.
    VecRm,
    /// `U`, vector register selected by ModRM.rm with mod=3.
    VecRegisterOnly,
    /// `H`, vector register in VEX.vvvv.
    VexVvvv,
    /// `a`/`c`/`d`, fixed register not encoded in any byte.
    Implicit(ImplicitReg),
}

impl EncodingKind {
    pub fn from_letter(c: char) -> Option<Self> {
        match c {
            'I' => Some(Self::Immediate),
            'i' => Some(Self::SecondImmediate),
            'J' => Some(Self::CodeOffset),
            'O' => Some(Self::AbsoluteAddress),
            'G' => Some(Self::ModrmReg),
            'E' => Some(Self::ModrmRm),
            'R' => Some(Self::RegisterOnly),
            'M' => Some(Self::MemoryOnly),
            'r' => Some(Self::RegisterInOpcode),
            'V' => Some(Self::VecReg),
            'W' => Some(Self::VecRm),
            'U' => Some(Self::VecRegisterOnly),
            'H' => Some(Self::VexVvvv),
            'a' => Some(Self::Implicit(ImplicitReg::Accumulator)),
            'c' => Some(Self::Implicit(ImplicitReg::Count)),
            'd' => Some(Self::Implicit(ImplicitReg::Data)),
            _ => None,
        }
    }

    pub const fn letter(&self) -> char {
        match self {
            Self::Immediate => 'I',
            Self::SecondImmediate => 'i',
            Self::CodeOffset => 'J',
            Self::AbsoluteAddress => 'O',
            Self::ModrmReg => 'G',
            Self::ModrmRm => 'E',
            Self::RegisterOnly => 'R',
            Self::MemoryOnly => 'M',
            Self::RegisterInOpcode => 'r',
            Self::VecReg => 'V',
            Self::VecRm => 'W',
            Self::VecRegisterOnly => 'U',
            Self::VexVvvv => 'H',
            Self::Implicit(ImplicitReg::Accumulator) => 'a',
            Self::Implicit(ImplicitReg::Count) => 'c',
            Self::Implicit(ImplicitReg::Data) => 'd',
        }
    }

    /// Immediate-family operands are read-only by definition.
    pub const fn is_immediate_family(&self) -> bool {
        matches!(self, Self::Immediate | Self::SecondImmediate | Self::CodeOffset)
    }
}

/// One operand slot of an instruction definition.
///
/// Immutable after parsing; splitters build modified copies via the
/// `with_*` methods.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operand {
    kind: EncodingKind,
    size: String,
    access: Access,
}

impl Operand {
    /// Parses a single operand token.
    ///
    /// The token is an optional access marker (`=` read, `&` read-write,
    /// `!` write), a kind letter and a free-form size tag. A missing
    /// marker falls back to `default_access`, except for immediates
    /// which are always read-only.
    pub fn parse(token: &str, default_access: Access) -> Result<Self, Error> {
        let mut chars = token.chars();
        let mut first = chars
            .next()
            .ok_or_else(|| Error::operand("empty operand token"))?;

        let marker = Access::from_marker(first);
        if marker.is_some() {
            first = chars
                .next()
                .ok_or_else(|| Error::operand(format!("missing operand in \"{token}\"")))?;
        }

        let kind = EncodingKind::from_letter(first)
            .ok_or_else(|| Error::operand(format!("unknown operand code '{first}'")))?;

        let access = if kind.is_immediate_family() {
            match marker {
                None | Some(Access::Read) => Access::Read,
                Some(_) => {
                    return Err(Error::operand(format!(
                        "immediate operand \"{token}\" cannot be written"
                    )));
                }
            }
        } else {
            marker.unwrap_or(default_access)
        };

        Ok(Self {
            kind,
            size: chars.collect(),
            access,
        })
    }

    pub fn kind(&self) -> EncodingKind {
        self.kind
    }

    pub fn size(&self) -> &str {
        &self.size
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn is_implicit(&self) -> bool {
        matches!(self.kind, EncodingKind::Implicit(_))
    }

    pub fn uses_modrm_reg(&self) -> bool {
        matches!(self.kind, EncodingKind::ModrmReg | EncodingKind::VecReg)
    }

    pub fn uses_modrm_rm(&self) -> bool {
        matches!(
            self.kind,
            EncodingKind::ModrmRm
                | EncodingKind::RegisterOnly
                | EncodingKind::MemoryOnly
                | EncodingKind::VecRm
                | EncodingKind::VecRegisterOnly
        )
    }

    /// True when the ModRM.rm side of this operand may name memory.
    pub fn is_memory_capable(&self) -> bool {
        matches!(
            self.kind,
            EncodingKind::ModrmRm | EncodingKind::MemoryOnly | EncodingKind::VecRm
        )
    }

    pub fn with_kind(&self, kind: EncodingKind) -> Self {
        Self {
            kind,
            size: self.size.clone(),
            access: self.access,
        }
    }

    pub fn with_size<S: Into<String>>(&self, size: S) -> Self {
        Self {
            kind: self.kind,
            size: size.into(),
            access: self.access,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(
            fmt,
            "{}{}{}",
            self.access.marker(),
            self.kind.letter(),
            self.size
        )
    }
}
