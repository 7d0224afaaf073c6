use core::fmt;

use crate::{
    error::Error,
    operand::{Access, EncodingKind, Operand},
    prefix,
};

/// One token of the opcode section.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OpcodeToken {
    /// A literal opcode byte, e.g. `0x90`.
    Byte(u8),
    /// An opcode extension digit in ModRM.reg, e.g. `/0`.
    OpcodeExt(u8),
}

impl fmt::Display for OpcodeToken {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Byte(byte) => write!(fmt, "0x{byte:02x}"),
            Self::OpcodeExt(digit) => write!(fmt, "/{digit}"),
        }
    }
}

/// Which REX bits are semantically consumed by an instruction.
///
/// A bit that "matters" is constrained in the emitted grammar; a bit
/// that does not is left free and flagged as spurious so the consumer
/// can account for it the way a real CPU would (by ignoring it).
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct RexSpec {
    pub r_matters: bool,
    pub x_matters: bool,
    pub b_matters: bool,
    pub w_matters: bool,
    pub w_set: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VexKind {
    Vex,
    Xop,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VexL {
    L128,
    L256,
    /// Generic over vector width, resolved by the L splitter.
    Lx,
    /// Ignored by the instruction.
    Lig,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VexPp {
    None,
    P66,
    Pf3,
    Pf2,
}

impl VexPp {
    pub const fn bits(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::P66 => 1,
            Self::Pf3 => 2,
            Self::Pf2 => 3,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VexMap {
    M0f,
    M0f38,
    M0f3a,
    M8,
    M9,
    M10,
}

impl VexMap {
    pub const fn bits(&self) -> u8 {
        match self {
            Self::M0f => 1,
            Self::M0f38 => 2,
            Self::M0f3a => 3,
            Self::M8 => 8,
            Self::M9 => 9,
            Self::M10 => 10,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VexW {
    W0,
    W1,
    Wig,
}

/// A VEX/XOP prefix encoding parsed from an opcode-section token of
/// the form `vex.<l>.<pp>.<map>.<w>` (e.g. `vex.128.66.0f38.w0`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VexSpec {
    pub kind: VexKind,
    pub l: VexL,
    pub pp: VexPp,
    pub map: VexMap,
    pub w: VexW,
}

impl VexSpec {
    pub fn parse(token: &str) -> Result<Self, Error> {
        let err = || Error::instruction(format!("invalid vex token \"{token}\""));
        let mut parts = token.split('.');
        let kind = match parts.next() {
            Some("vex") => VexKind::Vex,
            Some("xop") => VexKind::Xop,
            _ => return Err(err()),
        };
        let l = match parts.next() {
            Some("128") => VexL::L128,
            Some("256") => VexL::L256,
            Some("lx") => VexL::Lx,
            Some("lig") => VexL::Lig,
            _ => return Err(err()),
        };
        let pp = match parts.next() {
            Some("none") => VexPp::None,
            Some("66") => VexPp::P66,
            Some("f3") => VexPp::Pf3,
            Some("f2") => VexPp::Pf2,
            _ => return Err(err()),
        };
        let map = match (kind, parts.next()) {
            (VexKind::Vex, Some("0f")) => VexMap::M0f,
            (VexKind::Vex, Some("0f38")) => VexMap::M0f38,
            (VexKind::Vex, Some("0f3a")) => VexMap::M0f3a,
            (VexKind::Xop, Some("m8")) => VexMap::M8,
            (VexKind::Xop, Some("m9")) => VexMap::M9,
            (VexKind::Xop, Some("m10")) => VexMap::M10,
            _ => return Err(err()),
        };
        let w = match parts.next() {
            Some("w0") => VexW::W0,
            Some("w1") => VexW::W1,
            Some("wig") => VexW::Wig,
            _ => return Err(err()),
        };
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(Self { kind, l, pp, map, w })
    }

    pub fn with_l(&self, l: VexL) -> Self {
        Self { l, ..*self }
    }
}

impl fmt::Display for VexSpec {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            VexKind::Vex => "vex",
            VexKind::Xop => "xop",
        };
        let l = match self.l {
            VexL::L128 => "128",
            VexL::L256 => "256",
            VexL::Lx => "lx",
            VexL::Lig => "lig",
        };
        let pp = match self.pp {
            VexPp::None => "none",
            VexPp::P66 => "66",
            VexPp::Pf3 => "f3",
            VexPp::Pf2 => "f2",
        };
        let map = match self.map {
            VexMap::M0f => "0f",
            VexMap::M0f38 => "0f38",
            VexMap::M0f3a => "0f3a",
            VexMap::M8 => "m8",
            VexMap::M9 => "m9",
            VexMap::M10 => "m10",
        };
        let w = match self.w {
            VexW::W0 => "w0",
            VexW::W1 => "w1",
            VexW::Wig => "wig",
        };
        write!(fmt, "{kind}.{l}.{pp}.{map}.{w}")
    }
}

/// A qualifier tag from the trailing section of a definition line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tag {
    /// Lock prefix allowed.
    Lock,
    /// 0xf3 repeat prefix required.
    Rep,
    /// 0xf2 repeat prefix required.
    Repnz,
    /// REX must not be emitted.
    NoRex,
    /// REX.W must be set.
    RexW,
    /// 64-bit mode only.
    Amd64,
    /// 32-bit mode only.
    Ia32,
    /// Mnemonic needs an AT&T size suffix; `None` until a splitter
    /// resolves the operand size.
    AttSuffix(Option<char>),
    /// Never allowed in sandboxed code.
    SandboxForbidden,
    /// Required CPU feature.
    CpuFeature(String),
}

impl Tag {
    pub fn parse(token: &str) -> Result<Self, Error> {
        let tag = match token {
            "lock" => Self::Lock,
            "rep" => Self::Rep,
            "repnz" => Self::Repnz,
            "norex" => Self::NoRex,
            "rexw" => Self::RexW,
            "amd64" => Self::Amd64,
            "ia32" => Self::Ia32,
            "att-suffix" => Self::AttSuffix(None),
            "sandbox-forbidden" => Self::SandboxForbidden,
            _ => {
                if let Some(suffix) = token.strip_prefix("att-suffix-") {
                    let mut chars = suffix.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c @ ('b' | 'w' | 'l' | 'q')), None) => Self::AttSuffix(Some(c)),
                        _ => return Err(Error::instruction(format!("unknown tag \"{token}\""))),
                    }
                } else if let Some(feature) = token.strip_prefix("cpu_") {
                    Self::CpuFeature(feature.to_owned())
                } else {
                    return Err(Error::instruction(format!("unknown tag \"{token}\"")));
                }
            }
        };
        Ok(tag)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Lock => fmt.write_str("lock"),
            Self::Rep => fmt.write_str("rep"),
            Self::Repnz => fmt.write_str("repnz"),
            Self::NoRex => fmt.write_str("norex"),
            Self::RexW => fmt.write_str("rexw"),
            Self::Amd64 => fmt.write_str("amd64"),
            Self::Ia32 => fmt.write_str("ia32"),
            Self::AttSuffix(None) => fmt.write_str("att-suffix"),
            Self::AttSuffix(Some(c)) => write!(fmt, "att-suffix-{c}"),
            Self::SandboxForbidden => fmt.write_str("sandbox-forbidden"),
            Self::CpuFeature(feature) => write!(fmt, "cpu_{feature}"),
        }
    }
}

/// Positional default access per operand-count shape.
///
/// Definition lines are written in source..destination order, so the
/// last operand of a shape defaults to read-write and everything
/// before it to read-only. Kept as an explicit table so new shapes
/// are added here and unit-tested, not inferred in the parser.
const DEFAULT_ACCESS: &[&[Access]] = &[
    &[],
    &[Access::ReadWrite],
    &[Access::Read, Access::ReadWrite],
    &[Access::Read, Access::Read, Access::ReadWrite],
    &[Access::Read, Access::Read, Access::Read, Access::ReadWrite],
];

pub fn default_access(count: usize, index: usize) -> Result<Access, Error> {
    DEFAULT_ACCESS
        .get(count)
        .and_then(|row| row.get(index))
        .copied()
        .ok_or_else(|| Error::instruction(format!("no default access for {count} operands")))
}

/// One (possibly still generic) instruction encoding definition.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Instruction {
    name: String,
    display_format: Option<String>,
    operands: Vec<Operand>,
    opcodes: Vec<OpcodeToken>,
    required_prefixes: Vec<u8>,
    vex: Option<VexSpec>,
    tags: Vec<Tag>,
    rex: RexSpec,
}

impl Instruction {
    /// Parses a full definition line, the inverse of `Display`.
    ///
    /// Grammar: `["fmt" ] name operand*, opcode-token+, tag*` with
    /// comma-separated sections; the opcode section accepts a leading
    /// VEX/XOP token, hex bytes and a final `/digit` extension.
    pub fn parse(line: &str) -> Result<Self, Error> {
        let mut sections = line.splitn(3, ',');
        let head = sections.next().unwrap_or("");
        let opcodes = sections
            .next()
            .ok_or_else(|| Error::instruction("missing opcode section"))?;
        let tags = sections.next().unwrap_or("");

        let mut insn = Self::parse_name_and_operands(head)?;
        insn.parse_opcodes(opcodes)?;
        insn.parse_tags(tags)?;
        insn.derive_rex();
        Ok(insn)
    }

    /// Parses just the `name operand*` section; opcodes and tags stay
    /// empty. Exposed because operand-shape handling is worth testing
    /// in isolation.
    pub fn parse_name_and_operands(text: &str) -> Result<Self, Error> {
        let mut text = text.trim();

        let mut display_format = None;
        if let Some(rest) = text.strip_prefix('"') {
            let end = rest
                .find('"')
                .ok_or_else(|| Error::instruction("unterminated format string"))?;
            display_format = Some(rest[..end].to_owned());
            text = rest[end + 1..].trim_start();
        }

        let mut tokens = text.split_whitespace();
        let name = tokens
            .next()
            .ok_or_else(|| Error::instruction("missing instruction name"))?
            .to_owned();

        let raw: Vec<&str> = tokens.collect();
        let mut operands = Vec::with_capacity(raw.len());
        for (index, token) in raw.iter().enumerate() {
            let access = default_access(raw.len(), index)?;
            operands.push(Operand::parse(token, access)?);
        }

        Ok(Self {
            name,
            display_format,
            operands,
            ..Self::default()
        })
    }

    fn parse_opcodes(&mut self, section: &str) -> Result<(), Error> {
        for token in section.split_whitespace() {
            if token.starts_with("vex.") || token.starts_with("xop.") {
                if self.vex.is_some() || !self.opcodes.is_empty() {
                    return Err(Error::instruction(format!(
                        "misplaced vex token \"{token}\""
                    )));
                }
                self.vex = Some(VexSpec::parse(token)?);
            } else if let Some(digit) = token.strip_prefix('/') {
                let digit: u8 = digit
                    .parse()
                    .map_err(|_| Error::instruction(format!("invalid opcode token \"{token}\"")))?;
                if digit > 7 || self.opcode_ext().is_some() {
                    return Err(Error::instruction(format!(
                        "invalid opcode extension \"{token}\""
                    )));
                }
                self.opcodes.push(OpcodeToken::OpcodeExt(digit));
            } else {
                let byte = token
                    .strip_prefix("0x")
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                    .ok_or_else(|| {
                        Error::instruction(format!("invalid opcode token \"{token}\""))
                    })?;
                if self.opcode_ext().is_some() {
                    return Err(Error::instruction(
                        "opcode extension must be the final token",
                    ));
                }
                self.opcodes.push(OpcodeToken::Byte(byte));
            }
        }
        if !self.opcodes.iter().any(|t| matches!(t, OpcodeToken::Byte(_))) {
            return Err(Error::instruction("empty opcode section"));
        }
        Ok(())
    }

    fn parse_tags(&mut self, section: &str) -> Result<(), Error> {
        for token in section.split_whitespace() {
            self.tags.push(Tag::parse(token)?);
        }
        if self.has_tag(&Tag::NoRex) && self.has_tag(&Tag::RexW) {
            return Err(Error::instruction("norex conflicts with rexw"));
        }
        if self.has_tag(&Tag::Amd64) && self.has_tag(&Tag::Ia32) {
            return Err(Error::instruction("amd64 conflicts with ia32"));
        }
        Ok(())
    }

    fn derive_rex(&mut self) {
        let w_set = self.has_tag(&Tag::RexW);
        self.rex = RexSpec {
            r_matters: self.operands.iter().any(|op| op.uses_modrm_reg()),
            x_matters: false,
            b_matters: self.operands.iter().any(|op| {
                matches!(
                    op.kind(),
                    EncodingKind::ModrmRm
                        | EncodingKind::RegisterOnly
                        | EncodingKind::VecRm
                        | EncodingKind::VecRegisterOnly
                        | EncodingKind::RegisterInOpcode
                )
            }),
            w_matters: w_set || self.operands.iter().any(|op| op.size() == "q"),
            w_set,
        };
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_format(&self) -> Option<&str> {
        self.display_format.as_deref()
    }

    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }

    pub fn opcodes(&self) -> &[OpcodeToken] {
        &self.opcodes
    }

    pub fn required_prefixes(&self) -> &[u8] {
        &self.required_prefixes
    }

    pub fn vex(&self) -> Option<&VexSpec> {
        self.vex.as_ref()
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn rex(&self) -> RexSpec {
        self.rex
    }

    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tags.contains(tag)
    }

    pub fn cpu_features(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().filter_map(|tag| match tag {
            Tag::CpuFeature(feature) => Some(feature.as_str()),
            _ => None,
        })
    }

    pub fn att_suffix(&self) -> Option<char> {
        self.tags.iter().find_map(|tag| match tag {
            Tag::AttSuffix(suffix) => *suffix,
            _ => None,
        })
    }

    /// The `/digit` opcode extension, if any.
    pub fn opcode_ext(&self) -> Option<u8> {
        self.opcodes.iter().find_map(|token| match token {
            OpcodeToken::OpcodeExt(digit) => Some(*digit),
            _ => None,
        })
    }

    /// Plain opcode bytes, without the extension digit.
    pub fn opcode_bytes(&self) -> impl Iterator<Item = u8> + '_ {
        self.opcodes.iter().filter_map(|token| match token {
            OpcodeToken::Byte(byte) => Some(*byte),
            _ => None,
        })
    }

    /// Moves leading legacy-prefix bytes out of the opcode list into
    /// the required prefixes. Idempotent: once the first remaining
    /// byte is a true opcode, another pass moves nothing.
    pub fn collect_prefixes(&mut self) -> Result<(), Error> {
        let mut head = 0;
        while let Some(OpcodeToken::Byte(byte)) = self.opcodes.get(head) {
            if !prefix::is_legacy_prefix(*byte) {
                break;
            }
            head += 1;
        }
        if !self.opcodes[head..]
            .iter()
            .any(|t| matches!(t, OpcodeToken::Byte(_)))
        {
            return Err(Error::instruction("instruction is all legacy prefixes"));
        }
        for token in self.opcodes.drain(..head) {
            if let OpcodeToken::Byte(byte) = token {
                self.required_prefixes.push(byte);
            }
        }
        Ok(())
    }

    /// A ModRM byte is present iff some operand is encoded through it
    /// or the opcode carries an extension digit.
    pub fn has_modrm(&self) -> bool {
        self.opcode_ext().is_some()
            || self
                .operands
                .iter()
                .any(|op| op.uses_modrm_reg() || op.uses_modrm_rm())
    }

    pub fn with_rex(&self, rex: RexSpec) -> Self {
        Self {
            rex,
            ..self.clone()
        }
    }

    pub fn with_operands(&self, operands: Vec<Operand>) -> Self {
        let mut insn = Self {
            operands,
            ..self.clone()
        };
        let rex = insn.rex;
        insn.derive_rex();
        insn.rex.w_set = rex.w_set;
        insn.rex.w_matters |= rex.w_matters || rex.w_set;
        insn
    }

    pub fn with_opcodes(&self, opcodes: Vec<OpcodeToken>) -> Self {
        Self {
            opcodes,
            ..self.clone()
        }
    }

    pub fn with_tags(&self, tags: Vec<Tag>) -> Self {
        Self {
            tags,
            ..self.clone()
        }
    }

    pub fn with_vex(&self, vex: VexSpec) -> Self {
        Self {
            vex: Some(vex),
            ..self.clone()
        }
    }

    pub fn with_required_prefixes(&self, required_prefixes: Vec<u8>) -> Self {
        Self {
            required_prefixes,
            ..self.clone()
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        if let Some(format) = &self.display_format {
            write!(fmt, "\"{format}\" ")?;
        }
        fmt.write_str(&self.name)?;
        for op in &self.operands {
            write!(fmt, " {op}")?;
        }
        fmt.write_str(",")?;
        for byte in &self.required_prefixes {
            write!(fmt, " 0x{byte:02x}")?;
        }
        if let Some(vex) = &self.vex {
            write!(fmt, " {vex}")?;
        }
        for token in &self.opcodes {
            write!(fmt, " {token}")?;
        }
        if !self.tags.is_empty() {
            fmt.write_str(",")?;
            for tag in &self.tags {
                write!(fmt, " {tag}")?;
            }
        }
        Ok(())
    }
}
