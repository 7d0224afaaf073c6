//! Grammar printer.
//!
//! Turns one fully concrete instruction into a line of grammar tokens
//! for the downstream state-machine compiler. The token vocabulary is
//! literal hex bytes, `(a|b)` alternation groups, `&` conjunction,
//! `?` for optional, `@name` annotations, and a small prelude of
//! byte-class machines the downstream tool defines: `modrm_registers`,
//! `opcode_0`..`opcode_7`, the four addressing-pattern machines,
//! `imm8`..`imm64`, `rel8`..`rel32` and `disp32`/`disp64`.

use core::fmt::Write as _;

use dfagen_core::{
    error::Error,
    insn::{Instruction, Tag, VexKind, VexL, VexMap, VexW},
    operand::{EncodingKind, Operand},
    Bitness,
};

type Result<T = (), E = Error> = core::result::Result<T, E>;

/// Which downstream tool consumes the emitted grammar.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConsumerMode {
    Decoder,
    Validator,
}

/// A named memory addressing pattern. The two flags say whether the
/// SIB index/base REX extension bits carry meaning for the pattern.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AddressMode {
    name: &'static str,
    x_matters: bool,
    b_matters: bool,
}

impl AddressMode {
    pub const SINGLE_REGISTER_MEMORY: Self = Self::new("single_register_memory", false, true);
    pub const SIB_BASE_INDEX: Self = Self::new("operand_sib_base_index", true, true);
    pub const SIB_PURE_INDEX: Self = Self::new("operand_sib_pure_index", true, false);
    pub const RIP_RELATIVE: Self = Self::new("operand_rip_relative", false, false);

    const fn new(name: &'static str, x_matters: bool, b_matters: bool) -> Self {
        Self {
            name,
            x_matters,
            b_matters,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn x_matters(&self) -> bool {
        self.x_matters
    }

    pub const fn b_matters(&self) -> bool {
        self.b_matters
    }

    /// Addressing patterns legal for a processor mode, in fixed order.
    /// RIP-relative addressing does not exist in 32-bit mode.
    pub fn all(bitness: Bitness) -> &'static [AddressMode] {
        const MODES_32: &[AddressMode] = &[
            AddressMode::SINGLE_REGISTER_MEMORY,
            AddressMode::SIB_BASE_INDEX,
            AddressMode::SIB_PURE_INDEX,
        ];
        const MODES_64: &[AddressMode] = &[
            AddressMode::SINGLE_REGISTER_MEMORY,
            AddressMode::SIB_BASE_INDEX,
            AddressMode::SIB_PURE_INDEX,
            AddressMode::RIP_RELATIVE,
        ];
        match bitness {
            Bitness::B32 => MODES_32,
            Bitness::B64 => MODES_64,
        }
    }
}

fn width_bits(op: &Operand) -> Result<u32> {
    match op.size() {
        "b" => Ok(8),
        "w" => Ok(16),
        "d" => Ok(32),
        // immediate widths cap at 32 bits
        "z" => Ok(32),
        "q" => Ok(64),
        "x" => Ok(128),
        "x-ymm" => Ok(256),
        size => Err(Error::instruction(format!(
            "operand size \"{size}\" is not concrete"
        ))),
    }
}

/// Formats a byte alternation; a single byte needs no group.
fn byte_group(bytes: &[u8], optional: bool) -> String {
    let mut out = String::new();
    if bytes.len() == 1 {
        let _ = write!(out, "0x{:02x}", bytes[0]);
    } else {
        out.push('(');
        for (i, byte) in bytes.iter().enumerate() {
            if i != 0 {
                out.push('|');
            }
            let _ = write!(out, "0x{byte:02x}");
        }
        out.push(')');
    }
    if optional {
        out.push('?');
    }
    out
}

/// Write-only token accumulator for one instruction.
pub struct InstructionPrinter {
    mode: ConsumerMode,
    bitness: Bitness,
    out: String,
}

impl InstructionPrinter {
    pub fn new(mode: ConsumerMode, bitness: Bitness) -> Self {
        Self {
            mode,
            bitness,
            out: String::new(),
        }
    }

    pub fn content(&self) -> &str {
        &self.out
    }

    pub fn into_content(self) -> String {
        self.out
    }

    fn token(&mut self, token: &str) {
        if !self.out.is_empty() {
            self.out.push(' ');
        }
        self.out.push_str(token);
    }

    /// Prints an instruction that has no ModRM byte.
    pub fn print_instruction_without_modrm(&mut self, insn: &Instruction) -> Result {
        if insn.has_modrm() {
            return Err(Error::instruction(format!(
                "\"{}\" has a modrm byte",
                insn.name()
            )));
        }
        self.print_legacy_prefixes(insn);
        self.print_rex_or_vex(insn, None)?;
        self.print_opcode(insn)?;
        self.print_immediates(insn)?;
        self.print_signature(insn)
    }

    /// Prints the register form (ModRM.mod = 3) of an instruction.
    pub fn print_instruction_with_modrm_reg(&mut self, insn: &Instruction) -> Result {
        if !insn.has_modrm() {
            return Err(Error::instruction(format!(
                "\"{}\" has no modrm byte",
                insn.name()
            )));
        }
        for op in insn.operands() {
            if matches!(op.kind(), EncodingKind::MemoryOnly) {
                return Err(Error::instruction(format!(
                    "\"{}\" has a memory-only operand on the register path",
                    insn.name()
                )));
            }
            if matches!(op.kind(), EncodingKind::ModrmRm | EncodingKind::VecRm) {
                return Err(Error::instruction(format!(
                    "\"{}\" has an unsplit register-or-memory operand",
                    insn.name()
                )));
            }
        }

        self.print_legacy_prefixes(insn);
        self.print_rex_or_vex(insn, None)?;
        self.print_opcode(insn)?;

        match insn.opcode_ext() {
            Some(digit) => self.token(&format!("(modrm_registers&opcode_{digit})")),
            None => self.token("modrm_registers"),
        }
        self.print_modrm_annotations(insn);

        self.print_immediates(insn)?;
        self.print_signature(insn)
    }

    /// Prints one memory form (ModRM.mod != 3) of an instruction,
    /// intersected with the given addressing pattern.
    pub fn print_instruction_with_modrm_memory(
        &mut self,
        insn: &Instruction,
        mode: &AddressMode,
    ) -> Result {
        if !insn.has_modrm() {
            return Err(Error::instruction(format!(
                "\"{}\" has no modrm byte",
                insn.name()
            )));
        }
        let memory = insn
            .operands()
            .iter()
            .find(|op| op.uses_modrm_rm())
            .filter(|op| op.is_memory_capable());
        if memory.is_none() {
            return Err(Error::instruction(format!(
                "\"{}\" has no memory operand",
                insn.name()
            )));
        }
        if *mode == AddressMode::RIP_RELATIVE && self.bitness == Bitness::B32 {
            return Err(Error::instruction(
                "rip-relative addressing requires 64-bit mode",
            ));
        }

        self.print_legacy_prefixes(insn);
        self.print_rex_or_vex(insn, Some(mode))?;
        self.print_opcode(insn)?;

        match insn.opcode_ext() {
            Some(digit) => self.token(&format!("({}&opcode_{digit})", mode.name())),
            None => self.token(mode.name()),
        }
        self.print_modrm_annotations(insn);

        if self.mode == ConsumerMode::Validator {
            self.token("@check_memory_access");
            if *mode == AddressMode::RIP_RELATIVE {
                self.token("@modifiable_instruction");
            }
        }

        self.print_immediates(insn)?;
        self.print_signature(insn)
    }

    fn print_legacy_prefixes(&mut self, insn: &Instruction) {
        for byte in insn.required_prefixes() {
            self.token(&format!("0x{byte:02x}"));
        }
    }

    fn print_rex_or_vex(&mut self, insn: &Instruction, mode: Option<&AddressMode>) -> Result {
        if insn.vex().is_some() {
            self.print_vex_or_xop_prefix(insn, mode)
        } else {
            self.print_rex(insn, mode);
            Ok(())
        }
    }

    /// Prints the REX byte match. The W field is constrained by the
    /// instruction; R/X/B are always free in the byte pattern, and
    /// every bit the instruction does not consume is flagged spurious
    /// so the consumer can ignore it the way the CPU does.
    fn print_rex(&mut self, insn: &Instruction, mode: Option<&AddressMode>) {
        if self.bitness == Bitness::B32 || insn.has_tag(&Tag::NoRex) {
            return;
        }
        let rex = insn.rex();
        let (x_matters, b_matters) = match mode {
            Some(mode) => (
                rex.x_matters || mode.x_matters(),
                rex.b_matters || mode.b_matters(),
            ),
            None => (rex.x_matters, rex.b_matters),
        };

        let group = if rex.w_set {
            byte_group(&(0x48..=0x4f).collect::<Vec<_>>(), false)
        } else if rex.w_matters {
            byte_group(&(0x40..=0x47).collect::<Vec<_>>(), true)
        } else {
            byte_group(&(0x40..=0x4f).collect::<Vec<_>>(), true)
        };
        self.token(&group);

        if !rex.r_matters {
            self.token("@spurious_rex_r");
        }
        if !x_matters {
            self.token("@spurious_rex_x");
        }
        if !b_matters {
            self.token("@spurious_rex_b");
        }
        if !rex.w_matters {
            self.token("@spurious_rex_w");
        }
    }

    /// Prints the VEX/XOP prefix as a disjunction of the long 3-byte
    /// and, when legal, short 2-byte encodings. The inverted R/X/B
    /// bits range over both values only where the instruction (or the
    /// addressing pattern) consumes them; a bit without meaning is
    /// pinned to the no-extension encoding.
    pub fn print_vex_or_xop_prefix(
        &mut self,
        insn: &Instruction,
        mode: Option<&AddressMode>,
    ) -> Result {
        let vex = insn
            .vex()
            .ok_or_else(|| Error::instruction(format!("\"{}\" has no vex prefix", insn.name())))?;

        let l_bits: &[u8] = match vex.l {
            VexL::L128 => &[0],
            VexL::L256 => &[1],
            VexL::Lig => &[0, 1],
            VexL::Lx => {
                return Err(Error::instruction(format!(
                    "\"{}\" vector width is not concrete",
                    insn.name()
                )));
            }
        };
        let w_bits: &[u8] = match vex.w {
            VexW::W0 => &[0],
            VexW::W1 => &[1],
            VexW::Wig => &[0, 1],
        };
        // inverted vvvv field; all 16 values only when an operand
        // actually lives there
        let vvvv_operand = insn
            .operands()
            .iter()
            .position(|op| op.kind() == EncodingKind::VexVvvv);
        let vvvv_fields: Vec<u8> = match vvvv_operand {
            Some(_) => (0..16).collect(),
            None => vec![15],
        };
        // inverted R/X/B; 32-bit code must leave all three extension
        // bits clear, which reads as all-ones after inversion
        let rex = insn.rex();
        let (x_matters, b_matters) = match mode {
            Some(mode) => (
                rex.x_matters || mode.x_matters(),
                rex.b_matters || mode.b_matters(),
            ),
            None => (rex.x_matters, rex.b_matters),
        };
        let free: &[u8] = match self.bitness {
            Bitness::B64 => &[0, 1],
            Bitness::B32 => &[1],
        };
        let inv = |matters: bool| if matters { free } else { &[1_u8] as &[u8] };
        let r_fields = inv(rex.r_matters);

        let mut long2 = Vec::new();
        for &r in r_fields {
            for &x in inv(x_matters) {
                for &b in inv(b_matters) {
                    long2.push(r << 7 | x << 6 | b << 5 | vex.map.bits());
                }
            }
        }
        let mut long3 = Vec::new();
        for &w in w_bits {
            for &vvvv in &vvvv_fields {
                for &l in l_bits {
                    long3.push(w << 7 | vvvv << 3 | l << 2 | vex.pp.bits());
                }
            }
        }
        long3.sort_unstable();
        long3.dedup();

        let lead = match vex.kind {
            VexKind::Vex => 0xc4,
            VexKind::Xop => 0x8f,
        };
        let short_ok =
            vex.kind == VexKind::Vex && vex.map == VexMap::M0f && vex.w != VexW::W1;

        if short_ok {
            // the 2-byte form has no X/B bits, so it always encodes
            // them clear
            let mut short = Vec::new();
            for &r in r_fields {
                for &vvvv in &vvvv_fields {
                    for &l in l_bits {
                        short.push(r << 7 | vvvv << 3 | l << 2 | vex.pp.bits());
                    }
                }
            }
            short.sort_unstable();
            short.dedup();

            self.token("(");
            self.token("0xc4");
            self.token(&byte_group(&long2, false));
            self.token(&byte_group(&long3, false));
            self.token("|");
            self.token("0xc5");
            self.token(&byte_group(&short, false));
            self.token(")");
        } else {
            self.token(&format!("0x{lead:02x}"));
            self.token(&byte_group(&long2, false));
            self.token(&byte_group(&long3, false));
        }

        if let Some(index) = vvvv_operand {
            self.token(&format!("@operand{index}_from_vex"));
        }
        Ok(())
    }

    /// Prints the opcode bytes; a register-in-opcode operand widens
    /// the final byte into its eight register encodings.
    pub fn print_opcode(&mut self, insn: &Instruction) -> Result {
        let bytes: Vec<u8> = insn.opcode_bytes().collect();
        let reg = insn
            .operands()
            .iter()
            .position(|op| op.kind() == EncodingKind::RegisterInOpcode);

        match reg {
            Some(index) => {
                let (&last, head) = bytes
                    .split_last()
                    .ok_or_else(|| Error::instruction("instruction has no opcode byte"))?;
                for byte in head {
                    self.token(&format!("0x{byte:02x}"));
                }
                let group: Vec<u8> = (0..8).map(|reg| last.wrapping_add(reg)).collect();
                self.token(&byte_group(&group, false));
                self.token(&format!("@operand{index}_from_opcode"));
            }
            None => {
                for byte in &bytes {
                    self.token(&format!("0x{byte:02x}"));
                }
            }
        }
        Ok(())
    }

    fn print_modrm_annotations(&mut self, insn: &Instruction) {
        for (index, op) in insn.operands().iter().enumerate() {
            if op.uses_modrm_reg() {
                self.token(&format!("@operand{index}_from_modrm_reg"));
            } else if op.uses_modrm_rm() {
                self.token(&format!("@operand{index}_from_modrm_rm"));
            }
        }
    }

    /// Prints immediate, code-offset and direct-address fields, each
    /// followed by the annotation binding it to its operand.
    pub fn print_immediates(&mut self, insn: &Instruction) -> Result {
        for (index, op) in insn.operands().iter().enumerate() {
            match op.kind() {
                EncodingKind::Immediate | EncodingKind::SecondImmediate => {
                    let field = match width_bits(op)? {
                        8 => "imm8",
                        16 => "imm16",
                        32 => "imm32",
                        64 => "imm64",
                        _ => {
                            return Err(Error::instruction(format!(
                                "\"{}\" immediate too wide",
                                insn.name()
                            )));
                        }
                    };
                    self.token(field);
                    if op.kind() == EncodingKind::Immediate {
                        self.token(&format!("@operand{index}_immediate"));
                    } else {
                        self.token(&format!("@operand{index}_second_immediate"));
                    }
                }
                EncodingKind::CodeOffset => {
                    let field = match width_bits(op)? {
                        8 => "rel8",
                        16 => "rel16",
                        // branch offsets stay 32-bit wide in 64-bit mode
                        _ => "rel32",
                    };
                    self.token(field);
                    self.token(&format!("@operand{index}_relative"));
                }
                EncodingKind::AbsoluteAddress => {
                    let field = match self.bitness {
                        Bitness::B32 => "disp32",
                        Bitness::B64 => "disp64",
                    };
                    self.token(field);
                    self.token(&format!("@operand{index}_absolute_disp"));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Prints the trailing signature: mnemonic, operand count, operand
    /// widths, implicit register names, CPU features and the AT&T
    /// name-suffix annotation.
    pub fn print_signature(&mut self, insn: &Instruction) -> Result {
        self.token(&format!("@instruction_{}", insn.name()));
        self.token(&format!("@operands_count_is_{}", insn.operands().len()));
        for (index, op) in insn.operands().iter().enumerate() {
            self.token(&format!("@operand{index}_{}bit", width_bits(op)?));
        }
        for (index, op) in insn.operands().iter().enumerate() {
            if let EncodingKind::Implicit(reg) = op.kind() {
                self.token(&format!("@operand{index}_{}", reg.name(width_bits(op)?)));
            }
        }
        for feature in insn.cpu_features() {
            self.token(&format!("@cpu_{feature}"));
        }
        if let Some(suffix) = insn.att_suffix() {
            self.token(&format!("@att_show_name_suffix_{suffix}"));
        }
        Ok(())
    }
}
