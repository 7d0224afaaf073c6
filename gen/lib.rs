//! dfagen grammar generator library.
//!
//! Compiles one-line x86/x86-64 instruction-encoding definitions into
//! grammar fragments for a downstream state-machine compiler. Data
//! flows one way: text is parsed into an [`Instruction`], expanded
//! into concrete variants by the [`split`] passes, and serialized by
//! the [`printer`].

pub mod printer;
pub mod split;

use dfagen_core::{
    error::Error,
    insn::{Instruction, Tag, VexL},
    operand::EncodingKind,
    prefix::{generate_legacy_prefixes, PREFIX_LOCK, PREFIX_REPNZ, PREFIX_REPZ},
    Bitness,
};

use crate::printer::{AddressMode, ConsumerMode, InstructionPrinter};

type Result<T, E = Error> = core::result::Result<T, E>;

fn expand<F>(variants: Vec<Instruction>, splitter: F) -> Result<Vec<Instruction>>
where
    F: Fn(&Instruction) -> Result<Option<Vec<Instruction>>>,
{
    let mut out = Vec::new();
    for insn in variants {
        match splitter(&insn)? {
            Some(split) => out.extend(split),
            None => out.push(insn),
        }
    }
    Ok(out)
}

/// Expands one parsed definition into every concrete variant, applying
/// each splitter only where the instruction shape calls for it.
pub fn split_variants(bitness: Bitness, insn: &Instruction) -> Result<Vec<Instruction>> {
    let mut variants = vec![insn.clone()];

    variants = expand(variants, |insn| {
        if insn.operands().iter().any(|op| op.size().is_empty()) {
            split::split_byte_non_byte(insn).map(Some)
        } else {
            Ok(None)
        }
    })?;

    variants = expand(variants, |insn| {
        if insn.operands().iter().any(|op| split::is_vyz_size(op.size())) {
            split::split_vyz(bitness, insn).map(Some)
        } else {
            Ok(None)
        }
    })?;

    variants = expand(variants, |insn| match insn.vex() {
        Some(vex) if vex.l == VexL::Lx => split::split_l(insn).map(Some),
        _ => Ok(None),
    })?;

    variants = expand(variants, |insn| Ok(Some(split::split_rm(insn))))?;

    Ok(variants)
}

fn print_one<F>(mode: ConsumerMode, bitness: Bitness, print: F) -> Result<String>
where
    F: FnOnce(&mut InstructionPrinter) -> Result<()>,
{
    let mut printer = InstructionPrinter::new(mode, bitness);
    print(&mut printer)?;
    Ok(printer.into_content())
}

/// Compiles one definition line into grammar lines.
///
/// Returns an empty vector when the definition does not apply to the
/// target (wrong bitness tag, or sandbox-forbidden in validator mode).
pub fn compile_definition(
    line: &str,
    mode: ConsumerMode,
    bitness: Bitness,
) -> Result<Vec<String>> {
    let mut insn = Instruction::parse(line)?;
    insn.collect_prefixes()?;

    if insn.has_tag(&Tag::Amd64) && bitness != Bitness::B64 {
        return Ok(Vec::new());
    }
    if insn.has_tag(&Tag::Ia32) && bitness != Bitness::B32 {
        return Ok(Vec::new());
    }
    if mode == ConsumerMode::Validator && insn.has_tag(&Tag::SandboxForbidden) {
        return Ok(Vec::new());
    }

    let mut lines = Vec::new();
    for variant in split_variants(bitness, &insn)? {
        let mut required = variant.required_prefixes().to_vec();
        if variant.has_tag(&Tag::Rep) {
            required.push(PREFIX_REPZ);
        }
        if variant.has_tag(&Tag::Repnz) {
            required.push(PREFIX_REPNZ);
        }

        let memory_operand = variant
            .operands()
            .iter()
            .any(|op| op.kind() == EncodingKind::MemoryOnly);

        if memory_operand {
            // the lock prefix is only legal on the memory forms
            let optional: &[u8] = if variant.has_tag(&Tag::Lock) {
                &[PREFIX_LOCK]
            } else {
                &[]
            };
            for ordering in generate_legacy_prefixes(bitness, &required, optional) {
                let concrete = variant.with_required_prefixes(ordering);
                for address_mode in AddressMode::all(bitness) {
                    lines.push(print_one(mode, bitness, |printer| {
                        printer.print_instruction_with_modrm_memory(&concrete, address_mode)
                    })?);
                }
            }
        } else {
            for ordering in generate_legacy_prefixes(bitness, &required, &[]) {
                let concrete = variant.with_required_prefixes(ordering);
                lines.push(print_one(mode, bitness, |printer| {
                    if concrete.has_modrm() {
                        printer.print_instruction_with_modrm_reg(&concrete)
                    } else {
                        printer.print_instruction_without_modrm(&concrete)
                    }
                })?);
            }
        }
    }
    Ok(lines)
}
