//! Variant splitters.
//!
//! Each splitter is a pure function expanding one generic definition
//! into the concrete encodings the target grammar needs. Splitters
//! never mutate their input; they build new instructions.

use dfagen_core::{
    error::Error,
    insn::{Instruction, OpcodeToken, Tag, VexL},
    operand::{EncodingKind, Operand},
    prefix::PREFIX_OPERAND_SIZE,
    Bitness,
};

type Result<T, E = Error> = core::result::Result<T, E>;

/// True for size tags resolved by [`split_vyz`].
pub fn is_vyz_size(size: &str) -> bool {
    matches!(size, "v" | "y" | "z")
}

fn resolve_att_suffix(tags: &[Tag], suffix: char) -> Vec<Tag> {
    tags.iter()
        .map(|tag| match tag {
            Tag::AttSuffix(None) => Tag::AttSuffix(Some(suffix)),
            tag => tag.clone(),
        })
        .collect()
}

fn map_sizes<F>(operands: &[Operand], f: F) -> Vec<Operand>
where
    F: Fn(&Operand) -> Option<&'static str>,
{
    operands
        .iter()
        .map(|op| match f(op) {
            Some(size) => op.with_size(size),
            None => op.clone(),
        })
        .collect()
}

/// Splits a generic register-or-memory operand (`E`/`W`) into a
/// register-only and a memory-only variant, register first. An
/// instruction without such an operand passes through unchanged.
pub fn split_rm(insn: &Instruction) -> Vec<Instruction> {
    let pos = insn
        .operands()
        .iter()
        .position(|op| matches!(op.kind(), EncodingKind::ModrmRm | EncodingKind::VecRm));
    let Some(pos) = pos else {
        return vec![insn.clone()];
    };

    let op = &insn.operands()[pos];
    let reg_kind = match op.kind() {
        EncodingKind::VecRm => EncodingKind::VecRegisterOnly,
        _ => EncodingKind::RegisterOnly,
    };

    let mut reg_ops = insn.operands().to_vec();
    reg_ops[pos] = op.with_kind(reg_kind);
    let mut mem_ops = insn.operands().to_vec();
    mem_ops[pos] = op.with_kind(EncodingKind::MemoryOnly);

    vec![insn.with_operands(reg_ops), insn.with_operands(mem_ops)]
}

/// Splits an instruction generic over "byte vs. full operand size"
/// into a byte variant (opcode unchanged) and a wide variant (next
/// opcode byte, by x86 convention).
pub fn split_byte_non_byte(insn: &Instruction) -> Result<Vec<Instruction>> {
    if !insn.operands().iter().any(|op| op.size().is_empty()) {
        return Err(Error::split(format!(
            "\"{}\" has no byte/wide generic operand",
            insn.name()
        )));
    }

    let byte_ops = map_sizes(insn.operands(), |op| op.size().is_empty().then_some("b"));
    let wide_ops = map_sizes(insn.operands(), |op| {
        op.size().is_empty().then(|| {
            if op.kind().is_immediate_family() {
                "z"
            } else {
                "v"
            }
        })
    });

    let mut opcodes = insn.opcodes().to_vec();
    let last = opcodes
        .iter_mut()
        .rev()
        .find_map(|token| match token {
            OpcodeToken::Byte(byte) => Some(byte),
            _ => None,
        })
        .ok_or_else(|| Error::split("instruction has no opcode byte"))?;
    *last = last.wrapping_add(1);

    let byte_variant = insn
        .with_operands(byte_ops)
        .with_tags(resolve_att_suffix(insn.tags(), 'b'));
    let wide_variant = insn.with_operands(wide_ops).with_opcodes(opcodes);

    Ok(vec![byte_variant, wide_variant])
}

/// Expands `v`/`y`/`z` operand sizes into the 16-, 32- and 64-bit
/// encodings, in that order. The 16-bit variant gains a mandatory
/// operand-size-override prefix; the 64-bit variant (64-bit targets
/// only) forces REX.W. Under `norex` there is no REX.W to set, so the
/// 64-bit variant would share its byte pattern with the 32-bit one;
/// only the narrow variants are emitted.
pub fn split_vyz(bitness: Bitness, insn: &Instruction) -> Result<Vec<Instruction>> {
    if !insn.operands().iter().any(|op| is_vyz_size(op.size())) {
        return Err(Error::split(format!(
            "\"{}\" has no v/y/z sized operand",
            insn.name()
        )));
    }

    let variant = |sizes: fn(&str) -> &'static str, suffix: char| {
        let ops = map_sizes(insn.operands(), |op| {
            is_vyz_size(op.size()).then(|| sizes(op.size()))
        });
        insn.with_operands(ops)
            .with_tags(resolve_att_suffix(insn.tags(), suffix))
    };

    let with_w = |insn: Instruction, w_set: bool| {
        let mut rex = insn.rex();
        rex.w_set = w_set;
        rex.w_matters = bitness == Bitness::B64;
        insn.with_rex(rex)
    };

    let mut v16 = variant(
        |size| match size {
            "v" | "z" => "w",
            _ => "d",
        },
        'w',
    );
    let mut prefixes = v16.required_prefixes().to_vec();
    prefixes.push(PREFIX_OPERAND_SIZE);
    v16 = with_w(v16.with_required_prefixes(prefixes), false);

    let v32 = with_w(variant(|_| "d", 'l'), false);

    let mut out = vec![v16, v32];
    if bitness == Bitness::B64 && !insn.has_tag(&Tag::NoRex) {
        let v64 = variant(
            |size| match size {
                "z" => "d",
                _ => "q",
            },
            'q',
        );
        out.push(with_w(v64, true));
    }
    Ok(out)
}

/// Expands a vector instruction generic over AVX width into the
/// 128-bit (L clear) and 256-bit (L set) encodings, in that order.
/// The 256-bit variant marks every vector operand as wide.
pub fn split_l(insn: &Instruction) -> Result<Vec<Instruction>> {
    let vex = match insn.vex() {
        Some(vex) if vex.l == VexL::Lx => *vex,
        _ => {
            return Err(Error::split(format!(
                "\"{}\" is not generic over vector width",
                insn.name()
            )));
        }
    };

    let v128 = insn.with_vex(vex.with_l(VexL::L128));

    let wide_ops = map_sizes(insn.operands(), |op| (op.size() == "x").then_some("x-ymm"));
    let v256 = insn
        .with_operands(wide_ops)
        .with_vex(vex.with_l(VexL::L256));

    Ok(vec![v128, v256])
}
