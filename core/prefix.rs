//! Legacy prefix bytes and the prefix-ordering enumerator.

use std::collections::BTreeSet;

use crate::Bitness;

pub const PREFIX_OPERAND_SIZE: u8 = 0x66;
pub const PREFIX_ADDRESS_SIZE: u8 = 0x67;
pub const PREFIX_CS: u8 = 0x2e;
pub const PREFIX_ES: u8 = 0x26;
pub const PREFIX_SS: u8 = 0x36;
pub const PREFIX_DS: u8 = 0x3e;
pub const PREFIX_FS: u8 = 0x64;
pub const PREFIX_GS: u8 = 0x65;
pub const PREFIX_LOCK: u8 = 0xf0;
pub const PREFIX_REPNZ: u8 = 0xf2;
pub const PREFIX_REPZ: u8 = 0xf3;

pub fn is_legacy_prefix(byte: u8) -> bool {
    matches!(
        byte,
        PREFIX_OPERAND_SIZE
            | PREFIX_ADDRESS_SIZE
            | PREFIX_CS
            | PREFIX_ES
            | PREFIX_SS
            | PREFIX_DS
            | PREFIX_FS
            | PREFIX_GS
            | PREFIX_LOCK
            | PREFIX_REPNZ
            | PREFIX_REPZ
    )
}

/// CS/DS/ES/SS overrides are accepted but meaningless in 64-bit mode,
/// so they never make it into a 64-bit candidate set.
pub fn is_legal_prefix(bitness: Bitness, byte: u8) -> bool {
    match bitness {
        Bitness::B32 => true,
        Bitness::B64 => !matches!(byte, PREFIX_CS | PREFIX_ES | PREFIX_SS | PREFIX_DS),
    }
}

/// Enumerates every legal ordering of legacy prefixes.
///
/// For every subset S of `optional` the multiset `required ∪ S` is
/// permuted and each distinct permutation is emitted once. Prefixes
/// that are illegal for `bitness` are dropped from both inputs before
/// enumeration begins. The ordered set keeps output deterministic.
pub fn generate_legacy_prefixes(
    bitness: Bitness,
    required: &[u8],
    optional: &[u8],
) -> BTreeSet<Vec<u8>> {
    let required: Vec<u8> = required
        .iter()
        .copied()
        .filter(|&b| is_legal_prefix(bitness, b))
        .collect();
    let optional: Vec<u8> = optional
        .iter()
        .copied()
        .filter(|&b| is_legal_prefix(bitness, b))
        .collect();

    let mut out = BTreeSet::new();
    for subset in 0_u32..(1 << optional.len()) {
        let mut items = required.clone();
        for (i, &byte) in optional.iter().enumerate() {
            if subset & (1 << i) != 0 {
                items.push(byte);
            }
        }
        items.sort_unstable();
        permute(&mut items, 0, &mut out);
    }
    out
}

fn permute(items: &mut Vec<u8>, start: usize, out: &mut BTreeSet<Vec<u8>>) {
    if start + 1 >= items.len() {
        out.insert(items.clone());
        return;
    }
    for i in start..items.len() {
        // skip duplicate heads of the multiset
        if i != start && items[i] == items[start] {
            continue;
        }
        items.swap(start, i);
        permute(items, start + 1, out);
        items.swap(start, i);
    }
}
