use std::collections::BTreeSet;

use dfagen_core::{insn::Instruction, Bitness};
use dfagen_gen::{compile_definition, printer::ConsumerMode, split_variants};

#[test]
fn simple_instruction_compiles_to_one_line() {
    let lines = compile_definition("nop, 0x90, norex", ConsumerMode::Decoder, Bitness::B64)
        .unwrap();
    assert_eq!(lines, ["0x90 @instruction_nop @operands_count_is_0"]);
}

#[test]
fn bitness_tags_gate_the_whole_definition() {
    let line = "swapgs, 0x0f 0x01 0xf8, amd64 norex";
    assert!(compile_definition(line, ConsumerMode::Decoder, Bitness::B32)
        .unwrap()
        .is_empty());
    assert!(!compile_definition(line, ConsumerMode::Decoder, Bitness::B64)
        .unwrap()
        .is_empty());

    let line = "into, 0xce, ia32 norex";
    assert!(compile_definition(line, ConsumerMode::Decoder, Bitness::B64)
        .unwrap()
        .is_empty());
    assert!(!compile_definition(line, ConsumerMode::Decoder, Bitness::B32)
        .unwrap()
        .is_empty());
}

#[test]
fn sandbox_forbidden_is_dropped_from_validator_output() {
    let line = "int3, 0xcc, sandbox-forbidden norex";
    assert!(compile_definition(line, ConsumerMode::Validator, Bitness::B64)
        .unwrap()
        .is_empty());
    assert_eq!(
        compile_definition(line, ConsumerMode::Decoder, Bitness::B64).unwrap(),
        ["0xcc @instruction_int3 @operands_count_is_0"]
    );
}

#[test]
fn rep_tag_and_inline_prefix_byte_agree() {
    let from_tag =
        compile_definition("pause, 0x90, rep norex", ConsumerMode::Decoder, Bitness::B64)
            .unwrap();
    let from_byte =
        compile_definition("pause, 0xf3 0x90, norex", ConsumerMode::Decoder, Bitness::B64)
            .unwrap();
    assert_eq!(from_tag, from_byte);
    assert_eq!(from_tag, ["0xf3 0x90 @instruction_pause @operands_count_is_0"]);
}

#[test]
fn memory_forms_fan_out_over_addressing_patterns() {
    let lines = compile_definition("add Gb Eb, 0x00", ConsumerMode::Decoder, Bitness::B64)
        .unwrap();
    // one register form plus one memory form per addressing pattern
    assert_eq!(lines.len(), 5);
    assert!(lines[0].contains("modrm_registers"));
    assert!(lines[1].contains("single_register_memory"));
    assert!(lines[2].contains("operand_sib_base_index"));
    assert!(lines[3].contains("operand_sib_pure_index"));
    assert!(lines[4].contains("operand_rip_relative"));

    let lines = compile_definition("add Gb Eb, 0x00", ConsumerMode::Decoder, Bitness::B32)
        .unwrap();
    assert_eq!(lines.len(), 4);
}

#[test]
fn validator_memory_forms_carry_access_checks() {
    let decoder =
        compile_definition("add Gb Eb, 0x00", ConsumerMode::Decoder, Bitness::B64).unwrap();
    let validator =
        compile_definition("add Gb Eb, 0x00", ConsumerMode::Validator, Bitness::B64).unwrap();
    assert_eq!(decoder.len(), validator.len());

    assert!(!decoder.iter().any(|l| l.contains("@check_memory_access")));
    assert!(!validator[0].contains("@check_memory_access"));
    for line in &validator[1..] {
        assert!(line.contains("@check_memory_access"));
    }
    assert!(validator[4].contains("@modifiable_instruction"));
}

#[test]
fn lock_prefix_is_optional_and_memory_only() {
    let lines = compile_definition("add Gb Eb, 0x00, lock", ConsumerMode::Decoder, Bitness::B64)
        .unwrap();
    // register form, then 4 memory forms without lock and 4 with it
    assert_eq!(lines.len(), 9);
    assert!(!lines[0].contains("0xf0"));
    assert_eq!(lines.iter().filter(|l| l.starts_with("0xf0 ")).count(), 4);
    for line in lines.iter().filter(|l| l.starts_with("0xf0 ")) {
        assert!(!line.contains("modrm_registers"));
    }
}

#[test]
fn generic_definition_expands_every_size_variant() {
    let lines = compile_definition("add G E, 0x00, lock", ConsumerMode::Decoder, Bitness::B64)
        .unwrap();
    // 4 size variants; each has 1 register form plus memory forms over
    // prefix orderings (2, 3, 2, 2) and 4 addressing patterns
    assert_eq!(lines.len(), 40);

    // deterministic output
    let again = compile_definition("add G E, 0x00, lock", ConsumerMode::Decoder, Bitness::B64)
        .unwrap();
    assert_eq!(lines, again);
}

#[test]
fn split_variants_orders_byte_then_sizes() {
    let insn = Instruction::parse("add G E, 0x00").unwrap();
    let variants = split_variants(Bitness::B64, &insn).unwrap();
    // byte, 16-, 32- and 64-bit, each split into register and memory
    assert_eq!(variants.len(), 8);
    assert_eq!(variants[0].operands()[0].size(), "b");
    assert_eq!(variants[2].operands()[0].size(), "w");
    assert_eq!(variants[4].operands()[0].size(), "d");
    assert_eq!(variants[6].operands()[0].size(), "q");
}

#[test]
fn vector_width_generic_definitions_compile() {
    let lines = compile_definition(
        "vaddps =Wx =Hx !Vx, vex.lx.none.0f.w0 0x58, cpu_avx",
        ConsumerMode::Decoder,
        Bitness::B64,
    )
    .unwrap();
    // 2 vector widths, each with a register form and 4 memory forms
    assert_eq!(lines.len(), 10);
    assert!(lines.iter().all(|l| l.contains("@cpu_avx")));
    assert!(lines[0].contains("@operand0_128bit"));
    assert!(lines[5].contains("@operand0_256bit"));
}

#[test]
fn norex_definitions_never_emit_duplicate_width_variants() {
    let lines = compile_definition("inc Ev, 0xff /0, norex", ConsumerMode::Decoder, Bitness::B64)
        .unwrap();
    // 16- and 32-bit variants only, distinguished by the 0x66 prefix
    assert_eq!(lines.len(), 10);
    assert!(!lines.iter().any(|l| l.contains("@operand0_64bit")));
    let unique: BTreeSet<&String> = lines.iter().collect();
    assert_eq!(unique.len(), lines.len());
}

#[test]
fn malformed_definitions_are_reported() {
    assert!(compile_definition("add G E", ConsumerMode::Decoder, Bitness::B64).is_err());
    assert!(compile_definition("add Z, 0x00", ConsumerMode::Decoder, Bitness::B64).is_err());
    assert!(
        compile_definition("bad, 0x66 0xf0", ConsumerMode::Decoder, Bitness::B64).is_err()
    );
}
