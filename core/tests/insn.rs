use dfagen_core::{
    insn::{
        default_access, Instruction, OpcodeToken, Tag, VexKind, VexL, VexMap, VexPp, VexSpec,
        VexW,
    },
    operand::{Access, EncodingKind},
};

#[test]
fn parse_name_and_operands_applies_positional_defaults() {
    let insn = Instruction::parse_name_and_operands("add G E").unwrap();
    assert_eq!(insn.name(), "add");
    assert_eq!(insn.operands().len(), 2);
    assert_eq!(insn.operands()[0].kind(), EncodingKind::ModrmReg);
    assert_eq!(insn.operands()[0].access(), Access::Read);
    assert_eq!(insn.operands()[1].kind(), EncodingKind::ModrmRm);
    assert_eq!(insn.operands()[1].access(), Access::ReadWrite);
    assert_eq!(insn.to_string(), "add =G &E,");
}

#[test]
fn parse_requires_an_opcode_section() {
    assert!(Instruction::parse("add G E").is_err());
    assert!(Instruction::parse("add G E,").is_err());
    assert!(Instruction::parse("add G E, , lock").is_err());
}

#[test]
fn parse_full_line_round_trips() {
    let line = "add =G &E, 0x00, lock";
    let insn = Instruction::parse(line).unwrap();
    assert_eq!(insn.opcodes(), [OpcodeToken::Byte(0x00)]);
    assert!(insn.has_tag(&Tag::Lock));
    assert!(insn.has_modrm());
    assert_eq!(insn.to_string(), line);
    assert_eq!(Instruction::parse(&insn.to_string()).unwrap(), insn);
}

#[test]
fn parse_display_format_string() {
    let line = "\"rep nop\" pause, 0xf3 0x90";
    let insn = Instruction::parse(line).unwrap();
    assert_eq!(insn.name(), "pause");
    assert_eq!(insn.display_format(), Some("rep nop"));
    assert_eq!(insn.to_string(), line);

    assert!(Instruction::parse("\"broken nop, 0x90").is_err());
}

#[test]
fn parse_opcode_extension() {
    let insn = Instruction::parse("neg E, 0xf6 /3").unwrap();
    assert_eq!(insn.opcode_ext(), Some(3));
    assert_eq!(insn.opcode_bytes().collect::<Vec<_>>(), [0xf6]);
    assert!(insn.has_modrm());

    // the extension digit must be last and at most 7
    assert!(Instruction::parse("neg E, /3 0xf6").is_err());
    assert!(Instruction::parse("neg E, 0xf6 /8").is_err());
    assert!(Instruction::parse("neg E, 0xf6 /3 /4").is_err());
    assert!(Instruction::parse("neg E, /3").is_err());
}

#[test]
fn parse_rejects_bad_opcode_tokens() {
    assert!(Instruction::parse("nop, 90").is_err());
    assert!(Instruction::parse("nop, 0x1234").is_err());
    assert!(Instruction::parse("nop, 0xzz").is_err());
}

#[test]
fn parse_vex_token() {
    let line = "vzeroupper, vex.256.none.0f.wig 0x77";
    let insn = Instruction::parse(line).unwrap();
    let vex = insn.vex().unwrap();
    assert_eq!(vex.kind, VexKind::Vex);
    assert_eq!(vex.l, VexL::L256);
    assert_eq!(vex.pp, VexPp::None);
    assert_eq!(vex.map, VexMap::M0f);
    assert_eq!(vex.w, VexW::Wig);
    assert_eq!(insn.to_string(), line);

    // the vex token must open the opcode section
    assert!(Instruction::parse("bad, 0x0f vex.128.none.0f.w0 0x58").is_err());
    assert!(Instruction::parse("bad, vex.128.none.0f.w0 vex.128.none.0f.w0 0x58").is_err());
}

#[test]
fn vex_spec_parsing() {
    let vex = VexSpec::parse("vex.128.66.0f38.w0").unwrap();
    assert_eq!(vex.pp, VexPp::P66);
    assert_eq!(vex.map, VexMap::M0f38);
    assert_eq!(vex.w, VexW::W0);

    let xop = VexSpec::parse("xop.lx.none.m9.wig").unwrap();
    assert_eq!(xop.kind, VexKind::Xop);
    assert_eq!(xop.l, VexL::Lx);
    assert_eq!(xop.map, VexMap::M9);

    // maps belong to their prefix kind
    assert!(VexSpec::parse("vex.128.none.m8.w0").is_err());
    assert!(VexSpec::parse("xop.128.none.0f.w0").is_err());
    assert!(VexSpec::parse("vex.512.none.0f.w0").is_err());
    assert!(VexSpec::parse("vex.128.none.0f.w0.extra").is_err());
}

#[test]
fn vex_field_bits() {
    assert_eq!(VexPp::None.bits(), 0);
    assert_eq!(VexPp::P66.bits(), 1);
    assert_eq!(VexPp::Pf3.bits(), 2);
    assert_eq!(VexPp::Pf2.bits(), 3);
    assert_eq!(VexMap::M0f.bits(), 1);
    assert_eq!(VexMap::M0f38.bits(), 2);
    assert_eq!(VexMap::M0f3a.bits(), 3);
    assert_eq!(VexMap::M8.bits(), 8);
}

#[test]
fn tag_parsing() {
    assert_eq!(Tag::parse("lock").unwrap(), Tag::Lock);
    assert_eq!(Tag::parse("att-suffix").unwrap(), Tag::AttSuffix(None));
    assert_eq!(Tag::parse("att-suffix-l").unwrap(), Tag::AttSuffix(Some('l')));
    assert_eq!(
        Tag::parse("cpu_avx").unwrap(),
        Tag::CpuFeature("avx".to_owned())
    );
    assert!(Tag::parse("att-suffix-x").is_err());
    assert!(Tag::parse("bogus").is_err());
}

#[test]
fn conflicting_tags_are_rejected() {
    assert!(Instruction::parse("nop, 0x90, norex rexw").is_err());
    assert!(Instruction::parse("nop, 0x90, amd64 ia32").is_err());
    assert!(Instruction::parse("nop, 0x90, bogus").is_err());
}

#[test]
fn tag_accessors() {
    let insn = Instruction::parse("sha1rnds4 =Ib !V =W, 0x0f 0x3a 0xcc, cpu_sha cpu_sse2").unwrap();
    assert_eq!(insn.cpu_features().collect::<Vec<_>>(), ["sha", "sse2"]);
    assert_eq!(insn.att_suffix(), None);

    let insn = Instruction::parse("add G E, 0x00, att-suffix").unwrap();
    assert_eq!(insn.att_suffix(), None);
    let insn = Instruction::parse("add Gb Eb, 0x00, att-suffix-b").unwrap();
    assert_eq!(insn.att_suffix(), Some('b'));
}

#[test]
fn default_access_table() {
    assert_eq!(default_access(1, 0).unwrap(), Access::ReadWrite);
    assert_eq!(default_access(2, 0).unwrap(), Access::Read);
    assert_eq!(default_access(2, 1).unwrap(), Access::ReadWrite);
    assert_eq!(default_access(3, 1).unwrap(), Access::Read);
    assert_eq!(default_access(4, 3).unwrap(), Access::ReadWrite);
    assert!(default_access(5, 0).is_err());
}

#[test]
fn collect_prefixes_moves_leading_legacy_bytes() {
    let mut insn = Instruction::parse("pause, 0xf3 0x90").unwrap();
    insn.collect_prefixes().unwrap();
    assert_eq!(insn.required_prefixes(), [0xf3]);
    assert_eq!(insn.opcode_bytes().collect::<Vec<_>>(), [0x90]);

    // idempotent
    insn.collect_prefixes().unwrap();
    assert_eq!(insn.required_prefixes(), [0xf3]);
    assert_eq!(insn.opcode_bytes().collect::<Vec<_>>(), [0x90]);
}

#[test]
fn collect_prefixes_stops_at_the_first_opcode_byte() {
    let mut insn = Instruction::parse("lar =E !G, 0x66 0x0f 0x02").unwrap();
    insn.collect_prefixes().unwrap();
    assert_eq!(insn.required_prefixes(), [0x66]);
    assert_eq!(insn.opcode_bytes().collect::<Vec<_>>(), [0x0f, 0x02]);
}

#[test]
fn collect_prefixes_rejects_prefix_only_opcodes() {
    let mut insn = Instruction::parse("bad, 0x66 0xf0").unwrap();
    assert!(insn.collect_prefixes().is_err());
}

#[test]
fn rex_bits_derive_from_operand_kinds() {
    let rex = Instruction::parse("add =Gq &Eq, 0x01").unwrap().rex();
    assert!(rex.r_matters);
    assert!(rex.b_matters);
    assert!(!rex.x_matters);
    assert!(rex.w_matters);
    assert!(!rex.w_set);

    let rex = Instruction::parse("nop, 0x90").unwrap().rex();
    assert!(!rex.r_matters);
    assert!(!rex.b_matters);
    assert!(!rex.w_matters);

    let rex = Instruction::parse("mov =Iq !rq, 0xb8, rexw").unwrap().rex();
    assert!(!rex.r_matters);
    assert!(rex.b_matters);
    assert!(rex.w_matters);
    assert!(rex.w_set);
}

#[test]
fn with_operands_rederives_rex_but_keeps_w() {
    let insn = Instruction::parse("stos !Eb, 0xaa, rexw").unwrap();
    assert!(insn.rex().w_set);

    let narrowed = insn.with_operands(vec![insn.operands()[0].with_size("b")]);
    assert!(narrowed.rex().w_set);
    assert!(narrowed.rex().w_matters);
    assert!(narrowed.rex().b_matters);
}

#[test]
fn has_modrm_detection() {
    assert!(!Instruction::parse("nop, 0x90").unwrap().has_modrm());
    assert!(!Instruction::parse("push =rq, 0x50").unwrap().has_modrm());
    assert!(Instruction::parse("add G E, 0x00").unwrap().has_modrm());
    assert!(Instruction::parse("neg E, 0xf6 /3").unwrap().has_modrm());
}

#[test]
fn display_serializes_every_section() {
    let mut insn = Instruction::parse("movsd !V =W, 0xf2 0x0f 0x10, cpu_sse2").unwrap();
    insn.collect_prefixes().unwrap();
    assert_eq!(insn.to_string(), "movsd !V =W, 0xf2 0x0f 0x10, cpu_sse2");
}
