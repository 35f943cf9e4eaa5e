use std::sync::Arc;

use pretty_assertions::assert_eq;

use cellvm_rs::decoder::{Decoder, Op};
use cellvm_rs::{
    assemble, Agent, Cell, CellConfig, InstrDesc, InstructionRegistry, Processor, RegistryBuilder,
};

#[test]
fn every_instruction_owns_a_power_of_two_range() {
    let reg = InstructionRegistry::standard().unwrap();
    let mut next = 0usize;
    for inst in reg.iter() {
        assert_eq!(inst.base_opcode() as usize, next, "{}", inst.mnemonic);
        assert_eq!(inst.range_size(), 1 << inst.arity);
        for variant in 0..inst.range_size() as u8 {
            let d = reg.decode(inst.opcode(variant)).unwrap();
            assert_eq!(d.op(), inst.op);
            assert_eq!(d.variant, variant);
            assert_eq!(d.inline_len(), variant.count_ones() as usize);
        }
        next += inst.range_size();
    }
    assert_eq!(next, reg.opcodes_used());
    assert_eq!(reg.opcodes_used(), 131);
    assert!(reg.decode(131).is_none());
    assert!(reg.decode(255).is_none());
}

#[test]
fn standard_opcode_bases() {
    let reg = InstructionRegistry::standard().unwrap();
    let base = |m: &str| reg.lookup_by_mnemonic(m).unwrap().base_opcode();
    assert_eq!(base("NOP"), 0);
    assert_eq!(base("INPC"), 6);
    assert_eq!(base("PUSH"), 7);
    assert_eq!(base("OUTC"), 41);
    assert_eq!(base("LSTO"), 43);
    assert_eq!(base("ADD"), 63);
    assert_eq!(base("RLOD"), 119);
    assert_eq!(base("RSTO"), 123);
}

#[test]
fn variant_bits_select_inline_slots() {
    let reg = InstructionRegistry::standard().unwrap();
    let rsto = reg.lookup_by_mnemonic("RSTO").unwrap();
    let d = reg.decode(rsto.opcode(0b101)).unwrap();
    assert_eq!(d.inline_slots().collect::<Vec<_>>(), vec![true, false, true]);
    assert_eq!(d.width(), 3);
}

#[test]
fn aliases_resolve_to_the_same_instruction() {
    let reg = InstructionRegistry::standard().unwrap();
    for (alias, target) in [
        ("JIF", "JPIF"),
        ("SHIFTL", "LSFT"),
        ("LOOPL", "LLOP"),
        ("SHIFTR", "RSFT"),
        ("LOOPR", "RLOP"),
        ("GREATER", "GRT"),
        ("LESS", "LST"),
    ] {
        let a = reg.lookup_by_mnemonic(alias).unwrap();
        let t = reg.lookup_by_mnemonic(target).unwrap();
        assert_eq!(a.base_opcode(), t.base_opcode());
        assert_eq!(a.op, t.op);
    }
    assert_eq!(reg.lookup_by_op(Op::Jpif).unwrap().mnemonic, "JPIF");
    assert!(reg.lookup_by_mnemonic("push").is_none());
}

fn twice(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    p.push(args[0].wrapping_mul(2));
}

#[test]
fn custom_registry_drives_assembler_and_processor() {
    let mut b = RegistryBuilder::new();
    b.register_all(cellvm_rs::isa::cell8::TABLE).register(InstrDesc {
        op: Op::Nop,
        mnemonic: "TWICE",
        arity: 1,
        cost: 1,
        action: twice,
    });
    let reg = Arc::new(b.finalize().unwrap());
    assert_eq!(reg.lookup_by_mnemonic("TWICE").unwrap().base_opcode(), 131);

    let banks = assemble(&reg, ".prg 0\nTWICE 21\n").unwrap();
    assert_eq!(banks.get(0).unwrap(), &[132, 21][..]);
    let mut cell = Cell::with_program(reg, CellConfig::default(), &banks);
    cell.run(10_000);
    assert_eq!(cell.processor.stack(), &[42]);
}
