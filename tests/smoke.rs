use std::sync::Arc;

use cellvm_rs::processor::ProcessorConfig;
use cellvm_rs::{assemble, Cell, CellConfig, InstructionRegistry, Op, Status, Step};

fn cell(src: &str, cfg: CellConfig) -> Cell {
    let registry = Arc::new(InstructionRegistry::standard().unwrap());
    let banks = assemble(&registry, src).unwrap();
    Cell::with_program(registry, cfg, &banks)
}

#[test]
fn add_program_runs_to_completion() {
    let mut c = cell(".prg 0\nPUSH 3\nPUSH 4\nADD\n", CellConfig::default());
    // Three instructions, then zero padding decodes as NOP up to offset 255.
    let steps = c.run(10_000);
    assert_eq!(steps, 254);
    assert_eq!(c.processor.stack(), &[7]);
    assert!(c.processor.halted());
    assert!(c.finished());
    assert_eq!(c.step(), Step::Idle);
    assert_eq!(c.state.energy, 4096 - 254);
}

#[test]
fn unmetered_processor_leaves_energy_alone() {
    let cfg = CellConfig {
        processor: ProcessorConfig { metered: false },
        ..CellConfig::default()
    };
    let mut c = cell(".prg 0\nPUSH 3\n", cfg);
    c.run(10_000);
    assert_eq!(c.state.energy, 4096);
}

#[test]
fn sub_takes_left_operand_from_deeper_slot() {
    let mut c = cell(".prg 0\nPUSH 5\nPUSH 2\nSUB\n", CellConfig::default());
    c.run(10_000);
    assert_eq!(c.processor.stack(), &[3]);

    let mut c = cell(".prg 0\nSUB 5 2\n", CellConfig::default());
    c.run(10_000);
    assert_eq!(c.processor.stack(), &[253]);
}

#[test]
fn single_inline_push_step() {
    let mut c = cell(".prg 0\nPUSH $2A\n", CellConfig::default());
    let push = c.processor.registry().lookup_by_mnemonic("PUSH").unwrap().opcode(1);
    assert_eq!(
        c.step(),
        Step::Executed {
            op: Op::Push,
            opcode: push
        }
    );
    assert_eq!(c.processor.sp(), 1);
    assert_eq!(c.processor.peek(0), 0x2A);
    assert_eq!(c.processor.pc(), 2);
    assert!(!c.finished());
}

#[test]
fn unassigned_bytes_are_skipped() {
    let mut c = cell(".prg 0\n.dat 200\nPUSH 1\n", CellConfig::default());
    assert_eq!(c.step(), Step::Unassigned { opcode: 200 });
    c.step();
    assert_eq!(c.processor.stack(), &[1]);
}

#[test]
fn output_and_input_go_through_the_cell() {
    let mut c = cell(
        ".prg 0\nOUTB ADD 3 4\nOUTC 65\nOUTB INC INPB\nOUTC INPC\n",
        CellConfig::default(),
    );
    c.state.feed(b"41 z");
    c.run(10_000);
    assert_eq!(c.state.take_output(), b"7\nA42\n ".to_vec());
}

#[test]
fn full_stack_drops_pushes_and_sets_overflow() {
    let mut c = cell(".prg 0\n:top\nPUSH 1\nJUMP @top\n", CellConfig::default());
    c.run(1000);
    assert_eq!(c.processor.sp(), 255);
    assert!(c.processor.status().contains(Status::STACK_OVERFLOW));
    assert!(!c.finished());
}

#[test]
fn echk_reports_high_energy_byte() {
    let mut c = cell(".prg 0\nECHK\n", CellConfig::default());
    c.step();
    // ECHK is charged before it reads the counter: 4095 >> 8.
    assert_eq!(c.processor.stack(), &[15]);
}

#[test]
fn snapshot_serializes_registers() {
    let mut c = cell(".prg 0\nPUSH 9\n", CellConfig::default());
    c.step();
    let snap = c.processor.snapshot();
    assert_eq!(snap.stack, vec![9]);
    assert_eq!(snap.resident_banks, vec![0]);
    let json = serde_json::to_string(&snap).unwrap();
    assert!(json.contains("\"pc\":2"));
}
