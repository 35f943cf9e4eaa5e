use std::sync::Arc;

use cellvm_rs::{assemble, Cell, CellConfig, InstructionRegistry, Step};

fn cell(src: &str) -> Cell {
    let registry = Arc::new(InstructionRegistry::standard().unwrap());
    let banks = assemble(&registry, src).unwrap();
    Cell::with_program(registry, CellConfig::default(), &banks)
}

fn output(src: &str) -> String {
    let mut c = cell(src);
    c.run(100_000);
    assert!(c.finished());
    String::from_utf8(c.state.take_output()).unwrap()
}

#[test]
fn jump_skips_code() {
    assert_eq!(output(".prg 0\nJUMP @skip\nOUTB 1\n:skip\nOUTB 2\n"), "2\n");
}

#[test]
fn jpif_branches_on_nonzero() {
    assert_eq!(output(".prg 0\nJPIF 0 @end\nOUTB 1\n:end\nOUTB 2\n"), "1\n2\n");
    assert_eq!(output(".prg 0\nJPIF 7 @end\nOUTB 1\n:end\nOUTB 2\n"), "2\n");
    assert_eq!(output(".prg 0\nJIF 1 @end\nOUTB 1\n:end\nOUTB 2\n"), "2\n");
}

#[test]
fn counting_loop() {
    let src = "\
.prg 0
PUSH 0
:top
OUTB PEEK INC          ; n += 1, print it
JPIF LST 3 PEEK @top   ; again while n < 3
";
    let mut c = cell(src);
    c.run(100_000);
    assert_eq!(c.state.take_output(), b"1\n2\n3\n".to_vec());
    assert_eq!(c.processor.stack(), &[3]);
}

#[test]
fn computed_jump_target_from_stack() {
    assert_eq!(
        output(".prg 0\nJUMP ADD @base 2\n:base\nOUTB 1\nOUTB 2\n"),
        "2\n"
    );
}

#[test]
fn sleep_idles_before_the_next_instruction() {
    let mut c = cell(".prg 0\nSLP 2\nPUSH 1\n");
    assert!(matches!(c.step(), Step::Executed { .. }));
    assert_eq!(c.step(), Step::Slept);
    assert_eq!(c.step(), Step::Slept);
    assert!(c.processor.stack().is_empty());
    c.step();
    assert_eq!(c.processor.stack(), &[1]);
}

#[test]
fn jump_in_the_last_bytes_keeps_running() {
    let mut c = cell(".prg 0\n.org 254\nJUMP 0\n");
    for _ in 0..255 {
        c.step();
    }
    // The inline target at 255 wrapped PC, but the jump lands back in range.
    assert_eq!((c.processor.pi(), c.processor.pc()), (0, 0));
    assert!(!c.processor.end_of_program());
    c.run(5_000);
    assert!(!c.finished());
}

#[test]
fn inline_operand_past_the_bank_end_reads_zero() {
    let push = InstructionRegistry::standard()
        .unwrap()
        .lookup_by_mnemonic("PUSH")
        .unwrap()
        .opcode(1);
    let mut c = cell(&format!(".prg 0\n.org 255\n.dat {push}\n"));
    for _ in 0..255 {
        c.step();
    }
    assert_eq!(c.processor.pc(), 255);
    assert!(!c.finished());

    // The opcode at 255 still runs; its operand is past the end.
    assert!(matches!(c.step(), Step::Executed { .. }));
    assert_eq!(c.processor.stack(), &[0]);
    assert!(c.finished());
    assert!(c.processor.halted());
}
