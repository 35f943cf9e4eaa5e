//! The standard cell instruction set.
//!
//! Registration order is the opcode assignment: each entry takes the next
//! `2^arity` opcodes. Reordering this table invalidates every compiled bank.
//!
//! | Opcodes | Arity | Mnemonics |
//! |---------|-------|-----------|
//! | 0..=6 | 0 | NOP POP PEEK RTN ECHK INPB INPC |
//! | 7..=42 | 1 | PUSH COPY LLOD JUMP CALL INC DEC NEG NOT SLP SCAN LCHK LINK MCHK MGET DUP OUTB OUTC |
//! | 43..=122 | 2 | LSTO JPIF AND OR XOR ADD SUB MUL DIV LSFT LLOP RSFT RLOP EQUL GRT LST EGIV JET MSND RLOD |
//! | 123..=130 | 3 | RSTO |
//!
//! `RLOD` takes two arguments (bank, offset) and so sits with the arity-2
//! group; it only reads, where `RSTO` also needs the value to store.

use crate::decoder::Op;
use crate::exec;
use crate::instructions::InstrDesc;

const fn inst(
    op: Op,
    mnemonic: &'static str,
    arity: u8,
    cost: u16,
    action: crate::instructions::Action,
) -> InstrDesc {
    InstrDesc {
        op,
        mnemonic,
        arity,
        cost,
        action,
    }
}

const SENSE: u16 = 2;
const ACT: u16 = 4;

pub const TABLE: &[InstrDesc] = &[
    inst(Op::Nop, "NOP", 0, 1, exec::nop),
    inst(Op::Pop, "POP", 0, 1, exec::pop),
    inst(Op::Peek, "PEEK", 0, 1, exec::peek),
    inst(Op::Rtn, "RTN", 0, 1, exec::rtn),
    inst(Op::Echk, "ECHK", 0, 1, exec::echk),
    inst(Op::Inpb, "INPB", 0, 1, exec::inpb),
    inst(Op::Inpc, "INPC", 0, 1, exec::inpc),
    inst(Op::Push, "PUSH", 1, 1, exec::push),
    inst(Op::Copy, "COPY", 1, 1, exec::copy),
    inst(Op::Llod, "LLOD", 1, 1, exec::llod),
    inst(Op::Jump, "JUMP", 1, 1, exec::jump),
    inst(Op::Call, "CALL", 1, 1, exec::call),
    inst(Op::Inc, "INC", 1, 1, exec::inc),
    inst(Op::Dec, "DEC", 1, 1, exec::dec),
    inst(Op::Neg, "NEG", 1, 1, exec::neg),
    inst(Op::Not, "NOT", 1, 1, exec::not),
    inst(Op::Slp, "SLP", 1, 1, exec::slp),
    inst(Op::Scan, "SCAN", 1, SENSE, exec::scan),
    inst(Op::Lchk, "LCHK", 1, SENSE, exec::lchk),
    inst(Op::Link, "LINK", 1, ACT, exec::link),
    inst(Op::Mchk, "MCHK", 1, SENSE, exec::mchk),
    inst(Op::Mget, "MGET", 1, SENSE, exec::mget),
    inst(Op::Dup, "DUP", 1, 4 * ACT, exec::dup),
    inst(Op::Outb, "OUTB", 1, 1, exec::outb),
    inst(Op::Outc, "OUTC", 1, 1, exec::outc),
    inst(Op::Lsto, "LSTO", 2, 1, exec::lsto),
    inst(Op::Jpif, "JPIF", 2, 1, exec::jpif),
    inst(Op::And, "AND", 2, 1, exec::and),
    inst(Op::Or, "OR", 2, 1, exec::or),
    inst(Op::Xor, "XOR", 2, 1, exec::xor),
    inst(Op::Add, "ADD", 2, 1, exec::add),
    inst(Op::Sub, "SUB", 2, 1, exec::sub),
    inst(Op::Mul, "MUL", 2, 1, exec::mul),
    inst(Op::Div, "DIV", 2, 1, exec::div),
    inst(Op::Lsft, "LSFT", 2, 1, exec::lsft),
    inst(Op::Llop, "LLOP", 2, 1, exec::llop),
    inst(Op::Rsft, "RSFT", 2, 1, exec::rsft),
    inst(Op::Rlop, "RLOP", 2, 1, exec::rlop),
    inst(Op::Equl, "EQUL", 2, 1, exec::equl),
    inst(Op::Grt, "GRT", 2, 1, exec::grt),
    inst(Op::Lst, "LST", 2, 1, exec::lst),
    inst(Op::Egiv, "EGIV", 2, ACT, exec::egiv),
    inst(Op::Jet, "JET", 2, ACT, exec::jet),
    inst(Op::Msnd, "MSND", 2, ACT, exec::msnd),
    inst(Op::Rlod, "RLOD", 2, 1, exec::rlod),
    inst(Op::Rsto, "RSTO", 3, 1, exec::rsto),
];

/// Alternate spellings accepted by the assembler.
pub const ALIASES: &[(&str, &str)] = &[
    ("JIF", "JPIF"),
    ("SHIFTL", "LSFT"),
    ("LOOPL", "LLOP"),
    ("SHIFTR", "RSFT"),
    ("LOOPR", "RLOP"),
    ("GREATER", "GRT"),
    ("LESS", "LST"),
];
