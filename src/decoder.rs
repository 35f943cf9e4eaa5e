use bitvec::prelude::*;
use serde::{Deserialize, Serialize};

use crate::instructions::Instruction;

/// Instruction kinds known to the standard catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    // Stack-only
    Nop,
    Pop,
    Peek,
    Rtn,
    Echk,
    Inpb,
    Inpc,
    // Single operand
    Push,
    Copy,
    Llod,
    Jump,
    Call,
    Inc,
    Dec,
    Neg,
    Not,
    Slp,
    Scan,
    Lchk,
    Link,
    Mchk,
    Mget,
    Dup,
    Outb,
    Outc,
    // Two operands
    Lsto,
    Jpif,
    And,
    Or,
    Xor,
    Add,
    Sub,
    Mul,
    Div,
    Lsft,
    Llop,
    Rsft,
    Rlop,
    Equl,
    Grt,
    Lst,
    Egiv,
    Jet,
    Msnd,
    Rlod,
    // Three operands
    Rsto,
}

/// A raw opcode byte split into its instruction and variant bits.
#[derive(Debug, Clone, Copy)]
pub struct Decoded {
    pub instruction: Instruction,
    pub opcode: u8,
    pub variant: u8,
}

impl Decoded {
    pub fn op(&self) -> Op {
        self.instruction.op
    }

    pub fn arity(&self) -> usize {
        self.instruction.arity as usize
    }

    /// One entry per argument slot: `true` when the slot is an inline literal.
    pub fn inline_slots(&self) -> impl Iterator<Item = bool> + '_ {
        self.variant
            .view_bits::<Lsb0>()
            .iter()
            .by_vals()
            .take(self.arity())
    }

    /// Number of literal bytes that follow the opcode in the byte stream.
    pub fn inline_len(&self) -> usize {
        self.inline_slots().filter(|inline| *inline).count()
    }

    /// Total encoded width: opcode plus inline operands.
    pub fn width(&self) -> usize {
        1 + self.inline_len()
    }
}

pub trait Decoder {
    fn decode(&self, raw: u8) -> Option<Decoded>;
}
