use std::collections::HashMap;
use std::fmt;

use crate::agent::Agent;
use crate::decoder::{Decoded, Decoder, Op};
use crate::processor::Processor;

/// Number of distinct opcode byte values.
pub const OPCODE_SPACE: usize = 256;
/// An arity-4 instruction already occupies 16 opcodes; nothing wider fits the variant scheme.
pub const MAX_ARITY: u8 = 4;

/// Semantic effect of an instruction over its resolved argument bytes.
pub type Action = fn(&mut Processor, &mut dyn Agent, &[u8]);

/// Static description of an instruction, before an opcode range is assigned.
#[derive(Clone, Copy)]
pub struct InstrDesc {
    pub op: Op,
    pub mnemonic: &'static str,
    pub arity: u8,
    /// Energy charged to the agent per execution when the processor is metered.
    pub cost: u16,
    pub action: Action,
}

/// A registered instruction with its assigned opcode range.
#[derive(Clone, Copy)]
pub struct Instruction {
    pub op: Op,
    pub mnemonic: &'static str,
    pub arity: u8,
    pub cost: u16,
    pub action: Action,
    base_opcode: u8,
}

impl Instruction {
    pub fn base_opcode(&self) -> u8 {
        self.base_opcode
    }

    /// Number of consecutive opcodes owned by this instruction (`2^arity`).
    pub fn range_size(&self) -> usize {
        1 << self.arity
    }

    /// Opcode for the given variant bits; bits above the arity are ignored.
    pub fn opcode(&self, variant: u8) -> u8 {
        let mask = (self.range_size() - 1) as u8;
        self.base_opcode + (variant & mask)
    }

    pub fn owns(&self, opcode: u8) -> bool {
        let base = self.base_opcode as usize;
        (base..base + self.range_size()).contains(&(opcode as usize))
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instruction")
            .field("op", &self.op)
            .field("mnemonic", &self.mnemonic)
            .field("arity", &self.arity)
            .field("cost", &self.cost)
            .field("base_opcode", &self.base_opcode)
            .finish()
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("opcode space exhausted: {mnemonic} needs {needed} opcodes but only {remaining} remain")]
    OpcodeSpaceExhausted {
        mnemonic: &'static str,
        needed: usize,
        remaining: usize,
    },
    #[error("{mnemonic} declares arity {arity}, the maximum is 4")]
    ArityTooLarge { mnemonic: &'static str, arity: u8 },
    #[error("mnemonic {0} is registered twice")]
    DuplicateMnemonic(&'static str),
    #[error("alias {alias} refers to unknown mnemonic {target}")]
    UnknownAliasTarget {
        alias: &'static str,
        target: &'static str,
    },
}

/// Collects instruction definitions in registration order.
///
/// Opcodes are only assigned by [`RegistryBuilder::finalize`], which consumes
/// the builder: a finalized registry can never grow.
#[derive(Default)]
pub struct RegistryBuilder {
    descs: Vec<InstrDesc>,
    aliases: Vec<(&'static str, &'static str)>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, desc: InstrDesc) -> &mut Self {
        self.descs.push(desc);
        self
    }

    pub fn register_all(&mut self, descs: &[InstrDesc]) -> &mut Self {
        self.descs.extend_from_slice(descs);
        self
    }

    /// Alternate spelling accepted by [`InstructionRegistry::lookup_by_mnemonic`].
    pub fn alias(&mut self, alias: &'static str, mnemonic: &'static str) -> &mut Self {
        self.aliases.push((alias, mnemonic));
        self
    }

    pub fn finalize(self) -> Result<InstructionRegistry, RegistryError> {
        let mut instructions = Vec::with_capacity(self.descs.len());
        let mut by_opcode = [None; OPCODE_SPACE];
        let mut by_mnemonic = HashMap::new();
        let mut next = 0usize;

        for desc in self.descs {
            if desc.arity > MAX_ARITY {
                return Err(RegistryError::ArityTooLarge {
                    mnemonic: desc.mnemonic,
                    arity: desc.arity,
                });
            }
            let needed = 1usize << desc.arity;
            let remaining = OPCODE_SPACE - next;
            if needed > remaining {
                return Err(RegistryError::OpcodeSpaceExhausted {
                    mnemonic: desc.mnemonic,
                    needed,
                    remaining,
                });
            }
            let index = instructions.len();
            if by_mnemonic.insert(desc.mnemonic, index).is_some() {
                return Err(RegistryError::DuplicateMnemonic(desc.mnemonic));
            }
            for slot in &mut by_opcode[next..next + needed] {
                *slot = Some(index);
            }
            instructions.push(Instruction {
                op: desc.op,
                mnemonic: desc.mnemonic,
                arity: desc.arity,
                cost: desc.cost,
                action: desc.action,
                base_opcode: next as u8,
            });
            next += needed;
        }

        for (alias, target) in self.aliases {
            let index = *by_mnemonic
                .get(target)
                .ok_or(RegistryError::UnknownAliasTarget { alias, target })?;
            if by_mnemonic.insert(alias, index).is_some() {
                return Err(RegistryError::DuplicateMnemonic(alias));
            }
        }

        tracing::debug!(
            instructions = instructions.len(),
            opcodes = next,
            "instruction registry finalized"
        );

        Ok(InstructionRegistry {
            instructions,
            by_opcode,
            by_mnemonic,
            opcodes_used: next,
        })
    }
}

/// Immutable opcode table shared by assemblers and processors.
pub struct InstructionRegistry {
    instructions: Vec<Instruction>,
    by_opcode: [Option<usize>; OPCODE_SPACE],
    by_mnemonic: HashMap<&'static str, usize>,
    opcodes_used: usize,
}

impl InstructionRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// The standard cell instruction set.
    pub fn standard() -> Result<Self, RegistryError> {
        let mut builder = RegistryBuilder::new();
        builder.register_all(crate::isa::cell8::TABLE);
        for &(alias, mnemonic) in crate::isa::cell8::ALIASES {
            builder.alias(alias, mnemonic);
        }
        builder.finalize()
    }

    pub fn lookup_by_opcode(&self, opcode: u8) -> Option<Decoded> {
        let instruction = self.instructions[self.by_opcode[opcode as usize]?];
        Some(Decoded {
            instruction,
            opcode,
            variant: opcode - instruction.base_opcode,
        })
    }

    pub fn lookup_by_mnemonic(&self, mnemonic: &str) -> Option<&Instruction> {
        self.by_mnemonic
            .get(mnemonic)
            .map(|&index| &self.instructions[index])
    }

    pub fn lookup_by_op(&self, op: Op) -> Option<&Instruction> {
        self.instructions.iter().find(|inst| inst.op == op)
    }

    /// Registered instructions in opcode order.
    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Opcodes claimed by registered instructions; the rest decode to nothing.
    pub fn opcodes_used(&self) -> usize {
        self.opcodes_used
    }
}

impl Decoder for InstructionRegistry {
    fn decode(&self, raw: u8) -> Option<Decoded> {
        self.lookup_by_opcode(raw)
    }
}

impl fmt::Debug for InstructionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstructionRegistry")
            .field("instructions", &self.instructions)
            .field("opcodes_used", &self.opcodes_used)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nothing(_: &mut Processor, _: &mut dyn Agent, _: &[u8]) {}

    fn desc(mnemonic: &'static str, arity: u8) -> InstrDesc {
        InstrDesc {
            op: Op::Nop,
            mnemonic,
            arity,
            cost: 1,
            action: nothing,
        }
    }

    #[test]
    fn assigns_contiguous_ranges_in_registration_order() {
        let mut b = RegistryBuilder::new();
        b.register(desc("A", 0)).register(desc("B", 2)).register(desc("C", 1));
        let reg = b.finalize().unwrap();
        assert_eq!(reg.lookup_by_mnemonic("A").unwrap().base_opcode(), 0);
        assert_eq!(reg.lookup_by_mnemonic("B").unwrap().base_opcode(), 1);
        assert_eq!(reg.lookup_by_mnemonic("C").unwrap().base_opcode(), 5);
        assert_eq!(reg.opcodes_used(), 7);
        assert!(reg.lookup_by_opcode(7).is_none());
    }

    #[test]
    fn exact_fit_is_accepted_and_overflow_rejected() {
        let mut b = RegistryBuilder::new();
        for name in ["W", "X", "Y", "Z"] {
            b.register(desc(name, 4));
        }
        let mut names = Vec::new();
        for i in 0..12 {
            names.push(Box::leak(format!("F{i}").into_boxed_str()) as &'static str);
        }
        for name in &names {
            b.register(desc(*name, 4));
        }
        let reg = b.finalize().unwrap();
        assert_eq!(reg.opcodes_used(), 256);
        assert_eq!(reg.lookup_by_opcode(255).unwrap().variant, 15);

        let mut b = RegistryBuilder::new();
        for name in &names {
            b.register(desc(*name, 4));
        }
        for name in ["W", "X", "Y", "Z"] {
            b.register(desc(name, 4));
        }
        b.register(desc("EXTRA", 0));
        let err = b.finalize().unwrap_err();
        assert_eq!(
            err,
            RegistryError::OpcodeSpaceExhausted {
                mnemonic: "EXTRA",
                needed: 1,
                remaining: 0
            }
        );
    }

    #[test]
    fn rejects_wide_and_duplicate_definitions() {
        let mut b = RegistryBuilder::new();
        b.register(desc("WIDE", 5));
        assert!(matches!(
            b.finalize(),
            Err(RegistryError::ArityTooLarge { arity: 5, .. })
        ));

        let mut b = RegistryBuilder::new();
        b.register(desc("A", 0)).register(desc("A", 1));
        assert!(matches!(
            b.finalize(),
            Err(RegistryError::DuplicateMnemonic("A"))
        ));

        let mut b = RegistryBuilder::new();
        b.register(desc("A", 0)).alias("B", "MISSING");
        assert!(matches!(
            b.finalize(),
            Err(RegistryError::UnknownAliasTarget { .. })
        ));
    }
}
