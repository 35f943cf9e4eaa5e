pub mod agent;
pub mod assembler;
pub mod cell;
pub mod decoder;
pub mod disasm;
pub mod exec;
pub mod instructions;
pub mod memory;
pub mod processor;

pub mod isa {
    pub mod cell8; // standard cell instruction set
}

pub use agent::{Agent, IoFormat};
pub use assembler::{assemble, AssembleError, Assembler};
pub use cell::{Cell, CellConfig, CellState};
pub use decoder::{Decoded, Decoder, Op};
pub use instructions::{InstrDesc, Instruction, InstructionRegistry, RegistryBuilder, RegistryError};
pub use memory::{BankSet, Memory};
pub use processor::{Processor, ProcessorConfig, Snapshot, Status, Step};
