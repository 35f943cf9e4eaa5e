use std::sync::Arc;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::decoder::{Decoder, Op};
use crate::instructions::{InstructionRegistry, MAX_ARITY};
use crate::memory::{BankSet, Memory};

pub const STACK_SIZE: usize = 256;
/// Deepest the stack may grow, so that `SP` and `SM` always fit in one byte.
pub const STACK_LIMIT: u8 = u8::MAX;
/// Bytes a call pushes: return `PC`, return `PI`, caller `SM`.
pub const FRAME_HEADER: u8 = 3;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Charge each instruction's cost to the agent before executing it.
    pub metered: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self { metered: true }
    }
}

bitflags! {
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status: u8 {
const END_OF_PROGRAM = 1 << 0; // PC ran off the active bank, or the bank is absent
const HALTED = 1 << 1;         // returned from the root frame; permanent until reload
const STACK_OVERFLOW = 1 << 2; // sticky: a push or call was dropped on a full stack
}
}

/// What a single call to [`Processor::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Already at end of program; nothing happened.
    Idle,
    /// Counted down a `SLP` delay.
    Slept,
    /// Read a byte no instruction is registered for.
    Unassigned { opcode: u8 },
    Executed { op: Op, opcode: u8 },
}

/// Serializable view of a processor's registers and live stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub pi: u8,
    pub pc: u8,
    pub sp: u8,
    pub sm: u8,
    pub status: Status,
    pub sleep: u8,
    pub stack: Vec<u8>,
    pub resident_banks: Vec<u8>,
}

/// Banked 8-bit stack machine.
///
/// Calls and operands share one stack. A call pushes its return `PC`, `PI` and
/// the caller's `SM`, then marks the new frame at the current `SP`; pops never
/// cross that mark, so a callee cannot see or destroy its caller's values.
#[derive(Debug, Clone)]
pub struct Processor {
    pi: u8,
    pc: u8,
    sp: u8,
    sm: u8,
    status: Status,
    sleep: u8,
    stack: [u8; STACK_SIZE],
    memory: Memory,
    registry: Arc<InstructionRegistry>,
    cfg: ProcessorConfig,
}

impl Processor {
    pub fn new(registry: Arc<InstructionRegistry>) -> Self {
        Self::with_config(registry, ProcessorConfig::default())
    }

    /// Nothing is loaded yet, so the processor starts halted.
    pub fn with_config(registry: Arc<InstructionRegistry>, cfg: ProcessorConfig) -> Self {
        Self {
            pi: 0,
            pc: 0,
            sp: 0,
            sm: 0,
            status: Status::END_OF_PROGRAM | Status::HALTED,
            sleep: 0,
            stack: [0; STACK_SIZE],
            memory: Memory::new(),
            registry,
            cfg,
        }
    }

    /// Installs `banks` and restarts at bank 0, offset 0 with an empty stack.
    pub fn load(&mut self, banks: &BankSet) {
        self.memory.load(banks);
        self.pi = 0;
        self.pc = 0;
        self.sp = 0;
        self.sm = 0;
        self.sleep = 0;
        self.stack = [0; STACK_SIZE];
        self.status = if self.memory.is_present(0) {
            Status::empty()
        } else {
            Status::END_OF_PROGRAM | Status::HALTED
        };
        tracing::debug!(banks = banks.len(), halted = self.halted(), "program loaded");
    }

    pub fn pi(&self) -> u8 {
        self.pi
    }

    pub fn pc(&self) -> u8 {
        self.pc
    }

    pub fn sp(&self) -> u8 {
        self.sp
    }

    pub fn sm(&self) -> u8 {
        self.sm
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.cfg
    }

    pub fn registry(&self) -> &Arc<InstructionRegistry> {
        &self.registry
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn end_of_program(&self) -> bool {
        self.status.contains(Status::END_OF_PROGRAM)
    }

    pub fn halted(&self) -> bool {
        self.status.contains(Status::HALTED)
    }

    /// Whole live stack, bottom first, across all frames.
    pub fn stack(&self) -> &[u8] {
        &self.stack[..self.sp as usize]
    }

    /// Values pushed in the active frame, bottom first.
    pub fn frame(&self) -> &[u8] {
        &self.stack[self.sm as usize..self.sp as usize]
    }

    /// Executes at most one instruction.
    pub fn step(&mut self, agent: &mut dyn Agent) -> Step {
        if self.end_of_program() {
            return Step::Idle;
        }
        if self.sleep > 0 {
            self.sleep -= 1;
            return Step::Slept;
        }

        let (pi, pc) = (self.pi, self.pc);
        let opcode = self.fetch();
        let step = match self.registry.decode(opcode) {
            None => {
                tracing::trace!(pi, pc, opcode, "unassigned opcode");
                Step::Unassigned { opcode }
            }
            Some(decoded) => {
                let mut args = [0u8; MAX_ARITY as usize];
                for (slot, inline) in decoded.inline_slots().enumerate() {
                    args[slot] = if inline { self.fetch() } else { self.pop() };
                }
                let args = &args[..decoded.arity()];
                let instruction = decoded.instruction;
                tracing::trace!(pi, pc, opcode, mnemonic = instruction.mnemonic, ?args, "step");
                if self.cfg.metered {
                    agent.spend(instruction.cost);
                }
                (instruction.action)(self, agent, args);
                Step::Executed {
                    op: instruction.op,
                    opcode,
                }
            }
        };

        while self.end_of_program() && !self.halted() {
            self.ret();
        }
        step
    }

    /// Steps until the processor halts or `max_steps` steps have run.
    /// Returns the number of steps taken.
    pub fn run(&mut self, agent: &mut dyn Agent, max_steps: usize) -> usize {
        let mut steps = 0;
        while steps < max_steps && !self.end_of_program() {
            self.step(agent);
            steps += 1;
        }
        steps
    }

    /// Reads the byte at `PC` and advances. Past the last byte of the bank
    /// this yields zero without moving.
    fn fetch(&mut self) -> u8 {
        if self.end_of_program() {
            return 0;
        }
        let byte = self.memory.read(self.pi, self.pc);
        let (next, wrapped) = self.pc.overflowing_add(1);
        self.pc = next;
        if wrapped {
            self.status.insert(Status::END_OF_PROGRAM);
        }
        byte
    }

    pub fn push(&mut self, value: u8) {
        if self.sp == STACK_LIMIT {
            self.overflow("push");
            return;
        }
        self.stack[self.sp as usize] = value;
        self.sp += 1;
    }

    /// Pops from the active frame. An empty frame yields zero and pins `SP` at `SM`.
    pub fn pop(&mut self) -> u8 {
        if self.sp <= self.sm {
            self.sp = self.sm;
            return 0;
        }
        self.sp -= 1;
        self.stack[self.sp as usize]
    }

    /// Value `depth` entries below the top of the active frame, or zero.
    pub fn peek(&self, depth: u8) -> u8 {
        let live = self.sp - self.sm;
        if depth >= live {
            return 0;
        }
        self.stack[(self.sp - 1 - depth) as usize]
    }

    fn pop_raw(&mut self) -> u8 {
        self.sp = self.sp.saturating_sub(1);
        self.stack[self.sp as usize]
    }

    fn overflow(&mut self, what: &'static str) {
        self.status.insert(Status::STACK_OVERFLOW);
        tracing::warn!(pi = self.pi, pc = self.pc, what, "stack overflow, dropped");
    }

    fn enter(&mut self, bank: u8, offset: u8) {
        self.pi = bank;
        self.pc = offset;
        self.status
            .set(Status::END_OF_PROGRAM, !self.memory.is_present(bank));
    }

    pub fn jump(&mut self, offset: u8) {
        self.pc = offset;
        self.status.remove(Status::END_OF_PROGRAM);
    }

    /// Opens a frame and enters `bank` at offset 0. Refused when the stack
    /// cannot hold the frame header.
    pub fn call(&mut self, bank: u8) {
        if STACK_LIMIT - self.sp < FRAME_HEADER {
            self.overflow("call");
            return;
        }
        let (pc, pi, sm) = (self.pc, self.pi, self.sm);
        self.push(pc);
        self.push(pi);
        self.push(sm);
        self.sm = self.sp;
        tracing::debug!(from = pi, to = bank, mark = self.sm, "call");
        self.enter(bank, 0);
    }

    /// Leaves the active frame; from the root frame this halts the processor.
    pub fn ret(&mut self) {
        if self.sm == 0 {
            self.status
                .insert(Status::END_OF_PROGRAM | Status::HALTED);
            tracing::debug!(pi = self.pi, pc = self.pc, "halted");
            return;
        }
        self.sp = self.sm;
        let sm = self.pop_raw();
        let pi = self.pop_raw();
        let pc = self.pop_raw();
        self.sm = sm;
        tracing::debug!(from = self.pi, to = pi, pc, "return");
        self.enter(pi, pc);
        // A fetch always leaves PC above 0 unless it wrapped, so a saved 0
        // means the caller had already run off its bank.
        if pc == 0 {
            self.status.insert(Status::END_OF_PROGRAM);
        }
    }

    /// Idles the next `ticks` steps.
    pub fn sleep(&mut self, ticks: u8) {
        self.sleep = ticks;
    }

    pub fn local_load(&self, offset: u8) -> u8 {
        self.remote_load(self.pi, offset)
    }

    pub fn local_store(&mut self, offset: u8, value: u8) {
        self.remote_store(self.pi, offset, value);
    }

    pub fn remote_load(&self, bank: u8, offset: u8) -> u8 {
        self.memory.read(bank, offset)
    }

    pub fn remote_store(&mut self, bank: u8, offset: u8, value: u8) {
        self.memory.write(bank, offset, value);
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            pi: self.pi,
            pc: self.pc,
            sp: self.sp,
            sm: self.sm,
            status: self.status,
            sleep: self.sleep,
            stack: self.stack().to_vec(),
            resident_banks: self.memory.resident().collect(),
        }
    }
}
