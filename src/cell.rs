use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agent::{Agent, IoFormat};
use crate::instructions::InstructionRegistry;
use crate::memory::BankSet;
use crate::processor::{Processor, ProcessorConfig, Step};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CellConfig {
    pub starting_energy: u16,
    /// Upper bound on processor steps per simulation tick.
    pub steps_per_tick: u32,
    pub processor: ProcessorConfig,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            starting_energy: 4096,
            steps_per_tick: 1,
            processor: ProcessorConfig::default(),
        }
    }
}

/// Everything about a cell the processor can reach through [`Agent`].
#[derive(Debug, Clone, Default)]
pub struct CellState {
    pub energy: u16,
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl CellState {
    pub fn new(energy: u16) -> Self {
        Self {
            energy,
            ..Self::default()
        }
    }

    /// Queues bytes for `INPB` / `INPC`.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.input.extend(bytes);
    }

    /// Drains what `OUTB` / `OUTC` have written so far.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    pub fn written(&self) -> &[u8] {
        &self.output
    }

    fn read_number(&mut self) -> u8 {
        while self.input.front().is_some_and(|b| b.is_ascii_whitespace()) {
            self.input.pop_front();
        }
        let mut value: u8 = 0;
        while let Some(digit) = self.input.front().filter(|b| b.is_ascii_digit()).copied() {
            self.input.pop_front();
            value = value.saturating_mul(10).saturating_add(digit - b'0');
        }
        value
    }
}

impl Agent for CellState {
    fn energy(&self) -> u16 {
        self.energy
    }

    fn spend(&mut self, amount: u16) {
        self.energy = self.energy.saturating_sub(amount);
    }

    fn output(&mut self, value: u8, format: IoFormat) {
        match format {
            IoFormat::Byte => {
                self.output.extend_from_slice(value.to_string().as_bytes());
                self.output.push(b'\n');
            }
            IoFormat::Char => self.output.push(value),
        }
        tracing::debug!(value, ?format, "cell output");
    }

    fn input(&mut self, format: IoFormat) -> u8 {
        match format {
            IoFormat::Byte => self.read_number(),
            IoFormat::Char => self.input.pop_front().unwrap_or(0),
        }
    }
}

/// A simulated cell: its state plus the processor that drives it.
#[derive(Debug, Clone)]
pub struct Cell {
    pub state: CellState,
    pub processor: Processor,
    cfg: CellConfig,
}

impl Cell {
    pub fn new(registry: Arc<InstructionRegistry>, cfg: CellConfig) -> Self {
        Self {
            state: CellState::new(cfg.starting_energy),
            processor: Processor::with_config(registry, cfg.processor),
            cfg,
        }
    }

    /// A cell running `banks` from bank 0.
    pub fn with_program(
        registry: Arc<InstructionRegistry>,
        cfg: CellConfig,
        banks: &BankSet,
    ) -> Self {
        let mut cell = Self::new(registry, cfg);
        cell.processor.load(banks);
        cell
    }

    pub fn config(&self) -> &CellConfig {
        &self.cfg
    }

    pub fn step(&mut self) -> Step {
        self.processor.step(&mut self.state)
    }

    /// One simulation tick: up to `steps_per_tick` processor steps.
    pub fn tick(&mut self) -> usize {
        self.processor
            .run(&mut self.state, self.cfg.steps_per_tick as usize)
    }

    pub fn run(&mut self, max_steps: usize) -> usize {
        self.processor.run(&mut self.state, max_steps)
    }

    pub fn finished(&self) -> bool {
        self.processor.end_of_program()
    }
}
