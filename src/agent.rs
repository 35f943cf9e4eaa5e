use serde::{Deserialize, Serialize};

/// How an I/O instruction interprets its byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IoFormat {
    /// A number, written or read in decimal.
    Byte,
    /// A raw character code.
    Char,
}

/// Capabilities the instruction set reaches through to the owning agent.
///
/// `hectant` arguments select one of the directions around the agent. The
/// sensor and actuator hooks default to doing nothing: their effect belongs to
/// the environment the agent lives in, not to the processor. A sensor that
/// returns `None` pushes nothing.
pub trait Agent {
    fn energy(&self) -> u16;
    fn spend(&mut self, amount: u16);

    fn output(&mut self, _value: u8, _format: IoFormat) {}
    fn input(&mut self, _format: IoFormat) -> u8 {
        0
    }

    fn scan(&mut self, _hectant: u8) -> Option<u8> {
        None
    }
    fn link_check(&mut self, _hectant: u8) -> Option<u8> {
        None
    }
    fn link(&mut self, _hectant: u8) {}
    fn message_check(&mut self, _hectant: u8) -> Option<u8> {
        None
    }
    fn message_get(&mut self, _hectant: u8) -> Option<u8> {
        None
    }
    fn message_send(&mut self, _hectant: u8, _message: u8) {}
    fn give_energy(&mut self, _hectant: u8, _amount: u8) {}
    fn jet(&mut self, _hectant: u8, _power: u8) {}
    fn duplicate(&mut self, _hectant: u8) {}
}
