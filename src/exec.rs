//! Instruction actions.
//!
//! Every action receives its arguments already resolved: `args[0]` is slot 0,
//! which for a stack-bound operand is the value that was on top of the stack.
//! Binary arithmetic takes its left operand from `args[1]` and its right
//! operand from `args[0]`, so `PUSH 5 PUSH 2 SUB` leaves 3.

use crate::agent::{Agent, IoFormat};
use crate::processor::Processor;

fn flag(value: bool) -> u8 {
    if value {
        0x01
    } else {
        0x00
    }
}

fn binary(p: &mut Processor, args: &[u8], f: impl Fn(u8, u8) -> u8) {
    p.push(f(args[1], args[0]));
}

fn unary(p: &mut Processor, args: &[u8], f: impl Fn(u8) -> u8) {
    p.push(f(args[0]));
}

fn push_some(p: &mut Processor, value: Option<u8>) {
    if let Some(value) = value {
        p.push(value);
    }
}

// Stack and control

pub fn nop(_: &mut Processor, _: &mut dyn Agent, _: &[u8]) {}

pub fn pop(p: &mut Processor, _: &mut dyn Agent, _: &[u8]) {
    p.pop();
}

pub fn peek(p: &mut Processor, _: &mut dyn Agent, _: &[u8]) {
    let top = p.peek(0);
    p.push(top);
}

pub fn rtn(p: &mut Processor, _: &mut dyn Agent, _: &[u8]) {
    p.ret();
}

pub fn push(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    p.push(args[0]);
}

pub fn copy(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    let value = p.peek(args[0]);
    p.push(value);
}

pub fn jump(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    p.jump(args[0]);
}

pub fn jpif(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    if args[0] != 0x00 {
        p.jump(args[1]);
    }
}

pub fn call(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    p.call(args[0]);
}

pub fn slp(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    p.sleep(args[0]);
}

// Memory

pub fn llod(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    let value = p.local_load(args[0]);
    p.push(value);
}

pub fn lsto(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    p.local_store(args[0], args[1]);
}

pub fn rlod(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    let value = p.remote_load(args[0], args[1]);
    p.push(value);
}

pub fn rsto(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    p.remote_store(args[0], args[1], args[2]);
}

// Arithmetic and logic

pub fn inc(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    unary(p, args, |v| v.wrapping_add(1));
}

pub fn dec(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    unary(p, args, |v| v.wrapping_sub(1));
}

pub fn neg(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    unary(p, args, u8::wrapping_neg);
}

pub fn not(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    unary(p, args, |v| !v);
}

pub fn and(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    binary(p, args, |a, b| a & b);
}

pub fn or(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    binary(p, args, |a, b| a | b);
}

pub fn xor(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    binary(p, args, |a, b| a ^ b);
}

pub fn add(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    binary(p, args, u8::wrapping_add);
}

pub fn sub(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    binary(p, args, u8::wrapping_sub);
}

pub fn mul(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    binary(p, args, u8::wrapping_mul);
}

/// Division by zero yields zero.
pub fn div(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    binary(p, args, |a, b| a.checked_div(b).unwrap_or(0));
}

pub fn lsft(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    binary(p, args, |v, n| v << (n & 0x7));
}

pub fn rsft(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    binary(p, args, |v, n| v >> (n & 0x7));
}

pub fn llop(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    binary(p, args, |v, n| v.rotate_left(u32::from(n & 0x7)));
}

pub fn rlop(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    binary(p, args, |v, n| v.rotate_right(u32::from(n & 0x7)));
}

pub fn equl(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    binary(p, args, |a, b| flag(a == b));
}

pub fn grt(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    binary(p, args, |a, b| flag(a > b));
}

pub fn lst(p: &mut Processor, _: &mut dyn Agent, args: &[u8]) {
    binary(p, args, |a, b| flag(a < b));
}

// Agent I/O and energy

pub fn echk(p: &mut Processor, agent: &mut dyn Agent, _: &[u8]) {
    p.push((agent.energy() >> 8) as u8);
}

pub fn inpb(p: &mut Processor, agent: &mut dyn Agent, _: &[u8]) {
    let value = agent.input(IoFormat::Byte);
    p.push(value);
}

pub fn inpc(p: &mut Processor, agent: &mut dyn Agent, _: &[u8]) {
    let value = agent.input(IoFormat::Char);
    p.push(value);
}

pub fn outb(_: &mut Processor, agent: &mut dyn Agent, args: &[u8]) {
    agent.output(args[0], IoFormat::Byte);
}

pub fn outc(_: &mut Processor, agent: &mut dyn Agent, args: &[u8]) {
    agent.output(args[0], IoFormat::Char);
}

// Sensors and actuators; the environment decides what they do.

pub fn scan(p: &mut Processor, agent: &mut dyn Agent, args: &[u8]) {
    push_some(p, agent.scan(args[0]));
}

pub fn lchk(p: &mut Processor, agent: &mut dyn Agent, args: &[u8]) {
    push_some(p, agent.link_check(args[0]));
}

pub fn link(_: &mut Processor, agent: &mut dyn Agent, args: &[u8]) {
    agent.link(args[0]);
}

pub fn mchk(p: &mut Processor, agent: &mut dyn Agent, args: &[u8]) {
    push_some(p, agent.message_check(args[0]));
}

pub fn mget(p: &mut Processor, agent: &mut dyn Agent, args: &[u8]) {
    push_some(p, agent.message_get(args[0]));
}

pub fn msnd(_: &mut Processor, agent: &mut dyn Agent, args: &[u8]) {
    agent.message_send(args[0], args[1]);
}

pub fn egiv(_: &mut Processor, agent: &mut dyn Agent, args: &[u8]) {
    agent.give_energy(args[0], args[1]);
}

pub fn jet(_: &mut Processor, agent: &mut dyn Agent, args: &[u8]) {
    agent.jet(args[0], args[1]);
}

pub fn dup(_: &mut Processor, agent: &mut dyn Agent, args: &[u8]) {
    agent.duplicate(args[0]);
}
