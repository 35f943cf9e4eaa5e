use std::collections::{BTreeSet, HashMap, VecDeque};
use serde::Serialize;

use cellvm_rs::decoder::{Decoder, Op};

use crate::model::{read_u8, Image};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind { Fallthrough, Jump, CondJump, Call, DataRef }

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Loc { pub bank: u8, pub offset: u8 }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Edge { pub from: Loc, pub to: Loc, pub kind: EdgeKind }

#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub visited: BTreeSet<Loc>,
    /// Encoded width of every decoded location.
    pub widths: HashMap<Loc, u8>,
    pub edges: Vec<Edge>,
    pub returns: BTreeSet<Loc>,
    /// Jumps and calls whose target comes off the stack.
    pub dynamic: BTreeSet<Loc>,
    /// Banks entered through inline calls, plus the entry bank.
    pub banks: BTreeSet<u8>,
    /// Banks called inline but not present in the image.
    pub missing: BTreeSet<u8>,
}

/// Recursive descent from offset 0 of `entry`, following only targets that are
/// encoded as inline literals.
pub fn analyze_entry(img: &Image, dec: &dyn Decoder, entry: u8, max_instr: usize) -> Analysis {
    let mut a = Analysis::default();
    let mut queue: VecDeque<Loc> = VecDeque::new();
    if img.has_bank(entry) {
        a.banks.insert(entry);
        queue.push_back(Loc { bank: entry, offset: 0 });
    } else {
        a.missing.insert(entry);
    }

    let mut steps = 0usize;
    while let Some(pc) = queue.pop_front() {
        if steps >= max_instr { break; }
        if !a.visited.insert(pc) { continue; }
        let Some(raw) = read_u8(img, pc.bank, pc.offset) else { continue; };
        steps += 1;

        let Some(d) = dec.decode(raw) else {
            // Unassigned bytes execute as nothing.
            a.widths.insert(pc, 1);
            fallthrough(&mut a, &mut queue, pc, 1);
            continue;
        };
        let width = d.width();
        a.widths.insert(pc, width as u8);

        // Slot values known statically: inline literals only.
        let mut slots = [None; 4];
        let mut next_inline = 1usize;
        for (slot, inline) in d.inline_slots().enumerate() {
            if inline {
                let offset = pc.offset as usize + next_inline;
                slots[slot] = Some(u8::try_from(offset).ok().and_then(|o| read_u8(img, pc.bank, o)).unwrap_or(0));
                next_inline += 1;
            }
        }

        match d.op() {
            Op::Jump => match slots[0] {
                Some(t) => branch(&mut a, &mut queue, pc, Loc { bank: pc.bank, offset: t }, EdgeKind::Jump),
                None => { a.dynamic.insert(pc); }
            },
            Op::Jpif => {
                match slots[1] {
                    Some(t) => branch(&mut a, &mut queue, pc, Loc { bank: pc.bank, offset: t }, EdgeKind::CondJump),
                    None => { a.dynamic.insert(pc); }
                }
                fallthrough(&mut a, &mut queue, pc, width);
            }
            Op::Call => {
                match slots[0] {
                    Some(bank) => {
                        let to = Loc { bank, offset: 0 };
                        a.edges.push(Edge { from: pc, to, kind: EdgeKind::Call });
                        if img.has_bank(bank) {
                            a.banks.insert(bank);
                            queue.push_back(to);
                        } else {
                            a.missing.insert(bank);
                        }
                    }
                    None => { a.dynamic.insert(pc); }
                }
                fallthrough(&mut a, &mut queue, pc, width);
            }
            Op::Rlod | Op::Rsto => {
                if let Some(bank) = slots[0] {
                    let to = Loc { bank, offset: slots[1].unwrap_or(0) };
                    a.edges.push(Edge { from: pc, to, kind: EdgeKind::DataRef });
                }
                fallthrough(&mut a, &mut queue, pc, width);
            }
            Op::Rtn => { a.returns.insert(pc); }
            _ => fallthrough(&mut a, &mut queue, pc, width),
        }
    }
    a
}

fn branch(a: &mut Analysis, queue: &mut VecDeque<Loc>, from: Loc, to: Loc, kind: EdgeKind) {
    a.edges.push(Edge { from, to, kind });
    if !a.visited.contains(&to) { queue.push_back(to); }
}

/// Running off the end of a bank returns, so there is no fallthrough past offset 255.
fn fallthrough(a: &mut Analysis, queue: &mut VecDeque<Loc>, pc: Loc, width: usize) {
    let Ok(next) = u8::try_from(pc.offset as usize + width) else { return; };
    let to = Loc { bank: pc.bank, offset: next };
    if a.visited.contains(&to) { return; }
    a.edges.push(Edge { from: pc, to, kind: EdgeKind::Fallthrough });
    queue.push_back(to);
}

/// `[start, end)` byte range of straight-line code within one bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Block { pub bank: u8, pub start: u8, pub end: u16 }

/// Splits visited code into blocks at bank entries, branch targets, returns
/// and unconditional jumps.
pub fn blocks(a: &Analysis) -> Vec<Block> {
    let mut starts: BTreeSet<Loc> = a.banks.iter().map(|&bank| Loc { bank, offset: 0 }).collect();
    for e in &a.edges {
        if !matches!(e.kind, EdgeKind::Fallthrough | EdgeKind::DataRef) { starts.insert(e.to); }
    }
    let ends_block = |pc: Loc| {
        a.returns.contains(&pc)
            || a.edges.iter().any(|e| e.from == pc && e.kind == EdgeKind::Jump)
            || (a.dynamic.contains(&pc) && !a.edges.iter().any(|e| e.from == pc && e.kind == EdgeKind::Fallthrough))
    };

    let mut out = Vec::new();
    for &start in &starts {
        if !a.widths.contains_key(&start) { continue; }
        let mut cur = start;
        loop {
            let Some(&w) = a.widths.get(&cur) else { break };
            let end = cur.offset as u16 + w as u16;
            let next = u8::try_from(end).ok().map(|offset| Loc { bank: cur.bank, offset });
            let stop = ends_block(cur)
                || next.map_or(true, |n| !a.widths.contains_key(&n) || starts.contains(&n));
            if stop {
                out.push(Block { bank: start.bank, start: start.offset, end });
                break;
            }
            if let Some(n) = next { cur = n; }
        }
    }
    out
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockOut { pub bank: u8, pub start: u8, pub end: u16, pub insns: Vec<String> }

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub entry: u8,
    pub banks: Vec<u8>,
    pub missing_banks: Vec<u8>,
    pub blocks: Vec<BlockOut>,
    pub edges: Vec<Edge>,
    pub dynamic: Vec<Loc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use cellvm_rs::{assemble, InstructionRegistry};

    fn image(src: &str) -> (InstructionRegistry, Image) {
        let reg = InstructionRegistry::standard().unwrap();
        let banks = assemble(&reg, src).unwrap();
        (reg, Image { stem: "t".into(), banks })
    }

    #[test]
    fn inline_call_reaches_bank_and_reports_missing() {
        let (reg, img) = image(".prg 0\nCALL 3\nCALL 9\nRTN\n.prg 3 helper\nOUTB 1\n");
        let a = analyze_entry(&img, &reg, 0, 1000);
        assert!(a.banks.contains(&3));
        assert!(a.missing.contains(&9));
        assert!(a.edges.iter().any(|e| e.kind == EdgeKind::Call && e.to == Loc { bank: 3, offset: 0 }));
        assert!(a.visited.contains(&Loc { bank: 3, offset: 0 }));
        assert_eq!(a.returns.len(), 1);
    }

    #[test]
    fn loop_jump_splits_blocks() {
        let (reg, img) = image(".prg 0\nPUSH 0\n:top\nINC\nJPIF 1 @top\nJUMP @top\n");
        let a = analyze_entry(&img, &reg, 0, 1000);
        assert!(a.edges.iter().any(|e| e.kind == EdgeKind::CondJump && e.to == Loc { bank: 0, offset: 2 }));
        assert!(a.edges.iter().any(|e| e.kind == EdgeKind::Jump && e.to == Loc { bank: 0, offset: 2 }));
        let b = blocks(&a);
        assert_eq!(b[0], Block { bank: 0, start: 0, end: 2 });
        assert!(b.iter().any(|blk| blk.start == 2));
    }

    #[test]
    fn stack_targets_are_dynamic() {
        let (reg, img) = image(".prg 0\nPUSH 4\nJUMP\n");
        let a = analyze_entry(&img, &reg, 0, 1000);
        assert_eq!(a.dynamic.len(), 1);
    }
}
