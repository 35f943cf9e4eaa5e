use serde::Serialize;

use crate::decoder::{Decoded, Decoder};

/// `MNEMONIC a0 a1 ...` in slot order: `$XX` for an inline literal, `_` for a
/// value taken from the stack.
pub fn fmt_decoded(d: &Decoded, inline: &[u8]) -> String {
    let mut text = d.instruction.mnemonic.to_string();
    let mut literals = inline.iter();
    for is_inline in d.inline_slots() {
        let literal = if is_inline { literals.next() } else { None };
        match literal {
            Some(byte) => text.push_str(&format!(" ${byte:02X}")),
            None => text.push_str(" _"),
        }
    }
    text
}

/// One decoded item of a bank listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Line {
    pub offset: u8,
    pub bytes: Vec<u8>,
    pub text: String,
}

/// Linear sweep over one bank. Bytes no instruction owns are listed as `.dat`.
/// Inline operands past the end of `bank` read as zero, as they do on the processor.
pub fn disassemble(decoder: &dyn Decoder, bank: &[u8]) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut pos = 0usize;
    while pos < bank.len() {
        let raw = bank[pos];
        let line = match decoder.decode(raw) {
            None => Line {
                offset: pos as u8,
                bytes: vec![raw],
                text: format!(".dat ${raw:02X}"),
            },
            Some(d) => {
                let inline: Vec<u8> = (1..=d.inline_len())
                    .map(|i| bank.get(pos + i).copied().unwrap_or(0))
                    .collect();
                let mut bytes = vec![raw];
                bytes.extend_from_slice(&inline);
                Line {
                    offset: pos as u8,
                    text: fmt_decoded(&d, &inline),
                    bytes,
                }
            }
        };
        pos += line.bytes.len();
        lines.push(line);
    }
    lines
}
