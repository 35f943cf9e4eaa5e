//! Source text to bank bytes.
//!
//! # Syntax
//!
//! ```text
//! .prg 0 main        ; start bank 0, bind the constant `main` to 0
//! :loop              ; bank-local label at the current byte offset
//! OUTB INC 41        ; words are mnemonics or literals
//! JUMP @loop
//! ```
//!
//! - Literals are decimal (`42`), hex (`$2A`) or symbolic (`@name`), one byte each.
//! - A line is read right to left: `OUTB INC 41` becomes the postfix stream
//!   `41 INC OUTB`. An argument written as a literal is folded into the
//!   instruction that consumes it; an argument produced by a nested
//!   instruction is taken from the stack at run time.
//! - `.dat`, `.org` and `.str` place raw bytes.
//! - Comments start with `;`.

use std::collections::HashMap;

use bitvec::prelude::*;

use crate::instructions::{Instruction, InstructionRegistry};
use crate::memory::{BankSet, BANK_COUNT, BANK_SIZE};

const COMMENT_CHAR: char = ';';
const LABEL_PREFIX: char = ':';
const DIRECTIVE_PREFIX: char = '.';
const HEX_PREFIX: char = '$';
const SYMBOL_PREFIX: char = '@';

/// Assembly failure. Every variant carries the 1-based source line.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AssembleError {
    #[error("line {line}: invalid decimal literal `{text}`")]
    BadDecimal { line: usize, text: String },
    #[error("line {line}: invalid hex literal `{text}`")]
    BadHex { line: usize, text: String },
    #[error("line {line}: `{text}` is not a literal")]
    InvalidLiteral { line: usize, text: String },
    #[error("line {line}: symbol without a name")]
    EmptySymbol { line: usize },
    #[error("line {line}: unknown instruction `{text}`")]
    UnknownInstruction { line: usize, text: String },
    #[error("line {line}: bank {bank} has no label or constant named `{name}`")]
    UnresolvedName { line: usize, bank: u8, name: String },
    #[error("line {line}: bank {bank} exceeds {BANK_SIZE} bytes")]
    BankOverflow { line: usize, bank: u8 },
    #[error("line {line}: `.prg` needs a bank index")]
    MissingBankIndex { line: usize },
    #[error("line {line}: `{text}` is not a bank index")]
    InvalidBankIndex { line: usize, text: String },
    #[error("line {line}: bank {bank} is declared twice")]
    DuplicateBank { line: usize, bank: u8 },
    #[error("line {line}: `{name}` is already defined")]
    DuplicateName { line: usize, name: String },
    #[error("line {line}: code before the first `.prg`")]
    NoActiveBank { line: usize },
    #[error("line {line}: unknown directive `.{text}`")]
    UnknownDirective { line: usize, text: String },
    #[error("line {line}: `.{directive}` needs an operand")]
    MissingOperand { line: usize, directive: &'static str },
    #[error("line {line}: `.str` needs a double-quoted string")]
    BadString { line: usize },
    #[error("line {line}: `.org {origin}` is behind the current offset {offset}")]
    OriginBehind { line: usize, origin: u8, offset: usize },
}

impl AssembleError {
    pub fn line(&self) -> usize {
        match *self {
            AssembleError::BadDecimal { line, .. }
            | AssembleError::BadHex { line, .. }
            | AssembleError::InvalidLiteral { line, .. }
            | AssembleError::EmptySymbol { line }
            | AssembleError::UnknownInstruction { line, .. }
            | AssembleError::UnresolvedName { line, .. }
            | AssembleError::BankOverflow { line, .. }
            | AssembleError::MissingBankIndex { line }
            | AssembleError::InvalidBankIndex { line, .. }
            | AssembleError::DuplicateBank { line, .. }
            | AssembleError::DuplicateName { line, .. }
            | AssembleError::NoActiveBank { line }
            | AssembleError::UnknownDirective { line, .. }
            | AssembleError::MissingOperand { line, .. }
            | AssembleError::BadString { line }
            | AssembleError::OriginBehind { line, .. } => line,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Literal {
    Value(u8),
    Symbol(String),
}

#[derive(Debug, Clone)]
enum Token {
    Literal { value: Literal, line: usize },
    Instruction(Instruction),
}

/// A token after name resolution.
#[derive(Debug, Clone, Copy)]
enum Resolved {
    Byte(u8),
    Instruction(Instruction),
}

/// How a resolved token lands in the output.
enum Emit {
    Raw(u8),
    /// Moved behind the instruction that consumes it.
    Folded,
    Encoded { opcode: u8, inline: Vec<u8> },
}

struct BankSource {
    index: u8,
    line: usize,
    tokens: Vec<Token>,
    labels: HashMap<String, u8>,
}

impl BankSource {
    fn new(index: u8, line: usize) -> Self {
        Self {
            index,
            line,
            tokens: Vec::new(),
            labels: HashMap::new(),
        }
    }

    /// Byte offset the next token will occupy. Every token becomes exactly one byte.
    ///
    /// This is a token count taken before folding. A label therefore binds to
    /// whatever byte the next token lands on: if a literal from an earlier
    /// line (`.dat 5`) folds into the instruction after the label, the label
    /// points at that inline operand rather than at the opcode.
    fn offset(&self, line: usize) -> Result<u8, AssembleError> {
        u8::try_from(self.tokens.len()).map_err(|_| AssembleError::BankOverflow {
            line,
            bank: self.index,
        })
    }

    fn extend(&mut self, tokens: Vec<Token>, line: usize) -> Result<(), AssembleError> {
        if self.tokens.len() + tokens.len() > BANK_SIZE {
            return Err(AssembleError::BankOverflow {
                line,
                bank: self.index,
            });
        }
        self.tokens.extend(tokens);
        Ok(())
    }

    fn resolve(&self, constants: &HashMap<String, u8>) -> Result<Vec<Resolved>, AssembleError> {
        self.tokens
            .iter()
            .map(|token| match token {
                Token::Instruction(inst) => Ok(Resolved::Instruction(*inst)),
                Token::Literal {
                    value: Literal::Value(v),
                    ..
                } => Ok(Resolved::Byte(*v)),
                Token::Literal {
                    value: Literal::Symbol(name),
                    line,
                } => self
                    .labels
                    .get(name)
                    .or_else(|| constants.get(name))
                    .map(|v| Resolved::Byte(*v))
                    .ok_or_else(|| AssembleError::UnresolvedName {
                        line: *line,
                        bank: self.index,
                        name: name.clone(),
                    }),
            })
            .collect()
    }
}

pub struct Assembler<'r> {
    registry: &'r InstructionRegistry,
}

impl<'r> Assembler<'r> {
    pub fn new(registry: &'r InstructionRegistry) -> Self {
        Self { registry }
    }

    /// Assembles a whole program. Nothing is returned unless every bank succeeds.
    pub fn assemble(&self, source: &str) -> Result<BankSet, AssembleError> {
        let mut banks: Vec<BankSource> = Vec::new();
        let mut constants: HashMap<String, u8> = HashMap::new();
        let mut declared = bitarr![0; BANK_COUNT];

        for (n, raw) in source.lines().enumerate() {
            let line = n + 1;
            let text = strip_comment(raw).trim();
            if text.is_empty() {
                continue;
            }

            if let Some(directive) = text.strip_prefix(DIRECTIVE_PREFIX) {
                let mut words = directive.split_whitespace();
                match words.next().unwrap_or("") {
                    "prg" => {
                        let index_text =
                            words.next().ok_or(AssembleError::MissingBankIndex { line })?;
                        let index = match parse_literal(index_text, line) {
                            Ok(Literal::Value(index)) => index,
                            _ => {
                                return Err(AssembleError::InvalidBankIndex {
                                    line,
                                    text: index_text.to_string(),
                                })
                            }
                        };
                        if declared.replace(index as usize, true) {
                            return Err(AssembleError::DuplicateBank { line, bank: index });
                        }
                        if let Some(name) = words.next() {
                            if constants.insert(name.to_string(), index).is_some() {
                                return Err(AssembleError::DuplicateName {
                                    line,
                                    name: name.to_string(),
                                });
                            }
                        }
                        banks.push(BankSource::new(index, line));
                    }
                    "dat" => {
                        let tokens = words
                            .map(|word| {
                                parse_literal(word, line).map(|value| Token::Literal { value, line })
                            })
                            .collect::<Result<Vec<_>, _>>()?;
                        current(&mut banks, line)?.extend(tokens, line)?;
                    }
                    "org" => {
                        let operand = words.next().ok_or(AssembleError::MissingOperand {
                            line,
                            directive: "org",
                        })?;
                        let origin = match parse_literal(operand, line)? {
                            Literal::Value(origin) => origin,
                            Literal::Symbol(_) => {
                                return Err(AssembleError::InvalidLiteral {
                                    line,
                                    text: operand.to_string(),
                                })
                            }
                        };
                        let bank = current(&mut banks, line)?;
                        let offset = bank.tokens.len();
                        if (origin as usize) < offset {
                            return Err(AssembleError::OriginBehind {
                                line,
                                origin,
                                offset,
                            });
                        }
                        let padding = (offset..origin as usize)
                            .map(|_| Token::Literal {
                                value: Literal::Value(0),
                                line,
                            })
                            .collect();
                        bank.extend(padding, line)?;
                    }
                    "str" => {
                        let rest = &directive.trim_start()["str".len()..];
                        let bytes = parse_string(rest.trim(), line)?;
                        let tokens = bytes
                            .into_iter()
                            .chain(std::iter::once(0))
                            .map(|b| Token::Literal {
                                value: Literal::Value(b),
                                line,
                            })
                            .collect();
                        current(&mut banks, line)?.extend(tokens, line)?;
                    }
                    other => {
                        return Err(AssembleError::UnknownDirective {
                            line,
                            text: other.to_string(),
                        })
                    }
                }
            } else if let Some(label) = text.strip_prefix(LABEL_PREFIX) {
                let name = label
                    .split_whitespace()
                    .next()
                    .ok_or(AssembleError::EmptySymbol { line })?;
                let bank = current(&mut banks, line)?;
                let offset = bank.offset(line)?;
                if bank.labels.insert(name.to_string(), offset).is_some() {
                    return Err(AssembleError::DuplicateName {
                        line,
                        name: name.to_string(),
                    });
                }
            } else {
                let tokens = self.tokenize(text, line)?;
                current(&mut banks, line)?.extend(tokens, line)?;
            }
        }

        let mut set = BankSet::new();
        for bank in &banks {
            let resolved = bank.resolve(&constants)?;
            let bytes = fold(&resolved);
            tracing::debug!(bank = bank.index, bytes = bytes.len(), "assembled bank");
            set.insert(bank.index, bytes)
                .map_err(|_| AssembleError::BankOverflow {
                    line: bank.line,
                    bank: bank.index,
                })?;
        }
        Ok(set)
    }

    /// Splits a code line into tokens, last word first.
    fn tokenize(&self, text: &str, line: usize) -> Result<Vec<Token>, AssembleError> {
        let mut tokens = text
            .split_whitespace()
            .map(|word| self.classify(word, line))
            .collect::<Result<Vec<_>, _>>()?;
        tokens.reverse();
        Ok(tokens)
    }

    fn classify(&self, word: &str, line: usize) -> Result<Token, AssembleError> {
        if let Some(inst) = self.registry.lookup_by_mnemonic(word) {
            return Ok(Token::Instruction(*inst));
        }
        match word.chars().next() {
            Some(c) if c.is_ascii_digit() || c == HEX_PREFIX || c == SYMBOL_PREFIX => {
                parse_literal(word, line).map(|value| Token::Literal { value, line })
            }
            _ => Err(AssembleError::UnknownInstruction {
                line,
                text: word.to_string(),
            }),
        }
    }
}

/// Assembles `source` with `registry`.
pub fn assemble(registry: &InstructionRegistry, source: &str) -> Result<BankSet, AssembleError> {
    Assembler::new(registry).assemble(source)
}

fn current(banks: &mut [BankSource], line: usize) -> Result<&mut BankSource, AssembleError> {
    banks
        .last_mut()
        .ok_or(AssembleError::NoActiveBank { line })
}

/// Cuts a `;` comment, ignoring semicolons inside double quotes.
fn strip_comment(line: &str) -> &str {
    let mut quoted = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            COMMENT_CHAR if !quoted => return &line[..i],
            _ => {}
        }
    }
    line
}

fn parse_literal(word: &str, line: usize) -> Result<Literal, AssembleError> {
    if let Some(hex) = word.strip_prefix(HEX_PREFIX) {
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AssembleError::BadHex {
                line,
                text: word.to_string(),
            });
        }
        return u8::from_str_radix(hex, 16)
            .map(Literal::Value)
            .map_err(|_| AssembleError::BadHex {
                line,
                text: word.to_string(),
            });
    }
    if let Some(name) = word.strip_prefix(SYMBOL_PREFIX) {
        if name.is_empty() {
            return Err(AssembleError::EmptySymbol { line });
        }
        return Ok(Literal::Symbol(name.to_string()));
    }
    if word.starts_with(|c: char| c.is_ascii_digit()) {
        if !word.chars().all(|c| c.is_ascii_digit()) {
            return Err(AssembleError::BadDecimal {
                line,
                text: word.to_string(),
            });
        }
        return word
            .parse::<u8>()
            .map(Literal::Value)
            .map_err(|_| AssembleError::BadDecimal {
                line,
                text: word.to_string(),
            });
    }
    Err(AssembleError::InvalidLiteral {
        line,
        text: word.to_string(),
    })
}

fn parse_string(text: &str, line: usize) -> Result<Vec<u8>, AssembleError> {
    let inner = text
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .ok_or(AssembleError::BadString { line })?;
    if inner.contains('"') {
        return Err(AssembleError::BadString { line });
    }
    Ok(inner.as_bytes().to_vec())
}

/// Binds instruction arguments and produces the bank bytes.
///
/// Works on the postfix token stream. For each instruction the argument slots
/// are filled from the tokens immediately before it, nearest first. A literal
/// there is folded: its variant bit is set and the byte moves behind the
/// opcode. A nested instruction leaves the slot on the stack, and the scan
/// skips the whole span of tokens that instruction consumes.
fn fold(tokens: &[Resolved]) -> Vec<u8> {
    // Number of tokens making up the argument tree that ends at each index.
    let mut spans = vec![0usize; tokens.len()];
    for (j, token) in tokens.iter().enumerate() {
        spans[j] = match token {
            Resolved::Byte(_) => 1,
            Resolved::Instruction(inst) => {
                let mut cursor = j;
                let mut span = 1;
                for _ in 0..inst.arity {
                    if cursor == 0 {
                        break;
                    }
                    let child = spans[cursor - 1];
                    span += child;
                    cursor -= child;
                }
                span
            }
        };
    }

    let mut plan: Vec<Emit> = tokens
        .iter()
        .map(|token| match token {
            Resolved::Byte(v) => Emit::Raw(*v),
            Resolved::Instruction(_) => Emit::Folded,
        })
        .collect();

    for (j, token) in tokens.iter().enumerate() {
        let Resolved::Instruction(inst) = token else {
            continue;
        };
        let mut variant = 0u8;
        let mut inline = Vec::with_capacity(inst.arity as usize);
        let mut cursor = j;
        for slot in 0..inst.arity {
            if cursor == 0 {
                break;
            }
            let prev = cursor - 1;
            match plan[prev] {
                Emit::Raw(v) => {
                    variant |= 1 << slot;
                    inline.push(v);
                    plan[prev] = Emit::Folded;
                    cursor = prev;
                }
                _ => cursor -= spans[prev],
            }
        }
        plan[j] = Emit::Encoded {
            opcode: inst.opcode(variant),
            inline,
        };
    }

    let mut out = Vec::with_capacity(tokens.len());
    for emit in plan {
        match emit {
            Emit::Raw(v) => out.push(v),
            Emit::Folded => {}
            Emit::Encoded { opcode, inline } => {
                out.push(opcode);
                out.extend_from_slice(&inline);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn registry() -> InstructionRegistry {
        InstructionRegistry::standard().unwrap()
    }

    fn opcode(reg: &InstructionRegistry, mnemonic: &str, variant: u8) -> u8 {
        reg.lookup_by_mnemonic(mnemonic).unwrap().opcode(variant)
    }

    #[test]
    fn comments_respect_quotes() {
        assert_eq!(strip_comment("PUSH 1 ; note"), "PUSH 1 ");
        assert_eq!(strip_comment(".str \"a;b\" ; c"), ".str \"a;b\" ");
    }

    #[test]
    fn literal_forms() {
        assert_eq!(parse_literal("42", 1), Ok(Literal::Value(42)));
        assert_eq!(parse_literal("$2a", 1), Ok(Literal::Value(0x2A)));
        assert_eq!(parse_literal("$FF", 1), Ok(Literal::Value(0xFF)));
        assert_eq!(
            parse_literal("@main", 1),
            Ok(Literal::Symbol("main".into()))
        );
        assert!(matches!(
            parse_literal("256", 3),
            Err(AssembleError::BadDecimal { line: 3, .. })
        ));
        assert!(matches!(
            parse_literal("12a", 1),
            Err(AssembleError::BadDecimal { .. })
        ));
        assert!(matches!(
            parse_literal("$100", 1),
            Err(AssembleError::BadHex { .. })
        ));
        assert!(matches!(
            parse_literal("$", 1),
            Err(AssembleError::BadHex { .. })
        ));
        assert_eq!(parse_literal("@", 2), Err(AssembleError::EmptySymbol { line: 2 }));
    }

    #[test]
    fn nested_instruction_spans_are_skipped() {
        // ADD PUSH 5 7  ->  7 5 PUSH ADD
        let reg = registry();
        let banks = assemble(&reg, ".prg 0\nADD PUSH 5 7\n").unwrap();
        assert_eq!(
            banks.get(0).unwrap(),
            &[opcode(&reg, "PUSH", 1), 5, opcode(&reg, "ADD", 0b10), 7][..]
        );
    }

    #[test]
    fn fold_leaves_unconsumed_literals_in_place() {
        let reg = registry();
        let banks = assemble(&reg, ".prg 0\n1 2\nPOP\n").unwrap();
        assert_eq!(banks.get(0).unwrap(), &[2, 1, opcode(&reg, "POP", 0)][..]);
    }
}
