use std::{
    fmt::{self, Display, Formatter},
    ops::Range,
};

use crate::common::{
    number::{build_number, split_number},
    opcode::{Marker, Opcode, ARGS_END, ARG_SEP, TERM},
    span::Span,
};

/// Represents a single interpretable chunk of bytecode,
/// think a whole program or a function body.
/// Alongside the bytes, a side table maps byte offsets
/// to the source spans they were compiled from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bytecode {
    pub code: Vec<u8>,
    /// Sorted by offset; each entry covers the bytes up to the next one.
    spans: Vec<(usize, Span)>,
}

/// A constant pushed by `Const`.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Bool(bool),
    Int(i64),
    Str(String),
    Num(f64),
    Nil,
    /// Collect this many stack values into a list.
    List(usize),
    /// A block body, as a range of the enclosing bytecode.
    Block(Range<usize>),
}

/// A single decoded instruction, operands included.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    DefineVar(String),
    DefineFn {
        name: String,
        params: Vec<String>,
        body: Range<usize>,
    },
    DefineObject {
        name: String,
        params: Vec<String>,
        body: Range<usize>,
    },
    Call,
    Return,
    Set(String),
    End,
    Get(String),
    Const(Constant),
    /// Any arithmetic or comparison opcode.
    Binary(Opcode),
    JumpIf(i64),
    Jump(i64),
    JumpUnless(i64),
    Reset,
    Iter,
    New,
}

/// Raised when bytes can't be decoded into an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Malformed {
    pub offset: usize,
    pub reason: String,
}

impl Malformed {
    fn new(offset: usize, reason: &str) -> Malformed {
        Malformed {
            offset,
            reason: reason.to_string(),
        }
    }
}

impl Bytecode {
    /// Creates a new empty chunk to be filled.
    pub fn empty() -> Bytecode {
        Bytecode::default()
    }

    /// Wraps raw bytes that have no source information.
    pub fn from_bytes(code: Vec<u8>) -> Bytecode {
        Bytecode {
            code,
            spans: vec![],
        }
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Emits an opcode as a byte.
    pub fn emit(&mut self, op: Opcode) {
        self.code.push(op as u8)
    }

    pub fn emit_marker(&mut self, marker: Marker) {
        self.code.push(marker as u8)
    }

    /// Emits a series of bytes.
    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes)
    }

    /// Emits a string operand followed by the terminator.
    /// The caller must make sure the string holds no terminator.
    pub fn emit_str(&mut self, string: &str) {
        self.code.extend_from_slice(string.as_bytes());
        self.code.push(TERM);
    }

    /// Emits a numeric operand.
    pub fn emit_number(&mut self, number: i64) {
        self.code.extend(split_number(number));
    }

    /// Marks the bytes emitted from here on as coming from `span`.
    pub fn emit_span(&mut self, span: &Span) {
        let offset = self.code.len();
        if let Some((last, old)) = self.spans.last_mut() {
            if *last == offset {
                *old = span.clone();
                return;
            }
        }
        self.spans.push((offset, span.clone()));
    }

    /// Appends another chunk, shifting its span table.
    pub fn append(&mut self, other: Bytecode) {
        let shift = self.code.len();
        for (offset, span) in other.spans {
            self.spans.push((offset + shift, span));
        }
        self.code.extend(other.code);
    }

    /// Copies a sub-range out into its own chunk,
    /// rebasing the spans that fall in it.
    pub fn slice(&self, range: Range<usize>) -> Bytecode {
        let mut spans = vec![];
        // the span in effect at the start of the range
        if let Some(span) = self.span_at(range.start) {
            spans.push((0, span.clone()));
        }
        for (offset, span) in self.spans.iter() {
            if *offset > range.start && *offset < range.end {
                spans.push((offset - range.start, span.clone()));
            }
        }

        Bytecode {
            code: self.code.get(range).map(|c| c.to_vec()).unwrap_or_default(),
            spans,
        }
    }

    /// The source span the byte at `offset` was compiled from, if known.
    pub fn span_at(&self, offset: usize) -> Option<&Span> {
        let index = self.spans.partition_point(|(o, _)| *o <= offset);
        index.checked_sub(1).map(|i| &self.spans[i].1)
    }

    fn byte(&self, offset: usize) -> Result<u8, Malformed> {
        self.code
            .get(offset)
            .copied()
            .ok_or_else(|| Malformed::new(offset, "unexpected end of bytecode"))
    }

    /// Reads a terminated operand as a string.
    /// Returns the string and the index just past the terminator.
    fn read_str(&self, offset: usize) -> Result<(String, usize), Malformed> {
        let rest = self.code.get(offset..).unwrap_or_default();
        let end = rest
            .iter()
            .position(|b| *b == TERM)
            .ok_or_else(|| Malformed::new(offset, "unterminated operand"))?;
        let string = std::str::from_utf8(&rest[..end])
            .map_err(|_| Malformed::new(offset, "operand is not valid utf-8"))?;
        Ok((string.to_string(), offset + end + 1))
    }

    fn read_number(&self, offset: usize) -> Result<(i64, usize), Malformed> {
        let rest = self.code.get(offset..).unwrap_or_default();
        let (number, eaten) =
            build_number(rest).ok_or_else(|| Malformed::new(offset, "bad numeric operand"))?;
        Ok((number, offset + eaten))
    }

    /// Reads a parameter list: names split by `ARG_SEP`, ended by `ARGS_END`.
    fn read_params(&self, offset: usize) -> Result<(Vec<String>, usize), Malformed> {
        let rest = self.code.get(offset..).unwrap_or_default();
        let end = rest
            .iter()
            .position(|b| *b == ARGS_END)
            .ok_or_else(|| Malformed::new(offset, "unterminated parameter list"))?;
        let params = std::str::from_utf8(&rest[..end])
            .map_err(|_| Malformed::new(offset, "parameter is not valid utf-8"))?;
        let params = if params.is_empty() {
            vec![]
        } else {
            params
                .split(ARG_SEP as char)
                .map(|p| p.to_string())
                .collect()
        };
        Ok((params, offset + end + 1))
    }

    /// Reads a size prefix and the range of the body that follows it.
    fn read_body(&self, offset: usize) -> Result<(Range<usize>, usize), Malformed> {
        let (size, start) = self.read_number(offset)?;
        let size = usize::try_from(size).map_err(|_| Malformed::new(offset, "negative size"))?;
        let end = start + size;
        if end > self.code.len() {
            return Err(Malformed::new(offset, "body runs past the end of bytecode"));
        }
        Ok((start..end, end))
    }

    fn read_constant(&self, offset: usize) -> Result<(Constant, usize), Malformed> {
        let marker = Marker::from_byte(self.byte(offset)?)
            .ok_or_else(|| Malformed::new(offset, "unknown constant kind"))?;
        let at = offset + 1;

        Ok(match marker {
            Marker::Nil => (Constant::Nil, at),
            Marker::Bool => {
                let (text, next) = self.read_str(at)?;
                let value = match text.as_str() {
                    "true" => true,
                    "false" => false,
                    _ => return Err(Malformed::new(at, "bad boolean literal")),
                };
                (Constant::Bool(value), next)
            }
            Marker::Int => {
                let (text, next) = self.read_str(at)?;
                let value = text
                    .parse::<i64>()
                    .map_err(|_| Malformed::new(at, "bad integer literal"))?;
                (Constant::Int(value), next)
            }
            Marker::Num => {
                let (text, next) = self.read_str(at)?;
                let value = text
                    .parse::<f64>()
                    .map_err(|_| Malformed::new(at, "bad float literal"))?;
                (Constant::Num(value), next)
            }
            Marker::Str => {
                let (text, next) = self.read_str(at)?;
                (Constant::Str(text), next)
            }
            Marker::List => {
                let (count, next) = self.read_number(at)?;
                let count = usize::try_from(count)
                    .map_err(|_| Malformed::new(at, "negative list length"))?;
                (Constant::List(count), next)
            }
            Marker::Block => {
                let (body, next) = self.read_body(at)?;
                (Constant::Block(body), next)
            }
            Marker::Var | Marker::Fn | Marker::Object => {
                return Err(Malformed::new(offset, "not a constant kind"))
            }
        })
    }

    fn read_define(&self, offset: usize) -> Result<(Instruction, usize), Malformed> {
        let marker = Marker::from_byte(self.byte(offset)?)
            .ok_or_else(|| Malformed::new(offset, "unknown definition kind"))?;
        let (name, at) = self.read_str(offset + 1)?;

        Ok(match marker {
            Marker::Var => (Instruction::DefineVar(name), at),
            Marker::Fn | Marker::Object => {
                let (params, at) = self.read_params(at)?;
                let (body, next) = self.read_body(at)?;
                let instruction = if marker == Marker::Fn {
                    Instruction::DefineFn { name, params, body }
                } else {
                    Instruction::DefineObject { name, params, body }
                };
                (instruction, next)
            }
            _ => return Err(Malformed::new(offset, "not a definition kind")),
        })
    }

    /// Decodes the instruction starting at `offset`.
    /// Returns the instruction and the offset of the one after it.
    /// Bodies are skipped over, not decoded.
    pub fn decode(&self, offset: usize) -> Result<(Instruction, usize), Malformed> {
        let byte = self.byte(offset)?;
        let op = Opcode::from_byte(byte)
            .ok_or_else(|| Malformed::new(offset, &format!("unknown opcode 0x{:02x}", byte)))?;
        let at = offset + 1;

        Ok(match op {
            Opcode::Define => self.read_define(at)?,
            Opcode::Const => {
                let (constant, next) = self.read_constant(at)?;
                (Instruction::Const(constant), next)
            }
            Opcode::Set => {
                let (name, next) = self.read_str(at)?;
                (Instruction::Set(name), next)
            }
            Opcode::Get => {
                let (name, next) = self.read_str(at)?;
                (Instruction::Get(name), next)
            }
            Opcode::JumpIf | Opcode::Jump | Opcode::JumpUnless => {
                let (delta, next) = self.read_number(at)?;
                let instruction = match op {
                    Opcode::JumpIf => Instruction::JumpIf(delta),
                    Opcode::Jump => Instruction::Jump(delta),
                    _ => Instruction::JumpUnless(delta),
                };
                (instruction, next)
            }
            Opcode::Call => (Instruction::Call, at),
            Opcode::Return => (Instruction::Return, at),
            Opcode::End => (Instruction::End, at),
            Opcode::Reset => (Instruction::Reset, at),
            Opcode::Iter => (Instruction::Iter, at),
            Opcode::New => (Instruction::New, at),
            binary => (Instruction::Binary(binary), at),
        })
    }

    fn disassemble(&self, f: &mut Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "    ".repeat(depth);
        let mut offset = 0;

        while offset < self.code.len() {
            let (instruction, next) = match self.decode(offset) {
                Ok(decoded) => decoded,
                Err(malformed) => {
                    return writeln!(f, "{}{:>5}  ?? {}", indent, offset, malformed.reason);
                }
            };
            write!(f, "{}{:>5}  ", indent, offset)?;

            let body = match &instruction {
                Instruction::DefineVar(name) => {
                    writeln!(f, "Define  var {}", name)?;
                    None
                }
                Instruction::DefineFn { name, params, body } => {
                    writeln!(f, "Define  fn {}({})", name, params.join(", "))?;
                    Some(body.clone())
                }
                Instruction::DefineObject { name, params, body } => {
                    writeln!(f, "Define  object {}({})", name, params.join(", "))?;
                    Some(body.clone())
                }
                Instruction::Const(Constant::Block(body)) => {
                    writeln!(f, "Const   block")?;
                    Some(body.clone())
                }
                Instruction::Const(constant) => {
                    match constant {
                        Constant::Bool(b) => writeln!(f, "Const   bool {}", b)?,
                        Constant::Int(i) => writeln!(f, "Const   int {}", i)?,
                        Constant::Num(n) => writeln!(f, "Const   num {:?}", n)?,
                        Constant::Str(s) => writeln!(f, "Const   str {:?}", s)?,
                        Constant::Nil => writeln!(f, "Const   nil")?,
                        Constant::List(count) => writeln!(f, "Const   list {}", count)?,
                        Constant::Block(_) => (),
                    }
                    None
                }
                Instruction::Set(name) => {
                    writeln!(f, "Set     {}", name)?;
                    None
                }
                Instruction::Get(name) => {
                    writeln!(f, "Get     {}", name)?;
                    None
                }
                Instruction::JumpIf(delta) => {
                    writeln!(f, "JumpIf  {:+} -> {}", delta, next as i64 + delta)?;
                    None
                }
                Instruction::Jump(delta) => {
                    writeln!(f, "Jump    {:+} -> {}", delta, next as i64 + delta)?;
                    None
                }
                Instruction::JumpUnless(delta) => {
                    writeln!(f, "Unless  {:+} -> {}", delta, next as i64 + delta)?;
                    None
                }
                Instruction::Binary(op) => {
                    writeln!(f, "{:?}", op)?;
                    None
                }
                other => {
                    writeln!(f, "{:?}", other)?;
                    None
                }
            };

            if let Some(body) = body {
                self.slice(body.clone()).disassemble(f, depth + 1)?;
                offset = body.end;
            }
            offset = offset.max(next);
        }

        Ok(())
    }
}

impl Display for Bytecode {
    /// Prints one instruction per line, with its offset.
    /// Bodies are printed indented below their definition,
    /// with offsets relative to the body.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.disassemble(f, 0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::source::Source;

    fn chunk(bytes: &[u8]) -> Bytecode {
        Bytecode::from_bytes(bytes.to_vec())
    }

    #[test]
    fn decode_const_int() {
        let code = chunk(b"\x21\x1342\x18\x16");
        assert_eq!(
            code.decode(0),
            Ok((Instruction::Const(Constant::Int(42)), 5))
        );
        assert_eq!(code.decode(5), Ok((Instruction::End, 6)));
    }

    #[test]
    fn decode_nil_has_no_operand() {
        let code = chunk(b"\x21\x2f\x16");
        assert_eq!(code.decode(0), Ok((Instruction::Const(Constant::Nil), 2)));
    }

    #[test]
    fn decode_fn_definition() {
        // fn add(a, b) { a }
        let code = chunk(b"\x01\x17add\x18a\x07b\x084\x18\x20a\x18\x16\x16");
        let (instruction, next) = code.decode(0).unwrap();
        assert_eq!(
            instruction,
            Instruction::DefineFn {
                name: "add".into(),
                params: vec!["a".into(), "b".into()],
                body: 12..16,
            }
        );
        assert_eq!(next, 16);
        assert_eq!(code.decode(next), Ok((Instruction::End, 17)));
    }

    #[test]
    fn decode_no_params() {
        let code = chunk(b"\x01\x30Thing\x18\x082\x18\x21\x2f\x16");
        let (instruction, _) = code.decode(0).unwrap();
        match instruction {
            Instruction::DefineObject { params, body, .. } => {
                assert!(params.is_empty());
                assert_eq!(body, 11..13);
            }
            other => panic!("expected object definition, got {:?}", other),
        }
    }

    #[test]
    fn decode_backward_jump() {
        let code = chunk(b"\x2a-12\x18");
        assert_eq!(code.decode(0), Ok((Instruction::Jump(-12), 5)));
    }

    #[test]
    fn malformed() {
        assert!(chunk(b"\xff").decode(0).is_err());
        assert!(chunk(b"\x20abc").decode(0).is_err());
        assert!(chunk(b"\x01\x17f\x18\x0899\x18\x16").decode(0).is_err());
        assert!(chunk(b"").decode(0).is_err());
    }

    #[test]
    fn spans_follow_slices() {
        let source = Source::source("a + b");
        let a = Span::new(&source, 0, 1);
        let b = Span::new(&source, 4, 1);

        let mut code = Bytecode::empty();
        code.emit_span(&a);
        code.emit_bytes(b"\x20a\x18");
        code.emit_span(&b);
        code.emit_bytes(b"\x20b\x18");

        assert_eq!(code.span_at(1), Some(&a));
        assert_eq!(code.span_at(4), Some(&b));

        let sliced = code.slice(1..6);
        assert_eq!(sliced.span_at(0), Some(&a));
        assert_eq!(sliced.span_at(2), Some(&b));
    }

    #[test]
    fn append_shifts_spans() {
        let source = Source::source("x");
        let x = Span::new(&source, 0, 1);

        let mut tail = Bytecode::empty();
        tail.emit_span(&x);
        tail.emit(Opcode::End);

        let mut code = Bytecode::from_bytes(b"\x21\x2f".to_vec());
        code.append(tail);
        assert_eq!(code.span_at(0), None);
        assert_eq!(code.span_at(2), Some(&x));
    }

    #[test]
    fn disassemble() {
        let code = chunk(b"\x21\x131\x18\x04x\x18\x16");
        let text = format!("{}", code);
        assert!(text.contains("Const   int 1"));
        assert!(text.contains("Set     x"));
        assert!(text.contains("End"));
    }
}
