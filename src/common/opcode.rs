/// Terminates every string-valued operand: names, literals, sizes and offsets.
pub const TERM: u8 = 0x18;
/// Separates parameter names in a definition.
pub const ARG_SEP: u8 = 0x07;
/// Ends the parameter name list of a definition.
pub const ARGS_END: u8 = 0x08;

/// This enum represents a single opcode.
/// Under the hood, it's just a byte.
/// This allows non opcode bytes (operands) to be inserted in bytecode streams.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Begin a definition, followed by a `Marker` saying what is defined.
    Define     = 0x01,
    /// Call the callee on top of the stack.
    Call       = 0x02,
    /// Stop the current program; its result is the top of the stack.
    Return     = 0x03,
    /// Bind the top of the stack to a name, leaving the value on the stack.
    Set        = 0x04,
    /// End of program.
    End        = 0x16,
    /// Push the value of a (dotted) variable path.
    Get        = 0x20,
    /// Push a constant, followed by a `Marker` saying what kind.
    Const      = 0x21,
    Add        = 0x23,
    Sub        = 0x24,
    Mul        = 0x25,
    Div        = 0x26,
    Mod        = 0x27,
    Pow        = 0x28,
    /// Pop a value, jump when it is truthy.
    JumpIf     = 0x29,
    /// Jump unconditionally.
    Jump       = 0x2a,
    /// Pop a value, jump when it is falsy.
    JumpUnless = 0x2b,
    /// Rewind the iteration cursor of the top of the stack.
    Reset      = 0x2d,
    /// Replace the top of the stack with its next element.
    Iter       = 0x2e,
    /// Instantiate the object definition on top of the stack.
    New        = 0x31,
    Eq         = 0x34,
    Ne         = 0x35,
    Lt         = 0x36,
    Gt         = 0x37,
    Le         = 0x38,
    Ge         = 0x39,
}

impl Opcode {
    /// Convert a raw byte to an opcode.
    /// Returns `None` for bytes that do not start an instruction.
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        use Opcode::*;
        Some(match byte {
            0x01 => Define,
            0x02 => Call,
            0x03 => Return,
            0x04 => Set,
            0x16 => End,
            0x20 => Get,
            0x21 => Const,
            0x23 => Add,
            0x24 => Sub,
            0x25 => Mul,
            0x26 => Div,
            0x27 => Mod,
            0x28 => Pow,
            0x29 => JumpIf,
            0x2a => Jump,
            0x2b => JumpUnless,
            0x2d => Reset,
            0x2e => Iter,
            0x31 => New,
            0x34 => Eq,
            0x35 => Ne,
            0x36 => Lt,
            0x37 => Gt,
            0x38 => Le,
            0x39 => Ge,
            _ => return None,
        })
    }

    /// The capability a binary operator opcode dispatches to.
    pub fn capability(&self) -> Option<&'static str> {
        use Opcode::*;
        Some(match self {
            Add => "__add",
            Sub => "__sub",
            Mul => "__mul",
            Div => "__div",
            Mod => "__mod",
            Pow => "__pow",
            Eq => "__eq",
            Ne => "__neq",
            Lt => "__lt",
            Gt => "__gt",
            Le => "__le",
            Ge => "__ge",
            _ => return None,
        })
    }
}

/// The byte following `Const` or `Define`,
/// selecting the kind of constant or definition.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// A plain variable definition.
    Var    = 0x10,
    Bool   = 0x12,
    Int    = 0x13,
    Str    = 0x14,
    Num    = 0x15,
    Fn     = 0x17,
    /// Collect the given number of stack values into a list.
    List   = 0x2c,
    /// The nil literal, which has no operand.
    Nil    = 0x2f,
    Object = 0x30,
    /// An anonymous block body.
    Block  = 0x32,
}

impl Marker {
    pub fn from_byte(byte: u8) -> Option<Marker> {
        use Marker::*;
        Some(match byte {
            0x10 => Var,
            0x12 => Bool,
            0x13 => Int,
            0x14 => Str,
            0x15 => Num,
            0x17 => Fn,
            0x2c => List,
            0x2f => Nil,
            0x30 => Object,
            0x32 => Block,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bytes_round_trip() {
        for byte in 0..=u8::MAX {
            if let Some(op) = Opcode::from_byte(byte) {
                assert_eq!(op as u8, byte);
            }
            if let Some(marker) = Marker::from_byte(byte) {
                assert_eq!(marker as u8, byte);
            }
        }
    }

    #[test]
    fn operands_are_not_opcodes() {
        assert_eq!(Opcode::from_byte(TERM), None);
        assert_eq!(Opcode::from_byte(ARG_SEP), None);
        assert_eq!(Opcode::from_byte(ARGS_END), None);
    }

    #[test]
    fn comparison_capabilities() {
        assert_eq!(Opcode::Ne.capability(), Some("__neq"));
        assert_eq!(Opcode::Ge.capability(), Some("__ge"));
        assert_eq!(Opcode::Jump.capability(), None);
    }
}
