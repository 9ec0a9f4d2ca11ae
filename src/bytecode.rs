// src/bytecode.rs
// Instruction set and the compiled program handed over by the compiler

use std::fmt;
use std::str::FromStr;

use crate::arith::{ArithOp, Family};
use crate::core::{MemLocation, SymbolTable};
use crate::error::VmError;
use crate::value::Value;

/// Instruction opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    AddChar,
    AddDouble,
    AddInt,
    And,
    ArrayAccess,
    Call,
    Cmp,
    ConcatString,
    DivChar,
    DivDouble,
    DivInt,
    FieldAccess,
    Halt,
    Jeq,
    Jge,
    Jgt,
    Jle,
    Jlt,
    Jmp,
    Jne,
    ModChar,
    ModDouble,
    ModInt,
    Mov,
    MulChar,
    MulDouble,
    MulInt,
    Nop,
    Not,
    Or,
    SubChar,
    SubDouble,
    SubInt,
}

impl Opcode {
    pub const ALL: [Opcode; 33] = [
        Opcode::AddChar,
        Opcode::AddDouble,
        Opcode::AddInt,
        Opcode::And,
        Opcode::ArrayAccess,
        Opcode::Call,
        Opcode::Cmp,
        Opcode::ConcatString,
        Opcode::DivChar,
        Opcode::DivDouble,
        Opcode::DivInt,
        Opcode::FieldAccess,
        Opcode::Halt,
        Opcode::Jeq,
        Opcode::Jge,
        Opcode::Jgt,
        Opcode::Jle,
        Opcode::Jlt,
        Opcode::Jmp,
        Opcode::Jne,
        Opcode::ModChar,
        Opcode::ModDouble,
        Opcode::ModInt,
        Opcode::Mov,
        Opcode::MulChar,
        Opcode::MulDouble,
        Opcode::MulInt,
        Opcode::Nop,
        Opcode::Not,
        Opcode::Or,
        Opcode::SubChar,
        Opcode::SubDouble,
        Opcode::SubInt,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::AddChar => "ADD_CHAR",
            Opcode::AddDouble => "ADD_DOUBLE",
            Opcode::AddInt => "ADD_INT",
            Opcode::And => "AND",
            Opcode::ArrayAccess => "ARRAY_ACCESS",
            Opcode::Call => "CALL",
            Opcode::Cmp => "CMP",
            Opcode::ConcatString => "CONCAT_STRING",
            Opcode::DivChar => "DIV_CHAR",
            Opcode::DivDouble => "DIV_DOUBLE",
            Opcode::DivInt => "DIV_INT",
            Opcode::FieldAccess => "FIELD_ACCESS",
            Opcode::Halt => "HALT",
            Opcode::Jeq => "JEQ",
            Opcode::Jge => "JGE",
            Opcode::Jgt => "JGT",
            Opcode::Jle => "JLE",
            Opcode::Jlt => "JLT",
            Opcode::Jmp => "JMP",
            Opcode::Jne => "JNE",
            Opcode::ModChar => "MOD_CHAR",
            Opcode::ModDouble => "MOD_DOUBLE",
            Opcode::ModInt => "MOD_INT",
            Opcode::Mov => "MOV",
            Opcode::MulChar => "MUL_CHAR",
            Opcode::MulDouble => "MUL_DOUBLE",
            Opcode::MulInt => "MUL_INT",
            Opcode::Nop => "NOP",
            Opcode::Not => "NOT",
            Opcode::Or => "OR",
            Opcode::SubChar => "SUB_CHAR",
            Opcode::SubDouble => "SUB_DOUBLE",
            Opcode::SubInt => "SUB_INT",
        }
    }

    /// Family and operator for arithmetic opcodes.
    pub fn arith(self) -> Option<(Family, ArithOp)> {
        let entry = match self {
            Opcode::AddChar => (Family::Char, ArithOp::Add),
            Opcode::SubChar => (Family::Char, ArithOp::Sub),
            Opcode::MulChar => (Family::Char, ArithOp::Mul),
            Opcode::DivChar => (Family::Char, ArithOp::Div),
            Opcode::ModChar => (Family::Char, ArithOp::Mod),
            Opcode::AddInt => (Family::Int, ArithOp::Add),
            Opcode::SubInt => (Family::Int, ArithOp::Sub),
            Opcode::MulInt => (Family::Int, ArithOp::Mul),
            Opcode::DivInt => (Family::Int, ArithOp::Div),
            Opcode::ModInt => (Family::Int, ArithOp::Mod),
            Opcode::AddDouble => (Family::Double, ArithOp::Add),
            Opcode::SubDouble => (Family::Double, ArithOp::Sub),
            Opcode::MulDouble => (Family::Double, ArithOp::Mul),
            Opcode::DivDouble => (Family::Double, ArithOp::Div),
            Opcode::ModDouble => (Family::Double, ArithOp::Mod),
            _ => return None,
        };
        Some(entry)
    }

    /// Branch predicate over the comparison register for jump opcodes.
    pub fn jump_condition(self) -> Option<fn(i32) -> bool> {
        let cond: fn(i32) -> bool = match self {
            Opcode::Jmp => |_| true,
            Opcode::Jeq => |c| c == 0,
            Opcode::Jne => |c| c != 0,
            Opcode::Jlt => |c| c < 0,
            Opcode::Jle => |c| c <= 0,
            Opcode::Jgt => |c| c > 0,
            Opcode::Jge => |c| c >= 0,
            _ => return None,
        };
        Some(cond)
    }

    /// Opcodes that dispatch but have no effect yet.
    pub fn is_reserved(self) -> bool {
        matches!(
            self,
            Opcode::And
                | Opcode::Or
                | Opcode::Not
                | Opcode::ArrayAccess
                | Opcode::FieldAccess
                | Opcode::ConcatString
                | Opcode::Mov
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl FromStr for Opcode {
    type Err = VmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_uppercase();
        Opcode::ALL
            .iter()
            .copied()
            .find(|op| op.mnemonic() == name)
            .ok_or_else(|| VmError::UnknownInstruction(s.to_string()))
    }
}

/// One instruction: an opcode and up to three operand locations.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub first: Option<MemLocation>,
    pub second: Option<MemLocation>,
    pub target: Option<MemLocation>,
}

impl Instruction {
    /// Instruction with no operands.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            first: None,
            second: None,
            target: None,
        }
    }

    /// `target = first <op> second`
    pub fn binary(opcode: Opcode, first: MemLocation, second: MemLocation, target: MemLocation) -> Self {
        Self {
            opcode,
            first: Some(first),
            second: Some(second),
            target: Some(target),
        }
    }

    /// Jump to an absolute instruction index.
    pub fn jump(opcode: Opcode, target: i32) -> Self {
        Self::new(opcode).with_target(MemLocation::immediate(target))
    }

    pub fn compare(first: MemLocation, second: MemLocation) -> Self {
        Self::new(Opcode::Cmp).with_first(first).with_second(second)
    }

    pub fn with_first(mut self, loc: MemLocation) -> Self {
        self.first = Some(loc);
        self
    }

    pub fn with_second(mut self, loc: MemLocation) -> Self {
        self.second = Some(loc);
        self
    }

    pub fn with_target(mut self, loc: MemLocation) -> Self {
        self.target = Some(loc);
        self
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        let operands = [&self.first, &self.second, &self.target];
        let mut sep = " ";
        for loc in operands.into_iter().flatten() {
            write!(f, "{}{}", sep, loc)?;
            sep = ", ";
        }
        Ok(())
    }
}

/// Compiled program: the instruction sequence and the seeded symbol table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub symbols: SymbolTable,
}

impl Program {
    pub fn new(instructions: Vec<Instruction>, symbols: SymbolTable) -> Self {
        Self {
            instructions,
            symbols,
        }
    }

    /// Append an instruction, returning its index.
    pub fn push(&mut self, instruction: Instruction) -> usize {
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    pub fn declare(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.symbols.declare(name, value);
        self
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.symbols.iter() {
            writeln!(f, "  .var {} = {}", name, value)?;
        }
        for (idx, instruction) in self.instructions.iter().enumerate() {
            writeln!(f, "  [{:04}] {}", idx, instruction)?;
        }
        Ok(())
    }
}
