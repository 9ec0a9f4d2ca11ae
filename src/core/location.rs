use std::fmt;
use std::str::FromStr;

use crate::error::VmError;
use crate::value::{Value, ValueType};

/// Memory area an operand lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemArea {
    Immediate,
    Stack,
    Variable,
}

impl fmt::Display for MemArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MemArea::Immediate => "IMMEDIATE",
            MemArea::Stack => "STACK",
            MemArea::Variable => "VARIABLE",
        })
    }
}

impl FromStr for MemArea {
    type Err = VmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "IMMEDIATE" => Ok(MemArea::Immediate),
            "STACK" => Ok(MemArea::Stack),
            "VARIABLE" => Ok(MemArea::Variable),
            _ => Err(VmError::UnknownMemoryArea(s.to_string())),
        }
    }
}

/// Operand addressing descriptor.
///
/// The type predicates report the type the compiler declared for the
/// operand. For immediates that is the literal's own type.
#[derive(Debug, Clone, PartialEq)]
pub enum MemLocation {
    /// Literal embedded in the instruction.
    Immediate(Value),
    /// Top of the operand stack, with its declared type.
    Stack(ValueType),
    /// Named variable, with its declared type.
    Variable { name: String, ty: ValueType },
}

impl MemLocation {
    pub fn immediate(value: impl Into<Value>) -> Self {
        MemLocation::Immediate(value.into())
    }

    pub fn stack(ty: ValueType) -> Self {
        MemLocation::Stack(ty)
    }

    pub fn variable(name: impl Into<String>, ty: ValueType) -> Self {
        MemLocation::Variable {
            name: name.into(),
            ty,
        }
    }

    pub fn area(&self) -> MemArea {
        match self {
            MemLocation::Immediate(_) => MemArea::Immediate,
            MemLocation::Stack(_) => MemArea::Stack,
            MemLocation::Variable { .. } => MemArea::Variable,
        }
    }

    pub fn declared_type(&self) -> ValueType {
        match self {
            MemLocation::Immediate(value) => value.value_type(),
            MemLocation::Stack(ty) => *ty,
            MemLocation::Variable { ty, .. } => *ty,
        }
    }

    pub fn is_boolean(&self) -> bool {
        self.declared_type() == ValueType::Boolean
    }

    pub fn is_char(&self) -> bool {
        self.declared_type() == ValueType::Char
    }

    pub fn is_int(&self) -> bool {
        self.declared_type() == ValueType::Int
    }

    pub fn is_double(&self) -> bool {
        self.declared_type() == ValueType::Double
    }
}

impl fmt::Display for MemLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemLocation::Immediate(value) => write!(f, "#{}", value),
            MemLocation::Stack(ty) => write!(f, "[stack:{}]", ty),
            MemLocation::Variable { name, ty } => write!(f, "{}:{}", name, ty),
        }
    }
}
