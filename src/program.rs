//! Compiled-program loader
//!
//! Reads a [`Program`] from the JSON or YAML interchange format the script
//! compiler emits:
//!
//! ```yaml
//! symbols:
//!   a: { type: INT, value: 5 }
//! instructions:
//!   - op: ADD_INT
//!     first:  { area: IMMEDIATE, type: INT, value: 3 }
//!     second: { area: VARIABLE, type: INT, name: a }
//!     target: { area: VARIABLE, type: INT, name: a }
//!   - op: HALT
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::bytecode::{Instruction, Opcode, Program};
use crate::core::{MemArea, MemLocation, SymbolTable};
use crate::error::VmError;
use crate::value::{Value, ValueType};

#[derive(Debug, Error)]
pub enum ProgramError {
    #[error("failed to read program: {0}")]
    Io(#[from] io::Error),
    #[error("invalid JSON program: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML program: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unsupported program file extension {0:?}")]
    UnknownFormat(String),
    #[error("instruction {index}: {source}")]
    Decode {
        index: usize,
        #[source]
        source: VmError,
    },
    #[error("{context}: {message}")]
    InvalidLiteral { context: String, message: String },
}

#[derive(Debug, Deserialize)]
struct RawProgram {
    #[serde(default)]
    symbols: BTreeMap<String, RawValue>,
    #[serde(default)]
    instructions: Vec<RawInstruction>,
}

#[derive(Debug, Deserialize)]
struct RawInstruction {
    op: String,
    first: Option<RawLocation>,
    second: Option<RawLocation>,
    target: Option<RawLocation>,
}

#[derive(Debug, Deserialize)]
struct RawLocation {
    area: String,
    #[serde(rename = "type")]
    ty: Option<String>,
    value: Option<Literal>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawValue {
    #[serde(rename = "type")]
    ty: String,
    value: Option<Literal>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Literal {
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
}

impl Program {
    pub fn from_json(text: &str) -> Result<Self, ProgramError> {
        let raw: RawProgram = serde_json::from_str(text)?;
        raw.build()
    }

    pub fn from_yaml(text: &str) -> Result<Self, ProgramError> {
        let raw: RawProgram = serde_yaml::from_str(text)?;
        raw.build()
    }

    /// Load a program file, picking the format from its extension.
    pub fn from_file(path: &Path) -> Result<Self, ProgramError> {
        let text = fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "json" => Self::from_json(&text),
            "yaml" | "yml" => Self::from_yaml(&text),
            _ => Err(ProgramError::UnknownFormat(ext)),
        }
    }
}

impl RawProgram {
    fn build(self) -> Result<Program, ProgramError> {
        let mut symbols = SymbolTable::new();
        for (name, raw) in self.symbols {
            let context = format!("symbol {}", name);
            let ty = parse_type(&raw.ty, &context)?;
            let value = literal_value(ty, raw.value, &context)?;
            symbols.declare(name, value);
        }

        let instructions = self
            .instructions
            .into_iter()
            .enumerate()
            .map(|(index, raw)| raw.build(index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Program::new(instructions, symbols))
    }
}

impl RawInstruction {
    fn build(self, index: usize) -> Result<Instruction, ProgramError> {
        let opcode: Opcode = self
            .op
            .parse()
            .map_err(|source| ProgramError::Decode { index, source })?;
        let location = |raw: Option<RawLocation>| raw.map(|loc| loc.build(index)).transpose();
        Ok(Instruction {
            opcode,
            first: location(self.first)?,
            second: location(self.second)?,
            target: location(self.target)?,
        })
    }
}

impl RawLocation {
    fn build(self, index: usize) -> Result<MemLocation, ProgramError> {
        let area: MemArea = self
            .area
            .parse()
            .map_err(|source| ProgramError::Decode { index, source })?;
        let context = format!("instruction {}", index);
        let ty = match &self.ty {
            Some(name) => Some(parse_type(name, &context)?),
            None => None,
        };

        match area {
            MemArea::Immediate => {
                let ty = ty.or_else(|| self.value.as_ref().map(Literal::natural_type));
                let ty = ty.ok_or_else(|| invalid(&context, "immediate without type or value"))?;
                Ok(MemLocation::Immediate(literal_value(ty, self.value, &context)?))
            }
            MemArea::Stack => {
                let ty = ty.ok_or_else(|| invalid(&context, "stack operand without type"))?;
                Ok(MemLocation::Stack(ty))
            }
            MemArea::Variable => {
                let ty = ty.ok_or_else(|| invalid(&context, "variable operand without type"))?;
                let name = self
                    .name
                    .ok_or_else(|| invalid(&context, "variable operand without name"))?;
                Ok(MemLocation::Variable { name, ty })
            }
        }
    }
}

impl Literal {
    fn natural_type(&self) -> ValueType {
        match self {
            Literal::Bool(_) => ValueType::Boolean,
            Literal::Int(_) => ValueType::Int,
            Literal::Double(_) => ValueType::Double,
            Literal::Str(_) => ValueType::String,
        }
    }
}

fn invalid(context: &str, message: impl Into<String>) -> ProgramError {
    ProgramError::InvalidLiteral {
        context: context.to_string(),
        message: message.into(),
    }
}

fn parse_type(name: &str, context: &str) -> Result<ValueType, ProgramError> {
    name.parse()
        .map_err(|bad| invalid(context, format!("unknown type {}", bad)))
}

/// Convert a literal into a value of the declared type.
fn literal_value(ty: ValueType, literal: Option<Literal>, context: &str) -> Result<Value, ProgramError> {
    let mismatch = |lit: &Option<Literal>| invalid(context, format!("{:?} is not a valid {}", lit, ty));
    let value = match (ty, &literal) {
        (ValueType::Void, None) => Value::Void,
        (ValueType::Boolean, Some(Literal::Bool(b))) => Value::Bool(*b),
        (ValueType::Int, Some(Literal::Int(i))) => {
            Value::Int(i32::try_from(*i).map_err(|_| mismatch(&literal))?)
        }
        (ValueType::Double, Some(Literal::Int(i))) => Value::Double(*i as f64),
        (ValueType::Double, Some(Literal::Double(d))) => Value::Double(*d),
        (ValueType::Char, Some(Literal::Str(s))) => {
            let mut chars = s.chars();
            match (chars.next().and_then(Value::char), chars.next()) {
                (Some(c), None) => c,
                _ => return Err(mismatch(&literal)),
            }
        }
        (ValueType::String, Some(Literal::Str(s))) => Value::Str(s.clone()),
        (ValueType::Identifier, Some(Literal::Str(s))) => Value::Identifier(s.clone()),
        _ => return Err(mismatch(&literal)),
    };
    Ok(value)
}
