// Copyright (C) 2025 Dayton Fishell
// Plume Script Engine
// This file is part of Plume.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version. See the LICENSE file in the project root for details.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Runtime values and the type tags used for operand checks.
//!
//! Numeric types widen along CHAR -> INT -> DOUBLE when an arithmetic family
//! asks for them. The widening rules live in [`ValueType::accepts`] and the
//! `as_*` accessors on [`Value`].

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

use crate::error::VmError;

bitflags! {
    /// A set of value types, used to describe what an operand slot accepts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TypeSet: u8 {
        const BOOLEAN = 0x01;
        const CHAR = 0x02;
        const INT = 0x04;
        const DOUBLE = 0x08;
        const STRING = 0x10;
        const IDENTIFIER = 0x20;
        const VOID = 0x40;

        const NUMERIC = Self::CHAR.bits() | Self::INT.bits() | Self::DOUBLE.bits();
    }
}

/// Type tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Boolean,
    Char,
    Int,
    Double,
    String,
    Identifier,
    Void,
}

impl ValueType {
    /// The single-member set for this type.
    pub fn bit(self) -> TypeSet {
        match self {
            ValueType::Boolean => TypeSet::BOOLEAN,
            ValueType::Char => TypeSet::CHAR,
            ValueType::Int => TypeSet::INT,
            ValueType::Double => TypeSet::DOUBLE,
            ValueType::String => TypeSet::STRING,
            ValueType::Identifier => TypeSet::IDENTIFIER,
            ValueType::Void => TypeSet::VOID,
        }
    }

    /// Operand types usable where `self` is required.
    ///
    /// STRING accepts anything since every value has a string form.
    /// IDENTIFIER and VOID accept nothing.
    pub fn accepts(self) -> TypeSet {
        match self {
            ValueType::Boolean => TypeSet::BOOLEAN,
            ValueType::Char => TypeSet::CHAR,
            ValueType::Int => TypeSet::CHAR | TypeSet::INT,
            ValueType::Double => TypeSet::NUMERIC,
            ValueType::String => TypeSet::all(),
            ValueType::Identifier | ValueType::Void => TypeSet::empty(),
        }
    }

    /// Whether this type can be an operand at all.
    pub fn is_concrete(self) -> bool {
        !matches!(self, ValueType::Identifier | ValueType::Void)
    }

    pub fn is_numeric(self) -> bool {
        TypeSet::NUMERIC.contains(self.bit())
    }

    /// Check that an operand declared as `found` may be used where `self` is
    /// required.
    pub fn check(self, found: ValueType) -> Result<(), VmError> {
        if self == ValueType::String {
            return Ok(());
        }
        if !found.is_concrete() {
            return Err(VmError::InvalidType(found));
        }
        if !self.accepts().contains(found.bit()) {
            return Err(VmError::TypeMismatch {
                expected: self,
                found,
            });
        }
        Ok(())
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueType::Boolean => "BOOLEAN",
            ValueType::Char => "CHAR",
            ValueType::Int => "INT",
            ValueType::Double => "DOUBLE",
            ValueType::String => "STRING",
            ValueType::Identifier => "IDENTIFIER",
            ValueType::Void => "VOID",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BOOLEAN" | "BOOL" => Ok(ValueType::Boolean),
            "CHAR" => Ok(ValueType::Char),
            "INT" => Ok(ValueType::Int),
            "DOUBLE" => Ok(ValueType::Double),
            "STRING" => Ok(ValueType::String),
            "IDENTIFIER" => Ok(ValueType::Identifier),
            "VOID" => Ok(ValueType::Void),
            _ => Err(s.to_string()),
        }
    }
}

/// A runtime value. Values are never mutated in place; every operation
/// builds a new one.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    /// A UTF-16 code unit.
    Char(u16),
    Int(i32),
    Double(f64),
    Str(String),
    Identifier(String),
    Void,
}

impl Value {
    /// Build a `Char` from a Rust `char`, if it fits in one code unit.
    pub fn char(c: char) -> Option<Self> {
        u16::try_from(u32::from(c)).ok().map(Value::Char)
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Boolean,
            Value::Char(_) => ValueType::Char,
            Value::Int(_) => ValueType::Int,
            Value::Double(_) => ValueType::Double,
            Value::Str(_) => ValueType::String,
            Value::Identifier(_) => ValueType::Identifier,
            Value::Void => ValueType::Void,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_char(&self) -> Option<u16> {
        match self {
            Value::Char(c) => Some(*c),
            _ => None,
        }
    }

    /// INT view of the value, widening CHAR.
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Char(c) => Some(i32::from(*c)),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// DOUBLE view of the value, widening CHAR and INT.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Char(c) => Some(f64::from(*c)),
            Value::Int(i) => Some(f64::from(*i)),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Name carried by a STRING or IDENTIFIER value.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Value::Str(s) | Value::Identifier(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Char(c) => match char::from_u32(u32::from(*c)) {
                Some(ch) => write!(f, "'{}'", ch),
                None => write!(f, "'\\u{{{:04x}}}'", c),
            },
            Value::Int(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Identifier(s) => f.write_str(s),
            Value::Void => f.write_str("void"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}
