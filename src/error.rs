// Copyright (C) 2025 Dayton Fishell
// Plume Script Engine
// This file is part of Plume.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version. See the LICENSE file in the project root for details.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Fault kinds raised while executing a script.
//!
//! Every variant is fatal: the VM records it as a [`Fault`] and stops.

use std::fmt;

use thiserror::Error;

use crate::bytecode::Opcode;
use crate::core::MemArea;
use crate::value::ValueType;

/// Operand slot of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    First,
    Second,
    Target,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Slot::First => "first",
            Slot::Second => "second",
            Slot::Target => "target",
        })
    }
}

/// Script execution errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VmError {
    #[error("unknown variable {0}")]
    UnknownVariable(String),
    #[error("stack underflow")]
    StackUnderflow,
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: ValueType, found: ValueType },
    #[error("invalid type {0}")]
    InvalidType(ValueType),
    #[error("invalid jump target {target} (program length {len})")]
    InvalidJumpTarget { target: i64, len: usize },
    #[error("division by zero")]
    DivisionByZero,
    #[error("unknown instruction {0}")]
    UnknownInstruction(String),
    #[error("unknown memory area {0}")]
    UnknownMemoryArea(String),
    #[error("cannot write to {0} memory")]
    InvalidWriteTarget(MemArea),
    #[error("missing {slot} operand")]
    MissingOperand { slot: Slot },
    #[error("invalid argument count {0}")]
    InvalidArity(i32),
    #[error("no host function {name}/{arity}")]
    UnknownFunction { name: String, arity: usize },
    #[error("host function {name} failed: {message}")]
    HostFunction { name: String, message: String },
}

/// A recorded fault: what went wrong and at which instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub pc: usize,
    pub opcode: Opcode,
    pub error: VmError,
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at pc {}: {}", self.opcode, self.pc, self.error)
    }
}

impl std::error::Error for Fault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
