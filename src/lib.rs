// Copyright (C) 2025 Dayton Fishell
// Plume Script Engine
// This file is part of Plume.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version. See the LICENSE file in the project root for details.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Plume embedded script engine
//!
//! This library provides the execution core for host-embedded scripts: a
//! typed, instruction-stepping VM, the host function registry that `CALL`
//! resolves against, and a background runner that drives scripts off the
//! host's main thread.

pub mod arith;
pub mod bytecode;
pub mod core;
pub mod error;
pub mod host;
#[cfg(feature = "serde-spec")]
pub mod program;
pub mod runner;
pub mod value;
pub mod vm;

// Re-export commonly used types
pub use bytecode::{Instruction, Opcode, Program};
pub use core::{MemArea, MemLocation, OperandStack, SymbolTable};
pub use error::{Fault, VmError};
pub use host::FunctionRegistry;
pub use runner::{RunnerConfig, ScriptRunner};
pub use value::{Value, ValueType};
pub use vm::{ExecState, ScriptVm};
