// Copyright (C) 2025 Dayton Fishell
// Plume Script Engine
// This file is part of Plume.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version. See the LICENSE file in the project root for details.
// SPDX-License-Identifier: GPL-3.0-or-later

// Demo driver for the Plume script engine.
use std::sync::Arc;

use anyhow::{Result, bail};
use plume_core::runner::Outcome;
use plume_core::{
    ExecState, FunctionRegistry, Instruction, MemLocation, Opcode, Program, RunnerConfig,
    ScriptRunner, ScriptVm, Value, ValueType,
};

/// Instructions a script may run before the demo gives up on it.
const MAX_INSTRUCTIONS: u64 = 1_000_000;

fn main() -> Result<()> {
    env_logger::init();

    println!("Plume Script Engine v0.1.0");
    println!("==========================");
    println!();

    let program = match std::env::args().nth(1) {
        Some(path) => load_program(&path)?,
        None => demo_program(),
    };

    println!("Program:");
    print!("{}", program);
    println!();

    // Step the first copy by hand, like a debugger would
    let mut vm = ScriptVm::new(program.clone()).with_functions(host_functions()?);
    let mut instruction_count = 0;
    while !vm.is_finished() && instruction_count < MAX_INSTRUCTIONS {
        vm.step();
        instruction_count += 1;
    }

    let stats = vm.stats();
    println!("Stepped run:");
    println!("  PC:           {}", stats.pc);
    println!("  Instructions: {}", stats.steps);
    println!("  Stack depth:  {}", stats.stack_depth);
    match vm.state() {
        ExecState::Finished => println!("  State:        finished"),
        ExecState::Faulted(fault) => println!("  State:        faulted ({})", fault),
        ExecState::Running => println!("  State:        still running after {} steps", MAX_INSTRUCTIONS),
    }
    println!();

    // Run the second copy on the background runner
    let mut runner = ScriptRunner::start(RunnerConfig {
        max_instructions: Some(MAX_INSTRUCTIONS),
        ..RunnerConfig::default()
    })?;
    let handle = runner.submit(ScriptVm::new(program).with_functions(host_functions()?))?;
    let report = handle.wait()?;
    runner.shutdown();

    println!("Runner report:");
    println!("  Outcome:      {:?}", report.outcome);
    println!("  Instructions: {}", report.steps);
    println!("Variables:");
    for (name, value) in report.symbols.iter() {
        println!("  {:<12} {}", name, value);
    }
    println!();

    match report.outcome {
        Outcome::Finished => {
            println!("✓ Script finished successfully!");
            Ok(())
        }
        other => bail!("script did not finish: {:?}", other),
    }
}

fn host_functions() -> Result<Arc<FunctionRegistry>> {
    let mut registry = FunctionRegistry::new();
    registry.register("console", "print", 1, |args| {
        println!("  [script] {}", args[0]);
        Ok(Value::Void)
    })?;
    Ok(Arc::new(registry))
}

#[cfg(feature = "serde-spec")]
fn load_program(path: &str) -> Result<Program> {
    use anyhow::Context;

    Program::from_file(std::path::Path::new(path))
        .with_context(|| format!("failed to load program {}", path))
}

#[cfg(not(feature = "serde-spec"))]
fn load_program(path: &str) -> Result<Program> {
    bail!("cannot load {}: program loading needs the serde-spec feature", path)
}

/// Sum 1..=10 into `total`, printing the running value each iteration.
fn demo_program() -> Program {
    let int = |name: &str| MemLocation::variable(name, ValueType::Int);
    let mut program = Program::default();
    program.declare("i", Value::Int(1)).declare("total", Value::Int(0));

    let top = program.push(Instruction::compare(int("i"), MemLocation::immediate(10)));
    let exit = program.push(Instruction::jump(Opcode::Jgt, 0));
    program.push(Instruction::binary(Opcode::AddInt, int("total"), int("i"), int("total")));
    program.push(Instruction::binary(
        Opcode::AddInt,
        int("total"),
        MemLocation::immediate(0),
        MemLocation::stack(ValueType::Int),
    ));
    program.push(
        Instruction::new(Opcode::Call)
            .with_first(MemLocation::immediate(Value::Identifier("print".into())))
            .with_second(MemLocation::immediate(1)),
    );
    program.push(Instruction::binary(Opcode::AddInt, int("i"), MemLocation::immediate(1), int("i")));
    program.push(Instruction::jump(Opcode::Jmp, top as i32));
    let end = program.push(Instruction::new(Opcode::Halt));

    // Patch the loop exit now that the end is known
    program.instructions[exit] = Instruction::jump(Opcode::Jgt, end as i32);
    program
}
