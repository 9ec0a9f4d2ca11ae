//! Script VM
//!
//! Executes a compiled [`Program`] one instruction per [`ScriptVm::step`].
//! Every fault is caught inside `step`, logged, and turned into a halt; the
//! host observes it through [`ScriptVm::state`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::arith;
use crate::bytecode::{Instruction, Opcode, Program};
use crate::core::{MemArea, MemLocation, OperandStack, SymbolTable};
use crate::error::{Fault, Slot, VmError};
use crate::host::FunctionRegistry;
use crate::value::{Value, ValueType};

/// Externally visible execution state.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecState {
    /// More instructions to execute.
    Running,
    /// Stopped by `HALT` or by running off the end of the program.
    Finished,
    /// Stopped by a fault.
    Faulted(Fault),
}

impl ExecState {
    pub fn is_finished(&self) -> bool {
        !matches!(self, ExecState::Running)
    }
}

/// Script VM state
pub struct ScriptVm {
    /// Loaded instruction sequence
    instructions: Arc<[Instruction]>,
    /// Variables, seeded by the compiler
    symbols: SymbolTable,
    /// Operand stack
    stack: OperandStack,
    /// Index of the next instruction
    pc: usize,
    /// Result of the most recent CMP
    last_comparison: i32,
    /// Set by HALT and by faults; nothing runs afterwards
    halted: bool,
    fault: Option<Fault>,
    functions: Option<Arc<FunctionRegistry>>,
    steps: u64,
}

impl ScriptVm {
    /// Create a new VM instance from a compiled program
    pub fn new(program: Program) -> Self {
        Self {
            instructions: program.instructions.into(),
            symbols: program.symbols,
            stack: OperandStack::new(),
            pc: 0,
            last_comparison: 0,
            halted: false,
            fault: None,
            functions: None,
            steps: 0,
        }
    }

    /// Attach the host functions `CALL` resolves against.
    pub fn with_functions(mut self, functions: Arc<FunctionRegistry>) -> Self {
        self.functions = Some(functions);
        self
    }

    /// Execute a single instruction. Does nothing once finished.
    pub fn step(&mut self) {
        if self.is_finished() {
            return;
        }

        let program = Arc::clone(&self.instructions);
        let pc = self.pc;
        let instruction = &program[pc];
        self.steps += 1;
        log::trace!("[{:04}] {}", pc, instruction);

        if let Err(error) = self.execute(instruction) {
            log::warn!("script fault at [{:04}] {}: {}", pc, instruction, error);
            self.fault = Some(Fault {
                pc,
                opcode: instruction.opcode,
                error,
            });
            self.halt();
        }
    }

    /// Step until finished or until `max_steps` instructions have run.
    pub fn run(&mut self, max_steps: u64) -> ExecState {
        let mut remaining = max_steps;
        while remaining > 0 && !self.is_finished() {
            self.step();
            remaining -= 1;
        }
        self.state()
    }

    pub fn state(&self) -> ExecState {
        match (&self.fault, self.is_finished()) {
            (Some(fault), _) => ExecState::Faulted(fault.clone()),
            (None, true) => ExecState::Finished,
            (None, false) => ExecState::Running,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.halted || self.pc >= self.instructions.len()
    }

    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    /// Error kind of the fault that stopped the script, if any.
    pub fn error(&self) -> Option<&VmError> {
        self.fault.as_ref().map(|f| &f.error)
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Number of instructions in the program.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn last_comparison(&self) -> i32 {
        self.last_comparison
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn stack(&self) -> &OperandStack {
        &self.stack
    }

    /// Instructions executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn into_symbols(self) -> SymbolTable {
        self.symbols
    }

    pub fn stats(&self) -> VmStats {
        VmStats {
            pc: self.pc,
            steps: self.steps,
            stack_depth: self.stack.len(),
            halted: self.is_finished(),
        }
    }

    fn halt(&mut self) {
        self.halted = true;
        self.pc = self.instructions.len();
    }

    fn execute(&mut self, instruction: &Instruction) -> Result<(), VmError> {
        match instruction.opcode {
            Opcode::AddChar
            | Opcode::AddDouble
            | Opcode::AddInt
            | Opcode::SubChar
            | Opcode::SubDouble
            | Opcode::SubInt
            | Opcode::MulChar
            | Opcode::MulDouble
            | Opcode::MulInt
            | Opcode::DivChar
            | Opcode::DivDouble
            | Opcode::DivInt
            | Opcode::ModChar
            | Opcode::ModDouble
            | Opcode::ModInt => self.arithmetic(instruction)?,

            Opcode::Jmp
            | Opcode::Jeq
            | Opcode::Jne
            | Opcode::Jlt
            | Opcode::Jle
            | Opcode::Jgt
            | Opcode::Jge => return self.jump(instruction),

            Opcode::Cmp => self.compare(instruction)?,
            Opcode::Call => self.call(instruction)?,

            Opcode::Halt => {
                self.halt();
                return Ok(());
            }

            Opcode::Nop => {}

            // Reserved
            Opcode::And
            | Opcode::Or
            | Opcode::Not
            | Opcode::ArrayAccess
            | Opcode::FieldAccess
            | Opcode::ConcatString
            | Opcode::Mov => {}
        }
        self.pc += 1;
        Ok(())
    }

    fn operand(instruction: &Instruction, slot: Slot) -> Result<&MemLocation, VmError> {
        let loc = match slot {
            Slot::First => &instruction.first,
            Slot::Second => &instruction.second,
            Slot::Target => &instruction.target,
        };
        loc.as_ref().ok_or(VmError::MissingOperand { slot })
    }

    /// Read an operand. Stack reads pop.
    fn load(&mut self, from: &MemLocation) -> Result<Value, VmError> {
        match from {
            MemLocation::Immediate(value) => Ok(value.clone()),
            MemLocation::Stack(_) => self.stack.pop(),
            MemLocation::Variable { name, .. } => self.symbols.load(name),
        }
    }

    fn store(&mut self, value: Value, to: &MemLocation) -> Result<(), VmError> {
        match to {
            MemLocation::Immediate(_) => Err(VmError::InvalidWriteTarget(MemArea::Immediate)),
            MemLocation::Stack(_) => {
                self.stack.push(value);
                Ok(())
            }
            MemLocation::Variable { name, .. } => self.symbols.store(name, value),
        }
    }

    fn arithmetic(&mut self, instruction: &Instruction) -> Result<(), VmError> {
        let (family, op) = instruction
            .opcode
            .arith()
            .ok_or_else(|| VmError::UnknownInstruction(instruction.opcode.to_string()))?;
        let first = Self::operand(instruction, Slot::First)?;
        let second = Self::operand(instruction, Slot::Second)?;
        let target = Self::operand(instruction, Slot::Target)?;

        let lhs = self.load(first)?;
        let rhs = self.load(second)?;

        let required = family.required();
        required.check(first.declared_type())?;
        required.check(second.declared_type())?;

        let result = family.apply(op, &lhs, &rhs)?;
        self.store(result, target)
    }

    /// Conditional and unconditional jumps. The target is validated whether
    /// or not the branch is taken.
    fn jump(&mut self, instruction: &Instruction) -> Result<(), VmError> {
        let taken = instruction
            .opcode
            .jump_condition()
            .ok_or_else(|| VmError::UnknownInstruction(instruction.opcode.to_string()))?;
        let location = Self::operand(instruction, Slot::Target)?;
        ValueType::Int.check(location.declared_type())?;
        let raw = self.load(location)?;
        let target = raw.as_int().ok_or(VmError::TypeMismatch {
            expected: ValueType::Int,
            found: raw.value_type(),
        })?;

        // Jumping to len is how a script bails out early.
        let len = self.instructions.len();
        let dest = usize::try_from(target)
            .ok()
            .filter(|&dest| dest <= len)
            .ok_or(VmError::InvalidJumpTarget {
                target: i64::from(target),
                len,
            })?;

        if taken(self.last_comparison) {
            self.pc = dest;
        } else {
            self.pc += 1;
        }
        Ok(())
    }

    fn compare(&mut self, instruction: &Instruction) -> Result<(), VmError> {
        let first = Self::operand(instruction, Slot::First)?;
        let second = Self::operand(instruction, Slot::Second)?;
        let lhs = self.load(first)?;
        let rhs = self.load(second)?;
        self.last_comparison = arith::compare(&lhs, &rhs)?;
        Ok(())
    }

    /// Invoke a host function. Without a registry attached this is a no-op.
    ///
    /// `first` names the function, `second` gives the argument count and the
    /// arguments are popped off the stack, last parameter on top. A non-void
    /// result goes to `target` when there is one.
    fn call(&mut self, instruction: &Instruction) -> Result<(), VmError> {
        let Some(functions) = self.functions.clone() else {
            return Ok(());
        };

        let name_value = self.load(Self::operand(instruction, Slot::First)?)?;
        let name = name_value.as_name().ok_or(VmError::TypeMismatch {
            expected: ValueType::Identifier,
            found: name_value.value_type(),
        })?;
        let arity_value = self.load(Self::operand(instruction, Slot::Second)?)?;
        let arity = arity_value.as_int().ok_or(VmError::TypeMismatch {
            expected: ValueType::Int,
            found: arity_value.value_type(),
        })?;
        let arity = usize::try_from(arity).map_err(|_| VmError::InvalidArity(arity))?;

        let func = functions
            .lookup(name, arity)
            .ok_or_else(|| VmError::UnknownFunction {
                name: name.to_string(),
                arity,
            })?;

        let mut args = Vec::with_capacity(arity);
        for _ in 0..arity {
            args.push(self.stack.pop()?);
        }
        args.reverse();

        // A panicking host function faults this script only.
        let result = panic::catch_unwind(AssertUnwindSafe(|| func(&args)))
            .unwrap_or_else(|payload| Err(panic_message(payload.as_ref())))
            .map_err(|message| VmError::HostFunction {
                name: name.to_string(),
                message,
            })?;
        log::debug!("host call {}/{} -> {}", name, arity, result);

        match (&instruction.target, result) {
            (_, Value::Void) | (None, _) => Ok(()),
            (Some(target), result) => self.store(result, target),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

/// VM execution statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmStats {
    pub pc: usize,
    pub steps: u64,
    pub stack_depth: usize,
    pub halted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn int_var(name: &str) -> MemLocation {
        MemLocation::variable(name, ValueType::Int)
    }

    fn vm(instructions: Vec<Instruction>, symbols: &[(&str, Value)]) -> ScriptVm {
        let symbols = symbols.iter().cloned().collect();
        ScriptVm::new(Program::new(instructions, symbols))
    }

    fn error_of(vm: &ScriptVm) -> VmError {
        vm.error().cloned().expect("vm should have faulted")
    }

    #[test]
    fn empty_program_is_finished() {
        let mut vm = vm(vec![], &[]);
        assert!(vm.is_finished());
        assert_eq!(vm.state(), ExecState::Finished);
        vm.step();
        assert_eq!(vm.pc(), 0);
        assert_eq!(vm.steps(), 0);
        assert!(vm.stack().is_empty());
    }

    #[test]
    fn add_int_then_halt() {
        let mut vm = vm(
            vec![
                Instruction::binary(
                    Opcode::AddInt,
                    MemLocation::immediate(3),
                    int_var("a"),
                    int_var("a"),
                ),
                Instruction::new(Opcode::Halt),
            ],
            &[("a", Value::Int(5))],
        );

        vm.step();
        assert_eq!(vm.symbols().get("a"), Some(&Value::Int(8)));
        assert_eq!(vm.pc(), 1);
        assert_eq!(vm.state(), ExecState::Running);

        vm.step();
        assert_eq!(vm.state(), ExecState::Finished);
        assert_eq!(vm.pc(), 2);
        assert_eq!(vm.error(), None);
    }

    #[test]
    fn add_int_immediate_and_variable() {
        for (x, y) in [(0, 0), (-4, 9), (1000, -1000), (i32::MAX, 0)] {
            let mut vm = vm(
                vec![Instruction::binary(
                    Opcode::AddInt,
                    MemLocation::immediate(x),
                    int_var("y"),
                    int_var("out"),
                )],
                &[("y", Value::Int(y)), ("out", Value::Int(0))],
            );
            vm.step();
            assert_eq!(vm.symbols().get("out"), Some(&Value::Int(x + y)));
            assert_eq!(vm.pc(), 1);
        }
    }

    #[test]
    fn div_int_by_zero_faults() {
        let mut vm = vm(
            vec![Instruction::binary(
                Opcode::DivInt,
                MemLocation::immediate(10),
                MemLocation::immediate(0),
                int_var("a"),
            )],
            &[("a", Value::Int(0))],
        );
        vm.step();
        assert_eq!(error_of(&vm), VmError::DivisionByZero);
        assert_eq!(vm.symbols().get("a"), Some(&Value::Int(0)));
        assert_eq!(vm.pc(), vm.len());
        assert!(matches!(vm.state(), ExecState::Faulted(Fault { pc: 0, opcode: Opcode::DivInt, .. })));
    }

    #[test]
    fn stack_underflow_halts_for_good() {
        let mut vm = vm(
            vec![
                Instruction::binary(
                    Opcode::AddInt,
                    MemLocation::stack(ValueType::Int),
                    MemLocation::immediate(1),
                    int_var("a"),
                ),
                Instruction::new(Opcode::Nop),
                Instruction::new(Opcode::Nop),
            ],
            &[("a", Value::Int(0))],
        );
        vm.step();
        assert_eq!(error_of(&vm), VmError::StackUnderflow);
        assert_eq!(vm.pc(), 3);

        let before = vm.stats();
        vm.step();
        vm.step();
        assert_eq!(vm.stats(), before);
    }

    #[test]
    fn storing_double_into_int_variable_faults() {
        let mut vm = vm(
            vec![Instruction::binary(
                Opcode::AddDouble,
                MemLocation::immediate(1.5),
                MemLocation::immediate(1),
                int_var("n"),
            )],
            &[("n", Value::Int(7))],
        );
        vm.step();
        assert_eq!(
            error_of(&vm),
            VmError::TypeMismatch {
                expected: ValueType::Int,
                found: ValueType::Double,
            }
        );
        assert_eq!(vm.symbols().get("n"), Some(&Value::Int(7)));
    }

    #[test]
    fn unknown_variable_faults() {
        let mut vm = vm(
            vec![Instruction::binary(
                Opcode::SubInt,
                int_var("missing"),
                MemLocation::immediate(1),
                MemLocation::stack(ValueType::Int),
            )],
            &[],
        );
        vm.step();
        assert_eq!(error_of(&vm), VmError::UnknownVariable("missing".into()));
    }

    #[test]
    fn writing_to_immediate_faults() {
        let mut vm = vm(
            vec![Instruction::binary(
                Opcode::AddInt,
                MemLocation::immediate(1),
                MemLocation::immediate(2),
                MemLocation::immediate(0),
            )],
            &[],
        );
        vm.step();
        assert_eq!(error_of(&vm), VmError::InvalidWriteTarget(MemArea::Immediate));
    }

    #[test]
    fn missing_operand_faults() {
        let mut vm = vm(vec![Instruction::new(Opcode::MulInt)], &[]);
        vm.step();
        assert_eq!(error_of(&vm), VmError::MissingOperand { slot: Slot::First });
    }

    #[test]
    fn declared_type_is_checked() {
        // A DOUBLE-declared operand cannot feed an INT op.
        let mut vm = vm(
            vec![Instruction::binary(
                Opcode::AddInt,
                MemLocation::variable("d", ValueType::Double),
                MemLocation::immediate(1),
                MemLocation::stack(ValueType::Int),
            )],
            &[("d", Value::Double(2.0))],
        );
        vm.step();
        assert_eq!(
            error_of(&vm),
            VmError::TypeMismatch {
                expected: ValueType::Int,
                found: ValueType::Double,
            }
        );
    }

    #[test]
    fn identifier_operand_is_invalid_type() {
        let mut vm = vm(
            vec![Instruction::binary(
                Opcode::AddDouble,
                MemLocation::immediate(Value::Identifier("x".into())),
                MemLocation::immediate(1.0),
                MemLocation::stack(ValueType::Double),
            )],
            &[],
        );
        vm.step();
        assert_eq!(error_of(&vm), VmError::InvalidType(ValueType::Identifier));
    }

    #[test]
    fn char_widens_into_double() {
        let mut vm = vm(
            vec![Instruction::binary(
                Opcode::MulDouble,
                MemLocation::immediate(Value::Char(2)),
                MemLocation::immediate(1.25),
                MemLocation::variable("d", ValueType::Double),
            )],
            &[("d", Value::Double(0.0))],
        );
        vm.step();
        assert_eq!(vm.symbols().get("d"), Some(&Value::Double(2.5)));
    }

    #[test]
    fn stack_operands_pop_first_then_second() {
        let mut vm = vm(
            vec![
                Instruction::binary(
                    Opcode::AddInt,
                    MemLocation::immediate(10),
                    MemLocation::immediate(0),
                    MemLocation::stack(ValueType::Int),
                ),
                Instruction::binary(
                    Opcode::AddInt,
                    MemLocation::immediate(3),
                    MemLocation::immediate(0),
                    MemLocation::stack(ValueType::Int),
                ),
                // first pops 3, second pops 10
                Instruction::binary(
                    Opcode::SubInt,
                    MemLocation::stack(ValueType::Int),
                    MemLocation::stack(ValueType::Int),
                    int_var("r"),
                ),
            ],
            &[("r", Value::Int(0))],
        );
        assert_eq!(vm.run(10), ExecState::Finished);
        assert_eq!(vm.symbols().get("r"), Some(&Value::Int(-7)));
        assert!(vm.stack().is_empty());
    }

    fn cmp_then(jump: Opcode) -> ScriptVm {
        vm(
            vec![
                Instruction::compare(MemLocation::immediate(3), MemLocation::immediate(5)),
                Instruction::jump(jump, 4),
                Instruction::new(Opcode::Nop),
                Instruction::new(Opcode::Nop),
                Instruction::new(Opcode::Halt),
            ],
            &[],
        )
    }

    #[test]
    fn cmp_then_jlt_jumps() {
        let mut vm = cmp_then(Opcode::Jlt);
        vm.step();
        assert_eq!(vm.last_comparison(), -1);
        assert_eq!(vm.pc(), 1);
        vm.step();
        assert_eq!(vm.pc(), 4);
    }

    #[test]
    fn cmp_then_jge_falls_through() {
        let mut vm = cmp_then(Opcode::Jge);
        vm.step();
        vm.step();
        assert_eq!(vm.pc(), 2);
        assert_eq!(vm.last_comparison(), -1);
    }

    #[test]
    fn jumps_do_not_touch_comparison_register() {
        let mut vm = cmp_then(Opcode::Jne);
        vm.run(100);
        assert_eq!(vm.last_comparison(), -1);
        assert_eq!(vm.state(), ExecState::Finished);
    }

    #[test]
    fn invalid_jump_targets() {
        for target in [-1, 3, 100] {
            let mut vm = vm(
                vec![Instruction::jump(Opcode::Jmp, target), Instruction::new(Opcode::Nop)],
                &[],
            );
            vm.step();
            assert_eq!(
                error_of(&vm),
                VmError::InvalidJumpTarget {
                    target: i64::from(target),
                    len: 2,
                }
            );
            assert_eq!(vm.pc(), 2);
        }
    }

    #[test]
    fn untaken_jump_still_validates_target() {
        // last_comparison starts at 0, so JNE does not fire
        let mut vm = vm(vec![Instruction::jump(Opcode::Jne, 9)], &[]);
        vm.step();
        assert!(matches!(vm.error(), Some(VmError::InvalidJumpTarget { .. })));
    }

    #[test]
    fn jump_to_length_finishes_normally() {
        let mut vm = vm(
            vec![Instruction::jump(Opcode::Jmp, 2), Instruction::new(Opcode::Nop)],
            &[],
        );
        vm.step();
        assert_eq!(vm.state(), ExecState::Finished);
        assert_eq!(vm.pc(), 2);
    }

    #[test]
    fn countdown_loop() {
        // n = 5; while n > 0 { n -= 1; total += 2 }
        let program = vec![
            Instruction::compare(int_var("n"), MemLocation::immediate(0)),
            Instruction::jump(Opcode::Jle, 5),
            Instruction::binary(Opcode::SubInt, int_var("n"), MemLocation::immediate(1), int_var("n")),
            Instruction::binary(Opcode::AddInt, int_var("total"), MemLocation::immediate(2), int_var("total")),
            Instruction::jump(Opcode::Jmp, 0),
            Instruction::new(Opcode::Halt),
        ];
        let mut vm = vm(program, &[("n", Value::Int(5)), ("total", Value::Int(0))]);
        assert_eq!(vm.run(1_000), ExecState::Finished);
        assert_eq!(vm.symbols().get("n"), Some(&Value::Int(0)));
        assert_eq!(vm.symbols().get("total"), Some(&Value::Int(10)));
        // 5 iterations of 5 instructions, then CMP, JLE, HALT
        assert_eq!(vm.steps(), 28);
    }

    #[test]
    fn run_respects_budget() {
        let mut vm = vm(vec![Instruction::jump(Opcode::Jmp, 0)], &[]);
        assert_eq!(vm.run(50), ExecState::Running);
        assert_eq!(vm.steps(), 50);
        assert_eq!(vm.pc(), 0);
    }

    #[test]
    fn reserved_opcodes_only_advance() {
        let reserved: Vec<_> = Opcode::ALL.into_iter().filter(|op| op.is_reserved()).collect();
        let len = reserved.len();
        let mut vm = vm(reserved.into_iter().map(Instruction::new).collect(), &[("x", Value::Int(1))]);
        for expected_pc in 1..=len {
            vm.step();
            assert_eq!(vm.pc(), expected_pc);
        }
        assert_eq!(vm.state(), ExecState::Finished);
        assert_eq!(vm.symbols().get("x"), Some(&Value::Int(1)));
    }

    #[test]
    fn call_without_registry_is_noop() {
        let mut vm = vm(
            vec![Instruction::new(Opcode::Call)
                .with_first(MemLocation::immediate(Value::Identifier("print".into())))
                .with_second(MemLocation::immediate(1))],
            &[],
        );
        vm.step();
        assert_eq!(vm.state(), ExecState::Finished);
    }

    fn registry() -> Arc<FunctionRegistry> {
        let mut reg = FunctionRegistry::new();
        reg.register("math", "max", 2, |args| {
            let a = args[0].as_int().ok_or("expected int")?;
            let b = args[1].as_int().ok_or("expected int")?;
            Ok(Value::Int(a.max(b)))
        })
        .unwrap();
        reg.register("math", "fail", 0, |_| Err("boom".to_string()))
            .unwrap();
        reg.register("math", "crash", 0, |_| panic!("host bug")).unwrap();
        Arc::new(reg)
    }

    fn push_int(value: i32) -> Instruction {
        Instruction::binary(
            Opcode::AddInt,
            MemLocation::immediate(value),
            MemLocation::immediate(0),
            MemLocation::stack(ValueType::Int),
        )
    }

    fn call(name: &str, arity: i32) -> Instruction {
        Instruction::new(Opcode::Call)
            .with_first(MemLocation::immediate(Value::Identifier(name.into())))
            .with_second(MemLocation::immediate(arity))
    }

    #[test]
    fn call_invokes_host_function() {
        let program = vec![
            push_int(4),
            push_int(9),
            call("max", 2).with_target(int_var("m")),
        ];
        let mut vm = vm(program, &[("m", Value::Int(0))]).with_functions(registry());
        assert_eq!(vm.run(10), ExecState::Finished);
        assert_eq!(vm.symbols().get("m"), Some(&Value::Int(9)));
        assert!(vm.stack().is_empty());
    }

    #[test]
    fn call_unknown_function_faults() {
        let mut vm = vm(vec![call("max", 3)], &[]).with_functions(registry());
        vm.step();
        assert_eq!(
            error_of(&vm),
            VmError::UnknownFunction {
                name: "max".into(),
                arity: 3,
            }
        );
    }

    #[test]
    fn call_host_error_faults() {
        let mut vm = vm(vec![call("fail", 0)], &[]).with_functions(registry());
        vm.step();
        assert_eq!(
            error_of(&vm),
            VmError::HostFunction {
                name: "fail".into(),
                message: "boom".into(),
            }
        );
    }

    #[test]
    fn call_host_panic_faults() {
        let mut vm = vm(vec![call("crash", 0), Instruction::new(Opcode::Nop)], &[])
            .with_functions(registry());
        vm.step();
        assert!(vm.is_finished());
        assert_eq!(
            error_of(&vm),
            VmError::HostFunction {
                name: "crash".into(),
                message: "panicked: host bug".into(),
            }
        );
        assert_eq!(vm.pc(), vm.len());
    }

    #[test]
    fn call_negative_arity_faults() {
        let mut vm = vm(vec![call("max", -1)], &[]).with_functions(registry());
        vm.step();
        assert_eq!(error_of(&vm), VmError::InvalidArity(-1));
    }

    #[test]
    fn non_integer_jump_target_faults() {
        let mut vm = vm(
            vec![Instruction::new(Opcode::Jmp).with_target(MemLocation::immediate(1.5))],
            &[],
        );
        vm.step();
        assert_eq!(
            error_of(&vm),
            VmError::TypeMismatch {
                expected: ValueType::Int,
                found: ValueType::Double,
            }
        );
        assert!(vm.state().is_finished());
    }

    #[test]
    fn stack_jump_target_holding_double_faults() {
        let program = vec![
            Instruction::binary(
                Opcode::AddDouble,
                MemLocation::immediate(1.0),
                MemLocation::immediate(0.5),
                MemLocation::stack(ValueType::Double),
            ),
            Instruction::new(Opcode::Jmp).with_target(MemLocation::stack(ValueType::Int)),
        ];
        let mut vm = vm(program, &[]);
        vm.run(10);
        assert_eq!(
            error_of(&vm),
            VmError::TypeMismatch {
                expected: ValueType::Int,
                found: ValueType::Double,
            }
        );
        assert_eq!(vm.fault().map(|f| f.pc), Some(1));
    }

    #[test]
    fn exec_state_is_finished() {
        assert!(!ExecState::Running.is_finished());
        assert!(ExecState::Finished.is_finished());
        let mut vm = vm(vec![Instruction::new(Opcode::Halt)], &[]);
        assert!(!vm.state().is_finished());
        vm.step();
        assert!(vm.state().is_finished());
    }

    #[test]
    fn call_with_missing_arguments_underflows() {
        let mut vm = vm(vec![push_int(1), call("max", 2)], &[]).with_functions(registry());
        vm.run(10);
        assert_eq!(error_of(&vm), VmError::StackUnderflow);
    }
}
