//! Background script runner
//!
//! Owns a worker thread that steps submitted scripts so they never block the
//! host's main loop. Scripts are scheduled round-robin: each gets at most
//! [`RunnerConfig::instructions_per_tick`] instructions before the next one
//! runs, so a runaway loop cannot starve its neighbours.

use std::collections::VecDeque;
use std::io;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use thiserror::Error;

use crate::core::SymbolTable;
use crate::error::Fault;
use crate::vm::{ExecState, ScriptVm};

/// Runner tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Instructions each script may run per scheduling tick.
    pub instructions_per_tick: u64,
    /// Total instructions a script may run before it is abandoned.
    pub max_instructions: Option<u64>,
}

impl RunnerConfig {
    pub const DEFAULT_INSTRUCTIONS_PER_TICK: u64 = 1_000;
    pub const THREAD_NAME: &'static str = "plume-runner";
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            instructions_per_tick: Self::DEFAULT_INSTRUCTIONS_PER_TICK,
            max_instructions: None,
        }
    }
}

/// How a submitted script ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Finished,
    Faulted(Fault),
    /// Hit `max_instructions`.
    BudgetExhausted,
    /// Still running when the runner shut down.
    Abandoned,
}

/// Final report for one script.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub outcome: Outcome,
    pub steps: u64,
    pub symbols: SymbolTable,
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("script runner has stopped")]
    Stopped,
    #[error("invalid runner config: {0}")]
    InvalidConfig(&'static str),
    #[error("failed to spawn runner thread: {0}")]
    Spawn(#[from] io::Error),
}

struct Job {
    id: u64,
    vm: ScriptVm,
    reply: mpsc::Sender<RunReport>,
}

impl Job {
    fn finish(self, outcome: Outcome) {
        let steps = self.vm.steps();
        log::debug!("script {} retired after {} steps: {:?}", self.id, steps, outcome);
        let report = RunReport {
            outcome,
            steps,
            symbols: self.vm.into_symbols(),
        };
        // The host may have dropped its handle.
        let _ = self.reply.send(report);
    }
}

enum Command {
    Run(Job),
    Shutdown,
}

/// Handle to a submitted script.
pub struct RunHandle {
    id: u64,
    receiver: mpsc::Receiver<RunReport>,
}

impl RunHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Block until the script is done.
    pub fn wait(self) -> Result<RunReport, RunnerError> {
        self.receiver.recv().map_err(|_| RunnerError::Stopped)
    }

    /// Non-blocking poll for the report.
    pub fn try_result(&self) -> Option<RunReport> {
        self.receiver.try_recv().ok()
    }
}

/// Runs scripts on a dedicated worker thread.
pub struct ScriptRunner {
    sender: Option<mpsc::Sender<Command>>,
    worker: Option<JoinHandle<()>>,
    next_id: u64,
}

impl ScriptRunner {
    /// Spawn the worker thread.
    pub fn start(config: RunnerConfig) -> Result<Self, RunnerError> {
        if config.instructions_per_tick == 0 {
            return Err(RunnerError::InvalidConfig("instructions_per_tick must be at least 1"));
        }
        let (sender, receiver) = mpsc::channel();
        let worker = thread::Builder::new()
            .name(RunnerConfig::THREAD_NAME.to_string())
            .spawn(move || worker_loop(config, receiver))?;
        log::info!("script runner started");
        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            next_id: 0,
        })
    }

    /// Queue a script for execution.
    pub fn submit(&mut self, vm: ScriptVm) -> Result<RunHandle, RunnerError> {
        let sender = self.sender.as_ref().ok_or(RunnerError::Stopped)?;
        let id = self.next_id;
        let (reply, receiver) = mpsc::channel();
        sender
            .send(Command::Run(Job { id, vm, reply }))
            .map_err(|_| RunnerError::Stopped)?;
        self.next_id += 1;
        Ok(RunHandle { id, receiver })
    }

    pub fn is_running(&self) -> bool {
        self.sender.is_some()
    }

    /// Stop the worker. Scripts still running are reported as abandoned.
    pub fn shutdown(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Command::Shutdown);
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("script runner thread panicked");
            }
            log::info!("script runner stopped");
        }
    }
}

impl Drop for ScriptRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(config: RunnerConfig, commands: mpsc::Receiver<Command>) {
    let mut active: VecDeque<Job> = VecDeque::new();

    loop {
        // Block while idle, otherwise only drain what is already queued.
        let mut incoming = Vec::new();
        if active.is_empty() {
            match commands.recv() {
                Ok(cmd) => incoming.push(cmd),
                Err(_) => return,
            }
        }
        incoming.extend(commands.try_iter());

        let mut stop = false;
        for cmd in incoming {
            match cmd {
                Command::Run(job) => active.push_back(job),
                Command::Shutdown => stop = true,
            }
        }
        if stop {
            for job in active.drain(..) {
                job.finish(Outcome::Abandoned);
            }
            return;
        }

        tick(&config, &mut active);
    }
}

/// Give every active script one time slice, retiring those that are done.
fn tick(config: &RunnerConfig, active: &mut VecDeque<Job>) {
    for _ in 0..active.len() {
        let Some(mut job) = active.pop_front() else {
            break;
        };

        let slice = match config.max_instructions {
            Some(max) => config
                .instructions_per_tick
                .min(max.saturating_sub(job.vm.steps())),
            None => config.instructions_per_tick,
        };

        match job.vm.run(slice) {
            ExecState::Finished => job.finish(Outcome::Finished),
            ExecState::Faulted(fault) => job.finish(Outcome::Faulted(fault)),
            ExecState::Running => {
                let exhausted = config
                    .max_instructions
                    .is_some_and(|max| job.vm.steps() >= max);
                if exhausted {
                    job.finish(Outcome::BudgetExhausted);
                } else {
                    active.push_back(job);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Instruction, Opcode, Program};
    use crate::core::MemLocation;
    use crate::error::VmError;
    use crate::host::FunctionRegistry;
    use crate::value::{Value, ValueType};
    use std::sync::Arc;

    fn counter(limit: i32) -> ScriptVm {
        let n = || MemLocation::variable("n", ValueType::Int);
        let mut program = Program::default();
        program.declare("n", Value::Int(0));
        program.push(Instruction::compare(n(), MemLocation::immediate(limit)));
        program.push(Instruction::jump(Opcode::Jge, 4));
        program.push(Instruction::binary(Opcode::AddInt, n(), MemLocation::immediate(1), n()));
        program.push(Instruction::jump(Opcode::Jmp, 0));
        ScriptVm::new(program)
    }

    fn spin() -> ScriptVm {
        ScriptVm::new(Program::new(
            vec![Instruction::jump(Opcode::Jmp, 0)],
            SymbolTable::new(),
        ))
    }

    #[test]
    fn vm_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ScriptVm>();
    }

    #[test]
    fn runs_script_to_completion() {
        let mut runner = ScriptRunner::start(RunnerConfig::default()).unwrap();
        let handle = runner.submit(counter(2_500)).unwrap();
        let report = handle.wait().unwrap();
        assert_eq!(report.outcome, Outcome::Finished);
        assert_eq!(report.symbols.get("n"), Some(&Value::Int(2_500)));
    }

    #[test]
    fn interleaves_scripts() {
        let config = RunnerConfig {
            instructions_per_tick: 7,
            max_instructions: None,
        };
        let mut runner = ScriptRunner::start(config).unwrap();
        let handles: Vec<_> = (1..=4).map(|i| runner.submit(counter(i * 10)).unwrap()).collect();
        for (i, handle) in (1..=4).zip(handles) {
            let report = handle.wait().unwrap();
            assert_eq!(report.outcome, Outcome::Finished);
            assert_eq!(report.symbols.get("n"), Some(&Value::Int(i * 10)));
        }
    }

    #[test]
    fn reports_faults() {
        let mut runner = ScriptRunner::start(RunnerConfig::default()).unwrap();
        let vm = ScriptVm::new(Program::new(
            vec![Instruction::binary(
                Opcode::ModInt,
                MemLocation::immediate(1),
                MemLocation::immediate(0),
                MemLocation::stack(ValueType::Int),
            )],
            SymbolTable::new(),
        ));
        let report = runner.submit(vm).unwrap().wait().unwrap();
        match report.outcome {
            Outcome::Faulted(fault) => assert_eq!(fault.error, VmError::DivisionByZero),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(report.steps, 1);
    }

    #[test]
    fn budget_stops_runaway_script() {
        let config = RunnerConfig {
            instructions_per_tick: 300,
            max_instructions: Some(1_000),
        };
        let mut runner = ScriptRunner::start(config).unwrap();
        let report = runner.submit(spin()).unwrap().wait().unwrap();
        assert_eq!(report.outcome, Outcome::BudgetExhausted);
        assert_eq!(report.steps, 1_000);
    }

    #[test]
    fn shutdown_abandons_running_scripts() {
        let mut runner = ScriptRunner::start(RunnerConfig::default()).unwrap();
        let handle = runner.submit(spin()).unwrap();
        runner.shutdown();
        assert!(!runner.is_running());
        assert_eq!(handle.wait().unwrap().outcome, Outcome::Abandoned);
        assert!(matches!(runner.submit(spin()), Err(RunnerError::Stopped)));
    }

    #[test]
    fn rejects_zero_tick_budget() {
        let config = RunnerConfig {
            instructions_per_tick: 0,
            max_instructions: None,
        };
        assert!(matches!(
            ScriptRunner::start(config),
            Err(RunnerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn host_panic_only_faults_its_script() {
        let mut registry = FunctionRegistry::new();
        registry.register("test", "boom", 0, |_| panic!("boom")).unwrap();
        let registry = Arc::new(registry);

        let config = RunnerConfig {
            instructions_per_tick: 1,
            max_instructions: None,
        };
        let mut runner = ScriptRunner::start(config).unwrap();
        let healthy = runner
            .submit(ScriptVm::new(Program::new(
                vec![
                    Instruction::new(Opcode::Nop),
                    Instruction::new(Opcode::Nop),
                    Instruction::new(Opcode::Halt),
                ],
                SymbolTable::new(),
            )))
            .unwrap();
        let crashing = runner
            .submit(
                ScriptVm::new(Program::new(
                    vec![Instruction::new(Opcode::Call)
                        .with_first(MemLocation::immediate(Value::Identifier("boom".into())))
                        .with_second(MemLocation::immediate(0))],
                    SymbolTable::new(),
                ))
                .with_functions(registry),
            )
            .unwrap();

        assert_eq!(healthy.wait().unwrap().outcome, Outcome::Finished);
        match crashing.wait().unwrap().outcome {
            Outcome::Faulted(fault) => {
                assert!(matches!(fault.error, VmError::HostFunction { ref name, .. } if name == "boom"))
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(runner.is_running());
        assert!(runner.submit(spin()).is_ok());
    }

    #[test]
    fn handle_ids_increase() {
        let mut runner = ScriptRunner::start(RunnerConfig::default()).unwrap();
        let a = runner.submit(counter(1)).unwrap();
        let b = runner.submit(counter(1)).unwrap();
        assert_eq!((a.id(), b.id()), (0, 1));
        assert!(a.wait().is_ok());
        assert!(b.wait().is_ok());
    }
}
