use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::bytecode::BytecodeModule;
use crate::canvas::Canvas;
use crate::runtime::{RuntimeConfig, RuntimeError, RuntimeResult};
use crate::utils::read_bytecode;
use crate::vm::{Outcome, VMState, VM};

/// What [`Runtime::execute`] left behind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// The script ran to `halt` or to its end
    Finished,
    /// The script is sleeping; a resumption has been scheduled after the delay
    Suspended(Duration),
}

/// The Runtime is the main entry point for running compiled scripts
///
/// A `sleep` in the script does not block: `execute` returns
/// [`Execution::Suspended`] and a tokio task re-enters the VM once the delay
/// has passed. Every load gets a fresh halt flag, which that task checks
/// before touching the VM again.
pub struct Runtime<C: Canvas + Send + 'static> {
    vm: Arc<Mutex<VM<C>>>,
    config: RuntimeConfig,
    halt_requested: Arc<AtomicBool>,
    pending: Option<JoinHandle<RuntimeResult<()>>>,
}

impl<C: Canvas + Send + 'static> Runtime<C> {
    /// Create a new runtime with default configuration
    pub fn new(canvas: C) -> Self {
        Self::with_config(canvas, RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(canvas: C, config: RuntimeConfig) -> Self {
        let mut vm = VM::new(canvas);
        vm.set_stack_trace(config.stack_trace);
        vm.set_verify(config.verify_bytecode);

        Self {
            vm: Arc::new(Mutex::new(vm)),
            config,
            halt_requested: Arc::new(AtomicBool::new(false)),
            pending: None,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn state(&self) -> VMState {
        self.vm.lock().state()
    }

    /// Run `f` with the canvas while no resumption is touching it
    pub fn with_canvas<R>(&self, f: impl FnOnce(&C) -> R) -> R {
        f(self.vm.lock().canvas())
    }

    /// Load a `.cw2c` file, halting whatever was running
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> RuntimeResult<()> {
        let path = path.as_ref();
        self.force_halt();
        let module = read_bytecode(path)?;
        if self.config.debug_mode {
            debug!(
                "read {}: {} instruction(s)",
                path.display(),
                module.instructions.len()
            );
        }
        self.load_module(module)
    }

    /// Load an in-memory module, halting whatever was running
    pub fn load_module(&mut self, module: BytecodeModule) -> RuntimeResult<()> {
        self.force_halt();
        self.halt_requested = Arc::new(AtomicBool::new(false));
        self.vm.lock().load(module)?;
        Ok(())
    }

    /// Run the loaded script until it finishes or sleeps
    ///
    /// Scheduling a sleep needs a tokio runtime; without one this returns
    /// [`RuntimeError::NoScheduler`] and leaves the VM suspended.
    pub fn execute(&mut self) -> RuntimeResult<Execution> {
        self.cancel_pending();

        let outcome = self.vm.lock().execute()?;
        match outcome {
            Outcome::Halted => Ok(Execution::Finished),
            Outcome::Sleep(delay) => {
                let handle = Handle::try_current().map_err(|_| RuntimeError::NoScheduler)?;
                let deadline = Instant::now() + delay;
                let vm = Arc::clone(&self.vm);
                let halt_requested = Arc::clone(&self.halt_requested);
                self.pending = Some(handle.spawn(resume(vm, halt_requested, deadline)));
                Ok(Execution::Suspended(delay))
            }
        }
    }

    /// Load and run a file, waiting for every sleep to elapse
    pub async fn execute_file<P: AsRef<Path>>(&mut self, path: P) -> RuntimeResult<()> {
        self.load(path)?;
        self.execute()?;
        self.wait().await
    }

    /// Stop the script now; a scheduled resumption will not run
    pub fn force_halt(&mut self) {
        self.halt_requested.store(true, Ordering::SeqCst);
        self.pending = None;

        let mut vm = self.vm.lock();
        if matches!(
            vm.state(),
            VMState::Loaded | VMState::Running | VMState::Suspended
        ) {
            warn!("forcing halt of a script in state {}", vm.state());
            vm.halt();
        }
    }

    /// Wait until the scheduled resumptions have finished
    pub async fn wait(&mut self) -> RuntimeResult<()> {
        match self.pending.take() {
            Some(handle) => handle.await?,
            None => Ok(()),
        }
    }

    /// Drop a scheduled resumption without halting the VM
    fn cancel_pending(&mut self) {
        if self.pending.take().is_some() {
            self.halt_requested.store(true, Ordering::SeqCst);
            self.halt_requested = Arc::new(AtomicBool::new(false));
        }
    }
}

impl<C: Canvas + Send + 'static> Drop for Runtime<C> {
    fn drop(&mut self) {
        self.halt_requested.store(true, Ordering::SeqCst);
    }
}

/// Re-enter the VM after each sleep until the script halts or is cancelled
async fn resume<C: Canvas + Send + 'static>(
    vm: Arc<Mutex<VM<C>>>,
    halt_requested: Arc<AtomicBool>,
    mut deadline: Instant,
) -> RuntimeResult<()> {
    loop {
        tokio::time::sleep_until(deadline).await;

        let outcome = {
            let mut vm = vm.lock();
            if halt_requested.load(Ordering::SeqCst) {
                debug!("resumption cancelled");
                return Ok(());
            }
            vm.execute()?
        };

        match outcome {
            Outcome::Halted => return Ok(()),
            Outcome::Sleep(delay) => deadline = Instant::now() + delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Header, Instruction, OpCode, Operand};
    use crate::canvas::{CanvasCall, RecordingCanvas};
    use crate::utils::write_bytecode;
    use tempfile::NamedTempFile;

    /// Helper function to create a test runtime with default config
    fn create_test_runtime() -> Runtime<RecordingCanvas> {
        Runtime::new(RecordingCanvas::new(64, 64))
    }

    fn push(value: f32) -> Instruction {
        Instruction::new(OpCode::Push).with_operand(Operand::Imm(value))
    }

    fn pixel(x: f32, y: f32) -> Vec<Instruction> {
        vec![
            Instruction::new(OpCode::PushPoint).with_operands(vec![Operand::Imm(x), Operand::Imm(y)]),
            Instruction::new(OpCode::DrawPix),
        ]
    }

    /// pixel, sleep `millis`, pixel, halt
    fn create_sleeping_module(millis: f32) -> BytecodeModule {
        let mut instructions = pixel(1.0, 1.0);
        instructions.push(push(millis));
        instructions.push(Instruction::new(OpCode::Sleep));
        instructions.extend(pixel(2.0, 2.0));
        instructions.push(Instruction::new(OpCode::Halt));
        BytecodeModule::with_instructions(Header::default(), instructions)
    }

    fn pixel_count(runtime: &Runtime<RecordingCanvas>) -> usize {
        runtime.with_canvas(|canvas| {
            canvas
                .calls()
                .iter()
                .filter(|call| matches!(call, CanvasCall::Pixel { .. }))
                .count()
        })
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_execute_without_sleep_finishes() {
        let mut runtime = create_test_runtime();
        let mut instructions = pixel(3.0, 4.0);
        instructions.push(Instruction::new(OpCode::Halt));
        runtime
            .load_module(BytecodeModule::with_instructions(Header::default(), instructions))
            .unwrap();

        assert_eq!(runtime.execute().unwrap(), Execution::Finished);
        assert_eq!(runtime.state(), VMState::Halted);
        assert_eq!(pixel_count(&runtime), 1);
    }

    #[test]
    fn test_sleep_without_scheduler() {
        let mut runtime = create_test_runtime();
        runtime.load_module(create_sleeping_module(10.0)).unwrap();

        assert!(matches!(runtime.execute(), Err(RuntimeError::NoScheduler)));
        assert_eq!(runtime.state(), VMState::Suspended);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_resumes_after_delay() {
        let mut runtime = create_test_runtime();
        runtime.load_module(create_sleeping_module(100.0)).unwrap();

        let execution = runtime.execute().unwrap();
        assert_eq!(execution, Execution::Suspended(Duration::from_millis(100)));
        assert_eq!(pixel_count(&runtime), 1);
        assert_eq!(runtime.state(), VMState::Suspended);

        tokio::time::advance(Duration::from_millis(99)).await;
        settle().await;
        assert_eq!(pixel_count(&runtime), 1);

        tokio::time::advance(Duration::from_millis(2)).await;
        settle().await;
        assert_eq!(pixel_count(&runtime), 2);
        assert_eq!(runtime.state(), VMState::Halted);

        runtime.wait().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_halt_cancels_resumption() {
        let mut runtime = create_test_runtime();
        runtime.load_module(create_sleeping_module(100.0)).unwrap();
        runtime.execute().unwrap();

        runtime.force_halt();
        assert_eq!(runtime.state(), VMState::Halted);

        tokio::time::advance(Duration::from_millis(500)).await;
        settle().await;
        assert_eq!(pixel_count(&runtime), 1);
        runtime.wait().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_cancels_previous_run() {
        let mut runtime = create_test_runtime();
        runtime.load_module(create_sleeping_module(100.0)).unwrap();
        runtime.execute().unwrap();

        let mut instructions = pixel(9.0, 9.0);
        instructions.push(Instruction::new(OpCode::Halt));
        runtime
            .load_module(BytecodeModule::with_instructions(Header::default(), instructions))
            .unwrap();
        assert_eq!(runtime.execute().unwrap(), Execution::Finished);

        tokio::time::advance(Duration::from_millis(500)).await;
        settle().await;

        let pixels: Vec<CanvasCall> = runtime.with_canvas(|canvas| {
            canvas
                .calls()
                .iter()
                .filter(|call| matches!(call, CanvasCall::Pixel { .. }))
                .cloned()
                .collect()
        });
        assert_eq!(pixels.len(), 2);
        assert!(matches!(
            pixels[1],
            CanvasCall::Pixel { at, .. } if at.x == 9 && at.y == 9
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_several_sleeps_run_in_one_task() {
        let mut instructions = Vec::new();
        for step in 0..3 {
            instructions.extend(pixel(step as f32, 0.0));
            instructions.push(push(10.0));
            instructions.push(Instruction::new(OpCode::Sleep));
        }
        let mut runtime = create_test_runtime();
        runtime
            .load_module(BytecodeModule::with_instructions(Header::default(), instructions))
            .unwrap();

        runtime.execute().unwrap();
        runtime.wait().await.unwrap();
        assert_eq!(pixel_count(&runtime), 3);
        assert_eq!(runtime.state(), VMState::Halted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runtime_error_after_sleep_reaches_wait() {
        let instructions = vec![push(5.0), Instruction::new(OpCode::Sleep), Instruction::new(OpCode::Pop)];
        let mut runtime = create_test_runtime();
        runtime
            .load_module(BytecodeModule::with_instructions(Header::default(), instructions))
            .unwrap();
        runtime.execute().unwrap();

        let result = runtime.wait().await;
        assert!(matches!(result, Err(RuntimeError::VMError(_))));
    }

    #[tokio::test]
    async fn test_execute_file() {
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        write_bytecode(&create_sleeping_module(1.0), temp_file.path()).expect("Failed to write bytecode");

        let mut runtime = create_test_runtime();
        runtime.execute_file(temp_file.path()).await.unwrap();
        assert_eq!(pixel_count(&runtime), 2);
    }

    #[test]
    fn test_load_invalid_file() {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        std::io::Write::write_all(&mut temp_file, b"1\n2\n").unwrap();

        let mut runtime = create_test_runtime();
        let result = runtime.load(temp_file.path());
        assert!(matches!(result, Err(RuntimeError::LoadError(_))));
    }

    #[test]
    fn test_load_rejects_bad_jump() {
        let module = BytecodeModule::with_instructions(
            Header::default(),
            vec![Instruction::new(OpCode::Goto).with_operand(Operand::Addr(7))],
        );
        let mut runtime = create_test_runtime();
        assert!(matches!(runtime.load_module(module), Err(RuntimeError::VMError(_))));
    }
}
