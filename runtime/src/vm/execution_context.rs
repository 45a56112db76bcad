use crate::bytecode::Header;
use crate::vm::{VMError, VMResult};

/// Stacks, globals and program counter of one loaded program
///
/// Locals are addressed by distance from the top of the local stack: a value
/// of width `w` at distance `d` occupies `locals[len - d .. len - d + w]`.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pc: usize,
    stack: Vec<f32>,
    locals: Vec<f32>,
    globals: Vec<f32>,
    call_stack: Vec<usize>,
    max_stack: u32,
    max_local_stack: u32,
    max_call_stack: u32,
}

impl ExecutionContext {
    pub fn new(header: &Header) -> Self {
        Self {
            pc: 0,
            stack: Vec::with_capacity(256),
            locals: Vec::with_capacity(64),
            globals: vec![0.0; header.global_slots as usize],
            call_stack: Vec::new(),
            max_stack: header.max_stack,
            max_local_stack: header.max_local_stack,
            max_call_stack: header.max_call_stack,
        }
    }

    /// Get the current program counter
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// Set the program counter
    pub fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
    }

    /// Increment the program counter
    pub fn increment_pc(&mut self) {
        self.pc += 1;
    }

    pub fn stack(&self) -> &[f32] {
        &self.stack
    }

    pub fn locals(&self) -> &[f32] {
        &self.locals
    }

    pub fn globals(&self) -> &[f32] {
        &self.globals
    }

    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    /// Push a value onto the operand stack
    pub fn push(&mut self, value: f32) -> VMResult<()> {
        if self.stack.len() >= self.max_stack as usize {
            return Err(VMError::StackOverflow(self.max_stack));
        }
        self.stack.push(value);
        Ok(())
    }

    pub fn push_all(&mut self, values: &[f32]) -> VMResult<()> {
        values.iter().try_for_each(|value| self.push(*value))
    }

    /// Pop a value from the operand stack
    pub fn pop(&mut self) -> VMResult<f32> {
        self.stack.pop().ok_or(VMError::StackUnderflow)
    }

    /// Pop `N` values, returned in the order they were pushed
    pub fn pop_array<const N: usize>(&mut self) -> VMResult<[f32; N]> {
        let len = self.stack.len();
        if len < N {
            return Err(VMError::StackUnderflow);
        }
        let mut values = [0.0; N];
        values.copy_from_slice(&self.stack[len - N..]);
        self.stack.truncate(len - N);
        Ok(values)
    }

    /// Replace the top of the operand stack with `f(top)`
    pub fn map_top(&mut self, f: impl FnOnce(f32) -> f32) -> VMResult<()> {
        let top = self.stack.last_mut().ok_or(VMError::StackUnderflow)?;
        *top = f(*top);
        Ok(())
    }

    /// Move `width` values from the operand stack onto the local stack
    pub fn add_local(&mut self, width: usize) -> VMResult<()> {
        let len = self.stack.len();
        if len < width {
            return Err(VMError::StackUnderflow);
        }
        if self.locals.len() + width > self.max_local_stack as usize {
            return Err(VMError::LocalStackOverflow(self.max_local_stack));
        }
        self.locals.extend(self.stack.drain(len - width..));
        Ok(())
    }

    /// Drop `count` slots from the top of the local stack
    pub fn clear_locals(&mut self, count: u32) -> VMResult<()> {
        let count = count as usize;
        if count > self.locals.len() {
            return Err(VMError::InvalidScopeClear(count as u32));
        }
        self.locals.truncate(self.locals.len() - count);
        Ok(())
    }

    fn local_range(&self, distance: u32, width: usize) -> VMResult<std::ops::Range<usize>> {
        let d = distance as usize;
        if d == 0 || d > self.locals.len() || width > d {
            return Err(VMError::InvalidLocalIndex(distance));
        }
        let start = self.locals.len() - d;
        Ok(start..start + width)
    }

    /// Push the local of `width` slots at `distance`
    pub fn load_local(&mut self, distance: u32, width: usize) -> VMResult<()> {
        let range = self.local_range(distance, width)?;
        if self.stack.len() + width > self.max_stack as usize {
            return Err(VMError::StackOverflow(self.max_stack));
        }
        self.stack.extend_from_slice(&self.locals[range]);
        Ok(())
    }

    /// Pop `width` values into the local at `distance`
    pub fn store_local(&mut self, distance: u32, width: usize) -> VMResult<()> {
        let range = self.local_range(distance, width)?;
        let len = self.stack.len();
        if len < width {
            return Err(VMError::StackUnderflow);
        }
        self.locals[range].copy_from_slice(&self.stack[len - width..]);
        self.stack.truncate(len - width);
        Ok(())
    }

    fn global_range(&self, index: u32, width: usize) -> VMResult<std::ops::Range<usize>> {
        let start = index as usize;
        if start + width > self.globals.len() {
            return Err(VMError::InvalidGlobalIndex(index));
        }
        Ok(start..start + width)
    }

    pub fn load_global(&mut self, index: u32, width: usize) -> VMResult<()> {
        let range = self.global_range(index, width)?;
        if self.stack.len() + width > self.max_stack as usize {
            return Err(VMError::StackOverflow(self.max_stack));
        }
        self.stack.extend_from_slice(&self.globals[range]);
        Ok(())
    }

    pub fn store_global(&mut self, index: u32, width: usize) -> VMResult<()> {
        let range = self.global_range(index, width)?;
        let len = self.stack.len();
        if len < width {
            return Err(VMError::StackUnderflow);
        }
        self.globals[range].copy_from_slice(&self.stack[len - width..]);
        self.stack.truncate(len - width);
        Ok(())
    }

    /// Record the return address and jump to `target`
    pub fn call(&mut self, target: usize) -> VMResult<()> {
        if self.call_stack.len() >= self.max_call_stack as usize {
            return Err(VMError::CallStackOverflow(self.max_call_stack));
        }
        self.call_stack.push(self.pc);
        self.pc = target;
        Ok(())
    }

    /// Jump back to the most recent return address
    pub fn ret(&mut self) -> VMResult<()> {
        self.pc = self.call_stack.pop().ok_or(VMError::CallStackUnderflow)?;
        Ok(())
    }
}
