use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};

use crate::bytecode::{verify, verify_header, BytecodeModule, Header, Instruction, OpCode};
use crate::canvas::{Canvas, Pixel, Rgba};
use crate::utils::{clamp_coord, clamp_len};
use crate::vm::{ExecutionContext, Outcome, VMError, VMResult, VMState};

/// Pen and target of the drawing instructions
#[derive(Debug, Clone, PartialEq)]
pub struct DrawState {
    /// Buffer the drawing instructions go to
    pub target: u32,
    pub color: Rgba,
    pub line_width: f32,
    /// Canvas size, refreshed on load and on `update`
    pub width: u32,
    pub height: u32,
}

impl DrawState {
    pub const DEFAULT_LINE_WIDTH: f32 = 3.0;

    pub fn new(width: u32, height: u32) -> Self {
        Self {
            target: 0,
            color: Rgba::BLACK,
            line_width: Self::DEFAULT_LINE_WIDTH,
            width,
            height,
        }
    }

    /// Clamp a script point into the canvas
    pub fn pixel(&self, [x, y]: [f32; 2]) -> Pixel {
        Pixel::new(clamp_coord(x, self.width), clamp_coord(y, self.height))
    }

    /// Clamp a stroke so it ends at most one pixel past the right edge
    pub fn stroke_length(&self, from: Pixel, length: f32) -> u32 {
        clamp_len(length, self.width as i64 - from.x as i64 + 1)
    }

    /// Clamp a rectangle size so it stays inside the canvas
    pub fn rect_size(&self, origin: Pixel, width: f32, height: f32) -> (u32, u32) {
        (
            clamp_len(width, self.width as i64 - origin.x as i64),
            clamp_len(height, self.height as i64 - origin.y as i64),
        )
    }
}

enum Step {
    Next,
    Sleep(Duration),
    Halt,
}

/// The Virtual Machine that executes bytecode instructions
pub struct VM<C: Canvas> {
    canvas: C,
    program: Option<Arc<BytecodeModule>>,
    context: ExecutionContext,
    draw: DrawState,
    state: VMState,
    stack_trace_enabled: bool,
    verify_enabled: bool,
}

impl<C: Canvas> VM<C> {
    pub fn new(canvas: C) -> Self {
        let draw = DrawState::new(canvas.width(), canvas.height());
        Self {
            canvas,
            program: None,
            context: ExecutionContext::new(&Header::default()),
            draw,
            state: VMState::Empty,
            stack_trace_enabled: false,
            verify_enabled: true,
        }
    }

    /// Enable or disable per-instruction tracing
    pub fn set_stack_trace(&mut self, enabled: bool) {
        self.stack_trace_enabled = enabled;
    }

    /// Enable or disable the verification pass on load
    pub fn set_verify(&mut self, enabled: bool) {
        self.verify_enabled = enabled;
    }

    pub fn state(&self) -> VMState {
        self.state
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut C {
        &mut self.canvas
    }

    pub fn into_canvas(self) -> C {
        self.canvas
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub fn draw_state(&self) -> &DrawState {
        &self.draw
    }

    /// Load a module, replacing whatever was loaded before
    pub fn load(&mut self, module: BytecodeModule) -> VMResult<()> {
        if matches!(self.state, VMState::Loaded | VMState::Running | VMState::Suspended) {
            self.halt();
        }
        if self.verify_enabled {
            verify(&module)?;
        } else {
            verify_header(&module.header)?;
        }

        debug!(
            "loaded {} instruction(s), {} global slot(s), {} image buffer(s)",
            module.instructions.len(),
            module.header.global_slots,
            module.header.image_buffers
        );

        self.context = ExecutionContext::new(&module.header);
        self.draw = DrawState::new(self.canvas.width(), self.canvas.height());
        self.canvas.allocate_buffers(module.header.image_buffers);
        self.program = Some(Arc::new(module));
        self.state = VMState::Loaded;
        Ok(())
    }

    /// Stop the program and release its stacks and buffers
    pub fn halt(&mut self) {
        if self.program.take().is_some() {
            self.canvas.release_buffers();
        }
        self.context = ExecutionContext::new(&Header::default());
        self.state = VMState::Halted;
    }

    /// Run until the program halts or sleeps
    ///
    /// After `Outcome::Sleep` the VM is `Suspended` and the next call resumes
    /// at the instruction following the `SLEEP`. A runtime error halts the VM.
    pub fn execute(&mut self) -> VMResult<Outcome> {
        match self.state {
            VMState::Loaded | VMState::Suspended => {}
            state => return Err(VMError::NotRunnable(state)),
        }
        let program = match &self.program {
            Some(program) => Arc::clone(program),
            None => return Err(VMError::NotRunnable(self.state)),
        };
        self.state = VMState::Running;

        loop {
            let pc = self.context.pc();
            let instruction = match program.instructions.get(pc) {
                Some(instruction) => instruction,
                None => {
                    self.halt();
                    return Ok(Outcome::Halted);
                }
            };

            if self.stack_trace_enabled {
                trace!("{:5}  {:<28} stack={:?}", pc, instruction.to_string(), self.context.stack());
            }

            self.context.increment_pc();
            match self.step(instruction) {
                Ok(Step::Next) => {}
                Ok(Step::Sleep(delay)) => {
                    self.state = VMState::Suspended;
                    return Ok(Outcome::Sleep(delay));
                }
                Ok(Step::Halt) => {
                    self.halt();
                    return Ok(Outcome::Halted);
                }
                Err(source) => {
                    debug!("runtime error at instruction {}: {}", pc, source);
                    self.halt();
                    return Err(VMError::Trap {
                        pc,
                        opcode: instruction.opcode,
                        source: Box::new(source),
                    });
                }
            }
        }
    }

    /// Run to completion without waiting, returning the requested sleeps
    pub fn run_to_end(&mut self) -> VMResult<Vec<Duration>> {
        let mut sleeps = Vec::new();
        loop {
            match self.execute()? {
                Outcome::Sleep(delay) => sleeps.push(delay),
                Outcome::Halted => return Ok(sleeps),
            }
        }
    }

    fn step(&mut self, instruction: &Instruction) -> VMResult<Step> {
        let ctx = &mut self.context;
        match instruction.opcode {
            OpCode::Nop => {}

            OpCode::Push => ctx.push(imm(instruction, 0)?)?,
            OpCode::PushPoint => {
                ctx.push(imm(instruction, 0)?)?;
                ctx.push(imm(instruction, 1)?)?;
            }
            OpCode::Pop => {
                ctx.pop()?;
            }
            OpCode::PopPoint => {
                ctx.pop_array::<2>()?;
            }
            OpCode::PopColor => {
                ctx.pop_array::<4>()?;
            }

            OpCode::GetColorRed => project::<4>(ctx, 0)?,
            OpCode::GetColorGreen => project::<4>(ctx, 1)?,
            OpCode::GetColorBlue => project::<4>(ctx, 2)?,
            OpCode::GetColorAlpha => project::<4>(ctx, 3)?,
            OpCode::GetPointX => project::<2>(ctx, 0)?,
            OpCode::GetPointY => project::<2>(ctx, 1)?,

            OpCode::AddLocal => ctx.add_local(1)?,
            OpCode::AddLocalPoint => ctx.add_local(2)?,
            OpCode::AddLocalColor => ctx.add_local(4)?,
            OpCode::ClearScope => ctx.clear_locals(index(instruction, 0)?)?,

            OpCode::Load => ctx.load_local(index(instruction, 0)?, 1)?,
            OpCode::LoadPoint => ctx.load_local(index(instruction, 0)?, 2)?,
            OpCode::LoadColor => ctx.load_local(index(instruction, 0)?, 4)?,
            OpCode::Store => ctx.store_local(index(instruction, 0)?, 1)?,
            OpCode::StorePoint => ctx.store_local(index(instruction, 0)?, 2)?,
            OpCode::StoreColor => ctx.store_local(index(instruction, 0)?, 4)?,

            OpCode::LoadGlobal => ctx.load_global(index(instruction, 0)?, 1)?,
            OpCode::LoadPointGlobal => ctx.load_global(index(instruction, 0)?, 2)?,
            OpCode::LoadColorGlobal => ctx.load_global(index(instruction, 0)?, 4)?,
            OpCode::StoreGlobal => ctx.store_global(index(instruction, 0)?, 1)?,
            OpCode::StorePointGlobal => ctx.store_global(index(instruction, 0)?, 2)?,
            OpCode::StoreColorGlobal => ctx.store_global(index(instruction, 0)?, 4)?,

            OpCode::Add => binary::<1>(ctx, |a, b| a + b)?,
            OpCode::AddPoint => binary::<2>(ctx, |a, b| a + b)?,
            OpCode::AddColor => binary::<4>(ctx, |a, b| a + b)?,
            OpCode::AddToPoint => broadcast::<2>(ctx, |a, b| a + b)?,
            OpCode::AddToColor => broadcast::<4>(ctx, |a, b| a + b)?,
            OpCode::Sub => binary::<1>(ctx, |a, b| a - b)?,
            OpCode::SubPoint => binary::<2>(ctx, |a, b| a - b)?,
            OpCode::SubColor => binary::<4>(ctx, |a, b| a - b)?,
            OpCode::SubFromPoint => broadcast::<2>(ctx, |a, b| a - b)?,
            OpCode::SubFromColor => broadcast::<4>(ctx, |a, b| a - b)?,
            OpCode::Mul => binary::<1>(ctx, |a, b| a * b)?,
            OpCode::MulPointOnNumber => broadcast::<2>(ctx, |a, b| a * b)?,
            OpCode::MulColorOnNumber => broadcast::<4>(ctx, |a, b| a * b)?,
            OpCode::Div => binary::<1>(ctx, |a, b| a / b)?,
            OpCode::DivPointOnNumber => broadcast::<2>(ctx, |a, b| a / b)?,
            OpCode::DivColorOnNumber => broadcast::<4>(ctx, |a, b| a / b)?,
            OpCode::Mod => binary::<1>(ctx, |a, b| a % b)?,
            OpCode::ModPointOnNumber => broadcast::<2>(ctx, |a, b| a % b)?,
            OpCode::ModColorOnNumber => broadcast::<4>(ctx, |a, b| a % b)?,
            OpCode::Pow => binary::<1>(ctx, f32::powf)?,
            OpCode::PowPointToNumber => broadcast::<2>(ctx, f32::powf)?,
            OpCode::PowColorToNumber => broadcast::<4>(ctx, f32::powf)?,
            OpCode::Neg => ctx.map_top(|v| -v)?,
            OpCode::NegPoint => unary::<2>(ctx, |v| -v)?,
            OpCode::NegColor => unary::<4>(ctx, |v| -v)?,
            OpCode::Inc => ctx.map_top(|v| v + 1.0)?,
            OpCode::Dec => ctx.map_top(|v| v - 1.0)?,

            OpCode::Not => ctx.map_top(|v| truth(v == 0.0))?,
            OpCode::CmpEq => compare::<1>(ctx, true)?,
            OpCode::CmpEqPoints => compare::<2>(ctx, true)?,
            OpCode::CmpEqColors => compare::<4>(ctx, true)?,
            OpCode::CmpNeq => compare::<1>(ctx, false)?,
            OpCode::CmpNeqPoints => compare::<2>(ctx, false)?,
            OpCode::CmpNeqColors => compare::<4>(ctx, false)?,
            OpCode::CmpLt => binary::<1>(ctx, |a, b| truth(a < b))?,
            OpCode::CmpGt => binary::<1>(ctx, |a, b| truth(a > b))?,
            OpCode::CmpGe => binary::<1>(ctx, |a, b| truth(a >= b))?,
            OpCode::CmpLe => binary::<1>(ctx, |a, b| truth(a <= b))?,
            OpCode::And => binary::<1>(ctx, |a, b| truth(a != 0.0 && b != 0.0))?,
            OpCode::Or => binary::<1>(ctx, |a, b| truth(a != 0.0 || b != 0.0))?,

            OpCode::Goto => ctx.set_pc(addr(instruction, 0)?),
            OpCode::GotoIfNot => {
                let target = addr(instruction, 0)?;
                if ctx.pop()? == 0.0 {
                    ctx.set_pc(target);
                }
            }
            OpCode::Call => ctx.call(addr(instruction, 0)?)?,
            OpCode::Ret => ctx.ret()?,
            OpCode::Halt => return Ok(Step::Halt),

            OpCode::InitRange => {
                let [from, to, step] = ctx.pop_array::<3>()?;
                let step = if to < from { -step.abs() } else { step.abs() };
                ctx.push_all(&[from, to, step])?;
            }
            OpCode::CheckRange => {
                let [iter, to, step] = ctx.pop_array::<3>()?;
                let inside = if step < 0.0 { to < iter } else { to > iter };
                ctx.push(truth(inside))?;
            }

            OpCode::PushWidth => ctx.push(self.draw.width as f32)?,
            OpCode::PushHeight => ctx.push(self.draw.height as f32)?,
            OpCode::SetImage => self.draw.target = index(instruction, 0)?,
            OpCode::CopyImage => {
                let dst = index(instruction, 0)?;
                let src = index(instruction, 1)?;
                if src != dst {
                    self.canvas.copy_buffer(dst, src);
                }
            }
            OpCode::Update => {
                self.canvas.notify_updated();
                self.draw.width = self.canvas.width();
                self.draw.height = self.canvas.height();
            }
            OpCode::SetColor => self.draw.color = Rgba::from_components(ctx.pop_array::<4>()?),
            OpCode::SetWidth => self.draw.line_width = ctx.pop()?,
            OpCode::DrawPix => {
                let at = self.draw.pixel(ctx.pop_array::<2>()?);
                self.canvas.draw_pixel(self.draw.target, at, self.draw.color);
            }
            OpCode::DrawStroke => {
                let [x, y, length] = ctx.pop_array::<3>()?;
                let from = self.draw.pixel([x, y]);
                let length = self.draw.stroke_length(from, length);
                self.canvas.draw_stroke(self.draw.target, from, length, self.draw.color);
            }
            OpCode::DrawLine => {
                let [x1, y1, x2, y2] = ctx.pop_array::<4>()?;
                let from = self.draw.pixel([x1, y1]);
                let to = self.draw.pixel([x2, y2]);
                self.canvas
                    .draw_line(self.draw.target, from, to, self.draw.line_width, self.draw.color);
            }
            OpCode::DrawRect | OpCode::FillRect => {
                let [x, y, width, height] = ctx.pop_array::<4>()?;
                let origin = self.draw.pixel([x, y]);
                let (width, height) = self.draw.rect_size(origin, width, height);
                if instruction.opcode == OpCode::DrawRect {
                    self.canvas.draw_rect(
                        self.draw.target,
                        origin,
                        width,
                        height,
                        self.draw.line_width,
                        self.draw.color,
                    );
                } else {
                    self.canvas
                        .fill_rect(self.draw.target, origin, width, height, self.draw.color);
                }
            }
            OpCode::DrawCircle | OpCode::FillCircle => {
                let [x, y, radius] = ctx.pop_array::<3>()?;
                let center = self.draw.pixel([x, y]);
                if instruction.opcode == OpCode::DrawCircle {
                    self.canvas.draw_circle(
                        self.draw.target,
                        center,
                        radius,
                        self.draw.line_width,
                        self.draw.color,
                    );
                } else {
                    self.canvas
                        .fill_circle(self.draw.target, center, radius, self.draw.color);
                }
            }
            OpCode::Sleep => {
                // Negative and NaN delays saturate to zero
                let millis = ctx.pop()? as u64;
                return Ok(Step::Sleep(Duration::from_millis(millis)));
            }

            OpCode::Abs => ctx.map_top(f32::abs)?,
            OpCode::Min => variadic(ctx, index(instruction, 0)?, f32::min)?,
            OpCode::Max => variadic(ctx, index(instruction, 0)?, f32::max)?,
            OpCode::Sum => variadic(ctx, index(instruction, 0)?, |a, b| a + b)?,
            OpCode::Round => ctx.map_top(f32::round)?,
            OpCode::Floor => ctx.map_top(f32::floor)?,
            OpCode::Ceil => ctx.map_top(f32::ceil)?,
            OpCode::Sin => ctx.map_top(f32::sin)?,
            OpCode::Cos => ctx.map_top(f32::cos)?,
            OpCode::Tan => ctx.map_top(f32::tan)?,
            OpCode::Cot => ctx.map_top(|v| 1.0 / v.tan())?,
            OpCode::Exp => ctx.map_top(f32::exp)?,
            OpCode::Log => ctx.map_top(f32::ln)?,
            OpCode::Length => {
                let [x, y] = ctx.pop_array::<2>()?;
                ctx.push(x.hypot(y))?;
            }
            OpCode::Distance => {
                let [x1, y1, x2, y2] = ctx.pop_array::<4>()?;
                ctx.push((x1 - x2).hypot(y1 - y2))?;
            }
        }
        Ok(Step::Next)
    }
}

fn imm(instruction: &Instruction, slot: usize) -> VMResult<f32> {
    instruction.imm(slot).ok_or(VMError::InvalidOperand)
}

fn index(instruction: &Instruction, slot: usize) -> VMResult<u32> {
    instruction.index(slot).ok_or(VMError::InvalidOperand)
}

fn addr(instruction: &Instruction, slot: usize) -> VMResult<usize> {
    instruction
        .addr(slot)
        .map(|target| target as usize)
        .ok_or(VMError::InvalidOperand)
}

fn truth(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Element-wise operation on two values of width `N`
fn binary<const N: usize>(ctx: &mut ExecutionContext, f: impl Fn(f32, f32) -> f32) -> VMResult<()> {
    let rhs = ctx.pop_array::<N>()?;
    let lhs = ctx.pop_array::<N>()?;
    for k in 0..N {
        ctx.push(f(lhs[k], rhs[k]))?;
    }
    Ok(())
}

/// Operation between each element of a tuple and the scalar above it
fn broadcast<const N: usize>(ctx: &mut ExecutionContext, f: impl Fn(f32, f32) -> f32) -> VMResult<()> {
    let scalar = ctx.pop()?;
    let tuple = ctx.pop_array::<N>()?;
    for value in tuple {
        ctx.push(f(value, scalar))?;
    }
    Ok(())
}

fn unary<const N: usize>(ctx: &mut ExecutionContext, f: impl Fn(f32) -> f32) -> VMResult<()> {
    let values = ctx.pop_array::<N>()?;
    for value in values {
        ctx.push(f(value))?;
    }
    Ok(())
}

fn compare<const N: usize>(ctx: &mut ExecutionContext, equal: bool) -> VMResult<()> {
    let rhs = ctx.pop_array::<N>()?;
    let lhs = ctx.pop_array::<N>()?;
    ctx.push(truth((lhs == rhs) == equal))
}

fn project<const N: usize>(ctx: &mut ExecutionContext, field: usize) -> VMResult<()> {
    let values = ctx.pop_array::<N>()?;
    ctx.push(values[field])
}

fn variadic(ctx: &mut ExecutionContext, count: u32, f: impl Fn(f32, f32) -> f32) -> VMResult<()> {
    if count == 0 {
        return Err(VMError::InvalidOperand);
    }
    let mut acc = ctx.pop()?;
    for _ in 1..count {
        acc = f(ctx.pop()?, acc);
    }
    ctx.push(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Operand, VerifyError};
    use crate::canvas::{CanvasCall, RecordingCanvas};

    fn push(value: f32) -> Instruction {
        Instruction::new(OpCode::Push).with_operand(Operand::Imm(value))
    }

    fn push_point(x: f32, y: f32) -> Instruction {
        Instruction::new(OpCode::PushPoint).with_operands(vec![Operand::Imm(x), Operand::Imm(y)])
    }

    fn op(opcode: OpCode) -> Instruction {
        Instruction::new(opcode)
    }

    fn with_index(opcode: OpCode, index: u32) -> Instruction {
        Instruction::new(opcode).with_operand(Operand::Index(index))
    }

    fn with_addr(opcode: OpCode, target: u32) -> Instruction {
        Instruction::new(opcode).with_operand(Operand::Addr(target))
    }

    fn create_vm(header: Header, instructions: Vec<Instruction>) -> VM<RecordingCanvas> {
        let mut vm = VM::new(RecordingCanvas::new(100, 50));
        vm.load(BytecodeModule::with_instructions(header, instructions))
            .expect("module should load");
        vm
    }

    /// Run `instructions`, then stop on a trailing sleep so the stacks can be inspected
    fn run_and_inspect(instructions: Vec<Instruction>) -> VM<RecordingCanvas> {
        let mut instructions = instructions;
        instructions.push(push(0.0));
        instructions.push(op(OpCode::Sleep));
        instructions.push(op(OpCode::Halt));
        let mut vm = create_vm(
            Header {
                global_slots: 8,
                image_buffers: 3,
                ..Header::default()
            },
            instructions,
        );
        assert_eq!(vm.execute().expect("execution failed"), Outcome::Sleep(Duration::ZERO));
        vm
    }

    #[test]
    fn test_scalar_arithmetic() {
        let vm = run_and_inspect(vec![push(2.0), push(3.0), op(OpCode::Add), push(4.0), op(OpCode::Mul)]);
        assert_eq!(vm.context().stack(), &[20.0]);

        let vm = run_and_inspect(vec![push(7.0), push(4.0), op(OpCode::Mod), push(2.0), op(OpCode::Pow)]);
        assert_eq!(vm.context().stack(), &[9.0]);
    }

    #[test]
    fn test_tuple_arithmetic() {
        let vm = run_and_inspect(vec![push_point(1.0, 2.0), push(10.0), op(OpCode::MulPointOnNumber)]);
        assert_eq!(vm.context().stack(), &[10.0, 20.0]);

        let vm = run_and_inspect(vec![
            push_point(5.0, 7.0),
            push_point(1.0, 2.0),
            op(OpCode::SubPoint),
            push(1.0),
            op(OpCode::SubFromPoint),
            op(OpCode::NegPoint),
        ]);
        assert_eq!(vm.context().stack(), &[-3.0, -4.0]);
    }

    #[test]
    fn test_field_projection_drops_other_slots() {
        let vm = run_and_inspect(vec![
            push_point(1.0, 2.0),
            push_point(3.0, 4.0),
            op(OpCode::GetColorBlue),
        ]);
        assert_eq!(vm.context().stack(), &[3.0]);
    }

    #[test]
    fn test_not_and_comparisons() {
        let vm = run_and_inspect(vec![
            push(0.0),
            op(OpCode::Not),
            push(5.0),
            op(OpCode::Not),
            push(1.0),
            push(2.0),
            op(OpCode::CmpLt),
            push_point(1.0, 2.0),
            push_point(1.0, 2.0),
            op(OpCode::CmpNeqPoints),
        ]);
        assert_eq!(vm.context().stack(), &[1.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_variadic_and_math() {
        let vm = run_and_inspect(vec![
            push(4.0),
            push(-2.0),
            push(9.0),
            with_index(OpCode::Min, 3),
            push(4.0),
            push(-2.0),
            push(9.0),
            with_index(OpCode::Sum, 3),
            push_point(3.0, 4.0),
            op(OpCode::Length),
            push(2.5),
            op(OpCode::Round),
        ]);
        assert_eq!(vm.context().stack(), &[-2.0, 11.0, 5.0, 3.0]);
    }

    #[test]
    fn test_init_range_normalizes_step() {
        let vm = run_and_inspect(vec![push(5.0), push(0.0), push(1.0), op(OpCode::InitRange)]);
        assert_eq!(vm.context().stack(), &[5.0, 0.0, -1.0]);

        let vm = run_and_inspect(vec![push(0.0), push(10.0), push(-3.0), op(OpCode::InitRange)]);
        assert_eq!(vm.context().stack(), &[0.0, 10.0, 3.0]);
    }

    #[test]
    fn test_check_range() {
        let vm = run_and_inspect(vec![
            push(4.0),
            push(5.0),
            push(1.0),
            op(OpCode::CheckRange),
            push(5.0),
            push(5.0),
            push(1.0),
            op(OpCode::CheckRange),
            push(1.0),
            push(0.0),
            push(-1.0),
            op(OpCode::CheckRange),
        ]);
        assert_eq!(vm.context().stack(), &[1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_locals_and_globals() {
        let vm = run_and_inspect(vec![
            push_point(1.0, 2.0),
            op(OpCode::AddLocalPoint),
            push(9.0),
            with_index(OpCode::Store, 1),
            with_index(OpCode::LoadPoint, 2),
            with_index(OpCode::StorePointGlobal, 3),
            with_index(OpCode::LoadGlobal, 4),
        ]);
        assert_eq!(vm.context().locals(), &[1.0, 9.0]);
        assert_eq!(&vm.context().globals()[3..5], &[1.0, 9.0]);
        assert_eq!(vm.context().stack(), &[9.0]);
    }

    #[test]
    fn test_counting_loop() {
        // global 0 counts to 3, drawing a pixel each time
        let instructions = vec![
            with_index(OpCode::LoadGlobal, 0),
            push(3.0),
            op(OpCode::CmpLt),
            with_addr(OpCode::GotoIfNot, 11),
            with_index(OpCode::LoadGlobal, 0),
            with_index(OpCode::LoadGlobal, 0),
            op(OpCode::DrawPix),
            with_index(OpCode::LoadGlobal, 0),
            op(OpCode::Inc),
            with_index(OpCode::StoreGlobal, 0),
            with_addr(OpCode::Goto, 0),
            op(OpCode::Halt),
        ];

        let mut vm = create_vm(
            Header {
                global_slots: 1,
                ..Header::default()
            },
            instructions,
        );
        assert_eq!(vm.execute().unwrap(), Outcome::Halted);
        let pixels: Vec<Pixel> = vm
            .canvas()
            .calls()
            .iter()
            .filter_map(|call| match call {
                CanvasCall::Pixel { at, .. } => Some(*at),
                _ => None,
            })
            .collect();
        assert_eq!(pixels, vec![Pixel::new(0, 0), Pixel::new(1, 1), Pixel::new(2, 2)]);
    }

    #[test]
    fn test_call_and_return() {
        let instructions = vec![
            push(20.0),
            with_addr(OpCode::Call, 4),
            op(OpCode::DrawPix),
            op(OpCode::Halt),
            // 4: point(arg, arg / 2)
            op(OpCode::AddLocal),
            with_index(OpCode::Load, 1),
            with_index(OpCode::Load, 1),
            push(2.0),
            op(OpCode::Div),
            with_index(OpCode::ClearScope, 1),
            op(OpCode::Ret),
        ];
        let mut vm = create_vm(Header::default(), instructions);
        assert_eq!(vm.execute().unwrap(), Outcome::Halted);
        assert_eq!(
            vm.canvas().drawing_calls(),
            vec![CanvasCall::Pixel { buffer: 0, at: Pixel::new(20, 10), color: Rgba::BLACK }]
        );
    }

    #[test]
    fn test_drawing_clamps_to_canvas() {
        let instructions = vec![
            push_point(-5.0, 1000.0),
            op(OpCode::DrawPix),
            push_point(90.0, 1.0),
            push(50.0),
            op(OpCode::DrawStroke),
            push_point(80.0, 40.0),
            push_point(100.0, 100.0),
            op(OpCode::FillRect),
            push_point(10.0, 10.0),
            push(2.5),
            op(OpCode::DrawCircle),
            op(OpCode::Halt),
        ];
        let mut vm = create_vm(Header::default(), instructions);
        vm.execute().unwrap();

        assert_eq!(
            vm.canvas().drawing_calls(),
            vec![
                CanvasCall::Pixel { buffer: 0, at: Pixel::new(0, 50), color: Rgba::BLACK },
                CanvasCall::Stroke { buffer: 0, from: Pixel::new(90, 1), length: 11, color: Rgba::BLACK },
                CanvasCall::FillRect { buffer: 0, origin: Pixel::new(80, 40), width: 20, height: 10, color: Rgba::BLACK },
                CanvasCall::Circle {
                    buffer: 0,
                    center: Pixel::new(10, 10),
                    radius: 2.5,
                    line_width: DrawState::DEFAULT_LINE_WIDTH,
                    color: Rgba::BLACK,
                },
            ]
        );
    }

    #[test]
    fn test_color_width_and_buffers() {
        let instructions = vec![
            push_point(300.0, 10.0),
            push_point(-1.0, 128.0),
            op(OpCode::SetColor),
            push(1.5),
            op(OpCode::SetWidth),
            with_index(OpCode::SetImage, 1),
            push_point(0.0, 0.0),
            push_point(5.0, 5.0),
            op(OpCode::DrawLine),
            Instruction::new(OpCode::CopyImage).with_operands(vec![Operand::Index(1), Operand::Index(0)]),
            Instruction::new(OpCode::CopyImage).with_operands(vec![Operand::Index(1), Operand::Index(1)]),
            op(OpCode::Update),
            op(OpCode::Halt),
        ];
        let mut vm = create_vm(
            Header {
                image_buffers: 2,
                ..Header::default()
            },
            instructions,
        );
        vm.execute().unwrap();

        let color = Rgba::new(255, 10, 0, 128);
        assert_eq!(
            vm.canvas().calls(),
            &[
                CanvasCall::AllocateBuffers(2),
                CanvasCall::Line {
                    buffer: 1,
                    from: Pixel::new(0, 0),
                    to: Pixel::new(5, 5),
                    line_width: 1.5,
                    color,
                },
                CanvasCall::Copy { dst: 1, src: 0 },
                CanvasCall::Update,
                CanvasCall::ReleaseBuffers,
            ]
        );
    }

    #[test]
    fn test_sleep_suspends_and_resumes() {
        let instructions = vec![
            push(100.0),
            op(OpCode::Sleep),
            push_point(1.0, 1.0),
            op(OpCode::DrawPix),
            op(OpCode::Halt),
        ];
        let mut vm = create_vm(Header::default(), instructions);

        assert_eq!(vm.execute().unwrap(), Outcome::Sleep(Duration::from_millis(100)));
        assert_eq!(vm.state(), VMState::Suspended);
        assert!(vm.canvas().drawing_calls().is_empty());

        assert_eq!(vm.execute().unwrap(), Outcome::Halted);
        assert_eq!(vm.state(), VMState::Halted);
        assert_eq!(vm.canvas().drawing_calls().len(), 1);

        assert!(matches!(vm.execute(), Err(VMError::NotRunnable(VMState::Halted))));
    }

    #[test]
    fn test_negative_sleep_is_zero() {
        let mut vm = create_vm(Header::default(), vec![push(-50.0), op(OpCode::Sleep)]);
        assert_eq!(vm.run_to_end().unwrap(), vec![Duration::ZERO]);
    }

    #[test]
    fn test_running_off_the_end_halts() {
        let mut vm = create_vm(Header::default(), vec![push(1.0), op(OpCode::Pop)]);
        assert_eq!(vm.execute().unwrap(), Outcome::Halted);
        assert_eq!(vm.state(), VMState::Halted);
    }

    #[test]
    fn test_runtime_error_halts() {
        let mut vm = create_vm(Header::default(), vec![op(OpCode::Nop), op(OpCode::Pop)]);
        let error = vm.execute().unwrap_err();
        match &error {
            VMError::Trap { pc, opcode, .. } => {
                assert_eq!(*pc, 1);
                assert_eq!(*opcode, OpCode::Pop);
            }
            other => panic!("Expected Trap, got {:?}", other),
        }
        assert!(matches!(error.root(), VMError::StackUnderflow));
        assert_eq!(vm.state(), VMState::Halted);
    }

    #[test]
    fn test_unbounded_recursion_overflows_call_stack() {
        let mut vm = create_vm(
            Header {
                max_call_stack: 8,
                ..Header::default()
            },
            vec![with_addr(OpCode::Call, 0)],
        );
        let error = vm.execute().unwrap_err();
        assert!(matches!(error.root(), VMError::CallStackOverflow(8)));
    }

    #[test]
    fn test_execute_before_load() {
        let mut vm = VM::new(RecordingCanvas::default());
        assert!(matches!(vm.execute(), Err(VMError::NotRunnable(VMState::Empty))));
    }

    #[test]
    fn test_load_rejects_unverified_module() {
        let mut vm = VM::new(RecordingCanvas::default());
        let module = BytecodeModule::with_instructions(Header::default(), vec![with_addr(OpCode::Goto, 9)]);
        assert!(matches!(vm.load(module), Err(VMError::Verification(_))));
        assert_eq!(vm.state(), VMState::Empty);
    }

    #[test]
    fn test_load_bounds_header_without_verification() {
        let mut vm = VM::new(RecordingCanvas::default());
        vm.set_verify(false);
        let header = Header {
            global_slots: u32::MAX,
            ..Header::default()
        };
        let module = BytecodeModule::with_instructions(header, vec![op(OpCode::Halt)]);
        assert!(matches!(
            vm.load(module),
            Err(VMError::Verification(VerifyError::TooManyGlobals { .. }))
        ));
        assert!(vm.canvas().calls().is_empty());
    }

    #[test]
    fn test_reload_halts_previous_program() {
        let mut vm = create_vm(Header::default(), vec![push(1.0), op(OpCode::Sleep), op(OpCode::Halt)]);
        vm.execute().unwrap();
        assert_eq!(vm.state(), VMState::Suspended);

        vm.load(BytecodeModule::with_instructions(Header::default(), vec![op(OpCode::Halt)]))
            .unwrap();
        assert_eq!(vm.state(), VMState::Loaded);
        assert_eq!(
            vm.canvas().calls(),
            &[
                CanvasCall::AllocateBuffers(1),
                CanvasCall::ReleaseBuffers,
                CanvasCall::AllocateBuffers(1),
            ]
        );
    }
}
