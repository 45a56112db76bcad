//! Tree-walking evaluator for checked programs.
//!
//! Runs the typed syntax tree directly against a [`Canvas`], keeping locals
//! on a flat stack addressed the same way the VM addresses them. A compiled
//! program must make exactly the canvas calls this evaluator makes.

use std::time::Duration;

use cw2::bytecode::Header;
use cw2::vm::DrawState;
use cw2::{Canvas, Rgba};
use log::debug;
use rustc_hash::FxHashMap;

use crate::analyzer::ValueType;
use crate::codegen::Label;
use crate::parser::ast::{BinaryOp, Command, Expr, Intrinsic, Shape, Slot, Statement, UnaryOp};

/// Nesting limit for calls, kept low since each call recurses natively
pub const DEFAULT_MAX_CALL_DEPTH: u32 = 256;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterpretError {
    #[error("Call stack overflow (limit {0})")]
    CallStackOverflow(u32),

    #[error("Local stack overflow (limit {0})")]
    LocalStackOverflow(u32),

    #[error("Invalid local variable distance: {0}")]
    InvalidLocalIndex(u32),

    #[error("Invalid global slot: {0}")]
    InvalidGlobalIndex(u32),

    #[error("Cannot clear {0} local slot(s)")]
    InvalidScopeClear(u32),

    #[error("Function '{0}' has no definition in this program")]
    UndefinedFunction(String),
}

/// How control leaves a statement
enum Flow {
    Normal,
    /// `break` or `continue`, resolved by the loop owning the label
    Jump(Label),
    Return(Vec<f32>),
}

/// Unwinds evaluation early
enum Interrupt {
    Halt,
    Error(InterpretError),
}

impl From<InterpretError> for Interrupt {
    fn from(error: InterpretError) -> Self {
        Interrupt::Error(error)
    }
}

type Exec<T> = Result<T, Interrupt>;
type Functions<'p> = FxHashMap<Label, &'p Statement>;

pub struct Interpreter<C: Canvas> {
    canvas: C,
    draw: DrawState,
    globals: Vec<f32>,
    locals: Vec<f32>,
    sleeps: Vec<Duration>,
    depth: u32,
    max_call_depth: u32,
    call_limit: u32,
    local_limit: u32,
}

impl<C: Canvas> Interpreter<C> {
    pub fn new(canvas: C) -> Self {
        let draw = DrawState::new(canvas.width(), canvas.height());
        Self {
            canvas,
            draw,
            globals: Vec::new(),
            locals: Vec::new(),
            sleeps: Vec::new(),
            depth: 0,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            call_limit: DEFAULT_MAX_CALL_DEPTH,
            local_limit: 0,
        }
    }

    pub fn with_max_call_depth(mut self, depth: u32) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn canvas(&self) -> &C {
        &self.canvas
    }

    pub fn into_canvas(self) -> C {
        self.canvas
    }

    pub fn draw_state(&self) -> &DrawState {
        &self.draw
    }

    /// Run a whole program, returning the sleeps it requested in order.
    ///
    /// Sleeps are recorded, not waited for. Buffers are allocated from the
    /// header and released again however the run ends.
    pub fn run(&mut self, statements: &[Statement], header: &Header) -> Result<Vec<Duration>, InterpretError> {
        let mut functions = Functions::default();
        collect_functions(statements, &mut functions);

        self.globals = vec![0.0; header.global_slots as usize];
        self.locals.clear();
        self.sleeps.clear();
        self.depth = 0;
        self.call_limit = self.max_call_depth.min(header.max_call_stack);
        self.local_limit = header.max_local_stack;
        self.draw = DrawState::new(self.canvas.width(), self.canvas.height());
        self.canvas.allocate_buffers(header.image_buffers);

        let result = self.exec_sequence(statements, &functions);
        self.canvas.release_buffers();

        match result {
            Ok(_) | Err(Interrupt::Halt) => {
                debug!("interpreted program, {} sleep(s)", self.sleeps.len());
                Ok(std::mem::take(&mut self.sleeps))
            }
            Err(Interrupt::Error(error)) => Err(error),
        }
    }

    fn exec_sequence<'p>(&mut self, statements: &'p [Statement], functions: &Functions<'p>) -> Exec<Flow> {
        for statement in statements {
            match self.exec(statement, functions)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec<'p>(&mut self, statement: &'p Statement, functions: &Functions<'p>) -> Exec<Flow> {
        match statement {
            Statement::Block { statements, clear } => {
                let flow = self.exec_sequence(statements, functions)?;
                if let Flow::Normal = flow {
                    self.clear(*clear)?;
                }
                return Ok(flow);
            }

            Statement::Declare { global, value, .. } => {
                let values = self.eval(value, functions)?;
                match global {
                    Some(index) => self.store(Slot::Global { index: *index }, &values)?,
                    None => self.push_locals(&values)?,
                }
            }

            Statement::Assign { slot, value, .. } => {
                let values = self.eval(value, functions)?;
                self.store(*slot, &values)?;
            }

            Statement::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                if self.eval_number(condition, functions)? != 0.0 {
                    return self.exec(then_branch, functions);
                }
                if let Some(else_branch) = else_branch {
                    return self.exec(else_branch, functions);
                }
            }

            Statement::While {
                condition,
                body,
                begin,
                end,
            } => {
                while self.eval_number(condition, functions)? != 0.0 {
                    match self.exec(body, functions)? {
                        Flow::Normal => {}
                        Flow::Jump(target) if target == *begin => {}
                        Flow::Jump(target) if target == *end => break,
                        flow => return Ok(flow),
                    }
                }
            }

            Statement::For {
                from,
                to,
                step,
                body,
                begin,
                end,
                ..
            } => {
                let from = match from {
                    Some(from) => self.eval_number(from, functions)?,
                    None => 0.0,
                };
                let to = self.eval_number(to, functions)?;
                let step = match step {
                    Some(step) => self.eval_number(step, functions)?,
                    None => 1.0,
                };
                let step = if to < from { -step.abs() } else { step.abs() };
                self.push_locals(&[step, to, from])?;

                loop {
                    let [step, to, iter] = self.range_state()?;
                    let inside = if step < 0.0 { to < iter } else { to > iter };
                    if !inside {
                        break;
                    }

                    match self.exec(body, functions)? {
                        Flow::Normal => {}
                        Flow::Jump(target) if target == *begin => {}
                        Flow::Jump(target) if target == *end => break,
                        flow => return Ok(flow),
                    }

                    let [step, _, iter] = self.range_state()?;
                    self.store(Slot::Local { distance: 1 }, &[iter + step])?;
                }

                self.clear(3)?;
            }

            // Bodies run when called
            Statement::Function { .. } => {}

            Statement::Command { command, args } => {
                let mut values = Vec::new();
                for arg in args {
                    values.extend(self.eval(arg, functions)?);
                }
                self.command(*command, &values);
            }

            Statement::SetImage { index } => self.draw.target = *index,

            Statement::CopyImage { dst, src } => {
                if src != dst {
                    self.canvas.copy_buffer(*dst, *src);
                }
            }

            Statement::Update => {
                self.canvas.notify_updated();
                self.draw.width = self.canvas.width();
                self.draw.height = self.canvas.height();
            }

            Statement::Expression { expr } => {
                self.eval(expr, functions)?;
            }

            Statement::Return { values, clear } => {
                let mut result = Vec::new();
                for value in values {
                    result.extend(self.eval(value, functions)?);
                }
                self.clear(*clear)?;
                return Ok(Flow::Return(result));
            }

            Statement::Break { target, clear } | Statement::Continue { target, clear } => {
                self.clear(*clear)?;
                return Ok(Flow::Jump(*target));
            }

            Statement::Halt => return Err(Interrupt::Halt),
        }
        Ok(Flow::Normal)
    }

    fn command(&mut self, command: Command, values: &[f32]) {
        let draw = &mut self.draw;
        match command {
            Command::SetColor => draw.color = Rgba::from_components(take(values)),
            Command::SetWidth => draw.line_width = values.first().copied().unwrap_or_default(),
            Command::DrawPix => {
                let at = draw.pixel(take(values));
                self.canvas.draw_pixel(draw.target, at, draw.color);
            }
            Command::DrawStroke => {
                let [x, y, length] = take(values);
                let from = draw.pixel([x, y]);
                let length = draw.stroke_length(from, length);
                self.canvas.draw_stroke(draw.target, from, length, draw.color);
            }
            Command::DrawLine => {
                let [x1, y1, x2, y2] = take(values);
                let from = draw.pixel([x1, y1]);
                let to = draw.pixel([x2, y2]);
                self.canvas
                    .draw_line(draw.target, from, to, draw.line_width, draw.color);
            }
            Command::DrawRect | Command::FillRect => {
                let [x, y, width, height] = take(values);
                let origin = draw.pixel([x, y]);
                let (width, height) = draw.rect_size(origin, width, height);
                if command == Command::DrawRect {
                    self.canvas
                        .draw_rect(draw.target, origin, width, height, draw.line_width, draw.color);
                } else {
                    self.canvas
                        .fill_rect(draw.target, origin, width, height, draw.color);
                }
            }
            Command::DrawCircle | Command::FillCircle => {
                let [x, y, radius] = take(values);
                let center = draw.pixel([x, y]);
                if command == Command::DrawCircle {
                    self.canvas
                        .draw_circle(draw.target, center, radius, draw.line_width, draw.color);
                } else {
                    self.canvas.fill_circle(draw.target, center, radius, draw.color);
                }
            }
            Command::Sleep => {
                let millis = values.first().copied().unwrap_or_default() as u64;
                self.sleeps.push(Duration::from_millis(millis));
            }
        }
    }

    fn eval_number<'p>(&mut self, expr: &'p Expr, functions: &Functions<'p>) -> Exec<f32> {
        Ok(self.eval(expr, functions)?.first().copied().unwrap_or_default())
    }

    /// Evaluate to the flattened slots of the expression's values
    fn eval<'p>(&mut self, expr: &'p Expr, functions: &Functions<'p>) -> Exec<Vec<f32>> {
        let values = match expr {
            Expr::Number(value) => vec![*value],

            Expr::Variable {
                value_type, slot, ..
            } => self.load(*slot, *value_type)?,

            Expr::Unary { op, operand, .. } => {
                let values = self.eval(operand, functions)?;
                match op {
                    UnaryOp::Neg => values.into_iter().map(|v| -v).collect(),
                    UnaryOp::Not => vec![truth(values.first() == Some(&0.0))],
                }
            }

            Expr::Binary {
                op, lhs, rhs, shape, ..
            } => {
                let (l, r) = match shape {
                    Shape::Broadcast {
                        number_first: true,
                        ..
                    } => {
                        let r = self.eval(rhs, functions)?;
                        (self.eval(lhs, functions)?, r)
                    }
                    _ => {
                        let l = self.eval(lhs, functions)?;
                        (l, self.eval(rhs, functions)?)
                    }
                };
                binary(*op, *shape, l, r)
            }

            Expr::Field { base, field } => {
                let values = self.eval(base, functions)?;
                vec![values.get(field.offset() as usize).copied().unwrap_or_default()]
            }

            Expr::Intrinsic { function, args } => {
                let mut values = Vec::new();
                for arg in args {
                    values.extend(self.eval(arg, functions)?);
                }
                self.intrinsic(*function, values)
            }

            Expr::Call {
                name, entry, args, ..
            } => {
                // Same evaluation order as the pushes before `CALL`
                let mut evaluated = Vec::with_capacity(args.len());
                for arg in args.iter().rev() {
                    evaluated.push(self.eval(arg, functions)?);
                }
                self.call(name, *entry, evaluated, functions)?
            }
        };
        Ok(values)
    }

    fn call<'p>(
        &mut self,
        name: &str,
        entry: Label,
        mut reversed_args: Vec<Vec<f32>>,
        functions: &Functions<'p>,
    ) -> Exec<Vec<f32>> {
        let (body, epilogue) = match functions.get(&entry).copied() {
            Some(Statement::Function { body, epilogue, .. }) => (body, *epilogue),
            _ => return Err(InterpretError::UndefinedFunction(name.to_string()).into()),
        };
        if self.depth >= self.call_limit {
            return Err(InterpretError::CallStackOverflow(self.call_limit).into());
        }

        while let Some(arg) = reversed_args.pop() {
            self.push_locals(&arg)?;
        }

        self.depth += 1;
        let flow = self.exec(body, functions);
        self.depth -= 1;

        match flow? {
            Flow::Return(values) => Ok(values),
            _ => {
                self.clear(epilogue)?;
                Ok(Vec::new())
            }
        }
    }

    fn intrinsic(&self, function: Intrinsic, values: Vec<f32>) -> Vec<f32> {
        let first = values.first().copied().unwrap_or_default();
        let value = match function {
            Intrinsic::Point | Intrinsic::Color => return values,
            Intrinsic::Width => self.draw.width as f32,
            Intrinsic::Height => self.draw.height as f32,
            Intrinsic::Min => fold_right(&values, f32::min),
            Intrinsic::Max => fold_right(&values, f32::max),
            Intrinsic::Sum => fold_right(&values, |a, b| a + b),
            Intrinsic::Abs => first.abs(),
            Intrinsic::Round => first.round(),
            Intrinsic::Floor => first.floor(),
            Intrinsic::Ceil => first.ceil(),
            Intrinsic::Sin => first.sin(),
            Intrinsic::Cos => first.cos(),
            Intrinsic::Tan => first.tan(),
            Intrinsic::Cot => 1.0 / first.tan(),
            Intrinsic::Exp => first.exp(),
            Intrinsic::Log => first.ln(),
            Intrinsic::Length => {
                let [x, y] = take(&values);
                x.hypot(y)
            }
            Intrinsic::Distance => {
                let [x1, y1, x2, y2] = take(&values);
                (x1 - x2).hypot(y1 - y2)
            }
        };
        vec![value]
    }

    /// `[step, to, iterator]` of the innermost range loop
    fn range_state(&self) -> Result<[f32; 3], InterpretError> {
        let start = self
            .locals
            .len()
            .checked_sub(3)
            .ok_or(InterpretError::InvalidLocalIndex(3))?;
        Ok(take(&self.locals[start..]))
    }

    fn push_locals(&mut self, values: &[f32]) -> Result<(), InterpretError> {
        if self.locals.len() + values.len() > self.local_limit as usize {
            return Err(InterpretError::LocalStackOverflow(self.local_limit));
        }
        self.locals.extend_from_slice(values);
        Ok(())
    }

    fn clear(&mut self, count: u32) -> Result<(), InterpretError> {
        let len = self.locals.len();
        if count as usize > len {
            return Err(InterpretError::InvalidScopeClear(count));
        }
        self.locals.truncate(len - count as usize);
        Ok(())
    }

    fn slot_range(&self, slot: Slot, width: usize) -> Result<(bool, std::ops::Range<usize>), InterpretError> {
        match slot {
            Slot::Local { distance } => {
                let d = distance as usize;
                if d == 0 || d > self.locals.len() || width > d {
                    return Err(InterpretError::InvalidLocalIndex(distance));
                }
                let start = self.locals.len() - d;
                Ok((false, start..start + width))
            }
            Slot::Global { index } => {
                let start = index as usize;
                if start + width > self.globals.len() {
                    return Err(InterpretError::InvalidGlobalIndex(index));
                }
                Ok((true, start..start + width))
            }
        }
    }

    fn load(&self, slot: Slot, value_type: ValueType) -> Result<Vec<f32>, InterpretError> {
        let (global, range) = self.slot_range(slot, value_type.slots() as usize)?;
        let area = if global { &self.globals } else { &self.locals };
        Ok(area[range].to_vec())
    }

    fn store(&mut self, slot: Slot, values: &[f32]) -> Result<(), InterpretError> {
        let (global, range) = self.slot_range(slot, values.len())?;
        let area = if global { &mut self.globals } else { &mut self.locals };
        area[range].copy_from_slice(values);
        Ok(())
    }
}

fn collect_functions<'p>(statements: &'p [Statement], functions: &mut Functions<'p>) {
    for statement in statements {
        collect_in(statement, functions);
    }
}

fn collect_in<'p>(statement: &'p Statement, functions: &mut Functions<'p>) {
    match statement {
        Statement::Function { entry, body, .. } => {
            functions.insert(*entry, statement);
            collect_in(body, functions);
        }
        Statement::Block { statements, .. } => collect_functions(statements, functions),
        Statement::If {
            then_branch,
            else_branch,
            ..
        } => {
            collect_in(then_branch, functions);
            if let Some(else_branch) = else_branch {
                collect_in(else_branch, functions);
            }
        }
        Statement::While { body, .. } | Statement::For { body, .. } => collect_in(body, functions),
        _ => {}
    }
}

fn truth(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// First `N` values, zero-padded
fn take<const N: usize>(values: &[f32]) -> [f32; N] {
    let mut out = [0.0; N];
    for (slot, value) in out.iter_mut().zip(values) {
        *slot = *value;
    }
    out
}

/// `f(v0, f(v1, ... f(vn-2, vn-1)))`, the order the VM pops in
fn fold_right(values: &[f32], f: impl Fn(f32, f32) -> f32) -> f32 {
    let mut iter = values.iter().rev();
    let mut acc = iter.next().copied().unwrap_or_default();
    for value in iter {
        acc = f(*value, acc);
    }
    acc
}

fn binary(op: BinaryOp, shape: Shape, l: Vec<f32>, r: Vec<f32>) -> Vec<f32> {
    let first = |values: &[f32]| values.first().copied().unwrap_or_default();

    match op {
        BinaryOp::Equal => return vec![truth(l == r)],
        BinaryOp::NotEqual => return vec![truth(l != r)],
        BinaryOp::Less => return vec![truth(first(&l) < first(&r))],
        BinaryOp::Greater => return vec![truth(first(&l) > first(&r))],
        BinaryOp::LessEqual => return vec![truth(first(&l) <= first(&r))],
        BinaryOp::GreaterEqual => return vec![truth(first(&l) >= first(&r))],
        BinaryOp::And => return vec![truth(first(&l) != 0.0 && first(&r) != 0.0)],
        BinaryOp::Or => return vec![truth(first(&l) != 0.0 || first(&r) != 0.0)],
        _ => {}
    }

    let f = |a: f32, b: f32| match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        _ => a.powf(b),
    };

    match shape {
        Shape::Same(_) => l.iter().zip(&r).map(|(a, b)| f(*a, *b)).collect(),
        Shape::Broadcast { number_first, .. } => {
            let (tuple, scalar) = if number_first { (r, first(&l)) } else { (l, first(&r)) };
            tuple.into_iter().map(|v| f(v, scalar)).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::CompilerContext;
    use crate::parse_source;
    use cw2::canvas::{CanvasCall, RecordingCanvas};
    use cw2::Pixel;

    fn interpret(source: &str) -> (Vec<CanvasCall>, Vec<Duration>) {
        let mut ctx = CompilerContext::new();
        let statements = parse_source(source, &mut ctx).unwrap();
        let mut interpreter = Interpreter::new(RecordingCanvas::new(100, 100));
        let sleeps = interpreter.run(&statements, &ctx.header()).unwrap();
        (interpreter.canvas().drawing_calls(), sleeps)
    }

    fn pixels(source: &str) -> Vec<(u32, u32)> {
        interpret(source)
            .0
            .into_iter()
            .filter_map(|call| match call {
                CanvasCall::Pixel { at, .. } => Some((at.x, at.y)),
                _ => None,
            })
            .collect()
    }

    fn xs(source: &str) -> Vec<u32> {
        pixels(source).into_iter().map(|(x, _)| x).collect()
    }

    #[test]
    fn test_ranges() {
        assert_eq!(xs("for i in range(5) draw_pix Point(i, 0)"), vec![0, 1, 2, 3, 4]);
        assert_eq!(xs("for i in range(0, 5) draw_pix Point(i, 0)"), vec![0, 1, 2, 3, 4]);
        assert_eq!(xs("for i in range(5, 0) draw_pix Point(i, 0)"), vec![5, 4, 3, 2, 1]);
        assert_eq!(xs("for i in range(0, 10, -3) draw_pix Point(i, 0)"), vec![0, 3, 6, 9]);
        assert!(xs("for i in range(3, 3) draw_pix Point(i, 0)").is_empty());
    }

    #[test]
    fn test_break_and_continue() {
        let source = "let Number kept = 7\n\
                      for i in range(10) {\n\
                        let Point p = Point(i, kept)\n\
                        for j in range(10) {\n\
                          let Number unused = j\n\
                          if i == 2 { break 1 }\n\
                          if j == 1 { break }\n\
                          draw_pix Point(i, j)\n\
                        }\n\
                        if i == 0 { continue }\n\
                        draw_pix p\n\
                      }\n\
                      draw_pix Point(kept, kept)";
        assert_eq!(pixels(source), vec![(0, 0), (1, 0), (1, 7), (7, 7)]);
    }

    #[test]
    fn test_functions_and_recursion() {
        let source = "def fact(Number n) Number {\n\
                        if n <= 1 { return 1 }\n\
                        return n * fact(n - 1)\n\
                      }\n\
                      def swap(Number a, Number b) Number, Number { return b, a }\n\
                      draw_pix Point(fact(4), 1)\n\
                      def pair(Point p) Point = p + 1\n\
                      draw_pix pair(Point(1, 2))";
        assert_eq!(pixels(source), vec![(24, 1), (2, 3)]);
    }

    #[test]
    fn test_overloads_and_globals() {
        let source = "global Number hits = 0\n\
                      def mark(Number x) { set hits to hits + 1\n draw_pix Point(x, hits) }\n\
                      def mark(Point p) { set hits to hits + 10\n draw_pix p }\n\
                      mark(5)\n\
                      mark(Point(8, 9))\n\
                      draw_pix Point(hits, hits)";
        assert_eq!(pixels(source), vec![(5, 1), (8, 9), (11, 11)]);
    }

    #[test]
    fn test_field_assignment() {
        let source = "let Point p = Point(1, 2)\n\
                      set p.y to 40\n\
                      global Color c = Color(1, 2, 3, 4)\n\
                      set c.blue to 90\n\
                      draw_pix Point(p.y, c.b)";
        assert_eq!(pixels(source), vec![(40, 90)]);
    }

    #[test]
    fn test_halt_inside_function() {
        let source = "def stop() { halt }\ndraw_pix Point(1, 1)\nstop()\ndraw_pix Point(2, 2)";
        assert_eq!(pixels(source), vec![(1, 1)]);
    }

    #[test]
    fn test_drawing_state() {
        let (calls, sleeps) = interpret(
            "set_image_buffer 2\n\
             set_color Color(255, 0, 0, 300)\n\
             set_width 5\n\
             set_image 1\n\
             draw_line Point(0, 0), Point(200, 10)\n\
             sleep 100\n\
             copy_image 0 to 1\n\
             update\n\
             sleep -4",
        );
        assert_eq!(
            calls,
            vec![
                CanvasCall::Line {
                    buffer: 1,
                    from: Pixel::new(0, 0),
                    to: Pixel::new(100, 10),
                    line_width: 5.0,
                    color: Rgba::new(255, 0, 0, 255),
                },
                CanvasCall::Copy { dst: 0, src: 1 },
                CanvasCall::Update,
            ]
        );
        assert_eq!(sleeps, vec![Duration::from_millis(100), Duration::ZERO]);
    }

    #[test]
    fn test_buffers_allocated_and_released() {
        let mut ctx = CompilerContext::new();
        let statements = parse_source("set_image_buffer 3\nhalt", &mut ctx).unwrap();
        let mut interpreter = Interpreter::new(RecordingCanvas::new(10, 10));
        interpreter.run(&statements, &ctx.header()).unwrap();
        assert_eq!(
            interpreter.canvas().calls(),
            &[CanvasCall::AllocateBuffers(3), CanvasCall::ReleaseBuffers]
        );
    }

    #[test]
    fn test_runaway_recursion() {
        let mut ctx = CompilerContext::new();
        let statements = parse_source("def f() { f() }\nf()", &mut ctx).unwrap();
        let mut interpreter = Interpreter::new(RecordingCanvas::new(10, 10)).with_max_call_depth(32);
        assert_eq!(
            interpreter.run(&statements, &ctx.header()),
            Err(InterpretError::CallStackOverflow(32))
        );
        assert_eq!(interpreter.canvas().calls().last(), Some(&CanvasCall::ReleaseBuffers));
    }
}
