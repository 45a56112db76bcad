use super::CompilerContext;
use crate::analyzer::{Field, ValueType};
use crate::parser::ast::{BinaryOp, Command, Expr, Intrinsic, Shape, Slot, Statement, UnaryOp};
use cw2::bytecode::{Instruction, OpCode, Operand};

/// Whether control can reach the instruction after a statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    FallThrough,
    Terminated,
}

/// Emit a whole program followed by `HALT`
pub fn generate_program(statements: &[Statement], ctx: &mut CompilerContext) {
    generate_sequence(statements, ctx);
    ctx.code.emit(OpCode::Halt);
}

fn generate_sequence(statements: &[Statement], ctx: &mut CompilerContext) -> ControlSignal {
    let mut signal = ControlSignal::FallThrough;
    for statement in statements {
        if signal == ControlSignal::Terminated {
            // Unreachable, but functions defined here can still be called
            statement.generate_functions(ctx);
        } else {
            signal = statement.generate(ctx);
        }
    }
    signal
}

fn load_opcode(value_type: ValueType, global: bool) -> OpCode {
    match (value_type, global) {
        (ValueType::Number, false) => OpCode::Load,
        (ValueType::Point, false) => OpCode::LoadPoint,
        (ValueType::Color, false) => OpCode::LoadColor,
        (ValueType::Number, true) => OpCode::LoadGlobal,
        (ValueType::Point, true) => OpCode::LoadPointGlobal,
        (ValueType::Color, true) => OpCode::LoadColorGlobal,
    }
}

fn store_opcode(value_type: ValueType, global: bool) -> OpCode {
    match (value_type, global) {
        (ValueType::Number, false) => OpCode::Store,
        (ValueType::Point, false) => OpCode::StorePoint,
        (ValueType::Color, false) => OpCode::StoreColor,
        (ValueType::Number, true) => OpCode::StoreGlobal,
        (ValueType::Point, true) => OpCode::StorePointGlobal,
        (ValueType::Color, true) => OpCode::StoreColorGlobal,
    }
}

fn add_local_opcode(value_type: ValueType) -> OpCode {
    match value_type {
        ValueType::Number => OpCode::AddLocal,
        ValueType::Point => OpCode::AddLocalPoint,
        ValueType::Color => OpCode::AddLocalColor,
    }
}

fn pop_opcode(value_type: ValueType) -> OpCode {
    match value_type {
        ValueType::Number => OpCode::Pop,
        ValueType::Point => OpCode::PopPoint,
        ValueType::Color => OpCode::PopColor,
    }
}

fn field_opcode(field: Field) -> OpCode {
    match field {
        Field::X => OpCode::GetPointX,
        Field::Y => OpCode::GetPointY,
        Field::Red => OpCode::GetColorRed,
        Field::Green => OpCode::GetColorGreen,
        Field::Blue => OpCode::GetColorBlue,
        Field::Alpha => OpCode::GetColorAlpha,
    }
}

/// Pick the opcode variant for the operand types of a binary operator
fn binary_opcode(op: BinaryOp, shape: Shape) -> OpCode {
    use ValueType::{Color, Number, Point};

    let (same, tuple) = match shape {
        Shape::Same(t) => (true, t),
        Shape::Broadcast { tuple, .. } => (false, tuple),
    };

    match (op, same, tuple) {
        (BinaryOp::Add, true, Number) => OpCode::Add,
        (BinaryOp::Add, true, Point) => OpCode::AddPoint,
        (BinaryOp::Add, true, Color) => OpCode::AddColor,
        (BinaryOp::Add, false, Color) => OpCode::AddToColor,
        (BinaryOp::Add, false, _) => OpCode::AddToPoint,

        (BinaryOp::Sub, true, Number) => OpCode::Sub,
        (BinaryOp::Sub, true, Point) => OpCode::SubPoint,
        (BinaryOp::Sub, true, Color) => OpCode::SubColor,
        (BinaryOp::Sub, false, Color) => OpCode::SubFromColor,
        (BinaryOp::Sub, false, _) => OpCode::SubFromPoint,

        (BinaryOp::Mul, _, Number) => OpCode::Mul,
        (BinaryOp::Mul, _, Point) => OpCode::MulPointOnNumber,
        (BinaryOp::Mul, _, Color) => OpCode::MulColorOnNumber,
        (BinaryOp::Div, _, Number) => OpCode::Div,
        (BinaryOp::Div, _, Point) => OpCode::DivPointOnNumber,
        (BinaryOp::Div, _, Color) => OpCode::DivColorOnNumber,
        (BinaryOp::Mod, _, Number) => OpCode::Mod,
        (BinaryOp::Mod, _, Point) => OpCode::ModPointOnNumber,
        (BinaryOp::Mod, _, Color) => OpCode::ModColorOnNumber,
        (BinaryOp::Pow, _, Number) => OpCode::Pow,
        (BinaryOp::Pow, _, Point) => OpCode::PowPointToNumber,
        (BinaryOp::Pow, _, Color) => OpCode::PowColorToNumber,

        (BinaryOp::Equal, _, Number) => OpCode::CmpEq,
        (BinaryOp::Equal, _, Point) => OpCode::CmpEqPoints,
        (BinaryOp::Equal, _, Color) => OpCode::CmpEqColors,
        (BinaryOp::NotEqual, _, Number) => OpCode::CmpNeq,
        (BinaryOp::NotEqual, _, Point) => OpCode::CmpNeqPoints,
        (BinaryOp::NotEqual, _, Color) => OpCode::CmpNeqColors,

        (BinaryOp::Less, _, _) => OpCode::CmpLt,
        (BinaryOp::Greater, _, _) => OpCode::CmpGt,
        (BinaryOp::LessEqual, _, _) => OpCode::CmpLe,
        (BinaryOp::GreaterEqual, _, _) => OpCode::CmpGe,
        (BinaryOp::And, _, _) => OpCode::And,
        (BinaryOp::Or, _, _) => OpCode::Or,
    }
}

fn intrinsic_opcode(function: Intrinsic) -> Option<OpCode> {
    let opcode = match function {
        Intrinsic::Width => OpCode::PushWidth,
        Intrinsic::Height => OpCode::PushHeight,
        Intrinsic::Abs => OpCode::Abs,
        Intrinsic::Min => OpCode::Min,
        Intrinsic::Max => OpCode::Max,
        Intrinsic::Sum => OpCode::Sum,
        Intrinsic::Round => OpCode::Round,
        Intrinsic::Floor => OpCode::Floor,
        Intrinsic::Ceil => OpCode::Ceil,
        Intrinsic::Sin => OpCode::Sin,
        Intrinsic::Cos => OpCode::Cos,
        Intrinsic::Tan => OpCode::Tan,
        Intrinsic::Cot => OpCode::Cot,
        Intrinsic::Exp => OpCode::Exp,
        Intrinsic::Log => OpCode::Log,
        Intrinsic::Length => OpCode::Length,
        Intrinsic::Distance => OpCode::Distance,
        // The components already sit on the stack in order
        Intrinsic::Point | Intrinsic::Color => return None,
    };
    Some(opcode)
}

fn command_opcode(command: Command) -> OpCode {
    match command {
        Command::SetColor => OpCode::SetColor,
        Command::SetWidth => OpCode::SetWidth,
        Command::DrawPix => OpCode::DrawPix,
        Command::DrawStroke => OpCode::DrawStroke,
        Command::DrawLine => OpCode::DrawLine,
        Command::DrawRect => OpCode::DrawRect,
        Command::DrawCircle => OpCode::DrawCircle,
        Command::FillRect => OpCode::FillRect,
        Command::FillCircle => OpCode::FillCircle,
        Command::Sleep => OpCode::Sleep,
    }
}

fn emit_load(slot: Slot, value_type: ValueType, ctx: &mut CompilerContext) {
    match slot {
        Slot::Local { distance } => ctx.code.emit_index(load_opcode(value_type, false), distance),
        Slot::Global { index } => ctx.code.emit_index(load_opcode(value_type, true), index),
    }
}

fn emit_store(slot: Slot, value_type: ValueType, ctx: &mut CompilerContext) {
    match slot {
        Slot::Local { distance } => ctx.code.emit_index(store_opcode(value_type, false), distance),
        Slot::Global { index } => ctx.code.emit_index(store_opcode(value_type, true), index),
    }
}

impl Expr {
    /// Emit code leaving this expression's values on the operand stack
    pub fn generate(&self, ctx: &mut CompilerContext) {
        match self {
            Expr::Number(value) => ctx.code.emit_imm(OpCode::Push, *value),

            Expr::Variable {
                value_type, slot, ..
            } => emit_load(*slot, *value_type, ctx),

            Expr::Unary {
                op,
                operand,
                value_type,
            } => {
                operand.generate(ctx);
                let opcode = match (op, value_type) {
                    (UnaryOp::Not, _) => OpCode::Not,
                    (UnaryOp::Neg, ValueType::Number) => OpCode::Neg,
                    (UnaryOp::Neg, ValueType::Point) => OpCode::NegPoint,
                    (UnaryOp::Neg, ValueType::Color) => OpCode::NegColor,
                };
                ctx.code.emit(opcode);
            }

            Expr::Binary {
                op, lhs, rhs, shape, ..
            } => {
                // Broadcast opcodes expect the tuple below the Number
                if let Shape::Broadcast {
                    number_first: true,
                    ..
                } = shape
                {
                    rhs.generate(ctx);
                    lhs.generate(ctx);
                } else {
                    lhs.generate(ctx);
                    rhs.generate(ctx);
                }
                ctx.code.emit(binary_opcode(*op, *shape));
            }

            Expr::Field { base, field } => {
                base.generate(ctx);
                ctx.code.emit(field_opcode(*field));
            }

            Expr::Intrinsic { function, args } => {
                for arg in args {
                    arg.generate(ctx);
                }
                if let Some(opcode) = intrinsic_opcode(*function) {
                    if function.is_variadic() {
                        ctx.code.emit_index(opcode, args.len() as u32);
                    } else {
                        ctx.code.emit(opcode);
                    }
                }
            }

            Expr::Call { entry, args, .. } => {
                // The callee binds its parameters first to last from the top
                for arg in args.iter().rev() {
                    arg.generate(ctx);
                }
                ctx.code.emit_jump(OpCode::Call, *entry);
            }
        }
    }
}

impl Statement {
    pub fn generate(&self, ctx: &mut CompilerContext) -> ControlSignal {
        match self {
            Statement::Block { statements, clear } => {
                if generate_sequence(statements, ctx) == ControlSignal::Terminated {
                    return ControlSignal::Terminated;
                }
                if *clear > 0 {
                    ctx.code.emit_index(OpCode::ClearScope, *clear);
                }
            }

            Statement::Declare {
                value_type,
                global,
                value,
                ..
            } => {
                value.generate(ctx);
                match global {
                    Some(index) => ctx.code.emit_index(store_opcode(*value_type, true), *index),
                    None => ctx.code.emit(add_local_opcode(*value_type)),
                }
            }

            Statement::Assign {
                slot,
                value_type,
                value,
                ..
            } => {
                value.generate(ctx);
                emit_store(*slot, *value_type, ctx);
            }

            Statement::If {
                condition,
                then_branch,
                else_branch,
                else_label,
                end_label,
            } => {
                condition.generate(ctx);
                ctx.code.emit_jump(OpCode::GotoIfNot, *else_label);
                let then_signal = then_branch.generate(ctx);

                match else_branch {
                    Some(else_branch) => {
                        if then_signal == ControlSignal::FallThrough {
                            ctx.code.emit_jump(OpCode::Goto, *end_label);
                        }
                        ctx.code.set_label_at_next_instruction(*else_label);
                        let else_signal = else_branch.generate(ctx);
                        ctx.code.set_label_at_next_instruction(*end_label);
                        if then_signal == ControlSignal::Terminated
                            && else_signal == ControlSignal::Terminated
                        {
                            return ControlSignal::Terminated;
                        }
                    }
                    None => {
                        ctx.code.set_label_at_next_instruction(*else_label);
                        ctx.code.set_label_at_next_instruction(*end_label);
                    }
                }
            }

            Statement::While {
                condition,
                body,
                begin,
                end,
            } => {
                ctx.code.set_label_at_next_instruction(*begin);
                condition.generate(ctx);
                ctx.code.emit_jump(OpCode::GotoIfNot, *end);
                if body.generate(ctx) == ControlSignal::FallThrough {
                    ctx.code.emit_jump(OpCode::Goto, *begin);
                }
                ctx.code.set_label_at_next_instruction(*end);
            }

            Statement::For {
                from,
                to,
                step,
                body,
                begin,
                check,
                end,
                ..
            } => {
                match from {
                    Some(from) => from.generate(ctx),
                    None => ctx.code.emit_imm(OpCode::Push, 0.0),
                }
                to.generate(ctx);
                match step {
                    Some(step) => step.generate(ctx),
                    None => ctx.code.emit_imm(OpCode::Push, 1.0),
                }
                ctx.code.emit(OpCode::InitRange);
                // Locals become [step, to, iterator]
                for _ in 0..3 {
                    ctx.code.emit(OpCode::AddLocal);
                }
                ctx.code.emit_jump(OpCode::Goto, *check);

                ctx.code.set_label_at_next_instruction(*begin);
                ctx.code.emit_index(OpCode::Load, 1);
                ctx.code.emit_index(OpCode::Load, 3);
                ctx.code.emit(OpCode::Add);
                ctx.code.emit_index(OpCode::Store, 1);

                ctx.code.set_label_at_next_instruction(*check);
                ctx.code.emit_index(OpCode::Load, 1);
                ctx.code.emit_index(OpCode::Load, 2);
                ctx.code.emit_index(OpCode::Load, 3);
                ctx.code.emit(OpCode::CheckRange);
                ctx.code.emit_jump(OpCode::GotoIfNot, *end);

                if body.generate(ctx) == ControlSignal::FallThrough {
                    ctx.code.emit_jump(OpCode::Goto, *begin);
                }
                ctx.code.set_label_at_next_instruction(*end);
                ctx.code.emit_index(OpCode::ClearScope, 3);
            }

            Statement::Function {
                entry,
                skip,
                params,
                body,
                epilogue,
                ..
            } => {
                ctx.code.emit_jump(OpCode::Goto, *skip);
                ctx.code.set_label_at_next_instruction(*entry);
                for (_, value_type) in params {
                    ctx.code.emit(add_local_opcode(*value_type));
                }
                if body.generate(ctx) == ControlSignal::FallThrough {
                    ctx.code.add_return_instruction(*epilogue);
                }
                ctx.code.set_label_at_next_instruction(*skip);
            }

            Statement::Command { command, args } => {
                for arg in args {
                    arg.generate(ctx);
                }
                ctx.code.emit(command_opcode(*command));
            }

            Statement::SetImage { index } => ctx.code.emit_index(OpCode::SetImage, *index),

            Statement::CopyImage { dst, src } => ctx.code.add_instruction(
                Instruction::new(OpCode::CopyImage)
                    .with_operands(vec![Operand::Index(*dst), Operand::Index(*src)]),
            ),

            Statement::Update => ctx.code.emit(OpCode::Update),

            Statement::Expression { expr } => {
                expr.generate(ctx);
                for value_type in expr.ty().values().iter().rev() {
                    ctx.code.emit(pop_opcode(*value_type));
                }
            }

            Statement::Return { values, clear } => {
                for value in values {
                    value.generate(ctx);
                }
                ctx.code.add_return_instruction(*clear);
                return ControlSignal::Terminated;
            }

            Statement::Break { target, clear } | Statement::Continue { target, clear } => {
                ctx.code.add_jump_instruction(*clear, *target);
                return ControlSignal::Terminated;
            }

            Statement::Halt => {
                ctx.code.emit(OpCode::Halt);
                return ControlSignal::Terminated;
            }
        }
        ControlSignal::FallThrough
    }

    /// Emit only the function definitions nested in unreachable code
    fn generate_functions(&self, ctx: &mut CompilerContext) {
        match self {
            Statement::Function { .. } => {
                self.generate(ctx);
            }
            Statement::Block { statements, .. } => {
                for statement in statements {
                    statement.generate_functions(ctx);
                }
            }
            Statement::If {
                then_branch,
                else_branch,
                ..
            } => {
                then_branch.generate_functions(ctx);
                if let Some(else_branch) = else_branch {
                    else_branch.generate_functions(ctx);
                }
            }
            Statement::While { body, .. } | Statement::For { body, .. } => {
                body.generate_functions(ctx);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile_source;

    fn listing(source: &str) -> Vec<String> {
        compile_source(source)
            .unwrap()
            .instructions
            .iter()
            .map(|i| i.to_string())
            .collect()
    }

    #[test]
    fn test_declaration_and_draw() {
        assert_eq!(
            listing("let Point p = Point(3, 4)\ndraw_pix p"),
            vec!["Push 3", "Push 4", "AddLocalPoint", "LoadPoint #2", "DrawPix", "Halt"]
        );
    }

    #[test]
    fn test_broadcast_puts_tuple_first() {
        assert_eq!(
            listing("draw_pix 2 * Point(1, 1)"),
            vec!["Push 1", "Push 1", "Push 2", "MulPointOnNumber", "DrawPix", "Halt"]
        );
    }

    #[test]
    fn test_field_store_distance() {
        assert_eq!(
            listing("let Color c = Color(1, 2, 3, 4)\nset c.b to 9"),
            vec![
                "Push 1",
                "Push 2",
                "Push 3",
                "Push 4",
                "AddLocalColor",
                "Push 9",
                "Store #2",
                "Halt"
            ]
        );
    }

    #[test]
    fn test_global_field_store() {
        assert_eq!(
            listing("global Point g = Point(0, 0)\nset g.y to 1"),
            vec!["Push 0", "Push 0", "StorePointGlobal #0", "Push 1", "StoreGlobal #1", "Halt"]
        );
    }

    #[test]
    fn test_for_loop_layout() {
        assert_eq!(
            listing("for i in range(3) { draw_pix Point(i, i) }"),
            vec![
                "Push 0",
                "Push 3",
                "Push 1",
                "InitRange",
                "AddLocal",
                "AddLocal",
                "AddLocal",
                "Goto @12",
                "Load #1",
                "Load #3",
                "Add",
                "Store #1",
                "Load #1",
                "Load #2",
                "Load #3",
                "CheckRange",
                "GotoIfNot @21",
                "Load #1",
                "Load #1",
                "DrawPix",
                "Goto @8",
                "ClearScope #3",
                "Halt"
            ]
        );
    }

    #[test]
    fn test_break_clears_nested_locals() {
        let code = listing(
            "while 1 {\n  let Number a = 1\n  while 1 {\n    let Point p = Point(0, 0)\n    break 1\n  }\n}",
        );
        let at = code.iter().position(|i| i == "ClearScope #3").unwrap();
        assert!(code[at + 1].starts_with("Goto @"));
        let target: usize = code[at + 1]["Goto @".len()..].parse().unwrap();
        assert_eq!(code[target], "Halt");
    }

    #[test]
    fn test_function_layout() {
        assert_eq!(
            listing("def twice(Number n) Number = n * 2\ndraw_pix Point(twice(1), 0)"),
            vec![
                "Goto @7",
                "AddLocal",
                "Load #1",
                "Push 2",
                "Mul",
                "ClearScope #1",
                "Ret",
                "Push 1",
                "Call @1",
                "Push 0",
                "DrawPix",
                "Halt"
            ]
        );
    }

    #[test]
    fn test_expression_statement_pops_results() {
        let code = listing("def pair() Number, Point { return 1, Point(2, 3) }\npair()");
        let tail: Vec<&str> = code.iter().rev().take(3).map(|s| s.as_str()).collect();
        assert_eq!(tail, vec!["Halt", "Pop", "PopPoint"]);
    }

    #[test]
    fn test_dead_code_keeps_functions() {
        let code = listing("f()\nhalt\ndef f() { update }");
        assert_eq!(code[0], "Call @3");
        assert_eq!(code[1], "Halt");
        assert_eq!(code[3], "Update");
    }
}
