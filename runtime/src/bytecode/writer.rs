use std::io::{self, Write};

use crate::bytecode::BytecodeModule;

/// Writes modules in the line-oriented `.cw2c` format
pub struct Writer;

impl Writer {
    /// Six header lines followed by one `opcode operand...` line per instruction
    pub fn write<W: Write>(module: &BytecodeModule, writer: &mut W) -> io::Result<()> {
        let header = &module.header;
        writeln!(writer, "{}", header.image_buffers)?;
        writeln!(writer, "{}", header.max_call_stack)?;
        writeln!(writer, "{}", header.max_local_stack)?;
        writeln!(writer, "{}", header.max_stack)?;
        writeln!(writer, "{}", header.global_slots)?;
        writeln!(writer, "{}", module.instructions.len())?;

        for instruction in &module.instructions {
            write!(writer, "{}", instruction.opcode.to_byte())?;
            for operand in &instruction.operands {
                write!(writer, " {}", operand.to_raw())?;
            }
            writeln!(writer)?;
        }

        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Header, Instruction, OpCode, Operand};

    #[test]
    fn test_write_header_and_instructions() {
        let module = BytecodeModule::with_instructions(
            Header {
                global_slots: 3,
                ..Header::default()
            },
            vec![
                Instruction::new(OpCode::Push).with_operand(Operand::Imm(1.0)),
                Instruction::new(OpCode::Goto).with_operand(Operand::Addr(0)),
                Instruction::new(OpCode::Halt),
            ],
        );

        let text = module.to_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(&lines[..6], &["1", "2048", "65536", "65536", "3", "3"]);
        assert_eq!(lines[6], format!("1 {}", 1.0f32.to_bits()));
        assert_eq!(lines[7], "68 0");
        assert_eq!(lines[8], "72");
        assert_eq!(lines.len(), 9);
    }
}
