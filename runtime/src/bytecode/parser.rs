use std::io::{BufRead, Error as IoError};

use thiserror::Error;

use crate::bytecode::{BytecodeModule, Header, Instruction, OpCode, Operand, VerifyError};

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    IoError(#[from] IoError),

    #[error("Invalid header at line {line}: {message}")]
    InvalidHeader { line: usize, message: String },

    #[error("Unknown opcode {id} at line {line}")]
    UnknownOpcode { line: usize, id: String },

    #[error("Opcode {opcode:?} at line {line} takes {expected} operand(s), found {found}")]
    OperandCount {
        line: usize,
        opcode: OpCode,
        expected: usize,
        found: usize,
    },

    #[error("Invalid operand '{text}' at line {line}")]
    InvalidOperand { line: usize, text: String },

    #[error("Header declares {declared} instructions but the file contains {found}")]
    InstructionCount { declared: usize, found: usize },

    #[error("Verification failed: {0}")]
    Verification(#[from] VerifyError),
}

const HEADER_FIELDS: [&str; 6] = [
    "image buffer count",
    "max call stack size",
    "max local stack size",
    "max stack size",
    "global slot count",
    "instruction count",
];

/// Reads the `.cw2c` text format
pub struct Parser;

impl Parser {
    /// Parse a module from a reader (file, memory buffer, etc.)
    ///
    /// Only the file structure is checked here; see [`crate::bytecode::verify`]
    /// for the semantic checks.
    pub fn parse<R: BufRead>(reader: R) -> Result<BytecodeModule, LoadError> {
        let mut lines = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if !line.trim().is_empty() {
                lines.push((index + 1, line));
            }
        }

        if lines.len() < HEADER_FIELDS.len() {
            return Err(LoadError::InvalidHeader {
                line: lines.len() + 1,
                message: format!("missing {}", HEADER_FIELDS[lines.len()]),
            });
        }

        let mut values = [0u32; 6];
        for (slot, (line, text)) in lines.iter().take(HEADER_FIELDS.len()).enumerate() {
            values[slot] = text.trim().parse().map_err(|_| LoadError::InvalidHeader {
                line: *line,
                message: format!("{} must be a non-negative integer, found '{}'", HEADER_FIELDS[slot], text.trim()),
            })?;
        }

        let header = Header {
            image_buffers: values[0],
            max_call_stack: values[1],
            max_local_stack: values[2],
            max_stack: values[3],
            global_slots: values[4],
        };
        let declared = values[5] as usize;

        let body = &lines[HEADER_FIELDS.len()..];
        if body.len() != declared {
            return Err(LoadError::InstructionCount {
                declared,
                found: body.len(),
            });
        }

        let mut module = BytecodeModule::new(header);
        module.instructions.reserve(declared);
        for (line, text) in body {
            module.instructions.push(Self::parse_instruction(*line, text)?);
        }

        Ok(module)
    }

    /// Parse a module from an in-memory string
    pub fn parse_str(text: &str) -> Result<BytecodeModule, LoadError> {
        Self::parse(text.as_bytes())
    }

    fn parse_instruction(line: usize, text: &str) -> Result<Instruction, LoadError> {
        let mut fields = text.split_whitespace();
        let id = fields.next().unwrap_or_default();
        let opcode = id
            .parse::<u32>()
            .ok()
            .and_then(OpCode::from_id)
            .ok_or_else(|| LoadError::UnknownOpcode {
                line,
                id: id.to_string(),
            })?;

        let raw: Vec<&str> = fields.collect();
        let kinds = opcode.operand_kinds();
        if raw.len() != kinds.len() {
            return Err(LoadError::OperandCount {
                line,
                opcode,
                expected: kinds.len(),
                found: raw.len(),
            });
        }

        let mut instruction = Instruction::new(opcode);
        for (kind, text) in kinds.iter().zip(raw) {
            let value = text.parse::<u32>().map_err(|_| LoadError::InvalidOperand {
                line,
                text: text.to_string(),
            })?;
            instruction = instruction.with_operand(Operand::from_raw(*kind, value));
        }
        Ok(instruction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header_lines(instructions: usize) -> String {
        format!("1\n2048\n65536\n65536\n0\n{}\n", instructions)
    }

    #[test]
    fn test_parse_valid_module() {
        let text = format!("{}1 {}\n3\n72\n", header_lines(3), 2.5f32.to_bits());
        let module = Parser::parse(Cursor::new(text)).expect("valid module");

        assert_eq!(module.header, Header::default());
        assert_eq!(module.instructions.len(), 3);
        assert_eq!(module.instructions[0].opcode, OpCode::Push);
        assert_eq!(module.instructions[0].imm(0), Some(2.5));
        assert_eq!(module.instructions[1].opcode, OpCode::Pop);
        assert_eq!(module.instructions[2].opcode, OpCode::Halt);
    }

    #[test]
    fn test_parse_round_trips_writer_output() {
        let module = BytecodeModule::with_instructions(
            Header {
                image_buffers: 3,
                global_slots: 6,
                ..Header::default()
            },
            vec![
                Instruction::new(OpCode::PushPoint).with_operands(vec![Operand::Imm(-1.25), Operand::Imm(7.0)]),
                Instruction::new(OpCode::StorePointGlobal).with_operand(Operand::Index(4)),
                Instruction::new(OpCode::CopyImage).with_operands(vec![Operand::Index(1), Operand::Index(2)]),
                Instruction::new(OpCode::Halt),
            ],
        );

        let parsed = Parser::parse_str(&module.to_text()).expect("round trip");
        assert_eq!(parsed, module);
    }

    #[test]
    fn test_missing_header_line() {
        let result = Parser::parse_str("1\n2048\n65536\n");
        match result {
            Err(LoadError::InvalidHeader { line, message }) => {
                assert_eq!(line, 4);
                assert!(message.contains("max stack size"));
            }
            other => panic!("Expected InvalidHeader, got {:?}", other),
        }
    }

    #[test]
    fn test_non_numeric_header() {
        let result = Parser::parse_str("1\n2048\nlots\n65536\n0\n0\n");
        assert!(matches!(result, Err(LoadError::InvalidHeader { line: 3, .. })));
    }

    #[test]
    fn test_unknown_opcode() {
        let text = format!("{}999\n", header_lines(1));
        let result = Parser::parse_str(&text);
        match result {
            Err(LoadError::UnknownOpcode { line, id }) => {
                assert_eq!(line, 7);
                assert_eq!(id, "999");
            }
            other => panic!("Expected UnknownOpcode, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_operand_count() {
        let text = format!("{}68\n", header_lines(1));
        let result = Parser::parse_str(&text);
        assert!(matches!(
            result,
            Err(LoadError::OperandCount { opcode: OpCode::Goto, expected: 1, found: 0, .. })
        ));

        let text = format!("{}72 5\n", header_lines(1));
        assert!(matches!(
            Parser::parse_str(&text),
            Err(LoadError::OperandCount { opcode: OpCode::Halt, expected: 0, found: 1, .. })
        ));
    }

    #[test]
    fn test_invalid_operand() {
        let text = format!("{}16 -1\n", header_lines(1));
        let result = Parser::parse_str(&text);
        assert!(matches!(result, Err(LoadError::InvalidOperand { .. })));
    }

    #[test]
    fn test_instruction_count_mismatch() {
        let text = format!("{}72\n72\n", header_lines(1));
        let result = Parser::parse_str(&text);
        assert!(matches!(
            result,
            Err(LoadError::InstructionCount { declared: 1, found: 2 })
        ));
    }

    #[test]
    fn test_error_display() {
        let error = LoadError::InstructionCount { declared: 4, found: 2 };
        assert_eq!(
            error.to_string(),
            "Header declares 4 instructions but the file contains 2"
        );
    }
}
