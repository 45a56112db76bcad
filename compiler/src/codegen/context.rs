use super::{CodeGenerator, CodegenError, Label, LABEL_OFFSET};
use crate::analyzer::{SymbolTable, Type, ValueType, Variable};
use crate::parser::ParseError;
use cw2::bytecode::{
    BytecodeModule, Header, DEFAULT_IMAGE_BUFFERS, DEFAULT_MAX_CALL_STACK, DEFAULT_MAX_LOCAL_STACK,
    DEFAULT_MAX_STACK, MAX_GLOBAL_SLOTS,
};
use log::debug;

/// Stack limits written to the bytecode header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerOptions {
    pub max_call_stack: u32,
    pub max_local_stack: u32,
    pub max_stack: u32,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            max_call_stack: DEFAULT_MAX_CALL_STACK,
            max_local_stack: DEFAULT_MAX_LOCAL_STACK,
            max_stack: DEFAULT_MAX_STACK,
        }
    }
}

/// State shared by the parser and the code generator for one compilation
#[derive(Debug)]
pub struct CompilerContext {
    pub symbols: SymbolTable,
    pub code: CodeGenerator,
    options: CompilerOptions,
    image_buffers: u32,
    /// `(index, line)` of every `set_image`/`copy_image` operand
    image_refs: Vec<(u32, usize)>,
}

impl Default for CompilerContext {
    fn default() -> Self {
        Self::with_options(CompilerOptions::default())
    }
}

impl CompilerContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CompilerOptions) -> Self {
        Self {
            symbols: SymbolTable::new(),
            code: CodeGenerator::new(),
            options,
            image_buffers: DEFAULT_IMAGE_BUFFERS,
            image_refs: Vec::new(),
        }
    }

    pub fn new_label(&mut self) -> Label {
        self.code.new_label()
    }

    pub fn add_variable(&mut self, name: &str, value_type: ValueType, is_global: bool) -> Variable {
        self.symbols.add_variable(name, value_type, is_global)
    }

    pub fn image_buffers(&self) -> u32 {
        self.image_buffers
    }

    pub fn set_image_buffers(&mut self, count: u32) {
        self.image_buffers = count;
    }

    pub fn reference_image(&mut self, index: u32, line: usize) {
        self.image_refs.push((index, line));
    }

    /// Every referenced buffer must exist under the final buffer count
    pub fn check_image_references(&self) -> Result<(), ParseError> {
        for &(index, line) in &self.image_refs {
            if index >= self.image_buffers {
                return Err(ParseError::ImageBufferOutOfRange {
                    index,
                    count: self.image_buffers,
                    line,
                });
            }
        }
        Ok(())
    }

    /// Target label and clear count for `break level` or `continue level`
    pub fn loop_jump(
        &self,
        level: usize,
        is_continue: bool,
        line: usize,
    ) -> Result<(Label, u32), ParseError> {
        let keyword = if is_continue { "continue" } else { "break" };
        let cycle = self
            .symbols
            .cycle(level)
            .ok_or(ParseError::InvalidTerminator { keyword, level, line })?;
        let target = if is_continue { cycle.begin } else { cycle.end };
        Ok((target, self.symbols.local_top() - cycle.clear_base))
    }

    /// Declared result type and clear count for a `return`
    pub fn return_target(&self, line: usize) -> Result<(Type, u32), ParseError> {
        let frame = self
            .symbols
            .current_frame()
            .ok_or(ParseError::ReturnOutsideFunction { line })?;
        Ok((frame.returns.clone(), self.symbols.local_top() - frame.base))
    }

    pub fn header(&self) -> Header {
        Header {
            image_buffers: self.image_buffers,
            max_call_stack: self.options.max_call_stack,
            max_local_stack: self.options.max_local_stack,
            max_stack: self.options.max_stack,
            global_slots: self.symbols.global_top(),
        }
    }

    /// Patch labels and package the program
    pub fn finish(self) -> Result<BytecodeModule, CodegenError> {
        if self.code.len() >= LABEL_OFFSET as usize {
            return Err(CodegenError::ProgramTooLarge(self.code.len()));
        }
        let header = self.header();
        if header.global_slots > MAX_GLOBAL_SLOTS {
            return Err(CodegenError::TooManyGlobals {
                slots: header.global_slots,
                max: MAX_GLOBAL_SLOTS,
            });
        }
        let instructions = self.code.replace_labels()?;
        debug!(
            "generated {} instruction(s), {} global slot(s)",
            instructions.len(),
            header.global_slots
        );
        Ok(BytecodeModule::with_instructions(header, instructions))
    }
}
