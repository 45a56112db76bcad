//! Compiler for CW2 drawing scripts.
//!
//! Source text goes through the [`lexer`], the type-checking [`parser`] and
//! the [`codegen`] back end to become a [`BytecodeModule`] for the `cw2` VM.
//! The [`interpreter`] runs the same typed tree directly.

pub mod analyzer;
pub mod cli;
pub mod codegen;
pub mod interpreter;
pub mod lexer;
pub mod parser;

use std::fs;
use std::path::{Path, PathBuf};

use cw2::bytecode::BytecodeModule;
use cw2::utils::write_bytecode;
use log::debug;

pub use codegen::{CodegenError, CompilerContext, CompilerOptions};
pub use interpreter::{InterpretError, Interpreter};
pub use lexer::{Lexer, LexerError, Token, TokenType};
pub use parser::ast::Statement;
pub use parser::{ParseError, Parser};

pub const SOURCE_EXTENSION: &str = "cw2";
pub const BYTECODE_EXTENSION: &str = "cw2c";

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("Lexer error: {0}")]
    Lexer(#[from] LexerError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Code generation error: {0}")]
    Codegen(#[from] CodegenError),

    #[error("Expected a .cw2 source file, got {}", .0.display())]
    InvalidExtension(PathBuf),

    #[error("Cannot access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, CompileError> {
    Ok(Lexer::new(source).tokenize()?)
}

/// Lex and parse `source`, leaving its symbols and image settings in `ctx`
pub fn parse_source(source: &str, ctx: &mut CompilerContext) -> Result<Vec<Statement>, CompileError> {
    let tokens = tokenize(source)?;
    let statements = Parser::new(tokens, ctx).parse()?;
    Ok(statements)
}

pub fn compile_source(source: &str) -> Result<BytecodeModule, CompileError> {
    compile_source_with(source, CompilerOptions::default())
}

pub fn compile_source_with(source: &str, options: CompilerOptions) -> Result<BytecodeModule, CompileError> {
    let mut ctx = CompilerContext::with_options(options);
    let statements = parse_source(source, &mut ctx)?;
    codegen::generate_program(&statements, &mut ctx);
    Ok(ctx.finish()?)
}

/// `script.cw2` compiles to `script.cw2c` next to it
pub fn bytecode_path(source: &Path) -> PathBuf {
    source.with_extension(BYTECODE_EXTENSION)
}

/// Compile a `.cw2` file and write the bytecode beside it
pub fn compile<P: AsRef<Path>>(path: P) -> Result<PathBuf, CompileError> {
    let path = path.as_ref();
    let output = bytecode_path(path);
    compile_to(path, &output, CompilerOptions::default())?;
    Ok(output)
}

/// Compile a `.cw2` file into `output`
pub fn compile_to(path: &Path, output: &Path, options: CompilerOptions) -> Result<(), CompileError> {
    if path.extension().and_then(|ext| ext.to_str()) != Some(SOURCE_EXTENSION) {
        return Err(CompileError::InvalidExtension(path.to_path_buf()));
    }

    let source = fs::read_to_string(path).map_err(|source| CompileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let module = compile_source_with(&source, options)?;

    write_bytecode(&module, output).map_err(|source| CompileError::Io {
        path: output.to_path_buf(),
        source,
    })?;
    debug!(
        "compiled {} -> {} ({} instruction(s))",
        path.display(),
        output.display(),
        module.instructions.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cw2::utils::read_bytecode;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_compile_writes_bytecode_beside_source() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("square.cw2");
        fs::write(&source, "fill_rect Point(1, 1), Point(4, 4)\nupdate\n").unwrap();

        let output = compile(&source).unwrap();
        assert_eq!(output, dir.path().join("square.cw2c"));

        let loaded = read_bytecode(&output).unwrap();
        let expected = compile_source("fill_rect Point(1, 1), Point(4, 4)\nupdate\n").unwrap();
        assert_eq!(loaded, expected);
    }

    #[test]
    fn test_compile_rejects_other_extensions() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("script.txt");
        fs::write(&source, "update").unwrap();

        assert!(matches!(
            compile(&source),
            Err(CompileError::InvalidExtension(_))
        ));
    }

    #[test]
    fn test_compile_missing_file() {
        let err = compile("/no/such/dir/missing.cw2").unwrap_err();
        assert!(matches!(err, CompileError::Io { .. }));
        assert!(err.to_string().starts_with("Cannot access /no/such/dir/missing.cw2"));
    }

    #[test]
    fn test_errors_are_layered() {
        assert!(matches!(compile_source("let Number n = 1 @ 2"), Err(CompileError::Lexer(_))));
        assert!(matches!(compile_source("let Point p = 3"), Err(CompileError::Parse(_))));
    }

    #[test]
    fn test_rejects_more_globals_than_a_module_may_declare() {
        // Four slots per color
        let declarations = (0..=cw2::bytecode::MAX_GLOBAL_SLOTS / 4)
            .map(|i| format!("global Color c{} = Color(0, 0, 0, 0)\n", i))
            .collect::<String>();
        assert!(matches!(
            compile_source(&declarations),
            Err(CompileError::Codegen(CodegenError::TooManyGlobals { slots: 65540, max: 65536 }))
        ));
    }

    #[test]
    fn test_header_options() {
        let module = compile_source_with(
            "global Point g = Point(1, 2)\nset_image_buffer 4",
            CompilerOptions {
                max_stack: 128,
                ..CompilerOptions::default()
            },
        )
        .unwrap();
        assert_eq!(module.header.max_stack, 128);
        assert_eq!(module.header.global_slots, 2);
        assert_eq!(module.header.image_buffers, 4);
    }
}
