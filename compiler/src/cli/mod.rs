//! `cw2c` command line

pub mod logger;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cw2::bytecode::BytecodeModule;
use cw2::runtime::RuntimeConfig;
use cw2::utils::read_bytecode;
use cw2::{RecordingCanvas, Runtime};
use log::{info, LevelFilter};

use crate::{bytecode_path, compile_source, compile_to, parse_source, tokenize, CompilerContext, CompilerOptions};

#[derive(Parser, Debug)]
#[command(name = "cw2c", version, about = "Compiler and headless runner for CW2 drawing scripts")]
pub struct Cli {
    /// More log output; repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Debug logging and runtime debug mode
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a .cw2 script to bytecode
    Compile {
        file: PathBuf,
        /// Output path, `<file>c` by default
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = cw2::bytecode::DEFAULT_MAX_CALL_STACK)]
        max_call_stack: u32,
        #[arg(long, default_value_t = cw2::bytecode::DEFAULT_MAX_LOCAL_STACK)]
        max_local_stack: u32,
        #[arg(long, default_value_t = cw2::bytecode::DEFAULT_MAX_STACK)]
        max_stack: u32,
    },
    /// Run a script or bytecode file on a recording canvas and print its calls
    Run {
        file: PathBuf,
        /// Log every executed instruction
        #[arg(long)]
        trace: bool,
        #[arg(long, default_value_t = 640)]
        width: u32,
        #[arg(long, default_value_t = 480)]
        height: u32,
        /// Skip the load-time bytecode check
        #[arg(long)]
        no_verify: bool,
    },
    /// Print the token stream as JSON
    Tokens { file: PathBuf },
    /// Print the typed syntax tree as JSON
    Ast { file: PathBuf },
    /// Print a bytecode listing
    Disasm { file: PathBuf },
}

pub struct CliHandler;

impl Default for CliHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl CliHandler {
    pub fn new() -> Self {
        Self
    }

    pub async fn handle(&self, cli: Cli) -> Result<()> {
        let mut level = logger::level_for(cli.verbose, cli.debug);
        if let Commands::Run { trace: true, .. } = cli.command {
            level = LevelFilter::Trace;
        }
        logger::init(level);

        match cli.command {
            Commands::Compile {
                file,
                output,
                max_call_stack,
                max_local_stack,
                max_stack,
            } => {
                let output = output.unwrap_or_else(|| bytecode_path(&file));
                let options = CompilerOptions {
                    max_call_stack,
                    max_local_stack,
                    max_stack,
                };
                compile_to(&file, &output, options)
                    .with_context(|| format!("Failed to compile {}", file.display()))?;
                println!("{}", output.display());
            }

            Commands::Run {
                file,
                trace,
                width,
                height,
                no_verify,
            } => {
                let module = load_module(&file)?;
                let config = RuntimeConfig::new()
                    .with_debug_mode(cli.debug)
                    .with_stack_trace(trace)
                    .with_verify_bytecode(!no_verify);
                let mut runtime = Runtime::with_config(RecordingCanvas::new(width, height), config);

                runtime.load_module(module).context("Failed to load program")?;
                runtime.execute().context("Execution failed")?;
                runtime.wait().await.context("Execution failed")?;

                runtime.with_canvas(|canvas| {
                    for call in canvas.drawing_calls() {
                        println!("{}", call);
                    }
                });
            }

            Commands::Tokens { file } => {
                let source = read_source(&file)?;
                let tokens = tokenize(&source)?;
                println!("{}", serde_json::to_string_pretty(&tokens)?);
            }

            Commands::Ast { file } => {
                let source = read_source(&file)?;
                let mut ctx = CompilerContext::new();
                let statements = parse_source(&source, &mut ctx)?;
                println!("{}", serde_json::to_string_pretty(&statements)?);
            }

            Commands::Disasm { file } => {
                let module = load_module(&file)?;
                print!("{}", module.disassemble());
            }
        }

        Ok(())
    }
}

/// One `cw2c:` line for the failure, then one indented line per underlying cause
pub fn report(error: &anyhow::Error) -> String {
    let mut message = format!("cw2c: {}", error);
    for cause in error.chain().skip(1) {
        message.push_str("\n  caused by: ");
        message.push_str(&cause.to_string());
    }
    message
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Compile `.cw2` sources in memory; read anything else as bytecode
fn load_module(path: &Path) -> Result<BytecodeModule> {
    if path.extension().and_then(|ext| ext.to_str()) == Some(crate::SOURCE_EXTENSION) {
        let source = read_source(path)?;
        let module = compile_source(&source)
            .with_context(|| format!("Failed to compile {}", path.display()))?;
        info!("compiled {} in memory", path.display());
        Ok(module)
    } else {
        read_bytecode(path).with_context(|| format!("Failed to read bytecode {}", path.display()))
    }
}
