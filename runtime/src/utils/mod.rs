//! Helpers shared by the loader and the VM

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::bytecode::{BytecodeModule, LoadError, Parser, Writer};

/// Write a module to a `.cw2c` file
pub fn write_bytecode<P: AsRef<Path>>(module: &BytecodeModule, path: P) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    Writer::write(module, &mut writer)?;
    writer.flush()
}

/// Read a module from a `.cw2c` file
pub fn read_bytecode<P: AsRef<Path>>(path: P) -> Result<BytecodeModule, LoadError> {
    let file = File::open(path)?;
    Parser::parse(BufReader::new(file))
}

/// Truncate a script coordinate to an integer inside `0..=max`
pub fn clamp_coord(value: f32, max: u32) -> u32 {
    (value as i64).clamp(0, max as i64) as u32
}

/// Truncate a script length to an integer inside `0..=max`, where `max` may be negative
pub fn clamp_len(value: f32, max: i64) -> u32 {
    (value as i64).clamp(0, max.max(0)) as u32
}
