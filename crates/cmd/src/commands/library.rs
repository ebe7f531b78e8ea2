use crate::builtins::builtin_engine;
use anyhow::Result;
use oplog::FunctionRegistry;
use std::io::Write;

/// Write the built-in function library as JSON
pub fn library_command<W: Write>(output: &mut W) -> Result<()> {
    let listing = serde_json::to_string_pretty(&builtin_engine().functions())?;
    writeln!(output, "{listing}")?;
    Ok(())
}
