//! Utility functions for working with files.

use std::io;
use std::path::Path;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the last `count` lines of the file at `path`.
///
/// Used to surface the tail of the hypervisor log when startup times out.
/// Returns an empty string for an empty file; trailing newlines do not
/// produce phantom empty lines.
pub fn tail_lines(path: impl AsRef<Path>, count: usize) -> io::Result<String> {
    let content = std::fs::read_to_string(path)?;
    let lines: Vec<&str> = content.lines().collect();
    let start = lines.len().saturating_sub(count);
    Ok(lines[start..].join("\n"))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
