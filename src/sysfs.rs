//! Plain-text access to single-line sysfs attribute files.

use crate::errors::{IoError, IoResult};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Read the first line of an attribute file, without its trailing newline.
pub fn read_line(path: &Path) -> IoResult<String> {
    let content = fs::read_to_string(path).map_err(|source| IoError::OpenFailed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(first_line(&content).to_string())
}

/// Write a value followed by a newline, replacing the file's contents.
pub fn write_value<T: std::fmt::Display>(path: &Path, value: T) -> IoResult<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .map_err(|source| IoError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;

    writeln!(file, "{}", value).map_err(|source| IoError::WriteFailed {
        path: path.to_path_buf(),
        source,
    })
}

fn first_line(content: &str) -> &str {
    let line = content.split('\n').next().unwrap_or("");
    line.strip_suffix('\r').unwrap_or(line)
}
