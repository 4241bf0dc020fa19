//! Input files.
//!
//! A message file has one chat message per line. A moderation file has one
//! login per line, optionally followed by `|reason`. Blank lines are ignored
//! in both.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::{ModerationTarget, WorkItem};

/// Longest chat message the server accepts, in characters.
pub const MAX_MESSAGE_CHARS: usize = 500;

/// A message line that was cut down to [`MAX_MESSAGE_CHARS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncation {
    /// 1-based position among the non-blank lines.
    pub line: usize,
    /// Length of the original line in characters.
    pub length: usize,
}

/// Work items parsed from an input file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workload {
    /// Items in file order.
    pub items: Vec<WorkItem>,
    /// Message lines that had to be shortened.
    pub truncated: Vec<Truncation>,
}

impl Workload {
    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if the file had no usable lines.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Parse message lines.
pub fn parse_messages(contents: &str) -> Workload {
    let mut workload = Workload::default();
    for (index, line) in non_blank_lines(contents).enumerate() {
        let length = line.chars().count();
        let message = if length > MAX_MESSAGE_CHARS {
            workload.truncated.push(Truncation {
                line: index + 1,
                length,
            });
            line.chars().take(MAX_MESSAGE_CHARS).collect()
        } else {
            line.to_string()
        };
        workload.items.push(WorkItem::Message(message));
    }
    workload
}

/// Parse moderation lines of the form `login` or `login|reason`.
///
/// Only the first `|`-separated field after the login is the reason; further
/// fields are ignored.
pub fn parse_targets(contents: &str) -> Workload {
    let items = non_blank_lines(contents)
        .map(|line| {
            let mut parts = line.split('|');
            let login = parts.next().unwrap_or_default();
            let reason = parts.next().unwrap_or_default();
            WorkItem::Target(ModerationTarget::new(login, reason))
        })
        .collect();
    Workload {
        items,
        truncated: Vec::new(),
    }
}

/// Read and parse a message file.
pub fn load_messages(path: impl AsRef<Path>) -> Result<Workload> {
    read(path.as_ref()).map(|contents| parse_messages(&contents))
}

/// Read and parse a moderation file.
pub fn load_targets(path: impl AsRef<Path>) -> Result<Workload> {
    read(path.as_ref()).map(|contents| parse_targets(&contents))
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::io(format!("could not read {}: {e}", path.display()), e))
}

fn non_blank_lines(contents: &str) -> impl Iterator<Item = &str> {
    contents.lines().map(str::trim).filter(|line| !line.is_empty())
}
