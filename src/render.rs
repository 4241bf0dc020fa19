//! Operator-facing output.
//!
//! Everything the operator needs to see (progress, per-item outcomes,
//! warnings, the final tally) goes through the [`Renderer`] trait. Diagnostic
//! detail goes to `tracing` instead.

use std::io::{self, Stdout, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// ANSI escape code for dim text (used for progress counters).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for yellow text (used for warnings).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for green text (used for successful actions).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering operator output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
/// - Captured output in tests
pub trait Renderer: Send {
    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Print the outcome of an action that succeeded.
    fn print_success(&mut self, message: &str);

    /// Print a warning; execution continues.
    fn print_warning(&mut self, warning: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print the progress line for item `index` (1-based) of `total`.
    fn print_progress(&mut self, index: usize, total: usize, text: &str);

    /// Called when the batch is interrupted by the operator.
    fn print_interrupted(&mut self) {}

    /// Returns true if the batch should stop.
    fn should_interrupt(&self) -> bool {
        false
    }
}

/// Plain text renderer with optional ANSI styling.
pub struct PlainTextRenderer {
    stdout: Stdout,
    use_color: bool,
    interrupted: Option<Arc<AtomicBool>>,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            interrupted: None,
        }
    }

    /// Attaches an interrupt flag to the renderer.
    pub fn with_interrupt(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = Some(interrupted);
        self
    }

    /// Flushes stdout so progress shows up between delays.
    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn styled(&self, color: &str, text: &str) -> String {
        if self.use_color {
            format!("{color}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn print_info(&mut self, info: &str) {
        println!("{info}");
        self.flush();
    }

    fn print_success(&mut self, message: &str) {
        println!("  {}", self.styled(ANSI_GREEN, message));
        self.flush();
    }

    fn print_warning(&mut self, warning: &str) {
        println!("{}", self.styled(ANSI_YELLOW, &format!("Warning: {warning}")));
        self.flush();
    }

    fn print_error(&mut self, error: &str) {
        eprintln!("{}", self.styled(ANSI_RED, &format!("Error: {error}")));
    }

    fn print_progress(&mut self, index: usize, total: usize, text: &str) {
        let counter = self.styled(ANSI_DIM, &format!("[{index}/{total}]"));
        println!("{counter} {text}");
        self.flush();
    }

    fn print_interrupted(&mut self) {
        println!("\n[interrupted]");
        self.flush();
    }

    fn should_interrupt(&self) -> bool {
        self.interrupted
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renderer_default_has_color() {
        let renderer = PlainTextRenderer::new();
        assert!(renderer.use_color);
        assert_eq!(renderer.styled(ANSI_RED, "x"), "\x1b[31mx\x1b[0m");
    }

    #[test]
    fn renderer_without_color() {
        let renderer = PlainTextRenderer::with_color(false);
        assert!(!renderer.use_color);
        assert_eq!(renderer.styled(ANSI_RED, "x"), "x");
    }

    #[test]
    fn interrupt_flag_is_observed() {
        let flag = Arc::new(AtomicBool::new(false));
        let renderer = PlainTextRenderer::with_color(false).with_interrupt(flag.clone());
        assert!(!renderer.should_interrupt());
        flag.store(true, Ordering::Relaxed);
        assert!(renderer.should_interrupt());
        assert!(!PlainTextRenderer::new().should_interrupt());
    }
}
