//! Terminal output

use console::{style, Term};

/// Writes command results to stdout and status lines to stderr
#[derive(Debug)]
pub struct Output {
    term: Term,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl Output {
    /// Create an output writer
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            use_color,
            quiet,
        }
    }

    /// Command result line; printed even in quiet mode
    pub fn result(&self, line: &str) {
        println!("{line}");
    }

    /// Success status line
    pub fn success(&self, message: &str) {
        self.status("✓", message, |s| style(s).green().bold().to_string());
    }

    /// Warning status line
    pub fn warning(&self, message: &str) {
        self.status("⚠", message, |s| style(s).yellow().bold().to_string());
    }

    /// Informational status line
    pub fn info(&self, message: &str) {
        self.status("ℹ", message, |s| style(s).blue().bold().to_string());
    }

    fn status(&self, icon: &str, message: &str, paint: impl Fn(&str) -> String) {
        if self.quiet {
            return;
        }
        let icon = if self.use_color {
            paint(icon)
        } else {
            icon.to_string()
        };
        let _ = self.term.write_line(&format!("{icon} {message}"));
    }
}
