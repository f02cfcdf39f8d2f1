//! Terminal rendering of configuration failures.
//!
//! A fatal error is shown as a headline, the directory it concerns, a few
//! notes (stage, directories searched) and the override that gets past it.

use std::fmt;
use std::path::PathBuf;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }

    /// Bold red or bold yellow.
    fn ansi(self) -> &'static str {
        match self {
            Severity::Error => "\x1b[1;31m",
            Severity::Warning => "\x1b[1;33m",
        }
    }
}

const HELP_ANSI: &str = "\x1b[1;32m";
const RESET: &str = "\x1b[0m";

/// A headline plus the details needed to act on it.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// Installation directory the message is about
    pub location: Option<PathBuf>,
    pub notes: Vec<String>,
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            message: message.into(),
            location: None,
            notes: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Diagnostic::new(Severity::Warning, message)
    }

    /// Add a note line below the headline.
    pub fn with_context(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Add a suggested fix. Duplicates are dropped.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        let suggestion = suggestion.into();
        if !self.suggestions.contains(&suggestion) {
            self.suggestions.push(suggestion);
        }
        self
    }

    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Render for a terminal, with ANSI colors if `color` is set.
    pub fn format(&self, color: bool) -> String {
        let paint = |ansi: &str, text: &str| {
            if color {
                format!("{}{}{}", ansi, text, RESET)
            } else {
                text.to_string()
            }
        };

        let mut out = format!(
            "{}: {}\n",
            paint(self.severity.ansi(), self.severity.label()),
            self.message
        );
        if let Some(ref dir) = self.location {
            out.push_str(&format!("  --> {}\n", dir.display()));
        }
        for note in &self.notes {
            out.push_str(&format!("  -> {}\n", note));
        }

        let help = paint(HELP_ANSI, "help");
        match self.suggestions.as_slice() {
            [] => {}
            [only] => out.push_str(&format!("{}: {}\n", help, only)),
            many => {
                out.push_str(&format!("{}: try one of:\n", help));
                for (i, s) in many.iter().enumerate() {
                    out.push_str(&format!("  {}. {}\n", i + 1, s));
                }
            }
        }

        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format(false))
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}
