//! User-friendly diagnostic messages.
//!
//! Every error shown to the user carries its root cause, the context that
//! led to it and, where one exists, a concrete fix.

use std::fmt;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    /// Suggestion when no build file is found.
    pub const NO_BUILDFILE: &str =
        "Create a Comake.toml in the project root or pass `--file <path>`";

    /// Suggestion when a target is not found.
    pub const TARGET_NOT_FOUND: &str = "Run `comake targets` to see available targets";

    /// Suggestion when build fails.
    pub const BUILD_FAILED: &str = "Run `comake build --verbose` for more details";

    /// Suggestion when a cross tool cannot be resolved.
    pub const TOOL_NOT_FOUND: &str =
        "Run `comake toolchain` to see how each tool resolves for the current target";
}

/// An error message with context lines and suggested fixes.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            context: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        let error = if color { "\x1b[1;31merror\x1b[0m" } else { "error" };
        output.push_str(&format!("{}: {}\n", error, self.message));

        for ctx in &self.context {
            output.push_str(&format!("  → {}\n", ctx));
        }

        if !self.suggestions.is_empty() {
            output.push('\n');
            let help_prefix = if color {
                "\x1b[1;32mhelp\x1b[0m"
            } else {
                "help"
            };
            output.push_str(&format!("{}: consider:\n", help_prefix));
            for (i, suggestion) in self.suggestions.iter().enumerate() {
                output.push_str(&format!("  {}. {}\n", i + 1, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

/// Print a diagnostic to stderr.
pub fn emit(diagnostic: &Diagnostic, color: bool) {
    eprint!("{}", diagnostic.format(color));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_formatting() {
        let diag = Diagnostic::error("`linux.sys` failed (exit status 1)")
            .with_context("command: gcc -o linux.sys driver.o")
            .with_suggestion("Check the undefined symbols reported by the linker")
            .with_suggestion(suggestions::BUILD_FAILED);

        let output = diag.format(false);
        assert!(output.contains("error: `linux.sys` failed"));
        assert!(output.contains("command: gcc"));
        assert!(output.contains("help: consider:"));
        assert!(output.contains("1. Check the undefined symbols"));
        assert!(output.contains("2. Run `comake build --verbose`"));
        assert_eq!(output.matches("help").count(), 1);
    }

    #[test]
    fn test_color() {
        let diag = Diagnostic::error("no `gcc` in the toolchain");
        assert!(diag.format(false).starts_with("error: no `gcc`"));
        assert!(diag.format(true).starts_with("\x1b[1;31merror"));
    }
}
