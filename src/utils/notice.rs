use ansi_term::Colour;

/// Category of a user-facing status line. Mirrors the popup toasts of the
/// browser surface: outcomes get a colored label, never a stack trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Severity::Success => "ok",
            Severity::Info => "info",
            Severity::Warning => "warn",
            Severity::Error => "error",
        }
    }

    fn colour(self) -> Colour {
        match self {
            Severity::Success => Colour::Green,
            Severity::Info => Colour::Blue,
            Severity::Warning => Colour::Yellow,
            Severity::Error => Colour::Red,
        }
    }
}

/// Prints a transient status line, colored by severity.
pub fn toast(severity: Severity, message: impl AsRef<str>) {
    println!(
        "{} {}",
        severity
            .colour()
            .bold()
            .paint(format!("[{}]", severity.label())),
        message.as_ref()
    );
}
