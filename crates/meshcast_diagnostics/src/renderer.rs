//! Diagnostic rendering backends.

use crate::diagnostic::Diagnostic;
use crate::severity::Severity;

/// Trait for rendering diagnostics into formatted output strings.
pub trait DiagnosticRenderer {
    /// Renders a single diagnostic into a formatted string.
    fn render(&self, diag: &Diagnostic) -> String;
}

/// Renders diagnostics in a rustc-style terminal format.
///
/// Produces output like:
/// ```text
/// warning[F101]: rerouted around dead link
///   --> chip (0, 1)
///    | (0, 2): unreachable over link N
///    = note: detour adds 2 hops
/// ```
pub struct TerminalRenderer {
    /// Whether to use ANSI color codes in output.
    pub color: bool,
}

impl TerminalRenderer {
    /// Creates a new terminal renderer.
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn paint(&self, severity: Severity, text: String) -> String {
        if !self.color {
            return text;
        }
        let code = match severity {
            Severity::Error => "31",
            Severity::Warning => "33",
            Severity::Note => "36",
        };
        format!("\x1b[1;{code}m{text}\x1b[0m")
    }
}

impl DiagnosticRenderer for TerminalRenderer {
    fn render(&self, diag: &Diagnostic) -> String {
        let mut out = String::new();

        let header = format!("{}[{}]", diag.severity, diag.code);
        out.push_str(&self.paint(diag.severity, header));
        out.push_str(&format!(": {}\n", diag.message));

        if let Some(chip) = diag.chip {
            out.push_str(&format!("  --> chip {chip}\n"));
        }
        for label in &diag.labels {
            out.push_str(&format!("   | {}: {}\n", label.chip, label.message));
        }
        for note in &diag.notes {
            out.push_str(&format!("   = note: {note}\n"));
        }
        for help in &diag.help {
            out.push_str(&format!("   = help: {help}\n"));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::{Category, DiagnosticCode};
    use crate::label::Label;
    use meshcast_common::ChipCoord;

    #[test]
    fn render_with_chip_and_label() {
        let diag = Diagnostic::warning(
            DiagnosticCode::new(Category::Fault, 101),
            "rerouted around dead link",
        )
        .at(ChipCoord::new(0, 1))
        .with_label(Label::new(ChipCoord::new(0, 2), "unreachable over link N"));

        let output = TerminalRenderer::new(false).render(&diag);
        assert!(output.contains("warning[F101]: rerouted around dead link"));
        assert!(output.contains("--> chip (0, 1)"));
        assert!(output.contains("| (0, 2): unreachable over link N"));
    }

    #[test]
    fn render_notes_and_help() {
        let diag = Diagnostic::error(DiagnosticCode::new(Category::Error, 302), "dead root")
            .with_note("source placed on a dead chip")
            .with_help("move the source vertex");
        let output = TerminalRenderer::new(false).render(&diag);
        assert!(output.contains("= note: source placed on a dead chip"));
        assert!(output.contains("= help: move the source vertex"));
        assert!(!output.contains("-->"));
    }

    #[test]
    fn color_wraps_header() {
        let diag = Diagnostic::error(DiagnosticCode::new(Category::Error, 1), "x");
        let output = TerminalRenderer::new(true).render(&diag);
        assert!(output.starts_with("\x1b[1;31merror[E001]\x1b[0m"));
    }
}
