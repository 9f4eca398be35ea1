//! Diagnostic creation, severity management, and rendering for the router.
//!
//! Routing passes report what they did (dead links repaired, nets that
//! could not be routed, conflicting table entries) as structured
//! [`Diagnostic`] values with a coded identifier and an optional chip
//! location. The thread-safe [`DiagnosticSink`] accumulates them while nets
//! are routed in parallel, and [`TerminalRenderer`] formats them for humans.

#![warn(missing_docs)]

pub mod code;
pub mod diagnostic;
pub mod label;
pub mod renderer;
pub mod severity;
pub mod sink;

pub use code::{Category, DiagnosticCode};
pub use diagnostic::Diagnostic;
pub use label::Label;
pub use renderer::{DiagnosticRenderer, TerminalRenderer};
pub use severity::Severity;
pub use sink::DiagnosticSink;
