//! Diagnostic system for the Keel compiler front end.
//!
//! Layout analysis reports errors through an accumulating [`Handler`]
//! rather than aborting on the first failure, so that independent
//! declarations in one compilation unit are all diagnosed in a single
//! run. Components report and continue where safe, and consult
//! [`Handler::has_errors`] at checkpoints before starting work that
//! would only cascade nonsense from earlier failures.

mod diagnostic;
mod error_code;
mod handler;
mod span;

pub use diagnostic::{Diagnostic, Label, Severity};
pub use error_code::ErrorCode;
pub use handler::Handler;
pub use span::Span;
