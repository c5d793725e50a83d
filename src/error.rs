//! Grepable error codes shared by every error enum in the crate.
//!
//! DESIGN
//! ======
//! Each module owns its own `thiserror` enum. This trait gives them a
//! common surface so the HTTP layer and logs can report a stable code and
//! a retry hint without matching on concrete types.

/// Stable error identification for transport and logging.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}
