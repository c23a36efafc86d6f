//! Shared error-code interface.
//!
//! Every remod error enum implements [`ErrorCode`] so that the runtime can
//! log and report failures uniformly, whichever crate raised them.
//!
//! # Code Format
//!
//! - UPPER_SNAKE_CASE
//! - prefixed with the owning layer (`ARGS_`, `COMMAND_`, `ADAPTER_`,
//!   `SANDBOX_`, `RULE_`, `CONFIG_`, `RUN_`)
//! - stable once published
//!
//! # Example
//!
//! ```
//! use remod_types::ErrorCode;
//!
//! enum LaneError {
//!     Busy,
//!     Gone,
//! }
//!
//! impl ErrorCode for LaneError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::Busy => "LANE_BUSY",
//!             Self::Gone => "LANE_GONE",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Busy)
//!     }
//! }
//!
//! assert_eq!(LaneError::Gone.code(), "LANE_GONE");
//! assert!(LaneError::Busy.is_recoverable());
//! ```

/// Machine-readable error classification.
pub trait ErrorCode {
    /// Returns the stable error code.
    fn code(&self) -> &'static str;

    /// Returns whether retrying (or trying the next file) can succeed.
    ///
    /// Per-file failures such as a sandbox timeout are recoverable: the lane
    /// stays usable. Bad input such as an invalid argument record is not.
    fn is_recoverable(&self) -> bool;
}

/// Asserts that an error code is non-empty, prefixed and UPPER_SNAKE_CASE.
///
/// # Panics
///
/// Panics with a descriptive message when any check fails.
///
/// ```
/// use remod_types::{assert_error_code, ErrorCode};
///
/// struct Boom;
/// impl ErrorCode for Boom {
///     fn code(&self) -> &'static str { "RUN_BOOM" }
///     fn is_recoverable(&self) -> bool { false }
/// }
///
/// assert_error_code(&Boom, "RUN_");
/// ```
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();
    assert!(!code.is_empty(), "Error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "Error code '{code}' must start with prefix '{expected_prefix}'"
    );
    assert!(
        is_upper_snake_case(code),
        "Error code '{code}' must be UPPER_SNAKE_CASE"
    );
}

/// Runs [`assert_error_code`] over every sample.
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

fn is_upper_snake_case(s: &str) -> bool {
    !s.is_empty()
        && !s.starts_with('_')
        && !s.ends_with('_')
        && !s.contains("__")
        && s
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
