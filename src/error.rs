//! Structured error handling and exit codes.

use serde::Serialize;

/// Process exit codes.
///
/// - 0: Success (every duplicate handled, or dry run found duplicates)
/// - 1: General error (unexpected failure)
/// - 2: No duplicates found
/// - 3: Partial success (some files could not be scanned, hashed or replaced)
/// - 4: Unsupported platform (no copy-on-write clone primitive)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Completed and every duplicate was handled.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// Completed but nothing was duplicated.
    NoDuplicates = 2,
    /// Completed with non-fatal per-file errors.
    PartialSuccess = 3,
    /// The host cannot create copy-on-write clones.
    UnsupportedPlatform = 4,
    /// Interrupted by user.
    Interrupted = 130,
}

impl ExitCode {
    /// Numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Machine-readable code, e.g. `CD003`.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "CD000",
            Self::GeneralError => "CD001",
            Self::NoDuplicates => "CD002",
            Self::PartialSuccess => "CD003",
            Self::UnsupportedPlatform => "CD004",
            Self::Interrupted => "CD130",
        }
    }

    /// Map a fatal error to the exit code it should produce.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        if err
            .downcast_ref::<crate::platform::CloneUnsupported>()
            .is_some()
        {
            return Self::UnsupportedPlatform;
        }
        if matches!(
            err.downcast_ref::<crate::duplicates::FinderError>(),
            Some(crate::duplicates::FinderError::Interrupted)
        ) {
            return Self::Interrupted;
        }
        Self::GeneralError
    }
}

/// Error report printed as JSON with `--json-errors`.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "CD001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including causes
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Build a report from an error and the exit code it maps to.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
