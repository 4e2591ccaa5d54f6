//! Exit code constants and error kind mapping for upe.
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Operation completed successfully |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments, configuration or request |
//! | 3 | `NEEDED` | Compile needs more slot values |
//! | 4 | `NO_CANDIDATE` | No template matched the goal |
//! | 5 | `INCOMPATIBLE` | Template requires a newer engine |
//! | 6 | `STORAGE` | Manifest persistence failed |
//! | 70 | `COMPUTE_FAILURE` | Generator invocation failed |

use crate::error::{ErrorKind, UpeError};

/// Exit codes matching the documented exit code table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const INTERNAL: ExitCode = ExitCode(1);
    pub const CLI_ARGS: ExitCode = ExitCode(2);
    pub const NEEDED: ExitCode = ExitCode(3);
    pub const NO_CANDIDATE: ExitCode = ExitCode(4);
    pub const INCOMPATIBLE: ExitCode = ExitCode(5);
    pub const STORAGE: ExitCode = ExitCode(6);
    pub const COMPUTE_FAILURE: ExitCode = ExitCode(70);

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }

    /// Map an error classification onto its exit code.
    #[must_use]
    pub const fn from_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Validation => Self::CLI_ARGS,
            ErrorKind::NoCandidate => Self::NO_CANDIDATE,
            ErrorKind::Incompatible => Self::INCOMPATIBLE,
            ErrorKind::Compute => Self::COMPUTE_FAILURE,
            ErrorKind::Storage => Self::STORAGE,
            ErrorKind::Internal => Self::INTERNAL,
        }
    }
}

impl UpeError {
    #[must_use]
    pub const fn to_exit_code(&self) -> ExitCode {
        ExitCode::from_kind(self.kind())
    }
}
