//! The module contains the errors the engine can throw.
//!
//! Every error belongs to one [`ErrorKind`]:
//!
//! - **Validation**: caller-fixable input problems, never retried
//!   ([`LineMissing`], [`HierarchyRefNotFound`], [`PlanningWindowClosed`],
//!   [`YearMismatch`], ...).
//! - **Conflict**: serialization failure or exhausted lock/transaction budget.
//!   Retryable; the caller decides the backoff.
//! - **Upstream**: the external financial system is unavailable or returned an
//!   unexpected shape. Retryable later.
//! - **Invariant**: state changed under our feet mid-transaction (e.g. a budget
//!   line vanished). Fatal for the current operation.
//!
//!  [`LineMissing`]: EngineError::LineMissing
//!  [`HierarchyRefNotFound`]: EngineError::HierarchyRefNotFound
//!  [`PlanningWindowClosed`]: EngineError::PlanningWindowClosed
//!  [`YearMismatch`]: EngineError::YearMismatch
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid id: {0}")]
    InvalidId(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("budget line {line_code} was not imported for year {year}")]
    LineMissing { year: i32, line_code: String },
    #[error("hierarchy reference not found: {0}")]
    HierarchyRefNotFound(String),
    #[error("year {year} is not open for planning on program {program_id}")]
    PlanningWindowClosed { program_id: i64, year: i32 },
    #[error("commitment note {note_id} does not belong to year {year}")]
    YearMismatch { note_id: String, year: i32 },
    #[error("cannot query year {0}: it is in the future")]
    FutureYearRequested(i32),
    #[error("invalid month: {0}")]
    InvalidMonth(u32),
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("conflicting concurrent update: {0}")]
    Conflict(String),
    #[error("upstream unavailable, retry later")]
    UpstreamUnavailable { status: Option<u16>, detail: String },
    #[error("expected a single budget line for the query, got {0}")]
    AmbiguousResult(usize),
    #[error("operation cannot be completed right now: {0}")]
    InvariantViolation(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

/// Coarse classification used by callers to pick a response and retry policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Upstream,
    Invariant,
    Internal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidAmount(_)
            | Self::InvalidId(_)
            | Self::InvalidInput(_)
            | Self::LineMissing { .. }
            | Self::HierarchyRefNotFound(_)
            | Self::PlanningWindowClosed { .. }
            | Self::YearMismatch { .. }
            | Self::FutureYearRequested(_)
            | Self::InvalidMonth(_) => ErrorKind::Validation,
            Self::KeyNotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::UpstreamUnavailable { .. } | Self::AmbiguousResult(_) => ErrorKind::Upstream,
            Self::InvariantViolation(_) => ErrorKind::Invariant,
            Self::Database(_) => ErrorKind::Internal,
        }
    }

    /// Whether repeating the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict(_) | Self::UpstreamUnavailable { .. } | Self::InvariantViolation(_)
        )
    }

    /// HTTP-like status class for the error.
    ///
    /// Invariant violations and ambiguous upstream results are reported as
    /// 400: not the caller's fault, but not a server bug either.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::Invariant => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Upstream => match self {
                Self::AmbiguousResult(_) => 400,
                _ => 503,
            },
            ErrorKind::Internal => 500,
        }
    }

    /// Message safe to show to any caller.
    ///
    /// Upstream bodies and database errors are kept out; log the error itself
    /// for diagnostics.
    pub fn public_message(&self) -> String {
        match self {
            Self::Database(_) => "internal server error".to_string(),
            Self::Conflict(_) => "conflicting concurrent update, retry".to_string(),
            other => other.to_string(),
        }
    }
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::InvalidId(a), Self::InvalidId(b)) => a == b,
            (Self::InvalidInput(a), Self::InvalidInput(b)) => a == b,
            (
                Self::LineMissing {
                    year: y1,
                    line_code: l1,
                },
                Self::LineMissing {
                    year: y2,
                    line_code: l2,
                },
            ) => y1 == y2 && l1 == l2,
            (Self::HierarchyRefNotFound(a), Self::HierarchyRefNotFound(b)) => a == b,
            (
                Self::PlanningWindowClosed {
                    program_id: p1,
                    year: y1,
                },
                Self::PlanningWindowClosed {
                    program_id: p2,
                    year: y2,
                },
            ) => p1 == p2 && y1 == y2,
            (
                Self::YearMismatch {
                    note_id: n1,
                    year: y1,
                },
                Self::YearMismatch {
                    note_id: n2,
                    year: y2,
                },
            ) => n1 == n2 && y1 == y2,
            (Self::FutureYearRequested(a), Self::FutureYearRequested(b)) => a == b,
            (Self::InvalidMonth(a), Self::InvalidMonth(b)) => a == b,
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::Conflict(a), Self::Conflict(b)) => a == b,
            (
                Self::UpstreamUnavailable {
                    status: s1,
                    detail: d1,
                },
                Self::UpstreamUnavailable {
                    status: s2,
                    detail: d2,
                },
            ) => s1 == s2 && d1 == d2,
            (Self::AmbiguousResult(a), Self::AmbiguousResult(b)) => a == b,
            (Self::InvariantViolation(a), Self::InvariantViolation(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

/// Maps a database error to the engine taxonomy.
///
/// Lock contention and serialization failures become [`EngineError::Conflict`]
/// so callers can retry; everything else stays a database error.
pub(crate) fn classify_db_error(err: DbErr) -> EngineError {
    let message = err.to_string().to_ascii_lowercase();
    let contended = [
        "database is locked",
        "database table is locked",
        "sqlite_busy",
        "could not serialize access",
        "deadlock detected",
        "lock wait timeout",
        "40001",
        "40p01",
    ]
    .iter()
    .any(|needle| message.contains(needle));

    if contended {
        tracing::warn!(error = %err, "database contention");
        EngineError::Conflict("database busy or serialization failure".to_string())
    } else {
        EngineError::Database(err)
    }
}
