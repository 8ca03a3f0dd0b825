//! Response verification.
//!
//! A call passes only when the service answered with gRPC status OK. Every
//! other result -- a non-OK status or a transport failure from the invoker --
//! fails and is classified into exactly one [`FailureKind`]. Verification
//! never aborts the run; it only produces the outcome that gets recorded.

use std::fmt;

use crate::loadtest::client::{CallStatus, InvocationResult};
use crate::loadtest::error::InvokeError;

/// Why an iteration failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Endpoint unreachable or refused.
    Connection,
    /// No response within the timeout.
    Timeout,
    /// Malformed or undecodable response.
    Protocol,
    /// Well-formed response carrying a non-OK status.
    Verification(tonic::Code),
}

impl FailureKind {
    /// Category used for aggregate counts: `"connection"`, `"timeout"`,
    /// `"protocol"`, or `"verification"`.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Timeout => "timeout",
            Self::Protocol => "protocol",
            Self::Verification(_) => "verification",
        }
    }
}

impl From<&InvokeError> for FailureKind {
    fn from(err: &InvokeError) -> Self {
        match err {
            InvokeError::Connection { .. } => Self::Connection,
            InvokeError::Timeout => Self::Timeout,
            InvokeError::Protocol { .. } => Self::Protocol,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Verification(code) => write!(f, "verification ({code:?})"),
            other => f.write_str(other.category()),
        }
    }
}

/// Verdict for one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Status OK.
    Pass,
    /// Anything else.
    Fail(FailureKind),
}

impl Outcome {
    /// `true` for [`Outcome::Pass`].
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Judge the result of one invocation.
pub fn verify(result: &Result<InvocationResult, InvokeError>) -> Outcome {
    match result {
        Ok(InvocationResult {
            status: CallStatus::Ok,
            ..
        }) => Outcome::Pass,
        Ok(InvocationResult {
            status: CallStatus::Rejected(code),
            ..
        }) => Outcome::Fail(FailureKind::Verification(*code)),
        Err(err) => Outcome::Fail(FailureKind::from(err)),
    }
}
