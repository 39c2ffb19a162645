use std::time::Duration;

/// The two sub-protocols every operation is made of
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Get,
    Set,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => f.write_str("get"),
            Self::Set => f.write_str("set"),
        }
    }
}

/// The Error returned by the operations of a [`SharedRegister`](crate::SharedRegister)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    /// Fewer than a quorum of replicas answered successfully within the phase deadline
    #[error("{phase} phase for key {key:?} did not reach a quorum in time")]
    PhaseTimeout { phase: Phase, key: String },
    /// No replica in the responding quorum had a value for the key
    #[error("key {key:?} does not exist")]
    KeyNotFound { key: String },
    #[error("invalid client id")]
    InvalidOwnerId,
    #[error("no replicas were provided")]
    NoReplicas,
    /// Only returned by the retrying variants of the operations
    #[error("stopped retrying according to retry strategy, last error: {last}")]
    RetriesExhausted { last: Box<RegisterError> },
}

impl RegisterError {
    /// Whether re-invoking the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PhaseTimeout { .. })
    }
}

/// The Error of a single RPC to a single replica
///
/// These never reach the caller of a register operation directly, a failed RPC only counts as a
/// failed job for that replica.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("replica unreachable: {0}")]
    Unreachable(String),
    #[error("replica rejected the request ({code}): {text}")]
    Rejected { code: u64, text: String },
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error(transparent)]
    Codec(#[from] register_wire::WireError),
}
