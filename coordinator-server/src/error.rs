//! The error taxonomy from spec section 7, given a concrete type.
//!
//! Every fallible public entry point in this crate returns
//! `Result<T, CoordinatorError>`. The router is the only place that turns an
//! `Err` into a wire frame (or, for [`CoordinatorError::AuthMismatch`],
//! silently drops the message) - see `router.rs::dispatch`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The message's claimed `summonerName` doesn't match the session's
    /// registered one. The router rejects silently with no `error` frame.
    #[error("session claim does not match registered identity")]
    AuthMismatch,

    /// `registerSession` found a live, non-zombie holder for the name.
    #[error("summoner already connected from session {existing_session_id}")]
    DuplicateInstance { existing_session_id: String },

    /// Ownership check failed: the claimed player is not a participant of
    /// the referenced match.
    #[error("player is not a participant of match {match_id}")]
    NotInMatch { match_id: i64 },

    /// This backend's ownership TTL expired mid-operation.
    #[error("ownership of match {match_id} was lost mid-operation")]
    OwnershipLost { match_id: i64 },

    /// A draft action (or other protocol-governed step) violated the state
    /// machine: wrong index, wrong actor, repeated champion, wrong phase.
    #[error("protocol violation: {reason}")]
    ProtocolViolation { reason: String },

    /// An RPC, confirmation, or step timer expired before completion.
    #[error("operation timed out: {context}")]
    Timeout { context: String },

    /// Sending over a gateway socket failed.
    #[error("transport failure: {context}")]
    TransportFailure { context: String },

    /// The KV store or persistent store was unreachable. Session-affecting
    /// callers fail closed; non-critical callers (e.g. LP update) log and
    /// continue - see call sites for which applies.
    #[error("downstream store unavailable: {context}")]
    DownstreamUnavailable { context: String },
}

impl CoordinatorError {
    /// The `error` field of the wire `error { error, message }` frame, per
    /// section 6. `AuthMismatch` never reaches this - the router drops it.
    pub fn wire_kind(&self) -> &'static str {
        match self {
            CoordinatorError::AuthMismatch => "unauthorized",
            CoordinatorError::DuplicateInstance { .. } => "not_acceptable",
            CoordinatorError::NotInMatch { .. } => "not_in_match",
            CoordinatorError::OwnershipLost { .. } => "ownership_lost",
            CoordinatorError::ProtocolViolation { .. } => "rejected",
            CoordinatorError::Timeout { .. } => "timeout",
            CoordinatorError::TransportFailure { .. } => "transport_failure",
            CoordinatorError::DownstreamUnavailable { .. } => "unavailable",
        }
    }
}

impl From<redis::RedisError> for CoordinatorError {
    fn from(err: redis::RedisError) -> Self {
        CoordinatorError::DownstreamUnavailable { context: err.to_string() }
    }
}

impl From<sqlx::Error> for CoordinatorError {
    fn from(err: sqlx::Error) -> Self {
        CoordinatorError::DownstreamUnavailable { context: err.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
