//! Simulation error types.

use thiserror::Error;

/// Result type for simulation operations.
pub type SimResult<T> = Result<T, SimError>;

/// Errors raised at the point of an offending simulation call.
///
/// None of these ever travel inside an envelope: they are local, synchronous
/// failures of the call that produced them.
#[derive(Debug, Error)]
pub enum SimError {
    /// A node or group with this name is already registered.
    #[error("name already registered: {name}")]
    DuplicateName { name: String },

    /// The node is already a member of the group.
    #[error("{member} is already a member of group {group}")]
    DuplicateMember { group: String, member: String },

    /// No node or group is registered under this name.
    #[error("unknown recipient: {name}")]
    UnknownRecipient { name: String },

    /// The payload could not be copied for transit.
    #[error("payload cannot be isolated: {reason}")]
    Isolation { reason: String },

    /// `receive` was called on an asynchronous node.
    #[error("receive() called on asynchronous node {node}")]
    ReceiveOnAsynchronous { node: String },

    /// An asynchronous node received a message without a handler.
    #[error("asynchronous node {node} does not implement on_receive")]
    HandlerNotImplemented { node: String },

    /// The node was cancelled while blocked.
    ///
    /// This is a shutdown signal, not a fault: programs are expected to
    /// return it (or swallow it) and terminate.
    #[error("node {node} cancelled")]
    Cancelled { node: String },

    /// The node's program panicked.
    #[error("node {node} panicked")]
    NodePanicked { node: String },

    /// A node thread could not be started.
    #[error("failed to spawn thread for node {node}: {source}")]
    Spawn {
        node: String,
        source: std::io::Error,
    },

    /// The delivery scheduler has been shut down.
    #[error("delivery scheduler stopped")]
    SchedulerStopped,

    /// Invalid simulation configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SimError {
    /// Creates an `Isolation` error from anything printable.
    pub fn isolation(reason: impl std::fmt::Display) -> Self {
        Self::Isolation {
            reason: reason.to_string(),
        }
    }

    /// Returns true if this is the cooperative cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
