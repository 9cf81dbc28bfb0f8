//! The addressed unit of communication between nodes.

use std::fmt::{self, Debug, Display};

use crate::error::SimResult;
use crate::isolate::Isolate;

/// Bound shared by every message type a simulation carries: isolatable for
/// transit, printable for the node log, and movable between threads.
pub trait Payload: Isolate + Debug + Send + 'static {}

impl<T: Isolate + Debug + Send + 'static> Payload for T {}

/// A payload plus its sender and recipient names.
///
/// The recipient is the name the sender addressed: a node name for a
/// point-to-point send, the group name for a broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<M> {
    sender: String,
    recipient: String,
    payload: M,
}

impl<M> Envelope<M> {
    pub(crate) fn new(sender: impl Into<String>, recipient: impl Into<String>, payload: M) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            payload,
        }
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn payload(&self) -> &M {
        &self.payload
    }

    pub fn into_payload(self) -> M {
        self.payload
    }

    /// Splits the envelope into `(sender, recipient, payload)`.
    pub fn into_parts(self) -> (String, String, M) {
        (self.sender, self.recipient, self.payload)
    }
}

impl<M: Isolate> Isolate for Envelope<M> {
    fn isolate(&self) -> SimResult<Self> {
        Ok(Self {
            sender: self.sender.clone(),
            recipient: self.recipient.clone(),
            payload: self.payload.isolate()?,
        })
    }
}

impl<M: Debug> Display for Envelope<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "envelope[from={}, to={}, payload={:?}]",
            self.sender, self.recipient, self.payload
        )
    }
}
