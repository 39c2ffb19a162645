//! The request handling of a single replica
//!
//! A [`ReplicaService`] owns a handle to its replica's [`ReplicaStore`] and answers the two RPCs of
//! the protocol. Requests are validated here, before they reach the store, so malformed requests
//! from a remote peer result in an error response instead of a corrupted store.

use std::{
    io::{Read, Write},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use register_wire::{
    register::{self, Request, Response},
    Message, WireError,
};

use crate::{
    store::{ReplicaStore, SetOutcome, StoredEntry},
    timestamp::Timestamp,
};

/// The reason a request was refused at the RPC boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub code: u64,
    pub text: String,
}

impl Rejection {
    fn invalid_timestamp(text: &str) -> Self {
        Self {
            code: register::INVALID_TIMESTAMP,
            text: text.to_string(),
        }
    }
}

/// Serves the Get- and Set-phase requests for one replica
#[derive(Debug)]
pub struct ReplicaService {
    name: String,
    store: Arc<ReplicaStore>,
    msg_counter: AtomicU64,
}

impl ReplicaService {
    pub fn new<N>(name: N, store: Arc<ReplicaStore>) -> Self
    where
        N: Into<String>,
    {
        Self {
            name: name.into(),
            store,
            msg_counter: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<ReplicaStore> {
        &self.store
    }

    /// Returns the entry currently stored for `key`, absence is not an error
    pub fn get_phase(&self, key: &str) -> Option<StoredEntry> {
        self.store.get(key)
    }

    /// Applies the entry according to the last-writer-wins rule
    ///
    /// A stale entry is still acknowledged, only invalid timestamps are rejected.
    pub fn set_phase(&self, key: &str, entry: StoredEntry) -> Result<SetOutcome, Rejection> {
        if entry.timestamp.is_absent() {
            return Err(Rejection::invalid_timestamp("sequence number 0 is reserved"));
        }
        if entry.timestamp.owner_id().is_empty() {
            return Err(Rejection::invalid_timestamp("timestamp without owner id"));
        }

        let outcome = self.store.set(key, entry.value, entry.timestamp);

        #[cfg(feature = "tracing")]
        tracing::trace!(replica = %self.name, key, ?outcome, "Handled Set");

        Ok(outcome)
    }

    /// Handles a single decoded request
    pub fn handle(&self, request: Request) -> Response {
        match request {
            Request::GetPhase { key } => Response::GetPhaseOk {
                value: self.get_phase(&key).map(register::StoredValue::from),
            },
            Request::SetPhase {
                key,
                value,
                timestamp,
            } => {
                let entry = StoredEntry::new(value, Timestamp::from(timestamp));
                match self.set_phase(&key, entry) {
                    Ok(_) => Response::SetPhaseOk,
                    Err(rejection) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(replica = %self.name, key = %key, ?rejection, "Rejected Set");

                        Response::Error {
                            code: rejection.code,
                            text: rejection.text,
                        }
                    }
                }
            }
        }
    }

    /// Handles a request and builds the reply addressed back to the sender
    pub fn handle_message(&self, msg: Message<Request>) -> Message<Response> {
        let response = self.handle(msg.body().content().clone());
        let id = self.msg_counter.fetch_add(1, Ordering::Relaxed);

        msg.reply(msg.body().reply(id, response))
    }

    /// Decodes a single request line and encodes the reply
    ///
    /// Lines that can not be decoded as a request are answered with a
    /// [`MALFORMED_REQUEST`](register::MALFORMED_REQUEST) error, as long as the envelope itself can
    /// still be read.
    pub fn handle_line(&self, line: &str) -> Result<String, WireError> {
        let reply = match register_wire::decode::<Request>(line) {
            Ok(msg) => self.handle_message(msg),
            Err(e) => {
                let envelope = register_wire::decode::<serde_json::Value>(line).map_err(|_| e)?;
                let id = self.msg_counter.fetch_add(1, Ordering::Relaxed);
                envelope.reply(envelope.body().reply(
                    id,
                    Response::Error {
                        code: register::MALFORMED_REQUEST,
                        text: "unknown or malformed request".to_string(),
                    },
                ))
            }
        };

        register_wire::encode(&reply)
    }

    /// Answers requests from `receiver` until the input is closed
    ///
    /// Every line gets a reply, including requests this replica does not understand. Only lines
    /// without a readable envelope are skipped, as there is nobody to address a reply to.
    pub fn serve<R, W>(
        &self,
        receiver: &mut register_wire::Receiver<R>,
        sender: &mut register_wire::Sender<W>,
    ) -> Result<(), WireError>
    where
        R: Read,
        W: Write,
    {
        loop {
            let line = match receiver.recv_line() {
                Ok(l) => l,
                Err(WireError::Closed) => return Ok(()),
                Err(e) => return Err(e),
            };

            match self.handle_line(&line) {
                Ok(reply) => sender.send_line(&reply)?,
                Err(WireError::Json(_e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(replica = %self.name, "Skipping unreadable message: {}", _e);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl From<register::Timestamp> for Timestamp {
    fn from(value: register::Timestamp) -> Self {
        Timestamp::new(value.sequence, value.owner_id)
    }
}

impl From<Timestamp> for register::Timestamp {
    fn from(value: Timestamp) -> Self {
        register::Timestamp {
            sequence: value.sequence(),
            owner_id: value.owner_id().to_string(),
        }
    }
}

impl From<register::StoredValue> for StoredEntry {
    fn from(value: register::StoredValue) -> Self {
        StoredEntry::new(value.value, value.timestamp.into())
    }
}

impl From<StoredEntry> for register::StoredValue {
    fn from(value: StoredEntry) -> Self {
        register::StoredValue {
            value: value.value,
            timestamp: value.timestamp.into(),
        }
    }
}
