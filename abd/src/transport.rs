//! How a client reaches its replicas
//!
//! The protocol itself only needs the two RPCs described by [`Transport`], which keeps it agnostic
//! of the actual communication. This module contains the per-replica wrapper used by the client
//! and two in-process transports, one calling the [`ReplicaService`] directly and one going through
//! the full wire encoding.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use register_wire::{
    register::{self, Request, Response},
    Message, MessageBody,
};

use crate::{config::RegisterConfig, error::TransportError, replica::ReplicaService, store::StoredEntry};

/// The RPCs a client sends to a single replica
///
/// Both methods are unary request/response calls. A Get for a key the replica does not know
/// resolves to `Ok(None)`, only a failed RPC is an error.
pub trait Transport: Send + Sync + 'static {
    fn get_phase(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<StoredEntry>, TransportError>> + Send;

    fn set_phase(
        &self,
        key: &str,
        entry: &StoredEntry,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

impl<T> Transport for Arc<T>
where
    T: Transport,
{
    async fn get_phase(&self, key: &str) -> Result<Option<StoredEntry>, TransportError> {
        T::get_phase(self, key).await
    }

    async fn set_phase(&self, key: &str, entry: &StoredEntry) -> Result<(), TransportError> {
        T::set_phase(self, key, entry).await
    }
}

/// A client's view of one replica
///
/// Every call through the handle is bounded by the request timeout, regardless of what the
/// underlying transport does.
#[derive(Debug)]
pub struct ReplicaHandle<T> {
    name: String,
    transport: T,
    request_timeout: Duration,
}

impl<T> ReplicaHandle<T>
where
    T: Transport,
{
    /// Creates a handle with the request timeout of [`RegisterConfig::default`]
    pub fn new<N>(name: N, transport: T) -> Self
    where
        N: Into<String>,
    {
        Self {
            name: name.into(),
            transport,
            request_timeout: RegisterConfig::default().request_timeout(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub async fn get_phase(&self, key: &str) -> Result<Option<StoredEntry>, TransportError> {
        tokio::time::timeout(self.request_timeout, self.transport.get_phase(key))
            .await
            .map_err(|_| TransportError::Timeout(self.request_timeout))?
    }

    pub async fn set_phase(&self, key: &str, entry: &StoredEntry) -> Result<(), TransportError> {
        tokio::time::timeout(self.request_timeout, self.transport.set_phase(key, entry))
            .await
            .map_err(|_| TransportError::Timeout(self.request_timeout))?
    }
}

/// Calls a replica running in the same process directly
#[derive(Debug, Clone)]
pub struct LocalTransport {
    service: Arc<ReplicaService>,
}

impl LocalTransport {
    pub fn new(service: Arc<ReplicaService>) -> Self {
        Self { service }
    }
}

impl Transport for LocalTransport {
    async fn get_phase(&self, key: &str) -> Result<Option<StoredEntry>, TransportError> {
        Ok(self.service.get_phase(key))
    }

    async fn set_phase(&self, key: &str, entry: &StoredEntry) -> Result<(), TransportError> {
        self.service
            .set_phase(key, entry.clone())
            .map(|_| ())
            .map_err(|rejection| TransportError::Rejected {
                code: rejection.code,
                text: rejection.text,
            })
    }
}

/// Talks to a replica in the same process using the encoded wire messages
///
/// Every request is encoded into a line, decoded and answered by the replica, and the encoded
/// reply is decoded again and matched against the request id.
#[derive(Debug)]
pub struct WireTransport {
    src: String,
    service: Arc<ReplicaService>,
    msg_counter: AtomicU64,
}

impl WireTransport {
    pub fn new<S>(src: S, service: Arc<ReplicaService>) -> Self
    where
        S: Into<String>,
    {
        Self {
            src: src.into(),
            service,
            msg_counter: AtomicU64::new(0),
        }
    }

    fn call(&self, request: Request) -> Result<Response, TransportError> {
        let id = self.msg_counter.fetch_add(1, Ordering::Relaxed);
        let msg = Message::new(
            self.src.as_str(),
            self.service.name(),
            MessageBody::new(Some(id), None, request),
        );

        let line = register_wire::encode(&msg)?;
        let reply_line = self.service.handle_line(&line)?;
        let reply: Message<Response> = register_wire::decode(&reply_line)?;

        if reply.body().replied_to() != Some(id) {
            return Err(TransportError::UnexpectedResponse(format!(
                "reply to {:?} while waiting for {}",
                reply.body().replied_to(),
                id
            )));
        }

        match reply.into_body().into_content() {
            Response::Error { code, text } => Err(TransportError::Rejected { code, text }),
            other => Ok(other),
        }
    }
}

impl Transport for WireTransport {
    async fn get_phase(&self, key: &str) -> Result<Option<StoredEntry>, TransportError> {
        match self.call(Request::GetPhase {
            key: key.to_string(),
        })? {
            Response::GetPhaseOk { value } => Ok(value.map(StoredEntry::from)),
            other => Err(TransportError::UnexpectedResponse(format!("{:?}", other))),
        }
    }

    async fn set_phase(&self, key: &str, entry: &StoredEntry) -> Result<(), TransportError> {
        let stored = register::StoredValue::from(entry.clone());
        match self.call(Request::SetPhase {
            key: key.to_string(),
            value: stored.value,
            timestamp: stored.timestamp,
        })? {
            Response::SetPhaseOk => Ok(()),
            other => Err(TransportError::UnexpectedResponse(format!("{:?}", other))),
        }
    }
}
