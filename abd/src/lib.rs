//! A linearizable key-value register replicated over a set of replicas
//!
//! # Introduction
//! Every key behaves like an atomic read/write register, as long as a majority of the replicas is
//! reachable. Reads and writes both consist of two rounds against a majority of the replicas:
//! * a Get-phase, which finds the newest entry currently stored by any replica of the majority
//! * a Set-phase, which stores an entry on a majority of the replicas
//!
//! A write stores its value with a timestamp larger than anything it observed, while a read writes
//! back the entry it observed, so no later read can return an older value.
//!
//! # Structure
//! * [`SharedRegister`] is the client side of the protocol
//! * [`replica::ReplicaService`] answers the requests of a single replica, backed by a
//! [`store::ReplicaStore`]
//! * [`transport::Transport`] connects the two and is implemented for in-process replicas, both
//! with and without going through the wire encoding of `register_wire`
//!
//! Reference:
//! * [Sharing Memory Robustly in Message-Passing Systems](https://dl.acm.org/doi/10.1145/200836.200869)

pub mod config;
pub mod error;
pub mod quorum;
pub mod replica;
pub mod retry;
pub mod store;
pub mod timestamp;
pub mod transport;

pub mod client;
pub use client::SharedRegister;

pub use error::{Phase, RegisterError, TransportError};

#[doc(hidden)]
pub mod testing;
