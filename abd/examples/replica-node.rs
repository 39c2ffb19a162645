//! A single replica answering `get_phase`/`set_phase` requests, one JSON document per line on
//! stdin, with the replies written to stdout
//!
//! The node is meant to be driven by an external harness that owns the process and speaks the
//! `register_wire` line format, in the same way maelstrom drives a node. The in-process clients
//! of this crate do not start it; they reach the same request handling through `WireTransport`.
//! Requests the node can not decode still get an `error` reply as long as their envelope is
//! readable.
//!
//! ```text
//! $ cargo run --example replica-node -- r0
//! {"src":"c","dest":"r0","body":{"msg_id":1,"type":"get_phase","key":"x"}}
//! {"src":"r0","dest":"c","body":{"msg_id":0,"in_reply_to":1,"type":"get_phase_ok","value":null}}
//! ```

use std::sync::Arc;

use abd::{replica::ReplicaService, store::ReplicaStore};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), register_wire::WireError> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let name = std::env::args().nth(1).unwrap_or_else(|| "r0".to_string());
    let service = ReplicaService::new(name, Arc::new(ReplicaStore::new()));

    tracing::info!(replica = service.name(), "Serving requests");

    let (mut tx, mut rx) = register_wire::io_recv_send();
    service.serve(&mut rx, &mut tx)?;

    tracing::info!(
        replica = service.name(),
        keys = service.store().len(),
        "Input closed"
    );

    Ok(())
}
