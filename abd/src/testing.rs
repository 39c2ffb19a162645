//! Helpers to run the register against replicas in the same process and inject failures
//!
//! These are used by the tests and the demo programs, they are not needed to use the register
//! with a real network.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{
    config::RegisterConfig,
    error::{RegisterError, TransportError},
    replica::ReplicaService,
    store::{ReplicaStore, StoredEntry},
    timestamp::Timestamp,
    transport::{LocalTransport, ReplicaHandle, Transport, WireTransport},
    SharedRegister,
};

/// The failure a [`FaultyTransport`] currently simulates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fault {
    #[default]
    None,
    /// Every Get fails before reaching the replica
    FailGet,
    /// Every Set fails before reaching the replica
    FailSet,
    FailAll,
    /// Requests reach the replica and are applied, but the reply never arrives
    DropResponse,
}

#[derive(Debug)]
struct FaultState {
    fault: Fault,
    latency: Option<Duration>,
    drop_ratio: f64,
    rng: SmallRng,
    forwarded_sets: HashMap<(String, Timestamp), usize>,
}

/// Switches the faults of one or more [`FaultyTransport`]s while they are in use
///
/// Clones share their state, so every client of a [`LocalCluster`] observes the same faults for
/// the same replica.
#[derive(Debug, Clone)]
pub struct FaultControl {
    state: Arc<Mutex<FaultState>>,
}

impl FaultControl {
    /// `seed` drives the random request drops, see [`FaultControl::set_drop_ratio`]
    pub fn new(seed: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(FaultState {
                fault: Fault::None,
                latency: None,
                drop_ratio: 0.0,
                rng: SmallRng::seed_from_u64(seed),
                forwarded_sets: HashMap::new(),
            })),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FaultState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_fault(&self, fault: Fault) {
        self.state().fault = fault;
    }

    pub fn fault(&self) -> Fault {
        self.state().fault
    }

    /// Delays every request by `latency` before it is forwarded
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state().latency = latency;
    }

    /// Fails the given fraction of requests at random, clamped to `0.0..=1.0`
    pub fn set_drop_ratio(&self, ratio: f64) {
        self.state().drop_ratio = ratio.clamp(0.0, 1.0);
    }

    /// The number of Sets for `key` carrying `timestamp` that were passed on to the replica
    pub fn sets_with(&self, key: &str, timestamp: &Timestamp) -> usize {
        self.state()
            .forwarded_sets
            .get(&(key.to_string(), timestamp.clone()))
            .copied()
            .unwrap_or(0)
    }

    pub fn clear_recorded(&self) {
        self.state().forwarded_sets.clear();
    }

    fn decide(&self) -> (Fault, Option<Duration>, bool) {
        let mut state = self.state();
        let ratio = state.drop_ratio;
        let dropped = ratio > 0.0 && state.rng.gen_bool(ratio);
        (state.fault, state.latency, dropped)
    }

    fn record_set(&self, key: &str, timestamp: &Timestamp) {
        *self
            .state()
            .forwarded_sets
            .entry((key.to_string(), timestamp.clone()))
            .or_insert(0) += 1;
    }
}

/// Wraps another [`Transport`] and fails requests according to its [`FaultControl`]
#[derive(Debug)]
pub struct FaultyTransport<T> {
    inner: T,
    control: FaultControl,
}

impl<T> FaultyTransport<T>
where
    T: Transport,
{
    /// Wraps `inner` without any faults
    pub fn new(inner: T) -> Self {
        Self::with_faults(inner, FaultControl::new(0))
    }

    pub fn with_faults(inner: T, control: FaultControl) -> Self {
        Self { inner, control }
    }

    pub fn control(&self) -> &FaultControl {
        &self.control
    }

    async fn before_request(&self, failing: Fault) -> Result<Fault, TransportError> {
        let (fault, latency, dropped) = self.control.decide();

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if fault == failing || fault == Fault::FailAll {
            return Err(TransportError::Unreachable(format!("injected {:?}", fault)));
        }
        if dropped {
            return Err(TransportError::Unreachable("request dropped".to_string()));
        }

        Ok(fault)
    }
}

impl<T> Transport for FaultyTransport<T>
where
    T: Transport,
{
    async fn get_phase(&self, key: &str) -> Result<Option<StoredEntry>, TransportError> {
        let fault = self.before_request(Fault::FailGet).await?;

        let result = self.inner.get_phase(key).await;
        if fault == Fault::DropResponse {
            return std::future::pending().await;
        }
        result
    }

    async fn set_phase(&self, key: &str, entry: &StoredEntry) -> Result<(), TransportError> {
        let fault = self.before_request(Fault::FailSet).await?;

        self.control.record_set(key, &entry.timestamp);
        let result = self.inner.set_phase(key, entry).await;
        if fault == Fault::DropResponse {
            return std::future::pending().await;
        }
        result
    }
}

/// A set of replicas living in the current process
///
/// Every replica has its own store and its own [`FaultControl`], which is shared by all the
/// clients created from the cluster.
#[derive(Debug)]
pub struct LocalCluster {
    services: Vec<Arc<ReplicaService>>,
    faults: Vec<FaultControl>,
}

impl LocalCluster {
    /// Creates `replicas` empty replicas named `r0`, `r1`, ...
    pub fn new(replicas: usize) -> Self {
        let services = (0..replicas)
            .map(|i| {
                Arc::new(ReplicaService::new(
                    format!("r{}", i),
                    Arc::new(ReplicaStore::new()),
                ))
            })
            .collect();
        let faults = (0..replicas as u64).map(FaultControl::new).collect();

        Self { services, faults }
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// # Panics
    /// If there is no replica with the given index
    pub fn service(&self, replica: usize) -> &Arc<ReplicaService> {
        &self.services[replica]
    }

    /// # Panics
    /// If there is no replica with the given index
    pub fn store(&self, replica: usize) -> &Arc<ReplicaStore> {
        self.services[replica].store()
    }

    /// # Panics
    /// If there is no replica with the given index
    pub fn faults(&self, replica: usize) -> &FaultControl {
        &self.faults[replica]
    }

    /// Handles that call the replicas directly
    pub fn handles(&self) -> Vec<ReplicaHandle<FaultyTransport<LocalTransport>>> {
        self.services
            .iter()
            .zip(self.faults.iter())
            .map(|(service, faults)| {
                ReplicaHandle::new(
                    service.name(),
                    FaultyTransport::with_faults(
                        LocalTransport::new(service.clone()),
                        faults.clone(),
                    ),
                )
            })
            .collect()
    }

    /// Handles that send every request through the wire encoding, using `src` as the sender name
    pub fn wire_handles(&self, src: &str) -> Vec<ReplicaHandle<FaultyTransport<WireTransport>>> {
        self.services
            .iter()
            .zip(self.faults.iter())
            .map(|(service, faults)| {
                ReplicaHandle::new(
                    service.name(),
                    FaultyTransport::with_faults(
                        WireTransport::new(src, service.clone()),
                        faults.clone(),
                    ),
                )
            })
            .collect()
    }

    pub fn client(
        &self,
        owner_id: &str,
    ) -> Result<SharedRegister<FaultyTransport<LocalTransport>>, RegisterError> {
        SharedRegister::new(owner_id, self.handles())
    }

    pub fn client_with_config(
        &self,
        owner_id: &str,
        config: RegisterConfig,
    ) -> Result<SharedRegister<FaultyTransport<LocalTransport>>, RegisterError> {
        SharedRegister::with_config(owner_id, self.handles(), config)
    }

    pub fn wire_client(
        &self,
        owner_id: &str,
    ) -> Result<SharedRegister<FaultyTransport<WireTransport>>, RegisterError> {
        SharedRegister::new(owner_id, self.wire_handles(owner_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn faulty(control: FaultControl) -> FaultyTransport<LocalTransport> {
        let service = Arc::new(ReplicaService::new("r0", Arc::new(ReplicaStore::new())));
        FaultyTransport::with_faults(LocalTransport::new(service), control)
    }

    #[tokio::test]
    async fn faults_can_be_switched() {
        let control = FaultControl::new(0);
        let transport = faulty(control.clone());
        let entry = StoredEntry::new("v", Timestamp::new(1, "A"));

        control.set_fault(Fault::FailSet);
        assert!(transport.get_phase("x").await.is_ok());
        assert!(transport.set_phase("x", &entry).await.is_err());
        assert_eq!(0, control.sets_with("x", &entry.timestamp));

        control.set_fault(Fault::FailGet);
        assert!(transport.get_phase("x").await.is_err());
        assert!(transport.set_phase("x", &entry).await.is_ok());
        assert_eq!(1, control.sets_with("x", &entry.timestamp));

        control.set_fault(Fault::FailAll);
        assert!(transport.get_phase("x").await.is_err());
        assert!(transport.set_phase("x", &entry).await.is_err());

        control.set_fault(Fault::None);
        assert_eq!(Some(entry), transport.get_phase("x").await.unwrap());
    }

    #[tokio::test]
    async fn dropped_response_is_still_applied() {
        let control = FaultControl::new(0);
        control.set_fault(Fault::DropResponse);

        let service = Arc::new(ReplicaService::new("r0", Arc::new(ReplicaStore::new())));
        let handle = ReplicaHandle::new(
            "r0",
            FaultyTransport::with_faults(LocalTransport::new(service.clone()), control.clone()),
        )
        .with_request_timeout(Duration::from_millis(20));

        let entry = StoredEntry::new("v", Timestamp::new(1, "A"));
        let err = handle.set_phase("x", &entry).await.unwrap_err();

        assert!(matches!(err, TransportError::Timeout(_)));
        assert_eq!(Some(entry), service.store().get("x"));
    }

    #[tokio::test]
    async fn drop_ratio_is_reproducible() {
        async fn failures(seed: u64) -> Vec<bool> {
            let control = FaultControl::new(seed);
            control.set_drop_ratio(0.5);
            let transport = faulty(control);

            let mut result = Vec::new();
            for _ in 0..64 {
                result.push(transport.get_phase("x").await.is_err());
            }
            result
        }

        let first = failures(7).await;
        assert_eq!(first, failures(7).await);
        assert!(first.iter().any(|f| *f));
        assert!(first.iter().any(|f| !*f));
    }

    #[test]
    fn cluster_layout() {
        let cluster = LocalCluster::new(5);

        assert_eq!(5, cluster.len());
        assert_eq!("r3", cluster.service(3).name());

        let handles = cluster.handles();
        assert_eq!(
            vec!["r0", "r1", "r2", "r3", "r4"],
            handles.iter().map(|h| h.name()).collect::<Vec<_>>()
        );

        cluster.faults(1).set_fault(Fault::FailAll);
        assert_eq!(Fault::FailAll, handles[1].transport().control().fault());
        assert_eq!(Fault::None, handles[0].transport().control().fault());
    }
}
