use std::{future::Future, sync::Arc};

use crate::{
    config::RegisterConfig,
    error::{Phase, RegisterError},
    quorum::{majority, wait_for_quorum},
    retry::RetryStrategy,
    store::StoredEntry,
    timestamp::{find_largest, Timestamp},
    transport::{ReplicaHandle, Transport},
};

/// A client of the replicated register
///
/// Every operation is made up of a Get-phase, which collects the newest entry known to a majority
/// of the replicas, followed by a Set-phase, which makes sure a majority of the replicas stores
/// the resulting entry. As any two majorities share at least one replica, a read always observes
/// every write that completed before it started.
///
/// The operations of one client are executed one after another, different clients (with
/// different owner ids) may run concurrently against the same replicas.
///
/// # Example
/// ```rust
/// # use abd::{SharedRegister, testing::LocalCluster};
/// # let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
/// # rt.block_on(async {
/// let cluster = LocalCluster::new(3);
/// let client = cluster.client("A").unwrap();
///
/// client.write("x", "hello").await.unwrap();
/// assert_eq!("hello", client.read("x").await.unwrap());
/// # });
/// ```
#[derive(Debug)]
pub struct SharedRegister<T> {
    owner_id: String,
    replicas: Vec<Arc<ReplicaHandle<T>>>,
    quorum_size: usize,
    config: RegisterConfig,
    ops: tokio::sync::Mutex<()>,
}

impl<T> SharedRegister<T>
where
    T: Transport,
{
    /// Creates a new client using [`RegisterConfig::default`]
    pub fn new<O>(owner_id: O, replicas: Vec<ReplicaHandle<T>>) -> Result<Self, RegisterError>
    where
        O: Into<String>,
    {
        Self::with_config(owner_id, replicas, RegisterConfig::default())
    }

    /// Creates a new client with the given configuration
    ///
    /// The owner id has to be unique among all clients using the same replicas, otherwise two
    /// different writes may end up with the same timestamp.
    pub fn with_config<O>(
        owner_id: O,
        replicas: Vec<ReplicaHandle<T>>,
        config: RegisterConfig,
    ) -> Result<Self, RegisterError>
    where
        O: Into<String>,
    {
        let owner_id = owner_id.into();
        if owner_id.is_empty() {
            return Err(RegisterError::InvalidOwnerId);
        }
        if replicas.is_empty() {
            return Err(RegisterError::NoReplicas);
        }

        let quorum_size = majority(replicas.len());
        let replicas = replicas
            .into_iter()
            .map(|r| Arc::new(r.with_request_timeout(config.request_timeout())))
            .collect();

        Ok(Self {
            owner_id,
            replicas,
            quorum_size,
            config,
            ops: tokio::sync::Mutex::new(()),
        })
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn quorum_size(&self) -> usize {
        self.quorum_size
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.len()
    }

    pub fn config(&self) -> &RegisterConfig {
        &self.config
    }

    /// Stores `value` under `key`
    ///
    /// The write gets a timestamp larger than any timestamp currently held by a majority of the
    /// replicas, so it supersedes every write that completed before it.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip(self, value), fields(owner = %self.owner_id))
    )]
    pub async fn write<V>(&self, key: &str, value: V) -> Result<(), RegisterError>
    where
        V: Into<String>,
    {
        let _op = self.ops.lock().await;

        #[cfg(feature = "tracing")]
        tracing::trace!("Starting Write");

        let latest = self.complete_get_phase(key).await?;
        let timestamp =
            Timestamp::next_after(latest.as_ref().map(|e| &e.timestamp), self.owner_id.as_str());

        #[cfg(feature = "tracing")]
        tracing::trace!(%timestamp, "Issued timestamp");

        self.complete_set_phase(key, StoredEntry::new(value, timestamp))
            .await?;

        #[cfg(feature = "tracing")]
        tracing::trace!("Finished Write");

        Ok(())
    }

    /// Loads the current value of `key`
    ///
    /// Before returning, the value is written back to a majority of the replicas, so no later read
    /// can return an older value.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip(self), fields(owner = %self.owner_id))
    )]
    pub async fn read(&self, key: &str) -> Result<String, RegisterError> {
        let _op = self.ops.lock().await;

        #[cfg(feature = "tracing")]
        tracing::trace!("Starting Read");

        let entry = self
            .complete_get_phase(key)
            .await?
            .ok_or_else(|| RegisterError::KeyNotFound {
                key: key.to_string(),
            })?;

        #[cfg(feature = "tracing")]
        tracing::trace!(timestamp = %entry.timestamp, "Writing back");

        let value = entry.value.clone();
        self.complete_set_phase(key, entry).await?;

        #[cfg(feature = "tracing")]
        tracing::trace!("Finished Read");

        Ok(value)
    }

    /// Builds on [`SharedRegister::read`] and retries after a phase timed out
    ///
    /// [`RegisterError::KeyNotFound`] is returned right away.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, retry)))]
    pub async fn read_with_retry(
        &self,
        key: &str,
        retry: impl Into<RetryStrategy<'_>>,
    ) -> Result<String, RegisterError> {
        retrying(retry.into(), || self.read(key)).await
    }

    /// Builds on [`SharedRegister::write`] and retries after a phase timed out
    ///
    /// # Note
    /// A write that timed out may still have reached some replicas, so a retried write can be
    /// applied more than once, each time with a new timestamp.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, value, retry)))]
    pub async fn write_with_retry<V>(
        &self,
        key: &str,
        value: V,
        retry: impl Into<RetryStrategy<'_>>,
    ) -> Result<(), RegisterError>
    where
        V: Into<String>,
    {
        let value: String = value.into();
        retrying(retry.into(), || self.write(key, value.clone())).await
    }

    /// Asks every replica for its entry and returns the newest one reported by a quorum
    async fn complete_get_phase(&self, key: &str) -> Result<Option<StoredEntry>, RegisterError> {
        let best: Arc<tokio::sync::Mutex<Option<StoredEntry>>> = Default::default();

        let jobs: Vec<_> = self
            .replicas
            .iter()
            .map(|replica| {
                let replica = replica.clone();
                let best = best.clone();
                let key = key.to_string();

                async move {
                    match replica.get_phase(&key).await {
                        Ok(Some(entry)) => {
                            let mut best = best.lock().await;
                            let current = best.as_ref().map(|e| &e.timestamp);
                            if find_largest([current, Some(&entry.timestamp)]) != current {
                                *best = Some(entry);
                            }
                            true
                        }
                        Ok(None) => true,
                        Err(_e) => {
                            #[cfg(feature = "tracing")]
                            tracing::debug!(replica = replica.name(), "Get failed: {}", _e);

                            false
                        }
                    }
                }
            })
            .collect();

        let outcome = wait_for_quorum(self.quorum_size, self.config.phase_timeout(), jobs).await;
        if outcome.timed_out() {
            #[cfg(feature = "tracing")]
            tracing::warn!(quorum = self.quorum_size, "Get-phase did not reach a quorum");

            return Err(RegisterError::PhaseTimeout {
                phase: Phase::Get,
                key: key.to_string(),
            });
        }

        let result = best.lock().await.clone();
        Ok(result)
    }

    /// Sends the entry to every replica and waits until a quorum acknowledged it
    async fn complete_set_phase(&self, key: &str, entry: StoredEntry) -> Result<(), RegisterError> {
        let entry = Arc::new(entry);

        let jobs: Vec<_> = self
            .replicas
            .iter()
            .map(|replica| {
                let replica = replica.clone();
                let entry = entry.clone();
                let key = key.to_string();

                async move {
                    match replica.set_phase(&key, &entry).await {
                        Ok(()) => true,
                        Err(_e) => {
                            #[cfg(feature = "tracing")]
                            tracing::debug!(replica = replica.name(), "Set failed: {}", _e);

                            false
                        }
                    }
                }
            })
            .collect();

        let outcome = wait_for_quorum(self.quorum_size, self.config.phase_timeout(), jobs).await;
        if outcome.timed_out() {
            #[cfg(feature = "tracing")]
            tracing::warn!(quorum = self.quorum_size, "Set-phase did not reach a quorum");

            return Err(RegisterError::PhaseTimeout {
                phase: Phase::Set,
                key: key.to_string(),
            });
        }

        Ok(())
    }
}

async fn retrying<F, Fut, R>(mut retry: RetryStrategy<'_>, mut op: F) -> Result<R, RegisterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, RegisterError>>,
{
    loop {
        let err = match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() => e,
            Err(e) => return Err(e),
        };

        if !retry.should_retry() {
            return Err(RegisterError::RetriesExhausted {
                last: Box::new(err),
            });
        }

        #[cfg(feature = "tracing")]
        tracing::trace!("Retrying after {}", err);

        retry.wait().await;
    }
}
