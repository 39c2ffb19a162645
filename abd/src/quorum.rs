//! Waiting for the first `n` successes out of a set of concurrently running jobs
//!
//! Every job is spawned onto the tokio runtime right away, so no job ever waits for another one.
//! The results are delivered through a channel with room for *every* job, which means a job that
//! finishes after the waiter already returned can still hand off its result without blocking and
//! then terminate on its own. Jobs are never aborted; a slow job simply runs until its own deadline
//! and its result is discarded.

use std::{future::Future, time::Duration};

/// The number of replicas needed for a majority of `replicas`
///
/// Any two sets of this size taken from the same replicas share at least one replica.
///
/// ```rust
/// # use abd::quorum::majority;
/// assert_eq!(1, majority(1));
/// assert_eq!(2, majority(3));
/// assert_eq!(3, majority(4));
/// assert_eq!(3, majority(5));
/// ```
pub fn majority(replicas: usize) -> usize {
    replicas / 2 + 1
}

/// How a call to [`wait_for_quorum`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumOutcome {
    /// The required number of jobs reported success
    Reached,
    /// The deadline passed, or every job reported without enough successes
    TimedOut,
}

impl QuorumOutcome {
    pub fn timed_out(&self) -> bool {
        matches!(self, Self::TimedOut)
    }
}

/// Runs all `jobs` concurrently and waits until `quorum_size` of them returned `true` or until
/// `timeout` elapsed, whichever happens first
///
/// Failed jobs (returning `false`) do not count towards the quorum but the waiter keeps collecting
/// results from the remaining jobs. If the quorum can no longer be reached, because every job has
/// already reported, this returns [`QuorumOutcome::TimedOut`] without waiting for the deadline.
///
/// # Note
/// This has to be called from within a tokio runtime, as every job is spawned as its own task.
pub async fn wait_for_quorum<I, F>(quorum_size: usize, timeout: Duration, jobs: I) -> QuorumOutcome
where
    I: IntoIterator<Item = F>,
    F: Future<Output = bool> + Send + 'static,
{
    let jobs: Vec<F> = jobs.into_iter().collect();

    if quorum_size == 0 {
        // Nothing to wait for, but the jobs are still started like with any other quorum
        for job in jobs {
            tokio::spawn(job);
        }
        return QuorumOutcome::Reached;
    }

    let (tx, mut rx) = tokio::sync::mpsc::channel(jobs.len().max(1));
    for job in jobs {
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = job.await;
            // Capacity covers every job, this only fails once the waiter is gone
            let _ = tx.try_send(result);
        });
    }
    drop(tx);

    let collect = async {
        let mut successes = 0;
        while let Some(success) = rx.recv().await {
            if success {
                successes += 1;
                if successes >= quorum_size {
                    return QuorumOutcome::Reached;
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(successes, quorum_size, "All jobs reported without reaching quorum");

        QuorumOutcome::TimedOut
    };

    match tokio::time::timeout(timeout, collect).await {
        Ok(outcome) => outcome,
        Err(_elapsed) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(?timeout, quorum_size, "Timed out waiting for quorum");

            QuorumOutcome::TimedOut
        }
    }
}
