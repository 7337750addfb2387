//! Concurrent owner lookups for a page of wallets.
//!
//! Fan-out: one task per distinct owner id, bounded by a semaphore.
//! Fan-in: the collecting loop is the only writer of the id -> profile map.
//! The first failure aborts every remaining lookup and the whole request
//! fails; partial results never escape.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use walletd_core::{OwnerId, WalletError, WalletResult};
use walletd_wallet::{EnrichedWallet, OwnerProfile, Wallet};

use crate::owner_directory::{OwnerDirectory, OwnerDirectoryError};

/// How long to wait for aborted lookups to wind down before detaching them.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

type LookupOutcome = (OwnerId, Result<OwnerProfile, OwnerDirectoryError>);

#[derive(Debug)]
pub struct EnrichmentPipeline<D> {
    directory: Arc<D>,
    max_concurrency: usize,
}

impl<D> Clone for EnrichmentPipeline<D> {
    fn clone(&self) -> Self {
        Self {
            directory: Arc::clone(&self.directory),
            max_concurrency: self.max_concurrency,
        }
    }
}

impl<D> EnrichmentPipeline<D>
where
    D: OwnerDirectory + 'static,
{
    /// `max_concurrency` is clamped to `1..=Semaphore::MAX_PERMITS`.
    pub fn new(directory: Arc<D>, max_concurrency: usize) -> Self {
        Self {
            directory,
            max_concurrency: max_concurrency.clamp(1, Semaphore::MAX_PERMITS),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Attach owner profiles to `wallets`, preserving their order.
    ///
    /// Dropping the returned future (e.g. on a deadline) aborts all lookups.
    #[instrument(skip(self, wallets), fields(wallets = wallets.len()))]
    pub async fn enrich(&self, wallets: Vec<Wallet>) -> WalletResult<Vec<EnrichedWallet>> {
        let distinct: Vec<OwnerId> = {
            let mut seen = HashSet::new();
            wallets
                .iter()
                .filter(|w| seen.insert(&w.owner_id))
                .map(|w| w.owner_id.clone())
                .collect()
        };

        if distinct.is_empty() {
            return Ok(Vec::new());
        }
        debug!(owners = distinct.len(), "looking up owners");

        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut lookups: JoinSet<LookupOutcome> = JoinSet::new();

        for owner_id in distinct {
            let directory = Arc::clone(&self.directory);
            let permits = Arc::clone(&permits);
            lookups.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => directory.get_owner(&owner_id).await,
                    Err(_) => Err(OwnerDirectoryError::Unavailable(
                        "lookup permits closed".to_string(),
                    )),
                };
                (owner_id, result)
            });
        }

        let mut profiles: HashMap<OwnerId, OwnerProfile> = HashMap::new();
        while let Some(joined) = lookups.join_next().await {
            let failure = match joined {
                Ok((owner_id, Ok(profile))) => {
                    profiles.insert(owner_id, profile);
                    continue;
                }
                Ok((owner_id, Err(e))) => {
                    warn!(%owner_id, error = %e, "owner lookup failed");
                    WalletError::from(e)
                }
                Err(e) => WalletError::internal(format!("owner lookup task failed: {e}")),
            };

            permits.close();
            cancel(lookups).await;
            return Err(failure);
        }

        wallets
            .into_iter()
            .map(|wallet| {
                let owner = profiles.get(&wallet.owner_id).cloned().ok_or_else(|| {
                    WalletError::internal(format!("owner {} missing after lookup", wallet.owner_id))
                })?;
                Ok(EnrichedWallet::new(wallet, owner))
            })
            .collect()
    }
}

/// Abort outstanding lookups and wait (bounded) for them to stop.
async fn cancel(mut lookups: JoinSet<LookupOutcome>) {
    let outstanding = lookups.len();
    lookups.abort_all();

    let drained = tokio::time::timeout(DRAIN_GRACE, async {
        let mut cancelled = 0usize;
        while let Some(joined) = lookups.join_next().await {
            if matches!(joined, Err(ref e) if e.is_cancelled()) {
                cancelled += 1;
            }
        }
        cancelled
    })
    .await;

    match drained {
        Ok(cancelled) => warn!(outstanding, cancelled, "cancelled remaining owner lookups"),
        // The JoinSet is dropped here, which aborts anything still running.
        Err(_) => warn!(outstanding, "owner lookups did not stop within the grace period"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;

    use crate::owner_directory::InMemoryOwnerDirectory;

    fn owner(s: &str) -> OwnerId {
        OwnerId::parse(s).unwrap()
    }

    fn profile(s: &str) -> OwnerProfile {
        OwnerProfile {
            id: owner(s),
            name: format!("name of {s}"),
        }
    }

    fn wallets(owners: &[&str]) -> Vec<Wallet> {
        owners.iter().map(|o| Wallet::open(owner(o), Utc::now())).collect()
    }

    /// Counts calls per owner and tracks the peak number of lookups in flight.
    struct CountingDirectory {
        inner: InMemoryOwnerDirectory,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl CountingDirectory {
        fn new(owners: &[&str]) -> Self {
            Self {
                inner: InMemoryOwnerDirectory::with_owners(owners.iter().map(|o| profile(o))),
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl OwnerDirectory for CountingDirectory {
        async fn get_owner(&self, owner_id: &OwnerId) -> Result<OwnerProfile, OwnerDirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.inner.get_owner(owner_id).await
        }

        async fn register_owner(&self, profile: OwnerProfile) -> Result<OwnerProfile, OwnerDirectoryError> {
            self.inner.register_owner(profile).await
        }
    }

    /// Bumps `cancelled` when dropped while still armed.
    struct CancelWatch<'a> {
        cancelled: &'a AtomicUsize,
        armed: bool,
    }

    impl Drop for CancelWatch<'_> {
        fn drop(&mut self) {
            if self.armed {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    /// Every owner except `failing` hangs; `failing` errors once all others have started.
    struct HangingDirectory {
        failing: OwnerId,
        others: usize,
        started: AtomicUsize,
        cancelled: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl OwnerDirectory for HangingDirectory {
        async fn get_owner(&self, owner_id: &OwnerId) -> Result<OwnerProfile, OwnerDirectoryError> {
            if *owner_id == self.failing {
                while self.started.load(Ordering::SeqCst) < self.others {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                return Err(OwnerDirectoryError::Unavailable("directory exploded".to_string()));
            }

            let mut watch = CancelWatch {
                cancelled: &self.cancelled,
                armed: true,
            };
            self.started.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(30)).await;
            watch.armed = false;
            Ok(profile(owner_id.as_str()))
        }

        async fn register_owner(&self, profile: OwnerProfile) -> Result<OwnerProfile, OwnerDirectoryError> {
            Ok(profile)
        }
    }

    #[tokio::test]
    async fn preserves_order_and_dedupes_lookups() {
        let dir = Arc::new(CountingDirectory::new(&["a", "b", "c"]));
        let pipeline = EnrichmentPipeline::new(Arc::clone(&dir), 4);

        let input = wallets(&["c", "a", "c", "b", "a"]);
        let ids: Vec<_> = input.iter().map(|w| w.id).collect();

        let out = pipeline.enrich(input).await.unwrap();
        assert_eq!(out.iter().map(|e| e.id).collect::<Vec<_>>(), ids);
        assert_eq!(
            out.iter().map(|e| e.owned_by.id.as_str()).collect::<Vec<_>>(),
            vec!["c", "a", "c", "b", "a"]
        );
        assert_eq!(out[0].owned_by.name, "name of c");
        assert_eq!(dir.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_is_bounded() {
        let names: Vec<String> = (0..12).map(|i| format!("o{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let dir = Arc::new(CountingDirectory::new(&refs));
        let pipeline = EnrichmentPipeline::new(Arc::clone(&dir), 3);

        let out = pipeline.enrich(wallets(&refs)).await.unwrap();
        assert_eq!(out.len(), 12);
        assert!(dir.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn oversized_concurrency_is_clamped() {
        let dir = Arc::new(CountingDirectory::new(&["a", "b"]));
        let pipeline = EnrichmentPipeline::new(Arc::clone(&dir), usize::MAX);
        assert_eq!(pipeline.max_concurrency(), Semaphore::MAX_PERMITS);

        let out = pipeline.enrich(wallets(&["a", "b"])).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(EnrichmentPipeline::new(dir, 0).max_concurrency(), 1);
    }

    #[tokio::test]
    async fn empty_page_needs_no_lookups() {
        let dir = Arc::new(CountingDirectory::new(&[]));
        let pipeline = EnrichmentPipeline::new(Arc::clone(&dir), 4);
        assert!(pipeline.enrich(Vec::new()).await.unwrap().is_empty());
        assert_eq!(dir.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_owner_fails_the_whole_page() {
        let dir = Arc::new(CountingDirectory::new(&["a"]));
        let pipeline = EnrichmentPipeline::new(dir, 4);

        let err = pipeline.enrich(wallets(&["a", "ghost"])).await.unwrap_err();
        assert!(matches!(err, WalletError::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn first_failure_cancels_in_flight_lookups() {
        let others = 5;
        let dir = Arc::new(HangingDirectory {
            failing: owner("bad"),
            others,
            started: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        });
        let pipeline = EnrichmentPipeline::new(Arc::clone(&dir), others + 1);

        let page = wallets(&["o1", "o2", "bad", "o3", "o4", "o5", "o1"]);
        let result = tokio::time::timeout(Duration::from_secs(5), pipeline.enrich(page))
            .await
            .expect("pipeline must not wait for hung lookups");

        assert!(matches!(result, Err(WalletError::Internal(_))));
        assert_eq!(dir.cancelled.load(Ordering::SeqCst), others);
    }
}
