//! TTL-cached snapshot of the active matching rules.
//!
//! The cache is owned by the engine's construction context and passed by
//! handle — there is no ambient global. A refresh failure falls back to
//! the last good snapshot (soft failure, logged) so reconciliation keeps
//! running through transient store blips; only a cold cache with no
//! snapshot at all hard-fails.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::PgPool;
use tally_core::rules::{sort_for_evaluation, RuleSpec};
use tally_db::repositories::MatchingRuleRepo;
use tokio::sync::RwLock;

use crate::error::{PipelineError, PipelineResult};

/// Default snapshot time-to-live.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

// ---------------------------------------------------------------------------
// Fetcher seam
// ---------------------------------------------------------------------------

/// Source of active rules for the cache.
#[async_trait]
pub trait RuleFetcher: Send + Sync {
    async fn fetch_active(&self) -> PipelineResult<Vec<RuleSpec>>;
}

/// Fetches enabled rules from the durable store.
pub struct DbRuleFetcher {
    pool: PgPool,
}

impl DbRuleFetcher {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RuleFetcher for DbRuleFetcher {
    async fn fetch_active(&self) -> PipelineResult<Vec<RuleSpec>> {
        let rows = MatchingRuleRepo::list_enabled(&self.pool).await?;
        let mut specs = Vec::with_capacity(rows.len());
        for row in rows {
            match row.to_spec() {
                Ok(spec) => specs.push(spec),
                Err(e) => {
                    // A corrupt rule must not halt reconciliation.
                    tracing::warn!(
                        rule_id = row.id,
                        rule_name = %row.rule_name,
                        error = %e,
                        "Skipping rule with invalid configuration",
                    );
                }
            }
        }
        Ok(specs)
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

struct CacheState {
    snapshot: Option<Arc<Vec<RuleSpec>>>,
    fetched_at: Option<Instant>,
}

/// Priority-sorted, TTL-cached view of the enabled rules.
pub struct RuleCache {
    fetcher: Box<dyn RuleFetcher>,
    ttl: Duration,
    state: RwLock<CacheState>,
}

impl RuleCache {
    pub fn new(fetcher: Box<dyn RuleFetcher>, ttl: Duration) -> Self {
        Self {
            fetcher,
            ttl,
            state: RwLock::new(CacheState {
                snapshot: None,
                fetched_at: None,
            }),
        }
    }

    /// Database-backed cache with the default five-minute TTL.
    pub fn for_pool(pool: PgPool) -> Self {
        Self::new(Box::new(DbRuleFetcher::new(pool)), DEFAULT_TTL)
    }

    /// The enabled rules, sorted by priority descending.
    ///
    /// Serves the cached snapshot while it is fresh; otherwise re-fetches.
    /// On a failed re-fetch the last good snapshot is reused with a
    /// warning; with no snapshot ever loaded this fails with
    /// [`PipelineError::RuleStoreUnavailable`].
    pub async fn get_active(&self) -> PipelineResult<Arc<Vec<RuleSpec>>> {
        {
            let state = self.state.read().await;
            if let Some(snapshot) = self.fresh_snapshot(&state) {
                return Ok(snapshot);
            }
        }

        let mut state = self.state.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(snapshot) = self.fresh_snapshot(&state) {
            return Ok(snapshot);
        }

        match self.fetcher.fetch_active().await {
            Ok(mut rules) => {
                sort_for_evaluation(&mut rules);
                let snapshot = Arc::new(rules);
                state.snapshot = Some(snapshot.clone());
                state.fetched_at = Some(Instant::now());
                Ok(snapshot)
            }
            Err(e) => match &state.snapshot {
                Some(snapshot) => {
                    tracing::warn!(
                        error = %e,
                        "Rule store refresh failed; serving last good snapshot",
                    );
                    Ok(snapshot.clone())
                }
                None => Err(PipelineError::RuleStoreUnavailable),
            },
        }
    }

    /// Force the next [`get_active`](Self::get_active) to re-fetch.
    pub async fn invalidate(&self) {
        let mut state = self.state.write().await;
        state.fetched_at = None;
    }

    fn fresh_snapshot(&self, state: &CacheState) -> Option<Arc<Vec<RuleSpec>>> {
        let snapshot = state.snapshot.as_ref()?;
        let fetched_at = state.fetched_at?;
        if fetched_at.elapsed() < self.ttl {
            Some(snapshot.clone())
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tally_core::rules::RuleKind;

    /// Scripted fetcher: counts fetches and can be switched to fail.
    struct StubFetcher {
        fetches: AtomicUsize,
        failing: AtomicBool,
        rules: Vec<RuleSpec>,
    }

    impl StubFetcher {
        fn new(rules: Vec<RuleSpec>) -> Arc<Self> {
            Arc::new(Self {
                fetches: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
                rules,
            })
        }
    }

    #[async_trait]
    impl RuleFetcher for Arc<StubFetcher> {
        async fn fetch_active(&self) -> PipelineResult<Vec<RuleSpec>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                Err(PipelineError::Database(sqlx::Error::PoolClosed))
            } else {
                Ok(self.rules.clone())
            }
        }
    }

    fn rule(id: i64, priority: i32) -> RuleSpec {
        RuleSpec {
            id,
            name: format!("rule-{id}"),
            priority,
            kind: RuleKind::Reference,
        }
    }

    fn cache_with(fetcher: Arc<StubFetcher>, ttl: Duration) -> RuleCache {
        RuleCache::new(Box::new(fetcher), ttl)
    }

    #[tokio::test]
    async fn serves_sorted_snapshot() {
        let fetcher = StubFetcher::new(vec![rule(1, 10), rule(2, 100), rule(3, 100)]);
        let cache = cache_with(fetcher, DEFAULT_TTL);

        let rules = cache.get_active().await.unwrap();
        let order: Vec<i64> = rules.iter().map(|r| r.id).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn second_call_within_ttl_uses_cache() {
        let fetcher = StubFetcher::new(vec![rule(1, 10)]);
        let cache = cache_with(fetcher.clone(), DEFAULT_TTL);

        cache.get_active().await.unwrap();
        cache.get_active().await.unwrap();
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch_within_ttl() {
        let fetcher = StubFetcher::new(vec![rule(1, 10)]);
        let cache = cache_with(fetcher.clone(), DEFAULT_TTL);

        cache.get_active().await.unwrap();
        cache.invalidate().await;
        cache.get_active().await.unwrap();
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_ttl_refetches() {
        let fetcher = StubFetcher::new(vec![rule(1, 10)]);
        let cache = cache_with(fetcher.clone(), Duration::ZERO);

        cache.get_active().await.unwrap();
        cache.get_active().await.unwrap();
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_refresh_serves_stale_snapshot() {
        let fetcher = StubFetcher::new(vec![rule(1, 10)]);
        let cache = cache_with(fetcher.clone(), Duration::ZERO);

        cache.get_active().await.unwrap();
        fetcher.failing.store(true, Ordering::SeqCst);

        let rules = cache.get_active().await.unwrap();
        assert_eq!(rules.len(), 1);
    }

    #[tokio::test]
    async fn cold_cache_with_failing_store_hard_fails() {
        let fetcher = StubFetcher::new(vec![rule(1, 10)]);
        fetcher.failing.store(true, Ordering::SeqCst);
        let cache = cache_with(fetcher, DEFAULT_TTL);

        let result = cache.get_active().await;
        assert!(matches!(result, Err(PipelineError::RuleStoreUnavailable)));
    }
}
