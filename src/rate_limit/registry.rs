//! Registry of token buckets keyed by [`RateLimitKey`].
//!
//! Buckets are created lazily on first use and live as long as the registry. Creation goes
//! through `DashMap`'s entry API, which holds the key's shard exclusively, so two callers racing
//! on an unseen key get the same bucket.

use crate::clock::{Clock, MonotonicClock};
use crate::rate_limit::{Bandwidth, EndpointScope, RateLimitKey, TokenBucket};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Process-wide map from rate-limit key to bucket.
#[derive(Debug)]
pub struct BucketRegistry {
    buckets: DashMap<RateLimitKey, Arc<TokenBucket>>,
    principal_bandwidth: Bandwidth,
    endpoint_bandwidths: HashMap<EndpointScope, Bandwidth>,
    clock: Arc<dyn Clock>,
}

impl Default for BucketRegistry {
    fn default() -> Self {
        Self::new(Bandwidth::HELIX_DEFAULT)
    }
}

impl BucketRegistry {
    /// Registry whose principal buckets use `principal_bandwidth`; endpoint buckets use each
    /// scope's documented limit.
    pub fn new(principal_bandwidth: Bandwidth) -> Self {
        Self {
            buckets: DashMap::new(),
            principal_bandwidth,
            endpoint_bandwidths: HashMap::new(),
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    /// Override the limit used for `scope`'s buckets. Affects buckets created afterwards.
    pub fn with_endpoint_bandwidth(mut self, scope: EndpointScope, bandwidth: Bandwidth) -> Self {
        self.endpoint_bandwidths.insert(scope, bandwidth);
        self
    }

    /// Drive every bucket from `clock`. Affects buckets created afterwards.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Bandwidth a new bucket for `key` would get.
    pub fn bandwidth_for(&self, key: &RateLimitKey) -> Bandwidth {
        match key {
            RateLimitKey::Principal(_) => self.principal_bandwidth,
            RateLimitKey::Endpoint { scope, .. } => self
                .endpoint_bandwidths
                .get(scope)
                .copied()
                .unwrap_or_else(|| scope.default_bandwidth()),
        }
    }

    /// The bucket for `key`, creating it on first use.
    pub fn get_or_create_bucket(&self, key: &RateLimitKey) -> Arc<TokenBucket> {
        if let Some(existing) = self.buckets.get(key) {
            return existing.clone();
        }
        self.buckets
            .entry(key.clone())
            .or_insert_with(|| {
                let bandwidth = self.bandwidth_for(key);
                debug!(
                    target: "helix_gate::registry",
                    key = %key,
                    capacity = bandwidth.capacity(),
                    period = ?bandwidth.period(),
                    "creating rate limit bucket"
                );
                Arc::new(TokenBucket::with_clock(bandwidth, self.clock.clone()))
            })
            .clone()
    }

    /// The bucket shared by every `scope` request targeting `resource`.
    pub fn endpoint_bucket(&self, scope: EndpointScope, resource: &str) -> Arc<TokenBucket> {
        self.get_or_create_bucket(&RateLimitKey::endpoint(scope, resource))
    }

    pub fn contains(&self, key: &RateLimitKey) -> bool {
        self.buckets.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
