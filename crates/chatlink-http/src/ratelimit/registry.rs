//! Route-to-bucket registry
//!
//! Bucket membership is learned from the `x-ratelimit-bucket` header: the
//! route template maps to a bucket hash, and the bucket key is the hash plus
//! the route's major parameter. Routes not yet seen share the default bucket.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::bucket::RateLimitBucket;
use super::headers::RateLimitHeaders;
use crate::route::Route;

/// Key of the bucket shared by routes with no known bucket
pub const DEFAULT_BUCKET: &str = "default";

pub type SharedBucket = Arc<Mutex<RateLimitBucket>>;

#[derive(Debug)]
pub struct BucketRegistry {
    /// Route template -> bucket hash
    routes: DashMap<String, String>,
    /// Bucket key -> bucket
    buckets: DashMap<String, SharedBucket>,
    default: SharedBucket,
    max_buckets: usize,
}

impl BucketRegistry {
    pub fn new(max_buckets: usize) -> Self {
        Self {
            routes: DashMap::new(),
            buckets: DashMap::new(),
            default: Arc::new(Mutex::new(RateLimitBucket::new(DEFAULT_BUCKET))),
            max_buckets: max_buckets.max(1),
        }
    }

    /// Bucket key a route currently maps to
    #[must_use]
    pub fn bucket_key(&self, route: &Route) -> String {
        match self.routes.get(&route.template()) {
            Some(hash) => compose_key(hash.value(), route),
            None => DEFAULT_BUCKET.to_string(),
        }
    }

    /// Bucket a request on `route` must draw from
    #[must_use]
    pub fn resolve(&self, route: &Route) -> SharedBucket {
        let key = self.bucket_key(route);
        if key == DEFAULT_BUCKET {
            return Arc::clone(&self.default);
        }
        self.get_or_create(key)
    }

    /// Record the state reported by a response and return the affected bucket
    pub fn update(&self, route: &Route, headers: &RateLimitHeaders, now: Instant) -> SharedBucket {
        if let Some(hash) = &headers.bucket {
            let template = route.template();
            let known = self.routes.get(&template).map(|h| h.value() == hash);
            if known != Some(true) {
                tracing::debug!(route = %route.key(), bucket = %hash, "discovered rate-limit bucket");
                self.routes.insert(template, hash.clone());
            }
        }

        let bucket = self.resolve(route);
        if headers.has_bucket_state() && !Arc::ptr_eq(&bucket, &self.default) {
            bucket.lock().update(headers, now);
        }
        bucket
    }

    /// The shared default bucket
    #[must_use]
    pub fn default_bucket(&self) -> SharedBucket {
        Arc::clone(&self.default)
    }

    /// Number of discovered buckets (the default bucket is not counted)
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    fn get_or_create(&self, key: String) -> SharedBucket {
        if let Some(bucket) = self.buckets.get(&key) {
            return Arc::clone(bucket.value());
        }

        let bucket = Arc::clone(
            self.buckets
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(RateLimitBucket::new(key.clone()))))
                .value(),
        );
        if self.buckets.len() > self.max_buckets {
            self.evict_lru(&key);
        }
        bucket
    }

    /// Drop the least recently used bucket other than `keep`
    fn evict_lru(&self, keep: &str) {
        let oldest = self
            .buckets
            .iter()
            .filter(|entry| entry.key() != keep)
            .min_by_key(|entry| entry.value().lock().last_used())
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            self.buckets.remove(&key);
            tracing::debug!(bucket = %key, "evicted rate-limit bucket");
        }
    }
}

fn compose_key(hash: &str, route: &Route) -> String {
    format!("{hash}:{}", route.major().as_deref().unwrap_or("-"))
}
