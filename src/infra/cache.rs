//! Time-windowed cache for anonymous feed pages.
//!
//! Whole rendered responses are kept for a short freshness window and
//! served verbatim to anonymous readers. Requests carrying a viewer
//! identity skip the cache entirely so one reader's page is never served
//! to another.

use std::{
    hash::{Hash, Hasher},
    num::NonZeroUsize,
    sync::{RwLock, RwLockWriteGuard},
    time::Duration,
};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Method, Request, StatusCode, header, response::Parts},
    middleware::Next,
    response::Response,
};
use bytes::Bytes;
use http_body_util::BodyExt;
use lru::LruCache;
use metrics::counter;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use crate::infra::http::VIEWER_HEADER;

/// Cache key: request path plus a hash of the raw query string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PageKey {
    path: String,
    query_hash: u64,
}

fn hash_query(query: &str) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    query.hash(&mut hasher);
    hasher.finish()
}

#[derive(Clone)]
struct CachedPage {
    status: StatusCode,
    headers: Vec<(HeaderName, HeaderValue)>,
    body: Bytes,
    stored_at: Instant,
}

impl CachedPage {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        headers.clear();
        for (name, value) in self.headers {
            headers.append(name, value);
        }

        response
    }
}

/// Shared store behind the feed cache middleware.
pub struct FeedCache {
    window: Duration,
    entries: RwLock<LruCache<PageKey, CachedPage>>,
}

impl FeedCache {
    pub fn new(window: Duration, max_entries: NonZeroUsize) -> Self {
        Self {
            window,
            entries: RwLock::new(LruCache::new(max_entries)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn get(&self, key: &PageKey) -> Option<CachedPage> {
        let now = Instant::now();
        let mut guard = write_lock(&self.entries, "get");
        match guard.get(key) {
            Some(entry) if now.duration_since(entry.stored_at) < self.window => {
                Some(entry.clone())
            }
            Some(_) => {
                guard.pop(key);
                counter!("brume_feed_cache_expired_total").increment(1);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: PageKey, page: CachedPage) {
        let mut guard = write_lock(&self.entries, "set");
        guard.put(key, page);
    }

    pub fn invalidate_all(&self) {
        let mut guard = write_lock(&self.entries, "invalidate_all");
        guard.clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        read_lock(&self.entries, "len").len()
    }
}

fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                lock_kind = "rwlock.write",
                result = "poisoned_recovered",
                hint = "state may be stale after panic in another thread",
                "Recovered from poisoned feed cache lock"
            );
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
fn read_lock<'a, T>(lock: &'a RwLock<T>, op: &'static str) -> std::sync::RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                lock_kind = "rwlock.read",
                result = "poisoned_recovered",
                "Recovered from poisoned feed cache lock"
            );
            poisoned.into_inner()
        }
    }
}

/// Shared state for the feed cache middleware.
#[derive(Clone)]
pub struct FeedCacheState {
    pub enabled: bool,
    pub cache: std::sync::Arc<FeedCache>,
}

/// Middleware caching anonymous GET responses for the freshness window.
///
/// Identified viewers bypass the cache; only 200 responses without
/// `Set-Cookie` are stored.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn feed_cache_layer(
    State(state): State<FeedCacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !state.enabled {
        return next.run(request).await;
    }

    if request.method() != Method::GET {
        return next.run(request).await;
    }

    if request.headers().contains_key(VIEWER_HEADER) {
        counter!("brume_feed_cache_bypass_total").increment(1);
        return next.run(request).await;
    }

    let key = PageKey {
        path: request.uri().path().to_string(),
        query_hash: hash_query(request.uri().query().unwrap_or("")),
    };

    if let Some(cached) = state.cache.get(&key) {
        counter!("brume_feed_cache_hit_total").increment(1);
        debug!(outcome = "hit", "serving cached feed page");
        return cached.into_response();
    }

    counter!("brume_feed_cache_miss_total").increment(1);
    debug!(outcome = "miss", "cache miss, executing handler");

    let response = next.run(request).await;
    if !should_store_response(&response) {
        return response;
    }

    let (parts, body) = response.into_parts();
    match BodyExt::collect(body).await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            let cached = CachedPage {
                status: parts.status,
                headers: parts
                    .headers
                    .iter()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect(),
                body: bytes.clone(),
                stored_at: Instant::now(),
            };
            state.cache.set(key, cached);
            counter!("brume_feed_cache_store_total").increment(1);
            Response::from_parts(parts, Body::from(bytes))
        }
        Err(error) => {
            warn!(%error, "failed to buffer response body for caching");
            respond_unbuffered(parts)
        }
    }
}

// The original Content-Length no longer matches the empty replacement body.
fn respond_unbuffered(mut parts: Parts) -> Response {
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::empty())
}

fn should_store_response(response: &Response) -> bool {
    if response.status() != StatusCode::OK {
        return false;
    }

    if response.headers().contains_key(header::SET_COOKIE) {
        return false;
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> CachedPage {
        CachedPage {
            status: StatusCode::OK,
            headers: Vec::new(),
            body: Bytes::from(body.to_string()),
            stored_at: Instant::now(),
        }
    }

    fn key(path: &str, query: &str) -> PageKey {
        PageKey {
            path: path.to_string(),
            query_hash: hash_query(query),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn entries_survive_within_the_window() {
        let cache = FeedCache::new(Duration::from_secs(20), NonZeroUsize::new(8).unwrap());
        cache.set(key("/", ""), page("feed"));

        tokio::time::advance(Duration::from_secs(19)).await;
        assert!(cache.get(&key("/", "")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_the_window() {
        let cache = FeedCache::new(Duration::from_secs(20), NonZeroUsize::new(8).unwrap());
        cache.set(key("/", ""), page("feed"));

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(cache.get(&key("/", "")).is_none());
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_queries_get_distinct_entries() {
        let cache = FeedCache::new(Duration::from_secs(20), NonZeroUsize::new(8).unwrap());
        cache.set(key("/", "page=1"), page("one"));
        cache.set(key("/", "page=2"), page("two"));

        let first = cache.get(&key("/", "page=1")).expect("page one cached");
        let second = cache.get(&key("/", "page=2")).expect("page two cached");
        assert_ne!(first.body, second.body);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_all_clears_the_store() {
        let cache = FeedCache::new(Duration::from_secs(20), NonZeroUsize::new(8).unwrap());
        cache.set(key("/", ""), page("feed"));
        cache.invalidate_all();
        assert!(cache.get(&key("/", "")).is_none());
    }

    #[test]
    fn unbuffered_fallback_drops_the_stale_content_length() {
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_LENGTH, "512")
            .body(Body::empty())
            .unwrap();
        let (parts, _) = response.into_parts();

        let rebuilt = respond_unbuffered(parts);
        assert!(!rebuilt.headers().contains_key(header::CONTENT_LENGTH));
        assert_eq!(rebuilt.status(), StatusCode::OK);
    }

    #[test]
    fn non_ok_responses_are_not_stored() {
        let response = Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::empty())
            .unwrap();
        assert!(!should_store_response(&response));
    }

    #[test]
    fn set_cookie_responses_are_not_stored() {
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(header::SET_COOKIE, "session=abc")
            .body(Body::empty())
            .unwrap();
        assert!(!should_store_response(&response));
    }
}
