//! Admission control
//!
//! Keyed request budgets per route class. Each client identity gets an
//! independent governor limiter per class, with LRU eviction once the
//! tracked-key cap is hit. A denied request carries a retry-after hint;
//! the failure policy decides what happens if the counter store itself
//! breaks.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{
    clock::{Clock, QuantaClock},
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::api::types::ErrorResponse;
use crate::core::config::{AdmissionConfig, FailurePolicy, RouteBudget};
use crate::core::errors::{Result, SentinelError};

/// Route classes with independent budgets. Consuming a permit in one
/// class never touches another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Reads and other cheap endpoints.
    General,
    /// Endpoints that fan into the scoring oracle.
    Scoring,
    /// Operator actions: transitions, retraining.
    Admin,
}

impl RouteClass {
    fn as_str(&self) -> &'static str {
        match self {
            RouteClass::General => "general",
            RouteClass::Scoring => "scoring",
            RouteClass::Admin => "admin",
        }
    }
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Per-class keyed limiter: one governor limiter per client key, with
/// last-access tracking for eviction.
struct ClassLimiter {
    limiters: RwLock<HashMap<String, (Arc<DirectLimiter>, Instant)>>,
    quota: Quota,
    window: Duration,
    max_entries: usize,
}

impl ClassLimiter {
    fn new(budget: &RouteBudget, max_entries: usize) -> Self {
        let permits = NonZeroU32::new(budget.permits.max(1)).unwrap_or(NonZeroU32::MIN);
        let window = Duration::from_secs(budget.window_secs.max(1));
        // permits spread over the window, with the full budget as burst
        let quota = Quota::with_period(window / permits.get())
            .unwrap_or_else(|| Quota::per_minute(permits))
            .allow_burst(permits);
        Self {
            limiters: RwLock::new(HashMap::new()),
            quota,
            window,
            max_entries,
        }
    }

    fn check(&self, key: &str, clock: &QuantaClock) -> std::result::Result<(), Duration> {
        let limiter = {
            let mut limiters = self.limiters.write();
            if limiters.len() >= self.max_entries && !limiters.contains_key(key) {
                if let Some(oldest) = limiters
                    .iter()
                    .min_by_key(|(_, (_, seen))| *seen)
                    .map(|(k, _)| k.clone())
                {
                    limiters.remove(&oldest);
                    debug!(key = %oldest, "evicted least recently seen admission key");
                }
            }
            let entry = limiters
                .entry(key.to_string())
                .or_insert_with(|| (Arc::new(RateLimiter::direct(self.quota)), Instant::now()));
            entry.1 = Instant::now();
            entry.0.clone()
        };

        limiter.check().map_err(|not_until| {
            let wait = not_until.wait_time_from(clock.now());
            // never hint longer than one full window
            wait.min(self.window)
        })
    }

    fn tracked_keys(&self) -> usize {
        self.limiters.read().len()
    }
}

pub struct AdmissionControl {
    general: ClassLimiter,
    scoring: ClassLimiter,
    admin: ClassLimiter,
    failure_policy: FailurePolicy,
    clock: QuantaClock,
    /// Test hook simulating a broken counter store.
    store_broken: AtomicBool,
}

impl AdmissionControl {
    pub fn new(config: &AdmissionConfig) -> Self {
        Self {
            general: ClassLimiter::new(&config.general, config.max_tracked_keys),
            scoring: ClassLimiter::new(&config.scoring, config.max_tracked_keys),
            admin: ClassLimiter::new(&config.admin, config.max_tracked_keys),
            failure_policy: config.failure_policy,
            clock: QuantaClock::default(),
            store_broken: AtomicBool::new(false),
        }
    }

    fn class(&self, class: RouteClass) -> &ClassLimiter {
        match class {
            RouteClass::General => &self.general,
            RouteClass::Scoring => &self.scoring,
            RouteClass::Admin => &self.admin,
        }
    }

    /// Decide whether one request from `key` may proceed.
    ///
    /// Denials carry a retry-after hint rounded up to whole seconds. A
    /// broken counter store resolves through the failure policy instead
    /// of an opaque 500.
    pub fn admit(&self, class: RouteClass, key: &str) -> Result<()> {
        if self.store_broken.load(Ordering::Relaxed) {
            return match self.failure_policy {
                FailurePolicy::Open => {
                    warn!(class = class.as_str(), "admission store unavailable, admitting (fail-open)");
                    Ok(())
                }
                FailurePolicy::Closed => {
                    warn!(class = class.as_str(), "admission store unavailable, denying (fail-closed)");
                    Err(SentinelError::Unavailable(
                        "admission counter store unavailable".to_string(),
                    ))
                }
            };
        }

        self.class(class).check(key, &self.clock).map_err(|wait| {
            let retry_after_secs = wait.as_secs().max(1);
            debug!(class = class.as_str(), key, retry_after_secs, "request denied");
            SentinelError::RateLimited { retry_after_secs }
        })
    }

    pub fn tracked_keys(&self, class: RouteClass) -> usize {
        self.class(class).tracked_keys()
    }

    pub fn set_store_broken(&self, broken: bool) {
        self.store_broken.store(broken, Ordering::Relaxed);
    }
}

/// State handed to the admission middleware: shared control plus the
/// class of the wrapped routes.
#[derive(Clone)]
pub struct AdmissionLayer {
    pub control: Arc<AdmissionControl>,
    pub class: RouteClass,
}

/// Client identity: explicit client id header, else forwarded address,
/// else a shared anonymous bucket.
fn client_key(headers: &HeaderMap) -> String {
    if let Some(id) = headers.get("x-client-id").and_then(|v| v.to_str().ok()) {
        if !id.is_empty() {
            return id.to_string();
        }
    }
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    "anonymous".to_string()
}

pub async fn admission_middleware(
    State(layer): State<AdmissionLayer>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(request.headers());
    match layer.control.admit(layer.class, &key) {
        Ok(()) => next.run(request).await,
        Err(SentinelError::RateLimited { retry_after_secs }) => (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after_secs.to_string())],
            Json(ErrorResponse {
                error: format!("request budget exhausted, retry in {}s", retry_after_secs),
                code: "RATE_LIMITED".to_string(),
                retry_after_secs: Some(retry_after_secs),
            }),
        )
            .into_response(),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse {
                error: err.to_string(),
                code: err.code().to_string(),
                retry_after_secs: None,
            }),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(permits: u32, window_secs: u64) -> AdmissionConfig {
        AdmissionConfig {
            general: RouteBudget { permits, window_secs },
            scoring: RouteBudget { permits, window_secs },
            admin: RouteBudget { permits, window_secs },
            failure_policy: FailurePolicy::Open,
            max_tracked_keys: 4,
        }
    }

    #[test]
    fn test_budget_exhaustion_and_retry_hint() {
        let control = AdmissionControl::new(&config(3, 60));
        for _ in 0..3 {
            control.admit(RouteClass::General, "client-a").unwrap();
        }
        let err = control.admit(RouteClass::General, "client-a").unwrap_err();
        match err {
            SentinelError::RateLimited { retry_after_secs } => {
                assert!(retry_after_secs >= 1);
                assert!(retry_after_secs <= 60);
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_keys_do_not_share_budgets() {
        let control = AdmissionControl::new(&config(2, 60));
        control.admit(RouteClass::General, "client-a").unwrap();
        control.admit(RouteClass::General, "client-a").unwrap();
        assert!(control.admit(RouteClass::General, "client-a").is_err());
        // a different client is unaffected
        control.admit(RouteClass::General, "client-b").unwrap();
    }

    #[test]
    fn test_classes_are_independent() {
        let control = AdmissionControl::new(&config(1, 60));
        control.admit(RouteClass::Scoring, "client-a").unwrap();
        assert!(control.admit(RouteClass::Scoring, "client-a").is_err());
        // same key still has its admin budget
        control.admit(RouteClass::Admin, "client-a").unwrap();
    }

    #[test]
    fn test_tracked_key_cap_evicts_oldest() {
        let control = AdmissionControl::new(&config(10, 60));
        for i in 0..6 {
            control.admit(RouteClass::General, &format!("client-{}", i)).unwrap();
        }
        assert!(control.tracked_keys(RouteClass::General) <= 4);
    }

    #[test]
    fn test_failure_policy_open_admits() {
        let control = AdmissionControl::new(&config(1, 60));
        control.set_store_broken(true);
        for _ in 0..10 {
            control.admit(RouteClass::General, "client-a").unwrap();
        }
    }

    #[test]
    fn test_failure_policy_closed_denies() {
        let mut cfg = config(100, 60);
        cfg.failure_policy = FailurePolicy::Closed;
        let control = AdmissionControl::new(&cfg);
        control.set_store_broken(true);
        let err = control.admit(RouteClass::General, "client-a").unwrap_err();
        assert!(matches!(err, SentinelError::Unavailable(_)));
    }

    #[test]
    fn test_client_key_precedence() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers), "anonymous");

        headers.insert("x-forwarded-for", "10.0.0.1, 10.0.0.2".parse().unwrap());
        assert_eq!(client_key(&headers), "10.0.0.1");

        headers.insert("x-client-id", "svc-ingest".parse().unwrap());
        assert_eq!(client_key(&headers), "svc-ingest");
    }
}
