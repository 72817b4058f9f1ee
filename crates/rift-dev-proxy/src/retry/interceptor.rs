//! Takes over failure handling of one engine.
//!
//! On install the interceptor captures the default failure handler the host
//! registered and puts its own handler in its place. Failed attempts are
//! replayed while the policy allows it; only the last failure reaches the
//! captured handler.

use super::operation::{FailureDecision, OperationTable};
use super::policy::RetryPolicy;
use super::replay::Replay;
use super::RetryError;
use crate::engine::{
    Downstream, FailureHandler, ForwardOptions, ProxyEngine, ProxyError, ProxyRequest,
};
use crate::metrics;
use crate::proxy::ConfigureHook;
use hyper::StatusCode;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct RetryInterceptor<E: ProxyEngine> {
    route: String,
    policy: RetryPolicy,
    engine: E,
    options: Arc<ForwardOptions>,
    default_handler: FailureHandler,
    operations: Arc<OperationTable>,
}

impl<E: ProxyEngine> RetryInterceptor<E> {
    /// Capture the engine's default failure handler and register the retry
    /// listeners.
    ///
    /// Exactly one failure handler must be registered. Otherwise the engine
    /// is left as it was and [`RetryError::ListenerConflict`] is returned.
    pub fn install(
        route: &str,
        policy: RetryPolicy,
        engine: &E,
        options: &Arc<ForwardOptions>,
    ) -> Result<Arc<Self>, RetryError> {
        let mut handlers = engine.take_failure_handlers();
        if handlers.len() != 1 {
            let found = handlers.len();
            for handler in handlers {
                engine.on_failure(handler);
            }
            return Err(RetryError::ListenerConflict {
                route: route.to_string(),
                found,
            });
        }
        let default_handler = handlers.remove(0);

        let interceptor = Arc::new(Self {
            route: route.to_string(),
            policy,
            engine: engine.clone(),
            options: Arc::clone(options),
            default_handler,
            operations: Arc::new(OperationTable::new()),
        });

        let on_failure = Arc::clone(&interceptor);
        engine.on_failure(Arc::new(move |error, request, downstream| {
            on_failure.handle_failure(error, request, downstream)
        }));
        let on_response = Arc::clone(&interceptor);
        engine.on_response(Arc::new(move |request, status| {
            on_response.handle_response(request, status)
        }));

        info!(
            "Retry enabled for {}: {} tries, delay {:?}, max delay {:?}, backoff {}",
            route,
            policy.max_attempts,
            policy.initial_delay,
            policy.max_delay,
            policy.use_backoff
        );
        Ok(interceptor)
    }

    pub fn handle_failure(
        &self,
        error: &ProxyError,
        request: &Arc<ProxyRequest>,
        downstream: &Downstream,
    ) {
        metrics::record_upstream_failure(&self.route, downstream.kind());

        match self.operations.record_failure(request.id(), &self.policy) {
            FailureDecision::Retry { attempt, delay } => {
                debug!(
                    "Attempt {} of {} {} failed ({}), retrying in {:?}",
                    attempt,
                    request.method(),
                    request.uri(),
                    error,
                    delay
                );
                metrics::record_retry_scheduled(&self.route, delay);
                Replay {
                    route: self.route.clone(),
                    engine: self.engine.clone(),
                    request: Arc::clone(request),
                    downstream: downstream.clone(),
                    options: Arc::clone(&self.options),
                    operations: Arc::clone(&self.operations),
                }
                .spawn(delay);
            }
            FailureDecision::Exhausted { attempts } => {
                warn!(
                    "Giving up on {} {} after {} attempts",
                    request.method(),
                    request.uri(),
                    attempts
                );
                metrics::record_retries_exhausted(&self.route);
                (self.default_handler)(error, request, downstream);
            }
        }
    }

    pub fn handle_response(&self, request: &ProxyRequest, status: StatusCode) {
        if let Some(state) = self.operations.remove(&request.id()) {
            debug!(
                "{} {} answered {} after {} retries",
                request.method(),
                request.uri(),
                status,
                state.attempt
            );
        }
    }

    /// Operations currently waiting for a replay or its outcome.
    pub fn pending_operations(&self) -> usize {
        self.operations.len()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

/// Compose interceptor installation with a route's own configure hook.
///
/// The interceptor is installed first, so it sees the default handler the
/// host registered; the original hook then runs with the same engine and
/// options.
pub fn wrap_configure<E: ProxyEngine>(
    route: &str,
    policy: RetryPolicy,
    original: Option<ConfigureHook<E>>,
) -> ConfigureHook<E> {
    let route = route.to_string();
    Arc::new(move |engine: &E, options: &Arc<ForwardOptions>| {
        RetryInterceptor::install(&route, policy, engine, options)?;
        if let Some(original) = &original {
            original(engine, options)?;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::default_failure_handler;
    use crate::retry::testing::{MockEngine, Outcome};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    fn policy(max_attempts: u32, delay_ms: u64, use_backoff: bool) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(delay_ms),
            max_delay: Duration::from_millis(30_000),
            use_backoff,
        }
    }

    fn counting_handler() -> (FailureHandler, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler: FailureHandler = Arc::new(move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (handler, calls)
    }

    fn options() -> Arc<ForwardOptions> {
        Arc::new(ForwardOptions::new("http://127.0.0.1:9".parse().unwrap()))
    }

    #[test]
    fn test_install_rejects_missing_default_handler() {
        let engine = MockEngine::new();
        let result = RetryInterceptor::install("/api", policy(3, 10, false), &engine, &options());
        assert!(matches!(
            result,
            Err(RetryError::ListenerConflict { found: 0, .. })
        ));
        assert_eq!(engine.failure_handler_count(), 0);
    }

    #[test]
    fn test_install_rejects_multiple_handlers_and_restores_them() {
        let engine = MockEngine::new();
        engine.on_failure(default_failure_handler());
        engine.on_failure(default_failure_handler());

        let result = RetryInterceptor::install("/api", policy(3, 10, false), &engine, &options());
        match result {
            Err(RetryError::ListenerConflict { route, found }) => {
                assert_eq!(route, "/api");
                assert_eq!(found, 2);
            }
            _ => panic!("expected a listener conflict"),
        }
        assert_eq!(engine.failure_handler_count(), 2);
    }

    #[test]
    fn test_install_replaces_default_handler() {
        let engine = MockEngine::new();
        let (handler, calls) = counting_handler();
        engine.on_failure(handler);

        RetryInterceptor::install("/api", policy(3, 10, false), &engine, &options()).unwrap();
        assert_eq!(engine.failure_handler_count(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_calls_default_handler_once() {
        let engine = MockEngine::new();
        let (handler, calls) = counting_handler();
        engine.on_failure(handler);
        let interceptor =
            RetryInterceptor::install("/api", policy(3, 100, true), &engine, &options()).unwrap();

        let start = Instant::now();
        let rx = engine.dispatch_web("/api/users", &options());
        tokio::time::sleep(Duration::from_secs(1)).await;

        let times: Vec<u128> = engine
            .dispatches()
            .iter()
            .map(|d| (d.at - start).as_millis())
            .collect();
        assert_eq!(times, vec![0, 100, 300]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(interceptor.pending_operations(), 0);
        drop(rx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_retry_clears_state() {
        let engine = MockEngine::new();
        let (handler, calls) = counting_handler();
        engine.on_failure(handler);
        engine.script([Outcome::Fail, Outcome::Fail, Outcome::Respond(StatusCode::OK)]);
        let interceptor =
            RetryInterceptor::install("/api", policy(5, 50, false), &engine, &options()).unwrap();

        let rx = engine.dispatch_web("/api/users", &options());
        let response = rx.await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(engine.dispatches().len(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(interceptor.pending_operations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_answers_with_default_response() {
        let engine = MockEngine::new();
        engine.on_failure(default_failure_handler());
        RetryInterceptor::install("/api", policy(2, 300, false), &engine, &options()).unwrap();

        let start = Instant::now();
        let rx = engine.dispatch_web("/api/users", &options());
        let response = rx.await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(start.elapsed() < Duration::from_millis(400));
        assert_eq!(engine.dispatches().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_policy_fails_on_first_error() {
        let engine = MockEngine::new();
        let (handler, calls) = counting_handler();
        engine.on_failure(handler);
        RetryInterceptor::install("/api", RetryPolicy::DISABLED, &engine, &options()).unwrap();

        let _rx = engine.dispatch_web("/api/users", &options());
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(engine.dispatches().len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_abandoned_when_client_disconnects() {
        let engine = MockEngine::new();
        let (handler, calls) = counting_handler();
        engine.on_failure(handler);
        let interceptor =
            RetryInterceptor::install("/api", policy(5, 100, false), &engine, &options()).unwrap();

        let rx = engine.dispatch_web("/api/users", &options());
        assert_eq!(interceptor.pending_operations(), 1);
        drop(rx);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(engine.dispatches().len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(interceptor.pending_operations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_abandoned_when_headers_already_sent() {
        let engine = MockEngine::new();
        let (handler, calls) = counting_handler();
        engine.on_failure(handler);
        let interceptor =
            RetryInterceptor::install("/api", policy(5, 100, false), &engine, &options()).unwrap();

        let (responder, _rx) = engine.dispatch_web_with_responder("/api/users", &options());
        responder
            .send(crate::engine::status_response(StatusCode::OK, "text/plain", "late"))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(engine.dispatches().len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(interceptor.pending_operations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_websocket_failures_replay_through_ws() {
        let engine = MockEngine::new();
        engine.on_failure(default_failure_handler());
        RetryInterceptor::install("/socket", policy(3, 10, false), &engine, &options()).unwrap();

        let rx = engine.dispatch_ws("/socket", &options());
        let response = rx.await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let kinds: Vec<&str> = engine.dispatches().iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec!["ws", "ws", "ws"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_operations_keep_separate_counts() {
        let engine = MockEngine::new();
        let (handler, calls) = counting_handler();
        engine.on_failure(handler);
        RetryInterceptor::install("/api", policy(2, 100, false), &engine, &options()).unwrap();

        let _a = engine.dispatch_web("/api/a", &options());
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _b = engine.dispatch_web("/api/b", &options());
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(engine.dispatches().len(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_wrap_configure_runs_original_hook_after_install() {
        let engine = MockEngine::new();
        engine.on_failure(default_failure_handler());

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let original: ConfigureHook<MockEngine> =
            Arc::new(move |engine: &MockEngine, _options: &Arc<ForwardOptions>| {
                counter.store(engine.failure_handler_count(), Ordering::SeqCst);
                Ok(())
            });

        let hook = wrap_configure("/api", policy(3, 10, false), Some(original));
        hook(&engine, &options()).unwrap();

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(engine.response_handler_count(), 1);
    }

    #[test]
    fn test_wrap_configure_reports_conflict() {
        let engine = MockEngine::new();
        let hook = wrap_configure::<MockEngine>("/api", policy(3, 10, false), None);
        let err = hook(&engine, &options()).unwrap_err();
        assert!(err.to_string().contains("/api"));
    }
}
