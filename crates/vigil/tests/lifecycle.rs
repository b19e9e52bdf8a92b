//! Connection lifecycle guarantees: acquire once, execute once, close on
//! every exit path.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;
use vigil::schema::VersionedSchema;
use vigil::strategy::tcp::TcpStrategy;
use vigil::{
    AssertionOperator, AssertionRule, CheckSpec, ConnectError, ProbeClient, ProbeOutcome,
    RunStatus, Strategy, StrategyRegistry, run_probe,
};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
struct ScriptedConfig {}

struct ScriptedClient {
    close_delay: Option<Duration>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl ProbeClient for ScriptedClient {
    async fn close(&mut self) {
        if let Some(delay) = self.close_delay {
            tokio::time::sleep(delay).await;
        }
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Test double with scripted connect/execute behavior and counters for
/// every lifecycle event
#[derive(Default)]
struct ScriptedStrategy {
    refuse_connect: bool,
    execute_delay: Option<Duration>,
    close_delay: Option<Duration>,
    error: Option<String>,
    result: Option<Value>,
    connects: Arc<AtomicUsize>,
    executes: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl Strategy for ScriptedStrategy {
    type Config = ScriptedConfig;
    type Output = Value;
    type Client = ScriptedClient;

    fn id(&self) -> &'static str {
        "scripted"
    }

    fn display_name(&self) -> &'static str {
        "Scripted"
    }

    fn description(&self) -> &'static str {
        "Scripted probe for lifecycle tests"
    }

    fn config_schema(&self) -> VersionedSchema<Self::Config> {
        VersionedSchema::new(1)
    }

    async fn connect(&self, _config: &Self::Config) -> Result<Self::Client, ConnectError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse_connect {
            return Err(ConnectError::Failed("connection refused".into()));
        }
        Ok(ScriptedClient { close_delay: self.close_delay, closes: Arc::clone(&self.closes) })
    }

    async fn execute(
        &self,
        _config: &Self::Config,
        _client: &mut Self::Client,
    ) -> ProbeOutcome<Self::Output> {
        self.executes.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.execute_delay {
            tokio::time::sleep(delay).await;
        }
        match (&self.result, &self.error) {
            (Some(result), Some(error)) => ProbeOutcome::partial(result.clone(), error.clone()),
            (Some(result), None) => ProbeOutcome::ok(result.clone()),
            (None, Some(error)) => ProbeOutcome::failed(error.clone()),
            (None, None) => ProbeOutcome::ok(json!({})),
        }
    }
}

struct Harness {
    registry: StrategyRegistry,
    connects: Arc<AtomicUsize>,
    executes: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
}

fn harness(build: impl FnOnce(&mut ScriptedStrategy)) -> Harness {
    let mut strategy = ScriptedStrategy::default();
    build(&mut strategy);
    let connects = Arc::clone(&strategy.connects);
    let executes = Arc::clone(&strategy.executes);
    let closes = Arc::clone(&strategy.closes);
    let mut registry = StrategyRegistry::new();
    registry.register(strategy, "test").unwrap();
    Harness { registry, connects, executes, closes }
}

fn spec(assertions: Vec<AssertionRule>, degraded_threshold_ms: Option<u64>) -> CheckSpec {
    CheckSpec {
        check_id: Uuid::new_v4(),
        system_id: "sys-1".into(),
        config: json!({}),
        assertions,
        timeout: Duration::from_millis(200),
        degraded_threshold_ms,
    }
}

#[tokio::test]
async fn refused_connection_skips_execute_and_records_elapsed_time() {
    let h = harness(|s| s.refuse_connect = true);
    let strategy = h.registry.get("test.scripted").unwrap();

    let run = run_probe(strategy.as_ref(), &spec(Vec::new(), None)).await;

    assert_eq!(run.status, RunStatus::Unhealthy);
    assert_eq!(h.executes.load(Ordering::SeqCst), 0);
    assert!(run.latency_ms.is_some());
    assert_eq!(run.metadata["error_kind"], json!("connection"));
    assert!(run.error.as_deref().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn successful_run_closes_the_client_exactly_once() {
    let h = harness(|s| s.result = Some(json!({"status_code": 200})));
    let strategy = h.registry.get("test.scripted").unwrap();

    let run = run_probe(strategy.as_ref(), &spec(Vec::new(), None)).await;

    assert_eq!(run.status, RunStatus::Healthy);
    assert_eq!(h.connects.load(Ordering::SeqCst), 1);
    assert_eq!(h.executes.load(Ordering::SeqCst), 1);
    assert_eq!(h.closes.load(Ordering::SeqCst), 1);
    assert_eq!(run.metadata["status_code"], json!(200));
}

#[tokio::test]
async fn probe_error_still_closes_the_client() {
    let h = harness(|s| {
        s.result = Some(json!({"status_code": 503}));
        s.error = Some("unexpected status code 503".into());
    });
    let strategy = h.registry.get("test.scripted").unwrap();

    let run = run_probe(strategy.as_ref(), &spec(Vec::new(), None)).await;

    assert_eq!(run.status, RunStatus::Unhealthy);
    assert_eq!(run.error.as_deref(), Some("unexpected status code 503"));
    assert_eq!(h.closes.load(Ordering::SeqCst), 1);
    // the partial result still reaches the run
    assert_eq!(run.metadata["status_code"], json!(503));
}

#[tokio::test]
async fn timed_out_execute_discards_the_partial_result_and_closes() {
    let h = harness(|s| {
        s.execute_delay = Some(Duration::from_secs(5));
        s.result = Some(json!({"status_code": 200}));
    });
    let strategy = h.registry.get("test.scripted").unwrap();

    let run = run_probe(strategy.as_ref(), &spec(Vec::new(), None)).await;

    assert_eq!(run.status, RunStatus::Unhealthy);
    assert_eq!(run.metadata["error_kind"], json!("timeout"));
    assert!(run.error.as_deref().unwrap().contains("timed out"));
    assert_eq!(h.closes.load(Ordering::SeqCst), 1);
    // nothing from the in-flight attempt leaked into the run
    assert!(run.metadata.get("status_code").is_none());
}

#[tokio::test]
async fn wedged_close_does_not_leave_the_invocation_pending() {
    let h = harness(|s| {
        s.close_delay = Some(Duration::from_secs(3600));
        s.result = Some(json!({"status_code": 200}));
    });
    let strategy = h.registry.get("test.scripted").unwrap();

    // the spec timeout is 200ms; a hung close must not stretch the
    // invocation anywhere near this outer bound
    let run = tokio::time::timeout(
        Duration::from_secs(2),
        run_probe(strategy.as_ref(), &spec(Vec::new(), None)),
    )
    .await
    .expect("invocation must finish once its deadline and close grace expire");

    assert_eq!(run.status, RunStatus::Healthy);
    assert_eq!(run.metadata["status_code"], json!(200));
    // the close was abandoned, not completed
    assert_eq!(h.closes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failing_assertion_marks_the_run_unhealthy() {
    let h = harness(|s| s.result = Some(json!({"status_code": 500})));
    let strategy = h.registry.get("test.scripted").unwrap();

    let rules = vec![AssertionRule {
        field: "status_code".into(),
        operator: AssertionOperator::Eq,
        value: Some(json!(200)),
    }];
    let run = run_probe(strategy.as_ref(), &spec(rules, None)).await;

    assert_eq!(run.status, RunStatus::Unhealthy);
    let failed = run.failed_assertion.unwrap();
    assert_eq!(failed.field, "status_code");
    assert_eq!(failed.actual, json!(500));
    assert!(run.error.is_none());
    assert_eq!(h.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn slow_success_is_degraded_above_the_threshold() {
    let h = harness(|s| {
        s.execute_delay = Some(Duration::from_millis(50));
        s.result = Some(json!({"status_code": 200}));
    });
    let strategy = h.registry.get("test.scripted").unwrap();

    let run = run_probe(strategy.as_ref(), &spec(Vec::new(), Some(1))).await;

    assert_eq!(run.status, RunStatus::Degraded);
    assert!(run.latency_ms.unwrap() >= 50);
}

#[tokio::test]
async fn tcp_strategy_against_a_closed_port_is_a_connection_failure() {
    // grab a free port, then close the listener so connects are refused
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut registry = StrategyRegistry::new();
    registry.register(TcpStrategy, "vigil").unwrap();
    let strategy = registry.get("vigil.tcp").unwrap();

    let spec = CheckSpec {
        check_id: Uuid::new_v4(),
        system_id: "sys-1".into(),
        config: json!({"host": "127.0.0.1", "port": port}),
        assertions: Vec::new(),
        timeout: Duration::from_secs(2),
        degraded_threshold_ms: None,
    };
    let run = run_probe(strategy.as_ref(), &spec).await;

    assert_eq!(run.status, RunStatus::Unhealthy);
    assert_eq!(run.metadata["error_kind"], json!("connection"));
}

#[tokio::test]
async fn tcp_strategy_against_a_live_listener_is_healthy() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accept = tokio::spawn(async move {
        let _ = listener.accept().await;
    });

    let mut registry = StrategyRegistry::new();
    registry.register(TcpStrategy, "vigil").unwrap();
    let strategy = registry.get("vigil.tcp").unwrap();

    let spec = CheckSpec {
        check_id: Uuid::new_v4(),
        system_id: "sys-1".into(),
        config: json!({"host": "127.0.0.1", "port": port}),
        assertions: Vec::new(),
        timeout: Duration::from_secs(2),
        degraded_threshold_ms: None,
    };
    let run = run_probe(strategy.as_ref(), &spec).await;

    assert_eq!(run.status, RunStatus::Healthy);
    assert!(run.metadata["remote_addr"].as_str().unwrap().contains(&port.to_string()));
    accept.await.unwrap();
}
