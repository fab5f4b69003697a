//! End-to-end ticks: Prometheus-shaped samples through the telemetry
//! source, the policy and an in-memory orchestrator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ecoscale_autoscale::{Autoscaler, ScaleAction, ScalingPolicy};
use ecoscale_core::{QueryError, QueryTemplates, ScaleDecision};
use ecoscale_metrics::{MetricsSource, QueryFuture, Sample, TelemetrySource};
use ecoscale_orchestrator::{DryRunOrchestrator, InMemoryOrchestrator};
use tokio::sync::watch;

/// Answers each configured expression with canned samples.
#[derive(Default)]
struct CannedPrometheus {
    answers: HashMap<String, Vec<Sample>>,
    broken: Vec<String>,
}

impl CannedPrometheus {
    fn answer(mut self, expression: &str, samples: Vec<Sample>) -> Self {
        self.answers.insert(expression.to_string(), samples);
        self
    }

    fn broken(mut self, expression: &str) -> Self {
        self.broken.push(expression.to_string());
        self
    }
}

impl MetricsSource for CannedPrometheus {
    fn query<'a>(&'a self, expression: &'a str) -> QueryFuture<'a> {
        let result = if self.broken.iter().any(|b| b == expression) {
            Err(QueryError::Status(503))
        } else {
            Ok(self.answers.get(expression).cloned().unwrap_or_default())
        };
        Box::pin(async move { result })
    }
}

fn power(pod: &str, watts: f64) -> Sample {
    Sample::new(&[("pod_name", pod), ("mode", "dynamic")], watts)
}

fn by_service(service: &str, value: f64) -> Sample {
    Sample::new(&[("kubernetes_service", service)], value)
}

fn services(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn idle_service_drawing_power_scales_up() {
    let q = QueryTemplates::default();
    let prom = CannedPrometheus::default()
        .answer(
            &q.replicas,
            vec![Sample::new(&[("deployment", "s3")], 1.0)],
        )
        .answer(&q.power, vec![power("s3-7d9f-abc", 3.0)]);

    let orch = Arc::new(InMemoryOrchestrator::new([("s3", 1)]));
    let scaler = Autoscaler::new(
        TelemetrySource::new(prom, q),
        Arc::clone(&orch),
        services(&["s3"]),
        ScalingPolicy::default(),
    );

    let outcomes = scaler.tick().await;
    let s3 = &outcomes[0];
    assert_eq!(s3.snapshot.power_watts, 3.0);
    assert_eq!(s3.snapshot.epr_joules_per_request, 0.0);
    assert_eq!(s3.snapshot.efficiency_rps_per_watt, 0.0);
    assert_eq!(s3.decision, ScaleDecision::ScaleUp(2));
    assert_eq!(orch.replicas("s3"), Some(2));
}

#[tokio::test]
async fn mixed_fleet_in_one_tick() {
    let q = QueryTemplates::default();
    let prom = CannedPrometheus::default()
        .answer(
            &q.power,
            vec![
                power("s1-a", 5.0),
                power("s1-b", 5.0),
                power("s2-a", 2.5),
                power("s4-a", 4.0),
            ],
        )
        .answer(
            &q.rps,
            vec![
                // s1: 1 rps over 10 W, efficiency 0.1
                by_service("s1", 1.0),
                // s2: 1 rps over 2.5 W, efficiency 0.4
                by_service("s2", 1.0),
                // s4: 1.2 rps over 4 W, efficiency 0.3
                by_service("s4", 1.2),
            ],
        );

    let orch = Arc::new(InMemoryOrchestrator::new([("s1", 2), ("s2", 3), ("s4", 2)]));
    let scaler = Autoscaler::new(
        TelemetrySource::new(prom, q),
        Arc::clone(&orch),
        services(&["s1", "s2", "s4"]),
        ScalingPolicy::default(),
    );

    let outcomes = scaler.tick().await;
    let decisions: Vec<_> = outcomes.iter().map(|o| o.decision).collect();
    assert_eq!(
        decisions,
        [
            ScaleDecision::ScaleUp(3),
            ScaleDecision::ScaleDown(2),
            ScaleDecision::NoChange,
        ]
    );
    assert_eq!(orch.replicas("s1"), Some(3));
    assert_eq!(orch.replicas("s2"), Some(2));
    assert_eq!(orch.replicas("s4"), Some(2));
    assert_eq!(orch.writes(), 2);
}

#[tokio::test]
async fn failed_query_only_drops_its_signal() {
    let q = QueryTemplates::default();
    let prom = CannedPrometheus::default()
        .answer(&q.power, vec![power("s1-a", 2.0)])
        .answer(&q.rps, vec![by_service("s1", 1.0)])
        .broken(&q.latency_p99);

    let orch = Arc::new(InMemoryOrchestrator::new([("s1", 2)]));
    let scaler = Autoscaler::new(
        TelemetrySource::new(prom, q),
        Arc::clone(&orch),
        services(&["s1"]),
        ScalingPolicy::default(),
    );

    let outcome = &scaler.tick().await[0];
    assert_eq!(outcome.snapshot.efficiency_rps_per_watt, 0.5);
    assert_eq!(outcome.snapshot.latency_p99_ms, 0.0);
    assert_eq!(outcome.decision, ScaleDecision::ScaleDown(1));
}

#[tokio::test]
async fn repeated_ticks_climb_to_the_ceiling_and_stop() {
    let q = QueryTemplates::default();
    let prom = CannedPrometheus::default().answer(&q.power, vec![power("s3-a", 3.0)]);

    let orch = Arc::new(InMemoryOrchestrator::new([("s3", 1)]));
    let scaler = Autoscaler::new(
        TelemetrySource::new(prom, q),
        Arc::clone(&orch),
        services(&["s3"]),
        ScalingPolicy::default(),
    );

    for _ in 0..10 {
        scaler.tick().await;
    }
    assert_eq!(orch.replicas("s3"), Some(5));
    assert_eq!(orch.writes(), 4);

    let outcome = &scaler.tick().await[0];
    assert_eq!(outcome.decision, ScaleDecision::NoChange);
    assert_eq!(outcome.action, ScaleAction::Unchanged);
}

#[tokio::test]
async fn repeated_ticks_descend_to_the_floor_and_stop() {
    let q = QueryTemplates::default();
    let prom = CannedPrometheus::default()
        .answer(&q.power, vec![power("s2-a", 1.0)])
        .answer(&q.rps, vec![by_service("s2", 0.5)]);

    let orch = Arc::new(InMemoryOrchestrator::new([("s2", 4)]));
    let scaler = Autoscaler::new(
        TelemetrySource::new(prom, q),
        Arc::clone(&orch),
        services(&["s2"]),
        ScalingPolicy::default(),
    );

    for _ in 0..10 {
        scaler.tick().await;
    }
    assert_eq!(orch.replicas("s2"), Some(1));
    assert_eq!(orch.writes(), 3);
}

#[tokio::test]
async fn dry_run_decides_but_never_writes() {
    let q = QueryTemplates::default();
    let prom = CannedPrometheus::default().answer(&q.power, vec![power("s3-a", 3.0)]);

    let orch = Arc::new(InMemoryOrchestrator::new([("s3", 1)]));
    let scaler = Autoscaler::new(
        TelemetrySource::new(prom, q),
        DryRunOrchestrator::new(Arc::clone(&orch)),
        services(&["s3"]),
        ScalingPolicy::default(),
    );

    let outcome = &scaler.tick().await[0];
    assert_eq!(outcome.decision, ScaleDecision::ScaleUp(2));
    assert_eq!(outcome.action, ScaleAction::DryRun { from: 1, to: 2 });
    assert_eq!(outcome.resulting_replicas(), 1);
    assert_eq!(orch.replicas("s3"), Some(1));
    assert_eq!(orch.writes(), 0);
}

#[tokio::test]
async fn unreadable_deployment_stays_within_bounds() {
    let q = QueryTemplates::default();
    let prom = CannedPrometheus::default().answer(&q.power, vec![power("s1-a", 3.0)]);

    let orch = Arc::new(InMemoryOrchestrator::new([("s1", 4)]));
    orch.fail_reads("s1");
    let policy = ScalingPolicy {
        min_replicas: 3,
        max_replicas: 5,
        ..ScalingPolicy::default()
    };
    let scaler = Autoscaler::new(
        TelemetrySource::new(prom, q),
        Arc::clone(&orch),
        services(&["s1"]),
        policy,
    );

    let outcome = &scaler.tick().await[0];
    assert!(outcome.replicas_assumed);
    assert_eq!(outcome.decision, ScaleDecision::ScaleUp(4));
    assert_eq!(orch.replicas("s1"), Some(4));

    for _ in 0..5 {
        scaler.tick().await;
        let replicas = orch.replicas("s1").unwrap();
        assert!((3..=5).contains(&replicas), "replicas {replicas} out of bounds");
    }
}

#[tokio::test]
async fn loop_keeps_ticking_until_shutdown() {
    let q = QueryTemplates::default();
    let prom = CannedPrometheus::default().answer(&q.power, vec![power("s3-a", 3.0)]);

    let orch = Arc::new(InMemoryOrchestrator::new([("s3", 1)]));
    let scaler = Autoscaler::new(
        TelemetrySource::new(prom, q),
        Arc::clone(&orch),
        services(&["s3"]),
        ScalingPolicy::default(),
    );
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        scaler.run(Duration::from_millis(5), rx).await;
    });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while orch.replicas("s3") != Some(5) && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(orch.replicas("s3"), Some(5));
}
