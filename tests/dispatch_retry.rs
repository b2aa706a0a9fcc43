//! Notification delivery: retries, logging and the transport circuit.

use formgate::infrastructure::mocks::{MockCaptureLayer, MockClock, MockTransport};
use formgate::{
    CircuitBreakerConfig, ClientIdentity, Config, FlashCategory, FormGate, RawForm, Submission,
};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

fn gate(
    config: Config,
    transport: &MockTransport,
    clock: &Arc<MockClock>,
    breaker: CircuitBreakerConfig,
) -> FormGate {
    FormGate::builder()
        .with_config(Config {
            contact_email: "owner@example.com".to_string(),
            session_secret: "dispatch-secret".to_string(),
            ..config
        })
        .with_transport(Arc::new(transport.clone()))
        .with_clock(clock.clone())
        .with_circuit_breaker(breaker)
        .build()
        .unwrap()
}

fn submission(gate: &FormGate, visitor: u8) -> Submission {
    let pipeline = gate.pipeline();
    let session = pipeline.session(None);
    let token = pipeline.prepare_form(&session).unwrap().csrf_token;
    Submission {
        identity: ClientIdentity::Addr(IpAddr::V4(Ipv4Addr::new(203, 0, 113, visitor))),
        session: Some(session),
        csrf_token: Some(token),
        form: RawForm::new()
            .with("name", "Ann Lee")
            .with("email", "ann@example.com")
            .with("subject", "Delivery")
            .with("message", "Please get back to me when you can."),
    }
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_back_off_then_deliver() {
    let capture = MockCaptureLayer::new();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

    let transport = MockTransport::new()
        .then_transient("connection reset")
        .then_transient("connection reset");
    let clock = Arc::new(MockClock::new(Instant::now()));
    let gate = gate(
        Config::default(),
        &transport,
        &clock,
        CircuitBreakerConfig::default(),
    );
    let sub = submission(&gate, 1);
    let session = sub.session.clone().unwrap();

    let started = tokio::time::Instant::now();
    let run = gate.pipeline().submit_contact(sub).await;

    assert!(!run.is_rejected());
    assert_eq!(transport.attempts(), 3);
    // 200ms then 400ms of backoff
    assert!(started.elapsed() >= Duration::from_millis(600));

    let retries: Vec<_> = capture
        .at_level(Level::WARN)
        .into_iter()
        .filter(|event| event.message == "dispatch attempt failed, retrying")
        .collect();
    assert_eq!(retries.len(), 2);
    assert_eq!(retries[0].field("attempt"), Some("1"));
    assert_eq!(retries[0].field("delay_ms"), Some("200"));
    assert_eq!(retries[1].field("delay_ms"), Some("400"));

    let flashes = gate.pipeline().prepare_form(&session).unwrap().flashes;
    assert_eq!(flashes[0].category, FlashCategory::Success);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_is_not_retried() {
    let transport = MockTransport::new().then_permanent("mailbox unavailable");
    let clock = Arc::new(MockClock::new(Instant::now()));
    let gate = gate(
        Config::default(),
        &transport,
        &clock,
        CircuitBreakerConfig::default(),
    );
    let sub = submission(&gate, 2);
    let session = sub.session.clone().unwrap();

    gate.pipeline().submit_contact(sub).await;

    assert_eq!(transport.attempts(), 1);
    assert_eq!(gate.pipeline().metrics().snapshot().dispatch_failed, 1);
    let flashes = gate.pipeline().prepare_form(&session).unwrap().flashes;
    assert_eq!(flashes[0].category, FlashCategory::Error);
}

#[tokio::test(start_paused = true)]
async fn test_circuit_opens_and_retries_after_recovery() {
    let transport = MockTransport::new()
        .then_transient("down")
        .then_transient("down");
    let clock = Arc::new(MockClock::new(Instant::now()));
    let gate = gate(
        Config {
            dispatch_max_attempts: 1,
            ..Config::default()
        },
        &transport,
        &clock,
        CircuitBreakerConfig {
            failure_threshold: 2,
            recovery_timeout: Duration::from_secs(30),
        },
    );

    gate.pipeline().submit_contact(submission(&gate, 3)).await;
    gate.pipeline().submit_contact(submission(&gate, 4)).await;
    assert_eq!(transport.attempts(), 2);

    // Open: the transport is not called
    let sub = submission(&gate, 5);
    let session = sub.session.clone().unwrap();
    let run = gate.pipeline().submit_contact(sub).await;
    assert!(!run.is_rejected());
    assert_eq!(transport.attempts(), 2);
    let flashes = gate.pipeline().prepare_form(&session).unwrap().flashes;
    assert_eq!(flashes[0].category, FlashCategory::Error);

    // Half-open trial succeeds and closes the circuit
    clock.advance(Duration::from_secs(31));
    gate.pipeline().submit_contact(submission(&gate, 6)).await;
    gate.pipeline().submit_contact(submission(&gate, 7)).await;
    assert_eq!(transport.attempts(), 4);
    assert_eq!(gate.pipeline().metrics().snapshot().dispatch_failed, 3);
}
