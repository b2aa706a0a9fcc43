//! Background sweeping of rate windows and idle sessions.

use formgate::infrastructure::mocks::{MockClock, MockTransport};
use formgate::{ClientIdentity, Config, FormGate, RawForm, Submission, SweepReport};
use std::net::{IpAddr, Ipv6Addr};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn gate(clock: &Arc<MockClock>) -> FormGate {
    FormGate::builder()
        .with_config(Config {
            contact_email: "owner@example.com".to_string(),
            session_secret: "sweep-secret".to_string(),
            session_ttl: Duration::from_secs(30),
            ..Config::default()
        })
        .with_transport(Arc::new(MockTransport::new()))
        .with_clock(clock.clone())
        .build()
        .unwrap()
}

async fn submit_once(gate: &FormGate) {
    let pipeline = gate.pipeline();
    let session = pipeline.session(None);
    let token = pipeline.prepare_form(&session).unwrap().csrf_token;
    let run = pipeline
        .submit_contact(Submission {
            identity: ClientIdentity::Addr(IpAddr::V6(Ipv6Addr::LOCALHOST)),
            session: Some(session),
            csrf_token: Some(token),
            form: RawForm::new()
                .with("name", "Ann Lee")
                .with("email", "ann@example.com")
                .with("subject", "Sweeping")
                .with("message", "Checking that idle state goes away."),
        })
        .await;
    assert!(!run.is_rejected());
}

#[tokio::test]
async fn test_manual_sweep_keeps_live_state() {
    let clock = Arc::new(MockClock::new(Instant::now()));
    let gate = gate(&clock);
    submit_once(&gate).await;

    clock.advance(Duration::from_secs(10));
    assert_eq!(gate.pipeline().sweep(), SweepReport::default());
}

#[tokio::test]
async fn test_manual_sweep_removes_idle_state() {
    let clock = Arc::new(MockClock::new(Instant::now()));
    let gate = gate(&clock);
    submit_once(&gate).await;
    gate.pipeline().session(None);

    // Past both the session lifetime and the 15 minute window
    clock.advance(Duration::from_secs(1000));
    assert_eq!(
        gate.pipeline().sweep(),
        SweepReport {
            counters: 2,
            sessions: 2,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_background_sweeper_reports_totals_on_shutdown() {
    let clock = Arc::new(MockClock::new(Instant::now()));
    let gate = gate(&clock);
    let handle = gate.start_sweeper();

    submit_once(&gate).await;
    clock.advance(Duration::from_secs(1000));

    // One tick of the default 60 second interval
    tokio::time::sleep(Duration::from_secs(61)).await;

    let report = handle.shutdown().await.unwrap();
    assert_eq!(report.counters, 2);
    assert_eq!(report.sessions, 1);
}
