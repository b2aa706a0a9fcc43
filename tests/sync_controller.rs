//! Client controller against server-rendered fragments.

use chrono::{FixedOffset, TimeZone, Utc};
use formgate::client::dom::{DocumentHost, VirtualDocument};
use formgate::client::timestamp::{localize_in, INVALID_DATE};
use formgate::client::SyncTargets;
use formgate::infrastructure::render::comment_fragment;
use formgate::{BannerState, CommentPage, CommentRecord, StatusKind, SyncController, SyncEvent};

fn controller() -> SyncController<FixedOffset> {
    SyncController::with_time_zone(
        SyncTargets::default(),
        FixedOffset::west_opt(5 * 3600).unwrap(),
    )
}

fn document() -> VirtualDocument {
    VirtualDocument::new()
        .with_element("comment-list")
        .with_element("comment-input")
}

fn page(sources: &[&str]) -> String {
    let comments = sources
        .iter()
        .map(|source| CommentRecord {
            author: Some("ann".to_string()),
            body: "hello".to_string(),
            created_at: chrono::DateTime::parse_from_rfc3339(source)
                .unwrap()
                .with_timezone(&Utc),
        })
        .collect();
    comment_fragment(
        "lobby",
        &CommentPage {
            comments,
            current_page: 1,
            total_pages: 1,
        },
    )
}

#[test]
fn test_list_swap_resets_input_and_removes_banner() {
    let mut controller = controller();
    let mut doc = document();

    controller.handle(&mut doc, SyncEvent::SubmitFailed(StatusKind::ValidationFailed));
    assert!(doc.has_element("error-box"));
    doc.set_value("comment-input", "draft text");

    doc.swap_fragment("comment-list", &page(&["2024-01-01T00:00:00Z"]));
    controller.handle(&mut doc, SyncEvent::FragmentSwapped("comment-list".to_string()));

    let input = doc.element("comment-input").unwrap();
    assert_eq!(input.value, "");
    assert!(!input.classes.contains("error"));
    assert_eq!(doc.focused(), Some("comment-input"));
    assert!(!doc.has_element("error-box"));
    assert_eq!(controller.state(), &BannerState::Idle);
}

#[test]
fn test_swap_localizes_every_timestamp() {
    let mut controller = controller();
    let mut doc = document();

    doc.swap_fragment(
        "comment-list",
        &page(&["2024-01-01T00:00:00Z", "2024-07-04T18:30:00Z"]),
    );
    controller.handle(&mut doc, SyncEvent::FragmentSwapped("comment-list".to_string()));

    let texts: Vec<_> = doc.times().iter().map(|time| time.text.clone()).collect();
    assert_eq!(texts, vec!["12/31/2023, 07:00 PM", "7/4/2024, 01:30 PM"]);
}

#[test]
fn test_localization_is_idempotent_and_keeps_source() {
    let controller = controller();
    let mut doc = document().with_time("2024-01-01T00:00:00Z").with_time("not-a-date");

    controller.localize_timestamps(&mut doc);
    let once: Vec<_> = doc.times().to_vec();
    controller.localize_timestamps(&mut doc);

    assert_eq!(doc.times(), once.as_slice());
    assert_eq!(doc.times()[0].datetime, "2024-01-01T00:00:00Z");
    assert_eq!(doc.times()[1].text, INVALID_DATE);
}

#[test]
fn test_invalid_and_valid_sources() {
    let tz = FixedOffset::east_opt(0).unwrap();
    assert_eq!(localize_in("not-a-date", &tz), "Invalid Date");

    let first = localize_in("2024-01-01T00:00:00Z", &tz);
    assert_eq!(first, localize_in("2024-01-01T00:00:00Z", &tz));
    assert_eq!(first, "1/1/2024, 12:00 AM");
}

#[test]
fn test_success_after_failures_returns_to_idle() {
    let mut controller = controller();
    let mut doc = document();

    controller.handle(&mut doc, SyncEvent::SubmitFailed(StatusKind::RateLimited));
    controller.handle(&mut doc, SyncEvent::SubmitFailed(StatusKind::CsrfMismatch));
    assert_eq!(doc.count("error-box"), 1);
    assert_eq!(
        doc.element("error-box").unwrap().text,
        StatusKind::CsrfMismatch.user_message()
    );

    let created = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
    let fragment = page(&[&created.to_rfc3339()]);
    controller.handle(&mut doc, SyncEvent::SubmitSucceeded(fragment));

    assert_eq!(controller.state(), &BannerState::Idle);
    assert!(!doc.has_element("error-box"));
    assert_eq!(doc.times()[0].text, "1/1/2024, 07:00 AM");
}

#[test]
fn test_unknown_status_shows_generic_message() {
    let mut controller = controller();
    let mut doc = document();

    controller.handle(
        &mut doc,
        SyncEvent::SubmitFailed(StatusKind::from_http_status(502)),
    );
    assert_eq!(
        controller.state(),
        &BannerState::ErrorShown("An unexpected error occurred. Please try again.".to_string())
    );
}
