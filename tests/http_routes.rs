//! Router-level tests driven through `tower::ServiceExt::oneshot`.

#![cfg(feature = "server")]

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use formgate::infrastructure::http::router;
use formgate::infrastructure::mocks::{MockClock, MockTransport};
use formgate::{Config, FormGate, IdentitySource};
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceExt;

const FORM: &str = "application/x-www-form-urlencoded";

fn app(config: Config) -> (Router, MockTransport) {
    let transport = MockTransport::new();
    let gate = FormGate::builder()
        .with_config(Config {
            contact_email: "owner@example.com".to_string(),
            session_secret: "route-secret".to_string(),
            ..config
        })
        .with_transport(Arc::new(transport.clone()))
        .with_clock(Arc::new(MockClock::new(Instant::now())))
        .build()
        .unwrap();
    (router(&gate), transport)
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn session_cookie(response: &Response<Body>) -> String {
    response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string()
}

fn token_from(html: &str) -> String {
    let marker = "name=\"_csrf\" value=\"";
    let start = html.find(marker).unwrap() + marker.len();
    let end = start + html[start..].find('"').unwrap();
    html[start..end].to_string()
}

/// GET /contact and return (cookie, token).
async fn open_form(app: &Router) -> (String, String) {
    let response = app
        .clone()
        .oneshot(Request::get("/contact").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response);
    let token = token_from(&body_text(response).await);
    (cookie, token)
}

fn post(uri: &str, cookie: &str, body: String) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, FORM)
        .header(header::COOKIE, cookie)
        .body(Body::from(body))
        .unwrap()
}

fn contact_body(token: &str, message: &str) -> String {
    format!(
        "_csrf={token}&name=Ann+Lee&email=ann%40example.com&subject=Hello&message={message}"
    )
}

#[tokio::test]
async fn test_contact_round_trip_with_flash() {
    let (app, transport) = app(Config::default());
    let (cookie, token) = open_form(&app).await;

    let response = app
        .clone()
        .oneshot(post(
            "/contact",
            &cookie,
            contact_body(&token, "This+is+a+long+enough+message."),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/contact");
    assert_eq!(transport.attempts(), 1);

    let response = app
        .clone()
        .oneshot(
            Request::get("/contact")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let html = body_text(response).await;
    assert!(html.contains("flash-success"));

    // Consumed by the previous render
    let response = app
        .clone()
        .oneshot(
            Request::get("/contact")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(!body_text(response).await.contains("flash-"));
}

#[tokio::test]
async fn test_invalid_contact_rerenders_with_422() {
    let (app, _) = app(Config::default());
    let (cookie, token) = open_form(&app).await;

    let response = app
        .clone()
        .oneshot(post("/contact", &cookie, contact_body(&token, "hi")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let html = body_text(response).await;
    assert!(html.contains("Message must be between 10 and 500 characters."));
    assert!(html.contains("value=\"Ann Lee\""));
    assert_eq!(token_from(&html), token);
}

#[tokio::test]
async fn test_missing_token_is_forbidden() {
    let (app, transport) = app(Config::default());
    let (cookie, _) = open_form(&app).await;

    let response = app
        .clone()
        .oneshot(post(
            "/contact",
            &cookie,
            "name=Ann+Lee&email=ann%40example.com&subject=Hello&message=Long+enough+message".to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_text(response).await,
        "Invalid request token. Please reload the page and try again."
    );
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn test_rate_limited_sets_retry_after() {
    let (app, _) = app(Config {
        rate_limit_max: 1,
        ..Config::default()
    });
    let (cookie, token) = open_form(&app).await;
    let body = contact_body(&token, "This+is+a+long+enough+message.");

    let first = app.clone().oneshot(post("/contact", &cookie, body.clone())).await.unwrap();
    assert_eq!(first.status(), StatusCode::SEE_OTHER);

    let second = app.clone().oneshot(post("/contact", &cookie, body)).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(second.headers()[header::RETRY_AFTER], "900");
}

#[tokio::test]
async fn test_comment_post_returns_fragment() {
    let (app, _) = app(Config::default());
    let (cookie, token) = open_form(&app).await;

    let request = Request::post("/chat/lobby/post-comment")
        .header(header::CONTENT_TYPE, FORM)
        .header(header::COOKIE, &cookie)
        .header("x-csrf-token", &token)
        .body(Body::from("message=%3Cb%3Ehello%3C%2Fb%3E"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.starts_with("<div id=\"comment-list\""));
    assert!(html.contains("&lt;b&gt;hello&lt;&#x2F;b&gt;"));
    assert!(html.contains("<time datetime=\""));

    let response = app
        .clone()
        .oneshot(
            Request::get("/chat/lobby/comments?page=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("hello"));
}

#[tokio::test]
async fn test_blank_comment_is_bad_request() {
    let (app, _) = app(Config::default());
    let (cookie, token) = open_form(&app).await;

    let response = app
        .clone()
        .oneshot(post(
            "/chat/lobby/post-comment",
            &cookie,
            format!("_csrf={token}&message=+++"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "Your message cannot be empty.");
}

#[tokio::test]
async fn test_contact_form_is_read_limited() {
    let (app, _) = app(Config {
        global_rate_limit_max: 2,
        ..Config::default()
    });
    open_form(&app).await;
    open_form(&app).await;

    let response = app
        .clone()
        .oneshot(Request::get("/contact").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "900");
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}

#[tokio::test]
async fn test_cookieless_post_starts_no_session() {
    let (app, transport) = app(Config::default());

    let request = Request::post("/contact")
        .header(header::CONTENT_TYPE, FORM)
        .body(Body::from(contact_body("guess", "This+is+a+long+enough+message.")))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(transport.attempts(), 0);
}

#[tokio::test]
async fn test_forged_forwarded_hops_share_one_window() {
    let (app, _) = app(Config {
        identity_source: IdentitySource::ForwardedFor,
        ..Config::default()
    });

    let mut statuses = Vec::new();
    for i in 0..12 {
        let request = Request::post("/contact")
            .header(header::CONTENT_TYPE, FORM)
            .header("x-forwarded-for", format!("198.51.100.{i}, 203.0.113.9"))
            .body(Body::from(contact_body("guess", "This+is+a+long+enough+message.")))
            .unwrap();
        statuses.push(app.clone().oneshot(request).await.unwrap().status());
    }

    // Ten pass the limiter and fail the token check; the rest are throttled
    assert!(statuses[..10].iter().all(|s| *s == StatusCode::FORBIDDEN));
    assert!(statuses[10..].iter().all(|s| *s == StatusCode::TOO_MANY_REQUESTS));
}

#[tokio::test]
async fn test_room_page_issues_token_for_comments() {
    let (app, _) = app(Config::default());

    let response = app
        .clone()
        .oneshot(Request::get("/chat/lobby").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response);
    let html = body_text(response).await;
    assert!(html.contains("<textarea id=\"comment-input\""));
    assert!(html.contains("<div id=\"comment-list\""));
    let token = token_from(&html);

    let response = app
        .clone()
        .oneshot(post(
            "/chat/lobby/post-comment",
            &cookie,
            format!("_csrf={token}&message=first+post"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.contains("first post"));
}
