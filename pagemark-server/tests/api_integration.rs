//! End-to-end tests for the flat query API over an in-memory store.

use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use pagemark_server::{api, AppState};

fn app() -> Router {
    api::router(AppState::in_memory().expect("in-memory store"))
}

async fn get(app: &Router, uri: &str) -> (StatusCode, String, String) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn get_json(app: &Router, uri: &str) -> Value {
    let (status, content_type, body) = get(app, uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "application/json");
    serde_json::from_str(&body).unwrap()
}

const NEW_A4: &str = "/?new&width=210&height=297&leftX=0&leftY=273&rightX=189&rightY=0";

async fn create_page(app: &Router) -> String {
    let body = get_json(app, NEW_A4).await;
    assert_eq!(body["status"], "ok");
    body["pageKey"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn page_creation_and_edit_round_trip() {
    let app = app();
    let key = create_page(&app).await;

    let body = get_json(&app, &format!("/?edit={key}")).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["pageKey"], key);
    assert_eq!(body["width"], 210);
    assert_eq!(body["height"], 297);
    assert_eq!(body["leftY"], 273);
    assert_eq!(body["rightX"], 189);
    assert_eq!(body["type"], 0);
    assert_eq!(body["locked"], false);
    assert!(body["boxes"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn boxes_live_on_checkbox_pages_only() {
    let app = app();
    let key = create_page(&app).await;

    let body = get_json(&app, &format!("/?newbox={key}&tempId=1&x=50&y=60")).await;
    assert_eq!(body["status"], "fail");
    assert_eq!(body["reason"], "incorrect page type");

    let body = get_json(&app, &format!("/?updatetype={key}&type=1")).await;
    assert_eq!(body["status"], "ok");

    let body = get_json(&app, &format!("/?newbox={key}&tempId=1&x=50&y=60")).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["tempId"], 1);
    assert_eq!(body["x"], 50);
    assert_eq!(body["y"], 60);
    let id = body["id"].as_i64().unwrap();

    let body = get_json(
        &app,
        &format!("/?updatebox={key}&id={id}&x=55&y=60&description=paper%20clips&amount=2"),
    )
    .await;
    assert_eq!(body["status"], "ok");

    let body = get_json(&app, &format!("/?edit={key}")).await;
    assert_eq!(body["boxes"][0]["description"], "paper clips");
    assert_eq!(body["boxes"][0]["amount"], 2);
    assert_eq!(body["boxes"][0]["x"], 55);
}

#[tokio::test]
async fn scan_lookup_locks_the_page_against_further_edits() {
    let app = app();
    let key = create_page(&app).await;
    get_json(&app, &format!("/?updatetype={key}&type=1")).await;
    get_json(&app, &format!("/?newbox={key}&tempId=1&x=42&y=63")).await;

    let body = get_json(&app, &format!("/?lookup={key}")).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["locked"], true);
    // Scan lookups report coordinates in local grid units.
    assert_eq!(body["boxes"][0]["x"], 200);
    assert_eq!(body["boxes"][0]["y"], 300);

    let body = get_json(&app, &format!("/?newbox={key}&tempId=2&x=80&y=80")).await;
    assert_eq!(body["status"], "fail");
    assert_eq!(body["reason"], "the page is locked");
}

#[tokio::test]
async fn audio_regions_are_accepted_on_locked_pages() {
    let app = app();
    let key = create_page(&app).await;
    get_json(&app, &format!("/?updatetype={key}&type=2")).await;
    get_json(&app, &format!("/?lookup={key}")).await;

    let body = get_json(
        &app,
        &format!("/?newaudio={key}&x=100&y=200&width=100&height=52&soundClipId=7"),
    )
    .await;
    assert_eq!(body["status"], "ok");

    let body = get_json(&app, &format!("/?edit={key}")).await;
    let area = &body["audioAreas"][0];
    assert_eq!(area["x"], 21);
    assert_eq!(area["y"], 42);
    assert_eq!(area["soundClipId"], 7);
}

#[tokio::test]
async fn duplicate_returns_the_copy_under_a_fresh_key() {
    let app = app();
    let key = create_page(&app).await;
    get_json(&app, &format!("/?updatetype={key}&type=1")).await;
    get_json(&app, &format!("/?newbox={key}&tempId=1&x=50&y=50")).await;
    get_json(&app, &format!("/?lookup={key}")).await;

    let body = get_json(&app, &format!("/?duplicate={key}")).await;
    assert_eq!(body["status"], "ok");
    let copy_key = body["pageKey"].as_str().unwrap();
    assert_ne!(copy_key, key);
    assert_eq!(body["locked"], false);
    assert_eq!(body["boxes"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn infrastructure_failures_are_masked() {
    let app = app();

    let body = get_json(&app, "/?").await;
    assert_eq!(body["status"], "fail");
    assert_eq!(body["reason"], "query error");

    let body = get_json(&app, "/?edit=not-a-key!").await;
    assert_eq!(body["reason"], "query error");

    // Domain failures stay verbatim.
    let body = get_json(&app, "/?edit=zzzz").await;
    assert_eq!(body["reason"], "page not found");

    let key = create_page(&app).await;
    let body = get_json(&app, &format!("/?updatedestination={key}&destination=x")).await;
    assert_eq!(body["reason"], "incorrect page type");
}

#[tokio::test]
async fn jsonp_wraps_the_payload_and_confirms_delivery() {
    let app = app();
    let key = create_page(&app).await;

    let (status, content_type, body) = get(
        &app,
        &format!("/?edit={key}&callback=app.done&success=app.ack&id=17"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "application/javascript");
    assert!(body.starts_with("app.ack(17);app.done({"));
    assert!(body.ends_with("});"));

    // An invalid callback falls back to plain JSON.
    let (_, content_type, body) = get(&app, &format!("/?edit={key}&callback=alert(1)")).await;
    assert_eq!(content_type, "application/json");
    assert!(body.starts_with('{'));
}
