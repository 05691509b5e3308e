//! Debug-mode behaviour. The debug flag is process-wide, so every test here
//! holds `FLAG` for its whole run.

use bytes::Bytes;
use http::StatusCode;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use tsu_bridge::bridge::{HttpException, Outcome, ToolkitPlugin};
use tsu_bridge::{App, Request, Router, debug};

static FLAG: Mutex<()> = Mutex::new(());

async fn send(app: &App, uri: &str) -> (StatusCode, Option<String>, String) {
    let req = http::Request::builder()
        .uri(uri)
        .header("x-api-key", "hunter2")
        .body(Bytes::new())
        .unwrap();
    let (parts, body) = app.call(req, None).await.into_parts();
    let content_type = parts
        .headers
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_owned());
    let body = body.collect().await.unwrap().to_bytes();
    (parts.status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

async fn explode(_req: Request) -> &'static str {
    let items: Vec<&'static str> = Vec::new();
    match items.first() {
        Some(item) => *item,
        None => panic!("inventory is empty"),
    }
}

async fn missing(_req: Request) -> Outcome<&'static str> {
    Err(HttpException::not_found())
}

fn app(plugin: ToolkitPlugin) -> App {
    Router::new()
        .get("/explode", explode)
        .get("/missing", missing)
        .install(plugin)
        .into_app()
}

#[tokio::test]
async fn debug_on_renders_traceback_page() {
    let _guard = FLAG.lock();
    debug::set(true);

    let (status, content_type, body) = send(&app(ToolkitPlugin::new()), "/explode").await;
    debug::set(false);

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(content_type.as_deref(), Some("text/html; charset=utf-8"));
    assert!(body.contains("inventory is empty"));
    assert!(body.contains("Traceback"));
    assert!(body.contains("<code>GET /explode</code>"));
    assert!(body.contains("tests/debugger.rs"));
    assert!(!body.contains("hunter2"));
}

#[tokio::test]
async fn evalex_exposes_the_request_environment() {
    let _guard = FLAG.lock();
    debug::set(true);

    let (_, _, body) = send(&app(ToolkitPlugin::new().evalex(true)), "/explode").await;
    debug::set(false);

    assert!(body.contains("<th>HTTP_X_API_KEY</th><td>hunter2</td>"));
}

#[tokio::test]
async fn debug_off_yields_a_generic_500() {
    let _guard = FLAG.lock();
    debug::set(false);

    let (status, _, body) = send(&app(ToolkitPlugin::new()), "/explode").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.is_empty());
}

#[tokio::test]
async fn no_debugger_means_no_page_even_in_debug_mode() {
    let _guard = FLAG.lock();
    debug::set(true);

    let (status, _, body) = send(&app(ToolkitPlugin::new().without_debugger()), "/explode").await;
    debug::set(false);

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.is_empty());
}

#[tokio::test]
async fn http_exceptions_are_not_debugger_material() {
    let _guard = FLAG.lock();
    debug::set(true);

    let (status, _, body) = send(&app(ToolkitPlugin::new()), "/missing").await;
    debug::set(false);

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, HttpException::not_found().body());
}
