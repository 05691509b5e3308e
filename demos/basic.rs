//! Minimal tsu-bridge example: toolkit responses, typed HTTP errors, the
//! request-local proxy, and the debug page.
//!
//! Run with:
//!   RUST_LOG=info TSU_DEBUG=1 cargo run --example basic
//!
//! Try:
//!   curl -H 'accept-language: de' http://localhost:3000/hello/ada
//!   curl -H 'accept-language: ja' http://localhost:3000/hello/ada   # 406 page
//!   curl http://localhost:3000/users/7                              # 404 page
//!   curl http://localhost:3000/crash                                # traceback when TSU_DEBUG=1
//!   curl http://localhost:3000/healthz

use tsu_bridge::bridge::{HttpException, LocalProxy, Outcome, Request as TkRequest, Response, ToolkitPlugin};
use tsu_bridge::{Config, Request, Router, Server, health};
use tracing_subscriber::EnvFilter;

const GREETINGS: [(&str, &str); 3] = [("en", "Hello"), ("de", "Hallo"), ("fr", "Bonjour")];

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    let toolkit = ToolkitPlugin::new();
    let req = toolkit.request();

    let app = Router::named("basic")
        .get("/hello/{name}", move |host: Request| say_hello(req.clone(), host))
        .get("/users/{id}", get_user)
        .get("/crash", crash)
        .get("/healthz", health::liveness)
        .get("/readyz", health::readiness)
        .install(toolkit);

    let server = Server::from_config(&config).expect("invalid TSU_ADDR");
    tracing::info!(addr = %server.addr(), debug = config.debug, "starting demo");
    server.serve(app).await.expect("server error");
}

async fn say_hello(req: LocalProxy<TkRequest>, host: Request) -> Outcome<Response> {
    let name = host.param("name").unwrap_or("stranger").to_owned();
    let langs = req.with(|r| r.accept_languages())?;
    let Some(lang) = langs.best_match(GREETINGS.iter().map(|(l, _)| *l)) else {
        return Err(HttpException::not_acceptable());
    };
    let word = GREETINGS.iter().find(|(l, _)| *l == lang).map_or("Hello", |(_, w)| *w);
    Ok(Response::new(format!("{word} {name}!")))
}

async fn get_user(req: Request) -> Outcome<Response> {
    match req.param("id") {
        Some("42") => Ok(Response::json(&serde_json::json!({"id": "42", "name": "alice"}))
            .map_err(|_| HttpException::internal_server_error())?),
        _ => Err(HttpException::not_found()),
    }
}

async fn crash(_req: Request) -> &'static str {
    let items: Vec<u32> = Vec::new();
    if items.is_empty() {
        panic!("nothing to show");
    }
    "unreachable"
}
