//! # tsu-bridge
//!
//! A minimal HTTP framework for Rust services, plus a plugin that lets its
//! route handlers use a richer request/response toolkit.
//!
//! The framework half is small on purpose: radix-tree routing via
//! [`matchit`], hyper-based serving with graceful shutdown, and a plugin hook
//! ([`Plugin`]) with a `setup` step at install time and an `apply` step that
//! wraps every route handler.
//!
//! The toolkit half ([`toolkit`]) brings request objects with parsed
//! arguments, cookies and content negotiation, chunked response objects,
//! typed HTTP exceptions that render as error pages, and a debug middleware.
//! [`bridge::ToolkitPlugin`] glues the two together.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tsu_bridge::bridge::{HttpException, Outcome, Response, ToolkitPlugin};
//! use tsu_bridge::{Request, Router, Server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let app = Router::new()
//!         .get("/users/{id}", get_user)
//!         .install(ToolkitPlugin::new());
//!
//!     Server::bind("0.0.0.0:3000").unwrap().serve(app).await.unwrap();
//! }
//!
//! async fn get_user(req: Request) -> Outcome<Response> {
//!     match req.param("id") {
//!         Some("42") => Ok(Response::new("alice")),
//!         _ => Err(HttpException::not_found()),
//!     }
//! }
//! ```

mod app;
mod error;
mod handler;
mod method;
mod plugin;
mod request;
mod response;
mod router;
mod server;

pub mod bridge;
pub mod config;
pub mod debug;
pub mod health;
pub mod toolkit;

pub use app::App;
pub use config::Config;
pub use error::{Error, Result};
pub use handler::{BoxFuture, BoxedHandler, ErasedHandler, Handler, boxed};
pub use method::Method;
pub use plugin::{PLUGIN_API, Plugin, RouteContext};
pub use request::{Environ, Request};
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::{DispatchLayer, Router};
pub use server::Server;

/// Environment keys used in [`Environ`].
pub mod environ {
    pub use crate::request::{
        CONTENT_LENGTH, CONTENT_TYPE, PATH_INFO, QUERY_STRING, REMOTE_ADDR, REQUEST_METHOD,
        SERVER_PROTOCOL,
    };
}
