//! Frozen application and request dispatch.
//!
//! [`App::call`] is the low-level entry point: it turns one HTTP request into
//! one HTTP response and never fails. The server calls it per request; tests
//! call it directly with no sockets involved.

use std::any::Any;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;

use bytes::Bytes;
use futures::FutureExt;
use http::StatusCode;
use http_body_util::Full;
use matchit::Router as MatchitRouter;
use percent_encoding::percent_decode_str;
use tracing::{debug, error};

use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::method::Method;
use crate::request::{Environ, Request};
use crate::response::Response;

/// A router frozen for serving.
pub struct App {
    name: String,
    entry: BoxedHandler,
}

impl App {
    pub(crate) fn new(name: String, entry: BoxedHandler) -> Self {
        Self { name, entry }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handles one request end to end.
    ///
    /// A panic that escapes every dispatch layer is logged and answered with a
    /// bare `500 Internal Server Error`; the connection stays usable.
    pub async fn call(
        &self,
        req: http::Request<Bytes>,
        remote: Option<SocketAddr>,
    ) -> http::Response<Full<Bytes>> {
        let (parts, body) = req.into_parts();
        let environ = Environ::from_http(&parts, body, remote);
        debug!(app = %self.name, method = %parts.method, path = parts.uri.path(), "dispatch");

        let fut = self.entry.call(Request::from_environ(environ));
        let response = match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(response) => response,
            Err(panic) => {
                error!(
                    app = %self.name,
                    method = %parts.method,
                    path = parts.uri.path(),
                    panic = %panic_message(panic.as_ref()),
                    "unhandled panic in request dispatch"
                );
                Response::status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        };
        response.into_inner()
    }
}

// ── Route dispatch ────────────────────────────────────────────────────────────

/// The innermost dispatch entry: route lookup plus the catch-all.
pub(crate) struct RouteDispatch {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    catchall: bool,
}

impl RouteDispatch {
    pub(crate) fn new(routes: HashMap<Method, MatchitRouter<BoxedHandler>>, catchall: bool) -> Self {
        Self { routes, catchall }
    }

    fn lookup(&self, method: Method, path: &str) -> Option<(BoxedHandler, HashMap<String, String>)> {
        let matched = self.routes.get(&method)?.at(path).ok()?;
        // Matching runs on the raw path; parameter values are handed out decoded.
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), percent_decode_str(v).decode_utf8_lossy().into_owned()))
            .collect();
        Some((BoxedHandler::clone(matched.value), params))
    }

    /// Methods that do have a route for `path`, for the `allow` header.
    fn allowed(&self, path: &str) -> Vec<Method> {
        let mut methods: Vec<Method> = self.routes.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(m, _)| *m)
            .collect();
        methods.sort();
        methods
    }
}

impl ErasedHandler for RouteDispatch {
    fn call(&self, req: Request) -> BoxFuture {
        let Ok(method) = req.method().parse::<Method>() else {
            return Box::pin(async { Response::status(StatusCode::NOT_IMPLEMENTED) });
        };

        let Some((handler, params)) = self.lookup(method, req.path()) else {
            let allowed = self.allowed(req.path());
            let response = if allowed.is_empty() {
                Response::status(StatusCode::NOT_FOUND)
            } else {
                let allow = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
                Response::builder()
                    .status(StatusCode::METHOD_NOT_ALLOWED)
                    .header("allow", &allow)
                    .no_body()
            };
            return Box::pin(async move { response });
        };

        let req = Request::new(req.environ, params);
        if !self.catchall {
            return handler.call(req);
        }

        let method = req.method().to_owned();
        let path = req.path().to_owned();
        let fut = handler.call(req);
        Box::pin(async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(response) => response,
                Err(panic) => {
                    error!(%method, %path, panic = %panic_message(panic.as_ref()), "handler panicked");
                    Response::status(StatusCode::INTERNAL_SERVER_ERROR)
                }
            }
        })
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Router;
    use http_body_util::BodyExt;

    async fn get(app: &App, method: &str, uri: &str) -> (StatusCode, http::HeaderMap, Bytes) {
        let req = http::Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap();
        let res = app.call(req, None).await;
        let (parts, body) = res.into_parts();
        (parts.status, parts.headers, body.collect().await.unwrap().to_bytes())
    }

    async fn hello(req: Request) -> String {
        format!("hello {}", req.param("name").unwrap_or("?"))
    }

    async fn boom(_req: Request) -> Response {
        panic!("kaboom")
    }

    #[tokio::test]
    async fn routes_with_params() {
        let app = Router::new().get("/hello/{name}", hello).into_app();
        let (status, _, body) = get(&app, "GET", "/hello/bob").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "hello bob");
    }

    #[tokio::test]
    async fn params_are_percent_decoded() {
        let app = Router::new().get("/hello/{name}", hello).into_app();
        assert_eq!(get(&app, "GET", "/hello/J%C3%BCrgen").await.2, "hello Jürgen");
        assert_eq!(get(&app, "GET", "/hello/a%2Fb%20c").await.2, "hello a/b c");
    }

    #[tokio::test]
    async fn unknown_path_is_404_and_wrong_method_is_405() {
        let app = Router::new()
            .get("/hello/{name}", hello)
            .post("/hello/{name}", hello)
            .into_app();
        assert_eq!(get(&app, "GET", "/nope").await.0, StatusCode::NOT_FOUND);

        let (status, headers, _) = get(&app, "DELETE", "/hello/x").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(headers["allow"], "GET, POST");

        assert_eq!(get(&app, "BREW", "/hello/x").await.0, StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn catchall_turns_panics_into_500() {
        let app = Router::new().get("/boom", boom).into_app();
        let (status, _, body) = get(&app, "GET", "/boom").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn without_catchall_the_outer_guard_still_answers() {
        let mut router = Router::new().get("/boom", boom);
        router.set_catchall(false);
        let app = router.into_app();
        assert_eq!(get(&app, "GET", "/boom").await.0, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn dispatch_layers_wrap_in_registration_order() {
        use std::sync::Arc;

        struct Tag(&'static str, BoxedHandler);
        impl ErasedHandler for Tag {
            fn call(&self, req: Request) -> BoxFuture {
                let tag = self.0;
                let fut = self.1.call(req);
                Box::pin(async move {
                    let mut res = fut.await;
                    res.headers.push(("x-layer".to_owned(), tag.to_owned()));
                    res
                })
            }
        }

        let mut router = Router::new().get("/hello/{name}", hello);
        router.wrap_dispatch(|inner| Arc::new(Tag("first", inner)));
        router.wrap_dispatch(|inner| Arc::new(Tag("second", inner)));
        let app = router.into_app();

        let (_, headers, _) = get(&app, "GET", "/hello/x").await;
        let tags: Vec<_> = headers.get_all("x-layer").iter().map(|v| v.to_str().unwrap()).collect();
        assert_eq!(tags, ["first", "second"]);
    }
}
