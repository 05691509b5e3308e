//! The toolkit bridge plugin.
//!
//! [`ToolkitPlugin`] lets route handlers work with the
//! [`toolkit`](crate::toolkit) instead of the host's bare types:
//!
//! - every call gets a fresh toolkit request and response object built from
//!   its environment, reachable through [`ToolkitPlugin::request`] and
//!   [`ToolkitPlugin::response`] without threading them through arguments;
//! - handlers may return toolkit [`Response`]s, [`HttpException`]s or an
//!   [`Outcome`], all of which convert into the host response with the same
//!   status, headers and body bytes;
//! - the [`Debugger`] is installed around the dispatch entry point and
//!   follows the process-wide debug flag.
//!
//! ```rust,no_run
//! use tsu_bridge::bridge::{HttpException, Response, ToolkitPlugin};
//! use tsu_bridge::{Request as HostRequest, Router};
//!
//! let toolkit = ToolkitPlugin::new();
//! let req = toolkit.request();
//!
//! let router = Router::new()
//!     .get("/hello/{name}", move |host: HostRequest| {
//!         let req = req.clone();
//!         async move {
//!             let greet = [("en", "Hello"), ("de", "Hallo"), ("fr", "Bonjour")];
//!             let langs = req.with(|r| r.accept_languages())?;
//!             let name = host.param("name").unwrap_or("stranger");
//!             match langs.best_match(greet.iter().map(|(l, _)| *l)) {
//!                 Some(lang) => {
//!                     let word = greet.iter().find(|(l, _)| *l == lang).map_or("Hello", |(_, w)| *w);
//!                     Ok(Response::new(format!("{word} {name}!")))
//!                 }
//!                 None => Err(HttpException::not_acceptable()),
//!             }
//!         }
//!     })
//!     .install(toolkit);
//! ```

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::plugin::{Plugin, RouteContext};
use crate::request::Request as HostRequest;
use crate::response::{IntoResponse, Response as HostResponse};
use crate::router::Router;

pub use crate::toolkit::exceptions;
pub use crate::toolkit::{
    Accept, Debugger, DebuggerFactory, FromEnviron, HttpException, Outcome, Request, Response,
    abort,
};

const NAME: &str = "toolkit";

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

// ── Request-local storage ─────────────────────────────────────────────────────

tokio::task_local! {
    static BOUND: Bindings;
}

/// The objects bound for one call, per plugin instance. Each one sits in
/// its own `RwLock`.
#[derive(Clone)]
struct Slot {
    request: Arc<dyn Any + Send + Sync>,
    response: Arc<dyn Any + Send + Sync>,
}

#[derive(Clone, Copy, Debug)]
enum Which {
    Request,
    Response,
}

/// Immutable per scope. Entering a nested scope copies the map and
/// overwrites this plugin's entry.
#[derive(Clone, Default)]
struct Bindings(Arc<HashMap<u64, Slot>>);

impl Bindings {
    fn current() -> Self {
        BOUND.try_with(Clone::clone).unwrap_or_default()
    }

    fn bind(&self, plugin: u64, slot: Slot) -> Self {
        let mut map = (*self.0).clone();
        map.insert(plugin, slot);
        Self(Arc::new(map))
    }

    fn lookup(&self, plugin: u64, which: Which) -> Option<Arc<dyn Any + Send + Sync>> {
        let slot = self.0.get(&plugin)?;
        Some(match which {
            Which::Request => Arc::clone(&slot.request),
            Which::Response => Arc::clone(&slot.response),
        })
    }
}

/// A handle that resolves to the object bound for the current request each
/// time it is dereferenced.
///
/// Cheap to clone and `Send`, so it can be moved into handlers and held
/// across `.await`s. It only resolves inside a call handled by the plugin
/// that issued it, on the task running that call; anywhere else it returns
/// [`Error::OutsideRequest`].
pub struct LocalProxy<T> {
    plugin: u64,
    which: Which,
    _type: PhantomData<fn() -> T>,
}

impl<T> Clone for LocalProxy<T> {
    fn clone(&self) -> Self {
        Self { plugin: self.plugin, which: self.which, _type: PhantomData }
    }
}

impl<T> std::fmt::Debug for LocalProxy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalProxy")
            .field("plugin", &self.plugin)
            .field("which", &self.which)
            .field("type", &type_name::<T>())
            .finish()
    }
}

impl<T: Send + Sync + 'static> LocalProxy<T> {
    fn new(plugin: u64, which: Which) -> Self {
        Self { plugin, which, _type: PhantomData }
    }

    fn cell(&self) -> Result<Arc<RwLock<T>>, Error> {
        let value = BOUND
            .try_with(|b| b.lookup(self.plugin, self.which))
            .ok()
            .flatten()
            .ok_or(Error::OutsideRequest { plugin: NAME })?;
        value
            .downcast::<RwLock<T>>()
            .map_err(|_| Error::ContextType { plugin: NAME, expected: type_name::<T>() })
    }

    /// Whether an object is bound for the current request.
    pub fn is_bound(&self) -> bool {
        self.cell().is_ok()
    }

    /// Shared access to the bound object. Nested `with` calls on the same
    /// proxy are fine; a `with_mut` inside a `with` deadlocks.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, Error> {
        let cell = self.cell()?;
        let guard = cell.read_recursive();
        Ok(f(&*guard))
    }

    /// Exclusive access to the bound object.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R, Error> {
        let cell = self.cell()?;
        let mut guard = cell.write();
        Ok(f(&mut *guard))
    }
}

impl<T: Clone + Send + Sync + 'static> LocalProxy<T> {
    /// A copy of the object bound for the current request.
    pub fn get(&self) -> Result<T, Error> {
        self.with(T::clone)
    }
}

/// A proxy failing outside a request is a server-side bug: a plain 500.
impl IntoResponse for Error {
    fn into_response(self) -> HostResponse {
        tracing::error!(error = %self, "handler failed");
        HostResponse::status(http::StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<Error> for HttpException {
    fn from(e: Error) -> Self {
        tracing::error!(error = %e, "handler failed");
        HttpException::internal_server_error()
    }
}

// ── Plugin ────────────────────────────────────────────────────────────────────

/// Adapts the toolkit onto the host's plugin hook.
///
/// `Q` and `S` are the request and response types built for every call.
pub struct ToolkitPlugin<Q = Request, S = Response> {
    id: u64,
    evalex: bool,
    debugger: Option<Arc<dyn DebuggerFactory>>,
    app: Arc<OnceLock<String>>,
    _types: PhantomData<fn() -> (Q, S)>,
}

impl<Q, S> Clone for ToolkitPlugin<Q, S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            evalex: self.evalex,
            debugger: self.debugger.clone(),
            app: Arc::clone(&self.app),
            _types: PhantomData,
        }
    }
}

impl ToolkitPlugin {
    /// Stock request and response types, the stock [`Debugger`], evalex off.
    pub fn new() -> Self {
        Self::with_types()
    }
}

impl Default for ToolkitPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q: FromEnviron, S: FromEnviron> ToolkitPlugin<Q, S> {
    /// Like [`ToolkitPlugin::new`] with application-chosen request and
    /// response types.
    pub fn with_types() -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            evalex: false,
            debugger: Some(Arc::new(Debugger)),
            app: Arc::new(OnceLock::new()),
            _types: PhantomData,
        }
    }

    /// Let the debugger expose request internals on its pages. Off by
    /// default; never enable it on a reachable deployment.
    pub fn evalex(mut self, on: bool) -> Self {
        self.evalex = on;
        self
    }

    /// Substitute the debug middleware.
    pub fn debugger(mut self, factory: impl DebuggerFactory) -> Self {
        self.debugger = Some(Arc::new(factory));
        self
    }

    /// Do not wrap the dispatch entry point at all.
    pub fn without_debugger(mut self) -> Self {
        self.debugger = None;
        self
    }

    pub fn evalex_enabled(&self) -> bool {
        self.evalex
    }

    pub fn has_debugger(&self) -> bool {
        self.debugger.is_some()
    }

    /// Name of the application this plugin was installed on.
    pub fn app(&self) -> Option<&str> {
        self.app.get().map(String::as_str)
    }

    /// Proxy to the request object of the current call.
    pub fn request(&self) -> LocalProxy<Q> {
        LocalProxy::new(self.id, Which::Request)
    }

    /// Proxy to the response object of the current call.
    pub fn response(&self) -> LocalProxy<S> {
        LocalProxy::new(self.id, Which::Response)
    }
}

impl<Q: FromEnviron, S: FromEnviron> Plugin for ToolkitPlugin<Q, S> {
    fn name(&self) -> &'static str {
        NAME
    }

    fn setup(&self, app: &mut Router) {
        if self.app.set(app.name().to_owned()).is_err() {
            warn!(plugin = NAME, app = app.name(), "setup called again on the same plugin instance; layers are registered again");
        }

        if let Some(factory) = &self.debugger {
            let factory = Arc::clone(factory);
            let evalex = self.evalex;
            if evalex {
                warn!(plugin = NAME, "evalex is on: debug pages expose the request environment");
            }
            app.wrap_dispatch(move |inner| factory.wrap(inner, evalex));
            // Error presentation belongs to the debug layer from here on.
            app.set_catchall(false);
        }
    }

    fn apply(&self, callback: BoxedHandler, context: &RouteContext) -> BoxedHandler {
        debug!(plugin = NAME, method = %context.method, path = %context.path, "wrapping route");
        Arc::new(BoundHandler::<Q, S> { plugin: self.id, callback, _types: PhantomData })
    }
}

/// Binds fresh toolkit objects around every call of `callback`.
struct BoundHandler<Q, S> {
    plugin: u64,
    callback: BoxedHandler,
    _types: PhantomData<fn() -> (Q, S)>,
}

impl<Q: FromEnviron, S: FromEnviron> ErasedHandler for BoundHandler<Q, S> {
    fn call(&self, req: HostRequest) -> BoxFuture {
        let slot = Slot {
            request: Arc::new(RwLock::new(Q::from_environ(req.environ()))),
            response: Arc::new(RwLock::new(S::from_environ(req.environ()))),
        };
        let bindings = Bindings::current().bind(self.plugin, slot);

        // The callback may do work before returning its future, so that runs
        // inside the scope as well.
        let fut = BOUND.sync_scope(bindings.clone(), || self.callback.call(req));
        Box::pin(BOUND.scope(bindings, fut))
    }
}

// ── Conversions into the host envelope ────────────────────────────────────────

/// Copies status, headers and encoded body chunks of a toolkit response into
/// a host response. The host envelope holds header values as UTF-8 text, so
/// values that are not UTF-8 are dropped with a warning.
pub fn translate(res: &Response) -> HostResponse {
    let headers = res.headers().iter().filter_map(|(name, value)| {
        match std::str::from_utf8(value.as_bytes()) {
            Ok(v) => Some((name.as_str().to_owned(), v.to_owned())),
            Err(_) => {
                warn!(plugin = NAME, header = %name, "dropping non-UTF-8 response header value");
                None
            }
        }
    });
    HostResponse::from_parts(res.status_code(), headers, res.iter_encoded())
}

impl IntoResponse for Response {
    fn into_response(self) -> HostResponse {
        translate(&self)
    }
}

impl IntoResponse for HttpException {
    fn into_response(self) -> HostResponse {
        translate(&self.to_response())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Environ, PATH_INFO};

    fn call(handler: &BoxedHandler, path: &str) -> BoxFuture {
        handler.call(HostRequest::from_environ(Environ::new().with(PATH_INFO, path)))
    }

    #[tokio::test]
    async fn binds_fresh_objects_per_call_and_clears_after() {
        let plugin = ToolkitPlugin::new();
        let req = plugin.request();
        let seen = req.clone();
        let inner = crate::handler::boxed(move |_host: HostRequest| {
            let seen = seen.clone();
            async move {
                tokio::task::yield_now().await;
                seen.with(|r| r.path().to_owned())
            }
        });
        let ctx = RouteContext {
            method: crate::Method::Get,
            path: "/{p}".to_owned(),
            app: "test".to_owned(),
        };
        let wrapped = plugin.apply(inner, &ctx);

        assert_eq!(call(&wrapped, "/first").await.body(), b"/first");
        assert_eq!(call(&wrapped, "/second").await.body(), b"/second");
        assert!(matches!(req.with(|_| ()), Err(Error::OutsideRequest { .. })));
        assert!(!req.is_bound());
    }

    #[tokio::test]
    async fn proxies_of_other_instances_stay_unbound() {
        let a = ToolkitPlugin::new();
        let b = ToolkitPlugin::new();
        let a_req = a.request();
        let b_req = b.request();
        let ctx = RouteContext {
            method: crate::Method::Get,
            path: "/".to_owned(),
            app: "test".to_owned(),
        };
        let inner = crate::handler::boxed(move |_host: HostRequest| {
            let (a_req, b_req) = (a_req.clone(), b_req.clone());
            async move { format!("{} {}", a_req.is_bound(), b_req.is_bound()) }
        });
        let wrapped = a.apply(inner, &ctx);
        assert_eq!(call(&wrapped, "/").await.body(), b"true false");
    }

    #[tokio::test]
    async fn response_proxy_is_mutable_within_the_call() {
        let plugin = ToolkitPlugin::new();
        let res = plugin.response();
        let ctx = RouteContext {
            method: crate::Method::Get,
            path: "/".to_owned(),
            app: "test".to_owned(),
        };
        let inner = crate::handler::boxed(move |_host: HostRequest| {
            let res = res.clone();
            async move {
                res.with_mut(|r| r.append_chunk("built via proxy"))?;
                res.get()
            }
        });
        let out = call(&plugin.apply(inner, &ctx), "/").await;
        assert_eq!(out.body(), b"built via proxy");
        assert_eq!(out.header("content-type"), Some("text/plain; charset=utf-8"));
    }

    #[test]
    fn translate_copies_status_headers_and_chunks() {
        let mut res = Response::new("a").with_status(http::StatusCode::ACCEPTED);
        res.append_chunk("b");
        res.set_cookie("k", "v").unwrap();
        let host = translate(&res);
        assert_eq!(host.status_code(), http::StatusCode::ACCEPTED);
        assert_eq!(host.body(), b"ab");
        assert_eq!(host.header("set-cookie"), Some("k=v; Path=/"));
    }

    #[test]
    fn translate_keeps_utf8_header_values() {
        let res = Response::new("x").with_header(
            http::header::CONTENT_DISPOSITION,
            http::HeaderValue::from_bytes("attachment; filename=\"café.txt\"".as_bytes()).unwrap(),
        );
        let host = translate(&res);
        assert_eq!(host.header("content-disposition"), Some("attachment; filename=\"café.txt\""));
    }

    #[test]
    fn translate_drops_values_that_are_not_utf8() {
        let res = Response::new("x")
            .with_header(http::HeaderName::from_static("x-raw"), http::HeaderValue::from_bytes(b"\xff\xfe").unwrap());
        let host = translate(&res);
        assert_eq!(host.header("x-raw"), None);
        assert_eq!(host.header("content-type"), Some("text/plain; charset=utf-8"));
    }

    #[test]
    fn construction_defaults_and_builders() {
        let plugin = ToolkitPlugin::new();
        assert!(plugin.has_debugger());
        assert!(!plugin.evalex_enabled());
        assert_eq!(plugin.app(), None);

        let plugin = plugin.evalex(true).without_debugger();
        assert!(plugin.evalex_enabled());
        assert!(!plugin.has_debugger());
    }

    #[test]
    fn setup_without_debugger_leaves_catchall_alone() {
        let mut router = Router::named("plain");
        let plugin = ToolkitPlugin::new().without_debugger();
        plugin.setup(&mut router);
        assert!(router.catchall());
        assert_eq!(plugin.app(), Some("plain"));
    }

    #[test]
    fn setup_with_debugger_turns_catchall_off() {
        let mut router = Router::named("debugged");
        ToolkitPlugin::new().setup(&mut router);
        assert!(!router.catchall());
    }
}
