//! Request router and application builder.
//!
//! One radix tree per HTTP method, O(path-length) lookup. The router is a
//! builder: register routes, install plugins, then hand it to
//! [`Server::serve`](crate::Server::serve) or freeze it yourself with
//! [`Router::into_app`].

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;
use tracing::{debug, warn};

use crate::app::{App, RouteDispatch};
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::plugin::{PLUGIN_API, Plugin, RouteContext};

/// A layer around the low-level dispatch entry point.
pub type DispatchLayer = Box<dyn Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static>;

/// The application router.
///
/// Each registration returns `self` so calls chain naturally.
pub struct Router {
    name: String,
    routes: Vec<(Method, String, BoxedHandler)>,
    plugins: Vec<Arc<dyn Plugin>>,
    layers: Vec<DispatchLayer>,
    catchall: bool,
}

impl Router {
    pub fn new() -> Self {
        Self::named("tsu")
    }

    /// A router whose application name shows up in logs and in
    /// [`RouteContext::app`].
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            routes: Vec::new(),
            plugins: Vec::new(),
            layers: Vec::new(),
            catchall: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a handler for a method + path pair. Returns `self` for chaining.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them:
    ///
    /// ```rust,no_run
    /// # use tsu_bridge::{Method, Request, Response, Router};
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// # async fn create_user(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::Get,  "/users/{id}", get_user)
    ///     .on(Method::Post, "/users",      create_user);
    /// ```
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.routes.push((method, path.to_owned(), handler.into_boxed_handler()));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Get, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Post, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Put, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Delete, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Patch, path, handler)
    }

    /// Installs a plugin: runs its [`setup`](Plugin::setup) now and its
    /// [`apply`](Plugin::apply) on every route at freeze time.
    pub fn install(mut self, plugin: impl Plugin) -> Self {
        if plugin.api() != PLUGIN_API {
            warn!(
                plugin = plugin.name(),
                api = plugin.api(),
                expected = PLUGIN_API,
                "plugin targets a different plugin API version"
            );
        }
        plugin.setup(&mut self);
        debug!(app = %self.name, plugin = plugin.name(), "plugin installed");
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// Wraps the low-level dispatch entry point. Layers apply in registration
    /// order, so a later layer sees every call before an earlier one.
    pub fn wrap_dispatch<F>(&mut self, layer: F)
    where
        F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
    {
        self.layers.push(Box::new(layer));
    }

    /// Whether route dispatch turns handler panics into a generic 500.
    pub fn catchall(&self) -> bool {
        self.catchall
    }

    pub fn set_catchall(&mut self, on: bool) {
        self.catchall = on;
    }

    /// Freezes the router: applies plugins to every route, builds the lookup
    /// trees, and wraps the dispatch entry point with every layer.
    ///
    /// # Panics
    ///
    /// Panics on an invalid or conflicting route pattern.
    pub fn into_app(self) -> App {
        let mut trees: HashMap<Method, MatchitRouter<BoxedHandler>> = HashMap::new();

        for (method, path, mut handler) in self.routes {
            let ctx = RouteContext { method, path, app: self.name.clone() };
            for plugin in self.plugins.iter().rev() {
                handler = plugin.apply(handler, &ctx);
            }
            trees
                .entry(method)
                .or_default()
                .insert(ctx.path.as_str(), handler)
                .unwrap_or_else(|e| panic!("invalid route `{}`: {e}", ctx.path));
        }

        let mut entry: BoxedHandler = Arc::new(RouteDispatch::new(trees, self.catchall));
        for layer in &self.layers {
            entry = layer(entry);
        }
        App::new(self.name, entry)
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}
