//! Plugin contract.
//!
//! A plugin is installed once on a [`Router`] and then gets two chances to
//! change the application:
//!
//! 1. [`Plugin::setup`] runs immediately on install, with mutable access to
//!    the router. This is where a plugin wraps the dispatch entry point or
//!    flips router settings.
//! 2. [`Plugin::apply`] runs once per route when the router is frozen into an
//!    [`App`](crate::App). It receives the route's handler and returns the
//!    handler that will actually serve requests.
//!
//! Plugins apply in reverse install order, so the first plugin installed is
//! the outermost wrapper around every route.

use crate::handler::BoxedHandler;
use crate::method::Method;
use crate::router::Router;

/// Version of the plugin contract implemented by this crate.
pub const PLUGIN_API: u32 = 2;

/// Route metadata handed to [`Plugin::apply`].
#[derive(Clone, Debug)]
pub struct RouteContext {
    pub method: Method,
    /// The registered path pattern, e.g. `/users/{id}`.
    pub path: String,
    /// Name of the application the route belongs to.
    pub app: String,
}

pub trait Plugin: Send + Sync + 'static {
    /// Identifier used in logs.
    fn name(&self) -> &'static str;

    /// Plugin contract version this plugin was written against.
    fn api(&self) -> u32 {
        PLUGIN_API
    }

    /// Called once when the plugin is installed.
    fn setup(&self, _app: &mut Router) {}

    /// Wraps one route handler. Must preserve the calling convention: the
    /// returned handler receives the same request the wrapped one would have.
    fn apply(&self, callback: BoxedHandler, context: &RouteContext) -> BoxedHandler;
}
