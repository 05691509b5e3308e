//! Debug middleware that renders panics as a traceback page.
//!
//! [`Debugger`] wraps the dispatch entry point. It obeys the process-wide
//! [`debug`](crate::debug) flag on every call: with the flag off it is a
//! plain pass-through; with it on, a panic anywhere below it becomes a
//! `500` HTML page with the panic message, where it happened and a
//! backtrace.
//!
//! Route dispatch only lets panics through when the router's catch-all is
//! off, which the bridge plugin arranges in its `setup`.

use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Once};

use futures::FutureExt;
use http::StatusCode;
use tracing::error;

use super::escape_html;
use crate::app::panic_message;
use crate::handler::{BoxFuture, BoxedHandler, ErasedHandler};
use crate::request::{Environ, Request};
use crate::response::{ContentType, Response};

/// Builds the debug layer around a dispatch entry point.
///
/// Implement this to substitute your own debug middleware for [`Debugger`].
pub trait DebuggerFactory: Send + Sync + 'static {
    /// `evalex` asks the debugger to expose request internals on its pages.
    fn wrap(&self, inner: BoxedHandler, evalex: bool) -> BoxedHandler;
}

/// The stock debug middleware.
#[derive(Clone, Copy, Debug, Default)]
pub struct Debugger;

impl DebuggerFactory for Debugger {
    fn wrap(&self, inner: BoxedHandler, evalex: bool) -> BoxedHandler {
        Arc::new(DebuggedApp { inner, evalex })
    }
}

struct DebuggedApp {
    inner: BoxedHandler,
    evalex: bool,
}

impl ErasedHandler for DebuggedApp {
    fn call(&self, req: Request) -> BoxFuture {
        if !crate::debug::enabled() {
            return self.inner.call(req);
        }

        install_panic_hook();
        let environ = req.environ().clone();
        let evalex = self.evalex;
        let fut = self.inner.call(req);
        Box::pin(async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(response) => response,
                Err(payload) => {
                    let report = PanicReport {
                        message: panic_message(payload.as_ref()),
                        ..LAST_PANIC.with(|last| last.borrow_mut().take()).unwrap_or_default()
                    };
                    error!(
                        panic = %report.message,
                        location = report.location.as_deref().unwrap_or("unknown"),
                        "serving debug traceback page"
                    );
                    Response::builder()
                        .status(StatusCode::INTERNAL_SERVER_ERROR)
                        .bytes(ContentType::Html, render_page(&report, &environ, evalex).into_bytes())
                }
            }
        })
    }
}

// ── Panic capture ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct PanicReport {
    message: String,
    location: Option<String>,
    backtrace: String,
}

thread_local! {
    // Unwinding is synchronous within one poll, so the hook and the
    // `catch_unwind` that observes the panic run on the same thread.
    static LAST_PANIC: RefCell<Option<PanicReport>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// Chains a hook that records location and backtrace of each panic on the
/// panicking thread while debug mode is on. The previous hook still runs.
fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            record_panic(info.location().map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column())));
            previous(info);
        }));
    });
}

fn record_panic(location: Option<String>) {
    if !crate::debug::enabled() {
        return;
    }
    let report = PanicReport {
        message: String::new(),
        location,
        backtrace: Backtrace::force_capture().to_string(),
    };
    LAST_PANIC.with(|last| *last.borrow_mut() = Some(report));
}

// ── Page ──────────────────────────────────────────────────────────────────────

fn render_page(report: &PanicReport, environ: &Environ, evalex: bool) -> String {
    let method = environ.get(crate::request::REQUEST_METHOD).unwrap_or("?");
    let path = environ.get(crate::request::PATH_INFO).unwrap_or("?");
    let message = escape_html(&report.message);

    let mut page = format!(
        "<!doctype html>\n<html lang=en>\n<title>{message} // tsu debugger</title>\n\
         <h1>Panic in request handler</h1>\n\
         <p class=request><code>{method} {path}</code></p>\n\
         <div class=panic>\n<p class=errormsg>{message}</p>\n<p class=location>at {location}</p>\n</div>\n\
         <h2>Traceback <em>(most recent call first)</em></h2>\n<pre class=traceback>{backtrace}</pre>\n",
        method = escape_html(method),
        path = escape_html(path),
        location = escape_html(report.location.as_deref().unwrap_or("unknown location")),
        backtrace = escape_html(&report.backtrace),
    );

    if evalex {
        page.push_str("<h2>Request environment</h2>\n<table class=environ>\n");
        for (key, value) in environ.iter() {
            page.push_str(&format!(
                "<tr><th>{}</th><td>{}</td></tr>\n",
                escape_html(key),
                escape_html(value)
            ));
        }
        page.push_str(&format!(
            "<tr><th>body</th><td>{} bytes</td></tr>\n</table>\n",
            environ.body().len()
        ));
    }

    page.push_str("<footer>Served by the tsu debugger because debug mode is on.</footer>\n");
    page
}
