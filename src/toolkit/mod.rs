//! The rich web toolkit: request/response value objects, a typed HTTP
//! exception hierarchy, and a debug middleware.
//!
//! None of it depends on routing. Every type here is built from an
//! [`Environ`] and can be used on its own; [`crate::bridge`] is what plugs
//! it into route handlers.
//!
//! ```rust
//! use tsu_bridge::Environ;
//! use tsu_bridge::toolkit::{FromEnviron, Request};
//!
//! let env = Environ::new()
//!     .with("PATH_INFO", "/search")
//!     .with("QUERY_STRING", "q=rust&page=2");
//! let req = Request::from_environ(&env);
//! assert_eq!(req.arg("q"), Some("rust"));
//! ```

pub mod debug;
pub mod exceptions;
pub mod request;
pub mod response;

pub use debug::{Debugger, DebuggerFactory};
pub use exceptions::{HttpException, Outcome, abort};
pub use request::{Accept, Request};
pub use response::Response;

use crate::request::Environ;

/// Types that can be built fresh from one call's environment.
///
/// The bridge plugin constructs its request and response objects through
/// this trait, so either can be swapped for an application type.
pub trait FromEnviron: Send + Sync + 'static {
    fn from_environ(environ: &Environ) -> Self;
}

/// Minimal HTML escaping for text interpolated into toolkit pages.
pub(crate) fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::escape_html;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#x27;");
        assert_eq!(escape_html("plain"), "plain");
    }
}
