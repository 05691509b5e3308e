//! Typed HTTP exceptions.
//!
//! An [`HttpException`] is an error that is also a complete response: it
//! knows its status, its stock description and how to render the toolkit's
//! default error page. Handlers return it through [`Outcome`] instead of
//! building error responses by hand:
//!
//! ```rust
//! use tsu_bridge::toolkit::{HttpException, Outcome, Response};
//!
//! fn find(id: u32) -> Outcome<Response> {
//!     if id == 42 {
//!         Ok(Response::new("found"))
//!     } else {
//!         Err(HttpException::not_found())
//!     }
//! }
//!
//! assert_eq!(find(7).unwrap_err().code().as_u16(), 404);
//! ```

use std::borrow::Cow;

use http::header::{ALLOW, CONTENT_TYPE, RETRY_AFTER, WWW_AUTHENTICATE};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use thiserror::Error;

use super::escape_html;
use super::response::Response;

/// Result of a handler that may fail with an HTTP error.
pub type Outcome<T> = Result<T, HttpException>;

/// An HTTP error that renders as the toolkit's stock error page.
#[derive(Clone, Debug, Error)]
#[error("{code}: {}", describe(.code, .description.as_deref()))]
pub struct HttpException {
    code: StatusCode,
    description: Option<Cow<'static, str>>,
    headers: HeaderMap,
}

/// Returns an `Err` carrying the exception for `code`.
///
/// ```rust
/// use http::StatusCode;
/// use tsu_bridge::toolkit::{Outcome, abort};
///
/// fn admin_only(is_admin: bool) -> Outcome<&'static str> {
///     if !is_admin {
///         return abort(StatusCode::FORBIDDEN);
///     }
///     Ok("welcome")
/// }
/// assert!(admin_only(false).is_err());
/// ```
pub fn abort<T>(code: StatusCode) -> Outcome<T> {
    Err(HttpException::new(code))
}

macro_rules! constructors {
    ($($(#[$meta:meta])* $name:ident => $code:ident,)*) => {
        $(
            $(#[$meta])*
            pub fn $name() -> Self {
                Self::new(StatusCode::$code)
            }
        )*
    };
}

impl HttpException {
    pub fn new(code: StatusCode) -> Self {
        Self { code, description: None, headers: HeaderMap::new() }
    }

    constructors! {
        bad_request => BAD_REQUEST,
        forbidden => FORBIDDEN,
        not_found => NOT_FOUND,
        not_acceptable => NOT_ACCEPTABLE,
        request_timeout => REQUEST_TIMEOUT,
        conflict => CONFLICT,
        gone => GONE,
        length_required => LENGTH_REQUIRED,
        precondition_failed => PRECONDITION_FAILED,
        payload_too_large => PAYLOAD_TOO_LARGE,
        uri_too_long => URI_TOO_LONG,
        unsupported_media_type => UNSUPPORTED_MEDIA_TYPE,
        range_not_satisfiable => RANGE_NOT_SATISFIABLE,
        expectation_failed => EXPECTATION_FAILED,
        im_a_teapot => IM_A_TEAPOT,
        unprocessable_entity => UNPROCESSABLE_ENTITY,
        locked => LOCKED,
        failed_dependency => FAILED_DEPENDENCY,
        precondition_required => PRECONDITION_REQUIRED,
        request_header_fields_too_large => REQUEST_HEADER_FIELDS_TOO_LARGE,
        unavailable_for_legal_reasons => UNAVAILABLE_FOR_LEGAL_REASONS,
        internal_server_error => INTERNAL_SERVER_ERROR,
        not_implemented => NOT_IMPLEMENTED,
        bad_gateway => BAD_GATEWAY,
        service_unavailable => SERVICE_UNAVAILABLE,
        gateway_timeout => GATEWAY_TIMEOUT,
        http_version_not_supported => HTTP_VERSION_NOT_SUPPORTED,
    }

    /// `401 Unauthorized`, optionally with a `WWW-Authenticate` challenge.
    pub fn unauthorized(challenge: Option<&str>) -> Self {
        let exc = Self::new(StatusCode::UNAUTHORIZED);
        match challenge.and_then(|c| HeaderValue::from_str(c).ok()) {
            Some(value) => exc.with_header(WWW_AUTHENTICATE, value),
            None => exc,
        }
    }

    /// `405 Method Not Allowed` listing the valid methods in `Allow`.
    pub fn method_not_allowed<I, M>(valid: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: AsRef<str>,
    {
        let allow = valid.into_iter().map(|m| m.as_ref().to_owned()).collect::<Vec<_>>().join(", ");
        let exc = Self::new(StatusCode::METHOD_NOT_ALLOWED);
        match HeaderValue::from_str(&allow) {
            Ok(value) if !allow.is_empty() => exc.with_header(ALLOW, value),
            _ => exc,
        }
    }

    /// `429 Too Many Requests`, optionally with `Retry-After` in seconds.
    pub fn too_many_requests(retry_after: Option<u64>) -> Self {
        let exc = Self::new(StatusCode::TOO_MANY_REQUESTS);
        match retry_after {
            Some(secs) => exc.with_retry_after(secs),
            None => exc,
        }
    }

    /// Replaces the stock description. The text is HTML-escaped on render.
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_retry_after(self, secs: u64) -> Self {
        self.with_header(RETRY_AFTER, HeaderValue::from(secs))
    }

    pub fn code(&self) -> StatusCode {
        self.code
    }

    /// The reason phrase, e.g. `Not Found`.
    pub fn name(&self) -> &'static str {
        self.code.canonical_reason().unwrap_or("Unknown Error")
    }

    /// The custom description if one was set, else the stock text.
    pub fn description(&self) -> &str {
        describe(&self.code, self.description.as_deref())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The stock HTML error page.
    pub fn body(&self) -> String {
        let description = match &self.description {
            Some(custom) => escape_html(custom),
            None => stock_description(self.code).to_owned(),
        };
        format!(
            "<!doctype html>\n<html lang=en>\n<title>{code} {name}</title>\n<h1>{name}</h1>\n<p>{description}</p>\n",
            code = self.code.as_u16(),
            name = self.name(),
        )
    }

    /// Renders the exception as a toolkit response: the stock page, an HTML
    /// content type, and any extra headers.
    pub fn to_response(&self) -> Response {
        let mut res = Response::new(self.body())
            .with_status(self.code)
            .with_header(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        for (name, value) in &self.headers {
            res.headers_mut().append(name, value.clone());
        }
        res
    }
}

fn describe<'a>(code: &StatusCode, custom: Option<&'a str>) -> &'a str {
    custom.unwrap_or_else(|| stock_description(*code))
}

fn stock_description(code: StatusCode) -> &'static str {
    match code.as_u16() {
        400 => "The browser (or proxy) sent a request that this server could not understand.",
        401 => "The server could not verify that you are authorized to access the URL requested. You either supplied the wrong credentials (e.g. a bad password), or your browser doesn't understand how to supply the credentials required.",
        403 => "You don't have the permission to access the requested resource. It is either read-protected or not readable by the server.",
        404 => "The requested URL was not found on the server. If you entered the URL manually please check your spelling and try again.",
        405 => "The method is not allowed for the requested URL.",
        406 => "The resource identified by the request is only capable of generating response entities which have content characteristics not acceptable according to the accept headers sent in the request.",
        408 => "The server closed the network connection because the browser didn't finish the request within the specified time.",
        409 => "A conflict happened while processing the request. The resource might have been modified while the request was being processed.",
        410 => "The requested URL is no longer available on this server and there is no forwarding address. If you followed a link from a foreign page, please contact the author of this page.",
        411 => "A request with this method requires a valid <code>Content-Length</code> header.",
        412 => "The precondition on the request for the URL failed positive evaluation.",
        413 => "The data value transmitted exceeds the capacity limit.",
        414 => "The length of the requested URL exceeds the capacity limit for this server. The request cannot be processed.",
        415 => "The server does not support the media type transmitted in the request.",
        416 => "The server cannot provide the requested range.",
        417 => "The server could not meet the requirements of the Expect header",
        418 => "This server is a teapot, not a coffee machine",
        422 => "The request was well-formed but was unable to be followed due to semantic errors.",
        423 => "The resource that is being accessed is locked.",
        424 => "The method could not be performed on the resource because the requested action depended on another action and that action failed.",
        428 => "This request is required to be conditional; try using \"If-Match\" or \"If-Unmodified-Since\".",
        429 => "This user has exceeded an allotted request count. Try again later.",
        431 => "One or more header fields exceeds the maximum size.",
        451 => "Unavailable for legal reasons.",
        500 => "The server encountered an internal error and was unable to complete your request. Either the server is overloaded or there is an error in the application.",
        501 => "The server does not support the action requested by the browser.",
        502 => "The proxy server received an invalid response from an upstream server.",
        503 => "The server is temporarily unable to service your request due to maintenance downtime or capacity problems. Please try again later.",
        504 => "The connection to an upstream server timed out.",
        505 => "The server does not support the HTTP protocol version used in the request.",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_renders_stock_page() {
        let exc = HttpException::not_found();
        assert_eq!(exc.code(), StatusCode::NOT_FOUND);
        assert_eq!(exc.name(), "Not Found");
        assert_eq!(
            exc.body(),
            "<!doctype html>\n<html lang=en>\n<title>404 Not Found</title>\n<h1>Not Found</h1>\n\
             <p>The requested URL was not found on the server. If you entered the URL manually please check your spelling and try again.</p>\n"
        );
        assert!(exc.to_string().starts_with("404 Not Found: The requested URL"));
    }

    #[test]
    fn custom_descriptions_are_escaped() {
        let exc = HttpException::bad_request().with_description("missing <id>");
        assert_eq!(exc.description(), "missing <id>");
        assert!(exc.body().contains("<p>missing &lt;id&gt;</p>"));
    }

    #[test]
    fn extra_headers_reach_the_response() {
        let res = HttpException::method_not_allowed(["GET", "HEAD"]).to_response();
        assert_eq!(res.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.headers()[ALLOW], "GET, HEAD");
        assert_eq!(res.mimetype(), Some("text/html"));

        let limited = HttpException::too_many_requests(Some(30)).to_response();
        assert_eq!(limited.headers()[RETRY_AFTER], "30");

        let auth = HttpException::unauthorized(Some("Basic realm=\"api\""));
        assert_eq!(auth.headers()[WWW_AUTHENTICATE], "Basic realm=\"api\"");
    }

    #[test]
    fn abort_yields_err() {
        let out: Outcome<()> = abort(StatusCode::IM_A_TEAPOT);
        let exc = out.unwrap_err();
        assert_eq!(exc.description(), "This server is a teapot, not a coffee machine");
    }
}
