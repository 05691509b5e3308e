//! Incoming HTTP request type and its environment mapping.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;

use bytes::Bytes;
use tracing::warn;

/// Environment key holding the request method.
pub const REQUEST_METHOD: &str = "REQUEST_METHOD";
/// Environment key holding the request path, still percent-encoded. Route
/// parameters are decoded.
pub const PATH_INFO: &str = "PATH_INFO";
/// Environment key holding the raw query string, without the `?`.
pub const QUERY_STRING: &str = "QUERY_STRING";
/// Environment key holding the protocol version, e.g. `HTTP/1.1`.
pub const SERVER_PROTOCOL: &str = "SERVER_PROTOCOL";
/// Environment key holding the peer address, when known.
pub const REMOTE_ADDR: &str = "REMOTE_ADDR";
pub const CONTENT_TYPE: &str = "CONTENT_TYPE";
pub const CONTENT_LENGTH: &str = "CONTENT_LENGTH";

const HEADER_PREFIX: &str = "HTTP_";
const PARAM_PREFIX: &str = "route.param.";

/// The environment of one incoming call: a mapping of environment keys to
/// values, plus the raw body.
///
/// Keys follow the CGI convention. Headers land under `HTTP_<NAME>` with
/// dashes turned into underscores, except `content-type` and
/// `content-length`, which have their own keys. Repeated headers are joined
/// with `", "`.
#[derive(Clone, Debug, Default)]
pub struct Environ {
    vars: BTreeMap<String, String>,
    body: Bytes,
}

impl Environ {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the environment for an incoming hyper request.
    pub fn from_http(parts: &http::request::Parts, body: Bytes, remote: Option<SocketAddr>) -> Self {
        let mut env = Self { vars: BTreeMap::new(), body };
        env.insert(REQUEST_METHOD, parts.method.as_str());
        env.insert(PATH_INFO, parts.uri.path());
        env.insert(QUERY_STRING, parts.uri.query().unwrap_or(""));
        env.insert(SERVER_PROTOCOL, format!("{:?}", parts.version));
        if let Some(addr) = remote {
            env.insert(REMOTE_ADDR, addr.to_string());
        }

        for (name, value) in &parts.headers {
            // The mapping holds text; values that are not UTF-8 are skipped.
            let Ok(value) = std::str::from_utf8(value.as_bytes()) else {
                warn!(header = %name, "skipping non-UTF-8 request header value");
                continue;
            };
            let key = header_key(name.as_str());
            match env.vars.get_mut(&key) {
                Some(existing) => {
                    existing.push_str(", ");
                    existing.push_str(value);
                }
                None => {
                    env.vars.insert(key, value.to_owned());
                }
            }
        }
        env
    }

    /// Builder-style insert, handy for constructing environments by hand.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Builder-style body replacement.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Builder-style header insert under its `HTTP_*` (or content) key.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(header_key(name), value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Header name/value pairs recovered from the environment, with names in
    /// lowercase dash form (`HTTP_ACCEPT_LANGUAGE` → `accept-language`).
    pub fn headers(&self) -> impl Iterator<Item = (String, &str)> {
        self.vars.iter().filter_map(|(k, v)| {
            let name = match k.as_str() {
                CONTENT_TYPE => "content-type".to_owned(),
                CONTENT_LENGTH => "content-length".to_owned(),
                other => other
                    .strip_prefix(HEADER_PREFIX)?
                    .to_ascii_lowercase()
                    .replace('_', "-"),
            };
            Some((name, v.as_str()))
        })
    }

    pub(crate) fn set_params(&mut self, params: &HashMap<String, String>) {
        for (name, value) in params {
            self.vars.insert(format!("{PARAM_PREFIX}{name}"), value.clone());
        }
    }
}

fn header_key(name: &str) -> String {
    if name.eq_ignore_ascii_case("content-type") {
        CONTENT_TYPE.to_owned()
    } else if name.eq_ignore_ascii_case("content-length") {
        CONTENT_LENGTH.to_owned()
    } else {
        format!("{HEADER_PREFIX}{}", name.to_ascii_uppercase().replace('-', "_"))
    }
}

/// An incoming HTTP request as the host router sees it.
pub struct Request {
    pub(crate) environ: Environ,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) params: HashMap<String, String>,
}

impl Request {
    pub(crate) fn new(mut environ: Environ, params: HashMap<String, String>) -> Self {
        environ.set_params(&params);
        let headers = environ.headers().map(|(k, v)| (k, v.to_owned())).collect();
        Self { environ, headers, params }
    }

    /// Builds a request straight from an environment, outside any router.
    pub fn from_environ(environ: Environ) -> Self {
        Self::new(environ, HashMap::new())
    }

    pub fn method(&self) -> &str { self.environ.get(REQUEST_METHOD).unwrap_or("GET") }
    pub fn path(&self) -> &str { self.environ.get(PATH_INFO).unwrap_or("/") }
    pub fn query(&self) -> &str { self.environ.get(QUERY_STRING).unwrap_or("") }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn body(&self) -> &[u8] { self.environ.body() }

    /// The environment this request was built from.
    pub fn environ(&self) -> &Environ { &self.environ }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(uri: &str) -> (http::request::Parts, ()) {
        http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("Accept-Language", "de")
            .header("x-trace", "a")
            .header("x-trace", "b")
            .header("content-type", "text/plain")
            .body(())
            .unwrap()
            .into_parts()
    }

    #[test]
    fn environ_uses_cgi_keys() {
        let (parts, ()) = parts("/hello/world?x=1&y=2");
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let env = Environ::from_http(&parts, Bytes::from_static(b"hi"), Some(addr));

        assert_eq!(env.get(REQUEST_METHOD), Some("POST"));
        assert_eq!(env.get(PATH_INFO), Some("/hello/world"));
        assert_eq!(env.get(QUERY_STRING), Some("x=1&y=2"));
        assert_eq!(env.get(SERVER_PROTOCOL), Some("HTTP/1.1"));
        assert_eq!(env.get(REMOTE_ADDR), Some("127.0.0.1:5000"));
        assert_eq!(env.get("HTTP_ACCEPT_LANGUAGE"), Some("de"));
        assert_eq!(env.get("HTTP_X_TRACE"), Some("a, b"));
        assert_eq!(env.get(CONTENT_TYPE), Some("text/plain"));
        assert_eq!(env.body().as_ref(), b"hi");
    }

    #[test]
    fn environ_keeps_utf8_header_values() {
        let (parts, ()) = http::Request::builder()
            .uri("/hello/J%C3%BCrgen")
            .header("x-name", http::HeaderValue::from_bytes("Jürgen".as_bytes()).unwrap())
            .header("x-raw", http::HeaderValue::from_bytes(b"\xff").unwrap())
            .body(())
            .unwrap()
            .into_parts();
        let env = Environ::from_http(&parts, Bytes::new(), None);

        assert_eq!(env.get("HTTP_X_NAME"), Some("Jürgen"));
        assert_eq!(env.get("HTTP_X_RAW"), None);
        assert_eq!(env.get(PATH_INFO), Some("/hello/J%C3%BCrgen"));
        assert_eq!(Request::from_environ(env).header("x-name"), Some("Jürgen"));
    }

    #[test]
    fn headers_round_back_to_dash_names() {
        let env = Environ::new()
            .with_header("Accept-Language", "fr")
            .with_header("Content-Type", "application/json")
            .with(PATH_INFO, "/");
        let mut names: Vec<_> = env.headers().map(|(k, _)| k).collect();
        names.sort();
        assert_eq!(names, ["accept-language", "content-type"]);
    }

    #[test]
    fn request_exposes_params_and_environ() {
        let mut params = HashMap::new();
        params.insert("id".to_owned(), "42".to_owned());
        let req = Request::new(Environ::new().with(PATH_INFO, "/users/42"), params);

        assert_eq!(req.param("id"), Some("42"));
        assert_eq!(req.environ().get("route.param.id"), Some("42"));
        assert_eq!(req.path(), "/users/42");
        assert_eq!(req.method(), "GET");
    }
}
