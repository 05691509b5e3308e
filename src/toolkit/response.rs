//! Rich response object.

use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_TYPE, InvalidHeaderValue, SET_COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::Serialize;

use super::FromEnviron;
use crate::request::Environ;

const TEXT_UTF8: &str = "text/plain; charset=utf-8";
const HTML_UTF8: &str = "text/html; charset=utf-8";

/// A response object: status, a header map and a body made of byte chunks.
///
/// Handlers can return it directly once the bridge plugin is in use; it
/// converts into the host response with the same status, headers and bytes.
#[derive(Clone, Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<Bytes>,
}

impl Default for Response {
    /// An empty `200 OK` with a plain-text content type.
    fn default() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_UTF8));
        Self { status: StatusCode::OK, headers, body: Vec::new() }
    }
}

impl FromEnviron for Response {
    fn from_environ(_environ: &Environ) -> Self {
        Self::default()
    }
}

impl Response {
    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn new(body: impl Into<Bytes>) -> Self {
        let mut res = Self::default();
        res.append_chunk(body);
        res
    }

    /// `200 OK`, `text/html; charset=utf-8`.
    pub fn html(body: impl Into<Bytes>) -> Self {
        Self::new(body).with_header(CONTENT_TYPE, HeaderValue::from_static(HTML_UTF8))
    }

    /// `200 OK`, `application/json`, serialised with serde_json.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_vec(value)?;
        Ok(Self::new(body).with_header(CONTENT_TYPE, HeaderValue::from_static("application/json")))
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Replaces every value of `name` with `value`.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Appends a `Set-Cookie` header for `name=value` scoped to `/`.
    pub fn set_cookie(&mut self, name: &str, value: &str) -> Result<(), InvalidHeaderValue> {
        let cookie = HeaderValue::from_str(&format!("{name}={value}; Path=/"))?;
        self.headers.append(SET_COOKIE, cookie);
        Ok(())
    }

    /// Appends one chunk to the body.
    pub fn append_chunk(&mut self, chunk: impl Into<Bytes>) {
        let chunk = chunk.into();
        if !chunk.is_empty() {
            self.body.push(chunk);
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn mimetype(&self) -> Option<&str> {
        let ct = self.headers.get(CONTENT_TYPE)?.to_str().ok()?;
        ct.split(';').next().map(str::trim)
    }

    /// The body as encoded chunks, in order.
    pub fn iter_encoded(&self) -> impl Iterator<Item = Bytes> + '_ {
        self.body.iter().cloned()
    }

    /// The whole body in one buffer.
    pub fn data(&self) -> Bytes {
        match self.body.as_slice() {
            [] => Bytes::new(),
            [one] => one.clone(),
            many => {
                let mut buf = BytesMut::new();
                for chunk in many {
                    buf.extend_from_slice(chunk);
                }
                buf.freeze()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_empty_plain_text_ok() {
        let res = Response::from_environ(&Environ::new());
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.mimetype(), Some("text/plain"));
        assert_eq!(res.iter_encoded().count(), 0);
    }

    #[test]
    fn chunks_stay_separate_until_joined() {
        let mut res = Response::new("Hello, ");
        res.append_chunk("");
        res.append_chunk(Bytes::from_static(b"world"));
        assert_eq!(res.iter_encoded().collect::<Vec<_>>(), [Bytes::from("Hello, "), Bytes::from("world")]);
        assert_eq!(res.data(), "Hello, world");
    }

    #[test]
    fn json_and_cookies() {
        let mut res = Response::json(&serde_json::json!({"ok": true})).unwrap();
        res.set_cookie("session", "abc").unwrap();
        res.set_cookie("theme", "dark").unwrap();
        assert!(res.set_cookie("bad", "line\nbreak").is_err());

        assert_eq!(res.mimetype(), Some("application/json"));
        assert_eq!(res.data(), r#"{"ok":true}"#);
        assert_eq!(res.headers().get_all(SET_COOKIE).iter().count(), 2);
    }
}
