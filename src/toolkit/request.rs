//! Rich request object.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;

use super::FromEnviron;
use super::exceptions::HttpException;
use crate::request::{self as env, Environ};

/// A request object with parsed query arguments, headers, cookies and
/// content negotiation, built from one call's [`Environ`].
#[derive(Clone, Debug)]
pub struct Request {
    environ: Environ,
    headers: HeaderMap,
    args: Vec<(String, String)>,
}

impl FromEnviron for Request {
    fn from_environ(environ: &Environ) -> Self {
        let mut headers = HeaderMap::new();
        for (name, value) in environ.headers() {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_bytes(value.as_bytes()),
            ) {
                headers.append(name, value);
            }
        }
        let args = parse_urlencoded(environ.get(env::QUERY_STRING).unwrap_or("").as_bytes());
        Self { environ: environ.clone(), headers, args }
    }
}

impl Request {
    pub fn method(&self) -> &str {
        self.environ.get(env::REQUEST_METHOD).unwrap_or("GET")
    }

    pub fn path(&self) -> &str {
        self.environ.get(env::PATH_INFO).unwrap_or("/")
    }

    pub fn query_string(&self) -> &str {
        self.environ.get(env::QUERY_STRING).unwrap_or("")
    }

    /// Decoded query arguments, in order, duplicates kept.
    pub fn args(&self) -> &[(String, String)] {
        &self.args
    }

    /// First value of a query argument.
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Every value of a query argument.
    pub fn arg_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.args.iter().filter(move |(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| std::str::from_utf8(v.as_bytes()).ok())
    }

    pub fn environ(&self) -> &Environ {
        &self.environ
    }

    pub fn remote_addr(&self) -> Option<&str> {
        self.environ.get(env::REMOTE_ADDR)
    }

    pub fn host(&self) -> Option<&str> {
        self.header("host")
    }

    /// The media type without parameters, lowercased.
    pub fn mimetype(&self) -> Option<String> {
        let ct = self.environ.get(env::CONTENT_TYPE)?;
        let mime = ct.split(';').next().unwrap_or("").trim();
        (!mime.is_empty()).then(|| mime.to_ascii_lowercase())
    }

    pub fn content_length(&self) -> Option<u64> {
        self.environ.get(env::CONTENT_LENGTH)?.trim().parse().ok()
    }

    /// The raw request body.
    pub fn data(&self) -> &Bytes {
        self.environ.body()
    }

    /// Decoded form fields for an `application/x-www-form-urlencoded` body;
    /// empty for any other content type.
    pub fn form(&self) -> Vec<(String, String)> {
        match self.mimetype().as_deref() {
            Some("application/x-www-form-urlencoded") => parse_urlencoded(self.data()),
            _ => Vec::new(),
        }
    }

    pub fn is_json(&self) -> bool {
        self.mimetype().is_some_and(|m| m == "application/json" || m.ends_with("+json"))
    }

    /// Parses the body as JSON.
    ///
    /// Fails with `415 Unsupported Media Type` when the request is not JSON
    /// and `400 Bad Request` when the body does not parse.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpException> {
        if !self.is_json() {
            return Err(HttpException::unsupported_media_type()
                .with_description("Did not attempt to load JSON data because the request Content-Type was not 'application/json'."));
        }
        serde_json::from_slice(self.data()).map_err(|e| {
            HttpException::bad_request()
                .with_description(format!("Failed to decode JSON object: {e}"))
        })
    }

    /// Cookies from the `Cookie` header(s), in order.
    pub fn cookies(&self) -> Vec<(&str, &str)> {
        self.headers
            .get_all(http::header::COOKIE)
            .iter()
            .filter_map(|v| std::str::from_utf8(v.as_bytes()).ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| {
                let (k, v) = pair.split_once('=')?;
                let k = k.trim();
                (!k.is_empty()).then(|| (k, v.trim().trim_matches('"')))
            })
            .collect()
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies().into_iter().find(|(k, _)| *k == name).map(|(_, v)| v)
    }

    /// The parsed `Accept-Language` header.
    pub fn accept_languages(&self) -> Accept {
        Accept::parse(self.header("accept-language").unwrap_or(""))
    }
}

fn parse_urlencoded(input: &[u8]) -> Vec<(String, String)> {
    url::form_urlencoded::parse(input).into_owned().collect()
}

// ── Accept ────────────────────────────────────────────────────────────────────

/// A parsed `Accept*` header: values with their quality, best first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Accept {
    values: Vec<(String, f32)>,
}

impl Accept {
    /// Parses `value;q=0.5, other` lists. Entries with an unparsable or zero
    /// quality are dropped; ties keep header order.
    pub fn parse(header: &str) -> Self {
        let mut values: Vec<(String, f32)> = header
            .split(',')
            .filter_map(|item| {
                let mut parts = item.split(';');
                let value = parts.next()?.trim();
                if value.is_empty() {
                    return None;
                }
                let mut quality = 1.0_f32;
                for param in parts {
                    if let Some(q) = param.trim().strip_prefix("q=") {
                        quality = q.trim().parse().ok()?;
                    }
                }
                (quality > 0.0).then(|| (value.to_owned(), quality.min(1.0)))
            })
            .collect();
        values.sort_by(|a, b| b.1.total_cmp(&a.1));
        Self { values }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.values.iter().map(|(v, q)| (v.as_str(), *q))
    }

    /// Quality the client assigned to `candidate`; 0 when not acceptable.
    pub fn quality(&self, candidate: &str) -> f32 {
        self.values
            .iter()
            .filter(|(value, _)| matches(value, candidate))
            .map(|(_, q)| *q)
            .fold(0.0, f32::max)
    }

    /// The candidate the client prefers most, or `None` if it accepts none
    /// of them. Ties go to the earlier candidate.
    pub fn best_match<'a, I>(&self, candidates: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut best: Option<(&'a str, f32)> = None;
        for candidate in candidates {
            let q = self.quality(candidate);
            if q > 0.0 && best.is_none_or(|(_, bq)| q > bq) {
                best = Some((candidate, q));
            }
        }
        best.map(|(c, _)| c)
    }
}

/// `*` matches anything; otherwise a case-insensitive match on the full
/// value or on the primary subtag (`en` ~ `en-US`, `en_US`).
fn matches(client: &str, candidate: &str) -> bool {
    if client == "*" || client.eq_ignore_ascii_case(candidate) {
        return true;
    }
    let primary = |s: &str| s.split(['-', '_']).next().unwrap_or("").to_ascii_lowercase();
    let (c, s) = (primary(client), primary(candidate));
    !c.is_empty() && c == s && (client.len() == c.len() || candidate.len() == s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(env: Environ) -> Request {
        Request::from_environ(&env)
    }

    #[test]
    fn utf8_header_values_are_readable() {
        let req = request(Environ::new().with_header("x-name", "Jürgen").with_header("cookie", "who=Zoë"));
        assert_eq!(req.header("x-name"), Some("Jürgen"));
        assert_eq!(req.cookie("who"), Some("Zoë"));
    }

    #[test]
    fn parses_query_arguments() {
        let req = request(Environ::new().with(env::QUERY_STRING, "tag=a&tag=b&name=J%C3%BCrgen+X"));
        assert_eq!(req.arg("name"), Some("Jürgen X"));
        assert_eq!(req.arg_all("tag").collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(req.arg("missing"), None);
    }

    #[test]
    fn rebuilds_headers_and_cookies() {
        let req = request(
            Environ::new()
                .with_header("Host", "example.org")
                .with_header("Cookie", "session=abc; theme=\"dark\""),
        );
        assert_eq!(req.host(), Some("example.org"));
        assert_eq!(req.cookie("session"), Some("abc"));
        assert_eq!(req.cookie("theme"), Some("dark"));
        assert_eq!(req.cookie("nope"), None);
    }

    #[test]
    fn form_only_for_urlencoded_bodies() {
        let form = request(
            Environ::new()
                .with_header("content-type", "application/x-www-form-urlencoded; charset=utf-8")
                .with_body("a=1&b=two"),
        );
        assert_eq!(form.form(), [("a".to_owned(), "1".to_owned()), ("b".to_owned(), "two".to_owned())]);

        let text = request(Environ::new().with_header("content-type", "text/plain").with_body("a=1"));
        assert!(text.form().is_empty());
    }

    #[test]
    fn json_reports_typed_errors() {
        #[derive(Debug, serde::Deserialize)]
        struct Body {
            name: String,
        }

        let ok = request(Environ::new().with_header("content-type", "application/json").with_body(r#"{"name":"ada"}"#));
        assert_eq!(ok.json::<Body>().unwrap().name, "ada");

        let broken = request(Environ::new().with_header("content-type", "application/json").with_body("{"));
        assert_eq!(broken.json::<Body>().unwrap_err().code(), http::StatusCode::BAD_REQUEST);

        let plain = request(Environ::new().with_body("{}"));
        assert_eq!(plain.json::<Body>().unwrap_err().code(), http::StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn accept_language_best_match() {
        let accept = Accept::parse("de-CH, fr;q=0.9, en;q=0.8, *;q=0.1");
        assert_eq!(accept.best_match(["en", "fr"]), Some("fr"));
        assert_eq!(accept.best_match(["en", "de"]), Some("de"));
        assert_eq!(accept.best_match(["ja"]), Some("ja"));

        let strict = Accept::parse("en-US, fr;q=0");
        assert_eq!(strict.best_match(["fr", "en"]), Some("en"));
        assert_eq!(strict.best_match(["fr"]), None);
        assert!(Accept::parse("").best_match(["en"]).is_none());
    }

    #[test]
    fn accept_sorts_by_quality() {
        let accept = Accept::parse("text/html;q=0.5, application/json, bogus;q=x");
        let order: Vec<_> = accept.iter().map(|(v, _)| v).collect();
        assert_eq!(order, ["application/json", "text/html"]);
        assert_eq!(accept.quality("text/html"), 0.5);
    }
}
