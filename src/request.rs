//! Incoming HTTP request view.
//!
//! The server collects the body before dispatch, so handlers and middlewares
//! see a fully-buffered request. Body-size limits belong to the proxy in
//! front, not here.

use bytes::Bytes;
use http::{HeaderMap, Method};

/// An incoming, fully-buffered HTTP request.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

impl Request {
    /// A bare request, useful when driving [`App::handle`](crate::App::handle)
    /// directly (tests, embedding).
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.to_owned(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub(crate) fn from_parts(method: Method, path: String, headers: HeaderMap, body: Bytes) -> Self {
        Self { method, path, headers, body }
    }

    /// # Panics
    ///
    /// Panics on an invalid header name or value; this is a builder for
    /// tests and embedding, where a typo should fail loudly.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let header_name = name
            .parse::<http::header::HeaderName>()
            .unwrap_or_else(|_| panic!("invalid header name `{name}`"));
        let header_value = value
            .parse()
            .unwrap_or_else(|_| panic!("invalid value for header `{name}`"));
        self.headers.append(header_name, header_value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Convenience for an `application/x-www-form-urlencoded` body.
    pub fn with_form(self, pairs: &[(&str, &str)]) -> Self {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        self.with_header("content-type", "application/x-www-form-urlencoded")
            .with_body(encoded)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// First value of `name`, if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Value of the named cookie from the `cookie` header.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        let raw = self.header("cookie")?;
        raw.split(';').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k.trim() == name).then(|| v.trim())
        })
    }

    /// A field from an urlencoded form body. `None` unless the content type
    /// is `application/x-www-form-urlencoded`.
    pub fn form_value(&self, name: &str) -> Option<String> {
        let content_type = self.header("content-type")?;
        if !content_type.starts_with("application/x-www-form-urlencoded") {
            return None;
        }
        url::form_urlencoded::parse(&self.body)
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cookie_lookup() {
        let req = Request::new(Method::GET, "/").with_header("cookie", "a=1; sid=abc----def; b=2");
        assert_eq!(req.cookie("sid"), Some("abc----def"));
        assert_eq!(req.cookie("missing"), None);
    }

    #[test]
    #[should_panic(expected = "invalid header name")]
    fn with_header_rejects_bad_names() {
        let _ = Request::new(Method::GET, "/").with_header("bad name", "v");
    }

    #[test]
    fn form_value_requires_urlencoded_content_type() {
        let req = Request::new(Method::POST, "/").with_body("_method=PUT");
        assert_eq!(req.form_value("_method"), None);

        let req = Request::new(Method::POST, "/").with_form(&[("_method", "PUT"), ("x", "a b")]);
        assert_eq!(req.form_value("_method"), Some("PUT".into()));
        assert_eq!(req.form_value("x"), Some("a b".into()));
    }
}
