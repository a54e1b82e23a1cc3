//! Renderer contract.
//!
//! Rendering engines live outside the dispatch core; the engine only knows
//! this trait. A renderer is warmed up once via [`Renderer::compile`] during
//! [`App::setup`](crate::App::setup) and invoked from handler code, never
//! from the dispatcher itself.
//!
//! Per-format methods set a content-type header once (existing values win)
//! and serialize the payload through the tracked response.

use serde_json::Value;

use crate::error::Error;
use crate::response::ResponseWriter;

pub trait Renderer: Send + Sync {
    /// One-time warm-up (template compilation, cache priming).
    fn compile(&mut self) -> Result<(), Error>;

    /// Writes a plain-text body (`text/plain; charset=UTF-8`).
    fn text(&self, w: &mut ResponseWriter, body: &str) {
        if w.get_header("content-type").is_none() {
            w.set_header("content-type", "text/plain; charset=UTF-8");
        }
        w.write_str(body);
    }

    /// Serializes `value` as JSON (`application/json`). Serialization
    /// failures propagate through the panic path like any handler fault.
    fn json(&self, w: &mut ResponseWriter, value: &Value) {
        if w.get_header("content-type").is_none() {
            w.set_header("content-type", "application/json");
        }
        let body = serde_json::to_vec(value).expect("JSON value serialization cannot fail");
        w.write(&body);
    }

    /// Renders the named template with `value` (`text/html; charset=UTF-8`).
    fn html(&self, w: &mut ResponseWriter, name: &str, value: &Value);

    /// Writes a pre-serialized XML body (`application/xml; charset=UTF-8`).
    fn xml(&self, w: &mut ResponseWriter, body: &str) {
        if w.get_header("content-type").is_none() {
            w.set_header("content-type", "application/xml; charset=UTF-8");
        }
        w.write_str(body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;

    impl Renderer for Plain {
        fn compile(&mut self) -> Result<(), Error> {
            Ok(())
        }

        fn html(&self, w: &mut ResponseWriter, _name: &str, value: &Value) {
            if w.get_header("content-type").is_none() {
                w.set_header("content-type", "text/html; charset=UTF-8");
            }
            w.write_str(value.as_str().unwrap_or_default());
        }
    }

    #[test]
    fn content_type_is_set_once() {
        let r = Plain;
        let mut w = ResponseWriter::new();
        w.set_header("content-type", "text/vnd.custom");
        r.text(&mut w, "hi");
        assert_eq!(w.get_header("content-type"), Some("text/vnd.custom"));
        assert_eq!(w.body(), b"hi");
    }

    #[test]
    fn json_writes_serialized_value() {
        let r = Plain;
        let mut w = ResponseWriter::new();
        r.json(&mut w, &serde_json::json!({"id": 1}));
        assert_eq!(w.get_header("content-type"), Some("application/json"));
        assert_eq!(w.body(), br#"{"id":1}"#);
    }
}
