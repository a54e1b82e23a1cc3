//! Named lifecycle hooks.
//!
//! A hook is a callback invoked at a well-defined moment of the request
//! lifecycle. The [`App`](crate::App) fires `start_request`, `start_action`,
//! `end_action` and `end_request`; applications may register under any name
//! and fire their own points.
//!
//! "Entering" points run front-to-back, "leaving" points back-to-front, which
//! keeps hook pairs LIFO-symmetric with the middleware chain's own nesting.
//!
//! The registry is meant to be populated during setup. It is read-only while
//! requests are in flight; there is deliberately no interior mutability here.

use std::collections::HashMap;

use crate::context::Context;
use crate::response::ResponseWriter;

/// A lifecycle callback. Hooks observe and may write to the response, but do
/// not alter control flow unless they panic.
pub type Hook = Box<dyn Fn(&mut ResponseWriter, &mut Context) + Send + Sync>;

/// Execution order for a hook list.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HookDirection {
    /// Front to back, in registration order.
    Forward,
    /// Back to front.
    Reverse,
}

/// A registry mapping event names to ordered callback lists.
#[derive(Default)]
pub struct Hooks {
    map: HashMap<String, Vec<Hook>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `hook` at the end of the list for `name`.
    pub fn add<F>(&mut self, name: &str, hook: F)
    where
        F: Fn(&mut ResponseWriter, &mut Context) + Send + Sync + 'static,
    {
        self.map.entry(name.to_owned()).or_default().push(Box::new(hook));
    }

    /// Executes every hook registered under `name` in the given direction.
    /// Unknown names are a no-op.
    pub fn run(&self, name: &str, direction: HookDirection, w: &mut ResponseWriter, ctx: &mut Context) {
        let Some(hooks) = self.map.get(name) else { return };
        match direction {
            HookDirection::Forward => {
                for hook in hooks {
                    hook(w, ctx);
                }
            }
            HookDirection::Reverse => {
                for hook in hooks.iter().rev() {
                    hook(w, ctx);
                }
            }
        }
    }

    /// Number of hooks registered under `name`.
    pub fn len(&self, name: &str) -> usize {
        self.map.get(name).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use std::sync::{Arc, Mutex};

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> Hook {
        let log = Arc::clone(log);
        Box::new(move |_, _| log.lock().unwrap().push(tag))
    }

    #[test]
    fn forward_and_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = Hooks::new();
        for tag in ["a", "b", "c"] {
            let hook = recorder(&log, tag);
            hooks.add("point", move |w, ctx| hook(w, ctx));
        }

        let mut w = ResponseWriter::new();
        let mut ctx = Context::new("t".into(), Request::new(http::Method::GET, "/"));
        hooks.run("point", HookDirection::Forward, &mut w, &mut ctx);
        hooks.run("point", HookDirection::Reverse, &mut w, &mut ctx);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c", "c", "b", "a"]);
    }

    #[test]
    fn unknown_name_is_noop() {
        let hooks = Hooks::new();
        let mut w = ResponseWriter::new();
        let mut ctx = Context::new("t".into(), Request::new(http::Method::GET, "/"));
        hooks.run("nothing_here", HookDirection::Forward, &mut w, &mut ctx);
        assert_eq!(hooks.len("nothing_here"), 0);
    }
}
