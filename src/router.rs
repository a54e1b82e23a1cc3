//! Route table: pattern matching and reverse URL generation.
//!
//! Patterns are regular expressions with named captures, anchored at both
//! ends at registration, e.g. `/users/(?P<id>[^/]+)`. Matching scans routes
//! in registration order with a case-insensitive method filter; the first
//! match wins, so overlap resolution is deterministic and reproducible.
//!
//! Pattern errors, duplicate names, and reverse-URL misuse are programmer
//! errors and panic at once rather than surfacing per request.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use regex::Regex;

use crate::middleware::{Chain, Handler, HandlerLink, Middleware, Sentinel};

/// A compiled route. Immutable after registration; the template chain is
/// shared read-only across requests.
pub struct Route {
    pub name: String,
    pub method: Method,
    /// Static-file routes skip the session subsystem.
    pub is_static: bool,
    /// Named-capture parameter names, in declaration order.
    pub param_names: Vec<String>,
    pattern: Regex,
    pattern_str: String,
    pub(crate) chain: Chain,
}

impl Route {
    /// Compiles `pattern` (anchored as `^pattern$`) and the middleware chain:
    /// the given links, then the handler, then the sentinel.
    ///
    /// # Panics
    ///
    /// Panics if the pattern is not a valid regex.
    pub(crate) fn new(
        name: &str,
        pattern: &str,
        method: Method,
        is_static: bool,
        handler: Arc<dyn Handler>,
        middlewares: Vec<Arc<dyn Middleware>>,
    ) -> Self {
        let compiled = Regex::new(&format!("^{pattern}$"))
            .unwrap_or_else(|e| panic!("invalid route pattern `{pattern}`: {e}"));
        let param_names = compiled.capture_names().flatten().map(str::to_owned).collect();

        let mut links = middlewares;
        links.push(Arc::new(HandlerLink(handler)));
        links.push(Arc::new(Sentinel));

        Self {
            name: name.to_owned(),
            method,
            is_static,
            param_names,
            pattern: compiled,
            pattern_str: pattern.to_owned(),
            chain: Chain::new(links),
        }
    }

    /// The raw (unanchored) pattern as registered.
    pub fn pattern(&self) -> &str {
        &self.pattern_str
    }
}

/// Routes in registration order plus a name index for reverse URLs.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
    by_name: HashMap<String, usize>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    ///
    /// Panics on a duplicate route name.
    pub(crate) fn insert(&mut self, route: Route) -> Arc<Route> {
        if self.by_name.contains_key(&route.name) {
            panic!("route `{}` registered twice", route.name);
        }
        let route = Arc::new(route);
        self.by_name.insert(route.name.clone(), self.routes.len());
        self.routes.push(Arc::clone(&route));
        route
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Route>> {
        self.by_name.get(name).map(|&i| &self.routes[i])
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// First route whose method matches case-insensitively and whose pattern
    /// matches the full path. Named captures bind to parameters; unnamed
    /// groups are ignored.
    pub(crate) fn match_path(&self, method: &str, path: &str) -> Option<(Arc<Route>, Vec<(String, String)>)> {
        for route in &self.routes {
            if !route.method.as_str().eq_ignore_ascii_case(method) {
                continue;
            }
            let Some(caps) = route.pattern.captures(path) else { continue };
            let params = route
                .param_names
                .iter()
                .map(|name| {
                    let value = caps.name(name).map_or("", |m| m.as_str());
                    (name.clone(), value.to_owned())
                })
                .collect();
            return Some((Arc::clone(route), params));
        }
        None
    }

    /// Substitutes `args` into the named-capture occurrences of the raw
    /// pattern, in order of occurrence.
    ///
    /// # Panics
    ///
    /// Panics on an unknown route name or an argument-count mismatch; both
    /// are registration-time mistakes, not per-request conditions.
    pub fn build_url(&self, name: &str, args: &[&str]) -> String {
        let route = self
            .get(name)
            .unwrap_or_else(|| panic!("route `{name}` not defined"));
        let group = Regex::new(r"\(\?P<[^>]+>[^)]+\)").expect("group pattern");

        let mut used = 0;
        let url = group.replace_all(&route.pattern_str, |_: &regex::Captures<'_>| {
            let arg = *args.get(used).unwrap_or_else(|| {
                panic!(
                    "build_url(`{name}`): pattern has more parameters than the {} argument(s) given",
                    args.len()
                )
            });
            used += 1;
            arg.to_owned()
        });
        if used != args.len() {
            panic!("build_url(`{name}`): {} argument(s) given, pattern takes {used}", args.len());
        }
        url.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::response::ResponseWriter;

    async fn noop(_w: &mut ResponseWriter, _ctx: &mut Context) {}

    fn route(name: &str, pattern: &str, method: Method) -> Route {
        Route::new(name, pattern, method, false, Arc::new(noop), Vec::new())
    }

    fn table(routes: Vec<Route>) -> RouteTable {
        let mut t = RouteTable::new();
        for r in routes {
            t.insert(r);
        }
        t
    }

    #[test]
    fn params_bind_in_declaration_order() {
        let t = table(vec![route("p1", "/p1/(?P<param1>[^/]+)/(?P<param2>[^/]+)", Method::GET)]);
        let (r, params) = t.match_path("GET", "/p1/a/b").unwrap();
        assert_eq!(r.name, "p1");
        assert_eq!(params, vec![("param1".into(), "a".into()), ("param2".into(), "b".into())]);
    }

    #[test]
    fn first_registered_match_wins() {
        let t = table(vec![
            route("broad", "/x/(?P<rest>.*)", Method::GET),
            route("narrow", "/x/exact", Method::GET),
        ]);
        let (r, _) = t.match_path("GET", "/x/exact").unwrap();
        assert_eq!(r.name, "broad");
    }

    #[test]
    fn method_filter_is_case_insensitive() {
        let t = table(vec![route("p", "/p", Method::POST)]);
        assert!(t.match_path("post", "/p").is_some());
        assert!(t.match_path("GET", "/p").is_none());
    }

    #[test]
    fn patterns_match_full_paths_only() {
        let t = table(vec![route("p", "/page1", Method::GET)]);
        assert!(t.match_path("GET", "/page1").is_some());
        assert!(t.match_path("GET", "/page1/extra").is_none());
        assert!(t.match_path("GET", "/prefix/page1").is_none());
    }

    #[test]
    fn build_url_substitutes_in_order() {
        let t = table(vec![route("p1", "/p1/(?P<param1>[^/]+)/(?P<param2>[^/]+)", Method::GET)]);
        assert_eq!(t.build_url("p1", &["aaa", "bbb"]), "/p1/aaa/bbb");
    }

    #[test]
    fn build_url_round_trips_through_dispatch() {
        let t = table(vec![route("p1", "/p1/(?P<param1>[^/]+)/(?P<param2>[^/]+)", Method::GET)]);
        let url = t.build_url("p1", &["a", "b"]);
        let (r, params) = t.match_path("GET", &url).unwrap();
        assert_eq!(r.name, "p1");
        assert_eq!(params, vec![("param1".into(), "a".into()), ("param2".into(), "b".into())]);
    }

    #[test]
    #[should_panic(expected = "not defined")]
    fn build_url_unknown_name_panics() {
        table(vec![]).build_url("ghost", &[]);
    }

    #[test]
    #[should_panic(expected = "argument")]
    fn build_url_arity_mismatch_panics() {
        let t = table(vec![route("p1", "/p1/(?P<param1>[^/]+)", Method::GET)]);
        t.build_url("p1", &["a", "b"]);
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_names_panic() {
        table(vec![route("p", "/a", Method::GET), route("p", "/b", Method::GET)]);
    }

    #[test]
    #[should_panic(expected = "invalid route pattern")]
    fn invalid_pattern_panics() {
        route("bad", "/p1/(?P<oops", Method::GET);
    }
}
