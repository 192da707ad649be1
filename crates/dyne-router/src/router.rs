//! High-level router API.

use std::borrow::Cow;

use http::Method;

use crate::converter::ConverterRegistry;
use crate::error::RouteTemplateError;
use crate::methods::MethodSet;
use crate::node::{Displaced, Endpoint, Node};
use crate::params::Params;
use crate::template::PathTemplate;
use crate::Protocol;

/// A successful match: the endpoint payload and converted parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch<'a, T> {
    /// The matched endpoint's payload.
    pub value: &'a T,
    /// Converted path parameters.
    pub params: Params,
}

/// Outcome of resolving a method and path.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<'a, T> {
    /// A template matched and accepts the method.
    Matched(RouteMatch<'a, T>),
    /// At least one template matched the path, none accepts the method.
    MethodNotAllowed {
        /// Union of the methods accepted by the matching templates.
        allowed: MethodSet,
    },
    /// No template matches the path.
    NotFound,
}

/// A radix tree router with typed path parameters.
///
/// # Route Priority
///
/// When multiple templates match a path:
///
/// 1. **Literal segments** (e.g., `/users/me`)
/// 2. **Placeholder segments** (e.g., `/users/{id:int}`), in registration order
/// 3. **Catch-all segments** (e.g., `/files/{rest:path}`)
///
/// A placeholder whose converter rejects the segment does not match, so
/// `/items/{id:int}` and `/items/{name}` can coexist.
///
/// # Example
///
/// ```rust
/// use dyne_router::{MethodSet, Protocol, Resolution, Router};
/// use http::Method;
///
/// let mut router = Router::new();
/// let by_id = router.compile("/items/{id:int}").unwrap();
/// let by_name = router.compile("/items/{name}").unwrap();
/// router.insert(&by_id, MethodSet::new().get(), Protocol::Http, "by_id");
/// router.insert(&by_name, MethodSet::new().get(), Protocol::Http, "by_name");
///
/// match router.resolve(&Method::GET, "/items/42", Protocol::Http) {
///     Resolution::Matched(m) => {
///         assert_eq!(*m.value, "by_id");
///         assert_eq!(m.params.get_int("id"), Some(42));
///     }
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Router<T> {
    root: Node<T>,
    converters: ConverterRegistry,
    route_count: usize,
}

impl<T: Clone> Default for Router<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Router<T> {
    /// Creates an empty router with the default converters.
    #[must_use]
    pub fn new() -> Self {
        Self::with_converters(ConverterRegistry::default())
    }

    /// Creates an empty router using `converters` to compile templates.
    #[must_use]
    pub fn with_converters(converters: ConverterRegistry) -> Self {
        Self {
            root: Node::root(),
            converters,
            route_count: 0,
        }
    }

    /// The converters templates are compiled against.
    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    /// Compiles a template with this router's converters.
    pub fn compile(&self, template: &str) -> Result<PathTemplate, RouteTemplateError> {
        PathTemplate::compile(template, &self.converters)
    }

    /// Inserts an endpoint for a compiled template.
    ///
    /// Registering the same template again for the same protocol replaces
    /// the older endpoint for every method the two share; the returned list
    /// reports what was taken over.
    pub fn insert(
        &mut self,
        template: &PathTemplate,
        methods: MethodSet,
        protocol: Protocol,
        value: T,
    ) -> Vec<Displaced<T>> {
        let displaced = self.root.insert(
            template.segments(),
            Endpoint {
                methods,
                protocol,
                value,
            },
        );
        self.route_count += 1;
        self.route_count -= displaced.iter().filter(|d| d.removed).count();
        displaced
    }

    /// Number of live endpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.route_count
    }

    /// Returns true if no endpoints are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.route_count == 0
    }

    /// Resolves a request method and path for `protocol`.
    ///
    /// All matching templates are considered before the method filter, so
    /// a path that exists under another method yields
    /// [`Resolution::MethodNotAllowed`] rather than [`Resolution::NotFound`].
    #[must_use]
    pub fn resolve(&self, method: &Method, path: &str, protocol: Protocol) -> Resolution<'_, T> {
        let mut allowed = MethodSet::new();
        let mut any = false;
        for (endpoint, params) in self.candidates(path) {
            if endpoint.protocol != protocol {
                continue;
            }
            if endpoint.methods.contains(method) {
                return Resolution::Matched(RouteMatch {
                    value: &endpoint.value,
                    params,
                });
            }
            any = true;
            allowed.extend(&endpoint.methods);
        }
        if any {
            Resolution::MethodNotAllowed { allowed }
        } else {
            Resolution::NotFound
        }
    }

    /// Every endpoint whose template matches `path`, in priority order,
    /// regardless of method or protocol.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Vec<(&Endpoint<T>, Params)> {
        self.candidates(path)
    }

    fn candidates(&self, path: &str) -> Vec<(&Endpoint<T>, Params)> {
        let segments: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                urlencoding::decode(s)
                    .map(Cow::into_owned)
                    .unwrap_or_else(|_| s.to_string())
            })
            .collect();
        let mut out = Vec::new();
        let mut params = Params::new();
        self.root.collect(&segments, &mut params, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router(routes: &[(&str, MethodSet, &'static str)]) -> Router<&'static str> {
        let mut router = Router::new();
        for (template, methods, id) in routes {
            let t = router.compile(template).unwrap();
            router.insert(&t, methods.clone(), Protocol::Http, *id);
        }
        router
    }

    fn matched<'a>(r: &'a Router<&'static str>, method: &Method, path: &str) -> RouteMatch<'a, &'static str> {
        match r.resolve(method, path, Protocol::Http) {
            Resolution::Matched(m) => m,
            other => panic!("expected match for {path}, got {other:?}"),
        }
    }

    #[test]
    fn test_int_and_str_overlap() {
        let r = router(&[
            ("/items/{id:int}", MethodSet::new().get(), "by_id"),
            ("/items/{name}", MethodSet::new().get(), "by_name"),
        ]);
        let m = matched(&r, &Method::GET, "/items/42");
        assert_eq!(*m.value, "by_id");
        assert_eq!(m.params.get_int("id"), Some(42));

        let m = matched(&r, &Method::GET, "/items/abc");
        assert_eq!(*m.value, "by_name");
        assert_eq!(m.params.get_str("name"), Some("abc"));
    }

    #[test]
    fn test_overlap_independent_of_registration_order() {
        let r = router(&[
            ("/items/{name}", MethodSet::new().get(), "by_name"),
            ("/items/{id:int}", MethodSet::new().get(), "by_id"),
        ]);
        // Registration order breaks the tie: `str` accepts "42" too.
        assert_eq!(*matched(&r, &Method::GET, "/items/42").value, "by_name");
        assert_eq!(*matched(&r, &Method::GET, "/items/abc").value, "by_name");
    }

    #[test]
    fn test_static_beats_param() {
        let r = router(&[
            ("/users/{id}", MethodSet::new().get(), "get_user"),
            ("/users/me", MethodSet::new().get(), "me"),
        ]);
        assert_eq!(*matched(&r, &Method::GET, "/users/me").value, "me");
        assert_eq!(*matched(&r, &Method::GET, "/users/7").value, "get_user");
    }

    #[test]
    fn test_backtracks_out_of_static_branch() {
        let r = router(&[
            ("/a/b/c", MethodSet::new().get(), "literal"),
            ("/a/{x}/d", MethodSet::new().get(), "param"),
        ]);
        let m = matched(&r, &Method::GET, "/a/b/d");
        assert_eq!(*m.value, "param");
        assert_eq!(m.params.get_str("x"), Some("b"));
        assert_eq!(m.params.len(), 1);
    }

    #[test]
    fn test_not_found_vs_method_not_allowed() {
        let r = router(&[("/items", MethodSet::new().get().post(), "items")]);
        assert_eq!(r.resolve(&Method::GET, "/nope", Protocol::Http), Resolution::NotFound);
        assert_eq!(
            r.resolve(&Method::DELETE, "/items", Protocol::Http),
            Resolution::MethodNotAllowed {
                allowed: MethodSet::new().get().post()
            }
        );
    }

    #[test]
    fn test_method_not_allowed_unions_overlapping_templates() {
        let r = router(&[
            ("/items/{id:int}", MethodSet::new().get(), "by_id"),
            ("/items/{name}", MethodSet::new().put(), "by_name"),
        ]);
        // `int` accepts 42 but only for GET; `str` also matches and takes PUT.
        assert_eq!(*matched(&r, &Method::PUT, "/items/42").value, "by_name");
        assert_eq!(
            r.resolve(&Method::DELETE, "/items/42", Protocol::Http),
            Resolution::MethodNotAllowed {
                allowed: MethodSet::new().get().put()
            }
        );
    }

    #[test]
    fn test_protocol_discrimination() {
        let mut r: Router<&str> = Router::new();
        let t = r.compile("/live").unwrap();
        r.insert(&t, MethodSet::new().get(), Protocol::Stream, "ws");
        assert_eq!(r.resolve(&Method::GET, "/live", Protocol::Http), Resolution::NotFound);
        assert!(matches!(
            r.resolve(&Method::GET, "/live", Protocol::Stream),
            Resolution::Matched(_)
        ));
    }

    #[test]
    fn test_last_registration_wins() {
        let mut r: Router<&str> = Router::new();
        let t = r.compile("/items").unwrap();
        r.insert(&t, MethodSet::new().get().post(), Protocol::Http, "old");
        let displaced = r.insert(&t, MethodSet::new().get(), Protocol::Http, "new");

        assert_eq!(displaced.len(), 1);
        assert_eq!(displaced[0].value, "old");
        assert_eq!(displaced[0].methods, MethodSet::new().get());
        assert!(!displaced[0].removed);
        assert_eq!(r.len(), 2);

        assert_eq!(*matched(&r, &Method::GET, "/items").value, "new");
        assert_eq!(*matched(&r, &Method::POST, "/items").value, "old");

        let displaced = r.insert(&t, MethodSet::new().post(), Protocol::Http, "newer");
        assert!(displaced[0].removed);
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn test_trailing_slash_and_root() {
        let r = router(&[
            ("/", MethodSet::new().get(), "root"),
            ("/items/", MethodSet::new().get(), "items"),
        ]);
        assert_eq!(*matched(&r, &Method::GET, "/").value, "root");
        assert_eq!(*matched(&r, &Method::GET, "/items").value, "items");
        assert_eq!(*matched(&r, &Method::GET, "/items/").value, "items");
    }

    #[test]
    fn test_exact_match_only() {
        let r = router(&[("/items", MethodSet::new().get(), "items")]);
        assert_eq!(r.resolve(&Method::GET, "/items/1", Protocol::Http), Resolution::NotFound);
    }

    #[test]
    fn test_catch_all() {
        let r = router(&[
            ("/files/{rest:path}", MethodSet::new().get(), "files"),
            ("/files/{name}", MethodSet::new().get(), "single"),
        ]);
        assert_eq!(*matched(&r, &Method::GET, "/files/a.txt").value, "single");
        let m = matched(&r, &Method::GET, "/files/docs/a.txt");
        assert_eq!(*m.value, "files");
        assert_eq!(m.params.get_str("rest"), Some("docs/a.txt"));
        assert_eq!(r.resolve(&Method::GET, "/files", Protocol::Http), Resolution::NotFound);
    }

    #[test]
    fn test_percent_decoding() {
        let r = router(&[("/users/{name}", MethodSet::new().get(), "user")]);
        let m = matched(&r, &Method::GET, "/users/jane%20doe");
        assert_eq!(m.params.get_str("name"), Some("jane doe"));
    }

    #[test]
    fn test_catch_all_keeps_encoded_slash() {
        let r = router(&[
            ("/files/{rest:path}", MethodSet::new().get(), "files"),
            ("/users/{name}", MethodSet::new().get(), "user"),
        ]);
        let m = matched(&r, &Method::GET, "/files/a%2Fb/c%20d.txt");
        assert_eq!(m.params.get_str("rest"), Some("a%2Fb/c d.txt"));
        let m = matched(&r, &Method::GET, "/files/a/b/c%20d.txt");
        assert_eq!(m.params.get_str("rest"), Some("a/b/c d.txt"));

        // A plain placeholder never holds a slash, encoded or not.
        assert_eq!(r.resolve(&Method::GET, "/users/a%2Fb", Protocol::Http), Resolution::NotFound);
    }

    #[test]
    fn test_multiple_params() {
        let r = router(&[("/orgs/{org}/users/{id:int}", MethodSet::new().get(), "org_user")]);
        let m = matched(&r, &Method::GET, "/orgs/acme/users/123");
        assert_eq!(m.params.get_str("org"), Some("acme"));
        assert_eq!(m.params.get_int("id"), Some(123));
        assert_eq!(r.resolve(&Method::GET, "/orgs/acme/users/x", Protocol::Http), Resolution::NotFound);
    }
}
