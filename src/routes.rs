//! Route table: path templates, parameter capture, per-method endpoints.
//!
//! Templates are written with `:name` tokens (`/users/:id/:role`) and
//! compiled once into a radix-tree template (`/users/{id}/{role}`), so lookup
//! is O(path-length) regardless of how many routes exist.
//!
//! A trailing slash is never significant: `/users` and `/users/` register
//! and resolve as the same route.
//!
//! Every distinct template owns exactly one [`Route`]. Registering a second
//! method for the same template adds that method to the existing route.
//! Templates the tree cannot tell apart (`/users/:id` next to `/users/:name`)
//! are rejected when registered, so which route answers a path never
//! depends on registration order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::upload::UploadOptions;

/// One registered path template and everything attached to it.
pub struct Route {
    template: String,
    param_names: Vec<String>,
    endpoints: BTreeMap<Method, Endpoint>,
}

struct Endpoint {
    handler: BoxedHandler,
    upload: Option<UploadOptions>,
}

impl Route {
    /// The compiled radix-tree template, e.g. `/users/{id}`.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Parameter names in the order they appear in the template.
    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Methods registered for this template, in a stable order.
    pub fn methods(&self) -> impl Iterator<Item = Method> + '_ {
        self.endpoints.keys().copied()
    }

    /// Whether a request with this method name may reach the route.
    /// Method names compare case-insensitively.
    pub fn allows(&self, method: &str) -> bool {
        self.methods().any(|m| m.matches(method))
    }

    /// Upload rules registered for `method`, if any.
    pub fn upload_options(&self, method: Method) -> Option<&UploadOptions> {
        self.endpoints.get(&method)?.upload.as_ref()
    }

    pub(crate) fn handler(&self, method: Method) -> Option<&BoxedHandler> {
        self.endpoints.get(&method).map(|e| &e.handler)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("template", &self.template)
            .field("param_names", &self.param_names)
            .field("methods", &self.endpoints.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A successful lookup: the route plus its captured parameters, in template order.
#[derive(Debug)]
pub struct Resolved<'a> {
    pub route: &'a Route,
    pub params: Vec<(String, String)>,
}

/// All routes of an application.
#[derive(Default)]
pub struct RouteTable {
    tree: MatchitRouter<usize>,
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `method` on `raw_path`.
    ///
    /// Fails if the template conflicts with an existing one, or if the
    /// template already has a handler for `method`.
    pub fn register(
        &mut self,
        method: Method,
        raw_path: &str,
        upload: Option<UploadOptions>,
        handler: impl Handler,
    ) -> Result<(), Error> {
        let (template, param_names) = compile(raw_path);
        let endpoint = Endpoint { handler: Arc::new(handler), upload };

        if let Some(route) = self.routes.iter_mut().find(|r| r.template == template) {
            if route.endpoints.contains_key(&method) {
                return Err(Error::DuplicateRoute { method, path: raw_path.to_owned() });
            }
            route.endpoints.insert(method, endpoint);
            return Ok(());
        }

        self.tree
            .insert(template.clone(), self.routes.len())
            .map_err(|source| Error::Route { path: raw_path.to_owned(), source })?;
        self.routes.push(Route {
            template,
            param_names,
            endpoints: BTreeMap::from([(method, endpoint)]),
        });
        Ok(())
    }

    /// Finds the route for a request path (no query string).
    pub fn resolve(&self, pathname: &str) -> Option<Resolved<'_>> {
        let path = normalize(pathname);
        let matched = self.tree.at(&path).ok()?;
        let route = &self.routes[*matched.value];
        let params = route
            .param_names
            .iter()
            .filter_map(|name| Some((name.clone(), matched.params.get(name)?.to_owned())))
            .collect();
        Some(Resolved { route, params })
    }

    /// Whether `route` accepts `method`. Shorthand for [`Route::allows`].
    pub fn method_allowed(route: &Route, method: &str) -> bool {
        route.allows(method)
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

/// Leading slash always, trailing slash never (except for the root).
fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    }
}

/// Turns `/users/:id` into `("/users/{id}", ["id"])`.
///
/// A parameter name is the run of word characters after a `:`. Braces in
/// the literal parts are escaped so they match themselves.
fn compile(raw_path: &str) -> (String, Vec<String>) {
    let path = normalize(raw_path);
    let mut template = String::with_capacity(path.len());
    let mut names = Vec::new();
    let mut chars = path.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ':' if chars.peek().is_some_and(|n| is_word(*n)) => {
                let mut name = String::new();
                while let Some(n) = chars.next_if(|n| is_word(*n)) {
                    name.push(n);
                }
                template.push('{');
                template.push_str(&name);
                template.push('}');
                names.push(name);
            }
            '{' => template.push_str("{{"),
            '}' => template.push_str("}}"),
            c => template.push(c),
        }
    }

    (template, names)
}

fn is_word(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use crate::response::Response;

    async fn ok(_req: Request) -> Response {
        Response::text("ok")
    }

    fn params<'a>(resolved: &'a Resolved<'_>) -> Vec<(&'a str, &'a str)> {
        resolved.params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }

    #[test]
    fn compile_records_names_in_order() {
        assert_eq!(
            compile("/pathname/:param1/:param2"),
            ("/pathname/{param1}/{param2}".to_owned(), vec!["param1".to_owned(), "param2".to_owned()])
        );
        assert_eq!(compile("users/"), ("/users".to_owned(), vec![]));
        assert_eq!(compile("/"), ("/".to_owned(), vec![]));
        assert_eq!(compile("/a:/{b}"), ("/a:/{{b}}".to_owned(), vec![]));
    }

    #[test]
    fn resolves_params_in_template_order() {
        let mut table = RouteTable::new();
        table.register(Method::Get, "/users/:id/:role", None, ok).unwrap();

        let resolved = table.resolve("/users/42/admin").unwrap();
        assert_eq!(params(&resolved), [("id", "42"), ("role", "admin")]);
        assert_eq!(resolved.route.param_names(), ["id", "role"]);
    }

    #[test]
    fn trailing_slash_is_insignificant() {
        let mut table = RouteTable::new();
        table.register(Method::Get, "/users/", None, ok).unwrap();

        assert!(table.resolve("/users").is_some());
        assert!(table.resolve("/users/").is_some());
        assert!(table.resolve("/users/1").is_none());
    }

    #[test]
    fn root_route() {
        let mut table = RouteTable::new();
        table.register(Method::Get, "/", None, ok).unwrap();
        assert!(table.resolve("/").is_some());
        assert!(table.resolve("").is_some());
    }

    #[test]
    fn unknown_path_resolves_to_none() {
        let mut table = RouteTable::new();
        table.register(Method::Get, "/pathname/:a/:b", None, ok).unwrap();
        assert!(table.resolve("/invalidPath").is_none());
    }

    #[test]
    fn methods_merge_onto_one_route() {
        let mut table = RouteTable::new();
        table.register(Method::Get, "/upload", None, ok).unwrap();
        table
            .register(Method::Post, "/upload/", Some(UploadOptions::new()), ok)
            .unwrap();

        assert_eq!(table.routes().len(), 1);
        let route = table.resolve("/upload").unwrap().route;
        assert_eq!(route.methods().collect::<Vec<_>>(), [Method::Get, Method::Post]);
        assert!(route.upload_options(Method::Get).is_none());
        assert!(route.upload_options(Method::Post).is_some());
    }

    #[test]
    fn method_allowed_ignores_case() {
        let mut table = RouteTable::new();
        table.register(Method::Post, "/items", None, ok).unwrap();
        let route = table.resolve("/items").unwrap().route;

        assert!(RouteTable::method_allowed(route, "post"));
        assert!(RouteTable::method_allowed(route, "POST"));
        assert!(!RouteTable::method_allowed(route, "GET"));
        assert!(!RouteTable::method_allowed(route, "BREW"));
    }

    #[test]
    fn duplicate_method_is_rejected() {
        let mut table = RouteTable::new();
        table.register(Method::Get, "/a/:id", None, ok).unwrap();
        let err = table.register(Method::Get, "/a/:id/", None, ok).unwrap_err();
        assert!(matches!(err, Error::DuplicateRoute { method: Method::Get, .. }));
    }

    #[test]
    fn ambiguous_templates_are_rejected() {
        let mut table = RouteTable::new();
        table.register(Method::Get, "/users/:id", None, ok).unwrap();
        let err = table.register(Method::Get, "/users/:name", None, ok).unwrap_err();
        assert!(matches!(err, Error::Route { .. }));
    }

    #[test]
    fn static_segment_beats_parameter_in_any_order() {
        let mut table = RouteTable::new();
        table.register(Method::Get, "/users/:id", None, ok).unwrap();
        table.register(Method::Get, "/users/me", None, ok).unwrap();

        assert_eq!(table.resolve("/users/me").unwrap().route.template(), "/users/me");
        assert_eq!(table.resolve("/users/7").unwrap().route.template(), "/users/{id}");
    }
}
