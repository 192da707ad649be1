//! The handler registry.
//!
//! Holds the route table (template → route, for dispatch), the name index
//! (route → template, for building links), the pre-request hooks and the
//! error hook. It is populated during setup and then handed to a
//! [`Dispatcher`](crate::Dispatcher), which only ever reads snapshots of it.

use std::collections::HashMap;
use std::sync::Arc;

use dyne_auth::AuthGate;
use dyne_core::{DyneError, RouteInfo};
use dyne_pipeline::{Stage, StageChain};
use dyne_router::{ConverterRegistry, Params, PathTemplate, Protocol, Resolution, Router};
use http::Method;

use crate::error::{RegistrationError, UrlError};
use crate::handler::{ErrorHook, ErrorReport, RequestHook, StreamHook};
use crate::metadata::{MetadataAggregator, RouteMetadata};
use crate::route::{Route, RouteEntry, RouteHandle};

/// Routes, hooks and the reverse-lookup index.
///
/// Registering a template that is already registered for the same protocol
/// replaces the older route for every method the two share; the last
/// registration wins.
///
/// ```rust
/// use dyne_core::Response;
/// use dyne_server::{handler, Registry, Route};
///
/// let mut registry = Registry::new();
/// registry
///     .register(Route::new("/items/{id:int}", handler(|_req| async { Ok(Response::text("item")) })).name("item"))
///     .unwrap();
///
/// assert_eq!(registry.url_for("item", [("id", 7)]).unwrap(), "/items/7");
/// ```
#[derive(Clone, Default)]
pub struct Registry {
    router: Router<usize>,
    routes: Vec<Arc<RouteEntry>>,
    names: HashMap<String, usize>,
    request_hooks: Vec<Arc<dyn RequestHook>>,
    stream_hooks: Vec<Arc<dyn StreamHook>>,
    error_hook: Option<ErrorHook>,
}

impl Registry {
    /// Creates an empty registry with the default converters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry compiling templates against `converters`.
    #[must_use]
    pub fn with_converters(converters: ConverterRegistry) -> Self {
        Self {
            router: Router::with_converters(converters),
            ..Self::default()
        }
    }

    /// Registers a route.
    pub fn register(&mut self, route: Route) -> Result<RouteHandle, RegistrationError> {
        let parts = route.into_parts();
        let template = self.router.compile(&parts.template)?;
        if parts.methods.is_empty() {
            return Err(RegistrationError::NoMethods(parts.name));
        }
        if let Some(existing) = self.names.get(&parts.name).map(|&id| &self.routes[id]) {
            if existing.is_live() && existing.template.as_str() != template.as_str() {
                return Err(RegistrationError::DuplicateName {
                    name: parts.name,
                    template: existing.template.to_string(),
                });
            }
        }

        let mut chain = StageChain::new();
        for stage in parts.stages {
            chain.push(stage)?;
        }

        let id = self.routes.len();
        let entry = RouteEntry {
            info: RouteInfo {
                name: parts.name.clone(),
                template: template.to_string(),
            },
            methods: parts.methods.clone(),
            template,
            endpoint: parts.endpoint,
            chain,
            gate: parts.gate,
        };
        let protocol = entry.protocol();
        let displaced = self.router.insert(&entry.template, parts.methods, protocol, id);
        for taken in displaced {
            let older = Arc::make_mut(&mut self.routes[taken.value]);
            for method in taken.methods.iter() {
                older.methods.remove(method);
            }
            tracing::warn!(
                route = %older.info.name,
                replaced_by = %parts.name,
                methods = %taken.methods,
                "route replaced by a later registration"
            );
        }

        tracing::debug!(route = %parts.name, template = %entry.info.template, ?protocol, "route registered");
        self.routes.push(Arc::new(entry));
        self.names.insert(parts.name.clone(), id);
        Ok(RouteHandle { id, name: parts.name })
    }

    /// Appends a stage to a registered route.
    pub fn attach_stage(&mut self, handle: &RouteHandle, stage: impl Stage) -> Result<(), RegistrationError> {
        let entry = self.entry_mut(handle)?;
        entry.chain.push(Arc::new(stage))?;
        Ok(())
    }

    /// Puts a registered route behind `gate`, replacing any earlier gate.
    pub fn attach_auth(&mut self, handle: &RouteHandle, gate: AuthGate) -> Result<(), RegistrationError> {
        self.entry_mut(handle)?.gate = Some(gate);
        Ok(())
    }

    fn entry_mut(&mut self, handle: &RouteHandle) -> Result<&mut RouteEntry, RegistrationError> {
        self.routes
            .get_mut(handle.id)
            .filter(|e| e.info.name == handle.name)
            .map(Arc::make_mut)
            .ok_or_else(|| RegistrationError::UnknownRoute(handle.name.clone()))
    }

    /// Adds a hook run before every dispatched HTTP request.
    pub fn before_request(&mut self, hook: impl RequestHook) -> &mut Self {
        self.request_hooks.push(Arc::new(hook));
        self
    }

    /// Adds a hook run before every stream acceptance, ahead of the auth
    /// gate.
    pub fn before_stream(&mut self, hook: impl StreamHook) -> &mut Self {
        self.stream_hooks.push(Arc::new(hook));
        self
    }

    /// Sets the observer for server-side failures.
    pub fn on_error<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&ErrorReport<'_>) + Send + Sync + 'static,
    {
        self.error_hook = Some(Arc::new(hook));
        self
    }

    /// Number of live routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live().count()
    }

    /// Returns true if no route is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Builds a path to the named route.
    pub fn url_for<I, K, V>(&self, name: &str, params: I) -> Result<String, UrlError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<dyne_router::ParamValue>,
    {
        Ok(self.template_for(name)?.build(params)?)
    }

    /// The template registered under `name`.
    pub fn template_for(&self, name: &str) -> Result<&PathTemplate, UrlError> {
        self.names
            .get(name)
            .map(|&id| &self.routes[id])
            .filter(|e| e.is_live())
            .map(|e| &e.template)
            .ok_or_else(|| UrlError::UnknownRoute(name.to_string()))
    }

    /// Collects the documentation view of every live route.
    #[must_use]
    pub fn metadata(&self) -> MetadataAggregator {
        let mut aggregator = MetadataAggregator::new();
        for entry in self.live() {
            aggregator.push(RouteMetadata {
                name: entry.info.name.clone(),
                template: entry.info.template.clone(),
                methods: entry.methods.iter().map(|m| m.as_str().to_string()).collect(),
                protocol: entry.protocol(),
                auth: entry.gate.as_ref().map(AuthGate::requirement),
                stages: entry.chain.metadata(),
            });
        }
        aggregator
    }

    fn live(&self) -> impl Iterator<Item = &Arc<RouteEntry>> {
        self.routes.iter().filter(|e| e.is_live())
    }

    pub(crate) fn resolve(
        &self,
        method: &Method,
        path: &str,
        protocol: Protocol,
    ) -> Result<(Arc<RouteEntry>, Params), DyneError> {
        match self.router.resolve(method, path, protocol) {
            Resolution::Matched(m) => Ok((Arc::clone(&self.routes[*m.value]), m.params)),
            Resolution::MethodNotAllowed { allowed } => Err(DyneError::MethodNotAllowed {
                method: method.clone(),
                allowed,
            }),
            Resolution::NotFound => Err(DyneError::RouteNotFound { path: path.to_string() }),
        }
    }

    pub(crate) fn request_hooks(&self) -> &[Arc<dyn RequestHook>] {
        &self.request_hooks
    }

    pub(crate) fn stream_hooks(&self) -> &[Arc<dyn StreamHook>] {
        &self.stream_hooks
    }

    pub(crate) fn report(&self, route: Option<&RouteInfo>, error: &DyneError) {
        if let Some(hook) = &self.error_hook {
            hook(&ErrorReport { route, error });
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("routes", &self.live().map(|e| &e.info.name).collect::<Vec<_>>())
            .field("request_hooks", &self.request_hooks.len())
            .field("stream_hooks", &self.stream_hooks.len())
            .field("error_hook", &self.error_hook.is_some())
            .finish()
    }
}
