//! Route declarations.

use std::sync::Arc;

use dyne_auth::AuthGate;
use dyne_core::RouteInfo;
use dyne_pipeline::{BoxedStage, Stage, StageChain};
use dyne_router::{MethodSet, PathTemplate, Protocol};
use http::Method;

use crate::handler::{HttpHandler, StreamHandler};

#[derive(Clone)]
pub(crate) enum Endpoint {
    Http(HttpHandler),
    Stream(StreamHandler),
}

/// A route to register: template, methods, handler, stages and auth.
///
/// Routes are named after their template unless [`Route::name`] says
/// otherwise; the name is what [`Dispatcher::url_for`](crate::Dispatcher::url_for)
/// and the metadata export refer to.
///
/// ```rust
/// use dyne_core::Response;
/// use dyne_pipeline::ExpectStage;
/// use dyne_router::MethodSet;
/// use dyne_server::{handler, Route};
///
/// let route = Route::new("/items/{id:int}", handler(|_req| async { Ok(Response::text("item")) }))
///     .name("get_item")
///     .methods(MethodSet::new().get().delete())
///     .stage(ExpectStage::new().response(404, "No such item"));
/// assert_eq!(route.route_name(), "get_item");
/// ```
#[derive(Clone)]
pub struct Route {
    name: Option<String>,
    template: String,
    methods: MethodSet,
    endpoint: Endpoint,
    stages: Vec<BoxedStage>,
    gate: Option<AuthGate>,
}

impl Route {
    /// An HTTP route answering `GET`.
    pub fn new(template: impl Into<String>, handler: HttpHandler) -> Self {
        Self::with_endpoint(template.into(), Endpoint::Http(handler))
    }

    /// A persistent-stream (WebSocket) route.
    pub fn stream(template: impl Into<String>, handler: StreamHandler) -> Self {
        Self::with_endpoint(template.into(), Endpoint::Stream(handler))
    }

    fn with_endpoint(template: String, endpoint: Endpoint) -> Self {
        Self {
            name: None,
            template,
            methods: MethodSet::from(Method::GET),
            endpoint,
            stages: Vec::new(),
            gate: None,
        }
    }

    /// Sets the route name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Replaces the accepted methods. Ignored for stream routes.
    #[must_use]
    pub fn methods(mut self, methods: MethodSet) -> Self {
        self.methods = methods;
        self
    }

    /// Appends a pipeline stage.
    #[must_use]
    pub fn stage(mut self, stage: impl Stage) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Requires the gate to pass before the stages run.
    #[must_use]
    pub fn auth(mut self, gate: AuthGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// The name this route registers under.
    pub fn route_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.template)
    }

    /// The template as written.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Protocol kind served.
    pub fn protocol(&self) -> Protocol {
        match self.endpoint {
            Endpoint::Http(_) => Protocol::Http,
            Endpoint::Stream(_) => Protocol::Stream,
        }
    }

    pub(crate) fn into_parts(self) -> RouteParts {
        let protocol = self.protocol();
        let methods = match protocol {
            Protocol::Http => self.methods,
            Protocol::Stream => MethodSet::from(Method::GET),
        };
        RouteParts {
            name: self.name.unwrap_or_else(|| self.template.clone()),
            template: self.template,
            methods,
            endpoint: self.endpoint,
            stages: self.stages,
            gate: self.gate,
        }
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("name", &self.route_name())
            .field("template", &self.template)
            .field("methods", &self.methods)
            .field("protocol", &self.protocol())
            .field("stages", &self.stages.len())
            .field("gate", &self.gate)
            .finish()
    }
}

pub(crate) struct RouteParts {
    pub(crate) name: String,
    pub(crate) template: String,
    pub(crate) methods: MethodSet,
    pub(crate) endpoint: Endpoint,
    pub(crate) stages: Vec<BoxedStage>,
    pub(crate) gate: Option<AuthGate>,
}

/// A registered route, as held by registry snapshots.
#[derive(Clone)]
pub(crate) struct RouteEntry {
    pub(crate) info: RouteInfo,
    pub(crate) template: PathTemplate,
    /// Methods still served; a later registration of the same template
    /// takes over the methods the two share.
    pub(crate) methods: MethodSet,
    pub(crate) endpoint: Endpoint,
    pub(crate) chain: StageChain,
    pub(crate) gate: Option<AuthGate>,
}

impl RouteEntry {
    pub(crate) fn protocol(&self) -> Protocol {
        match self.endpoint {
            Endpoint::Http(_) => Protocol::Http,
            Endpoint::Stream(_) => Protocol::Stream,
        }
    }

    pub(crate) fn is_live(&self) -> bool {
        !self.methods.is_empty()
    }
}

/// Refers to a registered route, for attaching stages or auth later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteHandle {
    pub(crate) id: usize,
    pub(crate) name: String,
}

impl RouteHandle {
    /// The route's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}
