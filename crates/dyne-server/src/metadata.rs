//! Route metadata for documentation generators.
//!
//! The aggregator is a plain, serializable view of the registry: one entry
//! per live route in registration order, with the route's auth requirement
//! and the descriptors of its pipeline stages. Rendering it into OpenAPI or
//! any other format is the consumer's business.

use dyne_auth::{AuthRequirement, SchemeDoc, SchemeKind};
use dyne_pipeline::StageMetadata;
use dyne_router::Protocol;
use indexmap::IndexMap;
use serde::Serialize;

/// Everything documented about one route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteMetadata {
    /// Route name.
    pub name: String,
    /// Path template.
    pub template: String,
    /// Accepted methods.
    pub methods: Vec<String>,
    /// Protocol kind.
    pub protocol: Protocol,
    /// Auth requirement, for gated routes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthRequirement>,
    /// Stage descriptors in declaration order.
    pub stages: Vec<StageMetadata>,
}

/// Ordered route metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetadataAggregator {
    routes: Vec<RouteMetadata>,
}

impl MetadataAggregator {
    /// Creates an empty aggregator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a route entry.
    pub fn push(&mut self, route: RouteMetadata) {
        self.routes.push(route);
    }

    /// All entries, in registration order.
    #[must_use]
    pub fn export(&self) -> &[RouteMetadata] {
        &self.routes
    }

    /// Looks up an entry by route name.
    #[must_use]
    pub fn route(&self, name: &str) -> Option<&RouteMetadata> {
        self.routes.iter().find(|r| r.name == name)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns true if no routes are documented.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Names every distinct credential scheme in use.
    ///
    /// Names follow the kind (`basic_auth`, `digest_auth`, `token_auth`,
    /// `api_key`); a second, differently configured scheme of the same kind
    /// gets `_2`, a third `_3`, and so on. Order is first use.
    #[must_use]
    pub fn security_schemes(&self) -> IndexMap<String, SchemeDoc> {
        let mut named: IndexMap<String, SchemeDoc> = IndexMap::new();
        let docs = self
            .routes
            .iter()
            .filter_map(|r| r.auth.as_ref())
            .flat_map(|auth| auth.schemes.iter());

        for doc in docs {
            if named.values().any(|seen| seen == doc) {
                continue;
            }
            let base = match doc.kind {
                SchemeKind::Basic => "basic_auth",
                SchemeKind::Digest => "digest_auth",
                SchemeKind::Token => "token_auth",
                SchemeKind::ApiKey => "api_key",
            };
            let mut name = base.to_string();
            let mut n = 2;
            while named.contains_key(&name) {
                name = format!("{base}_{n}");
                n += 1;
            }
            named.insert(name, doc.clone());
        }
        named
    }
}
