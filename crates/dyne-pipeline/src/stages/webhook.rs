//! Documentation-only stage marking a route as a webhook.

use http::Method;

use crate::metadata::{StageKind, StageMetadata, WebhookDoc};
use crate::stage::Stage;

/// Marks the route as an outbound webhook description.
#[derive(Debug, Clone)]
pub struct WebhookStage {
    name: Option<String>,
    group: Option<String>,
    method: Method,
}

impl Default for WebhookStage {
    fn default() -> Self {
        Self {
            name: None,
            group: None,
            method: Method::GET,
        }
    }
}

impl WebhookStage {
    /// A `GET` webhook named after its route.
    pub fn new() -> Self {
        Self::default()
    }

    /// Webhook name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Group the webhook is listed under.
    #[must_use]
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Delivery method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }
}

impl Stage for WebhookStage {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn metadata(&self) -> StageMetadata {
        StageMetadata {
            webhook: Some(WebhookDoc {
                name: self.name.clone(),
                group: self.group.clone(),
                method: self.method.to_string(),
            }),
            ..StageMetadata::new(StageKind::Webhook)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_metadata() {
        let meta = WebhookStage::new().named("item_created").method(Method::POST).metadata();
        assert_eq!(
            serde_json::to_value(&meta).unwrap(),
            serde_json::json!({"kind": "webhook", "webhook": {"name": "item_created", "method": "POST"}})
        );
    }
}
