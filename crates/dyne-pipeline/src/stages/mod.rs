//! Built-in stages.

mod expect;
mod input;
mod output;
mod webhook;

pub use expect::ExpectStage;
pub use input::InputStage;
pub use output::OutputStage;
pub use webhook::WebhookStage;
