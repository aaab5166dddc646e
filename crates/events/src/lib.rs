//! Engine event bus and notification delivery.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PlatformEvent`]: the event envelope published by the engine jobs.
//! - [`EventPersistence`]: writes every event to the `events` table.
//! - [`TeamNotifier`]: emails teams about blocks and exhausted pools and
//!   posts operational alerts to a webhook.

pub mod bus;
pub mod delivery;
pub mod notifier;
pub mod persistence;

pub use bus::{EventBus, PlatformEvent};
pub use delivery::email::{EmailConfig, EmailDelivery};
pub use delivery::webhook::WebhookDelivery;
pub use notifier::{NotifierConfig, TeamNotifier};
pub use persistence::EventPersistence;
