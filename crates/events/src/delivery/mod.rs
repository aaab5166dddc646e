//! External delivery channels: team email and the alert webhook.

pub mod email;
pub mod webhook;
