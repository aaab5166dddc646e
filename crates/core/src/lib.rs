pub mod error;
pub mod event_types;
pub mod lifecycle;
pub mod phone;
pub mod rotation;
pub mod schedule;
pub mod strategy;
pub mod types;
