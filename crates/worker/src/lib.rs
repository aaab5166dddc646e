//! The number lifecycle and pool rotation engine.
//!
//! Everything that writes number health or sub-pool activation lives here
//! and runs as periodic jobs under a [`supervisor::TaskSupervisor`]. The
//! engine talks to its collaborators through the ports in [`store`],
//! [`stats`] and [`vendor`].

pub mod config;
pub mod cooldown;
pub mod daily;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod lifecycle;
pub mod manual;
pub mod postgres;
pub mod rotation;
pub mod shutdown;
pub mod stats;
pub mod store;
pub mod supervisor;
pub mod vendor;
pub mod vendor_sync;
