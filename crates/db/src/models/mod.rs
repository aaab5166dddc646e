//! Row structs for the engine's tables.
//!
//! Each submodule holds a `FromRow` + `Serialize` entity matching the
//! database row, plus the small input structs the repositories take.

pub mod blacklist;
pub mod event;
pub mod number;
pub mod pool;
pub mod reasons_stat;
pub mod schedule;
pub mod team;
pub mod vendor_reservation;
