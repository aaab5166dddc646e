//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod blacklist_repo;
pub mod event_repo;
pub mod number_repo;
pub mod pool_repo;
pub mod reasons_stat_repo;
pub mod schedule_repo;
pub mod team_repo;
pub mod vendor_reservation_repo;

pub use blacklist_repo::BlacklistRepo;
pub use event_repo::EventRepo;
pub use number_repo::NumberRepo;
pub use pool_repo::PoolRepo;
pub use reasons_stat_repo::ReasonsStatRepo;
pub use schedule_repo::ScheduleRepo;
pub use team_repo::TeamRepo;
pub use vendor_reservation_repo::VendorReservationRepo;
