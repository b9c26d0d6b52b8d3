pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod event_repo;
pub mod feed;
pub mod memory;

pub use booking_repo::PgBookingStore;
pub use database::{DbClient, PgBackend};
pub use event_repo::PgEventStore;
pub use feed::KafkaEventFeed;
pub use memory::{MemoryBackend, MemoryTx};
