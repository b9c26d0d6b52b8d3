pub mod engine;
pub mod replication;
pub mod status;

pub use engine::{BookingService, Clock};
pub use replication::{EventMessage, EventReplicator, ReplicationError};
pub use status::EventStatus;
