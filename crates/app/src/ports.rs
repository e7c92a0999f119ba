//! Port definitions: traits that adapters implement.
//!
//! Ports are the boundaries between the application core and the outside world.
//! They are defined here (in `app`) so that both the scheduler and the adapter
//! layer can depend on them without creating circular dependencies.

pub mod clock;
pub mod device;
pub mod event_bus;

pub use clock::{Clock, ManualClock, SystemClock};
pub use device::DeviceCapability;
pub use event_bus::EventPublisher;
