pub mod engine;
pub mod error;
pub mod metrics;
pub mod telemetry;

pub use engine::{Attack, SlowBodyRead, Slowloris, Target};
pub use error::{AttackError, Result};
pub use telemetry::{AsyncEventHandler, Event, EventHandler, EventName};
