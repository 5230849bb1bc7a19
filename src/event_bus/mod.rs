pub mod tokio_bus;
pub mod traits;

pub use tokio_bus::TokioBroadcastBus;
pub use traits::{AppEvent, EventBus};
