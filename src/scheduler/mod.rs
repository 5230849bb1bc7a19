pub mod heartbeat;

pub use heartbeat::{HEARTBEAT_OK, heartbeat_path, parse_unchecked_items};
