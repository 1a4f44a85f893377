pub mod monitor;
pub mod movement;
pub mod sources;

pub use monitor::MovementMonitor;
pub use movement::{format_trigger_type, MovementDetector};
