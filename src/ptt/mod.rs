/// Coordinator task and monitoring lifecycle
pub mod coordinator;
/// Duplicate-event filter
pub mod dedup;
/// Press/release state machine
pub mod machine;

pub use coordinator::{MonitorError, PushToTalkDelegate, PushToTalkMonitor, StartAck};
pub use machine::{MachineState, PressState, PushToTalkSettings, StartOutcome};
