//! Background services: the collector scheduler/publisher and the push task.

pub mod collector;
pub mod events;
pub mod push;

pub use collector::Collector;
pub use events::{Event, HistorySample, PushStatus, PushTestResult, ScanState, SiteStatus, StatusSnapshot};
pub use push::{PushService, PushState};
