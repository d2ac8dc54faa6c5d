pub mod activity;
pub mod api;
pub mod dispatch;
pub mod outputs;
pub mod progress;
pub mod protocol;
pub mod run;
pub mod workflow;

pub use activity::{ActivityEntry, ActivityLevel, ActivityLog, Notification};
pub use dispatch::{ClientEvent, CloseInfo, ConnectionEvent, Dispatcher, EventName, ListenerId};
pub use outputs::{render_payload, Artifact, OutputStore};
pub use progress::{ProgressTracker, RunOutcome, TaskProgress};
pub use protocol::{CrewMessage, Inbound, OutboundMessage, ProtocolError, WorkflowKind};
pub use run::{RunGuard, RunRejection};
pub use workflow::{OutputCategory, TaskDef, TaskSequence, TaskStatus};
