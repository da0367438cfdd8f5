//! hubsync-core: session model for the AgentHub chat client.
//! Pure state and wire decoding. No async runtime, no network I/O; the
//! runtime crate owns both and feeds this crate one event at a time.

pub mod activity;
pub mod backoff;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod router;
pub mod serde_helpers;
pub mod state;
pub mod tasks;
pub mod types;

pub use activity::{ACTIVITY_LOG_CAPACITY, ActivityEntry, ActivityKind, ActivityLog};
pub use backoff::{DEFAULT_BACKOFF_MS, ReconnectBackoff, backoff_delay};
pub use dispatch::{ChatReply, ChatRequest, Reload, SendOutcome, complete_send, prepare_send};
pub use error::{FrameError, SendRejected};
pub use event::{PushEvent, encode_frame, parse_frame};
pub use router::{Routed, route};
pub use state::SessionState;
pub use tasks::{TaskBoard, TaskPatch, Upsert};
pub use types::*;
