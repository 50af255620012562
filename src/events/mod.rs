//! Live upload notifications.
//!
//! `registry` tracks connected subscribers and fans events out to them,
//! `subscription` is the per-connection receiving stream, and `handler`
//! exposes it as `GET /events`.

pub mod handler;
pub mod registry;
pub mod subscription;

use serde::{Deserialize, Serialize};

pub use registry::{
    BroadcastReport, Frame, SubscriberId, SubscriberRegistry, SubscriberSink,
    DEFAULT_CHANNEL_CAPACITY,
};
pub use subscription::Subscription;

/// Announced to subscribers once per successful upload, and returned to the
/// uploader as the response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEvent {
    /// Name of the file as sent by the client
    pub filename: String,
    /// Location the file was stored at
    pub path: String,
}
