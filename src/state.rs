use std::time::Duration;

use crate::db::DbPool;
use crate::events::SubscriberRegistry;
use crate::uploads::BlobStore;

/// Shared application state passed to all handlers via axum State extractor.
#[derive(Clone)]
pub struct AppState {
    /// SQLite connection wrapped in Arc<Mutex>
    pub db: DbPool,
    /// Connected `/events` subscribers
    pub subscribers: SubscriberRegistry,
    /// Destination for uploaded files
    pub blobs: BlobStore,
    /// SSE keep-alive comment interval; `None` disables keep-alives
    pub keep_alive: Option<Duration>,
}
