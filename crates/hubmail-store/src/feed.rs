//! Per-collection change feed.

use futures::stream::{self, BoxStream, StreamExt};
use hubmail_shared::protocol::ChangeEvent;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::error::{Result, StoreError};

/// Stream of changes to one collection. A listener that falls too far
/// behind receives [`StoreError::Lagged`] and the stream ends.
pub type ChangeStream = BoxStream<'static, Result<ChangeEvent>>;

#[derive(Debug, Clone)]
pub(crate) struct FeedItem {
    pub db_id: String,
    pub collection: String,
    pub event: ChangeEvent,
}

pub(crate) fn subscribe(
    rx: broadcast::Receiver<FeedItem>,
    db_id: String,
    collection: String,
) -> ChangeStream {
    stream::unfold(Some(rx), move |state| {
        let db_id = db_id.clone();
        let collection = collection.clone();
        async move {
            let mut rx = state?;
            loop {
                match rx.recv().await {
                    Ok(item) if item.db_id == db_id && item.collection == collection => {
                        return Some((Ok(item.event), Some(rx)));
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(%db_id, %collection, missed, "change listener lagged");
                        return Some((Err(StoreError::Lagged(missed)), None));
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        }
    })
    .boxed()
}
