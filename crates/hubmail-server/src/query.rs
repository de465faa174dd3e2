//! Translation of list-request paging options into a store [`Query`].

use hubmail_shared::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use hubmail_shared::{MessageId, MessageStatus};
use hubmail_store::Query;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Unknown message status: {0}")]
    UnknownStatus(i32),
}

/// Effective page size: non-positive means the default, anything above the
/// maximum is clamped.
pub fn page_size(limit: i64) -> usize {
    if limit <= 0 {
        DEFAULT_PAGE_SIZE
    } else {
        usize::try_from(limit).map_or(MAX_PAGE_SIZE, |n| n.min(MAX_PAGE_SIZE))
    }
}

/// Build the query for one page of a mailbox collection.
///
/// Seek is exclusive. A descending walk with no seek starts from the
/// largest possible message id, so the first page holds the newest messages.
pub fn mailbox_query(
    seek: &str,
    limit: i64,
    ascending: bool,
    status: i32,
) -> Result<Query, QueryError> {
    let status = MessageStatus::from_wire(status).ok_or(QueryError::UnknownStatus(status))?;

    let mut query = Query::new().limit_to(page_size(limit));
    query = if ascending {
        let query = query.order_by_id();
        if seek.is_empty() {
            query
        } else {
            query.seek_id(seek)
        }
    } else {
        let seek = if seek.is_empty() {
            MessageId::ceiling().to_string()
        } else {
            seek.to_string()
        };
        query.order_by_id_desc().seek_id(seek)
    };

    Ok(match status {
        MessageStatus::Read => query.and("read_at").gt(0),
        MessageStatus::Unread => query.and("read_at").eq(0),
        MessageStatus::All | MessageStatus::Unspecified => query,
    })
}
