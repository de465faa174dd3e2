//! Collection layout of a mailbox database.

use hubmail_shared::constants::{INBOX_COLLECTION, SENTBOX_COLLECTION};
use hubmail_store::CollectionConfig;

pub fn mailbox_collections() -> Vec<CollectionConfig> {
    vec![
        CollectionConfig::new(INBOX_COLLECTION, &["from", "to", "created_at", "read_at"]),
        CollectionConfig::new(SENTBOX_COLLECTION, &["from", "to", "created_at"]),
    ]
}
