use serde::{Deserialize, Serialize};

use crate::contract::CorrelationKey;
use crate::error::NamingError;
use crate::naming::parse_item_key;

/// Objects at or below this size are folder markers or empty placeholders.
pub const PLACEHOLDER_MAX_BYTES: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub key: String,
    pub size: i64,
}

impl ObjectEntry {
    pub fn new(key: impl Into<String>, size: i64) -> Self {
        Self {
            key: key.into(),
            size,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.size <= PLACEHOLDER_MAX_BYTES
    }
}

/// A unit of required work discovered in the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub key: CorrelationKey,
    pub object_key: String,
}

pub fn retain_payload_objects(entries: Vec<ObjectEntry>) -> Vec<ObjectEntry> {
    entries
        .into_iter()
        .filter(|entry| !entry.is_placeholder())
        .collect()
}

/// Maps inventory objects to work items. Fails on the first object whose name
/// does not carry a key; no partial list is returned.
pub fn work_items(entries: &[ObjectEntry]) -> Result<Vec<WorkItem>, NamingError> {
    entries
        .iter()
        .filter(|entry| !entry.is_placeholder())
        .map(|entry| {
            Ok(WorkItem {
                key: parse_item_key(&entry.key)?,
                object_key: entry.key.clone(),
            })
        })
        .collect()
}
