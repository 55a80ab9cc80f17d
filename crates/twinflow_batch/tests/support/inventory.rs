#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use twinflow_batch::adapters::object_store::ObjectInventory;
use twinflow_batch::error::Result;
use twinflow_core::inventory::ObjectEntry;

#[derive(Debug, Default)]
pub struct FakeInventory {
    objects: Mutex<Vec<ObjectEntry>>,
}

impl FakeInventory {
    pub fn with_objects(objects: &[(&str, i64)]) -> Self {
        Self {
            objects: Mutex::new(
                objects
                    .iter()
                    .map(|(key, size)| ObjectEntry::new(*key, *size))
                    .collect(),
            ),
        }
    }

    pub fn remove(&self, key: &str) {
        self.objects
            .lock()
            .expect("fake inventory lock should not be poisoned")
            .retain(|object| object.key != key);
    }
}

#[async_trait]
impl ObjectInventory for FakeInventory {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectEntry>> {
        Ok(self
            .objects
            .lock()
            .expect("fake inventory lock should not be poisoned")
            .iter()
            .filter(|object| object.key.starts_with(prefix))
            .cloned()
            .collect())
    }
}
