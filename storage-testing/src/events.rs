// SPDX-License-Identifier: GPL-3.0-only

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use storage_contracts::{EventSink, StorageError};
use storage_types::DiskEvent;

/// Event sink that keeps every published event.
#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<(ObjectReference, DiskEvent)>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiskEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.reason).collect()
    }

    pub fn count(&self, reason: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| event.reason == reason)
            .count()
    }

    /// Events of `reason` about `device`.
    pub fn for_device(&self, reason: &str, device: &str) -> Vec<DiskEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.reason == reason && event.device == device)
            .collect()
    }
}

#[async_trait]
impl EventSink for RecordingEvents {
    async fn publish(
        &self,
        regarding: &ObjectReference,
        event: &DiskEvent,
    ) -> Result<(), StorageError> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((regarding.clone(), event.clone()));
        Ok(())
    }
}
