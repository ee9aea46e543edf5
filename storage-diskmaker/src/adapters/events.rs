// SPDX-License-Identifier: GPL-3.0-only

//! `EventSink` over the kube event recorder

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube::runtime::events::{Event, EventType as KubeEventType, Recorder, Reporter};

use storage_contracts::{EventSink, StorageError, StorageErrorKind};
use storage_types::{DiskEvent, EventType};

/// Action recorded on every diskmaker event.
const EVENT_ACTION: &str = "Provisioning";

#[derive(Clone)]
pub struct RecorderEventSink {
    recorder: Recorder,
}

impl RecorderEventSink {
    pub fn new(client: Client, reporter: Reporter) -> Self {
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

fn to_kube_event(event: &DiskEvent) -> Event {
    let type_ = match event.event_type {
        EventType::Normal => KubeEventType::Normal,
        EventType::Warning => KubeEventType::Warning,
    };
    Event {
        type_,
        reason: event.reason.clone(),
        note: Some(event.message.clone()),
        action: EVENT_ACTION.to_string(),
        secondary: None,
    }
}

#[async_trait]
impl EventSink for RecorderEventSink {
    async fn publish(
        &self,
        regarding: &ObjectReference,
        event: &DiskEvent,
    ) -> Result<(), StorageError> {
        self.recorder
            .publish(&to_kube_event(event), regarding)
            .await
            .map_err(|e| {
                StorageError::new(
                    StorageErrorKind::Unavailable,
                    format!("publish event {}: {e}", event.reason),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_event_fields() {
        let event = to_kube_event(
            &DiskEvent::warning("ErrorWipingDevice", "wipefs failed").with_device("sdb"),
        );
        assert!(matches!(event.type_, KubeEventType::Warning));
        assert_eq!(event.reason, "ErrorWipingDevice");
        assert_eq!(event.note.as_deref(), Some("wipefs failed"));
        assert_eq!(event.action, EVENT_ACTION);
    }
}
