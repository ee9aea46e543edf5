// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;

use storage_types::DiskEvent;

use crate::StorageError;

/// Publishes diagnostic events against an object.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(
        &self,
        regarding: &ObjectReference,
        event: &DiskEvent,
    ) -> Result<(), StorageError>;
}
