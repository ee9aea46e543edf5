// SPDX-License-Identifier: GPL-3.0-only

//! Owner teardown: release unbound PVs and hold the finalizer until the
//! owner has nothing left on the cluster.

use std::collections::HashSet;

use k8s_openapi::api::core::v1::{ObjectReference, PersistentVolume};
use kube::ResourceExt;
use storage_types::events;
use tracing::info;
use uuid::Uuid;

use crate::cache::{PHASE_BOUND, PHASE_RELEASED, pv_phase};
use crate::context::DaemonContext;
use crate::error::Result;
use crate::pv::{RECLAIM_RETAIN, with_timeout};
use crate::runtime::RuntimeConfig;

use super::{note_device, warn_owner};

/// Prefix of the synthetic claim name used to force a PV into Released.
pub const RELEASE_CLAIM_PREFIX: &str = "release-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownState {
    /// Bound or retained PVs keep the finalizer in place
    Blocked,

    /// PVs are on their way out; check again soon
    Pending,

    /// Nothing owned remains; the finalizer may go
    Complete,
}

/// Every PV on the cluster labeled with this owner.
pub async fn owned_pvs(ctx: &DaemonContext, rt: &RuntimeConfig) -> Result<Vec<PersistentVolume>> {
    with_timeout(
        "list owned PVs",
        ctx.api.list_persistent_volumes(&rt.owner.label_selector()),
    )
    .await
}

pub fn pv_names(pvs: &[PersistentVolume]) -> HashSet<String> {
    pvs.iter().map(ResourceExt::name_any).collect()
}

pub async fn run(
    ctx: &DaemonContext,
    rt: &RuntimeConfig,
    owned: Vec<PersistentVolume>,
) -> Result<TeardownState> {
    let bound: Vec<String> = owned
        .iter()
        .filter(|pv| pv_phase(pv) == PHASE_BOUND)
        .map(ResourceExt::name_any)
        .collect();
    if !bound.is_empty() {
        warn_owner(
            ctx,
            rt,
            events::DELETION_BLOCKED,
            format!("{} cannot be deleted while PVs are bound: {bound:?}", rt.owner),
        )
        .await;
        return Ok(TeardownState::Blocked);
    }

    let mut retained = Vec::new();
    let mut remaining = 0;
    for mut pv in owned {
        let name = pv.name_any();
        let released = pv_phase(&pv) == PHASE_RELEASED;
        let spec = pv.spec.get_or_insert_with(Default::default);
        if spec.persistent_volume_reclaim_policy.as_deref() == Some(RECLAIM_RETAIN) {
            retained.push(name);
            continue;
        }
        remaining += 1;

        if released || spec.claim_ref.is_some() {
            continue;
        }
        let uid = Uuid::new_v4().to_string();
        spec.claim_ref = Some(ObjectReference {
            api_version: Some("v1".to_string()),
            kind: Some("PersistentVolumeClaim".to_string()),
            namespace: Some(rt.owner.namespace.clone()),
            name: Some(format!("{RELEASE_CLAIM_PREFIX}{uid}")),
            uid: Some(uid),
            ..Default::default()
        });
        let updated = with_timeout("release PV", ctx.api.update_persistent_volume(&pv)).await?;
        ctx.cache.add_or_update(updated);
        note_device(
            ctx,
            rt,
            events::RELEASED_AVAILABLE_PV,
            &name,
            format!("released available PV {name} for owner deletion"),
        )
        .await;
    }

    if !retained.is_empty() {
        warn_owner(
            ctx,
            rt,
            events::DELETION_BLOCKED,
            format!(
                "{} cannot be deleted while PVs with the Retain policy exist: {retained:?}",
                rt.owner
            ),
        )
        .await;
        return Ok(TeardownState::Blocked);
    }
    if remaining > 0 {
        return Ok(TeardownState::Pending);
    }

    let classes = with_timeout(
        "list owned storage classes",
        ctx.api.list_storage_classes(&rt.owner.label_selector()),
    )
    .await?;
    for class in classes {
        let name = class.name_any();
        with_timeout("delete storage class", ctx.api.delete_storage_class(&name)).await?;
        info!(storage_class = %name, "deleted owned storage class");
    }

    Ok(TeardownState::Complete)
}
