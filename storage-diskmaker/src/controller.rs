// SPDX-License-Identifier: GPL-3.0-only

//! Controller wiring: one kube controller per owner kind, a PV watch feeding
//! the observer, and owner re-enqueues routed back into the controllers.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::channel::mpsc as trigger;
use futures::{StreamExt, future};
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::core::v1::PersistentVolume;
use kube::api::Api;
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Client, Resource, ResourceExt};
use storage_types::{
    LOCAL_VOLUME_KIND, LOCAL_VOLUME_SET_KIND, LocalVolume, LocalVolumeSet, OwnerIdentity,
    provisioner_name,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::context::DaemonContext;
use crate::error::{DiskmakerError, Result};
use crate::observer::{Observer, PvEvent};
use crate::pv::with_timeout;
use crate::reconcile::{
    DEFAULT_REQUEUE, FAST_REQUEUE, Requeue, reconcile_local_volume, reconcile_local_volume_set,
};

/// Shared by both controllers.
pub struct ControllerContext {
    pub daemon: Arc<DaemonContext>,

    /// Namespaces owners are accepted from; empty accepts all
    pub namespaces: HashSet<String>,
}

impl ControllerContext {
    fn watches(&self, namespace: &str) -> bool {
        self.namespaces.is_empty() || self.namespaces.contains(namespace)
    }
}

fn to_action(requeue: Requeue) -> Action {
    match requeue {
        Requeue::After(after) => Action::requeue(after),
        Requeue::AwaitChange => Action::await_change(),
    }
}

fn owner_ref<K>(owner: &OwnerIdentity) -> ObjectRef<K>
where
    K: Resource<DynamicType = ()>,
{
    ObjectRef::new(&owner.name).within(&owner.namespace)
}

async fn reconcile_lv(lv: Arc<LocalVolume>, ctx: Arc<ControllerContext>) -> Result<Action> {
    let namespace = lv.namespace().unwrap_or_default();
    if !ctx.watches(&namespace) {
        return Ok(Action::await_change());
    }
    reconcile_local_volume(&ctx.daemon, &namespace, &lv.name_any())
        .await
        .map(to_action)
}

async fn reconcile_lvset(lvset: Arc<LocalVolumeSet>, ctx: Arc<ControllerContext>) -> Result<Action> {
    let namespace = lvset.namespace().unwrap_or_default();
    if !ctx.watches(&namespace) {
        return Ok(Action::await_change());
    }
    reconcile_local_volume_set(&ctx.daemon, &namespace, &lvset.name_any())
        .await
        .map(to_action)
}

/// Transient failures retry quickly, everything else on the default period.
fn error_policy<K: Resource>(object: Arc<K>, error: &DiskmakerError, _ctx: Arc<ControllerContext>) -> Action {
    let duration = if error.is_transient() {
        FAST_REQUEUE
    } else {
        DEFAULT_REQUEUE
    };
    let when = chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| Utc::now().checked_add_signed(delta));
    warn!(
        owner = %object.name_any(),
        retry_at = ?when.map(|when| when.to_rfc3339()),
        "reconcile failed: {error}"
    );
    Action::requeue(duration)
}

/// Owners are watched cluster-wide unless exactly one namespace is configured.
fn owner_api<K>(client: &Client, namespaces: &HashSet<String>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match namespaces.iter().next() {
        Some(namespace) if namespaces.len() == 1 => Api::namespaced(client.clone(), namespace),
        _ => Api::all(client.clone()),
    }
}

/// Route owner identities from the observer to the controller of their kind.
async fn route_owners(
    mut owners: mpsc::UnboundedReceiver<OwnerIdentity>,
    lv: trigger::UnboundedSender<ObjectRef<LocalVolume>>,
    lvset: trigger::UnboundedSender<ObjectRef<LocalVolumeSet>>,
) {
    while let Some(owner) = owners.recv().await {
        let sent = match owner.kind.as_str() {
            LOCAL_VOLUME_KIND => lv.unbounded_send(owner_ref(&owner)).is_ok(),
            LOCAL_VOLUME_SET_KIND => lvset.unbounded_send(owner_ref(&owner)).is_ok(),
            other => {
                debug!(kind = other, "ignoring owner of unknown kind");
                true
            }
        };
        if !sent {
            break;
        }
    }
}

/// Feed PV changes into the observer until the watch ends.
async fn observe_pvs(client: Client, observer: Observer) {
    let pvs: Api<PersistentVolume> = Api::all(client);
    let mut events = watcher(pvs, watcher::Config::default())
        .default_backoff()
        .boxed();

    while let Some(event) = events.next().await {
        match event {
            Ok(watcher::Event::Apply(pv) | watcher::Event::InitApply(pv)) => {
                observer.handle(PvEvent::Applied(pv));
            }
            Ok(watcher::Event::Delete(pv)) => observer.handle(PvEvent::Deleted(pv)),
            Ok(watcher::Event::Init | watcher::Event::InitDone) => {}
            Err(e) => warn!("PV watch error: {e}"),
        }
    }
}

async fn drain<K, S>(name: &'static str, results: S)
where
    K: Resource,
    S: futures::Stream<
        Item = std::result::Result<
            (ObjectRef<K>, Action),
            controller::Error<DiskmakerError, watcher::Error>,
        >,
    >,
{
    results
        .for_each(|result| async move {
            match result {
                Ok((object, action)) => trace!(controller = name, %object, ?action, "reconciled"),
                Err(e) => trace!(controller = name, "controller error: {e}"),
            }
        })
        .await;
}

fn controller_config() -> controller::Config {
    controller::Config::default().concurrency(1)
}

/// Run both owner controllers and the PV observer until `shutdown` fires.
pub async fn run(
    client: Client,
    daemon: Arc<DaemonContext>,
    namespaces: Vec<String>,
    shutdown: CancellationToken,
) -> Result<()> {
    let node_name = daemon.settings.node_name.clone();
    let node = with_timeout("get node", daemon.api.get_node(&node_name)).await?;
    let provisioner = provisioner_name(&node_name, &node.uid().unwrap_or_default());
    info!(node = %node_name, provisioner = %provisioner, "starting controllers");

    let (owner_tx, owner_rx) = mpsc::unbounded_channel();
    let (lv_tx, lv_triggers) = trigger::unbounded();
    let (lvset_tx, lvset_triggers) = trigger::unbounded();
    let observer = Observer::new(
        provisioner,
        daemon.cache.clone(),
        daemon.owner_index.clone(),
        owner_tx,
    );

    let namespaces: HashSet<String> = namespaces.into_iter().collect();
    let ctx = Arc::new(ControllerContext {
        daemon,
        namespaces,
    });

    let lv_controller = Controller::new(
        owner_api::<LocalVolume>(&client, &ctx.namespaces),
        watcher::Config::default(),
    )
    .with_config(controller_config())
    .reconcile_on(lv_triggers)
    .run(reconcile_lv, error_policy, ctx.clone());

    let lvset_controller = Controller::new(
        owner_api::<LocalVolumeSet>(&client, &ctx.namespaces),
        watcher::Config::default(),
    )
    .with_config(controller_config())
    .reconcile_on(lvset_triggers)
    .run(reconcile_lvset, error_policy, ctx.clone());

    let work = future::join4(
        drain("local-volume", lv_controller),
        drain("local-volume-set", lvset_controller),
        observe_pvs(client, observer),
        route_owners(owner_rx, lv_tx, lvset_tx),
    );

    tokio::select! {
        _ = work => warn!("controllers stopped unexpectedly"),
        _ = shutdown.cancelled() => info!("shutdown requested, stopping controllers"),
    }
    Ok(())
}
