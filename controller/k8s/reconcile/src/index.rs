use crate::resource_id::ResourceId;
use accesserator_controller_core::{synthesize, Scope, Target};
use accesserator_controller_k8s_api::{NetworkPolicy, ResourceExt, SecurityConfig};
use ahash::AHashMap as HashMap;
use kubert::{index::NamespacedRemoved, lease::Claim};
use parking_lot::RwLock;
use prometheus_client::{metrics::counter::Counter, registry::Registry};
use std::{collections::BTreeSet, sync::Arc};
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        watch,
    },
    time,
};
use tracing::{debug, error, warn};

pub type SharedIndex = Arc<RwLock<Index>>;

/// Tracks every SecurityConfig in the cluster and emits the changes needed to
/// bring derived NetworkPolicies in line with them.
///
/// The index never performs I/O; updates are handed to the [`Controller`]
/// over a bounded channel. Updates are only emitted while this replica holds
/// the write lease, and resyncs wait until the watch has delivered its
/// initial list so that a partial view never sweeps live policies.
///
/// [`Controller`]: crate::Controller
pub struct Index {
    name: String,
    claims: watch::Receiver<Arc<Claim>>,
    updates: mpsc::Sender<Update>,
    target: Target,
    configs: HashMap<ResourceId, Scope>,
    synced: bool,
    metrics: IndexMetrics,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Update {
    /// Create or replace the NetworkPolicy derived from `owner`.
    Apply {
        owner: ResourceId,
        policy: NetworkPolicy,
    },

    /// Delete the NetworkPolicy derived from `owner`, if it exists.
    Delete { owner: ResourceId, name: String },

    /// Delete every managed NetworkPolicy not owned by one of `owners`.
    Sweep { owners: BTreeSet<ResourceId> },
}

#[derive(Clone, Debug)]
pub struct IndexMetrics {
    sent: Counter,
    dropped: Counter,
}

// === impl Index ===

impl Index {
    pub fn shared(
        name: impl ToString,
        claims: watch::Receiver<Arc<Claim>>,
        updates: mpsc::Sender<Update>,
        target: Target,
        metrics: IndexMetrics,
    ) -> SharedIndex {
        Arc::new(RwLock::new(Self {
            name: name.to_string(),
            claims,
            updates,
            target,
            configs: HashMap::new(),
            synced: false,
            metrics,
        }))
    }

    /// Re-emits the desired state of every SecurityConfig on each `period`,
    /// and immediately whenever the lease changes hands.
    pub async fn run(index: SharedIndex, period: time::Duration) {
        let mut claims = index.read().claims.clone();
        let mut resync = time::interval(period);
        resync.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = resync.tick() => {}
                res = claims.changed() => {
                    if res.is_err() {
                        return;
                    }
                }
            }
            index.read().resync();
        }
    }

    /// Emits an update for every known SecurityConfig followed by a sweep of
    /// NetworkPolicies that no longer have an owner.
    pub fn resync(&self) {
        if !self.is_leader() {
            return;
        }
        if !self.synced {
            debug!("Waiting for the initial SecurityConfig list before resyncing");
            return;
        }

        debug!(configs = self.configs.len(), "Resyncing");
        let mut owners = BTreeSet::new();
        for (id, scope) in self.configs.iter() {
            let update = self.desired(id, scope);
            if let Update::Apply { .. } = update {
                owners.insert(id.clone());
            }
            self.send(update);
        }
        self.send(Update::Sweep { owners });
    }

    fn is_leader(&self) -> bool {
        self.claims.borrow().is_current_for(&self.name)
    }

    fn desired(&self, id: &ResourceId, scope: &Scope) -> Update {
        match synthesize(scope, &self.target) {
            Some(policy) => Update::Apply {
                owner: id.clone(),
                policy,
            },
            None => Update::Delete {
                owner: id.clone(),
                name: id.policy_name(),
            },
        }
    }

    fn send(&self, update: Update) {
        if !self.is_leader() {
            return;
        }

        match self.updates.try_send(update) {
            Ok(()) => {
                self.metrics.sent.inc();
            }
            Err(TrySendError::Full(update)) => {
                // The next resync emits it again.
                warn!(op = update.op(), "Update queue full; dropping update");
                self.metrics.dropped.inc();
            }
            Err(TrySendError::Closed(update)) => {
                error!(op = update.op(), "Update queue closed");
                self.metrics.dropped.inc();
            }
        }
    }
}

impl kubert::index::IndexNamespacedResource<SecurityConfig> for Index {
    fn apply(&mut self, config: SecurityConfig) {
        let Some(namespace) = config.namespace() else {
            warn!(name = %config.name_any(), "Ignoring SecurityConfig without a namespace");
            return;
        };
        let id = ResourceId::new(namespace, config.name_any());

        // Status and metadata changes don't affect the derived policy.
        if self
            .configs
            .get(&id)
            .is_some_and(|scope| scope.security_config.spec == config.spec)
        {
            return;
        }

        let scope = Scope::from_config(config);
        let update = self.desired(&id, &scope);
        self.configs.insert(id, scope);
        self.send(update);
    }

    fn delete(&mut self, namespace: String, name: String) {
        let id = ResourceId::new(namespace, name);
        self.configs.remove(&id);
        let name = id.policy_name();
        self.send(Update::Delete { owner: id, name });
    }

    /// Called once the watch has (re)listed every SecurityConfig.
    fn reset(&mut self, configs: Vec<SecurityConfig>, removed: NamespacedRemoved) {
        for config in configs {
            self.apply(config);
        }
        for (namespace, names) in removed {
            for name in names {
                self.delete(namespace.clone(), name);
            }
        }

        if !self.synced {
            debug!(configs = self.configs.len(), "Initial SecurityConfig list indexed");
            self.synced = true;
        }
    }
}

// === impl Update ===

impl Update {
    pub fn op(&self) -> &'static str {
        match self {
            Self::Apply { .. } => "apply",
            Self::Delete { .. } => "delete",
            Self::Sweep { .. } => "sweep",
        }
    }
}

// === impl IndexMetrics ===

impl IndexMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let sent = Counter::default();
        reg.register(
            "updates_sent",
            "Count of NetworkPolicy updates sent to the controller",
            sent.clone(),
        );

        let dropped = Counter::default();
        reg.register(
            "updates_dropped",
            "Count of NetworkPolicy updates dropped because the queue was full",
            dropped.clone(),
        );

        Self { sent, dropped }
    }
}
