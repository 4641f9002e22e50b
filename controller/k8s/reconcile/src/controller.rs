use crate::{index::Update, resource_id::ResourceId};
use accesserator_controller_k8s_api::{
    labels,
    store::{self, ReconcileStore, StoreError},
    NetworkPolicy, ResourceExt,
};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};
use std::{collections::BTreeSet, future::Future};
use tokio::{sync::mpsc, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Applies [`Update`]s to the store.
///
/// Every operation is an idempotent upsert or delete keyed by the derived
/// name, so an update may be delivered any number of times. Failed updates are
/// not retried here; the index's next resync delivers them again.
pub struct Controller<S> {
    store: S,
    namespace: String,
    updates: mpsc::Receiver<Update>,
    timeout: time::Duration,
    cancel: CancellationToken,
    metrics: ControllerMetrics,
}

/// What applying a single update did.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Replaced,
    Unchanged,
    Deleted,
    /// The object to delete was already gone.
    Absent,
    Swept(usize),
}

#[derive(Clone, Debug)]
pub struct ControllerMetrics {
    outcomes: Family<OutcomeLabels, Counter>,
    failures: Family<OpLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OutcomeLabels {
    outcome: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OpLabels {
    op: &'static str,
}

// === impl Controller ===

impl<S: ReconcileStore> Controller<S> {
    pub fn new(
        store: S,
        namespace: impl ToString,
        updates: mpsc::Receiver<Update>,
        timeout: time::Duration,
        cancel: CancellationToken,
        metrics: ControllerMetrics,
    ) -> Self {
        Self {
            store,
            namespace: namespace.to_string(),
            updates,
            timeout,
            cancel,
            metrics,
        }
    }

    pub async fn run(mut self) {
        loop {
            let update = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                update = self.updates.recv() => match update {
                    Some(update) => update,
                    None => return,
                },
            };

            let op = update.op();
            match self.process(update).await {
                Ok(outcome) => {
                    debug!(op, ?outcome);
                    self.metrics.record(outcome);
                }
                Err(error) => {
                    warn!(op, %error, "Failed to reconcile NetworkPolicy");
                    self.metrics.failures.get_or_create(&OpLabels { op }).inc();
                }
            }
        }
    }

    pub async fn process(&self, update: Update) -> Result<Outcome, StoreError> {
        match update {
            Update::Apply { owner, policy } => self.apply(&owner, policy).await,
            Update::Delete { owner, name } => self.delete(&owner, &name).await,
            Update::Sweep { owners } => self.sweep(&owners).await,
        }
    }

    async fn apply(&self, owner: &ResourceId, policy: NetworkPolicy) -> Result<Outcome, StoreError> {
        let name = policy.name_any();
        let current = match self
            .call(self.store.get_network_policy(&self.namespace, &name))
            .await
        {
            Ok(current) => current,
            Err(StoreError::NotFound) => {
                self.call(self.store.create_network_policy(&policy)).await?;
                info!(%owner, policy = %name, "Created NetworkPolicy");
                return Ok(Outcome::Created);
            }
            Err(error) => return Err(error),
        };

        let labelled = policy
            .labels()
            .iter()
            .all(|(k, v)| current.labels().get(k) == Some(v));
        if labelled && current.spec == policy.spec {
            return Ok(Outcome::Unchanged);
        }

        // Keep labels others have added to the live object.
        let mut labels = current.labels().clone();
        labels.extend(policy.labels().clone());
        let mut policy = policy;
        policy.metadata.labels = Some(labels);
        policy.metadata.resource_version = current.metadata.resource_version;
        self.call(self.store.replace_network_policy(&policy)).await?;
        info!(%owner, policy = %name, "Updated NetworkPolicy");
        Ok(Outcome::Replaced)
    }

    async fn delete(&self, owner: &ResourceId, name: &str) -> Result<Outcome, StoreError> {
        match self
            .call(self.store.delete_network_policy(&self.namespace, name))
            .await
        {
            Ok(()) => {
                info!(%owner, policy = %name, "Deleted NetworkPolicy");
                Ok(Outcome::Deleted)
            }
            Err(StoreError::NotFound) => Ok(Outcome::Absent),
            Err(error) => Err(error),
        }
    }

    /// Deletes managed NetworkPolicies that are not the derived policy of a
    /// live owner.
    async fn sweep(&self, owners: &BTreeSet<ResourceId>) -> Result<Outcome, StoreError> {
        let policies = self
            .call(
                self.store
                    .list_network_policies(&self.namespace, &labels::managed_selector()),
            )
            .await?;

        // Derived names are unique per owner, so a policy is live exactly when
        // its name is the derived name of a live owner.
        let live = owners
            .iter()
            .map(ResourceId::policy_name)
            .collect::<BTreeSet<_>>();

        let mut swept = 0;
        for policy in policies {
            let name = policy.name_any();
            if live.contains(&name) {
                continue;
            }

            match self
                .call(self.store.delete_network_policy(&self.namespace, &name))
                .await
            {
                Ok(()) => {
                    info!(policy = %name, "Deleted orphaned NetworkPolicy");
                    swept += 1;
                }
                Err(StoreError::NotFound) => {}
                Err(error) => return Err(error),
            }
        }

        Ok(Outcome::Swept(swept))
    }

    /// Bounds a store call by the operation timeout and the shutdown signal.
    async fn call<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let timeout = self.timeout;
        store::cancelable(&self.cancel, async move {
            match time::timeout(timeout, call).await {
                Ok(res) => res,
                Err(_) => Err(StoreError::Timeout(timeout)),
            }
        })
        .await
    }
}

// === impl ControllerMetrics ===

impl ControllerMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let outcomes = Family::<OutcomeLabels, Counter>::default();
        reg.register(
            "outcomes",
            "Count of NetworkPolicy operations by outcome",
            outcomes.clone(),
        );

        let failures = Family::<OpLabels, Counter>::default();
        reg.register(
            "failures",
            "Count of updates that failed to apply",
            failures.clone(),
        );

        Self { outcomes, failures }
    }

    fn record(&self, outcome: Outcome) {
        let (outcome, n) = match outcome {
            Outcome::Created => ("created", 1),
            Outcome::Replaced => ("replaced", 1),
            Outcome::Unchanged => ("unchanged", 1),
            Outcome::Deleted => ("deleted", 1),
            Outcome::Absent => ("absent", 1),
            Outcome::Swept(n) => ("swept", n as u64),
        };
        self.outcomes
            .get_or_create(&OutcomeLabels { outcome })
            .inc_by(n);
    }
}
