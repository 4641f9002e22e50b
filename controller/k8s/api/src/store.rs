//! The object-store seam.
//!
//! Admission and reconciliation only ever talk to the API server through these
//! traits, so that both can be exercised against an in-memory store.

use crate::{Application, SecurityConfig};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use kube::{
    api::{Api, DeleteParams, ListParams, PostParams},
    Client, ResourceExt,
};
use std::{future::Future, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("cancelled")]
    Cancelled,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Api(kube::Error),
}

/// Reads needed to resolve the SecurityConfig that applies to a Pod.
#[async_trait::async_trait]
pub trait ConfigLookup: Send + Sync {
    async fn get_application(&self, ns: &str, name: &str) -> Result<Application, StoreError>;

    async fn list_security_configs(&self, ns: &str) -> Result<Vec<SecurityConfig>, StoreError>;
}

/// Writes needed to converge derived NetworkPolicies.
#[async_trait::async_trait]
pub trait ReconcileStore: Send + Sync {
    async fn get_network_policy(&self, ns: &str, name: &str) -> Result<NetworkPolicy, StoreError>;

    async fn list_network_policies(
        &self,
        ns: &str,
        selector: &str,
    ) -> Result<Vec<NetworkPolicy>, StoreError>;

    async fn create_network_policy(&self, policy: &NetworkPolicy) -> Result<(), StoreError>;

    async fn replace_network_policy(&self, policy: &NetworkPolicy) -> Result<(), StoreError>;

    async fn delete_network_policy(&self, ns: &str, name: &str) -> Result<(), StoreError>;
}

/// Races a store call against `cancel`.
///
/// The call is dropped as soon as the token fires, so no partial result is
/// ever observed.
pub async fn cancelable<T, F>(cancel: &CancellationToken, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StoreError::Cancelled),
        res = call => res,
    }
}

// === impl StoreError ===

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

impl From<kube::Error> for StoreError {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(ref rsp) if rsp.code == 404 => Self::NotFound,
            error => Self::Api(error),
        }
    }
}

// === impl Arc ===

#[async_trait::async_trait]
impl<T: ConfigLookup + ?Sized> ConfigLookup for Arc<T> {
    async fn get_application(&self, ns: &str, name: &str) -> Result<Application, StoreError> {
        (**self).get_application(ns, name).await
    }

    async fn list_security_configs(&self, ns: &str) -> Result<Vec<SecurityConfig>, StoreError> {
        (**self).list_security_configs(ns).await
    }
}

#[async_trait::async_trait]
impl<T: ReconcileStore + ?Sized> ReconcileStore for Arc<T> {
    async fn get_network_policy(&self, ns: &str, name: &str) -> Result<NetworkPolicy, StoreError> {
        (**self).get_network_policy(ns, name).await
    }

    async fn list_network_policies(
        &self,
        ns: &str,
        selector: &str,
    ) -> Result<Vec<NetworkPolicy>, StoreError> {
        (**self).list_network_policies(ns, selector).await
    }

    async fn create_network_policy(&self, policy: &NetworkPolicy) -> Result<(), StoreError> {
        (**self).create_network_policy(policy).await
    }

    async fn replace_network_policy(&self, policy: &NetworkPolicy) -> Result<(), StoreError> {
        (**self).replace_network_policy(policy).await
    }

    async fn delete_network_policy(&self, ns: &str, name: &str) -> Result<(), StoreError> {
        (**self).delete_network_policy(ns, name).await
    }
}

// === impl Client ===

#[async_trait::async_trait]
impl ConfigLookup for Client {
    async fn get_application(&self, ns: &str, name: &str) -> Result<Application, StoreError> {
        let api = Api::<Application>::namespaced(self.clone(), ns);
        Ok(api.get(name).await?)
    }

    async fn list_security_configs(&self, ns: &str) -> Result<Vec<SecurityConfig>, StoreError> {
        let api = Api::<SecurityConfig>::namespaced(self.clone(), ns);
        Ok(api.list(&ListParams::default()).await?.items)
    }
}

#[async_trait::async_trait]
impl ReconcileStore for Client {
    async fn get_network_policy(&self, ns: &str, name: &str) -> Result<NetworkPolicy, StoreError> {
        let api = Api::<NetworkPolicy>::namespaced(self.clone(), ns);
        Ok(api.get(name).await?)
    }

    async fn list_network_policies(
        &self,
        ns: &str,
        selector: &str,
    ) -> Result<Vec<NetworkPolicy>, StoreError> {
        let api = Api::<NetworkPolicy>::namespaced(self.clone(), ns);
        let params = ListParams::default().labels(selector);
        Ok(api.list(&params).await?.items)
    }

    async fn create_network_policy(&self, policy: &NetworkPolicy) -> Result<(), StoreError> {
        let ns = policy.namespace().unwrap_or_default();
        let api = Api::<NetworkPolicy>::namespaced(self.clone(), &ns);
        api.create(&PostParams::default(), policy).await?;
        Ok(())
    }

    async fn replace_network_policy(&self, policy: &NetworkPolicy) -> Result<(), StoreError> {
        let ns = policy.namespace().unwrap_or_default();
        let api = Api::<NetworkPolicy>::namespaced(self.clone(), &ns);
        api.replace(&policy.name_any(), &PostParams::default(), policy)
            .await?;
        Ok(())
    }

    async fn delete_network_policy(&self, ns: &str, name: &str) -> Result<(), StoreError> {
        let api = Api::<NetworkPolicy>::namespaced(self.clone(), ns);
        api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }
}
