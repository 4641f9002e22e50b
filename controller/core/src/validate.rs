use crate::{resolve, tokenx, Resolution, ResolveError, Scope};
use accesserator_controller_k8s_api::{ConfigLookup, Pod};
use tokio_util::sync::CancellationToken;

/// An injected artifact that validation found absent.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MissingArtifact {
    #[error(
        "TokenX is enabled but init container '{name}' is missing",
        name = tokenx::CONTAINER_NAME
    )]
    Sidecar,

    #[error(
        "TokenX is enabled but container '{container}' is missing environment variable '{var}'",
        var = tokenx::URL_ENV_VAR
    )]
    UrlEnvVar { container: String },
}

/// Why a Pod was refused admission.
#[derive(Debug, thiserror::Error)]
pub enum Rejection {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Missing(#[from] MissingArtifact),
}

/// Re-resolves the configuration of `pod` and checks that everything it
/// requires has been injected.
pub async fn admit<S>(
    store: &S,
    ns: &str,
    pod: &Pod,
    cancel: &CancellationToken,
) -> Result<(), Rejection>
where
    S: ConfigLookup + ?Sized,
{
    match resolve(store, ns, pod, cancel).await? {
        Resolution::Disabled => Ok(()),
        Resolution::Enabled(scope) => Ok(check(pod, &scope)?),
    }
}

/// Checks that `pod` carries the artifacts `scope` requires. Never repairs.
pub fn check(pod: &Pod, scope: &Scope) -> Result<(), MissingArtifact> {
    if !scope.tokenx_enabled() {
        return Ok(());
    }

    let spec = pod.spec.as_ref();
    let has_sidecar = spec
        .and_then(|s| s.init_containers.as_ref())
        .into_iter()
        .flatten()
        .any(|c| c.name == tokenx::CONTAINER_NAME);
    if !has_sidecar {
        return Err(MissingArtifact::Sidecar);
    }

    let has_url = spec
        .into_iter()
        .flat_map(|s| s.containers.iter())
        .find(|c| c.name == scope.app_name)
        .and_then(|c| c.env.as_ref())
        .into_iter()
        .flatten()
        .any(|v| v.name == tokenx::URL_ENV_VAR);
    if !has_url {
        return Err(MissingArtifact::UrlEnvVar {
            container: scope.app_name.clone(),
        });
    }

    Ok(())
}
