use accesserator_controller_k8s_api::{
    labels,
    store::{self, ConfigLookup, StoreError},
    Pod, ResourceExt, SecurityConfig, TokenXConfig,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// The outcome of resolving the SecurityConfig that applies to a Pod.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    /// The Pod is not subject to security configuration.
    Disabled,
    Enabled(Scope),
}

/// A SecurityConfig together with the Application it was resolved for.
#[derive(Clone, Debug, PartialEq)]
pub struct Scope {
    pub security_config: SecurityConfig,
    pub app_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("failed to fetch {kind} {ns}/{name}: {source}")]
    Lookup {
        kind: &'static str,
        ns: String,
        name: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to list SecurityConfigs in namespace {ns}: {source}")]
    List {
        ns: String,
        #[source]
        source: StoreError,
    },

    #[error(
        "Application {ns}/{app} is labelled with {key}={value} but no SecurityConfig references it",
        key = labels::SECURITY,
        value = labels::SECURITY_ENABLED
    )]
    MissingConfiguration { ns: String, app: String },

    #[error(
        "multiple SecurityConfigs reference Application {ns}/{app}: {}",
        .configs.join(", ")
    )]
    AmbiguousConfiguration {
        ns: String,
        app: String,
        configs: Vec<String>,
    },

    #[error("resolution cancelled")]
    Cancelled,
}

/// Finds the SecurityConfig, if any, that applies to `pod` in namespace `ns`.
///
/// `ns` is passed separately because a Pod being created may not carry its
/// namespace yet.
pub async fn resolve<S>(
    store: &S,
    ns: &str,
    pod: &Pod,
    cancel: &CancellationToken,
) -> Result<Resolution, ResolveError>
where
    S: ConfigLookup + ?Sized,
{
    let app = match pod.labels().get(labels::APP_NAME) {
        Some(app) => app.clone(),
        None => return Ok(Resolution::Disabled),
    };

    debug!(%ns, %app, "Fetching Application");
    let application = store::cancelable(cancel, store.get_application(ns, &app))
        .await
        .map_err(|error| match error {
            StoreError::Cancelled => ResolveError::Cancelled,
            source => ResolveError::Lookup {
                kind: "Application",
                ns: ns.to_string(),
                name: app.clone(),
                source,
            },
        })?;
    if !application.security_enabled() {
        return Ok(Resolution::Disabled);
    }

    debug!(%ns, %app, "Fetching SecurityConfigs");
    let configs = store::cancelable(cancel, store.list_security_configs(ns))
        .await
        .map_err(|error| match error {
            StoreError::Cancelled => ResolveError::Cancelled,
            source => ResolveError::List {
                ns: ns.to_string(),
                source,
            },
        })?;

    let mut matching = configs
        .into_iter()
        .filter(|sc| sc.spec.application_ref == app)
        .collect::<Vec<_>>();
    match matching.len() {
        0 => {
            info!(%ns, %app, "No SecurityConfig found for security-enabled Application");
            Err(ResolveError::MissingConfiguration {
                ns: ns.to_string(),
                app,
            })
        }
        1 => Ok(Resolution::Enabled(Scope {
            security_config: matching.remove(0),
            app_name: app,
        })),
        _ => {
            let mut configs = matching.iter().map(|sc| sc.name_any()).collect::<Vec<_>>();
            configs.sort();
            info!(%ns, %app, ?configs, "Multiple SecurityConfigs found for Application");
            Err(ResolveError::AmbiguousConfiguration {
                ns: ns.to_string(),
                app,
                configs,
            })
        }
    }
}

// === impl Scope ===

impl Scope {
    /// Builds the scope a SecurityConfig implies on its own, as seen by the
    /// reconciler.
    pub fn from_config(security_config: SecurityConfig) -> Self {
        let app_name = security_config.spec.application_ref.clone();
        Self {
            security_config,
            app_name,
        }
    }

    pub fn tokenx(&self) -> Option<&TokenXConfig> {
        self.security_config.spec.tokenx.as_ref()
    }

    pub fn tokenx_enabled(&self) -> bool {
        self.security_config.spec.tokenx_enabled()
    }

    pub fn namespace(&self) -> String {
        self.security_config.namespace().unwrap_or_default()
    }

    pub fn config_name(&self) -> String {
        self.security_config.name_any()
    }
}
