use crate::labels;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The subset of skiperator's Application that this controller reads.
///
/// Applications are owned by skiperator; unknown fields are ignored on read and
/// the resource is never written.
#[derive(Clone, Debug, Default, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "skiperator.kartverket.no",
    version = "v1alpha1",
    kind = "Application",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    #[serde(default)]
    pub image: String,
    pub port: Option<i32>,
}

impl Application {
    /// Whether the Application has opted into security configuration.
    pub fn security_enabled(&self) -> bool {
        self.labels().get(labels::SECURITY).map(String::as_str) == Some(labels::SECURITY_ENABLED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    fn mk_app(labels: Option<std::collections::BTreeMap<String, String>>) -> Application {
        let mut app = Application::new("orders", ApplicationSpec::default());
        app.metadata.namespace = Some("ns1".to_string());
        app.metadata.labels = labels;
        app
    }

    #[test]
    fn security_enabled_label() {
        assert!(!mk_app(None).security_enabled());
        assert!(!mk_app(Some(btreemap! {
            labels::SECURITY.to_string() => "disabled".to_string(),
        }))
        .security_enabled());
        assert!(mk_app(Some(btreemap! {
            labels::SECURITY.to_string() => labels::SECURITY_ENABLED.to_string(),
        }))
        .security_enabled());
    }

    #[test]
    fn ignores_unknown_fields() {
        let app: Application = serde_json::from_value(serde_json::json!({
            "apiVersion": "skiperator.kartverket.no/v1alpha1",
            "kind": "Application",
            "metadata": { "name": "orders", "namespace": "ns1" },
            "spec": {
                "image": "ghcr.io/kartverket/orders:1.0.0",
                "port": 8080,
                "replicas": { "min": 2, "max": 5 },
            },
        }))
        .expect("application must deserialize");
        assert_eq!(app.spec.port, Some(8080));
    }
}
