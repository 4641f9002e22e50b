use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Attaches security settings to the Application named by `applicationRef`.
///
/// At most one SecurityConfig may reference a given Application within a
/// namespace.
#[derive(Clone, Debug, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "accesserator.kartverket.no",
    version = "v1alpha",
    kind = "SecurityConfig",
    status = "SecurityConfigStatus",
    derive = "PartialEq",
    shortname = "secconf",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfigSpec {
    pub application_ref: String,
    pub tokenx: Option<TokenXConfig>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct TokenXConfig {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct SecurityConfigStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl SecurityConfigSpec {
    pub fn tokenx_enabled(&self) -> bool {
        self.tokenx.as_ref().is_some_and(|t| t.enabled)
    }
}
