use crate::{naming, Scope};
use accesserator_controller_k8s_api::{
    labels, LabelSelector, NetworkPolicy, NetworkPolicyIngressRule, NetworkPolicyPeer,
    NetworkPolicySpec, ObjectMeta,
};
use std::collections::BTreeMap;

/// Where derived NetworkPolicies are placed and what they select.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    /// Namespace hosting the token exchange service (and this controller).
    pub namespace: String,
    /// Value of the `app` label on the token exchange service's pods.
    pub tokenx_name: String,
}

/// Computes the NetworkPolicy a scope implies, or `None` when TokenX is
/// disabled.
///
/// The policy admits traffic to the token exchange service only from the
/// scope's Application pods in the SecurityConfig's namespace. It is pure
/// data, fully determined by its inputs, so it can be regenerated on every
/// pass instead of being patched.
pub fn synthesize(scope: &Scope, target: &Target) -> Option<NetworkPolicy> {
    if !scope.tokenx_enabled() {
        return None;
    }

    let from_ns = scope.namespace();
    let config = scope.config_name();

    let peer = NetworkPolicyPeer {
        namespace_selector: Some(match_labels(labels::NAMESPACE_NAME, &from_ns)),
        pod_selector: Some(match_labels(labels::APP, &scope.app_name)),
        ..Default::default()
    };

    Some(NetworkPolicy {
        metadata: ObjectMeta {
            name: Some(naming::network_policy_name(&from_ns, &config)),
            namespace: Some(target.namespace.clone()),
            labels: Some(labels::owned_by(
                &from_ns,
                &naming::owner_label_value(&config),
            )),
            ..Default::default()
        },
        spec: Some(NetworkPolicySpec {
            pod_selector: match_labels(labels::APP, &target.tokenx_name),
            policy_types: Some(vec!["Ingress".to_string()]),
            ingress: Some(vec![NetworkPolicyIngressRule {
                from: Some(vec![peer]),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn match_labels(key: &str, value: &str) -> LabelSelector {
    LabelSelector {
        match_labels: Some(BTreeMap::from([(key.to_string(), value.to_string())])),
        ..Default::default()
    }
}
