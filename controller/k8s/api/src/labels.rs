//! Well-known label keys and values.
//!
//! Labels are only interpreted while resolving a Pod's configuration and while
//! selecting managed objects; everything downstream works with typed values.

use std::collections::BTreeMap;

/// Set by skiperator on every Pod it manages, naming the owning Application.
pub const APP_NAME: &str = "application.skiperator.no/app-name";

/// Opts an Application into security configuration when set to
/// [`SECURITY_ENABLED`].
pub const SECURITY: &str = "skiperator/security";
pub const SECURITY_ENABLED: &str = "enabled";

/// Pod selector label used by skiperator workloads and the token exchange
/// service alike.
pub const APP: &str = "app";

/// Label the API server sets on every namespace.
pub const NAMESPACE_NAME: &str = "kubernetes.io/metadata.name";

pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "accesserator";

// Owner back-reference. Derived objects live in the controller's namespace, so
// an ownerReference (which must be namespace-local) cannot be used.
pub const OWNER_NAMESPACE: &str = "accesserator.kartverket.no/owner-namespace";
pub const OWNER_NAME: &str = "accesserator.kartverket.no/owner-name";

/// Label selector matching every object managed by this controller.
pub fn managed_selector() -> String {
    format!("{MANAGED_BY}={MANAGED_BY_VALUE}")
}

/// Labels recorded on an object derived from the SecurityConfig `ns/name`.
///
/// `name` must already be a valid label value; long SecurityConfig names are
/// shortened by the caller.
pub fn owned_by(ns: &str, name: &str) -> BTreeMap<String, String> {
    [
        (MANAGED_BY, MANAGED_BY_VALUE),
        (OWNER_NAMESPACE, ns),
        (OWNER_NAME, name),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
