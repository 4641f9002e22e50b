use accesserator_controller_core::naming;
use std::fmt;

/// Identifies a SecurityConfig.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

impl ResourceId {
    pub fn new(namespace: String, name: String) -> Self {
        Self { namespace, name }
    }

    /// Name of the NetworkPolicy derived from this SecurityConfig.
    pub fn policy_name(&self) -> String {
        naming::network_policy_name(&self.namespace, &self.name)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
