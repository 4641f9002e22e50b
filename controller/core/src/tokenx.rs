//! Fixed identity of the token exchange sidecar.
//!
//! These values are part of the external contract: workloads read
//! [`URL_ENV_VAR`] and operators look for [`CONTAINER_NAME`].

pub const CONTAINER_NAME: &str = "texas";
pub const IMAGE: &str = "ghcr.io/nais/texas:latest";
pub const PORT: i32 = 3000;

/// Set on the application container; points at the sidecar's local listener.
pub const URL_ENV_VAR: &str = "TEXAS_URL";

/// Restart policy that turns an init container into a native sidecar.
pub const RESTART_ALWAYS: &str = "Always";

/// Only TokenX is served by the sidecar; every sibling mechanism is off.
pub const FEATURE_FLAGS: [(&str, &str); 4] = [
    ("TOKEN_X_ENABLED", "true"),
    ("MASKINPORTEN_ENABLED", "false"),
    ("AZURE_ENABLED", "false"),
    ("IDPORTEN_ENABLED", "false"),
];

pub fn local_url() -> String {
    format!("http://localhost:{PORT}")
}
