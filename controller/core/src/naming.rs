//! Deterministic names of objects derived from a SecurityConfig.
//!
//! External tooling that needs to find these objects must replicate these
//! functions rather than guess.
//!
//! Names and label values built from a SecurityConfig's name are bounded.
//! A value that fits is used as is. A longer one is cut short and suffixed
//! with `-` and the first ten hex digits of the SHA-256 of the full value, so
//! distinct inputs stay distinct.

use sha2::{Digest, Sha256};

/// Longest object name the API server accepts for a NetworkPolicy.
pub const MAX_NAME_LEN: usize = 253;

/// Longest label value the API server accepts.
pub const MAX_LABEL_VALUE_LEN: usize = 63;

const HASH_LEN: usize = 10;

/// Name of the jwker client registered for the SecurityConfig `config`.
pub fn jwker_name(config: &str) -> String {
    format!("{config}-jwker")
}

/// Name of the secret jwker writes the client credentials of `jwker` to.
pub fn jwker_secret_name(jwker: &str) -> String {
    format!("{jwker}-secret")
}

/// Name of the ingress NetworkPolicy derived from the SecurityConfig `ns/config`.
///
/// Namespace names never contain dots, so the name is unique across the
/// cluster even though every policy lives in the controller's namespace.
pub fn network_policy_name(ns: &str, config: &str) -> String {
    bounded(&format!("tokenx-ingress.{ns}.{config}"), MAX_NAME_LEN)
}

/// Value of the owner-name label recorded on objects derived from `config`.
pub fn owner_label_value(config: &str) -> String {
    bounded(config, MAX_LABEL_VALUE_LEN)
}

/// Returns `value` unchanged when it is at most `max` bytes, and otherwise a
/// truncated prefix followed by a hash of the whole value.
///
/// The prefix never ends in `-` or `.`, so a valid DNS subdomain or label
/// value stays valid.
fn bounded(value: &str, max: usize) -> String {
    if value.len() <= max {
        return value.to_string();
    }

    let hash = hex::encode(Sha256::digest(value.as_bytes()));
    let mut end = max - HASH_LEN - 1;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    let prefix = value[..end].trim_end_matches(['-', '.']);
    format!("{prefix}-{}", &hash[..HASH_LEN])
}
