//! Input validation utilities

use once_cell::sync::Lazy;
use regex::Regex;

/// Regex for object names (DNS subdomain: lowercase labels separated by dots)
static OBJECT_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$").unwrap()
});

/// Regex for namespaces (DNS label)
static NAMESPACE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").unwrap());

/// Regex for secret data keys (`tls.crt`, `ca.crt`, ...)
static SECRET_KEY_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-._a-zA-Z0-9]+$").unwrap());

/// Validate an object name such as a signing request name
pub fn validate_object_name(name: &str) -> bool {
    !name.is_empty() && name.len() <= 253 && OBJECT_NAME_REGEX.is_match(name)
}

/// Validate a namespace name
pub fn validate_namespace(namespace: &str) -> bool {
    !namespace.is_empty() && namespace.len() <= 63 && NAMESPACE_REGEX.is_match(namespace)
}

/// Validate a secret data key
pub fn validate_secret_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 253
        && key != "."
        && key != ".."
        && SECRET_KEY_REGEX.is_match(key)
}
