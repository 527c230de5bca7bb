//! Permission merge between the custom `ext` claims block and the
//! authorities reported by the introspection endpoint.

use crate::principal::Authority;
use log::debug;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Claim holding the extension block
pub const EXTENSION_CLAIM: &str = "ext";

/// Field of the extension block listing permission strings
pub const PERMISSIONS_FIELD: &str = "permissions";

/// Permissions listed in `ext.permissions`, in list order.
///
/// Returns an empty list when the block or the list is absent or does not
/// have the expected shape. `null` elements are skipped and other non
/// string elements are stringified as JSON.
pub fn extension_permissions(attributes: &Map<String, Value>) -> Vec<Authority> {
    let Some(ext) = attributes.get(EXTENSION_CLAIM) else {
        return Vec::new();
    };
    let Some(ext) = ext.as_object() else {
        debug!("Ignoring '{}' claim that is not an object", EXTENSION_CLAIM);
        return Vec::new();
    };
    match ext.get(PERMISSIONS_FIELD) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(permissions)) => permissions.iter().filter_map(stringify).collect(),
        Some(_) => {
            debug!(
                "Ignoring '{}.{}' that is not a list",
                EXTENSION_CLAIM, PERMISSIONS_FIELD
            );
            Vec::new()
        }
    }
}

fn stringify(value: &Value) -> Option<Authority> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(Authority::new(s.clone())),
        other => Some(Authority::new(other.to_string())),
    }
}

/// Merge extension permissions with the upstream authorities.
///
/// Extension permissions come first, followed by the upstream authorities
/// in the order received. A value present in both sources is kept once, at
/// its first position.
pub fn merge_authorities(
    attributes: &Map<String, Value>,
    upstream: &[Authority],
) -> Vec<Authority> {
    let extension = extension_permissions(attributes);
    let mut seen = HashSet::with_capacity(extension.len() + upstream.len());
    let mut merged = Vec::with_capacity(extension.len() + upstream.len());

    for authority in extension.into_iter().chain(upstream.iter().cloned()) {
        if seen.insert(authority.clone()) {
            merged.push(authority);
        }
    }
    merged
}
