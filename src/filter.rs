//! Listening-port policy for server block keys.
//!
//! Fragments are authored against the staging port; the generated file must
//! only listen on the canonical port. Keys on the staging port are rewritten,
//! keys already on the canonical port are kept, everything else is dropped.

use log::{debug, warn};

use crate::parser::ServerBlock;

/// Marker of the non-privileged port fragments are written for.
pub const STAGING_PORT_MARKER: &str = ":8053";

/// Marker of the port the generated configuration exposes.
pub const CANONICAL_PORT_MARKER: &str = ":53";

/// Apply the port policy to a single key.
///
/// Returns the rewritten key, or `None` when the key must be dropped.
pub fn rewrite_key(key: &str) -> Option<String> {
    if key.contains(STAGING_PORT_MARKER) {
        return Some(key.replace(STAGING_PORT_MARKER, CANONICAL_PORT_MARKER));
    }
    if key.ends_with(CANONICAL_PORT_MARKER) {
        return Some(key.to_string());
    }
    None
}

/// Filter and rewrite `keys`, preserving their order.
pub fn filter_keys(keys: &[String]) -> Vec<String> {
    keys.iter()
        .filter_map(|key| {
            let rewritten = rewrite_key(key);
            if rewritten.is_none() {
                debug!("Dropping key {} without port 8053 or 53", key);
            }
            rewritten
        })
        .collect()
}

/// Apply the port policy to a whole block.
///
/// A block left without keys is dropped.
pub fn apply_port_policy(mut block: ServerBlock) -> Option<ServerBlock> {
    let keys = filter_keys(&block.keys);
    if keys.is_empty() {
        warn!("Dropping server block {} as none of its keys use port 8053 or 53", block.keys.join(" "));
        return None;
    }
    block.keys = keys;
    Some(block)
}
