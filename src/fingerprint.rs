use crate::template::TemplateResolver;
use serde_json::Value;

/// Candidates longer than this many characters are replaced by their CRC-32.
pub const COMPACT_THRESHOLD: usize = 10;

/// Derives the identity string used to test a payload for uniqueness.
///
/// A blank `selector` fingerprints the whole serialized payload, otherwise
/// the selector is resolved as a template against the payload. Either way
/// the result goes through [`compact`].
pub fn fingerprint(
    payload: &Value,
    selector: &str,
    resolver: &dyn TemplateResolver,
) -> String {
    let candidate = if selector.trim().is_empty() {
        // Value's Display is infallible compact JSON
        payload.to_string()
    } else {
        resolver.resolve(payload, selector)
    };
    compact(&candidate)
}

/// Keeps short identities readable and bounds the size of long ones.
///
/// Length is counted in characters; the checksum is taken over the UTF-8
/// bytes and rendered as an unsigned decimal.
pub fn compact(candidate: &str) -> String {
    if candidate.chars().count() > COMPACT_THRESHOLD {
        crc32fast::hash(candidate.as_bytes()).to_string()
    } else {
        candidate.to_string()
    }
}
