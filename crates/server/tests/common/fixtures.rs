//! Test fixtures for calendar requests.

use bytes::Bytes;

/// Generate deterministic test data based on a seed.
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Build a `/calendar/...` URI carrying owner credentials and extra parameters.
/// Values must already be URL-safe.
#[allow(dead_code)]
pub fn calendar_uri(route: &str, owner: &str, hash: &str, extra: &[(&str, &str)]) -> String {
    let mut uri = format!("/calendar/{route}?ownerName={owner}&passphraseHash={hash}");
    for (key, value) in extra {
        uri.push('&');
        uri.push_str(key);
        uri.push('=');
        uri.push_str(value);
    }
    uri
}
