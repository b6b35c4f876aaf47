//! Header value decoding.

/// Expands STOMP escape sequences in a raw header value.
///
/// Recognized sequences are `\\`, `\c`, `\n` and `\r`. Any other backslash is
/// copied through unchanged together with the byte that follows it. Decoding
/// is a single left-to-right pass over non-overlapping pairs.
///
/// Outgoing values are never escaped; see [`crate::Frame::encode`].
pub fn decode_value(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'\\' && i + 1 < raw.len() {
            let decoded = match raw[i + 1] {
                b'\\' => Some(b'\\'),
                b'c' => Some(b':'),
                b'n' => Some(b'\n'),
                b'r' => Some(b'\r'),
                _ => None,
            };
            if let Some(byte) = decoded {
                out.push(byte);
                i += 2;
                continue;
            }
        }
        out.push(raw[i]);
        i += 1;
    }
    out
}
