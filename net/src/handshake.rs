//! WebSocket upgrade accept-key computation (RFC 6455 §1.3).
//!
//! `tokio-tungstenite` validates this internally during `connect_async`; this
//! function exists as an independently testable pure implementation of the
//! same rule, not as part of the live connect path.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Compute `base64(SHA1(base64(nonce) ++ GUID))`.
pub fn compute_accept_key(nonce: &[u8]) -> String {
  let encoded_nonce = STANDARD.encode(nonce);

  let mut hasher = Sha1::new();
  hasher.update(encoded_nonce.as_bytes());
  hasher.update(GUID.as_bytes());
  let digest = hasher.finalize();

  STANDARD.encode(digest)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn base64_round_trips_arbitrary_bytes() {
    for sample in [&b""[..], b"f", b"fo", b"foo", b"foob", b"fooba", b"foobar", &[0u8, 255, 128, 1, 2, 3]] {
      let encoded = STANDARD.encode(sample);
      let decoded = STANDARD.decode(&encoded).unwrap();
      assert_eq!(decoded, sample);
    }
  }

  #[test]
  fn matches_rfc6455_example() {
    // The nonce from RFC 6455 §1.2, base64-decoded.
    let nonce: [u8; 16] = [
      0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f
    ];
    assert_eq!(compute_accept_key(&nonce), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
  }
}
