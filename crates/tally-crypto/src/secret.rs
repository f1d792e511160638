use rand::rngs::OsRng;
use rand::RngCore;

/// Generate a random secret of `bytes` bytes of entropy, hex-encoded.
///
/// Used for one-time bootstrap credentials that the operator must rotate.
pub fn generate_secret(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}
