use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use rand::RngCore;
use rand::rngs::OsRng;

/// Used when the OS random source is unavailable.
pub const FALLBACK_CREDENTIAL: &str = "rconpassword";

/// Generate a URL-safe random string of exactly `len` characters.
pub fn generate_credential(len: usize) -> Result<String, rand::Error> {
    let mut bytes = vec![0u8; len.div_ceil(4) * 3];
    OsRng.try_fill_bytes(&mut bytes)?;
    let mut encoded = URL_SAFE.encode(&bytes);
    encoded.truncate(len);
    Ok(encoded)
}
