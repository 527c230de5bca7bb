use sha2::{Digest, Sha256};

/// Short, stable fingerprint of a bearer token.
///
/// Raw tokens are credentials; this is the only form in which they may
/// appear in logs.
pub fn fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let hash = format!("{:x}", hasher.finalize());
    hash[..16].to_string()
}
