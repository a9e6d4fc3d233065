use sha2::{Digest, Sha256};

use crate::model::HashId;

/// Digest canonical text into a fixed-length lowercase hex identity.
pub fn hash_text(text: &str) -> HashId {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    HashId::new(hex::encode(digest))
}
