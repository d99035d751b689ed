//! Opaque identifiers for runs and result sessions.

use rand::RngCore;

/// Generate a new opaque ID: 12 random bytes, hex-encoded (96 bits of
/// entropy from the OS RNG). Used for both run IDs and session IDs.
pub fn new_opaque_id() -> String {
    let mut buf = [0u8; 12];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_id_shape() {
        let id = new_opaque_id();
        assert_eq!(id.len(), 24);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_ids_are_unique() {
        let ids: HashSet<String> = (0..64).map(|_| new_opaque_id()).collect();
        assert_eq!(ids.len(), 64);
    }
}
