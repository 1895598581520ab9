use sha2::{Digest, Sha256};

/// Content address of a payload: lowercase hex SHA-256 of the exact bytes
/// that are sent to the hosting API.
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn empty_payload() {
        assert_eq!(
            content_hash(&[]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn stable_across_calls() {
        let data = vec![7u8; 10_000];
        assert_eq!(content_hash(&data), content_hash(&data.clone()));
        assert_ne!(content_hash(&data), content_hash(&data[1..]));
    }
}
