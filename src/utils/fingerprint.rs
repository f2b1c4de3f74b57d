use sha1::{Digest, Sha1};

/// Lower-case hex SHA-1 of a raw message, used to detect edits and duplicates.
pub fn text_sha1(raw_text: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(raw_text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_digest() {
        assert_eq!(text_sha1("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(text_sha1(""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn differs_on_edit() {
        assert_ne!(text_sha1("BTCUSDT entry 50000"), text_sha1("BTCUSDT entry 50100"));
    }
}
