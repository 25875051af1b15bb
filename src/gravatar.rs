//! Default avatars from Gravatar.

use sha2::{Digest, Sha256};

const GRAVATAR_BASE: &str = "https://www.gravatar.com/avatar/";

/// Gravatar image URL for an email address.
/// Gravatar keys images on the SHA-256 of the trimmed, lowercased address.
pub fn gravatar_url(email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.trim().to_lowercase().as_bytes());
    format!("{}{}", GRAVATAR_BASE, hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gravatar_url_shape() {
        let url = gravatar_url("alice@example.com");
        let hash = url.strip_prefix(GRAVATAR_BASE).unwrap();

        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_gravatar_url_normalizes_email() {
        assert_eq!(
            gravatar_url("  Alice@Example.COM "),
            gravatar_url("alice@example.com")
        );
        assert_ne!(
            gravatar_url("alice@example.com"),
            gravatar_url("bob@example.com")
        );
    }
}
