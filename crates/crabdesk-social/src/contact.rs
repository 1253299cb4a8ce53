//! Contact references for public replies: a short unique token pointing a
//! complainant at the tracked support channel.

use sha2::{Digest, Sha256};
use uuid::Uuid;

const TOKEN_LEN: usize = 16;

/// Unique per call even for the same author and post.
pub fn contact_token(author: &str, post_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(author.as_bytes());
    hasher.update(post_id.as_bytes());
    hasher.update(Uuid::new_v4().as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..TOKEN_LEN].to_string()
}

pub fn contact_url(base_url: &str, token: &str) -> String {
    format!("{}?token={token}&source=social", base_url.trim_end_matches('/'))
}

pub fn compose_reply(author: &str, url: &str) -> String {
    format!(
        "@{author} Sorry to hear that, we'd like to sort this out. \
         Reach our support team directly here: {url}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_per_call() {
        let a = contact_token("mika", "42");
        let b = contact_token("mika", "42");
        assert_eq!(a.len(), TOKEN_LEN);
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn url_carries_token_and_source() {
        let url = contact_url("https://desk.example/contact/", "abc123");
        assert_eq!(url, "https://desk.example/contact?token=abc123&source=social");
    }

    #[test]
    fn reply_mentions_author_and_link() {
        let text = compose_reply("mika", "https://desk.example/c?token=t");
        assert!(text.starts_with("@mika"));
        assert!(text.contains("https://desk.example/c?token=t"));
    }
}
