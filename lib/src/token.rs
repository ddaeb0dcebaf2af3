//! Single-use secrets proving control of a subscriber's inbox.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of an issued token. 32 alphanumeric characters carry a little over
/// 190 bits of entropy.
pub const TOKEN_LEN: usize = 32;

/// Issues a fresh, unpredictable token using the thread-local CSPRNG.
pub fn issue() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Checks a submitted token against the stored one.
///
/// Fails closed: an empty submission or a record without an outstanding
/// token never matches. The comparison touches every byte regardless of
/// where the first difference is.
pub fn verify(stored: Option<&str>, submitted: &str) -> bool {
    let Some(stored) = stored else {
        return false;
    };
    if stored.is_empty() || submitted.is_empty() || stored.len() != submitted.len() {
        return false;
    }
    stored
        .bytes()
        .zip(submitted.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_are_url_safe_and_distinct() {
        let a = issue();
        let b = issue();
        assert_eq!(a.len(), TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn verify_fails_closed() {
        let token = issue();
        assert!(verify(Some(&token), &token));
        assert!(!verify(None, &token));
        assert!(!verify(Some(""), ""));
        assert!(!verify(Some(&token), ""));
        assert!(!verify(Some(&token), &issue()));
        assert!(!verify(Some(&token), &token[..TOKEN_LEN - 1]));
    }
}
