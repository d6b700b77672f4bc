//! Worker identity.
//!
//! A worker id is 40 lowercase hex characters: 16 digits of zero-padded
//! creation milliseconds followed by 24 digits of cryptographically
//! strong randomness. Lexical order on ids therefore matches creation
//! order, with a random tie-break, which lets the claim queries express
//! "lease expired" as a single string comparison without decoding ids.

use chrono::{DateTime, Utc};
use rand::RngCore;

/// Length of a worker id in characters.
pub const WORKER_ID_LEN: usize = 40;

/// Generate a fresh worker id stamped with the current instant.
pub fn create_worker_id() -> String {
    create_worker_id_at(Utc::now())
}

/// Generate a worker id stamped with an explicit creation instant.
pub fn create_worker_id_at(at: DateTime<Utc>) -> String {
    let mut suffix = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut suffix);
    format!("{:016x}{}", at.timestamp_millis().max(0), hex::encode(suffix))
}

/// Encode `at` as a threshold id: 16 hex digits of the instant followed
/// by 24 zeros. A real worker id compares `<=` to the threshold exactly
/// when its embedded creation time precedes `at`.
pub fn encode_expired_threshold(at: DateTime<Utc>) -> String {
    format!(
        "{:016x}000000000000000000000000",
        at.timestamp_millis().max(0)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_worker_id_shape() {
        let id = create_worker_id();
        assert_eq!(id.len(), WORKER_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, id.to_lowercase());
    }

    #[test]
    fn test_lexical_order_matches_creation_order() {
        let earlier = create_worker_id_at(Utc::now() - Duration::seconds(10));
        let later = create_worker_id_at(Utc::now());
        assert!(earlier < later);
    }

    #[test]
    fn test_threshold_separates_expired_from_live() {
        let now = Utc::now();
        let expired = create_worker_id_at(now - Duration::milliseconds(5_000));
        let live = create_worker_id_at(now + Duration::milliseconds(5_000));
        let threshold = encode_expired_threshold(now);

        assert_eq!(threshold.len(), WORKER_ID_LEN);
        assert!(expired.as_str() <= threshold.as_str());
        assert!(live.as_str() > threshold.as_str());
    }
}
