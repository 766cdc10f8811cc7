//! Small shared helpers.

use rand::Rng;
use rand::distributions::Alphanumeric;

/// Short random identifier for moves, overlays, and temp keys.
pub fn short_id(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_ids_have_requested_length_and_vary() {
        let a = short_id(8);
        let b = short_id(8);
        assert_eq!(a.len(), 8);
        assert_ne!(a, b, "collision in two draws would be astronomically unlikely");
    }
}
