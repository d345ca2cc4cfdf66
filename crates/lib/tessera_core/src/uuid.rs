// Helpers for generating UUIDv7 (timestamp-sortable UUIDs).
//
// Ledger rows and principals are keyed by v7 ids so that jti order follows
// issuance order.

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}

/// Fresh token identifier.
pub fn new_jti() -> String {
    uuidv7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuidv7_is_valid() {
        let id = uuidv7();
        assert_eq!(id.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn uuidv7_is_monotonic() {
        let a = uuidv7();
        let b = uuidv7();
        assert!(b >= a);
    }

    #[test]
    fn jtis_are_unique() {
        assert_ne!(new_jti(), new_jti());
    }
}
