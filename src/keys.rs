//! Deterministic derivation of the Redis keys this crate reads and writes.
//!
//! No escaping is performed. `group_id` and `member_id` must not contain
//! `:` — this is a caller contract, not something this module enforces.

/// `assignment:{group_id}:{member_id}`
pub fn assignment_key(group_id: &str, member_id: &str) -> String {
    format!("assignment:{group_id}:{member_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_the_assignment_key_from_group_and_member() {
        assert_eq!(
            assignment_key("orders-group", "member-1"),
            "assignment:orders-group:member-1"
        );
    }
}
