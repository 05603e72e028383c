use crate::models::UserPreference;

/// Compatibility predicate between two preference records.
///
/// Two users can be paired when they are distinct and both their topic sets
/// and their difficulty sets intersect. The authoritative copy of this rule
/// lives in the atomic match script, where it runs inside the indivisible
/// pool operation; this mirror exists for local checks and tests and must
/// stay semantically identical to the Lua.
pub fn is_compatible(a: &UserPreference, b: &UserPreference) -> bool {
    a.user_id != b.user_id
        && intersects(&a.topics, &b.topics)
        && intersects(&a.difficulties, &b.difficulties)
}

fn intersects(a: &[String], b: &[String]) -> bool {
    a.iter().any(|item| b.contains(item))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preference(user_id: &str, topics: &[&str], difficulties: &[&str]) -> UserPreference {
        UserPreference {
            user_id: user_id.to_string(),
            topics: topics.iter().map(|s| s.to_string()).collect(),
            difficulties: difficulties.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_compatible_on_shared_topic_and_difficulty() {
        let a = preference("u1", &["graphs", "trees"], &["easy", "medium"]);
        let b = preference("u2", &["graphs"], &["medium"]);
        assert!(is_compatible(&a, &b));
        assert!(is_compatible(&b, &a));
    }

    #[test]
    fn test_incompatible_disjoint_topics() {
        let a = preference("u1", &["graphs"], &["easy"]);
        let b = preference("u2", &["strings"], &["easy"]);
        assert!(!is_compatible(&a, &b));
    }

    #[test]
    fn test_incompatible_disjoint_difficulties() {
        let a = preference("u1", &["graphs"], &["easy"]);
        let b = preference("u2", &["graphs"], &["hard"]);
        assert!(!is_compatible(&a, &b));
    }

    #[test]
    fn test_never_compatible_with_self() {
        let a = preference("u1", &["graphs"], &["easy"]);
        assert!(!is_compatible(&a, &a.clone()));
    }

    #[test]
    fn test_empty_sets_never_match() {
        let a = preference("u1", &[], &[]);
        let b = preference("u2", &["graphs"], &["easy"]);
        assert!(!is_compatible(&a, &b));
    }
}
