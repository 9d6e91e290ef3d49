/// Decides whether two differently written student ids name the same student.
///
/// The identity scheme behind student numbers is not settled, so the matching
/// rule is swappable.
pub trait StudentIdVariantPolicy: Send + Sync {
    /// Name reported in duplicate reasons.
    fn name(&self) -> &'static str;

    /// Whether `candidate` should be checked for variants at all.
    fn applies_to(&self, candidate: &str) -> bool;

    /// Whether the ledger's `existing` id is a variant of `candidate`.
    fn is_variant(&self, candidate: &str, existing: &str) -> bool;
}

/// Legacy heuristic: ids containing a dash are compared by their first segment.
///
/// `2021-0001-A` matches an existing `2021` or any `2021-...` id. Unrelated ids
/// sharing the first segment (`2021-0001`, `2021-0002`) also match.
#[derive(Debug, Default, Clone, Copy)]
pub struct DashPrefixPolicy;

impl DashPrefixPolicy {
    fn prefix(candidate: &str) -> Option<&str> {
        let (prefix, _) = candidate.trim().split_once('-')?;
        (!prefix.is_empty()).then_some(prefix)
    }
}

impl StudentIdVariantPolicy for DashPrefixPolicy {
    fn name(&self) -> &'static str {
        "dash-prefix"
    }

    fn applies_to(&self, candidate: &str) -> bool {
        Self::prefix(candidate).is_some()
    }

    fn is_variant(&self, candidate: &str, existing: &str) -> bool {
        let Some(prefix) = Self::prefix(candidate) else {
            return false;
        };
        let existing = existing.trim();
        existing == prefix
            || existing
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('-'))
    }
}

/// Only exact ids are treated as the same student.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExactIdPolicy;

impl StudentIdVariantPolicy for ExactIdPolicy {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn applies_to(&self, _candidate: &str) -> bool {
        false
    }

    fn is_variant(&self, _candidate: &str, _existing: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dash_prefix_matches_suffixed_variants() {
        let policy = DashPrefixPolicy;
        assert!(policy.applies_to("2021-0001-A"));
        assert!(policy.is_variant("2021-0001-A", "2021-0001"));
        assert!(policy.is_variant("2021-0001", "2021"));
        assert!(!policy.is_variant("2021-0001", "20210001"));
        assert!(!policy.is_variant("2021-0001", "2022-0001"));
    }

    #[test]
    fn dash_prefix_collides_ids_sharing_a_first_segment() {
        assert!(DashPrefixPolicy.is_variant("2021-0002", "2021-0001"));
    }

    #[test]
    fn undashed_ids_are_not_checked() {
        assert!(!DashPrefixPolicy.applies_to("20210001"));
        assert!(!DashPrefixPolicy.applies_to("-0001"));
        assert!(!ExactIdPolicy.applies_to("2021-0001"));
    }
}
