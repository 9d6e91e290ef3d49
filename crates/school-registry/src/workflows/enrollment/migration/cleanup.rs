use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::workflows::enrollment::domain::{EnrolledStudent, IdentityTuple, LedgerEntryId};
use crate::workflows::enrollment::repository::{LedgerRepository, RepositoryError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    pub identity: IdentityTuple,
    pub kept: LedgerEntryId,
    pub removed: Vec<LedgerEntryId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    pub removed_count: usize,
    pub duplicate_groups: usize,
    pub groups: Vec<DuplicateGroup>,
}

/// Remove all but the lowest-id active row in every duplicated identity group.
pub fn cleanup_duplicates(ledger: &dyn LedgerRepository) -> Result<CleanupSummary, RepositoryError> {
    let mut grouped: HashMap<IdentityTuple, Vec<EnrolledStudent>> = HashMap::new();
    for row in ledger.active_rows()? {
        grouped.entry(row.identity()).or_default().push(row);
    }

    let mut groups: Vec<DuplicateGroup> = grouped
        .into_iter()
        .filter(|(_, rows)| rows.len() > 1)
        .map(|(identity, rows)| {
            let mut ids: Vec<LedgerEntryId> = rows.iter().map(|row| row.id).collect();
            ids.sort();
            let kept = ids.remove(0);
            DuplicateGroup {
                identity,
                kept,
                removed: ids,
            }
        })
        .collect();
    groups.sort_by_key(|group| group.kept);

    let doomed: Vec<LedgerEntryId> = groups
        .iter()
        .flat_map(|group| group.removed.iter().copied())
        .collect();
    let removed_count = if doomed.is_empty() {
        0
    } else {
        ledger.remove(&doomed)?
    };
    if removed_count != doomed.len() {
        warn!(
            expected = doomed.len(),
            removed = removed_count,
            "some duplicate ledger rows disappeared during cleanup"
        );
    }

    info!(
        groups = groups.len(),
        removed = removed_count,
        "ledger duplicate cleanup finished"
    );
    Ok(CleanupSummary {
        removed_count,
        duplicate_groups: groups.len(),
        groups,
    })
}
