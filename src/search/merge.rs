/// Fair interleaving of per-sub-query fused lists.
///
/// Two passes over the lists in sub-query order:
/// 1. quota: up to `max(1, size / n)` top documents from each list
/// 2. backfill: remaining documents in list order until `size` is reached
///
/// A global place_id set keeps the output free of duplicates when sub-queries overlap.
/// A sparse sub-query therefore keeps its few candidates while the others fill the rest.

use std::collections::HashSet;

use super::FusedDocument;

pub fn merge_round_robin(lists: Vec<Vec<FusedDocument>>, size: usize) -> Vec<FusedDocument> {
    let lists: Vec<Vec<FusedDocument>> = lists.into_iter().filter(|l| !l.is_empty()).collect();
    if lists.is_empty() || size == 0 {
        return Vec::new();
    }

    let quota = (size / lists.len()).max(1);
    let mut selected: Vec<FusedDocument> = Vec::with_capacity(size);
    let mut seen: HashSet<String> = HashSet::with_capacity(size);
    // Per-list cursor: everything before it has been considered by the quota pass.
    let mut cursors = vec![0usize; lists.len()];

    for (i, list) in lists.iter().enumerate() {
        let mut taken = 0;
        while taken < quota && cursors[i] < list.len() {
            let doc = &list[cursors[i]];
            cursors[i] += 1;
            if seen.insert(doc.place_id().to_string()) {
                selected.push(doc.clone());
                taken += 1;
            }
        }
        tracing::debug!(sub_query = i, taken, quota, "Quota pass");
    }

    if selected.len() < size {
        'backfill: for list in &lists {
            for doc in list {
                if selected.len() >= size {
                    break 'backfill;
                }
                if seen.insert(doc.place_id().to_string()) {
                    selected.push(doc.clone());
                }
            }
        }
    }

    selected.truncate(size);
    selected
}
