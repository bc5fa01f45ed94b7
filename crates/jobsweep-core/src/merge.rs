//! Dedup & merge engine.
//!
//! Pure functions over snapshots: merging never mutates its inputs, so the
//! dataset store can keep serving the old snapshot to in-flight readers
//! until the new one is committed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{JobRecord, Snapshot};

/// Merge an incoming batch into an existing snapshot.
///
/// Records are keyed by `id`. Absent keys are inserted; present keys are
/// replaced only when the incoming record's `scraped_at` is not older than
/// the existing one's — ties favour the incoming record (freshest wins).
/// The result is re-sorted by `scraped_at` descending, `id` ascending.
pub fn merge(existing: &Snapshot, incoming: &[JobRecord]) -> Snapshot {
    let mut by_id: HashMap<&str, &JobRecord> = existing
        .records
        .iter()
        .map(|r| (r.id.as_str(), r))
        .collect();

    for record in incoming {
        match by_id.get(record.id.as_str()) {
            Some(current) if record.scraped_at < current.scraped_at => {
                tracing::debug!(id = %record.id, "Incoming record older than stored one, kept existing");
            }
            _ => {
                by_id.insert(record.id.as_str(), record);
            }
        }
    }

    let mut records: Vec<JobRecord> = by_id.into_values().cloned().collect();
    sort_canonical(&mut records);

    Snapshot {
        generated_at: Utc::now(),
        records,
    }
}

/// Drop records scraped before `cutoff`. Ordering is preserved.
pub fn evict_older_than(snapshot: &Snapshot, cutoff: DateTime<Utc>) -> Snapshot {
    let records: Vec<JobRecord> = snapshot
        .records
        .iter()
        .filter(|r| r.scraped_at >= cutoff)
        .cloned()
        .collect();
    let evicted = snapshot.records.len() - records.len();
    if evicted > 0 {
        tracing::info!(evicted, %cutoff, "Evicted records past retention age");
    }
    Snapshot {
        generated_at: Utc::now(),
        records,
    }
}

/// Sort records into the canonical snapshot order: `scraped_at` descending,
/// tie-broken by `id` ascending for determinism.
pub fn sort_canonical(records: &mut [JobRecord]) {
    records.sort_by(|a, b| {
        b.scraped_at
            .cmp(&a.scraped_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::make_record;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).single().unwrap()
    }

    #[test]
    fn test_merge_inserts_new_records() {
        let existing = Snapshot::empty();
        let batch = vec![make_record("acme", "1", at(0)), make_record("acme", "2", at(1))];
        let merged = merge(&existing, &batch);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_never_produces_duplicate_ids() {
        let existing = merge(&Snapshot::empty(), &[make_record("acme", "1", at(0))]);
        let batch = vec![
            make_record("acme", "1", at(5)),
            make_record("acme", "1", at(3)),
            make_record("globex", "1", at(4)),
        ];
        let merged = merge(&existing, &batch);

        let mut ids: Vec<_> = merged.records.iter().map(|r| r.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), merged.len());
    }

    #[test]
    fn test_freshest_wins() {
        let old = make_record("acme", "1", at(0));
        let existing = merge(&Snapshot::empty(), std::slice::from_ref(&old));

        let mut newer = make_record("acme", "1", at(10));
        newer.title = "Updated".into();
        let merged = merge(&existing, &[newer.clone()]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged.records[0], newer);
    }

    #[test]
    fn test_older_incoming_record_is_ignored() {
        let current = make_record("acme", "1", at(10));
        let existing = merge(&Snapshot::empty(), std::slice::from_ref(&current));

        let mut stale = make_record("acme", "1", at(0));
        stale.title = "Stale".into();
        let merged = merge(&existing, &[stale]);

        assert_eq!(merged.records[0].title, current.title);
    }

    #[test]
    fn test_equal_timestamp_favours_incoming() {
        let current = make_record("acme", "1", at(10));
        let existing = merge(&Snapshot::empty(), std::slice::from_ref(&current));

        let mut incoming = make_record("acme", "1", at(10));
        incoming.title = "Refetched".into();
        let merged = merge(&existing, &[incoming]);

        assert_eq!(merged.records[0].title, "Refetched");
    }

    #[test]
    fn test_ordering_scraped_at_desc_then_id_asc() {
        let batch = vec![
            make_record("acme", "b", at(5)),
            make_record("acme", "a", at(5)),
            make_record("acme", "c", at(9)),
            make_record("acme", "d", at(1)),
        ];
        let merged = merge(&Snapshot::empty(), &batch);
        let order: Vec<_> = merged
            .records
            .iter()
            .map(|r| (r.scraped_at, r.id.as_str()))
            .collect();

        assert_eq!(order, vec![(at(9), "c"), (at(5), "a"), (at(5), "b"), (at(1), "d")]);
    }

    #[test]
    fn test_merge_does_not_mutate_inputs() {
        let existing = merge(&Snapshot::empty(), &[make_record("acme", "1", at(0))]);
        let before = existing.clone();
        let _ = merge(&existing, &[make_record("acme", "1", at(10))]);
        assert_eq!(existing, before);
    }

    #[test]
    fn test_merge_empty_batch_is_idempotent() {
        let existing = merge(
            &Snapshot::empty(),
            &[make_record("acme", "1", at(0)), make_record("acme", "2", at(5))],
        );
        let merged = merge(&existing, &[]);
        assert_eq!(merged.records, existing.records);
    }

    #[test]
    fn test_evict_older_than() {
        let snapshot = merge(
            &Snapshot::empty(),
            &[
                make_record("acme", "1", at(0)),
                make_record("acme", "2", at(100)),
                make_record("acme", "3", at(200)),
            ],
        );
        let trimmed = evict_older_than(&snapshot, at(100));
        assert_eq!(trimmed.len(), 2);
        assert!(trimmed.records.iter().all(|r| r.scraped_at >= at(100)));
    }
}
