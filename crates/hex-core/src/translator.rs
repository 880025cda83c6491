//! Conversions between the physical, edited and deletions-hidden coordinate spaces.
//!
//! Physical and edited positions share the same indexing; appended bytes
//! simply continue past the physical end. The deletions-hidden space shifts
//! every position left by the number of deleted bytes below it.

/// Deleted records at positions strictly below `position`.
///
/// Linear in the number of active deletions.
#[must_use]
pub fn count_deleted_before(overlay: &crate::overlay::OverlayStore, position: u64) -> u64 {
    overlay
        .iter()
        .filter(|record| {
            record.action == crate::enums::ByteAction::Deleted && record.position < position
        })
        .count() as u64
}

/// Physical position to the offset a caller sees.
#[must_use]
pub fn to_logical(
    overlay: &crate::overlay::OverlayStore,
    physical_position: u64,
    hide_deleted: bool,
) -> u64 {
    if hide_deleted {
        physical_position - count_deleted_before(overlay, physical_position)
    } else {
        physical_position
    }
}

/// Deletions-hidden offset back to the physical position that shows it.
///
/// Returns `None` when the offset lies at or past `limit` (the edited length).
#[must_use]
pub fn to_physical(
    overlay: &crate::overlay::OverlayStore,
    logical_position: u64,
    limit: u64,
) -> Option<u64> {
    let mut physical = logical_position;

    for record in overlay.all_by_action(crate::enums::ActionFilter::Deleted) {
        if record.position <= physical {
            physical = physical.checked_add(1)?;
        } else {
            break;
        }
    }

    (physical < limit).then_some(physical)
}

/// Walks `|delta|` non-deleted positions away from `from`.
///
/// - `delta == 0` returns `from` as is.
/// - Deleted positions are stepped over without counting.
/// - `None` when the walk would go below 0 or reach `limit` before finding
///   enough valid positions, so the walk always ends, even over a span
///   where every byte is deleted.
#[must_use]
pub fn next_valid_position(
    overlay: &crate::overlay::OverlayStore,
    from: u64,
    delta: i64,
    limit: u64,
) -> Option<u64> {
    if delta == 0 {
        return Some(from);
    }

    let forward = delta > 0;
    let mut remaining = delta.unsigned_abs();
    let mut position = from;

    while remaining > 0 {
        position = if forward {
            let next = position.checked_add(1)?;
            if next >= limit {
                return None;
            }
            next
        } else {
            position.checked_sub(1)?
        };

        if overlay
            .get(position, crate::enums::ActionFilter::Deleted)
            .is_none()
        {
            remaining -= 1;
        }
    }

    Some(position)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enums::EditRecord;
    use crate::overlay::OverlayStore;

    fn with_deleted(positions: &[u64]) -> OverlayStore {
        let mut store = OverlayStore::new();
        for &pos in positions {
            store.put(pos, EditRecord::deleted(pos));
        }
        store
    }

    #[test]
    fn test_to_logical_identity_when_shown() {
        let store = with_deleted(&[1, 2]);

        assert_eq!(to_logical(&store, 5, false), 5);
        assert_eq!(to_logical(&store, 5, true), 3);
        assert_eq!(to_logical(&store, 2, true), 1, "Strictly below only");
    }

    #[test]
    fn test_to_physical_inverts_to_logical() {
        let store = with_deleted(&[0, 3, 4]);

        for physical in [1u64, 2, 5, 6, 9] {
            let logical = to_logical(&store, physical, true);
            assert_eq!(to_physical(&store, logical, 10), Some(physical));
        }
        assert_eq!(to_physical(&store, 7, 10), None);
    }

    #[test]
    fn test_next_valid_skips_deleted() {
        let store = with_deleted(&[3, 4]);

        assert_eq!(next_valid_position(&store, 2, 1, 10), Some(5));
        assert_eq!(next_valid_position(&store, 5, -1, 10), Some(2));
        assert_eq!(next_valid_position(&store, 1, 3, 10), Some(6));
    }

    #[test]
    fn test_next_valid_zero_delta() {
        let store = with_deleted(&[3]);

        assert_eq!(next_valid_position(&store, 3, 0, 10), Some(3));
    }

    #[test]
    fn test_next_valid_below_zero() {
        let store = with_deleted(&[0]);

        assert_eq!(next_valid_position(&store, 1, -1, 10), None);
        assert_eq!(next_valid_position(&store, 0, -1, 10), None);
    }

    #[test]
    fn test_next_valid_terminates_when_all_deleted() {
        let store = with_deleted(&[5, 6, 7, 8, 9]);

        assert_eq!(next_valid_position(&store, 4, 1, 10), None);
        assert_eq!(next_valid_position(&store, 4, i64::MAX, 10), None);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Distance in the hidden space equals physical distance minus deletions between.
            #[test]
            fn prop_deletion_hiding_distance(
                deleted in prop::collection::btree_set(0u64..200, 0..40),
                a in 0u64..200,
                b in 0u64..200,
            ) {
                let (p1, p2) = if a <= b { (a, b) } else { (b, a) };
                let positions: Vec<u64> = deleted.iter().copied().collect();
                let store = with_deleted(&positions);
                let between = deleted.iter().filter(|&&d| p1 < d && d < p2).count() as u64;
                let d1 = u64::from(deleted.contains(&p1) && p1 < p2);

                prop_assert_eq!(
                    to_logical(&store, p2, true) - to_logical(&store, p1, true),
                    (p2 - p1) - between - d1
                );
            }

            /// Every answer is either a non-deleted position or None.
            #[test]
            fn prop_next_valid_lands_on_valid(
                deleted in prop::collection::btree_set(0u64..100, 0..60),
                from in 0u64..100,
                delta in -120i64..120,
            ) {
                let positions: Vec<u64> = deleted.iter().copied().collect();
                let store = with_deleted(&positions);

                if let Some(pos) = next_valid_position(&store, from, delta, 100)
                    && delta != 0
                {
                    prop_assert!(!deleted.contains(&pos));
                    prop_assert!(pos < 100);
                }
            }
        }
    }
}
