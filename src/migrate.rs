// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Best-effort migration of runtime statistics between database generations.
//!
//! A rebuilt database starts out with all runtime counters at zero. This module transplants
//! them from a previous generation by matching entries on their device-visible filename.
//! Matching by filename is brittle against file moves and retags; the limitation is accepted,
//! richer matching (e.g. by audio fingerprint) is out of scope.

use crate::database::Database;
use crate::tagcache::{EntryFlags, Tag};
use std::collections::hash_map::Entry as MapEntry;
use std::collections::{HashMap, HashSet};

/// The numeric tags that [`migrate_stats`] carries over.
pub const STATS_TAGS: [Tag; 5] = [
    Tag::PlayCount,
    Tag::Rating,
    Tag::PlayTime,
    Tag::LastPlayed,
    Tag::CommitId,
];

/// Copies the runtime statistics of `old` onto the matching entries of `new` and returns the
/// updated database.
///
/// Entries are matched by filename. Matched entries get the [`STATS_TAGS`] values of their old
/// counterpart and the `RESURRECTED` flag; everything else is left untouched. Unmatched new
/// entries keep their default zeros, unmatched old entries are discarded. Duplicate filenames
/// on either side resolve to the first occurrence, with a warning.
#[must_use]
pub fn migrate_stats(old: &Database, mut new: Database) -> Database {
    let mut old_by_filename: HashMap<&[u8], usize> = HashMap::with_capacity(old.len());
    for (index, entry) in old.entries().iter().enumerate() {
        let Some(filename) = old.string_value(entry, Tag::Filename) else {
            continue;
        };
        match old_by_filename.entry(filename) {
            MapEntry::Occupied(_) => log::warn!(
                "duplicate filename in old database: {}",
                String::from_utf8_lossy(filename)
            ),
            MapEntry::Vacant(slot) => {
                slot.insert(index);
            }
        }
    }

    let assignments: Vec<Option<usize>> = {
        let mut seen: HashSet<&[u8]> = HashSet::with_capacity(new.len());
        new.entries()
            .iter()
            .map(|entry| {
                let filename = new.string_value(entry, Tag::Filename)?;
                if !seen.insert(filename) {
                    log::warn!(
                        "duplicate filename in new database: {}",
                        String::from_utf8_lossy(filename)
                    );
                    return None;
                }
                old_by_filename.get(filename).copied()
            })
            .collect()
    };

    let mut migrated = 0;
    for (new_index, old_index) in assignments.into_iter().enumerate() {
        let Some(old_index) = old_index else {
            continue;
        };
        let old_entry = &old.entries()[old_index];
        let stats = STATS_TAGS.map(|tag| old_entry.numeric(tag));
        let entry = new.entry_mut(new_index).expect("index in range");
        for (tag, value) in STATS_TAGS.into_iter().zip(stats) {
            entry.set_numeric(tag, value);
        }
        *entry.flags_mut() |= EntryFlags::RESURRECTED;
        migrated += 1;
    }
    log::info!(
        "migrated statistics for {migrated} of {} entries",
        new.len()
    );
    new
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::database::EntryDraft;

    fn entry_with_stats(filename: &str, playcount: u32, rating: u32) -> EntryDraft {
        let mut draft = EntryDraft::new();
        draft.set_string(Tag::Filename, filename);
        draft.set_numeric(Tag::PlayCount, playcount);
        draft.set_numeric(Tag::Rating, rating);
        draft
    }

    #[test]
    fn matching_entries_get_old_stats() {
        let mut old = Database::new(1);
        old.insert(entry_with_stats("/Music/A.mp3", 12, 4));
        old.insert(entry_with_stats("/Music/B.mp3", 3, 0));

        let mut new = Database::new(2);
        new.insert(entry_with_stats("/Music/A.mp3", 0, 0));
        new.insert(entry_with_stats("/Music/C.mp3", 0, 0));

        let new = migrate_stats(&old, new);
        let matched = &new.entries()[0];
        assert_eq!(matched.numeric(Tag::PlayCount), 12);
        assert_eq!(matched.numeric(Tag::Rating), 4);
        assert!(matched.flags().contains(EntryFlags::RESURRECTED));

        let unmatched = &new.entries()[1];
        assert_eq!(unmatched.numeric(Tag::PlayCount), 0);
        assert_eq!(unmatched.numeric(Tag::Rating), 0);
        assert!(!unmatched.flags().contains(EntryFlags::RESURRECTED));
    }

    #[test]
    fn other_fields_stay_untouched() {
        let mut old = Database::new(1);
        let mut draft = entry_with_stats("/Music/A.mp3", 7, 0);
        draft.set_string(Tag::Artist, "Old Artist");
        draft.set_numeric(Tag::Year, 1999);
        old.insert(draft);

        let mut new = Database::new(2);
        let mut draft = entry_with_stats("/Music/A.mp3", 0, 0);
        draft.set_string(Tag::Artist, "New Artist");
        draft.set_numeric(Tag::Year, 2024);
        new.insert(draft);

        let new = migrate_stats(&old, new);
        let entry = &new.entries()[0];
        assert_eq!(entry.numeric(Tag::PlayCount), 7);
        assert_eq!(entry.numeric(Tag::Year), 2024);
        assert_eq!(
            new.string_value(entry, Tag::Artist),
            Some(b"New Artist".as_slice())
        );
    }

    #[test]
    fn duplicates_resolve_to_first_occurrence() {
        let mut old = Database::new(1);
        old.insert(entry_with_stats("/Music/A.mp3", 1, 0));
        old.insert(entry_with_stats("/Music/A.mp3", 2, 0));

        let mut new = Database::new(2);
        new.insert(entry_with_stats("/Music/A.mp3", 0, 0));
        new.insert(entry_with_stats("/Music/A.mp3", 0, 0));

        let new = migrate_stats(&old, new);
        assert_eq!(new.entries()[0].numeric(Tag::PlayCount), 1);
        assert_eq!(new.entries()[1].numeric(Tag::PlayCount), 0);
    }
}
