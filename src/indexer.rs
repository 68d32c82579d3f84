// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Parallel indexing pipeline that turns a directory of audio files into a [`Database`].
//!
//! The pipeline has three stages: a single walker discovers the audio files in a stable order,
//! a pool of workers extracts metadata in parallel, and a single collector interns the results.
//! Only the extraction stage is parallel; interning needs a consistent view of the string
//! tables and is cheap enough to stay serial, which also keeps intern id assignment (and
//! thereby the bytes of the written files) deterministic.
//!
//! The result channel between workers and collector is bounded, so workers block instead of
//! buffering unboundedly when the collector lags behind.

use crate::database::{Database, EntryDraft};
use crate::metadata::{self, PathRewrite};
use crate::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use walkdir::WalkDir;

/// File extensions considered audio files during discovery.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "wav", "m4a", "aac", "wma", "opus", "aiff", "alac",
];

/// Capacity of the extraction result channel.
const RESULT_QUEUE_DEPTH: usize = 64;

/// Options for [`build_database`].
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Genre canonicalisation mapping, matched exactly and case-sensitively against the genre
    /// read from each file. Unmapped genres pass through. Empty to disable.
    pub genre_map: HashMap<String, String>,
    /// Number of metadata extraction workers. `0` uses the number of available cores.
    pub workers: usize,
    /// Build serial recorded in the headers of the written files.
    pub serial: u32,
    /// Cooperative cancellation flag. When set, the walker stops enumerating, workers drain
    /// and the collector finishes with the entries it has.
    pub cancel: Arc<AtomicBool>,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            genre_map: HashMap::new(),
            workers: 0,
            serial: 0,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Summary of a scan, returned alongside the built database.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Number of audio files discovered below the music root.
    pub discovered: usize,
    /// Files that were skipped, together with the error that caused it.
    pub skipped: Vec<(PathBuf, Error)>,
    /// `true` if the scan was cancelled before it finished.
    pub cancelled: bool,
}

/// Builds a fresh database from the audio files below `music_root`.
///
/// File paths are rewritten to their device-visible form with `rewrite`. Files whose metadata
/// cannot be read are skipped and recorded in the returned [`ScanReport`]; only filesystem
/// problems with the root itself abort the build.
///
/// The order of entries in the resulting database is the walk order of the discovered paths,
/// not the order in which workers finish, and intern ids are assigned in that same order.
/// Building the same directory twice with the same options therefore produces byte-identical
/// database files.
pub fn build_database(
    music_root: &Path,
    rewrite: &PathRewrite,
    options: &IndexOptions,
) -> Result<(Database, ScanReport)> {
    if !music_root.is_dir() {
        return Err(Error::io(
            music_root,
            std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        ));
    }

    let mut report = ScanReport::default();
    let paths = discover(music_root, &options.cancel, &mut report);
    report.discovered = paths.len();

    let workers = match options.workers {
        0 => num_cpus::get(),
        workers => workers,
    }
    .clamp(1, paths.len().max(1));
    log::info!(
        "extracting metadata from {} files below {} with {} workers",
        paths.len(),
        music_root.display(),
        workers
    );

    // The master index must list entries in walk order even though workers finish out of
    // order, so every result carries its sequence number and is slotted into a preallocated
    // vector.
    let mut slots: Vec<Option<EntryDraft>> = vec![None; paths.len()];
    let (draft_tx, draft_rx) = mpsc::sync_channel(RESULT_QUEUE_DEPTH);
    let (error_tx, error_rx) = mpsc::channel();
    let next = AtomicUsize::new(0);
    {
        let paths = &paths;
        let next = &next;
        let cancel = options.cancel.as_ref();
        let genre_map = &options.genre_map;
        thread::scope(|scope| {
            for _ in 0..workers {
                let draft_tx = draft_tx.clone();
                let error_tx = error_tx.clone();
                scope.spawn(move || loop {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    let sequence = next.fetch_add(1, Ordering::Relaxed);
                    let Some(path) = paths.get(sequence) else {
                        break;
                    };
                    match metadata::read_file(path, rewrite, genre_map) {
                        Ok(draft) => {
                            if draft_tx.send((sequence, draft)).is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            log::warn!("skipping {}: {err}", path.display());
                            let _ = error_tx.send((path.clone(), err));
                        }
                    }
                });
            }
            drop(draft_tx);
            drop(error_tx);

            for (sequence, draft) in draft_rx {
                slots[sequence] = Some(draft);
            }
        });
    }
    report.cancelled = options.cancel.load(Ordering::Relaxed);
    report.skipped.extend(error_rx.try_iter());

    let mut db = Database::new(options.serial);
    for draft in slots.into_iter().flatten() {
        db.insert(draft);
    }
    log::info!("indexed {} of {} files", db.len(), report.discovered);
    Ok((db, report))
}

/// Enumerates the audio files below `root` in a stable order.
///
/// Walk errors below the root are per-file: they are recorded in the report and the walk
/// continues.
fn discover(root: &Path, cancel: &AtomicBool, report: &mut ScanReport) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && has_audio_extension(entry.path()) {
                    paths.push(entry.into_path());
                }
            }
            Err(err) => {
                let path = err.path().unwrap_or(root).to_path_buf();
                let source = err
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
                log::warn!("cannot walk {}: {source}", path.display());
                report.skipped.push((path.clone(), Error::io(path, source)));
            }
        }
    }
    paths
}

fn has_audio_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"not really audio").unwrap();
    }

    #[test]
    fn discovery_is_sorted_and_filtered() {
        let root = tempfile::tempdir().unwrap();
        touch(&root.path().join("b/2.mp3"));
        touch(&root.path().join("b/1.flac"));
        touch(&root.path().join("a/3.Mp3"));
        touch(&root.path().join("a/cover.jpg"));
        touch(&root.path().join("readme.txt"));

        let cancel = AtomicBool::new(false);
        let mut report = ScanReport::default();
        let paths = discover(root.path(), &cancel, &mut report);
        let relative: Vec<_> = paths
            .iter()
            .map(|path| path.strip_prefix(root.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            relative,
            vec![
                PathBuf::from("a/3.Mp3"),
                PathBuf::from("b/1.flac"),
                PathBuf::from("b/2.mp3"),
            ]
        );
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn unreadable_files_are_skipped_not_fatal() {
        let root = tempfile::tempdir().unwrap();
        touch(&root.path().join("broken.mp3"));
        touch(&root.path().join("also_broken.flac"));

        let rewrite = PathRewrite::new(root.path(), "/Music");
        let (db, report) = build_database(root.path(), &rewrite, &IndexOptions::default()).unwrap();
        assert!(db.is_empty());
        assert_eq!(report.discovered, 2);
        assert_eq!(report.skipped.len(), 2);
        assert!(!report.cancelled);
        for (_, err) in &report.skipped {
            assert!(matches!(err, Error::Metadata { .. }));
        }
    }

    #[test]
    fn missing_root_is_fatal() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("nope");
        let rewrite = PathRewrite::new(&missing, "/Music");
        assert!(matches!(
            build_database(&missing, &rewrite, &IndexOptions::default()),
            Err(Error::Io { .. })
        ));
    }

    #[test]
    fn cancellation_stops_discovery() {
        let root = tempfile::tempdir().unwrap();
        touch(&root.path().join("a.mp3"));

        let options = IndexOptions::default();
        options.cancel.store(true, Ordering::Relaxed);
        let rewrite = PathRewrite::new(root.path(), "/Music");
        let (db, report) = build_database(root.path(), &rewrite, &options).unwrap();
        assert!(db.is_empty());
        assert_eq!(report.discovered, 0);
        assert!(report.cancelled);
    }
}
