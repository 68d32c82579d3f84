// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Adapter between the audio metadata reader (`lofty`) and the internal entry shape.
//!
//! The adapter normalises whatever tags the reader surfaces for one audio file into an
//! [`EntryDraft`]: every string tag as a plain byte string (empty means "absent"), every
//! numeric tag zero-initialised and then filled from the reader. The filename tag is rewritten
//! from the host-local path to the device-visible path, and genre values can be canonicalised
//! through a caller-supplied mapping.

use crate::database::EntryDraft;
use crate::tagcache::{EntryFlags, Tag};
use crate::{Error, Result};
use lofty::prelude::*;
use lofty::properties::FileProperties;
use lofty::tag::Tag as AudioTag;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Rewrites host-local paths into the paths under which the device sees the same files.
///
/// The configured host prefix is stripped, the device prefix is prepended and the separators
/// are normalised to forward slashes.
#[derive(Debug, Clone)]
pub struct PathRewrite {
    host_root: PathBuf,
    device_prefix: String,
}

impl PathRewrite {
    /// Creates a rewrite rule that maps files below `host_root` to `device_prefix`.
    #[must_use]
    pub fn new(host_root: impl Into<PathBuf>, device_prefix: impl Into<String>) -> Self {
        let mut device_prefix: String = device_prefix.into();
        while device_prefix.ends_with('/') {
            device_prefix.pop();
        }
        Self {
            host_root: host_root.into(),
            device_prefix,
        }
    }

    /// The device-visible path for the given host path.
    #[must_use]
    pub fn rewrite(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.host_root).unwrap_or(path);
        let mut rewritten = self.device_prefix.clone();
        for component in relative.components() {
            if let Component::Normal(part) = component {
                rewritten.push('/');
                rewritten.push_str(&part.to_string_lossy());
            }
        }
        rewritten
    }
}

/// Builds a draft from the tag and audio properties the metadata reader returned for one file.
///
/// Only the columns the database knows about are taken over; everything else the reader may
/// surface is ignored. Runtime statistics (play count, rating, ...) always start out zero, they
/// are owned by the device and only enter a fresh build through statistics migration.
#[must_use]
pub fn draft_from_tag(tag: Option<&AudioTag>, properties: &FileProperties) -> EntryDraft {
    let mut draft = EntryDraft::new();
    if let Some(tag) = tag {
        if let Some(artist) = tag.artist() {
            draft.set_string(Tag::Artist, artist.as_ref());
        }
        if let Some(album) = tag.album() {
            draft.set_string(Tag::Album, album.as_ref());
        }
        if let Some(genre) = tag.genre() {
            draft.set_string(Tag::Genre, genre.as_ref());
        }
        if let Some(title) = tag.title() {
            draft.set_string(Tag::Title, title.as_ref());
        }
        if let Some(comment) = tag.comment() {
            draft.set_string(Tag::Comment, comment.as_ref());
        }
        if let Some(composer) = tag.get_string(&ItemKey::Composer) {
            draft.set_string(Tag::Composer, composer);
        }
        if let Some(album_artist) = tag.get_string(&ItemKey::AlbumArtist) {
            draft.set_string(Tag::AlbumArtist, album_artist);
        }
        if let Some(grouping) = tag.get_string(&ItemKey::ContentGroup) {
            draft.set_string(Tag::Grouping, grouping);
        }
        if let Some(year) = tag.year() {
            draft.set_numeric(Tag::Year, year);
        }
        if let Some(track) = tag.track() {
            draft.set_numeric(Tag::TrackNumber, track);
        }
        if let Some(disc) = tag.disk() {
            draft.set_numeric(Tag::DiscNumber, disc);
        }
    }
    if let Some(bitrate) = properties.audio_bitrate() {
        draft.set_numeric(Tag::Bitrate, bitrate);
    }
    let length = properties.duration().as_millis();
    draft.set_numeric(Tag::Length, length.try_into().unwrap_or(u32::MAX));
    draft
}

/// Reads the metadata of a single audio file and normalises it into an [`EntryDraft`].
///
/// Failures are per-file: the indexer records them and skips the file without aborting the
/// scan.
pub fn read_file(
    path: &Path,
    rewrite: &PathRewrite,
    genre_map: &HashMap<String, String>,
) -> Result<EntryDraft> {
    let tagged = lofty::read_from_path(path).map_err(|err| Error::Metadata {
        path: path.to_path_buf(),
        source: Box::new(err),
    })?;
    let tag = tagged.primary_tag().or_else(|| tagged.first_tag());
    let mut draft = draft_from_tag(tag, tagged.properties());

    draft.set_string(Tag::Filename, rewrite.rewrite(path));

    // Exact, case-sensitive canonicalisation; unmapped genres pass through.
    let mapped = std::str::from_utf8(draft.string(Tag::Genre))
        .ok()
        .and_then(|genre| genre_map.get(genre))
        .cloned();
    if let Some(mapped) = mapped {
        draft.set_string(Tag::Genre, mapped);
    }

    if let Some(stem) = path.file_stem() {
        let stem = stem.to_string_lossy();
        if draft.string(Tag::Title).is_empty() {
            draft.set_string(Tag::Title, stem.as_ref());
        }
        if draft.numeric(Tag::TrackNumber) == 0 {
            if let Some(track) = track_number_from_stem(&stem) {
                draft.set_numeric(Tag::TrackNumber, track);
                *draft.flags_mut() |= EntryFlags::TRKNUMGEN;
            }
        }
    }

    let metadata = std::fs::metadata(path).map_err(|err| Error::io(path, err))?;
    let mtime = metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |elapsed| elapsed.as_secs().try_into().unwrap_or(u32::MAX));
    draft.set_numeric(Tag::Mtime, mtime);

    Ok(draft)
}

/// Derives a track number from the leading digits of a file stem like `01 Song`.
fn track_number_from_stem(stem: &str) -> Option<u32> {
    let digits: &str = stem
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .unwrap_or_default();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use lofty::tag::{Tag as AudioTag, TagType};

    #[test]
    fn rewrite_strips_host_prefix() {
        let rewrite = PathRewrite::new("root", "/Music/");
        assert_eq!(
            rewrite.rewrite(Path::new("root/Band/Album/01 Song.mp3")),
            "/Music/Band/Album/01 Song.mp3"
        );
    }

    #[test]
    fn rewrite_keeps_unrelated_paths() {
        let rewrite = PathRewrite::new("/mnt/music", "/Music");
        assert_eq!(
            rewrite.rewrite(Path::new("elsewhere/Song.mp3")),
            "/Music/elsewhere/Song.mp3"
        );
    }

    #[test]
    fn draft_takes_known_columns() {
        let mut tag = AudioTag::new(TagType::Id3v2);
        tag.set_artist("Band".to_string());
        tag.set_album("Album".to_string());
        tag.set_title("Song".to_string());
        tag.set_genre("Rock".to_string());
        tag.set_year(2020);
        tag.set_track(3);
        tag.set_disk(1);
        tag.insert_text(ItemKey::Composer, "Composer".to_string());
        tag.insert_text(ItemKey::AlbumArtist, "Band".to_string());

        let draft = draft_from_tag(Some(&tag), &FileProperties::default());
        assert_eq!(draft.string(Tag::Artist), b"Band");
        assert_eq!(draft.string(Tag::Album), b"Album");
        assert_eq!(draft.string(Tag::Title), b"Song");
        assert_eq!(draft.string(Tag::Genre), b"Rock");
        assert_eq!(draft.string(Tag::Composer), b"Composer");
        assert_eq!(draft.string(Tag::AlbumArtist), b"Band");
        assert_eq!(draft.string(Tag::Grouping), b"");
        assert_eq!(draft.numeric(Tag::Year), 2020);
        assert_eq!(draft.numeric(Tag::TrackNumber), 3);
        assert_eq!(draft.numeric(Tag::DiscNumber), 1);
        assert_eq!(draft.numeric(Tag::PlayCount), 0);
        assert_eq!(draft.numeric(Tag::Rating), 0);
    }

    #[test]
    fn draft_without_tag_is_empty() {
        let draft = draft_from_tag(None, &FileProperties::default());
        for tag in Tag::STRINGS {
            assert_eq!(draft.string(tag), b"");
        }
        assert_eq!(draft.numeric(Tag::Year), 0);
    }

    #[test]
    fn track_number_from_stem_takes_leading_digits() {
        assert_eq!(track_number_from_stem("01 Song"), Some(1));
        assert_eq!(track_number_from_stem("12-Song"), Some(12));
        assert_eq!(track_number_from_stem("Song 7"), None);
        assert_eq!(track_number_from_stem(""), None);
    }
}
