// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Codec for the individual files of a Rockbox tagcache database (schema version 4.0).
//!
//! A database directory contains a master index file (`database_idx.tcd`) and one tag file per
//! string tag (`database_0.tcd` … `database_8.tcd`). Every file starts with a [`FileHeader`].
//! The master index body is a sequence of fixed-size [`RawEntry`] records, one per track; tag
//! file bodies are sequences of variable-size [`TagString`] records laid out back to back.
//!
//! Entries and strings reference each other by file offset in both directions: an entry field
//! holds the offset of the string record in its tag file, and each string record holds the
//! offset of a master index entry that uses it. The [`crate::database`] module resolves this
//! cyclic graph into flat vectors with integer indices; offsets exist only on disk.
//!
//! All codec routines take the byte order as an explicit parameter. Only the little-endian
//! target ([`TARGET_ENDIAN`]) is in use, but alternate byte orders are a configuration rather
//! than a fork.
//!
//! The format has been documented by the Rockbox project:
//!
//! - <https://www.rockbox.org/wiki/TagcacheDBFormat>

pub mod string;

use crate::tagcache::string::TagString;
use crate::{Error, Result};
use binrw::{binrw, BinRead, BinWrite, Endian};
use bitflags::bitflags;
use parse_display::{Display, FromStr};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

/// The schema version implemented by this crate.
pub const SCHEMA_VERSION: u32 = 4;

/// The byte order of the supported build target.
pub const TARGET_ENDIAN: Endian = Endian::Little;

/// Sentinel offset denoting "no value" in a string tag field of an entry.
///
/// The empty string is always represented by this sentinel; no zero-length [`TagString`] is
/// ever written.
pub const NULL_REF: u32 = 0xFFFF_FFFF;

/// Name of the master index file inside a database directory.
pub const MASTER_FILENAME: &str = "database_idx.tcd";

/// The columns of the database, with their stable on-disk ids.
///
/// The discriminant of each variant is the tag id used in file names and defines the canonical
/// field order of master index entries: first the string tags, then the numeric tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, FromStr)]
#[display(style = "lowercase")]
#[repr(u32)]
pub enum Tag {
    /// Track artist.
    Artist = 0,
    /// Album name.
    Album = 1,
    /// Musical genre.
    Genre = 2,
    /// Track title.
    Title = 3,
    /// Device-visible path of the audio file.
    Filename = 4,
    /// Composer.
    Composer = 5,
    /// Free-form comment.
    Comment = 6,
    /// Album artist.
    AlbumArtist = 7,
    /// Work or content group.
    Grouping = 8,
    /// Release year.
    Year = 9,
    /// Disc number within a multi-disc release.
    DiscNumber = 10,
    /// Track number within the disc.
    TrackNumber = 11,
    /// Audio bitrate in kbit/s.
    Bitrate = 12,
    /// Track duration in milliseconds.
    Length = 13,
    /// Number of times the track has been played.
    PlayCount = 14,
    /// User rating.
    Rating = 15,
    /// Accumulated playback time in milliseconds.
    PlayTime = 16,
    /// Time the track was last played, in seconds since the epoch.
    LastPlayed = 17,
    /// Id of the database commit that last touched this entry.
    CommitId = 18,
    /// Modification time of the audio file, in seconds since the epoch.
    Mtime = 19,
}

impl Tag {
    /// Total number of tags.
    pub const COUNT: usize = 20;
    /// Number of string-valued tags.
    pub const STRING_COUNT: usize = 9;
    /// Number of numeric tags.
    pub const NUMERIC_COUNT: usize = 11;

    /// All tags in canonical field order.
    pub const ALL: [Self; Self::COUNT] = [
        Self::Artist,
        Self::Album,
        Self::Genre,
        Self::Title,
        Self::Filename,
        Self::Composer,
        Self::Comment,
        Self::AlbumArtist,
        Self::Grouping,
        Self::Year,
        Self::DiscNumber,
        Self::TrackNumber,
        Self::Bitrate,
        Self::Length,
        Self::PlayCount,
        Self::Rating,
        Self::PlayTime,
        Self::LastPlayed,
        Self::CommitId,
        Self::Mtime,
    ];

    /// The string-valued tags, each of which has its own tag file.
    pub const STRINGS: [Self; Self::STRING_COUNT] = [
        Self::Artist,
        Self::Album,
        Self::Genre,
        Self::Title,
        Self::Filename,
        Self::Composer,
        Self::Comment,
        Self::AlbumArtist,
        Self::Grouping,
    ];

    /// The numeric tags, stored inline in master index entries.
    pub const NUMERICS: [Self; Self::NUMERIC_COUNT] = [
        Self::Year,
        Self::DiscNumber,
        Self::TrackNumber,
        Self::Bitrate,
        Self::Length,
        Self::PlayCount,
        Self::Rating,
        Self::PlayTime,
        Self::LastPlayed,
        Self::CommitId,
        Self::Mtime,
    ];

    /// The stable on-disk id of this tag.
    #[must_use]
    pub const fn id(self) -> u32 {
        self as u32
    }

    /// Looks up a tag by its on-disk id.
    #[must_use]
    pub const fn from_id(id: u32) -> Option<Self> {
        if (id as usize) < Self::COUNT {
            Some(Self::ALL[id as usize])
        } else {
            None
        }
    }

    /// Returns `true` if this tag is string-valued.
    #[must_use]
    pub const fn is_string(self) -> bool {
        (self as usize) < Self::STRING_COUNT
    }

    /// Index of this tag among the string tags, if it is one.
    #[must_use]
    pub const fn string_index(self) -> Option<usize> {
        if self.is_string() {
            Some(self as usize)
        } else {
            None
        }
    }

    /// Index of this tag among the numeric tags, if it is one.
    #[must_use]
    pub const fn numeric_index(self) -> Option<usize> {
        if self.is_string() {
            None
        } else {
            Some(self as usize - Self::STRING_COUNT)
        }
    }
}

bitflags! {
    /// Flags word carried by every master index entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EntryFlags: u32 {
        /// The entry refers to a file that no longer exists.
        const DELETED = 0x1;
        /// The entry has been integrated into the directory cache.
        const DIRCACHE = 0x2;
        /// The numeric fields of the entry have uncommitted modifications.
        const DIRTYNUM = 0x4;
        /// The track number was generated from the filename because the tags carried none.
        const TRKNUMGEN = 0x8;
        /// Runtime statistics were carried over from a previous database generation.
        const RESURRECTED = 0x10;
    }
}

/// The header at the start of every tagcache file.
#[binrw]
#[brw(magic = b"TCDB")]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct FileHeader {
    /// Schema version of the database layout.
    pub version: u32,
    /// Number of records in the file body: index entries for the master index, strings for a
    /// tag file.
    pub entry_count: u32,
    /// Number of bytes in the file body following this header.
    pub data_size: u32,
    /// Monotonic build id of the database generation this file belongs to (0 permitted).
    pub serial: u32,
}

impl FileHeader {
    /// Size of the header in bytes, including the magic signature.
    pub const SIZE: u32 = 20;

    /// Creates a header for the supported schema version.
    #[must_use]
    pub const fn new(entry_count: u32, data_size: u32, serial: u32) -> Self {
        Self {
            version: SCHEMA_VERSION,
            entry_count,
            data_size,
            serial,
        }
    }

    /// Ensures that the declared schema version is supported.
    pub fn validate(&self) -> Result<()> {
        if self.version == SCHEMA_VERSION {
            Ok(())
        } else {
            Err(Error::UnsupportedVersion(self.version))
        }
    }
}

/// A master index entry in its on-disk representation.
///
/// One `u32` field per tag in canonical order: string tags hold the offset of the referenced
/// record in their tag file ([`NULL_REF`] if the tag has no value), numeric tags hold the value
/// itself.
#[binrw]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct RawEntry {
    /// One field per tag, in canonical tag order.
    pub fields: [u32; Tag::COUNT],
    /// Entry flags.
    #[br(map = EntryFlags::from_bits_retain)]
    #[bw(map = |flags: &EntryFlags| flags.bits())]
    pub flags: EntryFlags,
}

impl RawEntry {
    /// Size of an entry on disk in bytes.
    pub const SIZE: u32 = (Tag::COUNT as u32 + 1) * 4;

    /// File offset of the entry at `index` in the master index.
    #[must_use]
    pub const fn offset_of(index: usize) -> u32 {
        FileHeader::SIZE + index as u32 * Self::SIZE
    }
}

impl Default for RawEntry {
    fn default() -> Self {
        let mut fields = [0; Tag::COUNT];
        for tag in Tag::STRINGS {
            fields[tag as usize] = NULL_REF;
        }
        Self {
            fields,
            flags: EntryFlags::empty(),
        }
    }
}

/// Path of the master index file inside a database directory.
#[must_use]
pub fn master_path(dir: &Path) -> PathBuf {
    dir.join(MASTER_FILENAME)
}

/// Path of the tag file for the given string tag inside a database directory.
#[must_use]
pub fn tag_file_path(dir: &Path, tag: Tag) -> PathBuf {
    debug_assert!(tag.is_string());
    dir.join(format!("database_{}.tcd", tag.id()))
}

/// Reads and validates a master index: header first, then `entry_count` entries.
///
/// The returned entries still carry raw offsets; resolving them against the tag files is the
/// second pass performed by [`crate::database::parse_database`].
pub fn read_master<R: Read + Seek>(
    reader: &mut R,
    endian: Endian,
) -> Result<(FileHeader, Vec<RawEntry>)> {
    let header = FileHeader::read_options(reader, endian, ())?;
    header.validate()?;
    if u64::from(header.data_size) != u64::from(header.entry_count) * u64::from(RawEntry::SIZE) {
        return Err(Error::Truncated);
    }
    let mut entries = Vec::with_capacity(header.entry_count as usize);
    for _ in 0..header.entry_count {
        entries.push(RawEntry::read_options(reader, endian, ())?);
    }
    Ok((header, entries))
}

/// Serializes a master index: header followed by the entries in canonical field order.
///
/// The entries must already carry their final tag file offsets, so the tag files have to be
/// laid out before the master index is flushed.
pub fn write_master<W: Write + Seek>(
    writer: &mut W,
    endian: Endian,
    serial: u32,
    entries: &[RawEntry],
) -> Result<()> {
    let entry_count: u32 = entries.len().try_into().expect("too many entries");
    let data_size = entry_count
        .checked_mul(RawEntry::SIZE)
        .expect("master index too large");
    let header = FileHeader::new(entry_count, data_size, serial);
    header.write_options(writer, endian, ())?;
    for entry in entries {
        entry.write_options(writer, endian, ())?;
    }
    Ok(())
}

/// Reads a tag file, walking forward one record at a time until the recorded entry count is
/// reached.
///
/// Returns the records in file order together with the file offset at which each record starts,
/// which is what entry fields in the master index refer to.
pub fn read_tag_file<R: Read + Seek>(
    reader: &mut R,
    endian: Endian,
) -> Result<(FileHeader, Vec<(u32, TagString)>)> {
    let header = FileHeader::read_options(reader, endian, ())?;
    header.validate()?;
    let mut records = Vec::with_capacity(header.entry_count as usize);
    let mut offset = FileHeader::SIZE;
    for _ in 0..header.entry_count {
        let record = TagString::read_options(reader, endian, ())?;
        let next_offset = offset + record.size_on_disk();
        records.push((offset, record));
        offset = next_offset;
    }
    if offset - FileHeader::SIZE != header.data_size {
        return Err(Error::Truncated);
    }
    Ok((header, records))
}

/// Serializes a tag file and reports the file offset at which each record landed, in record
/// order.
pub fn write_tag_file<W: Write + Seek>(
    writer: &mut W,
    endian: Endian,
    serial: u32,
    records: &[TagString],
) -> Result<Vec<u32>> {
    let entry_count: u32 = records.len().try_into().expect("too many strings");
    let data_size = records.iter().map(TagString::size_on_disk).sum();
    let header = FileHeader::new(entry_count, data_size, serial);
    header.write_options(writer, endian, ())?;
    let mut offsets = Vec::with_capacity(records.len());
    let mut offset = FileHeader::SIZE;
    for record in records {
        record.write_options(writer, endian, ())?;
        offsets.push(offset);
        offset += record.size_on_disk();
    }
    Ok(offsets)
}
