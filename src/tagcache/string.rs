// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! `binrw`-based implementation for the string records stored in tag files, capable of parsing
//! and serializing [`TagString`]s.
//!
//! See <https://www.rockbox.org/wiki/TagcacheDBFormat> for details on the format.

use crate::util::align_by;
use binrw::binrw;

/// Stored string lengths are padded to a multiple of this many bytes.
pub const ALIGNMENT: u32 = 4;

/// A single string record in a tag file.
///
/// On disk, a record consists of an 8-byte header (the padded byte length and the master index
/// offset of an entry that references this string) followed by the NUL-terminated content, padded
/// with further NUL bytes to a multiple of [`ALIGNMENT`].
///
/// The content round-trips byte-for-byte: parsing only strips the trailing NUL run, no semantic
/// interpretation is attempted.
///
/// ```
/// # pub fn main() -> binrw::BinResult<()> {
/// use binrw::{BinRead, BinWrite, Endian};
/// use rockcrate::tagcache::string::TagString;
///
/// let string = TagString::new("Abbey Road", 0x14);
/// let binary = [
///     0x0C, 0x00, 0x00, 0x00, 0x14, 0x00, 0x00, 0x00, b'A', b'b', b'b', b'e', b'y', b' ',
///     b'R', b'o', b'a', b'd', 0x00, 0x00,
/// ];
///
/// let mut writer = binrw::io::Cursor::new(vec![]);
/// string.write_options(&mut writer, Endian::Little, ())?;
/// assert_eq!(&binary, writer.get_ref().as_slice());
///
/// let mut reader = binrw::io::Cursor::new(binary);
/// let parsed = TagString::read_options(&mut reader, Endian::Little, ())?;
/// assert_eq!(parsed, string);
/// # Ok(())
/// # }
/// ```
#[binrw]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagString {
    #[br(temp, assert(
        byte_length >= ALIGNMENT && byte_length % ALIGNMENT == 0,
        "tag string length {} is not a positive multiple of {}", byte_length, ALIGNMENT
    ))]
    #[bw(calc = padded_len(content))]
    byte_length: u32,
    /// Offset into the master index of an entry that references this string.
    ///
    /// The serializer points this at the first referencing entry; any referencing entry is
    /// accepted when parsing.
    pub entry_offset: u32,
    /// String content without the terminator and padding.
    #[br(count = byte_length, map = strip_padding)]
    #[bw(map = |content: &Vec<u8>| pad(content))]
    content: Vec<u8>,
}

impl TagString {
    /// Size of the record header in bytes.
    pub const HEADER_SIZE: u32 = 8;

    /// Creates a new [`TagString`] with the given content.
    ///
    /// The content must not be empty and must not contain NUL bytes: empty values are
    /// represented by the sentinel reference in the master index entry instead of a record, and
    /// a NUL would be indistinguishable from the terminator.
    #[must_use]
    pub fn new(content: impl Into<Vec<u8>>, entry_offset: u32) -> Self {
        let content = content.into();
        debug_assert!(!content.is_empty());
        debug_assert!(!content.contains(&0));
        Self {
            entry_offset,
            content,
        }
    }

    /// The string content, without terminator and padding.
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Extract the content from the record, consuming it in the process.
    #[must_use]
    pub fn into_content(self) -> Vec<u8> {
        self.content
    }

    /// Number of content bytes on disk, including the terminator and padding.
    #[must_use]
    pub fn padded_len(&self) -> u32 {
        padded_len(&self.content)
    }

    /// Total number of bytes this record occupies on disk.
    #[must_use]
    pub fn size_on_disk(&self) -> u32 {
        Self::HEADER_SIZE + self.padded_len()
    }
}

fn padded_len(content: &[u8]) -> u32 {
    let len: u32 = (content.len() + 1).try_into().expect("tag string too long");
    align_by(len, ALIGNMENT)
}

fn pad(content: &[u8]) -> Vec<u8> {
    let mut bytes = content.to_vec();
    bytes.resize(padded_len(content) as usize, 0);
    bytes
}

fn strip_padding(mut raw: Vec<u8>) -> Vec<u8> {
    while raw.last() == Some(&0) {
        raw.pop();
    }
    raw
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::testing::test_roundtrip;
    use binrw::{BinRead, Endian};

    #[test]
    fn single_byte_pads_to_alignment() {
        test_roundtrip(
            &[0x04, 0x00, 0x00, 0x00, 0x14, 0x00, 0x00, 0x00, b'x', 0, 0, 0],
            TagString::new("x", 0x14),
        );
    }

    #[test]
    fn aligned_content_still_gets_terminator() {
        test_roundtrip(
            &[
                0x08, 0x00, 0x00, 0x00, 0x2c, 0x01, 0x00, 0x00, b'B', b'a', b'n', b'd', 0, 0, 0, 0,
            ],
            TagString::new("Band", 0x12c),
        );
    }

    #[test]
    fn non_ascii() {
        test_roundtrip(
            &[
                0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x49, 0x20, 0xe2, 0x99, 0xa5, 0,
                0, 0,
            ],
            TagString::new("I ♥", 0),
        );
    }

    #[test]
    fn comment_bytes_roundtrip_verbatim() {
        // Historic databases contain comment strings with unusual bytes. They must survive a
        // parse/serialize cycle untouched.
        let raw = [
            0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0xfe, 0x20, 0x01, 0x7f, 0, 0, 0,
        ];
        test_roundtrip(&raw, TagString::new(vec![0xff, 0xfe, 0x20, 0x01, 0x7f], 0));
    }

    #[test]
    fn rejects_unaligned_length() {
        let raw = [0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, b'x', 0, 0, 0, 0];
        let mut reader = binrw::io::Cursor::new(raw);
        assert!(TagString::read_options(&mut reader, Endian::Little, ()).is_err());
    }

    #[test]
    fn rejects_zero_length() {
        let raw = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let mut reader = binrw::io::Cursor::new(raw);
        assert!(TagString::read_options(&mut reader, Endian::Little, ()).is_err());
    }

    #[test]
    fn truncated_content() {
        let raw = [0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, b'x'];
        let mut reader = binrw::io::Cursor::new(raw);
        assert!(TagString::read_options(&mut reader, Endian::Little, ()).is_err());
    }
}
