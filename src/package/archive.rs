// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Payload archive of a bundle.
//!
//! Entries are buffered in memory in insertion order. Nothing is encoded
//! until the payload is finalized, so a half-built payload is never visible
//! on disk.

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::io::{Cursor, Read, Result, Write};
use tar::{Archive, Builder, EntryType, Header};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Mode of every payload entry.
pub const ENTRY_MODE: u32 = 0o644;

/// Buffered payload entries.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Payload {
    entries: Vec<(String, Vec<u8>)>,
}

impl Payload {
    /// Construct new empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add entry, replacing any previous entry at the same path.
    pub fn add(&mut self, path: impl Into<String>, data: impl Into<Vec<u8>>) {
        let path = path.into();
        let data = data.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == path) {
            Some(entry) => entry.1 = data,
            None => self.entries.push((path, data)),
        }
    }

    /// Lookup content of entry.
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == path)
            .map(|(_, data)| data.as_slice())
    }

    /// Paths of every entry in insertion order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(path, _)| path.as_str())
    }

    /// Encode payload as tar archive.
    ///
    /// Every entry header gets the same modification time, mode, and owner,
    /// so encoding depends on entry content alone.
    ///
    /// # Errors
    ///
    /// - Return [`std::io::Error`] if archive cannot be encoded.
    pub fn encode(&self, compress: bool, mtime: u64) -> Result<Vec<u8>> {
        if compress {
            let encoder = GzEncoder::new(Vec::new(), Compression::best());
            self.write_tar(encoder, mtime)?.finish()
        } else {
            self.write_tar(Vec::new(), mtime)
        }
    }

    /// Decode payload from tar archive, compressed or not.
    ///
    /// # Errors
    ///
    /// - Return [`std::io::Error`] if archive cannot be decoded.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.starts_with(&GZIP_MAGIC) {
            Self::read_tar(GzDecoder::new(bytes))
        } else {
            Self::read_tar(Cursor::new(bytes))
        }
    }

    /// Check if encoded payload is gzip-compressed.
    pub fn is_compressed(bytes: &[u8]) -> bool {
        bytes.starts_with(&GZIP_MAGIC)
    }

    fn write_tar<W: Write>(&self, writer: W, mtime: u64) -> Result<W> {
        let mut builder = Builder::new(writer);
        for (path, data) in &self.entries {
            let mut header = Header::new_gnu();
            header.set_entry_type(EntryType::Regular);
            header.set_size(data.len() as u64);
            header.set_mode(ENTRY_MODE);
            header.set_mtime(mtime);
            header.set_uid(0);
            header.set_gid(0);
            builder.append_data(&mut header, path, data.as_slice())?;
        }

        builder.into_inner()
    }

    fn read_tar<R: Read>(reader: R) -> Result<Self> {
        let mut payload = Self::new();
        let mut archive = Archive::new(reader);
        for entry in archive.entries()? {
            let mut entry = entry?;
            let path = entry.path()?.to_string_lossy().into_owned();
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            payload.add(path, data);
        }

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn payload() -> Payload {
        let mut payload = Payload::new();
        payload.add("src/Deploy.php", "<?php class Deploy {}");
        payload.add("LICENSE", "\nMIT\n");
        payload
    }

    #[test]
    fn later_entry_replaces_earlier_one() {
        let mut payload = payload();
        payload.add("src/Deploy.php", "<?php");

        assert_eq!(payload.paths().collect::<Vec<_>>(), ["src/Deploy.php", "LICENSE"]);
        assert_eq!(payload.get("src/Deploy.php"), Some(b"<?php".as_slice()));
    }

    #[test]
    fn encoding_depends_on_content_only() -> anyhow::Result<()> {
        for compress in [false, true] {
            let first = payload().encode(compress, 1458000000)?;
            let second = payload().encode(compress, 1458000000)?;
            assert_eq!(first, second);
            assert_eq!(Payload::is_compressed(&first), compress);
            assert_eq!(Payload::decode(&first)?, payload());
        }

        Ok(())
    }

    #[test]
    fn encoding_records_mtime() -> anyhow::Result<()> {
        let bytes = payload().encode(false, 1458000000)?;
        let mut archive = Archive::new(bytes.as_slice());
        for entry in archive.entries()? {
            let entry = entry?;
            assert_eq!(entry.header().mtime()?, 1458000000);
            assert_eq!(entry.header().mode()?, ENTRY_MODE);
        }

        Ok(())
    }
}
