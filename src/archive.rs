use std::io::{Cursor, Write};

use log::debug;
use zip::{write::FileOptions, CompressionMethod, DateTime, ZipWriter};

use crate::models::ConvertedEntry;

/// Append-only zip archive built in memory.
///
/// Entries land in the order they are appended. `finish` consumes the writer,
/// so the central directory is written exactly once.
pub struct ArchiveWriter {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    options: FileOptions,
    entries: usize,
}

impl ArchiveWriter {
    /// `level` is the deflate level, 0-9.
    pub fn new(level: i32) -> Self {
        // Fixed timestamp: the same batch always produces the same archive.
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(level))
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);

        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            options,
            entries: 0,
        }
    }

    pub fn append(&mut self, entry: &ConvertedEntry) -> zip::result::ZipResult<()> {
        self.zip.start_file(entry.name.as_str(), self.options)?;
        self.zip.write_all(&entry.data)?;
        self.entries += 1;
        debug!(
            "Archived {} ({} bytes, entry #{})",
            entry.name,
            entry.data.len(),
            self.entries
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Writes the central directory and hands back the archive bytes.
    pub fn finish(mut self) -> zip::result::ZipResult<Vec<u8>> {
        let cursor = self.zip.finish()?;
        Ok(cursor.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::read_archive;

    fn entry(name: &str, data: &[u8]) -> ConvertedEntry {
        ConvertedEntry {
            name: name.to_string(),
            data: data.to_vec(),
        }
    }

    #[test]
    fn empty_archive_is_still_valid() {
        let writer = ArchiveWriter::new(9);
        assert!(writer.is_empty());

        let bytes = writer.finish().unwrap();
        assert!(read_archive(&bytes).is_empty());
    }

    #[test]
    fn entries_keep_append_order() {
        let mut writer = ArchiveWriter::new(9);
        writer.append(&entry("b.webp", b"second")).unwrap();
        writer.append(&entry("a.webp", b"first")).unwrap();
        writer.append(&entry("b.webp", b"again")).unwrap();
        assert_eq!(writer.len(), 3);

        let entries = read_archive(&writer.finish().unwrap());
        assert_eq!(
            entries,
            vec![
                ("b.webp".to_string(), b"second".to_vec()),
                ("a.webp".to_string(), b"first".to_vec()),
                ("b.webp".to_string(), b"again".to_vec()),
            ]
        );
    }

    #[test]
    fn identical_input_gives_identical_archive() {
        let build = || {
            let mut writer = ArchiveWriter::new(6);
            writer.append(&entry("x.avif", &[7; 512])).unwrap();
            writer.finish().unwrap()
        };
        assert_eq!(build(), build());
    }
}
