//! Byte-offset aware JSONL reading
//!
//! Offsets are counted in raw bytes as read from disk, newline included,
//! whether or not a line later parses. A message's offset therefore always
//! points at the first byte of its line.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Take};
use std::path::Path;

/// One physical line of a JSONL file.
#[derive(Debug, Clone)]
pub struct Line {
    /// Offset of the first byte of the line
    pub offset: u64,
    /// Raw bytes including the terminator, if any
    bytes: Vec<u8>,
}

impl Line {
    /// Line content without the trailing `\n` / `\r\n`.
    pub fn content(&self) -> &[u8] {
        let mut end = self.bytes.len();
        if end > 0 && self.bytes[end - 1] == b'\n' {
            end -= 1;
            if end > 0 && self.bytes[end - 1] == b'\r' {
                end -= 1;
            }
        }
        &self.bytes[..end]
    }

    /// Bytes this line occupies on disk, terminator included.
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_blank(&self) -> bool {
        self.content().iter().all(|b| b.is_ascii_whitespace())
    }

    /// False for a final line the writer has not finished yet.
    pub fn is_terminated(&self) -> bool {
        self.bytes.last() == Some(&b'\n')
    }

    /// Offset just past this line.
    pub fn end_offset(&self) -> u64 {
        self.offset + self.len()
    }
}

/// Iterator over lines of a reader, tracking the running byte offset.
pub struct OffsetLines<R> {
    reader: R,
    offset: u64,
}

impl<R: BufRead> OffsetLines<R> {
    /// `start` is the absolute offset the reader is positioned at.
    pub fn new(reader: R, start: u64) -> Self {
        Self {
            reader,
            offset: start,
        }
    }

    /// Offset of the next unread byte.
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl<R: BufRead> Iterator for OffsetLines<R> {
    type Item = io::Result<Line>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut bytes = Vec::new();
        match self.reader.read_until(b'\n', &mut bytes) {
            Ok(0) => None,
            Ok(n) => {
                let line = Line {
                    offset: self.offset,
                    bytes,
                };
                self.offset += n as u64;
                Some(Ok(line))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Open `path` and iterate its lines starting at byte `start`.
pub fn open_at(path: &Path, start: u64) -> io::Result<OffsetLines<BufReader<File>>> {
    let mut file = File::open(path)?;
    if start > 0 {
        file.seek(SeekFrom::Start(start))?;
    }
    Ok(OffsetLines::new(BufReader::new(file), start))
}

/// Like [`open_at`], but stops at byte `end` even if the file has grown since.
pub fn open_range(
    path: &Path,
    start: u64,
    end: u64,
) -> io::Result<OffsetLines<BufReader<Take<File>>>> {
    let mut file = File::open(path)?;
    if start > 0 {
        file.seek(SeekFrom::Start(start))?;
    }
    let limited = file.take(end.saturating_sub(start));
    Ok(OffsetLines::new(BufReader::new(limited), start))
}

/// Read exactly one line starting at `offset`.
///
/// Returns `None` when the offset is at or past end of file. The returned
/// text has its line terminator stripped.
pub fn read_line_at(path: &Path, offset: u64) -> io::Result<Option<Vec<u8>>> {
    let mut lines = open_at(path, offset)?;
    match lines.next() {
        Some(Ok(line)) => Ok(Some(line.content().to_vec())),
        Some(Err(e)) => Err(e),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_offsets_cover_every_byte() {
        let data = b"{\"a\":1}\n\nnot json\r\n{\"b\":2}";
        let lines: Vec<Line> = OffsetLines::new(Cursor::new(&data[..]), 0)
            .collect::<io::Result<_>>()
            .unwrap();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].offset, 0);
        assert_eq!(lines[0].content(), b"{\"a\":1}");
        assert!(lines[1].is_blank());
        assert_eq!(lines[2].content(), b"not json");
        assert_eq!(lines[3].offset, lines[2].end_offset());
        assert!(!lines[3].is_terminated());
        assert_eq!(lines[3].end_offset(), data.len() as u64);
    }

    #[test]
    fn test_multibyte_lines_count_bytes_not_chars() {
        let data = "{\"t\":\"héllo ✓\"}\n{\"t\":\"x\"}\n";
        let lines: Vec<Line> = OffsetLines::new(Cursor::new(data.as_bytes()), 0)
            .collect::<io::Result<_>>()
            .unwrap();
        let first_len = "{\"t\":\"héllo ✓\"}".len() as u64 + 1;
        assert_eq!(lines[1].offset, first_len);
    }

    #[test]
    fn test_read_line_at() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "first\nsecond\nthird").unwrap();

        assert_eq!(read_line_at(file.path(), 0).unwrap().unwrap(), b"first");
        assert_eq!(read_line_at(file.path(), 6).unwrap().unwrap(), b"second");
        assert_eq!(read_line_at(file.path(), 13).unwrap().unwrap(), b"third");
        // Mid-line offsets return the remainder of that line
        assert_eq!(read_line_at(file.path(), 8).unwrap().unwrap(), b"cond");
        assert!(read_line_at(file.path(), 18).unwrap().is_none());
        assert!(read_line_at(file.path(), 500).unwrap().is_none());
    }

    #[test]
    fn test_open_at_continues_offsets() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "aaa\nbbb\nccc\n").unwrap();

        let mut lines = open_at(file.path(), 4).unwrap();
        let line = lines.next().unwrap().unwrap();
        assert_eq!(line.offset, 4);
        assert_eq!(line.content(), b"bbb");
        assert_eq!(lines.offset(), 8);
    }

    #[test]
    fn test_open_range_stops_at_end() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "aaa\nbbb\nccc\n").unwrap();

        let lines: Vec<Line> = open_range(file.path(), 0, 6)
            .unwrap()
            .collect::<io::Result<_>>()
            .unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].content(), b"bb");
        assert!(!lines[1].is_terminated());
    }
}
