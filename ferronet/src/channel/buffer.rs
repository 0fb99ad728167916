//! Unread device output, searched from the tail.
//!
//! Prompts sit at the end of the output, so regex searches only look at the
//! last `search_depth` bytes. A long `show` output costs one scan per read of
//! that window rather than of everything received so far.

use std::fmt;
use std::ops::Range;

use bytes::{Bytes, BytesMut};
use memchr::memmem;
use regex::bytes::Regex;
use vte::{Parser, Perform};

use super::patterns::last_match_from;

/// Escape-free output that has not been handed to a caller yet.
pub struct PatternBuffer {
    unread: BytesMut,
    search_depth: usize,
    /// VT state, so a sequence split between two reads is still dropped.
    parser: Parser,
}

/// Keeps printable characters plus `\n`, `\r` and `\t`.
struct Printable<'a>(&'a mut BytesMut);

impl Perform for Printable<'_> {
    fn print(&mut self, c: char) {
        let mut utf8 = [0u8; 4];
        self.0.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\n' | b'\r' | b'\t') {
            self.0.extend_from_slice(&[byte]);
        }
    }
}

impl PatternBuffer {
    pub fn new(search_depth: usize) -> Self {
        Self {
            unread: BytesMut::with_capacity(4096),
            search_depth,
            parser: Parser::new(),
        }
    }

    /// Append a chunk read from the device.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.parser.advance(&mut Printable(&mut self.unread), chunk);
    }

    fn tail_start(&self) -> usize {
        self.unread.len().saturating_sub(self.search_depth)
    }

    /// First match of `pattern` starting inside the tail window.
    ///
    /// The range indexes the whole buffer. The regex still sees the bytes in
    /// front of the window, so `^` only matches at a real line start.
    pub fn search_tail(&self, pattern: &Regex) -> Option<Range<usize>> {
        pattern.find_at(&self.unread, self.tail_start()).map(|m| m.range())
    }

    /// Last match of `pattern` starting inside the tail window.
    pub fn search_tail_last(&self, pattern: &Regex) -> Option<Range<usize>> {
        last_match_from(pattern, &self.unread, self.tail_start())
    }

    /// Offset just past the first occurrence of `needle`, searching everything.
    pub fn find_literal(&self, needle: &[u8]) -> Option<usize> {
        memmem::find(&self.unread, needle).map(|at| at + needle.len())
    }

    /// Hand out the first `at` bytes; the rest stays unread.
    pub fn split_to(&mut self, at: usize) -> Bytes {
        let at = at.min(self.unread.len());
        self.unread.split_to(at).freeze()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.unread
    }

    pub fn len(&self) -> usize {
        self.unread.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unread.is_empty()
    }

    pub fn clear(&mut self) {
        self.unread.clear();
    }
}

impl fmt::Debug for PatternBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternBuffer")
            .field("unread", &String::from_utf8_lossy(&self.unread))
            .field("search_depth", &self.search_depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with(depth: usize, chunks: &[&[u8]]) -> PatternBuffer {
        let mut buffer = PatternBuffer::new(depth);
        for chunk in chunks {
            buffer.extend(chunk);
        }
        buffer
    }

    #[test]
    fn test_plain_text_is_kept() {
        let buffer = buffer_with(100, &[b"Building configuration...\r\n\tdone\n"]);
        assert_eq!(buffer.as_slice(), b"Building configuration...\r\n\tdone\n");
    }

    #[test]
    fn test_escape_sequences_are_dropped() {
        let buffer = buffer_with(100, &[b"\x1b[1;32mInterface up\x1b[0m\x07"]);
        assert_eq!(buffer.as_slice(), b"Interface up");
    }

    #[test]
    fn test_escape_split_between_reads() {
        let buffer = buffer_with(100, &[b"router\x1b[", b"0m#"]);
        assert_eq!(buffer.as_slice(), b"router#");
    }

    #[test]
    fn test_search_is_limited_to_tail() {
        let prompt = Regex::new(r"router#").unwrap();

        let recent = buffer_with(20, &[&[b'x'; 100], b"\nrouter#"]);
        assert_eq!(recent.search_tail(&prompt), Some(101..108));

        let stale = buffer_with(10, &[b"router#", &[b'x'; 100]]);
        assert_eq!(stale.search_tail(&prompt), None);
    }

    #[test]
    fn test_line_anchor_sees_bytes_before_tail() {
        // the window "fgh#" starts mid-line
        let buffer = buffer_with(4, &[b"abcdefgh#"]);
        let prompt = Regex::new(r"(?m)^\w+#$").unwrap();
        assert_eq!(buffer.search_tail(&prompt), None);
    }

    #[test]
    fn test_search_tail_last() {
        let buffer = buffer_with(100, &[b"router#\nshow clock\nrouter#"]);
        let prompt = Regex::new(r"(?m)^router#").unwrap();
        assert_eq!(buffer.search_tail(&prompt), Some(0..7));
        assert_eq!(buffer.search_tail_last(&prompt), Some(19..26));
    }

    #[test]
    fn test_split_leaves_remainder_unread() {
        let mut buffer = buffer_with(100, &[b"enable\r\nPassword: "]);
        let end = buffer.find_literal(b"enable").unwrap();

        assert_eq!(&buffer.split_to(end)[..], b"enable");
        assert_eq!(buffer.as_slice(), b"\r\nPassword: ");
        assert_eq!(&buffer.split_to(usize::MAX)[..], b"\r\nPassword: ");
        assert!(buffer.is_empty());
    }
}
