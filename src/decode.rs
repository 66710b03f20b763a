//! Decoding of the raw, length-prefixed inotify byte stream.

use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt;

use log::debug;

use crate::flags::EventFlags;

/// Byte length of [`EventHeader`] on the wire.
pub const HEADER_LEN: usize = 16;

/// Fixed-size header leading every raw record, bit-for-bit the kernel's
/// `struct inotify_event` and therefore native-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    pub wd: i32,
    pub mask: u32,
    /// Correlates a moved-from record with its paired moved-to record.
    pub cookie: u32,
    /// Declared length of the NUL-padded name field that follows.
    pub len: u32,
}

/// One decoded record: header, resolved type names and the NUL-stripped name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub header: EventHeader,
    pub flags: EventFlags,
    pub type_names: Vec<&'static str>,
    pub name: OsString,
}

/// Stateful decoder turning an accumulating byte buffer into records.
///
/// Partial input stays buffered across [`feed`](Decoder::feed) calls; bytes
/// are consumed from the front exactly once and never re-emitted.
#[derive(Debug, Default)]
pub struct Decoder {
    buf: Vec<u8>,
}

impl Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes and return a draining iterator over the complete
    /// records now available. Records left unconsumed by the caller remain
    /// buffered for the next feed.
    pub fn feed(&mut self, bytes: &[u8]) -> Records<'_> {
        self.buf.extend_from_slice(bytes);
        Records { decoder: self }
    }

    /// Decode and consume the next complete record, if the buffer holds one.
    ///
    /// # Panics
    /// Panics when a record's mask carries bits outside the known universe,
    /// see [`EventFlags::from_mask`].
    pub fn pop(&mut self) -> Option<Record> {
        if self.buf.len() < HEADER_LEN {
            if !self.buf.is_empty() {
                debug!("not enough bytes for a header, waiting for more input");
            }
            return None;
        }

        let header = EventHeader {
            wd: read_i32(&self.buf[0..4]),
            mask: read_u32(&self.buf[4..8]),
            cookie: read_u32(&self.buf[8..12]),
            len: read_u32(&self.buf[12..16]),
        };
        let total = HEADER_LEN + header.len as usize;
        if self.buf.len() < total {
            return None;
        }

        let flags = EventFlags::from_mask(header.mask);
        let type_names = flags.type_names();

        // The name field is aligned and right-padded with NULs; the padding
        // is not part of the name.
        let name = &self.buf[HEADER_LEN..total];
        let end = name.iter().rposition(|&b| b != 0).map_or(0, |pos| pos + 1);
        let name = OsString::from_vec(name[..end].to_vec());

        self.buf.drain(..total);
        Some(Record {
            header,
            flags,
            type_names,
            name,
        })
    }
}

fn read_i32(bytes: &[u8]) -> i32 {
    i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Draining iterator returned by [`Decoder::feed`].
pub struct Records<'a> {
    decoder: &'a mut Decoder,
}

impl Iterator for Records<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.pop()
    }
}

/// Encode one record the way the kernel lays it out, padding the name to
/// the 16-byte alignment boundary.
#[cfg(test)]
pub(crate) fn encode_record(wd: i32, mask: u32, cookie: u32, name: &[u8]) -> Vec<u8> {
    let padded = if name.is_empty() {
        0
    } else {
        (name.len() / HEADER_LEN + 1) * HEADER_LEN
    };
    let mut out = Vec::with_capacity(HEADER_LEN + padded);
    out.extend_from_slice(&wd.to_ne_bytes());
    out.extend_from_slice(&mask.to_ne_bytes());
    out.extend_from_slice(&cookie.to_ne_bytes());
    out.extend_from_slice(&(padded as u32).to_ne_bytes());
    out.extend_from_slice(name);
    out.resize(HEADER_LEN + padded, 0);
    out
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::*;
    use crate::ffi;

    #[test]
    fn must_decode_identically_across_split_points() {
        let mut wire = Vec::new();
        wire.extend(encode_record(1, ffi::IN_CREATE, 0, b"file"));
        wire.extend(encode_record(
            1,
            ffi::IN_CREATE | ffi::IN_ISDIR,
            0,
            b"a-much-longer-directory-name",
        ));
        wire.extend(encode_record(
            2,
            ffi::IN_MOVED_FROM,
            42,
            "新增資料夾".as_bytes(),
        ));
        wire.extend(encode_record(3, ffi::IN_DELETE_SELF, 0, b""));

        let mut reference = Decoder::new();
        let baseline: Vec<_> = reference.feed(&wire).collect();
        assert_eq!(baseline.len(), 4);

        for split in 0..=wire.len() {
            let mut decoder = Decoder::new();
            let mut records: Vec<_> = decoder.feed(&wire[..split]).collect();
            records.extend(decoder.feed(&wire[split..]));
            assert_eq!(records, baseline, "diverged when split at {split}");
        }
    }

    #[test]
    fn must_strip_nul_padding() {
        let mut decoder = Decoder::new();
        let record = decoder
            .feed(&encode_record(1, ffi::IN_CREATE, 0, b"f"))
            .next()
            .expect("a complete record");
        assert_eq!(record.name, OsString::from("f"));
        assert_eq!(record.header.len as usize % HEADER_LEN, 0);
    }

    #[test]
    fn must_keep_partial_records_buffered() {
        let wire = encode_record(7, ffi::IN_OPEN, 0, b"partial");
        let mut decoder = Decoder::new();

        assert!(decoder.feed(&wire[..HEADER_LEN - 1]).next().is_none());
        // A full header alone is still not a full record.
        assert!(decoder.feed(&wire[HEADER_LEN - 1..HEADER_LEN + 2]).next().is_none());

        let record = decoder
            .feed(&wire[HEADER_LEN + 2..])
            .next()
            .expect("record once all bytes arrived");
        assert_eq!(record.header.wd, 7);
        assert_eq!(record.name, OsString::from("partial"));
    }

    #[test]
    fn must_resolve_header_fields_and_names() {
        let mut decoder = Decoder::new();
        let record = decoder
            .feed(&encode_record(5, ffi::IN_MOVED_TO | ffi::IN_ISDIR, 99, b"dst"))
            .next()
            .expect("a complete record");
        assert_eq!(record.header.wd, 5);
        assert_eq!(record.header.cookie, 99);
        assert_eq!(record.type_names, ["IN_MOVED_TO", "IN_ISDIR"]);
        assert_eq!(record.flags, EventFlags::MOVED_TO | EventFlags::ISDIR);
    }

    #[test]
    #[should_panic(expected = "outside the known universe")]
    fn must_panic_on_unknown_mask_bits() {
        let mut decoder = Decoder::new();
        let _ = decoder.feed(&encode_record(1, 0x0001_0000, 0, b"")).next();
    }
}
