//! 9P2000.L wire encoding: header, qid, and the little-endian/length-
//! prefixed primitives every message body is built from. Grounded on
//! `examples/original_source/dev/virtio/9p/protocol.c`'s `pdu_write*`/
//! `pdu_read*` family and `client.c`'s `p9_req_prepare`/`p9_req_finalize`
//! (header is `size:4, msg_type:1, tag:2`, size backpatched after the
//! body is encoded).

use crate::error::{err, KernelError, Result};
use alloc::string::String;
use alloc::vec::Vec;

pub const HEADER_LEN: usize = 7;
pub const QID_LEN: usize = 13;

pub const TLERROR: u8 = 6;
pub const RLERROR: u8 = 7;
pub const TLOPEN: u8 = 12;
pub const RLOPEN: u8 = 13;
pub const TLCREATE: u8 = 14;
pub const RLCREATE: u8 = 15;
pub const TGETATTR: u8 = 24;
pub const RGETATTR: u8 = 25;
pub const TREADDIR: u8 = 40;
pub const RREADDIR: u8 = 41;
pub const TMKDIR: u8 = 72;
pub const RMKDIR: u8 = 73;
pub const TVERSION: u8 = 100;
pub const RVERSION: u8 = 101;
pub const TATTACH: u8 = 104;
pub const RATTACH: u8 = 105;
pub const TWALK: u8 = 110;
pub const RWALK: u8 = 111;
pub const TREAD: u8 = 116;
pub const RREAD: u8 = 117;
pub const TWRITE: u8 = 118;
pub const RWRITE: u8 = 119;
pub const TCLUNK: u8 = 120;
pub const RCLUNK: u8 = 121;
pub const TREMOVE: u8 = 122;
pub const RREMOVE: u8 = 123;

/// A 9P qid: `{ type:1, version:4, path:8 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Qid {
    pub qtype: u8,
    pub version: u32,
    pub path: u64,
}

/// Growable little-endian encode buffer, mirroring `pdu_write*`.
#[derive(Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Encoder { buf: Vec::new() }
    }

    /// Reserve the 7-byte header, to be backpatched by `finish`.
    pub fn begin_header(&mut self, msg_type: u8, tag: u16) {
        self.buf.extend_from_slice(&0u32.to_le_bytes());
        self.buf.push(msg_type);
        self.buf.extend_from_slice(&tag.to_le_bytes());
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_u16(s.len() as u16);
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn write_data(&mut self, data: &[u8]) {
        self.write_u32(data.len() as u32);
        self.buf.extend_from_slice(data);
    }

    /// Backpatch the total size into the first 4 bytes and return the
    /// finished message.
    pub fn finish(mut self) -> Vec<u8> {
        let len = (self.buf.len() as u32).to_le_bytes();
        self.buf[0..4].copy_from_slice(&len);
        self.buf
    }
}

/// Cursor-based little-endian decoder, mirroring `pdu_read*`. Every
/// accessor returns `Io` on a short buffer rather than panicking, since
/// the data ultimately comes from a remote peer.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Decoder { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return err(KernelError::Io);
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_str(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn read_data(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u32()? as usize;
        self.take(len)
    }

    pub fn read_qid(&mut self) -> Result<Qid> {
        let qtype = self.read_u8()?;
        let version = self.read_u32()?;
        let path = self.read_u64()?;
        Ok(Qid { qtype, version, path })
    }
}

/// Header read off the front of a received message. `total_len` includes
/// the header itself.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub total_len: u32,
    pub msg_type: u8,
    pub tag: u16,
}

pub fn decode_header(buf: &[u8]) -> Result<Header> {
    let mut d = Decoder::new(buf);
    let total_len = d.read_u32()?;
    let msg_type = d.read_u8()?;
    let tag = d.read_u16()?;
    Ok(Header { total_len, msg_type, tag })
}

/// One entry from a `Treaddir`/`Rreaddir` stream: `{ qid, offset:8,
/// type:1, name:string }`.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub qid: Qid,
    pub offset: u64,
    pub dtype: u8,
    pub name: String,
}

/// Decode as many whole directory entries as fit in `buf`, tolerating a
/// short trailing entry (the server's reply is filled up to `count`
/// bytes and need not end on an entry boundary). Returns the decoded
/// entries and the number of bytes actually consumed, so the caller can
/// re-issue `Treaddir` at `offset + consumed`.
pub fn decode_dir_entries(buf: &[u8]) -> (Vec<DirEntry>, usize) {
    let mut entries = Vec::new();
    let mut d = Decoder::new(buf);
    loop {
        let start = d.position();
        let entry = (|| -> Result<DirEntry> {
            let qid = d.read_qid()?;
            let offset = d.read_u64()?;
            let dtype = d.read_u8()?;
            let name = d.read_str()?;
            Ok(DirEntry { qid, offset, dtype, name })
        })();
        match entry {
            Ok(e) => entries.push(e),
            Err(_) => return (entries, start),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips_through_encoder_and_decoder() {
        let mut enc = Encoder::new();
        enc.begin_header(TVERSION, 0xFFFF);
        enc.write_u32(8192);
        enc.write_str("9P2000.L");
        let msg = enc.finish();

        let hdr = decode_header(&msg).unwrap();
        assert_eq!(hdr.msg_type, TVERSION);
        assert_eq!(hdr.tag, 0xFFFF);
        assert_eq!(hdr.total_len as usize, msg.len());

        let mut d = Decoder::new(&msg[HEADER_LEN..]);
        assert_eq!(d.read_u32().unwrap(), 8192);
        assert_eq!(d.read_str().unwrap(), "9P2000.L");
    }

    #[test]
    fn qid_encodes_as_thirteen_bytes() {
        let mut enc = Encoder::new();
        enc.write_u8(0);
        enc.write_u32(1);
        enc.write_u64(42);
        let buf = enc.finish();
        assert_eq!(buf.len(), QID_LEN);
        let mut d = Decoder::new(&buf);
        let qid = d.read_qid().unwrap();
        assert_eq!(qid, Qid { qtype: 0, version: 1, path: 42 });
    }

    #[test]
    fn dir_entries_decode_and_stop_cleanly_on_a_short_trailing_buffer() {
        let mut enc = Encoder::new();
        for (path, name) in [(1u64, "a"), (2u64, "bb")] {
            enc.write_u8(0);
            enc.write_u32(0);
            enc.write_u64(path);
            enc.write_u64(0);
            enc.write_u8(0);
            enc.write_str(name);
        }
        let mut buf = enc.finish();
        buf.truncate(buf.len() - 1); // chop the last entry short

        let (entries, consumed) = decode_dir_entries(&buf);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a");
        assert!(consumed < buf.len());
    }
}
