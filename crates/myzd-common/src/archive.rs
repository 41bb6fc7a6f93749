// archive.rs — binary archive stream for snapshots and save files
//
// Little-endian scalars, length-prefixed strings, fixed 8-byte name
// fields, and four-byte-tagged chunks. Chunk tags and layout are a
// compatibility contract with existing save files; do not reorder.
//
// Snapshot payloads are wrapped in raw deflate (no zlib header), with a
// size guard on inflation.

use flate2::read::{DeflateDecoder, DeflateEncoder};
use flate2::Compression;
use std::io::Read;
use thiserror::Error;

/// Hard ceiling on decompressed snapshot size.
pub const MAX_INFLATE_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("unexpected end of archive")]
    UnexpectedEnd,
    #[error("archive string is not valid utf-8")]
    BadString,
    #[error("compressed data is corrupt")]
    Corrupt,
    #[error("decompressed size {0} exceeds limit")]
    TooLarge(usize),
}

// ============================================================
// Chunk tags
// ============================================================

pub type ChunkId = [u8; 4];

/// Per-level snapshot.
pub const SNAP_ID: ChunkId = *b"snAp";
/// Default-level snapshot.
pub const DSNP_ID: ChunkId = *b"dsNp";
/// Visited-map list.
pub const VIST_ID: ChunkId = *b"viSt";
/// Deferred script actions.
pub const ACSD_ID: ChunkId = *b"acSd";
/// Random player class list.
pub const RCLS_ID: ChunkId = *b"rcLs";
/// Current player class list.
pub const PCLS_ID: ChunkId = *b"pcLs";

/// Append one tagged chunk: id, u32 payload length, payload.
pub fn write_chunk(out: &mut Vec<u8>, id: ChunkId, payload: &[u8]) {
    out.extend_from_slice(&id);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(payload);
}

/// Iterator over (id, payload) pairs in a chunked buffer.
pub struct ChunkIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ChunkIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = (ChunkId, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos + 8 > self.data.len() {
            return None;
        }
        let mut id = [0u8; 4];
        id.copy_from_slice(&self.data[self.pos..self.pos + 4]);
        let len = u32::from_le_bytes(self.data[self.pos + 4..self.pos + 8].try_into().unwrap())
            as usize;
        let start = self.pos + 8;
        if start + len > self.data.len() {
            return None;
        }
        self.pos = start + len;
        Some((id, &self.data[start..start + len]))
    }
}

/// First chunk with the given id, if any.
pub fn find_chunk<'a>(data: &'a [u8], id: ChunkId) -> Option<&'a [u8]> {
    ChunkIter::new(data)
        .find(|(cid, _)| *cid == id)
        .map(|(_, payload)| payload)
}

// ============================================================
// Writer
// ============================================================

#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_i8(&mut self, v: i8) {
        self.buf.push(v as u8);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(v as u8);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    /// u32 length followed by the bytes.
    pub fn write_string(&mut self, s: &str) {
        self.write_u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    /// Fixed 8-byte name field, zero padded.
    pub fn write_name8(&mut self, s: &str) {
        let mut name = [0u8; 8];
        let bytes = s.as_bytes();
        let len = bytes.len().min(8);
        name[..len].copy_from_slice(&bytes[..len]);
        self.buf.extend_from_slice(&name);
    }

    /// Length-prefixed map name: one size byte, then up to 8 characters.
    pub fn write_map_name(&mut self, name: &str) {
        let bytes = name.as_bytes();
        let size = bytes.len().min(8) as u8;
        self.write_u8(size);
        self.buf.extend_from_slice(&bytes[..size as usize]);
    }
}

// ============================================================
// Reader
// ============================================================

pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ArchiveError> {
        if self.pos + n > self.data.len() {
            return Err(ArchiveError::UnexpectedEnd);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, ArchiveError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, ArchiveError> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_bool(&mut self) -> Result<bool, ArchiveError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, ArchiveError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> Result<u32, ArchiveError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_i32(&mut self) -> Result<i32, ArchiveError> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64, ArchiveError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_f32(&mut self) -> Result<f32, ArchiveError> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ArchiveError> {
        self.take(n)
    }

    pub fn read_string(&mut self) -> Result<String, ArchiveError> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ArchiveError::BadString)
    }

    pub fn read_name8(&mut self) -> Result<String, ArchiveError> {
        let bytes = self.take(8)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(8);
        String::from_utf8(bytes[..end].to_vec()).map_err(|_| ArchiveError::BadString)
    }

    pub fn read_map_name(&mut self) -> Result<String, ArchiveError> {
        let size = self.read_u8()? as usize;
        let bytes = self.take(size)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ArchiveError::BadString)
    }
}

// ============================================================
// Compressed blobs
// ============================================================

/// Compress with raw deflate, prefixed with the uncompressed size.
pub fn compress_blob(data: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    let mut out = Vec::with_capacity(data.len() / 2 + 8);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());

    let mut encoder = DeflateEncoder::new(data, Compression::default());
    encoder
        .read_to_end(&mut out)
        .map_err(|_| ArchiveError::Corrupt)?;
    Ok(out)
}

/// Inverse of compress_blob. Refuses blobs that claim to inflate past
/// MAX_INFLATE_SIZE.
pub fn decompress_blob(blob: &[u8]) -> Result<Vec<u8>, ArchiveError> {
    if blob.len() < 4 {
        return Err(ArchiveError::UnexpectedEnd);
    }
    let raw_len = u32::from_le_bytes(blob[..4].try_into().unwrap()) as usize;
    if raw_len > MAX_INFLATE_SIZE {
        return Err(ArchiveError::TooLarge(raw_len));
    }

    let mut decoder = DeflateDecoder::new(&blob[4..]);
    let mut out = Vec::with_capacity(raw_len);
    decoder
        .read_to_end(&mut out)
        .map_err(|_| ArchiveError::Corrupt)?;
    if out.len() != raw_len {
        return Err(ArchiveError::Corrupt);
    }
    Ok(out)
}
