//! FIFF tag I/O.
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬──────────┬───────────────────┐
//! │ kind i32 │ type u32 │ size i32 │ next i32 │ size payload bytes │
//! └──────────┴──────────┴──────────┴──────────┴───────────────────┘
//! ```
//!
//! All fields and payloads are big-endian.  `next == 0` chains to the tag
//! directly after the payload, `next > 0` is an absolute offset and
//! `next == -1` ends the chain.
use std::io::{Read, Seek, SeekFrom, Write};
use anyhow::{bail, Context, Result};

use super::constants::*;

/// A tag header without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHeader {
    pub kind:  i32,
    pub ftype: u32,
    pub size:  i32,
    pub next:  i32,
    /// Offset of the header in the file.
    pub pos:   u64,
}

impl TagHeader {
    #[inline]
    pub fn data_pos(&self) -> u64 {
        self.pos + 16
    }

    /// Payload length, with negative sizes treated as empty.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.size.max(0) as usize
    }

    pub fn next_pos(&self) -> Option<u64> {
        match self.next {
            FIFFV_NEXT_SEQ => Some(self.data_pos() + self.payload_len() as u64),
            n if n > 0     => Some(n as u64),
            _              => None,
        }
    }
}

#[inline]
fn be_i32(b: &[u8]) -> i32 {
    i32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

#[inline]
fn be_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

pub fn read_tag_header<R: Read + Seek>(reader: &mut R, pos: u64) -> Result<TagHeader> {
    reader.seek(SeekFrom::Start(pos))
        .with_context(|| format!("seek to tag header @ {pos:#x}"))?;
    let mut buf = [0u8; 16];
    reader.read_exact(&mut buf)
        .with_context(|| format!("read tag header @ {pos:#x}"))?;
    Ok(TagHeader {
        kind:  be_i32(&buf[0..4]),
        ftype: be_u32(&buf[4..8]),
        size:  be_i32(&buf[8..12]),
        next:  be_i32(&buf[12..16]),
        pos,
    })
}

// ── Payload readers ───────────────────────────────────────────────────────

pub fn read_i32<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<i32> {
    let raw = read_raw_bytes(reader, tag)?;
    if raw.len() < 4 {
        bail!("tag {} too short for an i32 ({} bytes)", tag.kind, raw.len());
    }
    Ok(be_i32(&raw))
}

pub fn read_f32<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<f32> {
    Ok(f32::from_bits(read_i32(reader, tag)? as u32))
}

/// Latin-1 string payload, decoded byte by byte.
pub fn read_string<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<String> {
    Ok(read_raw_bytes(reader, tag)?.iter().map(|&b| b as char).collect())
}

pub fn read_f32_array<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<Vec<f32>> {
    Ok(read_raw_bytes(reader, tag)?
        .chunks_exact(4)
        .map(|b| f32::from_bits(be_u32(b)))
        .collect())
}

pub fn read_raw_bytes<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<Vec<u8>> {
    reader
        .seek(SeekFrom::Start(tag.data_pos()))
        .with_context(|| format!("seek to tag data @ {:#x}", tag.data_pos()))?;
    let mut buf = vec![0u8; tag.payload_len()];
    reader.read_exact(&mut buf)
        .with_context(|| format!("read {} payload bytes of tag {}", buf.len(), tag.kind))?;
    Ok(buf)
}

/// Read the tag directory stored in a `FIFFT_DIR_ENTRY_STRUCT` tag.
///
/// Entries have the tag-header layout, except that the last word holds the
/// tag's file position instead of `next`.
pub fn read_directory<R: Read + Seek>(reader: &mut R, tag: &TagHeader) -> Result<Vec<TagHeader>> {
    if tag.ftype != FIFFT_DIR_ENTRY_STRUCT {
        bail!("expected FIFFT_DIR_ENTRY_STRUCT, got {}", tag.ftype);
    }
    Ok(read_raw_bytes(reader, tag)?
        .chunks_exact(16)
        .map(|e| TagHeader {
            kind:  be_i32(&e[0..4]),
            ftype: be_u32(&e[4..8]),
            size:  be_i32(&e[8..12]),
            next:  FIFFV_NEXT_NONE,
            pos:   be_u32(&e[12..16]) as u64,
        })
        .collect())
}

// ── Writer ────────────────────────────────────────────────────────────────

/// Sequential tag writer.
///
/// Every tag is written with `next = FIFFV_NEXT_SEQ`; [`TagWriter::finish`]
/// appends the closing `FIFF_NOP` whose `next` ends the chain, which is what
/// MNE's `end_file` does.
pub struct TagWriter<W: Write> {
    out:   W,
    depth: Vec<i32>,
}

impl<W: Write> TagWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, depth: Vec::new() }
    }

    fn header(&mut self, kind: i32, ftype: u32, size: usize, next: i32) -> Result<()> {
        let size = i32::try_from(size).context("tag payload exceeds 2 GiB")?;
        let mut buf = [0u8; 16];
        buf[0..4].copy_from_slice(&kind.to_be_bytes());
        buf[4..8].copy_from_slice(&ftype.to_be_bytes());
        buf[8..12].copy_from_slice(&size.to_be_bytes());
        buf[12..16].copy_from_slice(&next.to_be_bytes());
        self.out.write_all(&buf)?;
        Ok(())
    }

    pub fn write_bytes(&mut self, kind: i32, ftype: u32, payload: &[u8]) -> Result<()> {
        self.header(kind, ftype, payload.len(), FIFFV_NEXT_SEQ)?;
        self.out.write_all(payload)?;
        Ok(())
    }

    pub fn write_i32(&mut self, kind: i32, value: i32) -> Result<()> {
        self.write_bytes(kind, FIFFT_INT, &value.to_be_bytes())
    }

    pub fn write_f32(&mut self, kind: i32, value: f32) -> Result<()> {
        self.write_bytes(kind, FIFFT_FLOAT, &value.to_be_bytes())
    }

    /// Latin-1 string; characters outside that range become `?`.
    pub fn write_string(&mut self, kind: i32, value: &str) -> Result<()> {
        let bytes: Vec<u8> = value
            .chars()
            .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
            .collect();
        self.write_bytes(kind, FIFFT_STRING, &bytes)
    }

    pub fn start_block(&mut self, block: i32) -> Result<()> {
        self.depth.push(block);
        self.write_i32(FIFF_BLOCK_START, block)
    }

    pub fn end_block(&mut self, block: i32) -> Result<()> {
        match self.depth.pop() {
            Some(open) if open == block => self.write_i32(FIFF_BLOCK_END, block),
            Some(open) => bail!("closing block {block} while block {open} is open"),
            None => bail!("closing block {block} with no open block"),
        }
    }

    /// Terminate the tag chain and hand back the sink.
    pub fn finish(mut self) -> Result<W> {
        if let Some(open) = self.depth.last() {
            bail!("block {open} left open");
        }
        self.header(FIFF_NOP, FIFFT_VOID, 0, FIFFV_NEXT_NONE)?;
        self.out.flush()?;
        Ok(self.out)
    }
}
