//! Block tree of a FIF file (`mne/_fiff/tree.py`).
//!
//! The flat tag directory is folded into nested [`Node`]s at every
//! `FIFF_BLOCK_START` / `FIFF_BLOCK_END` pair.
use std::io::{Read, Seek};
use anyhow::{bail, Result};

use super::constants::*;
use super::tag::{read_directory, read_i32, read_tag_header, TagHeader};

#[derive(Debug, Default, Clone)]
pub struct Node {
    /// Block kind, 0 for the root.
    pub block:    i32,
    /// Non-structural tags directly inside this block.
    pub entries:  Vec<TagHeader>,
    pub children: Vec<Node>,
}

impl Node {
    /// Depth-first search for the first block of `kind`, including `self`.
    pub fn find_block(&self, kind: i32) -> Option<&Node> {
        if self.block == kind {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_block(kind))
    }

    /// Every block of `kind`, depth-first.
    pub fn find_blocks(&self, kind: i32) -> Vec<&Node> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.block == kind {
                out.push(node);
            }
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// First entry of `kind` in this block only.
    pub fn find_tag(&self, kind: i32) -> Option<&TagHeader> {
        self.entries.iter().find(|e| e.kind == kind)
    }
}

/// Fold `directory` into a tree, asking `block_kind` for the kind of every
/// `FIFF_BLOCK_START` tag.  Unterminated blocks are attached to their parent.
fn assemble<F>(directory: &[TagHeader], mut block_kind: F) -> Node
where
    F: FnMut(&TagHeader) -> i32,
{
    let mut stack = vec![Node::default()];
    for tag in directory {
        match tag.kind {
            FIFF_BLOCK_START => stack.push(Node { block: block_kind(tag), ..Node::default() }),
            FIFF_BLOCK_END if stack.len() > 1 => {
                if let Some(done) = stack.pop() {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(done);
                    }
                }
            }
            FIFF_BLOCK_END => {}
            _ => {
                if let Some(node) = stack.last_mut() {
                    node.entries.push(*tag);
                }
            }
        }
    }
    while stack.len() > 1 {
        if let Some(orphan) = stack.pop() {
            if let Some(parent) = stack.last_mut() {
                parent.children.push(orphan);
            }
        }
    }
    stack.pop().unwrap_or_default()
}

/// Build the tree, reading each block kind from the file.
pub fn read_tree<R: Read + Seek>(reader: &mut R, directory: &[TagHeader]) -> Result<Node> {
    Ok(assemble(directory, |tag| read_i32(reader, tag).unwrap_or(0)))
}

/// Follow the `next` chain from offset 0 (MNE's slow path).
pub fn scan_directory<R: Read + Seek>(reader: &mut R) -> Result<Vec<TagHeader>> {
    let mut directory = Vec::new();
    let mut pos = Some(0_u64);
    while let Some(p) = pos {
        let tag = read_tag_header(reader, p)?;
        pos = tag.next_pos();
        if matches!(pos, Some(n) if n <= p) {
            bail!("tag chain loops back at {p:#x}");
        }
        directory.push(tag);
    }
    Ok(directory)
}

/// Load the directory referenced by `FIFF_DIR_POINTER`, if the file has one.
///
/// `Ok(None)` means "no usable directory, fall back to [`scan_directory`]".
pub fn try_load_directory<R: Read + Seek>(reader: &mut R) -> Result<Option<Vec<TagHeader>>> {
    let id_tag = read_tag_header(reader, 0)?;
    if id_tag.kind != FIFF_FILE_ID {
        bail!("not a FIF file: first tag is {} (expected FIFF_FILE_ID)", id_tag.kind);
    }
    let Some(next) = id_tag.next_pos() else { return Ok(None) };
    let ptr = read_tag_header(reader, next)?;
    if ptr.kind != FIFF_DIR_POINTER {
        return Ok(None);
    }
    let dirpos = read_i32(reader, &ptr)?;
    if dirpos <= 0 {
        return Ok(None);
    }
    let dir_tag = read_tag_header(reader, dirpos as u64)?;
    if dir_tag.ftype != FIFFT_DIR_ENTRY_STRUCT {
        return Ok(None);
    }
    read_directory(reader, &dir_tag).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir(kinds: &[i32]) -> Vec<TagHeader> {
        kinds
            .iter()
            .enumerate()
            .map(|(i, &kind)| TagHeader { kind, ftype: FIFFT_INT, size: 4, next: 0, pos: i as u64 * 20 })
            .collect()
    }

    /// Hands out block kinds in order of appearance.
    fn kinds_in_order(kinds: &[i32]) -> impl FnMut(&TagHeader) -> i32 + '_ {
        let mut it = kinds.iter().copied();
        move |_| it.next().unwrap_or(0)
    }

    #[test]
    fn tags_without_blocks_stay_in_root() {
        let root = assemble(&dir(&[FIFF_NCHAN, FIFF_SFREQ]), |_| 0);
        assert_eq!(root.entries.len(), 2);
        assert!(root.children.is_empty());
    }

    #[test]
    fn nested_blocks_resolve() {
        let d = dir(&[
            FIFF_BLOCK_START, FIFF_BLOCK_START, FIFF_NCHAN, FIFF_BLOCK_END,
            FIFF_SFREQ, FIFF_BLOCK_START, FIFF_FIRST_SAMPLE, FIFF_BLOCK_END, FIFF_BLOCK_END,
        ]);
        let root = assemble(&d, kinds_in_order(&[FIFFB_MEAS, FIFFB_MEAS_INFO, FIFFB_RAW_DATA]));
        let meas = root.find_block(FIFFB_MEAS).unwrap();
        assert_eq!(meas.entries.len(), 1);
        assert_eq!(meas.children.len(), 2);
        assert!(meas.find_block(FIFFB_MEAS_INFO).unwrap().find_tag(FIFF_NCHAN).is_some());
        assert!(meas.find_block(FIFFB_RAW_DATA).unwrap().find_tag(FIFF_FIRST_SAMPLE).is_some());
    }

    #[test]
    fn find_blocks_collects_siblings() {
        let d = dir(&[
            FIFF_BLOCK_START, FIFF_BLOCK_START, FIFF_BLOCK_END,
            FIFF_BLOCK_START, FIFF_BLOCK_END, FIFF_BLOCK_END,
        ]);
        let root = assemble(&d, kinds_in_order(&[FIFFB_HPI_MEAS, FIFFB_HPI_COIL, FIFFB_HPI_COIL]));
        assert_eq!(root.find_blocks(FIFFB_HPI_COIL).len(), 2);
    }

    #[test]
    fn unterminated_block_is_kept() {
        let root = assemble(&dir(&[FIFF_BLOCK_START, FIFF_NCHAN]), |_| FIFFB_MEAS);
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].entries.len(), 1);
    }

    #[test]
    fn stray_block_end_is_ignored() {
        let root = assemble(&dir(&[FIFF_BLOCK_END, FIFF_NCHAN]), |_| 0);
        assert_eq!(root.entries.len(), 1);
    }
}
