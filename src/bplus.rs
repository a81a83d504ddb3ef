/* Copyright (C) 2024 Philipp Benner
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

// Fixed-key, fixed-value on-disk B+ tree mapping a chromosome name to its
// dense id and length. Node byte size is constant across levels (leaf and
// internal slots are both keySize+8 bytes), which keeps offset arithmetic
// to a single multiplication.

use std::io::{Read, Seek, Write};

use crate::cursor::Cursor;
use crate::error::{BbiError, Result};

/* -------------------------------------------------------------------------- */

pub const MAGIC: u32 = 0x78CA8C91;
const HEADER_SIZE: u64 = 32;
const NODE_HEADER_SIZE: u64 = 4;

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug)]
pub struct ChromEntry {
    pub name: String,
    pub id: u32,
    pub size: u32,
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug)]
pub struct BPlusTree {
    offset: u64,
    block_size: u32,
    key_size: u32,
    val_size: u32,
    item_count: u64,
}

impl BPlusTree {

    pub fn open<R: Read + Seek>(cursor: &mut Cursor<R>, offset: u64) -> Result<BPlusTree> {
        cursor.seek(offset)?;
        cursor.peek_magic(MAGIC)?;

        let block_size = cursor.read_u32()?;
        let key_size   = cursor.read_u32()?;
        let val_size   = cursor.read_u32()?;
        let item_count = cursor.read_u64()?;
        let _reserved  = cursor.read_u64()?;

        if val_size != 8 {
            return Err(BbiError::inconsistent(format!("b+ tree valSize {} != 8", val_size)));
        }

        Ok(BPlusTree { offset, block_size, key_size, val_size, item_count })
    }

    pub fn item_count(&self) -> u64 {
        self.item_count
    }

    pub fn key_size(&self) -> u32 {
        self.key_size
    }

    fn node_size(&self) -> u64 {
        NODE_HEADER_SIZE + self.block_size as u64 * (self.key_size as u64 + 8)
    }

    fn root_offset(&self) -> u64 {
        self.offset + HEADER_SIZE
    }

    /// Looks up `name`, returning `(id, size)` if present.
    pub fn find<R: Read + Seek>(&self, cursor: &mut Cursor<R>, name: &str) -> Result<Option<(u32, u32)>> {
        if name.len() > self.key_size as usize {
            return Ok(None);
        }
        self.find_at(cursor, self.root_offset(), name)
    }

    fn find_at<R: Read + Seek>(&self, cursor: &mut Cursor<R>, node_offset: u64, name: &str) -> Result<Option<(u32, u32)>> {
        cursor.seek(node_offset)?;
        let is_leaf     = cursor.read_u8()?;
        let _reserved   = cursor.read_u8()?;
        let child_count = cursor.read_u16()?;

        if is_leaf != 0 {
            for _ in 0..child_count {
                let key  = cursor.read_fixed_ascii(self.key_size as usize)?;
                let id   = cursor.read_u32()?;
                let size = cursor.read_u32()?;
                if key == name {
                    return Ok(Some((id, size)));
                }
            }
            return Ok(None);
        }

        let mut chosen: Option<u64> = None;
        for _ in 0..child_count {
            let key          = cursor.read_fixed_ascii(self.key_size as usize)?;
            let child_offset = cursor.read_u64()?;
            if key.as_str() <= name {
                chosen = Some(child_offset);
            }
        }

        match chosen {
            Some(child_offset) => self.find_at(cursor, child_offset, name),
            None                => Ok(None),
        }
    }

    /// Yields every leaf entry in on-disk order.
    pub fn traverse<R: Read + Seek>(&self, cursor: &mut Cursor<R>) -> Result<Vec<ChromEntry>> {
        let mut out = Vec::new();
        self.traverse_at(cursor, self.root_offset(), &mut out)?;
        Ok(out)
    }

    fn traverse_at<R: Read + Seek>(&self, cursor: &mut Cursor<R>, node_offset: u64, out: &mut Vec<ChromEntry>) -> Result<()> {
        cursor.seek(node_offset)?;
        let is_leaf     = cursor.read_u8()?;
        let _reserved   = cursor.read_u8()?;
        let child_count = cursor.read_u16()?;

        if is_leaf != 0 {
            for _ in 0..child_count {
                let name = cursor.read_fixed_ascii(self.key_size as usize)?;
                let id   = cursor.read_u32()?;
                let size = cursor.read_u32()?;
                out.push(ChromEntry { name, id, size });
            }
            return Ok(());
        }

        let mut children = Vec::with_capacity(child_count as usize);
        for _ in 0..child_count {
            let _key         = cursor.read_fixed_ascii(self.key_size as usize)?;
            let child_offset = cursor.read_u64()?;
            children.push(child_offset);
        }
        for child_offset in children {
            self.traverse_at(cursor, child_offset, out)?;
        }
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */

enum BuildNode {
    Leaf(Vec<ChromEntry>),
    Internal(Vec<usize>),
}

struct BuildLevel {
    nodes: Vec<BuildNode>,
    first_keys: Vec<String>,
}

/// Writes a B+ tree at the cursor's current position and returns its
/// offset. `entries` need not be pre-sorted.
pub fn write<W: Write + Seek>(cursor: &mut Cursor<W>, block_size: u32, mut entries: Vec<ChromEntry>) -> Result<u64> {
    let offset = cursor.tell()?;

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    let item_count = entries.len() as u64;
    let key_size = entries.iter().map(|e| e.name.len()).max().unwrap_or(0) as u32;
    let key_size = key_size.max(1);

    let leaf_nodes: Vec<BuildNode> = if entries.is_empty() {
        vec![BuildNode::Leaf(Vec::new())]
    } else {
        entries
            .chunks(block_size.max(1) as usize)
            .map(|chunk| BuildNode::Leaf(chunk.to_vec()))
            .collect()
    };
    let leaf_keys: Vec<String> = if entries.is_empty() {
        vec![String::new()]
    } else {
        entries
            .chunks(block_size.max(1) as usize)
            .map(|chunk| chunk[0].name.clone())
            .collect()
    };

    let mut levels = vec![BuildLevel { nodes: leaf_nodes, first_keys: leaf_keys }];

    while levels.last().unwrap().nodes.len() > 1 {
        let prev = levels.last().unwrap();
        let mut parent_nodes = Vec::new();
        let mut parent_keys  = Vec::new();
        let mut start = 0usize;
        while start < prev.nodes.len() {
            let end = (start + block_size.max(1) as usize).min(prev.nodes.len());
            let child_indices: Vec<usize> = (start..end).collect();
            parent_keys.push(prev.first_keys[start].clone());
            parent_nodes.push(BuildNode::Internal(child_indices));
            start = end;
        }
        levels.push(BuildLevel { nodes: parent_nodes, first_keys: parent_keys });
    }

    // levels[0] = leaf level, levels[last] = root level (single node).
    let mut level_start_index = vec![0usize; levels.len()];
    let mut counter = 0usize;
    for li in (0..levels.len()).rev() {
        level_start_index[li] = counter;
        counter += levels[li].nodes.len();
    }

    let node_size = NODE_HEADER_SIZE + block_size.max(1) as u64 * (key_size as u64 + 8);
    let root_offset = offset + HEADER_SIZE;
    let node_offset = |global_index: usize| root_offset + global_index as u64 * node_size;

    // Header.
    cursor.write_u32(MAGIC)?;
    cursor.write_u32(block_size.max(1))?;
    cursor.write_u32(key_size)?;
    cursor.write_u32(8)?;
    cursor.write_u64(item_count)?;
    cursor.write_u64(0)?;

    for li in (0..levels.len()).rev() {
        for node in levels[li].nodes.iter() {
            match node {
                BuildNode::Leaf(items) => {
                    cursor.write_u8(1)?;
                    cursor.write_u8(0)?;
                    cursor.write_u16(items.len() as u16)?;
                    for item in items {
                        write_padded_key(cursor, &item.name, key_size as usize)?;
                        cursor.write_u32(item.id)?;
                        cursor.write_u32(item.size)?;
                    }
                    for _ in items.len()..block_size.max(1) as usize {
                        cursor.write_zeroes(key_size as usize + 8)?;
                    }
                }
                BuildNode::Internal(child_indices) => {
                    cursor.write_u8(0)?;
                    cursor.write_u8(0)?;
                    cursor.write_u16(child_indices.len() as u16)?;
                    for &child_local in child_indices {
                        let key = &levels[li - 1].first_keys[child_local];
                        let child_global = level_start_index[li - 1] + child_local;
                        write_padded_key(cursor, key, key_size as usize)?;
                        cursor.write_u64(node_offset(child_global))?;
                    }
                    for _ in child_indices.len()..block_size.max(1) as usize {
                        cursor.write_zeroes(key_size as usize + 8)?;
                    }
                }
            }
        }
    }

    Ok(offset)
}

fn write_padded_key<W: Write + Seek>(cursor: &mut Cursor<W>, key: &str, key_size: usize) -> Result<()> {
    let mut buf = vec![0u8; key_size];
    let bytes = key.as_bytes();
    let n = bytes.len().min(key_size);
    buf[..n].copy_from_slice(&bytes[..n]);
    cursor.write_bytes(&buf)
}

/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Order;
    use std::io;

    fn entries() -> Vec<ChromEntry> {
        vec![
            ChromEntry { name: "chr1".into(), id: 0, size: 100 },
            ChromEntry { name: "chr2".into(), id: 1, size: 200 },
            ChromEntry { name: "chr3".into(), id: 2, size: 300 },
        ]
    }

    #[test]
    fn find_and_traverse_round_trip() {
        let mut writer = Cursor::new(io::Cursor::new(Vec::new()), Order::Little);
        let offset = write(&mut writer, 2, entries()).unwrap();

        let backing = writer.into_inner().into_inner();
        let mut reader = Cursor::new(io::Cursor::new(backing), Order::Little);

        let tree = BPlusTree::open(&mut reader, offset).unwrap();
        assert_eq!(tree.item_count(), 3);

        assert_eq!(tree.find(&mut reader, "chr2").unwrap(), Some((1, 200)));
        assert_eq!(tree.find(&mut reader, "chr4").unwrap(), None);

        let all = tree.traverse(&mut reader).unwrap();
        let names: Vec<&str> = all.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["chr1", "chr2", "chr3"]);
    }

    #[test]
    fn empty_tree() {
        let mut writer = Cursor::new(io::Cursor::new(Vec::new()), Order::Little);
        let offset = write(&mut writer, 4, Vec::new()).unwrap();

        let backing = writer.into_inner().into_inner();
        let mut reader = Cursor::new(io::Cursor::new(backing), Order::Little);

        let tree = BPlusTree::open(&mut reader, offset).unwrap();
        assert_eq!(tree.item_count(), 0);
        assert_eq!(tree.find(&mut reader, "chr1").unwrap(), None);
    }
}
