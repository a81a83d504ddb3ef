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

// Bottom-up 1-D R+ tree spatially indexing data blocks by
// (chromosome-id, genomic-offset) interval. The build is a flat,
// level-by-level grouping of the previous level's nodes rather than the
// parent/child/next pointer graph the tree is traditionally built with,
// so there are no back-references to manage.

use std::io::{Read, Seek, Write};

use crate::cursor::Cursor;
use crate::error::{BbiError, Result};

/* -------------------------------------------------------------------------- */

pub const MAGIC: u32 = 0x2468ACE0;
const HEADER_SIZE: u64 = 48;
const NODE_HEADER_SIZE: u64 = 4;
const INTERNAL_SLOT_SIZE: u64 = 24;
const LEAF_SLOT_SIZE: u64 = 32;

/* -------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Offset {
    pub chrom_ix: u32,
    pub base: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Interval {
    pub left: Offset,
    pub right: Offset,
}

impl Interval {
    pub fn new(start_chrom_ix: u32, start_base: u32, end_chrom_ix: u32, end_base: u32) -> Self {
        Interval {
            left:  Offset { chrom_ix: start_chrom_ix, base: start_base },
            right: Offset { chrom_ix: end_chrom_ix,   base: end_base },
        }
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        !(self.right <= other.left || other.right <= self.left)
    }

    pub fn union(&self, other: &Interval) -> Interval {
        let left  = self.left.min(other.left);
        let right = self.right.max(other.right);
        Interval { left, right }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BlockDescriptor {
    pub interval: Interval,
    pub file_offset: u64,
    pub size: u64,
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug)]
pub struct RTree {
    offset: u64,
    block_size: u32,
    item_count: u64,
    bounds: Interval,
    end_data_offset: u64,
    items_per_slot: u32,
}

impl RTree {

    pub fn open<R: Read + Seek>(cursor: &mut Cursor<R>, offset: u64) -> Result<RTree> {
        cursor.seek(offset)?;
        cursor.peek_magic(MAGIC)?;

        let block_size      = cursor.read_u32()?;
        let item_count      = cursor.read_u64()?;
        let start_chrom_ix  = cursor.read_u32()?;
        let start_base      = cursor.read_u32()?;
        let end_chrom_ix    = cursor.read_u32()?;
        let end_base        = cursor.read_u32()?;
        let end_data_offset = cursor.read_u64()?;
        let items_per_slot  = cursor.read_u32()?;
        let _reserved       = cursor.read_u32()?;

        Ok(RTree {
            offset,
            block_size,
            item_count,
            bounds: Interval::new(start_chrom_ix, start_base, end_chrom_ix, end_base),
            end_data_offset,
            items_per_slot,
        })
    }

    pub fn item_count(&self) -> u64 {
        self.item_count
    }

    pub fn end_data_offset(&self) -> u64 {
        self.end_data_offset
    }

    pub fn items_per_slot(&self) -> u32 {
        self.items_per_slot
    }

    fn root_offset(&self) -> u64 {
        self.offset + HEADER_SIZE
    }

    /// Returns every leaf descriptor whose interval overlaps `query`, in
    /// tree (depth-first, left-to-right) order.
    pub fn find_overlapping_blocks<R: Read + Seek>(&self, cursor: &mut Cursor<R>, query: Interval) -> Result<Vec<BlockDescriptor>> {
        let mut out = Vec::new();
        self.find_at(cursor, self.root_offset(), query, &mut out)?;
        Ok(out)
    }

    fn find_at<R: Read + Seek>(&self, cursor: &mut Cursor<R>, node_offset: u64, query: Interval, out: &mut Vec<BlockDescriptor>) -> Result<()> {
        cursor.seek(node_offset)?;
        let is_leaf     = cursor.read_u8()?;
        let _reserved   = cursor.read_u8()?;
        let child_count = cursor.read_u16()?;

        if child_count > self.block_size as u16 {
            return Err(BbiError::inconsistent("r+ node childCount exceeds blockSize"));
        }

        if is_leaf != 0 {
            for _ in 0..child_count {
                let interval    = read_interval(cursor)?;
                let data_offset = cursor.read_u64()?;
                let data_size   = cursor.read_u64()?;
                if interval.overlaps(&query) {
                    out.push(BlockDescriptor { interval, file_offset: data_offset, size: data_size });
                }
            }
            return Ok(());
        }

        let mut children = Vec::with_capacity(child_count as usize);
        for _ in 0..child_count {
            let interval      = read_interval(cursor)?;
            let child_offset  = cursor.read_u64()?;
            children.push((interval, child_offset));
        }
        for (interval, child_offset) in children {
            if interval.overlaps(&query) {
                self.find_at(cursor, child_offset, query, out)?;
            }
        }
        Ok(())
    }
}

fn read_interval<R: Read + Seek>(cursor: &mut Cursor<R>) -> Result<Interval> {
    let start_chrom_ix = cursor.read_u32()?;
    let start_base     = cursor.read_u32()?;
    let end_chrom_ix   = cursor.read_u32()?;
    let end_base       = cursor.read_u32()?;
    Ok(Interval::new(start_chrom_ix, start_base, end_chrom_ix, end_base))
}

/* -------------------------------------------------------------------------- */

enum BuildNode {
    Leaf(Vec<BlockDescriptor>),
    Internal(Vec<usize>),
}

struct BuildLevel {
    nodes: Vec<BuildNode>,
    bounds: Vec<Interval>,
}

/// Writes an R+ tree at the cursor's current position and returns its
/// offset. `descriptors` must already be in the order their data blocks
/// were written (chromosomes contiguous, sorted by start).
pub fn write<W: Write + Seek>(cursor: &mut Cursor<W>, block_size: u32, items_per_slot: u32, descriptors: Vec<BlockDescriptor>) -> Result<u64> {
    let offset = cursor.tell()?;
    let item_count = descriptors.len() as u64;
    let block_size = block_size.max(1);

    let overall_bounds = descriptors
        .iter()
        .map(|d| d.interval)
        .reduce(|a, b| a.union(&b));

    let (start_chrom_ix, start_base, end_chrom_ix, end_base) = match overall_bounds {
        Some(b) => (b.left.chrom_ix, b.left.base, b.right.chrom_ix, b.right.base),
        None    => (0, 0, 0, 0),
    };

    let leaf_nodes: Vec<BuildNode> = if descriptors.is_empty() {
        vec![BuildNode::Leaf(Vec::new())]
    } else {
        descriptors
            .chunks(block_size as usize)
            .map(|chunk| BuildNode::Leaf(chunk.to_vec()))
            .collect()
    };
    let leaf_bounds: Vec<Interval> = if descriptors.is_empty() {
        vec![Interval::new(0, 0, 0, 0)]
    } else {
        descriptors
            .chunks(block_size as usize)
            .map(|chunk| chunk.iter().map(|d| d.interval).reduce(|a, b| a.union(&b)).unwrap())
            .collect()
    };

    let mut levels = vec![BuildLevel { nodes: leaf_nodes, bounds: leaf_bounds }];

    while levels.last().unwrap().nodes.len() > 1 {
        let prev = levels.last().unwrap();
        let mut parent_nodes  = Vec::new();
        let mut parent_bounds = Vec::new();
        let mut start = 0usize;
        while start < prev.nodes.len() {
            let end = (start + block_size as usize).min(prev.nodes.len());
            let child_indices: Vec<usize> = (start..end).collect();
            let bound = prev.bounds[start..end].iter().copied().reduce(|a, b| a.union(&b)).unwrap();
            parent_bounds.push(bound);
            parent_nodes.push(BuildNode::Internal(child_indices));
            start = end;
        }
        levels.push(BuildLevel { nodes: parent_nodes, bounds: parent_bounds });
    }

    let mut level_start_index = vec![0usize; levels.len()];
    let mut counter = 0usize;
    for li in (0..levels.len()).rev() {
        level_start_index[li] = counter;
        counter += levels[li].nodes.len();
    }

    let root_offset = offset + HEADER_SIZE;

    // Precompute absolute byte offsets per global node index. Internal
    // levels all share one fixed per-node size; the leaf level (last)
    // uses its own fixed size.
    let internal_node_size = NODE_HEADER_SIZE + block_size as u64 * INTERNAL_SLOT_SIZE;
    let leaf_node_size     = NODE_HEADER_SIZE + block_size as u64 * LEAF_SLOT_SIZE;
    let internal_node_count = counter - levels[0].nodes.len();

    let offset_of = |global_index: usize| -> u64 {
        if global_index < internal_node_count {
            root_offset + global_index as u64 * internal_node_size
        } else {
            let leaf_local = global_index - internal_node_count;
            root_offset + internal_node_count as u64 * internal_node_size + leaf_local as u64 * leaf_node_size
        }
    };

    // Byte offset of the last data block's end, i.e. where this R+ tree
    // itself begins (equal to unzoomedIndexOffset in the container header).
    let end_data_offset = offset;

    // Header.
    cursor.write_u32(MAGIC)?;
    cursor.write_u32(block_size)?;
    cursor.write_u64(item_count)?;
    cursor.write_u32(start_chrom_ix)?;
    cursor.write_u32(start_base)?;
    cursor.write_u32(end_chrom_ix)?;
    cursor.write_u32(end_base)?;
    cursor.write_u64(end_data_offset)?;
    cursor.write_u32(items_per_slot)?;
    cursor.write_u32(0)?;

    for li in (0..levels.len()).rev() {
        for node in levels[li].nodes.iter() {
            match node {
                BuildNode::Leaf(items) => {
                    cursor.write_u8(1)?;
                    cursor.write_u8(0)?;
                    cursor.write_u16(items.len() as u16)?;
                    for item in items {
                        write_interval(cursor, &item.interval)?;
                        cursor.write_u64(item.file_offset)?;
                        cursor.write_u64(item.size)?;
                    }
                    for _ in items.len()..block_size as usize {
                        cursor.write_zeroes(LEAF_SLOT_SIZE as usize)?;
                    }
                }
                BuildNode::Internal(child_indices) => {
                    cursor.write_u8(0)?;
                    cursor.write_u8(0)?;
                    cursor.write_u16(child_indices.len() as u16)?;
                    for &child_local in child_indices {
                        let bound = levels[li - 1].bounds[child_local];
                        let child_global = level_start_index[li - 1] + child_local;
                        write_interval(cursor, &bound)?;
                        cursor.write_u64(offset_of(child_global))?;
                    }
                    for _ in child_indices.len()..block_size as usize {
                        cursor.write_zeroes(INTERNAL_SLOT_SIZE as usize)?;
                    }
                }
            }
        }
    }

    Ok(offset)
}

fn write_interval<W: Write + Seek>(cursor: &mut Cursor<W>, interval: &Interval) -> Result<()> {
    cursor.write_u32(interval.left.chrom_ix)?;
    cursor.write_u32(interval.left.base)?;
    cursor.write_u32(interval.right.chrom_ix)?;
    cursor.write_u32(interval.right.base)?;
    Ok(())
}

/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Order;
    use std::io;

    fn descriptors() -> Vec<BlockDescriptor> {
        vec![
            BlockDescriptor { interval: Interval::new(0, 0, 0, 100),   file_offset: 1000, size: 10 },
            BlockDescriptor { interval: Interval::new(0, 100, 0, 200), file_offset: 1010, size: 10 },
            BlockDescriptor { interval: Interval::new(1, 0, 1, 50),    file_offset: 1020, size: 10 },
        ]
    }

    #[test]
    fn overlap_completeness_and_soundness() {
        let mut writer = Cursor::new(io::Cursor::new(Vec::new()), Order::Little);
        let offset = write(&mut writer, 2, 1, descriptors()).unwrap();

        let backing = writer.into_inner().into_inner();
        let mut reader = Cursor::new(io::Cursor::new(backing), Order::Little);

        let tree = RTree::open(&mut reader, offset).unwrap();
        assert_eq!(tree.item_count(), 3);

        let query = Interval::new(0, 50, 0, 150);
        let hits = tree.find_overlapping_blocks(&mut reader, query).unwrap();

        assert_eq!(hits.len(), 2);
        for hit in &hits {
            assert!(hit.interval.overlaps(&query));
        }
    }

    #[test]
    fn empty_tree_yields_nothing() {
        let mut writer = Cursor::new(io::Cursor::new(Vec::new()), Order::Little);
        let offset = write(&mut writer, 4, 1, Vec::new()).unwrap();

        let backing = writer.into_inner().into_inner();
        let mut reader = Cursor::new(io::Cursor::new(backing), Order::Little);

        let tree = RTree::open(&mut reader, offset).unwrap();
        assert_eq!(tree.item_count(), 0);

        let hits = tree.find_overlapping_blocks(&mut reader, Interval::new(0, 0, 0, u32::MAX)).unwrap();
        assert!(hits.is_empty());
    }
}
