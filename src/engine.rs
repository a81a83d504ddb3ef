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

// Groups sorted feature records into slots, emits one (optionally
// compressed) data block per slot, and decodes blocks back into records
// on query. Shared by the BigBED and BigWIG facades.

use std::io::{self, Read, Seek, Write};

use crate::container::TotalSummaryAccumulator;
use crate::cursor::{Compression, Cursor};
use crate::error::{BbiError, Result};
use crate::rtree::{BlockDescriptor, Interval, RTree};
use crate::bplus::BPlusTree;

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug, PartialEq)]
pub struct FeatureRecord {
    pub chrom_id: u32,
    pub start: u32,
    pub end: u32,
    pub rest: String,
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectionType {
    BedGraph = 1,
    VarStep = 2,
    FixStep = 3,
}

impl SectionType {
    fn from_u8(v: u8) -> Result<SectionType> {
        match v {
            1 => Ok(SectionType::BedGraph),
            2 => Ok(SectionType::VarStep),
            3 => Ok(SectionType::FixStep),
            other => Err(BbiError::inconsistent(format!("unknown wig section type {}", other))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct WigSection {
    pub chrom_id: u32,
    pub start: u32,
    pub end: u32,
    pub step: u32,
    pub span: u32,
    pub section_type: SectionType,
    /// Genomic positions of each value; only present for `VarStep`.
    pub positions: Option<Vec<u32>>,
    pub values: Vec<f32>,
}

/* -------------------------------------------------------------------------- */
/* Block encode / decode                                                      */
/* -------------------------------------------------------------------------- */

pub fn encode_bed_block(records: &[FeatureRecord]) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(io::Cursor::new(Vec::new()), crate::cursor::Order::Little);
    for record in records {
        cursor.write_u32(record.chrom_id)?;
        cursor.write_u32(record.start)?;
        cursor.write_u32(record.end)?;
        cursor.write_bytes(record.rest.as_bytes())?;
        cursor.write_u8(0)?;
    }
    Ok(cursor.into_inner().into_inner())
}

pub fn decode_bed_block<R: Read + Seek>(cursor: &mut Cursor<R>) -> Result<Vec<FeatureRecord>> {
    let mut out = Vec::new();
    loop {
        let chrom_id = match cursor.read_u32() {
            Ok(v) => v,
            Err(BbiError::UnexpectedEof) => break,
            Err(e) => return Err(e),
        };
        let start = cursor.read_u32()?;
        let end   = cursor.read_u32()?;
        let rest  = cursor.read_ascii_z()?;
        out.push(FeatureRecord { chrom_id, start, end, rest });
    }
    Ok(out)
}

/* -------------------------------------------------------------------------- */

pub fn encode_wig_section(section: &WigSection) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(io::Cursor::new(Vec::new()), crate::cursor::Order::Little);
    cursor.write_u32(section.chrom_id)?;
    cursor.write_u32(section.start)?;
    cursor.write_u32(section.end)?;
    cursor.write_u32(section.step)?;
    cursor.write_u32(section.span)?;
    cursor.write_u8(section.section_type as u8)?;
    cursor.write_u8(0)?;
    cursor.write_u16(section.values.len() as u16)?;

    match section.section_type {
        SectionType::FixStep => {
            for &v in &section.values {
                cursor.write_f32(v)?;
            }
        }
        SectionType::VarStep => {
            let positions = section.positions.as_ref()
                .ok_or_else(|| BbiError::inconsistent("VARSTEP section missing positions"))?;
            for (&pos, &v) in positions.iter().zip(section.values.iter()) {
                cursor.write_u32(pos)?;
                cursor.write_f32(v)?;
            }
        }
        SectionType::BedGraph => {
            return Err(BbiError::unsupported("writing BEDGRAPH sections is not supported"));
        }
    }

    Ok(cursor.into_inner().into_inner())
}

pub fn decode_wig_block<R: Read + Seek>(cursor: &mut Cursor<R>) -> Result<WigSection> {
    let chrom_id = cursor.read_u32()?;
    let start    = cursor.read_u32()?;
    let end      = cursor.read_u32()?;
    let step     = cursor.read_u32()?;
    let span     = cursor.read_u32()?;
    let kind     = SectionType::from_u8(cursor.read_u8()?)?;
    let _reserved = cursor.read_u8()?;
    let count    = cursor.read_u16()?;

    let (positions, values) = match kind {
        SectionType::BedGraph => {
            return Err(BbiError::unsupported("BEDGRAPH wig sections are not supported"));
        }
        SectionType::FixStep => {
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                values.push(cursor.read_f32()?);
            }
            (None, values)
        }
        SectionType::VarStep => {
            let mut positions = Vec::with_capacity(count as usize);
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                positions.push(cursor.read_u32()?);
                values.push(cursor.read_f32()?);
            }
            (Some(positions), values)
        }
    };

    Ok(WigSection { chrom_id, start, end, step, span, section_type: kind, positions, values })
}

/* -------------------------------------------------------------------------- */
/* Writer configuration                                                       */
/* -------------------------------------------------------------------------- */

/// Writer-side tunables shared by the BigBED and BigWIG facades, mirroring
/// the teacher's `BigWigParameters` / `OptionBigWig` insertion pattern.
#[derive(Clone, Debug)]
pub struct Parameters {
    pub block_size: u32,
    pub items_per_slot: usize,
    pub compress: bool,
}

impl Default for Parameters {
    fn default() -> Self {
        Parameters {
            block_size: 256,
            items_per_slot: 1024,
            compress: false,
        }
    }
}

pub enum WriterOption {
    BlockSize(u32),
    ItemsPerSlot(usize),
    Compress(bool),
}

impl Parameters {
    pub fn insert_option(&mut self, option: WriterOption) {
        match option {
            WriterOption::BlockSize(x)     => self.block_size     = x,
            WriterOption::ItemsPerSlot(x)  => self.items_per_slot = x,
            WriterOption::Compress(x)      => self.compress       = x,
        }
    }
}

/* -------------------------------------------------------------------------- */
/* Writer                                                                      */
/* -------------------------------------------------------------------------- */

/// Packs `records` (already grouped by chromosome and start-sorted) into
/// blocks of up to `items_per_slot` records each, writing one compressed
/// (or not) block per slot and returning a `BlockDescriptor` per block.
pub fn write_bed_blocks<W: Write + Seek>(
    cursor: &mut Cursor<W>,
    records_by_chrom: &[(u32, Vec<FeatureRecord>)],
    items_per_slot: usize,
    compress: bool,
    summary: &mut TotalSummaryAccumulator,
) -> Result<(Vec<BlockDescriptor>, usize)> {
    let mut descriptors = Vec::new();
    let mut max_uncompressed = 0usize;

    for (chrom_id, records) in records_by_chrom {
        for chunk in records.chunks(items_per_slot.max(1)) {
            for record in chunk {
                summary.add((record.end - record.start) as f64);
            }

            let raw = encode_bed_block(chunk)?;
            let file_offset = cursor.tell()?;
            let (size_on_disk, _) = cursor.scoped_compressed(&raw, compress)?;
            if compress {
                max_uncompressed = max_uncompressed.max(raw.len());
            }

            let first_start = chunk.first().map(|r| r.start).unwrap_or(0);
            let max_end = chunk.iter().map(|r| r.end).max().unwrap_or(0);

            descriptors.push(BlockDescriptor {
                interval: Interval::new(*chrom_id, first_start, *chrom_id, max_end),
                file_offset,
                size: size_on_disk,
            });
        }
    }

    Ok((descriptors, max_uncompressed))
}

/// Writes one block per `WigSection` (the writer's contract: exactly one
/// section per block).
pub fn write_wig_blocks<W: Write + Seek>(
    cursor: &mut Cursor<W>,
    sections: &[WigSection],
    compress: bool,
    summary: &mut TotalSummaryAccumulator,
) -> Result<(Vec<BlockDescriptor>, usize)> {
    let mut descriptors = Vec::new();
    let mut max_uncompressed = 0usize;

    for section in sections {
        for &v in &section.values {
            summary.add(v as f64);
        }

        let raw = encode_wig_section(section)?;
        let file_offset = cursor.tell()?;
        let (size_on_disk, _) = cursor.scoped_compressed(&raw, compress)?;
        if compress {
            max_uncompressed = max_uncompressed.max(raw.len());
        }

        descriptors.push(BlockDescriptor {
            interval: Interval::new(section.chrom_id, section.start, section.chrom_id, section.end),
            file_offset,
            size: size_on_disk,
        });
    }

    Ok((descriptors, max_uncompressed))
}

/* -------------------------------------------------------------------------- */
/* Query engine                                                                */
/* -------------------------------------------------------------------------- */

/// Resolves `name` through the B+ tree and the normalized `(start,end)`
/// range through the R+ tree, returning the dense chromosome id, the
/// normalized end coordinate and the overlapping block descriptors. `None`
/// when the chromosome is not present.
pub fn resolve_query<R: Read + Seek>(
    cursor: &mut Cursor<R>,
    bplus: &BPlusTree,
    rtree: &RTree,
    name: &str,
    start: u32,
    end: u32,
) -> Result<Option<(u32, u32, Vec<BlockDescriptor>)>> {
    let found = match bplus.find(cursor, name)? {
        Some(v) => v,
        None => return Ok(None),
    };
    let (chrom_id, chrom_size) = found;
    let end = if end == 0 { chrom_size } else { end };

    let query = Interval::new(chrom_id, start, chrom_id, end);
    let blocks = rtree.find_overlapping_blocks(cursor, query)?;

    Ok(Some((chrom_id, end, blocks)))
}

fn decode_bed_records_in_range<R: Read + Seek>(
    cursor: &mut Cursor<R>,
    block: &BlockDescriptor,
    compression: Compression,
    chrom_id: u32,
    start: u32,
    end: u32,
) -> Result<Vec<FeatureRecord>> {
    let mut scoped = cursor.with_scoped(block.file_offset, block.size, compression)?;
    let records = decode_bed_block(&mut scoped)?;
    Ok(records
        .into_iter()
        .filter(|r| r.chrom_id == chrom_id && r.start >= start && r.end <= end)
        .collect())
}

/// Lazily decodes BigBED blocks, filtering to records fully contained in
/// `[start, end)`, honoring `max_items` (0 = unbounded) and terminating
/// after the first decode error.
pub struct BedQuery<'a, R: Read + Seek> {
    cursor: &'a mut Cursor<R>,
    blocks: std::vec::IntoIter<BlockDescriptor>,
    pending: std::vec::IntoIter<FeatureRecord>,
    compression: Compression,
    chrom_id: u32,
    start: u32,
    end: u32,
    max_items: usize,
    yielded: usize,
    done: bool,
}

impl<'a, R: Read + Seek> BedQuery<'a, R> {
    pub fn new(
        cursor: &'a mut Cursor<R>,
        blocks: Vec<BlockDescriptor>,
        compression: Compression,
        chrom_id: u32,
        start: u32,
        end: u32,
        max_items: usize,
    ) -> Self {
        BedQuery {
            cursor,
            blocks: blocks.into_iter(),
            pending: Vec::new().into_iter(),
            compression,
            chrom_id,
            start,
            end,
            max_items,
            yielded: 0,
            done: false,
        }
    }
}

impl<'a, R: Read + Seek> Iterator for BedQuery<'a, R> {
    type Item = Result<FeatureRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.max_items > 0 && self.yielded >= self.max_items {
            return None;
        }
        loop {
            if let Some(record) = self.pending.next() {
                self.yielded += 1;
                return Some(Ok(record));
            }
            let block = self.blocks.next()?;
            match decode_bed_records_in_range(self.cursor, &block, self.compression, self.chrom_id, self.start, self.end) {
                Ok(records) => self.pending = records.into_iter(),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Lazily decodes BigWIG blocks into sections, one per block, honoring
/// `max_items` and terminating after the first decode error.
pub struct WigQuery<'a, R: Read + Seek> {
    cursor: &'a mut Cursor<R>,
    blocks: std::vec::IntoIter<BlockDescriptor>,
    compression: Compression,
    max_items: usize,
    yielded: usize,
    done: bool,
}

impl<'a, R: Read + Seek> WigQuery<'a, R> {
    pub fn new(cursor: &'a mut Cursor<R>, blocks: Vec<BlockDescriptor>, compression: Compression, max_items: usize) -> Self {
        WigQuery {
            cursor,
            blocks: blocks.into_iter(),
            compression,
            max_items,
            yielded: 0,
            done: false,
        }
    }
}

impl<'a, R: Read + Seek> Iterator for WigQuery<'a, R> {
    type Item = Result<WigSection>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.max_items > 0 && self.yielded >= self.max_items {
            return None;
        }
        let block = self.blocks.next()?;
        let result = (|| -> Result<WigSection> {
            let mut scoped = self.cursor.with_scoped(block.file_offset, block.size, self.compression)?;
            decode_wig_block(&mut scoped)
        })();

        match result {
            Ok(section) => {
                self.yielded += 1;
                Some(Ok(section))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Order;

    #[test]
    fn bed_block_round_trip() {
        let records = vec![
            FeatureRecord { chrom_id: 0, start: 100, end: 200, rest: "name1\t0".into() },
            FeatureRecord { chrom_id: 0, start: 300, end: 400, rest: "".into() },
        ];
        let raw = encode_bed_block(&records).unwrap();

        let mut cursor = Cursor::new(io::Cursor::new(raw), Order::Little);
        let decoded = decode_bed_block(&mut cursor).unwrap();

        assert_eq!(decoded, records);
    }

    #[test]
    fn wig_fixstep_round_trip() {
        let section = WigSection {
            chrom_id: 0,
            start: 400600,
            end: 400606,
            step: 100,
            span: 5,
            section_type: SectionType::FixStep,
            positions: None,
            values: vec![11.0, 22.0, 33.0],
        };
        let raw = encode_wig_section(&section).unwrap();

        let mut cursor = Cursor::new(io::Cursor::new(raw), Order::Little);
        let decoded = decode_wig_block(&mut cursor).unwrap();

        assert_eq!(decoded, section);
    }

    #[test]
    fn wig_varstep_round_trip() {
        let section = WigSection {
            chrom_id: 1,
            start: 0,
            end: 30,
            step: 0,
            span: 10,
            section_type: SectionType::VarStep,
            positions: Some(vec![0, 10, 20]),
            values: vec![1.0, 2.0, 3.0],
        };
        let raw = encode_wig_section(&section).unwrap();

        let mut cursor = Cursor::new(io::Cursor::new(raw), Order::Little);
        let decoded = decode_wig_block(&mut cursor).unwrap();

        assert_eq!(decoded, section);
    }

    #[test]
    fn bedgraph_decode_is_rejected() {
        let mut cursor = Cursor::new(io::Cursor::new(Vec::new()), Order::Little);
        cursor.write_u32(0).unwrap();
        cursor.write_u32(0).unwrap();
        cursor.write_u32(100).unwrap();
        cursor.write_u32(0).unwrap();
        cursor.write_u32(0).unwrap();
        cursor.write_u8(SectionType::BedGraph as u8).unwrap();
        cursor.write_u8(0).unwrap();
        cursor.write_u16(0).unwrap();

        let bytes = cursor.into_inner().into_inner();
        let mut reader = Cursor::new(io::Cursor::new(bytes), Order::Little);

        assert!(matches!(decode_wig_block(&mut reader), Err(BbiError::Unsupported(_))));
    }
}
