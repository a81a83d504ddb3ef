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

// The fixed 64-byte container header shared by BigBED and BigWIG, plus the
// two small ambient structures that hang off it: the whole-file value
// summary and the (always empty, in this core) zoom-level header table.

use std::io::{Read, Seek, Write};

use crate::cursor::Cursor;
use crate::error::Result;

/* -------------------------------------------------------------------------- */

pub const BIGBED_MAGIC: u32 = 0x8789F2EB;
pub const BIGWIG_MAGIC: u32 = 0x888FFC26;

pub const HEADER_SIZE: u64 = 64;
pub const TOTAL_SUMMARY_SIZE: u64 = 40;
pub const ZOOM_HEADER_SIZE: u64 = 24;

pub const VERSION: u16 = 4;

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug)]
pub struct Header {
    pub magic: u32,
    pub version: u16,
    pub zoom_level_count: u16,
    pub chrom_tree_offset: u64,
    pub unzoomed_data_offset: u64,
    pub unzoomed_index_offset: u64,
    pub field_count: u16,
    pub defined_field_count: u16,
    pub as_offset: u64,
    pub total_summary_offset: u64,
    pub uncompress_buf_size: u32,
    pub extended_header_offset: u64,
}

impl Header {

    pub fn read<R: Read + Seek>(cursor: &mut Cursor<R>, offset: u64, expected_magic: u32) -> Result<Header> {
        cursor.seek(offset)?;
        cursor.peek_magic(expected_magic)?;

        let version                 = cursor.read_u16()?;
        let zoom_level_count        = cursor.read_u16()?;
        let chrom_tree_offset       = cursor.read_u64()?;
        let unzoomed_data_offset    = cursor.read_u64()?;
        let unzoomed_index_offset   = cursor.read_u64()?;
        let field_count             = cursor.read_u16()?;
        let defined_field_count     = cursor.read_u16()?;
        let as_offset                = cursor.read_u64()?;
        let total_summary_offset    = cursor.read_u64()?;
        let uncompress_buf_size     = cursor.read_u32()?;
        let extended_header_offset = cursor.read_u64()?;

        Ok(Header {
            magic: expected_magic,
            version,
            zoom_level_count,
            chrom_tree_offset,
            unzoomed_data_offset,
            unzoomed_index_offset,
            field_count,
            defined_field_count,
            as_offset,
            total_summary_offset,
            uncompress_buf_size,
            extended_header_offset,
        })
    }

    pub fn write<W: Write + Seek>(&self, cursor: &mut Cursor<W>, offset: u64) -> Result<()> {
        cursor.seek(offset)?;
        cursor.write_u32(self.magic)?;
        cursor.write_u16(self.version)?;
        cursor.write_u16(self.zoom_level_count)?;
        cursor.write_u64(self.chrom_tree_offset)?;
        cursor.write_u64(self.unzoomed_data_offset)?;
        cursor.write_u64(self.unzoomed_index_offset)?;
        cursor.write_u16(self.field_count)?;
        cursor.write_u16(self.defined_field_count)?;
        cursor.write_u64(self.as_offset)?;
        cursor.write_u64(self.total_summary_offset)?;
        cursor.write_u32(self.uncompress_buf_size)?;
        cursor.write_u64(self.extended_header_offset)?;
        Ok(())
    }

    pub fn is_compressed(&self) -> bool {
        self.uncompress_buf_size > 0
    }
}

impl std::fmt::Display for Header {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Version           : {}", self.version)?;
        writeln!(f, "Zoom levels       : {}", self.zoom_level_count)?;
        writeln!(f, "Chrom tree offset : {}", self.chrom_tree_offset)?;
        writeln!(f, "Data offset       : {}", self.unzoomed_data_offset)?;
        writeln!(f, "Index offset      : {}", self.unzoomed_index_offset)?;
        writeln!(f, "Field count       : {}", self.field_count)?;
        writeln!(f, "Defined fields    : {}", self.defined_field_count)?;
        writeln!(f, "Compressed        : {}", self.is_compressed())?;
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug, Default)]
pub struct TotalSummary {
    pub valid_count: u64,
    pub min_val: f64,
    pub max_val: f64,
    pub sum_data: f64,
    pub sum_squares: f64,
}

impl TotalSummary {

    pub fn read<R: Read + Seek>(cursor: &mut Cursor<R>, offset: u64) -> Result<TotalSummary> {
        cursor.seek(offset)?;
        Ok(TotalSummary {
            valid_count: cursor.read_u64()?,
            min_val:     cursor.read_f64()?,
            max_val:     cursor.read_f64()?,
            sum_data:    cursor.read_f64()?,
            sum_squares: cursor.read_f64()?,
        })
    }

    pub fn write<W: Write + Seek>(&self, cursor: &mut Cursor<W>, offset: u64) -> Result<()> {
        cursor.seek(offset)?;
        cursor.write_u64(self.valid_count)?;
        cursor.write_f64(self.min_val)?;
        cursor.write_f64(self.max_val)?;
        cursor.write_f64(self.sum_data)?;
        cursor.write_f64(self.sum_squares)?;
        Ok(())
    }
}

/// Accumulates a running `TotalSummary` as the writer streams values out.
#[derive(Debug, Default)]
pub struct TotalSummaryAccumulator {
    valid_count: u64,
    min_val: f64,
    max_val: f64,
    sum_data: f64,
    sum_squares: f64,
    initialized: bool,
}

impl TotalSummaryAccumulator {
    pub fn new() -> Self {
        TotalSummaryAccumulator::default()
    }

    pub fn add(&mut self, value: f64) {
        if !self.initialized {
            self.min_val = value;
            self.max_val = value;
            self.initialized = true;
        } else {
            self.min_val = self.min_val.min(value);
            self.max_val = self.max_val.max(value);
        }
        self.valid_count += 1;
        self.sum_data += value;
        self.sum_squares += value * value;
    }

    pub fn finish(&self) -> TotalSummary {
        TotalSummary {
            valid_count: self.valid_count,
            min_val: self.min_val,
            max_val: self.max_val,
            sum_data: self.sum_data,
            sum_squares: self.sum_squares,
        }
    }
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug)]
pub struct ZoomHeader {
    pub reduction_level: u32,
    pub data_offset: u64,
    pub index_offset: u64,
}

impl ZoomHeader {
    pub fn read<R: Read + Seek>(cursor: &mut Cursor<R>) -> Result<ZoomHeader> {
        let reduction_level = cursor.read_u32()?;
        let _reserved       = cursor.read_u32()?;
        let data_offset     = cursor.read_u64()?;
        let index_offset    = cursor.read_u64()?;
        Ok(ZoomHeader { reduction_level, data_offset, index_offset })
    }

    pub fn write<W: Write + Seek>(&self, cursor: &mut Cursor<W>) -> Result<()> {
        cursor.write_u32(self.reduction_level)?;
        cursor.write_u32(0)?;
        cursor.write_u64(self.data_offset)?;
        cursor.write_u64(self.index_offset)?;
        Ok(())
    }
}

/// Reads the declared zoom-level headers, a table of `header.zoom_level_count`
/// fixed-size records immediately following the fixed header.
pub fn read_zoom_headers<R: Read + Seek>(cursor: &mut Cursor<R>, header: &Header) -> Result<Vec<ZoomHeader>> {
    cursor.seek(HEADER_SIZE)?;
    let mut out = Vec::with_capacity(header.zoom_level_count as usize);
    for _ in 0..header.zoom_level_count {
        out.push(ZoomHeader::read(cursor)?);
    }
    Ok(out)
}

/* -------------------------------------------------------------------------- */
/* Write assembly (component D)                                               */
/* -------------------------------------------------------------------------- */

/// Reserves the fixed header plus the total-summary slot that immediately
/// follows it, so the B+ tree (and everything after it) lands at a known,
/// final offset before a single byte of real content is known.
pub fn write_header_placeholder<W: Write + Seek>(cursor: &mut Cursor<W>) -> Result<()> {
    cursor.write_zeroes((HEADER_SIZE + TOTAL_SUMMARY_SIZE) as usize)
}

/// Seeks back to the start of the file and writes the final header and
/// total summary now that every offset is known. The core never computes
/// zoom data itself, so `zoomLevelCount` is always 0 and `asOffset` /
/// `extendedHeaderOffset` are always 0.
pub fn finalize<W: Write + Seek>(
    cursor: &mut Cursor<W>,
    magic: u32,
    field_count: u16,
    defined_field_count: u16,
    chrom_tree_offset: u64,
    unzoomed_data_offset: u64,
    unzoomed_index_offset: u64,
    uncompress_buf_size: u32,
    summary: &TotalSummary,
) -> Result<()> {
    let header = Header {
        magic,
        version: VERSION,
        zoom_level_count: 0,
        chrom_tree_offset,
        unzoomed_data_offset,
        unzoomed_index_offset,
        field_count,
        defined_field_count,
        as_offset: 0,
        total_summary_offset: HEADER_SIZE,
        uncompress_buf_size,
        extended_header_offset: 0,
    };
    header.write(cursor, 0)?;
    summary.write(cursor, HEADER_SIZE)?;
    Ok(())
}
