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

// Thin façade wiring the cursor, B+ tree, R+ tree, container header and
// block engine together into the BigBED reader/writer pair, mirroring the
// teacher's BigWigFile/BigWigReader/BigWigWriter split.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use crate::bplus::{self, BPlusTree, ChromEntry};
use crate::container::{self, Header, TotalSummary, TotalSummaryAccumulator, BIGBED_MAGIC};
use crate::cursor::{Compression, Cursor, Order};
use crate::engine::{self, Parameters};
use crate::error::{BbiError, Result};
use crate::genome::Genome;
use crate::infologger::Logger;
use crate::netfile::NetFile;
use crate::rtree::{self, RTree};

pub use crate::engine::{BedQuery, FeatureRecord};

/* -------------------------------------------------------------------------- */

pub fn is_bigbed_file(filename: &str) -> Result<bool> {
    let mut file = NetFile::open(filename).map_err(|e| BbiError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
    let mut cursor = Cursor::new(&mut file, Order::Big);
    Ok(cursor.peek_magic(BIGBED_MAGIC).is_ok())
}

/* -------------------------------------------------------------------------- */

pub struct BigBedFile {}

impl BigBedFile {
    pub fn new_reader(filename: &str) -> Result<BigBedReader<NetFile>> {
        let file = NetFile::open(filename).map_err(|e| BbiError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        BigBedReader::new(file)
    }

    pub fn new_writer<P: AsRef<Path>>(path: P, genome: Genome, parameters: Parameters) -> Result<BigBedWriter<File>> {
        let file = File::create(path)?;
        BigBedWriter::new(file, genome, parameters)
    }
}

/* -------------------------------------------------------------------------- */

/// A BigBED reader: opens the container header and the two trees eagerly,
/// decodes data blocks lazily as queries are run.
pub struct BigBedReader<R: Read + Seek> {
    cursor: Cursor<R>,
    header: Header,
    bplus: BPlusTree,
    rtree: RTree,
}

impl<R: Read + Seek> BigBedReader<R> {
    pub fn new(inner: R) -> Result<Self> {
        let mut cursor = Cursor::new(inner, Order::Big);
        let header = Header::read(&mut cursor, 0, BIGBED_MAGIC)?;
        let bplus = BPlusTree::open(&mut cursor, header.chrom_tree_offset)?;
        let rtree = RTree::open(&mut cursor, header.unzoomed_index_offset)?;
        Ok(BigBedReader { cursor, header, bplus, rtree })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The full chromosome list in on-disk (name-sorted) order.
    pub fn genome(&mut self) -> Result<Vec<ChromEntry>> {
        self.bplus.traverse(&mut self.cursor)
    }

    /// The whole-file value summary, accumulated by the writer without a
    /// data scan.
    pub fn summary(&mut self) -> Result<TotalSummary> {
        if self.header.total_summary_offset == 0 {
            return Ok(TotalSummary::default());
        }
        TotalSummary::read(&mut self.cursor, self.header.total_summary_offset)
    }

    fn compression(&self) -> Compression {
        if self.header.is_compressed() { Compression::Deflate } else { Compression::None }
    }

    /// Resolves `(name, start, end)` into a lazily-decoding record
    /// iterator. `end == 0` is normalized to the chromosome's full length.
    /// An unknown chromosome yields an iterator that immediately ends.
    pub fn query(&mut self, name: &str, start: u32, end: u32, max_items: usize) -> Result<BedQuery<'_, R>> {
        let resolved = engine::resolve_query(&mut self.cursor, &self.bplus, &self.rtree, name, start, end)?;
        let compression = self.compression();
        match resolved {
            Some((chrom_id, end, blocks)) => {
                Ok(BedQuery::new(&mut self.cursor, blocks, compression, chrom_id, start, end, max_items))
            }
            None => Ok(BedQuery::new(&mut self.cursor, Vec::new(), compression, 0, start, end, max_items)),
        }
    }
}

/* -------------------------------------------------------------------------- */

/// A single-pass BigBED writer. Records are accumulated per chromosome in
/// memory (the writer's contract already requires the caller to supply
/// them pre-grouped and start-sorted) and the on-disk structures are
/// emitted in a forward-only sequence (chrom tree, data blocks, R+ tree,
/// then the final header) on `close`.
pub struct BigBedWriter<W: Write + Seek> {
    cursor: Cursor<W>,
    genome: Genome,
    parameters: Parameters,
    records: BTreeMap<u32, Vec<FeatureRecord>>,
    logger: Logger,
}

impl<W: Write + Seek> BigBedWriter<W> {
    pub fn new(inner: W, genome: Genome, parameters: Parameters) -> Result<Self> {
        let mut cursor = Cursor::new(inner, Order::Little);
        container::write_header_placeholder(&mut cursor)?;
        Ok(BigBedWriter { cursor, genome, parameters, records: BTreeMap::new(), logger: Logger::new_void() })
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Routes writer progress diagnostics (block counts, compression
    /// ratio, tree shape) to `logger` instead of the default void sink.
    pub fn set_logger(&mut self, logger: Logger) {
        self.logger = logger;
    }

    /// Appends one record to `chrom_name`'s pending block list. Records
    /// within a chromosome must be supplied in `start` order.
    pub fn add_record(&mut self, chrom_name: &str, start: u32, end: u32, rest: impl Into<String>) -> Result<()> {
        let id = self.genome.get_idx(chrom_name)
            .ok_or_else(|| BbiError::inconsistent(format!("unknown chromosome '{}'", chrom_name)))?;
        self.records.entry(id as u32).or_default().push(FeatureRecord {
            chrom_id: id as u32,
            start,
            end,
            rest: rest.into(),
        });
        Ok(())
    }

    /// Writes the B+ tree, data blocks, R+ tree and final header, in that
    /// order, and consumes the writer.
    pub fn close(mut self) -> Result<()> {
        use std::fmt::Write as _;

        let chrom_tree_offset = self.cursor.tell()?;
        let entries: Vec<ChromEntry> = self.genome.seqnames().iter()
            .zip(self.genome.lengths().iter())
            .enumerate()
            .map(|(id, (name, &size))| ChromEntry { name: name.clone(), id: id as u32, size })
            .collect();
        let _ = writeln!(self.logger, "writing chromosome b+ tree: {} entries", entries.len());
        bplus::write(&mut self.cursor, self.parameters.block_size, entries)?;

        let unzoomed_data_offset = self.cursor.tell()?;
        let mut summary = TotalSummaryAccumulator::new();
        let records_by_chrom: Vec<(u32, Vec<FeatureRecord>)> = self.records.into_iter().collect();
        let (descriptors, max_uncompressed) = engine::write_bed_blocks(
            &mut self.cursor,
            &records_by_chrom,
            self.parameters.items_per_slot,
            self.parameters.compress,
            &mut summary,
        )?;
        let _ = writeln!(
            self.logger,
            "wrote {} data blocks ({} chromosomes, compressed={}, max uncompressed block={} bytes)",
            descriptors.len(),
            records_by_chrom.len(),
            self.parameters.compress,
            max_uncompressed,
        );

        let unzoomed_index_offset = self.cursor.tell()?;
        let _ = writeln!(self.logger, "building r+ tree over {} blocks", descriptors.len());
        rtree::write(&mut self.cursor, self.parameters.block_size, self.parameters.items_per_slot as u32, descriptors)?;

        container::finalize(
            &mut self.cursor,
            BIGBED_MAGIC,
            3,
            3,
            chrom_tree_offset,
            unzoomed_data_offset,
            unzoomed_index_offset,
            if self.parameters.compress { max_uncompressed as u32 } else { 0 },
            &summary.finish(),
        )?;

        Ok(())
    }
}

/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn genome() -> Genome {
        Genome::from_lengths(vec![("chr21".into(), 50_000_000), ("chr22".into(), 40_000_000)])
    }

    #[test]
    fn query_filters_to_fully_contained_records() {
        let mut buf = Vec::new();
        {
            let backing = io::Cursor::new(&mut buf);
            let mut writer = BigBedWriter::new(backing, genome(), Parameters { block_size: 2, items_per_slot: 1, compress: false }).unwrap();
            writer.add_record("chr21", 9_434_178, 9_434_610, "").unwrap();
            writer.add_record("chr21", 9_500_000, 9_500_100, "").unwrap();
            writer.close().unwrap();
        }

        let mut reader = BigBedReader::new(io::Cursor::new(buf)).unwrap();

        let all: Vec<FeatureRecord> = reader.query("chr21", 0, 0, 0).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].start, 9_434_178);
        assert_eq!(all[1].start, 9_500_000);

        let narrow: Vec<FeatureRecord> = reader.query("chr21", 9_500_000, 9_600_000, 0).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(narrow.len(), 1);
        assert_eq!(narrow[0].start, 9_500_000);

        let missing = reader.query("chrZZ", 0, 0, 0).unwrap().count();
        assert_eq!(missing, 0);
    }

    #[test]
    fn compressed_round_trip() {
        let mut buf = Vec::new();
        {
            let backing = io::Cursor::new(&mut buf);
            let mut writer = BigBedWriter::new(backing, genome(), Parameters { block_size: 4, items_per_slot: 4, compress: true }).unwrap();
            writer.add_record("chr22", 100, 200, "feature-a").unwrap();
            writer.add_record("chr22", 300, 450, "feature-b").unwrap();
            writer.close().unwrap();
        }

        let mut reader = BigBedReader::new(io::Cursor::new(buf)).unwrap();
        assert!(reader.header().is_compressed());

        let records: Vec<FeatureRecord> = reader.query("chr22", 0, 0, 0).unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].rest, "feature-b");

        let summary = reader.summary().unwrap();
        assert_eq!(summary.valid_count, 2);
    }
}
