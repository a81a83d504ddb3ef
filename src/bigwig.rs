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
// block engine together into the BigWIG reader/writer pair. One WIG
// section is written per data block (the writer's contract); the reader
// decodes exactly one section per block and does not loop for a second.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;

use crate::bplus::{self, BPlusTree, ChromEntry};
use crate::container::{self, Header, TotalSummary, TotalSummaryAccumulator, BIGWIG_MAGIC};
use crate::cursor::{Compression, Cursor, Order};
use crate::engine::{self, Parameters, WigSection};
use crate::error::{BbiError, Result};
use crate::genome::Genome;
use crate::infologger::Logger;
use crate::netfile::NetFile;
use crate::rtree::{self, RTree};

pub use crate::engine::WigQuery;

/* -------------------------------------------------------------------------- */

pub fn is_bigwig_file(filename: &str) -> Result<bool> {
    let mut file = NetFile::open(filename).map_err(|e| BbiError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
    let mut cursor = Cursor::new(&mut file, Order::Big);
    Ok(cursor.peek_magic(BIGWIG_MAGIC).is_ok())
}

/* -------------------------------------------------------------------------- */

pub struct BigWigFile {}

impl BigWigFile {
    pub fn new_reader(filename: &str) -> Result<BigWigReader<NetFile>> {
        let file = NetFile::open(filename).map_err(|e| BbiError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
        BigWigReader::new(file)
    }

    pub fn new_writer<P: AsRef<Path>>(path: P, genome: Genome, parameters: Parameters) -> Result<BigWigWriter<File>> {
        let file = File::create(path)?;
        BigWigWriter::new(file, genome, parameters)
    }
}

/* -------------------------------------------------------------------------- */

/// A BigWIG reader: opens the container header and the two trees eagerly,
/// decodes WIG sections lazily as queries are run.
pub struct BigWigReader<R: Read + Seek> {
    cursor: Cursor<R>,
    header: Header,
    bplus: BPlusTree,
    rtree: RTree,
}

impl<R: Read + Seek> BigWigReader<R> {
    pub fn new(inner: R) -> Result<Self> {
        let mut cursor = Cursor::new(inner, Order::Big);
        let header = Header::read(&mut cursor, 0, BIGWIG_MAGIC)?;
        let bplus = BPlusTree::open(&mut cursor, header.chrom_tree_offset)?;
        let rtree = RTree::open(&mut cursor, header.unzoomed_index_offset)?;
        Ok(BigWigReader { cursor, header, bplus, rtree })
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

    /// Resolves `(name, start, end)` into a lazily-decoding section
    /// iterator. `end == 0` is normalized to the chromosome's full length.
    /// An unknown chromosome yields an iterator that immediately ends.
    pub fn query(&mut self, name: &str, start: u32, end: u32, max_items: usize) -> Result<WigQuery<'_, R>> {
        let resolved = engine::resolve_query(&mut self.cursor, &self.bplus, &self.rtree, name, start, end)?;
        let compression = self.compression();
        match resolved {
            Some((_chrom_id, _end, blocks)) => Ok(WigQuery::new(&mut self.cursor, blocks, compression, max_items)),
            None => Ok(WigQuery::new(&mut self.cursor, Vec::new(), compression, max_items)),
        }
    }
}

/* -------------------------------------------------------------------------- */

/// A single-pass BigWIG writer. Sections are accumulated per chromosome in
/// memory and the on-disk structures are emitted in a forward-only
/// sequence (chrom tree, data blocks, R+ tree, then the final header) on
/// `close`. Exactly one section becomes one data block, so
/// `items_per_slot` has no effect on the BigWIG write path.
pub struct BigWigWriter<W: Write + Seek> {
    cursor: Cursor<W>,
    genome: Genome,
    parameters: Parameters,
    sections: BTreeMap<u32, Vec<WigSection>>,
    logger: Logger,
}

impl<W: Write + Seek> BigWigWriter<W> {
    pub fn new(inner: W, genome: Genome, parameters: Parameters) -> Result<Self> {
        let mut cursor = Cursor::new(inner, Order::Little);
        container::write_header_placeholder(&mut cursor)?;
        Ok(BigWigWriter { cursor, genome, parameters, sections: BTreeMap::new(), logger: Logger::new_void() })
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Routes writer progress diagnostics (block counts, compression
    /// ratio, tree shape) to `logger` instead of the default void sink.
    pub fn set_logger(&mut self, logger: Logger) {
        self.logger = logger;
    }

    /// Appends one section to `chrom_name`'s pending block list. Sections
    /// within a chromosome must be supplied in `start` order. Rejects
    /// `BEDGRAPH` sections: the writer's contract never emits them.
    pub fn add_section(&mut self, chrom_name: &str, section: WigSection) -> Result<()> {
        if section.section_type == crate::engine::SectionType::BedGraph {
            return Err(BbiError::unsupported("writing BEDGRAPH sections is not supported"));
        }
        let id = self.genome.get_idx(chrom_name)
            .ok_or_else(|| BbiError::inconsistent(format!("unknown chromosome '{}'", chrom_name)))?;
        self.sections.entry(id as u32).or_default().push(section);
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
        let all_sections: Vec<WigSection> = self.sections.into_values().flatten().collect();
        let (descriptors, max_uncompressed) = engine::write_wig_blocks(
            &mut self.cursor,
            &all_sections,
            self.parameters.compress,
            &mut summary,
        )?;
        let _ = writeln!(
            self.logger,
            "wrote {} data blocks (compressed={}, max uncompressed block={} bytes)",
            descriptors.len(),
            self.parameters.compress,
            max_uncompressed,
        );

        let unzoomed_index_offset = self.cursor.tell()?;
        let _ = writeln!(self.logger, "building r+ tree over {} blocks", descriptors.len());
        rtree::write(&mut self.cursor, self.parameters.block_size, self.parameters.items_per_slot as u32, descriptors)?;

        container::finalize(
            &mut self.cursor,
            BIGWIG_MAGIC,
            0,
            0,
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

/// Reads the genome (chromosome, length pairs) declared by a BigWIG file
/// without holding the reader open afterward.
pub fn bigwig_read_genome<R: Read + Seek>(file: R) -> Result<Genome> {
    let mut reader = BigWigReader::new(file)?;
    let entries = reader.genome()?;
    Ok(Genome::from_lengths(entries.into_iter().map(|e| (e.name, e.size)).collect()))
}

pub fn bigwig_import_genome(filename: &str) -> Result<Genome> {
    let file = NetFile::open(filename).map_err(|e| BbiError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())))?;
    bigwig_read_genome(file)
}

/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SectionType;
    use std::io;

    fn genome() -> Genome {
        Genome::from_lengths(vec![("chr1".into(), 1_000_000), ("chr2".into(), 500_000)])
    }

    fn fixstep(chrom_id: u32, start: u32, end: u32, step: u32, span: u32, values: Vec<f32>) -> WigSection {
        WigSection { chrom_id, start, end, step, span, section_type: SectionType::FixStep, positions: None, values }
    }

    #[test]
    fn write_then_query_fixedstep() {
        let mut buf = Vec::new();
        {
            let backing = io::Cursor::new(&mut buf);
            let mut writer = BigWigWriter::new(backing, genome(), Parameters { block_size: 2, items_per_slot: 1, compress: false }).unwrap();
            writer.add_section("chr1", fixstep(0, 400_600, 400_606, 100, 5, vec![11.0, 22.0, 33.0])).unwrap();
            writer.close().unwrap();
        }

        let mut reader = BigWigReader::new(io::Cursor::new(buf)).unwrap();
        let sections: Vec<WigSection> = reader.query("chr1", 400_600, 400_606, 0).unwrap().map(|r| r.unwrap()).collect();

        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].values, vec![11.0, 22.0, 33.0]);
        assert_eq!(sections[0].start, 400_600);
    }

    #[test]
    fn bedgraph_sections_are_rejected_at_write_time() {
        let buf = io::Cursor::new(Vec::new());
        let mut writer = BigWigWriter::new(buf, genome(), Parameters::default()).unwrap();

        let section = WigSection { chrom_id: 0, start: 0, end: 10, step: 0, span: 0, section_type: SectionType::BedGraph, positions: None, values: vec![1.0] };
        assert!(matches!(writer.add_section("chr1", section), Err(BbiError::Unsupported(_))));
    }

    #[test]
    fn unknown_chromosome_query_yields_nothing() {
        let mut buf = Vec::new();
        {
            let backing = io::Cursor::new(&mut buf);
            let mut writer = BigWigWriter::new(backing, genome(), Parameters::default()).unwrap();
            writer.add_section("chr1", fixstep(0, 0, 10, 10, 10, vec![1.0])).unwrap();
            writer.close().unwrap();
        }

        let mut reader = BigWigReader::new(io::Cursor::new(buf)).unwrap();
        let count = reader.query("chrZZ", 0, 0, 0).unwrap().count();
        assert_eq!(count, 0);
    }
}
