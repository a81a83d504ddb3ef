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

// A chromosome registry with dense ids assigned in name-sorted order, the
// same order the B+ tree writer assigns them in. Vec-indexed rather than
// the teacher's HashMap<String,i32> so that `id` can double as an index.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::{BbiError, Result};

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug, Default)]
pub struct Genome {
    seqnames: Vec<String>,
    lengths: Vec<u32>,
}

/* -------------------------------------------------------------------------- */

impl Genome {

    pub fn new() -> Self {
        Genome::default()
    }

    /// Builds a genome from unsorted `(name, length)` pairs, assigning
    /// dense ids in name-sorted order.
    pub fn from_lengths(mut entries: Vec<(String, u32)>) -> Genome {
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        let seqnames = entries.iter().map(|e| e.0.clone()).collect();
        let lengths  = entries.iter().map(|e| e.1).collect();
        Genome { seqnames, lengths }
    }

    pub fn len(&self) -> usize {
        self.seqnames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seqnames.is_empty()
    }

    pub fn seqnames(&self) -> &[String] {
        &self.seqnames
    }

    pub fn lengths(&self) -> &[u32] {
        &self.lengths
    }

    pub fn seq_length(&self, id: usize) -> Option<u32> {
        self.lengths.get(id).copied()
    }

    /// The dense id assigned to `name`, if present.
    pub fn get_idx(&self, name: &str) -> Option<usize> {
        self.seqnames.iter().position(|n| n == name)
    }

    pub fn add_sequence(&mut self, name: String, length: u32) {
        if let Some(idx) = self.get_idx(&name) {
            self.lengths[idx] = length;
            return;
        }
        let mut paired: Vec<(String, u32)> = self.seqnames.drain(..).zip(self.lengths.drain(..)).collect();
        paired.push((name, length));
        paired.sort_by(|a, b| a.0.cmp(&b.0));
        self.seqnames = paired.iter().map(|p| p.0.clone()).collect();
        self.lengths  = paired.iter().map(|p| p.1).collect();
    }

    pub fn sum_lengths(&self) -> u64 {
        self.lengths.iter().map(|&l| l as u64).sum()
    }

    pub fn filter<F: Fn(&str, u32) -> bool>(&self, f: F) -> Genome {
        let entries = self.seqnames.iter()
            .zip(self.lengths.iter())
            .filter(|(name, &length)| f(name, length))
            .map(|(name, &length)| (name.clone(), length))
            .collect();
        Genome::from_lengths(entries)
    }

    pub fn equals(&self, other: &Genome) -> bool {
        self.seqnames == other.seqnames && self.lengths == other.lengths
    }

    /// Reads a two-column `name<TAB>length` text genome file, one
    /// sequence per line.
    pub fn read<R: Read>(reader: R) -> Result<Genome> {
        let buf = BufReader::new(reader);
        let mut entries = Vec::new();

        for line in buf.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let name = fields.next()
                .ok_or_else(|| BbiError::inconsistent("genome line missing sequence name"))?;
            let length: u32 = fields.next()
                .ok_or_else(|| BbiError::inconsistent("genome line missing sequence length"))?
                .parse()
                .map_err(|_| BbiError::inconsistent("genome line has non-numeric length"))?;
            entries.push((name.to_string(), length));
        }

        Ok(Genome::from_lengths(entries))
    }

    pub fn import<P: AsRef<Path>>(filename: P) -> Result<Genome> {
        let file = File::open(filename.as_ref())?;
        Genome::read(file)
    }
}

/* -------------------------------------------------------------------------- */

impl fmt::Display for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<10} {:>10}", "seqnames", "lengths")?;
        for (seqname, length) in self.seqnames.iter().zip(self.lengths.iter()) {
            writeln!(f, "{:<10} {:>10}", seqname, length)?;
        }
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_assigned_in_name_sorted_order() {
        let genome = Genome::from_lengths(vec![
            ("chr3".into(), 300),
            ("chr1".into(), 100),
            ("chr2".into(), 200),
        ]);

        assert_eq!(genome.seqnames(), &["chr1", "chr2", "chr3"]);
        assert_eq!(genome.get_idx("chr2"), Some(1));
        assert_eq!(genome.seq_length(1), Some(200));
    }

    #[test]
    fn read_text_format() {
        let text = b"chr1\t100\nchr2\t200\n".to_vec();
        let genome = Genome::read(std::io::Cursor::new(text)).unwrap();

        assert_eq!(genome.len(), 2);
        assert_eq!(genome.seq_length(0), Some(100));
    }
}
