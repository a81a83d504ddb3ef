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

/* -------------------------------------------------------------------------- */

use std::io;

use approx::assert_relative_eq;

use bbiformats::bigwig::{BigWigReader, BigWigWriter};
use bbiformats::engine::{Parameters, SectionType, WigSection};
use bbiformats::genome::Genome;

/* -------------------------------------------------------------------------- */

fn test_genome() -> Genome {
    Genome::from_lengths(vec![("test1".into(), 1000), ("test2".into(), 1000)])
}

fn fixstep(chrom_id: u32, start: u32, end: u32, step: u32, span: u32, values: Vec<f32>) -> WigSection {
    WigSection { chrom_id, start, end, step, span, section_type: SectionType::FixStep, positions: None, values }
}

#[test]
fn bigwig_round_trip_across_two_chromosomes() {
    let mut buf = Vec::new();
    {
        let backing = io::Cursor::new(&mut buf);
        let mut writer = BigWigWriter::new(
            backing,
            test_genome(),
            Parameters { block_size: 4, items_per_slot: 1, compress: true },
        ).unwrap();

        writer.add_section("test1", fixstep(0, 0, 50, 10, 10, vec![1.0, 2.0, 3.0, 4.0, 5.0])).unwrap();
        writer.add_section("test2", fixstep(1, 100, 120, 10, 10, vec![6.0, 7.0])).unwrap();
        writer.close().unwrap();
    }

    let mut reader = BigWigReader::new(io::Cursor::new(buf)).unwrap();

    let genome = reader.genome().unwrap();
    assert_eq!(genome.len(), 2);
    assert_eq!(genome[0].name, "test1");
    assert_eq!(genome[1].name, "test2");

    let sections: Vec<WigSection> = reader.query("test1", 0, 100, 0).unwrap().map(|r| r.unwrap()).collect();
    assert_eq!(sections.len(), 1);
    assert_eq!(sections[0].values, vec![1.0, 2.0, 3.0, 4.0, 5.0]);

    let sum: f64 = reader.summary().unwrap().sum_data;
    assert_relative_eq!(sum, 1.0 + 2.0 + 3.0 + 4.0 + 5.0 + 6.0 + 7.0, epsilon = 1e-9);

    let empty = reader.query("test2", 0, 50, 0).unwrap().count();
    assert_eq!(empty, 0);
}

#[test]
fn bigwig_query_respects_max_items() {
    let mut buf = Vec::new();
    {
        let backing = io::Cursor::new(&mut buf);
        let mut writer = BigWigWriter::new(
            backing,
            test_genome(),
            Parameters { block_size: 2, items_per_slot: 1, compress: false },
        ).unwrap();

        writer.add_section("test1", fixstep(0, 0, 10, 10, 10, vec![1.0])).unwrap();
        writer.add_section("test1", fixstep(0, 10, 20, 10, 10, vec![2.0])).unwrap();
        writer.add_section("test1", fixstep(0, 20, 30, 10, 10, vec![3.0])).unwrap();
        writer.close().unwrap();
    }

    let mut reader = BigWigReader::new(io::Cursor::new(buf)).unwrap();
    let limited = reader.query("test1", 0, 30, 2).unwrap().count();
    assert_eq!(limited, 2);
}
