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

use std::process;

use clap::{Arg, Command};

use bbiformats::bigbed::BigBedFile;

/* -------------------------------------------------------------------------- */

fn query(filename_in: &str, chrom: &str, from: u32, to: u32, max_items: usize, verbose: bool) {
    if verbose {
        eprintln!("Opening bigBed file {}", filename_in);
    }

    let mut reader = BigBedFile::new_reader(filename_in).unwrap_or_else(|err| {
        eprintln!("Error opening file: {}", err);
        process::exit(1);
    });

    let records = reader.query(chrom, from, to, max_items).unwrap_or_else(|err| {
        eprintln!("Error querying BigBed file: {}", err);
        process::exit(1);
    });

    for result in records {
        match result {
            Ok(record) => {
                if record.rest.is_empty() {
                    println!("{}\t{}\t{}", chrom, record.start, record.end);
                } else {
                    println!("{}\t{}\t{}\t{}", chrom, record.start, record.end, record.rest);
                }
            }
            Err(err) => {
                eprintln!("Error decoding record: {}", err);
                process::exit(1);
            }
        }
    }
}

/* -------------------------------------------------------------------------- */

fn main() {
    let matches = Command::new("BigBed Query")
        .version("1.0")
        .author("Philipp Benner [https://github.com/pbenner]")
        .about("Query BigBed files")
        .arg(
            Arg::new("input")
                .help("The input BigBed file")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("chrom")
                .help("The chromosome to query")
                .required(true)
                .index(2),
        )
        .arg(
            Arg::new("from")
                .help("The start position")
                .required(true)
                .index(3),
        )
        .arg(
            Arg::new("to")
                .help("The end position")
                .required(true)
                .index(4),
        )
        .arg(
            Arg::new("max-items")
                .long("max-items")
                .help("Stop after this many records (0 means unbounded)")
                .default_value("0"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::SetTrue)
                .help("Be verbose"))
        .get_matches();

    let filename_in = matches.get_one::<String>("input").expect("Input file is required");
    let chrom = matches.get_one::<String>("chrom").expect("Chromosome is required");
    let from: u32 = matches
        .get_one::<String>("from")
        .expect("Start position is required")
        .parse()
        .unwrap_or_else(|_| {
            eprintln!("Invalid start position");
            process::exit(1);
        });
    let to: u32 = matches
        .get_one::<String>("to")
        .expect("End position is required")
        .parse()
        .unwrap_or_else(|_| {
            eprintln!("Invalid end position");
            process::exit(1);
        });
    let max_items: usize = matches
        .get_one::<String>("max-items")
        .expect("has a default value")
        .parse()
        .unwrap_or_else(|_| {
            eprintln!("Invalid max-items value");
            process::exit(1);
        });
    let verbose = matches.get_flag("verbose");

    query(filename_in, chrom, from, to, max_items, verbose);
}
