// /////////////////////////////////////////////////////////////////////////////
// Granary
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Generates sample CSV files that pass the upload validator: an
//! `id,name,value` header plus N well-formed data rows. Useful for load
//! tests and manual exercise of the service.
//!
//! ```bash
//! gen-test-csv --out sample.csv --rows 100000 --seed 7
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DEFAULT_NAMES: &[&str] = &[
    "Alice", "Bob", "Carol", "Dave", "Eve", "Frank", "Grace", "Heidi", "Ivan", "Judy", "Mallory",
    "Niaj", "Olivia", "Peggy", "Sybil", "Trent", "Victor", "Wendy",
];

#[derive(Parser)]
#[command(name = "gen-test-csv")]
#[command(about = "Generate a CSV file with columns: id,name,value")]
#[command(version)]
struct Cli {
    /// Output CSV file path
    #[arg(short, long, default_value = "sample.csv")]
    out: PathBuf,

    /// Number of data rows to generate
    #[arg(short = 'n', long, default_value_t = 1000)]
    rows: u64,

    /// Minimum value for the 'value' column
    #[arg(long, default_value_t = 1)]
    min: i64,

    /// Maximum value for the 'value' column
    #[arg(long, default_value_t = 1000)]
    max: i64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.min > cli.max {
        bail!("--min cannot be greater than --max");
    }

    if let Some(parent) = cli.out.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }

    let mut rng: StdRng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut writer = csv::Writer::from_path(&cli.out)
        .with_context(|| format!("failed to create {}", cli.out.display()))?;
    writer.write_record(["id", "name", "value"])?;
    for i in 1..=cli.rows {
        let name = DEFAULT_NAMES[rng.random_range(0..DEFAULT_NAMES.len())];
        let value = rng.random_range(cli.min..=cli.max);
        writer.write_record([i.to_string(), name.to_string(), value.to_string()])?;
    }
    writer.flush()?;

    println!("CSV generated: {} ({} rows)", cli.out.display(), cli.rows);
    Ok(())
}
