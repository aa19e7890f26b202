// This file is part of Byway.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Computes the multi-level cell partition.
use std::path::PathBuf;

use anyhow::Result;
use byway::partition::bisection::BisectionConfig;
use byway::tools;
use clap::Parser;

/// Partition a prepared graph into nested cells (.partition)
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Base path of the graph artifacts (without extension)
    #[arg(required = true)]
    base: PathBuf,

    /// Maximum number of nodes in a finest-level cell
    #[arg(long, default_value_t = 128)]
    max_cell_size: usize,

    /// Balance factor of an acceptable cut (1.0 .. 2.0)
    #[arg(long, default_value_t = 1.2)]
    balance: f64,

    /// Fraction of the projection order seeded as flow sources and sinks
    #[arg(long, default_value_t = 0.25)]
    boundary: f64,

    /// Number of slopes to evaluate per cut
    #[arg(long, default_value_t = 10)]
    optimizing_cuts: usize,

    /// Components below this size are packed instead of bisected
    #[arg(long, default_value_t = 1000)]
    small_component_size: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tools::initialize_logging(&args.base)?;
    let config = BisectionConfig {
        maximum_cell_size: args.max_cell_size,
        balance: args.balance,
        boundary_factor: args.boundary,
        num_optimizing_cuts: args.optimizing_cuts,
        small_component_size: args.small_component_size,
    };
    tools::run_partition(&args.base, config)
}
