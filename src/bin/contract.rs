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

//! Builds the contraction hierarchy overlay.
use std::path::PathBuf;

use anyhow::Result;
use byway::contractor::ContractionConfig;
use byway::tools;
use clap::Parser;

/// Build the contraction hierarchy (.hsgr, .core) for a prepared graph
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Base path of the graph artifacts (without extension)
    #[arg(required = true)]
    base: PathBuf,

    /// Fraction of the nodes to contract; the rest becomes the core
    #[arg(long, default_value_t = 1.0)]
    core: f64,

    /// Import this CSV edge list first, writing the base artifacts
    #[arg(long)]
    import: Option<PathBuf>,

    /// Node annotations (coordinates, names) for --import
    #[arg(long)]
    nodes: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tools::initialize_logging(&args.base)?;
    if let Some(edges) = &args.import {
        tools::run_import(&args.base, edges, args.nodes.as_deref())?;
    }
    let config = ContractionConfig {
        core_factor: args.core,
        ..Default::default()
    };
    tools::run_contract(&args.base, config)
}
