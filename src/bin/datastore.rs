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

//! Validates the overlays and publishes them for query processes.
use std::path::PathBuf;

use anyhow::Result;
use byway::tools;
use clap::Parser;

/// Load the routing dataset and publish it (.timestamp)
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Base path of the graph artifacts (without extension)
    #[arg(required = true)]
    base: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tools::initialize_logging(&args.base)?;
    tools::run_datastore(&args.base)
}
