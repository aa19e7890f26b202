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

//! Error kinds reported across the engine boundary.

use thiserror::Error;

/// Error conditions that can be reported to a caller of the engine.
///
/// Invariant violations (corrupt heap state, a shortcut without a middle
/// node) are not represented here: they abort the process with a
/// diagnostic instead of being propagated.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Unusable input: coordinates outside the map, unreadable files or a
    /// fingerprint mismatch on an artifact.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The selected algorithm does not support the requested feature.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// The searches terminated without meeting although the target is
    /// reachable from the source.
    #[error("no route found between the requested locations")]
    NoRoute,

    /// No directed path connects the endpoints, so no route can exist.
    #[error("impossible route: the locations are not connected")]
    Impossible,
}
