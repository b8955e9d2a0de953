// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::path::PathBuf;

/// Error types for decoding an audio file into a sample block.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("The audio file at '{0}' does not exist or isn't a file")]
    NotFound(PathBuf),

    #[error("No valid audio format in file '{0}'")]
    NoFormat(PathBuf),

    #[error("Invalid block size in file '{0}'")]
    InvalidBlockSize(PathBuf),

    #[error("Invalid sample rate in file '{0}'")]
    InvalidFrequency(PathBuf),

    #[error("Could not read audio data from '{path}': {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: symphonia::core::errors::Error,
    },
}
