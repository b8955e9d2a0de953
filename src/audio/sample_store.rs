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

//! Decoding of audio files into in-memory sample blocks.
//!
//! The store has no shared state: every call to [`decode`] opens the file,
//! decodes it completely and hands the caller an owned [`SampleBlock`].

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::audio::format::SampleFormat;

mod decoder;
pub mod error;

pub use decoder::decode;
pub use error::DecodeError;

/// Decoded, interleaved sample data plus the metadata needed to interpret it.
///
/// The length of the data is always an exact multiple of the block size.
/// The bytes are shared, so cloning a block is cheap.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleBlock {
    data: Arc<Vec<u8>>,
    format: SampleFormat,
    frequency: u32,
}

impl SampleBlock {
    /// Creates a block from raw interleaved bytes. Any trailing partial frame is
    /// discarded. Returns None if the frequency is zero.
    pub fn new(mut data: Vec<u8>, format: SampleFormat, frequency: u32) -> Option<SampleBlock> {
        if frequency == 0 {
            return None;
        }

        let block_size = format.block_size() as usize;
        data.truncate(data.len() - data.len() % block_size);

        Some(SampleBlock {
            data: Arc::new(data),
            format,
            frequency,
        })
    }

    /// The raw sample bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Length of the sample data in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Sample rate in Hz.
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Bytes per sample frame.
    pub fn block_size(&self) -> u32 {
        self.format.block_size()
    }

    /// Number of sample frames in the block.
    pub fn frame_count(&self) -> usize {
        self.data.len() / self.block_size() as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_count() as f64 / self.frequency as f64)
    }
}

/// Checks that the path exists and is a regular file, optionally logging when it isn't.
pub fn file_exists<P: AsRef<Path>>(path: P, log: bool) -> bool {
    let path = path.as_ref();
    if path.is_file() {
        return true;
    }

    if log {
        warn!(path = ?path, "The audio file does not exist or isn't a file");
    }

    false
}
