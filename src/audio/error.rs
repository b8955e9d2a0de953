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

use super::sample_store::DecodeError;

/// Errors surfaced by an audio driver.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("No audio device named '{0}'")]
    NotFound(String),

    #[error("Invalid buffer id {0}")]
    InvalidBuffer(u32),

    #[error("Invalid source id {0}")]
    InvalidSource(u32),

    #[error("Buffer {0} is still attached to a source")]
    BufferInUse(u32),

    #[error("The device has been shut down")]
    ShutDown,

    #[error("{0}")]
    Driver(String),
}

/// Errors surfaced by the audio manager, its groups, buffers and sources.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("The audio file at '{0}' does not exist or isn't a file")]
    NotFound(PathBuf),

    #[error(transparent)]
    Decode(DecodeError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("The audio device is unavailable")]
    DeviceUnavailable,

    #[error("Buffer '{buffer}' is still in use by {sources} source(s)")]
    InUse { buffer: String, sources: usize },

    #[error("The audio manager that owns this object is no longer valid")]
    InvalidOwner,

    #[error("Buffer '{0}' is not loaded")]
    NotLoaded(String),

    #[error("The audio file '{key}' is already part of group '{group}'")]
    DuplicateBuffer { group: String, key: String },

    #[error("Buffer '{0}' has no file or in-memory data to load from")]
    NoFilePath(String),

    #[error("The maximum of {0} concurrent sources has been reached")]
    SourceLimit(u32),

    #[error("The buffer belongs to a different audio manager")]
    ForeignBuffer,

    #[error("Buffer '{0}' is owned by a buffer group")]
    NotStandalone(String),
}

impl From<DecodeError> for AudioError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::NotFound(path) => AudioError::NotFound(path),
            e => AudioError::Decode(e),
        }
    }
}
