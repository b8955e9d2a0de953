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

//! Audio resource lifecycle management.
//!
//! An [`AudioManager`] owns a device and a set of named [`AudioBufferGroup`]s.
//! Groups own [`AudioBuffer`]s keyed by file path, and [`AudioSource`]s bind to
//! buffers. Destructive operations (unloading a buffer, removing a group,
//! dropping the manager) detach every source still bound to the affected
//! buffers first.

use std::fmt;
use std::path::Path;

use crate::config;

pub mod buffer;
pub mod error;
pub mod format;
pub mod group;
pub mod manager;
pub mod mock;
mod registry;
pub mod sample_store;
pub mod source;

pub use buffer::AudioBuffer;
pub use error::{AudioError, DeviceError};
pub use format::{ChannelLayout, SampleFormat, SampleWidth};
pub use group::AudioBufferGroup;
pub use manager::{active_manager, AudioManager, ManagerHandle};
pub use sample_store::{decode, file_exists, DecodeError, SampleBlock};
pub use source::AudioSource;

/// The maximum number of concurrent audio sources allowed.
///
/// Even if a device reports support for more sources, the manager is capped at
/// this value. Some devices report an erroneously high number of sources and
/// stop functioning well before it is reached.
pub const MAX_AUDIO_SOURCES: u32 = 256;

/// Name of the buffer group every manager keeps for as long as it lives.
pub const DEFAULT_AUDIO_GROUP_NAME: &str = "default";

/// Device handle value that never refers to a buffer or source.
pub const NO_HANDLE: u32 = 0;

/// Buffer properties that can be queried from a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferProperty {
    /// Sample rate in Hz.
    Frequency,
    /// Length of the buffer data in bytes.
    Size,
    Bits,
    Channels,
}

/// Attribute hints passed to a device when it is opened. Unset values leave the
/// choice to the driver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceAttributes {
    /// How many sources should be capable of playing mono data.
    pub mono_sources: Option<u32>,
    /// How many sources should be capable of playing stereo data.
    pub stereo_sources: Option<u32>,
    /// Frequency of the mixing output buffer, in Hz.
    pub frequency: Option<u32>,
    /// Refresh interval rate, in Hz.
    pub refresh: Option<u32>,
    /// Whether the context should be synchronous.
    pub sync: Option<bool>,
}

/// The driver boundary. Handles are opaque non-zero integers; [`NO_HANDLE`]
/// means "none". All calls are synchronous.
pub trait Device: fmt::Display + Send {
    /// The number of concurrent mono sources the device claims to support.
    fn max_mono_sources(&self) -> Option<u32>;

    /// Creates a buffer by decoding the file at `path`.
    fn create_buffer_from_file(&mut self, path: &Path) -> Result<u32, DeviceError>;

    /// Creates a buffer holding a copy of `block`.
    fn create_buffer_from_memory(&mut self, block: &SampleBlock) -> Result<u32, DeviceError>;

    /// Replaces the contents of an existing buffer with a copy of `block`.
    fn buffer_data_from_memory(
        &mut self,
        buffer: u32,
        block: &SampleBlock,
    ) -> Result<(), DeviceError>;

    /// Deletes a buffer. Fails if a source is still attached to it.
    fn delete_buffer(&mut self, buffer: u32) -> Result<(), DeviceError>;

    /// Whether `buffer` currently names a live buffer.
    fn is_buffer(&self, buffer: u32) -> bool;

    fn buffer_property(&self, buffer: u32, property: BufferProperty) -> Result<u32, DeviceError>;

    fn create_source(&mut self) -> Result<u32, DeviceError>;

    fn delete_source(&mut self, source: u32) -> Result<(), DeviceError>;

    /// Attaches `buffer` to `source`, or detaches whatever is attached when
    /// `buffer` is [`NO_HANDLE`].
    fn set_source_buffer(&mut self, source: u32, buffer: u32) -> Result<(), DeviceError>;

    fn play(&mut self, source: u32) -> Result<(), DeviceError>;

    fn stop(&mut self, source: u32) -> Result<(), DeviceError>;

    fn is_playing(&self, source: u32) -> bool;

    /// Releases the device and its context.
    fn shutdown(&mut self) -> Result<(), DeviceError>;
}

/// Opens the device named by the configuration.
pub fn open_device(config: &config::Audio) -> Result<Box<dyn Device>, DeviceError> {
    let device = config.device();
    if device.starts_with("mock") {
        return Ok(Box::new(mock::Device::open(device, &config.attributes())?));
    }

    Err(DeviceError::NotFound(device.to_string()))
}
