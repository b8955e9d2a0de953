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
use std::{collections::HashMap, fmt, path::Path, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{
    error::DeviceError, sample_store, BufferProperty, DeviceAttributes, SampleBlock, NO_HANDLE,
};

/// Number of mono sources reported when no hint was given.
const DEFAULT_MONO_SOURCES: u32 = 255;

/// Device names ending with this suffix refuse to open.
const UNAVAILABLE_SUFFIX: &str = "-unavailable";

#[derive(Default)]
struct State {
    next_id: u32,
    buffers: HashMap<u32, SampleBlock>,
    sources: HashMap<u32, Source>,
    shut_down: bool,
}

#[derive(Default)]
struct Source {
    buffer: u32,
    playing: bool,
}

impl State {
    fn allocate_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn check_open(&self) -> Result<(), DeviceError> {
        if self.shut_down {
            return Err(DeviceError::ShutDown);
        }
        Ok(())
    }

    fn source_mut(&mut self, source: u32) -> Result<&mut Source, DeviceError> {
        self.check_open()?;
        self.sources
            .get_mut(&source)
            .ok_or(DeviceError::InvalidSource(source))
    }
}

/// A mock device. Doesn't actually play anything, but keeps track of buffers
/// and sources the way a real driver would. Clones share the same state.
#[derive(Clone)]
pub struct Device {
    name: String,
    mono_sources: Option<u32>,
    state: Arc<Mutex<State>>,
}

impl Device {
    /// Opens the given mock device.
    pub fn open(name: &str, attributes: &DeviceAttributes) -> Result<Device, DeviceError> {
        if name.ends_with(UNAVAILABLE_SUFFIX) {
            return Err(DeviceError::Driver(format!(
                "mock device {} is unavailable",
                name
            )));
        }

        info!(device = name, attributes = ?attributes, "Opened mock audio device");
        Ok(Device {
            name: name.to_string(),
            mono_sources: Some(attributes.mono_sources.unwrap_or(DEFAULT_MONO_SOURCES)),
            state: Arc::new(Mutex::new(State::default())),
        })
    }

    /// Makes the device stop reporting how many sources it supports.
    pub fn without_source_count(mut self) -> Device {
        self.mono_sources = None;
        self
    }

    /// The number of live buffers on the device.
    pub fn buffer_count(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// The number of live sources on the device.
    pub fn source_count(&self) -> usize {
        self.state.lock().sources.len()
    }

    /// The buffer currently attached to the source, or [`NO_HANDLE`].
    pub fn source_buffer(&self, source: u32) -> u32 {
        self.state
            .lock()
            .sources
            .get(&source)
            .map_or(NO_HANDLE, |s| s.buffer)
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }

    fn store_buffer(&self, block: SampleBlock) -> Result<u32, DeviceError> {
        let mut state = self.state.lock();
        state.check_open()?;
        let id = state.allocate_id();
        state.buffers.insert(id, block);
        Ok(id)
    }
}

impl super::Device for Device {
    fn max_mono_sources(&self) -> Option<u32> {
        self.mono_sources
    }

    fn create_buffer_from_file(&mut self, path: &Path) -> Result<u32, DeviceError> {
        let block = sample_store::decode(path)
            .map_err(|e| DeviceError::Driver(e.to_string()))?;
        self.store_buffer(block)
    }

    fn create_buffer_from_memory(&mut self, block: &SampleBlock) -> Result<u32, DeviceError> {
        self.store_buffer(block.clone())
    }

    fn buffer_data_from_memory(
        &mut self,
        buffer: u32,
        block: &SampleBlock,
    ) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.check_open()?;
        if state.sources.values().any(|s| s.buffer == buffer) {
            return Err(DeviceError::BufferInUse(buffer));
        }
        let data = state
            .buffers
            .get_mut(&buffer)
            .ok_or(DeviceError::InvalidBuffer(buffer))?;
        *data = block.clone();
        Ok(())
    }

    fn delete_buffer(&mut self, buffer: u32) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.check_open()?;
        if !state.buffers.contains_key(&buffer) {
            return Err(DeviceError::InvalidBuffer(buffer));
        }
        if state.sources.values().any(|s| s.buffer == buffer) {
            debug!(
                device = self.name,
                buffer,
                "Refusing to delete attached buffer"
            );
            return Err(DeviceError::BufferInUse(buffer));
        }
        state.buffers.remove(&buffer);
        Ok(())
    }

    fn is_buffer(&self, buffer: u32) -> bool {
        self.state.lock().buffers.contains_key(&buffer)
    }

    fn buffer_property(&self, buffer: u32, property: BufferProperty) -> Result<u32, DeviceError> {
        let state = self.state.lock();
        state.check_open()?;
        let block = state
            .buffers
            .get(&buffer)
            .ok_or(DeviceError::InvalidBuffer(buffer))?;

        Ok(match property {
            BufferProperty::Frequency => block.frequency(),
            BufferProperty::Size => block.len() as u32,
            BufferProperty::Bits => u32::from(block.format().bits_per_sample()),
            BufferProperty::Channels => u32::from(block.format().channel_count()),
        })
    }

    fn create_source(&mut self) -> Result<u32, DeviceError> {
        let mut state = self.state.lock();
        state.check_open()?;
        let id = state.allocate_id();
        state.sources.insert(id, Source::default());
        Ok(id)
    }

    fn delete_source(&mut self, source: u32) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.check_open()?;
        state
            .sources
            .remove(&source)
            .map(|_| ())
            .ok_or(DeviceError::InvalidSource(source))
    }

    fn set_source_buffer(&mut self, source: u32, buffer: u32) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.check_open()?;
        if buffer != NO_HANDLE && !state.buffers.contains_key(&buffer) {
            return Err(DeviceError::InvalidBuffer(buffer));
        }

        let source = state.source_mut(source)?;
        source.buffer = buffer;
        source.playing = false;
        Ok(())
    }

    fn play(&mut self, source: u32) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        let source = state.source_mut(source)?;
        source.playing = source.buffer != NO_HANDLE;
        Ok(())
    }

    fn stop(&mut self, source: u32) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.source_mut(source)?.playing = false;
        Ok(())
    }

    fn is_playing(&self, source: u32) -> bool {
        self.state
            .lock()
            .sources
            .get(&source)
            .is_some_and(|s| s.playing)
    }

    fn shutdown(&mut self) -> Result<(), DeviceError> {
        let mut state = self.state.lock();
        state.check_open()?;
        state.shut_down = true;
        state.sources.clear();
        state.buffers.clear();
        info!(device = self.name, "Shut down mock audio device");
        Ok(())
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
