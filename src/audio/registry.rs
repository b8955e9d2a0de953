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

//! Arena holding every buffer, source and group owned by a manager.
//!
//! The buffer/source relation is stored on both sides by key: a source records
//! the buffer it is bound to and a buffer records the set of sources bound to
//! it. Both sides are only ever changed together by [`Registry::attach_source`]
//! and [`Registry::detach_source`], and callers hold the manager's lock for the
//! whole of a public operation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::mem;
use std::path::PathBuf;

use slotmap::{new_key_type, SlotMap};
use tracing::{debug, error, warn};

use super::error::{AudioError, DeviceError};
use super::sample_store::{self, file_exists, SampleBlock};
use super::{BufferProperty, Device, DEFAULT_AUDIO_GROUP_NAME, MAX_AUDIO_SOURCES, NO_HANDLE};

new_key_type! {
    pub struct BufferKey;
    pub struct SourceKey;
}

/// Identifies one incarnation of a named group. A group that is removed and
/// created again under the same name gets a new id, so stale handles stay stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupId(u64);

pub struct GroupState {
    pub id: GroupId,
    pub path_prefix: String,
    /// Relative file key to buffer, iterated in key order.
    pub buffers: BTreeMap<String, BufferKey>,
    pub loaded: bool,
}

pub struct BufferState {
    pub name: String,
    pub file_path: Option<PathBuf>,
    /// Device handle, or NO_HANDLE when not loaded.
    pub device_id: u32,
    pub data: Option<SampleBlock>,
    pub retain_in_memory: bool,
    /// Sources currently bound to this buffer.
    pub sources: BTreeSet<SourceKey>,
    /// The owning group, or None for standalone buffers.
    pub group: Option<GroupId>,
}

impl BufferState {
    pub fn is_loaded(&self) -> bool {
        self.device_id != NO_HANDLE
    }
}

pub struct SourceState {
    pub device_id: u32,
    pub buffer: Option<BufferKey>,
}

pub struct Registry {
    /// None when the device could not be opened or has been shut down.
    device: Option<Box<dyn Device>>,
    max_source_count: u32,
    pub default_path_prefix: String,
    pub groups: HashMap<String, GroupState>,
    next_group_id: u64,
    pub buffers: SlotMap<BufferKey, BufferState>,
    pub sources: SlotMap<SourceKey, SourceState>,
}

impl Registry {
    pub fn new(device: Option<Box<dyn Device>>, default_path_prefix: &str) -> Registry {
        let mut registry = Registry {
            device,
            max_source_count: 0,
            default_path_prefix: default_path_prefix.to_string(),
            groups: HashMap::new(),
            next_group_id: 1,
            buffers: SlotMap::with_key(),
            sources: SlotMap::with_key(),
        };
        registry.calculate_max_source_count();
        registry.create_group(DEFAULT_AUDIO_GROUP_NAME, default_path_prefix);
        registry
    }

    pub fn is_failed(&self) -> bool {
        self.device.is_none()
    }

    pub fn device_name(&self) -> Option<String> {
        self.device.as_ref().map(|device| device.to_string())
    }

    fn device(&self) -> Result<&dyn Device, AudioError> {
        self.device.as_deref().ok_or(AudioError::DeviceUnavailable)
    }

    fn device_mut(&mut self) -> Result<&mut (dyn Device + 'static), AudioError> {
        self.device
            .as_deref_mut()
            .ok_or(AudioError::DeviceUnavailable)
    }

    pub fn max_source_count(&self) -> u32 {
        self.max_source_count
    }

    /// Queries the device for the number of mono sources it supports, clamped
    /// to [`MAX_AUDIO_SOURCES`].
    pub fn calculate_max_source_count(&mut self) -> u32 {
        self.max_source_count = match &self.device {
            None => 0,
            Some(device) => match device.max_mono_sources() {
                Some(count) => count.min(MAX_AUDIO_SOURCES),
                None => {
                    warn!(
                        device = %device,
                        max = MAX_AUDIO_SOURCES,
                        "Device did not report its source capability, using the maximum"
                    );
                    MAX_AUDIO_SOURCES
                }
            },
        };
        self.max_source_count
    }

    // Groups

    /// Creates the named group, or returns the id of the existing one.
    pub fn create_group(&mut self, name: &str, path_prefix: &str) -> GroupId {
        if let Some(group) = self.groups.get(name) {
            return group.id;
        }

        let id = GroupId(self.next_group_id);
        self.next_group_id += 1;
        self.groups.insert(
            name.to_string(),
            GroupState {
                id,
                path_prefix: path_prefix.to_string(),
                buffers: BTreeMap::new(),
                loaded: false,
            },
        );
        debug!(group = name, path_prefix, "Created buffer group");
        id
    }

    /// Looks up a group, making sure it is the same incarnation as `id`.
    pub fn group(&self, name: &str, id: GroupId) -> Option<&GroupState> {
        self.groups.get(name).filter(|group| group.id == id)
    }

    pub fn group_mut(&mut self, name: &str, id: GroupId) -> Option<&mut GroupState> {
        self.groups.get_mut(name).filter(|group| group.id == id)
    }

    /// Detaches every source bound to a buffer of the group. Returns the number
    /// of sources detached.
    pub fn purge_group(&mut self, name: &str) -> usize {
        let keys: Vec<BufferKey> = match self.groups.get(name) {
            Some(group) => group.buffers.values().copied().collect(),
            None => return 0,
        };

        keys.into_iter().map(|key| self.purge_buffer(key)).sum()
    }

    /// Removes the buffer stored under `key` in the group. Returns false if the
    /// group has no such buffer.
    pub fn remove_group_buffer(&mut self, name: &str, key: &str) -> bool {
        let buffer = match self.groups.get_mut(name) {
            Some(group) => group.buffers.remove(key),
            None => None,
        };

        match buffer {
            Some(buffer) => {
                self.remove_buffer(buffer);
                true
            }
            None => false,
        }
    }

    /// Removes every buffer of the group and marks it unloaded. Returns the
    /// number of buffers removed.
    pub fn clear_group(&mut self, name: &str) -> usize {
        self.purge_group(name);

        let buffers = match self.groups.get_mut(name) {
            Some(group) => {
                group.loaded = false;
                mem::take(&mut group.buffers)
            }
            None => return 0,
        };

        let count = buffers.len();
        for buffer in buffers.into_values() {
            self.remove_buffer(buffer);
        }
        count
    }

    /// Empties the group and erases it from the mapping.
    pub fn remove_group(&mut self, name: &str) -> bool {
        self.clear_group(name);
        self.groups.remove(name).is_some()
    }

    // Buffers

    pub fn insert_buffer(
        &mut self,
        name: &str,
        file_path: Option<PathBuf>,
        retain_in_memory: bool,
        group: Option<GroupId>,
    ) -> BufferKey {
        self.buffers.insert(BufferState {
            name: name.to_string(),
            file_path,
            device_id: NO_HANDLE,
            data: None,
            retain_in_memory,
            sources: BTreeSet::new(),
            group,
        })
    }

    pub fn buffer(&self, key: BufferKey) -> Result<&BufferState, AudioError> {
        self.buffers.get(key).ok_or(AudioError::InvalidOwner)
    }

    /// Loads the buffer onto the device. Loading an already loaded buffer is a
    /// no-op.
    pub fn load_buffer(&mut self, key: BufferKey) -> Result<(), AudioError> {
        let buffer = self.buffer(key)?;
        if buffer.is_loaded() {
            return Ok(());
        }

        let name = buffer.name.clone();
        let file_path = buffer.file_path.clone();
        let retain_in_memory = buffer.retain_in_memory;
        let data = buffer.data.clone();
        self.device()?;

        let id = if retain_in_memory {
            let block = match data {
                Some(block) => block,
                None => {
                    let path = file_path.ok_or_else(|| AudioError::NoFilePath(name.clone()))?;
                    let block = sample_store::decode(&path)?;
                    self.buffers[key].data = Some(block.clone());
                    block
                }
            };
            self.device_mut()?.create_buffer_from_memory(&block)?
        } else {
            let path = file_path.ok_or_else(|| AudioError::NoFilePath(name.clone()))?;
            if !file_exists(&path, true) {
                return Err(AudioError::NotFound(path));
            }
            self.device_mut()?.create_buffer_from_file(&path)?
        };

        self.buffers[key].device_id = id;
        debug!(buffer = name, id, retain_in_memory, "Loaded buffer");
        Ok(())
    }

    /// Deletes the device copy of the buffer. Without `force` this fails while
    /// any source is bound to it. With `force` every bound source is detached
    /// first.
    pub fn unload_buffer(&mut self, key: BufferKey, force: bool) -> Result<(), AudioError> {
        let buffer = self.buffer(key)?;
        if !buffer.is_loaded() {
            return Ok(());
        }

        let id = buffer.device_id;
        if !buffer.sources.is_empty() {
            if !force {
                return Err(AudioError::InUse {
                    buffer: buffer.name.clone(),
                    sources: buffer.sources.len(),
                });
            }

            // The set is taken up front so the detaches below don't need to
            // call back into it.
            let attached = mem::take(&mut self.buffers[key].sources);
            debug!(
                buffer = id,
                sources = attached.len(),
                "Force purging sources"
            );
            for source in attached {
                self.detach_source(source, false);
            }
        }

        let device = self.device_mut()?;
        let result = device.delete_buffer(id);
        if device.is_buffer(id) {
            return Err(match result {
                Err(e) => e.into(),
                Ok(()) => DeviceError::BufferInUse(id).into(),
            });
        }
        if let Err(e) = result {
            debug!(buffer = id, err = %e, "Device reported an error while deleting a buffer");
        }

        self.buffers[key].device_id = NO_HANDLE;
        debug!(buffer = self.buffers[key].name, id, "Unloaded buffer");
        Ok(())
    }

    /// Detaches every source bound to the buffer. Returns the number of sources
    /// detached.
    pub fn purge_buffer(&mut self, key: BufferKey) -> usize {
        let attached: Vec<SourceKey> = self
            .sources
            .iter()
            .filter(|(_, source)| source.buffer == Some(key))
            .map(|(source, _)| source)
            .collect();

        for source in attached.iter() {
            self.detach_source(*source, true);
        }
        attached.len()
    }

    /// Purges, unloads and erases a buffer. A device copy that can't be deleted
    /// is leaked rather than kept around.
    pub fn remove_buffer(&mut self, key: BufferKey) {
        self.purge_buffer(key);
        if let Err(e) = self.unload_buffer(key, true) {
            if let Some(buffer) = self.buffers.get(key) {
                error!(
                    buffer = buffer.name,
                    id = buffer.device_id,
                    err = %e,
                    "Leaking device buffer that could not be unloaded"
                );
            }
        }
        self.buffers.remove(key);
    }

    pub fn buffer_property(
        &self,
        key: BufferKey,
        property: BufferProperty,
    ) -> Result<u32, AudioError> {
        let buffer = self.buffer(key)?;
        if !buffer.is_loaded() {
            return Err(AudioError::NotLoaded(buffer.name.clone()));
        }

        Ok(self.device()?.buffer_property(buffer.device_id, property)?)
    }

    /// Returns the in-memory copy of the buffer, decoding it first if needed.
    /// The buffer retains its in-memory copy from then on.
    pub fn buffer_data(&mut self, key: BufferKey) -> Result<SampleBlock, AudioError> {
        let buffer = self.buffer(key)?;
        if let Some(block) = &buffer.data {
            return Ok(block.clone());
        }

        let was_retained = buffer.retain_in_memory;
        let path = buffer
            .file_path
            .clone()
            .ok_or_else(|| AudioError::NoFilePath(buffer.name.clone()))?;
        let block = sample_store::decode(&path)?;

        let buffer = &mut self.buffers[key];
        buffer.data = Some(block.clone());
        buffer.retain_in_memory = true;
        let id = buffer.device_id;

        // A buffer that wasn't retained was loaded straight from the file, so
        // the device copy is refreshed from the decoded block.
        if !was_retained && id != NO_HANDLE {
            if let Err(e) = self.device_mut()?.buffer_data_from_memory(id, &block) {
                error!(buffer = id, err = %e, "Unable to refresh device buffer from memory");
            }
        }

        Ok(block)
    }

    /// Replaces the in-memory copy and pushes it to the device copy if loaded.
    pub fn replace_buffer_data(
        &mut self,
        key: BufferKey,
        block: SampleBlock,
    ) -> Result<(), AudioError> {
        let id = self.buffer(key)?.device_id;
        if id != NO_HANDLE {
            self.device_mut()?.buffer_data_from_memory(id, &block)?;
        }

        let buffer = &mut self.buffers[key];
        buffer.data = Some(block);
        buffer.retain_in_memory = true;
        Ok(())
    }

    // Sources

    pub fn create_source(&mut self) -> Result<SourceKey, AudioError> {
        let max = self.max_source_count;
        let live = self.sources.len();
        let device = self.device_mut()?;
        if live >= max as usize {
            return Err(AudioError::SourceLimit(max));
        }

        let device_id = device.create_source()?;
        debug!(source = device_id, live = live + 1, "Created source");
        Ok(self.sources.insert(SourceState {
            device_id,
            buffer: None,
        }))
    }

    /// Detaches the source, erases it and deletes its device copy.
    pub fn destroy_source(&mut self, key: SourceKey) {
        self.detach_source(key, true);
        if let Some(source) = self.sources.remove(key) {
            if let Some(device) = self.device.as_deref_mut() {
                if let Err(e) = device.delete_source(source.device_id) {
                    warn!(source = source.device_id, err = %e, "Unable to delete source");
                }
            }
        }
    }

    /// Binds the source to a loaded buffer, detaching whatever it was bound to.
    pub fn attach_source(
        &mut self,
        source: SourceKey,
        buffer: BufferKey,
    ) -> Result<(), AudioError> {
        let buffer_state = self.buffer(buffer)?;
        if !buffer_state.is_loaded() {
            return Err(AudioError::NotLoaded(buffer_state.name.clone()));
        }
        let buffer_id = buffer_state.device_id;

        let source_state = self.sources.get(source).ok_or(AudioError::InvalidOwner)?;
        if source_state.buffer == Some(buffer) {
            return Ok(());
        }
        let source_id = source_state.device_id;

        self.detach_source(source, true);
        self.device_mut()?.set_source_buffer(source_id, buffer_id)?;
        self.sources[source].buffer = Some(buffer);
        self.buffers[buffer].sources.insert(source);
        Ok(())
    }

    /// Unbinds the source from its buffer. When `notify` is false the caller
    /// has already removed the source from the buffer's set.
    pub fn detach_source(&mut self, source: SourceKey, notify: bool) {
        let Some(state) = self.sources.get_mut(source) else {
            return;
        };
        let Some(buffer) = state.buffer.take() else {
            return;
        };
        let device_id = state.device_id;

        if notify {
            if let Some(buffer) = self.buffers.get_mut(buffer) {
                buffer.sources.remove(&source);
            }
        }

        if let Some(device) = self.device.as_deref_mut() {
            if let Err(e) = device.set_source_buffer(device_id, NO_HANDLE) {
                warn!(source = device_id, err = %e, "Unable to detach buffer from source");
            }
        }
    }

    pub fn play_source(&mut self, source: SourceKey) -> Result<(), AudioError> {
        let id = self.source_id(source)?;
        Ok(self.device_mut()?.play(id)?)
    }

    pub fn stop_source(&mut self, source: SourceKey) -> Result<(), AudioError> {
        let id = self.source_id(source)?;
        Ok(self.device_mut()?.stop(id)?)
    }

    pub fn is_source_playing(&self, source: SourceKey) -> bool {
        match (self.sources.get(source), self.device.as_deref()) {
            (Some(state), Some(device)) => device.is_playing(state.device_id),
            _ => false,
        }
    }

    fn source_id(&self, source: SourceKey) -> Result<u32, AudioError> {
        self.sources
            .get(source)
            .map(|state| state.device_id)
            .ok_or(AudioError::InvalidOwner)
    }

    /// Releases every group, buffer and source, then shuts the device down.
    pub fn shutdown(&mut self) {
        let names: Vec<String> = self.groups.keys().cloned().collect();
        for name in names {
            self.remove_group(&name);
        }

        let standalone: Vec<BufferKey> = self.buffers.keys().collect();
        for buffer in standalone {
            self.remove_buffer(buffer);
        }

        let sources: Vec<SourceKey> = self.sources.keys().collect();
        for source in sources {
            self.destroy_source(source);
        }

        if let Some(mut device) = self.device.take() {
            if let Err(e) = device.shutdown() {
                error!(device = %device, err = %e, "Unable to shut down the audio device");
            }
        }
        self.max_source_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{mock, DeviceAttributes};
    use crate::testutil::write_wav_i16;

    fn registry() -> (Registry, mock::Device) {
        let device = mock::Device::open("mock", &DeviceAttributes::default()).unwrap();
        (Registry::new(Some(Box::new(device.clone())), ""), device)
    }

    /// Checks that every source and buffer agree on who is bound to whom.
    fn assert_consistent(registry: &Registry) {
        for (source, state) in registry.sources.iter() {
            if let Some(buffer) = state.buffer {
                assert!(registry.buffers[buffer].sources.contains(&source));
            }
        }
        for (buffer, state) in registry.buffers.iter() {
            for source in state.sources.iter() {
                assert_eq!(registry.sources[*source].buffer, Some(buffer));
            }
        }
    }

    #[test]
    fn test_attach_and_detach_are_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav_i16(&path, 1, 8000, 800).unwrap();

        let (mut registry, device) = registry();
        let first = registry.insert_buffer("a", Some(path.clone()), false, None);
        let second = registry.insert_buffer("b", Some(path), true, None);
        registry.load_buffer(first).unwrap();
        registry.load_buffer(second).unwrap();

        let source = registry.create_source().unwrap();
        registry.attach_source(source, first).unwrap();
        assert_consistent(&registry);

        // Rebinding moves the back-reference.
        registry.attach_source(source, second).unwrap();
        assert_consistent(&registry);
        assert!(registry.buffers[first].sources.is_empty());
        assert_eq!(
            device.source_buffer(registry.sources[source].device_id),
            registry.buffers[second].device_id
        );

        registry.detach_source(source, true);
        assert_consistent(&registry);
        assert!(registry.buffers[second].sources.is_empty());
    }

    #[test]
    fn test_remove_buffer_purges_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav_i16(&path, 2, 8000, 800).unwrap();

        let (mut registry, device) = registry();
        let buffer = registry.insert_buffer("a", Some(path), false, None);
        registry.load_buffer(buffer).unwrap();
        let sources: Vec<SourceKey> = (0..3).map(|_| registry.create_source().unwrap()).collect();
        for source in sources.iter() {
            registry.attach_source(*source, buffer).unwrap();
        }

        registry.remove_buffer(buffer);
        assert!(registry.buffers.get(buffer).is_none());
        for source in sources.iter() {
            assert!(registry.sources[*source].buffer.is_none());
        }
        assert_eq!(device.buffer_count(), 0);
        assert_consistent(&registry);
    }

    #[test]
    fn test_group_incarnations() {
        let (mut registry, _) = registry();
        let first = registry.create_group("music", "");
        assert_eq!(registry.create_group("music", "elsewhere"), first);
        assert!(registry.remove_group("music"));

        let second = registry.create_group("music", "");
        assert_ne!(first, second);
        assert!(registry.group("music", first).is_none());
        assert!(registry.group("music", second).is_some());
    }

    #[test]
    fn test_failed_registry() {
        let mut registry = Registry::new(None, "");
        assert!(registry.is_failed());
        assert_eq!(registry.max_source_count(), 0);
        assert!(registry.groups.contains_key(DEFAULT_AUDIO_GROUP_NAME));
        assert!(matches!(
            registry.create_source(),
            Err(AudioError::DeviceUnavailable)
        ));
    }
}
