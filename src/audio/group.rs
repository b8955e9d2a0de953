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
use std::{fmt, path::Path, sync::Weak};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::{
    buffer::AudioBuffer,
    error::AudioError,
    registry::{BufferKey, GroupId, Registry},
    sample_store::file_exists,
    NO_HANDLE,
};

/// A named collection of audio buffers keyed by file path relative to the
/// group's path prefix.
///
/// Groups are only ever created by an [`super::AudioManager`]. A handle stops
/// working once the group is removed or the manager is dropped: mutating calls
/// then report failure and change nothing.
#[derive(Clone)]
pub struct AudioBufferGroup {
    registry: Weak<Mutex<Registry>>,
    name: String,
    id: GroupId,
}

impl AudioBufferGroup {
    pub(super) fn new(
        registry: Weak<Mutex<Registry>>,
        name: &str,
        id: GroupId,
    ) -> AudioBufferGroup {
        AudioBufferGroup {
            registry,
            name: name.to_string(),
            id,
        }
    }

    pub(super) fn id(&self) -> GroupId {
        self.id
    }

    pub(super) fn is_owned_by(&self, registry: &Weak<Mutex<Registry>>) -> bool {
        self.registry.ptr_eq(registry)
    }

    /// Runs `f` with the manager's lock held, provided this group is still a
    /// live member of its manager.
    fn with_group<T>(
        &self,
        f: impl FnOnce(&mut Registry) -> Result<T, AudioError>,
    ) -> Result<T, AudioError> {
        let registry = self.registry.upgrade().ok_or(AudioError::InvalidOwner)?;
        let mut registry = registry.lock();
        if registry.group(&self.name, self.id).is_none() {
            return Err(AudioError::InvalidOwner);
        }
        f(&mut registry)
    }

    /// Members of the group in key order.
    fn members(registry: &Registry, name: &str) -> Vec<(String, BufferKey)> {
        registry
            .groups
            .get(name)
            .map(|group| {
                group
                    .buffers
                    .iter()
                    .map(|(key, buffer)| (key.clone(), *buffer))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn log_invalid(&self, operation: &str) {
        warn!(
            group = self.name,
            operation, "Buffer group is no longer owned by a live audio manager"
        );
    }

    pub fn is_valid(&self) -> bool {
        self.with_group(|_| Ok(())).is_ok()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path_prefix(&self) -> Option<String> {
        self.with_group(|registry| {
            Ok(registry
                .group(&self.name, self.id)
                .map(|group| group.path_prefix.clone()))
        })
        .ok()
        .flatten()
    }

    /// Whether the group is in the loaded state. Buffers added to a loaded
    /// group are loaded immediately.
    pub fn is_loaded(&self) -> bool {
        self.with_group(|registry| {
            Ok(registry
                .group(&self.name, self.id)
                .is_some_and(|group| group.loaded))
        })
        .unwrap_or(false)
    }

    /// The number of buffers in the group.
    pub fn len(&self) -> usize {
        self.with_group(|registry| Ok(Self::members(registry, &self.name).len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The keys of every buffer in the group, in order.
    pub fn file_keys(&self) -> Vec<String> {
        self.with_group(|registry| {
            Ok(Self::members(registry, &self.name)
                .into_iter()
                .map(|(key, _)| key)
                .collect())
        })
        .unwrap_or_default()
    }

    /// The buffer stored under `key`.
    pub fn buffer(&self, key: &str) -> Option<AudioBuffer> {
        self.with_group(|registry| {
            Ok(registry
                .group(&self.name, self.id)
                .and_then(|group| group.buffers.get(key).copied()))
        })
        .ok()
        .flatten()
        .map(|buffer| AudioBuffer::new(self.registry.clone(), buffer))
    }

    /// The device handle of the buffer stored under `key`, or 0 when there is
    /// no such buffer or it isn't loaded.
    pub fn buffer_id(&self, key: &str) -> u32 {
        self.buffer(key).map_or(NO_HANDLE, |buffer| buffer.id())
    }

    /// Adds the file at `key` (relative to the path prefix) to the group. If
    /// the group is loaded, the new buffer is loaded as well and the result of
    /// that load is returned.
    pub fn add_buffer(&self, key: &str) -> bool {
        match self.try_add_buffer(key) {
            Ok(()) => true,
            Err(AudioError::InvalidOwner) => {
                self.log_invalid("add_buffer");
                false
            }
            Err(e @ AudioError::DuplicateBuffer { .. }) => {
                debug!(group = self.name, key, err = %e, "Skipping buffer");
                false
            }
            Err(e) => {
                error!(group = self.name, key, err = %e, "Unable to add buffer to group");
                false
            }
        }
    }

    /// Adds the file at `key` to the group, reporting why it couldn't be added.
    pub fn try_add_buffer(&self, key: &str) -> Result<(), AudioError> {
        self.with_group(|registry| {
            let Some(group) = registry.group(&self.name, self.id) else {
                return Err(AudioError::InvalidOwner);
            };

            let path = Path::new(&group.path_prefix).join(key);
            if !file_exists(&path, false) {
                return Err(AudioError::NotFound(path));
            }
            if group.buffers.contains_key(key) {
                return Err(AudioError::DuplicateBuffer {
                    group: self.name.clone(),
                    key: key.to_string(),
                });
            }
            let loaded = group.loaded;

            let buffer = registry.insert_buffer(key, Some(path), false, Some(self.id));
            if let Some(group) = registry.group_mut(&self.name, self.id) {
                group.buffers.insert(key.to_string(), buffer);
            }

            if loaded {
                registry.load_buffer(buffer)?;
            }
            Ok(())
        })
    }

    /// Adds every file in `keys`. Returns the number added successfully.
    pub fn add_buffers<S: AsRef<str>>(&self, keys: &[S]) -> usize {
        keys.iter()
            .filter(|key| self.add_buffer(key.as_ref()))
            .count()
    }

    /// Detaches every source bound to the buffer, then unloads and removes it.
    pub fn remove_buffer(&self, key: &str) -> bool {
        match self.with_group(|registry| Ok(registry.remove_group_buffer(&self.name, key))) {
            Ok(removed) => removed,
            Err(_) => {
                self.log_invalid("remove_buffer");
                false
            }
        }
    }

    /// Removes every buffer in `keys`. Returns the number removed.
    pub fn remove_buffers<S: AsRef<str>>(&self, keys: &[S]) -> usize {
        keys.iter()
            .filter(|key| self.remove_buffer(key.as_ref()))
            .count()
    }

    /// Detaches all sources from the group's buffers, then unloads and removes
    /// every buffer. The group is left unloaded. Returns the number removed.
    pub fn remove_all_buffers(&self) -> usize {
        match self.with_group(|registry| Ok(registry.clear_group(&self.name))) {
            Ok(removed) => removed,
            Err(_) => {
                self.log_invalid("remove_all_buffers");
                0
            }
        }
    }

    /// Puts the group in the loaded state and loads every buffer that isn't
    /// loaded yet. With `verify_files_exist`, buffers whose file disappeared
    /// after being added are skipped. Returns the number of newly loaded
    /// buffers.
    pub fn load_buffers(&self, verify_files_exist: bool) -> usize {
        let result = self.with_group(|registry| {
            if let Some(group) = registry.group_mut(&self.name, self.id) {
                group.loaded = true;
            }

            let mut loaded = 0;
            for (key, buffer) in Self::members(registry, &self.name) {
                let state = registry.buffer(buffer)?;
                if state.is_loaded() {
                    debug!(group = self.name, key, "Buffer is already loaded, skipping");
                    continue;
                }

                if verify_files_exist {
                    if let Some(path) = state.file_path.as_ref().filter(|p| !file_exists(p, false)) {
                        error!(
                            group = self.name,
                            path = ?path,
                            "Cannot load the audio file, it was deleted or changed after being added to the group"
                        );
                        continue;
                    }
                }

                match registry.load_buffer(buffer) {
                    Ok(()) => loaded += 1,
                    Err(e) => {
                        error!(group = self.name, key, err = %e, "Unable to load buffer")
                    }
                }
            }
            Ok(loaded)
        });

        match result {
            Ok(loaded) => {
                info!(group = self.name, loaded, "Loaded buffer group");
                loaded
            }
            Err(_) => {
                self.log_invalid("load_buffers");
                0
            }
        }
    }

    /// Puts the group in the unloaded state and unloads every buffer. Buffers
    /// still bound to a source are left loaded. Returns the number of buffers
    /// that failed to unload.
    pub fn unload_buffers(&self) -> usize {
        let result = self.with_group(|registry| {
            if let Some(group) = registry.group_mut(&self.name, self.id) {
                group.loaded = false;
            }

            let mut failed = 0;
            for (key, buffer) in Self::members(registry, &self.name) {
                if let Err(e) = registry.unload_buffer(buffer, false) {
                    error!(group = self.name, key, err = %e, "Unable to unload buffer");
                    failed += 1;
                }
            }
            Ok(failed)
        });

        result.unwrap_or_else(|_| {
            self.log_invalid("unload_buffers");
            0
        })
    }

    /// Changes the path prefix of the group.
    ///
    /// Every source bound to a buffer of the group is detached first. With
    /// `remove_all` every buffer is removed; otherwise only the buffers whose
    /// file can't be found under the new prefix are. Buffers that remain are
    /// rebound to the file under the new prefix, and reloaded if the group is
    /// loaded. Returns false if the prefix was unchanged or the group is no
    /// longer valid.
    pub fn set_path_prefix(&self, path_prefix: &str, remove_all: bool) -> bool {
        let result = self.with_group(|registry| {
            let loaded = match registry.group_mut(&self.name, self.id) {
                Some(group) if group.path_prefix == path_prefix => return Ok(false),
                Some(group) => group.loaded,
                None => return Err(AudioError::InvalidOwner),
            };

            let purged = registry.purge_group(&self.name);
            if let Some(group) = registry.group_mut(&self.name, self.id) {
                group.path_prefix = path_prefix.to_string();
            }
            debug!(group = self.name, path_prefix, purged, "Changed path prefix");

            if remove_all {
                registry.clear_group(&self.name);
                return Ok(true);
            }

            for (key, buffer) in Self::members(registry, &self.name) {
                let path = Path::new(path_prefix).join(&key);
                if !file_exists(&path, false) {
                    debug!(group = self.name, path = ?path, "Dropping buffer missing under new prefix");
                    registry.remove_group_buffer(&self.name, &key);
                    continue;
                }

                if let Err(e) = registry.unload_buffer(buffer, true) {
                    error!(group = self.name, key, err = %e, "Unable to unload buffer, dropping it");
                    registry.remove_group_buffer(&self.name, &key);
                    continue;
                }

                if let Some(state) = registry.buffers.get_mut(buffer) {
                    state.file_path = Some(path);
                    state.data = None;
                }

                if loaded {
                    if let Err(e) = registry.load_buffer(buffer) {
                        error!(group = self.name, key, err = %e, "Unable to reload buffer");
                    }
                }
            }
            Ok(true)
        });

        result.unwrap_or_else(|_| {
            self.log_invalid("set_path_prefix");
            false
        })
    }
}

impl fmt::Debug for AudioBufferGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBufferGroup")
            .field("name", &self.name)
            .field("valid", &self.is_valid())
            .finish()
    }
}
