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
use std::{
    fmt,
    path::Path,
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tracing::{debug, error, info, span, Level};

use super::{
    buffer::AudioBuffer,
    error::AudioError,
    group::AudioBufferGroup,
    open_device,
    registry::Registry,
    source::{self, AudioSource},
    Device, DEFAULT_AUDIO_GROUP_NAME,
};
use crate::config;

/// The manager that is currently active, if any.
static ACTIVE_MANAGER: Mutex<Option<Weak<Mutex<Registry>>>> = parking_lot::const_mutex(None);

/// Owns an audio device and every buffer group, buffer and source created
/// through it.
///
/// A manager always has a group named [`DEFAULT_AUDIO_GROUP_NAME`]. If the
/// device can't be opened the manager is still created, but in a failure state:
/// groups can be managed, while anything that needs the device reports
/// [`AudioError::DeviceUnavailable`].
///
/// Dropping the manager removes all groups and standalone buffers, releases
/// every source and shuts down the device. Outstanding handles become invalid.
pub struct AudioManager {
    registry: Arc<Mutex<Registry>>,
}

impl AudioManager {
    /// Creates a manager for the device named in the configuration.
    pub fn new(config: &config::Audio) -> AudioManager {
        let device = match open_device(config) {
            Ok(device) => {
                info!(device = %device, "Opened audio device");
                Some(device)
            }
            Err(e) => {
                error!(
                    device = config.device(),
                    err = %e,
                    "Unable to open the audio device, audio manager is in a failure state"
                );
                None
            }
        };

        AudioManager::from_parts(device, config.path_prefix())
    }

    /// Creates a manager for an already opened device.
    pub fn with_device(device: Box<dyn Device>, path_prefix: &str) -> AudioManager {
        AudioManager::from_parts(Some(device), path_prefix)
    }

    fn from_parts(device: Option<Box<dyn Device>>, path_prefix: &str) -> AudioManager {
        let registry = Registry::new(device, path_prefix);
        info!(
            max_sources = registry.max_source_count(),
            path_prefix, "Created audio manager"
        );

        AudioManager {
            registry: Arc::new(Mutex::new(registry)),
        }
    }

    /// Creates a manager and all of the buffer groups described by the bank.
    pub fn from_bank(bank: &config::Bank) -> AudioManager {
        let span = span!(Level::INFO, "load bank");
        let _enter = span.enter();

        let manager = AudioManager::new(bank.audio());
        for group in bank.groups() {
            let path_prefix = group
                .path_prefix()
                .unwrap_or_else(|| bank.audio().path_prefix());
            manager.create_buffer_group_with_files(
                group.name(),
                path_prefix,
                group.files(),
                group.load(),
            );
        }

        manager
    }

    /// A weak handle to this manager.
    pub fn handle(&self) -> ManagerHandle {
        ManagerHandle {
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Whether the device failed to open.
    pub fn is_failed(&self) -> bool {
        self.registry.lock().is_failed()
    }

    pub fn device_name(&self) -> Option<String> {
        self.registry.lock().device_name()
    }

    /// The number of sources that may exist at once.
    pub fn max_source_count(&self) -> u32 {
        self.registry.lock().max_source_count()
    }

    /// Queries the device again for the number of sources it supports.
    pub fn calculate_max_source_count(&self) -> u32 {
        self.registry.lock().calculate_max_source_count()
    }

    /// The number of live sources.
    pub fn source_count(&self) -> usize {
        self.registry.lock().sources.len()
    }

    /// The path prefix given to groups created without one.
    pub fn default_path_prefix(&self) -> String {
        self.registry.lock().default_path_prefix.clone()
    }

    /// The names of all groups, sorted.
    pub fn group_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.lock().groups.keys().cloned().collect();
        names.sort();
        names
    }

    /// Looks up a group by name. When there is no such group, a new one is
    /// created if `create_if_missing` is set, otherwise the default group is
    /// returned. The flag reports whether the named group already existed.
    pub fn buffer_group(&self, name: &str, create_if_missing: bool) -> (AudioBufferGroup, bool) {
        buffer_group(&self.registry, name, create_if_missing)
    }

    pub fn default_buffer_group(&self) -> AudioBufferGroup {
        self.buffer_group(DEFAULT_AUDIO_GROUP_NAME, false).0
    }

    /// Creates a group with the default path prefix. If the group already
    /// exists, it is returned unchanged.
    pub fn create_buffer_group(&self, name: &str) -> AudioBufferGroup {
        create_buffer_group(&self.registry, name, None)
    }

    /// Creates a group with the given path prefix. If the group already exists,
    /// it is returned unchanged.
    pub fn create_buffer_group_with_prefix(
        &self,
        name: &str,
        path_prefix: &str,
    ) -> AudioBufferGroup {
        create_buffer_group(&self.registry, name, Some(path_prefix))
    }

    /// Creates a group, adds every file to it and loads it if `load` is set.
    pub fn create_buffer_group_with_files<S: AsRef<str>>(
        &self,
        name: &str,
        path_prefix: &str,
        files: &[S],
        load: bool,
    ) -> AudioBufferGroup {
        let group = self.create_buffer_group_with_prefix(name, path_prefix);
        let added = group.add_buffers(files);
        if added != files.len() {
            error!(
                group = name,
                added,
                requested = files.len(),
                "Not every file could be added to the buffer group"
            );
        }

        if load {
            group.load_buffers(false);
        }

        group
    }

    /// Removes the named group. The default group is never removed, only
    /// emptied. Returns false if there is no such group.
    pub fn remove_buffer_group(&self, name: &str) -> bool {
        let mut registry = self.registry.lock();
        if name == DEFAULT_AUDIO_GROUP_NAME {
            let removed = registry.clear_group(name);
            debug!(removed, "Emptied the default buffer group");
            return true;
        }

        let removed = registry.remove_group(name);
        if removed {
            info!(group = name, "Removed buffer group");
        }
        removed
    }

    /// Removes every group and empties the default group, resetting its path
    /// prefix. Handles to the default group stay valid.
    pub fn remove_all_buffer_groups(&self) {
        let mut registry = self.registry.lock();
        let names: Vec<String> = registry
            .groups
            .keys()
            .filter(|name| name.as_str() != DEFAULT_AUDIO_GROUP_NAME)
            .cloned()
            .collect();
        for name in names {
            registry.remove_group(&name);
        }

        registry.clear_group(DEFAULT_AUDIO_GROUP_NAME);
        let path_prefix = registry.default_path_prefix.clone();
        let id = registry.create_group(DEFAULT_AUDIO_GROUP_NAME, &path_prefix);
        if let Some(group) = registry.group_mut(DEFAULT_AUDIO_GROUP_NAME, id) {
            group.path_prefix = path_prefix;
        }
        info!("Removed all buffer groups");
    }

    /// Detaches every source bound to the buffer stored under `key` in the
    /// group. Returns the number of sources detached.
    pub fn purge_buffer_from_sources(&self, group: &AudioBufferGroup, key: &str) -> usize {
        if !group.is_owned_by(&Arc::downgrade(&self.registry)) {
            return 0;
        }

        let mut registry = self.registry.lock();
        let buffer = registry
            .group(group.name(), group.id())
            .and_then(|state| state.buffers.get(key).copied());
        buffer.map_or(0, |buffer| registry.purge_buffer(buffer))
    }

    /// Detaches every source bound to any buffer of the group. Returns the
    /// number of sources detached.
    pub fn purge_buffer_group_from_sources(&self, group: &AudioBufferGroup) -> usize {
        if !group.is_owned_by(&Arc::downgrade(&self.registry)) {
            return 0;
        }

        let mut registry = self.registry.lock();
        if registry.group(group.name(), group.id()).is_none() {
            return 0;
        }
        registry.purge_group(group.name())
    }

    /// Creates a source, as long as fewer than
    /// [`AudioManager::max_source_count`] sources exist.
    pub fn create_source(&self) -> Result<AudioSource, AudioError> {
        source::create(&self.registry)
    }

    /// Creates a buffer that doesn't belong to any group. A buffer created with
    /// a path is loaded right away.
    pub fn create_buffer(
        &self,
        name: &str,
        path: Option<&Path>,
        retain_in_memory: bool,
    ) -> Result<AudioBuffer, AudioError> {
        create_buffer(&self.registry, name, path, retain_in_memory)
    }

    /// Makes this the active manager, replacing whichever was active before.
    pub fn activate(&self) {
        *ACTIVE_MANAGER.lock() = Some(Arc::downgrade(&self.registry));
        info!("Activated audio manager");
    }

    pub fn is_active(&self) -> bool {
        ACTIVE_MANAGER
            .lock()
            .as_ref()
            .is_some_and(|active| active.as_ptr() == Arc::as_ptr(&self.registry))
    }
}

impl Drop for AudioManager {
    fn drop(&mut self) {
        {
            let mut active = ACTIVE_MANAGER.lock();
            if active
                .as_ref()
                .is_some_and(|active| active.as_ptr() == Arc::as_ptr(&self.registry))
            {
                *active = None;
            }
        }

        self.registry.lock().shutdown();
        info!("Shut down audio manager");
    }
}

impl fmt::Debug for AudioManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioManager")
            .field("device", &self.device_name())
            .field("groups", &self.group_names())
            .finish()
    }
}

/// The active manager, if one has been activated and is still alive.
pub fn active_manager() -> Option<ManagerHandle> {
    ACTIVE_MANAGER
        .lock()
        .as_ref()
        .filter(|active| active.strong_count() > 0)
        .map(|active| ManagerHandle {
            registry: active.clone(),
        })
}

/// A non-owning reference to an [`AudioManager`]. Every operation fails with
/// [`AudioError::InvalidOwner`] once the manager is dropped.
#[derive(Clone)]
pub struct ManagerHandle {
    registry: Weak<Mutex<Registry>>,
}

impl ManagerHandle {
    fn upgrade(&self) -> Result<Arc<Mutex<Registry>>, AudioError> {
        self.registry.upgrade().ok_or(AudioError::InvalidOwner)
    }

    pub fn is_valid(&self) -> bool {
        self.registry.strong_count() > 0
    }

    pub fn max_source_count(&self) -> u32 {
        self.upgrade()
            .map(|registry| registry.lock().max_source_count())
            .unwrap_or(0)
    }

    pub fn create_source(&self) -> Result<AudioSource, AudioError> {
        source::create(&self.upgrade()?)
    }

    pub fn create_buffer(
        &self,
        name: &str,
        path: Option<&Path>,
        retain_in_memory: bool,
    ) -> Result<AudioBuffer, AudioError> {
        create_buffer(&self.upgrade()?, name, path, retain_in_memory)
    }

    pub fn buffer_group(
        &self,
        name: &str,
        create_if_missing: bool,
    ) -> Result<(AudioBufferGroup, bool), AudioError> {
        Ok(buffer_group(&self.upgrade()?, name, create_if_missing))
    }

    pub fn create_buffer_group(&self, name: &str) -> Result<AudioBufferGroup, AudioError> {
        Ok(create_buffer_group(&self.upgrade()?, name, None))
    }

    /// Whether both handles refer to the same manager.
    pub fn same_manager(&self, manager: &AudioManager) -> bool {
        self.registry.as_ptr() == Arc::as_ptr(&manager.registry)
    }
}

impl fmt::Debug for ManagerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerHandle")
            .field("valid", &self.is_valid())
            .finish()
    }
}

fn buffer_group(
    registry: &Arc<Mutex<Registry>>,
    name: &str,
    create_if_missing: bool,
) -> (AudioBufferGroup, bool) {
    let mut state = registry.lock();
    if let Some(group) = state.groups.get(name) {
        return (
            AudioBufferGroup::new(Arc::downgrade(registry), name, group.id),
            true,
        );
    }

    let name = if create_if_missing {
        name
    } else {
        DEFAULT_AUDIO_GROUP_NAME
    };
    let path_prefix = state.default_path_prefix.clone();
    let id = state.create_group(name, &path_prefix);
    (
        AudioBufferGroup::new(Arc::downgrade(registry), name, id),
        false,
    )
}

fn create_buffer_group(
    registry: &Arc<Mutex<Registry>>,
    name: &str,
    path_prefix: Option<&str>,
) -> AudioBufferGroup {
    let mut state = registry.lock();
    let path_prefix = path_prefix
        .map(str::to_string)
        .unwrap_or_else(|| state.default_path_prefix.clone());
    let id = state.create_group(name, &path_prefix);
    AudioBufferGroup::new(Arc::downgrade(registry), name, id)
}

fn create_buffer(
    registry: &Arc<Mutex<Registry>>,
    name: &str,
    path: Option<&Path>,
    retain_in_memory: bool,
) -> Result<AudioBuffer, AudioError> {
    let mut state = registry.lock();
    let key = state.insert_buffer(name, path.map(Path::to_path_buf), retain_in_memory, None);

    if path.is_some() {
        if let Err(e) = state.load_buffer(key) {
            state.remove_buffer(key);
            return Err(e);
        }
    }

    Ok(AudioBuffer::new(Arc::downgrade(registry), key))
}
