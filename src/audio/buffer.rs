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
    path::PathBuf,
    sync::{Arc, Weak},
    time::Duration,
};

use parking_lot::Mutex;
use tracing::error;

use super::{
    error::AudioError,
    registry::{BufferKey, Registry},
    BufferProperty, SampleBlock, NO_HANDLE,
};

/// A handle to an audio buffer owned by an [`super::AudioManager`], either as a
/// member of a buffer group or standalone.
///
/// A buffer holds at most one device copy of its sample data and, when it
/// retains memory, an editable in-memory copy. Handles are cheap to clone and
/// become invalid once the buffer is removed or its manager is dropped.
#[derive(Clone)]
pub struct AudioBuffer {
    registry: Weak<Mutex<Registry>>,
    key: BufferKey,
}

impl AudioBuffer {
    pub(super) fn new(registry: Weak<Mutex<Registry>>, key: BufferKey) -> AudioBuffer {
        AudioBuffer { registry, key }
    }

    pub(super) fn key(&self) -> BufferKey {
        self.key
    }

    /// Whether this buffer and `registry` belong to the same manager.
    pub(super) fn is_owned_by(&self, registry: &Weak<Mutex<Registry>>) -> bool {
        self.registry.ptr_eq(registry)
    }

    fn upgrade(&self) -> Result<Arc<Mutex<Registry>>, AudioError> {
        self.registry.upgrade().ok_or(AudioError::InvalidOwner)
    }

    /// Runs `f` against the registry with the manager's lock held.
    fn with_registry<T>(
        &self,
        f: impl FnOnce(&mut Registry) -> Result<T, AudioError>,
    ) -> Result<T, AudioError> {
        let registry = self.upgrade()?;
        let mut registry = registry.lock();
        f(&mut registry)
    }

    /// Whether the buffer still exists in a live manager.
    pub fn is_valid(&self) -> bool {
        self.with_registry(|registry| registry.buffer(self.key).map(|_| ()))
            .is_ok()
    }

    pub fn name(&self) -> Option<String> {
        self.with_registry(|registry| Ok(registry.buffer(self.key)?.name.clone()))
            .ok()
    }

    /// The file the buffer is loaded from, if any.
    pub fn file_path(&self) -> Option<PathBuf> {
        self.with_registry(|registry| Ok(registry.buffer(self.key)?.file_path.clone()))
            .ok()
            .flatten()
    }

    /// The device handle, or 0 when the buffer is not loaded.
    pub fn id(&self) -> u32 {
        self.with_registry(|registry| Ok(registry.buffer(self.key)?.device_id))
            .unwrap_or(NO_HANDLE)
    }

    pub fn is_loaded(&self) -> bool {
        self.id() != NO_HANDLE
    }

    /// Whether the buffer keeps an in-memory copy of its sample data.
    pub fn retains_in_memory(&self) -> bool {
        self.with_registry(|registry| Ok(registry.buffer(self.key)?.retain_in_memory))
            .unwrap_or(false)
    }

    /// The number of sources currently bound to this buffer.
    pub fn referencing_source_count(&self) -> usize {
        self.with_registry(|registry| Ok(registry.buffer(self.key)?.sources.len()))
            .unwrap_or(0)
    }

    /// Loads the buffer onto the device, logging any failure. Returns true if
    /// the buffer is loaded afterwards.
    pub fn load(&self) -> bool {
        match self.try_load() {
            Ok(()) => true,
            Err(e) => {
                error!(buffer = ?self.name(), err = %e, "Unable to load audio buffer");
                false
            }
        }
    }

    /// Loads the buffer onto the device. A buffer that retains memory is loaded
    /// from its in-memory copy, decoding the file first if needed.
    pub fn try_load(&self) -> Result<(), AudioError> {
        self.with_registry(|registry| registry.load_buffer(self.key))
    }

    /// Unloads the buffer from the device, logging any failure. Returns true if
    /// the buffer is unloaded afterwards.
    pub fn unload(&self, force_purge: bool) -> bool {
        match self.try_unload(force_purge) {
            Ok(()) => true,
            Err(e) => {
                error!(
                    buffer = ?self.name(),
                    err = %e,
                    "Unable to unload audio buffer"
                );
                false
            }
        }
    }

    /// Unloads the buffer from the device. Without `force_purge`, fails with
    /// [`AudioError::InUse`] while any source is bound to the buffer. With it,
    /// every bound source is detached first.
    pub fn try_unload(&self, force_purge: bool) -> Result<(), AudioError> {
        self.with_registry(|registry| registry.unload_buffer(self.key, force_purge))
    }

    fn property(&self, property: BufferProperty) -> Result<u32, AudioError> {
        self.with_registry(|registry| registry.buffer_property(self.key, property))
    }

    /// Sample rate in Hz.
    pub fn frequency(&self) -> Result<u32, AudioError> {
        self.property(BufferProperty::Frequency)
    }

    /// Size of the device copy in bytes.
    pub fn byte_size(&self) -> Result<u32, AudioError> {
        self.property(BufferProperty::Size)
    }

    pub fn bits_per_sample(&self) -> Result<u32, AudioError> {
        self.property(BufferProperty::Bits)
    }

    pub fn channel_count(&self) -> Result<u32, AudioError> {
        self.property(BufferProperty::Channels)
    }

    /// Number of sample frames in the device copy.
    pub fn sample_count(&self) -> Result<u64, AudioError> {
        let bits = u64::from(self.bits_per_sample()?) * u64::from(self.channel_count()?);
        if bits == 0 {
            return Ok(0);
        }

        Ok(u64::from(self.byte_size()?) * 8 / bits)
    }

    pub fn duration(&self) -> Result<Duration, AudioError> {
        let frequency = self.frequency()?;
        if frequency == 0 {
            return Ok(Duration::ZERO);
        }

        Ok(Duration::from_secs_f64(
            self.sample_count()? as f64 / f64::from(frequency),
        ))
    }

    /// Returns the in-memory copy of the sample data.
    ///
    /// A buffer that didn't retain memory decodes its file and retains it from
    /// now on; if it was loaded, the device copy is refreshed from the decoded
    /// data so both copies match.
    pub fn data(&self) -> Result<SampleBlock, AudioError> {
        self.with_registry(|registry| registry.buffer_data(self.key))
    }

    /// Replaces the in-memory copy, and the device copy if loaded.
    pub fn replace_data(&self, block: SampleBlock) -> Result<(), AudioError> {
        self.with_registry(|registry| registry.replace_buffer_data(self.key, block))
    }

    /// Releases a standalone buffer, detaching any bound sources. Buffers that
    /// belong to a group are removed through the group instead.
    pub fn destroy(self) -> Result<(), AudioError> {
        self.with_registry(|registry| {
            let buffer = registry.buffer(self.key)?;
            if buffer.group.is_some() {
                return Err(AudioError::NotStandalone(buffer.name.clone()));
            }

            registry.remove_buffer(self.key);
            Ok(())
        })
    }
}

/// Buffers are equal when they share a device handle.
impl PartialEq for AudioBuffer {
    fn eq(&self, other: &AudioBuffer) -> bool {
        self.id() == other.id()
    }
}

impl Eq for AudioBuffer {}

impl fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("name", &self.name())
            .field("id", &self.id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::{ChannelLayout, SampleFormat, SampleWidth};
    use crate::audio::{Device, DeviceError};
    use crate::testutil::{mock_manager, write_wav_i16};

    #[test]
    fn test_load_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav_i16(&path, 2, 44100, 4410).unwrap();

        let (manager, _) = mock_manager("");
        let buffer = manager.create_buffer("a", Some(&path), false).unwrap();
        assert!(buffer.is_loaded());

        let id = buffer.id();
        assert!(buffer.load());
        assert!(buffer.load());
        assert_eq!(buffer.id(), id);
    }

    #[test]
    fn test_properties() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav_i16(&path, 2, 44100, 22050).unwrap();

        let (manager, _) = mock_manager("");
        let buffer = manager.create_buffer("a", None, false).unwrap();
        assert!(matches!(buffer.frequency(), Err(AudioError::NotLoaded(_))));
        assert!(matches!(buffer.try_load(), Err(AudioError::NoFilePath(_))));

        let buffer = manager.create_buffer("b", Some(&path), false).unwrap();
        assert!(buffer.unload(false));
        assert!(matches!(buffer.frequency(), Err(AudioError::NotLoaded(_))));
        assert!(matches!(buffer.duration(), Err(AudioError::NotLoaded(_))));

        assert!(buffer.load());
        assert_eq!(buffer.frequency().unwrap(), 44100);
        assert_eq!(buffer.channel_count().unwrap(), 2);
        assert_eq!(buffer.bits_per_sample().unwrap(), 16);
        assert_eq!(buffer.byte_size().unwrap(), 22050 * 4);
        assert_eq!(buffer.sample_count().unwrap(), 22050);
        assert_eq!(buffer.duration().unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_unload_with_bound_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav_i16(&path, 1, 8000, 800).unwrap();

        let (manager, device) = mock_manager("");
        let buffer = manager.create_buffer("a", Some(&path), false).unwrap();
        let sources: Vec<_> = (0..3).map(|_| manager.create_source().unwrap()).collect();
        for source in sources.iter() {
            source.set_buffer(&buffer).unwrap();
        }
        assert_eq!(buffer.referencing_source_count(), 3);

        // Without forcing, everything stays as it was.
        assert!(matches!(
            buffer.try_unload(false),
            Err(AudioError::InUse { sources: 3, .. })
        ));
        assert!(buffer.is_loaded());
        assert!(sources.iter().all(|s| s.buffer() == Some(buffer.clone())));

        assert!(buffer.unload(true));
        assert!(!buffer.is_loaded());
        assert_eq!(buffer.referencing_source_count(), 0);
        assert!(sources.iter().all(|s| s.buffer().is_none()));
        assert_eq!(device.buffer_count(), 0);
    }

    #[test]
    fn test_unload_refused_by_device() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav_i16(&path, 1, 8000, 80).unwrap();

        let (manager, mut device) = mock_manager("");
        let buffer = manager.create_buffer("a", Some(&path), false).unwrap();

        // A source the manager doesn't track still holds the device copy.
        let raw = device.create_source().unwrap();
        device.set_source_buffer(raw, buffer.id()).unwrap();

        let id = buffer.id();
        assert!(matches!(
            buffer.try_unload(true),
            Err(AudioError::Device(DeviceError::BufferInUse(_)))
        ));
        assert!(buffer.is_loaded());
        assert_eq!(buffer.id(), id);
        assert!(!buffer.unload(true));

        device.set_source_buffer(raw, NO_HANDLE).unwrap();
        assert!(buffer.unload(true));
        assert!(!buffer.is_loaded());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav_i16(&path, 1, 8000, 80).unwrap();

        let (manager, _) = mock_manager("");
        let buffer = manager.create_buffer("a", Some(&path), false).unwrap();
        assert!(buffer.unload(false));
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(buffer.try_load(), Err(AudioError::NotFound(_))));
        assert!(matches!(buffer.data(), Err(AudioError::NotFound(_))));
        assert!(!buffer.retains_in_memory());

        let garbage = dir.path().join("garbage.wav");
        std::fs::write(&garbage, b"not audio").unwrap();
        assert!(matches!(
            manager.create_buffer("garbage", Some(&garbage), true),
            Err(AudioError::Decode(_))
        ));
    }

    #[test]
    fn test_data_promotes_to_retained() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav_i16(&path, 1, 8000, 800).unwrap();

        let (manager, _) = mock_manager("");
        let buffer = manager.create_buffer("a", Some(&path), false).unwrap();
        assert!(!buffer.retains_in_memory());

        let block = buffer.data().unwrap();
        assert!(buffer.retains_in_memory());
        assert_eq!(block.frequency(), 8000);
        assert_eq!(block.len(), 1600);
        assert_eq!(buffer.byte_size().unwrap(), 1600);

        // Reloading goes through the in-memory copy.
        assert!(buffer.unload(false));
        std::fs::remove_file(&path).unwrap();
        assert!(buffer.load());
        assert_eq!(buffer.data().unwrap(), block);
    }

    #[test]
    fn test_data_on_bound_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav_i16(&path, 1, 8000, 800).unwrap();

        let (manager, _) = mock_manager("");
        let buffer = manager.create_buffer("a", Some(&path), false).unwrap();
        let source = manager.create_source().unwrap();
        source.set_buffer(&buffer).unwrap();
        let id = buffer.id();

        // The device won't refresh an attached buffer, but the in-memory copy
        // is still handed out and kept.
        let block = buffer.data().unwrap();
        assert!(buffer.retains_in_memory());
        assert_eq!(buffer.id(), id);
        assert_eq!(source.buffer(), Some(buffer.clone()));
        assert_eq!(buffer.data().unwrap(), block);
    }

    #[test]
    fn test_retained_buffer_decodes_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav_i16(&path, 2, 8000, 100).unwrap();

        let (manager, _) = mock_manager("");
        let buffer = manager.create_buffer("a", Some(&path), true).unwrap();
        assert!(buffer.is_loaded());
        assert_eq!(buffer.data().unwrap().frame_count(), 100);
    }

    #[test]
    fn test_replace_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav_i16(&path, 1, 8000, 800).unwrap();

        let (manager, _) = mock_manager("");
        let buffer = manager.create_buffer("a", Some(&path), false).unwrap();
        let block = SampleBlock::new(
            vec![0u8; 400],
            SampleFormat::new(ChannelLayout::Stereo, SampleWidth::I16),
            22050,
        )
        .unwrap();

        buffer.replace_data(block.clone()).unwrap();
        assert!(buffer.retains_in_memory());
        assert_eq!(buffer.data().unwrap(), block);
        assert_eq!(buffer.frequency().unwrap(), 22050);
        assert_eq!(buffer.channel_count().unwrap(), 2);
        assert_eq!(buffer.sample_count().unwrap(), 100);
    }

    #[test]
    fn test_equality_uses_device_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav_i16(&path, 1, 8000, 80).unwrap();

        let (manager, _) = mock_manager("");
        let first = manager.create_buffer("same", Some(&path), false).unwrap();
        let second = manager.create_buffer("same", Some(&path), false).unwrap();
        assert_ne!(first, second);
        assert_eq!(first, first.clone());

        // Two unloaded buffers share the empty handle.
        assert!(first.unload(false));
        assert!(second.unload(false));
        assert_eq!(first, second);
    }

    #[test]
    fn test_destroy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav_i16(&path, 1, 8000, 80).unwrap();

        let (manager, device) = mock_manager(dir.path().to_str().unwrap());
        let standalone = manager.create_buffer("a", Some(&path), false).unwrap();
        let source = manager.create_source().unwrap();
        source.set_buffer(&standalone).unwrap();

        let handle = standalone.clone();
        standalone.destroy().unwrap();
        assert!(!handle.is_valid());
        assert!(source.buffer().is_none());

        let group = manager.create_buffer_group("sfx");
        assert!(group.add_buffer("a.wav"));
        let member = group.buffer("a.wav").unwrap();
        assert!(matches!(
            member.destroy(),
            Err(AudioError::NotStandalone(_))
        ));
        assert_eq!(device.buffer_count(), 0);
    }

    #[test]
    fn test_invalid_after_manager_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav_i16(&path, 1, 8000, 80).unwrap();

        let (manager, _) = mock_manager("");
        let buffer = manager.create_buffer("a", Some(&path), false).unwrap();
        drop(manager);

        assert!(!buffer.is_valid());
        assert_eq!(buffer.id(), NO_HANDLE);
        assert!(!buffer.load());
        assert!(matches!(buffer.try_load(), Err(AudioError::InvalidOwner)));
        assert!(matches!(buffer.data(), Err(AudioError::InvalidOwner)));
    }
}
