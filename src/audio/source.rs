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
    sync::{Arc, Weak},
};

use parking_lot::Mutex;
use tracing::debug;

use super::{
    buffer::AudioBuffer,
    error::AudioError,
    registry::{Registry, SourceKey},
    NO_HANDLE,
};

/// A playback slot bound to at most one buffer at a time.
///
/// The source owns its device copy: dropping it unbinds its buffer and deletes
/// the device source.
pub struct AudioSource {
    registry: Weak<Mutex<Registry>>,
    key: SourceKey,
}

/// Creates a new source on the manager's device.
pub(super) fn create(registry: &Arc<Mutex<Registry>>) -> Result<AudioSource, AudioError> {
    let key = registry.lock().create_source()?;
    Ok(AudioSource {
        registry: Arc::downgrade(registry),
        key,
    })
}

impl AudioSource {
    fn with_registry<T>(
        &self,
        f: impl FnOnce(&mut Registry) -> Result<T, AudioError>,
    ) -> Result<T, AudioError> {
        let registry = self.registry.upgrade().ok_or(AudioError::InvalidOwner)?;
        let mut registry = registry.lock();
        f(&mut registry)
    }

    /// Whether the source still exists in a live manager.
    pub fn is_valid(&self) -> bool {
        self.id() != NO_HANDLE
    }

    /// The device handle of the source, or 0 once its manager is gone.
    pub fn id(&self) -> u32 {
        self.with_registry(|registry| {
            registry
                .sources
                .get(self.key)
                .map(|source| source.device_id)
                .ok_or(AudioError::InvalidOwner)
        })
        .unwrap_or(NO_HANDLE)
    }

    /// Binds the source to a loaded buffer of the same manager, unbinding the
    /// buffer it was bound to before.
    pub fn set_buffer(&self, buffer: &AudioBuffer) -> Result<(), AudioError> {
        if !buffer.is_owned_by(&self.registry) {
            return Err(AudioError::ForeignBuffer);
        }

        self.with_registry(|registry| registry.attach_source(self.key, buffer.key()))
    }

    /// Unbinds the source from its buffer, if any. Returns false if the
    /// source's manager is gone.
    pub fn unset_buffer(&self) -> bool {
        let result = self.with_registry(|registry| {
            registry.detach_source(self.key, true);
            Ok(())
        });

        if let Err(e) = result {
            debug!(err = %e, "Unable to unset the source's buffer");
            return false;
        }
        true
    }

    /// The buffer the source is bound to.
    pub fn buffer(&self) -> Option<AudioBuffer> {
        self.with_registry(|registry| {
            Ok(registry
                .sources
                .get(self.key)
                .and_then(|source| source.buffer))
        })
        .ok()
        .flatten()
        .map(|key| AudioBuffer::new(self.registry.clone(), key))
    }

    pub fn play(&self) -> Result<(), AudioError> {
        self.with_registry(|registry| registry.play_source(self.key))
    }

    pub fn stop(&self) -> Result<(), AudioError> {
        self.with_registry(|registry| registry.stop_source(self.key))
    }

    pub fn is_playing(&self) -> bool {
        self.with_registry(|registry| Ok(registry.is_source_playing(self.key)))
            .unwrap_or(false)
    }
}

impl Drop for AudioSource {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().destroy_source(self.key);
        }
    }
}

impl fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSource")
            .field("id", &self.id())
            .field("buffer", &self.buffer())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::DeviceAttributes;
    use crate::testutil::{mock_manager, mock_manager_with, write_wav_i16};

    #[test]
    fn test_set_buffer_requires_loaded_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav_i16(&path, 1, 8000, 80).unwrap();

        let (manager, _) = mock_manager("");
        let buffer = manager.create_buffer("a", None, false).unwrap();
        let source = manager.create_source().unwrap();
        assert!(matches!(
            source.set_buffer(&buffer),
            Err(AudioError::NotLoaded(_))
        ));
        assert!(source.buffer().is_none());
        assert_eq!(buffer.referencing_source_count(), 0);
    }

    #[test]
    fn test_rebinding_moves_back_reference() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav_i16(&path, 1, 8000, 80).unwrap();

        let (manager, device) = mock_manager("");
        let first = manager.create_buffer("first", Some(&path), false).unwrap();
        let second = manager.create_buffer("second", Some(&path), false).unwrap();
        let source = manager.create_source().unwrap();

        source.set_buffer(&first).unwrap();
        assert_eq!(first.referencing_source_count(), 1);
        assert_eq!(device.source_buffer(source.id()), first.id());

        source.set_buffer(&second).unwrap();
        assert_eq!(first.referencing_source_count(), 0);
        assert_eq!(second.referencing_source_count(), 1);
        assert_eq!(source.buffer(), Some(second.clone()));
        assert_eq!(device.source_buffer(source.id()), second.id());

        assert!(source.unset_buffer());
        assert_eq!(second.referencing_source_count(), 0);
        assert!(source.buffer().is_none());
        assert_eq!(device.source_buffer(source.id()), NO_HANDLE);
    }

    #[test]
    fn test_drop_unbinds_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav_i16(&path, 1, 8000, 80).unwrap();

        let (manager, device) = mock_manager("");
        let buffer = manager.create_buffer("a", Some(&path), false).unwrap();
        {
            let source = manager.create_source().unwrap();
            source.set_buffer(&buffer).unwrap();
            assert_eq!(device.source_count(), 1);
        }

        assert_eq!(buffer.referencing_source_count(), 0);
        assert_eq!(device.source_count(), 0);
        assert!(buffer.unload(false));
    }

    #[test]
    fn test_foreign_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav_i16(&path, 1, 8000, 80).unwrap();

        let (first, _) = mock_manager("");
        let (second, _) = mock_manager("");
        let buffer = first.create_buffer("a", Some(&path), false).unwrap();
        let source = second.create_source().unwrap();
        assert!(matches!(
            source.set_buffer(&buffer),
            Err(AudioError::ForeignBuffer)
        ));
    }

    #[test]
    fn test_play_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav_i16(&path, 2, 8000, 80).unwrap();

        let (manager, _) = mock_manager("");
        let buffer = manager.create_buffer("a", Some(&path), false).unwrap();
        let source = manager.create_source().unwrap();
        source.set_buffer(&buffer).unwrap();

        source.play().unwrap();
        assert!(source.is_playing());
        source.stop().unwrap();
        assert!(!source.is_playing());
    }

    #[test]
    fn test_source_limit() {
        let (manager, _) = mock_manager_with(
            "",
            DeviceAttributes {
                mono_sources: Some(2),
                ..Default::default()
            },
        );
        assert_eq!(manager.max_source_count(), 2);

        let first = manager.create_source().unwrap();
        let _second = manager.create_source().unwrap();
        assert!(matches!(
            manager.create_source(),
            Err(AudioError::SourceLimit(2))
        ));

        drop(first);
        assert!(manager.create_source().is_ok());
    }

    #[test]
    fn test_invalid_after_manager_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav_i16(&path, 1, 8000, 80).unwrap();

        let (manager, device) = mock_manager("");
        let buffer = manager.create_buffer("a", Some(&path), false).unwrap();
        let source = manager.create_source().unwrap();
        source.set_buffer(&buffer).unwrap();
        drop(manager);

        // The manager released the device source when it went away.
        assert_eq!(device.source_count(), 0);
        assert!(!source.is_valid());
        assert!(source.buffer().is_none());
        assert!(matches!(source.play(), Err(AudioError::InvalidOwner)));
        assert!(matches!(
            source.set_buffer(&buffer),
            Err(AudioError::InvalidOwner)
        ));
        assert!(!source.unset_buffer());
    }
}
