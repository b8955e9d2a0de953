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
use std::collections::HashSet;
use std::path::Path;

use config::{Config, File};
use serde::{Deserialize, Serialize};

use super::audio::Audio;
use super::error::ConfigError;

/// A sound bank: the audio device plus the buffer groups to create on it.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Bank {
    /// The audio configuration.
    audio: Audio,

    /// The buffer groups to create.
    #[serde(default)]
    groups: Vec<Group>,
}

/// A YAML representation of a buffer group.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Group {
    /// The name of the group.
    name: String,

    /// Path prefix for the group's files. Defaults to the audio path prefix.
    path_prefix: Option<String>,

    /// Files to add, relative to the path prefix.
    #[serde(default)]
    files: Vec<String>,

    /// Whether to load the group right away.
    #[serde(default)]
    load: bool,
}

impl Bank {
    /// Creates a new bank configuration.
    pub fn new(audio: Audio, groups: Vec<Group>) -> Bank {
        Bank { audio, groups }
    }

    /// Parse a bank from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Bank, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let bank = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Bank>()?;
        bank.validate()?;
        Ok(bank)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for group in self.groups.iter() {
            if !names.insert(group.name()) {
                return Err(ConfigError::DuplicateGroup(group.name.clone()));
            }
        }
        Ok(())
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }
}

impl Group {
    /// Creates a new group configuration.
    pub fn new(name: &str, path_prefix: Option<&str>, files: &[String], load: bool) -> Group {
        Group {
            name: name.to_string(),
            path_prefix: path_prefix.map(str::to_string),
            files: files.to_owned(),
            load,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path_prefix(&self) -> Option<&str> {
        self.path_prefix.as_deref()
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn load(&self) -> bool {
        self.load
    }
}

#[cfg(test)]
mod tests {
    use config::FileFormat;

    use super::*;
    use crate::audio::{AudioManager, NO_HANDLE};
    use crate::testutil::write_wav_i16;

    fn parse(yaml: &str) -> Bank {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_parse() {
        let bank = parse(
            r#"
            audio:
              device: mock
              path_prefix: sounds
            groups:
              - name: music
                path_prefix: sounds/music
                files:
                  - intro.ogg
                  - theme.flac
                load: true
              - name: sfx
            "#,
        );

        assert_eq!(bank.audio().device(), "mock");
        assert_eq!(bank.groups().len(), 2);

        let music = &bank.groups()[0];
        assert_eq!(music.name(), "music");
        assert_eq!(music.path_prefix(), Some("sounds/music"));
        assert_eq!(
            music.files(),
            &["intro.ogg".to_string(), "theme.flac".to_string()]
        );
        assert!(music.load());

        let sfx = &bank.groups()[1];
        assert_eq!(sfx.path_prefix(), None);
        assert!(sfx.files().is_empty());
        assert!(!sfx.load());
    }

    #[test]
    fn test_deserialize_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.yaml");
        std::fs::write(
            &path,
            "audio:\n  device: mock\ngroups:\n  - name: sfx\n    files: [a.wav]\n",
        )
        .unwrap();

        let bank = Bank::deserialize(&path).unwrap();
        assert_eq!(bank.groups()[0].files(), &["a.wav".to_string()]);

        assert!(matches!(
            Bank::deserialize(&dir.path().join("missing.yaml")),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_groups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bank.yaml");
        std::fs::write(
            &path,
            "audio:\n  device: mock\ngroups:\n  - name: sfx\n  - name: sfx\n",
        )
        .unwrap();

        assert!(matches!(
            Bank::deserialize(&path),
            Err(ConfigError::DuplicateGroup(name)) if name == "sfx"
        ));
    }

    #[test]
    fn test_manager_from_bank() {
        let dir = tempfile::tempdir().unwrap();
        let music = dir.path().join("music");
        std::fs::create_dir(&music).unwrap();
        write_wav_i16(music.join("theme.wav"), 2, 8000, 80).unwrap();
        write_wav_i16(dir.path().join("click.wav"), 1, 8000, 80).unwrap();

        let bank = parse(&format!(
            r#"
            audio:
              device: mock
              path_prefix: "{}"
            groups:
              - name: music
                path_prefix: "{}"
                files: [theme.wav]
                load: true
              - name: sfx
                files: [click.wav]
            "#,
            dir.path().display(),
            music.display()
        ));

        let manager = AudioManager::from_bank(&bank);
        assert!(!manager.is_failed());
        assert_eq!(manager.group_names(), vec!["default", "music", "sfx"]);

        let (music, found) = manager.buffer_group("music", false);
        assert!(found);
        assert!(music.is_loaded());
        assert_ne!(music.buffer_id("theme.wav"), NO_HANDLE);

        let (sfx, _) = manager.buffer_group("sfx", false);
        assert!(!sfx.is_loaded());
        assert_eq!(sfx.len(), 1);
        assert_eq!(sfx.buffer_id("click.wav"), NO_HANDLE);
    }
}
