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
use serde::{Deserialize, Serialize};

use crate::audio::DeviceAttributes;

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Audio {
    /// The audio device. Names starting with "mock" select the mock device.
    device: String,

    /// Path prefix for buffer groups created without one.
    #[serde(default)]
    path_prefix: String,

    /// How many sources should support mono data.
    mono_sources: Option<u32>,

    /// How many sources should support stereo data.
    stereo_sources: Option<u32>,

    /// Mixing output frequency in Hz.
    frequency: Option<u32>,

    /// Refresh interval in Hz.
    refresh: Option<u32>,

    /// Whether the device context should be synchronous.
    sync: Option<bool>,
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            path_prefix: String::new(),
            mono_sources: None,
            stereo_sources: None,
            frequency: None,
            refresh: None,
            sync: None,
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the default path prefix for buffer groups.
    pub fn path_prefix(&self) -> &str {
        &self.path_prefix
    }

    /// Returns the attribute hints to open the device with. Unset hints leave
    /// the choice to the driver.
    pub fn attributes(&self) -> DeviceAttributes {
        DeviceAttributes {
            mono_sources: self.mono_sources,
            stereo_sources: self.stereo_sources,
            frequency: self.frequency,
            refresh: self.refresh,
            sync: self.sync,
        }
    }
}
