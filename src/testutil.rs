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
use std::{error::Error, f32::consts::PI, fs::File, path::Path};

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::audio::{mock, AudioManager, DeviceAttributes};

/// Creates a manager on a fresh mock device. The returned device shares its
/// state with the one the manager owns.
pub fn mock_manager(path_prefix: &str) -> (AudioManager, mock::Device) {
    mock_manager_with(path_prefix, DeviceAttributes::default())
}

/// Creates a manager on a fresh mock device opened with the given attributes.
pub fn mock_manager_with(
    path_prefix: &str,
    attributes: DeviceAttributes,
) -> (AudioManager, mock::Device) {
    let device = mock::Device::open("mock", &attributes).unwrap();
    let manager = AudioManager::with_device(Box::new(device.clone()), path_prefix);
    (manager, device)
}

/// Writes a 16-bit PCM wav file containing a 440Hz sine wave on every channel.
pub fn write_wav_i16<P: AsRef<Path>>(
    path: P,
    channels: u16,
    sample_rate: u32,
    frames: usize,
) -> Result<(), Box<dyn Error>> {
    let tempwav = File::create(path.as_ref())?;
    let mut writer = WavWriter::new(
        tempwav,
        WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        },
    )?;

    for frame in 0..frames {
        let t = frame as f32 / sample_rate as f32;
        let sample = ((2.0 * PI * 440.0 * t).sin() * i16::MAX as f32 * 0.5) as i16;
        for _ in 0..channels {
            writer.write_sample(sample)?;
        }
    }

    writer.finalize()?;
    Ok(())
}
