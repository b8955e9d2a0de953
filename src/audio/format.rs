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

use std::{error::Error, fmt, str::FromStr};

/// Speaker layout of interleaved sample data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    Mono,
    Stereo,
    Rear,
    Quad,
    Surround51,
    Surround61,
    Surround71,
}

impl ChannelLayout {
    /// Maps a channel count onto a layout. Returns None for counts no layout covers.
    pub fn from_channel_count(channels: usize) -> Option<ChannelLayout> {
        match channels {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            4 => Some(ChannelLayout::Quad),
            6 => Some(ChannelLayout::Surround51),
            7 => Some(ChannelLayout::Surround61),
            8 => Some(ChannelLayout::Surround71),
            _ => None,
        }
    }

    /// Number of interleaved channels in this layout.
    pub fn channel_count(self) -> u16 {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo | ChannelLayout::Rear => 2,
            ChannelLayout::Quad => 4,
            ChannelLayout::Surround51 => 6,
            ChannelLayout::Surround61 => 7,
            ChannelLayout::Surround71 => 8,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ChannelLayout::Mono => "mono",
            ChannelLayout::Stereo => "stereo",
            ChannelLayout::Rear => "rear",
            ChannelLayout::Quad => "quad",
            ChannelLayout::Surround51 => "51chn",
            ChannelLayout::Surround61 => "61chn",
            ChannelLayout::Surround71 => "71chn",
        }
    }
}

/// Encoding of a single sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleWidth {
    /// Unsigned 8-bit.
    U8,
    /// Signed 16-bit little endian.
    I16,
    /// 32-bit float little endian.
    F32,
}

impl SampleWidth {
    /// Bits used by a single sample.
    pub fn bits(self) -> u16 {
        match self {
            SampleWidth::U8 => 8,
            SampleWidth::I16 => 16,
            SampleWidth::F32 => 32,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            SampleWidth::U8 => "8",
            SampleWidth::I16 => "16",
            SampleWidth::F32 => "32f",
        }
    }
}

/// The sample format tag carried alongside decoded audio data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleFormat {
    pub layout: ChannelLayout,
    pub width: SampleWidth,
}

impl SampleFormat {
    pub fn new(layout: ChannelLayout, width: SampleWidth) -> SampleFormat {
        SampleFormat { layout, width }
    }

    /// Size in bytes of one sample frame (one sample for every channel).
    pub fn block_size(self) -> u32 {
        u32::from(self.layout.channel_count()) * u32::from(self.width.bits() / 8)
    }

    pub fn channel_count(self) -> u16 {
        self.layout.channel_count()
    }

    pub fn bits_per_sample(self) -> u16 {
        self.width.bits()
    }
}

impl FromStr for SampleFormat {
    type Err = Box<dyn Error>;

    /// Parses names such as `mono16`, `stereo8` or `51chn32f`.
    fn from_str(s: &str) -> Result<Self, Box<dyn Error>> {
        let lower = s.to_ascii_lowercase();
        let layouts = [
            ChannelLayout::Mono,
            ChannelLayout::Stereo,
            ChannelLayout::Rear,
            ChannelLayout::Quad,
            ChannelLayout::Surround51,
            ChannelLayout::Surround61,
            ChannelLayout::Surround71,
        ];
        let widths = [SampleWidth::U8, SampleWidth::I16, SampleWidth::F32];

        for layout in layouts {
            if let Some(rest) = lower.strip_prefix(layout.as_str()) {
                for width in widths {
                    if rest == width.suffix() {
                        return Ok(SampleFormat::new(layout, width));
                    }
                }
            }
        }

        Err(format!("Unsupported sample format: {}", s).into())
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.layout.as_str(), self.width.suffix())
    }
}
