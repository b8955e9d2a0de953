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
use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};
use tracing::{debug, error};

use super::error::DecodeError;
use super::{file_exists, SampleBlock};
use crate::audio::format::{ChannelLayout, SampleFormat, SampleWidth};

/// Decodes the audio file at `path` into signed 16-bit interleaved samples.
///
/// Supports every container and codec symphonia was built with. Failures are
/// logged and returned; there are no retries.
pub fn decode<P: AsRef<Path>>(path: P) -> Result<SampleBlock, DecodeError> {
    let path = path.as_ref();
    let result = decode_file(path);

    match &result {
        Ok(block) => debug!(
            path = ?path,
            format = %block.format(),
            frequency = block.frequency(),
            bytes = block.len(),
            "Decoded audio file"
        ),
        Err(e) => error!(path = ?path, err = %e, "Failed to decode audio file"),
    }

    result
}

fn decode_file(path: &Path) -> Result<SampleBlock, DecodeError> {
    if !file_exists(path, false) {
        return Err(DecodeError::NotFound(path.to_path_buf()));
    }

    let file = File::open(path).map_err(|e| unreadable(path, SymphoniaError::IoError(e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Create a hint to help the format registry guess the format
    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| match e {
            SymphoniaError::Unsupported(_) => DecodeError::NoFormat(path.to_path_buf()),
            e => unreadable(path, e),
        })?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::NoFormat(path.to_path_buf()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let mut decoder = get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| match e {
            SymphoniaError::Unsupported(_) => DecodeError::NoFormat(path.to_path_buf()),
            e => unreadable(path, e),
        })?;

    // Some containers don't declare their channels; those are resolved from the
    // first decoded packet instead.
    let mut format = match params.channels {
        Some(channels) => Some(sample_format_for(path, channels.count())?),
        None => None,
    };

    let frequency = params.sample_rate.unwrap_or(0);
    if frequency == 0 {
        return Err(DecodeError::InvalidFrequency(path.to_path_buf()));
    }

    let mut data: Vec<u8> = Vec::new();
    let mut sample_buffer: Option<SampleBuffer<i16>> = None;

    loop {
        let packet = match format_reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(unreadable(path, e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(path = ?path, err = e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(unreadable(path, e)),
        };

        if decoded.frames() == 0 {
            continue;
        }

        let spec = *decoded.spec();
        let block_format = match format {
            Some(format) => format,
            None => {
                let detected = sample_format_for(path, spec.channels.count())?;
                format = Some(detected);
                detected
            }
        };

        let required = decoded.capacity() * spec.channels.count();
        let buffer = match sample_buffer.take() {
            Some(buffer) if buffer.capacity() >= required => sample_buffer.insert(buffer),
            _ => sample_buffer.insert(SampleBuffer::<i16>::new(decoded.capacity() as u64, spec)),
        };
        buffer.copy_interleaved_ref(decoded);

        let samples = buffer.samples();
        let incoming = samples.len() * std::mem::size_of::<i16>();
        if data.capacity() - data.len() < incoming {
            // Grow geometrically, starting from one second of audio.
            let one_second = frequency as usize * block_format.block_size() as usize;
            data.reserve(incoming.max(data.capacity()).max(one_second));
        }
        for sample in samples {
            data.extend_from_slice(&sample.to_le_bytes());
        }
    }

    let format = format.ok_or_else(|| DecodeError::NoFormat(path.to_path_buf()))?;

    // SampleBlock::new drops any trailing partial frame.
    SampleBlock::new(data, format, frequency)
        .ok_or_else(|| DecodeError::InvalidFrequency(path.to_path_buf()))
}

/// Resolves the output format for the given channel count.
fn sample_format_for(path: &Path, channels: usize) -> Result<SampleFormat, DecodeError> {
    if channels == 0 {
        return Err(DecodeError::InvalidBlockSize(path.to_path_buf()));
    }

    let layout = ChannelLayout::from_channel_count(channels)
        .ok_or_else(|| DecodeError::NoFormat(path.to_path_buf()))?;

    Ok(SampleFormat::new(layout, SampleWidth::I16))
}

fn unreadable(path: &Path, source: SymphoniaError) -> DecodeError {
    DecodeError::Unreadable {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_wav_i16;

    #[test]
    fn test_decode_stereo_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav_i16(&path, 2, 44100, 4410).unwrap();

        let block = decode(&path).unwrap();
        assert_eq!(
            block.format(),
            SampleFormat::new(ChannelLayout::Stereo, SampleWidth::I16)
        );
        assert_eq!(block.frequency(), 44100);
        assert_eq!(block.block_size(), 4);
        assert_eq!(block.frame_count(), 4410);
        assert_eq!(block.len() % block.block_size() as usize, 0);
    }

    #[test]
    fn test_decode_mono_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_wav_i16(&path, 1, 22050, 1000).unwrap();

        let block = decode(&path).unwrap();
        assert_eq!(block.format().channel_count(), 1);
        assert_eq!(block.frequency(), 22050);
        assert_eq!(block.len(), 2000);
    }

    #[test]
    fn test_decode_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = decode(dir.path().join("missing.wav"));
        assert!(matches!(result, Err(DecodeError::NotFound(_))));
    }

    #[test]
    fn test_decode_unrecognized_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"this is definitely not audio data").unwrap();

        let result = decode(&path);
        assert!(matches!(result, Err(DecodeError::NoFormat(_))));
    }

    #[test]
    fn test_sample_format_for() {
        let path = Path::new("x.wav");
        assert!(matches!(
            sample_format_for(path, 0),
            Err(DecodeError::InvalidBlockSize(_))
        ));
        assert!(matches!(
            sample_format_for(path, 3),
            Err(DecodeError::NoFormat(_))
        ));
        assert_eq!(sample_format_for(path, 6).unwrap().block_size(), 12);
    }
}
