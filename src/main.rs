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
use std::error::Error;
use std::path::PathBuf;

use clap::{crate_version, Parser, Subcommand};
use serde::Serialize;
use soundbank::audio::{self, AudioBufferGroup, AudioManager};
use soundbank::config::Bank;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "Audio buffer and sound bank management."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decodes an audio file and prints its format.
    Inspect {
        /// The path to the audio file.
        path: String,
    },
    /// Loads a sound bank and prints a report of its groups and buffers.
    Load {
        /// The path to the sound bank config.
        bank_path: String,
    },
}

#[derive(Serialize)]
struct BankReport {
    device: Option<String>,
    failed: bool,
    max_sources: u32,
    groups: Vec<GroupReport>,
}

#[derive(Serialize)]
struct GroupReport {
    name: String,
    path_prefix: Option<String>,
    loaded: bool,
    buffers: Vec<BufferReport>,
}

#[derive(Serialize)]
struct BufferReport {
    file: String,
    id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channels: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bits_per_sample: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

impl GroupReport {
    fn new(group: &AudioBufferGroup) -> GroupReport {
        let buffers = group
            .file_keys()
            .into_iter()
            .map(|file| {
                let buffer = group.buffer(&file);
                BufferReport {
                    id: group.buffer_id(&file),
                    frequency: buffer.as_ref().and_then(|b| b.frequency().ok()),
                    channels: buffer.as_ref().and_then(|b| b.channel_count().ok()),
                    bits_per_sample: buffer.as_ref().and_then(|b| b.bits_per_sample().ok()),
                    duration_secs: buffer
                        .as_ref()
                        .and_then(|b| b.duration().ok())
                        .map(|d| d.as_secs_f64()),
                    file,
                }
            })
            .collect();

        GroupReport {
            name: group.name().to_string(),
            path_prefix: group.path_prefix(),
            loaded: group.is_loaded(),
            buffers,
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { path } => {
            let block = audio::decode(&path)?;
            println!("{}:", path);
            println!("  Format: {}", block.format());
            println!("  Frequency: {} Hz", block.frequency());
            println!("  Block size: {} bytes", block.block_size());
            println!("  Frames: {}", block.frame_count());
            println!("  Size: {} bytes", block.len());
            println!("  Duration: {:.3}s", block.duration().as_secs_f64());
        }
        Commands::Load { bank_path } => {
            let bank = Bank::deserialize(&PathBuf::from(&bank_path))?;
            let manager = AudioManager::from_bank(&bank);

            let report = BankReport {
                device: manager.device_name(),
                failed: manager.is_failed(),
                max_sources: manager.max_source_count(),
                groups: manager
                    .group_names()
                    .iter()
                    .map(|name| GroupReport::new(&manager.buffer_group(name, false).0))
                    .collect(),
            };
            print!("{}", serde_yml::to_string(&report)?);
        }
    }

    Ok(())
}
