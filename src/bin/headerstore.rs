// Copyright 2024. The Tari Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Thin CLI over the coordinator API, for operators and scripted end-to-end checks - the direct
//! analogue of driving `connect_chunk`/`height`/`get_checkpoints` from a shell instead of from a
//! network peer.

use std::{fs, path::PathBuf};

use clap::{Parser, Subcommand};
use xsh_headerstore::{config::HeaderStoreConfig, Coordinator};

#[derive(Parser)]
#[clap(name = "headerstore", about = "Header verifier and fork-aware header store")]
struct Cli {
    /// Path to a config file (TOML/YAML); falls back to defaults and HEADERSTORE_* env vars.
    #[clap(long, env = "HEADERSTORE_CONFIG")]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verifies and, on success, persists one 2016-header chunk onto the main chain.
    ConnectChunk {
        /// Zero-based chunk index.
        index: u64,
        /// Path to a file containing the chunk as a single hex string.
        hex_file: PathBuf,
    },
    /// Prints the main chain's current tip height.
    Status,
    /// Prints the `(hash, target, timestamp)` triple for every completed chunk.
    Checkpoints,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let config = HeaderStoreConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("failed to load configuration: {e}");
        std::process::exit(1);
    });

    let coordinator = Coordinator::open(config.headers_dir.clone(), config.network()).unwrap_or_else(|e| {
        eprintln!("failed to open headers directory {}: {e}", config.headers_dir.display());
        std::process::exit(1);
    });

    match cli.command {
        Command::ConnectChunk { index, hex_file } => {
            let hexdata = fs::read_to_string(&hex_file).unwrap_or_else(|e| {
                eprintln!("failed to read {}: {e}", hex_file.display());
                std::process::exit(1);
            });
            let main = coordinator.main_chain();
            let ok = coordinator.connect_chunk(&main, index, hexdata.trim());
            println!("{ok}");
            if !ok {
                std::process::exit(1);
            }
        },
        Command::Status => match coordinator.height() {
            Some(height) => println!("height: {height}"),
            None => println!("height: (empty)"),
        },
        Command::Checkpoints => {
            let main = coordinator.main_chain();
            match coordinator.get_checkpoints(&main) {
                Ok(checkpoints) => {
                    for (hash, target, timestamp) in checkpoints {
                        println!("{hash} {target:#x} {timestamp}");
                    }
                },
                Err(e) => {
                    eprintln!("failed to compute checkpoints: {e}");
                    std::process::exit(1);
                },
            }
        },
    }
}
