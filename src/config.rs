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

//! The configuration collaborator the spec treats as opaque: a key-value store that, for this
//! crate's purposes, exposes exactly one setting worth naming - the headers directory - plus
//! the network selection. Layered the way the teacher layers `config::Config`: defaults, then an
//! optional file, then environment overrides.

use std::path::PathBuf;

use serde::Deserialize;

use crate::{error::HeaderStoreError, target::Network};

const ENV_PREFIX: &str = "HEADERSTORE";

#[derive(Debug, Clone, Deserialize)]
pub struct HeaderStoreConfig {
    /// Directory containing `blockchain_headers` and `forks/`.
    pub headers_dir: PathBuf,
    /// `"mainnet"` or `"testnet"`.
    #[serde(default = "default_network")]
    network: String,
}

fn default_network() -> String {
    "mainnet".to_string()
}

impl HeaderStoreConfig {
    pub fn network(&self) -> Network {
        if self.network.eq_ignore_ascii_case("testnet") {
            Network::Testnet
        } else {
            Network::Mainnet
        }
    }

    /// Loads configuration from (in ascending priority) compiled-in defaults, an optional
    /// `config.toml`/`config.yaml` at `config_path`, and `HEADERSTORE_*` environment variables.
    pub fn load(config_path: Option<&std::path::Path>) -> Result<Self, HeaderStoreError> {
        let mut builder = config::Config::builder()
            .set_default("headers_dir", "./headers")
            .map_err(config_err)?
            .set_default("network", default_network())
            .map_err(config_err)?;

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"));

        let raw = builder.build().map_err(config_err)?;
        raw.try_deserialize().map_err(config_err)
    }
}

fn config_err(e: config::ConfigError) -> HeaderStoreError {
    HeaderStoreError::Decode(format!("config error: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_defaults_to_mainnet() {
        let cfg = HeaderStoreConfig {
            headers_dir: PathBuf::from("./headers"),
            network: default_network(),
        };
        assert_eq!(cfg.network(), Network::Mainnet);
    }

    #[test]
    fn network_parses_testnet_case_insensitively() {
        let cfg = HeaderStoreConfig {
            headers_dir: PathBuf::from("./headers"),
            network: "TestNet".to_string(),
        };
        assert_eq!(cfg.network(), Network::Testnet);
    }
}
