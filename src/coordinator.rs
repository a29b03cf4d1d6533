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

//! Entry points used by the network collaborator: `check_header`, `can_connect`,
//! `connect_chunk`, `get_checkpoints`, `height`. Owns the fork registry and the compiled-in
//! checkpoint table; nothing below this module knows about the network.

use std::sync::Arc;

use log::{error, warn};

use crate::{
    chain_store::{Chain, ParentLookup},
    checkpoints::{CheckpointTable, GENESIS_HEX, CHUNK_SIZE},
    error::HeaderStoreError,
    fork_manager::ForkManager,
    hash::Hash256,
    header::Header,
    pow,
    target::{required_target, ChunkView, HeightSource, Network},
    verifier::verify_chunk,
};

pub struct Coordinator {
    manager: ForkManager,
    checkpoints: CheckpointTable,
    network: Network,
}

/// Adapts a single [`Chain`] (plus the registry, for parent delegation) into the
/// [`HeightSource`] the target engine reads ancestors through.
struct ChainHeightSource<'a> {
    chain: &'a Chain,
    registry: &'a dyn ParentLookup,
}

impl<'a> HeightSource for ChainHeightSource<'a> {
    fn header_at(&self, height: u64) -> Result<Option<Header>, HeaderStoreError> {
        self.chain.read_header(height, self.registry)
    }
}

impl Coordinator {
    pub fn open(headers_dir: std::path::PathBuf, network: Network) -> Result<Self, HeaderStoreError> {
        Self::with_checkpoints(headers_dir, network, CheckpointTable::compiled())
    }

    /// Like [`Coordinator::open`], but with an explicitly supplied checkpoint table instead of
    /// the one compiled into this build. Exists mainly so tests can exercise heights that would
    /// otherwise fall into the legacy retarget's bootstrap region without needing thousands of
    /// real headers on disk.
    pub fn with_checkpoints(
        headers_dir: std::path::PathBuf,
        network: Network,
        checkpoints: CheckpointTable,
    ) -> Result<Self, HeaderStoreError> {
        let manager = ForkManager::discover(headers_dir)?;
        Ok(Coordinator {
            manager,
            checkpoints,
            network,
        })
    }

    pub fn main_chain(&self) -> Arc<Chain> {
        self.manager.main()
    }

    pub fn fork_manager(&self) -> &ForkManager {
        &self.manager
    }

    /// Current tip height of the main chain, or `None` if no headers have been stored yet.
    pub fn height(&self) -> Option<u64> {
        self.manager.main().height()
    }

    /// Returns whichever chain's hash at `header.height` matches `hash_header(header)`, if any.
    pub fn check_header(&self, header: &Header) -> Option<Arc<Chain>> {
        let target_hash = pow::hash_header(header);
        for chain in self.manager.chains() {
            if let Ok(hash) = chain.get_hash(header.height as i64, &self.checkpoints, &self.manager) {
                if hash == target_hash {
                    return Some(chain);
                }
            }
        }
        None
    }

    /// Returns whichever chain `header` can extend: its tip is `header.height - 1` (when
    /// `check_height` is set) and its hash at that height matches `header.prev_block_hash` - or,
    /// for the genesis special case, `hash_header(header)` equals the compiled-in genesis hash.
    pub fn can_connect(&self, header: &Header, check_height: bool) -> Option<Arc<Chain>> {
        for chain in self.manager.chains() {
            if self.chain_can_connect(&chain, header, check_height) {
                return Some(chain);
            }
        }
        None
    }

    fn chain_can_connect(&self, chain: &Chain, header: &Header, check_height: bool) -> bool {
        if check_height && chain.height() != Some(header.height.wrapping_sub(1)) {
            return false;
        }
        if header.height == 0 {
            return pow::hash_header(header).to_hex() == GENESIS_HEX;
        }
        match chain.get_hash(header.height as i64 - 1, &self.checkpoints, &self.manager) {
            Ok(hash) => hash == header.prev_block_hash,
            Err(_) => false,
        }
    }

    /// Decodes, verifies, and (only on success) persists a chunk of headers onto `chain`. Any
    /// failure anywhere in this pipeline leaves the chain's on-disk bytes untouched and returns
    /// `false`; [`HeaderStoreError::StateLost`] is additionally logged at `error!` level since
    /// it indicates the headers directory vanished out from under a running process.
    pub fn connect_chunk(&self, chain: &Arc<Chain>, idx: u64, hexdata: &str) -> bool {
        match self.try_connect_chunk(chain, idx, hexdata) {
            Ok(()) => true,
            Err(HeaderStoreError::StateLost) => {
                error!("headers directory lost while connecting chunk {idx}");
                false
            },
            Err(e) => {
                warn!("verify_chunk {idx} failed: {e}");
                false
            },
        }
    }

    fn try_connect_chunk(&self, chain: &Arc<Chain>, idx: u64, hexdata: &str) -> Result<(), HeaderStoreError> {
        let data = hex::decode(hexdata).map_err(|e| HeaderStoreError::Decode(e.to_string()))?;
        let prev_height = idx as i64 * CHUNK_SIZE as i64 - 1;
        let prev_hash = chain.get_hash(prev_height, &self.checkpoints, &self.manager)?;
        let height_source = ChainHeightSource {
            chain,
            registry: &self.manager,
        };
        verify_chunk(&data, idx, prev_hash, &height_source, &self.checkpoints, self.network)?;
        chain.save_chunk(idx, &data, &self.checkpoints)?;
        self.manager.swap_with_parent(chain.checkpoint())?;
        Ok(())
    }

    /// Creates a new fork rooted at `header.height`, branching off `parent`.
    pub fn fork(&self, parent: &Arc<Chain>, header: &Header) -> Result<Arc<Chain>, HeaderStoreError> {
        self.manager.fork(parent, header)
    }

    /// One `(hash, target, timestamp)` triple per completed chunk below `chain`'s current
    /// height, matching the reference client's own `get_checkpoints`.
    pub fn get_checkpoints(&self, chain: &Chain) -> Result<Vec<(Hash256, primitive_types::U256, u32)>, HeaderStoreError> {
        let height = match chain.height() {
            Some(h) => h,
            None => return Ok(Vec::new()),
        };
        let n = height / CHUNK_SIZE;
        let mut out = Vec::with_capacity(n as usize);
        let height_source = ChainHeightSource {
            chain,
            registry: &self.manager,
        };
        for index in 0..n {
            let boundary_height = (index + 1) * CHUNK_SIZE - 1;
            let hash = chain.get_hash(boundary_height as i64, &self.checkpoints, &self.manager)?;
            // `chunk_index: index + 1` (not `index`) keeps `boundary_height` strictly below this
            // view's `chunk_start`, so `ChunkView::header_at` always falls through to the chain
            // store instead of indexing into the empty `chunk_data` buffer.
            let view = ChunkView {
                chunk_data: &[],
                chunk_index: index + 1,
                fallback: &height_source,
                checkpoints: &self.checkpoints,
            };
            let target = required_target(&view, boundary_height, self.network)?;
            let timestamp = chain
                .read_header(boundary_height, &self.manager)?
                .map(|h| h.timestamp)
                .ok_or(HeaderStoreError::MissingHeader(boundary_height))?;
            out.push((hash, target, timestamp));
        }
        Ok(out)
    }
}
