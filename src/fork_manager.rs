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

//! Registry of chains keyed by fork checkpoint: discovery at startup, fork creation, and
//! parent/child promotion (swap). Owns the registry-wide lock that `swap_with_parent` requires
//! on top of each chain's own mutex.

use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::PathBuf,
    sync::{Arc, Mutex},
};

use log::{info, warn};

use crate::{
    chain_store::{Chain, ParentLookup},
    checkpoints::CheckpointTable,
    error::HeaderStoreError,
    header::{Header, HEADER_SIZE},
};

/// Owns every [`Chain`] in the process, keyed by its current `checkpoint`. Always contains key
/// `0` (the main chain). Lock order for cross-chain operations: this registry lock, then child,
/// then parent, then any other chain touched, always taken in ascending checkpoint order, to
/// avoid lock-order cycles.
pub struct ForkManager {
    headers_dir: PathBuf,
    chains: Mutex<HashMap<u64, Arc<Chain>>>,
}

impl ParentLookup for ForkManager {
    fn parent_of(&self, parent_id: u64) -> Option<Arc<Chain>> {
        self.chains.lock().expect("registry mutex poisoned").get(&parent_id).cloned()
    }
}

impl ForkManager {
    /// Opens the main chain and scans `<headers_dir>/forks/` for sibling fork files, admitting
    /// each one only if it can connect to its claimed parent at its checkpoint height -
    /// mirroring the startup scan that builds the chain registry from whatever is on disk.
    pub fn discover(headers_dir: PathBuf) -> Result<Self, HeaderStoreError> {
        fs::create_dir_all(&headers_dir)?;
        let forks_dir = headers_dir.join("forks");
        fs::create_dir_all(&forks_dir)?;

        let main = Arc::new(Chain::open_main(headers_dir.clone())?);
        let mut chains = HashMap::new();
        chains.insert(0u64, main);

        let mut candidates: Vec<(u64, u64, String)> = Vec::new();
        for entry in fs::read_dir(&forks_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some((parent_id, checkpoint)) = parse_fork_filename(&name) {
                candidates.push((parent_id, checkpoint, name));
            }
        }
        candidates.sort_by_key(|(parent_id, _, _)| *parent_id);

        let manager = ForkManager {
            headers_dir,
            chains: Mutex::new(chains),
        };

        for (parent_id, checkpoint, name) in candidates {
            let chain = Chain::open_fork(manager.headers_dir.clone(), parent_id, checkpoint)?;
            let first_header = chain.read_header(checkpoint, &manager)?;
            let admitted = match (&first_header, manager.get(parent_id)) {
                (Some(h), Some(parent)) => can_connect(&*parent, h, false, &manager)?,
                _ => false,
            };
            if admitted {
                manager
                    .chains
                    .lock()
                    .expect("registry mutex poisoned")
                    .insert(checkpoint, Arc::new(chain));
            } else {
                warn!("cannot connect fork file {name}, skipping");
            }
        }

        Ok(manager)
    }

    pub fn get(&self, checkpoint: u64) -> Option<Arc<Chain>> {
        self.chains.lock().expect("registry mutex poisoned").get(&checkpoint).cloned()
    }

    pub fn main(&self) -> Arc<Chain> {
        self.get(0).expect("registry always contains the main chain")
    }

    pub fn chains(&self) -> Vec<Arc<Chain>> {
        self.chains.lock().expect("registry mutex poisoned").values().cloned().collect()
    }

    /// Creates a new fork chain rooted at `header.height`, off `parent`, and saves `header` as
    /// its first entry. As with any `save_header`, this checks for an immediate swap - harmless
    /// here since a brand-new one-header fork essentially never already exceeds its parent's
    /// branch length, but kept for parity with the reference client's `save_header` always
    /// ending in a swap check.
    pub fn fork(&self, parent: &Arc<Chain>, header: &Header) -> Result<Arc<Chain>, HeaderStoreError> {
        let checkpoint = header.height;
        let chain = Chain::create_fork(self.headers_dir.clone(), parent.checkpoint(), checkpoint)?;
        chain.save_header(header)?;
        let chain = Arc::new(chain);
        self.chains
            .lock()
            .expect("registry mutex poisoned")
            .insert(checkpoint, chain.clone());
        self.swap_with_parent(checkpoint)?;
        Ok(chain)
    }

    /// `get_max_child`: the checkpoint of the longest-running direct fork off `chain`, if any.
    pub fn max_child(&self, chain: &Chain) -> Option<u64> {
        let checkpoint = chain.checkpoint();
        self.chains
            .lock()
            .expect("registry mutex poisoned")
            .values()
            .filter(|c| c.parent_id() == Some(checkpoint))
            .map(|c| c.checkpoint())
            .max()
    }

    /// `get_checkpoint`: the height at which `chain`'s visible branch actually starts once its
    /// longest child (if any) is taken into account.
    pub fn effective_checkpoint(&self, chain: &Chain) -> u64 {
        self.max_child(chain).unwrap_or_else(|| chain.checkpoint())
    }

    /// `get_branch_size`: number of headers from `effective_checkpoint` to `chain`'s tip.
    pub fn branch_size(&self, chain: &Chain) -> Option<u64> {
        let height = chain.height()?;
        Some(height - self.effective_checkpoint(chain) + 1)
    }

    /// `get_name`: a short display label derived from the hash at `effective_checkpoint`,
    /// stripped of leading zero nibbles the way the reference client's `lstrip('00')` does and
    /// truncated to 10 hex characters.
    pub fn display_name(&self, chain: &Chain, checkpoints: &CheckpointTable) -> Result<String, HeaderStoreError> {
        let height = self.effective_checkpoint(chain);
        let hash = chain.get_hash(height as i64, checkpoints, self)?;
        let hex = hash.to_hex();
        let trimmed = hex.trim_start_matches('0');
        Ok(trimmed.chars().take(10).collect())
    }

    /// Promotes `child` over its parent once the child's header count exceeds the parent's
    /// branch length measured from the fork point, performing the multi-file swap: the parent's
    /// overtaken slice becomes the (now-demoted) parent's file, the challenger's full history
    /// becomes the new main-line file, and every sibling whose path encodes the swapped
    /// `(parent_id, checkpoint)` pair is renamed to match. Registry keys are re-bound last so
    /// they always equal each chain's current checkpoint.
    pub fn swap_with_parent(&self, child_checkpoint: u64) -> Result<(), HeaderStoreError> {
        let chains = self.chains.lock().expect("registry mutex poisoned");
        let child = chains
            .get(&child_checkpoint)
            .cloned()
            .ok_or(HeaderStoreError::UnknownChain(child_checkpoint))?;
        let parent_id = match child.parent_id() {
            Some(id) => id,
            None => return Ok(()),
        };
        let parent = chains
            .get(&parent_id)
            .cloned()
            .ok_or(HeaderStoreError::UnknownChain(parent_id))?;
        drop(chains);

        let (checkpoint, parent_checkpoint) = (child.checkpoint(), parent.checkpoint());
        let parent_height = match parent.height() {
            Some(h) => h,
            None => return Ok(()),
        };
        let parent_branch_size = parent_height - checkpoint + 1;
        if parent_branch_size >= child.size() {
            return Ok(());
        }

        info!("swapping chain at checkpoint {checkpoint} over parent {parent_id}");

        let old_paths: Vec<(u64, PathBuf)> = self
            .chains
            .lock()
            .expect("registry mutex poisoned")
            .iter()
            .map(|(cp, c)| (*cp, c.path()))
            .collect();

        let child_data = fs::read(child.path())?;

        let parent_offset = (checkpoint - parent_checkpoint) * HEADER_SIZE as u64;
        let parent_slice_len = parent_branch_size * HEADER_SIZE as u64;
        let mut parent_file = File::open(parent.path())?;
        parent_file.seek(SeekFrom::Start(parent_offset))?;
        let mut parent_slice = vec![0u8; parent_slice_len as usize];
        parent_file.read_exact(&mut parent_slice)?;
        drop(parent_file);

        fs::write(child.path(), &parent_slice)?;

        let mut parent_file = OpenOptions::new().write(true).open(parent.path())?;
        parent_file.seek(SeekFrom::Start(parent_offset))?;
        parent_file.write_all(&child_data)?;
        let new_main_len = parent_offset + child_data.len() as u64;
        parent_file.set_len(new_main_len)?;
        parent_file.sync_all()?;

        // `child`'s file (at its pre-swap path) now holds the demoted branch slice;
        // `parent`'s file (at its pre-swap path, i.e. the un-renamed main/ancestor file) now
        // holds the merged, longer chain. Swapping the metadata below makes each object's
        // `path()` re-derive to exactly where its data now lives, so no rename of the two
        // swapped files themselves is needed - only of any *other* chain whose path depends on
        // this pair (handled below).
        {
            let mut child_state = child.lock();
            let mut parent_state = parent.lock();
            std::mem::swap(&mut child_state.parent_id, &mut parent_state.parent_id);
            std::mem::swap(&mut child_state.checkpoint, &mut parent_state.checkpoint);
            child_state.size = new_main_len / HEADER_SIZE as u64;
            parent_state.size = parent_branch_size;
        }

        let mut chains = self.chains.lock().expect("registry mutex poisoned");
        for (old_checkpoint, old_path) in old_paths {
            if old_checkpoint == child_checkpoint || old_checkpoint == parent_id {
                continue;
            }
            if let Some(sibling) = chains.get(&old_checkpoint) {
                let new_path = sibling.path();
                if new_path != old_path {
                    info!("renaming {} to {}", old_path.display(), new_path.display());
                    if let Some(dir) = new_path.parent() {
                        fs::create_dir_all(dir)?;
                    }
                    fs::rename(&old_path, &new_path)?;
                }
            }
        }

        chains.remove(&child_checkpoint);
        chains.remove(&parent_id);
        chains.insert(child.checkpoint(), child.clone());
        chains.insert(parent.checkpoint(), parent.clone());
        Ok(())
    }
}

/// `can_connect`, duplicated here (rather than imported from the coordinator) because discovery
/// runs before a [`crate::coordinator::Coordinator`] exists to call it on.
fn can_connect(chain: &Chain, header: &Header, check_height: bool, registry: &dyn ParentLookup) -> Result<bool, HeaderStoreError> {
    if check_height && chain.height() != Some(header.height.wrapping_sub(1)) {
        return Ok(false);
    }
    if header.height == 0 {
        return Ok(crate::pow::hash_header(header).to_hex() == crate::checkpoints::GENESIS_HEX);
    }
    let checkpoints = CheckpointTable::compiled();
    let prev_hash = match chain.get_hash(header.height as i64 - 1, &checkpoints, registry) {
        Ok(hash) => hash,
        Err(_) => return Ok(false),
    };
    Ok(prev_hash == header.prev_block_hash)
}

/// Parses `fork_<parent_id>_<checkpoint>` into its two integer components.
fn parse_fork_filename(name: &str) -> Option<(u64, u64)> {
    let rest = name.strip_prefix("fork_")?;
    let mut parts = rest.splitn(2, '_');
    let parent_id: u64 = parts.next()?.parse().ok()?;
    let checkpoint: u64 = parts.next()?.parse().ok()?;
    Some((parent_id, checkpoint))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::hash::Hash256;

    fn header(height: u64, prev: Hash256) -> Header {
        Header {
            version: 1 << 11,
            prev_block_hash: prev,
            merkle_root: Hash256::ZERO,
            timestamp: 1000 + height as u32 * 225,
            bits: 0x1e0f_ffff,
            nonce: 0,
            height,
        }
    }

    #[test]
    fn parses_fork_filenames() {
        assert_eq!(parse_fork_filename("fork_0_1500"), Some((0, 1500)));
        assert_eq!(parse_fork_filename("fork_1500_1600"), Some((1500, 1600)));
        assert_eq!(parse_fork_filename("blockchain_headers"), None);
    }

    #[test]
    fn fork_creates_new_chain_at_header_height() {
        let dir = tempdir().unwrap();
        let manager = ForkManager::discover(dir.path().to_path_buf()).unwrap();
        let main = manager.main();
        main.save_header(&header(0, Hash256::ZERO)).unwrap();
        let fork_header = header(1, crate::pow::hash_header(&header(0, Hash256::ZERO)));
        let fork = manager.fork(&main, &fork_header).unwrap();
        assert_eq!(fork.checkpoint(), 1);
        assert_eq!(fork.parent_id(), Some(0));
        assert_eq!(fork.size(), 1);
    }

    #[test]
    fn swap_promotes_longer_fork() {
        let dir = tempdir().unwrap();
        let manager = ForkManager::discover(dir.path().to_path_buf()).unwrap();
        let main = manager.main();

        let mut prev = Hash256::ZERO;
        for height in 0..5u64 {
            let h = header(height, prev);
            prev = crate::pow::hash_header(&h);
            main.save_header(&h).unwrap();
        }

        // Fork at height 3, matching main up to height 2.
        let fork_parent_hash = main
            .read_header(2, &manager)
            .unwrap()
            .map(|h| crate::pow::hash_header(&h))
            .unwrap();
        let fork_h3 = header(3, fork_parent_hash);
        let fork = manager.fork(&main, &fork_h3).unwrap();

        // Extend the fork past main's height (main tip is 4, fork needs to reach height >= 5).
        let mut fork_prev = crate::pow::hash_header(&fork_h3);
        for height in 4..7u64 {
            let h = header(height, fork_prev);
            fork_prev = crate::pow::hash_header(&h);
            fork.save_header(&h).unwrap();
            manager.swap_with_parent(fork.checkpoint()).unwrap();
        }

        // After promotion, the registry's key-0 chain should be the (formerly-fork) longer chain.
        let new_main = manager.main();
        assert_eq!(new_main.height(), Some(6));
    }
}
