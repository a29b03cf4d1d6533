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

//! A single chain's on-disk flat file of headers: random-access read/write, append, truncate,
//! fsync. One [`Chain`] per branch; the fork manager owns the registry that resolves
//! `parent_id` to a sibling chain.

use std::{
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use crate::{
    checkpoints::{CheckpointTable, CHUNK_SIZE, GENESIS_HEX},
    error::HeaderStoreError,
    hash::Hash256,
    header::{Header, HEADER_SIZE},
    pow,
};

/// Resolves a fork's `parent_id` to the parent [`Chain`] itself. Implemented by the fork
/// manager's registry; kept as a trait here so the chain store has no dependency on the registry
/// type.
pub trait ParentLookup {
    fn parent_of(&self, parent_id: u64) -> Option<std::sync::Arc<Chain>>;
}

/// Mutable chain state. `checkpoint` and `parent_id` only change during `swap_with_parent`, which
/// the fork manager performs while already holding this chain's lock (after acquiring the
/// registry-wide lock), so folding them into the same mutex as `size` costs nothing in practice
/// and keeps every mutation path behind one guard.
pub(crate) struct ChainState {
    pub(crate) checkpoint: u64,
    pub(crate) parent_id: Option<u64>,
    pub(crate) size: u64,
    pub(crate) catch_up: Option<String>,
}

pub struct Chain {
    headers_dir: PathBuf,
    state: Mutex<ChainState>,
}

impl Chain {
    /// Opens (or newly describes, if the file does not yet exist) the main chain rooted at
    /// `headers_dir/blockchain_headers`.
    pub fn open_main(headers_dir: PathBuf) -> Result<Self, HeaderStoreError> {
        let size = Self::size_on_disk(&Self::main_path(&headers_dir))?;
        Ok(Chain {
            headers_dir,
            state: Mutex::new(ChainState {
                checkpoint: 0,
                parent_id: None,
                size,
                catch_up: None,
            }),
        })
    }

    /// Opens an existing fork file discovered at startup.
    pub fn open_fork(headers_dir: PathBuf, parent_id: u64, checkpoint: u64) -> Result<Self, HeaderStoreError> {
        let path = Self::fork_path(&headers_dir, parent_id, checkpoint);
        let size = Self::size_on_disk(&path)?;
        Ok(Chain {
            headers_dir,
            state: Mutex::new(ChainState {
                checkpoint,
                parent_id: Some(parent_id),
                size,
                catch_up: None,
            }),
        })
    }

    /// Creates a brand new, empty fork file at `parent_id`/`checkpoint`.
    pub fn create_fork(headers_dir: PathBuf, parent_id: u64, checkpoint: u64) -> Result<Self, HeaderStoreError> {
        let path = Self::fork_path(&headers_dir, parent_id, checkpoint);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        OpenOptions::new().create(true).write(true).open(&path)?;
        Ok(Chain {
            headers_dir,
            state: Mutex::new(ChainState {
                checkpoint,
                parent_id: Some(parent_id),
                size: 0,
                catch_up: None,
            }),
        })
    }

    fn main_path(headers_dir: &Path) -> PathBuf {
        headers_dir.join("blockchain_headers")
    }

    fn fork_path(headers_dir: &Path, parent_id: u64, checkpoint: u64) -> PathBuf {
        headers_dir.join("forks").join(format!("fork_{parent_id}_{checkpoint}"))
    }

    pub fn path(&self) -> PathBuf {
        let state = self.lock();
        match state.parent_id {
            None => Self::main_path(&self.headers_dir),
            Some(parent_id) => Self::fork_path(&self.headers_dir, parent_id, state.checkpoint),
        }
    }

    fn size_on_disk(path: &Path) -> Result<u64, HeaderStoreError> {
        match fs::metadata(path) {
            Ok(meta) => Ok(meta.len() / HEADER_SIZE as u64),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().expect("chain mutex poisoned")
    }

    pub fn checkpoint(&self) -> u64 {
        self.lock().checkpoint
    }

    pub fn parent_id(&self) -> Option<u64> {
        self.lock().parent_id
    }

    pub fn size(&self) -> u64 {
        self.lock().size
    }

    /// `checkpoint + size - 1`, or `None` for an empty chain.
    pub fn height(&self) -> Option<u64> {
        let state = self.lock();
        if state.size == 0 {
            None
        } else {
            Some(state.checkpoint + state.size - 1)
        }
    }

    pub fn set_catch_up(&self, id: Option<String>) {
        self.lock().catch_up = id;
    }

    pub fn catch_up(&self) -> Option<String> {
        self.lock().catch_up.clone()
    }

    /// Reads the header at `height`, delegating to the parent chain for heights below this
    /// chain's checkpoint. Returns `None` both for heights past the chain's tip and for
    /// all-zero sentinel slots.
    pub fn read_header(&self, height: u64, registry: &dyn ParentLookup) -> Result<Option<Header>, HeaderStoreError> {
        let (checkpoint, parent_id, size) = {
            let state = self.lock();
            (state.checkpoint, state.parent_id, state.size)
        };

        if height < checkpoint {
            return match parent_id {
                Some(pid) => {
                    let parent = registry.parent_of(pid).ok_or(HeaderStoreError::UnknownChain(pid))?;
                    parent.read_header(height, registry)
                },
                None => Ok(None),
            };
        }

        if size == 0 || height > checkpoint + size - 1 {
            return Ok(None);
        }

        let delta = height - checkpoint;
        let mut file = self.open_for_read()?;
        file.seek(SeekFrom::Start(delta * HEADER_SIZE as u64))?;
        let mut buf = [0u8; HEADER_SIZE];
        file.read_exact(&mut buf)?;
        if buf.iter().all(|b| *b == 0) {
            return Ok(None);
        }
        Ok(Some(Header::deserialize(&buf, height)?))
    }

    /// Appends `header` at the position immediately following this chain's current tip. The
    /// caller (fork manager) is responsible for invoking `swap_with_parent` afterward.
    pub fn save_header(&self, header: &Header) -> Result<(), HeaderStoreError> {
        let mut state = self.lock();
        let delta = header.height.checked_sub(state.checkpoint).ok_or_else(|| {
            HeaderStoreError::Decode(format!(
                "header height {} precedes chain checkpoint {}",
                header.height, state.checkpoint
            ))
        })?;
        if delta != state.size {
            return Err(HeaderStoreError::Decode(format!(
                "save_header out of order: chain has {} headers, got height delta {delta}",
                state.size
            )));
        }
        let mut file = self.open_for_write(state.checkpoint, state.parent_id)?;
        file.seek(SeekFrom::Start(delta * HEADER_SIZE as u64))?;
        file.write_all(&header.serialize())?;
        file.sync_all()?;
        state.size = delta + 1;
        Ok(())
    }

    /// Writes a raw chunk buffer at the offset implied by `chunk_index`, trimming any leading
    /// bytes that fall before this chain's checkpoint. Truncates the file at the write's end
    /// once the chunk is no longer covered by the compiled-in checkpoint table (historical
    /// chunks are never rewound).
    pub fn save_chunk(&self, chunk_index: u64, bytes: &[u8], checkpoints: &CheckpointTable) -> Result<(), HeaderStoreError> {
        let mut state = self.lock();
        let chunk_start = chunk_index * CHUNK_SIZE;
        let mut offset: i64 = (chunk_start as i64 - state.checkpoint as i64) * HEADER_SIZE as i64;
        let bytes = if offset < 0 {
            let trim = ((-offset) as usize).min(bytes.len());
            offset = 0;
            &bytes[trim..]
        } else {
            bytes
        };
        let offset = offset as u64;

        let mut file = self.open_for_write(state.checkpoint, state.parent_id)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        let end = offset + bytes.len() as u64;
        if chunk_index >= checkpoints.len() as u64 {
            file.set_len(end)?;
        }
        file.sync_all()?;
        state.size = end / HEADER_SIZE as u64;
        Ok(())
    }

    /// The hash of the header at `height`, or of the zero hash at the conventional `-1`
    /// predecessor-of-genesis sentinel. Answered from the checkpoint table at chunk-boundary
    /// heights within its coverage; otherwise requires the header itself.
    pub fn get_hash(
        &self,
        height: i64,
        checkpoints: &CheckpointTable,
        registry: &dyn ParentLookup,
    ) -> Result<Hash256, HeaderStoreError> {
        if height < 0 {
            return Ok(Hash256::ZERO);
        }
        let height = height as u64;
        if height == 0 {
            return Hash256::from_hex(GENESIS_HEX);
        }
        if checkpoints.covers(height) {
            let idx = height / CHUNK_SIZE;
            return Ok(checkpoints.get(idx).expect("covers() implies the entry exists").hash);
        }
        let header = self
            .read_header(height, registry)?
            .ok_or(HeaderStoreError::MissingHeader(height))?;
        Ok(pow::hash_header(&header))
    }

    fn open_for_read(&self) -> Result<File, HeaderStoreError> {
        match File::open(self.path()) {
            Ok(f) => Ok(f),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(self.missing_file_error()),
            Err(e) => Err(e.into()),
        }
    }

    fn open_for_write(&self, checkpoint: u64, parent_id: Option<u64>) -> Result<File, HeaderStoreError> {
        let path = match parent_id {
            None => Self::main_path(&self.headers_dir),
            Some(pid) => Self::fork_path(&self.headers_dir, pid, checkpoint),
        };
        if !self.headers_dir.exists() {
            return Err(HeaderStoreError::StateLost);
        }
        Ok(OpenOptions::new().read(true).write(true).create(true).open(path)?)
    }

    fn missing_file_error(&self) -> HeaderStoreError {
        if self.headers_dir.exists() {
            HeaderStoreError::StateCorrupt(self.path().display().to_string())
        } else {
            HeaderStoreError::StateLost
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    struct NoParents;
    impl ParentLookup for NoParents {
        fn parent_of(&self, _parent_id: u64) -> Option<std::sync::Arc<Chain>> {
            None
        }
    }

    fn header(height: u64) -> Header {
        Header {
            version: 1 << 11,
            prev_block_hash: Hash256::ZERO,
            merkle_root: Hash256::ZERO,
            timestamp: 1000 + height as u32,
            bits: 0x1e0f_ffff,
            nonce: 0,
            height,
        }
    }

    #[test]
    fn save_then_read_round_trip() {
        let dir = tempdir().unwrap();
        let chain = Chain::open_main(dir.path().to_path_buf()).unwrap();
        let registry = NoParents;
        let h0 = header(0);
        chain.save_header(&h0).unwrap();
        assert_eq!(chain.height(), Some(0));
        let back = chain.read_header(0, &registry).unwrap().unwrap();
        assert_eq!(back, h0);
    }

    #[test]
    fn save_header_rejects_out_of_order() {
        let dir = tempdir().unwrap();
        let chain = Chain::open_main(dir.path().to_path_buf()).unwrap();
        let err = chain.save_header(&header(5));
        assert!(matches!(err, Err(HeaderStoreError::Decode(_))));
    }

    #[test]
    fn read_header_returns_none_past_tip() {
        let dir = tempdir().unwrap();
        let chain = Chain::open_main(dir.path().to_path_buf()).unwrap();
        let registry = NoParents;
        chain.save_header(&header(0)).unwrap();
        assert_eq!(chain.read_header(5, &registry).unwrap(), None);
    }

    #[test]
    fn missing_directory_is_state_lost() {
        let dir = tempdir().unwrap();
        let path = dir.path().to_path_buf();
        let chain = Chain::open_main(path.clone()).unwrap();
        chain.save_header(&header(0)).unwrap();
        fs::remove_dir_all(&path).unwrap();
        let registry = NoParents;
        let err = chain.read_header(0, &registry);
        assert!(matches!(err, Err(HeaderStoreError::StateLost)));
    }

    #[test]
    fn missing_file_with_directory_present_is_state_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().to_path_buf();
        let chain = Chain::open_main(path.clone()).unwrap();
        chain.save_header(&header(0)).unwrap();
        fs::remove_file(Chain::main_path(&path)).unwrap();
        let registry = NoParents;
        let err = chain.read_header(0, &registry);
        assert!(matches!(err, Err(HeaderStoreError::StateCorrupt(_))));
    }
}
