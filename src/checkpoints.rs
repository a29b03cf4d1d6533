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

//! Compiled-in checkpoints, trusted without proof-of-work verification, one every
//! [`CHUNK_SIZE`] blocks.

use primitive_types::U256;

use crate::hash::Hash256;

/// Height span of one chunk / one retarget window boundary.
pub const CHUNK_SIZE: u64 = 2016;

/// Compiled-in genesis header hash (height 0).
pub const GENESIS_HEX: &str = "00000066e91e46e5a264d42200b8145d5a52a4c7ca87b27b50246f72e002c9e1";

#[derive(Clone, Copy, Debug)]
pub struct Checkpoint {
    pub hash: Hash256,
    pub target: U256,
    pub timestamp: u32,
}

/// An ordered, immutable table of checkpoints covering heights `0 .. len() * CHUNK_SIZE - 1`.
#[derive(Clone, Debug, Default)]
pub struct CheckpointTable {
    entries: Vec<Checkpoint>,
}

impl CheckpointTable {
    pub fn new(entries: Vec<Checkpoint>) -> Self {
        CheckpointTable { entries }
    }

    /// The table compiled into this build. Kept intentionally short for this crate: a production
    /// deployment would compile in one entry per historical chunk boundary, refreshed at release
    /// time the way the reference client's `constants.net.CHECKPOINTS` is.
    pub fn compiled() -> Self {
        CheckpointTable::new(vec![])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of heights covered by this table, i.e. `len() * CHUNK_SIZE`.
    pub fn covered_heights(&self) -> u64 {
        self.entries.len() as u64 * CHUNK_SIZE
    }

    pub fn get(&self, chunk_index: u64) -> Option<&Checkpoint> {
        self.entries.get(chunk_index as usize)
    }

    /// True when `height` falls inside the compiled-in table *and* is itself a chunk-boundary
    /// height (`(height + 1) % CHUNK_SIZE == 0`); the only heights the table can answer for.
    pub fn covers(&self, height: u64) -> bool {
        height < self.covered_heights() && (height + 1) % CHUNK_SIZE == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_covers_nothing() {
        let t = CheckpointTable::compiled();
        assert!(!t.covers(2015));
        assert_eq!(t.covered_heights(), 0);
    }

    #[test]
    fn covers_respects_stride() {
        let t = CheckpointTable::new(vec![Checkpoint {
            hash: Hash256::ZERO,
            target: U256::zero(),
            timestamp: 0,
        }]);
        assert!(t.covers(CHUNK_SIZE - 1));
        assert!(!t.covers(CHUNK_SIZE - 2));
        assert!(!t.covers(CHUNK_SIZE));
    }
}
