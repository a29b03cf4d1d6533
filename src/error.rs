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

use thiserror::Error;

/// Errors produced while decoding, verifying, or storing headers.
///
/// `connect_chunk` collapses every variant except [`HeaderStoreError::StateLost`] into a `false`
/// return and leaves the chain's on-disk file untouched.
#[derive(Debug, Error)]
pub enum HeaderStoreError {
    #[error("malformed header: {0}")]
    Decode(String),

    #[error("prev hash mismatch: expected {expected}, got {actual}")]
    Linkage { expected: String, actual: String },

    #[error("bits mismatch: header declares {declared:#010x}, engine computed {computed:#010x}")]
    Bits { declared: u32, computed: u32 },

    #[error("insufficient proof of work: {pow_hash} >= target {target}")]
    Pow { pow_hash: String, target: String },

    #[error("retarget requires a header that is not present in the store (height {0})")]
    MissingHeader(u64),

    #[error("headers file missing for chain at {0}; headers directory still exists")]
    StateCorrupt(String),

    #[error("headers directory does not exist; it may have been deleted while running")]
    StateLost,

    #[error("unknown chain checkpoint {0}")]
    UnknownChain(u64),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
