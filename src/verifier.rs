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

//! Per-header and per-chunk consensus checks: linkage, bits, and (where applicable) proof of
//! work. Does not touch storage; callers supply header data and linkage context.

use log::debug;

use crate::{
    error::HeaderStoreError,
    hash::Hash256,
    header::{bits_to_target, target_to_bits, Header, HEADER_SIZE},
    pow::{self, Algorithm},
    target::{required_target, ChunkView, Network},
};

/// Verifies a single header against its expected predecessor hash and required target.
///
/// Checks, in order: linkage to `prev_hash`; on testnet, stop there and accept; otherwise
/// declared `bits` must match the engine-computed target, and (for PoW-checked algorithms) the
/// header's proof-of-work digest must be strictly below the target.
pub fn verify_header(
    header: &Header,
    prev_hash: Hash256,
    required: primitive_types::U256,
    network: Network,
) -> Result<(), HeaderStoreError> {
    if header.prev_block_hash != prev_hash {
        return Err(HeaderStoreError::Linkage {
            expected: prev_hash.to_hex(),
            actual: header.prev_block_hash.to_hex(),
        });
    }

    if network.is_testnet() {
        return Ok(());
    }

    let declared = bits_to_target(header.bits)?;
    if declared != required {
        return Err(HeaderStoreError::Bits {
            declared: header.bits,
            computed: target_to_bits(required),
        });
    }

    let algo = Algorithm::from_version(header.version);
    if algo.is_pow_checked() {
        let pow_hash = pow::pow_hash_header(header);
        let pow_value = pow::pow_hash_as_u256(pow_hash);
        if pow_value >= required {
            return Err(HeaderStoreError::Pow {
                pow_hash: pow_hash.to_hex(),
                target: format!("{required:#x}"),
            });
        }
    } else {
        debug!(
            "header at height {} tagged with non-PoW-checked algorithm {:?}; skipping digest comparison",
            header.height, algo
        );
    }

    Ok(())
}

/// Verifies every header in a raw chunk buffer, in order, threading linkage from one header to
/// the next. `prev_hash` is the hash of the header immediately before the first header in
/// `data`. Returns the hash of the chunk's final header on success.
pub fn verify_chunk(
    data: &[u8],
    chunk_index: u64,
    mut prev_hash: Hash256,
    fallback: &dyn crate::target::HeightSource,
    checkpoints: &crate::checkpoints::CheckpointTable,
    network: Network,
) -> Result<Hash256, HeaderStoreError> {
    if data.len() % HEADER_SIZE != 0 {
        return Err(HeaderStoreError::Decode(format!(
            "chunk buffer length {} is not a multiple of header size {}",
            data.len(),
            HEADER_SIZE
        )));
    }

    let view = ChunkView {
        chunk_data: data,
        chunk_index,
        fallback,
        checkpoints,
    };

    let base_height = chunk_index * crate::checkpoints::CHUNK_SIZE;
    let num_headers = data.len() / HEADER_SIZE;
    for i in 0..num_headers {
        let height = base_height + i as u64;
        let start = i * HEADER_SIZE;
        let header = Header::deserialize(&data[start..start + HEADER_SIZE], height)?;
        let required = required_target(&view, height, network)?;
        verify_header(&header, prev_hash, required, network)?;
        prev_hash = pow::hash_header(&header);
    }

    Ok(prev_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{checkpoints::CheckpointTable, header::target_to_bits, target::HeightSource};

    struct EmptyStore;
    impl HeightSource for EmptyStore {
        fn header_at(&self, _height: u64) -> Result<Option<Header>, HeaderStoreError> {
            Ok(None)
        }
    }

    fn make_header(height: u64, prev: Hash256, timestamp: u32, bits: u32, nonce: u32) -> Header {
        Header {
            version: 1 << 11,
            prev_block_hash: prev,
            merkle_root: Hash256::ZERO,
            timestamp,
            bits,
            nonce,
            height,
        }
    }

    #[test]
    fn rejects_linkage_mismatch() {
        let bits = target_to_bits(primitive_types::U256::MAX >> 8);
        let h = make_header(1, Hash256([0xaa; 32]), 1, bits, 0);
        let required = bits_to_target(bits).unwrap();
        let err = verify_header(&h, Hash256::ZERO, required, Network::Mainnet);
        assert!(matches!(err, Err(HeaderStoreError::Linkage { .. })));
    }

    #[test]
    fn rejects_bits_mismatch() {
        let declared_bits = target_to_bits(primitive_types::U256::MAX >> 16);
        let required = primitive_types::U256::MAX >> 8;
        let h = make_header(1, Hash256::ZERO, 1, declared_bits, 0);
        let err = verify_header(&h, Hash256::ZERO, required, Network::Mainnet);
        assert!(matches!(err, Err(HeaderStoreError::Bits { .. })));
    }

    #[test]
    fn testnet_skips_bits_and_pow() {
        let h = make_header(1, Hash256::ZERO, 1, 0x1e0f_ffff, 0);
        let bogus_required = primitive_types::U256::from(1u8);
        assert!(verify_header(&h, Hash256::ZERO, bogus_required, Network::Testnet).is_ok());
    }

    #[test]
    fn verify_chunk_rejects_misaligned_buffer() {
        let checkpoints = CheckpointTable::compiled();
        let empty = EmptyStore;
        let err = verify_chunk(&[0u8; 79], 0, Hash256::ZERO, &empty, &checkpoints, Network::Mainnet);
        assert!(matches!(err, Err(HeaderStoreError::Decode(_))));
    }
}
