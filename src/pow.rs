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

//! Selects and computes the proof-of-work hash for a header from the algorithm tag packed into
//! its version field. Linkage hashing (`hash_header`) always uses scrypt, independent of the
//! header's own algorithm tag; only `pow_hash_header` is algorithm-dependent.

use blake2::{Blake2s256, Digest};

use crate::{error::HeaderStoreError, hash::Hash256, header::Header};

/// Proof-of-work algorithms selectable via bits 11..14 of a header's `version` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    Scrypt,
    Groestl,
    X17,
    Blake,
    Lyra,
    X16s,
}

const ALGO_TAG_MASK: u32 = 0xf << 11;

impl Algorithm {
    /// Extracts the algorithm tag from a header's version field. Tag values that don't match a
    /// known algorithm default to [`Algorithm::Scrypt`], matching the reference client: an
    /// unrecognized tag is never treated as a distinct algorithm for retarget ancestor-matching
    /// purposes, it simply collapses into scrypt's slot.
    pub fn from_version(version: u32) -> Algorithm {
        match version & ALGO_TAG_MASK {
            x if x == 1 << 11 => Algorithm::Scrypt,
            x if x == 2 << 11 => Algorithm::Groestl,
            x if x == 3 << 11 => Algorithm::X17,
            x if x == 4 << 11 => Algorithm::Blake,
            x if x == 10 << 11 => Algorithm::Lyra,
            x if x == 11 << 11 => Algorithm::X16s,
            _ => Algorithm::Scrypt,
        }
    }

    /// Whether this algorithm's proof-of-work digest is checked against the target. Groestl, X17,
    /// Lyra and X16s are reserved: linkage and bits are still validated for headers tagged with
    /// them, but no PoW hash comparison is performed (see the header verifier's open question).
    pub fn is_pow_checked(self) -> bool {
        matches!(self, Algorithm::Scrypt | Algorithm::Blake)
    }
}

/// The hash used for chain linkage (`prev_block_hash` matching and chunk walk-back), independent
/// of the header's own algorithm tag.
pub fn hash_header(header: &Header) -> Hash256 {
    scrypt_hash(header)
}

/// The proof-of-work digest that must be strictly less than the target for algorithms where
/// [`Algorithm::is_pow_checked`] is true. Callers should not compare this value for algorithms
/// where PoW checking is disabled; the digest is still computed (as the reference client does)
/// but carries no consensus meaning there.
pub fn pow_hash_header(header: &Header) -> Hash256 {
    match Algorithm::from_version(header.version) {
        Algorithm::Blake => blake_hash(header),
        _ => scrypt_hash(header),
    }
}

/// Raw hash digests come out of both `scrypt` and `blake2s` in the same byte order the header
/// was serialized in; `Hash256` stores display order, so every digest is reversed once here
/// before being wrapped, matching the original's `hash_encode` (`bytes[::-1]`) applied right
/// after hashing.
fn scrypt_hash(header: &Header) -> Hash256 {
    let data = header.serialize();
    let params = scrypt::Params::new(10, 1, 1, 32).expect("fixed scrypt params are valid");
    let mut out = [0u8; 32];
    scrypt::scrypt(&data, &data, &params, &mut out).expect("fixed-size scrypt output buffer");
    out.reverse();
    Hash256(out)
}

fn blake_hash(header: &Header) -> Hash256 {
    let data = header.serialize();
    let mut hasher = Blake2s256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out.reverse();
    Hash256(out)
}

/// Converts a proof-of-work digest into the unsigned integer it's compared against a target as,
/// per the glossary's definition of "target". `Hash256` holds display-order bytes, and electrum's
/// own comparison treats the display hex string as a big-endian integer, so `from_big_endian`
/// here operates on display order directly - no further reversal.
pub fn pow_hash_as_u256(hash: Hash256) -> primitive_types::U256 {
    primitive_types::U256::from_big_endian(&hash.0)
}
