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

use primitive_types::U256;

use crate::{error::HeaderStoreError, hash::Hash256};

/// Size in bytes of a serialized header on the wire.
pub const HEADER_SIZE: usize = 80;

/// A single block header. `height` is derived from the header's position in a chain and is never
/// part of the 80-byte wire encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub version: u32,
    pub prev_block_hash: Hash256,
    pub merkle_root: Hash256,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
    pub height: u64,
}

impl Header {
    /// Concatenates the wire fields of this header: LE version, reversed prev hash, reversed
    /// merkle root, LE timestamp, LE bits, LE nonce.
    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(&self.prev_block_hash.to_wire_bytes());
        out[36..68].copy_from_slice(&self.merkle_root.to_wire_bytes());
        out[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    pub fn deserialize(bytes: &[u8], height: u64) -> Result<Self, HeaderStoreError> {
        if bytes.len() != HEADER_SIZE {
            return Err(HeaderStoreError::Decode(format!(
                "invalid header length: {}",
                bytes.len()
            )));
        }
        let version = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let prev_block_hash = Hash256::from_wire_bytes(&bytes[4..36])?;
        let merkle_root = Hash256::from_wire_bytes(&bytes[36..68])?;
        let timestamp = u32::from_le_bytes(bytes[68..72].try_into().unwrap());
        let bits = u32::from_le_bytes(bytes[72..76].try_into().unwrap());
        let nonce = u32::from_le_bytes(bytes[76..80].try_into().unwrap());
        Ok(Header {
            version,
            prev_block_hash,
            merkle_root,
            timestamp,
            bits,
            nonce,
            height,
        })
    }
}

/// Decodes the compact `bits` encoding into a full 256-bit target.
pub fn bits_to_target(bits: u32) -> Result<U256, HeaderStoreError> {
    let bits_n = (bits >> 24) & 0xff;
    if !(0x03..=0x1e).contains(&bits_n) {
        return Err(HeaderStoreError::Decode(format!(
            "first part of bits should be in [0x03, 0x1e], got {bits_n:#x}"
        )));
    }
    let bits_base = bits & 0xff_ffff;
    if !(0x8000..=0x7f_ffff).contains(&bits_base) {
        return Err(HeaderStoreError::Decode(format!(
            "second part of bits should be in [0x8000, 0x7fffff], got {bits_base:#x}"
        )));
    }
    Ok(U256::from(bits_base) << (8 * (bits_n - 3)))
}

/// Encodes a 256-bit target into the compact `bits` representation.
pub fn target_to_bits(target: U256) -> u32 {
    // 32 bytes, big-endian, with leading zero bytes stripped down to a minimum width of 3.
    let mut be = [0u8; 32];
    target.to_big_endian(&mut be);
    let mut start = 0usize;
    while start < 29 && be[start] == 0 {
        start += 1;
    }
    let mut n = (32 - start) as u32;
    let mut base = ((be[start] as u32) << 16) | ((be[start + 1] as u32) << 8) | (be[start + 2] as u32);
    if base >= 0x0080_0000 {
        n += 1;
        base >>= 8;
    }
    (n << 24) | base
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header {
            version: 0x0000_2801,
            prev_block_hash: Hash256([0x11; 32]),
            merkle_root: Hash256([0x22; 32]),
            timestamp: 1_700_000_000,
            bits: 0x1e0f_ffff,
            nonce: 424_242,
            height: 12345,
        }
    }

    #[test]
    fn serialize_deserialize_round_trip() {
        let h = sample_header();
        let bytes = h.serialize();
        assert_eq!(bytes.len(), HEADER_SIZE);
        let back = Header::deserialize(&bytes, h.height).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn deserialize_rejects_wrong_length() {
        let err = Header::deserialize(&[0u8; 79], 0);
        assert!(matches!(err, Err(HeaderStoreError::Decode(_))));
    }

    #[test]
    fn bits_target_round_trip() {
        for bits in [0x1e0f_ffffu32, 0x1d00_ffff, 0x0300_8000, 0x1e7f_ffff] {
            let target = bits_to_target(bits).unwrap();
            assert_eq!(target_to_bits(target), bits);
        }
    }

    #[test]
    fn bits_to_target_rejects_out_of_range_exponent() {
        assert!(bits_to_target(0x0200_8000).is_err());
        assert!(bits_to_target(0x1f00_8000).is_err());
    }

    #[test]
    fn bits_to_target_rejects_out_of_range_mantissa() {
        assert!(bits_to_target(0x1e00_7fff).is_err());
        assert!(bits_to_target(0x1e80_0000).is_err());
    }
}
