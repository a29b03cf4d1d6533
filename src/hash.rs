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

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HeaderStoreError;

/// A 32-byte double hash, stored in display (big-endian hex) order.
///
/// Headers carry hashes on the wire in the reverse of their conventional hex display order; the
/// wire codec in [`crate::header`] is the only place that reverses bytes. Everywhere else a
/// `Hash256` behaves like the hex string a block explorer would print.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    /// Decodes 32 wire-order bytes (as found in a serialized header) into display order.
    pub fn from_wire_bytes(bytes: &[u8]) -> Result<Self, HeaderStoreError> {
        if bytes.len() != 32 {
            return Err(HeaderStoreError::Decode(format!(
                "expected 32 hash bytes, got {}",
                bytes.len()
            )));
        }
        let mut buf = [0u8; 32];
        buf.copy_from_slice(bytes);
        buf.reverse();
        Ok(Hash256(buf))
    }

    /// Encodes this hash back to the 32 wire-order bytes used inside a serialized header.
    pub fn to_wire_bytes(self) -> [u8; 32] {
        let mut buf = self.0;
        buf.reverse();
        buf
    }

    pub fn from_hex(s: &str) -> Result<Self, HeaderStoreError> {
        let bytes = hex::decode(s).map_err(|e| HeaderStoreError::Decode(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(HeaderStoreError::Decode(format!(
                "expected 32-byte hash, got {} bytes",
                bytes.len()
            )));
        }
        let mut buf = [0u8; 32];
        buf.copy_from_slice(&bytes);
        Ok(Hash256(buf))
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }

    pub fn is_zero(self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trip_reverses_bytes() {
        let mut wire = [0u8; 32];
        for (i, b) in wire.iter_mut().enumerate() {
            *b = i as u8;
        }
        let h = Hash256::from_wire_bytes(&wire).unwrap();
        assert_eq!(h.to_wire_bytes(), wire);
        assert_ne!(h.0, wire);
    }

    #[test]
    fn hex_round_trip() {
        let h = Hash256([7u8; 32]);
        let hex = h.to_hex();
        assert_eq!(Hash256::from_hex(&hex).unwrap(), h);
    }
}
