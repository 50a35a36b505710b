// Copyright 2024 grist
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    fmt::{Debug, Display, Formatter},
    str::FromStr,
    sync::atomic::{AtomicU32, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::err::{Error, InvalidObjectIdSnafu, Result};

lazy_static! {
    // Picked once per process so ids minted by two processes in the same
    // second still differ.
    static ref PROCESS_UNIQUE: [u8; 5] = rand::random();
    static ref COUNTER: AtomicU32 = AtomicU32::new(rand::random::<u32>() & 0x00ff_ffff);
}

const OID_BYTES: usize = 12;

/// A 12 byte record id: 4 bytes of big-endian unix seconds, 5 bytes unique
/// to the process and a 3 byte wrapping counter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; OID_BYTES]);

impl ObjectId {
    pub fn new() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or_default();
        let count = COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;

        let mut buf = [0u8; OID_BYTES];
        buf[0..4].copy_from_slice(&secs.to_be_bytes());
        buf[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        buf[9..12].copy_from_slice(&count.to_be_bytes()[1..4]);
        ObjectId(buf)
    }

    pub const fn from_bytes(bytes: [u8; OID_BYTES]) -> Self { ObjectId(bytes) }

    pub const fn bytes(&self) -> [u8; OID_BYTES] { self.0 }

    /// Seconds since the unix epoch at which the id was minted.
    pub fn timestamp(&self) -> u32 { u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]) }

    pub fn to_hex(&self) -> String { self.0.iter().map(|b| format!("{:02x}", b)).collect() }

    pub fn parse_str(s: &str) -> Result<Self> {
        ensure!(
            s.len() == OID_BYTES * 2 && s.is_ascii(),
            InvalidObjectIdSnafu { text: s.to_string() }
        );
        let mut buf = [0u8; OID_BYTES];
        for (i, b) in buf.iter_mut().enumerate() {
            *b = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| {
                InvalidObjectIdSnafu {
                    text: s.to_string(),
                }
                .build()
            })?;
        }
        Ok(ObjectId(buf))
    }
}

impl Default for ObjectId {
    fn default() -> Self { Self::new() }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> { Self::parse_str(s) }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { f.write_str(&self.to_hex()) }
}

impl Debug for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip() {
        let oid = ObjectId::new();
        let hex = oid.to_hex();
        assert_eq!(hex.len(), 24);
        assert_eq!(ObjectId::parse_str(&hex).unwrap(), oid);
        assert!(ObjectId::parse_str("zz").is_err());
        assert!(ObjectId::parse_str("zzzzzzzzzzzzzzzzzzzzzzzz").is_err());
    }

    #[test]
    fn ids_are_unique_and_ordered_by_time() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
        assert!(b.timestamp() >= a.timestamp());
    }
}
