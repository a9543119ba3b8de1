//! `peers.dat` address-manager file parsing.
//!
//! Layout read here:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | network magic |
//! | 4 | 1 | format version |
//! | 5 | 1 | key size |
//! | 38 | 4 | new address count (LE) |
//! | 42 | 4 | tried address count (LE) |
//! | 46 | 4 | new bucket count (LE, xor 2^30) |
//! | 50 | 62 × n | address records, IP at record bytes 16..32 |
//! | len-32 | 32 | double SHA-256 of everything before it |

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    path::Path,
};

const HEADER_LEN: usize = 50;
const RECORD_LEN: usize = 62;
const CHECKSUM_LEN: usize = 32;
const IP_RANGE: std::ops::Range<usize> = 16..32;

#[derive(Debug, thiserror::Error)]
pub enum PeersError {
    #[error("failed to read peers file: {0}")]
    Io(#[from] std::io::Error),

    #[error("peers file too short: {0} bytes")]
    TooShort(usize),

    #[error("peers file truncated: {records} records need {needed} bytes, have {actual}")]
    Truncated { records: u64, needed: usize, actual: usize },

    #[error("peers file checksum mismatch")]
    ChecksumMismatch,

    #[error("failed to parse geolocation data: {0}")]
    Geo(#[from] serde_json::Error),
}

/// Parsed header and unique peer addresses, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeersFile {
    pub version: u8,
    pub key_size: u8,
    pub new_count: u32,
    pub tried_count: u32,
    pub new_buckets: u32,
    pub ipv4: Vec<Ipv4Addr>,
    pub ipv6: Vec<Ipv6Addr>,
}

/// JSON summary of a peers file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSummary {
    #[serde(rename = "uniqueIPv4Addresses")]
    pub unique_ipv4_addresses: Vec<String>,
    #[serde(rename = "uniqueIPv6Addresses")]
    pub unique_ipv6_addresses: Vec<String>,
    #[serde(rename = "totalUniquePeers")]
    pub total_unique_peers: usize,
    #[serde(rename = "totalUniqueIPv4Peers")]
    pub total_unique_ipv4_peers: usize,
    #[serde(rename = "totalUniqueIPv6Peers")]
    pub total_unique_ipv6_peers: usize,
}

impl PeersFile {
    /// All unique addresses, IPv4 first.
    pub fn addresses(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.ipv4.iter().copied().map(IpAddr::V4).chain(self.ipv6.iter().copied().map(IpAddr::V6))
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.ipv4.len() + self.ipv6.len()
    }

    #[must_use]
    pub fn summary(&self) -> PeerSummary {
        PeerSummary {
            unique_ipv4_addresses: self.ipv4.iter().map(ToString::to_string).collect(),
            unique_ipv6_addresses: self.ipv6.iter().map(ToString::to_string).collect(),
            total_unique_peers: self.total(),
            total_unique_ipv4_peers: self.ipv4.len(),
            total_unique_ipv6_peers: self.ipv6.len(),
        }
    }
}

fn read_u32_le(data: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

/// A zero first byte marks an IPv4-mapped address; its last four bytes are the IPv4 address.
fn decode_ip(raw: &[u8]) -> Option<IpAddr> {
    let bytes: [u8; 16] = raw.try_into().ok()?;
    if bytes[0] == 0 {
        Some(IpAddr::V4(Ipv4Addr::new(bytes[12], bytes[13], bytes[14], bytes[15])))
    } else {
        Some(IpAddr::V6(Ipv6Addr::from(bytes)))
    }
}

/// Double SHA-256 as used by the node for file checksums.
#[must_use]
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// Parses the bytes of a `peers.dat` file.
///
/// # Errors
///
/// Returns an error when the file is shorter than its header, shorter than its declared
/// records, or when the trailing checksum does not match.
pub fn parse_peers(data: &[u8]) -> Result<PeersFile, PeersError> {
    if data.len() < HEADER_LEN + CHECKSUM_LEN {
        return Err(PeersError::TooShort(data.len()));
    }

    let (body, checksum) = data.split_at(data.len() - CHECKSUM_LEN);
    if double_sha256(body).as_slice() != checksum {
        return Err(PeersError::ChecksumMismatch);
    }

    let new_count = read_u32_le(data, 38);
    let tried_count = read_u32_le(data, 42);
    let new_buckets = read_u32_le(data, 46) ^ (1 << 30);
    let records = u64::from(new_count) + u64::from(tried_count);

    let needed = usize::try_from(records)
        .ok()
        .and_then(|n| n.checked_mul(RECORD_LEN))
        .and_then(|n| n.checked_add(HEADER_LEN))
        .unwrap_or(usize::MAX);
    if needed > body.len() {
        return Err(PeersError::Truncated { records, needed, actual: body.len() });
    }

    let mut seen = ahash::AHashSet::new();
    let mut ipv4 = Vec::new();
    let mut ipv6 = Vec::new();
    for record in body[HEADER_LEN..needed].chunks_exact(RECORD_LEN) {
        match decode_ip(&record[IP_RANGE]) {
            Some(ip) if seen.insert(ip) => match ip {
                IpAddr::V4(v4) => ipv4.push(v4),
                IpAddr::V6(v6) => ipv6.push(v6),
            },
            _ => {}
        }
    }

    Ok(PeersFile { version: data[4], key_size: data[5], new_count, tried_count, new_buckets, ipv4, ipv6 })
}

/// Reads and parses a `peers.dat` file.
///
/// # Errors
///
/// See [`parse_peers`]; I/O failures are reported as [`PeersError::Io`].
pub async fn read_peers_file(path: impl AsRef<Path>) -> Result<PeersFile, PeersError> {
    let data = tokio::fs::read(path).await?;
    parse_peers(&data)
}
