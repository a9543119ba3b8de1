use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::dat::{read_peers_file, PeersError, PeersFile};

/// Location entry of the geolocation file, keyed by IP string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub city: String,
    pub lat: f64,
    pub lon: f64,
}

/// A peer with a known location, as sent in `geoData`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoPeer {
    pub ip: String,
    pub country: String,
    pub city: String,
    pub lat: f64,
    pub lon: f64,
}

/// Joins peer addresses with their locations. Peers without a location are left out.
#[must_use]
pub fn join_locations(peers: &PeersFile, locations: &AHashMap<String, GeoLocation>) -> Vec<GeoPeer> {
    peers
        .addresses()
        .filter_map(|ip| {
            let ip = ip.to_string();
            let loc = locations.get(&ip)?;
            Some(GeoPeer {
                ip,
                country: loc.country.clone(),
                city: loc.city.clone(),
                lat: loc.lat,
                lon: loc.lon,
            })
        })
        .collect()
}

/// Source of the geo-located peer list.
///
/// Both paths are optional; without them the directory yields an empty list.
#[derive(Debug, Clone, Default)]
pub struct GeoDirectory {
    peers_path: Option<PathBuf>,
    geo_path: Option<PathBuf>,
}

impl GeoDirectory {
    #[must_use]
    pub fn new(peers_path: Option<PathBuf>, geo_path: Option<PathBuf>) -> Self {
        Self { peers_path, geo_path }
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.peers_path.is_some() && self.geo_path.is_some()
    }

    /// Reads both files and joins them.
    ///
    /// # Errors
    ///
    /// Returns a [`PeersError`] when either configured file cannot be read or parsed.
    pub async fn load(&self) -> Result<Vec<GeoPeer>, PeersError> {
        let (Some(peers_path), Some(geo_path)) = (&self.peers_path, &self.geo_path) else {
            return Ok(Vec::new());
        };

        let peers = read_peers_file(peers_path).await?;
        let locations = read_locations(geo_path).await?;
        let joined = join_locations(&peers, &locations);

        debug!(
            peers = peers.total(),
            located = joined.len(),
            "geo peer list loaded"
        );
        if joined.len() < peers.total() {
            warn!(missing = peers.total() - joined.len(), "peers without geolocation skipped");
        }
        Ok(joined)
    }
}

async fn read_locations(path: &Path) -> Result<AHashMap<String, GeoLocation>, PeersError> {
    let raw = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&raw)?)
}
