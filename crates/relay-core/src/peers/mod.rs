//! Node peer list: `peers.dat` parsing and the geo-located peer directory behind `geoData`.

pub mod dat;
pub mod geo;

pub use dat::{double_sha256, parse_peers, read_peers_file, PeerSummary, PeersError, PeersFile};
pub use geo::{join_locations, GeoDirectory, GeoLocation, GeoPeer};
