use std::fmt;

#[derive(Debug)]
pub enum CliError {
    Config(String),
    Io(String),
    Network(String),
    /// A file was read but its contents are not what the command expects.
    Format(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "Configuration error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
            Self::Network(msg) => write!(f, "Network error: {msg}"),
            Self::Format(msg) => write!(f, "Format error: {msg}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<reqwest::Error> for CliError {
    fn from(error: reqwest::Error) -> Self {
        Self::Network(error.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(error: serde_json::Error) -> Self {
        Self::Format(error.to_string())
    }
}

impl From<relay_core::persistence::SnapshotError> for CliError {
    fn from(error: relay_core::persistence::SnapshotError) -> Self {
        match error {
            relay_core::persistence::SnapshotError::Io(e) => Self::Io(e.to_string()),
            other => Self::Format(other.to_string()),
        }
    }
}

impl From<relay_core::peers::PeersError> for CliError {
    fn from(error: relay_core::peers::PeersError) -> Self {
        match error {
            relay_core::peers::PeersError::Io(e) => Self::Io(e.to_string()),
            other => Self::Format(other.to_string()),
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;

pub fn print_success(message: &str) {
    println!("[SUCCESS] {message}");
}

pub fn print_error(message: &str) {
    eprintln!("[ERROR] {message}");
}

pub fn print_info(message: &str) {
    println!("[INFO] {message}");
}

/// `abcdef…123456` for long hashes, unchanged otherwise.
#[must_use]
pub fn short_hash(hash: &str) -> String {
    if hash.len() <= 16 {
        return hash.to_string();
    }
    format!("{}…{}", &hash[..8], &hash[hash.len() - 8..])
}

/// Renders unix seconds as RFC 3339, or the raw number when out of range.
#[must_use]
pub fn format_unix(seconds: u64) -> String {
    i64::try_from(seconds)
        .ok()
        .and_then(|s| chrono::DateTime::from_timestamp(s, 0))
        .map_or_else(|| seconds.to_string(), |t| t.to_rfc3339())
}
