use clap::Subcommand;
use relay_core::{
    config::AppConfig,
    upstream::{HttpTransport, UpstreamTransport},
};
use std::path::Path;

use super::utils::{print_error, print_info, print_success, CliError, CliResult};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Validate the current configuration
    Validate {
        /// Path to config file (defaults to config/config.toml)
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,
    },

    /// Show current configuration
    Show {
        /// Path to config file (defaults to config/config.toml)
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,

        /// Show the daemon RPC password
        #[arg(long)]
        show_sensitive: bool,
    },

    /// Generate a sample configuration file
    Generate {
        /// Output path for the config file
        #[arg(short, long, default_value = "config/config.toml")]
        output: String,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Ask the configured daemon for its block count
    TestUpstream {
        /// Path to config file (defaults to config/config.toml)
        #[arg(short, long, default_value = "config/config.toml")]
        file: String,
    },
}

pub async fn handle_config_command(command: ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Validate { file } => validate_config(&file),
        ConfigCommands::Show { file, show_sensitive } => show_config(&file, show_sensitive),
        ConfigCommands::Generate { output, force } => generate_config(&output, force),
        ConfigCommands::TestUpstream { file } => test_upstream(&file).await,
    }
}

fn load(file: &str) -> CliResult<AppConfig> {
    AppConfig::from_file(file).map_err(|e| CliError::Config(e.to_string()))
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}

fn validate_config(file: &str) -> CliResult<()> {
    if !Path::new(file).exists() {
        print_error(&format!("Configuration file not found: {file}"));
        return Err(CliError::Config(format!("File not found: {file}")));
    }

    print_info(&format!("Loading configuration from {file}..."));
    let config = load(file)?;

    print_info("Validating configuration...");
    config.validate().map_err(CliError::Config)?;

    print_success("Configuration is valid!");

    println!("Configuration Summary:");
    println!("  Server: {}:{}", config.server.bind_address, config.server.bind_port);
    println!("  Daemon: {} (max {} in flight)", config.upstream.url, config.upstream.max_in_flight);
    println!("  Network: {}", config.lifecycle.network);
    println!("  Window: {} blocks", config.lifecycle.window_size);
    println!(
        "  Events: {}",
        if config.lifecycle.push_notifications { "pushed by daemon" } else { "polled" }
    );
    println!("  Persistence: {}", enabled(config.persistence.enabled));
    println!("  Metrics: {}", enabled(config.metrics.enabled));

    Ok(())
}

fn show_config(file: &str, show_sensitive: bool) -> CliResult<()> {
    let config = load(file)?;

    println!("Configuration from {file}:");

    println!("\n[Server]");
    println!("  Bind Address: {}", config.server.bind_address);
    println!("  Bind Port: {}", config.server.bind_port);
    println!("  Max Concurrent Requests: {}", config.server.max_concurrent_requests);

    println!("\n[Upstream]");
    println!("  URL: {}", config.upstream.url);
    println!("  Username: {}", config.upstream.username);
    if show_sensitive || config.upstream.password.is_empty() {
        println!("  Password: {}", config.upstream.password);
    } else {
        println!("  Password: [hidden - use --show-sensitive to reveal]");
    }
    println!("  Max In Flight: {}", config.upstream.max_in_flight);
    println!("  Default Timeout: {}ms", config.upstream.default_timeout_ms);
    println!("  Pacing: {}ms", config.upstream.pacing_ms);

    println!("\n[Cache]");
    println!("  Max Entries: {}", config.cache.max_entries);
    println!(
        "  TTLs: volatile {}s, default {}s, immutable {}s, expensive {}s",
        config.cache.volatile_ttl_seconds,
        config.cache.default_ttl_seconds,
        config.cache.immutable_ttl_seconds,
        config.cache.expensive_ttl_seconds
    );
    for (method, ttl) in &config.cache.method_ttls {
        println!("    {method}: {ttl}s");
    }

    println!("\n[Lifecycle]");
    println!("  Network: {}", config.lifecycle.network);
    println!("  Window Size: {}", config.lifecycle.window_size);
    println!("  Confirmed Cap: {}", config.lifecycle.confirmed_cap);
    println!("  Pending Retention: {}s", config.lifecycle.pending_retention_seconds);
    println!("  Poll Interval: {}s", config.lifecycle.poll_interval_seconds);
    println!("  Push Notifications: {}", config.lifecycle.push_notifications);

    println!("\n[Broadcast]");
    println!(
        "  Ping / Grace: {}s / {}s",
        config.broadcast.ping_interval_seconds, config.broadcast.pong_grace_seconds
    );
    println!("  Channel Capacity: {}", config.broadcast.channel_capacity);

    println!("\n[Persistence]");
    println!("  Enabled: {}", config.persistence.enabled);
    println!("  Path: {}", config.persistence.path.display());
    println!("  Max Age: {}h", config.persistence.max_age_hours);

    println!("\n[Peers]");
    match (&config.peers.peers_dat_path, &config.peers.geo_path) {
        (Some(peers), Some(geo)) => {
            println!("  peers.dat: {}", peers.display());
            println!("  Geolocation: {}", geo.display());
        }
        _ => println!("  Not configured (geoData stays empty)"),
    }

    println!("\n[Logging]");
    println!("  Level: {}", config.logging.level);
    println!("  Format: {}", config.logging.format);

    Ok(())
}

pub(crate) const SAMPLE_CONFIG: &str = r#"# Block explorer relay configuration
# Environment overrides: RELAY__SECTION__KEY, e.g. RELAY__UPSTREAM__PASSWORD=secret

[server]
bind_address = "127.0.0.1"
bind_port = 5001
max_concurrent_requests = 100

[upstream]
url = "http://127.0.0.1:14022"
username = "user"
password = "password"
max_in_flight = 4
default_timeout_ms = 30000
pacing_ms = 25

[cache]
max_entries = 10000
volatile_ttl_seconds = 10
default_ttl_seconds = 60
immutable_ttl_seconds = 3600
expensive_ttl_seconds = 3600
expensive_timeout_ms = 300000

[lifecycle]
network = "mainnet"
window_size = 240
confirmed_cap = 10
pending_retention_seconds = 180
poll_interval_seconds = 10
push_notifications = false

[broadcast]
ping_interval_seconds = 30
pong_grace_seconds = 90
channel_capacity = 256

[persistence]
enabled = true
path = "data/lifecycle-snapshot.json"
interval_seconds = 60
max_age_hours = 24

[metrics]
enabled = true

[logging]
level = "info"
format = "pretty"
"#;

fn generate_config(output: &str, force: bool) -> CliResult<()> {
    if Path::new(output).exists() && !force {
        return Err(CliError::Config(format!(
            "File {output} already exists. Use --force to overwrite."
        )));
    }

    if let Some(parent) = Path::new(output).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, SAMPLE_CONFIG)?;

    print_success(&format!("Sample configuration generated: {output}"));
    print_info("Remember to:");
    print_info("  1. Set the daemon RPC username and password");
    print_info("  2. Point peers.peers_dat_path and peers.geo_path at real files for the peer map");

    Ok(())
}

async fn test_upstream(file: &str) -> CliResult<()> {
    let config = load(file)?;
    print_info(&format!("Testing daemon at {}...", config.upstream.url));

    let transport = HttpTransport::new(config.transport_config())
        .map_err(|e| CliError::Network(e.to_string()))?;

    let start = std::time::Instant::now();
    match transport.invoke("getblockcount", &[]).await {
        Ok(count) => {
            print_success(&format!(
                "Daemon answered: block count {count} ({}ms)",
                start.elapsed().as_millis()
            ));
            Ok(())
        }
        Err(e) => {
            print_error(&format!("Daemon call failed: {e}"));
            print_info("Check the URL, RPC credentials and that the daemon is running");
            Err(CliError::Network(e.to_string()))
        }
    }
}
