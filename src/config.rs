use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// SkyMessage relay server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(
    name = "skymessage-server",
    version,
    about = "SkyMessage presence and call-signaling relay"
)]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "SKYMESSAGE_PORT", default_value = "3000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "SKYMESSAGE_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./skymessage.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "SKYMESSAGE_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Document store configuration (loaded from [store] section in TOML)
    #[arg(skip)]
    #[serde(default)]
    pub store: StoreConfig,
}

/// Connection settings for the external JSON document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the document store API
    #[serde(default = "default_store_base_url")]
    pub base_url: String,

    /// Identifier of the document (bin) holding all collections
    #[serde(default)]
    pub bin_id: String,

    /// Key sent as X-Master-Key on every request
    #[serde(default)]
    pub master_key: String,

    /// Key sent as X-Access-Key on every request
    #[serde(default)]
    pub access_key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_store_base_url(),
            bin_id: String::new(),
            master_key: String::new(),
            access_key: String::new(),
        }
    }
}

fn default_store_base_url() -> String {
    "https://api.jsonbin.io/v3".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            bind_address: "0.0.0.0".to_string(),
            config: "./skymessage.toml".to_string(),
            json_logs: false,
            generate_config: false,
            store: StoreConfig::default(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (SKYMESSAGE_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("SKYMESSAGE_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# SkyMessage Relay Server Configuration
# Place this file at ./skymessage.toml or specify with --config <path>
# All settings can be overridden via environment variables (SKYMESSAGE_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 3000)
# port = 3000

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# ---- Document Store ----
# [store]

# Base URL of the document store API
# base_url = "https://api.jsonbin.io/v3"

# Identifier of the bin holding the users/messages collections
# bin_id = ""

# API keys sent on every store request
# master_key = ""
# access_key = ""
"#
    .to_string()
}
