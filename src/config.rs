//! Configuration module for the gateway.
//!
//! Every setting recognized by this crate is read from the environment;
//! a handful of process-level overrides are also exposed as CLI flags
//! via `clap`'s `env` feature so local development can override without
//! exporting a shell variable, with CLI args taking precedence over the
//! environment.

use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use clap::Parser;
use serde::Deserialize;

/// Which downstream backend this gateway instance fronts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Generic EVM JSON-RPC (Infura-style included).
    Ethers,
    Infura,
    Conflux,
    Celo,
    ZkSync,
    Reef,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ethers" | "evm" | "generic" => Ok(BackendKind::Ethers),
            "infura" => Ok(BackendKind::Infura),
            "conflux" | "cfx" => Ok(BackendKind::Conflux),
            "celo" => Ok(BackendKind::Celo),
            "zksync" => Ok(BackendKind::ZkSync),
            "reef" => Ok(BackendKind::Reef),
            other => Err(format!("unknown ETHRPC_NETWORK backend kind: {other}")),
        }
    }
}

/// Conflux's epoch label, the backend-config `epochLabel` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochLabel {
    LatestState,
    LatestConfirmed,
    LatestFinalized,
    LatestCheckpoint,
}

impl EpochLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EpochLabel::LatestState => "latest_state",
            EpochLabel::LatestConfirmed => "latest_confirmed",
            EpochLabel::LatestFinalized => "latest_finalized",
            EpochLabel::LatestCheckpoint => "latest_checkpoint",
        }
    }
}

impl FromStr for EpochLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest_state" => Ok(EpochLabel::LatestState),
            "latest_confirmed" => Ok(EpochLabel::LatestConfirmed),
            "latest_finalized" => Ok(EpochLabel::LatestFinalized),
            "latest_checkpoint" => Ok(EpochLabel::LatestCheckpoint),
            other => Err(format!("unknown epoch label: {other}")),
        }
    }
}

/// Shared gas tuning knobs, one instance per backend (prefix
/// `ETHRPC_ETHERS_`/`ETHRPC_INFURA_`/`ETHRPC_CONFLUX_`/`ETHRPC_CELO_`).
#[derive(Debug, Clone)]
pub struct GasPolicy {
    pub default_gas_price: u128,
    pub default_gas_limit: u128,
    pub estimate_gas_price: bool,
    pub estimate_gas_limit: bool,
    pub gas_price_factor: f64,
    pub gas_limit_factor: f64,
    pub force_eip155: bool,
    pub force_eip1559: bool,
    pub eth_gas_price_factor: bool,
    pub always_synced: bool,
    pub mock_filters: bool,
}

impl GasPolicy {
    /// Reads `ETHRPC_<PREFIX>_*` variables, falling back to conservative
    /// defaults when unset.
    pub fn from_env(prefix: &str) -> Self {
        let var = |name: &str| env::var(format!("ETHRPC_{prefix}_{name}")).ok();
        let parse_or =
            |name: &str, default: u128| -> u128 { var(name).and_then(|v| v.parse().ok()).unwrap_or(default) };
        let parse_f64_or =
            |name: &str, default: f64| -> f64 { var(name).and_then(|v| v.parse().ok()).unwrap_or(default) };
        let parse_bool_or =
            |name: &str, default: bool| -> bool { var(name).and_then(|v| v.parse().ok()).unwrap_or(default) };

        GasPolicy {
            default_gas_price: parse_or("GAS_PRICE", 20_000_000_000),
            default_gas_limit: parse_or("GAS_LIMIT", 6_000_000),
            estimate_gas_price: parse_bool_or("ESTIMATE_GAS_PRICE", true),
            estimate_gas_limit: parse_bool_or("ESTIMATE_GAS_LIMIT", true),
            gas_price_factor: parse_f64_or("GAS_PRICE_FACTOR", 1.0),
            gas_limit_factor: parse_f64_or("GAS_LIMIT_FACTOR", 1.0),
            force_eip155: parse_bool_or("FORCE_EIP_155", false),
            force_eip1559: parse_bool_or("FORCE_EIP_1559", false),
            eth_gas_price_factor: parse_bool_or("ETH_GAS_PRICE_FACTOR", false),
            always_synced: parse_bool_or("ALWAYS_SYNCED", false),
            mock_filters: parse_bool_or("MOCK_FILTERS", false),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfluxExtra {
    pub epoch_label: EpochLabel,
    pub confirmation_epochs: u64,
    pub network_id: u32,
}

#[derive(Debug, Clone)]
pub struct CeloExtra {
    pub fee_currency: Option<String>,
    pub gas_price_max: u128,
}

#[derive(Debug, Clone)]
pub struct ReefExtra {
    pub graph_url: url::Url,
    /// Substrate address for wallet `i`, paired positionally with
    /// `WalletSet`'s wallet `i` (see `WalletSet::build`). Empty entries
    /// leave that wallet's `substrate` identity unset.
    pub substrate_addresses: Vec<String>,
}

/// Identity configuration: how the [`crate::wallet::WalletSet`] gets built.
#[derive(Debug, Clone, Default)]
pub struct IdentityConfig {
    pub seed_phrase: Option<String>,
    pub seed_phrase_wallets: u32,
    pub private_keys: Vec<String>,
}

/// CLI overrides. All of these also have an environment-variable
/// equivalent via `clap`'s `env` attribute, so the process can be
/// configured without any flags at all (the normal deployment path).
#[derive(Parser, Debug)]
#[command(name = "ethrpc-gateway")]
#[command(about = "Ethereum JSON-RPC façade with local signing")]
pub struct CliArgs {
    #[arg(long, env = "ETHRPC_PORT", default_value_t = 8545)]
    pub port: u16,

    #[arg(long, env = "ETHRPC_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Full resolved configuration for one gateway process.
pub struct Config {
    pub port: u16,
    pub host: IpAddr,
    pub backend: BackendKind,
    pub provider_url: url::Url,
    pub provider_key: Option<String>,
    pub network: Option<String>,
    pub identity: IdentityConfig,
    pub interleave_blocks: u64,
    pub conflux: Option<ConfluxExtra>,
    pub celo: Option<CeloExtra>,
    pub reef: Option<ReefExtra>,
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

impl Config {
    /// Loads configuration from CLI args (which themselves fall back to
    /// environment variables) plus the remaining `ETHRPC_*` variables that
    /// have no CLI equivalent.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let backend = env::var("ETHRPC_NETWORK")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .map_err(|e| ConfigError::Invalid("ETHRPC_NETWORK", e))?
            .unwrap_or(BackendKind::Ethers);

        let provider_url = env::var("ETHRPC_PROVIDER_URL")
            .map_err(|_| ConfigError::Missing("ETHRPC_PROVIDER_URL"))
            .and_then(|v| {
                url::Url::parse(&v).map_err(|e| ConfigError::Invalid("ETHRPC_PROVIDER_URL", e.to_string()))
            })?;

        let identity = IdentityConfig {
            seed_phrase: env::var("ETHRPC_SEED_PHRASE").ok(),
            seed_phrase_wallets: env::var("ETHRPC_SEED_PHRASE_WALLETS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            private_keys: env::var("ETHRPC_PRIVATE_KEYS")
                .ok()
                .map(|raw| {
                    serde_json::from_str::<Vec<String>>(&raw)
                        .map_err(|e| ConfigError::Invalid("ETHRPC_PRIVATE_KEYS", e.to_string()))
                })
                .transpose()?
                .unwrap_or_default(),
        };

        let interleave_blocks = env::var("ETHRPC_CALL_INTERLEAVE_BLOCKS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let conflux = if backend == BackendKind::Conflux {
            Some(ConfluxExtra {
                epoch_label: env::var("ETHRPC_CONFLUX_DEFAULT_EPOCH_LABEL")
                    .ok()
                    .map(|v| v.parse())
                    .transpose()
                    .map_err(|e| ConfigError::Invalid("ETHRPC_CONFLUX_DEFAULT_EPOCH_LABEL", e))?
                    .unwrap_or(EpochLabel::LatestState),
                confirmation_epochs: env::var("ETHRPC_CONFLUX_CONFIRMATION_EPOCHS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0),
                network_id: env::var("ETHRPC_CONFLUX_NETWORK_ID")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1029),
            })
        } else {
            None
        };

        let celo = if backend == BackendKind::Celo {
            Some(CeloExtra {
                fee_currency: env::var("CELO_FEE_CURRENCY").ok(),
                gas_price_max: env::var("CELO_GAS_PRICE_MAX")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(u128::MAX),
            })
        } else {
            None
        };

        let reef = if backend == BackendKind::Reef {
            let url = env::var("REEF_GRAPHQL_URL").map_err(|_| ConfigError::Missing("REEF_GRAPHQL_URL"))?;
            let substrate_addresses = env::var("REEF_SUBSTRATE_ADDRESSES")
                .ok()
                .map(|raw| {
                    serde_json::from_str::<Vec<String>>(&raw)
                        .map_err(|e| ConfigError::Invalid("REEF_SUBSTRATE_ADDRESSES", e.to_string()))
                })
                .transpose()?
                .unwrap_or_default();
            Some(ReefExtra {
                graph_url: url::Url::parse(&url)
                    .map_err(|e| ConfigError::Invalid("REEF_GRAPHQL_URL", e.to_string()))?,
                substrate_addresses,
            })
        } else {
            None
        };

        Ok(Config {
            port: cli.port,
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            backend,
            provider_url,
            provider_key: env::var("ETHRPC_PROVIDER_KEY").ok(),
            network: env::var("ETHRPC_NETWORK").ok(),
            identity,
            interleave_blocks,
            conflux,
            celo,
            reef,
            log_level: cli.log_level,
        })
    }

    /// Gas policy section prefix for this backend (`ETHERS`, `INFURA`,
    /// `CONFLUX`, `CELO`) — zkSync and Reef share the generic `ETHERS`
    /// prefix since only those four have their own recognized knobs.
    pub fn gas_policy_prefix(&self) -> &'static str {
        match self.backend {
            BackendKind::Ethers | BackendKind::ZkSync | BackendKind::Reef => "ETHERS",
            BackendKind::Infura => "INFURA",
            BackendKind::Conflux => "CONFLUX",
            BackendKind::Celo => "CELO",
        }
    }
}
