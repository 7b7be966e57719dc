//! # CLI Interface
//!
//! Defines the command-line argument structure for `umbra-node` using
//! `clap` derive. Supports three subcommands: `run`, `config`, and
//! `version`. Every vault parameter can also be set from the environment.

use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use umbra_adapters::PoolConfig;
use umbra_protocol::config::{
    HealthPolicy, VaultConfig, DEFAULT_COLLATERAL_PRICE, DEFAULT_COLLATERAL_UNIT,
    DEFAULT_DEBT_UNIT, DEFAULT_MAX_VAULT_LTV_BP, DEFAULT_MIN_HEALTH_FACTOR_BP,
    EXCHANGE_RATE_SCALE,
};
use umbra_protocol::Address;

/// Umbra confidential lending vault node.
///
/// Runs one vault against in-memory collaborators, serves its HTTP API,
/// relays decryption requests on a fixed interval, and exposes Prometheus
/// metrics.
#[derive(Parser, Debug)]
#[command(
    name = "umbra-node",
    about = "Umbra confidential lending vault node",
    version,
    propagate_version = true
)]
pub struct UmbraNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Validate the vault parameters and print the effective configuration.
    Config(VaultArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Port for the REST and WebSocket API.
    #[arg(long, env = "UMBRA_API_PORT", default_value_t = 9841)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "UMBRA_METRICS_PORT", default_value_t = 9842)]
    pub metrics_port: u16,

    /// How often the relayer answers queued decryption requests.
    #[arg(long, env = "UMBRA_RELAY_INTERVAL_MS", default_value_t = 500)]
    pub relay_interval_ms: u64,

    /// Log filter when `RUST_LOG` is unset. A bare level applies to the
    /// umbra crates only; full `EnvFilter` directives are used as given.
    #[arg(long, env = "UMBRA_LOG", default_value = "info")]
    pub log_level: String,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "UMBRA_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    #[command(flatten)]
    pub vault: VaultArgs,
}

/// Vault and pool parameters shared by `run` and `config`.
#[derive(Args, Debug, Clone)]
pub struct VaultArgs {
    /// Principal the vault acts as.
    #[arg(long, env = "UMBRA_VAULT_ADDRESS", default_value = "vault")]
    pub vault_address: String,

    /// Initial owner, allowed to pause and unpause.
    #[arg(long, env = "UMBRA_OWNER", default_value = "owner")]
    pub owner: String,

    /// The only principal allowed to deliver decryption callbacks.
    #[arg(long, env = "UMBRA_ORACLE", default_value = "oracle")]
    pub oracle: String,

    /// Vault-wide maximum loan-to-value in basis points.
    #[arg(long, env = "UMBRA_MAX_LTV_BP", default_value_t = DEFAULT_MAX_VAULT_LTV_BP)]
    pub max_ltv_bp: u64,

    /// Minimum per-participant health factor in basis points.
    #[arg(long, env = "UMBRA_MIN_HEALTH_FACTOR_BP", default_value_t = DEFAULT_MIN_HEALTH_FACTOR_BP)]
    pub min_health_factor_bp: u64,

    /// Debt units paid for one whole collateral unit.
    #[arg(long, env = "UMBRA_COLLATERAL_PRICE", default_value_t = DEFAULT_COLLATERAL_PRICE)]
    pub collateral_price: u64,

    /// Base units per whole collateral unit.
    #[arg(long, env = "UMBRA_COLLATERAL_UNIT", default_value_t = DEFAULT_COLLATERAL_UNIT)]
    pub collateral_unit: u64,

    /// Base units per whole debt unit.
    #[arg(long, env = "UMBRA_DEBT_UNIT", default_value_t = DEFAULT_DEBT_UNIT)]
    pub debt_unit: u64,

    /// Advisory decryption deadline in seconds.
    #[arg(long, env = "UMBRA_DECRYPTION_DEADLINE_SECS", default_value_t = 3_600)]
    pub decryption_deadline_secs: u64,

    /// Pool exchange rate, scaled by 1_000_000.
    #[arg(long, env = "UMBRA_EXCHANGE_RATE", default_value_t = EXCHANGE_RATE_SCALE)]
    pub exchange_rate: u64,

    /// Debt asset minted into the pool at startup.
    #[arg(long, env = "UMBRA_POOL_LIQUIDITY", default_value_t = 1_000_000)]
    pub pool_liquidity: u64,

    /// Collateral asset ticker.
    #[arg(long, env = "UMBRA_COLLATERAL_SYMBOL", default_value = "WETH")]
    pub collateral_symbol: String,

    /// Debt asset ticker.
    #[arg(long, env = "UMBRA_DEBT_SYMBOL", default_value = "USDC")]
    pub debt_symbol: String,
}

impl VaultArgs {
    /// Maps the flags onto a [`VaultConfig`]. Not validated here.
    pub fn vault_config(&self) -> VaultConfig {
        let policy = HealthPolicy::default()
            .with_max_vault_ltv(self.max_ltv_bp)
            .with_min_health_factor(self.min_health_factor_bp)
            .with_collateral_price(self.collateral_price)
            .with_units(self.collateral_unit, self.debt_unit);
        VaultConfig::new(
            Address::new(self.vault_address.as_str()),
            Address::new(self.owner.as_str()),
            Address::new(self.oracle.as_str()),
        )
        .with_policy(policy)
        .with_decryption_deadline(Duration::from_secs(self.decryption_deadline_secs))
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            collateral_symbol: self.collateral_symbol.clone(),
            debt_symbol: self.debt_symbol.clone(),
            exchange_rate: self.exchange_rate,
            ..PoolConfig::default()
        }
    }
}
