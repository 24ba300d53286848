use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::*;
use settlement_common::{parse_boolean_flag, Secret};
use settlement_engine::{
    config::{DEFAULT_HOLD_DAYS, DEFAULT_PROBATION_ORDERS, DEFAULT_REFUND_METHOD, DEFAULT_SETTLEMENT_DAY},
    HoldPolicy,
    SettlementConfig,
};

use crate::errors::WorkerError;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/settlement.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_secs(3600);
const DEFAULT_REFUND_RETRY_INTERVAL: Duration = Duration::from_secs(300);
const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(600);
const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:8480";

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Bring the schema up to date before the workers start.
    pub run_migrations: bool,
    pub settlement: SettlementConfig,
    /// How often the payout batch runs.
    pub batch_interval: Duration,
    /// How often refunds stuck in `pending` are sent to the gateway again.
    pub refund_retry_interval: Duration,
    /// How often the gateway is asked about refunds and disbursements it has accepted but not finished.
    pub reconcile_interval: Duration,
    pub gateway: GatewayConfig,
}

#[derive(Clone, Debug, Default)]
pub struct GatewayConfig {
    /// Base URL of the payment gateway's REST API.
    pub url: String,
    pub api_key: Secret<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            run_migrations: true,
            settlement: SettlementConfig::default(),
            batch_interval: DEFAULT_BATCH_INTERVAL,
            refund_retry_interval: DEFAULT_REFUND_RETRY_INTERVAL,
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            gateway: GatewayConfig { url: DEFAULT_GATEWAY_URL.to_string(), api_key: Secret::default() },
        }
    }
}

impl WorkerConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = env::var("SSE_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ SSE_DATABASE_URL is not set. Using the default, {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.to_string()
        });
        let max_connections = env_or_default("SSE_MAX_DB_CONNECTIONS", DEFAULT_MAX_CONNECTIONS);
        let run_migrations = parse_boolean_flag(env::var("SSE_RUN_MIGRATIONS").ok(), true);
        let settlement = settlement_config_from_env();
        let batch_interval =
            Duration::from_secs(env_or_default("SSE_BATCH_INTERVAL_SECS", DEFAULT_BATCH_INTERVAL.as_secs()));
        let refund_retry_interval = Duration::from_secs(env_or_default(
            "SSE_REFUND_RETRY_INTERVAL_SECS",
            DEFAULT_REFUND_RETRY_INTERVAL.as_secs(),
        ));
        let reconcile_interval =
            Duration::from_secs(env_or_default("SSE_RECONCILE_INTERVAL_SECS", DEFAULT_RECONCILE_INTERVAL.as_secs()));
        let gateway = GatewayConfig::from_env_or_default();
        Self {
            database_url,
            max_connections,
            run_migrations,
            settlement,
            batch_interval,
            refund_retry_interval,
            reconcile_interval,
            gateway,
        }
    }

    /// Rejects configurations that would make the workers spin or never run.
    pub fn validate(&self) -> Result<(), WorkerError> {
        if self.batch_interval.is_zero() || self.refund_retry_interval.is_zero() || self.reconcile_interval.is_zero() {
            return Err(WorkerError::ConfigurationError("Worker intervals must be at least one second".into()));
        }
        if self.max_connections == 0 {
            return Err(WorkerError::ConfigurationError("SSE_MAX_DB_CONNECTIONS must be positive".into()));
        }
        if let HoldPolicy::MonthlyCutoff { day, .. } = self.settlement.hold_policy {
            if !(1..=31).contains(&day) {
                return Err(WorkerError::ConfigurationError(format!("{day} is not a valid settlement day")));
            }
        }
        Ok(())
    }
}

impl GatewayConfig {
    pub fn from_env_or_default() -> Self {
        let url = env::var("SSE_GATEWAY_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ SSE_GATEWAY_URL is not set. Using the default, {DEFAULT_GATEWAY_URL}.");
            DEFAULT_GATEWAY_URL.to_string()
        });
        let api_key = Secret::new(env::var("SSE_GATEWAY_API_KEY").ok().unwrap_or_default());
        if !api_key.is_set() {
            error!("🪛️ SSE_GATEWAY_API_KEY is not set. The payment gateway will refuse refunds and payouts.");
        }
        Self { url, api_key }
    }
}

fn settlement_config_from_env() -> SettlementConfig {
    let policy = env::var("SSE_HOLD_POLICY").ok();
    let hold_days = env_or_default("SSE_SETTLEMENT_HOLD_DAYS", DEFAULT_HOLD_DAYS);
    let day = env_or_default("SSE_MONTHLY_SETTLEMENT_DAY", DEFAULT_SETTLEMENT_DAY);
    let probation_orders = env_or_default("SSE_PROBATION_ORDERS", DEFAULT_PROBATION_ORDERS);
    let hold_policy = hold_policy(policy.as_deref(), hold_days, day, probation_orders);
    info!("🪛️ Settlement hold policy: {hold_policy}");
    let default_refund_method = env::var("SSE_DEFAULT_REFUND_METHOD").ok().unwrap_or_else(|| {
        info!("🪛️ SSE_DEFAULT_REFUND_METHOD is not set. Using the default, {DEFAULT_REFUND_METHOD}.");
        DEFAULT_REFUND_METHOD.to_string()
    });
    SettlementConfig { hold_policy, default_refund_method }
}

/// Builds the hold policy from its configuration values. Unknown policy names fall back to the delivery window.
pub fn hold_policy(policy: Option<&str>, hold_days: i64, day: u32, probation_orders: i64) -> HoldPolicy {
    match policy.map(|s| s.trim().to_lowercase()) {
        Some(p) if p == "monthly" => HoldPolicy::MonthlyCutoff { day, probation_orders },
        Some(p) if p == "window" => HoldPolicy::Window(chrono::Duration::days(hold_days)),
        None => HoldPolicy::Window(chrono::Duration::days(hold_days)),
        Some(p) => {
            warn!("🪛️ {p} is not a valid SSE_HOLD_POLICY. Use 'window' or 'monthly'. Using the hold window instead.");
            HoldPolicy::Window(chrono::Duration::days(hold_days))
        },
    }
}

fn env_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    parse_or_default(name, env::var(name).ok(), default)
}

fn parse_or_default<T>(name: &str, value: Option<String>, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match value {
        None => {
            info!("🪛️ {name} is not set. Using the default value of {default}.");
            default
        },
        Some(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
    }
}
