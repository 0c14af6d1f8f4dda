//! Configuration types for exit-guard
//!
//! Every policy constant has a documented default. Missing keys fall back to
//! their defaults silently; a section that is present but malformed or
//! semantically invalid is replaced by its defaults and recorded as a gap.

use chrono::NaiveTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub limits: HardLimitsConfig,
    #[serde(default)]
    pub drawdown: DrawdownCurveConfig,
    #[serde(default)]
    pub reverse_sl: ReverseStopConfig,
    #[serde(default)]
    pub trailing: TrailingConfig,
    #[serde(default)]
    pub signals: SignalExitConfig,
    #[serde(default)]
    pub capital: CapitalConfig,
    #[serde(default)]
    pub halt: HaltGateConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Sections that were replaced by defaults while loading
    #[serde(skip)]
    pub gaps: Vec<ConfigGap>,
}

/// A configuration section that could not be used as written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigGap {
    pub section: String,
    pub problem: String,
}

impl std::fmt::Display for ConfigGap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.section, self.problem)
    }
}

/// Exchange session calendar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Exchange-local market open (e.g. "09:15:00")
    #[serde(default = "default_open_time")]
    pub open_time: NaiveTime,

    /// Exchange-local market close (e.g. "15:30:00")
    #[serde(default = "default_close_time")]
    pub close_time: NaiveTime,

    /// Exchange offset from UTC in minutes (IST = 330)
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,

    /// Positions are force-exited this many minutes before close
    #[serde(default = "default_exit_window_minutes")]
    pub exit_window_minutes: i64,
}

fn default_open_time() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 15, 0).unwrap_or(NaiveTime::MIN)
}
fn default_close_time() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN)
}
fn default_utc_offset_minutes() -> i32 {
    330
}
fn default_exit_window_minutes() -> i64 {
    15
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            open_time: default_open_time(),
            close_time: default_close_time(),
            utc_offset_minutes: default_utc_offset_minutes(),
            exit_window_minutes: default_exit_window_minutes(),
        }
    }
}

/// Static stop-loss / take-profit safety net
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardLimitsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Exit when loss reaches this percentage of entry
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,

    /// Exit when profit reaches this percentage of entry
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: Decimal,
}

fn default_true() -> bool {
    true
}
fn default_stop_loss_pct() -> Decimal {
    dec!(30)
}
fn default_take_profit_pct() -> Decimal {
    dec!(100)
}

impl Default for HardLimitsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
        }
    }
}

/// Allowed give-back of profit from peak
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrawdownCurveConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Profit percentage at which the curve activates
    #[serde(default = "default_profit_min_pct")]
    pub profit_min_pct: Decimal,

    /// Profit percentage at which the curve reaches `dd_end_pct`
    #[serde(default = "default_profit_max_pct")]
    pub profit_max_pct: Decimal,

    /// Allowed drawdown at `profit_min_pct` (loose)
    #[serde(default = "default_dd_start_pct")]
    pub dd_start_pct: Decimal,

    /// Allowed drawdown at and above `profit_max_pct` (tight)
    #[serde(default = "default_dd_end_pct")]
    pub dd_end_pct: Decimal,

    /// Exponential steepness; zero or negative interpolates linearly
    #[serde(default = "default_steepness")]
    pub k: f64,
}

fn default_profit_min_pct() -> Decimal {
    dec!(3)
}
fn default_profit_max_pct() -> Decimal {
    dec!(30)
}
fn default_dd_start_pct() -> Decimal {
    dec!(15)
}
fn default_dd_end_pct() -> Decimal {
    dec!(1)
}
fn default_steepness() -> f64 {
    3.0
}

impl Default for DrawdownCurveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            profit_min_pct: default_profit_min_pct(),
            profit_max_pct: default_profit_max_pct(),
            dd_start_pct: default_dd_start_pct(),
            dd_end_pct: default_dd_end_pct(),
            k: default_steepness(),
        }
    }
}

/// Volatility penalty applied to the reverse stop-loss
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtrPenalty {
    /// ATR ratio (current / recent) at or below which the penalty applies; must be < 1.0
    pub ratio: Decimal,
    /// Percentage points subtracted from the allowed loss
    pub penalty_pct: Decimal,
}

/// Loss-side dynamic stop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReverseStopConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Allowed loss for small losses
    #[serde(default = "default_max_loss_pct")]
    pub max_loss_pct: Decimal,

    /// Allowed loss once the loss reaches `loss_span_pct`
    #[serde(default = "default_min_loss_pct")]
    pub min_loss_pct: Decimal,

    #[serde(default = "default_loss_span_pct")]
    pub loss_span_pct: Decimal,

    /// Tightening per minute spent below entry
    #[serde(default = "default_tighten_per_minute")]
    pub tighten_per_minute: Decimal,

    #[serde(default = "default_atr_penalties")]
    pub atr_penalties: Vec<AtrPenalty>,
}

fn default_max_loss_pct() -> Decimal {
    dec!(20)
}
fn default_min_loss_pct() -> Decimal {
    dec!(5)
}
fn default_loss_span_pct() -> Decimal {
    dec!(30)
}
fn default_tighten_per_minute() -> Decimal {
    dec!(0.5)
}
fn default_atr_penalties() -> Vec<AtrPenalty> {
    vec![
        AtrPenalty {
            ratio: dec!(0.8),
            penalty_pct: dec!(1),
        },
        AtrPenalty {
            ratio: dec!(0.6),
            penalty_pct: dec!(2),
        },
    ]
}

impl Default for ReverseStopConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_loss_pct: default_max_loss_pct(),
            min_loss_pct: default_min_loss_pct(),
            loss_span_pct: default_loss_span_pct(),
            tighten_per_minute: default_tighten_per_minute(),
            atr_penalties: default_atr_penalties(),
        }
    }
}

/// One row of the trailing stop table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingTier {
    pub threshold_pct: Decimal,
    pub offset_pct: Decimal,
}

/// Gate for the peak-drawdown check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeakDrawdownGate {
    /// Peak profit required before drawdown exits are considered
    #[serde(default = "default_gate_activation_pct")]
    pub activation_profit_pct: Decimal,

    /// Trailing offset the stop must have reached
    #[serde(default = "default_gate_min_offset_pct")]
    pub min_offset_pct: Decimal,
}

fn default_gate_activation_pct() -> Decimal {
    dec!(10)
}
fn default_gate_min_offset_pct() -> Decimal {
    dec!(-5)
}

impl Default for PeakDrawdownGate {
    fn default() -> Self {
        Self {
            activation_profit_pct: default_gate_activation_pct(),
            min_offset_pct: default_gate_min_offset_pct(),
        }
    }
}

/// Tiered trailing stop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_trailing_tiers")]
    pub tiers: Vec<TrailingTier>,

    #[serde(default)]
    pub peak_drawdown: PeakDrawdownGate,
}

fn default_trailing_tiers() -> Vec<TrailingTier> {
    [
        (dec!(5), dec!(-15)),
        (dec!(10), dec!(-5)),
        (dec!(15), dec!(0)),
        (dec!(25), dec!(10)),
        (dec!(40), dec!(20)),
        (dec!(60), dec!(30)),
        (dec!(80), dec!(40)),
        (dec!(120), dec!(60)),
    ]
    .into_iter()
    .map(|(threshold_pct, offset_pct)| TrailingTier {
        threshold_pct,
        offset_pct,
    })
    .collect()
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tiers: default_trailing_tiers(),
            peak_drawdown: PeakDrawdownGate::default(),
        }
    }
}

/// Qualitative exits fed by the signal layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalExitConfig {
    #[serde(default = "default_true")]
    pub early_trend_failure: bool,
    #[serde(default = "default_true")]
    pub structure_break: bool,
}

impl Default for SignalExitConfig {
    fn default() -> Self {
        Self {
            early_trend_failure: true,
            structure_break: true,
        }
    }
}

/// Capital band: allocation and risk percentages for balances up to `upper_bound`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapitalBand {
    /// Inclusive upper bound; `None` is unbounded
    #[serde(default)]
    pub upper_bound: Option<Decimal>,
    pub alloc_pct: Decimal,
    pub risk_pct: Decimal,
}

/// Per-index sizing and floor policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexPolicy {
    pub lot_size: u32,
    /// Assumed stop distance (percent of premium) for the risk cap
    #[serde(default = "default_stop_distance_pct")]
    pub stop_distance_pct: Decimal,
    #[serde(default = "default_scale_multiplier")]
    pub scale_multiplier: Decimal,
    /// Minimum allowed drawdown in percentage points
    #[serde(default = "default_drawdown_floor_pct")]
    pub drawdown_floor_pct: Decimal,
}

fn default_stop_distance_pct() -> Decimal {
    dec!(30)
}
fn default_scale_multiplier() -> Decimal {
    dec!(1)
}
fn default_drawdown_floor_pct() -> Decimal {
    dec!(1)
}

impl Default for IndexPolicy {
    fn default() -> Self {
        Self {
            lot_size: 1,
            stop_distance_pct: default_stop_distance_pct(),
            scale_multiplier: default_scale_multiplier(),
            drawdown_floor_pct: default_drawdown_floor_pct(),
        }
    }
}

/// Capital sizing and paper balance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapitalConfig {
    /// Paper balance each trading day starts from
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,

    #[serde(default = "default_bands")]
    pub bands: Vec<CapitalBand>,

    #[serde(default = "default_indices")]
    pub indices: HashMap<String, IndexPolicy>,

    /// Policy for index keys missing from `indices`
    #[serde(default)]
    pub fallback: IndexPolicy,
}

fn default_initial_balance() -> Decimal {
    dec!(100000)
}
fn default_bands() -> Vec<CapitalBand> {
    vec![
        CapitalBand {
            upper_bound: Some(dec!(75000)),
            alloc_pct: dec!(30),
            risk_pct: dec!(5),
        },
        CapitalBand {
            upper_bound: Some(dec!(150000)),
            alloc_pct: dec!(25),
            risk_pct: dec!(3.5),
        },
        CapitalBand {
            upper_bound: Some(dec!(300000)),
            alloc_pct: dec!(20),
            risk_pct: dec!(3),
        },
        CapitalBand {
            upper_bound: None,
            alloc_pct: dec!(20),
            risk_pct: dec!(2.5),
        },
    ]
}
fn default_indices() -> HashMap<String, IndexPolicy> {
    let mut indices = HashMap::new();
    indices.insert(
        "NIFTY".to_string(),
        IndexPolicy {
            lot_size: 75,
            ..IndexPolicy::default()
        },
    );
    indices.insert(
        "BANKNIFTY".to_string(),
        IndexPolicy {
            lot_size: 35,
            drawdown_floor_pct: dec!(1.5),
            ..IndexPolicy::default()
        },
    );
    indices.insert(
        "SENSEX".to_string(),
        IndexPolicy {
            lot_size: 20,
            drawdown_floor_pct: dec!(1.5),
            ..IndexPolicy::default()
        },
    );
    indices
}

impl Default for CapitalConfig {
    fn default() -> Self {
        Self {
            initial_balance: default_initial_balance(),
            bands: default_bands(),
            indices: default_indices(),
            fallback: IndexPolicy::default(),
        }
    }
}

impl CapitalConfig {
    /// Policy for an index key, falling back to the default policy
    pub fn policy_for(&self, index_key: &str) -> &IndexPolicy {
        self.indices.get(index_key).unwrap_or(&self.fallback)
    }
}

/// Realized-profit protection gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaltGateConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Realized profit (percent of initial capital) that engages the gate
    #[serde(default = "default_halt_threshold_pct")]
    pub profit_threshold_pct: Decimal,

    /// Minimum signal confidence (0..1) to trade past the threshold
    #[serde(default = "default_min_confidence")]
    pub min_confidence: Decimal,
}

fn default_halt_threshold_pct() -> Decimal {
    dec!(20)
}
fn default_min_confidence() -> Decimal {
    dec!(0.6)
}

impl Default for HaltGateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            profit_threshold_pct: default_halt_threshold_pct(),
            min_confidence: default_min_confidence(),
        }
    }
}

/// Automatic circuit breaker triggers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failed exits that trip the breaker
    #[serde(default = "default_exit_failure_threshold")]
    pub exit_failure_threshold: u32,

    /// How long an automatic trip lasts
    #[serde(default = "default_trip_ttl_secs")]
    pub trip_ttl_secs: u64,
}

fn default_exit_failure_threshold() -> u32 {
    3
}
fn default_trip_ttl_secs() -> u64 {
    1800
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            exit_failure_threshold: default_exit_failure_threshold(),
            trip_ttl_secs: default_trip_ttl_secs(),
        }
    }
}

/// Command execution retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base of the exponential backoff: attempt n sleeps base * 2^(n-1)
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Gateway calls slower than this become retryable failures
    #[serde(default = "default_gateway_timeout_ms")]
    pub gateway_timeout_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    1000
}
fn default_gateway_timeout_ms() -> u64 {
    5000
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            gateway_timeout_ms: default_gateway_timeout_ms(),
        }
    }
}

/// Background worker intervals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_monitor_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    /// Grace period before a stopping worker is aborted
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// Ticks older than this are treated as missing
    #[serde(default = "default_price_stale_secs")]
    pub price_stale_secs: u64,
    /// Path of the JSON-lines command audit log; in-memory when unset
    #[serde(default)]
    pub audit_log_path: Option<std::path::PathBuf>,
}

fn default_monitor_interval_secs() -> u64 {
    5
}
fn default_heartbeat_interval_secs() -> u64 {
    30
}
fn default_reconcile_interval_secs() -> u64 {
    60
}
fn default_shutdown_grace_secs() -> u64 {
    10
}
fn default_price_stale_secs() -> u64 {
    60
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_monitor_interval_secs(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            price_stale_secs: default_price_stale_secs(),
            audit_log_path: None,
        }
    }
}

/// Execution engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub mode: ExecutionMode,
}

/// Execution mode: paper trading or live
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Paper,
    Live,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format
    #[default]
    Pretty,
    /// JSON format for log aggregation
    Json,
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus listener port; disabled when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load configuration, degrading to defaults when the file is unreadable
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                let mut config = Self::default();
                config.gaps.push(ConfigGap {
                    section: "*".to_string(),
                    problem: format!("could not load {}: {}", path.display(), e),
                });
                config
            }
        }
    }

    /// Parse configuration section by section
    ///
    /// Only a document that is not valid TOML is an error. Each section that
    /// fails to deserialize or validate is replaced by its defaults.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let table: toml::Table = toml::from_str(content)?;
        let mut gaps = Vec::new();

        let mut config = Self {
            session: section(&table, "session", &mut gaps),
            limits: section(&table, "limits", &mut gaps),
            drawdown: section(&table, "drawdown", &mut gaps),
            reverse_sl: section(&table, "reverse_sl", &mut gaps),
            trailing: section(&table, "trailing", &mut gaps),
            signals: section(&table, "signals", &mut gaps),
            capital: section(&table, "capital", &mut gaps),
            halt: section(&table, "halt", &mut gaps),
            breaker: section(&table, "breaker", &mut gaps),
            executor: section(&table, "executor", &mut gaps),
            monitor: section(&table, "monitor", &mut gaps),
            execution: section(&table, "execution", &mut gaps),
            telemetry: section(&table, "telemetry", &mut gaps),
            gaps: Vec::new(),
        };
        config.validate(&mut gaps);
        config.gaps = gaps;
        Ok(config)
    }

    /// Replace semantically invalid sections with their defaults
    fn validate(&mut self, gaps: &mut Vec<ConfigGap>) {
        let mut gap = |section: &str, problem: &str| {
            gaps.push(ConfigGap {
                section: section.to_string(),
                problem: problem.to_string(),
            })
        };

        let dd = &self.drawdown;
        if dd.profit_max_pct <= dd.profit_min_pct || dd.dd_end_pct > dd.dd_start_pct {
            gap("drawdown", "profit range or drawdown range is inverted");
            self.drawdown = DrawdownCurveConfig::default();
        }

        let rsl = &self.reverse_sl;
        if rsl.min_loss_pct > rsl.max_loss_pct || rsl.min_loss_pct < Decimal::ZERO {
            gap("reverse_sl", "min_loss_pct must be between 0 and max_loss_pct");
            self.reverse_sl = ReverseStopConfig::default();
        }

        if self.trailing.tiers.is_empty() {
            gap("trailing", "tier table is empty");
            self.trailing.tiers = default_trailing_tiers();
        }
        self.trailing
            .tiers
            .sort_by(|a, b| a.threshold_pct.cmp(&b.threshold_pct));

        if self.capital.bands.is_empty() {
            gap("capital", "band table is empty");
            self.capital.bands = default_bands();
        }
        if self.capital.indices.values().any(|p| p.lot_size == 0) {
            gap("capital", "index lot_size must be positive");
            self.capital.indices = default_indices();
        }

        if self.monitor.interval_secs == 0 {
            gap("monitor", "interval_secs must be positive");
            self.monitor.interval_secs = default_monitor_interval_secs();
        }
    }
}

/// Deserialize one top-level section, recording a gap on failure
fn section<T: DeserializeOwned + Default>(
    table: &toml::Table,
    name: &str,
    gaps: &mut Vec<ConfigGap>,
) -> T {
    let Some(value) = table.get(name) else {
        return T::default();
    };

    match value.clone().try_into::<T>() {
        Ok(parsed) => parsed,
        Err(e) => {
            gaps.push(ConfigGap {
                section: name.to_string(),
                problem: e.to_string(),
            });
            T::default()
        }
    }
}
