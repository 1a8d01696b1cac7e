use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::error::{MetricOpsError, Result};

/// Driver rows requested when the caller does not choose
pub const DEFAULT_TOP_N: u32 = 10;
/// Range accepted by the why-changed endpoint for `top_n`
pub const MIN_TOP_N: u32 = 1;
pub const MAX_TOP_N: u32 = 200;

/// Metric selected on load when the catalog offers it
pub const PREFERRED_METRIC: &str = "orders_sold";

/// Date format used by every endpoint
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Tolerance for the server-side `delta == d2 - d1` invariant
const DELTA_TOLERANCE: f64 = 1e-6;

/// Key only present on rate driver rows
const RATE_PROBE_KEY: &str = "rate_delta";

/// Parse a `YYYY-MM-DD` date as typed by a user
pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|_| MetricOpsError::InvalidDate(raw.to_string()))
}

/// Check a requested driver count against the API's accepted range
pub fn validate_top_n(value: u32) -> Result<u32> {
    if (MIN_TOP_N..=MAX_TOP_N).contains(&value) {
        Ok(value)
    } else {
        Err(MetricOpsError::TopNOutOfRange {
            value,
            min: MIN_TOP_N,
            max: MAX_TOP_N,
        })
    }
}

/// Treat an explicit JSON `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// How a metric aggregates across rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricType {
    /// Summed across rows (gross sales, orders sold)
    Additive,
    /// Ratio of two additive counts (cancellation rate)
    Rate,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Additive => "ADDITIVE",
            MetricType::Rate => "RATE",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry of the certified metric catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub metric_key: String,
    pub metric_name: String,
    pub metric_type: MetricType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_relation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_column: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub metrics: Vec<Metric>,
}

impl MetricsResponse {
    pub fn find(&self, metric_key: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.metric_key == metric_key)
    }

    /// `orders_sold` when available, otherwise the first metric of the catalog.
    pub fn default_selection(&self) -> Option<&Metric> {
        self.find(PREFERRED_METRIC).or_else(|| self.metrics.first())
    }
}

/// Categorical attribute used to slice a metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    ShipState,
    Category,
    Fulfilment,
    ShipServiceLevel,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::ShipState,
        Dimension::Category,
        Dimension::Fulfilment,
        Dimension::ShipServiceLevel,
    ];

    /// Wire key sent as the `dimension` query parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::ShipState => "ship_state",
            Dimension::Category => "category",
            Dimension::Fulfilment => "fulfilment",
            Dimension::ShipServiceLevel => "ship_service_level",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Dimension::ShipState => "Ship State",
            Dimension::Category => "Category",
            Dimension::Fulfilment => "Fulfilment",
            Dimension::ShipServiceLevel => "Ship Service Level",
        }
    }
}

impl Default for Dimension {
    fn default() -> Self {
        Dimension::ShipState
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = MetricOpsError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Dimension::ALL
            .into_iter()
            .find(|d| d.as_str() == normalized)
            .ok_or_else(|| MetricOpsError::UnknownDimension(s.to_string()))
    }
}

/// The KPIs tracked by the summary endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kpi {
    OrdersSold,
    GrossSales,
    UnitsSold,
    Aov,
    CancellationRate,
}

/// How a KPI value is meant to be displayed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Money, with the given number of fraction digits
    Currency { decimals: usize },
    /// Whole-number counts
    Count,
    /// A fraction shown as a percentage
    Rate,
}

impl Kpi {
    /// Display order of the summary cards
    pub const ALL: [Kpi; 5] = [
        Kpi::OrdersSold,
        Kpi::GrossSales,
        Kpi::UnitsSold,
        Kpi::Aov,
        Kpi::CancellationRate,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Kpi::OrdersSold => "orders_sold",
            Kpi::GrossSales => "gross_sales",
            Kpi::UnitsSold => "units_sold",
            Kpi::Aov => "aov",
            Kpi::CancellationRate => "cancellation_rate",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Kpi::OrdersSold => "Orders Sold",
            Kpi::GrossSales => "Gross Sales",
            Kpi::UnitsSold => "Units Sold",
            Kpi::Aov => "AOV",
            Kpi::CancellationRate => "Cancellation Rate",
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Kpi::GrossSales => ValueKind::Currency { decimals: 0 },
            Kpi::Aov => ValueKind::Currency { decimals: 2 },
            Kpi::OrdersSold | Kpi::UnitsSold => ValueKind::Count,
            Kpi::CancellationRate => ValueKind::Rate,
        }
    }
}

/// Period-over-period values for the tracked KPIs.
///
/// Values are optional because the API reports `null` for KPIs that cannot
/// be computed on a date (for example AOV on a day without orders).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSummary {
    pub d1: NaiveDate,
    pub d2: NaiveDate,

    #[serde(default)]
    pub gross_sales_d1: Option<f64>,
    #[serde(default)]
    pub gross_sales_d2: Option<f64>,
    #[serde(default)]
    pub gross_sales_delta: Option<f64>,

    #[serde(default)]
    pub orders_sold_d1: Option<f64>,
    #[serde(default)]
    pub orders_sold_d2: Option<f64>,
    #[serde(default)]
    pub orders_sold_delta: Option<f64>,

    #[serde(default)]
    pub units_sold_d1: Option<f64>,
    #[serde(default)]
    pub units_sold_d2: Option<f64>,
    #[serde(default)]
    pub units_sold_delta: Option<f64>,

    #[serde(default)]
    pub aov_d1: Option<f64>,
    #[serde(default)]
    pub aov_d2: Option<f64>,
    #[serde(default)]
    pub aov_delta: Option<f64>,

    #[serde(default)]
    pub cancellation_rate_d1: Option<f64>,
    #[serde(default)]
    pub cancellation_rate_d2: Option<f64>,
    #[serde(default)]
    pub cancellation_rate_delta: Option<f64>,
}

/// One KPI's values at both dates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KpiReading {
    pub kpi: Kpi,
    pub d1: Option<f64>,
    pub d2: Option<f64>,
    pub delta: Option<f64>,
}

impl KpiReading {
    /// True when all three values are present and `delta != d2 - d1`.
    pub fn is_inconsistent(&self) -> bool {
        match (self.d1, self.d2, self.delta) {
            (Some(d1), Some(d2), Some(delta)) => {
                let expected = d2 - d1;
                let scale = expected.abs().max(delta.abs()).max(1.0);
                (expected - delta).abs() > DELTA_TOLERANCE * scale
            }
            _ => false,
        }
    }
}

impl KpiSummary {
    pub fn reading(&self, kpi: Kpi) -> KpiReading {
        let (d1, d2, delta) = match kpi {
            Kpi::GrossSales => (self.gross_sales_d1, self.gross_sales_d2, self.gross_sales_delta),
            Kpi::OrdersSold => (self.orders_sold_d1, self.orders_sold_d2, self.orders_sold_delta),
            Kpi::UnitsSold => (self.units_sold_d1, self.units_sold_d2, self.units_sold_delta),
            Kpi::Aov => (self.aov_d1, self.aov_d2, self.aov_delta),
            Kpi::CancellationRate => (
                self.cancellation_rate_d1,
                self.cancellation_rate_d2,
                self.cancellation_rate_delta,
            ),
        };
        KpiReading { kpi, d1, d2, delta }
    }

    pub fn readings(&self) -> Vec<KpiReading> {
        Kpi::ALL.iter().map(|kpi| self.reading(*kpi)).collect()
    }

    /// Log every KPI whose delta disagrees with its two values.
    ///
    /// The API owns the invariant; the client only reports drift.
    pub fn check_deltas(&self) -> Vec<Kpi> {
        let drifted: Vec<Kpi> = self
            .readings()
            .into_iter()
            .filter(KpiReading::is_inconsistent)
            .map(|r| r.kpi)
            .collect();
        for kpi in &drifted {
            warn!(kpi = kpi.key(), d1 = %self.d1, d2 = %self.d2, "KPI delta does not match d2 - d1");
        }
        drifted
    }
}

/// Driver row for an additive metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditiveDriver {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<String>,
    #[serde(deserialize_with = "null_as_default", default)]
    pub dim_value: String,
    #[serde(deserialize_with = "null_as_default")]
    pub value_d1: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub value_d2: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub delta: f64,
    /// Fractional change (0.05 = 5 %); `None` when `value_d1` is zero
    #[serde(default)]
    pub pct_change: Option<f64>,
}

/// Driver row for a rate metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateDriver {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<String>,
    #[serde(deserialize_with = "null_as_default", default)]
    pub dim_value: String,
    #[serde(deserialize_with = "null_as_default")]
    pub cancelled_d1: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub total_d1: f64,
    #[serde(default)]
    pub rate_d1: Option<f64>,
    #[serde(deserialize_with = "null_as_default")]
    pub cancelled_d2: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub total_d2: f64,
    #[serde(default)]
    pub rate_d2: Option<f64>,
    /// Fractional difference `rate_d2 - rate_d1`
    #[serde(deserialize_with = "null_as_default")]
    pub rate_delta: f64,
}

/// Driver rows, resolved once per response into one layout
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Drivers {
    Additive(Vec<AdditiveDriver>),
    Rate(Vec<RateDriver>),
}

impl Default for Drivers {
    fn default() -> Self {
        Drivers::Additive(Vec::new())
    }
}

fn by_magnitude_desc(a: f64, b: f64) -> std::cmp::Ordering {
    b.abs().total_cmp(&a.abs())
}

impl Drivers {
    /// Decode raw rows into the layout of `metric_type`.
    pub fn from_rows(metric_type: MetricType, rows: Vec<Value>) -> Result<Self> {
        let rows = Value::Array(rows);
        match metric_type {
            MetricType::Additive => serde_json::from_value(rows)
                .map(Drivers::Additive)
                .map_err(|e| MetricOpsError::DriverShape {
                    expected: "additive",
                    reason: e.to_string(),
                }),
            MetricType::Rate => serde_json::from_value(rows)
                .map(Drivers::Rate)
                .map_err(|e| MetricOpsError::DriverShape {
                    expected: "rate",
                    reason: e.to_string(),
                }),
        }
    }

    pub fn metric_type(&self) -> MetricType {
        match self {
            Drivers::Additive(_) => MetricType::Additive,
            Drivers::Rate(_) => MetricType::Rate,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Drivers::Additive(rows) => rows.len(),
            Drivers::Rate(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy sorted by descending absolute delta, cut to `top_n` rows.
    ///
    /// The sort is stable: rows with equal magnitude keep the API's order.
    pub fn ranked(&self, top_n: Option<usize>) -> Drivers {
        let limit = top_n.unwrap_or(usize::MAX);
        match self {
            Drivers::Additive(rows) => {
                let mut rows = rows.clone();
                rows.sort_by(|a, b| by_magnitude_desc(a.delta, b.delta));
                rows.truncate(limit);
                Drivers::Additive(rows)
            }
            Drivers::Rate(rows) => {
                let mut rows = rows.clone();
                rows.sort_by(|a, b| by_magnitude_desc(a.rate_delta, b.rate_delta));
                rows.truncate(limit);
                Drivers::Rate(rows)
            }
        }
    }
}

/// Why-changed payload as sent by the API, before the driver layout is known
#[derive(Debug, Clone, Deserialize)]
pub struct WhyChangedWire {
    pub metric_key: String,
    pub dimension: String,
    /// Explicit layout tag, when the API provides one
    #[serde(default)]
    pub metric_type: Option<MetricType>,
    pub summary: KpiSummary,
    #[serde(default, deserialize_with = "null_as_default")]
    pub drivers: Vec<Value>,
}

impl WhyChangedWire {
    /// Pick the driver layout and decode the rows.
    ///
    /// Precedence: the payload's own `metric_type`, then `hint` (the type
    /// from the metric catalog), then the presence of `rate_delta` on the
    /// first row. An untagged empty list falls back to additive.
    pub fn resolve(self, hint: Option<MetricType>) -> Result<WhyChangedResponse> {
        let metric_type = self
            .metric_type
            .or(hint)
            .unwrap_or_else(|| probe_driver_type(&self.drivers));
        let drivers = Drivers::from_rows(metric_type, self.drivers)?;
        Ok(WhyChangedResponse {
            metric_key: self.metric_key,
            dimension: self.dimension,
            metric_type,
            summary: self.summary,
            drivers,
        })
    }
}

fn probe_driver_type(rows: &[Value]) -> MetricType {
    let is_rate = rows
        .first()
        .and_then(Value::as_object)
        .map(|row| row.contains_key(RATE_PROBE_KEY))
        .unwrap_or(false);
    if is_rate {
        MetricType::Rate
    } else {
        MetricType::Additive
    }
}

/// Driver breakdown explaining a metric's change between two dates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WhyChangedWire")]
pub struct WhyChangedResponse {
    pub metric_key: String,
    pub dimension: String,
    pub metric_type: MetricType,
    pub summary: KpiSummary,
    pub drivers: Drivers,
}

impl TryFrom<WhyChangedWire> for WhyChangedResponse {
    type Error = MetricOpsError;

    fn try_from(wire: WhyChangedWire) -> Result<Self> {
        wire.resolve(None)
    }
}

/// Outcome of a data-quality run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DqStatus {
    Passed,
    Failed,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for DqStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DqStatus::Passed => "PASSED",
            DqStatus::Failed => "FAILED",
            DqStatus::Unknown => "UNKNOWN",
        })
    }
}

/// Snapshot of the most recent data-quality run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DqLatest {
    pub run_id: i64,
    pub run_ts: String,
    pub source: String,
    pub status: DqStatus,
    pub checks_total: u64,
    pub checks_passed: u64,
    pub checks_failed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DqFailure {
    pub severity: String,
    pub check_name: String,
    pub passed: bool,
    #[serde(default)]
    pub metric_value: Option<f64>,
    #[serde(default)]
    pub threshold_value: Option<f64>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DqFailuresResponse {
    pub failures: Vec<DqFailure>,
}

/// API liveness report, including its database probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    #[serde(default)]
    pub db: Option<i64>,
    #[serde(default)]
    pub env: Option<String>,
}
