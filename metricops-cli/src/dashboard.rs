//! Root view controller
//!
//! Owns the interactive selection, the latest payload of every panel and a
//! per-panel error slot. Each fetch action only ever writes its own panel.

use chrono::{DateTime, Local, NaiveDate};
use metricops_client::{ApiResult, MetricsApi, WhyChangedQuery};
use metricops_common::{
    validate_top_n, DashboardConfig, Dimension, DqFailuresResponse, DqLatest, Kpi, KpiSummary,
    Metric, MetricsResponse, Result as CommonResult, WhyChangedResponse,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Panels that can hold an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PanelId {
    Catalog,
    Kpi,
    Why,
    Dq,
}

impl PanelId {
    pub fn label(&self) -> &'static str {
        match self {
            PanelId::Catalog => "Metric catalog",
            PanelId::Kpi => "KPI Summary",
            PanelId::Why => "Why Changed",
            PanelId::Dq => "Data Quality",
        }
    }
}

/// Lifecycle of a panel, as seen by the renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    /// Never run
    Idle,
    Loading,
    Loaded,
}

/// Latest payload of one panel
#[derive(Debug, Clone)]
pub struct Panel<T> {
    data: Option<T>,
    loading: bool,
    updated_at: Option<DateTime<Local>>,
}

impl<T> Default for Panel<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            updated_at: None,
        }
    }
}

impl<T> Panel<T> {
    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn updated_at(&self) -> Option<DateTime<Local>> {
        self.updated_at
    }

    pub fn state(&self) -> PanelState {
        if self.loading {
            PanelState::Loading
        } else if self.data.is_some() {
            PanelState::Loaded
        } else {
            PanelState::Idle
        }
    }
}

/// Both data-quality payloads, committed together or not at all
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DqSnapshot {
    pub latest: DqLatest,
    pub failures: DqFailuresResponse,
}

/// User-chosen request parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub metric_key: String,
    pub dimension: Dimension,
    /// Earlier date; `None` lets the API pick
    pub d1: Option<NaiveDate>,
    /// Later date; `None` lets the API pick
    pub d2: Option<NaiveDate>,
    pub top_n: u32,
    pub show_debug: bool,
}

impl Selection {
    pub fn from_config(config: &DashboardConfig) -> Self {
        Self {
            metric_key: config.default_metric.clone(),
            dimension: config.default_dimension,
            d1: None,
            d2: None,
            top_n: config.default_top_n,
            show_debug: false,
        }
    }
}

/// Store `result` into `panel` or into the panel's error slot, then stop loading.
fn settle<T>(
    panel: &mut Panel<T>,
    errors: &mut BTreeMap<PanelId, String>,
    id: PanelId,
    result: ApiResult<T>,
) {
    match result {
        Ok(data) => {
            panel.data = Some(data);
            panel.updated_at = Some(Local::now());
            info!(panel = id.label(), "panel loaded");
        }
        Err(e) => {
            // Previously loaded data stays on screen
            warn!(panel = id.label(), error = %e, "panel failed to load");
            errors.insert(id, e.to_string());
        }
    }
    panel.loading = false;
}

async fn fetch_dq<A: MetricsApi>(api: &A) -> ApiResult<DqSnapshot> {
    let (latest, failures) = tokio::try_join!(api.get_dq_latest(), api.get_dq_failures())?;
    Ok(DqSnapshot { latest, failures })
}

/// Dashboard state over any [`MetricsApi`]
pub struct Dashboard<A: MetricsApi> {
    api: A,
    catalog: Option<MetricsResponse>,
    selection: Selection,
    kpi: Panel<KpiSummary>,
    why: Panel<WhyChangedResponse>,
    dq: Panel<DqSnapshot>,
    errors: BTreeMap<PanelId, String>,
    /// KPIs whose delta disagrees with `d2 - d1` in the last loaded summary
    drift: BTreeMap<PanelId, Vec<Kpi>>,
}

impl<A: MetricsApi> Dashboard<A> {
    pub fn new(api: A, selection: Selection) -> Self {
        Self {
            api,
            catalog: None,
            selection,
            kpi: Panel::default(),
            why: Panel::default(),
            dq: Panel::default(),
            errors: BTreeMap::new(),
            drift: BTreeMap::new(),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn catalog(&self) -> Option<&MetricsResponse> {
        self.catalog.as_ref()
    }

    /// Catalog entry of the selected metric, once the catalog is loaded
    pub fn selected_metric(&self) -> Option<&Metric> {
        self.catalog.as_ref()?.find(&self.selection.metric_key)
    }

    pub fn select_metric(&mut self, metric_key: impl Into<String>) {
        self.selection.metric_key = metric_key.into();
    }

    pub fn set_dimension(&mut self, dimension: Dimension) {
        self.selection.dimension = dimension;
    }

    pub fn set_dates(&mut self, d1: Option<NaiveDate>, d2: Option<NaiveDate>) {
        self.selection.d1 = d1;
        self.selection.d2 = d2;
    }

    pub fn set_top_n(&mut self, top_n: u32) -> CommonResult<()> {
        self.selection.top_n = validate_top_n(top_n)?;
        Ok(())
    }

    pub fn set_show_debug(&mut self, show_debug: bool) {
        self.selection.show_debug = show_debug;
    }

    pub fn kpi(&self) -> &Panel<KpiSummary> {
        &self.kpi
    }

    pub fn why(&self) -> &Panel<WhyChangedResponse> {
        &self.why
    }

    pub fn dq(&self) -> &Panel<DqSnapshot> {
        &self.dq
    }

    pub fn dq_latest(&self) -> Option<&DqLatest> {
        self.dq.data().map(|s| &s.latest)
    }

    pub fn dq_failures(&self) -> Option<&DqFailuresResponse> {
        self.dq.data().map(|s| &s.failures)
    }

    pub fn error(&self, panel: PanelId) -> Option<&str> {
        self.errors.get(&panel).map(String::as_str)
    }

    /// Active errors in panel order
    pub fn errors(&self) -> impl Iterator<Item = (PanelId, &str)> {
        self.errors.iter().map(|(id, msg)| (*id, msg.as_str()))
    }

    /// KPIs flagged by the delta check on `panel`'s summary
    pub fn drifted_kpis(&self, panel: PanelId) -> &[Kpi] {
        self.drift.get(&panel).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Load the metric catalog and settle the metric selection.
    ///
    /// A selection found in the catalog is kept; otherwise `orders_sold`
    /// when offered, else the first metric.
    pub async fn load_catalog(&mut self) {
        self.errors.remove(&PanelId::Catalog);
        match self.api.list_metrics().await {
            Ok(catalog) => {
                if catalog.find(&self.selection.metric_key).is_none() {
                    if let Some(metric) = catalog.default_selection() {
                        info!(
                            requested = %self.selection.metric_key,
                            selected = %metric.metric_key,
                            "selected metric not in catalog, using default"
                        );
                        self.selection.metric_key = metric.metric_key.clone();
                    }
                }
                self.catalog = Some(catalog);
            }
            Err(e) => {
                warn!(error = %e, "metric catalog failed to load");
                self.errors.insert(PanelId::Catalog, e.to_string());
            }
        }
    }

    fn begin(&mut self, id: PanelId) {
        self.errors.remove(&id);
        match id {
            PanelId::Kpi => self.kpi.loading = true,
            PanelId::Why => self.why.loading = true,
            PanelId::Dq => self.dq.loading = true,
            PanelId::Catalog => {}
        }
    }

    /// Query for the current selection, typed with the catalog's metric type
    pub fn why_query(&self) -> WhyChangedQuery {
        WhyChangedQuery::new(self.selection.metric_key.clone(), self.selection.dimension)
            .top_n(self.selection.top_n)
            .dates(self.selection.d1, self.selection.d2)
            .metric_type(self.selected_metric().map(|m| m.metric_type))
    }

    fn note_drift(&mut self, id: PanelId, summary: &KpiSummary) {
        let drifted = summary.check_deltas();
        if drifted.is_empty() {
            self.drift.remove(&id);
        } else {
            self.drift.insert(id, drifted);
        }
    }

    fn settle_kpi(&mut self, result: ApiResult<KpiSummary>) {
        if let Ok(summary) = &result {
            self.note_drift(PanelId::Kpi, summary);
        }
        settle(&mut self.kpi, &mut self.errors, PanelId::Kpi, result);
    }

    fn settle_why(&mut self, result: ApiResult<WhyChangedResponse>) {
        if let Ok(response) = &result {
            self.note_drift(PanelId::Why, &response.summary);
        }
        settle(&mut self.why, &mut self.errors, PanelId::Why, result);
    }

    pub async fn run_kpi(&mut self) {
        self.begin(PanelId::Kpi);
        let result = self
            .api
            .get_kpi_summary(self.selection.d1, self.selection.d2)
            .await;
        self.settle_kpi(result);
    }

    pub async fn run_why(&mut self) {
        self.begin(PanelId::Why);
        let query = self.why_query();
        let result = self.api.get_why_changed(&query).await;
        self.settle_why(result);
    }

    /// Fetch the latest run and its failures concurrently; commit both or neither.
    pub async fn run_dq(&mut self) {
        self.begin(PanelId::Dq);
        let result = fetch_dq(&self.api).await;
        settle(&mut self.dq, &mut self.errors, PanelId::Dq, result);
    }

    /// Run the three panel actions concurrently.
    pub async fn run_all(&mut self) {
        self.begin(PanelId::Kpi);
        self.begin(PanelId::Why);
        self.begin(PanelId::Dq);

        let query = self.why_query();
        let (kpi, why, dq) = tokio::join!(
            self.api.get_kpi_summary(self.selection.d1, self.selection.d2),
            self.api.get_why_changed(&query),
            fetch_dq(&self.api),
        );

        self.settle_kpi(kpi);
        self.settle_why(why);
        settle(&mut self.dq, &mut self.errors, PanelId::Dq, dq);
    }
}
