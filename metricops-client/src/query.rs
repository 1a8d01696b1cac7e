use chrono::NaiveDate;
use metricops_common::{Dimension, MetricType, DATE_FORMAT, DEFAULT_TOP_N};

/// Query parameter list in the order it is sent
pub type QueryParams = Vec<(&'static str, String)>;

/// Append `d1` / `d2` when present; the API picks the latest two dates otherwise.
pub fn push_dates(params: &mut QueryParams, d1: Option<NaiveDate>, d2: Option<NaiveDate>) {
    if let Some(d1) = d1 {
        params.push(("d1", d1.format(DATE_FORMAT).to_string()));
    }
    if let Some(d2) = d2 {
        params.push(("d2", d2.format(DATE_FORMAT).to_string()));
    }
}

/// Parameters of a why-changed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhyChangedQuery {
    pub metric_key: String,
    pub dimension: Dimension,
    pub top_n: u32,
    pub d1: Option<NaiveDate>,
    pub d2: Option<NaiveDate>,
    /// Catalog type of the metric. Only used to pick the driver layout
    /// when the payload does not carry one; never sent to the server.
    pub metric_type: Option<MetricType>,
}

impl WhyChangedQuery {
    pub fn new(metric_key: impl Into<String>, dimension: Dimension) -> Self {
        Self {
            metric_key: metric_key.into(),
            dimension,
            top_n: DEFAULT_TOP_N,
            d1: None,
            d2: None,
            metric_type: None,
        }
    }

    pub fn top_n(mut self, top_n: u32) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn dates(mut self, d1: Option<NaiveDate>, d2: Option<NaiveDate>) -> Self {
        self.d1 = d1;
        self.d2 = d2;
        self
    }

    pub fn metric_type(mut self, metric_type: Option<MetricType>) -> Self {
        self.metric_type = metric_type;
        self
    }

    pub fn params(&self) -> QueryParams {
        let mut params = QueryParams::new();
        if !self.metric_key.trim().is_empty() {
            params.push(("metric_key", self.metric_key.trim().to_string()));
        }
        params.push(("dimension", self.dimension.as_str().to_string()));
        params.push(("top_n", self.top_n.to_string()));
        push_dates(&mut params, self.d1, self.d2);
        params
    }
}
