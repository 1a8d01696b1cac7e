use async_trait::async_trait;
use chrono::NaiveDate;
use metricops_common::{
    DashboardConfig, DqFailuresResponse, DqLatest, Health, KpiSummary, MetricsResponse,
    WhyChangedResponse, WhyChangedWire,
};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use crate::query::{push_dates, QueryParams, WhyChangedQuery};

pub const METRICS_PATH: &str = "/metrics";
pub const KPI_SUMMARY_PATH: &str = "/kpi-summary";
pub const WHY_CHANGED_PATH: &str = "/why-changed";
pub const DQ_LATEST_PATH: &str = "/dq/latest";
pub const DQ_FAILURES_PATH: &str = "/dq/latest/failures";
pub const HEALTH_PATH: &str = "/health";

/// Read-only operations of the metrics API
#[async_trait]
pub trait MetricsApi: Send + Sync {
    /// Catalog of certified metrics
    async fn list_metrics(&self) -> ApiResult<MetricsResponse>;

    /// KPI comparison between two dates; the server picks the latest two
    /// available dates for any date left out.
    async fn get_kpi_summary(
        &self,
        d1: Option<NaiveDate>,
        d2: Option<NaiveDate>,
    ) -> ApiResult<KpiSummary>;

    /// Driver breakdown of one metric along one dimension
    async fn get_why_changed(&self, query: &WhyChangedQuery) -> ApiResult<WhyChangedResponse>;

    /// Most recent data-quality run
    async fn get_dq_latest(&self) -> ApiResult<DqLatest>;

    /// Failed checks of the most recent data-quality run
    async fn get_dq_failures(&self) -> ApiResult<DqFailuresResponse>;

    /// API and database liveness
    async fn health(&self) -> ApiResult<Health>;
}

/// HTTP implementation of [`MetricsApi`].
///
/// Every call is a single GET: no retries, no timeouts, no auth headers.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> ApiResult<Self> {
        let trimmed = base_url.trim().trim_end_matches('/').to_string();
        let parsed = Url::parse(&trimmed).map_err(|e| ApiError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(ApiError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "URL cannot be used as a base".to_string(),
            });
        }

        let http = Client::builder()
            .user_agent(concat!("metricops/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| ApiError::Transport {
                url: trimmed.clone(),
                source,
            })?;

        Ok(Self {
            http,
            base_url: trimmed,
        })
    }

    pub fn from_config(config: &DashboardConfig) -> ApiResult<Self> {
        Self::new(&config.api_base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL of `path` with `params` appended in order
    pub fn endpoint_url(&self, path: &str, params: &[(&str, String)]) -> ApiResult<Url> {
        let raw = format!("{}{}", self.base_url, path);
        let mut url = Url::parse(&raw).map_err(|e| ApiError::InvalidBaseUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })?;
        if !params.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> ApiResult<T> {
        let url = self.endpoint_url(path, params)?;
        debug!(%url, "GET");

        let response = self.http.get(url.clone()).send().await.map_err(|source| {
            warn!(%url, error = %source, "API request failed");
            ApiError::Transport {
                url: url.to_string(),
                source,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%url, status = status.as_u16(), "API returned an error status");
            return Err(ApiError::Http {
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                body,
            });
        }

        let body = response.text().await.map_err(|source| ApiError::Transport {
            url: url.to_string(),
            source,
        })?;

        serde_json::from_str(&body).map_err(|source| {
            warn!(%url, error = %source, "API response did not decode");
            ApiError::Decode {
                path: path.to_string(),
                source,
            }
        })
    }
}

#[async_trait]
impl MetricsApi for ApiClient {
    async fn list_metrics(&self) -> ApiResult<MetricsResponse> {
        self.get_json(METRICS_PATH, &[]).await
    }

    async fn get_kpi_summary(
        &self,
        d1: Option<NaiveDate>,
        d2: Option<NaiveDate>,
    ) -> ApiResult<KpiSummary> {
        let mut params = QueryParams::new();
        push_dates(&mut params, d1, d2);
        self.get_json(KPI_SUMMARY_PATH, &params).await
    }

    async fn get_why_changed(&self, query: &WhyChangedQuery) -> ApiResult<WhyChangedResponse> {
        let wire: WhyChangedWire = self.get_json(WHY_CHANGED_PATH, &query.params()).await?;
        wire.resolve(query.metric_type)
            .map_err(|source| ApiError::Payload {
                path: WHY_CHANGED_PATH.to_string(),
                source,
            })
    }

    async fn get_dq_latest(&self) -> ApiResult<DqLatest> {
        self.get_json(DQ_LATEST_PATH, &[]).await
    }

    async fn get_dq_failures(&self) -> ApiResult<DqFailuresResponse> {
        self.get_json(DQ_FAILURES_PATH, &[]).await
    }

    async fn health(&self) -> ApiResult<Health> {
        self.get_json(HEALTH_PATH, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metricops_common::{Dimension, Drivers, DqStatus, MetricType, DATE_FORMAT};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    fn summary_json() -> serde_json::Value {
        json!({
            "d1": "2024-01-01",
            "d2": "2024-01-02",
            "gross_sales_d1": 1000.0, "gross_sales_d2": 1150.0, "gross_sales_delta": 150.0,
            "orders_sold_d1": 10, "orders_sold_d2": 12, "orders_sold_delta": 2,
            "units_sold_d1": 20, "units_sold_d2": 18, "units_sold_delta": -2,
            "aov_d1": 100.0, "aov_d2": 95.83, "aov_delta": -4.17,
            "cancellation_rate_d1": 0.1, "cancellation_rate_d2": 0.08, "cancellation_rate_delta": -0.02
        })
    }

    async fn last_query(server: &MockServer) -> Option<String> {
        let requests = server.received_requests().await.unwrap();
        requests.last().unwrap().url.query().map(str::to_string)
    }

    #[test]
    fn test_endpoint_url_exact_query_string() {
        let client = ApiClient::new("http://127.0.0.1:8000/").unwrap();
        let query = WhyChangedQuery::new("orders_sold", Dimension::ShipState)
            .top_n(5)
            .dates(Some(date("2024-01-01")), Some(date("2024-01-02")));
        let url = client.endpoint_url(WHY_CHANGED_PATH, &query.params()).unwrap();
        assert_eq!(url.path(), "/why-changed");
        assert_eq!(
            url.query(),
            Some("metric_key=orders_sold&dimension=ship_state&top_n=5&d1=2024-01-01&d2=2024-01-02")
        );
    }

    #[test]
    fn test_base_url_keeps_prefix() {
        let client = ApiClient::new("https://example.com/api/").unwrap();
        assert_eq!(client.base_url(), "https://example.com/api");
        let url = client.endpoint_url(DQ_FAILURES_PATH, &[]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/api/dq/latest/failures");
        assert_eq!(url.query(), None);
    }

    #[test]
    fn test_invalid_base_url() {
        let err = ApiClient::new("not a url").unwrap_err();
        assert!(matches!(err, ApiError::InvalidBaseUrl { .. }));
    }

    #[tokio::test]
    async fn list_metrics_parses_catalog() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metrics"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "metrics": [{
                    "metric_key": "orders_sold",
                    "metric_name": "Orders Sold",
                    "metric_type": "ADDITIVE",
                    "source_relation": "analytics.fct_orders",
                    "source_column": "order_id",
                    "description": "Distinct orders"
                }]
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let catalog = client.list_metrics().await.unwrap();
        assert_eq!(catalog.metrics.len(), 1);
        assert_eq!(catalog.metrics[0].metric_type, MetricType::Additive);
        assert_eq!(catalog.metrics[0].source_column.as_deref(), Some("order_id"));
    }

    #[tokio::test]
    async fn kpi_summary_without_dates_sends_no_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/kpi-summary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(summary_json()))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let summary = client.get_kpi_summary(None, None).await.unwrap();
        assert_eq!(summary.d2, date("2024-01-02"));
        assert_eq!(last_query(&server).await, None);

        client
            .get_kpi_summary(Some(date("2023-12-30")), None)
            .await
            .unwrap();
        assert_eq!(last_query(&server).await.as_deref(), Some("d1=2023-12-30"));
    }

    #[tokio::test]
    async fn why_changed_sends_exact_query_and_resolves_layout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/why-changed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "metric_key": "orders_sold",
                "dimension": "ship_state",
                "summary": summary_json(),
                "drivers": [
                    {"dimension": "ship_state", "dim_value": "GOA", "value_d1": 3, "value_d2": 1, "delta": -2, "pct_change": -0.6667},
                    {"dimension": "ship_state", "dim_value": "KERALA", "value_d1": 2, "value_d2": 6, "delta": 4, "pct_change": 2.0}
                ]
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let query = WhyChangedQuery::new("orders_sold", Dimension::ShipState)
            .top_n(5)
            .dates(Some(date("2024-01-01")), Some(date("2024-01-02")));
        let response = client.get_why_changed(&query).await.unwrap();

        assert_eq!(
            last_query(&server).await.as_deref(),
            Some("metric_key=orders_sold&dimension=ship_state&top_n=5&d1=2024-01-01&d2=2024-01-02")
        );
        assert_eq!(response.metric_type, MetricType::Additive);
        assert_eq!(response.drivers.len(), 2);
    }

    #[tokio::test]
    async fn why_changed_uses_catalog_type_for_empty_drivers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/why-changed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "metric_key": "cancellation_rate",
                "dimension": "category",
                "summary": summary_json(),
                "drivers": []
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let query = WhyChangedQuery::new("cancellation_rate", Dimension::Category)
            .metric_type(Some(MetricType::Rate));
        let response = client.get_why_changed(&query).await.unwrap();
        assert!(matches!(response.drivers, Drivers::Rate(ref rows) if rows.is_empty()));
    }

    #[tokio::test]
    async fn error_status_carries_code_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dq/latest"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let err = client.get_dq_latest().await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        let message = err.to_string();
        assert!(message.contains("500"));
        assert!(message.contains("boom"));
        assert_eq!(message, "500 Internal Server Error - boom");
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dq/latest/failures"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let err = client.get_dq_failures().await.unwrap_err();
        assert!(matches!(err, ApiError::Decode { path: ref p, .. } if p == "/dq/latest/failures"));
    }

    #[tokio::test]
    async fn dq_endpoints_parse() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dq/latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "run_id": 42, "run_ts": "2024-01-02T06:00:00", "source": "amazon_sales",
                "status": "PASSED", "checks_total": 8, "checks_passed": 8, "checks_failed": 0
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/dq/latest/failures"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "failures": [] })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let latest = client.get_dq_latest().await.unwrap();
        let failures = client.get_dq_failures().await.unwrap();
        assert_eq!(latest.status, DqStatus::Passed);
        assert_eq!(latest.run_id, 42);
        assert!(failures.failures.is_empty());
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = ApiClient::new(&format!("http://127.0.0.1:{}", port)).unwrap();
        let err = client.health().await.unwrap_err();
        assert!(matches!(err, ApiError::Transport { .. }));
        assert_eq!(err.status(), None);
    }
}
