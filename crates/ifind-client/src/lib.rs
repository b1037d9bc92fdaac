pub mod error;
mod table;

use async_trait::async_trait;
use briefing_core::{
    Announcement, DateRange, Fetcher, IfindSettings, PipelineError, Settings, StockSnapshot,
    DATE_FORMAT,
};
use chrono::{Duration as DateSpan, NaiveDate, Utc};
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub use error::{IfindError, IfindResult};

/// Days of daily bars fetched for a single-stock report.
pub const HISTORY_DAYS: i64 = 30;

const DEFAULT_REPORT_PERIOD: &str = "3";
const DEFAULT_TABLE_TYPE: &str = "1";
const HISTORY_INDICATORS: &str = "pre_close,open,high,low,close,vwap,chg,pct_chg,volume,amt,turn";

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            let oldest = match ts.front() {
                Some(&oldest) if ts.len() >= self.max_requests => oldest,
                _ => {
                    ts.push_back(now);
                    return;
                }
            };

            // Wait until the oldest request falls out of the window
            let sleep_dur =
                (oldest + self.window).duration_since(now) + Duration::from_millis(50);
            drop(ts);
            tracing::debug!(
                "Rate limiter: waiting {:.1}s for iFinD API slot",
                sleep_dur.as_secs_f64()
            );
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// Client for the iFinD HTTP data API.
///
/// Endpoint URLs and the access token come from the config document on
/// every call, so edits made through the settings page apply to the next
/// task without restarting the server.
#[derive(Clone)]
pub struct IfindClient {
    client: Client,
    rate_limiter: RateLimiter,
}

impl IfindClient {
    pub fn new() -> IfindResult<Self> {
        let rate_limit: usize = std::env::var("IFIND_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);
        let timeout_secs: u64 = std::env::var("IFIND_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        Self::with_limits(rate_limit, Duration::from_secs(timeout_secs))
    }

    pub fn with_limits(requests_per_minute: usize, timeout: Duration) -> IfindResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            rate_limiter: RateLimiter::new(requests_per_minute, Duration::from_secs(60)),
        })
    }

    async fn post_json(
        &self,
        url: &str,
        token: &str,
        payload: &Value,
    ) -> IfindResult<table::Envelope> {
        self.rate_limiter.acquire().await;

        let response = self
            .client
            .post(url)
            .header("access_token", token)
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IfindError::Status {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| IfindError::InvalidResponse(e.to_string()))
    }

    /// Query announcements for a date range.
    ///
    /// `template` is the `ifindPayload` section of the config; the date
    /// bounds (and `codes`, when `tickers` is non-empty) are overwritten.
    pub async fn query_announcements(
        &self,
        ifind: &IfindSettings,
        template: Option<&Map<String, Value>>,
        range: &DateRange,
        tickers: &[String],
    ) -> IfindResult<Vec<Announcement>> {
        let token = required(&ifind.access_token, "ifind.accessToken")?;
        let url = required(&ifind.report_query_url, "ifind.reportQueryUrl")?;
        let template = template.ok_or(IfindError::NotConfigured("ifindPayload"))?;

        let mut payload = template.clone();
        payload.insert(
            "beginrDate".to_string(),
            json!(range.start.format(DATE_FORMAT).to_string()),
        );
        payload.insert(
            "endrDate".to_string(),
            json!(range.end.format(DATE_FORMAT).to_string()),
        );
        if !tickers.is_empty() {
            payload.insert("codes".to_string(), json!(tickers.join(",")));
        }

        tracing::info!("Fetching iFinD announcements for {} ({} tickers)", range, tickers.len());

        let envelope = self.post_json(url, token, &Value::Object(payload)).await?;
        let announcements = envelope
            .into_first_table()?
            .map(|entry| table::announcements(&entry.table))
            .unwrap_or_default();

        tracing::info!("iFinD returned {} announcements for {}", announcements.len(), range);
        Ok(announcements)
    }

    /// Basic company data and financial indicators for one report period.
    pub async fn basic_data(
        &self,
        ifind: &IfindSettings,
        ticker: &str,
        report_period: &str,
        as_of: NaiveDate,
    ) -> IfindResult<Option<Map<String, Value>>> {
        let token = required(&ifind.access_token, "ifind.accessToken")?;
        let url = required(&ifind.basic_data_url, "ifind.basicDataUrl")?;
        let table_type = ifind.table_type.as_deref().unwrap_or(DEFAULT_TABLE_TYPE);
        let as_of = as_of.format(DATE_FORMAT).to_string();

        let payload = json!({
            "codes": ticker,
            "indipara": profile_indicators(report_period, table_type, &as_of),
        });

        let envelope = self.post_json(url, token, &payload).await?;
        Ok(envelope
            .into_first_table()?
            .map(|entry| table::first_values(&entry.table)))
    }

    /// Daily bars between `start` and `end` inclusive.
    pub async fn history(
        &self,
        ifind: &IfindSettings,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> IfindResult<Vec<briefing_core::MarketBar>> {
        let token = required(&ifind.access_token, "ifind.accessToken")?;
        let url = required(&ifind.history_data_url, "ifind.historyDataUrl")?;

        let payload = json!({
            "reqBody": {
                "codes": ticker,
                "indicators": HISTORY_INDICATORS,
                "startdate": start.format(DATE_FORMAT).to_string(),
                "enddate": end.format(DATE_FORMAT).to_string(),
            }
        });

        let envelope = self.post_json(url, token, &payload).await?;
        Ok(envelope
            .into_first_table()?
            .map(|entry| table::bars(&entry))
            .unwrap_or_default())
    }

    /// Download a filing PDF and extract its text.
    pub async fn download_text(&self, url: &str) -> IfindResult<String> {
        self.rate_limiter.acquire().await;

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(IfindError::Status {
                status: response.status().as_u16(),
                body: String::new(),
            });
        }
        let bytes = response.bytes().await?;

        tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| IfindError::Pdf(e.to_string()))?
        .map_err(IfindError::Pdf)
    }
}

#[async_trait]
impl Fetcher for IfindClient {
    async fn fetch_announcements(
        &self,
        settings: &Settings,
        range: &DateRange,
        tickers: &[String],
    ) -> Result<Vec<Announcement>, PipelineError> {
        Ok(self
            .query_announcements(&settings.ifind, settings.ifind_payload.as_ref(), range, tickers)
            .await?)
    }

    async fn fetch_document_text(&self, url: &str) -> Result<String, PipelineError> {
        Ok(self.download_text(url).await?)
    }

    async fn fetch_stock_snapshot(
        &self,
        settings: &Settings,
        ticker: &str,
        report_period: &str,
    ) -> Result<StockSnapshot, PipelineError> {
        let today = Utc::now().date_naive();
        let report_period = if report_period.is_empty() {
            settings
                .ifind
                .report_period
                .as_deref()
                .unwrap_or(DEFAULT_REPORT_PERIOD)
        } else {
            report_period
        };

        tracing::info!("Fetching iFinD snapshot for {} (period {})", ticker, report_period);

        let profile = match self.basic_data(&settings.ifind, ticker, report_period, today).await {
            Ok(profile) => profile,
            // Market data alone still makes a usable report.
            Err(e @ IfindError::Api { .. }) => {
                tracing::warn!("Basic data unavailable for {}: {}", ticker, e);
                None
            }
            Err(e) => return Err(e.into()),
        };
        let bars = self
            .history(&settings.ifind, ticker, today - DateSpan::days(HISTORY_DAYS), today)
            .await?;

        if profile.is_none() && bars.is_empty() {
            return Err(PipelineError::Fetch(format!("no data returned for {}", ticker)));
        }

        Ok(StockSnapshot {
            ticker: ticker.to_string(),
            as_of: today.format(DATE_FORMAT).to_string(),
            report_period: report_period.to_string(),
            profile,
            bars,
        })
    }
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> IfindResult<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(IfindError::NotConfigured(name))
}

/// Indicator list for the basic-data endpoint.
fn profile_indicators(report_period: &str, table_type: &str, as_of: &str) -> Value {
    let period_and_type = json!([report_period, table_type]);
    let period_only = json!([report_period]);
    let valuation = json!([as_of, "100"]);
    let none = json!([]);

    let spec: Vec<(&str, Value)> = vec![
        ("ths_revenue_stock", period_and_type.clone()),
        ("ths_np_stock", period_and_type.clone()),
        ("ths_prime_oi_old_stock", period_and_type.clone()),
        ("ths_net_sales_rate_stock", period_only.clone()),
        ("ths_gross_selling_rate_stock", period_only.clone()),
        ("ths_mo_product_name_stock", none.clone()),
        ("ths_mo_product_type_stock", none.clone()),
        ("ths_corp_profile_stock", none),
        ("ths_the_csrc_industry_stock", json!(["1", as_of])),
        ("ths_ncf_from_oa_stock", period_and_type.clone()),
        ("ths_pe_ttm_stock", valuation.clone()),
        ("ths_pb_latest_stock", valuation.clone()),
        ("ths_total_asset_rr_stock", json!([report_period, table_type, "101"])),
        ("ths_total_liab_stock", period_and_type.clone()),
        ("ths_current_ratio_stock", period_only.clone()),
        ("ths_quick_ratio_stock", period_only.clone()),
        ("ths_operating_total_revenue_stock", period_and_type),
        ("ths_roe_ttm_stock", valuation),
        ("ths_eps_basic_stock", period_only),
    ];

    Value::Array(
        spec.into_iter()
            .map(|(indicator, params)| json!({ "indicator": indicator, "indiparams": params }))
            .collect(),
    )
}
