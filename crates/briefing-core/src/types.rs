use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::PipelineError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Which ticker pool a briefing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockSource {
    #[default]
    Custom,
    Market,
}

impl StockSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockSource::Custom => "custom",
            StockSource::Market => "market",
        }
    }
}

impl fmt::Display for StockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StockSource {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "custom" => Ok(StockSource::Custom),
            "market" | "all" => Ok(StockSource::Market),
            other => Err(PipelineError::Validation(format!(
                "unknown stockSource '{}' (expected 'custom' or 'market')",
                other
            ))),
        }
    }
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, PipelineError> {
        if start > end {
            return Err(PipelineError::Validation(format!(
                "startDate {} is after endDate {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse `YYYY-MM-DD` bounds; both must be present.
    pub fn parse(start: &str, end: &str) -> Result<Self, PipelineError> {
        let start = parse_date("startDate", start)?;
        let end = parse_date("endDate", end)?;
        Self::new(start, end)
    }

    pub fn is_single_day(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_day() {
            write!(f, "{}", self.start.format(DATE_FORMAT))
        } else {
            write!(
                f,
                "{} to {}",
                self.start.format(DATE_FORMAT),
                self.end.format(DATE_FORMAT)
            )
        }
    }
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, PipelineError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(PipelineError::Validation(format!("{} is required", field)));
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| {
        PipelineError::Validation(format!(
            "invalid {} '{}' (use YYYY-MM-DD): {}",
            field, value, e
        ))
    })
}

/// A validated daily-briefing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BriefingRequest {
    pub range: DateRange,
    pub source: StockSource,
}

impl BriefingRequest {
    pub fn validate(
        start: Option<&str>,
        end: Option<&str>,
        source: Option<&str>,
    ) -> Result<Self, PipelineError> {
        let range = DateRange::parse(start.unwrap_or_default(), end.unwrap_or_default())?;
        let source = match source.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s.parse()?,
            None => StockSource::default(),
        };
        Ok(Self { range, source })
    }
}

/// A validated single-stock investment report request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestmentRequest {
    pub ticker: String,
    pub user_info: String,
    pub report_period: Option<String>,
}

impl InvestmentRequest {
    pub fn validate(
        ticker: &str,
        user_info: Option<&str>,
        report_period: Option<&str>,
    ) -> Result<Self, PipelineError> {
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(PipelineError::Validation("ticker is required".to_string()));
        }
        if ticker.contains(['/', '\\']) || ticker.contains("..") {
            return Err(PipelineError::Validation(format!("invalid ticker '{}'", ticker)));
        }
        Ok(Self {
            ticker,
            user_info: user_info.unwrap_or_default().trim().to_string(),
            report_period: report_period
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        })
    }
}

/// Exchange announcement (one row of the iFinD report query).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub report_date: Option<String>,
    pub title: Option<String>,
    pub pdf_url: Option<String>,
    pub sec_name: Option<String>,
    pub thscode: Option<String>,
}

impl Announcement {
    /// Rows need a title, a security name and an http(s) PDF link to be analyzed.
    pub fn is_complete(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.title)
            && present(&self.sec_name)
            && self
                .pdf_url
                .as_deref()
                .is_some_and(|u| u.starts_with("http"))
    }
}

/// Deep-model verdict for one announcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnouncementAnalysis {
    pub announcement: Announcement,
    pub summary: String,
    /// 1 (routine) ..= 5 (likely to move the price sharply)
    pub importance: u8,
    pub reason: String,
}

/// Minimum importance for an announcement to appear in the briefing.
pub const IMPORTANCE_THRESHOLD: u8 = 3;

/// Daily market bar from the iFinD history endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketBar {
    pub date: String,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub volume: Option<f64>,
    pub pct_chg: Option<f64>,
    pub turnover: Option<f64>,
}

/// Aggregates over the fetched window of bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStats {
    pub avg_close: f64,
    pub avg_volume: Option<f64>,
    pub avg_turnover: Option<f64>,
    pub max_close: f64,
    pub min_close: f64,
}

impl MarketStats {
    pub fn from_bars(bars: &[MarketBar]) -> Option<Self> {
        if bars.is_empty() {
            return None;
        }
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let avg_close = closes.iter().sum::<f64>() / closes.len() as f64;
        let max_close = closes.iter().copied().fold(f64::MIN, f64::max);
        let min_close = closes.iter().copied().fold(f64::MAX, f64::min);

        Some(Self {
            avg_close,
            avg_volume: mean(bars.iter().filter_map(|b| b.volume)),
            avg_turnover: mean(bars.iter().filter_map(|b| b.turnover)),
            max_close,
            min_close,
        })
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Everything fetched for a single-stock report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub ticker: String,
    pub as_of: String,
    pub report_period: String,
    /// Basic-data indicators keyed by iFinD indicator name.
    pub profile: Option<Map<String, Value>>,
    pub bars: Vec<MarketBar>,
}

impl StockSnapshot {
    pub fn latest(&self) -> Option<&MarketBar> {
        self.bars.last()
    }

    pub fn stats(&self) -> Option<MarketStats> {
        MarketStats::from_bars(&self.bars)
    }
}

/// Which model tier an LLM call uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    Fast,
    Deep,
}

/// A prompt plus the decoding constraints the caller needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub text: String,
    pub temperature: f32,
    /// Ask the provider for a JSON object response when it supports it.
    pub json_output: bool,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            temperature: 0.0,
            json_output: false,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn json(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// A report written to the reports directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedReport {
    /// Path relative to the reports directory, `/`-separated.
    pub file_name: String,
}

impl RenderedReport {
    /// Servable URL under the static reports mount.
    pub fn url(&self) -> String {
        format!("/reports/{}", self.file_name.trim_start_matches('/'))
    }
}
