use async_trait::async_trait;

use crate::{
    AnalysisMode, Announcement, AnnouncementAnalysis, BriefingRequest, DateRange,
    InvestmentRequest, PipelineError, Prompt, RenderedReport, Settings, StockSnapshot,
};

/// Source of filings and market data.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Announcements published within `range`, restricted to `tickers`
    /// when the list is non-empty.
    async fn fetch_announcements(
        &self,
        settings: &Settings,
        range: &DateRange,
        tickers: &[String],
    ) -> Result<Vec<Announcement>, PipelineError>;

    /// Plain text of a filing document.
    async fn fetch_document_text(&self, url: &str) -> Result<String, PipelineError>;

    /// Fundamentals and recent market data for one ticker.
    async fn fetch_stock_snapshot(
        &self,
        settings: &Settings,
        ticker: &str,
        report_period: &str,
    ) -> Result<StockSnapshot, PipelineError>;
}

/// LLM completion backend.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(
        &self,
        settings: &Settings,
        prompt: &Prompt,
        mode: AnalysisMode,
    ) -> Result<String, PipelineError>;
}

/// Writes report artifacts and returns where they landed.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render_briefing(
        &self,
        request: &BriefingRequest,
        analyses: &[AnnouncementAnalysis],
    ) -> Result<RenderedReport, PipelineError>;

    async fn render_investment_report(
        &self,
        request: &InvestmentRequest,
        snapshot: &StockSnapshot,
        markdown: &str,
    ) -> Result<RenderedReport, PipelineError>;
}
