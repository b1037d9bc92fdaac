pub mod charts;
pub mod error;
pub mod templates;

pub use error::{RenderError, RenderResult};
pub use templates::{BriefingTemplate, InvestmentTemplate};

use async_trait::async_trait;
use briefing_core::{
    AnnouncementAnalysis, BriefingRequest, InvestmentRequest, PipelineError, RenderedReport,
    Renderer, StockSnapshot, DATE_FORMAT,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Subdirectory of the reports directory holding investment reports.
pub const INVESTMENT_DIR: &str = "investment";

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// `{start}_{source}.html` for one day, `{start}_{end}_{source}.html` otherwise.
pub fn briefing_file_name(request: &BriefingRequest) -> String {
    let start = request.range.start.format(DATE_FORMAT);
    if request.range.is_single_day() {
        format!("{}_{}.html", start, request.source)
    } else {
        format!(
            "{}_{}_{}.html",
            start,
            request.range.end.format(DATE_FORMAT),
            request.source
        )
    }
}

/// `investment/{TICKER}_{period}.html` with dots in the ticker replaced.
pub fn investment_file_name(ticker: &str, period: &str) -> RenderResult<String> {
    let clean = |s: &str| s.trim().replace('.', "_");
    let (ticker, period) = (clean(ticker), clean(period));
    for part in [&ticker, &period] {
        if part.is_empty() || part.contains(['/', '\\']) {
            return Err(RenderError::InvalidName(part.to_string()));
        }
    }
    Ok(format!("{}/{}_{}.html", INVESTMENT_DIR, ticker.to_uppercase(), period))
}

/// Writes report HTML under `reports_dir`.
#[derive(Debug, Clone)]
pub struct HtmlRenderer {
    reports_dir: PathBuf,
}

impl HtmlRenderer {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
        }
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// Write to a sibling temp file, then rename over the target. A reader
    /// sees either the previous file or the complete new one.
    pub async fn write_atomic(&self, file_name: &str, html: &str) -> RenderResult<PathBuf> {
        let target = self.reports_dir.join(file_name);
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.reports_dir.clone());
        tokio::fs::create_dir_all(&dir).await?;

        let base = target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RenderError::InvalidName(file_name.to_string()))?;
        let tmp = dir.join(format!(
            ".{}.{}.{}.tmp",
            base,
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));

        tokio::fs::write(&tmp, html.as_bytes()).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(target)
    }

    async fn briefing(
        &self,
        request: &BriefingRequest,
        analyses: &[AnnouncementAnalysis],
    ) -> RenderResult<RenderedReport> {
        let chart = charts::importance_svg(analyses)?;
        let generated_at = chrono::Utc::now().format("%Y-%m-%d %H:%M").to_string();
        let html = BriefingTemplate::render(request, analyses, chart.as_deref(), &generated_at);

        let file_name = briefing_file_name(request);
        let path = self.write_atomic(&file_name, &html).await?;
        tracing::info!(
            "Briefing written: {} ({} analyzed, {} important)",
            path.display(),
            analyses.len(),
            templates::important_first(analyses).len()
        );
        Ok(RenderedReport { file_name })
    }

    async fn investment(
        &self,
        request: &InvestmentRequest,
        snapshot: &StockSnapshot,
        markdown: &str,
    ) -> RenderResult<RenderedReport> {
        let period = request
            .report_period
            .as_deref()
            .unwrap_or(&snapshot.report_period);
        let file_name = investment_file_name(&request.ticker, period)?;

        let chart = charts::close_price_svg(&snapshot.bars)?;
        let generated_on = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let html = InvestmentTemplate::render(
            request,
            snapshot,
            markdown,
            chart.as_deref(),
            &generated_on,
        );

        let path = self.write_atomic(&file_name, &html).await?;
        tracing::info!("Investment report written: {}", path.display());
        Ok(RenderedReport { file_name })
    }
}

#[async_trait]
impl Renderer for HtmlRenderer {
    async fn render_briefing(
        &self,
        request: &BriefingRequest,
        analyses: &[AnnouncementAnalysis],
    ) -> Result<RenderedReport, PipelineError> {
        Ok(self.briefing(request, analyses).await?)
    }

    async fn render_investment_report(
        &self,
        request: &InvestmentRequest,
        snapshot: &StockSnapshot,
        markdown: &str,
    ) -> Result<RenderedReport, PipelineError> {
        Ok(self.investment(request, snapshot, markdown).await?)
    }
}
