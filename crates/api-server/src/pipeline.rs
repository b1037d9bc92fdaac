//! The two report flows, wired over the collaborator traits.
//!
//! Every collaborator call runs inside `TaskContext::stage` so it gets the
//! per-stage deadline and observes shutdown.

use briefing_core::{
    AnalysisMode, Analyzer, Announcement, AnnouncementAnalysis, BriefingRequest, Fetcher,
    InvestmentRequest, PipelineError, PipelineResult, Renderer, Settings,
};
use llm_client::prompts;
use std::sync::Arc;
use task_manager::TaskContext;

/// Filing text shorter than this is treated as an extraction failure.
pub const MIN_DOCUMENT_CHARS: usize = 50;

pub struct Pipelines {
    fetcher: Arc<dyn Fetcher>,
    analyzer: Arc<dyn Analyzer>,
    renderer: Arc<dyn Renderer>,
}

impl Pipelines {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        analyzer: Arc<dyn Analyzer>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            fetcher,
            analyzer,
            renderer,
        }
    }

    /// Fetch, screen, analyze and render one briefing. Returns the report URL.
    pub async fn daily_briefing(
        &self,
        ctx: &TaskContext,
        settings: &Settings,
        request: &BriefingRequest,
    ) -> PipelineResult<String> {
        let tickers = settings.stock_pool(request.source)?;

        ctx.progress(format!(
            "Fetching announcements for {} ({})",
            request.range, request.source
        ));
        let announcements = ctx
            .stage(
                "fetch",
                self.fetcher
                    .fetch_announcements(settings, &request.range, &tickers),
            )
            .await?;
        let total = announcements.len();
        tracing::info!("Task {}: {} announcements fetched", ctx.id(), total);

        let mut analyses = Vec::new();
        let mut handled = 0usize;
        let mut last_error: Option<PipelineError> = None;

        for (i, announcement) in announcements.iter().enumerate() {
            if !announcement.is_complete() {
                tracing::debug!("Task {}: skipping incomplete row {}", ctx.id(), i + 1);
                continue;
            }
            ctx.progress(format!("Analyzing announcement {}/{}", i + 1, total));

            match self.analyze_announcement(ctx, settings, announcement).await {
                Ok(result) => {
                    handled += 1;
                    analyses.extend(result);
                }
                Err(e) if e.is_terminal() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        "Task {}: skipping '{}': {}",
                        ctx.id(),
                        announcement.title.as_deref().unwrap_or_default(),
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        if handled == 0 {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        ctx.progress(format!("Rendering briefing ({} analyzed)", analyses.len()));
        let report = ctx
            .stage("render", self.renderer.render_briefing(request, &analyses))
            .await?;
        Ok(report.url())
    }

    /// `Ok(None)` when the title screen rejects the filing or its text is
    /// too short to analyze.
    async fn analyze_announcement(
        &self,
        ctx: &TaskContext,
        settings: &Settings,
        announcement: &Announcement,
    ) -> PipelineResult<Option<AnnouncementAnalysis>> {
        let title = announcement.title.as_deref().unwrap_or_default();
        let url = announcement.pdf_url.as_deref().unwrap_or_default();

        let verdict = ctx
            .stage(
                "filter",
                self.analyzer
                    .analyze(settings, &prompts::title_screen(title), AnalysisMode::Fast),
            )
            .await?;
        if !prompts::parse_title_screen(&verdict) {
            return Ok(None);
        }

        let text = ctx
            .stage("download", self.fetcher.fetch_document_text(url))
            .await?;
        if text.trim().chars().count() < MIN_DOCUMENT_CHARS {
            tracing::warn!("Task {}: text of '{}' too short, skipping", ctx.id(), title);
            return Ok(None);
        }

        let answer = ctx
            .stage(
                "analyze",
                self.analyzer.analyze(
                    settings,
                    &prompts::announcement_analysis(title, &text),
                    AnalysisMode::Deep,
                ),
            )
            .await?;
        let parsed = prompts::parse_announcement_analysis(&answer)?;

        Ok(Some(AnnouncementAnalysis {
            announcement: announcement.clone(),
            summary: parsed.summary,
            importance: parsed.importance,
            reason: parsed.reason,
        }))
    }

    /// Fetch a stock snapshot, have the deep model write the report, render it.
    pub async fn investment_report(
        &self,
        ctx: &TaskContext,
        settings: &Settings,
        request: &InvestmentRequest,
    ) -> PipelineResult<String> {
        let period = request.report_period.as_deref().unwrap_or_default();

        ctx.progress(format!("Fetching data for {}", request.ticker));
        let snapshot = ctx
            .stage(
                "fetch",
                self.fetcher
                    .fetch_stock_snapshot(settings, &request.ticker, period),
            )
            .await?;

        ctx.progress("Writing report");
        let prompt = prompts::investment_report(&snapshot, &request.user_info);
        let answer = ctx
            .stage(
                "analyze",
                self.analyzer.analyze(settings, &prompt, AnalysisMode::Deep),
            )
            .await?;
        let markdown = prompts::strip_code_fence(&answer);
        if markdown.is_empty() {
            return Err(PipelineError::Analysis("model returned an empty report".to_string()));
        }

        ctx.progress("Rendering report");
        let report = ctx
            .stage(
                "render",
                self.renderer
                    .render_investment_report(request, &snapshot, markdown),
            )
            .await?;
        Ok(report.url())
    }
}
