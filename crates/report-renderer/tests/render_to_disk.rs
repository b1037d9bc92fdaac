use briefing_core::{
    Announcement, AnnouncementAnalysis, BriefingRequest, DateRange, InvestmentRequest, MarketBar,
    Renderer, StockSnapshot, StockSource,
};
use report_renderer::HtmlRenderer;

fn analysis(title: &str, importance: u8) -> AnnouncementAnalysis {
    AnnouncementAnalysis {
        announcement: Announcement {
            report_date: Some("2024-01-01".into()),
            title: Some(title.into()),
            pdf_url: Some("https://static.example/a.pdf".into()),
            sec_name: Some("ACME".into()),
            thscode: Some("430047.BJ".into()),
        },
        summary: format!("{} summary", title),
        importance,
        reason: "reason".into(),
    }
}

fn bars() -> Vec<MarketBar> {
    [10.0, 10.4, 10.1, 10.9]
        .iter()
        .enumerate()
        .map(|(i, close)| MarketBar {
            date: format!("2024-06-{:02}", i + 1),
            open: None,
            high: None,
            low: None,
            close: *close,
            volume: Some(1000.0),
            pct_chg: None,
            turnover: Some(1.1),
        })
        .collect()
}

#[tokio::test]
async fn test_briefing_written_and_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = HtmlRenderer::new(dir.path());
    let request = BriefingRequest {
        range: DateRange::parse("2024-01-01", "2024-01-01").unwrap(),
        source: StockSource::Custom,
    };

    let first = renderer
        .render_briefing(
            &request,
            &[analysis("Earnings forecast", 4), analysis("Meeting notice", 1)],
        )
        .await
        .unwrap();
    assert_eq!(first.file_name, "2024-01-01_custom.html");
    assert_eq!(first.url(), "/reports/2024-01-01_custom.html");

    let html = std::fs::read_to_string(dir.path().join(&first.file_name)).unwrap();
    assert!(html.contains("Earnings forecast"));
    assert!(!html.contains("Meeting notice summary"));

    renderer
        .render_briefing(&request, &[analysis("Buyback plan", 5)])
        .await
        .unwrap();
    let html = std::fs::read_to_string(dir.path().join(&first.file_name)).unwrap();
    assert!(html.contains("Buyback plan"));
    assert!(!html.contains("Earnings forecast"));

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[tokio::test]
async fn test_empty_briefing_has_notice() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = HtmlRenderer::new(dir.path());
    let request = BriefingRequest {
        range: DateRange::parse("2024-01-01", "2024-01-03").unwrap(),
        source: StockSource::Market,
    };

    let report = renderer.render_briefing(&request, &[]).await.unwrap();
    assert_eq!(report.file_name, "2024-01-01_2024-01-03_market.html");
    let html = std::fs::read_to_string(dir.path().join(&report.file_name)).unwrap();
    assert!(html.contains("No important announcements"));
}

#[tokio::test]
async fn test_investment_report_in_subdirectory() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = HtmlRenderer::new(dir.path().join("nested"));
    let request = InvestmentRequest {
        ticker: "430047.BJ".into(),
        user_info: String::new(),
        report_period: None,
    };
    let snapshot = StockSnapshot {
        ticker: "430047.BJ".into(),
        as_of: "2024-06-30".into(),
        report_period: "3".into(),
        profile: None,
        bars: bars(),
    };
    let markdown = "# 430047.BJ Investment Research Report\n## 1. Overview\nBuy.\n## 3. Secondary Market\n| Close | 10.9 |\n|---|---|\n";

    let report = renderer
        .render_investment_report(&request, &snapshot, markdown)
        .await
        .unwrap();
    assert_eq!(report.file_name, "investment/430047_BJ_3.html");
    assert_eq!(report.url(), "/reports/investment/430047_BJ_3.html");

    let html = std::fs::read_to_string(dir.path().join("nested").join(&report.file_name)).unwrap();
    assert!(html.contains("<h1 class=\"report-title\">430047.BJ Investment Research Report</h1>"));
    assert!(html.contains("<figure class=\"chart\">"));
    assert!(html.contains("Disclaimer"));
}
