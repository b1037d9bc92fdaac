use briefing_core::{
    AnnouncementAnalysis, BriefingRequest, InvestmentRequest, StockSnapshot, StockSource,
    IMPORTANCE_THRESHOLD,
};
use pulldown_cmark::{CowStr, Event, Options, Parser, TagEnd};

/// Heading text after which the closing-price chart is placed.
const MARKET_SECTION: &str = "Secondary Market";

const DISCLAIMER: &str = "This report was generated automatically by an AI model from \
    third-party data. It is for reference only and does not constitute investment advice. \
    Markets carry risk; invest with caution.";

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Announcements worth showing, most important first. The sort is stable so
/// equal scores keep fetch order.
pub fn important_first(analyses: &[AnnouncementAnalysis]) -> Vec<&AnnouncementAnalysis> {
    let mut picked: Vec<&AnnouncementAnalysis> = analyses
        .iter()
        .filter(|a| a.importance >= IMPORTANCE_THRESHOLD)
        .collect();
    picked.sort_by(|a, b| b.importance.cmp(&a.importance));
    picked
}

fn stars(importance: u8) -> String {
    (0..5)
        .map(|i| {
            if i < importance {
                r#"<span class="star-filled">&#9733;</span>"#
            } else {
                r#"<span class="star-empty">&#9733;</span>"#
            }
        })
        .collect()
}

fn source_label(source: StockSource) -> &'static str {
    match source {
        StockSource::Custom => "Custom stock pool",
        StockSource::Market => "Whole market",
    }
}

pub struct BriefingTemplate;

impl BriefingTemplate {
    pub fn render(
        request: &BriefingRequest,
        analyses: &[AnnouncementAnalysis],
        distribution_svg: Option<&str>,
        generated_at: &str,
    ) -> String {
        let period = request.range.to_string();
        let source = source_label(request.source);
        let important = important_first(analyses);

        let cards = if important.is_empty() {
            r#"<div class="no-announcements">No important announcements for this period (or none were rated important by the analysis).</div>"#.to_string()
        } else {
            important
                .iter()
                .map(|a| {
                    let ann = &a.announcement;
                    let sec_name = escape_html(ann.sec_name.as_deref().unwrap_or("N/A"));
                    let code = ann
                        .thscode
                        .as_deref()
                        .map(|c| format!(r#" <span class="code">{}</span>"#, escape_html(c)))
                        .unwrap_or_default();
                    let title = escape_html(ann.title.as_deref().unwrap_or("Untitled"));
                    let date = escape_html(ann.report_date.as_deref().unwrap_or(""));
                    let link = escape_html(ann.pdf_url.as_deref().unwrap_or("#"));
                    let stars = stars(a.importance);
                    let importance = a.importance;
                    let summary = escape_html(&a.summary);
                    let reason = escape_html(&a.reason);
                    format!(
                        r#"<div class="announcement-card">
  <div class="title-secname"><span class="secname">[{sec_name}]</span>{code} {title}</div>
  <div class="date">{date}</div>
  <div class="importance"><span class="label">Importance:</span>&nbsp;{stars}&nbsp;({importance}/5)</div>
  <p class="summary"><span class="label">Summary:</span> {summary}</p>
  <p class="reason"><span class="label">Reason:</span> {reason}</p>
  <a class="link" href="{link}" target="_blank" rel="noopener">View original PDF &rarr;</a>
</div>"#
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        let distribution = distribution_svg
            .map(|svg| {
                format!(
                    r#"<div class="distribution"><div class="label">Importance distribution (1 to 5) across {} analyzed announcements</div>{svg}</div>"#,
                    analyses.len()
                )
            })
            .unwrap_or_default();

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width,initial-scale=1">
<title>Daily Filing Briefing - {period}</title>
<style>
body {{ font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, "Helvetica Neue", Arial, sans-serif; background-color: #f4f7f6; color: #333; margin: 0; padding: 20px; }}
.container {{ max-width: 900px; margin: 20px auto; background-color: #fff; padding: 30px; border-radius: 8px; box-shadow: 0 4px 12px rgba(0, 0, 0, 0.08); }}
h1 {{ color: #1a3a6e; border-bottom: 2px solid #1a3a6e; padding-bottom: 10px; font-size: 24px; }}
.meta {{ color: #777; font-size: 13px; margin-bottom: 20px; }}
.announcement-card {{ border: 1px solid #e0e0e0; padding: 20px; margin-bottom: 20px; border-radius: 6px; background-color: #ffffff; }}
.title-secname {{ font-size: 18px; font-weight: 600; margin-bottom: 8px; color: #333; }}
.secname {{ color: #0056b3; margin-right: 6px; }}
.code, .date {{ color: #999; font-size: 13px; }}
.importance {{ margin: 8px 0 12px; font-size: 16px; display: flex; align-items: center; }}
.star-filled {{ color: #ffc107; }} .star-empty {{ color: #ccc; }}
.summary, .reason {{ margin-top: 10px; border-left: 3px solid #0056b3; padding-left: 15px; font-size: 14px; line-height: 1.6; }}
.label {{ font-weight: bold; color: #555; }}
.link {{ display: inline-block; margin-top: 15px; font-size: 13px; color: #007bff; text-decoration: none; }}
.no-announcements {{ text-align: center; padding: 40px; color: #999; }}
.distribution {{ margin-top: 30px; font-size: 13px; }}
.distribution svg {{ display: block; max-width: 100%; height: auto; margin-top: 8px; }}
</style>
</head>
<body>
<div class="container">
<h1>Daily Filing Briefing - {period}</h1>
<div class="meta">{source} &middot; {count} important of {total} analyzed &middot; generated {generated_at} UTC</div>
{cards}
{distribution}
</div>
</body>
</html>"#,
            count = important.len(),
            total = analyses.len(),
        )
    }
}

/// Markdown to HTML with tables. Raw HTML in the model output is shown as
/// text. `chart` goes right after the secondary-market heading, or at the
/// end when the report has no such heading.
pub fn markdown_to_html(markdown: &str, chart: Option<&str>) -> String {
    let mut events: Vec<Event> = Vec::new();
    let mut heading: Option<String> = None;
    let mut injected = chart.is_none();

    for event in Parser::new_ext(markdown, Options::ENABLE_TABLES) {
        match event {
            Event::Html(raw) | Event::InlineHtml(raw) => events.push(Event::Text(raw)),
            Event::Start(pulldown_cmark::Tag::Heading { .. }) => {
                heading = Some(String::new());
                events.push(event);
            }
            Event::Text(ref text) => {
                if let Some(h) = heading.as_mut() {
                    h.push_str(text);
                }
                events.push(event);
            }
            Event::End(TagEnd::Heading(_)) => {
                events.push(event);
                let title = heading.take().unwrap_or_default();
                if !injected && title.contains(MARKET_SECTION) {
                    if let Some(svg) = chart {
                        events.push(Event::Html(CowStr::from(figure(svg))));
                    }
                    injected = true;
                }
            }
            other => events.push(other),
        }
    }

    if !injected {
        if let Some(svg) = chart {
            events.push(Event::Html(CowStr::from(figure(svg))));
        }
    }

    let mut html = String::with_capacity(markdown.len() * 2);
    pulldown_cmark::html::push_html(&mut html, events.into_iter());
    html
}

fn figure(svg: &str) -> String {
    format!(
        "<figure class=\"chart\">{}<figcaption>Closing price, last 30 trading days</figcaption></figure>\n",
        svg
    )
}

/// Report title: the first `# ` heading of the Markdown, if any.
pub fn report_title(markdown: &str, ticker: &str) -> String {
    markdown
        .lines()
        .find_map(|l| l.trim_start().strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| format!("{} Investment Research Report", ticker))
}

pub struct InvestmentTemplate;

impl InvestmentTemplate {
    pub fn render(
        request: &InvestmentRequest,
        snapshot: &StockSnapshot,
        markdown: &str,
        chart_svg: Option<&str>,
        generated_on: &str,
    ) -> String {
        let title = escape_html(&report_title(markdown, &request.ticker));
        let ticker = escape_html(&request.ticker);
        let as_of = escape_html(&snapshot.as_of);
        let period = escape_html(&snapshot.report_period);
        let content = markdown_to_html(markdown, chart_svg);

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>{title}</title>
<style>
@import url('https://fonts.googleapis.com/css2?family=Noto+Serif+SC:wght@400;700&family=Roboto:wght@300;400;700&display=swap');
:root {{ --primary-color: #003366; --accent-color: #c5a065; --text-color: #333333; --light-gray: #f4f4f4; }}
body {{ font-family: "Roboto", "Noto Serif SC", serif; color: var(--text-color); background-color: #eef2f5; margin: 0; padding: 20px; line-height: 1.6; -webkit-print-color-adjust: exact; }}
.page {{ background: white; width: 210mm; min-height: 297mm; margin: 0 auto 20px auto; padding: 20mm; box-sizing: border-box; box-shadow: 0 0 15px rgba(0,0,0,0.1); position: relative; }}
.cover-page {{ display: flex; flex-direction: column; justify-content: center; text-align: center; height: 250mm; border-bottom: 2px solid var(--primary-color); }}
.logo {{ font-size: 24px; font-weight: bold; color: var(--primary-color); margin-bottom: 40px; text-transform: uppercase; letter-spacing: 2px; }}
h1.report-title {{ font-size: 36px; color: var(--primary-color); margin-bottom: 10px; }}
.subtitle {{ font-size: 20px; color: #666; font-weight: 300; margin-bottom: 60px; }}
.meta-info {{ margin-top: auto; font-size: 14px; color: #555; border-top: 1px solid #ddd; padding-top: 20px; width: 100%; }}
.content {{ margin-top: 20px; text-align: justify; }}
.content h1 {{ font-size: 24px; color: var(--primary-color); border-bottom: 2px solid var(--accent-color); padding-bottom: 10px; margin-top: 20px; }}
.content h2 {{ color: var(--primary-color); border-left: 5px solid var(--accent-color); padding-left: 15px; margin-top: 30px; font-size: 22px; }}
.content h3 {{ color: #444; font-size: 18px; margin-top: 25px; border-bottom: 1px solid #eee; padding-bottom: 5px; }}
.content h1, .content h2, .content h3 {{ page-break-after: avoid; }}
p {{ margin-bottom: 15px; }}
blockquote {{ background: var(--light-gray); border-left: 4px solid var(--primary-color); margin: 20px 0; padding: 15px 20px; font-style: italic; color: #444; }}
table {{ width: 100%; border-collapse: collapse; margin: 25px 0; font-size: 14px; page-break-inside: avoid; }}
th {{ background-color: var(--primary-color); color: white; padding: 10px; text-align: left; }}
td {{ border-bottom: 1px solid #ddd; padding: 10px; }}
tr:nth-child(even) {{ background-color: #f9f9f9; }}
figure.chart {{ margin: 1.5em 0; text-align: center; }}
figure.chart svg {{ max-width: 100%; height: auto; }}
figcaption {{ font-size: 12px; color: #777; }}
.disclaimer-box {{ margin-top: 50px; padding: 15px; border: 1px solid #ddd; background: #fafafa; font-size: 12px; color: #777; page-break-inside: avoid; }}
@media print {{
  body {{ background: none; margin: 0; padding: 0; }}
  .page {{ width: 100%; margin: 0; padding: 0; box-shadow: none; border: none; min-height: auto; }}
  .cover-page {{ height: 90vh; page-break-after: always; }}
  table, blockquote, figure {{ break-inside: avoid; }}
  a {{ text-decoration: none; color: black; }}
}}
</style>
</head>
<body>
<div class="page">
  <div class="cover-page">
    <div class="logo">Equity Research</div>
    <h1 class="report-title">{title}</h1>
    <div class="subtitle">Automated investment analysis for {ticker}</div>
    <div class="meta-info">
      <p><strong>Data as of:</strong> {as_of} &middot; <strong>Report period:</strong> {period}</p>
      <p><strong>Published:</strong> {generated_on}</p>
    </div>
  </div>
</div>
<div class="page">
  <div class="content">
{content}
  </div>
  <div class="disclaimer-box"><strong>Disclaimer:</strong> {DISCLAIMER}</div>
</div>
</body>
</html>"#
        )
    }
}
