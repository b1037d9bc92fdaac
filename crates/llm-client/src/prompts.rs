//! Prompt builders and response parsers for the two report flows.

use briefing_core::{Prompt, StockSnapshot};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt::Write;

use crate::error::{LlmError, LlmResult};

/// Filing text beyond this many characters is not sent to the deep model.
pub const MAX_DOCUMENT_CHARS: usize = 8000;

/// Fast-model screen: is this announcement title likely to matter?
pub fn title_screen(title: &str) -> Prompt {
    Prompt::new(format!(
        "You are a financial analyst's assistant. Quickly judge whether an exchange \
         announcement title is likely to contain material information. Material topics \
         include: earnings forecasts or flash reports, profit distribution or dividends, \
         restructuring, acquisitions, major contracts, share issuance, buybacks, equity \
         incentives, major management changes, regulatory letters or penalties, annual, \
         quarterly and half-year reports, market making, review feedback, specialised \
         SME designations, and patents. Routine topics include: board, supervisory board \
         or shareholder meeting resolutions, meeting notices, articles of association \
         amendments, and ordinary related-party transactions. Answer only \"YES\" or \"NO\". \
         Title: \"{}\"",
        title
    ))
}

pub fn parse_title_screen(answer: &str) -> bool {
    answer.to_uppercase().contains("YES")
}

/// Deep-model analysis of one filing, answered as a JSON object.
pub fn announcement_analysis(title: &str, text: &str) -> Prompt {
    let excerpt: String = text.chars().take(MAX_DOCUMENT_CHARS).collect();
    Prompt::new(format!(
        "You are a professional financial analyst. Analyze the following announcement \
         from an exchange-listed company.\nTitle: \"{title}\"\nContent:\n---\n{excerpt}\n---\n\
         Return your analysis as JSON with three fields: 1. \"summary\" (string): the core \
         content in no more than three sentences. 2. \"importance\" (integer 1-5): the \
         potential impact on the share price, where 1 is routine, 3 deserves attention and \
         5 may trigger sharp price moves. 3. \"reason\" (string): one sentence explaining \
         the score. Your answer must contain a directly parseable JSON object."
    ))
    .temperature(0.1)
    .json()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAnalysis {
    pub summary: String,
    pub importance: u8,
    pub reason: String,
}

#[derive(Deserialize)]
struct RawAnalysis {
    summary: Option<String>,
    importance: Option<Value>,
    #[serde(default)]
    reason: Option<String>,
}

/// The outermost `{...}` span of a model answer, parsed as JSON.
pub fn extract_json(text: &str) -> LlmResult<Value> {
    let start = text.find('{');
    let end = text.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if end > start => Ok(serde_json::from_str(&text[start..=end])?),
        _ => Err(LlmError::InvalidResponse(
            "no JSON object found in model output".to_string(),
        )),
    }
}

pub fn parse_announcement_analysis(text: &str) -> LlmResult<ParsedAnalysis> {
    let raw: RawAnalysis = serde_json::from_value(extract_json(text)?)?;

    let summary = raw
        .summary
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| LlmError::InvalidResponse("analysis is missing 'summary'".to_string()))?;
    let importance = raw
        .importance
        .as_ref()
        .and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .ok_or_else(|| LlmError::InvalidResponse("analysis is missing 'importance'".to_string()))?;

    Ok(ParsedAnalysis {
        summary: summary.trim().to_string(),
        importance: importance.round().clamp(1.0, 5.0) as u8,
        reason: raw.reason.unwrap_or_default().trim().to_string(),
    })
}

/// Deep-model Markdown investment report.
pub fn investment_report(snapshot: &StockSnapshot, user_info: &str) -> Prompt {
    let ticker = &snapshot.ticker;
    let user_info = if user_info.trim().is_empty() { "None" } else { user_info };
    let context = format_snapshot(snapshot);

    Prompt::new(format!(
        r#"You are a senior securities analyst. Using the objective data and the user's supplementary information below, write a professional, detailed, objective and well-structured investment research report on {ticker}.

**User supplementary information:**
{user_info}

**The report must follow exactly this structure:**
# {ticker} Investment Research Report
## 1. Overview
(Write this section last: summarise the core view and give a rating and a target price range.)
## 2. Company Profile
(Describe the main business and industry position using the company profile and main products. Then present the core financials (revenue, net profit, EPS, ROE, gross margin, net margin) as a Markdown table and assess fundamental quality.)
## 3. Secondary Market
(First summarise the key market data (latest close, 30-day high/low, 30-day average, PE, PB) in a Markdown table, then analyse recent performance against the monthly averages.)
## 4. Investment Highlights
(Numbered points, strictly in the form "1. **Bold heading:** body".)
## 5. Investment Risks
(Numbered points, strictly in the form "1. **Bold heading:** body".)
## 6. Earnings Forecast and Valuation
(Give a brief 1-2 year earnings forecast, then a Markdown valuation table using PE or PB, with a clear valuation range and a 6-12 month target price.)
---
**Data:**
{context}"#
    ))
    .temperature(0.2)
}

/// Drop a ```markdown fence wrapped around the whole answer.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn field(profile: &Map<String, Value>, key: &str) -> String {
    match profile.get(key) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "N/A".to_string(),
    }
}

/// Plain-text data block embedded in the investment report prompt.
pub fn format_snapshot(snapshot: &StockSnapshot) -> String {
    let mut txt = String::new();
    let _ = writeln!(txt, "[Ticker]: {}", snapshot.ticker);
    let _ = writeln!(txt, "[As of]: {}", snapshot.as_of);
    let _ = writeln!(txt, "[Report period]: {}\n", snapshot.report_period);

    if let Some(p) = &snapshot.profile {
        let profile: String = field(p, "ths_corp_profile_stock").chars().take(200).collect();
        let _ = writeln!(txt, "[1. Company and fundamentals]");
        let _ = writeln!(txt, "- Industry: {}", field(p, "ths_the_csrc_industry_stock"));
        let _ = writeln!(txt, "- Profile: {}...", profile);
        let _ = writeln!(txt, "- Main products: {}", field(p, "ths_mo_product_name_stock"));
        let _ = writeln!(txt, "- Product types: {}\n", field(p, "ths_mo_product_type_stock"));

        let _ = writeln!(txt, "[2. Core financials (latest period)]");
        let _ = writeln!(
            txt,
            "- Total operating revenue: {} | Revenue: {}",
            field(p, "ths_operating_total_revenue_stock"),
            field(p, "ths_revenue_stock")
        );
        let _ = writeln!(
            txt,
            "- Net profit: {} | Basic EPS: {}",
            field(p, "ths_np_stock"),
            field(p, "ths_eps_basic_stock")
        );
        let _ = writeln!(txt, "- Operating cash flow: {}", field(p, "ths_ncf_from_oa_stock"));
        let _ = writeln!(
            txt,
            "- Total assets: {} | Total liabilities: {}\n",
            field(p, "ths_total_asset_rr_stock"),
            field(p, "ths_total_liab_stock")
        );

        let _ = writeln!(txt, "[3. Key ratios]");
        let _ = writeln!(
            txt,
            "- Profitability: gross margin {}% | net margin {}% | ROE(TTM) {}%",
            field(p, "ths_gross_selling_rate_stock"),
            field(p, "ths_net_sales_rate_stock"),
            field(p, "ths_roe_ttm_stock")
        );
        let _ = writeln!(
            txt,
            "- Solvency: current ratio {} | quick ratio {}\n",
            field(p, "ths_current_ratio_stock"),
            field(p, "ths_quick_ratio_stock")
        );

        let _ = writeln!(txt, "[4. Valuation]");
        let _ = writeln!(txt, "- PE(TTM): {}", field(p, "ths_pe_ttm_stock"));
        let _ = writeln!(txt, "- PB(latest): {}", field(p, "ths_pb_latest_stock"));
    }

    let _ = writeln!(txt, "\n[5. Secondary market (last 30 days)]");
    if let (Some(latest), Some(stats)) = (snapshot.latest(), snapshot.stats()) {
        let pct = latest
            .pct_chg
            .map(|v| format!("{:.2}%", v))
            .unwrap_or_else(|| "N/A".to_string());
        let _ = writeln!(txt, "- Latest close: {} (change: {})", latest.close, pct);
        let _ = writeln!(
            txt,
            "- Price range: {} - {} (average: {:.2})",
            stats.min_close, stats.max_close, stats.avg_close
        );
        let turn = latest
            .turnover
            .map(|v| format!("{}%", v))
            .unwrap_or_else(|| "N/A".to_string());
        let avg_turn = stats
            .avg_turnover
            .map(|v| format!("{:.2}%", v))
            .unwrap_or_else(|| "N/A".to_string());
        let _ = writeln!(txt, "- Latest turnover: {} | monthly average: {}", turn, avg_turn);
    } else {
        let _ = writeln!(txt, "- No market data available");
    }

    txt
}

#[cfg(test)]
mod tests {
    use super::*;
    use briefing_core::MarketBar;
    use serde_json::json;

    #[test]
    fn test_parse_title_screen() {
        assert!(parse_title_screen("yes"));
        assert!(parse_title_screen("  YES."));
        assert!(!parse_title_screen("NO"));
    }

    #[test]
    fn test_extract_json_from_chatty_answer() {
        let answer = "Sure! Here is the analysis:\n```json\n{\"summary\": \"Profit up 40%\", \"importance\": 4, \"reason\": \"Beat\"}\n```";
        let parsed = parse_announcement_analysis(answer).unwrap();
        assert_eq!(parsed.summary, "Profit up 40%");
        assert_eq!(parsed.importance, 4);
        assert_eq!(parsed.reason, "Beat");
    }

    #[test]
    fn test_importance_as_string_is_clamped() {
        let parsed =
            parse_announcement_analysis(r#"{"summary": "s", "importance": "9", "reason": "r"}"#)
                .unwrap();
        assert_eq!(parsed.importance, 5);
    }

    #[test]
    fn test_missing_fields_rejected() {
        assert!(parse_announcement_analysis("no json here").is_err());
        assert!(parse_announcement_analysis(r#"{"summary": "s"}"#).is_err());
        assert!(parse_announcement_analysis(r#"{"importance": 3}"#).is_err());
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```markdown\n# Title\nbody\n```\n"), "# Title\nbody");
        assert_eq!(strip_code_fence("  # Plain\n"), "# Plain");
    }

    #[test]
    fn test_announcement_prompt_truncates_text() {
        let text = "x".repeat(MAX_DOCUMENT_CHARS + 500);
        let prompt = announcement_analysis("Title", &text);
        assert!(prompt.json_output);
        assert!(!prompt.text.contains(&"x".repeat(MAX_DOCUMENT_CHARS + 1)));
    }

    #[test]
    fn test_format_snapshot_includes_market_stats() {
        let snapshot = StockSnapshot {
            ticker: "430047.BJ".into(),
            as_of: "2024-06-30".into(),
            report_period: "3".into(),
            profile: json!({ "ths_pe_ttm_stock": 21.4 }).as_object().cloned(),
            bars: vec![
                MarketBar {
                    date: "2024-06-27".into(),
                    open: None,
                    high: None,
                    low: None,
                    close: 10.0,
                    volume: None,
                    pct_chg: None,
                    turnover: Some(1.0),
                },
                MarketBar {
                    date: "2024-06-28".into(),
                    open: None,
                    high: None,
                    low: None,
                    close: 12.0,
                    volume: None,
                    pct_chg: Some(20.0),
                    turnover: Some(3.0),
                },
            ],
        };
        let txt = format_snapshot(&snapshot);
        assert!(txt.contains("PE(TTM): 21.4"));
        assert!(txt.contains("Latest close: 12 (change: 20.00%)"));
        assert!(txt.contains("average: 11.00"));
        assert!(txt.contains("monthly average: 2.00%"));

        let prompt = investment_report(&snapshot, "");
        assert!(prompt.text.contains("# 430047.BJ Investment Research Report"));
        assert!(prompt.text.contains("## 3. Secondary Market"));
    }
}
