//! Inline SVG charts. Nothing here draws text: captions and axis labels
//! are written by the surrounding HTML.

use briefing_core::{AnnouncementAnalysis, MarketBar, IMPORTANCE_THRESHOLD};
use plotters::prelude::*;

use crate::error::{RenderError, RenderResult};

const PRIMARY: RGBColor = RGBColor(0, 51, 102);
const ACCENT: RGBColor = RGBColor(197, 160, 101);
const MUTED: RGBColor = RGBColor(204, 204, 204);
const GRID: RGBColor = RGBColor(230, 230, 230);

fn chart_err<E: std::fmt::Display>(e: E) -> RenderError {
    RenderError::Chart(e.to_string())
}

/// Closing-price line over the fetched bars. `None` with fewer than two bars.
pub fn close_price_svg(bars: &[MarketBar]) -> RenderResult<Option<String>> {
    if bars.len() < 2 {
        return Ok(None);
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let max = closes.iter().copied().fold(f64::MIN, f64::max);
    let min = closes.iter().copied().fold(f64::MAX, f64::min);
    let pad = ((max - min) * 0.1).max(max.abs() * 0.01).max(0.01);
    let (lo, hi) = (min - pad, max + pad);
    let x_max = (closes.len() - 1) as f64;

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (720, 280)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_err)?;

        let mut chart = ChartBuilder::on(&root)
            .margin(16)
            .build_cartesian_2d(0f64..x_max, lo..hi)
            .map_err(chart_err)?;

        chart
            .draw_series((1..4).map(|i| {
                let y = lo + (hi - lo) * i as f64 / 4.0;
                PathElement::new(vec![(0.0, y), (x_max, y)], GRID.stroke_width(1))
            }))
            .map_err(chart_err)?;

        chart
            .draw_series(LineSeries::new(
                closes.iter().enumerate().map(|(i, c)| (i as f64, *c)),
                PRIMARY.stroke_width(2),
            ))
            .map_err(chart_err)?;

        root.present().map_err(chart_err)?;
    }

    Ok(Some(svg))
}

/// Count of analyzed announcements per importance level, 1 through 5.
pub fn importance_counts(analyses: &[AnnouncementAnalysis]) -> [usize; 5] {
    let mut counts = [0usize; 5];
    for a in analyses {
        let level = a.importance.clamp(1, 5) as usize;
        counts[level - 1] += 1;
    }
    counts
}

/// Bar chart of `importance_counts`. `None` when nothing was analyzed.
pub fn importance_svg(analyses: &[AnnouncementAnalysis]) -> RenderResult<Option<String>> {
    if analyses.is_empty() {
        return Ok(None);
    }
    let counts = importance_counts(analyses);
    let top = counts.iter().copied().max().unwrap_or(1).max(1) as f64;

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (360, 160)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_err)?;

        let mut chart = ChartBuilder::on(&root)
            .margin(8)
            .build_cartesian_2d(0f64..5f64, 0f64..top * 1.1)
            .map_err(chart_err)?;

        chart
            .draw_series(counts.iter().enumerate().map(|(i, count)| {
                let color = if i + 1 >= IMPORTANCE_THRESHOLD as usize {
                    ACCENT
                } else {
                    MUTED
                };
                let x = i as f64;
                Rectangle::new([(x + 0.15, 0.0), (x + 0.85, *count as f64)], color.filled())
            }))
            .map_err(chart_err)?;

        root.present().map_err(chart_err)?;
    }

    Ok(Some(svg))
}
