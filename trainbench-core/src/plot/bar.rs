//! Horizontal speedup bars, fastest configuration on top.

use super::svg::{self, escape, fmt_tick, nice_ticks};
use crate::compare::ComparisonSummary;
use std::fmt::{self, Write};

const WIDTH: f64 = 960.0;
const LEFT: f64 = 170.0;
const RIGHT: f64 = 90.0;
const TOP: f64 = 56.0;
const BAR_H: f64 = 26.0;
const GAP: f64 = 8.0;
const FOOTER: f64 = 44.0;

const FASTER: &str = "#54A24B";
const SLOWER: &str = "#E45756";

pub(crate) fn draw(summary: &ComparisonSummary) -> Result<String, fmt::Error> {
    let bars = summary.by_speedup();
    let chart_w = WIDTH - LEFT - RIGHT;
    let chart_h = bars.len() as f64 * (BAR_H + GAP);
    let height = TOP + chart_h + FOOTER;

    let max_speedup = bars.iter().map(|e| e.speedup).fold(1.0_f64, f64::max);
    let (ticks, upper) = nice_ticks(max_speedup, 6);
    let x_of = |v: f64| LEFT + v / upper * chart_w;

    let mut out = String::new();
    svg::open(
        &mut out,
        WIDTH,
        height,
        &format!("Mean speedup vs {}", summary.baseline),
    )?;

    for tick in &ticks {
        let x = x_of(*tick);
        writeln!(
            out,
            "<line x1=\"{x:.1}\" y1=\"{TOP:.1}\" x2=\"{x:.1}\" y2=\"{:.1}\" stroke=\"#EEE\" stroke-width=\"1\"/>",
            TOP + chart_h
        )?;
        writeln!(
            out,
            "<text x=\"{x:.1}\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"10\" fill=\"#666\">{}x</text>",
            TOP + chart_h + 14.0,
            fmt_tick(*tick)
        )?;
    }

    for (idx, entry) in bars.iter().enumerate() {
        let y = TOP + idx as f64 * (BAR_H + GAP);
        let w = x_of(entry.speedup) - LEFT;
        let fill = if entry.speedup >= 1.0 { FASTER } else { SLOWER };
        let name = escape(&entry.name);
        writeln!(
            out,
            "<rect class=\"bar\" data-configuration=\"{name}\" x=\"{LEFT:.1}\" y=\"{y:.1}\" width=\"{w:.1}\" height=\"{BAR_H:.1}\" rx=\"2\" fill=\"{fill}\" opacity=\"0.85\"/>"
        )?;
        writeln!(
            out,
            "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"end\" font-size=\"10.5\" fill=\"#333\">{name}</text>",
            LEFT - 6.0,
            y + BAR_H / 2.0 + 3.5
        )?;
        writeln!(
            out,
            "<text x=\"{:.1}\" y=\"{:.1}\" font-size=\"10\" fill=\"#555\">{:.2}x ({:.2} ms)</text>",
            LEFT + w + 6.0,
            y + BAR_H / 2.0 + 3.5,
            entry.speedup,
            entry.mean_ms
        )?;
    }

    // baseline reference at 1.0x
    let x1 = x_of(1.0);
    writeln!(
        out,
        "<line class=\"baseline\" x1=\"{x1:.1}\" y1=\"{:.1}\" x2=\"{x1:.1}\" y2=\"{:.1}\" stroke=\"#333\" stroke-width=\"1.2\" stroke-dasharray=\"4 3\"/>",
        TOP - 6.0,
        TOP + chart_h
    )?;
    writeln!(
        out,
        "<text x=\"{x1:.1}\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"9.5\" fill=\"#333\">{} ({:.2} ms)</text>",
        TOP - 10.0,
        escape(&summary.baseline),
        summary.baseline_mean_ms
    )?;

    svg::close(&mut out)?;
    Ok(out)
}
