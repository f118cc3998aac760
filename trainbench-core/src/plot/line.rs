//! Step-time line chart: one polyline per configuration.

use super::svg::{self, escape, fmt_tick, nice_ticks};
use crate::table::ResultsTable;
use std::fmt::{self, Write};

const WIDTH: f64 = 960.0;
const HEIGHT: f64 = 540.0;
const LEFT: f64 = 70.0;
const RIGHT: f64 = 200.0;
const TOP: f64 = 50.0;
const BOTTOM: f64 = 50.0;

pub(crate) fn draw(table: &ResultsTable) -> Result<String, fmt::Error> {
    let chart_w = WIDTH - LEFT - RIGHT;
    let chart_h = HEIGHT - TOP - BOTTOM;

    let steps = table.max_steps();
    let x_span = steps.saturating_sub(1).max(1) as f64;
    let y_max = table
        .populated_columns()
        .flat_map(|c| c.cells().iter().copied())
        .fold(0.0_f64, f64::max);
    let (y_ticks, y_upper) = nice_ticks(y_max, 6);

    let x_of = |step: usize| LEFT + step as f64 / x_span * chart_w;
    let y_of = |ms: f64| TOP + chart_h - ms / y_upper * chart_h;

    let mut out = String::new();
    svg::open(&mut out, WIDTH, HEIGHT, "Step time per configuration")?;

    // y grid + labels
    for tick in &y_ticks {
        let y = y_of(*tick);
        writeln!(
            out,
            "<line x1=\"{LEFT:.1}\" y1=\"{y:.1}\" x2=\"{:.1}\" y2=\"{y:.1}\" stroke=\"#EEE\" stroke-width=\"1\"/>",
            LEFT + chart_w
        )?;
        writeln!(
            out,
            "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"end\" font-size=\"10\" fill=\"#666\">{}</text>",
            LEFT - 6.0,
            y + 3.5,
            fmt_tick(*tick)
        )?;
    }

    // x ticks, roughly ten across
    let x_stride = steps.div_ceil(10).max(1);
    for step in (0..steps.max(1)).step_by(x_stride) {
        let x = x_of(step);
        writeln!(
            out,
            "<text x=\"{x:.1}\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"10\" fill=\"#666\">{step}</text>",
            TOP + chart_h + 16.0
        )?;
    }

    // axes
    writeln!(
        out,
        "<line x1=\"{LEFT:.1}\" y1=\"{TOP:.1}\" x2=\"{LEFT:.1}\" y2=\"{:.1}\" stroke=\"#999\" stroke-width=\"1\"/>",
        TOP + chart_h
    )?;
    writeln!(
        out,
        "<line x1=\"{LEFT:.1}\" y1=\"{0:.1}\" x2=\"{1:.1}\" y2=\"{0:.1}\" stroke=\"#999\" stroke-width=\"1\"/>",
        TOP + chart_h,
        LEFT + chart_w
    )?;
    writeln!(
        out,
        "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"middle\" font-size=\"11\" fill=\"#333\">step</text>",
        LEFT + chart_w / 2.0,
        HEIGHT - 12.0
    )?;
    writeln!(
        out,
        "<text x=\"16\" y=\"{0:.1}\" text-anchor=\"middle\" font-size=\"11\" fill=\"#333\" transform=\"rotate(-90 16 {0:.1})\">elapsed (ms)</text>",
        TOP + chart_h / 2.0
    )?;

    // series + legend
    for (idx, column) in table.populated_columns().enumerate() {
        let colour = svg::colour(idx);
        let name = escape(column.name());
        let points: Vec<String> = column
            .cells()
            .iter()
            .enumerate()
            .map(|(step, ms)| format!("{:.1},{:.1}", x_of(step), y_of(*ms)))
            .collect();
        writeln!(
            out,
            "<polyline class=\"series\" data-configuration=\"{name}\" data-points=\"{}\" points=\"{}\" fill=\"none\" stroke=\"{colour}\" stroke-width=\"1.8\"/>",
            points.len(),
            points.join(" ")
        )?;
        if let [only] = column.cells() {
            writeln!(
                out,
                "<circle cx=\"{:.1}\" cy=\"{:.1}\" r=\"3\" fill=\"{colour}\"/>",
                x_of(0),
                y_of(*only)
            )?;
        }

        let ly = TOP + 10.0 + idx as f64 * 20.0;
        let lx = LEFT + chart_w + 16.0;
        writeln!(
            out,
            "<line x1=\"{lx:.1}\" y1=\"{ly:.1}\" x2=\"{:.1}\" y2=\"{ly:.1}\" stroke=\"{colour}\" stroke-width=\"3\"/>",
            lx + 18.0
        )?;
        writeln!(
            out,
            "<text x=\"{:.1}\" y=\"{:.1}\" font-size=\"10.5\" fill=\"#333\">{name} ({} steps)</text>",
            lx + 24.0,
            ly + 3.5,
            column.len()
        )?;
    }

    svg::close(&mut out)?;
    Ok(out)
}
