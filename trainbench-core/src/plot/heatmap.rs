//! Configuration × step heatmap. Absent cells get a hatched "no data" fill.

use super::svg::{self, escape};
use crate::table::ResultsTable;
use std::fmt::{self, Write};

const WIDTH: f64 = 960.0;
const LEFT: f64 = 160.0;
const RIGHT: f64 = 120.0;
const TOP: f64 = 50.0;
const ROW_H: f64 = 28.0;
const FOOTER: f64 = 60.0;

const LOW: (u8, u8, u8) = (0xF7, 0xFB, 0xFF);
const HIGH: (u8, u8, u8) = (0x08, 0x30, 0x6B);

fn shade(t: f64) -> String {
    let t = t.clamp(0.0, 1.0);
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    format!(
        "#{:02X}{:02X}{:02X}",
        mix(LOW.0, HIGH.0),
        mix(LOW.1, HIGH.1),
        mix(LOW.2, HIGH.2)
    )
}

pub(crate) fn draw(table: &ResultsTable) -> Result<String, fmt::Error> {
    let rows = table.columns();
    let steps = table.max_steps().max(1);
    let chart_w = WIDTH - LEFT - RIGHT;
    let cell_w = chart_w / steps as f64;
    let height = TOP + rows.len() as f64 * ROW_H + FOOTER;

    let (lo, hi) = table
        .populated_columns()
        .flat_map(|c| c.cells().iter().copied())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let t_of = |v: f64| if hi > lo { (v - lo) / (hi - lo) } else { 0.5 };

    let mut out = String::new();
    svg::open(&mut out, WIDTH, height, "Step time heatmap (ms)")?;
    writeln!(
        out,
        "<defs><pattern id=\"no-data\" width=\"6\" height=\"6\" patternUnits=\"userSpaceOnUse\" patternTransform=\"rotate(45)\">\
         <rect width=\"6\" height=\"6\" fill=\"#FFFFFF\"/><line x1=\"0\" y1=\"0\" x2=\"0\" y2=\"6\" stroke=\"#BBBBBB\" stroke-width=\"2\"/>\
         </pattern></defs>"
    )?;

    for (row, column) in rows.iter().enumerate() {
        let y = TOP + row as f64 * ROW_H;
        let name = escape(column.name());
        writeln!(
            out,
            "<text x=\"{:.1}\" y=\"{:.1}\" text-anchor=\"end\" font-size=\"10.5\" fill=\"#333\">{name}</text>",
            LEFT - 6.0,
            y + ROW_H / 2.0 + 3.5
        )?;

        for step in 0..steps {
            let x = LEFT + step as f64 * cell_w;
            match column.cells().get(step) {
                Some(ms) => writeln!(
                    out,
                    "<rect class=\"cell\" x=\"{x:.2}\" y=\"{y:.1}\" width=\"{cell_w:.2}\" height=\"{ROW_H:.1}\" fill=\"{}\"><title>{name} step {step}: {ms} ms</title></rect>",
                    shade(t_of(*ms))
                )?,
                None => writeln!(
                    out,
                    "<rect class=\"no-data\" x=\"{x:.2}\" y=\"{y:.1}\" width=\"{cell_w:.2}\" height=\"{ROW_H:.1}\" fill=\"url(#no-data)\"><title>{name} step {step}: no data</title></rect>"
                )?,
            }
        }
    }

    // step labels, roughly ten across
    let label_y = TOP + rows.len() as f64 * ROW_H + 14.0;
    let stride = steps.div_ceil(10).max(1);
    for step in (0..steps).step_by(stride) {
        writeln!(
            out,
            "<text x=\"{:.1}\" y=\"{label_y:.1}\" text-anchor=\"middle\" font-size=\"9\" fill=\"#666\">{step}</text>",
            LEFT + (step as f64 + 0.5) * cell_w
        )?;
    }

    // legend: scale end points + no-data swatch
    let lx = LEFT + chart_w + 14.0;
    for (i, (label, fill)) in [
        (format!("{lo:.2}"), shade(0.0)),
        (format!("{hi:.2}"), shade(1.0)),
        ("no data".to_string(), "url(#no-data)".to_string()),
    ]
    .iter()
    .enumerate()
    {
        let ly = TOP + i as f64 * 22.0;
        writeln!(
            out,
            "<rect x=\"{lx:.1}\" y=\"{ly:.1}\" width=\"14\" height=\"14\" fill=\"{fill}\" stroke=\"#CCC\"/>"
        )?;
        writeln!(
            out,
            "<text x=\"{:.1}\" y=\"{:.1}\" font-size=\"10\" fill=\"#333\">{label}</text>",
            lx + 20.0,
            ly + 11.0
        )?;
    }

    svg::close(&mut out)?;
    Ok(out)
}
