//! Small SVG writing helpers shared by the chart renderers.

use std::fmt::{self, Write};

const PALETTE: [&str; 8] = [
    "#4C78A8", "#F58518", "#E45756", "#72B7B2", "#54A24B", "#B279A2", "#FF9DA7", "#9D755D",
];

pub(crate) fn colour(idx: usize) -> &'static str {
    PALETTE[idx % PALETTE.len()]
}

/// Escape text for use in element content and attribute values.
pub(crate) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Root element, background and centred title.
pub(crate) fn open(out: &mut String, width: f64, height: f64, title: &str) -> fmt::Result {
    writeln!(
        out,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" \
         viewBox=\"0 0 {width} {height}\" font-family=\"monospace,Arial,sans-serif\">"
    )?;
    writeln!(out, "<rect width=\"{width}\" height=\"{height}\" fill=\"#FAFAFA\"/>")?;
    writeln!(
        out,
        "<text x=\"{:.1}\" y=\"28\" text-anchor=\"middle\" font-size=\"15\" font-weight=\"bold\" fill=\"#222\">{}</text>",
        width / 2.0,
        escape(title)
    )
}

pub(crate) fn close(out: &mut String) -> fmt::Result {
    writeln!(out, "</svg>")
}

/// Evenly spaced ticks from zero covering `max`, on a 1/2/5 × 10^k step.
///
/// Returns the ticks and the axis upper bound (the last tick).
pub(crate) fn nice_ticks(max: f64, target: usize) -> (Vec<f64>, f64) {
    if !max.is_finite() || max <= 0.0 {
        return (vec![0.0, 1.0], 1.0);
    }
    let raw = max / target.max(1) as f64;
    let magnitude = 10f64.powf(raw.log10().floor());
    let step = [1.0, 2.0, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|s| *s >= raw)
        .unwrap_or(10.0 * magnitude);

    let count = (max / step).ceil().max(1.0) as usize;
    let ticks: Vec<f64> = (0..=count).map(|i| i as f64 * step).collect();
    let upper = count as f64 * step;
    (ticks, upper)
}

/// Compact tick label: no trailing zeros, at most two decimals.
pub(crate) fn fmt_tick(value: f64) -> String {
    let text = format!("{value:.2}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}
