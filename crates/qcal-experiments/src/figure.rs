//! SVG figures: the per-qubit fit grid and the simulated waveforms.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use qcal_pulse::SampledWaveforms;
use qcal_state::{GridLocation, Machine};

use crate::dataset::Dataset;
use crate::ramsey::analysis::Analysis;

/// Timezone of figure titles, in seconds east of UTC.
pub const TITLE_UTC_OFFSET_SECS: i32 = 3 * 3600;

const DATA_COLOR: &str = "#1f77b4";
const FIT_COLOR: &str = "#ff7f0e";
const PORT_COLORS: [&str; 6] = ["#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b"];
const TITLE_LINE_HEIGHT: u32 = 18;
const MAX_TRACE_POINTS: usize = 2000;

/// Panel geometry, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FigureConfig {
    pub panel_width: u32,
    pub panel_height: u32,
    pub margin: u32,
}

impl Default for FigureConfig {
    fn default() -> Self {
        Self {
            panel_width: 420,
            panel_height: 280,
            margin: 48,
        }
    }
}

/// One subplot.
#[derive(Debug, Clone)]
pub struct Panel<'a> {
    pub title: String,
    pub location: GridLocation,
    pub x: &'a [f64],
    /// Series drawn as markers.
    pub points: Vec<&'a [f64]>,
    /// Series drawn as lines, with their colours.
    pub lines: Vec<(&'a [f64], &'a str)>,
    pub x_label: &'a str,
    pub y_label: &'a str,
    /// Boxed annotation in the upper left corner.
    pub annotation: Option<String>,
}

/// Title block of a Ramsey figure.
pub fn ramsey_title(
    dataset: &Dataset,
    created_at: DateTime<Utc>,
    node_id: u64,
    multiplexed: bool,
) -> Vec<String> {
    vec![
        format!("Ramsey : {} vs. idle time", dataset.variable.name()),
        format!("{} GMT+3 #{node_id}", title_time(created_at)),
        format!("multiplexed = {multiplexed}"),
    ]
}

fn title_time(created_at: DateTime<Utc>) -> String {
    match FixedOffset::east_opt(TITLE_UTC_OFFSET_SECS) {
        Some(tz) => created_at.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}

/// Data and fitted curve of every qubit, laid out on the chip grid.
pub fn render_ramsey_svg(
    dataset: &Dataset,
    analysis: &Analysis,
    machine: &Machine,
    title: &[String],
    config: &FigureConfig,
) -> String {
    let x = dataset.time_ns.as_slice().unwrap_or(&[]);
    let rows: Vec<Vec<f64>> = dataset.data.rows().into_iter().map(|r| r.to_vec()).collect();
    let y_label = match dataset.variable.units() {
        "" => "State".to_string(),
        units => format!("{} [{units}]", dataset.variable.name()),
    };

    let panels: Vec<Panel<'_>> = dataset
        .qubits
        .iter()
        .zip(&rows)
        .enumerate()
        .map(|(i, (qubit, row))| {
            let location = machine
                .qubit(qubit)
                .map(|q| q.grid_location)
                .unwrap_or(GridLocation {
                    col: i as u32,
                    row: 0,
                });
            let lines = analysis
                .curves
                .get(qubit)
                .map(|curve| vec![(curve.as_slice(), FIT_COLOR)])
                .unwrap_or_default();
            let annotation = analysis.fit(qubit).and_then(|f| f.record()).map(|r| {
                format!(
                    "T2* = {:.1} ± {:.1} µs",
                    1e6 * r.decay,
                    1e6 * r.decay_error
                )
            });
            Panel {
                title: qubit.clone(),
                location,
                x,
                points: vec![row.as_slice()],
                lines,
                x_label: "Idle time [ns]",
                y_label: &y_label,
                annotation,
            }
        })
        .collect();
    render_grid_svg(title, &panels, config)
}

/// Simulated analog outputs, one panel per controller.
pub fn render_waveforms_svg(samples: &SampledWaveforms, config: &FigureConfig) -> String {
    let time: Vec<f64> = (0..samples.window_ns).map(|t| t as f64).collect();
    let panels: Vec<Panel<'_>> = samples
        .controllers
        .iter()
        .enumerate()
        .map(|(i, (controller, ports))| Panel {
            title: controller.clone(),
            location: GridLocation {
                col: 0,
                row: (samples.controllers.len() - 1 - i) as u32,
            },
            x: &time,
            points: vec![],
            lines: ports
                .values()
                .enumerate()
                .map(|(k, trace)| (trace.as_slice(), PORT_COLORS[k % PORT_COLORS.len()]))
                .collect(),
            x_label: "Time [ns]",
            y_label: "Output [V]",
            annotation: Some(
                ports
                    .keys()
                    .map(|p| format!("AO{p}"))
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
        })
        .collect();
    render_grid_svg(&["Simulated samples".to_string()], &panels, config)
}

/// Lay panels out by grid location (row 0 at the bottom) under a title block.
pub fn render_grid_svg(title: &[String], panels: &[Panel<'_>], config: &FigureConfig) -> String {
    let cols = panels.iter().map(|p| p.location.col + 1).max().unwrap_or(1);
    let rows = panels.iter().map(|p| p.location.row + 1).max().unwrap_or(1);
    let header = TITLE_LINE_HEIGHT * title.len() as u32 + 12;
    let width = cols * config.panel_width;
    let height = header + rows * config.panel_height;

    let mut parts = vec![format!(
        "<svg xmlns='http://www.w3.org/2000/svg' width='{width}' height='{height}' font-family='sans-serif' font-size='11'>"
    )];
    parts.push(format!(
        "<rect width='{width}' height='{height}' fill='white' />"
    ));
    for (i, line) in title.iter().enumerate() {
        parts.push(format!(
            "<text x='{:.1}' y='{}' text-anchor='middle' font-size='14'>{}</text>",
            width as f64 / 2.0,
            TITLE_LINE_HEIGHT * (i as u32 + 1),
            escape(line)
        ));
    }
    for panel in panels {
        let left = panel.location.col * config.panel_width;
        let top = header + (rows - 1 - panel.location.row) * config.panel_height;
        render_panel(&mut parts, panel, left as f64, top as f64, config);
    }
    parts.push("</svg>".into());
    parts.join("")
}

fn render_panel(parts: &mut Vec<String>, panel: &Panel<'_>, left: f64, top: f64, config: &FigureConfig) {
    let m = config.margin as f64;
    let x0 = left + m;
    let y0 = top + m / 2.0;
    let w = (config.panel_width as f64 - 1.5 * m).max(1.0);
    let h = (config.panel_height as f64 - 1.5 * m).max(1.0);

    let series = panel
        .points
        .iter()
        .copied()
        .chain(panel.lines.iter().map(|(s, _)| *s));
    let (x_min, x_max) = bounds(panel.x.iter().copied());
    let (y_min, y_max) = bounds(series.flat_map(|s| s.iter().copied()));
    let sx = |x: f64| x0 + (x - x_min) / (x_max - x_min) * w;
    let sy = |y: f64| y0 + h - (y - y_min) / (y_max - y_min) * h;

    parts.push(format!(
        "<text x='{:.1}' y='{:.1}' text-anchor='middle' font-size='12'>{}</text>",
        x0 + w / 2.0,
        y0 - 6.0,
        escape(&panel.title)
    ));
    parts.push(format!(
        "<rect x='{x0:.1}' y='{y0:.1}' width='{w:.1}' height='{h:.1}' fill='none' stroke='black' />"
    ));
    for (value, anchor, x) in [(x_min, "start", x0), (x_max, "end", x0 + w)] {
        parts.push(format!(
            "<text x='{x:.1}' y='{:.1}' text-anchor='{anchor}'>{}</text>",
            y0 + h + 14.0,
            tick(value)
        ));
    }
    for (value, y) in [(y_min, y0 + h), (y_max, y0 + 10.0)] {
        parts.push(format!(
            "<text x='{:.1}' y='{y:.1}' text-anchor='end'>{}</text>",
            x0 - 4.0,
            tick(value)
        ));
    }
    parts.push(format!(
        "<text x='{:.1}' y='{:.1}' text-anchor='middle'>{}</text>",
        x0 + w / 2.0,
        y0 + h + 30.0,
        escape(panel.x_label)
    ));
    parts.push(format!(
        "<text x='{:.1}' y='{:.1}' text-anchor='middle' transform='rotate(-90 {:.1} {:.1})'>{}</text>",
        left + 12.0,
        y0 + h / 2.0,
        left + 12.0,
        y0 + h / 2.0,
        escape(panel.y_label)
    ));

    for series in &panel.points {
        for (&x, &y) in panel.x.iter().zip(series.iter()) {
            if x.is_finite() && y.is_finite() {
                parts.push(format!(
                    "<circle cx='{:.1}' cy='{:.1}' r='1.5' fill='{DATA_COLOR}' />",
                    sx(x),
                    sy(y)
                ));
            }
        }
    }
    for (series, color) in &panel.lines {
        let step = (series.len() / MAX_TRACE_POINTS).max(1);
        let points: Vec<String> = panel
            .x
            .iter()
            .zip(series.iter())
            .step_by(step)
            .filter(|(x, y)| x.is_finite() && y.is_finite())
            .map(|(&x, &y)| format!("{:.1},{:.1}", sx(x), sy(y)))
            .collect();
        parts.push(format!(
            "<polyline points='{}' fill='none' stroke='{color}' stroke-width='1' />",
            points.join(" ")
        ));
    }

    if let Some(text) = &panel.annotation {
        let box_w = 7.0 * text.chars().count() as f64 + 8.0;
        parts.push(format!(
            "<rect x='{:.1}' y='{:.1}' width='{box_w:.1}' height='18' fill='white' fill-opacity='0.5' />",
            x0 + 0.1 * w,
            y0 + 0.1 * h - 13.0
        ));
        parts.push(format!(
            "<text x='{:.1}' y='{:.1}' font-size='10'>{}</text>",
            x0 + 0.1 * w + 4.0,
            y0 + 0.1 * h,
            escape(text)
        ));
    }
}

/// Finite range of `values`, widened when empty or flat.
fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !min.is_finite() {
        return (0.0, 1.0);
    }
    let span = max - min;
    if span < 1e-12 {
        return (min - 0.5, max + 0.5);
    }
    (min - 0.05 * span, max + 0.05 * span)
}

fn tick(value: f64) -> String {
    if value != 0.0 && (value.abs() < 1e-2 || value.abs() >= 1e4) {
        format!("{value:.2e}")
    } else {
        format!("{value:.2}")
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Variable;
    use crate::ramsey::analysis::analyze;
    use chrono::TimeZone;
    use ndarray::{Array1, Array2};
    use qcal_fit::{DecayModel, OscillationParams};
    use std::collections::BTreeMap;

    fn dataset() -> Dataset {
        let t: Vec<f64> = (4..400).map(|c| 4.0 * c as f64).collect();
        let p = OscillationParams {
            a: 0.4,
            f: 0.005,
            phi: 0.0,
            offset: 0.5,
            decay: 1e-3,
        };
        let y = DecayModel::Exponential.curve(&t, &p);
        let mut data = Array2::zeros((2, t.len()));
        data.row_mut(0).assign(&Array1::from(y.clone()));
        data.row_mut(1).assign(&Array1::from(y));
        Dataset::new(
            vec!["qD1".into(), "qD2".into()],
            Array1::from(t),
            Variable::State,
            data,
        )
        .unwrap()
    }

    #[test]
    fn test_title_in_gmt_plus_3() {
        let created = Utc.with_ymd_and_hms(2026, 10, 18, 22, 15, 0).unwrap();
        let title = ramsey_title(&dataset(), created, 12, true);
        assert_eq!(title[0], "Ramsey : state vs. idle time");
        assert_eq!(title[1], "2026-10-19 01:15:00 GMT+3 #12");
        assert_eq!(title[2], "multiplexed = true");
    }

    #[test]
    fn test_ramsey_grid() {
        let ds = dataset();
        let analysis = analyze(&ds, 5e6, DecayModel::Exponential);
        let config = FigureConfig::default();
        let svg = render_ramsey_svg(&ds, &analysis, &Machine::example(), &["t".into()], &config);

        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        // qD1 and qD2 sit side by side
        assert!(svg.contains(&format!("width='{}'", 2 * config.panel_width)));
        assert_eq!(svg.matches("<polyline").count(), 2);
        assert_eq!(svg.matches("T2* = 1.0 ± ").count(), 2);
        assert_eq!(svg.matches("<circle").count(), 2 * ds.time_ns.len());
    }

    #[test]
    fn test_waveforms() {
        let mut ports = BTreeMap::new();
        ports.insert(1, vec![0.0, 0.1, 0.2, 0.1]);
        ports.insert(2, vec![0.0; 4]);
        let mut samples = SampledWaveforms {
            window_ns: 4,
            controllers: BTreeMap::new(),
        };
        samples.controllers.insert("con1".into(), ports);
        let svg = render_waveforms_svg(&samples, &FigureConfig::default());
        assert!(svg.contains(">con1<"));
        assert!(svg.contains("AO1 AO2"));
        assert_eq!(svg.matches("<polyline").count(), 2);
    }

    #[test]
    fn test_bounds() {
        assert_eq!(bounds([].into_iter()), (0.0, 1.0));
        assert_eq!(bounds([2.0, 2.0].into_iter()), (1.5, 2.5));
        assert_eq!(bounds([0.0, f64::NAN, 10.0].into_iter()), (-0.5, 10.5));
        assert_eq!(escape("a<b & 'c'"), "a&lt;b &amp; &apos;c&apos;");
    }
}
