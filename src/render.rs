/// Chart rendering for the discharge reporting pipeline.
///
/// Produces the PNG artifacts consumed by the static report page. Two
/// chart styles exist: a chronological view over the fetched range, and a
/// day-over-day overlay on a shared 24-hour axis. Desktop and mobile
/// variants differ only in pixel dimensions and font scaling, never in
/// data content.
///
/// Rendering is deterministic for identical input series (axis ranges
/// derive from the data, color assignment is positional over fixed
/// palettes), so cached rendered images can stand in for a re-render.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::error::Error;
use std::fs;
use std::path::Path;

use crate::model::{RenderError, SeriesPoint};
use crate::series::{self, DayBucket};

// ---------------------------------------------------------------------------
// Style presets
// ---------------------------------------------------------------------------

/// Pixel dimensions and font sizes for one output form factor.
#[derive(Debug, Clone)]
pub struct ChartStyle {
    pub chronological_size: (u32, u32),
    pub overlay_size: (u32, u32),
    pub title_px: u32,
    pub label_px: u32,
    pub tick_px: u32,
    pub legend_px: u32,
    pub annotation_px: u32,
}

pub fn desktop_style() -> ChartStyle {
    ChartStyle {
        chronological_size: (1200, 600),
        overlay_size: (1200, 1000),
        title_px: 28,
        label_px: 18,
        tick_px: 15,
        legend_px: 15,
        annotation_px: 14,
    }
}

/// Mobile preset: a tall, narrow canvas with larger type.
pub fn mobile_style() -> ChartStyle {
    ChartStyle {
        chronological_size: (620, 950),
        overlay_size: (620, 1150),
        title_px: 30,
        label_px: 21,
        tick_px: 18,
        legend_px: 18,
        annotation_px: 17,
    }
}

// ---------------------------------------------------------------------------
// Palettes
// ---------------------------------------------------------------------------

/// Fixed color for the primary series (Vu Gia / station level).
pub const PRIMARY_SERIES_COLOR: RGBColor = RGBColor(31, 119, 180);

/// Fixed color for the secondary series (Thu Bồn).
pub const SECONDARY_SERIES_COLOR: RGBColor = RGBColor(44, 160, 44);

/// Colors for reference lines, indexed positionally.
const MARKER_PALETTE: [RGBColor; 5] = [
    RGBColor(255, 127, 14),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
];

/// Colors for overlay day lines, indexed by sorted day order.
const DAY_PALETTE: [RGBColor; 10] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
    RGBColor(188, 189, 34),
    RGBColor(23, 190, 207),
];

// ---------------------------------------------------------------------------
// Chart descriptions
// ---------------------------------------------------------------------------

/// A dashed horizontal reference line: a station alarm level or a
/// marked-date maximum. `color_index` picks from the marker palette so
/// lines belonging together (same marked date) can share a color while
/// differing in dash pattern.
#[derive(Debug, Clone)]
pub struct ReferenceLine {
    pub label: String,
    pub value: f64,
    pub color_index: usize,
    pub dash: (u32, u32),
}

/// Labels and decorations for a chronological chart.
pub struct ChronologicalChart<'a> {
    pub title: &'a str,
    pub x_label: &'a str,
    pub y_label: &'a str,
    pub primary_label: &'a str,
    /// `None` renders a single-series chart (monitoring stations).
    pub secondary_label: Option<&'a str>,
    pub reference_lines: &'a [ReferenceLine],
}

/// Labels for an overlay chart. With a secondary panel title the canvas is
/// split into two stacked panels, one per series.
pub struct OverlayChart<'a> {
    pub title: &'a str,
    pub x_label: &'a str,
    pub y_label: &'a str,
    pub primary_panel_title: &'a str,
    pub secondary_panel_title: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Renders the chronological chart to `out`, overwriting any existing file.
pub fn render_chronological(
    points: &[SeriesPoint],
    chart: &ChronologicalChart<'_>,
    style: &ChartStyle,
    out: &Path,
) -> Result<(), RenderError> {
    if points.is_empty() {
        return Err(RenderError::EmptySeries(chart.title.to_string()));
    }
    prepare_parent(out)?;
    draw_chronological(points, chart, style, out)
        .map_err(|err| RenderError::Backend(err.to_string()))
}

/// Renders the overlay-by-day chart to `out`, overwriting any existing file.
pub fn render_overlay(
    points: &[SeriesPoint],
    chart: &OverlayChart<'_>,
    style: &ChartStyle,
    out: &Path,
) -> Result<(), RenderError> {
    if points.is_empty() {
        return Err(RenderError::EmptySeries(chart.title.to_string()));
    }
    prepare_parent(out)?;
    draw_overlay(points, chart, style, out).map_err(|err| RenderError::Backend(err.to_string()))
}

fn prepare_parent(out: &Path) -> Result<(), RenderError> {
    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|err| RenderError::Io(format!("{}: {}", parent.display(), err)))?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Axis helpers
// ---------------------------------------------------------------------------

/// Time axis bounds. A single-point series gets an hour of padding so the
/// axis range stays non-degenerate.
fn time_range(points: &[SeriesPoint]) -> (DateTime<Utc>, DateTime<Utc>) {
    let first = points.first().expect("caller checked non-empty").timestamp;
    let last = points.last().expect("caller checked non-empty").timestamp;
    if first == last {
        (first, last + Duration::hours(1))
    } else {
        (first, last)
    }
}

/// Value axis upper bound: 10% headroom above the largest plotted value,
/// reference lines included so they never fall off the canvas.
fn value_axis_max(points: &[SeriesPoint], reference_lines: &[ReferenceLine]) -> f64 {
    let mut max = 0.0f64;
    for point in points {
        max = max.max(point.primary);
        if let Some(secondary) = point.secondary {
            max = max.max(secondary);
        }
    }
    for line in reference_lines {
        max = max.max(line.value);
    }
    if max <= 0.0 { 1.0 } else { max * 1.1 }
}

// ---------------------------------------------------------------------------
// Chronological chart
// ---------------------------------------------------------------------------

fn draw_chronological(
    points: &[SeriesPoint],
    chart: &ChronologicalChart<'_>,
    style: &ChartStyle,
    out: &Path,
) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(out, style.chronological_size).into_drawing_area();
    root.fill(&WHITE)?;

    let (t0, t1) = time_range(points);
    let y_max = value_axis_max(points, chart.reference_lines);

    let mut builder = ChartBuilder::on(&root);
    let mut ctx = builder
        .caption(chart.title, ("sans-serif", style.title_px).into_font())
        .margin(10)
        .x_label_area_size(55)
        .y_label_area_size(65)
        .build_cartesian_2d(t0..t1, 0f64..y_max)?;

    ctx.configure_mesh()
        .x_labels(8)
        .x_label_formatter(&|t: &DateTime<Utc>| t.format("%Y-%m-%d %H:%M").to_string())
        .x_desc(chart.x_label)
        .y_desc(chart.y_label)
        .label_style(("sans-serif", style.tick_px).into_font())
        .axis_desc_style(("sans-serif", style.label_px).into_font())
        .draw()?;

    ctx.draw_series(LineSeries::new(
        points.iter().map(|p| (p.timestamp, p.primary)),
        PRIMARY_SERIES_COLOR.stroke_width(2),
    ))?
    .label(chart.primary_label)
    .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], PRIMARY_SERIES_COLOR.filled()));

    if let Some(secondary_label) = chart.secondary_label {
        ctx.draw_series(LineSeries::new(
            points.iter().filter_map(|p| p.secondary.map(|v| (p.timestamp, v))),
            SECONDARY_SERIES_COLOR.stroke_width(2),
        ))?
        .label(secondary_label)
        .legend(|(x, y)| {
            PathElement::new(vec![(x, y), (x + 20, y)], SECONDARY_SERIES_COLOR.filled())
        });
    }

    // Latest readings get a dot and the value printed next to it, so the
    // report page shows the current number without a separate widget.
    if let Some(last) = points.last() {
        ctx.draw_series(std::iter::once(
            EmptyElement::at((last.timestamp, last.primary))
                + Circle::new((0, 0), 4, PRIMARY_SERIES_COLOR.filled())
                + Text::new(
                    format!("{:.1}", last.primary),
                    (8, -18),
                    ("sans-serif", style.annotation_px)
                        .into_font()
                        .color(&PRIMARY_SERIES_COLOR),
                ),
        ))?;
    }
    if chart.secondary_label.is_some() {
        let last_secondary = points
            .iter()
            .rev()
            .find_map(|p| p.secondary.map(|v| (p.timestamp, v)));
        if let Some((t, v)) = last_secondary {
            ctx.draw_series(std::iter::once(
                EmptyElement::at((t, v))
                    + Circle::new((0, 0), 4, SECONDARY_SERIES_COLOR.filled())
                    + Text::new(
                        format!("{:.1}", v),
                        (8, 8),
                        ("sans-serif", style.annotation_px)
                            .into_font()
                            .color(&SECONDARY_SERIES_COLOR),
                    ),
            ))?;
        }
    }

    for line in chart.reference_lines {
        let color = MARKER_PALETTE[line.color_index % MARKER_PALETTE.len()];
        ctx.draw_series(DashedLineSeries::new(
            vec![(t0, line.value), (t1, line.value)],
            line.dash.0,
            line.dash.1,
            color.stroke_width(1),
        ))?
        .label(line.label.clone())
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.filled()));
    }

    ctx.configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .label_font(("sans-serif", style.legend_px).into_font())
        .draw()?;

    root.present()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Overlay chart
// ---------------------------------------------------------------------------

fn draw_overlay(
    points: &[SeriesPoint],
    chart: &OverlayChart<'_>,
    style: &ChartStyle,
    out: &Path,
) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(out, style.overlay_size).into_drawing_area();
    root.fill(&WHITE)?;
    let titled = root.titled(chart.title, ("sans-serif", style.title_px).into_font())?;

    let primary_days = series::overlay_by_day(points, |p| Some(p.primary));

    match chart.secondary_panel_title {
        Some(secondary_title) => {
            let secondary_days = series::overlay_by_day(points, |p| p.secondary);
            let panels = titled.split_evenly((2, 1));
            draw_overlay_panel(&panels[0], chart.primary_panel_title, &primary_days, chart, style)?;
            draw_overlay_panel(&panels[1], secondary_title, &secondary_days, chart, style)?;
        }
        None => {
            draw_overlay_panel(&titled, chart.primary_panel_title, &primary_days, chart, style)?;
        }
    }

    root.present()?;
    Ok(())
}

fn draw_overlay_panel<'a>(
    area: &DrawingArea<BitMapBackend<'a>, Shift>,
    title: &str,
    days: &[DayBucket],
    chart: &OverlayChart<'_>,
    style: &ChartStyle,
) -> Result<(), Box<dyn Error>> {
    let y_max = {
        let max = days
            .iter()
            .flat_map(|d| d.points.iter().map(|(_, v)| *v))
            .fold(0.0f64, f64::max);
        if max <= 0.0 { 1.0 } else { max * 1.1 }
    };

    let mut builder = ChartBuilder::on(area);
    let mut ctx = builder
        .caption(title, ("sans-serif", style.title_px).into_font())
        .margin(10)
        .x_label_area_size(45)
        .y_label_area_size(65)
        .build_cartesian_2d(
            RangedDateTime::from(series::overlay_axis_start()..series::overlay_axis_end()),
            0f64..y_max,
        )?;

    ctx.configure_mesh()
        .x_labels(8)
        .x_label_formatter(&|t: &NaiveDateTime| t.format("%H:%M").to_string())
        .x_desc(chart.x_label)
        .y_desc(chart.y_label)
        .label_style(("sans-serif", style.tick_px).into_font())
        .axis_desc_style(("sans-serif", style.label_px).into_font())
        .draw()?;

    for (index, day) in days.iter().enumerate() {
        let color = DAY_PALETTE[index % DAY_PALETTE.len()];
        ctx.draw_series(LineSeries::new(
            day.points.iter().copied(),
            color.stroke_width(2),
        ))?
        .label(day.label.clone())
        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.filled()));
    }

    ctx.configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .label_font(("sans-serif", style.legend_px).into_font())
        .draw()?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_points() -> Vec<SeriesPoint> {
        (0..6)
            .map(|h| SeriesPoint {
                timestamp: Utc.with_ymd_and_hms(2025, 10, 28, h, 0, 0).unwrap(),
                primary: 100.0 + h as f64,
                secondary: Some(50.0 + h as f64),
            })
            .collect()
    }

    #[test]
    fn test_style_variants_differ_only_in_geometry() {
        let desktop = desktop_style();
        let mobile = mobile_style();
        assert_ne!(desktop.chronological_size, mobile.chronological_size);
        assert_ne!(desktop.title_px, mobile.title_px);
    }

    #[test]
    fn test_time_range_pads_single_point_series() {
        let points = vec![SeriesPoint {
            timestamp: Utc.with_ymd_and_hms(2025, 10, 28, 7, 0, 0).unwrap(),
            primary: 1.0,
            secondary: None,
        }];
        let (t0, t1) = time_range(&points);
        assert!(t1 > t0, "axis range must be non-degenerate");
    }

    #[test]
    fn test_value_axis_covers_reference_lines() {
        let lines = [ReferenceLine {
            label: "BĐ3".to_string(),
            value: 9000.0,
            color_index: 0,
            dash: (6, 6),
        }];
        let max = value_axis_max(&sample_points(), &lines);
        assert!(max > 9000.0, "reference lines must stay inside the canvas");
    }

    #[test]
    fn test_value_axis_falls_back_for_flat_zero_series() {
        let points = vec![SeriesPoint {
            timestamp: Utc.with_ymd_and_hms(2025, 10, 28, 7, 0, 0).unwrap(),
            primary: 0.0,
            secondary: None,
        }];
        assert_eq!(value_axis_max(&points, &[]), 1.0);
    }

    #[test]
    fn test_empty_series_is_rejected_before_touching_disk() {
        let chart = ChronologicalChart {
            title: "t",
            x_label: "x",
            y_label: "y",
            primary_label: "p",
            secondary_label: None,
            reference_lines: &[],
        };
        let out = std::env::temp_dir().join("hydroreport_render_should_not_exist.png");
        let err = render_chronological(&[], &chart, &desktop_style(), &out)
            .expect_err("empty series must be rejected");
        assert!(matches!(err, RenderError::EmptySeries(_)));
        assert!(!out.exists());
    }

    // Rasterizes through the bitmap backend, which needs a system font
    // for labels. Run manually: cargo test -- --ignored render_smoke
    #[test]
    #[ignore]
    fn render_smoke_chronological_and_overlay_write_files() {
        let dir = std::env::temp_dir().join(format!("hydroreport_render_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let chrono_out = dir.join("chronological.png");
        let chart = ChronologicalChart {
            title: "Diễn biến theo giờ",
            x_label: "Thời gian xả",
            y_label: "Lưu lượng",
            primary_label: "Q về Vu Gia",
            secondary_label: Some("Q về Thu Bồn"),
            reference_lines: &[],
        };
        render_chronological(&sample_points(), &chart, &desktop_style(), &chrono_out)
            .expect("chronological render should succeed");
        assert!(chrono_out.exists());

        let overlay_out = dir.join("overlay.png");
        let overlay = OverlayChart {
            title: "Báo cáo thủy điện",
            x_label: "Thời gian xả",
            y_label: "Lưu lượng",
            primary_panel_title: "Q về Vu Gia - So sánh từng ngày theo giờ",
            secondary_panel_title: Some("Q về Thu Bồn - So sánh từng ngày theo giờ"),
        };
        render_overlay(&sample_points(), &overlay, &desktop_style(), &overlay_out)
            .expect("overlay render should succeed");
        assert!(overlay_out.exists());
    }
}
