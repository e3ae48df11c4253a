use crate::tasks::experiments::color::FONT_SIZE;
use anyhow::Result;
use compat_spec::levels::{CompatibilityLevel, cosine_distance_matrix};
use log::{error, info};
use plotters::prelude::*;
use std::{fs, path::Path};

/// Dark and light ends of the heatmap colour scale.
const HEATMAP_LOW: (f64, f64, f64) = (11.0, 4.0, 5.0);
const HEATMAP_HIGH: (f64, f64, f64) = (222.0, 245.0, 229.0);

fn heatmap_color(value: f64, max: f64) -> RGBColor {
    let t = if max > 0.0 {
        (value / max).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let lerp = |a: f64, b: f64| (a + (b - a) * t).round() as u8;

    RGBColor(
        lerp(HEATMAP_LOW.0, HEATMAP_HIGH.0),
        lerp(HEATMAP_LOW.1, HEATMAP_HIGH.1),
        lerp(HEATMAP_LOW.2, HEATMAP_HIGH.2),
    )
}

/// Distance matrix as CSV, with the level names as header and first column.
pub fn matrix_to_csv(levels: &[CompatibilityLevel], dist: &[Vec<f64>]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(vec![]);

    let mut header = vec![String::new()];
    header.extend(levels.iter().map(|level| level.to_string()));
    writer.write_record(&header)?;

    for (level, row) in levels.iter().zip(dist) {
        let mut record = vec![level.to_string()];
        record.extend(row.iter().map(|value| format!("{value:.6}")));
        writer.write_record(&record)?;
    }

    let bytes = writer.into_inner().map_err(|e| {
        let reason = format!("error flushing csv (error={e:?})");
        error!("{reason}");
        anyhow::anyhow!(reason)
    })?;
    Ok(String::from_utf8(bytes)?)
}

fn plot_heatmap(levels: &[CompatibilityLevel], dist: &[Vec<f64>], plot_path: &Path) -> Result<()> {
    let n = levels.len();
    let max = dist.iter().flatten().copied().fold(0.0, f64::max);

    let root = SVGBackend::new(plot_path, (700, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(120)
        .build_cartesian_2d(0f64..n as f64, 0f64..n as f64)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_label_formatter(&|_| String::new())
        .y_label_formatter(&|_| String::new())
        .draw()?;

    // Manually draw the level names next to their row and below their column
    for (idx, level) in levels.iter().enumerate() {
        let label = level.to_string();
        let label_width = (label.len() as i32 * FONT_SIZE) / 2;

        let (x_px, y_px) = chart
            .plotting_area()
            .map_coordinate(&(idx as f64 + 0.5, 0.0));
        root.draw(&Text::new(
            label.clone(),
            (x_px - label_width / 2, y_px + 10),
            ("sans-serif", FONT_SIZE).into_font(),
        ))?;

        let (x_px, y_px) = chart
            .plotting_area()
            .map_coordinate(&(0.0, (n - 1 - idx) as f64 + 0.5));
        root.draw(&Text::new(
            label,
            (x_px - label_width - 10, y_px - FONT_SIZE / 2),
            ("sans-serif", FONT_SIZE).into_font(),
        ))?;
    }

    // Row zero at the top, like a matrix
    for (i, row) in dist.iter().enumerate() {
        let y = (n - 1 - i) as f64;
        for (j, value) in row.iter().enumerate() {
            let x = j as f64;
            chart.draw_series(std::iter::once(Rectangle::new(
                [(x, y), (x + 1.0, y + 1.0)],
                heatmap_color(*value, max).filled(),
            )))?;

            let text_color = if *value > max / 2.0 { &BLACK } else { &WHITE };
            chart.draw_series(std::iter::once(Text::new(
                format!("{value:.2}"),
                (x + 0.4, y + 0.5),
                ("sans-serif", FONT_SIZE).into_font().color(text_color),
            )))?;
        }
    }

    root.present()?;
    info!("plot available at: {}", plot_path.display());
    Ok(())
}

/// # Description
///
/// Compute the cosine distances between compatibility levels and save them
/// as `compatibility-matrix.csv` and a heatmap `compatibility-matrix.svg`.
pub fn run(out: &Path) -> Result<()> {
    fs::create_dir_all(out).map_err(|e| {
        let reason = format!(
            "error creating directory (path={}, error={e:?})",
            out.display()
        );
        error!("{reason}");
        anyhow::anyhow!(reason)
    })?;

    let levels: Vec<CompatibilityLevel> = CompatibilityLevel::gradient_levels().copied().collect();
    let dist = cosine_distance_matrix(&levels);

    let csv_path = out.join("compatibility-matrix.csv");
    fs::write(&csv_path, matrix_to_csv(&levels, &dist)?).map_err(|e| {
        let reason = format!(
            "error writing matrix (path={}, error={e:?})",
            csv_path.display()
        );
        error!("{reason}");
        anyhow::anyhow!(reason)
    })?;

    plot_heatmap(&levels, &dist, &out.join("compatibility-matrix.svg"))
}
