use crate::tasks::experiments::{
    color::{FONT_SIZE, STROKE_WIDTH, get_palette_color},
    logs::{self, BoxStats, ResultRow},
    modes::{display_label, plot_labels},
};
use anyhow::Result;
use log::{error, info};
use plotters::{coord::types::RangedCoordf64, prelude::*};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::Path,
};

const CHART_SIZE: (u32, u32) = (900, 450);

pub const DESCRIPTIVE_ORDER: [&str; 1] = ["descriptive"];
pub const SUCCESS_ORDER: [&str; 4] = ["descriptive", "mpich", "intel-mpi", "openmpi"];

pub type Chart<'a, 'b> = ChartContext<'a, SVGBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

/// Position of bar (or box) `inner` of group `group`, with one empty slot
/// between groups.
pub fn group_x(group: usize, inner: usize, group_width: usize) -> f64 {
    (group * (group_width + 1) + inner) as f64
}

pub fn group_x_max(num_groups: usize, group_width: usize) -> f64 {
    (num_groups * (group_width + 1)) as f64 - 0.5
}

/// Draw the name of each group centered below its bars.
pub fn draw_group_labels(
    root: &DrawingArea<SVGBackend, plotters::coord::Shift>,
    chart: &Chart,
    labels: &[&str],
    group_width: usize,
) -> Result<()> {
    for (idx, label) in labels.iter().enumerate() {
        let x_center = group_x(idx, 0, group_width) + group_width as f64 / 2.0;
        let (x_px, y_px) = chart.plotting_area().map_coordinate(&(x_center, 0.0));
        let x_offset = (label.len() as i32 * FONT_SIZE) / 4;
        root.draw(&Text::new(
            label.to_string(),
            (x_px - x_offset, y_px + 8),
            ("sans-serif", FONT_SIZE).into_font(),
        ))?;
    }

    Ok(())
}

/// Manually draw the legend above the chart.
pub fn draw_legend(
    root: &DrawingArea<SVGBackend, plotters::coord::Shift>,
    entries: &[(String, RGBColor)],
) -> Result<()> {
    let legend_x_start = 10;
    let legend_y_pos = 6;
    let mut x_pos = legend_x_start;

    for (label, color) in entries {
        root.draw(&Rectangle::new(
            [(x_pos, legend_y_pos), (x_pos + 20, legend_y_pos + 20)],
            color.filled(),
        ))?;
        root.draw(&Rectangle::new(
            [(x_pos, legend_y_pos), (x_pos + 20, legend_y_pos + 20)],
            BLACK,
        ))?;
        root.draw(&Text::new(
            label.clone(),
            (x_pos + 30, legend_y_pos + 2),
            ("sans-serif", FONT_SIZE).into_font(),
        ))?;

        x_pos += 40 + (label.len() as i32 * FONT_SIZE) / 2;
    }

    Ok(())
}

fn sorted_reasons(rows: &[&ResultRow]) -> Vec<String> {
    rows.iter()
        .map(|row| row.reason.clone())
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect()
}

fn palette_for(reasons: &[String]) -> Vec<(String, RGBColor)> {
    reasons
        .iter()
        .enumerate()
        .map(|(idx, reason)| (reason.clone(), get_palette_color(idx)))
        .collect()
}

/// # Description
///
/// Count how often each reason shows up per experiment, keeping only the
/// experiments in `order`.
pub fn reason_counts(rows: &[ResultRow], order: &[&str]) -> BTreeMap<(String, String), u32> {
    let mut counts = BTreeMap::new();
    for row in rows.iter().filter(|row| order.contains(&row.experiment.as_str())) {
        *counts
            .entry((row.experiment.clone(), row.reason.clone()))
            .or_insert(0) += 1;
    }
    counts
}

/// Wall times per experiment and reason, keeping only the experiments in
/// `order` and the rows with a wall time.
pub fn wall_times(rows: &[ResultRow], order: &[&str]) -> BTreeMap<(String, String), Vec<f64>> {
    let mut times = BTreeMap::<(String, String), Vec<f64>>::new();
    for row in rows.iter().filter(|row| order.contains(&row.experiment.as_str())) {
        if let Some(wall_time) = row.wall_time {
            times
                .entry((row.experiment.clone(), row.reason.clone()))
                .or_default()
                .push(wall_time);
        }
    }
    times
}

fn plot_reason_counts(rows: &[ResultRow], order: &[&str], plot_path: &Path) -> Result<()> {
    let subset: Vec<&ResultRow> = rows
        .iter()
        .filter(|row| order.contains(&row.experiment.as_str()))
        .collect();
    let reasons = sorted_reasons(&subset);
    let palette = palette_for(&reasons);
    let counts = reason_counts(rows, order);

    let group_width = reasons.len().max(1);
    let x_max = group_x_max(order.len(), group_width);
    let y_max = counts.values().copied().max().unwrap_or(1) as f64 * 1.1;

    let root = SVGBackend::new(plot_path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .margin(10)
        .margin_top(40)
        .build_cartesian_2d(-0.5..x_max, 0f64..y_max)?;

    chart
        .configure_mesh()
        .light_line_style(WHITE)
        .y_labels(10)
        .y_label_style(("sans-serif", FONT_SIZE).into_font())
        .y_desc("Count")
        .x_label_formatter(&|_| String::new())
        .disable_x_mesh()
        .y_label_formatter(&|y| format!("{:.0}", y))
        .draw()?;

    for (e_idx, experiment) in order.iter().enumerate() {
        for (r_idx, (reason, color)) in palette.iter().enumerate() {
            let count = counts
                .get(&(experiment.to_string(), reason.clone()))
                .copied()
                .unwrap_or(0) as f64;
            if count == 0.0 {
                continue;
            }

            let x = group_x(e_idx, r_idx, group_width);
            chart.draw_series(std::iter::once(Rectangle::new(
                [(x, 0.0), (x + 1.0, count)],
                color.filled(),
            )))?;
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(x, 0.0), (x + 1.0, 0.0), (x + 1.0, count), (x, count), (x, 0.0)],
                BLACK,
            )))?;
        }
    }

    draw_group_labels(&root, &chart, order, group_width)?;
    draw_legend(&root, &palette)?;
    root.present()?;

    info!("plot available at: {}", plot_path.display());
    Ok(())
}

fn draw_box(chart: &mut Chart, x: f64, stats: &BoxStats, color: &RGBColor) -> Result<()> {
    let (left, right) = (x + 0.15, x + 0.85);
    let mid = x + 0.5;

    chart.draw_series(std::iter::once(Rectangle::new(
        [(left, stats.q1), (right, stats.q3)],
        color.mix(0.7).filled(),
    )))?;
    chart.draw_series(std::iter::once(PathElement::new(
        vec![
            (left, stats.q1),
            (right, stats.q1),
            (right, stats.q3),
            (left, stats.q3),
            (left, stats.q1),
        ],
        BLACK,
    )))?;

    // Median and whiskers
    chart.draw_series(
        [
            vec![(left, stats.median), (right, stats.median)],
            vec![(mid, stats.low), (mid, stats.q1)],
            vec![(mid, stats.q3), (mid, stats.high)],
            vec![(x + 0.3, stats.low), (x + 0.7, stats.low)],
            vec![(x + 0.3, stats.high), (x + 0.7, stats.high)],
        ]
        .into_iter()
        .map(|points| PathElement::new(points, BLACK.stroke_width(STROKE_WIDTH))),
    )?;

    Ok(())
}

fn plot_wall_times(rows: &[ResultRow], order: &[&str], plot_path: &Path) -> Result<()> {
    let subset: Vec<&ResultRow> = rows
        .iter()
        .filter(|row| order.contains(&row.experiment.as_str()))
        .collect();
    let reasons = sorted_reasons(&subset);
    let palette = palette_for(&reasons);
    let times = wall_times(rows, order);

    let group_width = reasons.len().max(1);
    let x_max = group_x_max(order.len(), group_width);
    let y_max = times
        .values()
        .flatten()
        .copied()
        .fold(0.0, f64::max)
        .max(1.0)
        * 1.1;

    let root = SVGBackend::new(plot_path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .margin(10)
        .margin_top(40)
        .build_cartesian_2d(-0.5..x_max, 0f64..y_max)?;

    chart
        .configure_mesh()
        .light_line_style(WHITE)
        .y_labels(10)
        .y_label_style(("sans-serif", FONT_SIZE).into_font())
        .y_desc("Wall time (seconds)")
        .x_label_formatter(&|_| String::new())
        .disable_x_mesh()
        .y_label_formatter(&|y| format!("{:.0}", y))
        .draw()?;

    for (e_idx, experiment) in order.iter().enumerate() {
        for (r_idx, (reason, color)) in palette.iter().enumerate() {
            let Some(values) = times.get(&(experiment.to_string(), reason.clone())) else {
                continue;
            };
            if let Some(stats) = BoxStats::new(values) {
                draw_box(&mut chart, group_x(e_idx, r_idx, group_width), &stats, color)?;
            }
        }
    }

    draw_group_labels(&root, &chart, order, group_width)?;
    draw_legend(&root, &palette)?;
    root.present()?;

    info!("plot available at: {}", plot_path.display());
    Ok(())
}

/// # Description
///
/// Parse the LAMMPS logs under `results`, save them as `lammps-times.csv`
/// and plot failure reasons and wall times per selection mode.
pub fn plot(results: &Path, out: &Path) -> Result<()> {
    fs::create_dir_all(out).map_err(|e| {
        let reason = format!(
            "error creating directory (path={}, error={e:?})",
            out.display()
        );
        error!("{reason}");
        anyhow::anyhow!(reason)
    })?;

    let files = logs::find_inputs(results)?;
    if files.is_empty() {
        let reason = format!("there are no LAMMPS log files in {}", results.display());
        error!("{reason}");
        anyhow::bail!(reason);
    }

    let rows = logs::parse_results(results, &files)?;
    logs::write_csv(&rows, &out.join("lammps-times.csv"))?;

    let rows: Vec<ResultRow> = rows
        .into_iter()
        .map(|mut row| {
            row.experiment = display_label(&row.experiment);
            row
        })
        .collect();

    plot_reason_counts(&rows, &plot_labels(), &out.join("lammps-reasons-failure.svg"))?;
    plot_wall_times(
        &rows,
        &DESCRIPTIVE_ORDER,
        &out.join("lammps-descriptive-wall-time.svg"),
    )?;
    plot_wall_times(&rows, &SUCCESS_ORDER, &out.join("lammps-success-runs.svg"))?;

    Ok(())
}
