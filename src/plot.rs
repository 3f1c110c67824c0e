use crate::error::{Result, WaveError};
use crate::objective::LossRecord;
use plotters::prelude::*;
use std::path::Path;

fn plot_error<E: std::fmt::Debug>(e: E) -> WaveError {
    WaveError::Plot(format!("{e:?}"))
}

/// 学習過程の損失をグラフとしてPNGファイルに出力します。
pub fn plot_loss_history(records: &[LossRecord], path: &Path) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    let log10 = |v: f64| v.max(f64::MIN_POSITIVE).log10();
    let (min_log_loss, max_log_loss) = records
        .iter()
        .flat_map(|r| [r.total, r.pde])
        .map(log10)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });

    let root = BitMapBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("Loss History", ("sans-serif", 40).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(
            0..records.len(),
            (min_log_loss - 0.5)..(max_log_loss + 0.5),
        )
        .map_err(plot_error)?;
    chart
        .configure_mesh()
        .y_desc("Loss (log10 scale)")
        .x_desc("Evaluations")
        .draw()
        .map_err(plot_error)?;
    chart
        .draw_series(LineSeries::new(
            records.iter().enumerate().map(|(i, r)| (i, log10(r.total))),
            &RED,
        ))
        .map_err(plot_error)?
        .label("Total Loss")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));
    chart
        .draw_series(LineSeries::new(
            records.iter().enumerate().map(|(i, r)| (i, log10(r.pde))),
            &BLUE,
        ))
        .map_err(plot_error)?
        .label("Physics Loss")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));
    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(plot_error)?;
    root.present().map_err(plot_error)?;
    Ok(())
}

/// 格子上の値。`values[j * nx + i]` が `(xs[i], ys[j])` に対応します。
#[derive(Debug, Clone)]
pub struct Heatmap<'a> {
    pub caption: &'a str,
    pub x_label: &'a str,
    pub y_label: &'a str,
    pub xs: &'a [f64],
    pub ys: &'a [f64],
    pub values: &'a [f64],
}

/// 2次元格子上の予測値をカラーマップとしてPNGファイルに出力します。
pub fn plot_heatmap(map: &Heatmap<'_>, path: &Path) -> Result<()> {
    let nx = map.xs.len();
    let ny = map.ys.len();
    if nx < 2 || ny < 2 {
        return Ok(());
    }
    let (lo, hi) = map
        .values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let span = (hi - lo).max(1e-12);
    let dx = map.xs[1] - map.xs[0];
    let dy = map.ys[1] - map.ys[0];

    let root = BitMapBackend::new(path, (800, 700)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_error)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(map.caption, ("sans-serif", 30).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(
            map.xs[0]..(map.xs[nx - 1] + dx),
            map.ys[0]..(map.ys[ny - 1] + dy),
        )
        .map_err(plot_error)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc(map.x_label)
        .y_desc(map.y_label)
        .draw()
        .map_err(plot_error)?;
    chart
        .draw_series(map.ys.iter().enumerate().flat_map(|(j, &y)| {
            map.xs.iter().enumerate().map(move |(i, &x)| {
                let v = (map.values[j * nx + i] - lo) / span;
                let color = HSLColor(0.66 * (1.0 - v), 0.9, 0.5);
                Rectangle::new([(x, y), (x + dx, y + dy)], color.filled())
            })
        }))
        .map_err(plot_error)?;
    root.present().map_err(plot_error)?;
    Ok(())
}
