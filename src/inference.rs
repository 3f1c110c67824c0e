use crate::checkpoint::{Artifacts, load_config, load_model};
use crate::error::Result;
use crate::model::{Model, tensor_to_vec};
use crate::plot::{Heatmap, plot_heatmap};
use crate::sampling::PointSet;
use crate::scenario::{Dimension, Domain};
use burn::backend::NdArray;
use burn::prelude::Backend;
use std::time::Instant;

type WaveBackend = NdArray<f64>;

/// 推論に使う格子。
#[derive(Debug, Clone)]
pub struct Grid {
    /// 横軸（常に空間座標 x）
    pub xs: Vec<f64>,
    /// 縦軸（1次元問題では時間 t, 2次元問題では y）
    pub ys: Vec<f64>,
    pub points: PointSet,
}

/// 推論結果の要約。
#[derive(Debug, Clone)]
pub struct InferenceSummary {
    pub points: usize,
    pub max_error: Option<f64>,
    pub rms_error: Option<f64>,
}

fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![lo; n];
    }
    (0..n)
        .map(|i| lo + (hi - lo) * i as f64 / (n - 1) as f64)
        .collect()
}

/// 評価用の格子を作ります。
///
/// 1次元問題は x × t, 2次元問題は時刻 `time` における x × y の格子です。
pub fn evaluation_grid(dimension: Dimension, resolution: usize, time: f64) -> Grid {
    let domain = dimension.domain();
    let xs = linspace(domain.lower[0], domain.upper[0], resolution);
    let ys = linspace(domain.lower[1], domain.upper[1], resolution);
    let mut points = PointSet::with_capacity(domain.dim(), resolution * resolution);
    for &y in &ys {
        for &x in &xs {
            match dimension {
                Dimension::One => points.push(&[x, y]),
                Dimension::Two => points.push(&[x, y, time]),
            }
        }
    }
    Grid { xs, ys, points }
}

/// 正規化してからモデルで予測します。
pub fn predict<B: Backend>(
    model: &Model<B>,
    domain: &Domain,
    points: &PointSet,
    device: &B::Device,
) -> Result<Vec<f64>> {
    let input = domain.normalize(points).to_tensor(device);
    tensor_to_vec(model.forward(input))
}

/// 解析解との最大誤差と二乗平均平方根誤差。解析解がない問題では `None` です。
pub fn solution_error(
    dimension: Dimension,
    wave_speed: f64,
    points: &PointSet,
    predictions: &[f64],
) -> Option<(f64, f64)> {
    let mut max_error: f64 = 0.0;
    let mut squared = 0.0;
    for (p, &u) in points.iter().zip(predictions) {
        let error = (u - dimension.exact_solution(p, wave_speed)?).abs();
        max_error = max_error.max(error);
        squared += error * error;
    }
    let n = predictions.len().max(1) as f64;
    Some((max_error, (squared / n).sqrt()))
}

/// `infer`サブコマンドを実行します。
pub fn run(artifacts: &Artifacts, resolution: usize, time: f64) -> Result<InferenceSummary> {
    let device = Default::default();
    let config = load_config(artifacts)?;

    tracing::info!("推論を実行します - バックエンド: NdArray (CPU)");
    let inference_start = Instant::now();

    tracing::info!("保存済みモデルを '{}' からロード中...", artifacts.model().display());
    let model = load_model::<WaveBackend>(&config, &artifacts.model(), &device)?;

    let dimension = config.dimension;
    let grid = evaluation_grid(dimension, resolution, time);
    let predictions = predict(&model, &dimension.domain(), &grid.points, &device)?;
    let inference_duration = inference_start.elapsed();

    tracing::info!(
        "推論が完了しました。入力グリッド数: {}x{}={}",
        grid.xs.len(),
        grid.ys.len(),
        grid.points.len()
    );
    tracing::info!("=> 推論時間: {:.2?}", inference_duration);

    let error = solution_error(dimension, config.wave_speed, &grid.points, &predictions);
    if let Some((max_error, rms_error)) = error {
        tracing::info!(
            "=> 解析解との誤差: 最大 {:.3e}, RMS {:.3e}",
            max_error,
            rms_error
        );
    }

    let caption = match dimension {
        Dimension::One => "u(x, t)".to_string(),
        Dimension::Two => format!("u(x, y, t={time})"),
    };
    let heatmap = Heatmap {
        caption: &caption,
        x_label: "x",
        y_label: match dimension {
            Dimension::One => "t",
            Dimension::Two => "y",
        },
        xs: &grid.xs,
        ys: &grid.ys,
        values: &predictions,
    };
    match plot_heatmap(&heatmap, &artifacts.solution()) {
        Ok(()) => tracing::info!(
            "=> 予測結果を '{}' に保存しました。",
            artifacts.solution().display()
        ),
        Err(e) => tracing::warn!("{}", e),
    }

    Ok(InferenceSummary {
        points: grid.points.len(),
        max_error: error.map(|(max, _)| max),
        rms_error: error.map(|(_, rms)| rms),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_grid_spans_space_and_time() {
        let grid = evaluation_grid(Dimension::One, 5, 0.0);
        assert_eq!(grid.points.len(), 25);
        assert_eq!(grid.points.point(0), &[0.0, 0.0]);
        assert_eq!(grid.points.point(4), &[1.0, 0.0]);
        assert_eq!(grid.points.point(24), &[1.0, 1.0]);
    }

    #[test]
    fn membrane_grid_is_a_time_slice() {
        let grid = evaluation_grid(Dimension::Two, 3, 0.25);
        assert_eq!(grid.points.dim(), 3);
        assert!(grid.points.iter().all(|p| p[2] == 0.25));
    }

    #[test]
    fn exact_predictions_have_zero_error() {
        let grid = evaluation_grid(Dimension::Two, 6, 0.4);
        let exact: Vec<f64> = grid
            .points
            .iter()
            .map(|p| Dimension::Two.exact_solution(p, 1.0).unwrap())
            .collect();
        let (max, rms) = solution_error(Dimension::Two, 1.0, &grid.points, &exact).unwrap();
        assert_eq!(max, 0.0);
        assert_eq!(rms, 0.0);

        assert!(solution_error(Dimension::One, 1.0, &grid.points, &exact).is_none());
    }
}
