//! 学習に使う座標点の生成。
//!
//! 初期条件・境界条件の点は一様乱数で、内部のコロケーション点は
//! ラテン超方格サンプリングで生成します。

use burn::prelude::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::Rng;
use rand::seq::SliceRandom;

/// `n × dim` 個の座標を行優先で保持するホスト側のバッファ。
#[derive(Debug, Clone, PartialEq)]
pub struct PointSet {
    dim: usize,
    data: Vec<f64>,
}

impl PointSet {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
        }
    }

    pub fn with_capacity(dim: usize, n: usize) -> Self {
        Self {
            dim,
            data: Vec::with_capacity(dim * n),
        }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn push(&mut self, point: &[f64]) {
        assert_eq!(point.len(), self.dim, "point dimension mismatch");
        self.data.extend_from_slice(point);
    }

    pub fn point(&self, i: usize) -> &[f64] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f64]> {
        self.data.chunks_exact(self.dim.max(1))
    }

    /// 別の点集合を末尾に連結します。
    pub fn extend(&mut self, other: &PointSet) {
        assert_eq!(other.dim, self.dim, "point dimension mismatch");
        self.data.extend_from_slice(&other.data);
    }

    /// `[n, dim]` のテンソルに変換します。
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 2> {
        let data = TensorData::new(self.data.clone(), [self.len(), self.dim]);
        Tensor::from_data(data, device)
    }
}

/// 列ベクトル `[n, 1]` のテンソルを作成します。
pub fn column_tensor<B: Backend>(values: &[f64], device: &B::Device) -> Tensor<B, 2> {
    let data = TensorData::new(values.to_vec(), [values.len(), 1]);
    Tensor::from_data(data, device)
}

/// 各軸独立に一様分布から `n` 点を生成します。
///
/// `lower[k] == upper[k]` の軸は定数になります（境界面や初期時刻の固定に使います）。
pub fn uniform<R: Rng>(rng: &mut R, n: usize, lower: &[f64], upper: &[f64]) -> PointSet {
    assert_eq!(lower.len(), upper.len());
    let dim = lower.len();
    let mut points = PointSet::with_capacity(dim, n);
    let mut point = vec![0.0; dim];
    for _ in 0..n {
        for k in 0..dim {
            point[k] = lower[k] + (upper[k] - lower[k]) * rng.random::<f64>();
        }
        points.push(&point);
    }
    points
}

/// ラテン超方格サンプリングで `n` 点を生成します。
///
/// 各軸の区間を `n` 等分し、各小区間から1点ずつ一様に選んだ後、
/// 軸ごとに独立にシャッフルして組み合わせます。
pub fn latin_hypercube<R: Rng>(rng: &mut R, n: usize, lower: &[f64], upper: &[f64]) -> PointSet {
    assert_eq!(lower.len(), upper.len());
    let dim = lower.len();
    let columns: Vec<Vec<f64>> = (0..dim)
        .map(|k| {
            let mut column: Vec<f64> = (0..n)
                .map(|i| (i as f64 + rng.random::<f64>()) / n as f64)
                .collect();
            column.shuffle(&mut *rng);
            column
                .into_iter()
                .map(|u| lower[k] + (upper[k] - lower[k]) * u)
                .collect()
        })
        .collect();

    let mut points = PointSet::with_capacity(dim, n);
    let mut point = vec![0.0; dim];
    for i in 0..n {
        for k in 0..dim {
            point[k] = columns[k][i];
        }
        points.push(&point);
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn latin_hypercube_fills_every_stratum_once() {
        let mut rng = StdRng::seed_from_u64(7);
        let n = 64;
        let lower = [0.0, -1.0];
        let upper = [1.0, 3.0];
        let points = latin_hypercube(&mut rng, n, &lower, &upper);
        assert_eq!(points.len(), n);

        for k in 0..2 {
            let mut counts = vec![0; n];
            for p in points.iter() {
                let u = (p[k] - lower[k]) / (upper[k] - lower[k]);
                assert!((0.0..1.0).contains(&u));
                counts[(u * n as f64) as usize] += 1;
            }
            assert!(counts.iter().all(|&c| c == 1), "axis {k}: {counts:?}");
        }
    }

    #[test]
    fn uniform_respects_bounds_and_fixed_axes() {
        let mut rng = StdRng::seed_from_u64(1);
        let points = uniform(&mut rng, 200, &[0.0, 0.5], &[2.0, 0.5]);
        for p in points.iter() {
            assert!(p[0] >= 0.0 && p[0] < 2.0);
            assert_eq!(p[1], 0.5);
        }
    }

    #[test]
    fn sampling_is_reproducible_for_a_seed() {
        let a = latin_hypercube(&mut StdRng::seed_from_u64(3), 10, &[0.0], &[1.0]);
        let b = latin_hypercube(&mut StdRng::seed_from_u64(3), 10, &[0.0], &[1.0]);
        assert_eq!(a, b);
    }

    #[test]
    fn point_set_converts_to_row_major_tensor() {
        let mut points = PointSet::new(2);
        points.push(&[1.0, 2.0]);
        points.push(&[3.0, 4.0]);
        let tensor = points.to_tensor::<NdArray<f64>>(&Default::default());
        assert_eq!(tensor.dims(), [2, 2]);
        let values = tensor.into_data().to_vec::<f64>().unwrap();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0]);
    }
}
