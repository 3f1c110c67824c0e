//! 解く波動方程式の問題設定（領域・初期条件・境界条件）。
//!
//! 入力座標は空間座標を先に、時間を最後に並べます（`[x, t]`, `[x, y, t]`）。

use crate::model::ModelConfig;
use crate::sampling::{PointSet, latin_hypercube, uniform};
use clap::ValueEnum;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// 1次元問題で左端を揺らす周波数
pub const DRIVE_FREQUENCY: f64 = 2.0;

/// 空間次元の選択。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum Dimension {
    /// 左端を正弦波で駆動する弦 (x, t)
    One,
    /// 周辺を固定した正方形膜の定在波 (x, y, t)
    Two,
}

impl Dimension {
    pub fn spatial_dims(self) -> usize {
        match self {
            Dimension::One => 1,
            Dimension::Two => 2,
        }
    }

    /// 入力座標の次元（空間次元 + 時間）。
    pub fn input_dims(self) -> usize {
        self.spatial_dims() + 1
    }

    /// 問題ごとの既定のネットワーク形状。
    pub fn default_model(self) -> ModelConfig {
        match self {
            Dimension::One => ModelConfig::new(2).with_n_hidden_layers(5),
            Dimension::Two => ModelConfig::new(3).with_n_hidden_layers(9),
        }
    }

    /// 単位時間・単位長さの計算領域。
    pub fn domain(self) -> Domain {
        let dim = self.input_dims();
        Domain::new(vec![0.0; dim], vec![1.0; dim])
    }

    /// 初期変位 u(x, 0)。
    pub fn initial_displacement(self, point: &[f64]) -> f64 {
        match self {
            Dimension::One => 0.0,
            Dimension::Two => (PI * point[0]).sin() * (PI * point[1]).sin(),
        }
    }

    /// 初期速度 u_t(x, 0)。どちらの問題も静止状態から始まります。
    pub fn initial_velocity(self, _point: &[f64]) -> f64 {
        0.0
    }

    /// 境界面 `(axis, upper)` 上の点での境界値。
    pub fn boundary_value(self, axis: usize, upper: bool, point: &[f64]) -> f64 {
        let t = point[self.spatial_dims()];
        match (self, axis, upper) {
            (Dimension::One, 0, false) => (2.0 * PI * DRIVE_FREQUENCY * t).sin(),
            _ => 0.0,
        }
    }

    /// 解析解が分かっている問題では、その値を返します。
    pub fn exact_solution(self, point: &[f64], wave_speed: f64) -> Option<f64> {
        match self {
            Dimension::One => None,
            Dimension::Two => {
                let omega = 2.0_f64.sqrt() * PI * wave_speed;
                Some(self.initial_displacement(point) * (omega * point[2]).cos())
            }
        }
    }
}

/// 座標の各軸の範囲を表す直方体領域。
#[derive(Debug, Clone, PartialEq)]
pub struct Domain {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl Domain {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Self {
        assert_eq!(lower.len(), upper.len());
        Self { lower, upper }
    }

    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    /// 領域を [-1, 1] に写す写像の各軸の傾き。順伝播の微分の種にも使います。
    pub fn seeds(&self) -> Vec<f64> {
        self.lower
            .iter()
            .zip(&self.upper)
            .map(|(lo, hi)| 2.0 / (hi - lo))
            .collect()
    }

    /// 座標を [-1, 1] に正規化します。
    pub fn normalize(&self, points: &PointSet) -> PointSet {
        let seeds = self.seeds();
        let mut normalized = PointSet::with_capacity(self.dim(), points.len());
        let mut buf = vec![0.0; self.dim()];
        for p in points.iter() {
            for k in 0..self.dim() {
                buf[k] = (p[k] - self.lower[k]) * seeds[k] - 1.0;
            }
            normalized.push(&buf);
        }
        normalized
    }
}

/// 学習に使う点と教師値の一式。
#[derive(Debug, Clone)]
pub struct SampleSet {
    pub initial: PointSet,
    pub initial_u: Vec<f64>,
    pub initial_ut: Vec<f64>,
    pub boundary: PointSet,
    pub boundary_u: Vec<f64>,
    pub collocation: PointSet,
}

/// 初期条件・境界条件・内部のコロケーション点を生成します。
///
/// 境界点は境界面ごとに `n_boundary` 点ずつ生成します。
/// コロケーション点には初期点と境界点も加えます。
pub fn sample<R: Rng>(
    dimension: Dimension,
    n_initial: usize,
    n_boundary: usize,
    n_collocation: usize,
    rng: &mut R,
) -> SampleSet {
    let domain = dimension.domain();
    let time_axis = dimension.spatial_dims();

    let mut upper = domain.upper.clone();
    upper[time_axis] = domain.lower[time_axis];
    let initial = uniform(rng, n_initial, &domain.lower, &upper);
    let initial_u = initial
        .iter()
        .map(|p| dimension.initial_displacement(p))
        .collect();
    let initial_ut = initial
        .iter()
        .map(|p| dimension.initial_velocity(p))
        .collect();

    let mut boundary = PointSet::new(domain.dim());
    let mut boundary_u = Vec::new();
    for axis in 0..time_axis {
        for at_upper in [false, true] {
            let fixed = if at_upper {
                domain.upper[axis]
            } else {
                domain.lower[axis]
            };
            let mut lower = domain.lower.clone();
            let mut upper = domain.upper.clone();
            lower[axis] = fixed;
            upper[axis] = fixed;
            let face = uniform(rng, n_boundary, &lower, &upper);
            boundary_u.extend(
                face.iter()
                    .map(|p| dimension.boundary_value(axis, at_upper, p)),
            );
            boundary.extend(&face);
        }
    }

    let mut collocation = latin_hypercube(rng, n_collocation, &domain.lower, &domain.upper);
    collocation.extend(&initial);
    collocation.extend(&boundary);

    SampleSet {
        initial,
        initial_u,
        initial_ut,
        boundary,
        boundary_u,
        collocation,
    }
}
