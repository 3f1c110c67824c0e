use crate::config::TrainingConfig;
use crate::model::Model;
use crate::sampling::column_tensor;
use crate::scenario::{Domain, SampleSet};
use burn::nn::loss::{MseLoss, Reduction};
use burn::prelude::Backend;
use burn::tensor::Tensor;

/// デバイス上に置いた学習データ。座標は正規化済みです。
#[derive(Debug, Clone)]
pub struct TrainingData<B: Backend> {
    pub initial: Tensor<B, 2>,
    pub initial_u: Tensor<B, 2>,
    pub initial_ut: Tensor<B, 2>,
    pub boundary: Tensor<B, 2>,
    pub boundary_u: Tensor<B, 2>,
    pub collocation: Tensor<B, 2>,
    /// 正規化座標での微分を元の座標での微分に戻す係数
    pub seeds: Vec<f64>,
}

impl<B: Backend> TrainingData<B> {
    pub fn new(samples: &SampleSet, domain: &Domain, device: &B::Device) -> Self {
        Self {
            initial: domain.normalize(&samples.initial).to_tensor(device),
            initial_u: column_tensor(&samples.initial_u, device),
            initial_ut: column_tensor(&samples.initial_ut, device),
            boundary: domain.normalize(&samples.boundary).to_tensor(device),
            boundary_u: column_tensor(&samples.boundary_u, device),
            collocation: domain.normalize(&samples.collocation).to_tensor(device),
            seeds: domain.seeds(),
        }
    }

    fn time_axis(&self) -> usize {
        self.seeds.len() - 1
    }
}

/// 損失の各項。
#[derive(Debug, Clone)]
pub struct LossTerms<B: Backend> {
    pub initial: Tensor<B, 1>,
    pub boundary: Tensor<B, 1>,
    pub pde: Tensor<B, 1>,
    pub total: Tensor<B, 1>,
}

/// 損失の重み。
#[derive(Debug, Clone, Copy)]
pub struct LossWeights {
    pub initial: f64,
    pub boundary: f64,
    pub pde: f64,
}

impl From<&TrainingConfig> for LossWeights {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            initial: config.weight_initial,
            boundary: config.weight_boundary,
            pde: config.weight_pde,
        }
    }
}

impl Default for LossWeights {
    fn default() -> Self {
        Self {
            initial: 1.0,
            boundary: 1.0,
            pde: 1.0,
        }
    }
}

/// 初期条件の損失を計算します。
///
/// 変位と速度の両方を教師値に合わせます。
pub fn initial_loss<B: Backend>(model: &Model<B>, data: &TrainingData<B>) -> Tensor<B, 1> {
    let jet = model.forward_jet(data.initial.clone(), &data.seeds);
    let u_t = jet.d1[data.time_axis()].clone();
    let mse = MseLoss::new();
    mse.forward(jet.value, data.initial_u.clone(), Reduction::Mean)
        + mse.forward(u_t, data.initial_ut.clone(), Reduction::Mean)
}

/// 境界条件の損失を計算します。
pub fn boundary_loss<B: Backend>(model: &Model<B>, data: &TrainingData<B>) -> Tensor<B, 1> {
    let u = model.forward(data.boundary.clone());
    MseLoss::new().forward(u, data.boundary_u.clone(), Reduction::Mean)
}

/// 物理損失を計算します。
///
/// 波動方程式の残差 u_tt - c²Δu の二乗平均誤差を損失として返します。
pub fn physics_loss<B: Backend>(
    model: &Model<B>,
    data: &TrainingData<B>,
    wave_speed: f64,
) -> Tensor<B, 1> {
    let jet = model.forward_jet(data.collocation.clone(), &data.seeds);
    let residual = wave_residual(&jet.d2, data.time_axis(), wave_speed);
    let zeros = Tensor::zeros_like(&residual);
    MseLoss::new().forward(residual, zeros, Reduction::Mean)
}

/// 各軸の2階微分から波動方程式の残差を組み立てます。
pub fn wave_residual<B: Backend>(
    second: &[Tensor<B, 2>],
    time_axis: usize,
    wave_speed: f64,
) -> Tensor<B, 2> {
    let laplacian = second[..time_axis]
        .iter()
        .cloned()
        .reduce(|acc, d| acc + d)
        .expect("at least one spatial axis");
    second[time_axis].clone() - laplacian.mul_scalar(wave_speed * wave_speed)
}

/// 3つの項と重み付きの合計を計算します。
pub fn loss_terms<B: Backend>(
    model: &Model<B>,
    data: &TrainingData<B>,
    wave_speed: f64,
    weights: LossWeights,
) -> LossTerms<B> {
    let initial = initial_loss(model, data);
    let boundary = boundary_loss(model, data);
    let pde = physics_loss(model, data, wave_speed);
    let total = initial.clone().mul_scalar(weights.initial)
        + boundary.clone().mul_scalar(weights.boundary)
        + pde.clone().mul_scalar(weights.pde);
    LossTerms {
        initial,
        boundary,
        pde,
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelConfig, tensor_to_vec};
    use crate::scenario::{Dimension, sample};
    use burn::backend::NdArray;
    use burn::tensor::TensorData;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    type TestBackend = NdArray<f64>;

    #[test]
    fn residual_vanishes_for_a_travelling_wave() {
        // u = sin(x - ct): u_tt = c² u_xx
        let device = Default::default();
        let c: f64 = 1.5;
        let xs = [0.1_f64, 0.4, 0.9];
        let t = 0.3;
        let u_xx: Vec<f64> = xs.iter().map(|x| -(x - c * t).sin()).collect();
        let u_tt: Vec<f64> = u_xx.iter().map(|v| c * c * v).collect();
        let second = vec![
            Tensor::<TestBackend, 2>::from_data(TensorData::new(u_xx, [3, 1]), &device),
            Tensor::<TestBackend, 2>::from_data(TensorData::new(u_tt, [3, 1]), &device),
        ];
        let residual = tensor_to_vec(wave_residual(&second, 1, c)).unwrap();
        assert!(residual.iter().all(|r| r.abs() < 1e-12));
    }

    #[test]
    fn total_is_weighted_sum_of_terms() {
        let device = Default::default();
        let mut rng = StdRng::seed_from_u64(5);
        let dimension = Dimension::One;
        let samples = sample(dimension, 8, 8, 32, &mut rng);
        let data = TrainingData::<TestBackend>::new(&samples, &dimension.domain(), &device);
        let model = ModelConfig::new(2)
            .with_d_hidden(8)
            .with_n_hidden_layers(2)
            .init::<TestBackend>(&device);

        let weights = LossWeights {
            initial: 2.0,
            boundary: 0.5,
            pde: 3.0,
        };
        let terms = loss_terms(&model, &data, 1.0, weights);
        let ic = terms.initial.into_scalar();
        let bc = terms.boundary.into_scalar();
        let pde = terms.pde.into_scalar();
        let total = terms.total.into_scalar();

        assert!(ic >= 0.0 && bc > 0.0 && pde >= 0.0);
        assert!((total - (2.0 * ic + 0.5 * bc + 3.0 * pde)).abs() < 1e-10);
    }
}
