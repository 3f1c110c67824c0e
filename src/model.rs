use crate::error::{self, WaveError};
use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::{Linear, LinearConfig, Tanh};
use burn::prelude::Backend;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{Tensor, TensorData};

/// ネットワークの形状を表す設定。
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 入力座標の次元（空間次元 + 時間）
    pub d_input: usize,
    #[config(default = 20)]
    pub d_hidden: usize,
    #[config(default = 5)]
    pub n_hidden_layers: usize,
}

impl ModelConfig {
    /// 新しいモデルを初期化します。
    pub fn init<B: Backend>(&self, device: &B::Device) -> Model<B> {
        let mut linears = Vec::with_capacity(self.n_hidden_layers + 1);
        let mut d_in = self.d_input;
        for _ in 0..self.n_hidden_layers {
            linears.push(LinearConfig::new(d_in, self.d_hidden).init(device));
            d_in = self.d_hidden;
        }
        linears.push(LinearConfig::new(d_in, 1).init(device));
        Model {
            linears,
            activation: Tanh::new(),
        }
    }

    /// 各層の `(入力次元, 出力次元)` を返します。
    pub fn layer_shapes(&self) -> Vec<(usize, usize)> {
        let mut shapes = Vec::with_capacity(self.n_hidden_layers + 1);
        let mut d_in = self.d_input;
        for _ in 0..self.n_hidden_layers {
            shapes.push((d_in, self.d_hidden));
            d_in = self.d_hidden;
        }
        shapes.push((d_in, 1));
        shapes
    }

    /// 学習対象パラメータの総数。
    pub fn num_params(&self) -> usize {
        self.layer_shapes()
            .iter()
            .map(|(d_in, d_out)| d_in * d_out + d_out)
            .sum()
    }
}

/// PINNの本体となるニューラルネットワークモデル。
///
/// 正規化済みの座標を入力とし、その点における変位uを予測する多層パーセプトロン（MLP）です。
#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    linears: Vec<Linear<B>>,
    activation: Tanh,
}

/// 出力値と、入力の各軸に沿った1階・2階微分。
///
/// `d1[k]` と `d2[k]` はそれぞれ ∂u/∂x_k, ∂²u/∂x_k² で、形状は出力と同じ `[n, 1]` です。
#[derive(Debug, Clone)]
pub struct Jet<B: Backend> {
    pub value: Tensor<B, 2>,
    pub d1: Vec<Tensor<B, 2>>,
    pub d2: Vec<Tensor<B, 2>>,
}

impl<B: Backend> Model<B> {
    /// モデルの順伝播を実行します。
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let (output, hidden) = self.linears.split_last().expect("model has an output layer");
        let mut x = input;
        for linear in hidden {
            x = linear.forward(x);
            x = self.activation.forward(x);
        }
        output.forward(x)
    }

    /// 出力と各入力軸方向の1階・2階微分を同時に計算します。
    ///
    /// `seeds[k]` は元の座標 x_k に対する入力 k 列目の傾きで、正規化に使った係数を渡します。
    /// 微分はテンソル演算で組み立てるので、自動微分バックエンドではこれらの
    /// 関数をさらにパラメータで微分できます。
    pub fn forward_jet(&self, input: Tensor<B, 2>, seeds: &[f64]) -> Jet<B> {
        let [n, dim] = input.dims();
        assert_eq!(seeds.len(), dim, "one seed per input axis");
        let device = input.device();

        let mut value = input;
        let mut d1: Vec<Tensor<B, 2>> = seeds
            .iter()
            .enumerate()
            .map(|(k, &seed)| {
                let mut tangent = vec![0.0; n * dim];
                for row in 0..n {
                    tangent[row * dim + k] = seed;
                }
                Tensor::from_data(TensorData::new(tangent, [n, dim]), &device)
            })
            .collect();
        let mut d2: Vec<Tensor<B, 2>> = (0..dim)
            .map(|_| Tensor::zeros([n, dim], &device))
            .collect();

        let last = self.linears.len() - 1;
        for (i, linear) in self.linears.iter().enumerate() {
            let weight = linear.weight.val();
            value = linear.forward(value);
            d1 = d1.into_iter().map(|d| d.matmul(weight.clone())).collect();
            d2 = d2.into_iter().map(|d| d.matmul(weight.clone())).collect();
            if i == last {
                break;
            }

            // tanh' = 1 - a², tanh'' = -2a(1 - a²)
            let a = self.activation.forward(value);
            let slope = a.clone().powf_scalar(2.0).neg().add_scalar(1.0);
            let curvature = a.clone().mul(slope.clone()).mul_scalar(-2.0);
            d2 = d1
                .iter()
                .zip(d2)
                .map(|(first, second)| {
                    second.mul(slope.clone()) + first.clone().powf_scalar(2.0).mul(curvature.clone())
                })
                .collect();
            d1 = d1.into_iter().map(|d| d.mul(slope.clone())).collect();
            value = a;
        }

        Jet { value, d1, d2 }
    }

    /// パラメータを `(層ごとに 重み(行優先), バイアス)` の順に平坦化します。
    pub fn to_flat(&self) -> error::Result<Vec<f64>> {
        let mut params = Vec::new();
        for linear in &self.linears {
            params.extend(tensor_to_vec(linear.weight.val())?);
            if let Some(bias) = &linear.bias {
                params.extend(tensor_to_vec(bias.val())?);
            }
        }
        Ok(params)
    }

    /// 平坦化されたパラメータからモデルを組み立てます。
    pub fn from_flat(config: &ModelConfig, params: &[f64], device: &B::Device) -> error::Result<Self> {
        let expected = config.num_params();
        if params.len() != expected {
            return Err(WaveError::ParamLength {
                expected,
                actual: params.len(),
            });
        }

        let mut offset = 0;
        let mut linears = Vec::new();
        for (d_in, d_out) in config.layer_shapes() {
            let weight = &params[offset..offset + d_in * d_out];
            offset += d_in * d_out;
            let bias = &params[offset..offset + d_out];
            offset += d_out;
            linears.push(Linear {
                weight: Param::from_tensor(Tensor::from_data(
                    TensorData::new(weight.to_vec(), [d_in, d_out]),
                    device,
                ).require_grad()),
                bias: Some(Param::from_tensor(Tensor::from_data(
                    TensorData::new(bias.to_vec(), [d_out]),
                    device,
                ).require_grad())),
            });
        }

        Ok(Self {
            linears,
            activation: Tanh::new(),
        })
    }
}

impl<B: AutodiffBackend> Model<B> {
    /// 逆伝播の結果から、`to_flat` と同じ順序の勾配ベクトルを取り出します。
    ///
    /// 損失に寄与しなかったパラメータの勾配は0になります。
    pub fn flat_gradient(&self, grads: &B::Gradients) -> error::Result<Vec<f64>> {
        let mut gradient = Vec::new();
        for linear in &self.linears {
            append_grad(&mut gradient, linear.weight.val(), grads)?;
            if let Some(bias) = &linear.bias {
                append_grad(&mut gradient, bias.val(), grads)?;
            }
        }
        Ok(gradient)
    }
}

fn append_grad<B: AutodiffBackend, const D: usize>(
    out: &mut Vec<f64>,
    param: Tensor<B, D>,
    grads: &B::Gradients,
) -> error::Result<()> {
    match param.grad(grads) {
        Some(grad) => out.extend(tensor_to_vec(grad)?),
        None => out.extend(std::iter::repeat_n(0.0, param.shape().num_elements())),
    }
    Ok(())
}

/// テンソルの値を `f64` のベクトルとして取り出します。
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> error::Result<Vec<f64>> {
    tensor
        .into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .map_err(|e| WaveError::TensorData(format!("{e:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = NdArray<f64>;

    fn small_config() -> ModelConfig {
        ModelConfig::new(2).with_d_hidden(6).with_n_hidden_layers(2)
    }

    fn values(tensor: Tensor<TestBackend, 2>) -> Vec<f64> {
        tensor_to_vec(tensor).unwrap()
    }

    #[test]
    fn default_config_matches_string_network() {
        let config = ModelConfig::new(2);
        assert_eq!(config.d_hidden, 20);
        assert_eq!(config.n_hidden_layers, 5);
        assert_eq!(config.layer_shapes().len(), 6);
        assert_eq!(config.num_params(), 2 * 20 + 20 + 4 * (20 * 20 + 20) + 20 + 1);
    }

    #[test]
    fn flat_parameters_rebuild_the_same_function() {
        let device = Default::default();
        let config = small_config();
        let model = config.init::<TestBackend>(&device);
        let params = model.to_flat().unwrap();
        assert_eq!(params.len(), config.num_params());

        let rebuilt = Model::<TestBackend>::from_flat(&config, &params, &device).unwrap();
        let input = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![0.1, -0.4, 0.7, 0.2], [2, 2]),
            &device,
        );
        let a = values(model.forward(input.clone()));
        let b = values(rebuilt.forward(input));
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn from_flat_rejects_wrong_length() {
        let config = small_config();
        let result = Model::<TestBackend>::from_flat(&config, &[0.0; 3], &Default::default());
        assert!(matches!(
            result,
            Err(WaveError::ParamLength { actual: 3, .. })
        ));
    }

    #[test]
    fn jet_matches_finite_differences() {
        let device = Default::default();
        let model = small_config().init::<TestBackend>(&device);
        let point = [0.3, -0.2];
        let seeds = [1.5, 0.5];
        let h = 1e-4;

        let eval = |p: [f64; 2]| {
            let input = Tensor::<TestBackend, 2>::from_data(TensorData::new(p.to_vec(), [1, 2]), &device);
            values(model.forward(input))[0]
        };

        let input = Tensor::<TestBackend, 2>::from_data(TensorData::new(point.to_vec(), [1, 2]), &device);
        let jet = model.forward_jet(input, &seeds);
        let u = values(jet.value)[0];
        assert!((u - eval(point)).abs() < 1e-12);

        for k in 0..2 {
            let mut plus = point;
            let mut minus = point;
            plus[k] += h * seeds[k];
            minus[k] -= h * seeds[k];
            let fd1 = (eval(plus) - eval(minus)) / (2.0 * h);
            let fd2 = (eval(plus) - 2.0 * u + eval(minus)) / (h * h);
            let d1 = values(jet.d1[k].clone())[0];
            let d2 = values(jet.d2[k].clone())[0];
            assert!((d1 - fd1).abs() < 1e-6, "axis {k}: {d1} vs {fd1}");
            assert!((d2 - fd2).abs() < 1e-4, "axis {k}: {d2} vs {fd2}");
        }
    }

    #[test]
    fn flat_gradient_covers_every_parameter() {
        type AdBackend = Autodiff<NdArray<f64>>;
        let device = Default::default();
        let config = small_config();
        let model = config.init::<AdBackend>(&device);
        let input = Tensor::<AdBackend, 2>::from_data(
            TensorData::new(vec![0.1, 0.2, -0.3, 0.4], [2, 2]),
            &device,
        );
        let jet = model.forward_jet(input, &[1.0, 1.0]);
        let loss = jet.value.powf_scalar(2.0).mean() + jet.d2[0].clone().powf_scalar(2.0).mean();
        let grads = loss.backward();
        let gradient = model.flat_gradient(&grads).unwrap();
        assert_eq!(gradient.len(), config.num_params());
        assert!(gradient.iter().all(|g| g.is_finite()));
    }
}
