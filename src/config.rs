use crate::error::{self, WaveError};
use crate::model::ModelConfig;
use crate::scenario::Dimension;
use burn::config::Config;
use std::path::Path;

/// 学習全体の設定。`config.json` として成果物ディレクトリに保存されます。
#[derive(Config, Debug)]
pub struct TrainingConfig {
    pub dimension: Dimension,
    pub model: ModelConfig,
    /// 波の伝播速度 c
    #[config(default = 1.0)]
    pub wave_speed: f64,
    #[config(default = 50)]
    pub n_initial: usize,
    /// 境界面1つあたりの点数
    #[config(default = 50)]
    pub n_boundary: usize,
    #[config(default = 10000)]
    pub n_collocation: usize,
    #[config(default = 1.0)]
    pub weight_initial: f64,
    #[config(default = 1.0)]
    pub weight_boundary: f64,
    #[config(default = 1.0)]
    pub weight_pde: f64,
    /// L-BFGSが保持する履歴の長さ
    #[config(default = 50)]
    pub history_size: usize,
    #[config(default = 50000)]
    pub max_iters: u64,
    /// 損失評価回数の上限（直線探索内の評価を含む）
    #[config(default = 50000)]
    pub max_evals: usize,
    #[config(default = 1e-5)]
    pub tolerance_grad: f64,
    #[config(default = "f64::EPSILON")]
    pub tolerance_change: f64,
    /// 何回の損失評価ごとにチェックポイントを書き出すか
    #[config(default = 500)]
    pub checkpoint_every: usize,
    #[config(default = 50)]
    pub log_every: usize,
    #[config(default = 42)]
    pub seed: u64,
}

impl TrainingConfig {
    /// 問題の既定値で設定を作ります。
    pub fn for_dimension(dimension: Dimension) -> Self {
        Self::new(dimension, dimension.default_model())
    }

    /// モデルの入力次元が問題の座標次元と合っているか確認します。
    pub fn validate(&self) -> error::Result<()> {
        let expected = self.dimension.input_dims();
        if self.model.d_input != expected {
            return Err(WaveError::InputDims {
                expected,
                actual: self.model.d_input,
            });
        }
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> error::Result<Self> {
        let path = path.as_ref();
        let config = Self::load(path).map_err(|e| WaveError::Config {
            path: path.to_path_buf(),
            reason: format!("{e:?}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> error::Result<()> {
        self.save(path)?;
        Ok(())
    }
}
