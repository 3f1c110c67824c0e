//! 学習済みパラメータと設定の保存・読み込み。

use crate::config::TrainingConfig;
use crate::error::{Result, WaveError};
use crate::model::Model;
use burn::module::Module;
use burn::prelude::Backend;
use burn::record::{DoublePrecisionSettings, NamedMpkFileRecorder};
use std::path::{Path, PathBuf};

/// モデルを保存するファイル名
pub const MODEL_FILENAME: &str = "model.mpk";
/// 学習設定を保存するファイル名
pub const CONFIG_FILENAME: &str = "config.json";
/// 損失の履歴を保存するファイル名
pub const HISTORY_FILENAME: &str = "loss_history.csv";
/// 損失グラフの画像ファイル名
pub const LOSS_GRAPH_FILENAME: &str = "loss_graph.png";
/// 推論結果の画像ファイル名
pub const SOLUTION_FILENAME: &str = "solution.png";

/// 成果物ディレクトリ内のファイル配置。
#[derive(Debug, Clone)]
pub struct Artifacts {
    dir: PathBuf,
}

impl Artifacts {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn create_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model(&self) -> PathBuf {
        self.dir.join(MODEL_FILENAME)
    }

    pub fn config(&self) -> PathBuf {
        self.dir.join(CONFIG_FILENAME)
    }

    pub fn history(&self) -> PathBuf {
        self.dir.join(HISTORY_FILENAME)
    }

    pub fn loss_graph(&self) -> PathBuf {
        self.dir.join(LOSS_GRAPH_FILENAME)
    }

    pub fn solution(&self) -> PathBuf {
        self.dir.join(SOLUTION_FILENAME)
    }
}

fn recorder() -> NamedMpkFileRecorder<DoublePrecisionSettings> {
    NamedMpkFileRecorder::<DoublePrecisionSettings>::new()
}

/// モデルのパラメータをファイルに書き出します。
pub fn save_model<B: Backend>(model: Model<B>, path: &Path) -> Result<()> {
    model
        .save_file(path.to_path_buf(), &recorder())
        .map_err(|e| WaveError::Checkpoint {
            path: path.to_path_buf(),
            reason: format!("{e:?}"),
        })
}

/// 保存されたパラメータを読み込み、設定どおりの形状のモデルに適用します。
pub fn load_model<B: Backend>(
    config: &TrainingConfig,
    path: &Path,
    device: &B::Device,
) -> Result<Model<B>> {
    if !path.exists() {
        return Err(WaveError::MissingArtifact {
            path: path.to_path_buf(),
        });
    }
    config
        .model
        .init::<B>(device)
        .load_file(path.to_path_buf(), &recorder(), device)
        .map_err(|e| WaveError::Checkpoint {
            path: path.to_path_buf(),
            reason: format!("{e:?}"),
        })
}

/// 成果物ディレクトリから設定を読み込みます。
pub fn load_config(artifacts: &Artifacts) -> Result<TrainingConfig> {
    let path = artifacts.config();
    if !path.exists() {
        return Err(WaveError::MissingArtifact { path });
    }
    TrainingConfig::load_json(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tensor_to_vec;
    use crate::scenario::Dimension;
    use burn::backend::NdArray;
    use burn::tensor::{Tensor, TensorData};

    type TestBackend = NdArray<f64>;

    #[test]
    fn saved_weights_reload_into_a_fresh_model() {
        let device = Default::default();
        let dir = std::env::temp_dir().join(format!("wave-pinn-ckpt-{}", std::process::id()));
        let artifacts = Artifacts::new(&dir);
        artifacts.create_dir().unwrap();

        let config = TrainingConfig::for_dimension(Dimension::One);
        let model = config.model.init::<TestBackend>(&device);
        let input = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![0.25, -0.5], [1, 2]),
            &device,
        );
        let expected = tensor_to_vec(model.forward(input.clone())).unwrap();

        save_model(model, &artifacts.model()).unwrap();
        let loaded = load_model::<TestBackend>(&config, &artifacts.model(), &device).unwrap();
        let actual = tensor_to_vec(loaded.forward(input)).unwrap();
        assert_eq!(expected, actual);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_checkpoint_is_reported() {
        let config = TrainingConfig::for_dimension(Dimension::One);
        let result = load_model::<TestBackend>(
            &config,
            Path::new("/nonexistent/model.mpk"),
            &Default::default(),
        );
        assert!(matches!(result, Err(WaveError::MissingArtifact { .. })));
    }
}
