use std::path::PathBuf;
use thiserror::Error;

/// このクレートで発生するエラー。
#[derive(Error, Debug)]
pub enum WaveError {
    #[error("パラメータ数が一致しません: 期待値 {expected}, 実際 {actual}")]
    ParamLength { expected: usize, actual: usize },

    #[error("テンソルデータの変換に失敗しました: {0}")]
    TensorData(String),

    #[error("モデルの入力次元 {actual} が問題の座標次元 {expected} と一致しません")]
    InputDims { expected: usize, actual: usize },

    #[error("損失が有限値ではありません (評価回数 {evaluation}): {value}")]
    NonFiniteLoss { evaluation: usize, value: f64 },

    #[error("損失の評価回数が上限 {limit} に達しました")]
    EvaluationLimit { limit: usize },

    #[error("勾配の最大成分 {max_abs:.3e} が許容値以下になりました (評価回数 {evaluation})")]
    GradientConverged { evaluation: usize, max_abs: f64 },

    #[error(
        "ファイル '{}' が見つかりません。最初に 'train' コマンドでモデルを学習・保存してください。",
        .path.display()
    )]
    MissingArtifact { path: PathBuf },

    #[error("チェックポイント '{}' の読み書きに失敗しました: {reason}", .path.display())]
    Checkpoint { path: PathBuf, reason: String },

    #[error("設定ファイル '{}' の読み込みに失敗しました: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },

    #[error("最適化に失敗しました: {0}")]
    Optimizer(String),

    #[error("グラフの描画に失敗しました: {0}")]
    Plot(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl WaveError {
    /// 最適化を正常に打ち切る停止条件かどうか。
    pub fn is_stop_condition(&self) -> bool {
        matches!(
            self,
            WaveError::EvaluationLimit { .. } | WaveError::GradientConverged { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, WaveError>;
