use crate::config::TrainingConfig;
use crate::error::Result;
use crate::scenario::Dimension;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// clapでコマンドラインの構造を定義します。
#[derive(Parser, Debug)]
#[command(author, version, about = "Physics-informed neural networks for the wave equation with Burn", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 実行するサブコマンドを定義します（train または infer）。
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// PINNモデルを学習し、結果をファイルに保存します
    Train(TrainArgs),
    /// 保存されたPINNモデルを使い、推論を実行します
    Infer(InferArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// 解く問題の空間次元
    #[arg(long, value_enum, default_value_t = Dimension::One)]
    pub dimension: Dimension,
    /// 学習設定のJSONファイル（指定時は --dimension より優先）
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// モデルや損失グラフの出力先
    #[arg(long, default_value = "artifacts")]
    pub artifact_dir: PathBuf,
    #[arg(long)]
    pub max_iters: Option<u64>,
    #[arg(long)]
    pub max_evals: Option<usize>,
    #[arg(long)]
    pub n_collocation: Option<usize>,
    #[arg(long)]
    pub seed: Option<u64>,
}

impl TrainArgs {
    /// 設定ファイルまたは既定値に、コマンドライン引数の指定を上書きします。
    pub fn resolve_config(&self) -> Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::load_json(path)?,
            None => TrainingConfig::for_dimension(self.dimension),
        };
        if let Some(max_iters) = self.max_iters {
            config = config.with_max_iters(max_iters);
        }
        if let Some(max_evals) = self.max_evals {
            config = config.with_max_evals(max_evals);
        }
        if let Some(n) = self.n_collocation {
            config = config.with_n_collocation(n);
        }
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct InferArgs {
    /// 学習済みモデルのあるディレクトリ
    #[arg(long, default_value = "artifacts")]
    pub artifact_dir: PathBuf,
    /// 格子の一辺の点数
    #[arg(long, default_value_t = 100)]
    pub resolution: usize,
    /// 2次元問題で描画する時刻
    #[arg(long, default_value_t = 0.5)]
    pub time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn train_overrides_apply_on_top_of_defaults() {
        let cli = Cli::parse_from([
            "wave-pinn",
            "train",
            "--dimension",
            "two",
            "--max-iters",
            "10",
            "--max-evals",
            "40",
            "--seed",
            "3",
        ]);
        let Commands::Train(args) = cli.command else {
            panic!("expected train");
        };
        let config = args.resolve_config().unwrap();
        assert_eq!(config.dimension, Dimension::Two);
        assert_eq!(config.max_iters, 10);
        assert_eq!(config.max_evals, 40);
        assert_eq!(config.seed, 3);
        assert_eq!(config.n_collocation, 10000);
    }

    #[test]
    fn infer_defaults() {
        let cli = Cli::parse_from(["wave-pinn", "infer"]);
        let Commands::Infer(args) = cli.command else {
            panic!("expected infer");
        };
        assert_eq!(args.artifact_dir, PathBuf::from("artifacts"));
        assert_eq!(args.resolution, 100);
    }
}
