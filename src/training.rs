use crate::checkpoint::{Artifacts, save_model};
use crate::config::TrainingConfig;
use crate::error::{Result, WaveError};
use crate::model::Model;
use crate::objective::{CheckpointPolicy, LossRecord, PinnObjective};
use crate::pinn::{LossWeights, TrainingData};
use crate::plot::plot_loss_history;
use crate::scenario::sample;
use argmin::core::observers::{Observe, ObserverMode};
use argmin::core::{Executor, KV, State};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use burn::backend::{Autodiff, NdArray};
use burn::tensor::backend::AutodiffBackend;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::cell::Cell;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;
use std::time::Instant;

type WaveBackend = Autodiff<NdArray<f64>>;

/// 強いWolfe条件の定数
const WOLFE_C1: f64 = 1e-4;
const WOLFE_C2: f64 = 0.9;

/// 学習結果の要約。
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub best_loss: f64,
    pub iterations: u64,
    pub evaluations: usize,
    pub termination: String,
}

fn optimizer_error(e: argmin::core::Error) -> WaveError {
    WaveError::Optimizer(e.to_string())
}

/// 完了した反復の回数を数えるオブザーバ。
///
/// 最適化がエラーで止まった場合は最終状態が返らないため、こちらの値を使います。
#[derive(Debug, Clone, Default)]
struct IterationCounter(Rc<Cell<u64>>);

impl IterationCounter {
    fn get(&self) -> u64 {
        self.0.get()
    }
}

impl<I> Observe<I> for IterationCounter {
    fn observe_iter(&mut self, _state: &I, _kv: &KV) -> std::result::Result<(), argmin::core::Error> {
        self.0.set(self.0.get() + 1);
        Ok(())
    }
}

/// `train`サブコマンドを実行します。
pub fn run(config: &TrainingConfig, artifacts: &Artifacts) -> Result<TrainingOutcome> {
    train::<WaveBackend>(config, artifacts, &Default::default())
}

/// モデルの学習、損失グラフの描画、学習済みモデルのファイル保存を行います。
pub fn train<B: AutodiffBackend>(
    config: &TrainingConfig,
    artifacts: &Artifacts,
    device: &B::Device,
) -> Result<TrainingOutcome> {
    config.validate()?;
    artifacts.create_dir()?;
    config.save_json(artifacts.config())?;
    B::seed(config.seed);
    let mut rng = StdRng::seed_from_u64(config.seed);

    // --- データセットの準備 ---
    let dimension = config.dimension;
    let domain = dimension.domain();
    let samples = sample(
        dimension,
        config.n_initial,
        config.n_boundary,
        config.n_collocation,
        &mut rng,
    );
    tracing::info!(
        "サンプル点: 初期条件 {}, 境界条件 {}, コロケーション {}",
        samples.initial.len(),
        samples.boundary.len(),
        samples.collocation.len()
    );
    let data = TrainingData::<B>::new(&samples, &domain, device);

    // --- モデルとオプティマイザの初期化 ---
    let init_params = config.model.init::<B>(device).to_flat()?;
    tracing::info!(
        "モデル: 入力 {}, 隠れ層 {}x{}, パラメータ数 {}",
        config.model.d_input,
        config.model.n_hidden_layers,
        config.model.d_hidden,
        init_params.len()
    );
    let objective = PinnObjective::new(
        config.model.clone(),
        data,
        config.wave_speed,
        LossWeights::from(config),
        device.clone(),
    )
    .with_log_every(config.log_every)
    .with_max_evals(config.max_evals)
    .with_gradient_tolerance(config.tolerance_grad)
    .with_checkpoint(CheckpointPolicy {
        path: artifacts.model(),
        every: config.checkpoint_every,
    });
    let log = objective.log();

    let linesearch = MoreThuenteLineSearch::new()
        .with_c(WOLFE_C1, WOLFE_C2)
        .map_err(optimizer_error)?;
    let solver = LBFGS::new(linesearch, config.history_size)
        .with_tolerance_grad(config.tolerance_grad)
        .map_err(optimizer_error)?
        .with_tolerance_cost(config.tolerance_change)
        .map_err(optimizer_error)?;

    tracing::info!("学習を開始します (波動方程式, {:?}) - バックエンド: NdArray (CPU)", dimension);
    let training_start = Instant::now();

    // --- 学習ループ ---
    let iterations = IterationCounter::default();
    let result = Executor::new(objective, solver)
        .configure(|state| state.param(init_params).max_iters(config.max_iters))
        .add_observer(iterations.clone(), ObserverMode::Always)
        .run();

    let (best_params, mut outcome) = match result {
        Ok(res) => {
            let state = res.state();
            let best = state.best_param.clone();
            let outcome = TrainingOutcome {
                best_loss: state.get_best_cost(),
                iterations: state.get_iter(),
                evaluations: 0,
                termination: format!("{:?}", state.get_termination_status()),
            };
            (best, outcome)
        }
        Err(e) => {
            // 停止条件や直線探索の失敗で止まった場合も、それまでの最良点を結果とします
            let stopped = e
                .downcast_ref::<WaveError>()
                .is_some_and(WaveError::is_stop_condition);
            if stopped {
                tracing::info!("停止条件に達しました: {}", e);
            } else {
                tracing::warn!("最適化が途中で停止しました: {}", e);
            }
            let best = log.borrow().best.clone();
            match best {
                Some((cost, params)) => (
                    Some(params),
                    TrainingOutcome {
                        best_loss: cost,
                        iterations: iterations.get(),
                        evaluations: 0,
                        termination: e.to_string(),
                    },
                ),
                None => return Err(optimizer_error(e)),
            }
        }
    };
    let training_duration = training_start.elapsed();

    let log = log.borrow();
    outcome.evaluations = log.history.len();
    tracing::info!("学習が完了しました。({})", outcome.termination);
    tracing::info!(
        "=> 最良の損失: {:.5e}, 反復回数: {}, 評価回数: {}",
        outcome.best_loss,
        outcome.iterations,
        outcome.evaluations
    );
    tracing::info!("=> 学習時間: {:.2?}", training_duration);

    // --- 結果の保存と描画 ---
    let best_params = best_params.ok_or_else(|| WaveError::Optimizer("最良のパラメータがありません".into()))?;
    let model = Model::<B>::from_flat(&config.model, &best_params, device)?;
    tracing::info!("学習済みモデルを保存中...");
    save_model(model, &artifacts.model())?;
    tracing::info!("=> モデルを '{}' に保存しました。", artifacts.model().display());

    write_history(&log.history, &artifacts.history())?;
    tracing::info!("=> 損失の履歴を '{}' に保存しました。", artifacts.history().display());

    match plot_loss_history(&log.history, &artifacts.loss_graph()) {
        Ok(()) => tracing::info!(
            "=> 損失グラフを '{}' に保存しました。",
            artifacts.loss_graph().display()
        ),
        Err(e) => tracing::warn!("{}", e),
    }

    Ok(outcome)
}

/// 損失の履歴をカンマ区切りのテキストで書き出します。
fn write_history(records: &[LossRecord], path: &Path) -> Result<()> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    writeln!(file, "evaluation,total,initial,boundary,pde")?;
    for r in records {
        writeln!(
            file,
            "{},{:e},{:e},{:e},{:e}",
            r.evaluation, r.total, r.initial, r.boundary, r.pde
        )?;
    }
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iteration_counter_is_shared_between_clones() {
        let counter = IterationCounter::default();
        let mut observer = counter.clone();
        for _ in 0..3 {
            <IterationCounter as Observe<()>>::observe_iter(&mut observer, &(), &KV::new()).unwrap();
        }
        assert_eq!(counter.get(), 3);
    }

    #[test]
    fn history_file_has_one_row_per_evaluation() {
        let dir = std::env::temp_dir().join(format!("wave-pinn-history-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("history.csv");
        let records = [
            LossRecord {
                evaluation: 1,
                total: 3.0,
                initial: 1.0,
                boundary: 1.0,
                pde: 1.0,
            },
            LossRecord {
                evaluation: 2,
                total: 1.5,
                initial: 0.5,
                boundary: 0.5,
                pde: 0.5,
            },
        ];
        write_history(&records, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "evaluation,total,initial,boundary,pde");
        assert!(lines[2].starts_with("2,1.5e0,"));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
