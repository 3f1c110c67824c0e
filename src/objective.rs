//! L-BFGSから見た目的関数。
//!
//! パラメータは平坦化した `Vec<f64>` として受け渡し、評価のたびに
//! モデルを組み立て直して損失と勾配を計算します。

use crate::checkpoint::save_model;
use crate::error::WaveError;
use crate::model::{Model, ModelConfig};
use crate::pinn::{LossWeights, TrainingData, loss_terms};
use argmin::core::{CostFunction, Error, Gradient};
use burn::prelude::Backend;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, Tensor};
use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;

/// 1回の損失評価の記録。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossRecord {
    pub evaluation: usize,
    pub total: f64,
    pub initial: f64,
    pub boundary: f64,
    pub pde: f64,
}

#[derive(Debug, Clone)]
struct Evaluation {
    params: Vec<f64>,
    cost: f64,
    gradient: Vec<f64>,
}

/// 評価の履歴と、これまでで最小の損失を与えたパラメータ。
#[derive(Debug, Default)]
pub struct TrainingLog {
    pub history: Vec<LossRecord>,
    pub best: Option<(f64, Vec<f64>)>,
}

impl TrainingLog {
    fn record(&mut self, record: LossRecord, params: &[f64]) {
        let improved = self
            .best
            .as_ref()
            .is_none_or(|(best, _)| record.total < *best);
        if improved {
            self.best = Some((record.total, params.to_vec()));
        }
        self.history.push(record);
    }
}

/// 定期的なチェックポイントの書き出し先。
#[derive(Debug, Clone)]
pub struct CheckpointPolicy {
    pub path: PathBuf,
    pub every: usize,
}

/// PINNの損失を `argmin` の目的関数として公開します。
pub struct PinnObjective<B: AutodiffBackend> {
    model_config: ModelConfig,
    data: TrainingData<B>,
    wave_speed: f64,
    weights: LossWeights,
    device: B::Device,
    log_every: usize,
    checkpoint: Option<CheckpointPolicy>,
    max_evals: Option<usize>,
    tolerance_grad: Option<f64>,
    evaluations: Cell<usize>,
    last: RefCell<Option<Evaluation>>,
    log: Rc<RefCell<TrainingLog>>,
}

impl<B: AutodiffBackend> PinnObjective<B> {
    pub fn new(
        model_config: ModelConfig,
        data: TrainingData<B>,
        wave_speed: f64,
        weights: LossWeights,
        device: B::Device,
    ) -> Self {
        Self {
            model_config,
            data,
            wave_speed,
            weights,
            device,
            log_every: 0,
            checkpoint: None,
            max_evals: None,
            tolerance_grad: None,
            evaluations: Cell::new(0),
            last: RefCell::new(None),
            log: Rc::new(RefCell::new(TrainingLog::default())),
        }
    }

    /// `every` 回の評価ごとに損失をログに出します（0で無効）。
    pub fn with_log_every(mut self, every: usize) -> Self {
        self.log_every = every;
        self
    }

    pub fn with_checkpoint(mut self, policy: CheckpointPolicy) -> Self {
        self.checkpoint = Some(policy);
        self
    }

    /// 損失評価の回数を `limit` 回までに制限します。
    pub fn with_max_evals(mut self, limit: usize) -> Self {
        self.max_evals = Some(limit);
        self
    }

    /// 勾配の最大成分がこの値以下になった評価で最適化を打ち切ります。
    pub fn with_gradient_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance_grad = Some(tolerance);
        self
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations.get()
    }

    /// 評価の記録への共有ハンドル。最適化器に所有権を渡した後も参照できます。
    pub fn log(&self) -> Rc<RefCell<TrainingLog>> {
        Rc::clone(&self.log)
    }

    /// 損失と勾配を計算します。直前と同じ点ならキャッシュを返します。
    ///
    /// 評価回数の上限に達した場合と、勾配の最大成分が許容値以下になった場合は
    /// 停止条件のエラーを返します。後者の評価は記録に残ります。
    pub fn evaluate(&self, params: &[f64]) -> Result<(f64, Vec<f64>), WaveError> {
        if let Some(last) = self.last.borrow().as_ref() {
            if last.params == params {
                return Ok((last.cost, last.gradient.clone()));
            }
        }
        if let Some(limit) = self.max_evals {
            if self.evaluations.get() >= limit {
                return Err(WaveError::EvaluationLimit { limit });
            }
        }

        let model = Model::<B>::from_flat(&self.model_config, params, &self.device)?;
        let terms = loss_terms(&model, &self.data, self.wave_speed, self.weights);
        let evaluation = self.evaluations.get() + 1;
        self.evaluations.set(evaluation);

        let record = LossRecord {
            evaluation,
            total: scalar(&terms.total),
            initial: scalar(&terms.initial),
            boundary: scalar(&terms.boundary),
            pde: scalar(&terms.pde),
        };
        if !record.total.is_finite() {
            return Err(WaveError::NonFiniteLoss {
                evaluation,
                value: record.total,
            });
        }

        let grads = terms.total.backward();
        let gradient = model.flat_gradient(&grads)?;

        tracing::debug!(
            evaluation,
            total = record.total,
            initial = record.initial,
            boundary = record.boundary,
            pde = record.pde,
            "損失を評価しました"
        );
        if self.log_every > 0 && evaluation % self.log_every == 0 {
            tracing::info!(
                "[評価 {}] Loss: {:.5e}, ic: {:.3e}, bc: {:.3e}, f: {:.3e}",
                evaluation,
                record.total,
                record.initial,
                record.boundary,
                record.pde
            );
        }
        if let Some(policy) = &self.checkpoint {
            if policy.every > 0 && evaluation % policy.every == 0 {
                save_model(model, &policy.path)?;
                tracing::info!("=> チェックポイントを '{}' に保存しました。", policy.path.display());
            }
        }

        self.log.borrow_mut().record(record, params);
        *self.last.borrow_mut() = Some(Evaluation {
            params: params.to_vec(),
            cost: record.total,
            gradient: gradient.clone(),
        });

        if let Some(tolerance) = self.tolerance_grad {
            let max_abs = gradient.iter().fold(0.0_f64, |m, g| m.max(g.abs()));
            if max_abs <= tolerance {
                return Err(WaveError::GradientConverged {
                    evaluation,
                    max_abs,
                });
            }
        }
        Ok((record.total, gradient))
    }
}

fn scalar<B: Backend>(tensor: &Tensor<B, 1>) -> f64 {
    tensor.clone().into_scalar().elem::<f64>()
}

impl<B: AutodiffBackend> CostFunction for PinnObjective<B> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.evaluate(param)?.0)
    }
}

impl<B: AutodiffBackend> Gradient for PinnObjective<B> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, param: &Self::Param) -> Result<Self::Gradient, Error> {
        Ok(self.evaluate(param)?.1)
    }
}
