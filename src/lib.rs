//! # 波動方程式の物理情報ニューラルネットワーク (PINN) ライブラリ
//!
//! `burn` フレームワークでネットワークを構築し、1次元・2次元の波動方程式を
//! 初期条件・境界条件・方程式の残差からなる損失で学習します。
//! 損失の最小化には `argmin` の L-BFGS を使います。

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod error;
pub mod inference;
pub mod model;
pub mod objective;
pub mod pinn;
pub mod plot;
pub mod sampling;
pub mod scenario;
pub mod training;

pub use error::{Result, WaveError};
