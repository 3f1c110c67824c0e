//! # 波動方程式 PINN
//!
//! `clap` クレートを利用して、コマンドラインから`train`（学習）と`infer`（推論）の
//! 機能を個別に実行できます。
//!
//! ## 使い方
//!
//! ### 学習
//! ```bash
//! cargo run --release -- train --dimension one
//! ```
//!
//! ### 推論
//! ```bash
//! cargo run --release -- infer
//! ```
//!
//! ログの詳細度は `RUST_LOG` で変更できます（例: `RUST_LOG=wave_pinn=debug`）。

use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use wave_pinn::checkpoint::Artifacts;
use wave_pinn::cli::{Cli, Commands};
use wave_pinn::{inference, training};

/// プログラムのエントリーポイント。
///
/// コマンドライン引数を解析し、`train`または`infer`の処理に振り分けます。
fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Train(args) => args
            .resolve_config()
            .and_then(|config| training::run(&config, &Artifacts::new(&args.artifact_dir)))
            .map(|_| ()),
        Commands::Infer(args) => {
            inference::run(&Artifacts::new(&args.artifact_dir), args.resolution, args.time)
                .map(|_| ())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
