//! Train a feed-forward classifier, checkpoint it, and verify the checkpoint
//! restores by re-evaluating it on the validation split.
//!
//! ```sh
//! cargo run --release -- --dataset blobs --epochs 5 --hidden 128,64
//! RUST_LOG=info cargo run --release -- --dataset mnist
//! ```

use std::path::PathBuf;

use burn::module::AutodiffModule;
use burn::optim::SgdConfig;
use burn::prelude::*;
use clap::{Parser, ValueEnum};

use burn_mlp::checkpoint::{Checkpoint, CheckpointError};
use burn_mlp::data::{self, MNIST_HEIGHT, MNIST_WIDTH};
use burn_mlp::model::MlpConfig;
use burn_mlp::training::{self, TrainingConfig};

type MainBackend = burn::backend::NdArray<f32, i32>;
type MainAutoBackend = burn::backend::Autodiff<MainBackend>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DatasetKind {
    /// MNIST digits, downloaded and cached by burn.
    Mnist,
    /// Seeded synthetic Gaussian blobs, no network required.
    Blobs,
}

#[derive(Parser)]
struct Args {
    #[clap(short, long, value_enum, default_value_t = DatasetKind::Blobs)]
    dataset: DatasetKind,
    #[clap(short, long, default_value_t = 4)]
    epochs: usize,
    #[clap(short, long, default_value_t = 64)]
    batch_size: usize,
    #[clap(short, long, default_value_t = 1e-3)]
    lr: f64,
    #[clap(short, long, default_value_t = 42)]
    seed: u64,
    /// Hidden-layer widths, in order.
    #[clap(long, value_delimiter = ',', default_values_t = [128, 64])]
    hidden: Vec<usize>,
    #[clap(short, long, default_value = "artifacts")]
    artifacts_path: PathBuf,
    #[clap(long, default_value_t = 1)]
    num_workers: usize,
}

fn main() -> Result<(), CheckpointError> {
    env_logger::init();
    let args = Args::parse();
    let device = Default::default();

    let (input_size, num_classes) = match args.dataset {
        DatasetKind::Mnist => (MNIST_WIDTH * MNIST_HEIGHT, 10),
        DatasetKind::Blobs => (8, 4),
    };
    let config = TrainingConfig::new(
        MlpConfig::new(input_size, num_classes, args.hidden.clone()),
        SgdConfig::new(),
    )
    .with_num_epochs(args.epochs)
    .with_batch_size(args.batch_size)
    .with_num_workers(args.num_workers)
    .with_lr(args.lr)
    .with_seed(args.seed);

    std::fs::create_dir_all(&args.artifacts_path)?;
    let config_path = args.artifacts_path.join("config.json");
    config
        .save(&config_path)
        .expect("training config should be writable");
    log::info!("training config saved to {config_path:?}");

    let (model, _summary) = match args.dataset {
        DatasetKind::Mnist => training::train::<MainAutoBackend>(
            &config,
            data::mnist_train(),
            data::mnist_test(),
            &device,
        ),
        DatasetKind::Blobs => training::train::<MainAutoBackend>(
            &config,
            data::gaussian_blobs(num_classes, 1000, input_size, args.seed),
            data::gaussian_blobs(num_classes, 200, input_size, args.seed + 1),
            &device,
        ),
    };

    let checkpoint_path = args.artifacts_path.join("model.mpk");
    Checkpoint::from_model(&model.valid()).save(&checkpoint_path)?;
    log::info!("checkpoint saved to {checkpoint_path:?}");

    // prove the artifact is usable: restore it and evaluate the restored copy
    let restored =
        Checkpoint::load(&checkpoint_path)?.restore_into::<MainBackend>(&config.model, &device)?;
    let eval = match args.dataset {
        DatasetKind::Mnist => {
            training::evaluate_dataset(&restored, data::mnist_test(), args.batch_size)
        }
        DatasetKind::Blobs => training::evaluate_dataset(
            &restored,
            data::gaussian_blobs(num_classes, 200, input_size, args.seed + 1),
            args.batch_size,
        ),
    };
    log::info!(
        "restored checkpoint: valid loss {:.4}, valid accuracy {:.1}%",
        eval.loss,
        100.0 * eval.accuracy,
    );

    Ok(())
}
