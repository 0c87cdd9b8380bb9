//! The training loop: forward, cross-entropy loss, backward, SGD step, with
//! running average loss/accuracy per epoch and a validation pass between
//! epochs. All the algorithmic substance (differentiation, the update rule)
//! is burn's; this module only drives it.

use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::data::dataset::Dataset;
use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{GradientsParams, Optimizer, SgdConfig};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::train::ClassificationOutput;

use crate::data::{FlatImageBatch, FlatImageBatcher, FlatImageItem};
use crate::model::{Mlp, MlpConfig};

type Dataloader<B> = std::sync::Arc<dyn DataLoader<B, FlatImageBatch<B>> + 'static>;

#[derive(Config)]
pub struct TrainingConfig {
    pub model: MlpConfig,
    pub optimizer: SgdConfig,
    #[config(default = 4)]
    pub num_epochs: usize,
    #[config(default = 64)]
    pub batch_size: usize,
    #[config(default = 1)]
    pub num_workers: usize,
    #[config(default = 1e-3)]
    pub lr: f64,
    #[config(default = 42)]
    pub seed: u64,
}

/// Per-epoch averages observed while training.
#[derive(Debug, Clone, Default)]
pub struct TrainingSummary {
    pub train_loss: Vec<f64>,
    pub train_accuracy: Vec<f64>,
    pub valid_loss: Vec<f64>,
    pub valid_accuracy: Vec<f64>,
}

impl<B: Backend> Mlp<B> {
    /// # Shapes
    ///   - features [batch, input_size]
    ///   - targets [batch]
    pub fn forward_classification(
        &self,
        features: Tensor<B, 2>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let [batch, _features] = features.dims();
        debug_assert_eq!([batch], targets.dims());

        let logits = self.forward(features);
        let loss = CrossEntropyLossConfig::new()
            .init(&logits.device())
            .forward(logits.clone(), targets.clone());

        ClassificationOutput::new(loss, logits, targets)
    }
}

/// Running average over a stream of per-batch values, weighted by batch size.
#[derive(Debug, Default)]
struct RunningAverage {
    sum: f64,
    items: usize,
}

impl RunningAverage {
    fn update(&mut self, value: f64, batch_size: usize) {
        self.sum += value * batch_size as f64;
        self.items += batch_size;
    }

    fn value(&self) -> f64 {
        self.sum / self.items as f64
    }
}

fn batch_accuracy<B: Backend>(output: &ClassificationOutput<B>) -> f64 {
    let [batch, _classes] = output.output.dims();
    let predicted = output.output.clone().argmax(1).squeeze::<1>(1);
    let correct: i64 = predicted
        .equal(output.targets.clone())
        .int()
        .sum()
        .into_scalar()
        .elem();
    correct as f64 / batch as f64
}

/// Train a fresh model on `dataset_train`, validating on `dataset_valid`
/// after every epoch.
pub fn train<B: AutodiffBackend>(
    config: &TrainingConfig,
    dataset_train: impl Dataset<FlatImageItem> + 'static,
    dataset_valid: impl Dataset<FlatImageItem> + 'static,
    device: &B::Device,
) -> (Mlp<B>, TrainingSummary) {
    B::seed(config.seed);

    let mut model: Mlp<B> = config.model.init(device);
    let mut optim = config.optimizer.init();

    let batcher = FlatImageBatcher::default();
    let dataloader_train = DataLoaderBuilder::new(batcher.clone())
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .build(dataset_train);
    let dataloader_valid = DataLoaderBuilder::new(batcher)
        .batch_size(config.batch_size)
        .num_workers(config.num_workers)
        .build(dataset_valid);

    let batches_total = dataloader_train.num_items().div_ceil(config.batch_size);
    let mut summary = TrainingSummary::default();

    for epoch in 1..=config.num_epochs {
        let mut loss_avg = RunningAverage::default();
        let mut accuracy_avg = RunningAverage::default();

        for (iteration, batch) in dataloader_train.iter().enumerate() {
            let [batch_size, _features] = batch.features.dims();
            let output = model.forward_classification(batch.features, batch.targets);

            loss_avg.update(output.loss.clone().into_scalar().elem::<f64>(), batch_size);
            accuracy_avg.update(batch_accuracy(&output), batch_size);

            let grads = GradientsParams::from_grads(output.loss.backward(), &model);
            model = optim.step(config.lr, model, grads);

            log::debug!(
                "epoch {epoch}/{}, batch {}/{batches_total}, loss {:.4}, accuracy {:.1}%",
                config.num_epochs,
                iteration + 1,
                loss_avg.value(),
                100.0 * accuracy_avg.value(),
            );
        }

        let valid = evaluate(&model.valid(), &dataloader_valid);
        log::info!(
            "epoch {epoch}/{}, avg loss {:.4}, avg accuracy {:.1}%, valid loss {:.4}, valid accuracy {:.1}%",
            config.num_epochs,
            loss_avg.value(),
            100.0 * accuracy_avg.value(),
            valid.loss,
            100.0 * valid.accuracy,
        );

        summary.train_loss.push(loss_avg.value());
        summary.train_accuracy.push(accuracy_avg.value());
        summary.valid_loss.push(valid.loss);
        summary.valid_accuracy.push(valid.accuracy);
    }

    (model, summary)
}

#[derive(Debug, Clone, Copy)]
pub struct Evaluation {
    pub loss: f64,
    pub accuracy: f64,
}

/// Average loss and accuracy of `model` over a full pass of the dataloader.
pub fn evaluate<B: Backend>(model: &Mlp<B>, dataloader: &Dataloader<B>) -> Evaluation {
    let mut loss_avg = RunningAverage::default();
    let mut accuracy_avg = RunningAverage::default();

    for batch in dataloader.iter() {
        let [batch_size, _features] = batch.features.dims();
        let output = model.forward_classification(batch.features, batch.targets);
        loss_avg.update(output.loss.clone().into_scalar().elem::<f64>(), batch_size);
        accuracy_avg.update(batch_accuracy(&output), batch_size);
    }

    Evaluation {
        loss: loss_avg.value(),
        accuracy: accuracy_avg.value(),
    }
}

/// Convenience wrapper building the dataloader for a one-off evaluation, e.g.
/// of a freshly restored checkpoint.
pub fn evaluate_dataset<B: Backend>(
    model: &Mlp<B>,
    dataset: impl Dataset<FlatImageItem> + 'static,
    batch_size: usize,
) -> Evaluation {
    let dataloader = DataLoaderBuilder::new(FlatImageBatcher::default())
        .batch_size(batch_size)
        .build(dataset);
    evaluate(model, &dataloader)
}
