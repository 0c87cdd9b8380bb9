//! Dataset plumbing: a flat feature-vector item type, its batcher, the MNIST
//! adapter, and a seeded synthetic dataset for offline runs and tests.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::InMemDataset;
use burn::data::dataset::transform::{Mapper, MapperDataset};
use burn::data::dataset::vision::{MnistDataset, MnistItem};
use burn::prelude::*;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};

pub const MNIST_WIDTH: usize = 28;
pub const MNIST_HEIGHT: usize = 28;

/// One classification example: a flat feature vector and its class label.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct FlatImageItem {
    /// # Shape
    /// [num_features]
    pub features: Vec<f32>,
    pub label: u8,
}

#[derive(Clone, Default)]
pub struct FlatImageBatcher {}

#[derive(Clone, Debug)]
pub struct FlatImageBatch<B: Backend> {
    /// # Shape
    /// [batch_size, num_features]
    pub features: Tensor<B, 2>,
    /// # Shape
    /// [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<B, FlatImageItem, FlatImageBatch<B>> for FlatImageBatcher {
    fn batch(&self, items: Vec<FlatImageItem>, device: &B::Device) -> FlatImageBatch<B> {
        let num_features = items[0].features.len();

        let features = items
            .iter()
            .map(|item| {
                debug_assert_eq!(num_features, item.features.len());
                TensorData::new(item.features.clone(), [1, num_features]).convert::<B::FloatElem>()
            })
            .map(|data| Tensor::<B, 2>::from_data(data, device))
            .collect();

        let targets = items
            .iter()
            .map(|item| {
                Tensor::<B, 1, Int>::from_data([(item.label as i64).elem::<B::IntElem>()], device)
            })
            .collect();

        FlatImageBatch {
            features: Tensor::cat(features, 0),
            targets: Tensor::cat(targets, 0),
        }
    }
}

pub struct FlattenMnist;

impl Mapper<MnistItem, FlatImageItem> for FlattenMnist {
    /// Flatten a 28x28 digit to `[784]` and z-score normalize it.
    ///
    /// The mean/stddev pair (0.1307, 0.3081) is from the PyTorch MNIST
    /// example, applied after scaling brightness into `[0, 1]`.
    fn map(&self, item: &MnistItem) -> FlatImageItem {
        let features = item
            .image
            .iter()
            .flatten()
            .map(|brightness| ((brightness / 255.0) - 0.1307) / 0.3081)
            .collect();

        FlatImageItem {
            features,
            label: item.label,
        }
    }
}

pub type FlatMnistDataset = MapperDataset<MnistDataset, FlattenMnist, MnistItem>;

/// The MNIST training split (60k digits), flattened and normalized.
///
/// Downloading and caching of the raw files is left entirely to
/// [`MnistDataset`].
pub fn mnist_train() -> FlatMnistDataset {
    MapperDataset::new(MnistDataset::train(), FlattenMnist)
}

/// The MNIST test split (10k digits), flattened and normalized.
pub fn mnist_test() -> FlatMnistDataset {
    MapperDataset::new(MnistDataset::test(), FlattenMnist)
}

/// A synthetic dataset of Gaussian blobs, one blob per class.
///
/// Class centers sit two units apart on every feature axis, symmetric
/// around zero, with unit stddev. That keeps the classes well separated, the
/// features roughly standardized, and a small classifier convergent in a few
/// epochs. Deterministic for a given seed.
pub fn gaussian_blobs(
    num_classes: usize,
    items_per_class: usize,
    num_features: usize,
    seed: u64,
) -> InMemDataset<FlatImageItem> {
    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let noise = Normal::new(0.0f32, 1.0).unwrap();

    let mut items = Vec::with_capacity(num_classes * items_per_class);
    for class in 0..num_classes {
        let center = 2.0 * class as f32 - (num_classes as f32 - 1.0);
        for _ in 0..items_per_class {
            let features = (0..num_features)
                .map(|_| center + noise.sample(&mut rng))
                .collect();
            items.push(FlatImageItem {
                features,
                label: class as u8,
            });
        }
    }

    // interleave the classes so every minibatch sees a mix of labels
    let mut order: Vec<usize> = (0..items.len()).collect();
    for idx in (1..order.len()).rev() {
        order.swap(idx, rng.random_range(0..=idx));
    }
    let items = order.into_iter().map(|idx| items[idx].clone()).collect();

    InMemDataset::new(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::data::dataset::Dataset;

    type TestBackend = burn::backend::NdArray;

    #[test]
    fn blobs_have_the_requested_size_and_labels() {
        let dataset = gaussian_blobs(3, 10, 4, 7);

        assert_eq!(30, dataset.len());
        for idx in 0..dataset.len() {
            let item = dataset.get(idx).unwrap();
            assert_eq!(4, item.features.len());
            assert!(item.label < 3);
        }
    }

    #[test]
    fn blobs_are_deterministic_for_a_seed() {
        let a = gaussian_blobs(2, 5, 3, 42);
        let b = gaussian_blobs(2, 5, 3, 42);

        for idx in 0..a.len() {
            let (a, b) = (a.get(idx).unwrap(), b.get(idx).unwrap());
            assert_eq!(a.features, b.features);
            assert_eq!(a.label, b.label);
        }
    }

    #[test]
    fn batcher_stacks_items_row_wise() {
        let device = Default::default();
        let items = vec![
            FlatImageItem {
                features: vec![0.0, 1.0],
                label: 0,
            },
            FlatImageItem {
                features: vec![2.0, 3.0],
                label: 1,
            },
        ];

        let batch: FlatImageBatch<TestBackend> = FlatImageBatcher::default().batch(items, &device);

        assert_eq!([2, 2], batch.features.dims());
        assert_eq!([2], batch.targets.dims());
        assert_eq!(
            vec![0.0, 1.0, 2.0, 3.0],
            batch.features.to_data().to_vec::<f32>().unwrap()
        );
        assert_eq!(
            vec![0i64, 1],
            batch.targets.to_data().to_vec::<i64>().unwrap()
        );
    }
}
