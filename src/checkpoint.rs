//! Persistence for trained models.
//!
//! A [`Checkpoint`] is a single record holding the model architecture (input
//! size, hidden widths, output size) next to a name-to-tensor map of the
//! learned values. Loading always rebuilds a model of the recorded
//! architecture first and then copies values in by parameter name; any
//! disagreement between the recorded widths and the tensors (or a target
//! model) is a hard error, never a silent truncate or broadcast.
//!
//! The on-disk format is named MessagePack, the same serialization family
//! burn's own file recorder uses.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use burn::module::{Module, Param, ParamId};
use burn::nn::LinearRecord;
use burn::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Mlp, MlpConfig, MlpRecord};

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Encode(#[from] rmp_serde::encode::Error),
    #[error(transparent)]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("parameter `{param}` has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        param: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("parameter `{param}` is missing from the checkpoint")]
    MissingParam { param: String },
    #[error("checkpoint contains unexpected parameter `{param}`")]
    UnexpectedParam { param: String },
    #[error("checkpoint layer widths {found:?} do not match the model widths {expected:?}")]
    ArchitectureMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
}

/// A serialized record of a model's architecture and learned parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub input_size: usize,
    pub output_size: usize,
    /// Ordered hidden-layer widths.
    pub hidden_layers: Vec<usize>,
    /// Parameter name (`layers.{i}.weight` / `layers.{i}.bias`) to values,
    /// stored as f32 regardless of the training backend's float element.
    pub state_dict: BTreeMap<String, TensorData>,
}

impl Checkpoint {
    /// Capture a model's architecture and parameter values.
    ///
    /// The architecture fields are read back from the layer weight shapes,
    /// so the record is consistent with the tensors by construction.
    pub fn from_model<B: Backend>(model: &Mlp<B>) -> Self {
        let widths = model.widths();

        let mut state_dict = BTreeMap::new();
        for (i, layer) in model.layers.iter().enumerate() {
            state_dict.insert(
                format!("layers.{i}.weight"),
                layer.weight.val().to_data().convert::<f32>(),
            );
            if let Some(bias) = &layer.bias {
                state_dict.insert(
                    format!("layers.{i}.bias"),
                    bias.val().to_data().convert::<f32>(),
                );
            }
        }

        Self {
            input_size: widths[0],
            output_size: widths[widths.len() - 1],
            hidden_layers: widths[1..widths.len() - 1].to_vec(),
            state_dict,
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CheckpointError> {
        let mut writer = BufWriter::new(File::create(path)?);
        rmp_serde::encode::write_named(&mut writer, self)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError> {
        let reader = BufReader::new(File::open(path)?);
        Ok(rmp_serde::decode::from_read(reader)?)
    }

    /// The model config this checkpoint was captured from.
    pub fn config(&self) -> MlpConfig {
        MlpConfig::new(
            self.input_size,
            self.output_size,
            self.hidden_layers.clone(),
        )
    }

    /// Reconstruct a model of the recorded architecture and copy the stored
    /// values into it.
    ///
    /// Every parameter implied by the architecture must be present with the
    /// matching shape, and the checkpoint must not carry extra parameters.
    pub fn restore<B: Backend>(&self, device: &B::Device) -> Result<Mlp<B>, CheckpointError> {
        let config = self.config();
        let widths = config.widths();
        let num_layers = widths.len() - 1;

        let mut layers = Vec::with_capacity(num_layers);
        for i in 0..num_layers {
            let (d_input, d_output) = (widths[i], widths[i + 1]);
            let weight = self.tensor::<B, 2>(
                &format!("layers.{i}.weight"),
                [d_input, d_output],
                device,
            )?;
            let bias = self.tensor::<B, 1>(&format!("layers.{i}.bias"), [d_output], device)?;
            layers.push(LinearRecord {
                weight: Param::initialized(ParamId::new(), weight),
                bias: Some(Param::initialized(ParamId::new(), bias)),
            });
        }

        if let Some(param) = self
            .state_dict
            .keys()
            .find(|name| !Self::expected_name(name, num_layers))
        {
            return Err(CheckpointError::UnexpectedParam {
                param: param.clone(),
            });
        }

        let model = config.init(device).load_record(MlpRecord { layers });
        Ok(model)
    }

    /// Like [`Self::restore`], but for loading into a model of a known
    /// configuration: the target widths must exactly match the recorded
    /// ones.
    pub fn restore_into<B: Backend>(
        &self,
        config: &MlpConfig,
        device: &B::Device,
    ) -> Result<Mlp<B>, CheckpointError> {
        let expected = config.widths();
        let found = self.config().widths();
        if expected != found {
            return Err(CheckpointError::ArchitectureMismatch { expected, found });
        }
        self.restore(device)
    }

    fn tensor<B: Backend, const D: usize>(
        &self,
        param: &str,
        expected: [usize; D],
        device: &B::Device,
    ) -> Result<Tensor<B, D>, CheckpointError> {
        let data = self
            .state_dict
            .get(param)
            .ok_or_else(|| CheckpointError::MissingParam {
                param: param.to_string(),
            })?;
        if data.shape != expected {
            return Err(CheckpointError::ShapeMismatch {
                param: param.to_string(),
                expected: expected.to_vec(),
                found: data.shape.clone(),
            });
        }
        Ok(Tensor::from_data(
            data.clone().convert::<B::FloatElem>(),
            device,
        ))
    }

    fn expected_name(name: &str, num_layers: usize) -> bool {
        (0..num_layers).any(|i| {
            name == format!("layers.{i}.weight") || name == format!("layers.{i}.bias")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_dir::TempDir;

    type TestBackend = burn::backend::NdArray;

    fn params_of(model: &Mlp<TestBackend>) -> Vec<Vec<f32>> {
        let mut params = Vec::new();
        for layer in &model.layers {
            params.push(layer.weight.val().to_data().to_vec::<f32>().unwrap());
            if let Some(bias) = &layer.bias {
                params.push(bias.val().to_data().to_vec::<f32>().unwrap());
            }
        }
        params
    }

    #[test]
    fn round_trip_reproduces_identical_values() {
        let device = Default::default();
        let config = MlpConfig::new(6, 3, vec![8, 4]);
        let model: Mlp<TestBackend> = config.init(&device);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.mpk");
        Checkpoint::from_model(&model).save(&path).unwrap();

        let restored = Checkpoint::load(&path)
            .unwrap()
            .restore_into::<TestBackend>(&config, &device)
            .unwrap();

        assert_eq!(params_of(&model), params_of(&restored));
    }

    #[test]
    fn capture_records_the_architecture() {
        let device = Default::default();
        let model: Mlp<TestBackend> = MlpConfig::new(6, 3, vec![8, 4]).init(&device);

        let checkpoint = Checkpoint::from_model(&model);

        assert_eq!(6, checkpoint.input_size);
        assert_eq!(3, checkpoint.output_size);
        assert_eq!(vec![8, 4], checkpoint.hidden_layers);
        // weight + bias per layer
        assert_eq!(6, checkpoint.state_dict.len());
    }

    #[test]
    fn differing_hidden_widths_are_rejected() {
        let device = Default::default();
        let model: Mlp<TestBackend> = MlpConfig::new(6, 3, vec![8]).init(&device);
        let checkpoint = Checkpoint::from_model(&model);

        let narrower = MlpConfig::new(6, 3, vec![4]);
        let err = checkpoint
            .restore_into::<TestBackend>(&narrower, &device)
            .unwrap_err();

        match err {
            CheckpointError::ArchitectureMismatch { expected, found } => {
                assert_eq!(vec![6, 4, 3], expected);
                assert_eq!(vec![6, 8, 3], found);
            }
            other => panic!("expected an architecture mismatch, got {other}"),
        }
    }

    #[test]
    fn tampered_tensor_shape_is_rejected_by_name() {
        let device = Default::default();
        let model: Mlp<TestBackend> = MlpConfig::new(6, 3, vec![8]).init(&device);
        let mut checkpoint = Checkpoint::from_model(&model);

        // claim a narrower hidden layer than the stored tensors really have
        checkpoint.hidden_layers = vec![4];

        let err = checkpoint.restore::<TestBackend>(&device).unwrap_err();
        match err {
            CheckpointError::ShapeMismatch {
                param,
                expected,
                found,
            } => {
                assert_eq!("layers.0.weight", param);
                assert_eq!(vec![6, 4], expected);
                assert_eq!(vec![6, 8], found);
            }
            other => panic!("expected a shape mismatch, got {other}"),
        }
    }

    #[test]
    fn missing_parameter_is_rejected_by_name() {
        let device = Default::default();
        let model: Mlp<TestBackend> = MlpConfig::new(6, 3, vec![8]).init(&device);
        let mut checkpoint = Checkpoint::from_model(&model);

        checkpoint.state_dict.remove("layers.1.bias");

        let err = checkpoint.restore::<TestBackend>(&device).unwrap_err();
        match err {
            CheckpointError::MissingParam { param } => assert_eq!("layers.1.bias", param),
            other => panic!("expected a missing parameter, got {other}"),
        }
    }

    #[test]
    fn unexpected_parameter_is_rejected_by_name() {
        let device = Default::default();
        let model: Mlp<TestBackend> = MlpConfig::new(6, 3, vec![8]).init(&device);
        let mut checkpoint = Checkpoint::from_model(&model);

        checkpoint.state_dict.insert(
            "layers.2.weight".into(),
            TensorData::new(vec![0.0f32], [1, 1]),
        );

        let err = checkpoint.restore::<TestBackend>(&device).unwrap_err();
        match err {
            CheckpointError::UnexpectedParam { param } => assert_eq!("layers.2.weight", param),
            other => panic!("expected an unexpected parameter, got {other}"),
        }
    }
}
