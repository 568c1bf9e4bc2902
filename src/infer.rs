//! Single-sample inference from a saved model directory. Loads the weights
//! and JSON sidecars written by `save_model` and replicates the training-time
//! batching for a batch of one.

use std::{fs, io, io::ErrorKind, path::Path};

use burn::{
    backend::NdArray,
    data::dataloader::batcher::Batcher,
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::Backend,
};

use crate::{
    dataset::{MolGraph, TargetScaler, construct_dataset},
    featurize::{AtomFeaturizer, BondFeaturizer},
    gnn::{GraphBatch, GraphBatcher, Model, ModelConfig},
    train::model_paths,
};

type InferBackend = NdArray;
type InferDevice = <InferBackend as Backend>::Device;

pub struct Predictor {
    model_cfg: ModelConfig,
    scaler: TargetScaler,
    model: Model<InferBackend>,
    device: InferDevice,
}

impl Predictor {
    pub fn load(dir: &Path, name: &str) -> io::Result<Self> {
        let (weights_path, config_path, scaler_path) = model_paths(dir, name);

        let cfg_bytes = fs::read(&config_path)?;
        let scaler_bytes = fs::read(&scaler_path)?;

        let model_cfg: ModelConfig =
            serde_json::from_slice(&cfg_bytes).map_err(io::Error::other)?;
        let scaler: TargetScaler =
            serde_json::from_slice(&scaler_bytes).map_err(io::Error::other)?;

        let device = InferDevice::default();
        let model = model_cfg.init::<InferBackend>(&device);

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let model = model
            .load_file(weights_path, &recorder, &device)
            .map_err(io::Error::other)?;

        Ok(Self {
            model_cfg,
            scaler,
            model,
            device,
        })
    }

    /// Predicts for one graph, mapping the output back to original units.
    pub fn predict(&self, graph: &MolGraph) -> io::Result<f32> {
        if graph.node_dim != self.model_cfg.node_dim || graph.edge_dim != self.model_cfg.edge_dim {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!(
                    "Feature widths {}/{} do not match the model's {}/{}",
                    graph.node_dim, graph.edge_dim, self.model_cfg.node_dim, self.model_cfg.edge_dim
                ),
            ));
        }

        let batcher = GraphBatcher::new(graph.node_dim, graph.edge_dim);
        let batch: GraphBatch<InferBackend> = batcher.batch(vec![graph.clone()], &self.device);

        let pred = self
            .model
            .forward(batch.nodes, batch.adj, batch.edge_feats, batch.mask);
        let vals = pred
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| io::Error::other(format!("{e:?}")))?;

        Ok(self.scaler.denormalize(vals[0]))
    }

    /// Parses a SMILES, featurizes it with the default featurizers, and
    /// predicts. A supplied global feature is standardized the way training
    /// data was, when the scaler carries global statistics.
    pub fn predict_smiles(&self, smiles: &str, global_feat: Option<f32>) -> io::Result<f32> {
        let graphs = construct_dataset(
            &[smiles.to_string()],
            &[0.0],
            global_feat
                .map(|g| vec![self.scaler.normalize_global(g)])
                .as_deref(),
            &AtomFeaturizer::default(),
            &BondFeaturizer::default(),
        )?;

        self.predict(&graphs[0])
    }
}

/// One-shot convenience: load a saved model, then predict a single SMILES.
pub fn predict_smiles(
    smiles: &str,
    dir: &Path,
    name: &str,
    global_feat: Option<f32>,
) -> io::Result<f32> {
    Predictor::load(dir, name)?.predict_smiles(smiles, global_feat)
}
