//! Training loop and model persistence. Runs on the CPU ndarray backend;
//! weights go to a named-MessagePack file with the model config and target
//! scaler as JSON sidecars so inference can rebuild the whole pipeline.

use std::{
    fs, io,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Instant,
};

use burn::{
    backend::{Autodiff, NdArray},
    config::Config,
    data::{dataloader::DataLoaderBuilder, dataset::InMemDataset},
    module::{AutodiffModule, Module},
    nn::loss::{MseLoss, Reduction},
    optim::{AdamConfig, GradientsParams, Optimizer},
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::Backend,
};

use crate::{
    dataset::{MolGraph, TargetScaler},
    gnn::{GraphBatcher, Model, ModelConfig},
};

pub type TrainBackend = Autodiff<NdArray>;
pub type ValidBackend = NdArray;

#[derive(Config, Debug)]
pub struct TrainConfig {
    #[config(default = 50)]
    pub epochs: usize,
    #[config(default = 32)]
    pub batch_size: usize,
    #[config(default = 1e-3)]
    pub lr: f64,
    #[config(default = true)]
    pub early_stopping: bool,
    /// Consecutive epochs without validation improvement before stopping.
    #[config(default = 3)]
    pub patience: usize,
    #[config(default = 42)]
    pub seed: u64,
}

pub struct TrainResult {
    pub model: Model<TrainBackend>,
    /// Mean train loss per epoch.
    pub train_losses: Vec<f32>,
    /// Mean validation loss per epoch.
    pub val_losses: Vec<f32>,
    pub best_val: f32,
}

/// Trains with Adam on MSE loss, tracking validation loss after every epoch
/// for early stopping.
pub fn train_model(
    model: Model<TrainBackend>,
    config: &TrainConfig,
    train: Vec<MolGraph>,
    val: Vec<MolGraph>,
) -> io::Result<TrainResult> {
    if train.is_empty() || val.is_empty() {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            "Training requires non-empty train and validation sets",
        ));
    }

    let start = Instant::now();

    let node_dim = train[0].node_dim;
    let edge_dim = train[0].edge_dim;

    let train_loader = DataLoaderBuilder::new(GraphBatcher::new(node_dim, edge_dim))
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .build(InMemDataset::new(train));

    let val_loader = DataLoaderBuilder::new(GraphBatcher::new(node_dim, edge_dim))
        .batch_size(config.batch_size)
        .build(InMemDataset::new(val));

    let mut model = model;
    let mut optim = AdamConfig::new().init();

    let mut train_losses = Vec::with_capacity(config.epochs);
    let mut val_losses = Vec::with_capacity(config.epochs);
    let mut best_val = f32::INFINITY;
    let mut patience_counter = 0;

    for epoch in 0..config.epochs {
        let mut batch_losses = Vec::new();

        for batch in train_loader.iter() {
            let pred = model.forward(
                batch.nodes.clone(),
                batch.adj.clone(),
                batch.edge_feats.clone(),
                batch.mask.clone(),
            );
            let loss = MseLoss::new().forward(pred, batch.targets.clone(), Reduction::Mean);

            let grads = loss.backward();
            batch_losses.push(loss.into_scalar());

            let grads = GradientsParams::from_grads(grads, &model);
            model = optim.step(config.lr, model, grads);
        }
        let train_loss = mean(&batch_losses);

        let valid_model = model.valid();
        let mut val_batch_losses = Vec::new();
        for batch in val_loader.iter() {
            let pred = valid_model.forward(
                batch.nodes.clone(),
                batch.adj.clone(),
                batch.edge_feats.clone(),
                batch.mask.clone(),
            );
            let loss = MseLoss::new().forward(pred, batch.targets.clone(), Reduction::Mean);
            val_batch_losses.push(loss.into_scalar());
        }
        let val_loss = mean(&val_batch_losses);

        train_losses.push(train_loss);
        val_losses.push(val_loss);

        if val_loss < best_val {
            best_val = val_loss;
            patience_counter = 0;
        } else {
            patience_counter += 1;
        }

        if epoch % 5 == 0 {
            println!("Epoch {epoch}. Train loss: {train_loss:.3}. Val loss: {val_loss:.3}");
        }

        if config.early_stopping && patience_counter == config.patience {
            println!("Model hit early stop threshold. Ending training.");
            break;
        }
    }

    let elapsed = start.elapsed().as_secs();
    println!("Training complete in {elapsed} s");

    Ok(TrainResult {
        model,
        train_losses,
        val_losses,
        best_val,
    })
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

/// Paths for a saved model: weights (extension added by the recorder), the
/// model config sidecar, and the scaler sidecar.
pub fn model_paths(dir: &Path, name: &str) -> (PathBuf, PathBuf, PathBuf) {
    (
        dir.join(name),
        dir.join(format!("{name}_config.json")),
        dir.join(format!("{name}_scaler.json")),
    )
}

pub fn save_model<B: Backend>(
    model: Model<B>,
    model_cfg: &ModelConfig,
    scaler: &TargetScaler,
    dir: &Path,
    name: &str,
) -> io::Result<()> {
    fs::create_dir_all(dir)?;

    let (weights_path, config_path, scaler_path) = model_paths(dir, name);

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    model
        .save_file(weights_path.clone(), &recorder)
        .map_err(io::Error::other)?;

    let config_file = fs::File::create(&config_path)?;
    serde_json::to_writer_pretty(config_file, model_cfg).map_err(io::Error::other)?;

    let scaler_file = fs::File::create(&scaler_path)?;
    serde_json::to_writer_pretty(scaler_file, scaler).map_err(io::Error::other)?;

    println!("Saved model to {weights_path:?}");

    Ok(())
}
