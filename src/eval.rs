//! Evaluation and regression metrics. `test_model` collects predictions and
//! graph latents over a held-out set; the metric functions score aligned
//! prediction/target slices, accumulating in f64.

use std::{fmt, io, io::ErrorKind, str::FromStr};

use burn::{
    data::{dataloader::DataLoaderBuilder, dataset::InMemDataset},
    nn::loss::{MseLoss, Reduction},
};

use crate::{
    dataset::{MolGraph, TargetScaler},
    gnn::{GraphBatcher, Model},
    train::ValidBackend,
};

/// Flat evaluation results. `latents` holds `preds.len() * latent_width`
/// values, one pooled graph representation per sample in input order.
pub struct EvalOutput {
    pub preds: Vec<f32>,
    pub latents: Vec<f32>,
    pub latent_width: usize,
    /// Mean per-batch MSE, present when requested.
    pub loss: Option<f32>,
}

/// Runs the model over a set in mini-batches of 32, preserving sample order.
pub fn test_model(
    model: &Model<ValidBackend>,
    data: Vec<MolGraph>,
    compute_loss: bool,
) -> io::Result<EvalOutput> {
    if data.is_empty() {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            "Evaluation requires a non-empty set",
        ));
    }

    let node_dim = data[0].node_dim;
    let edge_dim = data[0].edge_dim;

    let loader = DataLoaderBuilder::new(GraphBatcher::new(node_dim, edge_dim))
        .batch_size(32)
        .build(InMemDataset::new(data));

    let mut preds = Vec::new();
    let mut latents = Vec::new();
    let mut latent_width = 0;
    let mut batch_losses = Vec::new();

    for batch in loader.iter() {
        let (pred, latent) = model.forward_with_latents(
            batch.nodes.clone(),
            batch.adj.clone(),
            batch.edge_feats.clone(),
            batch.mask.clone(),
        );

        if compute_loss {
            let loss = MseLoss::new().forward(pred.clone(), batch.targets.clone(), Reduction::Mean);
            batch_losses.push(loss.into_scalar());
        }

        latent_width = latent.dims()[1];

        preds.extend(
            pred.into_data()
                .to_vec::<f32>()
                .map_err(|e| io::Error::other(format!("{e:?}")))?,
        );
        latents.extend(
            latent
                .into_data()
                .to_vec::<f32>()
                .map_err(|e| io::Error::other(format!("{e:?}")))?,
        );
    }

    let loss = if compute_loss {
        let l = batch_losses.iter().sum::<f32>() / batch_losses.len() as f32;
        println!("Test loss: {l:.3}");
        Some(l)
    } else {
        None
    };

    Ok(EvalOutput {
        preds,
        latents,
        latent_width,
        loss,
    })
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Metric {
    Mse,
    Sse,
    Mae,
    R2,
    Mre,
}

impl FromStr for Metric {
    type Err = io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mse" => Ok(Self::Mse),
            "sse" => Ok(Self::Sse),
            "mae" => Ok(Self::Mae),
            "r2" => Ok(Self::R2),
            "mre" => Ok(Self::Mre),
            _ => Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("Unknown metric: {s}"),
            )),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Mse => "mse",
            Self::Sse => "sse",
            Self::Mae => "mae",
            Self::R2 => "r2",
            Self::Mre => "mre",
        };
        write!(f, "{name}")
    }
}

/// Evaluates the requested metrics over aligned predictions and targets.
/// When a scaler is given, both sides are mapped back to original units
/// first.
pub fn pred_metric(
    preds: &[f32],
    targets: &[f32],
    metrics: &[Metric],
    scaler: Option<&TargetScaler>,
) -> io::Result<Vec<f64>> {
    if preds.is_empty() || preds.len() != targets.len() {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            format!(
                "Predictions and targets must be non-empty and aligned: {} vs {}",
                preds.len(),
                targets.len()
            ),
        ));
    }

    let (preds, targets): (Vec<f32>, Vec<f32>) = match scaler {
        Some(s) => (
            preds.iter().map(|&p| s.denormalize(p)).collect(),
            targets.iter().map(|&t| s.denormalize(t)).collect(),
        ),
        None => (preds.to_vec(), targets.to_vec()),
    };

    Ok(metrics
        .iter()
        .map(|&m| compute_metric(m, &preds, &targets))
        .collect())
}

fn sum_sq_err(preds: &[f32], targets: &[f32]) -> f64 {
    preds
        .iter()
        .zip(targets)
        .map(|(&p, &t)| (t as f64 - p as f64).powi(2))
        .sum()
}

fn compute_metric(metric: Metric, preds: &[f32], targets: &[f32]) -> f64 {
    let n = preds.len() as f64;

    match metric {
        Metric::Mse => sum_sq_err(preds, targets) / n,
        Metric::Sse => sum_sq_err(preds, targets),
        Metric::Mae => {
            preds
                .iter()
                .zip(targets)
                .map(|(&p, &t)| (t as f64 - p as f64).abs())
                .sum::<f64>()
                / n
        }
        Metric::R2 => {
            let ss_res = sum_sq_err(preds, targets);
            let t_mean = targets.iter().map(|&t| t as f64).sum::<f64>() / n;
            let ss_tot = targets
                .iter()
                .map(|&t| (t as f64 - t_mean).powi(2))
                .sum::<f64>();

            // A constant target column has no variance to explain.
            if ss_tot == 0.0 || !ss_tot.is_finite() {
                f64::NAN
            } else {
                1.0 - ss_res / ss_tot
            }
        }
        // Signed, as a percentage: over- and under-prediction cancel.
        Metric::Mre => {
            preds
                .iter()
                .zip(targets)
                .map(|(&p, &t)| (t as f64 - p as f64) / t as f64)
                .sum::<f64>()
                / n
                * 100.0
        }
    }
}

/// All five metrics at once.
#[derive(Clone, Copy, Debug)]
pub struct RegressionMetrics {
    pub mse: f64,
    pub sse: f64,
    pub mae: f64,
    pub r2: f64,
    pub mre: f64,
}

impl RegressionMetrics {
    pub fn compute(
        preds: &[f32],
        targets: &[f32],
        scaler: Option<&TargetScaler>,
    ) -> io::Result<Self> {
        let vals = pred_metric(
            preds,
            targets,
            &[Metric::Mse, Metric::Sse, Metric::Mae, Metric::R2, Metric::Mre],
            scaler,
        )?;

        Ok(Self {
            mse: vals[0],
            sse: vals[1],
            mae: vals[2],
            r2: vals[3],
            mre: vals[4],
        })
    }
}

impl fmt::Display for RegressionMetrics {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "MSE: {:.4}", self.mse)?;
        writeln!(f, "SSE: {:.4}", self.sse)?;
        writeln!(f, "MAE: {:.4}", self.mae)?;
        writeln!(f, "R2:  {:.4}", self.r2)?;
        write!(f, "MRE: {:.2}%", self.mre)
    }
}
