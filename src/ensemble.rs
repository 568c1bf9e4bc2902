//! Temperature-dependent heat-capacity prediction. Five copies of the graph
//! model each predict one coefficient of a two-term hyperbolic form; the
//! closed-form layer combines them with the sample's temperature.

use std::{io, io::ErrorKind};

use burn::{
    module::Module,
    tensor::{Tensor, backend::Backend},
};

use crate::{
    dataset::MolGraph,
    gnn::{GraphBatch, Model},
};

/// sinh from explicit exponentials, input clamped so exp stays inside f32.
fn safe_sinh<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    let xc = x.clamp(-88.0, 88.0);
    (xc.clone().exp() - xc.neg().exp()) / 2.0
}

fn safe_cosh<B: Backend>(x: Tensor<B, 2>) -> Tensor<B, 2> {
    let xc = x.clamp(-88.0, 88.0);
    (xc.clone().exp() + xc.neg().exp()) / 2.0
}

/// Two-term hyperbolic heat-capacity form, evaluated per sample on [B, 1]
/// tensors:
///
///   cp = b + c * (x / sinh x)^2 + e * (y / cosh y)^2
///
/// with x = d/T and y = f/T. The ratios are clamped and each denominator
/// keeps a small epsilon, so the form stays finite at any temperature the
/// models produce.
pub fn cp_from_terms<B: Backend>(
    b: Tensor<B, 2>,
    c: Tensor<B, 2>,
    d: Tensor<B, 2>,
    e: Tensor<B, 2>,
    f: Tensor<B, 2>,
    temps: Tensor<B, 2>,
) -> Tensor<B, 2> {
    let eps = 1e-7;
    let t = temps + eps;

    let d_over_t = (d / t.clone()).clamp(-20.0, 20.0);
    let f_over_t = (f / t).clamp(-20.0, 20.0);

    let sinh_term = safe_sinh(d_over_t.clone()) + eps;
    let cosh_term = safe_cosh(f_over_t.clone()) + eps;

    let sr = d_over_t / sinh_term;
    let cr = f_over_t / cosh_term;

    b + c * (sr.clone() * sr) + e * (cr.clone() * cr)
}

/// Five sub-models, one per coefficient of `cp_from_terms` in order
/// (b, c, d, e, f).
#[derive(Module, Debug)]
pub struct CpEnsemble<B: Backend> {
    pub model_a: Model<B>,
    pub model_b: Model<B>,
    pub model_c: Model<B>,
    pub model_d: Model<B>,
    pub model_e: Model<B>,
}

impl<B: Backend> CpEnsemble<B> {
    pub fn new(models: [Model<B>; 5]) -> Self {
        let [model_a, model_b, model_c, model_d, model_e] = models;
        Self {
            model_a,
            model_b,
            model_c,
            model_d,
            model_e,
        }
    }

    /// Runs every sub-model on the batch and combines the predicted
    /// coefficients at the batch's global-feature temperatures.
    pub fn forward(&self, batch: &GraphBatch<B>) -> Tensor<B, 2> {
        let run = |m: &Model<B>| {
            m.forward(
                batch.nodes.clone(),
                batch.adj.clone(),
                batch.edge_feats.clone(),
                batch.mask.clone(),
            )
        };

        cp_from_terms(
            run(&self.model_a),
            run(&self.model_b),
            run(&self.model_c),
            run(&self.model_d),
            run(&self.model_e),
            batch.globals.clone(),
        )
    }
}

/// The ensemble reads a temperature for every sample, and the batcher cannot
/// reject items, so callers check the set before batching.
pub fn validate_globals(samples: &[MolGraph]) -> io::Result<()> {
    for (i, s) in samples.iter().enumerate() {
        if s.global_feat.is_none() {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("Sample {i} has no global feature"),
            ));
        }
    }

    Ok(())
}
