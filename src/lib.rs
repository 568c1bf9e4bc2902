//! Graph-neural-network property prediction for small molecules. Covers the
//! full pipeline: SMILES parsing and writing, per-atom and per-bond
//! featurization, dataset assembly with target standardization and several
//! split strategies, a message-passing regression model, training with early
//! stopping, evaluation metrics, and single-sample inference from saved
//! weights.

pub mod characterization;
pub mod dataset;
pub mod element;
pub mod ensemble;
pub mod eval;
pub mod featurize;
pub mod filter;
pub mod gnn;
pub mod infer;
pub mod molecule;
pub mod smiles;
pub mod split;
pub mod train;

#[cfg(test)]
mod tests;
