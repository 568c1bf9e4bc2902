//! The message-passing regression model and its batcher. Graphs are padded
//! to the largest molecule in each batch and run as dense tensors: node
//! features [B, N, F], normalized adjacency [B, N, N], per-pair edge features
//! [B, N, N, Fe], and a mask separating real atoms from padding.

use burn::{
    config::Config,
    data::dataloader::batcher::Batcher,
    module::Module,
    nn::{Dropout, DropoutConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig},
    tensor::{Tensor, TensorData, activation, backend::Backend},
};

use crate::dataset::MolGraph;

#[derive(Config, Debug)]
pub struct ModelConfig {
    pub node_dim: usize,
    pub edge_dim: usize,
    #[config(default = 128)]
    pub hidden_dim: usize,
    #[config(default = 3)]
    pub num_rounds: usize,
    #[config(default = 64)]
    pub mlp_dim: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
}

impl ModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Model<B> {
        Model {
            node_proj: LinearConfig::new(self.node_dim, self.hidden_dim).init(device),
            edge_proj: LinearConfig::new(self.edge_dim, self.hidden_dim).init(device),
            round_linears: (0..self.num_rounds)
                .map(|_| LinearConfig::new(self.hidden_dim, self.hidden_dim).init(device))
                .collect(),
            norms: (0..self.num_rounds)
                .map(|_| LayerNormConfig::new(self.hidden_dim).init(device))
                .collect(),
            head1: LinearConfig::new(2 * self.hidden_dim, self.mlp_dim).init(device),
            head2: LinearConfig::new(self.mlp_dim, 1).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    /// Node encoder
    node_proj: Linear<B>,
    /// Edge encoder: per-pair bond features into message space
    edge_proj: Linear<B>,
    round_linears: Vec<Linear<B>>,
    norms: Vec<LayerNorm<B>>,
    head1: Linear<B>,
    head2: Linear<B>,
    dropout: Dropout,
}

impl<B: Backend> Model<B> {
    /// Predictions together with the pooled graph representation they came
    /// from, for callers that want embeddings as well.
    pub fn forward_with_latents(
        &self,
        nodes: Tensor<B, 3>,      // [Batch, MaxAtoms, NodeDim]
        adj: Tensor<B, 3>,        // [Batch, MaxAtoms, MaxAtoms]
        edge_feats: Tensor<B, 4>, // [Batch, MaxAtoms, MaxAtoms, EdgeDim]
        mask: Tensor<B, 3>,       // [Batch, MaxAtoms, 1]
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let mut h = activation::relu(self.node_proj.forward(nodes));
        let e = self.edge_proj.forward(edge_feats);

        for (linear, norm) in self.round_linears.iter().zip(&self.norms) {
            // Message from sender j to receiver i: sender state plus the
            // (i, j) edge encoding.
            let msg = activation::relu(h.clone().unsqueeze_dim::<4>(1) + e.clone());

            // Weight by normalized adjacency and sum over senders.
            let agg: Tensor<B, 3> = (msg * adj.clone().unsqueeze_dim::<4>(3))
                .sum_dim(2)
                .flatten(2, 3);

            let update = norm.forward(activation::relu(linear.forward(agg)));
            h = (h + update) * mask.clone();
        }

        // Masked mean pooling over atoms.
        let summed = (h.clone() * mask.clone()).sum_dim(1);
        let counts = mask.clone().sum_dim(1) + 1e-6;
        let mean: Tensor<B, 2> = (summed / counts).flatten(0, 1);

        // Masked max pooling: padding rows sit at -1e9 so they never win.
        let neg_fill = (mask - 1.0) * 1e9;
        let max: Tensor<B, 2> = (h + neg_fill).max_dim(1).flatten(0, 1);

        let latents = Tensor::cat(vec![mean, max], 1);

        let hidden = activation::relu(self.head1.forward(latents.clone()));
        let hidden = self.dropout.forward(hidden);
        let preds = self.head2.forward(hidden);

        (preds, latents)
    }

    pub fn forward(
        &self,
        nodes: Tensor<B, 3>,
        adj: Tensor<B, 3>,
        edge_feats: Tensor<B, 4>,
        mask: Tensor<B, 3>,
    ) -> Tensor<B, 2> {
        self.forward_with_latents(nodes, adj, edge_feats, mask).0
    }
}

#[derive(Clone, Debug)]
pub struct GraphBatch<B: Backend> {
    pub nodes: Tensor<B, 3>,
    pub adj: Tensor<B, 3>,
    pub edge_feats: Tensor<B, 4>,
    pub mask: Tensor<B, 3>,
    pub globals: Tensor<B, 2>,
    pub targets: Tensor<B, 2>,
}

#[derive(Clone, Debug)]
pub struct GraphBatcher {
    pub node_dim: usize,
    pub edge_dim: usize,
}

impl GraphBatcher {
    pub fn new(node_dim: usize, edge_dim: usize) -> Self {
        Self { node_dim, edge_dim }
    }
}

impl<B: Backend> Batcher<B, MolGraph, GraphBatch<B>> for GraphBatcher {
    fn batch(&self, items: Vec<MolGraph>, device: &B::Device) -> GraphBatch<B> {
        let batch_size = items.len();
        let max_atoms = items.iter().map(|g| g.num_atoms).max().unwrap_or(1);

        let mut batch_nodes = Vec::new();
        let mut batch_adj = Vec::new();
        let mut batch_edges = Vec::new();
        let mut batch_mask = Vec::new();
        let mut batch_globals = Vec::new();
        let mut batch_y = Vec::new();

        for item in &items {
            let (p_nodes, p_mask) = pad_nodes(item, max_atoms, self.node_dim);
            batch_nodes.extend(p_nodes);
            batch_mask.extend(p_mask);
            batch_adj.extend(normalized_adjacency(item, max_atoms));
            batch_edges.extend(edge_grid(item, max_atoms, self.edge_dim));
            batch_globals.push(item.global_feat.unwrap_or(0.0));
            batch_y.push(item.y);
        }

        let nodes = TensorData::new(batch_nodes, [batch_size, max_atoms, self.node_dim]);
        let adj = TensorData::new(batch_adj, [batch_size, max_atoms, max_atoms]);
        let edges = TensorData::new(
            batch_edges,
            [batch_size, max_atoms, max_atoms, self.edge_dim],
        );
        let mask = TensorData::new(batch_mask, [batch_size, max_atoms, 1]);
        let globals = TensorData::new(batch_globals, [batch_size, 1]);
        let y = TensorData::new(batch_y, [batch_size, 1]);

        GraphBatch {
            nodes: Tensor::from_data(nodes, device),
            adj: Tensor::from_data(adj, device),
            edge_feats: Tensor::from_data(edges, device),
            mask: Tensor::from_data(mask, device),
            globals: Tensor::from_data(globals, device),
            targets: Tensor::from_data(y, device),
        }
    }
}

/// Pads one graph's node features and mask to `max_atoms` rows.
fn pad_nodes(item: &MolGraph, max_atoms: usize, node_dim: usize) -> (Vec<f32>, Vec<f32>) {
    let n = item.num_atoms;

    let mut p_nodes = Vec::with_capacity(max_atoms * node_dim);
    p_nodes.extend_from_slice(&item.node_feats[0..n * node_dim]);
    p_nodes.extend(std::iter::repeat(0.0).take((max_atoms - n) * node_dim));

    let mut p_mask = Vec::with_capacity(max_atoms);
    p_mask.extend(std::iter::repeat(1.0).take(n));
    p_mask.extend(std::iter::repeat(0.0).take(max_atoms - n));

    (p_nodes, p_mask)
}

/// Dense D^-1/2 (A + I) D^-1/2 adjacency with bond orders as edge weights,
/// written straight into a padded `max_atoms` x `max_atoms` grid.
fn normalized_adjacency(item: &MolGraph, max_atoms: usize) -> Vec<f32> {
    let n = item.num_atoms;

    let mut raw = vec![0.0f32; n * n];
    for (e, edge) in item.edge_index.iter().enumerate() {
        let (src, dst) = (edge[0] as usize, edge[1] as usize);
        raw[src * n + dst] = item.edge_order[e];
    }
    for i in 0..n {
        raw[i * n + i] = 1.0;
    }

    let degrees: Vec<f32> = (0..n).map(|i| raw[i * n..(i + 1) * n].iter().sum()).collect();

    let mut padded = vec![0.0f32; max_atoms * max_atoms];
    for i in 0..n {
        for j in 0..n {
            if raw[i * n + j] == 0.0 {
                continue;
            }
            let norm = degrees[i].max(1e-9).sqrt() * degrees[j].max(1e-9).sqrt();
            padded[i * max_atoms + j] = raw[i * n + j] / norm;
        }
    }

    padded
}

/// Scatters per-edge features into a dense [max_atoms, max_atoms, edge_dim]
/// grid, zero where no bond exists. Both directions of each bond carry the
/// same features, so the grid comes out symmetric.
fn edge_grid(item: &MolGraph, max_atoms: usize, edge_dim: usize) -> Vec<f32> {
    let mut grid = vec![0.0f32; max_atoms * max_atoms * edge_dim];

    for (e, edge) in item.edge_index.iter().enumerate() {
        let (src, dst) = (edge[0] as usize, edge[1] as usize);
        let from = e * edge_dim;
        let to = (src * max_atoms + dst) * edge_dim;
        grid[to..to + edge_dim].copy_from_slice(&item.edge_feats[from..from + edge_dim]);
    }

    grid
}
