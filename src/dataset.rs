//! Graph datasets for training. SMILES strings become flat-tensor-ready
//! `MolGraph` records here, optionally standardized and partitioned into
//! train, validation, and test sets.

use std::{collections::HashMap, fs::File, io, io::ErrorKind, ops::Index, path::Path, slice};

use serde::{Deserialize, Serialize};

use crate::{
    characterization::MolCharacterization,
    element::Element,
    featurize::{AtomFeaturizer, BondFeaturizer},
    filter::filter_smiles_indexed,
    molecule::Molecule,
    smiles::from_smiles,
    split::{SplitType, split_indices},
};

/// One molecule as model input: flat node features of `num_atoms * node_dim`,
/// directed edges in row-major scan order with features and bond orders
/// aligned per edge, the regression target, and an optional molecule-level
/// scalar such as a measurement temperature.
#[derive(Clone, Debug)]
pub struct MolGraph {
    pub node_feats: Vec<f32>,
    pub node_dim: usize,
    pub num_atoms: usize,
    /// Each entry is `[src, dst]`; both directions of every bond appear.
    pub edge_index: Vec<[u32; 2]>,
    pub edge_feats: Vec<f32>,
    pub edge_dim: usize,
    /// Bond order per directed edge, for adjacency weighting.
    pub edge_order: Vec<f32>,
    pub y: f32,
    pub global_feat: Option<f32>,
}

/// Builds one `MolGraph` per SMILES. Inputs are expected to be pre-filtered;
/// a parse failure here is an error rather than a skip.
pub fn construct_dataset(
    smiles: &[String],
    targets: &[f32],
    global_feats: Option<&[f32]>,
    atom_fz: &AtomFeaturizer,
    bond_fz: &BondFeaturizer,
) -> io::Result<Vec<MolGraph>> {
    if smiles.len() != targets.len() {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            format!(
                "SMILES and target counts differ: {} vs {}",
                smiles.len(),
                targets.len()
            ),
        ));
    }
    if let Some(g) = global_feats
        && g.len() != smiles.len()
    {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            format!(
                "SMILES and global feature counts differ: {} vs {}",
                smiles.len(),
                g.len()
            ),
        ));
    }

    let node_dim = atom_fz.dim();
    let edge_dim = bond_fz.dim();
    let mut out = Vec::with_capacity(smiles.len());

    for (idx, smi) in smiles.iter().enumerate() {
        let mol = from_smiles(smi)?;
        let character = MolCharacterization::new(&mol);
        let n = mol.atoms.len();

        let mut node_feats = Vec::with_capacity(n * node_dim);
        for i in 0..n {
            node_feats.extend(atom_fz.featurize(&mol, &character, i));
        }

        let mut bond_lookup: HashMap<(usize, usize), usize> = HashMap::new();
        for (k, b) in mol.bonds.iter().enumerate() {
            bond_lookup.insert((b.atom_0, b.atom_1), k);
            bond_lookup.insert((b.atom_1, b.atom_0), k);
        }

        let adj = mol.adjacency_matrix();
        let mut edge_index = Vec::with_capacity(2 * mol.bonds.len());
        let mut edge_feats = Vec::with_capacity(2 * mol.bonds.len() * edge_dim);
        let mut edge_order = Vec::with_capacity(2 * mol.bonds.len());

        for i in 0..n {
            for j in 0..n {
                if adj[i][j] == 0 {
                    continue;
                }
                let Some(&k) = bond_lookup.get(&(i, j)) else {
                    continue;
                };
                edge_index.push([i as u32, j as u32]);
                edge_feats.extend(bond_fz.featurize(&mol, &character, k));
                edge_order.push(mol.bonds[k].bond_type.order());
            }
        }

        out.push(MolGraph {
            node_feats,
            node_dim,
            num_atoms: n,
            edge_index,
            edge_feats,
            edge_dim,
            edge_order,
            y: targets[idx],
            global_feat: global_feats.map(|g| g[idx]),
        });
    }

    Ok(out)
}

/// Standardization parameters for the target column, and for the optional
/// global feature alongside it. Saved next to trained models so inference
/// can map predictions back to the original units.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetScaler {
    pub mean: f32,
    pub std: f32,
    pub global_mean: Option<f32>,
    pub global_std: Option<f32>,
}

impl TargetScaler {
    /// A scaler that leaves values untouched.
    pub fn identity() -> Self {
        Self {
            mean: 0.0,
            std: 1.0,
            global_mean: None,
            global_std: None,
        }
    }

    pub fn fit(samples: &[MolGraph]) -> Self {
        let (mean, std) = mean_std(samples.iter().map(|s| s.y));

        let globals: Vec<f32> = samples.iter().filter_map(|s| s.global_feat).collect();
        let (global_mean, global_std) = if globals.is_empty() {
            (None, None)
        } else {
            let (m, s) = mean_std(globals.iter().copied());
            (Some(m), Some(s))
        };

        Self {
            mean,
            std,
            global_mean,
            global_std,
        }
    }

    pub fn normalize(&self, y: f32) -> f32 {
        (y - self.mean) / self.std
    }

    pub fn denormalize(&self, y: f32) -> f32 {
        y * self.std + self.mean
    }

    pub fn normalize_global(&self, g: f32) -> f32 {
        match (self.global_mean, self.global_std) {
            (Some(mean), Some(std)) => (g - mean) / std,
            _ => g,
        }
    }

    /// Standardizes targets, and global features where fitted, in place.
    pub fn apply(&self, samples: &mut [MolGraph]) {
        for s in samples {
            s.y = self.normalize(s.y);
            s.global_feat = s.global_feat.map(|g| self.normalize_global(g));
        }
    }
}

fn mean_std(values: impl Iterator<Item = f32> + Clone) -> (f32, f32) {
    let n = values.clone().count();
    if n == 0 {
        return (0.0, 1.0);
    }

    let mean = values.clone().sum::<f32>() / n as f32;
    let var = values.map(|v| (v - mean).powi(2)).sum::<f32>() / n as f32;
    let std = var.sqrt();
    let std = if std < 1e-9 { 1.0 } else { std };

    (mean, std)
}

/// An unsplit dataset with the scaler that standardized it.
#[derive(Clone, Debug)]
pub struct DataSet {
    pub samples: Vec<MolGraph>,
    pub scaler: TargetScaler,
}

impl DataSet {
    pub fn new(mut samples: Vec<MolGraph>, standardize: bool) -> Self {
        let scaler = if standardize {
            let scaler = TargetScaler::fit(&samples);
            scaler.apply(&mut samples);
            scaler
        } else {
            TargetScaler::identity()
        };

        Self { samples, scaler }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&MolGraph> {
        self.samples.get(i)
    }

    pub fn iter(&self) -> slice::Iter<'_, MolGraph> {
        self.samples.iter()
    }
}

impl Index<usize> for DataSet {
    type Output = MolGraph;

    fn index(&self, i: usize) -> &MolGraph {
        &self.samples[i]
    }
}

/// Dataset partitions, all standardized by the one `scaler`.
#[derive(Clone, Debug)]
pub struct SplitDataSet {
    pub train: Vec<MolGraph>,
    pub val: Vec<MolGraph>,
    pub test: Vec<MolGraph>,
    pub scaler: TargetScaler,
}

/// Knobs for `make_graph_dataset`. The defaults match the common case:
/// default featurizers, standardized targets, and a seeded 80/10/10 random
/// split.
#[derive(Clone, Debug)]
pub struct DatasetOptions {
    /// Allowed elements for filtering; `None` means the default set.
    pub allowed: Option<Vec<Element>>,
    pub atom_featurizer: AtomFeaturizer,
    pub bond_featurizer: BondFeaturizer,
    pub standardize: bool,
    pub split: SplitType,
    pub fractions: [f32; 3],
    pub seed: u64,
    /// Per-sample labels for `SplitType::Custom`, aligned with the input
    /// SMILES list. Entries removed by filtering drop their labels too.
    pub custom_split: Option<Vec<u8>>,
    pub log: bool,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            allowed: None,
            atom_featurizer: AtomFeaturizer::default(),
            bond_featurizer: BondFeaturizer::default(),
            standardize: true,
            split: SplitType::Random,
            fractions: [0.8, 0.1, 0.1],
            seed: 42,
            custom_split: None,
            log: false,
        }
    }
}

/// The full data pipeline: filter the SMILES list, build graphs, standardize
/// targets over the whole set, then split.
pub fn make_graph_dataset(
    smiles: &[String],
    targets: &[f32],
    global_feats: Option<&[f32]>,
    options: &DatasetOptions,
) -> io::Result<SplitDataSet> {
    if let Some(g) = global_feats
        && g.len() != smiles.len()
    {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            format!(
                "SMILES and global feature counts differ: {} vs {}",
                smiles.len(),
                g.len()
            ),
        ));
    }

    let allowed: &[Element] = match &options.allowed {
        Some(a) => a,
        None => &Element::DEFAULT_ALLOWED,
    };

    let kept = filter_smiles_indexed(smiles, targets, allowed, options.log)?;

    let smiles_kept: Vec<String> = kept.iter().map(|&i| smiles[i].clone()).collect();
    let targets_kept: Vec<f32> = kept.iter().map(|&i| targets[i]).collect();
    let globals_kept: Option<Vec<f32>> =
        global_feats.map(|g| kept.iter().map(|&i| g[i]).collect());

    let custom_kept: Option<Vec<u8>> = match &options.custom_split {
        Some(labels) => {
            if labels.len() != smiles.len() {
                return Err(io::Error::new(
                    ErrorKind::InvalidData,
                    format!(
                        "Custom split labels cover {} samples; expected {}",
                        labels.len(),
                        smiles.len()
                    ),
                ));
            }
            Some(kept.iter().map(|&i| labels[i]).collect())
        }
        None => None,
    };

    let mut samples = construct_dataset(
        &smiles_kept,
        &targets_kept,
        globals_kept.as_deref(),
        &options.atom_featurizer,
        &options.bond_featurizer,
    )?;

    let scaler = if options.standardize {
        let scaler = TargetScaler::fit(&samples);
        scaler.apply(&mut samples);
        scaler
    } else {
        TargetScaler::identity()
    };

    // Splitters that look at structure need the molecules back.
    let mols: Vec<Molecule> = smiles_kept
        .iter()
        .map(|s| from_smiles(s))
        .collect::<io::Result<_>>()?;

    let [train_idx, val_idx, test_idx] = split_indices(
        options.split,
        &mols,
        &targets_kept,
        options.fractions,
        options.seed,
        custom_kept.as_deref(),
    )?;

    let pick = |idxs: &[usize]| -> Vec<MolGraph> {
        idxs.iter().map(|&i| samples[i].clone()).collect()
    };

    Ok(SplitDataSet {
        train: pick(&train_idx),
        val: pick(&val_idx),
        test: pick(&test_idx),
        scaler,
    })
}

/// Reads SMILES and target columns, by header name, from a CSV file. Rows
/// with missing or unparseable fields are skipped with a note on stderr.
pub fn load_smiles_csv(
    path: &Path,
    smiles_col: &str,
    target_col: &str,
) -> io::Result<(Vec<String>, Vec<f32>)> {
    let file = File::open(path)?;
    let mut rdr = csv::Reader::from_reader(file);

    let headers = rdr.headers().map_err(io::Error::other)?.clone();
    let smiles_i = headers.iter().position(|h| h == smiles_col).ok_or_else(|| {
        io::Error::new(
            ErrorKind::InvalidData,
            format!("Column {smiles_col} not found in {path:?}"),
        )
    })?;
    let target_i = headers.iter().position(|h| h == target_col).ok_or_else(|| {
        io::Error::new(
            ErrorKind::InvalidData,
            format!("Column {target_col} not found in {path:?}"),
        )
    })?;

    let mut smiles = Vec::new();
    let mut targets = Vec::new();

    for (i, record) in rdr.records().enumerate() {
        let record = match record {
            Ok(r) => r,
            Err(e) => {
                eprintln!("Skipping CSV record {i}: {e}");
                continue;
            }
        };

        let Some(smi) = record.get(smiles_i) else {
            eprintln!("Skipping CSV record {i}: missing SMILES field");
            continue;
        };
        if smi.trim().is_empty() {
            eprintln!("Skipping CSV record {i}: empty SMILES field");
            continue;
        }

        let target: f32 = match record.get(target_i).map(str::parse) {
            Some(Ok(t)) => t,
            _ => {
                eprintln!("Skipping CSV record {i}: missing or unparseable target");
                continue;
            }
        };

        smiles.push(smi.trim().to_string());
        targets.push(target);
    }

    Ok((smiles, targets))
}
