//! Train/validation/test partitioning. All strategies return index lists into
//! the original sample order, so callers can slice graphs, targets, and
//! metadata consistently.

use std::{cmp::Reverse, collections::HashMap, fmt, io, io::ErrorKind, str::FromStr};

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::{characterization::scaffold_key, molecule::Molecule};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SplitType {
    Consecutive,
    Random,
    MolecularWeight,
    Scaffold,
    Stratified,
    Custom,
}

impl FromStr for SplitType {
    type Err = io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consecutive" => Ok(Self::Consecutive),
            "random" => Ok(Self::Random),
            "molecular_weight" => Ok(Self::MolecularWeight),
            "scaffold" => Ok(Self::Scaffold),
            "stratified" => Ok(Self::Stratified),
            "custom" => Ok(Self::Custom),
            _ => Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("Unknown split type: {s}"),
            )),
        }
    }
}

impl fmt::Display for SplitType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Consecutive => "consecutive",
            Self::Random => "random",
            Self::MolecularWeight => "molecular_weight",
            Self::Scaffold => "scaffold",
            Self::Stratified => "stratified",
            Self::Custom => "custom",
        };
        write!(f, "{name}")
    }
}

/// Partitions `0..mols.len()` three ways. `custom` supplies per-sample labels
/// (0 train, 1 validation, 2 test) and is required only by `Custom`; `seed`
/// matters only to `Random`.
pub fn split_indices(
    split: SplitType,
    mols: &[Molecule],
    targets: &[f32],
    fractions: [f32; 3],
    seed: u64,
    custom: Option<&[u8]>,
) -> io::Result<[Vec<usize>; 3]> {
    let n = mols.len();

    if targets.len() != n {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            format!(
                "Molecule and target counts differ: {n} vs {}",
                targets.len()
            ),
        ));
    }

    let sum: f32 = fractions.iter().sum();
    if (sum - 1.0).abs() > 1e-6 {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            format!("Split fractions must sum to 1; got {sum}"),
        ));
    }
    if fractions.iter().any(|&frac| frac < 0.0) {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            "Split fractions must be non-negative",
        ));
    }

    match split {
        SplitType::Consecutive => {
            let order: Vec<usize> = (0..n).collect();
            Ok(split_by_cutoffs(order, fractions))
        }
        SplitType::Random => {
            let mut order: Vec<usize> = (0..n).collect();
            let mut rng = StdRng::seed_from_u64(seed);
            order.shuffle(&mut rng);
            Ok(split_by_cutoffs(order, fractions))
        }
        SplitType::MolecularWeight => {
            let mut order: Vec<usize> = (0..n).collect();
            order.sort_by(|&a, &b| {
                mols[a]
                    .molecular_weight()
                    .total_cmp(&mols[b].molecular_weight())
            });
            Ok(split_by_cutoffs(order, fractions))
        }
        SplitType::Scaffold => Ok(scaffold_split(mols, fractions)),
        SplitType::Stratified => Ok(stratified_split(targets, fractions)),
        SplitType::Custom => {
            let labels = custom.ok_or_else(|| {
                io::Error::new(ErrorKind::InvalidData, "Custom split requires per-sample labels")
            })?;
            custom_split(labels, n)
        }
    }
}

/// First `(frac_train * n)` entries of `order` go to train, through
/// `((frac_train + frac_val) * n)` to validation, the rest to test.
fn split_by_cutoffs(order: Vec<usize>, fractions: [f32; 3]) -> [Vec<usize>; 3] {
    let n = order.len();
    let n1 = ((fractions[0] * n as f32) as usize).min(n);
    let n2 = (((fractions[0] + fractions[1]) * n as f32) as usize)
        .min(n)
        .max(n1);

    let train = order[..n1].to_vec();
    let val = order[n1..n2].to_vec();
    let test = order[n2..].to_vec();

    [train, val, test]
}

/// Molecules sharing a Bemis-Murcko scaffold stay in one partition. Groups
/// are placed largest-first into train until it is full, then validation,
/// then test, so the rarest scaffolds land in the held-out sets.
fn scaffold_split(mols: &[Molecule], fractions: [f32; 3]) -> [Vec<usize>; 3] {
    let n = mols.len();

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut by_key: HashMap<u64, usize> = HashMap::new();

    for (i, mol) in mols.iter().enumerate() {
        let g = *by_key.entry(scaffold_key(mol)).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[g].push(i);
    }

    // Stable sort keeps first-seen order among equal-sized groups.
    groups.sort_by_key(|members| Reverse(members.len()));

    let train_cutoff = fractions[0] * n as f32;
    let val_cutoff = (fractions[0] + fractions[1]) * n as f32;

    let mut train = Vec::new();
    let mut val = Vec::new();
    let mut test = Vec::new();

    for members in groups {
        if (train.len() + members.len()) as f32 > train_cutoff {
            if (train.len() + val.len() + members.len()) as f32 > val_cutoff {
                test.extend(members);
            } else {
                val.extend(members);
            }
        } else {
            train.extend(members);
        }
    }

    [train, val, test]
}

/// Sorts by target value and deals out each consecutive window of ten, so
/// every partition sees the full target range.
fn stratified_split(targets: &[f32], fractions: [f32; 3]) -> [Vec<usize>; 3] {
    let mut order: Vec<usize> = (0..targets.len()).collect();
    order.sort_by(|&a, &b| targets[a].total_cmp(&targets[b]));

    let mut train = Vec::new();
    let mut val = Vec::new();
    let mut test = Vec::new();

    for chunk in order.chunks(10) {
        let len = chunk.len();
        let n_tr = ((fractions[0] * len as f32).round() as usize).min(len);
        let n_va = ((fractions[1] * len as f32).round() as usize).min(len - n_tr);

        train.extend_from_slice(&chunk[..n_tr]);
        val.extend_from_slice(&chunk[n_tr..n_tr + n_va]);
        test.extend_from_slice(&chunk[n_tr + n_va..]);
    }

    [train, val, test]
}

fn custom_split(labels: &[u8], n: usize) -> io::Result<[Vec<usize>; 3]> {
    if labels.len() != n {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            format!(
                "Custom split labels cover {} samples; expected {n}",
                labels.len()
            ),
        ));
    }

    let mut out = [Vec::new(), Vec::new(), Vec::new()];
    for (i, &label) in labels.iter().enumerate() {
        match label {
            0 | 1 | 2 => out[label as usize].push(i),
            _ => {
                return Err(io::Error::new(
                    ErrorKind::InvalidData,
                    format!("Custom split label at index {i} is {label}; expected 0, 1, or 2"),
                ));
            }
        }
    }

    Ok(out)
}
