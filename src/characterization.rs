//! Structural analysis derived from connectivity alone: ring membership,
//! hybridization, conjugation, double-bond stereochemistry, and Bemis-Murcko
//! scaffolds. These feed the featurizers and the scaffold splitter.

use std::{
    collections::VecDeque,
    hash::{DefaultHasher, Hash, Hasher},
};

use crate::molecule::{Bond, BondDir, BondType, Molecule};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Hybridization {
    Sp,
    Sp2,
    Sp3,
    Sp3d,
    Sp3d2,
}

/// Stereochemistry of a double bond, assigned from directional single bonds
/// on both flanks. Bonds without two directional flanks get `None`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BondStereo {
    None,
    Z,
    E,
}

/// Per-atom and per-bond structural annotations, indexed in step with
/// `Molecule::atoms` and `Molecule::bonds`.
pub struct MolCharacterization {
    pub ring_atoms: Vec<bool>,
    pub ring_bonds: Vec<bool>,
    pub hybridizations: Vec<Hybridization>,
    pub conjugated: Vec<bool>,
    pub bond_stereo: Vec<BondStereo>,
}

impl MolCharacterization {
    pub fn new(mol: &Molecule) -> Self {
        let num_atoms = mol.atoms.len();
        let num_bonds = mol.bonds.len();

        let ring_bonds: Vec<bool> = mol.bonds.iter().map(|b| bond_in_ring(mol, b)).collect();

        let mut ring_atoms = vec![false; num_atoms];
        for (k, bond) in mol.bonds.iter().enumerate() {
            if ring_bonds[k] {
                ring_atoms[bond.atom_0] = true;
                ring_atoms[bond.atom_1] = true;
            }
        }

        let hybridizations = (0..num_atoms).map(|i| hybridization(mol, i)).collect();
        let conjugated = (0..num_bonds).map(|k| bond_conjugated(mol, k)).collect();
        let bond_stereo = (0..num_bonds).map(|k| double_bond_stereo(mol, k)).collect();

        Self {
            ring_atoms,
            ring_bonds,
            hybridizations,
            conjugated,
            bond_stereo,
        }
    }
}

/// A bond is in a ring iff its endpoints stay connected once the bond itself
/// is removed.
fn bond_in_ring(mol: &Molecule, bond: &Bond) -> bool {
    let mut seen = vec![false; mol.atoms.len()];
    let mut queue = VecDeque::new();
    seen[bond.atom_0] = true;
    queue.push_back(bond.atom_0);

    while let Some(i) = queue.pop_front() {
        for &j in &mol.adjacency_list[i] {
            if seen[j] {
                continue;
            }
            if (i == bond.atom_0 && j == bond.atom_1) || (i == bond.atom_1 && j == bond.atom_0) {
                continue;
            }
            if j == bond.atom_1 {
                return true;
            }
            seen[j] = true;
            queue.push_back(j);
        }
    }

    false
}

fn hybridization(mol: &Molecule, i: usize) -> Hybridization {
    let mut doubles = 0;
    let mut triples = 0;
    let mut aromatics = 0;

    for bond in mol.bonds.iter().filter(|b| b.atom_0 == i || b.atom_1 == i) {
        match bond.bond_type {
            BondType::Double => doubles += 1,
            BondType::Triple => triples += 1,
            BondType::Aromatic => aromatics += 1,
            BondType::Single => {}
        }
    }

    if triples > 0 || doubles >= 2 {
        Hybridization::Sp
    } else if doubles > 0 || aromatics > 0 {
        Hybridization::Sp2
    } else {
        // Hypervalent centers, e.g. PCl5 and SF6.
        match mol.degree(i) {
            d if d >= 6 => Hybridization::Sp3d2,
            5 => Hybridization::Sp3d,
            _ => Hybridization::Sp3,
        }
    }
}

fn is_multiple(bt: BondType) -> bool {
    matches!(bt, BondType::Double | BondType::Triple | BondType::Aromatic)
}

fn other_multiple_at(mol: &Molecule, atom: usize, exclude: usize) -> bool {
    mol.bonds.iter().enumerate().any(|(k, b)| {
        k != exclude && (b.atom_0 == atom || b.atom_1 == atom) && is_multiple(b.bond_type)
    })
}

/// Aromatic bonds are conjugated outright. A multiple bond is conjugated when
/// either endpoint carries another multiple bond; a single bond needs one on
/// both endpoints, as in the middle of butadiene.
fn bond_conjugated(mol: &Molecule, k: usize) -> bool {
    let bond = &mol.bonds[k];
    if bond.bond_type == BondType::Aromatic {
        return true;
    }

    let m0 = other_multiple_at(mol, bond.atom_0, k);
    let m1 = other_multiple_at(mol, bond.atom_1, k);

    if is_multiple(bond.bond_type) {
        m0 || m1
    } else {
        m0 && m1
    }
}

/// Direction of a directional single bond incident to `atom`, excluding bond
/// `exclude`. Read with `atom` first (atom -> other) when `atom_first`,
/// otherwise other -> atom.
fn flanking_dir(mol: &Molecule, atom: usize, exclude: usize, atom_first: bool) -> Option<BondDir> {
    for (k, b) in mol.bonds.iter().enumerate() {
        if k == exclude || b.bond_type != BondType::Single {
            continue;
        }
        let Some(dir) = b.direction else {
            continue;
        };

        if b.atom_0 == atom {
            return Some(if atom_first { dir } else { dir.flipped() });
        }
        if b.atom_1 == atom {
            return Some(if atom_first { dir.flipped() } else { dir });
        }
    }

    None
}

/// With the flanks oriented x->a and b->y around the double bond a=b, equal
/// slash directions mean the substituents sit on opposite sides (E).
fn double_bond_stereo(mol: &Molecule, k: usize) -> BondStereo {
    let bond = &mol.bonds[k];
    if bond.bond_type != BondType::Double {
        return BondStereo::None;
    }

    let d0 = flanking_dir(mol, bond.atom_0, k, false);
    let d1 = flanking_dir(mol, bond.atom_1, k, true);

    match (d0, d1) {
        (Some(a), Some(b)) if a == b => BondStereo::E,
        (Some(_), Some(_)) => BondStereo::Z,
        _ => BondStereo::None,
    }
}

/// Bemis-Murcko scaffold: ring systems plus the linkers between them, found
/// by iteratively pruning terminal atoms. Acyclic molecules reduce to an
/// empty scaffold.
pub fn murcko_scaffold(mol: &Molecule) -> Molecule {
    let n = mol.atoms.len();
    let mut keep = vec![true; n];

    let mut changed = true;
    while changed {
        changed = false;
        for i in 0..n {
            if !keep[i] {
                continue;
            }
            let deg = mol.adjacency_list[i].iter().filter(|&&j| keep[j]).count();
            if deg <= 1 {
                keep[i] = false;
                changed = true;
            }
        }
    }

    let mut remap = vec![usize::MAX; n];
    let mut atoms = Vec::new();
    for i in 0..n {
        if keep[i] {
            remap[i] = atoms.len();
            atoms.push(mol.atoms[i].clone());
        }
    }

    let bonds = mol
        .bonds
        .iter()
        .filter(|b| keep[b.atom_0] && keep[b.atom_1])
        .map(|b| Bond {
            atom_0: remap[b.atom_0],
            atom_1: remap[b.atom_1],
            bond_type: b.bond_type,
            direction: b.direction,
        })
        .collect();

    Molecule::new(atoms, bonds)
}

fn bond_rank(bt: BondType) -> u8 {
    match bt {
        BondType::Single => 1,
        BondType::Double => 2,
        BondType::Triple => 3,
        BondType::Aromatic => 4,
    }
}

/// Order-independent hash of a molecule's scaffold topology, for grouping
/// molecules that share a framework. Morgan-style relabeling: each round
/// folds an atom's label with its neighbors' labels and bond orders, so after
/// as many rounds as there are atoms every label reflects its full
/// environment. All acyclic molecules share the empty-scaffold key.
pub fn scaffold_key(mol: &Molecule) -> u64 {
    let scaffold = murcko_scaffold(mol);
    let n = scaffold.atoms.len();

    let mut labels: Vec<u64> = scaffold
        .atoms
        .iter()
        .map(|a| {
            let mut h = DefaultHasher::new();
            a.element.hash(&mut h);
            a.aromatic.hash(&mut h);
            h.finish()
        })
        .collect();

    for _ in 0..n {
        let mut next = Vec::with_capacity(n);
        for i in 0..n {
            let mut env: Vec<(u8, u64)> = scaffold.adjacency_list[i]
                .iter()
                .map(|&j| {
                    let rank = scaffold
                        .bond_between(i, j)
                        .map(|b| bond_rank(b.bond_type))
                        .unwrap_or(0);
                    (rank, labels[j])
                })
                .collect();
            env.sort_unstable();

            let mut h = DefaultHasher::new();
            labels[i].hash(&mut h);
            env.hash(&mut h);
            next.push(h.finish());
        }
        labels = next;
    }

    labels.sort_unstable();
    let mut h = DefaultHasher::new();
    labels.hash(&mut h);
    h.finish()
}
