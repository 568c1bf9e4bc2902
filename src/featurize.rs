//! Numeric feature vectors for atoms and bonds. Features are selected by
//! name, so a set can come straight from a config file, and each one-hot
//! block has a fixed width regardless of what it encodes for a given atom.

use std::{fmt, io, io::ErrorKind, str::FromStr};

use crate::{
    characterization::{BondStereo, Hybridization, MolCharacterization},
    element::Element,
    molecule::{BondType, Chirality, Molecule},
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AtomFeature {
    TypeOneHot,
    DegreeOneHot,
    FormalCharge,
    NumRadicalElectrons,
    HybridizationOneHot,
    IsAromatic,
    TotalNumHOneHot,
    IsChiralCenter,
    ChiralityTypeOneHot,
}

impl AtomFeature {
    /// Width of this feature's block. The element one-hot spans the
    /// featurizer's allowed list, so its width is passed in.
    pub fn width(&self, num_allowed: usize) -> usize {
        match self {
            Self::TypeOneHot => num_allowed,
            Self::DegreeOneHot => 11,
            Self::FormalCharge => 1,
            Self::NumRadicalElectrons => 1,
            Self::HybridizationOneHot => 5,
            Self::IsAromatic => 1,
            Self::TotalNumHOneHot => 5,
            Self::IsChiralCenter => 1,
            Self::ChiralityTypeOneHot => 2,
        }
    }
}

impl FromStr for AtomFeature {
    type Err = io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "atom_type_one_hot" => Ok(Self::TypeOneHot),
            "atom_degree_one_hot" => Ok(Self::DegreeOneHot),
            "atom_formal_charge" => Ok(Self::FormalCharge),
            "atom_num_radical_electrons" => Ok(Self::NumRadicalElectrons),
            "atom_hybridization_one_hot" => Ok(Self::HybridizationOneHot),
            "atom_is_aromatic" => Ok(Self::IsAromatic),
            "atom_total_num_H_one_hot" => Ok(Self::TotalNumHOneHot),
            "atom_is_chiral_center" => Ok(Self::IsChiralCenter),
            "atom_chirality_type_one_hot" => Ok(Self::ChiralityTypeOneHot),
            _ => Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("Unknown atom feature: {s}"),
            )),
        }
    }
}

impl fmt::Display for AtomFeature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::TypeOneHot => "atom_type_one_hot",
            Self::DegreeOneHot => "atom_degree_one_hot",
            Self::FormalCharge => "atom_formal_charge",
            Self::NumRadicalElectrons => "atom_num_radical_electrons",
            Self::HybridizationOneHot => "atom_hybridization_one_hot",
            Self::IsAromatic => "atom_is_aromatic",
            Self::TotalNumHOneHot => "atom_total_num_H_one_hot",
            Self::IsChiralCenter => "atom_is_chiral_center",
            Self::ChiralityTypeOneHot => "atom_chirality_type_one_hot",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BondFeature {
    TypeOneHot,
    IsConjugated,
    IsInRing,
    StereoOneHot,
}

impl BondFeature {
    pub fn width(&self) -> usize {
        match self {
            Self::TypeOneHot => 4,
            Self::IsConjugated => 1,
            Self::IsInRing => 1,
            Self::StereoOneHot => 6,
        }
    }
}

impl FromStr for BondFeature {
    type Err = io::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bond_type_one_hot" => Ok(Self::TypeOneHot),
            "bond_is_conjugated" => Ok(Self::IsConjugated),
            "bond_is_in_ring" => Ok(Self::IsInRing),
            "bond_stereo_one_hot" => Ok(Self::StereoOneHot),
            _ => Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("Unknown bond feature: {s}"),
            )),
        }
    }
}

impl fmt::Display for BondFeature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::TypeOneHot => "bond_type_one_hot",
            Self::IsConjugated => "bond_is_conjugated",
            Self::IsInRing => "bond_is_in_ring",
            Self::StereoOneHot => "bond_stereo_one_hot",
        };
        write!(f, "{name}")
    }
}

/// Appends a zero block of `width` entries, setting position `hit` to 1 when
/// it falls inside the block. Out-of-range values encode as all zeros.
fn push_one_hot(out: &mut Vec<f32>, width: usize, hit: Option<usize>) {
    let start = out.len();
    out.resize(start + width, 0.0);
    if let Some(i) = hit
        && i < width
    {
        out[start + i] = 1.0;
    }
}

#[derive(Clone, Debug)]
pub struct AtomFeaturizer {
    pub features: Vec<AtomFeature>,
    /// Elements spanned by the type one-hot, in block order.
    pub allowed: Vec<Element>,
}

impl Default for AtomFeaturizer {
    fn default() -> Self {
        Self {
            features: vec![
                AtomFeature::TypeOneHot,
                AtomFeature::DegreeOneHot,
                AtomFeature::FormalCharge,
                AtomFeature::NumRadicalElectrons,
                AtomFeature::HybridizationOneHot,
                AtomFeature::IsAromatic,
                AtomFeature::TotalNumHOneHot,
                AtomFeature::IsChiralCenter,
                AtomFeature::ChiralityTypeOneHot,
            ],
            allowed: Element::DEFAULT_ALLOWED.to_vec(),
        }
    }
}

impl AtomFeaturizer {
    pub fn dim(&self) -> usize {
        self.features
            .iter()
            .map(|f| f.width(self.allowed.len()))
            .sum()
    }

    pub fn featurize(&self, mol: &Molecule, character: &MolCharacterization, i: usize) -> Vec<f32> {
        let atom = &mol.atoms[i];
        let mut out = Vec::with_capacity(self.dim());

        for feature in &self.features {
            match feature {
                AtomFeature::TypeOneHot => {
                    let hit = self.allowed.iter().position(|&el| el == atom.element);
                    push_one_hot(&mut out, self.allowed.len(), hit);
                }
                AtomFeature::DegreeOneHot => {
                    push_one_hot(&mut out, 11, Some(mol.degree(i)));
                }
                AtomFeature::FormalCharge => out.push(atom.formal_charge as f32),
                AtomFeature::NumRadicalElectrons => {
                    out.push(mol.num_radical_electrons(i) as f32);
                }
                AtomFeature::HybridizationOneHot => {
                    let hit = match character.hybridizations[i] {
                        Hybridization::Sp => 0,
                        Hybridization::Sp2 => 1,
                        Hybridization::Sp3 => 2,
                        Hybridization::Sp3d => 3,
                        Hybridization::Sp3d2 => 4,
                    };
                    push_one_hot(&mut out, 5, Some(hit));
                }
                AtomFeature::IsAromatic => out.push(if atom.aromatic { 1.0 } else { 0.0 }),
                AtomFeature::TotalNumHOneHot => {
                    push_one_hot(&mut out, 5, Some(mol.total_h_count(i)));
                }
                AtomFeature::IsChiralCenter => {
                    out.push(if atom.chirality.is_some() { 1.0 } else { 0.0 });
                }
                AtomFeature::ChiralityTypeOneHot => {
                    let hit = atom.chirality.map(|c| match c {
                        Chirality::Clockwise => 0,
                        Chirality::Counterclockwise => 1,
                    });
                    push_one_hot(&mut out, 2, hit);
                }
            }
        }

        out
    }
}

#[derive(Clone, Debug)]
pub struct BondFeaturizer {
    pub features: Vec<BondFeature>,
}

impl Default for BondFeaturizer {
    fn default() -> Self {
        Self {
            features: vec![
                BondFeature::TypeOneHot,
                BondFeature::IsConjugated,
                BondFeature::IsInRing,
                BondFeature::StereoOneHot,
            ],
        }
    }
}

impl BondFeaturizer {
    pub fn dim(&self) -> usize {
        self.features.iter().map(|f| f.width()).sum()
    }

    pub fn featurize(&self, mol: &Molecule, character: &MolCharacterization, k: usize) -> Vec<f32> {
        let bond = &mol.bonds[k];
        let mut out = Vec::with_capacity(self.dim());

        for feature in &self.features {
            match feature {
                BondFeature::TypeOneHot => {
                    let hit = match bond.bond_type {
                        BondType::Single => 0,
                        BondType::Double => 1,
                        BondType::Triple => 2,
                        BondType::Aromatic => 3,
                    };
                    push_one_hot(&mut out, 4, Some(hit));
                }
                BondFeature::IsConjugated => {
                    out.push(if character.conjugated[k] { 1.0 } else { 0.0 });
                }
                BondFeature::IsInRing => {
                    out.push(if character.ring_bonds[k] { 1.0 } else { 0.0 });
                }
                // Six slots so cis/trans and unspecified-any stay addressable;
                // assignment from directional bonds fills none, Z, and E.
                BondFeature::StereoOneHot => {
                    let hit = match character.bond_stereo[k] {
                        BondStereo::None => 0,
                        BondStereo::Z => 2,
                        BondStereo::E => 3,
                    };
                    push_one_hot(&mut out, 6, Some(hit));
                }
            }
        }

        out
    }
}
