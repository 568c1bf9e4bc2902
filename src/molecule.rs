//! Core molecular graph types: atoms, bonds, and the molecule that owns them.
//! Hydrogen is implicit on heavy atoms unless a bracket atom pinned an explicit
//! count; valence rules fill in the rest.

use crate::element::Element;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BondType {
    Single,
    Double,
    Triple,
    Aromatic,
}

impl BondType {
    pub fn order(&self) -> f32 {
        match self {
            Self::Single => 1.0,
            Self::Double => 2.0,
            Self::Triple => 3.0,
            Self::Aromatic => 1.5,
        }
    }
}

/// Directional single-bond mark from SMILES (`/` = Up, `\` = Down), stored
/// relative to the bond's atom_0 -> atom_1 orientation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BondDir {
    Up,
    Down,
}

impl BondDir {
    pub fn flipped(&self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
        }
    }
}

/// Tetrahedral chirality mark from SMILES: `@@` is clockwise, `@` counter.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Chirality {
    Clockwise,
    Counterclockwise,
}

#[derive(Clone, Debug)]
pub struct Atom {
    pub element: Element,
    pub aromatic: bool,
    pub formal_charge: i8,
    /// Set for bracket atoms only; pins the hydrogen count, overriding valence rules.
    pub explicit_h: Option<u8>,
    pub chirality: Option<Chirality>,
}

impl Atom {
    pub fn new(element: Element) -> Self {
        Self {
            element,
            aromatic: false,
            formal_charge: 0,
            explicit_h: None,
            chirality: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Bond {
    pub atom_0: usize,
    pub atom_1: usize,
    pub bond_type: BondType,
    pub direction: Option<BondDir>,
}

pub fn build_adjacency_list(bonds: &[Bond], num_atoms: usize) -> Vec<Vec<usize>> {
    let mut result = vec![Vec::new(); num_atoms];

    for bond in bonds {
        if bond.atom_0 < num_atoms && bond.atom_1 < num_atoms {
            result[bond.atom_0].push(bond.atom_1);
            result[bond.atom_1].push(bond.atom_0);
        }
    }

    result
}

#[derive(Clone, Debug, Default)]
pub struct Molecule {
    pub atoms: Vec<Atom>,
    pub bonds: Vec<Bond>,
    pub adjacency_list: Vec<Vec<usize>>,
}

impl Molecule {
    pub fn new(atoms: Vec<Atom>, bonds: Vec<Bond>) -> Self {
        let adjacency_list = build_adjacency_list(&bonds, atoms.len());
        Self {
            atoms,
            bonds,
            adjacency_list,
        }
    }

    /// Dense connectivity matrix; 1 = bonded, 0 = not. Diagonal is 0.
    pub fn adjacency_matrix(&self) -> Vec<Vec<u8>> {
        let n = self.atoms.len();
        let mut result = vec![vec![0; n]; n];

        for bond in &self.bonds {
            result[bond.atom_0][bond.atom_1] = 1;
            result[bond.atom_1][bond.atom_0] = 1;
        }

        result
    }

    pub fn bond_between(&self, i: usize, j: usize) -> Option<&Bond> {
        self.bonds
            .iter()
            .find(|b| (b.atom_0 == i && b.atom_1 == j) || (b.atom_0 == j && b.atom_1 == i))
    }

    /// Sum of bond orders at an atom; aromatic bonds count 1.5.
    pub fn bond_order_sum(&self, i: usize) -> f32 {
        self.bonds
            .iter()
            .filter(|b| b.atom_0 == i || b.atom_1 == i)
            .map(|b| b.bond_type.order())
            .sum()
    }

    /// Hydrogens added by valence rules. Zero for bracket atoms (their count is
    /// explicit) and for hydrogen itself.
    pub fn implicit_h_count(&self, i: usize) -> usize {
        let atom = &self.atoms[i];
        if atom.explicit_h.is_some() || atom.element == Element::Hydrogen {
            return 0;
        }

        let valence = atom.element.valence_adjusted(atom.formal_charge) as f32;
        let h = (valence - self.bond_order_sum(i)).floor();

        if h > 0.0 { h as usize } else { 0 }
    }

    /// Implicit or bracket-explicit hydrogens, plus any hydrogens present as
    /// their own graph atoms.
    pub fn total_h_count(&self, i: usize) -> usize {
        let own = match self.atoms[i].explicit_h {
            Some(h) => h as usize,
            None => self.implicit_h_count(i),
        };

        let neighbors = self.adjacency_list[i]
            .iter()
            .filter(|&&j| self.atoms[j].element == Element::Hydrogen)
            .count();

        own + neighbors
    }

    /// Unpaired electrons, possible only on bracket atoms where the pinned H
    /// count leaves valence slots unfilled. E.g. `[CH3]` is a methyl radical.
    pub fn num_radical_electrons(&self, i: usize) -> usize {
        let atom = &self.atoms[i];
        let Some(h) = atom.explicit_h else {
            return 0;
        };

        let valence = atom.element.valence_adjusted(atom.formal_charge);
        let bonds = self.bond_order_sum(i).floor() as i32;

        (valence - bonds - h as i32).max(0) as usize
    }

    /// Count of heavy (non-hydrogen) neighbors.
    pub fn degree(&self, i: usize) -> usize {
        self.adjacency_list[i]
            .iter()
            .filter(|&&j| self.atoms[j].element != Element::Hydrogen)
            .count()
    }

    pub fn heavy_atom_count(&self) -> usize {
        self.atoms
            .iter()
            .filter(|a| a.element != Element::Hydrogen)
            .count()
    }

    /// Molecular weight including implicit and explicit hydrogens.
    pub fn molecular_weight(&self) -> f32 {
        let mut weight = 0.0;

        for (i, atom) in self.atoms.iter().enumerate() {
            weight += atom.element.atomic_weight();

            let h = match atom.explicit_h {
                Some(h) => h as usize,
                None => self.implicit_h_count(i),
            };
            weight += h as f32 * Element::Hydrogen.atomic_weight();
        }

        weight
    }
}
