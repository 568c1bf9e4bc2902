//! SMILES parsing and writing. The parser covers the organic subset, aromatic
//! lowercase forms, bracket atoms (isotope, chirality, explicit H, charge),
//! branches, ring closures including the `%nn` form, directional bonds, and
//! disconnected components. The writer produces valid, not canonical, SMILES.

use std::{collections::HashMap, io, io::ErrorKind, iter::Peekable, str::Chars};

use crate::{
    element::Element,
    molecule::{Atom, Bond, BondDir, BondType, Chirality, Molecule},
};

/// Open ring closure: the atom that opened it, and any bond symbol seen
/// immediately before the digit.
type RingOpen = (usize, Option<BondType>, Option<BondDir>);

#[derive(Default)]
struct ParseState {
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    prev_atom: Option<usize>,
    pending_bond: Option<BondType>,
    pending_dir: Option<BondDir>,
    branch_stack: Vec<Option<usize>>,
    ring_map: HashMap<u32, RingOpen>,
}

impl ParseState {
    fn add_atom(&mut self, atom: Atom) -> io::Result<()> {
        let new_i = self.atoms.len();
        self.atoms.push(atom);

        if let Some(prev) = self.prev_atom {
            let bond_type = match self.pending_bond.take() {
                Some(bt) => bt,
                None => implicit_bond_type(&self.atoms[prev], &self.atoms[new_i]),
            };
            let dir = self.pending_dir.take();
            self.add_bond(prev, new_i, bond_type, dir);
        } else if self.pending_bond.take().is_some() {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                "Bond with no preceding atom",
            ));
        } else {
            self.pending_dir = None;
        }

        self.prev_atom = Some(new_i);
        Ok(())
    }

    /// Stores the bond with atom_0 < atom_1, flipping any direction mark to
    /// keep it relative to the stored orientation.
    fn add_bond(&mut self, from: usize, to: usize, bond_type: BondType, dir: Option<BondDir>) {
        let (atom_0, atom_1, direction) = if from <= to {
            (from, to, dir)
        } else {
            (to, from, dir.map(|d| d.flipped()))
        };

        self.bonds.push(Bond {
            atom_0,
            atom_1,
            bond_type,
            direction,
        });
    }

    fn handle_ring(&mut self, num: u32) -> io::Result<()> {
        let Some(cur) = self.prev_atom else {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                "Ring closure with no preceding atom",
            ));
        };

        let bt = self.pending_bond.take();
        let dir = self.pending_dir.take();

        match self.ring_map.remove(&num) {
            Some((open, open_bt, open_dir)) => {
                if open == cur {
                    return Err(io::Error::new(
                        ErrorKind::InvalidData,
                        "Ring closure bonds an atom to itself",
                    ));
                }

                let bond_type = bt.or(open_bt).unwrap_or_else(|| {
                    implicit_bond_type(&self.atoms[open], &self.atoms[cur])
                });

                // A direction written at the closing digit reads cur -> open;
                // one written at the opening digit reads open -> cur.
                match (dir, open_dir) {
                    (Some(d), _) => self.add_bond(cur, open, bond_type, Some(d)),
                    (None, d) => self.add_bond(open, cur, bond_type, d),
                }
            }
            None => {
                self.ring_map.insert(num, (cur, bt, dir));
            }
        }

        Ok(())
    }
}

fn implicit_bond_type(a: &Atom, b: &Atom) -> BondType {
    if a.aromatic && b.aromatic {
        BondType::Aromatic
    } else {
        BondType::Single
    }
}

pub fn from_smiles(smiles: &str) -> io::Result<Molecule> {
    let mut state = ParseState::default();
    let mut chars = smiles.trim().chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            'C' => {
                let el = if chars.peek() == Some(&'l') {
                    chars.next();
                    Element::Chlorine
                } else {
                    Element::Carbon
                };
                state.add_atom(Atom::new(el))?;
            }
            'B' => {
                let el = if chars.peek() == Some(&'r') {
                    chars.next();
                    Element::Bromine
                } else {
                    Element::Boron
                };
                state.add_atom(Atom::new(el))?;
            }
            'N' => state.add_atom(Atom::new(Element::Nitrogen))?,
            'O' => state.add_atom(Atom::new(Element::Oxygen))?,
            'P' => state.add_atom(Atom::new(Element::Phosphorus))?,
            'S' => state.add_atom(Atom::new(Element::Sulfur))?,
            'F' => state.add_atom(Atom::new(Element::Fluorine))?,
            'I' => state.add_atom(Atom::new(Element::Iodine))?,
            'b' | 'c' | 'n' | 'o' | 'p' | 's' => {
                let el = Element::from_letter(&ch.to_ascii_uppercase().to_string())?;
                let mut atom = Atom::new(el);
                atom.aromatic = true;
                state.add_atom(atom)?;
            }
            '[' => {
                let atom = parse_bracket_atom(&mut chars)?;
                state.add_atom(atom)?;
            }
            '(' => state.branch_stack.push(state.prev_atom),
            ')' => {
                state.prev_atom = state.branch_stack.pop().ok_or_else(|| {
                    io::Error::new(ErrorKind::InvalidData, "Unmatched closing parenthesis")
                })?;
            }
            '-' => state.pending_bond = Some(BondType::Single),
            '=' => state.pending_bond = Some(BondType::Double),
            '#' => state.pending_bond = Some(BondType::Triple),
            ':' => state.pending_bond = Some(BondType::Aromatic),
            '/' => {
                state.pending_bond = Some(BondType::Single);
                state.pending_dir = Some(BondDir::Up);
            }
            '\\' => {
                state.pending_bond = Some(BondType::Single);
                state.pending_dir = Some(BondDir::Down);
            }
            '.' => {
                state.prev_atom = None;
                state.pending_bond = None;
                state.pending_dir = None;
            }
            '0'..='9' => state.handle_ring((ch as u8 - b'0') as u32)?,
            '%' => {
                let num = parse_two_digit_ring(&mut chars)?;
                state.handle_ring(num)?;
            }
            c if c.is_whitespace() => break,
            _ => {
                return Err(io::Error::new(
                    ErrorKind::InvalidData,
                    format!("Unexpected SMILES character: {ch}"),
                ));
            }
        }
    }

    if state.atoms.is_empty() {
        return Err(io::Error::new(ErrorKind::InvalidData, "Empty SMILES"));
    }
    if !state.ring_map.is_empty() {
        return Err(io::Error::new(ErrorKind::InvalidData, "Unclosed ring bond"));
    }
    if !state.branch_stack.is_empty() {
        return Err(io::Error::new(ErrorKind::InvalidData, "Unclosed branch"));
    }
    if state.pending_bond.is_some() {
        return Err(io::Error::new(ErrorKind::InvalidData, "Dangling bond"));
    }

    Ok(Molecule::new(state.atoms, state.bonds))
}

fn parse_bracket_atom(chars: &mut Peekable<Chars>) -> io::Result<Atom> {
    // Isotope prefix: parsed and discarded.
    while chars.peek().is_some_and(|c| c.is_ascii_digit()) {
        chars.next();
    }

    let Some(first) = chars.next() else {
        return Err(io::Error::new(ErrorKind::InvalidData, "Unclosed bracket atom"));
    };
    if !first.is_ascii_alphabetic() {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            format!("Expected an element symbol in bracket, found {first}"),
        ));
    }

    let aromatic = first.is_ascii_lowercase();
    let mut symbol = String::new();
    symbol.push(first.to_ascii_uppercase());

    // Two-letter symbols: the explicit-H marker is uppercase, so a lowercase
    // follower always belongs to the symbol.
    if let Some(&second) = chars.peek()
        && second.is_ascii_lowercase()
    {
        symbol.push(second);
        chars.next();
    }

    let element = Element::from_letter(&symbol)?;

    let mut chirality = None;
    if chars.peek() == Some(&'@') {
        chars.next();
        if chars.peek() == Some(&'@') {
            chars.next();
            chirality = Some(Chirality::Clockwise);
        } else {
            chirality = Some(Chirality::Counterclockwise);
        }
    }

    // Bracket atoms pin their hydrogen count; no token means zero.
    let mut explicit_h: u8 = 0;
    if chars.peek() == Some(&'H') {
        chars.next();
        explicit_h = 1;
        if let Some(&c) = chars.peek()
            && c.is_ascii_digit()
        {
            chars.next();
            explicit_h = c as u8 - b'0';
        }
    }

    let mut charge: i8 = 0;
    if let Some(&sign) = chars.peek()
        && (sign == '+' || sign == '-')
    {
        chars.next();
        let unit: i8 = if sign == '+' { 1 } else { -1 };
        charge = unit;

        while let Some(&c) = chars.peek() {
            if c == sign {
                chars.next();
                charge += unit;
            } else if c.is_ascii_digit() {
                chars.next();
                charge = unit * (c as u8 - b'0') as i8;
                break;
            } else {
                break;
            }
        }
    }

    match chars.next() {
        Some(']') => {}
        _ => {
            return Err(io::Error::new(ErrorKind::InvalidData, "Unclosed bracket atom"));
        }
    }

    Ok(Atom {
        element,
        aromatic,
        formal_charge: charge,
        explicit_h: Some(explicit_h),
        chirality,
    })
}

fn parse_two_digit_ring(chars: &mut Peekable<Chars>) -> io::Result<u32> {
    let mut num = 0;
    for _ in 0..2 {
        match chars.next() {
            Some(c) if c.is_ascii_digit() => num = num * 10 + (c as u8 - b'0') as u32,
            _ => {
                return Err(io::Error::new(
                    ErrorKind::InvalidData,
                    "Expected two digits after %",
                ));
            }
        }
    }
    Ok(num)
}

/// Quick check for whether a string is plausibly SMILES, e.g. to distinguish
/// it from a file path or a molecule name. Not a validity guarantee.
pub fn is_smiles(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }

    let mut has_atom = false;
    for ch in text.chars() {
        match ch {
            'A'..='Z' | 'a'..='z' => has_atom = true,
            '0'..='9' | '[' | ']' | '(' | ')' | '-' | '=' | '#' | ':' | '/' | '\\' | '@' | '+'
            | '%' | '.' => {}
            _ => return false,
        }
    }

    has_atom
}

pub fn to_smiles(mol: &Molecule) -> String {
    let n = mol.atoms.len();
    if n == 0 {
        return String::new();
    }

    // Non-tree bonds become ring closures, numbered in discovery order.
    let mut ring_digits = HashMap::new();
    for (i, key) in collect_ring_bonds(mol).into_iter().enumerate() {
        ring_digits.insert(key, i as u32 + 1);
    }

    let mut visited = vec![false; n];
    let mut out = String::new();
    let mut first_component = true;

    while let Some(start) = pick_start(mol, &visited) {
        if !first_component {
            out.push('.');
        }
        first_component = false;
        write_atom(mol, start, None, &mut visited, &ring_digits, &mut out);
    }

    out
}

/// Prefer starting the walk from a terminal carbon, then any terminal heavy
/// atom, then isolated atoms; ties go to the highest index.
fn pick_start(mol: &Molecule, visited: &[bool]) -> Option<usize> {
    let mut best: Option<(u8, usize)> = None;

    for (i, atom) in mol.atoms.iter().enumerate() {
        if visited[i] {
            continue;
        }

        let degree = mol.adjacency_list[i].len();
        let score = if degree == 1 && atom.element == Element::Carbon {
            3
        } else if degree == 1 {
            2
        } else if degree == 0 {
            1
        } else {
            0
        };

        match best {
            Some((s, _)) if s > score => {}
            _ => best = Some((score, i)),
        }
    }

    best.map(|(_, i)| i)
}

fn bond_key(i: usize, j: usize) -> (usize, usize) {
    (i.min(j), i.max(j))
}

fn collect_ring_bonds(mol: &Molecule) -> Vec<(usize, usize)> {
    let mut visited = vec![false; mol.atoms.len()];
    let mut result = Vec::new();

    // Mirrors the traversal order of write_atom so the two agree on which
    // bonds are tree edges.
    while let Some(start) = pick_start(mol, &visited) {
        dfs_rings(mol, start, None, &mut visited, &mut result);
    }

    result
}

fn dfs_rings(
    mol: &Molecule,
    i: usize,
    parent: Option<usize>,
    visited: &mut [bool],
    result: &mut Vec<(usize, usize)>,
) {
    visited[i] = true;

    for &j in &mol.adjacency_list[i] {
        if Some(j) == parent {
            continue;
        }
        if visited[j] {
            let key = bond_key(i, j);
            if !result.contains(&key) {
                result.push(key);
            }
        } else {
            dfs_rings(mol, j, Some(i), visited, result);
        }
    }
}

fn write_atom(
    mol: &Molecule,
    i: usize,
    parent: Option<usize>,
    visited: &mut [bool],
    ring_digits: &HashMap<(usize, usize), u32>,
    out: &mut String,
) {
    visited[i] = true;
    out.push_str(&atom_token(&mol.atoms[i]));

    // Ring-closure digits appear at both endpoints.
    for &j in &mol.adjacency_list[i] {
        if let Some(&num) = ring_digits.get(&bond_key(i, j)) {
            if let Some(bond) = mol.bond_between(i, j)
                && let Some(c) = bond_char(bond, i, &mol.atoms)
            {
                out.push(c);
            }
            push_ring_num(num, out);
        }
    }

    let children: Vec<usize> = mol.adjacency_list[i]
        .iter()
        .copied()
        .filter(|&j| Some(j) != parent && !visited[j] && !ring_digits.contains_key(&bond_key(i, j)))
        .collect();

    for (k, &j) in children.iter().enumerate() {
        if visited[j] {
            continue;
        }
        let last = k == children.len() - 1;

        if !last {
            out.push('(');
        }
        if let Some(bond) = mol.bond_between(i, j)
            && let Some(c) = bond_char(bond, i, &mol.atoms)
        {
            out.push(c);
        }
        write_atom(mol, j, Some(i), visited, ring_digits, out);
        if !last {
            out.push(')');
        }
    }
}

/// The symbol to write when traversing this bond away from atom `from`.
/// None means the bond is implied (plain single, or aromatic in context).
fn bond_char(bond: &Bond, from: usize, atoms: &[Atom]) -> Option<char> {
    let to = if bond.atom_0 == from {
        bond.atom_1
    } else {
        bond.atom_0
    };
    let both_aromatic = atoms[from].aromatic && atoms[to].aromatic;

    match bond.bond_type {
        BondType::Double => Some('='),
        BondType::Triple => Some('#'),
        BondType::Aromatic => {
            if both_aromatic {
                None
            } else {
                Some(':')
            }
        }
        BondType::Single => {
            if let Some(dir) = bond.direction {
                let d = if bond.atom_0 == from { dir } else { dir.flipped() };
                Some(match d {
                    BondDir::Up => '/',
                    BondDir::Down => '\\',
                })
            } else if both_aromatic {
                // A true single bond between aromatic atoms must be explicit,
                // e.g. the biphenyl linker.
                Some('-')
            } else {
                None
            }
        }
    }
}

/// Elements that may be written as bare lowercase aromatic symbols.
fn aromatic_organic(el: Element) -> bool {
    matches!(
        el,
        Element::Boron
            | Element::Carbon
            | Element::Nitrogen
            | Element::Oxygen
            | Element::Phosphorus
            | Element::Sulfur
    )
}

fn atom_token(atom: &Atom) -> String {
    let needs_bracket = atom.explicit_h.is_some()
        || atom.formal_charge != 0
        || atom.chirality.is_some()
        || !atom.element.organic_subset()
        || (atom.aromatic && !aromatic_organic(atom.element));

    let mut symbol = atom.element.to_letter();
    if atom.aromatic {
        symbol = symbol.to_lowercase();
    }

    if !needs_bracket {
        return symbol;
    }

    let mut out = String::from("[");
    out.push_str(&symbol);

    match atom.chirality {
        Some(Chirality::Counterclockwise) => out.push('@'),
        Some(Chirality::Clockwise) => out.push_str("@@"),
        None => {}
    }

    if let Some(h) = atom.explicit_h
        && h > 0
    {
        out.push('H');
        if h > 1 {
            out.push_str(&h.to_string());
        }
    }

    let q = atom.formal_charge;
    if q != 0 {
        out.push(if q > 0 { '+' } else { '-' });
        if q.abs() > 1 {
            out.push_str(&q.abs().to_string());
        }
    }

    out.push(']');
    out
}

fn push_ring_num(num: u32, out: &mut String) {
    if num < 10 {
        out.push_str(&num.to_string());
    } else {
        out.push('%');
        out.push_str(&format!("{num:02}"));
    }
}
