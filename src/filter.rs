//! Dataset cleaning ahead of graph construction. Entries are dropped, never
//! repaired: an unparseable SMILES, a molecule with fewer than two heavy
//! atoms, or one containing an element outside the allowed set all take their
//! target value with them. Order is preserved for the survivors.

use std::{io, io::ErrorKind};

use crate::{element::Element, smiles::from_smiles};

/// Indices into `smiles` of the entries that survive filtering. Hydrogen is
/// exempt from the allowed-set check since it appears in most molecules
/// implicitly anyway.
pub(crate) fn filter_smiles_indexed(
    smiles: &[String],
    targets: &[f32],
    allowed: &[Element],
    log: bool,
) -> io::Result<Vec<usize>> {
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

    let mut kept = Vec::with_capacity(smiles.len());

    for (i, smi) in smiles.iter().enumerate() {
        let mol = match from_smiles(smi) {
            Ok(m) => m,
            Err(e) => {
                if log {
                    println!("Skipping SMILES at index {i} ({smi}): parse failed: {e}");
                }
                continue;
            }
        };

        if mol.heavy_atom_count() < 2 {
            if log {
                println!("Skipping SMILES at index {i} ({smi}): fewer than two heavy atoms");
            }
            continue;
        }

        if let Some(atom) = mol
            .atoms
            .iter()
            .find(|a| a.element != Element::Hydrogen && !allowed.contains(&a.element))
        {
            if log {
                println!(
                    "Skipping SMILES at index {i} ({smi}): atom {} not in the allowed set",
                    atom.element.to_letter()
                );
            }
            continue;
        }

        kept.push(i);
    }

    Ok(kept)
}

/// Filters a SMILES list and its aligned targets down to the valid entries.
pub fn filter_smiles(
    smiles: &[String],
    targets: &[f32],
    allowed: &[Element],
    log: bool,
) -> io::Result<(Vec<String>, Vec<f32>)> {
    let kept = filter_smiles_indexed(smiles, targets, allowed, log)?;

    let smiles_out = kept.iter().map(|&i| smiles[i].clone()).collect();
    let targets_out = kept.iter().map(|&i| targets[i]).collect();

    Ok((smiles_out, targets_out))
}
