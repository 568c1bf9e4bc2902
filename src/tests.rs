use std::{fs, path::Path, str::FromStr};

use burn::{
    data::dataloader::batcher::Batcher,
    tensor::{Tensor, TensorData},
};

use crate::{
    characterization::{
        BondStereo, Hybridization, MolCharacterization, murcko_scaffold, scaffold_key,
    },
    dataset::{
        DataSet, DatasetOptions, MolGraph, TargetScaler, construct_dataset, load_smiles_csv,
        make_graph_dataset,
    },
    element::Element,
    ensemble::{CpEnsemble, cp_from_terms, validate_globals},
    eval::{Metric, RegressionMetrics, pred_metric, test_model},
    featurize::{AtomFeature, AtomFeaturizer, BondFeature, BondFeaturizer},
    filter::filter_smiles,
    gnn::{GraphBatch, GraphBatcher, Model, ModelConfig},
    infer::Predictor,
    molecule::{BondType, Chirality, Molecule},
    smiles::{from_smiles, is_smiles, to_smiles},
    split::{SplitType, split_indices},
    train::{TrainBackend, TrainConfig, ValidBackend, model_paths, save_model, train_model},
};

fn parse_all(smiles: &[&str]) -> Vec<Molecule> {
    smiles.iter().map(|s| from_smiles(s).unwrap()).collect()
}

fn graphs_for(smiles: &[&str], targets: &[f32]) -> Vec<MolGraph> {
    let smiles: Vec<String> = smiles.iter().map(|s| s.to_string()).collect();
    construct_dataset(
        &smiles,
        targets,
        None,
        &AtomFeaturizer::default(),
        &BondFeaturizer::default(),
    )
    .unwrap()
}

#[test]
fn test_parse_linear() {
    let mol = from_smiles("CCO").unwrap();

    assert_eq!(mol.atoms.len(), 3);
    assert_eq!(mol.bonds.len(), 2);
    assert_eq!(mol.atoms[0].element, Element::Carbon);
    assert_eq!(mol.atoms[1].element, Element::Carbon);
    assert_eq!(mol.atoms[2].element, Element::Oxygen);
    assert!(mol.bonds.iter().all(|b| b.bond_type == BondType::Single));

    assert_eq!(mol.implicit_h_count(0), 3);
    assert_eq!(mol.implicit_h_count(1), 2);
    assert_eq!(mol.implicit_h_count(2), 1);
}

#[test]
fn test_parse_benzene() {
    let mol = from_smiles("c1ccccc1").unwrap();

    assert_eq!(mol.atoms.len(), 6);
    assert_eq!(mol.bonds.len(), 6);
    assert!(mol.atoms.iter().all(|a| a.aromatic));
    assert!(mol.bonds.iter().all(|b| b.bond_type == BondType::Aromatic));

    for i in 0..6 {
        assert_eq!(mol.total_h_count(i), 1);
    }
}

#[test]
fn test_parse_branches() {
    let mol = from_smiles("CC(C)(C)C").unwrap();

    assert_eq!(mol.atoms.len(), 5);
    assert_eq!(mol.bonds.len(), 4);
    assert_eq!(mol.degree(1), 4);
    assert_eq!(mol.degree(0), 1);
    assert_eq!(mol.implicit_h_count(1), 0);
}

#[test]
fn test_parse_multiple_bonds() {
    let mol = from_smiles("C=C").unwrap();
    assert_eq!(mol.bonds[0].bond_type, BondType::Double);
    assert_eq!(mol.implicit_h_count(0), 2);

    let mol = from_smiles("C#N").unwrap();
    assert_eq!(mol.bonds[0].bond_type, BondType::Triple);
    assert_eq!(mol.implicit_h_count(0), 1);
    assert_eq!(mol.implicit_h_count(1), 0);
}

#[test]
fn test_parse_bracket_atoms() {
    let mol = from_smiles("[NH4+]").unwrap();
    assert_eq!(mol.atoms.len(), 1);
    assert_eq!(mol.atoms[0].formal_charge, 1);
    assert_eq!(mol.atoms[0].explicit_h, Some(4));
    assert_eq!(mol.total_h_count(0), 4);

    let mol = from_smiles("[O-]").unwrap();
    assert_eq!(mol.atoms[0].formal_charge, -1);
    assert_eq!(mol.atoms[0].explicit_h, Some(0));

    let mol = from_smiles("[Cu+2]").unwrap();
    assert_eq!(mol.atoms[0].element, Element::Copper);
    assert_eq!(mol.atoms[0].formal_charge, 2);

    // Isotope labels parse but are not retained.
    let mol = from_smiles("[13CH4]").unwrap();
    assert_eq!(mol.atoms[0].element, Element::Carbon);
    assert_eq!(mol.atoms[0].explicit_h, Some(4));
}

#[test]
fn test_parse_chirality() {
    let mol = from_smiles("N[C@@H](C)C(=O)O").unwrap();
    assert_eq!(mol.atoms[1].chirality, Some(Chirality::Clockwise));
    assert_eq!(mol.atoms[1].explicit_h, Some(1));

    let mol = from_smiles("[C@H](N)(C)O").unwrap();
    assert_eq!(mol.atoms[0].chirality, Some(Chirality::Counterclockwise));
}

#[test]
fn test_parse_rings() {
    let mol = from_smiles("C1CCCCC1").unwrap();
    assert_eq!(mol.atoms.len(), 6);
    assert_eq!(mol.bonds.len(), 6);
    assert!(mol.bond_between(0, 5).is_some());

    let mol = from_smiles("C%12CCC%12").unwrap();
    assert_eq!(mol.atoms.len(), 4);
    assert_eq!(mol.bonds.len(), 4);
    assert!(mol.bond_between(0, 3).is_some());

    let mol = from_smiles("c1ccc2ccccc2c1").unwrap();
    assert_eq!(mol.atoms.len(), 10);
    assert_eq!(mol.bonds.len(), 11);
}

#[test]
fn test_parse_components() {
    let mol = from_smiles("[Na+].[Cl-]").unwrap();

    assert_eq!(mol.atoms.len(), 2);
    assert!(mol.bonds.is_empty());
    assert_eq!(mol.atoms[0].element, Element::Sodium);
    assert_eq!(mol.atoms[0].formal_charge, 1);
    assert_eq!(mol.atoms[1].formal_charge, -1);
}

#[test]
fn test_parse_two_letter_symbols() {
    let mol = from_smiles("ClCBr").unwrap();
    assert_eq!(mol.atoms[0].element, Element::Chlorine);
    assert_eq!(mol.atoms[2].element, Element::Bromine);

    let mol = from_smiles("C[Si](C)C").unwrap();
    assert_eq!(mol.atoms[1].element, Element::Silicon);
}

#[test]
fn test_parse_errors() {
    for bad in ["", "C1CC", "C(C", "C=", "C^C", "[CH4", "=C", "CC)C"] {
        assert!(from_smiles(bad).is_err(), "{bad:?} should fail to parse");
    }
}

#[test]
fn test_is_smiles() {
    assert!(is_smiles("CCO"));
    assert!(is_smiles("C1=CC=CC=C1"));
    assert!(is_smiles("[nH]1cccc1"));

    assert!(!is_smiles(""));
    assert!(!is_smiles("mol file.sdf"));
    assert!(!is_smiles("12345"));
}

#[test]
fn test_write_simple() {
    assert_eq!(to_smiles(&from_smiles("CCO").unwrap()), "CCO");
    assert_eq!(to_smiles(&from_smiles("OCC").unwrap()), "CCO");
    assert_eq!(to_smiles(&from_smiles("[NH4+]").unwrap()), "[NH4+]");
}

#[test]
fn test_write_roundtrip() {
    let cases = [
        "CCO",
        "c1ccccc1",
        "CC(=O)O",
        "C1CCCCC1",
        "CC(C)(C)C",
        "C#N",
        "O=C=O",
        "[Na+].[Cl-]",
        "N[C@@H](C)C(=O)O",
        "c1ccc2ccccc2c1",
    ];

    for smi in cases {
        let mol = from_smiles(smi).unwrap();
        let written = to_smiles(&mol);
        let reparsed =
            from_smiles(&written).unwrap_or_else(|e| panic!("{smi} -> {written}: {e}"));

        assert_eq!(reparsed.atoms.len(), mol.atoms.len(), "{smi} -> {written}");
        assert_eq!(reparsed.bonds.len(), mol.bonds.len(), "{smi} -> {written}");

        let mut els_a: Vec<String> = mol.atoms.iter().map(|a| a.element.to_letter()).collect();
        let mut els_b: Vec<String> = reparsed
            .atoms
            .iter()
            .map(|a| a.element.to_letter())
            .collect();
        els_a.sort();
        els_b.sort();
        assert_eq!(els_a, els_b, "{smi} -> {written}");

        let mut ord_a: Vec<u32> = mol
            .bonds
            .iter()
            .map(|b| (b.bond_type.order() * 10.0) as u32)
            .collect();
        let mut ord_b: Vec<u32> = reparsed
            .bonds
            .iter()
            .map(|b| (b.bond_type.order() * 10.0) as u32)
            .collect();
        ord_a.sort();
        ord_b.sort();
        assert_eq!(ord_a, ord_b, "{smi} -> {written}");

        let arom_a = mol.atoms.iter().filter(|a| a.aromatic).count();
        let arom_b = reparsed.atoms.iter().filter(|a| a.aromatic).count();
        assert_eq!(arom_a, arom_b, "{smi} -> {written}");

        let h_a: usize = (0..mol.atoms.len()).map(|i| mol.total_h_count(i)).sum();
        let h_b: usize = (0..reparsed.atoms.len())
            .map(|i| reparsed.total_h_count(i))
            .sum();
        assert_eq!(h_a, h_b, "{smi} -> {written}");
    }
}

#[test]
fn test_write_directional_stereo() {
    for (smi, want) in [("F/C=C/F", BondStereo::E), ("F/C=C\\F", BondStereo::Z)] {
        let mol = from_smiles(smi).unwrap();
        let character = MolCharacterization::new(&mol);
        let di = mol
            .bonds
            .iter()
            .position(|b| b.bond_type == BondType::Double)
            .unwrap();
        assert_eq!(character.bond_stereo[di], want, "{smi}");

        // The written form must carry the same stereochemistry.
        let written = to_smiles(&mol);
        let reparsed = from_smiles(&written).unwrap();
        let character = MolCharacterization::new(&reparsed);
        let dj = reparsed
            .bonds
            .iter()
            .position(|b| b.bond_type == BondType::Double)
            .unwrap();
        assert_eq!(character.bond_stereo[dj], want, "{smi} -> {written}");
    }

    let mol = from_smiles("FC=CF").unwrap();
    let character = MolCharacterization::new(&mol);
    let di = mol
        .bonds
        .iter()
        .position(|b| b.bond_type == BondType::Double)
        .unwrap();
    assert_eq!(character.bond_stereo[di], BondStereo::None);
}

#[test]
fn test_ring_flags() {
    let mol = from_smiles("Cc1ccccc1").unwrap();
    let character = MolCharacterization::new(&mol);

    assert!(!character.ring_atoms[0]);
    assert!((1..7).all(|i| character.ring_atoms[i]));
    assert!(!character.ring_bonds[0]);
    assert_eq!(character.ring_bonds.iter().filter(|&&r| r).count(), 6);

    let mol = from_smiles("CCO").unwrap();
    let character = MolCharacterization::new(&mol);
    assert!(character.ring_atoms.iter().all(|&r| !r));
    assert!(character.ring_bonds.iter().all(|&r| !r));
}

#[test]
fn test_hybridization() {
    let mol = from_smiles("CCO").unwrap();
    let character = MolCharacterization::new(&mol);
    assert!(
        character
            .hybridizations
            .iter()
            .all(|&h| h == Hybridization::Sp3)
    );

    let mol = from_smiles("C=CC#N").unwrap();
    let character = MolCharacterization::new(&mol);
    assert_eq!(character.hybridizations[0], Hybridization::Sp2);
    assert_eq!(character.hybridizations[1], Hybridization::Sp2);
    assert_eq!(character.hybridizations[2], Hybridization::Sp);
    assert_eq!(character.hybridizations[3], Hybridization::Sp);

    let mol = from_smiles("c1ccccc1").unwrap();
    let character = MolCharacterization::new(&mol);
    assert!(
        character
            .hybridizations
            .iter()
            .all(|&h| h == Hybridization::Sp2)
    );

    let mol = from_smiles("FS(F)(F)(F)(F)F").unwrap();
    let character = MolCharacterization::new(&mol);
    assert_eq!(character.hybridizations[1], Hybridization::Sp3d2);

    let mol = from_smiles("FP(F)(F)(F)F").unwrap();
    let character = MolCharacterization::new(&mol);
    assert_eq!(character.hybridizations[1], Hybridization::Sp3d);
}

#[test]
fn test_conjugation() {
    let mol = from_smiles("C=CC=C").unwrap();
    let character = MolCharacterization::new(&mol);
    let mid = mol
        .bonds
        .iter()
        .position(|b| b.bond_type == BondType::Single)
        .unwrap();
    assert!(character.conjugated[mid]);

    let mol = from_smiles("CCCC").unwrap();
    let character = MolCharacterization::new(&mol);
    assert!(character.conjugated.iter().all(|&c| !c));

    let mol = from_smiles("c1ccccc1").unwrap();
    let character = MolCharacterization::new(&mol);
    assert!(character.conjugated.iter().all(|&c| c));
}

#[test]
fn test_scaffolds() {
    let toluene = from_smiles("Cc1ccccc1").unwrap();
    let scaffold = murcko_scaffold(&toluene);
    assert_eq!(scaffold.atoms.len(), 6);
    assert_eq!(scaffold.bonds.len(), 6);
    assert!(scaffold.atoms.iter().all(|a| a.aromatic));

    // Side chains do not change the scaffold.
    assert_eq!(
        scaffold_key(&toluene),
        scaffold_key(&from_smiles("CCc1ccccc1").unwrap())
    );

    assert_ne!(
        scaffold_key(&from_smiles("c1ccccc1").unwrap()),
        scaffold_key(&from_smiles("C1CCCCC1").unwrap())
    );

    // Acyclic molecules all share the empty scaffold.
    assert_eq!(murcko_scaffold(&from_smiles("CCO").unwrap()).atoms.len(), 0);
    assert_eq!(
        scaffold_key(&from_smiles("CCO").unwrap()),
        scaffold_key(&from_smiles("CCCC").unwrap())
    );

    // Ring systems joined by a linker are kept whole.
    let biphenyl = from_smiles("c1ccccc1-c1ccccc1").unwrap();
    let scaffold = murcko_scaffold(&biphenyl);
    assert_eq!(scaffold.atoms.len(), 12);
    assert_eq!(scaffold.bonds.len(), 13);
}

#[test]
fn test_feature_dims() {
    assert_eq!(AtomFeaturizer::default().dim(), 42);
    assert_eq!(BondFeaturizer::default().dim(), 12);

    let small = AtomFeaturizer {
        features: vec![AtomFeature::TypeOneHot, AtomFeature::IsAromatic],
        allowed: vec![Element::Carbon, Element::Nitrogen, Element::Oxygen],
    };
    assert_eq!(small.dim(), 4);
}

#[test]
fn test_atom_feature_values() {
    let mol = from_smiles("CCO").unwrap();
    let character = MolCharacterization::new(&mol);
    let fz = AtomFeaturizer::default();

    // Block layout: type 15, degree 11, charge 1, radicals 1, hybridization 5,
    // aromatic 1, total H 5, chiral center 1, chirality type 2.
    let f0 = fz.featurize(&mol, &character, 0);
    assert_eq!(f0.len(), 42);
    assert_eq!(f0[1], 1.0, "carbon is second in the default allow-list");
    assert_eq!(f0[..15].iter().sum::<f32>(), 1.0);
    assert_eq!(f0[15 + 1], 1.0, "degree 1");
    assert_eq!(f0[26], 0.0, "no formal charge");
    assert_eq!(f0[28 + 2], 1.0, "Sp3");
    assert_eq!(f0[33], 0.0, "not aromatic");
    assert_eq!(f0[34 + 3], 1.0, "three hydrogens");
    assert_eq!(f0[39], 0.0, "not a chiral center");
    assert_eq!(f0[40..].iter().sum::<f32>(), 0.0, "no chirality slot set");

    let mol = from_smiles("N[C@@H](C)C(=O)O").unwrap();
    let character = MolCharacterization::new(&mol);
    let f = fz.featurize(&mol, &character, 1);
    assert_eq!(f[39], 1.0, "chiral center");
    assert_eq!(f[40], 1.0, "clockwise slot");
    assert_eq!(f[41], 0.0);

    let mol = from_smiles("[NH4+]").unwrap();
    let character = MolCharacterization::new(&mol);
    let f = fz.featurize(&mol, &character, 0);
    assert_eq!(f[2], 1.0, "nitrogen slot");
    assert_eq!(f[15], 1.0, "degree 0");
    assert_eq!(f[26], 1.0, "formal charge +1");
    assert_eq!(f[34 + 4], 1.0, "four hydrogens");

    let mol = from_smiles("c1ccccc1").unwrap();
    let character = MolCharacterization::new(&mol);
    let f = fz.featurize(&mol, &character, 0);
    assert_eq!(f[33], 1.0, "aromatic");
}

#[test]
fn test_bond_feature_values() {
    let fz = BondFeaturizer::default();

    // Block layout: type 4, conjugated 1, ring 1, stereo 6.
    let mol = from_smiles("C=C").unwrap();
    let character = MolCharacterization::new(&mol);
    let f = fz.featurize(&mol, &character, 0);
    assert_eq!(f.len(), 12);
    assert_eq!(f[1], 1.0, "double bond");
    assert_eq!(f[4], 0.0, "isolated double bond is not conjugated");
    assert_eq!(f[5], 0.0, "not in a ring");
    assert_eq!(f[6], 1.0, "no stereo assignment");

    let mol = from_smiles("c1ccccc1").unwrap();
    let character = MolCharacterization::new(&mol);
    let f = fz.featurize(&mol, &character, 0);
    assert_eq!(f[3], 1.0, "aromatic bond");
    assert_eq!(f[4], 1.0);
    assert_eq!(f[5], 1.0);

    let mol = from_smiles("F/C=C/F").unwrap();
    let character = MolCharacterization::new(&mol);
    let di = mol
        .bonds
        .iter()
        .position(|b| b.bond_type == BondType::Double)
        .unwrap();
    let f = fz.featurize(&mol, &character, di);
    assert_eq!(f[6 + 3], 1.0, "E slot");
}

#[test]
fn test_feature_names() {
    for feat in [
        AtomFeature::TypeOneHot,
        AtomFeature::TotalNumHOneHot,
        AtomFeature::ChiralityTypeOneHot,
    ] {
        assert_eq!(AtomFeature::from_str(&feat.to_string()).unwrap(), feat);
    }
    assert!(AtomFeature::from_str("atom_mass").is_err());

    for feat in [BondFeature::TypeOneHot, BondFeature::StereoOneHot] {
        assert_eq!(BondFeature::from_str(&feat.to_string()).unwrap(), feat);
    }
    assert!(BondFeature::from_str("bond_length").is_err());
}

#[test]
fn test_filter() {
    let smiles: Vec<String> = ["CCO", "C", "xyz123", "[Na+].[Cl-]", "CCF"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let targets = [1.0, 2.0, 3.0, 4.0, 5.0];

    let (kept, kept_targets) =
        filter_smiles(&smiles, &targets, &Element::DEFAULT_ALLOWED, false).unwrap();

    assert_eq!(kept, vec!["CCO".to_string(), "CCF".to_string()]);
    assert_eq!(kept_targets, vec![1.0, 5.0]);

    assert!(filter_smiles(&smiles, &targets[..3], &Element::DEFAULT_ALLOWED, false).is_err());
}

#[test]
fn test_filter_hydrogen_exempt() {
    // Explicit hydrogens are outside the allow-list but never grounds for
    // rejection.
    let smiles = vec!["[H]OC".to_string()];
    let targets = [1.0];

    let (kept, _) = filter_smiles(&smiles, &targets, &Element::DEFAULT_ALLOWED, false).unwrap();
    assert_eq!(kept.len(), 1);
}

#[test]
fn test_split_consecutive() {
    let mols = parse_all(&["C"; 10]);
    let targets: Vec<f32> = (0..10).map(|i| i as f32).collect();

    let [train, val, test] = split_indices(
        SplitType::Consecutive,
        &mols,
        &targets,
        [0.8, 0.1, 0.1],
        0,
        None,
    )
    .unwrap();

    assert_eq!(train, (0..8).collect::<Vec<_>>());
    assert_eq!(val, vec![8]);
    assert_eq!(test, vec![9]);
}

#[test]
fn test_split_random() {
    let mols = parse_all(&["C"; 10]);
    let targets = [0.0; 10];

    let [tr1, va1, te1] = split_indices(
        SplitType::Random,
        &mols,
        &targets,
        [0.8, 0.1, 0.1],
        7,
        None,
    )
    .unwrap();
    let [tr2, va2, te2] = split_indices(
        SplitType::Random,
        &mols,
        &targets,
        [0.8, 0.1, 0.1],
        7,
        None,
    )
    .unwrap();

    assert_eq!(tr1, tr2);
    assert_eq!(va1, va2);
    assert_eq!(te1, te2);

    assert_eq!(tr1.len(), 8);
    assert_eq!(va1.len(), 1);
    assert_eq!(te1.len(), 1);

    let mut all: Vec<usize> = tr1.iter().chain(&va1).chain(&te1).copied().collect();
    all.sort();
    assert_eq!(all, (0..10).collect::<Vec<_>>());
}

#[test]
fn test_split_errors() {
    let mols = parse_all(&["C"; 10]);
    let targets = [0.0; 10];

    // Fractions must sum to one and be non-negative.
    assert!(
        split_indices(
            SplitType::Random,
            &mols,
            &targets,
            [0.5, 0.2, 0.2],
            0,
            None
        )
        .is_err()
    );
    assert!(
        split_indices(
            SplitType::Random,
            &mols,
            &targets,
            [-0.1, 0.55, 0.55],
            0,
            None
        )
        .is_err()
    );
    assert!(
        split_indices(
            SplitType::Random,
            &mols,
            &targets[..5],
            [0.8, 0.1, 0.1],
            0,
            None
        )
        .is_err()
    );
    assert!(
        split_indices(
            SplitType::Custom,
            &mols,
            &targets,
            [0.8, 0.1, 0.1],
            0,
            None
        )
        .is_err()
    );
}

#[test]
fn test_split_molecular_weight() {
    let mols = parse_all(&["CCCC", "C", "CCC", "CC"]);
    let targets = [0.0; 4];

    let [train, val, test] = split_indices(
        SplitType::MolecularWeight,
        &mols,
        &targets,
        [0.5, 0.25, 0.25],
        0,
        None,
    )
    .unwrap();

    assert_eq!(train, vec![1, 3]);
    assert_eq!(val, vec![2]);
    assert_eq!(test, vec![0]);
}

#[test]
fn test_split_scaffold() {
    let mols = parse_all(&[
        "Cc1ccccc1",
        "CCc1ccccc1",
        "CC1CCCCC1",
        "CCC1CCCCC1",
        "CCO",
        "CCCO",
    ]);
    let targets = [0.0; 6];

    let [train, val, test] = split_indices(
        SplitType::Scaffold,
        &mols,
        &targets,
        [0.5, 0.25, 0.25],
        0,
        None,
    )
    .unwrap();

    // Three scaffold groups of two, placed in first-seen order.
    assert_eq!(train, vec![0, 1]);
    assert_eq!(val, vec![2, 3]);
    assert_eq!(test, vec![4, 5]);
}

#[test]
fn test_split_stratified() {
    let mols = parse_all(&["C"; 20]);
    let targets: Vec<f32> = (0..20).map(|i| i as f32).collect();

    let [train, val, test] = split_indices(
        SplitType::Stratified,
        &mols,
        &targets,
        [0.5, 0.25, 0.25],
        0,
        None,
    )
    .unwrap();

    // Each window of ten sorted targets is dealt 5/3/2.
    assert_eq!(train, vec![0, 1, 2, 3, 4, 10, 11, 12, 13, 14]);
    assert_eq!(val, vec![5, 6, 7, 15, 16, 17]);
    assert_eq!(test, vec![8, 9, 18, 19]);
}

#[test]
fn test_split_custom() {
    let mols = parse_all(&["C"; 5]);
    let targets = [0.0; 5];
    let labels = [0u8, 1, 0, 2, 0];

    let [train, val, test] = split_indices(
        SplitType::Custom,
        &mols,
        &targets,
        [0.8, 0.1, 0.1],
        0,
        Some(&labels),
    )
    .unwrap();

    assert_eq!(train, vec![0, 2, 4]);
    assert_eq!(val, vec![1]);
    assert_eq!(test, vec![3]);

    let bad = [0u8, 3, 0, 0, 0];
    assert!(
        split_indices(
            SplitType::Custom,
            &mols,
            &targets,
            [0.8, 0.1, 0.1],
            0,
            Some(&bad)
        )
        .is_err()
    );
    assert!(
        split_indices(
            SplitType::Custom,
            &mols,
            &targets,
            [0.8, 0.1, 0.1],
            0,
            Some(&labels[..3])
        )
        .is_err()
    );
}

#[test]
fn test_split_type_names() {
    for s in [
        SplitType::Consecutive,
        SplitType::Random,
        SplitType::MolecularWeight,
        SplitType::Scaffold,
        SplitType::Stratified,
        SplitType::Custom,
    ] {
        assert_eq!(SplitType::from_str(&s.to_string()).unwrap(), s);
    }
    assert!(SplitType::from_str("butina").is_err());
}

#[test]
fn test_construct_dataset() {
    let graphs = graphs_for(&["CCO", "c1ccccc1"], &[1.0, 2.0]);
    assert_eq!(graphs.len(), 2);

    let g = &graphs[0];
    assert_eq!(g.num_atoms, 3);
    assert_eq!(g.node_dim, 42);
    assert_eq!(g.node_feats.len(), 3 * 42);
    assert_eq!(g.edge_index.len(), 4);
    assert_eq!(g.edge_feats.len(), 4 * 12);
    assert_eq!(g.edge_order, vec![1.0; 4]);
    assert_eq!(g.y, 1.0);
    assert!(g.global_feat.is_none());

    let g = &graphs[1];
    assert_eq!(g.num_atoms, 6);
    assert_eq!(g.edge_index.len(), 12);
    assert!(g.edge_order.iter().all(|&o| o == 1.5));
    assert!(g.edge_index.contains(&[0, 1]) && g.edge_index.contains(&[1, 0]));

    // Unparseable input is an error here, not a skip.
    let bad = vec!["C(C".to_string()];
    assert!(
        construct_dataset(
            &bad,
            &[1.0],
            None,
            &AtomFeaturizer::default(),
            &BondFeaturizer::default()
        )
        .is_err()
    );
}

#[test]
fn test_construct_dataset_globals() {
    let smiles = vec!["CCO".to_string(), "CCC".to_string()];
    let graphs = construct_dataset(
        &smiles,
        &[1.0, 2.0],
        Some(&[300.0, 400.0]),
        &AtomFeaturizer::default(),
        &BondFeaturizer::default(),
    )
    .unwrap();

    assert_eq!(graphs[0].global_feat, Some(300.0));
    assert_eq!(graphs[1].global_feat, Some(400.0));

    assert!(validate_globals(&graphs).is_ok());
    assert!(validate_globals(&graphs_for(&["CCO"], &[1.0])).is_err());
}

#[test]
fn test_target_scaler() {
    let graphs = graphs_for(&["CCO", "CCC", "CCN", "CCCl"], &[1.0, 2.0, 3.0, 4.0]);

    let scaler = TargetScaler::fit(&graphs);
    assert!((scaler.mean - 2.5).abs() < 1e-6);
    assert!((scaler.std - 1.25f32.sqrt()).abs() < 1e-6);
    assert!(scaler.global_mean.is_none());

    let y = 3.7;
    assert!((scaler.denormalize(scaler.normalize(y)) - y).abs() < 1e-5);

    assert_eq!(TargetScaler::identity().normalize(2.0), 2.0);

    // Constant targets would divide by zero; the std is forced to one.
    let constant = graphs_for(&["CCO", "CCC"], &[2.0, 2.0]);
    let scaler = TargetScaler::fit(&constant);
    assert_eq!(scaler.std, 1.0);
    assert_eq!(scaler.normalize(2.0), 0.0);
}

#[test]
fn test_scaler_globals() {
    let smiles: Vec<String> = ["CCO", "CCC", "CCN", "CCCl"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let graphs = construct_dataset(
        &smiles,
        &[1.0, 2.0, 3.0, 4.0],
        Some(&[10.0, 20.0, 30.0, 40.0]),
        &AtomFeaturizer::default(),
        &BondFeaturizer::default(),
    )
    .unwrap();

    let scaler = TargetScaler::fit(&graphs);
    assert_eq!(scaler.global_mean, Some(25.0));
    assert!((scaler.normalize_global(25.0)).abs() < 1e-6);

    // Without fitted global stats the value passes through.
    assert_eq!(TargetScaler::identity().normalize_global(25.0), 25.0);
}

#[test]
fn test_dataset_standardize() {
    let graphs = graphs_for(&["CCO", "CCC", "CCN", "CCCl"], &[1.0, 2.0, 3.0, 4.0]);

    let ds = DataSet::new(graphs.clone(), true);
    let mean: f32 = ds.iter().map(|g| g.y).sum::<f32>() / 4.0;
    assert!(mean.abs() < 1e-6);
    let var: f32 = ds.iter().map(|g| g.y * g.y).sum::<f32>() / 4.0;
    assert!((var - 1.0).abs() < 1e-5);
    assert!((ds.scaler.denormalize(ds[0].y) - 1.0).abs() < 1e-5);

    let raw = DataSet::new(graphs, false);
    assert_eq!(raw.len(), 4);
    assert_eq!(raw[0].y, 1.0);
    assert_eq!(raw.scaler.std, 1.0);
}

#[test]
fn test_make_graph_dataset() {
    let smiles: Vec<String> = [
        "CCO", "CCC", "CCN", "CCCl", "CCF", "CC=O", "CCS", "C1CCCCC1", "c1ccccc1", "CC#N", "C",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let targets: Vec<f32> = (0..11).map(|i| i as f32).collect();

    // "C" is dropped by the heavy-atom filter, leaving ten samples.
    let options = DatasetOptions {
        split: SplitType::Consecutive,
        ..Default::default()
    };
    let split = make_graph_dataset(&smiles, &targets, None, &options).unwrap();

    assert_eq!(split.train.len(), 8);
    assert_eq!(split.val.len(), 1);
    assert_eq!(split.test.len(), 1);
    assert!((split.scaler.mean - 4.5).abs() < 1e-4);
    assert!((split.scaler.std - 8.25f32.sqrt()).abs() < 1e-4);
    assert!((split.scaler.denormalize(split.val[0].y) - 8.0).abs() < 1e-4);
    assert!((split.scaler.denormalize(split.test[0].y) - 9.0).abs() < 1e-4);

    assert!(make_graph_dataset(&smiles, &targets, Some(&[1.0, 2.0]), &options).is_err());
}

#[test]
fn test_make_graph_dataset_custom_labels() {
    let smiles: Vec<String> = [
        "CCO", "CCC", "CCN", "CCCl", "CCF", "CC=O", "CCS", "C1CCCCC1", "c1ccccc1", "CC#N", "C",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    let targets: Vec<f32> = (0..11).map(|i| i as f32).collect();

    // Labels align with the input list; the dropped "C" takes its label with it.
    let labels = vec![0u8, 0, 0, 0, 0, 0, 0, 0, 1, 2, 1];
    let options = DatasetOptions {
        split: SplitType::Custom,
        custom_split: Some(labels),
        ..Default::default()
    };
    let split = make_graph_dataset(&smiles, &targets, None, &options).unwrap();

    assert_eq!(split.train.len(), 8);
    assert_eq!(split.val.len(), 1);
    assert_eq!(split.test.len(), 1);
    assert!((split.scaler.denormalize(split.val[0].y) - 8.0).abs() < 1e-4);
    assert!((split.scaler.denormalize(split.test[0].y) - 9.0).abs() < 1e-4);
}

#[test]
fn test_load_smiles_csv() {
    let path = std::env::temp_dir().join(format!("mol_props_csv_{}.csv", std::process::id()));
    fs::write(
        &path,
        "smiles,target,name\nCCO,1.5,ethanol\nc1ccccc1,-0.25,benzene\nCCN,,amine\n",
    )
    .unwrap();

    let (smiles, targets) = load_smiles_csv(&path, "smiles", "target").unwrap();
    assert_eq!(smiles, vec!["CCO".to_string(), "c1ccccc1".to_string()]);
    assert_eq!(targets, vec![1.5, -0.25]);

    assert!(load_smiles_csv(&path, "smiles", "missing").is_err());
    assert!(load_smiles_csv(Path::new("/nonexistent/x.csv"), "smiles", "target").is_err());

    fs::remove_file(&path).ok();
}

#[test]
fn test_batcher_shapes() {
    let graphs = graphs_for(&["CCO", "c1ccccc1"], &[1.0, 2.0]);
    let device = Default::default();
    let batcher = GraphBatcher::new(42, 12);

    let batch: GraphBatch<ValidBackend> = batcher.batch(graphs, &device);
    assert_eq!(batch.nodes.dims(), [2, 6, 42]);
    assert_eq!(batch.adj.dims(), [2, 6, 6]);
    assert_eq!(batch.edge_feats.dims(), [2, 6, 6, 12]);
    assert_eq!(batch.mask.dims(), [2, 6, 1]);
    assert_eq!(batch.globals.dims(), [2, 1]);
    assert_eq!(batch.targets.dims(), [2, 1]);

    let mask: Vec<f32> = batch.mask.into_data().to_vec().unwrap();
    assert_eq!(&mask[..6], &[1.0, 1.0, 1.0, 0.0, 0.0, 0.0]);
    assert_eq!(&mask[6..], &[1.0; 6]);

    let targets: Vec<f32> = batch.targets.into_data().to_vec().unwrap();
    assert_eq!(targets, vec![1.0, 2.0]);
}

#[test]
fn test_adjacency_normalization() {
    let device = Default::default();

    // Ethane: A + I is all ones, both degrees two, so every entry is one half.
    let graphs = graphs_for(&["CC"], &[0.0]);
    let batch: GraphBatch<ValidBackend> = GraphBatcher::new(42, 12).batch(graphs, &device);
    let adj: Vec<f32> = batch.adj.into_data().to_vec().unwrap();
    assert_eq!(adj.len(), 4);
    for v in adj {
        assert!((v - 0.5).abs() < 1e-6);
    }

    // An isolated atom keeps only its self-loop.
    let graphs = graphs_for(&["C"], &[0.0]);
    let batch: GraphBatch<ValidBackend> = GraphBatcher::new(42, 12).batch(graphs, &device);
    let adj: Vec<f32> = batch.adj.into_data().to_vec().unwrap();
    assert_eq!(adj, vec![1.0]);
}

#[test]
fn test_model_forward() {
    let device = Default::default();
    let cfg = ModelConfig::new(42, 12)
        .with_hidden_dim(16)
        .with_num_rounds(2)
        .with_mlp_dim(8);
    let model = cfg.init::<ValidBackend>(&device);

    let graphs = graphs_for(&["CCO", "c1ccccc1"], &[1.0, 2.0]);
    let batch: GraphBatch<ValidBackend> = GraphBatcher::new(42, 12).batch(graphs, &device);

    let (preds, latents) = model.forward_with_latents(
        batch.nodes.clone(),
        batch.adj.clone(),
        batch.edge_feats.clone(),
        batch.mask.clone(),
    );
    assert_eq!(preds.dims(), [2, 1]);
    assert_eq!(latents.dims(), [2, 32]);

    let vals: Vec<f32> = preds.into_data().to_vec().unwrap();
    assert!(vals.iter().all(|v| v.is_finite()));
}

#[test]
fn test_forward_padding_invariance() {
    let device = Default::default();
    let cfg = ModelConfig::new(42, 12)
        .with_hidden_dim(8)
        .with_num_rounds(2)
        .with_mlp_dim(4)
        .with_dropout(0.0);
    let model = cfg.init::<ValidBackend>(&device);

    let graphs = graphs_for(&["CCO", "c1ccccc1"], &[0.0, 0.0]);
    let batcher = GraphBatcher::new(42, 12);

    let solo: GraphBatch<ValidBackend> = batcher.batch(vec![graphs[0].clone()], &device);
    let solo_pred: Vec<f32> = model
        .forward(solo.nodes, solo.adj, solo.edge_feats, solo.mask)
        .into_data()
        .to_vec()
        .unwrap();

    let pair: GraphBatch<ValidBackend> = batcher.batch(graphs, &device);
    let pair_pred: Vec<f32> = model
        .forward(pair.nodes, pair.adj, pair.edge_feats, pair.mask)
        .into_data()
        .to_vec()
        .unwrap();

    // Padding rows must not leak into the prediction.
    assert!(
        (solo_pred[0] - pair_pred[0]).abs() < 1e-4,
        "{} vs {}",
        solo_pred[0],
        pair_pred[0]
    );
}

#[test]
fn test_train_model() {
    let device = Default::default();
    let graphs = graphs_for(
        &["CCO", "CCC", "CCN", "CCCl", "CC=O", "CCF"],
        &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
    );

    let cfg = ModelConfig::new(42, 12)
        .with_hidden_dim(8)
        .with_num_rounds(1)
        .with_mlp_dim(4);
    let model = cfg.init::<TrainBackend>(&device);

    let train_cfg = TrainConfig::new().with_epochs(2).with_batch_size(4);
    let result = train_model(model, &train_cfg, graphs[..4].to_vec(), graphs[4..].to_vec())
        .unwrap();

    assert_eq!(result.train_losses.len(), 2);
    assert_eq!(result.val_losses.len(), 2);
    assert!(result.train_losses.iter().all(|l| l.is_finite()));
    assert!(result.val_losses.iter().all(|l| l.is_finite()));
    assert!(result.best_val.is_finite());
    assert!(result.best_val <= result.val_losses[0] + 1e-6);

    let model = cfg.init::<TrainBackend>(&device);
    assert!(train_model(model, &train_cfg, vec![], graphs[4..].to_vec()).is_err());
}

#[test]
fn test_test_model() {
    let device = Default::default();
    let cfg = ModelConfig::new(42, 12)
        .with_hidden_dim(8)
        .with_num_rounds(1)
        .with_mlp_dim(4);
    let model = cfg.init::<ValidBackend>(&device);

    let graphs = graphs_for(&["CCO", "CCC", "c1ccccc1"], &[1.0, 2.0, 3.0]);
    let out = test_model(&model, graphs, true).unwrap();

    assert_eq!(out.preds.len(), 3);
    assert_eq!(out.latent_width, 16);
    assert_eq!(out.latents.len(), 3 * 16);
    assert!(out.preds.iter().all(|p| p.is_finite()));
    assert!(out.loss.is_some());
    assert!(out.loss.unwrap().is_finite());

    assert!(test_model(&model, vec![], false).is_err());
}

#[test]
fn test_metrics_perfect() {
    let preds = [1.0, 2.0, 3.0];
    let targets = [1.0, 2.0, 3.0];

    let m = RegressionMetrics::compute(&preds, &targets, None).unwrap();
    assert_eq!(m.mse, 0.0);
    assert_eq!(m.sse, 0.0);
    assert_eq!(m.mae, 0.0);
    assert!((m.r2 - 1.0).abs() < 1e-9);
    assert_eq!(m.mre, 0.0);
}

#[test]
fn test_metrics_hand_computed() {
    let preds = [1.0, 2.0, 3.0];
    let targets = [2.0, 2.0, 2.0];
    let vals = pred_metric(
        &preds,
        &targets,
        &[Metric::Mse, Metric::Sse, Metric::Mae, Metric::R2, Metric::Mre],
        None,
    )
    .unwrap();

    assert!((vals[0] - 2.0 / 3.0).abs() < 1e-6);
    assert!((vals[1] - 2.0).abs() < 1e-6);
    assert!((vals[2] - 2.0 / 3.0).abs() < 1e-6);
    assert!(vals[3].is_nan(), "constant targets have no R2");
    assert!(vals[4].abs() < 1e-6, "signed relative errors cancel");

    let preds = [2.0, 4.0];
    let targets = [1.0, 3.0];
    let vals = pred_metric(&preds, &targets, &[Metric::R2, Metric::Mre], None).unwrap();
    assert!(vals[0].abs() < 1e-9);
    // Over-predicting every sample makes the signed relative error negative.
    assert!((vals[1] + (1.0 + 1.0 / 3.0) / 2.0 * 100.0).abs() < 1e-4);

    assert!(pred_metric(&[], &[], &[Metric::Mse], None).is_err());
    assert!(pred_metric(&[1.0], &[1.0, 2.0], &[Metric::Mse], None).is_err());
}

#[test]
fn test_metrics_with_scaler() {
    let scaler = TargetScaler {
        mean: 10.0,
        std: 2.0,
        global_mean: None,
        global_std: None,
    };

    // Denormalized: prediction 10 against target 12.
    let vals = pred_metric(&[0.0], &[1.0], &[Metric::Mse, Metric::Mae], Some(&scaler)).unwrap();
    assert!((vals[0] - 4.0).abs() < 1e-6);
    assert!((vals[1] - 2.0).abs() < 1e-6);
}

#[test]
fn test_metric_names() {
    for m in [Metric::Mse, Metric::Sse, Metric::Mae, Metric::R2, Metric::Mre] {
        assert_eq!(Metric::from_str(&m.to_string()).unwrap(), m);
    }
    assert!(Metric::from_str("rmse").is_err());
}

fn cp_reference(b: f32, c: f32, d: f32, e: f32, f: f32, temp: f32) -> f32 {
    let eps = 1e-7_f32;
    let t = temp + eps;
    let x = (d / t).clamp(-20.0, 20.0);
    let y = (f / t).clamp(-20.0, 20.0);
    let sr = x / (x.sinh() + eps);
    let cr = y / (y.cosh() + eps);
    b + c * sr * sr + e * cr * cr
}

#[test]
fn test_cp_layer() {
    let device = Default::default();

    let b_v = [2.0_f32, 1.0, 0.0];
    let c_v = [1.0_f32, 0.5, 2.0];
    let d_v = [0.5_f32, 2.0, 1e5];
    let e_v = [1.0_f32, 2.0, 0.5];
    let f_v = [0.3_f32, 1.0, 2.0];
    let t_v = [1.0_f32, 300.0, 50.0];

    let as_tensor = |v: &[f32]| {
        Tensor::<ValidBackend, 2>::from_data(TensorData::new(v.to_vec(), [3, 1]), &device)
    };

    let out = cp_from_terms(
        as_tensor(&b_v),
        as_tensor(&c_v),
        as_tensor(&d_v),
        as_tensor(&e_v),
        as_tensor(&f_v),
        as_tensor(&t_v),
    );
    let vals: Vec<f32> = out.into_data().to_vec().unwrap();

    for i in 0..3 {
        let want = cp_reference(b_v[i], c_v[i], d_v[i], e_v[i], f_v[i], t_v[i]);
        assert!(
            (vals[i] - want).abs() < 1e-3,
            "row {i}: {} vs {want}",
            vals[i]
        );
        assert!(vals[i].is_finite());
    }
}

#[test]
fn test_cp_ensemble_forward() {
    let device = Default::default();
    let cfg = ModelConfig::new(42, 12)
        .with_hidden_dim(8)
        .with_num_rounds(1)
        .with_mlp_dim(4);
    let models: [Model<ValidBackend>; 5] = std::array::from_fn(|_| cfg.init(&device));
    let ensemble = CpEnsemble::new(models);

    let smiles: Vec<String> = ["CCO", "c1ccccc1"].iter().map(|s| s.to_string()).collect();
    let graphs = construct_dataset(
        &smiles,
        &[0.5, 0.7],
        Some(&[298.0, 350.0]),
        &AtomFeaturizer::default(),
        &BondFeaturizer::default(),
    )
    .unwrap();
    validate_globals(&graphs).unwrap();

    let batch: GraphBatch<ValidBackend> = GraphBatcher::new(42, 12).batch(graphs, &device);
    let out = ensemble.forward(&batch);
    assert_eq!(out.dims(), [2, 1]);

    let vals: Vec<f32> = out.into_data().to_vec().unwrap();
    assert!(vals.iter().all(|v| v.is_finite()));
}

#[test]
fn test_model_paths() {
    let (w, c, s) = model_paths(Path::new("models"), "cp");
    assert_eq!(w, Path::new("models/cp"));
    assert_eq!(c, Path::new("models/cp_config.json"));
    assert_eq!(s, Path::new("models/cp_scaler.json"));
}

#[test]
fn test_scaler_json_roundtrip() {
    let scaler = TargetScaler {
        mean: 3.5,
        std: 1.25,
        global_mean: Some(300.0),
        global_std: Some(25.0),
    };

    let text = serde_json::to_string(&scaler).unwrap();
    let back: TargetScaler = serde_json::from_str(&text).unwrap();

    assert_eq!(back.mean, 3.5);
    assert_eq!(back.std, 1.25);
    assert_eq!(back.global_mean, Some(300.0));
    assert_eq!(back.global_std, Some(25.0));
}

#[test]
fn test_save_load_roundtrip() {
    let dir = std::env::temp_dir().join(format!("mol_props_test_{}", std::process::id()));
    let device = Default::default();

    let cfg = ModelConfig::new(42, 12)
        .with_hidden_dim(8)
        .with_num_rounds(1)
        .with_mlp_dim(4)
        .with_dropout(0.0);
    let model = cfg.init::<ValidBackend>(&device);

    let graphs = graphs_for(&["CCO"], &[0.0]);
    let batch: GraphBatch<ValidBackend> =
        GraphBatcher::new(42, 12).batch(vec![graphs[0].clone()], &device);
    let reference: Vec<f32> = model
        .clone()
        .forward(batch.nodes, batch.adj, batch.edge_feats, batch.mask)
        .into_data()
        .to_vec()
        .unwrap();

    let scaler = TargetScaler {
        mean: 2.0,
        std: 0.5,
        global_mean: None,
        global_std: None,
    };
    save_model(model, &cfg, &scaler, &dir, "roundtrip").unwrap();

    let predictor = Predictor::load(&dir, "roundtrip").unwrap();
    let pred = predictor.predict(&graphs[0]).unwrap();
    assert!((pred - (reference[0] * 0.5 + 2.0)).abs() < 1e-4);

    let from_text = predictor.predict_smiles("CCO", None).unwrap();
    assert!((from_text - pred).abs() < 1e-4);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_molecular_weight() {
    let water = from_smiles("O").unwrap();
    assert!((water.molecular_weight() - 18.015).abs() < 0.01);

    let ethanol = from_smiles("CCO").unwrap();
    assert!((ethanol.molecular_weight() - 46.07).abs() < 0.01);
}

#[test]
fn test_radical_electrons() {
    let methyl = from_smiles("[CH3]").unwrap();
    assert_eq!(methyl.num_radical_electrons(0), 1);

    let mol = from_smiles("CCO").unwrap();
    assert_eq!(mol.num_radical_electrons(0), 0);
}
