//! Chemical elements, with the lookup tables the rest of the pipeline needs:
//! symbol parsing and rendering, atomic weight, and typical valence.

use std::{io, io::ErrorKind};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Element {
    Hydrogen,
    Boron,
    Carbon,
    Nitrogen,
    Oxygen,
    Fluorine,
    Silicon,
    Phosphorus,
    Sulfur,
    Chlorine,
    Arsenic,
    Selenium,
    Bromine,
    Tellurium,
    Iodine,
    Astatine,
    // Elements beyond the default atom allow-list; they parse fine, and the
    // SMILES filter is what rejects them.
    Lithium,
    Sodium,
    Magnesium,
    Potassium,
    Calcium,
    Iron,
    Copper,
    Zinc,
}

impl Element {
    /// Case-sensitive symbol lookup. There is no catch-all variant, so any
    /// symbol not listed here fails the parse.
    pub fn from_letter(letter: &str) -> io::Result<Self> {
        match letter {
            "H" => Ok(Self::Hydrogen),
            "B" => Ok(Self::Boron),
            "C" => Ok(Self::Carbon),
            "N" => Ok(Self::Nitrogen),
            "O" => Ok(Self::Oxygen),
            "F" => Ok(Self::Fluorine),
            "Si" => Ok(Self::Silicon),
            "P" => Ok(Self::Phosphorus),
            "S" => Ok(Self::Sulfur),
            "Cl" => Ok(Self::Chlorine),
            "As" => Ok(Self::Arsenic),
            "Se" => Ok(Self::Selenium),
            "Br" => Ok(Self::Bromine),
            "Te" => Ok(Self::Tellurium),
            "I" => Ok(Self::Iodine),
            "At" => Ok(Self::Astatine),
            "Li" => Ok(Self::Lithium),
            "Na" => Ok(Self::Sodium),
            "Mg" => Ok(Self::Magnesium),
            "K" => Ok(Self::Potassium),
            "Ca" => Ok(Self::Calcium),
            "Fe" => Ok(Self::Iron),
            "Cu" => Ok(Self::Copper),
            "Zn" => Ok(Self::Zinc),
            _ => Err(io::Error::new(
                ErrorKind::InvalidData,
                format!("Invalid element symbol: {letter}"),
            )),
        }
    }

    pub fn to_letter(&self) -> String {
        match self {
            Self::Hydrogen => "H".into(),
            Self::Boron => "B".into(),
            Self::Carbon => "C".into(),
            Self::Nitrogen => "N".into(),
            Self::Oxygen => "O".into(),
            Self::Fluorine => "F".into(),
            Self::Silicon => "Si".into(),
            Self::Phosphorus => "P".into(),
            Self::Sulfur => "S".into(),
            Self::Chlorine => "Cl".into(),
            Self::Arsenic => "As".into(),
            Self::Selenium => "Se".into(),
            Self::Bromine => "Br".into(),
            Self::Tellurium => "Te".into(),
            Self::Iodine => "I".into(),
            Self::Astatine => "At".into(),
            Self::Lithium => "Li".into(),
            Self::Sodium => "Na".into(),
            Self::Magnesium => "Mg".into(),
            Self::Potassium => "K".into(),
            Self::Calcium => "Ca".into(),
            Self::Iron => "Fe".into(),
            Self::Copper => "Cu".into(),
            Self::Zinc => "Zn".into(),
        }
    }

    /// Standard atomic weight, in Daltons.
    pub fn atomic_weight(&self) -> f32 {
        match self {
            Self::Hydrogen => 1.008,
            Self::Boron => 10.81,
            Self::Carbon => 12.011,
            Self::Nitrogen => 14.007,
            Self::Oxygen => 15.999,
            Self::Fluorine => 18.998,
            Self::Silicon => 28.085,
            Self::Phosphorus => 30.974,
            Self::Sulfur => 32.06,
            Self::Chlorine => 35.45,
            Self::Arsenic => 74.922,
            Self::Selenium => 78.971,
            Self::Bromine => 79.904,
            Self::Tellurium => 127.60,
            Self::Iodine => 126.904,
            Self::Astatine => 210.0,
            Self::Lithium => 6.94,
            Self::Sodium => 22.990,
            Self::Magnesium => 24.305,
            Self::Potassium => 39.098,
            Self::Calcium => 40.078,
            Self::Iron => 55.845,
            Self::Copper => 63.546,
            Self::Zinc => 65.38,
        }
    }

    /// The common organic valence; used to derive implicit hydrogen counts.
    pub fn valence_typical(&self) -> usize {
        match self {
            Self::Hydrogen => 1,
            Self::Boron => 3,
            Self::Carbon => 4,
            Self::Nitrogen => 3,
            Self::Oxygen => 2,
            Self::Fluorine => 1,
            Self::Silicon => 4,
            Self::Phosphorus => 3, // can be 3 or 5; 3 covers amines-like phosphines
            Self::Sulfur => 2,     // can be 2, 4, or 6, but 2 is a common choice
            Self::Chlorine => 1,
            Self::Arsenic => 3,
            Self::Selenium => 2, // can also be 4 or 6, pick 2
            Self::Bromine => 1,
            Self::Tellurium => 2,
            Self::Iodine => 1,
            Self::Astatine => 1,
            Self::Lithium => 1,
            Self::Sodium => 1,
            Self::Magnesium => 2,
            Self::Potassium => 1,
            Self::Calcium => 2,
            Self::Iron => 2, // Fe(II) is common (Fe(III) also common)
            Self::Copper => 2,
            Self::Zinc => 2,
        }
    }

    /// Typical valence adjusted for a formal charge, following the usual
    /// isoelectronic conventions: N+ binds like C (4), O- like F (1),
    /// B- like C (4), while carbocations and carbanions both drop to 3.
    pub fn valence_adjusted(&self, charge: i8) -> i32 {
        let v = self.valence_typical() as i32;
        let q = charge as i32;

        match self {
            Self::Boron => v - q,
            Self::Carbon | Self::Silicon => v - q.abs(),
            _ => v + q,
        }
    }

    /// Atom symbols writable without brackets in SMILES.
    pub fn organic_subset(&self) -> bool {
        matches!(
            self,
            Self::Boron
                | Self::Carbon
                | Self::Nitrogen
                | Self::Oxygen
                | Self::Phosphorus
                | Self::Sulfur
                | Self::Fluorine
                | Self::Chlorine
                | Self::Bromine
                | Self::Iodine
        )
    }

    /// The default atom allow-list for dataset filtering.
    pub const DEFAULT_ALLOWED: [Element; 15] = [
        Element::Boron,
        Element::Carbon,
        Element::Nitrogen,
        Element::Oxygen,
        Element::Fluorine,
        Element::Silicon,
        Element::Phosphorus,
        Element::Sulfur,
        Element::Chlorine,
        Element::Arsenic,
        Element::Selenium,
        Element::Bromine,
        Element::Tellurium,
        Element::Iodine,
        Element::Astatine,
    ];
}
