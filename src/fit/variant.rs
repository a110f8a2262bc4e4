//! The closed set of fitter variants and their exported reports.

use serde::{Deserialize, Serialize};

use crate::domain::QubitPattern;
use crate::fit::dihedral::DihedralRbFitter;
use crate::fit::interleaved::InterleavedRbFitter;
use crate::fit::purity::PurityRbFitter;
use crate::fit::standard::RbFitter;
use crate::report::{FitReport, group_records};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitterKind {
    Standard,
    Interleaved,
    Purity,
    Dihedral,
}

impl FitterKind {
    pub fn display_name(self) -> &'static str {
        match self {
            FitterKind::Standard => "standard RB",
            FitterKind::Interleaved => "interleaved RB",
            FitterKind::Purity => "purity RB",
            FitterKind::Dihedral => "CNOT-dihedral RB",
        }
    }
}

/// Any of the four fitters, each owning its combination formulas.
#[derive(Debug, Clone)]
pub enum FitterVariant {
    Standard(RbFitter),
    Interleaved(InterleavedRbFitter),
    Purity(PurityRbFitter),
    Dihedral(DihedralRbFitter),
}

impl FitterVariant {
    pub fn kind(&self) -> FitterKind {
        match self {
            FitterVariant::Standard(_) => FitterKind::Standard,
            FitterVariant::Interleaved(_) => FitterKind::Interleaved,
            FitterVariant::Purity(_) => FitterKind::Purity,
            FitterVariant::Dihedral(_) => FitterKind::Dihedral,
        }
    }

    pub fn pattern(&self) -> &QubitPattern {
        match self {
            FitterVariant::Standard(f) => f.pattern(),
            FitterVariant::Interleaved(f) => f.pattern(),
            FitterVariant::Purity(f) => f.pattern(),
            FitterVariant::Dihedral(f) => f.pattern(),
        }
    }

    /// Current curves and fits as a serialisable report.
    pub fn report(&self) -> FitReport {
        match self {
            FitterVariant::Standard(f) => FitReport::Standard {
                ydata: f.ydata(),
                fit: group_records(f.fits()),
            },
            FitterVariant::Interleaved(f) => FitReport::Interleaved {
                ydata: f.ydata().to_vec(),
                fit: vec![
                    group_records(f.reference().fits()),
                    group_records(f.interleaved().fits()),
                ],
                fit_int: group_records(f.fit_int()),
            },
            FitterVariant::Purity(f) => FitReport::Purity {
                ydata: f.ydata(),
                fit: group_records(f.fits()),
            },
            FitterVariant::Dihedral(f) => FitReport::Dihedral {
                ydata: f.ydata().to_vec(),
                fit: vec![group_records(f.z_type().fits()), group_records(f.x_type().fits())],
                fit_cnotdihedral: group_records(f.fit_cnotdihedral()),
            },
        }
    }
}

impl From<RbFitter> for FitterVariant {
    fn from(f: RbFitter) -> Self {
        FitterVariant::Standard(f)
    }
}

impl From<InterleavedRbFitter> for FitterVariant {
    fn from(f: InterleavedRbFitter) -> Self {
        FitterVariant::Interleaved(f)
    }
}

impl From<PurityRbFitter> for FitterVariant {
    fn from(f: PurityRbFitter) -> Self {
        FitterVariant::Purity(f)
    }
}

impl From<DihedralRbFitter> for FitterVariant {
    fn from(f: DihedralRbFitter) -> Self {
        FitterVariant::Dihedral(f)
    }
}
