//! Output records: survival data, per-group fit records, residuals.
//!
//! Everything here is plain serde data. A group whose fit failed is exported
//! as `{"error": "<message>"}` in place of its record so the other groups
//! still report.

use serde::{Deserialize, Serialize};

use crate::domain::SurvivalCurve;
use crate::error::RbError;
use crate::fit::{DecayFit, DihedralFit, InterleavedFit, PurityFit};
use crate::models::predict;

/// Survival statistics of one group, as exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YData {
    pub mean: Vec<f64>,
    pub std: Option<Vec<f64>>,
}

impl From<&SurvivalCurve> for YData {
    fn from(curve: &SurvivalCurve) -> Self {
        Self {
            mean: curve.mean.clone(),
            std: curve.std.clone(),
        }
    }
}

pub fn ydata(curves: &[SurvivalCurve]) -> Vec<YData> {
    curves.iter().map(YData::from).collect()
}

/// One group's fit record, or the reason it has none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupRecord<T> {
    Fit(T),
    Failed { error: String },
}

impl<T: Clone> From<&Result<T, RbError>> for GroupRecord<T> {
    fn from(result: &Result<T, RbError>) -> Self {
        match result {
            Ok(fit) => GroupRecord::Fit(fit.clone()),
            Err(e) => GroupRecord::Failed { error: e.to_string() },
        }
    }
}

impl<T> GroupRecord<T> {
    pub fn fit(&self) -> Option<&T> {
        match self {
            GroupRecord::Fit(fit) => Some(fit),
            GroupRecord::Failed { .. } => None,
        }
    }
}

pub fn group_records<T: Clone>(results: &[Result<T, RbError>]) -> Vec<GroupRecord<T>> {
    results.iter().map(GroupRecord::from).collect()
}

/// Exported state of any fitter variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FitReport {
    Standard {
        ydata: Vec<YData>,
        fit: Vec<GroupRecord<DecayFit>>,
    },
    /// `ydata[0]`/`fit[0]` are the reference sequences, index 1 the
    /// interleaved ones.
    Interleaved {
        ydata: Vec<Vec<YData>>,
        fit: Vec<Vec<GroupRecord<DecayFit>>>,
        fit_int: Vec<GroupRecord<InterleavedFit>>,
    },
    Purity {
        ydata: Vec<YData>,
        fit: Vec<GroupRecord<PurityFit>>,
    },
    /// `ydata[0]`/`fit[0]` are the Z-type sequences, index 1 the X-type ones.
    Dihedral {
        ydata: Vec<Vec<YData>>,
        fit: Vec<Vec<GroupRecord<DecayFit>>>,
        fit_cnotdihedral: Vec<GroupRecord<DihedralFit>>,
    },
}

impl FitReport {
    pub fn to_json(&self) -> Result<String, RbError> {
        serde_json::to_string_pretty(self).map_err(|e| RbError::Parse(format!("report: {e}")))
    }

    pub fn from_json(text: &str) -> Result<Self, RbError> {
        serde_json::from_str(text).map_err(|e| RbError::Parse(format!("report: {e}")))
    }
}

/// Observed vs fitted survival at one sequence length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveResidual {
    pub length: u32,
    pub observed: f64,
    pub fitted: f64,
    pub residual: f64,
}

/// Compute fitted values and residuals for each point of a curve.
pub fn compute_residuals(curve: &SurvivalCurve, fit: &DecayFit) -> Result<Vec<CurveResidual>, RbError> {
    let mut out = Vec::with_capacity(curve.len());
    for (&length, &observed) in curve.lengths.iter().zip(&curve.mean) {
        let fitted = predict(length as f64, &fit.params);
        if !fitted.is_finite() {
            return Err(RbError::shape(format!("non-finite model prediction at length {length}")));
        }
        out.push(CurveResidual {
            length,
            observed,
            fitted,
            residual: observed - fitted,
        });
    }
    Ok(out)
}
