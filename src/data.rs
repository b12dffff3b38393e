//! Observation loading, uncertainty imputation and depth-window exclusion.
//!
//! Raw CSV rows are read into [`RawRecord`]s with every field optional. An
//! [`ObservationSet`] is only ever produced by [`impute_uncertainty`] or
//! [`ObservationSet::new`], both of which guarantee that the three columns are
//! index-aligned and every uncertainty is strictly positive.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{ensure_len, TrendError};

/// Header names of the three required input columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub position: String,
    pub value: String,
    pub uncertainty: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            position: "Depth_cmcd".to_string(),
            value: "TEX86".to_string(),
            uncertainty: "TEX86_stdev".to_string(),
        }
    }
}

/// One input row before imputation. `None` marks an empty or `NaN` cell.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawRecord {
    pub position: Option<f64>,
    pub value: Option<f64>,
    pub uncertainty: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Observation {
    pub position: f64,
    pub value: f64,
    pub uncertainty: f64,
}

/// Replacement used for missing or non-positive uncertainties.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum UncertaintyFallback {
    /// Mean of every present, positive, finite uncertainty in the input.
    MeanOfPresent,
    /// A literal, e.g. the analytical uncertainty quoted for the instrument.
    Fixed(f64),
}

impl Default for UncertaintyFallback {
    fn default() -> Self {
        Self::MeanOfPresent
    }
}

impl UncertaintyFallback {
    pub fn resolve(&self, records: &[RawRecord]) -> Result<f64, TrendError> {
        match *self {
            Self::Fixed(value) if usable_uncertainty(value) => Ok(value),
            Self::Fixed(value) => Err(TrendError::InvalidConfig(format!(
                "fixed uncertainty fallback must be positive and finite, got {value}"
            ))),
            Self::MeanOfPresent => {
                let present: Vec<f64> = records
                    .iter()
                    .filter_map(|r| r.uncertainty)
                    .filter(|&u| usable_uncertainty(u))
                    .collect();
                if present.is_empty() {
                    return Err(TrendError::NoUncertaintyFallback);
                }
                Ok(present.iter().sum::<f64>() / present.len() as f64)
            }
        }
    }
}

/// Inclusive position range removed from the analysis. Bounds may be given in
/// either order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExclusionWindow {
    pub min: f64,
    pub max: f64,
}

impl ExclusionWindow {
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn contains(&self, position: f64) -> bool {
        let lo = self.min.min(self.max);
        let hi = self.min.max(self.max);
        position >= lo && position <= hi
    }
}

/// Index-aligned observation columns with strictly positive uncertainties.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObservationSet {
    positions: Vec<f64>,
    values: Vec<f64>,
    uncertainties: Vec<f64>,
}

impl ObservationSet {
    pub fn new(
        positions: Vec<f64>,
        values: Vec<f64>,
        uncertainties: Vec<f64>,
    ) -> Result<Self, TrendError> {
        ensure_len("observation values", positions.len(), values.len())?;
        ensure_len(
            "observation uncertainties",
            positions.len(),
            uncertainties.len(),
        )?;

        if let Some((index, &value)) = uncertainties
            .iter()
            .enumerate()
            .find(|(_, &u)| !usable_uncertainty(u))
        {
            return Err(TrendError::InvalidUncertainty { index, value });
        }

        Ok(Self {
            positions,
            values,
            uncertainties,
        })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn uncertainties(&self) -> &[f64] {
        &self.uncertainties
    }

    pub fn get(&self, index: usize) -> Option<Observation> {
        Some(Observation {
            position: *self.positions.get(index)?,
            value: self.values[index],
            uncertainty: self.uncertainties[index],
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Observation> + '_ {
        (0..self.len()).map(|i| Observation {
            position: self.positions[i],
            value: self.values[i],
            uncertainty: self.uncertainties[i],
        })
    }

    /// Returns a new set without the observations inside `window`.
    pub fn exclude(&self, window: &ExclusionWindow) -> Self {
        let mut kept = Self::default();
        for obs in self.iter().filter(|o| !window.contains(o.position)) {
            kept.positions.push(obs.position);
            kept.values.push(obs.value);
            kept.uncertainties.push(obs.uncertainty);
        }
        kept
    }

    /// Smallest and largest position, or `None` for an empty set.
    pub fn position_range(&self) -> Option<(f64, f64)> {
        let first = *self.positions.first()?;
        Some(
            self.positions
                .iter()
                .fold((first, first), |(lo, hi), &p| (lo.min(p), hi.max(p))),
        )
    }

    /// Every observation's uncertainty multiplied by `scale`.
    pub fn scaled_uncertainties(&self, scale: f64) -> Vec<f64> {
        self.uncertainties.iter().map(|u| u * scale).collect()
    }
}

/// Builds an [`ObservationSet`] from raw rows without touching the input.
///
/// Rows missing a position or value are dropped. Missing, zero, negative or
/// non-finite uncertainties are replaced by the resolved fallback.
pub fn impute_uncertainty(
    records: &[RawRecord],
    fallback: UncertaintyFallback,
) -> Result<ObservationSet, TrendError> {
    let fill = fallback.resolve(records)?;
    log::debug!("uncertainty fallback resolved to {fill:.6}");

    let mut positions = Vec::with_capacity(records.len());
    let mut values = Vec::with_capacity(records.len());
    let mut uncertainties = Vec::with_capacity(records.len());
    let mut filled = 0_usize;

    for record in records {
        let (Some(position), Some(value)) = (record.position, record.value) else {
            continue;
        };
        if !(position.is_finite() && value.is_finite()) {
            continue;
        }

        let uncertainty = match record.uncertainty {
            Some(u) if usable_uncertainty(u) => u,
            _ => {
                filled += 1;
                fill
            }
        };

        positions.push(position);
        values.push(value);
        uncertainties.push(uncertainty);
    }

    let dropped = records.len() - positions.len();
    if dropped > 0 {
        log::warn!("dropped {dropped} rows with a missing position or value");
    }
    if filled > 0 {
        log::info!("filled {filled} missing uncertainties with {fill:.6}");
    }

    ObservationSet::new(positions, values, uncertainties)
}

pub fn load_csv(path: &Path, columns: &ColumnNames) -> Result<Vec<RawRecord>, TrendError> {
    let file = File::open(path)?;
    let records = read_records(file, columns)?;
    log::info!("loaded {} rows from {}", records.len(), path.display());
    Ok(records)
}

pub fn read_records<R: Read>(reader: R, columns: &ColumnNames) -> Result<Vec<RawRecord>, TrendError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = reader.headers()?.clone();
    let column_index = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| TrendError::MissingColumn(name.to_string()))
    };
    let position_idx = column_index(&columns.position)?;
    let value_idx = column_index(&columns.value)?;
    let uncertainty_idx = column_index(&columns.uncertainty)?;

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let record = result?;
        let field = |idx: usize, name: &str| parse_cell(record.get(idx), row + 1, name);
        records.push(RawRecord {
            position: field(position_idx, &columns.position)?,
            value: field(value_idx, &columns.value)?,
            uncertainty: field(uncertainty_idx, &columns.uncertainty)?,
        });
    }

    Ok(records)
}

fn parse_cell(cell: Option<&str>, row: usize, column: &str) -> Result<Option<f64>, TrendError> {
    let raw = match cell {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Ok(None),
    };
    if matches!(raw.to_ascii_lowercase().as_str(), "nan" | "na" | "n/a") {
        return Ok(None);
    }

    raw.parse::<f64>()
        .map(|v| if v.is_nan() { None } else { Some(v) })
        .map_err(|_| TrendError::InvalidValue {
            row,
            column: column.to_string(),
            value: raw.to_string(),
        })
}

fn usable_uncertainty(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    const SAMPLE: &str = "\
Depth_cmcd,TEX86,TEX86_stdev,Age
2.5,0.52,0.010,2010
10,0.55,,2001
19,0.60,0.020,1990
55,0.58,NaN,1950
100,0.61,0.030,1900
120,0.49,0.020,1880
130,,0.010,1870
";

    fn raw(position: f64, value: f64, uncertainty: Option<f64>) -> RawRecord {
        RawRecord {
            position: Some(position),
            value: Some(value),
            uncertainty,
        }
    }

    #[test]
    fn reads_named_columns_and_missing_cells() {
        let records = read_records(SAMPLE.as_bytes(), &ColumnNames::default()).unwrap();
        assert_eq!(records.len(), 7);
        assert_eq!(records[0], raw(2.5, 0.52, Some(0.010)));
        assert_eq!(records[1].uncertainty, None);
        assert_eq!(records[3].uncertainty, None);
        assert_eq!(records[6].value, None);
    }

    #[test]
    fn missing_header_is_reported() {
        let columns = ColumnNames {
            value: "TEX86H".to_string(),
            ..ColumnNames::default()
        };
        let err = read_records(SAMPLE.as_bytes(), &columns).unwrap_err();
        assert!(matches!(err, TrendError::MissingColumn(name) if name == "TEX86H"));
    }

    #[test]
    fn non_numeric_cell_is_an_error() {
        let input = "Depth_cmcd,TEX86,TEX86_stdev\n1,abc,0.1\n";
        let err = read_records(input.as_bytes(), &ColumnNames::default()).unwrap_err();
        assert!(matches!(err, TrendError::InvalidValue { row: 1, .. }));
    }

    #[test]
    fn mean_fallback_uses_present_uncertainties_only() {
        let records = vec![
            raw(0.0, 1.0, Some(0.1)),
            raw(1.0, 1.0, None),
            raw(2.0, 1.0, Some(0.3)),
            raw(3.0, 1.0, Some(0.0)),
        ];
        let fill = UncertaintyFallback::MeanOfPresent.resolve(&records).unwrap();
        assert_relative_eq!(fill, 0.2, epsilon = 1e-12);

        let set = impute_uncertainty(&records, UncertaintyFallback::MeanOfPresent).unwrap();
        assert_eq!(set.uncertainties(), &[0.1, fill, 0.3, fill]);
    }

    #[test]
    fn imputation_leaves_input_untouched() {
        let records = vec![raw(0.0, 1.0, None), raw(1.0, 2.0, Some(0.4))];
        let before = records.clone();
        let set = impute_uncertainty(&records, UncertaintyFallback::Fixed(0.015)).unwrap();
        assert_eq!(records, before);
        assert_eq!(set.uncertainties(), &[0.015, 0.4]);
    }

    #[test]
    fn fallback_without_any_uncertainty_fails() {
        let records = vec![raw(0.0, 1.0, None)];
        assert!(matches!(
            impute_uncertainty(&records, UncertaintyFallback::MeanOfPresent),
            Err(TrendError::NoUncertaintyFallback)
        ));
        assert!(matches!(
            impute_uncertainty(&records, UncertaintyFallback::Fixed(-1.0)),
            Err(TrendError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rows_without_position_or_value_are_dropped() {
        let records = read_records(SAMPLE.as_bytes(), &ColumnNames::default()).unwrap();
        let set = impute_uncertainty(&records, UncertaintyFallback::Fixed(0.015)).unwrap();
        assert_eq!(set.len(), 6);
        assert!(set.positions().iter().all(|&p| p != 130.0));
    }

    #[test]
    fn exclusion_window_is_inclusive_in_either_order() {
        let records = read_records(SAMPLE.as_bytes(), &ColumnNames::default()).unwrap();
        let set = impute_uncertainty(&records, UncertaintyFallback::MeanOfPresent).unwrap();

        let filtered = set.exclude(&ExclusionWindow::new(100.0, 19.0));
        assert_eq!(filtered.positions(), &[2.5, 10.0, 120.0]);
        assert_eq!(filtered.values(), &[0.52, 0.55, 0.49]);
        assert_eq!(filtered.uncertainties()[2], 0.020);
    }

    #[test]
    fn constructor_rejects_misaligned_or_non_positive_columns() {
        assert!(matches!(
            ObservationSet::new(vec![0.0, 1.0], vec![1.0], vec![0.1, 0.1]),
            Err(TrendError::LengthMismatch { .. })
        ));
        assert!(matches!(
            ObservationSet::new(vec![0.0], vec![1.0], vec![0.0]),
            Err(TrendError::InvalidUncertainty { index: 0, .. })
        ));
    }

    #[test]
    fn position_range_spans_all_positions() {
        let set = ObservationSet::new(vec![5.0, -1.0, 3.0], vec![0.0; 3], vec![1.0; 3]).unwrap();
        assert_eq!(set.position_range(), Some((-1.0, 5.0)));
        assert_eq!(ObservationSet::default().position_range(), None);
    }

    proptest! {
        #[test]
        fn no_excluded_position_survives(
            rows in prop::collection::vec((-50.0f64..250.0, -1.0f64..1.0, 0.001f64..0.5), 0..64),
            a in 0.0f64..200.0,
            b in 0.0f64..200.0,
        ) {
            let positions = rows.iter().map(|r| r.0).collect();
            let values = rows.iter().map(|r| r.1).collect();
            let uncertainties = rows.iter().map(|r| r.2).collect();
            let set = ObservationSet::new(positions, values, uncertainties).unwrap();
            let window = ExclusionWindow::new(a, b);
            let filtered = set.exclude(&window);

            prop_assert!(filtered.positions().iter().all(|&p| !window.contains(p)));
            prop_assert_eq!(filtered.positions().len(), filtered.values().len());
            prop_assert_eq!(filtered.positions().len(), filtered.uncertainties().len());
            let expected = rows.iter().filter(|r| !window.contains(r.0)).count();
            prop_assert_eq!(filtered.len(), expected);
        }
    }
}
