//! Feature Matrix - Core data structure for detector input
//!
//! **Versioned feature matrix with layout validation**
//!
//! One row per record, columns in `FEATURE_LAYOUT` order. Carries the layout
//! version/hash so a matrix can be checked against persisted artifacts.

use ndarray::{Array2, ArrayView1, Axis};

use super::layout::{layout_hash, FEATURE_COUNT, FEATURE_LAYOUT, FEATURE_VERSION};

#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    /// Feature layout version
    pub version: u8,
    /// CRC32 hash of the feature layout
    pub layout_hash: u32,
    /// Rows x FEATURE_COUNT
    pub values: Array2<f64>,
}

impl FeatureMatrix {
    pub fn new(values: Array2<f64>) -> Self {
        Self {
            version: FEATURE_VERSION,
            layout_hash: layout_hash(),
            values,
        }
    }

    pub fn zeros(rows: usize) -> Self {
        Self::new(Array2::zeros((rows, FEATURE_COUNT)))
    }

    pub fn rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn width(&self) -> usize {
        self.values.ncols()
    }

    pub fn row(&self, index: usize) -> ArrayView1<'_, f64> {
        self.values.row(index)
    }

    /// Value of a named feature in a row
    pub fn get_by_name(&self, row: usize, name: &str) -> Option<f64> {
        let col = super::layout::feature_index(name)?;
        self.values.get((row, col)).copied()
    }

    /// Copy of the selected rows, in the given order
    pub fn select_rows(&self, indices: &[usize]) -> Array2<f64> {
        self.values.select(Axis(0), indices)
    }

    pub fn is_compatible(&self) -> bool {
        self.version == FEATURE_VERSION
            && self.layout_hash == layout_hash()
            && self.width() == FEATURE_COUNT
    }

    /// Convert one row to a JSON-serializable form for logging
    pub fn row_log_entry(&self, row: usize) -> serde_json::Value {
        let named: serde_json::Map<String, serde_json::Value> = FEATURE_LAYOUT
            .iter()
            .zip(self.values.row(row).iter())
            .map(|(name, value)| (name.to_string(), serde_json::json!(value)))
            .collect();
        serde_json::json!({
            "feature_version": self.version,
            "layout_hash": self.layout_hash,
            "values": named,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros_is_compatible() {
        let m = FeatureMatrix::zeros(3);
        assert_eq!(m.rows(), 3);
        assert_eq!(m.width(), FEATURE_COUNT);
        assert!(m.is_compatible());
    }

    #[test]
    fn test_wrong_width_is_incompatible() {
        let m = FeatureMatrix::new(Array2::zeros((2, FEATURE_COUNT - 1)));
        assert!(!m.is_compatible());
    }

    #[test]
    fn test_select_rows_and_log_entry() {
        let mut m = FeatureMatrix::zeros(3);
        m.values[[2, 0]] = 23.0;
        let picked = m.select_rows(&[2, 0]);
        assert_eq!(picked[[0, 0]], 23.0);
        assert_eq!(picked[[1, 0]], 0.0);

        let entry = m.row_log_entry(2);
        assert_eq!(entry["values"]["hour_of_day"], 23.0);
        assert_eq!(m.get_by_name(2, "hour_of_day"), Some(23.0));
    }
}
