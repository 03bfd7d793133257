use crate::proc::timeutil::to_epoch_seconds;
use anyhow::{Result, anyhow};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// Parser output: one raw file's worth of records as parallel columns.
///
/// `timestamps` and every entry of `fields` share length N; the batch is an
/// unordered bag until the merge engine filters and sorts it. `scalars`
/// carry per-deployment constants (lat, lon, nominal depth) that are not
/// time-indexed.
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    pub timestamps: Vec<NaiveDateTime>,
    pub fields: BTreeMap<String, Vec<f64>>,
    pub scalars: BTreeMap<String, f64>,
}

impl RecordBatch {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn epoch_seconds(&self) -> Vec<i64> {
        self.timestamps.iter().map(|dt| to_epoch_seconds(*dt)).collect()
    }

    /// Column lengths must all match the timestamp axis.
    pub fn validate(&self) -> Result<()> {
        let n = self.timestamps.len();
        for (name, column) in &self.fields {
            if column.len() != n {
                return Err(anyhow!(
                    "field `{name}` has {} values for {n} timestamps",
                    column.len()
                ));
            }
        }
        Ok(())
    }

    /// Extract the records at `indices`, in the given order.
    pub fn subset(&self, indices: &[usize]) -> RecordBatch {
        let timestamps = indices.iter().map(|&i| self.timestamps[i]).collect();
        let fields = self
            .fields
            .iter()
            .map(|(name, column)| {
                let picked: Vec<f64> = indices.iter().map(|&i| column[i]).collect();
                (name.clone(), picked)
            })
            .collect();
        RecordBatch {
            timestamps,
            fields,
            scalars: self.scalars.clone(),
        }
    }
}

/// The single authoritative attribution test: a record belongs to this
/// merge iff its timestamp lies inside both the revision validity window
/// and the processing window. Returns indices sorted by record timestamp
/// (ties keep input order) so appends are always time-monotonic, even for
/// raw files with internally out-of-order records.
pub fn included_indices(
    batch: &RecordBatch,
    validity_start: NaiveDateTime,
    validity_end: NaiveDateTime,
    proc_start: NaiveDateTime,
    proc_end: NaiveDateTime,
) -> Vec<usize> {
    let mut indices: Vec<usize> = batch
        .timestamps
        .iter()
        .enumerate()
        .filter(|&(_, &t)| {
            t >= validity_start && t <= validity_end && t >= proc_start && t <= proc_end
        })
        .map(|(i, _)| i)
        .collect();
    indices.sort_by_key(|&i| batch.timestamps[i]);
    indices
}
