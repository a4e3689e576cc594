//! Columnar candidate ingest.
//!
//! Placement candidates usually arrive from the RAN-side collectors as Arrow
//! batches with one row per candidate:
//!
//! | column             | type    |
//! |--------------------|---------|
//! | `app_index`        | UInt32  |
//! | `offload_index`    | UInt32  |
//! | `process_index`    | UInt32  |
//! | `rb`               | UInt32  |
//! | `cu`               | UInt32  |
//! | `utility`          | Float64 |
//! | `max_offload_time` | Float64 |
//!
//! Index columns are positions into the epoch's application and node lists,
//! not identifiers.

use std::fs::File;
use std::path::Path;

use arrow::array::{Array, Float64Array, UInt32Array};
use arrow::ipc::reader::FileReader;
use arrow::record_batch::RecordBatch;
use mec_types::PlacementCandidate;
use thiserror::Error;

pub const APP_INDEX_COL: &str = "app_index";
pub const OFFLOAD_INDEX_COL: &str = "offload_index";
pub const PROCESS_INDEX_COL: &str = "process_index";
pub const RB_COL: &str = "rb";
pub const CU_COL: &str = "cu";
pub const UTILITY_COL: &str = "utility";
pub const MAX_OFFLOAD_TIME_COL: &str = "max_offload_time";

#[derive(Debug, Error)]
pub enum CandidateBuildError {
    #[error("missing column '{0}'")]
    MissingColumn(String),
    #[error("invalid type for column '{0}'")]
    InvalidColumnType(String),
    #[error("null value in column '{column}' at row {row}")]
    NullValue { column: String, row: usize },
    #[error("reading candidate file: {0}")]
    Io(#[from] std::io::Error),
    #[error("decoding candidate file: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

fn column<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a T, CandidateBuildError> {
    let idx = batch
        .schema()
        .index_of(name)
        .map_err(|_| CandidateBuildError::MissingColumn(name.to_string()))?;
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| CandidateBuildError::InvalidColumnType(name.to_string()))
}

fn u32_at(array: &UInt32Array, name: &str, row: usize) -> Result<u32, CandidateBuildError> {
    if array.is_null(row) {
        return Err(CandidateBuildError::NullValue {
            column: name.to_string(),
            row,
        });
    }
    Ok(array.value(row))
}

fn f64_at(array: &Float64Array, name: &str, row: usize) -> Result<f64, CandidateBuildError> {
    if array.is_null(row) {
        return Err(CandidateBuildError::NullValue {
            column: name.to_string(),
            row,
        });
    }
    Ok(array.value(row))
}

/// Convert a candidate batch into placement candidates, in row order.
///
/// Index ranges and utility values are not checked here; `CandidateSet::validate`
/// does that once the application and node lists are known.
pub fn record_batch_to_candidates(
    batch: &RecordBatch,
) -> Result<Vec<PlacementCandidate>, CandidateBuildError> {
    let app = column::<UInt32Array>(batch, APP_INDEX_COL)?;
    let offload = column::<UInt32Array>(batch, OFFLOAD_INDEX_COL)?;
    let process = column::<UInt32Array>(batch, PROCESS_INDEX_COL)?;
    let rb = column::<UInt32Array>(batch, RB_COL)?;
    let cu = column::<UInt32Array>(batch, CU_COL)?;
    let utility = column::<Float64Array>(batch, UTILITY_COL)?;
    let max_offload_time = column::<Float64Array>(batch, MAX_OFFLOAD_TIME_COL)?;

    let mut out = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        out.push(PlacementCandidate {
            app_index: u32_at(app, APP_INDEX_COL, row)? as usize,
            offload_index: u32_at(offload, OFFLOAD_INDEX_COL, row)? as usize,
            process_index: u32_at(process, PROCESS_INDEX_COL, row)? as usize,
            rb_demand: u32_at(rb, RB_COL, row)?,
            cu_demand: u32_at(cu, CU_COL, row)?,
            utility: f64_at(utility, UTILITY_COL, row)?,
            max_offload_time: f64_at(max_offload_time, MAX_OFFLOAD_TIME_COL, row)?,
        });
    }
    Ok(out)
}

/// Read every batch of an Arrow IPC file and concatenate the candidates.
pub fn read_ipc_candidates(
    path: impl AsRef<Path>,
) -> Result<Vec<PlacementCandidate>, CandidateBuildError> {
    let reader = FileReader::try_new(File::open(path)?, None)?;
    let mut out = Vec::new();
    for batch in reader {
        out.extend(record_batch_to_candidates(&batch?)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{ArrayRef, Int32Array};
    use arrow::datatypes::{DataType, Field, Schema};

    use super::*;

    fn batch(rb: ArrayRef, utility: Vec<Option<f64>>) -> RecordBatch {
        let u32_field = |name: &str| Field::new(name, DataType::UInt32, true);
        let rb_type = rb.data_type().clone();
        let schema = Schema::new(vec![
            u32_field(APP_INDEX_COL),
            u32_field(OFFLOAD_INDEX_COL),
            u32_field(PROCESS_INDEX_COL),
            Field::new(RB_COL, rb_type, true),
            u32_field(CU_COL),
            Field::new(UTILITY_COL, DataType::Float64, true),
            Field::new(MAX_OFFLOAD_TIME_COL, DataType::Float64, true),
        ]);
        let columns: Vec<ArrayRef> = vec![
            Arc::new(UInt32Array::from(vec![0, 1])),
            Arc::new(UInt32Array::from(vec![0, 0])),
            Arc::new(UInt32Array::from(vec![0, 1])),
            rb,
            Arc::new(UInt32Array::from(vec![3, 4])),
            Arc::new(Float64Array::from(utility)),
            Arc::new(Float64Array::from(vec![0.01, 0.02])),
        ];
        RecordBatch::try_new(Arc::new(schema), columns).unwrap()
    }

    #[test]
    fn converts_rows_in_order() {
        let b = batch(
            Arc::new(UInt32Array::from(vec![5, 6])),
            vec![Some(10.0), Some(2.5)],
        );
        let candidates = record_batch_to_candidates(&b).unwrap();
        assert_eq!(
            candidates,
            vec![
                PlacementCandidate::local(0, 0, 5, 3, 10.0, 0.01),
                PlacementCandidate::forwarded(1, 0, 1, 6, 4, 2.5, 0.02),
            ]
        );
    }

    #[test]
    fn rejects_wrong_types_and_nulls() {
        let b = batch(Arc::new(Int32Array::from(vec![5, 6])), vec![Some(1.0), Some(1.0)]);
        assert!(matches!(
            record_batch_to_candidates(&b),
            Err(CandidateBuildError::InvalidColumnType(c)) if c == RB_COL
        ));

        let b = batch(Arc::new(UInt32Array::from(vec![5, 6])), vec![Some(1.0), None]);
        assert!(matches!(
            record_batch_to_candidates(&b),
            Err(CandidateBuildError::NullValue { row: 1, .. })
        ));
    }

    #[test]
    fn rejects_missing_column() {
        let schema = Schema::new(vec![Field::new(APP_INDEX_COL, DataType::UInt32, false)]);
        let b = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(UInt32Array::from(vec![0])) as ArrayRef],
        )
        .unwrap();
        assert!(matches!(
            record_batch_to_candidates(&b),
            Err(CandidateBuildError::MissingColumn(c)) if c == OFFLOAD_INDEX_COL
        ));
    }

    #[test]
    fn reads_all_batches_of_an_ipc_file() {
        use arrow::ipc::writer::FileWriter;

        let first = batch(Arc::new(UInt32Array::from(vec![5, 6])), vec![Some(1.0), Some(2.0)]);
        let second = batch(Arc::new(UInt32Array::from(vec![7, 8])), vec![Some(3.0), Some(4.0)]);
        let path = std::env::temp_dir().join(format!("mec-candidates-{}.arrow", uuid::Uuid::new_v4()));
        {
            let file = File::create(&path).unwrap();
            let mut writer = FileWriter::try_new(file, &first.schema()).unwrap();
            writer.write(&first).unwrap();
            writer.write(&second).unwrap();
            writer.finish().unwrap();
        }

        let candidates = read_ipc_candidates(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(candidates.len(), 4);
        assert_eq!(candidates[2].rb_demand, 7);
        assert_eq!(candidates[3].utility, 4.0);
        assert!(matches!(
            read_ipc_candidates(&path),
            Err(CandidateBuildError::Io(_))
        ));
    }
}
