//! The tabular I/O boundary (SPEC_FULL.md §6 / §11): coarse, detailed, and
//! metrics tables cross this module as CSV with a WKT geometry column,
//! following the teacher's `src/io/csv/{read,write}.rs` split. Everything on
//! the inside of this boundary is the row-oriented `model`/`metrics` structs,
//! never a `polars::DataFrame`.

mod csv;

pub use csv::{
    read_coarse_csv, read_detailed_csv, write_algorithm_metrics_csv, write_output_csv,
    write_performance_metrics_csv,
};
