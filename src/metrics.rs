//! Metrics tables the harmonizer reports alongside its output, mirroring the
//! original `AlgorithmMetrics`/`PerformanceMetrics` model and the teacher's
//! polars-backed CSV boundary (`src/io/csv/{read,write}.rs`): the internal
//! working state here is plain Rust structs, and only the table boundary
//! touches `polars`.

use std::time::Instant;

use ahash::AHashMap;
use anyhow::Result;
use polars::prelude::{DataFrame, NamedFrom, Series};
use serde::Serialize;

/// One row per coarse parent processed: area/percent snapshots at the start
/// and end of the collapse loop, how many iterations it took, and the area
/// error before and after C6's overlap correction.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AlgorithmMetricsRow {
    pub parent_id: String,
    pub reference_area_start: f64,
    pub reference_percent_start: f64,
    pub mergeable_area_start: f64,
    pub mergeable_percent_start: f64,
    pub reference_area_end: f64,
    pub reference_percent_end: f64,
    pub mergeable_area_end: f64,
    pub mergeable_percent_end: f64,
    pub iterations: u32,
    pub area_error_start_pct: f64,
    pub area_error_end_pct: f64,
    pub processing_time_secs: f64,
}

#[derive(Debug, Clone, Default)]
pub struct AlgorithmMetrics {
    pub rows: Vec<AlgorithmMetricsRow>,
}

impl AlgorithmMetrics {
    pub fn push(&mut self, row: AlgorithmMetricsRow) {
        self.rows.push(row);
    }

    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let parent_id: Vec<&str> = self.rows.iter().map(|r| r.parent_id.as_str()).collect();
        let reference_area_start: Vec<f64> = self.rows.iter().map(|r| r.reference_area_start).collect();
        let reference_percent_start: Vec<f64> = self.rows.iter().map(|r| r.reference_percent_start).collect();
        let mergeable_area_start: Vec<f64> = self.rows.iter().map(|r| r.mergeable_area_start).collect();
        let mergeable_percent_start: Vec<f64> = self.rows.iter().map(|r| r.mergeable_percent_start).collect();
        let reference_area_end: Vec<f64> = self.rows.iter().map(|r| r.reference_area_end).collect();
        let reference_percent_end: Vec<f64> = self.rows.iter().map(|r| r.reference_percent_end).collect();
        let mergeable_area_end: Vec<f64> = self.rows.iter().map(|r| r.mergeable_area_end).collect();
        let mergeable_percent_end: Vec<f64> = self.rows.iter().map(|r| r.mergeable_percent_end).collect();
        let iterations: Vec<u32> = self.rows.iter().map(|r| r.iterations).collect();
        let area_error_start_pct: Vec<f64> = self.rows.iter().map(|r| r.area_error_start_pct).collect();
        let area_error_end_pct: Vec<f64> = self.rows.iter().map(|r| r.area_error_end_pct).collect();
        let processing_time_secs: Vec<f64> = self.rows.iter().map(|r| r.processing_time_secs).collect();

        Ok(DataFrame::new(vec![
            Series::new("parent_id".into(), parent_id).into(),
            Series::new("reference_area_start".into(), reference_area_start).into(),
            Series::new("reference_percent_start".into(), reference_percent_start).into(),
            Series::new("mergeable_area_start".into(), mergeable_area_start).into(),
            Series::new("mergeable_percent_start".into(), mergeable_percent_start).into(),
            Series::new("reference_area_end".into(), reference_area_end).into(),
            Series::new("reference_percent_end".into(), reference_percent_end).into(),
            Series::new("mergeable_area_end".into(), mergeable_area_end).into(),
            Series::new("mergeable_percent_end".into(), mergeable_percent_end).into(),
            Series::new("iterations".into(), iterations).into(),
            Series::new("area_error_start_pct".into(), area_error_start_pct).into(),
            Series::new("area_error_end_pct".into(), area_error_end_pct).into(),
            Series::new("processing_time_secs".into(), processing_time_secs).into(),
        ])?)
    }
}

/// Wall-clock accounting per named stage (`partition_geometries`,
/// `collapse_mergeable_geometries`, ...), summed across every call site that
/// reports under that name; see `Harmonizer::run`'s call sites.
#[derive(Debug, Clone, Default)]
pub struct PerformanceMetrics {
    calls: AHashMap<&'static str, (u64, f64)>,
}

impl PerformanceMetrics {
    pub fn timed<T>(&mut self, name: &'static str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed().as_secs_f64();
        let entry = self.calls.entry(name).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += elapsed;
        result
    }

    /// Folds another thread's accounting into this one; used to combine the
    /// per-parent `rayon` workers' local metrics after the parallel fan-out
    /// joins (SPEC_FULL.md §5: updates are serialized after the fact rather
    /// than shared live).
    pub fn merge(&mut self, other: PerformanceMetrics) {
        for (name, (count, secs)) in other.calls {
            let entry = self.calls.entry(name).or_insert((0, 0.0));
            entry.0 += count;
            entry.1 += secs;
        }
    }

    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut names: Vec<&'static str> = self.calls.keys().copied().collect();
        names.sort_unstable();
        let calls: Vec<u64> = names.iter().map(|n| self.calls[n].0).collect();
        let total_secs: Vec<f64> = names.iter().map(|n| self.calls[n].1).collect();
        let grand_total: f64 = total_secs.iter().sum();
        let avg_secs: Vec<f64> = names
            .iter()
            .map(|n| {
                let (count, secs) = self.calls[n];
                if count > 0 { secs / count as f64 } else { 0.0 }
            })
            .collect();
        let share_pct: Vec<f64> = total_secs
            .iter()
            .map(|secs| if grand_total > 0.0 { 100.0 * secs / grand_total } else { 0.0 })
            .collect();

        Ok(DataFrame::new(vec![
            Series::new("stage".into(), names).into(),
            Series::new("calls".into(), calls).into(),
            Series::new("total_secs".into(), total_secs).into(),
            Series::new("avg_secs".into(), avg_secs).into(),
            Series::new("share_pct".into(), share_pct).into(),
        ])?)
    }
}
