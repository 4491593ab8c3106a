//! C7: the orchestrator. Ties C2-C6 into the iterate-until-stable loop
//! described in SPEC_FULL.md §4.7, running each coarse parent independently
//! (and, via `rayon`, concurrently — see §5) and reporting a metrics row per
//! parent plus a combined set of output rows.

use ahash::AHashMap;
use anyhow::Result;
use geo::{Area, BooleanOps};
use harmonize_geom::BufferSchedule;
use rayon::prelude::*;

use crate::classify::{classify_mergeability, ClassifyThresholds};
use crate::error::Fatal;
use crate::merge::{collapse_mergeable_geometries, MergeStrategy};
use crate::metrics::{AlgorithmMetrics, AlgorithmMetricsRow, PerformanceMetrics};
use crate::model::{
    fragments_to_detailed, restore_parent_id, CoarseInput, CoarseRow, DetailedRow, Fragment, OutputRow,
};
use crate::overlap::eliminate_overlaps;
use crate::partition::partition_geometries;
use crate::repair::repair_multipolygons;

/// Area-error tolerance (percent) below which C6's overlap correction is
/// applied; above it, a parent's output is left as-is and the error is
/// reported rather than risking further geometric distortion.
const AREA_CORRECTION_GATE_PCT: f64 = 0.2;

/// A collapse loop stops relaxing mergeability once both the absolute
/// mergeable area (km^2) and its share of the parent's area drop below these
/// floors; whatever's left is dropped at the end of the loop.
const MERGEABLE_AREA_FLOOR_KM2: f64 = 1e-4;
const MERGEABLE_PERCENT_FLOOR: f64 = 1e-4;

#[derive(Debug, Clone, Copy)]
pub struct Harmonizer {
    pub max_step_iterations: usize,
    pub classify: ClassifyThresholds,
    pub merge_strategy: MergeStrategy,
    pub buffer_schedule: BufferSchedule,
}

impl Default for Harmonizer {
    fn default() -> Self {
        Self {
            max_step_iterations: 5,
            classify: ClassifyThresholds::default(),
            merge_strategy: MergeStrategy::default(),
            buffer_schedule: BufferSchedule::default(),
        }
    }
}

pub struct ParentFailure {
    pub parent_id: String,
    pub error: anyhow::Error,
}

pub struct HarmonizeReport {
    pub rows: Vec<OutputRow>,
    pub failures: Vec<ParentFailure>,
    pub algorithm_metrics: AlgorithmMetrics,
    pub performance_metrics: PerformanceMetrics,
}

impl Harmonizer {
    pub fn run(&self, coarse: Vec<CoarseInput>, detailed: Vec<DetailedRow>) -> Result<HarmonizeReport> {
        let coarse_rows = crate::model::explode_coarse(coarse)?;

        let mut performance = PerformanceMetrics::default();
        let mut fragments = performance.timed("partition_geometries", || {
            partition_geometries(&coarse_rows, &detailed, &self.buffer_schedule)
        })?;
        classify_mergeability(&mut fragments, &self.classify);

        let mut by_parent: AHashMap<String, Vec<Fragment>> = AHashMap::default();
        for f in fragments.drain(..) {
            by_parent.entry(f.parent_id.clone()).or_default().push(f);
        }

        let outcomes: Vec<ParentOutcome> = coarse_rows
            .par_iter()
            .map(|coarse_row| {
                let parent_fragments = by_parent.get(&coarse_row.shape_id).cloned().unwrap_or_default();
                self.process_parent(coarse_row, parent_fragments)
            })
            .collect();

        let mut report = HarmonizeReport {
            rows: Vec::new(),
            failures: Vec::new(),
            algorithm_metrics: AlgorithmMetrics::default(),
            performance_metrics: performance,
        };
        for outcome in outcomes {
            report.performance_metrics.merge(outcome.performance);
            report.algorithm_metrics.push(outcome.metrics);
            match outcome.result {
                Ok(rows) => report.rows.extend(rows),
                Err(error) => report.failures.push(ParentFailure {
                    parent_id: outcome.parent_id,
                    error,
                }),
            }
        }
        renumber_outputs(&mut report.rows);
        Ok(report)
    }

    fn process_parent(&self, coarse_row: &CoarseRow, fragments: Vec<Fragment>) -> ParentOutcome {
        let mut perf = PerformanceMetrics::default();
        let result = self.process_parent_inner(coarse_row, fragments, &mut perf);
        let metrics = match &result {
            Ok((_, metrics)) => metrics.clone(),
            Err(_) => AlgorithmMetricsRow {
                parent_id: coarse_row.shape_id.clone(),
                ..Default::default()
            },
        };
        ParentOutcome {
            parent_id: coarse_row.shape_id.clone(),
            result: result.map(|(rows, _)| rows),
            metrics,
            performance: perf,
        }
    }

    fn process_parent_inner(
        &self,
        coarse_row: &CoarseRow,
        fragments: Vec<Fragment>,
        perf: &mut PerformanceMetrics,
    ) -> Result<(Vec<OutputRow>, AlgorithmMetricsRow)> {
        let start = std::time::Instant::now();
        println!(
            "[harmonize] parent {}: starting collapse loop over {} fragment(s)",
            coarse_row.shape_id,
            fragments.len()
        );

        let mut current = if !fragments.is_empty() && fragments.iter().all(|f| f.mergeable) {
            vec![dissolve_all_to_parent(&fragments, coarse_row)]
        } else {
            fragments
        };

        let start_stats = merge_stats(&current);
        let mut stats = start_stats;
        let mut iterations = 0u32;

        while (iterations as usize) < self.max_step_iterations
            && (stats.mergeable_area_km2 > MERGEABLE_AREA_FLOOR_KM2
                || stats.mergeable_percent > MERGEABLE_PERCENT_FLOOR)
        {
            let collapsed = perf.timed("collapse_mergeable_geometries", || {
                collapse_mergeable_geometries(current, &self.merge_strategy, &self.buffer_schedule)
            })?;
            let repaired = perf.timed("repair_multipolygons", || repair_multipolygons(collapsed))?;
            let detailed_rows = fragments_to_detailed(&repaired);
            current = perf.timed("partition_geometries", || {
                partition_geometries(std::slice::from_ref(coarse_row), &detailed_rows, &self.buffer_schedule)
            })?;
            classify_mergeability(&mut current, &self.classify);
            stats = merge_stats(&current);
            iterations += 1;
        }

        // Snapshot end-of-collapse stats before dropping the remaining
        // mergeable rows below: SPEC_FULL §6's "mergeable area/percent at
        // end of collapse" is whatever didn't converge, not zero.
        let end_stats = stats;

        current.retain(|f| !f.mergeable);

        let bad: Vec<usize> = current
            .iter()
            .enumerate()
            .filter(|(_, f)| !f.is_single_polygon())
            .map(|(i, _)| i)
            .collect();
        if !bad.is_empty() {
            return Err(Fatal::NonPolygonOutput {
                parent_id: coarse_row.shape_id.clone(),
                count: bad.len(),
                state: serde_json::to_string(&current).unwrap_or_else(|_| format!("{current:?}")),
            }
            .into());
        }

        let coarse_area = coarse_row.geometry.unsigned_area();
        let area_error_start_pct = area_error_pct(&current, coarse_area);
        if area_error_start_pct.abs() < AREA_CORRECTION_GATE_PCT {
            current = perf.timed("eliminate_overlaps", || eliminate_overlaps(current))?;
        } else {
            println!(
                "[harmonize] parent {}: area error {area_error_start_pct:.4}% at or above the {AREA_CORRECTION_GATE_PCT}% gate, skipping overlap correction",
                coarse_row.shape_id,
            );
        }
        let area_error_end_pct = area_error_pct(&current, coarse_area);

        let rows = reidentify(&current, coarse_row);

        let metrics = AlgorithmMetricsRow {
            parent_id: coarse_row.shape_id.clone(),
            reference_area_start: start_stats.reference_area_km2,
            reference_percent_start: start_stats.reference_percent,
            mergeable_area_start: start_stats.mergeable_area_km2,
            mergeable_percent_start: start_stats.mergeable_percent,
            reference_area_end: end_stats.reference_area_km2,
            reference_percent_end: end_stats.reference_percent,
            mergeable_area_end: end_stats.mergeable_area_km2,
            mergeable_percent_end: end_stats.mergeable_percent,
            iterations,
            area_error_start_pct,
            area_error_end_pct,
            processing_time_secs: start.elapsed().as_secs_f64(),
        };

        Ok((rows, metrics))
    }
}

struct ParentOutcome {
    parent_id: String,
    result: Result<Vec<OutputRow>>,
    metrics: AlgorithmMetricsRow,
    performance: PerformanceMetrics,
}

#[derive(Debug, Clone, Copy, Default)]
struct MergeStats {
    reference_area_km2: f64,
    reference_percent: f64,
    mergeable_area_km2: f64,
    mergeable_percent: f64,
}

fn merge_stats(fragments: &[Fragment]) -> MergeStats {
    let mut reference_area = 0.0;
    let mut mergeable_area = 0.0;
    for f in fragments {
        if f.mergeable {
            mergeable_area += f.stats.area;
        } else {
            reference_area += f.stats.area;
        }
    }
    let total = reference_area + mergeable_area;
    MergeStats {
        reference_area_km2: reference_area / 1e6,
        mergeable_area_km2: mergeable_area / 1e6,
        reference_percent: if total > 0.0 { 100.0 * reference_area / total } else { 0.0 },
        mergeable_percent: if total > 0.0 { 100.0 * mergeable_area / total } else { 0.0 },
    }
}

fn area_error_pct(fragments: &[Fragment], coarse_area: f64) -> f64 {
    if coarse_area <= 0.0 {
        return 0.0;
    }
    // Live geometry area, not the `stats.area` cached at the last classify
    // pass: `stats.area` predates C6's overlap correction and would mask a
    // successful correction's effect on the post-correction error figure.
    let total: f64 = fragments.iter().map(|f| f.geometry.unsigned_area()).sum();
    100.0 * (total - coarse_area) / coarse_area
}

/// The degenerate case where every fragment of a parent is mergeable: there's
/// nothing to merge *into*, so the whole partition dissolves straight into a
/// single child carrying the parent's own identity one level down.
fn dissolve_all_to_parent(fragments: &[Fragment], coarse_row: &CoarseRow) -> Fragment {
    let mut geometry = fragments[0].geometry.clone();
    for f in &fragments[1..] {
        geometry = geometry.union(&f.geometry);
    }
    // `merge_stats` reads `stats.area`, so the dissolved row needs it set to
    // the whole-parent area it now covers; it's the only reference fragment
    // in this degenerate parent, so its coarse fraction is 1.0.
    let area = geometry.unsigned_area();
    let stats = crate::model::Stats {
        area,
        coarse_area: area,
        coarse_fraction: 1.0,
        ..crate::model::Stats::default()
    };
    Fragment {
        shape_id: None,
        shape_name: Some(coarse_row.shape_name.clone()),
        parent_id: coarse_row.shape_id.clone(),
        path_to_top_parent: coarse_row.path_to_top_parent.clone(),
        level: Some(coarse_row.level + 1),
        geometry,
        mergeable: false,
        merge_id: None,
        stats,
    }
}

/// Per-parent half of C7 step 8: restores the pre-explode parent identity
/// (stripping any `_{k}` suffix `explode_coarse` added) and stamps every
/// surviving fragment with it, but leaves `shape_id`/`path_to_top_parent`
/// unfinished (empty / suffix-less) — final numbering has to see every part
/// of a once-multipolygon parent together, so it happens once, globally, in
/// `renumber_outputs` after all coarse parents have been processed.
fn reidentify(fragments: &[Fragment], coarse_row: &CoarseRow) -> Vec<OutputRow> {
    let parent_id = restore_parent_id(&coarse_row.shape_id);
    let path_prefix = restore_parent_id(&coarse_row.path_to_top_parent);
    fragments
        .iter()
        .filter_map(|f| {
            let polygon = f.as_polygon()?.clone();
            Some(OutputRow {
                shape_id: String::new(),
                shape_name: f.shape_name.clone().unwrap_or_else(|| coarse_row.shape_name.clone()),
                parent_id: parent_id.clone(),
                path_to_top_parent: path_prefix.clone(),
                level: coarse_row.level + 1,
                geometry: polygon,
            })
        })
        .collect()
}

/// C7 step 8's global half: groups rows by their already-restored
/// `parent_id` (which may span several once-multipolygon parts, e.g. the
/// two islands of a single coarse parent) and renumbers each group `1..m`
/// in encounter order, mirroring the original's post-hoc `set_ids` pass
/// over the concatenated result. `path_to_top_parent` gets the same
/// numeric suffix appended to its restored prefix, so it keeps ending in
/// the row's own final `shape_id`.
fn renumber_outputs(rows: &mut [OutputRow]) {
    let mut next_index: AHashMap<String, u32> = AHashMap::default();
    for row in rows.iter_mut() {
        let n = next_index.entry(row.parent_id.clone()).or_insert(0);
        *n += 1;
        row.shape_id = format!("{}.{n}", row.parent_id);
        row.path_to_top_parent = format!("{}.{n}", row.path_to_top_parent);
    }
}
