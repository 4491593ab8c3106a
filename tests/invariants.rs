//! Property-style checks for the global invariants in SPEC_FULL.md §3:
//! coverage, disjointness, polygon-only output, and idempotence under a
//! second harmonization pass.

use geo::{polygon, Area, BooleanOps, MultiPolygon, Polygon};
use shape_harmonizer::{CoarseInput, DetailedRow, Harmonizer, OutputRow};

fn square(x0: f64, y0: f64, side: f64) -> Polygon<f64> {
    polygon![
        (x: x0, y: y0),
        (x: x0 + side, y: y0),
        (x: x0 + side, y: y0 + side),
        (x: x0, y: y0 + side),
    ]
}

fn sample_inputs() -> (Vec<CoarseInput>, Vec<DetailedRow>) {
    let coarse = vec![
        CoarseInput {
            shape_id: "north".to_string(),
            shape_name: "North".to_string(),
            path_to_top_parent: "north".to_string(),
            level: 0,
            geometry: MultiPolygon(vec![square(0.0, 0.0, 10.0)]),
        },
        CoarseInput {
            shape_id: "south".to_string(),
            shape_name: "South".to_string(),
            path_to_top_parent: "south".to_string(),
            level: 0,
            geometry: MultiPolygon(vec![square(0.0, 20.0, 10.0)]),
        },
    ];
    let detailed = vec![
        DetailedRow {
            shape_id: "a".to_string(),
            shape_name: "A".to_string(),
            level: 1,
            geometry: MultiPolygon(vec![square(0.0, 0.0, 6.0)]),
        },
        DetailedRow {
            shape_id: "b".to_string(),
            shape_name: "B".to_string(),
            level: 1,
            geometry: MultiPolygon(vec![square(0.0, 20.0, 10.0)]),
        },
    ];
    (coarse, detailed)
}

fn output_is_within_one_parent(rows: &[OutputRow], parent_id: &str) -> Vec<&OutputRow> {
    rows.iter().filter(|r| r.parent_id == parent_id).collect()
}

#[test]
fn every_output_row_is_a_single_polygon() {
    let (coarse, detailed) = sample_inputs();
    let report = Harmonizer::default().run(coarse, detailed).unwrap();
    assert!(report.failures.is_empty());
    for row in &report.rows {
        assert!(row.geometry.exterior().0.len() >= 4);
    }
}

#[test]
fn coverage_matches_each_coarse_parent_area() {
    let (coarse, detailed) = sample_inputs();
    let coarse_areas: Vec<(String, f64)> = coarse
        .iter()
        .map(|c| (c.shape_id.clone(), c.geometry.unsigned_area()))
        .collect();
    let report = Harmonizer::default().run(coarse, detailed).unwrap();
    assert!(report.failures.is_empty());

    for (parent_id, area) in coarse_areas {
        let rows = output_is_within_one_parent(&report.rows, &parent_id);
        let total: f64 = rows.iter().map(|r| r.geometry.unsigned_area()).sum();
        assert!((total - area).abs() < 1e-3, "parent {parent_id}: {total} != {area}");
    }
}

#[test]
fn output_rows_within_a_parent_are_pairwise_disjoint() {
    let (coarse, detailed) = sample_inputs();
    let report = Harmonizer::default().run(coarse, detailed).unwrap();
    assert!(report.failures.is_empty());

    for row in &report.rows {
        let rows = output_is_within_one_parent(&report.rows, &row.parent_id);
        for i in 0..rows.len() {
            for j in (i + 1)..rows.len() {
                let inter = BooleanOps::intersection(
                    &MultiPolygon(vec![rows[i].geometry.clone()]),
                    &MultiPolygon(vec![rows[j].geometry.clone()]),
                );
                let overlap: f64 = inter.0.iter().map(|p| p.unsigned_area()).sum();
                assert!(overlap < 1e-6);
            }
        }
    }
}

#[test]
fn harmonizing_the_output_again_is_idempotent() {
    let (coarse, detailed) = sample_inputs();
    let first = Harmonizer::default().run(coarse.clone(), detailed).unwrap();
    assert!(first.failures.is_empty());
    let first_total: f64 = first.rows.iter().map(|r| r.geometry.unsigned_area()).sum();

    let reharmonized_detailed: Vec<DetailedRow> = first
        .rows
        .iter()
        .map(|r| DetailedRow {
            shape_id: r.shape_id.clone(),
            shape_name: r.shape_name.clone(),
            level: r.level,
            geometry: MultiPolygon(vec![r.geometry.clone()]),
        })
        .collect();

    let second = Harmonizer::default().run(coarse, reharmonized_detailed).unwrap();
    assert!(second.failures.is_empty());
    let second_total: f64 = second.rows.iter().map(|r| r.geometry.unsigned_area()).sum();
    assert!((first_total - second_total).abs() < 1e-3);
}
