//! Minimum enclosing circle, needed for the compactness statistic in C3
//! (`compactness = area / area(minimum bounding circle)`). `geo` doesn't ship
//! this algorithm, so it follows the teacher's `algorithm/<name>.rs`
//! submodule convention for adding one.

use geo::{Coord, MultiPolygon, Polygon};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Coord<f64>,
    pub radius: f64,
}

impl Circle {
    pub fn area(&self) -> f64 {
        std::f64::consts::PI * self.radius * self.radius
    }

    fn contains(&self, p: Coord<f64>, eps: f64) -> bool {
        dist2(self.center, p) <= (self.radius + eps).powi(2)
    }
}

pub trait MinimumBoundingCircle {
    /// The smallest circle enclosing every exterior vertex of `self`.
    fn minimum_bounding_circle(&self) -> Circle;
}

impl MinimumBoundingCircle for Polygon<f64> {
    fn minimum_bounding_circle(&self) -> Circle {
        let points: Vec<Coord<f64>> = self.exterior().coords().copied().collect();
        minimum_enclosing_circle(&points)
    }
}

impl MinimumBoundingCircle for MultiPolygon<f64> {
    fn minimum_bounding_circle(&self) -> Circle {
        let points: Vec<Coord<f64>> = self
            .0
            .iter()
            .flat_map(|p| p.exterior().coords().copied())
            .collect();
        minimum_enclosing_circle(&points)
    }
}

fn dist2(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

fn circle_from_2(a: Coord<f64>, b: Coord<f64>) -> Circle {
    let center = Coord { x: (a.x + b.x) / 2.0, y: (a.y + b.y) / 2.0 };
    Circle { center, radius: dist2(center, a).sqrt() }
}

fn circle_from_3(a: Coord<f64>, b: Coord<f64>, c: Coord<f64>) -> Circle {
    let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
    if d.abs() < 1e-12 {
        // Nearly collinear: the circumcircle is unstable, fall back to the
        // largest of the three pairwise circles.
        return [circle_from_2(a, b), circle_from_2(a, c), circle_from_2(b, c)]
            .into_iter()
            .max_by(|x, y| x.radius.total_cmp(&y.radius))
            .unwrap();
    }
    let a2 = a.x * a.x + a.y * a.y;
    let b2 = b.x * b.x + b.y * b.y;
    let c2 = c.x * c.x + c.y * c.y;
    let ux = (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d;
    let uy = (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d;
    let center = Coord { x: ux, y: uy };
    Circle { center, radius: dist2(center, a).sqrt() }
}

/// Welzl's minimum enclosing circle, in its classic deterministic (unshuffled)
/// triple-nested-loop form. Randomizing the point order gives expected O(n)
/// performance; we skip that here (no `rand` dependency, and the fragment
/// vertex counts in this pipeline are small enough that O(n^2)-ish behavior
/// on adversarial order is a non-issue) — correctness does not depend on it.
fn minimum_enclosing_circle(points: &[Coord<f64>]) -> Circle {
    match points.len() {
        0 => Circle { center: Coord { x: 0.0, y: 0.0 }, radius: 0.0 },
        1 => Circle { center: points[0], radius: 0.0 },
        _ => {
            let mut circle = circle_from_2(points[0], points[1]);
            for i in 0..points.len() {
                if circle.contains(points[i], 1e-9) {
                    continue;
                }
                circle = Circle { center: points[i], radius: 0.0 };
                for j in 0..i {
                    if circle.contains(points[j], 1e-9) {
                        continue;
                    }
                    circle = circle_from_2(points[i], points[j]);
                    for k in 0..j {
                        if !circle.contains(points[k], 1e-9) {
                            circle = circle_from_3(points[i], points[j], points[k]);
                        }
                    }
                }
            }
            circle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn square_circle_matches_diagonal() {
        let square = polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
        ];
        let circle = square.minimum_bounding_circle();
        let expected_radius = (10f64 * 10.0 * 2.0).sqrt() / 2.0;
        assert!((circle.radius - expected_radius).abs() < 1e-6);
        assert!((circle.center.x - 5.0).abs() < 1e-6);
        assert!((circle.center.y - 5.0).abs() < 1e-6);
    }

    #[test]
    fn triangle_circumcircle() {
        let triangle = polygon![
            (x: 0.0, y: 0.0),
            (x: 4.0, y: 0.0),
            (x: 0.0, y: 3.0),
        ];
        let circle = triangle.minimum_bounding_circle();
        // Right triangle: the hypotenuse is the diameter.
        assert!((circle.radius - 2.5).abs() < 1e-6);
    }

    #[test]
    fn degenerate_single_point() {
        let circle = minimum_enclosing_circle(&[Coord { x: 1.0, y: 1.0 }]);
        assert_eq!(circle.radius, 0.0);
    }
}
