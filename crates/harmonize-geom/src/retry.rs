use std::panic::{self, AssertUnwindSafe};

use geo::{Buffer, MultiPolygon};

/// Buffer-smoothing radii for retrying a geometry transform that keeps
/// failing on numerically degenerate input (C1 in the harmonization engine).
///
/// Both flavors below share the same schedule: start at `start`, double on
/// each attempt, and on the first overshoot of `cap` perturb back down to
/// `start * 1.01` and try once more before giving up for good. The
/// perturbation exists because hitting the cap is usually a sign the input
/// sits on an exact floating-point fixed point; nudging the radius is enough
/// to dodge it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferSchedule {
    pub start: f64,
    pub cap: f64,
}

impl Default for BufferSchedule {
    fn default() -> Self {
        Self { start: 2f64.powi(-16), cap: 2f64.powi(-8) }
    }
}

impl BufferSchedule {
    pub fn new(start: f64, cap: f64) -> Self {
        Self { start, cap }
    }

    fn smooth(geom: &MultiPolygon<f64>, radius: f64) -> MultiPolygon<f64> {
        geom.buffer(radius).buffer(-radius)
    }

    /// Exception-driven retry: call `f(geom)`, and whenever it panics
    /// (the stand-in here for the source system's topology exceptions, since
    /// `geo`'s boolean-op backend doesn't raise typed topology errors), smooth
    /// `geom` with the next buffer radius and try again.
    pub fn retry_on_panic<T>(
        &self,
        geom: MultiPolygon<f64>,
        mut f: impl FnMut(&MultiPolygon<f64>) -> T,
    ) -> anyhow::Result<T> {
        let mut geom = geom;
        let mut radius = self.start;
        let mut perturbed = false;

        loop {
            match panic::catch_unwind(AssertUnwindSafe(|| f(&geom))) {
                Ok(value) => return Ok(value),
                Err(cause) => {
                    if radius > self.cap {
                        if perturbed {
                            return Err(anyhow::anyhow!(
                                "{}: buffer-retry schedule exhausted at radius {radius} (cap {})",
                                panic_message(&cause),
                                self.cap,
                            ));
                        }
                        radius = self.start * 1.01;
                        perturbed = true;
                    }
                    eprintln!(
                        "[harmonize-geom] recovered from {} by smoothing at buffer radius {radius}",
                        panic_message(&cause),
                    );
                    geom = Self::smooth(&geom, radius);
                    radius *= 2.0;
                }
            }
        }
    }

    /// Predicate-driven retry: call `f(geom)` once, then while `is_broken`
    /// reports the result is still unacceptable, smooth the *input* and
    /// re-run `f`, following the same radius schedule.
    pub fn retry_on_condition<T>(
        &self,
        geom: MultiPolygon<f64>,
        mut f: impl FnMut(&MultiPolygon<f64>) -> T,
        is_broken: impl Fn(&T) -> bool,
    ) -> anyhow::Result<T> {
        let mut geom = geom;
        let mut radius = self.start;
        let mut perturbed = false;
        let mut result = f(&geom);

        while is_broken(&result) {
            if radius > self.cap {
                if perturbed {
                    anyhow::bail!(
                        "retry condition still met after buffer-retry schedule exhausted at radius {radius} (cap {})",
                        self.cap,
                    );
                }
                radius = self.start * 1.01;
                perturbed = true;
            }
            geom = Self::smooth(&geom, radius);
            radius *= 2.0;
            result = f(&geom);
        }

        Ok(result)
    }
}

fn panic_message(cause: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = cause.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = cause.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area};

    fn square(side: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: side, y: 0.0),
            (x: side, y: side),
            (x: 0.0, y: side),
        ]])
    }

    #[test]
    fn retry_on_panic_succeeds_without_retrying_when_f_succeeds() {
        let schedule = BufferSchedule::default();
        let result = schedule
            .retry_on_panic(square(10.0), |g| g.unsigned_area())
            .unwrap();
        assert!((result - 100.0).abs() < 1e-6);
    }

    #[test]
    fn retry_on_panic_smooths_and_recovers() {
        let schedule = BufferSchedule::default();
        let mut calls = 0;
        let result = schedule
            .retry_on_panic(square(10.0), |g| {
                calls += 1;
                if calls < 3 {
                    panic!("synthetic topology exception");
                }
                g.unsigned_area()
            })
            .unwrap();
        assert!(calls >= 3);
        assert!((result - 100.0).abs() < 1.0);
    }

    #[test]
    fn retry_on_condition_stops_once_condition_clears() {
        let schedule = BufferSchedule::default();
        let mut calls = 0;
        let result = schedule
            .retry_on_condition(
                square(10.0),
                |g| {
                    calls += 1;
                    (calls, g.unsigned_area())
                },
                |(calls, _)| *calls < 2,
            )
            .unwrap();
        assert_eq!(result.0, 2);
    }
}
