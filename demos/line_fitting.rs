//! Example: robust line fitting with every policy
//!
//! Generates points on `y = 2x + 1` with noise, adds outliers, and fits a
//! line through each of the five estimators. Run with `RUST_LOG=debug` to
//! see the estimators' progress.

use nalgebra::Vector2;
use rand::seq::SliceRandom;
use rand::Rng;
use robust_fit::{
    EstimatorBase, EstimatorListener, ListenerResult, LmedsEstimator, MsacEstimator,
    PromedsEstimator, ProsacEstimator, QualityListener, RansacEstimator, RobustEstimator,
    ThresholdListener,
};

#[derive(Debug, Clone, Copy)]
struct Line {
    normal: Vector2<f64>,
    offset: f64,
}

impl Line {
    fn slope_intercept(&self) -> Option<(f64, f64)> {
        (self.normal.y.abs() > 1e-12)
            .then(|| (-self.normal.x / self.normal.y, -self.offset / self.normal.y))
    }
}

struct LineProblem {
    points: Vec<Vector2<f64>>,
    quality: Vec<f64>,
    threshold: f64,
}

impl EstimatorListener for LineProblem {
    type Model = Line;

    fn total_samples(&self) -> usize {
        self.points.len()
    }

    fn subset_size(&self) -> usize {
        2
    }

    fn estimate_candidates(

        &mut self,

        subset: &[usize],

        candidates: &mut Vec<Line>,

    ) -> ListenerResult<()> {
        let p = self.points[subset[0]];
        let d = self.points[subset[1]] - p;
        if d.norm() > 1e-9 {
            let normal = Vector2::new(-d.y, d.x).normalize();
            candidates.push(Line {
                normal,
                offset: -normal.dot(&p),
            });
        }
        Ok(())
    }

    fn residual(&self, line: &Line, index: usize) -> f64 {
        (line.normal.dot(&self.points[index]) + line.offset).abs()
    }

    fn on_estimate_progress_change(&mut self, estimator: &EstimatorBase, progress: f64) {
        log::info!("{}: {:.0}%", estimator.method(), progress * 100.0);
    }
}

impl ThresholdListener for LineProblem {
    fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl QualityListener for LineProblem {
    fn quality_scores(&self) -> &[f64] {
        &self.quality
    }
}

fn make_problem(n_inliers: usize, n_outliers: usize) -> LineProblem {
    let mut rng = rand::thread_rng();
    let mut samples = Vec::with_capacity(n_inliers + n_outliers);

    for i in 0..n_inliers {
        let x = i as f64 * 0.2 - 6.0;
        let y = 2.0 * x + 1.0 + rng.gen_range(-0.3..0.3);
        // Quality stands in for a matcher score: inliers tend to score higher.
        samples.push((Vector2::new(x, y), rng.gen_range(0.4..1.0)));
    }
    for _ in 0..n_outliers {
        let p = Vector2::new(rng.gen_range(-10.0..10.0), rng.gen_range(-20.0..20.0));
        samples.push((p, rng.gen_range(0.0..0.6)));
    }
    samples.shuffle(&mut rng);

    let (points, quality) = samples.into_iter().unzip();
    LineProblem {
        points,
        quality,
        threshold: 0.5,
    }
}

fn report<E>(mut estimator: E, n_total: usize) -> Result<(), Box<dyn std::error::Error>>
where
    E: RobustEstimator<Model = Line>,
{
    let method = estimator.method();
    let result = estimator.estimate()?;
    print!("{method:>8}: {:>5} iterations", result.iterations);
    if let Some((slope, intercept)) = result.model.slope_intercept() {
        print!(", y = {slope:.4}x + {intercept:.4}");
    }
    println!(" ({n_total} points)");
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    println!("=== Robust Line Fitting Example ===\n");
    println!("True line: y = 2.00x + 1.00\n");

    let (n_inliers, n_outliers) = (60, 25);
    let n_total = n_inliers + n_outliers;

    let mut ransac = RansacEstimator::with_listener(make_problem(n_inliers, n_outliers));
    ransac.set_keep_inliers(true)?;
    let result = ransac.estimate()?;
    println!(
        "RANSAC found {} inliers out of {} points",
        result.inliers.num_inliers(),
        n_total
    );

    report(LmedsEstimator::with_listener(make_problem(n_inliers, n_outliers)), n_total)?;
    report(MsacEstimator::with_listener(make_problem(n_inliers, n_outliers)), n_total)?;
    report(ProsacEstimator::with_listener(make_problem(n_inliers, n_outliers)), n_total)?;
    report(PromedsEstimator::with_listener(make_problem(n_inliers, n_outliers)), n_total)?;

    Ok(())
}
