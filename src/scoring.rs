//! Inlier snapshots and per-policy scoring.
//!
//! A snapshot records, for a single candidate model, the residual of every
//! sample, which samples are inliers and how many there are, plus whatever
//! statistics the policy derives from them. Estimators keep one scratch
//! snapshot that is rewritten for every candidate and swap it with the best
//! one when the candidate improves, so the residual buffer and the inlier
//! flags always describe the same candidate.

use crate::settings::STD_CONSTANT;
use crate::utils::median_in_place;

/// Residuals and inlier membership of one candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InliersData {
    residuals: Option<Vec<f64>>,
    inliers: Option<Vec<bool>>,
    num_inliers: usize,
}

impl InliersData {
    /// Snapshot over `total` samples, allocating only the requested vectors.
    pub fn new(total: usize, keep_inliers: bool, keep_residuals: bool) -> Self {
        Self {
            residuals: keep_residuals.then(|| vec![0.0; total]),
            inliers: keep_inliers.then(|| vec![false; total]),
            num_inliers: 0,
        }
    }

    /// Residual of every sample, when retained.
    pub fn residuals(&self) -> Option<&[f64]> {
        self.residuals.as_deref()
    }

    /// Inlier flag of every sample, when retained.
    pub fn inliers(&self) -> Option<&[bool]> {
        self.inliers.as_deref()
    }

    pub fn num_inliers(&self) -> usize {
        self.num_inliers
    }

    /// Indices of the inlier samples, when inlier flags are retained.
    pub fn inlier_indices(&self) -> Option<Vec<usize>> {
        self.inliers.as_ref().map(|flags| {
            flags
                .iter()
                .enumerate()
                .filter_map(|(i, &inlier)| inlier.then_some(i))
                .collect()
        })
    }

    /// Drop the per-sample vectors that were not asked for.
    pub(crate) fn retain(&mut self, keep_inliers: bool, keep_residuals: bool) {
        if !keep_inliers {
            self.inliers = None;
        }
        if !keep_residuals {
            self.residuals = None;
        }
    }

    /// Evaluate `residual` for every sample and count inliers as samples with
    /// a residual at most `threshold`. Returns the inlier count.
    pub(crate) fn score_consensus(
        &mut self,
        total: usize,
        threshold: f64,
        mut residual: impl FnMut(usize) -> f64,
    ) -> usize {
        let mut count = 0;
        for i in 0..total {
            let r = residual(i);
            let inlier = r <= threshold;
            if let Some(residuals) = self.residuals.as_mut() {
                residuals[i] = r;
            }
            if let Some(inliers) = self.inliers.as_mut() {
                inliers[i] = inlier;
            }
            count += usize::from(inlier);
        }
        self.num_inliers = count;
        count
    }

    /// Evaluate `residual` for every sample, storing the raw values.
    /// Requires retained residuals.
    pub(crate) fn fill_residuals(&mut self, total: usize, mut residual: impl FnMut(usize) -> f64) {
        if let Some(residuals) = self.residuals.as_mut() {
            for (i, r) in residuals.iter_mut().enumerate().take(total) {
                *r = residual(i);
            }
        }
    }

    /// Reclassify from the stored residuals: inlier iff residual at most
    /// `threshold`. Requires retained residuals and inlier flags.
    pub(crate) fn classify(&mut self, threshold: f64) -> usize {
        let mut count = 0;
        if let (Some(residuals), Some(inliers)) = (self.residuals.as_ref(), self.inliers.as_mut()) {
            for (flag, &r) in inliers.iter_mut().zip(residuals.iter()) {
                *flag = r <= threshold;
                count += usize::from(*flag);
            }
        }
        self.num_inliers = count;
        count
    }

    /// Copy residuals into `scratch` and return their median. The copy keeps
    /// the stored residuals in sample order.
    pub(crate) fn median_residual(&self, scratch: &mut Vec<f64>) -> f64 {
        scratch.clear();
        if let Some(residuals) = self.residuals.as_ref() {
            scratch.extend_from_slice(residuals);
        }
        median_in_place(scratch)
    }
}

/// Robust scale estimate derived from the median residual of a candidate
/// fitted from `subset_size` of `total` samples.
pub fn median_standard_deviation(median: f64, total: usize, subset_size: usize) -> f64 {
    let dof = total.saturating_sub(subset_size).max(1) as f64;
    STD_CONSTANT * (1.0 + 5.0 / dof) * median.sqrt()
}

/// Snapshot of the least-median-of-squares policy.
#[derive(Debug, Clone, PartialEq)]
pub struct LmedsInliersData {
    data: InliersData,
    median_residual: f64,
    estimated_threshold: f64,
    standard_deviation: f64,
}

impl LmedsInliersData {
    pub fn new(total: usize) -> Self {
        Self {
            data: InliersData::new(total, true, true),
            median_residual: f64::INFINITY,
            estimated_threshold: f64::INFINITY,
            standard_deviation: f64::INFINITY,
        }
    }

    pub fn inliers_data(&self) -> &InliersData {
        &self.data
    }

    pub fn num_inliers(&self) -> usize {
        self.data.num_inliers()
    }

    /// Median residual of the candidate this snapshot describes.
    pub fn median_residual(&self) -> f64 {
        self.median_residual
    }

    /// Inlier threshold derived from the median residual.
    pub fn estimated_threshold(&self) -> f64 {
        self.estimated_threshold
    }

    /// Robust standard deviation estimate of the inlier residuals.
    pub fn standard_deviation(&self) -> f64 {
        self.standard_deviation
    }

    pub(crate) fn data_mut(&mut self) -> &mut InliersData {
        &mut self.data
    }

    /// Fill residuals for a new candidate and return their median.
    pub(crate) fn score(
        &mut self,
        total: usize,
        scratch: &mut Vec<f64>,
        residual: impl FnMut(usize) -> f64,
    ) -> f64 {
        self.data.fill_residuals(total, residual);
        self.median_residual = self.data.median_residual(scratch);
        self.median_residual
    }

    /// Derive threshold and scale from the stored median and reclassify.
    /// Returns the inlier count.
    pub(crate) fn derive_threshold(
        &mut self,
        inlier_factor: f64,
        total: usize,
        subset_size: usize,
    ) -> usize {
        self.estimated_threshold = inlier_factor * self.median_residual;
        self.standard_deviation =
            median_standard_deviation(self.median_residual, total, subset_size);
        self.data.classify(self.estimated_threshold)
    }
}

/// Snapshot of the hybrid capped-median policy.
///
/// Residuals are stored capped at the fixed threshold; inlier flags use the
/// raw residual.
#[derive(Debug, Clone, PartialEq)]
pub struct MsacInliersData {
    data: InliersData,
    median_residual: f64,
}

impl MsacInliersData {
    pub fn new(total: usize, keep_inliers: bool) -> Self {
        Self {
            data: InliersData::new(total, keep_inliers, true),
            median_residual: f64::INFINITY,
        }
    }

    pub fn inliers_data(&self) -> &InliersData {
        &self.data
    }

    pub fn num_inliers(&self) -> usize {
        self.data.num_inliers()
    }

    /// Median of the capped residuals.
    pub fn median_residual(&self) -> f64 {
        self.median_residual
    }

    pub(crate) fn retain(&mut self, keep_inliers: bool, keep_residuals: bool) {
        self.data.retain(keep_inliers, keep_residuals);
    }

    /// Score a candidate: residuals above `threshold` are capped to it and
    /// samples with a raw residual strictly below it count as inliers.
    /// Returns `(median of capped residuals, inlier count)`.
    pub(crate) fn score(
        &mut self,
        total: usize,
        threshold: f64,
        scratch: &mut Vec<f64>,
        mut residual: impl FnMut(usize) -> f64,
    ) -> (f64, usize) {
        let mut count = 0;
        for i in 0..total {
            let r = residual(i);
            let inlier = r < threshold;
            if let Some(residuals) = self.data.residuals.as_mut() {
                residuals[i] = r.min(threshold);
            }
            if let Some(inliers) = self.data.inliers.as_mut() {
                inliers[i] = inlier;
            }
            count += usize::from(inlier);
        }
        self.data.num_inliers = count;
        self.median_residual = self.data.median_residual(scratch);
        (self.median_residual, count)
    }
}

/// Snapshot of the progressive median policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PromedsInliersData {
    lmeds: LmedsInliersData,
    fixed_threshold: Option<f64>,
    median_threshold_used: bool,
}

impl PromedsInliersData {
    pub fn new(total: usize) -> Self {
        Self {
            lmeds: LmedsInliersData::new(total),
            fixed_threshold: None,
            median_threshold_used: true,
        }
    }

    pub fn inliers_data(&self) -> &InliersData {
        self.lmeds.inliers_data()
    }

    pub fn num_inliers(&self) -> usize {
        self.lmeds.num_inliers()
    }

    pub fn median_residual(&self) -> f64 {
        self.lmeds.median_residual()
    }

    /// Threshold derived from the median residual.
    pub fn estimated_threshold(&self) -> f64 {
        self.lmeds.estimated_threshold()
    }

    pub fn standard_deviation(&self) -> f64 {
        self.lmeds.standard_deviation()
    }

    /// Whether the classification came from the median-derived threshold
    /// rather than the fixed one.
    pub fn is_median_threshold_used(&self) -> bool {
        self.median_threshold_used
    }

    /// The threshold that produced the stored classification.
    pub fn threshold_used(&self) -> f64 {
        match (self.median_threshold_used, self.fixed_threshold) {
            (false, Some(fixed)) => fixed,
            _ => self.lmeds.estimated_threshold(),
        }
    }

    pub(crate) fn score(
        &mut self,
        total: usize,
        scratch: &mut Vec<f64>,
        residual: impl FnMut(usize) -> f64,
    ) -> f64 {
        self.lmeds.score(total, scratch, residual)
    }

    /// Classify under the median-derived threshold and, when given, the
    /// fixed threshold, keeping whichever yields fewer inliers. Returns the
    /// adopted inlier count.
    pub(crate) fn classify(
        &mut self,
        inlier_factor: f64,
        fixed_threshold: Option<f64>,
        total: usize,
        subset_size: usize,
    ) -> usize {
        let median_count = self.lmeds.derive_threshold(inlier_factor, total, subset_size);
        self.fixed_threshold = fixed_threshold;
        self.median_threshold_used = true;

        let Some(fixed) = fixed_threshold else {
            return median_count;
        };

        let median_threshold = self.lmeds.estimated_threshold;
        let data = self.lmeds.data_mut();
        let fixed_count = data.classify(fixed);
        if fixed_count < median_count {
            self.median_threshold_used = false;
            fixed_count
        } else {
            data.classify(median_threshold)
        }
    }
}
