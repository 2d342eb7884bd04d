use crate::types::{CoregistrationReport, InsarError, InsarResult, OffsetPolynomial};

/// Hard sanity limit on the constant azimuth offset coefficient after
/// refinement. Exceeding it indicates gross misregistration, not noise,
/// and aborts the run outright.
pub const AZIMUTH_OFFSET_LIMIT: f64 = 0.02;

/// Accept/reject thresholds for a refined offset polynomial
#[derive(Debug, Clone)]
pub struct OffsetThresholds {
    /// Maximum combined model-fit standard deviation, samples
    pub max_error: f64,
    /// Maximum corner offset magnitude on ground, meters
    pub max_offset: f64,
}

impl Default for OffsetThresholds {
    fn default() -> Self {
        Self {
            max_error: 2.0,
            max_offset: 75.0,
        }
    }
}

/// What the validator measured; the decision is a pure function of
/// these two numbers against the thresholds
#[derive(Debug, Clone)]
pub struct OffsetAssessment {
    pub max_corner_offset_m: f64,
    pub combined_stddev: f64,
    pub accepted: bool,
}

/// Decides whether a refined offset polynomial is trustworthy enough to
/// keep, or whether the caller should fall back to dead reckoning
pub struct OffsetValidator {
    thresholds: OffsetThresholds,
}

impl OffsetValidator {
    pub fn new(thresholds: OffsetThresholds) -> Self {
        Self { thresholds }
    }

    /// Evaluate the offset surface at the four image corners and combine
    /// the per-axis fit standard deviations. Both measures grow
    /// monotonically with their inputs, so raising any input can only
    /// move the decision toward reject.
    pub fn assess(
        &self,
        report: &CoregistrationReport,
        samples: usize,
        lines: usize,
        pixel_size: f64,
    ) -> OffsetAssessment {
        let corners = [
            (1.0, 1.0),
            (samples as f64, 1.0),
            (1.0, lines as f64),
            (samples as f64, lines as f64),
        ];

        let max_corner_pixels = corners
            .iter()
            .map(|&(s, l)| {
                let (dr, da) = report.offsets.evaluate(s, l);
                (dr * dr + da * da).sqrt()
            })
            .fold(0.0f64, f64::max);
        let max_corner_offset_m = max_corner_pixels * pixel_size;

        let combined_stddev =
            (report.stddev_range.powi(2) + report.stddev_azimuth.powi(2)).sqrt();

        let accepted = combined_stddev <= self.thresholds.max_error
            && max_corner_offset_m <= self.thresholds.max_offset;

        OffsetAssessment {
            max_corner_offset_m,
            combined_stddev,
            accepted,
        }
    }

    /// Accept the offsets or report the rejection for the caller's
    /// fallback policy
    pub fn validate(
        &self,
        report: &CoregistrationReport,
        samples: usize,
        lines: usize,
        pixel_size: f64,
    ) -> InsarResult<OffsetAssessment> {
        let assessment = self.assess(report, samples, lines, pixel_size);
        log::info!(
            "Offset assessment: stddev {:.3} samples (limit {:.1}), corner offset {:.1} m (limit {:.1})",
            assessment.combined_stddev,
            self.thresholds.max_error,
            assessment.max_corner_offset_m,
            self.thresholds.max_offset
        );

        if assessment.accepted {
            Ok(assessment)
        } else {
            Err(InsarError::CoregistrationFailed {
                stddev: assessment.combined_stddev,
                offset_m: assessment.max_corner_offset_m,
            })
        }
    }
}

/// Sanity gate on the refined azimuth offset, applied before
/// interferogram formation. Unlike validation failure this has no
/// fallback: it always aborts the run.
pub fn check_azimuth_offset(offsets: &OffsetPolynomial) -> InsarResult<()> {
    let coefficient = offsets.azimuth[0];
    if coefficient.abs() > AZIMUTH_OFFSET_LIMIT {
        return Err(InsarError::AzimuthOffsetExceeded {
            coefficient,
            limit: AZIMUTH_OFFSET_LIMIT,
        });
    }
    Ok(())
}
