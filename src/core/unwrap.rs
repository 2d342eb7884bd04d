use crate::engine::RadarEngine;
use crate::types::{InsarResult, SarRealImage};
use std::path::{Path, PathBuf};

/// Phase filtering and unwrapping policy
#[derive(Debug, Clone)]
pub struct UnwrapConfig {
    /// Coherence a pixel must exceed to qualify as (part of) the anchor
    pub coherence_threshold: f32,
    /// Anchor window: every pixel of a centered window this size must
    /// qualify
    pub window: (usize, usize),
    /// Adaptive filter strength passed through to the engine
    pub filter_alpha: f64,
}

impl Default for UnwrapConfig {
    fn default() -> Self {
        Self {
            coherence_threshold: 0.3,
            window: (3, 3),
            filter_alpha: 0.6,
        }
    }
}

/// Find the first (row-major) position where every pixel of a centered
/// window exceeds the threshold.
///
/// Window sizes are odd; a window of (2k+1, 2k+1) centered at (i, j)
/// spans rows i-k..=i+k and columns j-k..=j+k. Centers too close to the
/// border for the full window are skipped.
pub fn reference_pixel(
    mask: &SarRealImage,
    window: (usize, usize),
    threshold: f32,
) -> Option<(usize, usize)> {
    let (lines, samples) = mask.dim();
    let half_h = window.0 / 2;
    let half_w = window.1 / 2;

    if lines < 2 * half_h + 1 || samples < 2 * half_w + 1 {
        return None;
    }

    for i in half_h..lines - half_h {
        'candidates: for j in half_w..samples - half_w {
            for wi in i - half_h..=i + half_h {
                for wj in j - half_w..=j + half_w {
                    if !(mask[[wi, wj]] > threshold) {
                        continue 'candidates;
                    }
                }
            }
            return Some((i, j));
        }
    }

    None
}

/// Anchor selection with progressive fallback: try the configured
/// window, then a single pixel; (0, 0) when nothing qualifies anywhere.
pub fn select_reference_pixel(mask: &SarRealImage, config: &UnwrapConfig) -> (usize, usize) {
    if let Some(anchor) = reference_pixel(mask, config.window, config.coherence_threshold) {
        return anchor;
    }
    log::warn!(
        "No {}x{} anchor window above coherence {:.2}, retrying single-pixel",
        config.window.0,
        config.window.1,
        config.coherence_threshold
    );
    if let Some(anchor) = reference_pixel(mask, (1, 1), config.coherence_threshold) {
        return anchor;
    }
    log::warn!("No pixel above coherence threshold, anchoring at (0, 0)");
    (0, 0)
}

/// Result of the unwrap stage
pub struct UnwrapOutcome {
    pub unwrapped_phase: PathBuf,
    pub filtered_interferogram: PathBuf,
    pub reference_pixel: (usize, usize),
}

/// Resolves the 2-pi ambiguity of the differential phase, anchored at
/// one qualified pixel
pub struct PhaseUnwrapper<'a, E: RadarEngine> {
    engine: &'a E,
    config: UnwrapConfig,
}

impl<'a, E: RadarEngine> PhaseUnwrapper<'a, E> {
    pub fn new(engine: &'a E, config: UnwrapConfig) -> Self {
        Self { engine, config }
    }

    /// Filter, anchor, unwrap.
    ///
    /// `coherence_mask` is the raster the anchor scan runs over. The
    /// caller resolves masking policy before this call: with water
    /// masking enabled it must already be the combined mask (coherence
    /// with water pixels zeroed), so the anchor can never land on
    /// water.
    pub fn run(
        &self,
        interferogram: &Path,
        coherence_path: &Path,
        coherence_mask: &SarRealImage,
        validity_mask_path: &Path,
        out_filtered: &Path,
        out_unwrapped: &Path,
    ) -> InsarResult<UnwrapOutcome> {
        log::info!(
            "Filtering interferogram (alpha {:.2})",
            self.config.filter_alpha
        );
        self.engine
            .adf_filter(interferogram, self.config.filter_alpha, out_filtered)?;

        let anchor = select_reference_pixel(coherence_mask, &self.config);
        log::info!("Reference pixel: ({}, {})", anchor.0, anchor.1);

        self.engine.unwrap(
            out_filtered,
            coherence_path,
            validity_mask_path,
            anchor,
            out_unwrapped,
        )?;

        Ok(UnwrapOutcome {
            unwrapped_phase: out_unwrapped.to_path_buf(),
            filtered_interferogram: out_filtered.to_path_buf(),
            reference_pixel: anchor,
        })
    }
}
