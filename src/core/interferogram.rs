use crate::core::offset_validate::check_azimuth_offset;
use crate::engine::RadarEngine;
use crate::types::{InsarResult, OffsetPolynomial};
use std::path::{Path, PathBuf};

/// Paths of the rasters the formation step produced, radar geometry,
/// multi-looked dimensions
pub struct InterferogramProducts {
    pub interferogram: PathBuf,
    pub coherence: PathBuf,
}

/// Differences coregistered imagery against the DEM-simulated phase to
/// produce the raw differential interferogram and coherence
pub struct InterferogramFormer<'a, E: RadarEngine> {
    engine: &'a E,
}

impl<'a, E: RadarEngine> InterferogramFormer<'a, E> {
    pub fn new(engine: &'a E) -> Self {
        Self { engine }
    }

    /// Form the differential interferogram. The refined azimuth offset
    /// is gated first: a gross azimuth misregistration would produce a
    /// decorrelated product, so the run aborts rather than continuing.
    /// Engine failures propagate as fatal; there is no retry.
    pub fn form(
        &self,
        reference_image: &Path,
        resampled_secondary: &Path,
        simulated_phase: &Path,
        offsets: &OffsetPolynomial,
        work_dir: &Path,
    ) -> InsarResult<InterferogramProducts> {
        check_azimuth_offset(offsets)?;

        let interferogram = work_dir.join("diff_interferogram.tif");
        let coherence = work_dir.join("coherence.tif");

        log::info!("Forming differential interferogram");
        self.engine.form_interferogram(
            reference_image,
            resampled_secondary,
            simulated_phase,
            &interferogram,
            &coherence,
        )?;

        Ok(InterferogramProducts {
            interferogram,
            coherence,
        })
    }
}
