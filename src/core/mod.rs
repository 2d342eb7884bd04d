//! Core interferometric processing modules

pub mod burst_align;
pub mod coregister;
pub mod geocode;
pub mod interferogram;
pub mod offset_validate;
pub mod unwrap;
pub mod water_mask;

// Re-export main types
pub use burst_align::{align_bursts, BurstAligner, BurstOverlap, BurstOverlapWindow};
pub use coregister::{
    build_lookup_table, phase_to_displacement, Coregistrator, CoregistrationConfig,
    CoregistrationOutcome, LookVectors, RadarGeometry,
};
pub use geocode::{bilinear_interpolate, Geocoder, LookupTable};
pub use interferogram::{InterferogramFormer, InterferogramProducts};
pub use offset_validate::{
    check_azimuth_offset, OffsetAssessment, OffsetThresholds, OffsetValidator,
    AZIMUTH_OFFSET_LIMIT,
};
pub use unwrap::{reference_pixel, select_reference_pixel, PhaseUnwrapper, UnwrapConfig};
pub use water_mask::{split_antimeridian, OgrWaterBodySource, WaterBodySource, WaterMaskCombiner};
