//! insardine: A Fast, Modular Sentinel-1 Differential Interferometry Processor
//!
//! This library turns pairs of Sentinel-1 SLC acquisitions into geocoded
//! differential interferometric products: unwrapped phase, coherence,
//! line-of-sight displacement, look vectors and masks over a common
//! ground footprint. Heavy numeric kernels (burst mosaicking, cross
//! correlation, minimum-cost-flow unwrapping) are delegated to an
//! external radar engine; this crate owns the pipeline around them:
//! burst alignment, iterative offset refinement, offset validation,
//! reference-pixel selection, water masking and geocoding.

pub mod core;
pub mod engine;
pub mod io;
pub mod pipeline;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, CoregistrationReport, GeoTransform, InsarError, InsarResult, MaskImage,
    OffsetPolynomial, OrbitData, OrbitQuality, Polarization, ProductType, ReferencePoint,
    SarComplex, SarImage, SarRealImage, Scene, StateVector, SwathTiming,
};

pub use crate::core::{
    BurstAligner, BurstOverlap, BurstOverlapWindow, Coregistrator, CoregistrationConfig,
    Geocoder, InterferogramFormer, LookupTable, OffsetThresholds, OffsetValidator,
    PhaseUnwrapper, RadarGeometry, UnwrapConfig, WaterMaskCombiner,
};

pub use engine::{ProcessEngine, RadarEngine};
pub use io::{DemProjector, DemSource, OrbitSource, SceneReader};
pub use pipeline::{process_insar_pair, Collaborators, InsarParams, InsarProduct, ProductOptions};
