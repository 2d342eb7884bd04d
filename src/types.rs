use chrono::{DateTime, Utc};
use ndarray::Array2;
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Complex-valued SAR data type (I + jQ)
pub type SarComplex = Complex<f32>;

/// Real-valued intensity, phase or coherence data
pub type SarReal = f32;

/// 2D complex SAR data array (line x sample)
pub type SarImage = Array2<SarComplex>;

/// 2D real SAR data array (line x sample)
pub type SarRealImage = Array2<SarReal>;

/// Binary validity/water mask raster (1 = valid/land, 0 = invalid/water)
pub type MaskImage = Array2<u8>;

/// Polarization modes for Sentinel-1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    VV,
    VH,
    HV,
    HH,
}

impl std::fmt::Display for Polarization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Polarization::VV => write!(f, "VV"),
            Polarization::VH => write!(f, "VH"),
            Polarization::HV => write!(f, "HV"),
            Polarization::HH => write!(f, "HH"),
        }
    }
}

/// Sentinel-1 product types; only SLC carries the phase needed here
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductType {
    Slc,
    Grd,
    Ocn,
}

impl ProductType {
    /// Parse the product-type token of a granule identifier (e.g. "SLC_")
    pub fn from_granule_token(token: &str) -> Option<Self> {
        match token.trim_end_matches('_') {
            "SLC" => Some(ProductType::Slc),
            "GRD" | "GRDH" | "GRDM" => Some(ProductType::Grd),
            "OCN" => Some(ProductType::Ocn),
            _ => None,
        }
    }
}

/// Geospatial bounding box in geographic coordinates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub max_lon: f64,
    pub min_lat: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// True when the footprint straddles the +/-180 degree meridian.
    /// Longitudes are normalized to [-180, 180], so a straddling footprint
    /// shows up as a degenerate box spanning most of the globe.
    pub fn crosses_antimeridian(&self) -> bool {
        self.max_lon - self.min_lon > 180.0
    }
}

/// Geospatial transformation parameters (GDAL ordering)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Map coordinates of a pixel center (row, col)
    pub fn pixel_to_map(&self, row: f64, col: f64) -> (f64, f64) {
        let x = self.top_left_x + (col + 0.5) * self.pixel_width;
        let y = self.top_left_y + (row + 0.5) * self.pixel_height;
        (x, y)
    }

    /// Fractional pixel coordinates (row, col) of a map location
    pub fn map_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let col = (x - self.top_left_x) / self.pixel_width - 0.5;
        let row = (y - self.top_left_y) / self.pixel_height - 0.5;
        (row, col)
    }

    /// GDAL-style 6-element array
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Construct from a GDAL 6-element geotransform
    pub fn from_gdal(gt: &[f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }
}

/// Orbit state vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateVector {
    pub time: DateTime<Utc>,
    pub position: [f64; 3], // [x, y, z] in meters (ECEF)
    pub velocity: [f64; 3], // [vx, vy, vz] in m/s
}

/// Source quality of the orbit solution in use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrbitQuality {
    /// Precise ephemerides from an orbit file
    Precise,
    /// Onboard predicted state vectors from the annotation
    Predicted,
}

/// Orbit information for one acquisition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrbitData {
    pub state_vectors: Vec<StateVector>,
    pub reference_time: DateTime<Utc>,
    pub quality: OrbitQuality,
}

/// Burst timing for one sub-swath: one azimuth anchor time per burst,
/// as seconds of day
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwathTiming {
    pub id: String, // IW1, IW2, IW3
    pub burst_times: Vec<f64>,
    pub burst_count: usize,
}

/// One acquisition of a scene pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub granule_id: String,
    pub polarization: Polarization,
    pub product_type: ProductType,
    pub start_time: DateTime<Utc>,
    pub footprint: BoundingBox,
    pub swaths: Vec<SwathTiming>,
    pub orbit: Option<OrbitData>,
}

impl Scene {
    /// Look up a sub-swath's burst timing by identifier
    pub fn swath(&self, id: &str) -> Option<&SwathTiming> {
        self.swaths.iter().find(|s| s.id == id)
    }
}

/// Residual misregistration model between two radar geometries.
///
/// Quadratic surface over (sample, line) per axis:
/// `c0 + c1*s + c2*l + c3*s*l + c4*s^2 + c5*l^2`.
/// Refinement iterations accumulate into one polynomial rather than
/// replacing it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffsetPolynomial {
    pub range: [f64; 6],
    pub azimuth: [f64; 6],
}

impl OffsetPolynomial {
    /// The zero (identity) offset model
    pub fn zero() -> Self {
        Self {
            range: [0.0; 6],
            azimuth: [0.0; 6],
        }
    }

    /// Evaluate the offset surface at a (sample, line) position,
    /// returning (range_offset, azimuth_offset) in pixels
    pub fn evaluate(&self, sample: f64, line: f64) -> (f64, f64) {
        let basis = [
            1.0,
            sample,
            line,
            sample * line,
            sample * sample,
            line * line,
        ];
        let dr: f64 = self.range.iter().zip(&basis).map(|(c, b)| c * b).sum();
        let da: f64 = self.azimuth.iter().zip(&basis).map(|(c, b)| c * b).sum();
        (dr, da)
    }

    /// Add an incremental offset estimate into the running model
    pub fn accumulate(&mut self, increment: &OffsetPolynomial) {
        for i in 0..6 {
            self.range[i] += increment.range[i];
            self.azimuth[i] += increment.azimuth[i];
        }
    }
}

/// One refinement step's offset estimate and model fit quality,
/// parsed from the radar engine's output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoregistrationReport {
    pub offsets: OffsetPolynomial,
    pub stddev_range: f64,
    pub stddev_azimuth: f64,
}

/// Zero-phase anchor of the unwrapped products, in radar and map space
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub row_s: usize,
    pub col_s: usize,
    pub row_m: usize,
    pub col_m: usize,
    pub y: f64,
    pub x: f64,
    pub lat: f64,
    pub lon: f64,
}

/// Error types for interferometric processing
#[derive(Debug, thiserror::Error)]
pub enum InsarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("granule {0} is not a single-look-complex product")]
    GranuleType(String),

    #[error("no precise orbit available: {0}")]
    OrbitUnavailable(String),

    #[error("no burst overlap found for sub-swath {swath}")]
    NoBurstOverlap { swath: String },

    #[error("DEM file not found: {0}")]
    DemMissing(PathBuf),

    #[error(
        "coregistration rejected: model fit stddev {stddev:.3} samples, \
         corner offset {offset_m:.1} m"
    )]
    CoregistrationFailed { stddev: f64, offset_m: f64 },

    #[error("azimuth offset {coefficient:.4} exceeds sanity limit {limit:.4}")]
    AzimuthOffsetExceeded { coefficient: f64, limit: f64 },

    #[error("radar engine call `{command}` failed: {detail}")]
    Engine { command: String, detail: String },

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for interferometric operations
pub type InsarResult<T> = Result<T, InsarError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_type_token() {
        assert_eq!(ProductType::from_granule_token("SLC_"), Some(ProductType::Slc));
        assert_eq!(ProductType::from_granule_token("GRDH"), Some(ProductType::Grd));
        assert_eq!(ProductType::from_granule_token("RAW_"), None);
    }

    #[test]
    fn test_geotransform_round_trip() {
        let gt = GeoTransform {
            top_left_x: 500_000.0,
            pixel_width: 30.0,
            rotation_x: 0.0,
            top_left_y: 4_650_000.0,
            rotation_y: 0.0,
            pixel_height: -30.0,
        };
        let (x, y) = gt.pixel_to_map(10.0, 20.0);
        let (row, col) = gt.map_to_pixel(x, y);
        assert!((row - 10.0).abs() < 1e-9);
        assert!((col - 20.0).abs() < 1e-9);
    }
}
