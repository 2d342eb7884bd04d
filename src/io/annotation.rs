use crate::types::{BoundingBox, InsarError, InsarResult};
use chrono::{NaiveDateTime, Timelike};
use quick_xml::de::from_str;
use serde::Deserialize;

/// Annotation structures for Sentinel-1 SLC products.
/// This represents the root <product> element directly.
#[derive(Debug, Deserialize)]
pub struct AnnotationRoot {
    #[serde(rename = "adsHeader")]
    pub ads_header: Option<AdsHeader>,
    #[serde(rename = "generalAnnotation")]
    pub general_annotation: Option<GeneralAnnotation>,
    #[serde(rename = "swathTiming")]
    pub swath_timing: Option<SwathTimingXml>,
    #[serde(rename = "imageAnnotation")]
    pub image_annotation: Option<ImageAnnotation>,
    #[serde(rename = "geolocationGrid")]
    pub geolocation_grid: Option<GeolocationGrid>,
}

#[derive(Debug, Deserialize)]
pub struct AdsHeader {
    #[serde(rename = "missionId")]
    pub mission_id: String,
    #[serde(rename = "productType")]
    pub product_type: String,
    #[serde(rename = "polarisation")]
    pub polarisation: String,
    #[serde(rename = "swath")]
    pub swath: String,
    #[serde(rename = "startTime")]
    pub start_time: String,
}

#[derive(Debug, Deserialize)]
pub struct GeneralAnnotation {
    #[serde(rename = "orbitList")]
    pub orbit_list: Option<OrbitList>,
}

/// Onboard predicted orbit state vectors embedded in the annotation
#[derive(Debug, Deserialize)]
pub struct OrbitList {
    #[serde(rename = "orbit")]
    pub orbits: Vec<OrbitEntry>,
}

#[derive(Debug, Deserialize)]
pub struct OrbitEntry {
    #[serde(rename = "time")]
    pub time: String,
    #[serde(rename = "position")]
    pub position: VectorXyz,
    #[serde(rename = "velocity")]
    pub velocity: VectorXyz,
}

#[derive(Debug, Deserialize)]
pub struct VectorXyz {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Deserialize)]
pub struct SwathTimingXml {
    #[serde(rename = "burstList")]
    pub burst_list: BurstList,
}

#[derive(Debug, Deserialize)]
pub struct BurstList {
    #[serde(rename = "burst", default)]
    pub bursts: Vec<Burst>,
}

#[derive(Debug, Deserialize)]
pub struct Burst {
    #[serde(rename = "azimuthTime")]
    pub azimuth_time: String,
    #[serde(rename = "byteOffset")]
    pub byte_offset: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ImageAnnotation {
    #[serde(rename = "imageInformation")]
    pub image_information: ImageInformation,
}

#[derive(Debug, Deserialize)]
pub struct ImageInformation {
    #[serde(rename = "slantRangeTime")]
    pub slant_range_time: f64,
    #[serde(rename = "numberOfSamples")]
    pub number_of_samples: usize,
    #[serde(rename = "numberOfLines")]
    pub number_of_lines: usize,
    #[serde(rename = "rangePixelSpacing")]
    pub range_pixel_spacing: f64,
    #[serde(rename = "azimuthPixelSpacing")]
    pub azimuth_pixel_spacing: f64,
    #[serde(rename = "azimuthFrequency")]
    pub azimuth_frequency: f64,
}

/// Geolocation grid for geographic coordinate extraction
#[derive(Debug, Deserialize)]
pub struct GeolocationGrid {
    #[serde(rename = "geolocationGridPointList")]
    pub geolocation_grid_point_list: GeolocationGridPointList,
}

#[derive(Debug, Deserialize)]
pub struct GeolocationGridPointList {
    #[serde(rename = "geolocationGridPoint", default)]
    pub geolocation_grid_points: Vec<GeolocationGridPoint>,
}

#[derive(Debug, Deserialize)]
pub struct GeolocationGridPoint {
    #[serde(rename = "line")]
    pub line: u32,
    #[serde(rename = "pixel")]
    pub pixel: u32,
    #[serde(rename = "latitude")]
    pub latitude: f64,
    #[serde(rename = "longitude")]
    pub longitude: f64,
    #[serde(rename = "height")]
    pub height: f64,
}

/// Parser for Sentinel-1 annotation XML files
pub struct AnnotationParser;

impl AnnotationParser {
    /// Parse complete annotation XML
    pub fn parse_annotation(xml_content: &str) -> InsarResult<AnnotationRoot> {
        from_str::<AnnotationRoot>(xml_content)
            .map_err(|e| InsarError::XmlParsing(format!("Failed to parse annotation XML: {}", e)))
    }

    /// Extract burst azimuth anchor times as seconds of day.
    /// Burst alignment between acquisitions of the same relative orbit is
    /// done on the time-of-day axis, so the date component is dropped.
    pub fn extract_burst_times(annotation: &AnnotationRoot) -> InsarResult<Vec<f64>> {
        let Some(ref swath_timing) = annotation.swath_timing else {
            return Ok(Vec::new());
        };

        swath_timing
            .burst_list
            .bursts
            .iter()
            .map(|b| parse_seconds_of_day(&b.azimuth_time))
            .collect()
    }

    /// Extract bounding box from the geolocation grid
    pub fn extract_bounding_box(annotation: &AnnotationRoot) -> InsarResult<BoundingBox> {
        let Some(ref grid) = annotation.geolocation_grid else {
            return Err(InsarError::XmlParsing(
                "No geolocation grid found in annotation".to_string(),
            ));
        };
        let points = &grid.geolocation_grid_point_list.geolocation_grid_points;
        if points.is_empty() {
            return Err(InsarError::XmlParsing(
                "No geolocation grid points found".to_string(),
            ));
        }

        let mut min_lat = f64::INFINITY;
        let mut max_lat = f64::NEG_INFINITY;
        let mut min_lon = f64::INFINITY;
        let mut max_lon = f64::NEG_INFINITY;

        for point in points {
            min_lat = min_lat.min(point.latitude);
            max_lat = max_lat.max(point.latitude);
            min_lon = min_lon.min(point.longitude);
            max_lon = max_lon.max(point.longitude);
        }

        Ok(BoundingBox {
            min_lon,
            max_lon,
            min_lat,
            max_lat,
        })
    }
}

/// Parse an annotation timestamp ("2020-01-03T17:08:15.674828") into
/// seconds of day
pub fn parse_seconds_of_day(timestamp: &str) -> InsarResult<f64> {
    let time = NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| InsarError::XmlParsing(format!("Bad annotation timestamp '{}': {}", timestamp, e)))?;
    let seconds = time.hour() as f64 * 3600.0
        + time.minute() as f64 * 60.0
        + time.second() as f64
        + time.nanosecond() as f64 * 1e-9;
    Ok(seconds)
}
