use crate::core::geocode::Geocoder;
use crate::types::{BoundingBox, GeoTransform, InsarError, InsarResult, MaskImage, SarRealImage};
use gdal::raster::{rasterize, RasterizeOptions};
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{Geometry, LayerAccess};
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// Global land/water polygon dataset, queryable by bounding box.
/// Polygons are land; anything they do not touch is water.
pub trait WaterBodySource {
    fn land_polygons(&self, bbox: &BoundingBox) -> InsarResult<Vec<Geometry>>;
}

/// Water-body source backed by an OGR-readable polygon dataset
pub struct OgrWaterBodySource {
    path: PathBuf,
}

impl OgrWaterBodySource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl WaterBodySource for OgrWaterBodySource {
    fn land_polygons(&self, bbox: &BoundingBox) -> InsarResult<Vec<Geometry>> {
        let dataset = Dataset::open(&self.path)?;
        let mut layer = dataset.layer(0)?;

        let filter = bbox_geometry(bbox)?;
        layer.set_spatial_filter(&filter);

        let mut polygons = Vec::new();
        for feature in layer.features() {
            if let Some(geometry) = feature.geometry() {
                polygons.push(geometry.clone());
            }
        }

        log::debug!(
            "Water-body query lon [{:.3}, {:.3}] lat [{:.3}, {:.3}]: {} land polygons",
            bbox.min_lon,
            bbox.max_lon,
            bbox.min_lat,
            bbox.max_lat,
            polygons.len()
        );
        Ok(polygons)
    }
}

fn bbox_geometry(bbox: &BoundingBox) -> InsarResult<Geometry> {
    Geometry::from_wkt(&format!(
        "POLYGON(({x0} {y0}, {x1} {y0}, {x1} {y1}, {x0} {y1}, {x0} {y0}))",
        x0 = bbox.min_lon,
        x1 = bbox.max_lon,
        y0 = bbox.min_lat,
        y1 = bbox.max_lat,
    ))
    .map_err(InsarError::Gdal)
}

/// Split a footprint that straddles the +/-180 meridian into one box
/// per side. Querying the polygon source with the raw degenerate box
/// would silently return the wrong coverage.
pub fn split_antimeridian(bbox: &BoundingBox) -> Vec<BoundingBox> {
    if !bbox.crosses_antimeridian() {
        return vec![bbox.clone()];
    }
    vec![
        BoundingBox {
            min_lon: bbox.max_lon,
            max_lon: 180.0,
            min_lat: bbox.min_lat,
            max_lat: bbox.max_lat,
        },
        BoundingBox {
            min_lon: -180.0,
            max_lon: bbox.min_lon,
            min_lat: bbox.min_lat,
            max_lat: bbox.max_lat,
        },
    ]
}

/// Builds the land/water raster and combines it with the
/// coherence-derived validity mask, in map and radar geometry
pub struct WaterMaskCombiner;

impl WaterMaskCombiner {
    /// Rasterize land polygons onto a grid matching the given
    /// geotransform and projection. All-touched scan conversion: any
    /// cell a land polygon touches becomes land (1).
    pub fn build_map_mask(
        transform: &GeoTransform,
        epsg: u32,
        dims: (usize, usize),
        source: &dyn WaterBodySource,
    ) -> InsarResult<MaskImage> {
        let (lines, samples) = dims;
        let footprint = footprint_of_grid(transform, dims);

        let driver = DriverManager::get_driver_by_name("MEM")?;
        let mut dataset =
            driver.create_with_band_type::<u8, _>("", samples as isize, lines as isize, 1)?;
        dataset.set_geo_transform(&transform.to_gdal())?;
        dataset.set_spatial_ref(&SpatialRef::from_epsg(epsg)?)?;

        let mut polygons = Vec::new();
        for part in split_antimeridian(&footprint) {
            polygons.extend(source.land_polygons(&part)?);
        }

        if !polygons.is_empty() {
            let burn_values = vec![1.0; polygons.len()];
            rasterize(
                &mut dataset,
                &[1],
                &polygons,
                &burn_values,
                Some(RasterizeOptions {
                    all_touched: true,
                    ..Default::default()
                }),
            )?;
        }

        let band = dataset.rasterband(1)?;
        let buffer = band.read_as::<u8>((0, 0), (samples, lines), (samples, lines), None)?;
        let mask = Array2::from_shape_vec((lines, samples), buffer.data)
            .map_err(|e| InsarError::Processing(format!("Failed to reshape mask: {}", e)))?;

        let land = mask.iter().filter(|&&v| v == 1).count();
        log::info!(
            "Water mask: {}/{} cells land-touching",
            land,
            lines * samples
        );
        Ok(mask)
    }

    /// Carry a map-geometry mask into radar geometry through the
    /// lookup table
    pub fn to_radar(mask: &MaskImage, geocoder: &Geocoder) -> InsarResult<MaskImage> {
        let as_float = mask.mapv(|v| v as f32);
        let radar = geocoder.geocode(&as_float)?;
        Ok(radar.mapv(|v| if v.is_finite() && v > 0.5 { 1u8 } else { 0u8 }))
    }

    /// Threshold a coherence raster into a validity mask
    pub fn coherence_validity_mask(coherence: &SarRealImage, threshold: f32) -> MaskImage {
        coherence.mapv(|c| if c.is_finite() && c > threshold { 1u8 } else { 0u8 })
    }

    /// Element-wise AND: a pixel stays valid only when the coherence
    /// mask and the water mask both agree. Water pixels are forced
    /// invalid regardless of coherence.
    pub fn combine(coherence_mask: &MaskImage, water_mask: &MaskImage) -> InsarResult<MaskImage> {
        if coherence_mask.dim() != water_mask.dim() {
            return Err(InsarError::Processing(format!(
                "mask dimensions differ: {:?} vs {:?}",
                coherence_mask.dim(),
                water_mask.dim()
            )));
        }
        let mut combined = coherence_mask.clone();
        ndarray::Zip::from(&mut combined)
            .and(water_mask)
            .for_each(|c, &w| {
                *c = if *c == 1 && w == 1 { 1 } else { 0 };
            });
        Ok(combined)
    }

    /// Coherence raster with masked-out pixels forced to zero, used as
    /// the anchor-scan input when water masking is enabled
    pub fn apply_to_coherence(coherence: &SarRealImage, mask: &MaskImage) -> SarRealImage {
        let mut masked = coherence.clone();
        ndarray::Zip::from(&mut masked).and(mask).for_each(|c, &m| {
            if m == 0 {
                *c = 0.0;
            }
        });
        masked
    }
}

/// Geographic footprint of a north-up grid
fn footprint_of_grid(transform: &GeoTransform, dims: (usize, usize)) -> BoundingBox {
    let (lines, samples) = dims;
    let x0 = transform.top_left_x;
    let x1 = transform.top_left_x + samples as f64 * transform.pixel_width;
    let y0 = transform.top_left_y;
    let y1 = transform.top_left_y + lines as f64 * transform.pixel_height;
    BoundingBox {
        min_lon: x0.min(x1),
        max_lon: x0.max(x1),
        min_lat: y0.min(y1),
        max_lat: y0.max(y1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_mask_is_elementwise_and() {
        let coherence_mask =
            Array2::from_shape_vec((2, 3), vec![1u8, 1, 0, 0, 1, 1]).unwrap();
        let water_mask = Array2::from_shape_vec((2, 3), vec![1u8, 0, 1, 0, 1, 0]).unwrap();

        let combined = WaterMaskCombiner::combine(&coherence_mask, &water_mask).unwrap();
        for ((i, j), &value) in combined.indexed_iter() {
            let expected = coherence_mask[[i, j]] == 1 && water_mask[[i, j]] == 1;
            assert_eq!(value == 1, expected, "mismatch at ({}, {})", i, j);
        }
    }

    #[test]
    fn test_combine_rejects_dimension_mismatch() {
        let a = Array2::from_elem((2, 2), 1u8);
        let b = Array2::from_elem((3, 2), 1u8);
        assert!(WaterMaskCombiner::combine(&a, &b).is_err());
    }

    #[test]
    fn test_coherence_validity_threshold() {
        let coherence =
            Array2::from_shape_vec((1, 4), vec![0.1f32, 0.31, f32::NAN, 0.9]).unwrap();
        let mask = WaterMaskCombiner::coherence_validity_mask(&coherence, 0.3);
        assert_eq!(mask.as_slice().unwrap(), &[0, 1, 0, 1]);
    }

    #[test]
    fn test_apply_to_coherence_zeroes_masked_pixels() {
        let coherence = Array2::from_elem((2, 2), 0.8f32);
        let mask = Array2::from_shape_vec((2, 2), vec![1u8, 0, 0, 1]).unwrap();
        let masked = WaterMaskCombiner::apply_to_coherence(&coherence, &mask);
        assert_eq!(masked[[0, 0]], 0.8);
        assert_eq!(masked[[0, 1]], 0.0);
        assert_eq!(masked[[1, 0]], 0.0);
        assert_eq!(masked[[1, 1]], 0.8);
    }

    #[test]
    fn test_antimeridian_split() {
        // Footprint around the dateline, normalized longitudes
        let bbox = BoundingBox {
            min_lon: -179.2,
            max_lon: 178.9,
            min_lat: 51.0,
            max_lat: 52.0,
        };
        assert!(bbox.crosses_antimeridian());

        let parts = split_antimeridian(&bbox);
        assert_eq!(parts.len(), 2);
        for part in &parts {
            assert!(part.min_lon >= -180.0 && part.max_lon <= 180.0);
            assert!(part.min_lon < part.max_lon);
            assert!(!part.crosses_antimeridian());
        }
        assert_eq!(parts[0].min_lon, 178.9);
        assert_eq!(parts[0].max_lon, 180.0);
        assert_eq!(parts[1].min_lon, -180.0);
        assert_eq!(parts[1].max_lon, -179.2);
    }

    #[test]
    fn test_ordinary_footprint_is_not_split() {
        let bbox = BoundingBox {
            min_lon: 7.9,
            max_lon: 9.2,
            min_lat: 46.1,
            max_lat: 47.3,
        };
        let parts = split_antimeridian(&bbox);
        assert_eq!(parts.len(), 1);
    }
}
