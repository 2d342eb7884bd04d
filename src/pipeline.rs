use crate::core::coregister::{phase_to_displacement, Coregistrator, CoregistrationConfig, RadarGeometry};
use crate::core::geocode::Geocoder;
use crate::core::interferogram::InterferogramFormer;
use crate::core::offset_validate::{OffsetThresholds, OffsetValidator};
use crate::core::unwrap::{PhaseUnwrapper, UnwrapConfig};
use crate::core::water_mask::{WaterBodySource, WaterMaskCombiner};
use crate::core::BurstAligner;
use crate::engine::RadarEngine;
use crate::io::dem::{DemProjector, DemSource};
use crate::io::orbit::{resolve_orbit, OrbitSource};
use crate::io::raster::{read_geotiff, write_geotiff, write_mask_geotiff};
use crate::io::scene::SceneReader;
use crate::types::{
    CoregistrationReport, GeoTransform, InsarError, InsarResult, OffsetPolynomial, OrbitQuality,
    Polarization, ReferencePoint, Scene,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Optional product rasters beyond amplitude, coherence and unwrapped
/// phase
#[derive(Debug, Clone, Default)]
pub struct ProductOptions {
    pub include_wrapped_phase: bool,
    pub include_dem: bool,
    pub include_look_vectors: bool,
    pub include_displacement: bool,
}

/// Parameters of one scene-pair run
#[derive(Debug, Clone)]
pub struct InsarParams {
    pub polarization: Polarization,
    pub looks_range: u32,
    pub looks_azimuth: u32,
    /// Adaptive filter strength for the wrapped phase
    pub phase_filter: f64,
    pub apply_water_mask: bool,
    pub options: ProductOptions,
    pub geometry: RadarGeometry,
    pub dem_pixel_size: f64,
    pub coregistration: CoregistrationConfig,
    pub thresholds: OffsetThresholds,
    pub coherence_threshold: f32,
    /// Fall back to geometry-only alignment when the refined offsets
    /// fail validation, instead of aborting
    pub allow_dead_reckoning: bool,
}

impl Default for InsarParams {
    fn default() -> Self {
        Self {
            polarization: Polarization::VV,
            looks_range: 20,
            looks_azimuth: 4,
            phase_filter: 0.6,
            apply_water_mask: false,
            options: ProductOptions::default(),
            geometry: RadarGeometry::default(),
            dem_pixel_size: 30.0,
            coregistration: CoregistrationConfig::default(),
            thresholds: OffsetThresholds::default(),
            coherence_threshold: 0.3,
            allow_dead_reckoning: true,
        }
    }
}

/// External collaborators of one run
pub struct Collaborators<'a, E: RadarEngine> {
    pub engine: &'a E,
    pub orbit_source: &'a dyn OrbitSource,
    pub dem_source: &'a dyn DemSource,
    pub water_source: Option<&'a dyn WaterBodySource>,
}

/// Working directory of one scene pair. All intermediate artifacts are
/// scoped here; the product directory only appears once the run has
/// completed.
pub struct WorkArena {
    root: PathBuf,
}

impl WorkArena {
    pub fn create<P: AsRef<Path>>(root: P) -> InsarResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("scratch"))?;
        Ok(Self { root })
    }

    pub fn scratch(&self) -> PathBuf {
        self.root.join("scratch")
    }

    fn staged_products(&self) -> PathBuf {
        self.root.join("scratch").join("products_staging")
    }

    fn final_products(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

/// What a completed run hands back, alongside the product directory
#[derive(Debug, Clone, Serialize)]
pub struct PairMetadata {
    pub reference_granule: String,
    pub secondary_granule: String,
    pub reference_orbit: OrbitQuality,
    pub secondary_orbit: OrbitQuality,
    pub dead_reckoning: bool,
    pub offsets: OffsetPolynomial,
    pub reference_point: ReferencePoint,
}

pub struct InsarProduct {
    pub product_dir: PathBuf,
    pub metadata: PairMetadata,
}

/// Process one scene pair into a directory of geocoded interferometric
/// products.
///
/// Stages run strictly sequentially; every product raster is geocoded
/// through the single lookup table this run produced.
pub fn process_insar_pair<E: RadarEngine>(
    reference_archive: &Path,
    secondary_archive: &Path,
    params: &InsarParams,
    collaborators: &Collaborators<E>,
    run_dir: &Path,
) -> InsarResult<InsarProduct> {
    let arena = WorkArena::create(run_dir)?;
    let scratch = arena.scratch();

    // Scene ingestion gate: non-SLC input fails here, immediately
    let mut reference = SceneReader::new(reference_archive)?.read_scene(params.polarization)?;
    let mut secondary = SceneReader::new(secondary_archive)?.read_scene(params.polarization)?;
    log::info!(
        "Pair: {} / {}",
        reference.granule_id,
        secondary.granule_id
    );

    // Orbits: precise if available, predicted otherwise
    let reference_orbit = resolve_orbit(&reference, collaborators.orbit_source)?;
    let secondary_orbit = resolve_orbit(&secondary, collaborators.orbit_source)?;
    reference.orbit = Some(reference_orbit.clone());
    secondary.orbit = Some(secondary_orbit.clone());

    // Burst overlap windows and the selection tables for mosaicking
    let overlaps = BurstAligner::align_pair(&reference, &secondary)?;
    let (reference_table, secondary_table) =
        BurstAligner::write_burst_tables(&overlaps, &scratch)?;

    // Mosaic both acquisitions into radar geometry
    let looks = (params.looks_range, params.looks_azimuth);
    let reference_image = scratch.join("reference_mli.tif");
    let secondary_image = scratch.join("secondary_slc.tif");
    collaborators.engine.ingest(
        reference_archive,
        &reference_table,
        params.polarization,
        looks,
        &reference_image,
    )?;
    collaborators.engine.ingest(
        secondary_archive,
        &secondary_table,
        params.polarization,
        looks,
        &secondary_image,
    )?;

    // DEM framed to the reference footprint
    let projector = DemProjector::new(params.dem_pixel_size);
    let dem = projector.frame_dem(&reference.footprint, collaborators.dem_source)?;

    // Radar geometry of the multi-looked stack
    let amplitude = read_geotiff(&reference_image)?;
    let (radar_lines, radar_samples) = amplitude.dim();
    let geometry = RadarGeometry {
        samples: radar_samples,
        lines: radar_lines,
        ..params.geometry.clone()
    };

    // Iterative offset refinement
    let coregistrator = Coregistrator::new(
        collaborators.engine,
        &scratch,
        params.coregistration.clone(),
    );
    let outcome = coregistrator.run(
        &dem,
        &reference_orbit,
        &geometry,
        &reference_image,
        &secondary_image,
    )?;

    // Accept the refined offsets, or fall back to dead reckoning
    let validator = OffsetValidator::new(params.thresholds.clone());
    let final_report = CoregistrationReport {
        offsets: outcome.offsets.clone(),
        stddev_range: outcome.reports.last().map(|r| r.stddev_range).unwrap_or(0.0),
        stddev_azimuth: outcome
            .reports
            .last()
            .map(|r| r.stddev_azimuth)
            .unwrap_or(0.0),
    };

    // The azimuth sanity gate has no fallback: a gross azimuth offset
    // from fine matching aborts the run even when dead reckoning could
    // otherwise take over
    crate::core::offset_validate::check_azimuth_offset(&final_report.offsets)?;

    let mut lut = outcome.lookup_table;
    let mut offsets = outcome.offsets;
    let mut dead_reckoning = false;
    match validator.validate(
        &final_report,
        radar_samples,
        radar_lines,
        geometry.range_pixel_spacing,
    ) {
        Ok(_) => {}
        Err(e @ InsarError::CoregistrationFailed { .. }) => {
            if !params.allow_dead_reckoning {
                return Err(e);
            }
            log::warn!("{}; falling back to dead reckoning", e);
            // Discard the empirical refinement: geometry-only table,
            // zero offsets, secondary resampled through that table
            let _ = fs::remove_file(scratch.join("offsets_final.json"));
            lut = outcome.initial_lookup_table;
            offsets = OffsetPolynomial::zero();
            lut.write(&outcome.lut_path)?;
            collaborators.engine.coregister(
                &secondary_image,
                &outcome.lut_path,
                &outcome.resampled_secondary,
            )?;
            dead_reckoning = true;
        }
        Err(e) => return Err(e),
    }

    // Differential interferogram, gated on the refined azimuth offset
    let former = InterferogramFormer::new(collaborators.engine);
    let products = former.form(
        &reference_image,
        &outcome.resampled_secondary,
        &outcome.simulated_phase,
        &offsets,
        &scratch,
    )?;

    let coherence = read_geotiff(&products.coherence)?;
    lut_radar_dims_check(&lut, coherence.dim())?;

    // Masking policy is resolved before the anchor scan
    let coherence_validity =
        WaterMaskCombiner::coherence_validity_mask(&coherence.data, params.coherence_threshold);
    let geocoder = Geocoder::new(&lut);

    let mut water_mask_map = None;
    let (validity_mask, scan_mask) = if params.apply_water_mask {
        let source = collaborators.water_source.ok_or_else(|| {
            InsarError::Processing(
                "water masking requested but no water-body source given".to_string(),
            )
        })?;
        let map_mask =
            WaterMaskCombiner::build_map_mask(&lut.transform, lut.epsg, lut.dim(), source)?;
        let radar_mask = WaterMaskCombiner::to_radar(&map_mask, &geocoder)?;
        let combined = WaterMaskCombiner::combine(&coherence_validity, &radar_mask)?;
        let scan = WaterMaskCombiner::apply_to_coherence(&coherence.data, &combined);
        water_mask_map = Some(map_mask);
        (combined, scan)
    } else {
        (coherence_validity.clone(), coherence.data.clone())
    };

    let validity_mask_path = scratch.join("validity_mask.tif");
    write_mask_geotiff(&validity_mask_path, &validity_mask, &radar_transform(), 4326)?;

    // Anchor selection and unwrapping
    let unwrapper = PhaseUnwrapper::new(
        collaborators.engine,
        UnwrapConfig {
            coherence_threshold: params.coherence_threshold,
            filter_alpha: params.phase_filter,
            ..UnwrapConfig::default()
        },
    );
    let unwrap_outcome = unwrapper.run(
        &products.interferogram,
        &products.coherence,
        &scan_mask,
        &validity_mask_path,
        &scratch.join("filtered_interferogram.tif"),
        &scratch.join("unw_phase.tif"),
    )?;

    // Geocode every product through this run's lookup table
    let staging = arena.staged_products();
    fs::create_dir_all(&staging)?;

    let unwrapped = read_geotiff(&unwrap_outcome.unwrapped_phase)?;
    let map_epsg = lut.epsg;
    let map_transform = lut.transform.clone();

    let amp_map = geocoder.geocode_back(&amplitude.data)?;
    write_geotiff(staging.join("amp.tif"), &amp_map, &map_transform, map_epsg, Some(f64::NAN))?;

    let coherence_map = geocoder.geocode_back(&coherence.data)?;
    write_geotiff(
        staging.join("corr.tif"),
        &coherence_map,
        &map_transform,
        map_epsg,
        Some(f64::NAN),
    )?;

    let unwrapped_map = geocoder.geocode_back(&unwrapped.data)?;
    write_geotiff(
        staging.join("unw_phase.tif"),
        &unwrapped_map,
        &map_transform,
        map_epsg,
        Some(f64::NAN),
    )?;

    if params.options.include_wrapped_phase {
        let wrapped = read_geotiff(&unwrap_outcome.filtered_interferogram)?;
        let wrapped_map = geocoder.geocode_back(&wrapped.data)?;
        write_geotiff(
            staging.join("wrapped_phase.tif"),
            &wrapped_map,
            &map_transform,
            map_epsg,
            Some(f64::NAN),
        )?;
    }

    if params.options.include_displacement {
        let displacement = phase_to_displacement(&unwrapped.data, geometry.wavelength);
        let displacement_map = geocoder.geocode_back(&displacement)?;
        write_geotiff(
            staging.join("los_disp.tif"),
            &displacement_map,
            &map_transform,
            map_epsg,
            Some(f64::NAN),
        )?;
    }

    if params.options.include_dem {
        write_geotiff(
            staging.join("dem.tif"),
            &dem.raster.data,
            &dem.raster.transform,
            dem.raster.epsg,
            dem.raster.nodata,
        )?;
    }

    if params.options.include_look_vectors {
        write_geotiff(
            staging.join("lv_theta.tif"),
            &outcome.look_vectors.theta,
            &map_transform,
            map_epsg,
            Some(f64::NAN),
        )?;
        write_geotiff(
            staging.join("lv_phi.tif"),
            &outcome.look_vectors.phi,
            &map_transform,
            map_epsg,
            Some(f64::NAN),
        )?;
    }

    if let Some(map_mask) = &water_mask_map {
        write_mask_geotiff(staging.join("water_mask.tif"), map_mask, &map_transform, map_epsg)?;
    }

    // Reference point in radar and map coordinates
    let reference_point = locate_reference_point(&lut, unwrap_outcome.reference_pixel);
    fs::write(
        staging.join("ref_point.json"),
        serde_json::to_string_pretty(&reference_point)
            .map_err(|e| InsarError::Processing(format!("Failed to serialize reference point: {}", e)))?,
    )?;

    let metadata = PairMetadata {
        reference_granule: reference.granule_id.clone(),
        secondary_granule: secondary.granule_id.clone(),
        reference_orbit: reference_orbit.quality,
        secondary_orbit: secondary_orbit.quality,
        dead_reckoning,
        offsets,
        reference_point,
    };
    fs::write(
        staging.join("pair_metadata.json"),
        serde_json::to_string_pretty(&metadata)
            .map_err(|e| InsarError::Processing(format!("Failed to serialize metadata: {}", e)))?,
    )?;

    // Products only appear once everything above has succeeded
    let product_dir = arena.final_products(&product_name(&reference, &secondary));
    fs::rename(&staging, &product_dir)?;
    log::info!("Products written to {}", product_dir.display());

    Ok(InsarProduct {
        product_dir,
        metadata,
    })
}

fn product_name(reference: &Scene, secondary: &Scene) -> String {
    format!(
        "{}_{}",
        reference.start_time.format("%Y%m%dT%H%M%S"),
        secondary.start_time.format("%Y%m%dT%H%M%S")
    )
}

/// Radar-geometry rasters carry pixel-index georeferencing
fn radar_transform() -> GeoTransform {
    GeoTransform {
        top_left_x: 0.0,
        pixel_width: 1.0,
        rotation_x: 0.0,
        top_left_y: 0.0,
        rotation_y: 0.0,
        pixel_height: 1.0,
    }
}

fn lut_radar_dims_check(
    lut: &crate::core::geocode::LookupTable,
    dims: (usize, usize),
) -> InsarResult<()> {
    if dims != (lut.radar_lines, lut.radar_samples) {
        return Err(InsarError::Processing(format!(
            "engine raster is {:?}, lookup table maps {:?}",
            dims,
            (lut.radar_lines, lut.radar_samples)
        )));
    }
    Ok(())
}

/// Map-grid cell whose lookup coordinates are closest to the radar
/// anchor, with its map and geographic coordinates
fn locate_reference_point(
    lut: &crate::core::geocode::LookupTable,
    anchor: (usize, usize),
) -> ReferencePoint {
    let (row_s, col_s) = anchor;
    let target_line = row_s as f64;
    let target_sample = col_s as f64;

    let mut best = (0usize, 0usize);
    let mut best_distance = f64::INFINITY;
    for ((i, j), s) in lut.range.indexed_iter() {
        let l = lut.azimuth[[i, j]];
        if !s.is_finite() || !l.is_finite() {
            continue;
        }
        let distance = (s - target_sample).powi(2) + (l - target_line).powi(2);
        if distance < best_distance {
            best_distance = distance;
            best = (i, j);
        }
    }

    let (row_m, col_m) = best;
    let (x, y) = lut.transform.pixel_to_map(row_m as f64, col_m as f64);
    // The map grid is geographic, so x/y are lon/lat directly
    ReferencePoint {
        row_s,
        col_s,
        row_m,
        col_m,
        y,
        x,
        lat: y,
        lon: x,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_locate_reference_point_on_identity_table() {
        let lines = 6;
        let samples = 8;
        let mut range = Array2::from_elem((lines, samples), f64::NAN);
        let mut azimuth = Array2::from_elem((lines, samples), f64::NAN);
        for i in 0..lines {
            for j in 0..samples {
                range[[i, j]] = j as f64;
                azimuth[[i, j]] = i as f64;
            }
        }
        let lut = crate::core::geocode::LookupTable {
            range,
            azimuth,
            transform: GeoTransform {
                top_left_x: 10.0,
                pixel_width: 0.01,
                rotation_x: 0.0,
                top_left_y: 50.0,
                rotation_y: 0.0,
                pixel_height: -0.01,
            },
            epsg: 4326,
            radar_samples: samples,
            radar_lines: lines,
        };

        let point = locate_reference_point(&lut, (3, 5));
        assert_eq!((point.row_m, point.col_m), (3, 5));
        assert_eq!((point.row_s, point.col_s), (3, 5));
        assert!((point.lon - (10.0 + 5.5 * 0.01)).abs() < 1e-9);
        assert!((point.lat - (50.0 - 3.5 * 0.01)).abs() < 1e-9);
    }

    #[test]
    fn test_product_name_uses_acquisition_times() {
        use chrono::{TimeZone, Utc};
        let scene = |id: &str, time| Scene {
            granule_id: id.to_string(),
            polarization: Polarization::VV,
            product_type: crate::types::ProductType::Slc,
            start_time: time,
            footprint: crate::types::BoundingBox {
                min_lon: 0.0,
                max_lon: 1.0,
                min_lat: 0.0,
                max_lat: 1.0,
            },
            swaths: Vec::new(),
            orbit: None,
        };
        let reference = scene(
            "REF",
            Utc.with_ymd_and_hms(2020, 1, 3, 17, 8, 15).unwrap(),
        );
        let secondary = scene(
            "SEC",
            Utc.with_ymd_and_hms(2020, 1, 15, 17, 8, 16).unwrap(),
        );
        assert_eq!(
            product_name(&reference, &secondary),
            "20200103T170815_20200115T170816"
        );
    }
}
