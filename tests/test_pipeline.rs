use insardine::core::coregister::RadarGeometry;
use insardine::engine::RadarEngine;
use insardine::io::dem::FileDemSource;
use insardine::io::orbit::OrbitSource;
use insardine::io::raster::write_geotiff;
use insardine::pipeline::{process_insar_pair, Collaborators, InsarParams, ProductOptions};
use insardine::types::{
    CoregistrationReport, GeoTransform, InsarError, InsarResult, OffsetPolynomial, OrbitQuality,
    Polarization, Scene,
};
use ndarray::Array2;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::FileOptions;

const RADAR_LINES: usize = 128;
const RADAR_SAMPLES: usize = 128;

fn radar_gt() -> GeoTransform {
    GeoTransform {
        top_left_x: 0.0,
        pixel_width: 1.0,
        rotation_x: 0.0,
        top_left_y: 0.0,
        rotation_y: 0.0,
        pixel_height: 1.0,
    }
}

fn write_radar_raster(path: &Path, data: &Array2<f32>) -> InsarResult<()> {
    write_geotiff(path, data, &radar_gt(), 4326, Some(f64::NAN))
}

/// Engine stub: writes deterministic rasters, reports scripted offsets
struct MockEngine {
    stddev: f64,
    azimuth_c0: f64,
}

impl MockEngine {
    fn nominal() -> Self {
        Self {
            stddev: 0.1,
            azimuth_c0: 0.001,
        }
    }
}

impl RadarEngine for MockEngine {
    fn ingest(
        &self,
        _archive: &Path,
        _burst_table: &Path,
        _pol: Polarization,
        _looks: (u32, u32),
        out_image: &Path,
    ) -> InsarResult<()> {
        write_radar_raster(out_image, &Array2::from_elem((RADAR_LINES, RADAR_SAMPLES), 1.0))
    }

    fn simulate_phase(&self, _dem: &Path, _lut: &Path, out: &Path) -> InsarResult<()> {
        write_radar_raster(out, &Array2::zeros((RADAR_LINES, RADAR_SAMPLES)))
    }

    fn coregister(&self, _secondary: &Path, _lut: &Path, out: &Path) -> InsarResult<()> {
        write_radar_raster(out, &Array2::from_elem((RADAR_LINES, RADAR_SAMPLES), 1.0))
    }

    fn estimate_offset(
        &self,
        _reference: &Path,
        _secondary: &Path,
        _window: (usize, usize),
    ) -> InsarResult<CoregistrationReport> {
        let mut offsets = OffsetPolynomial::zero();
        offsets.range[0] = 0.1;
        offsets.azimuth[0] = self.azimuth_c0;
        Ok(CoregistrationReport {
            offsets,
            stddev_range: self.stddev,
            stddev_azimuth: self.stddev,
        })
    }

    fn form_interferogram(
        &self,
        _reference: &Path,
        _secondary: &Path,
        _simulated_phase: &Path,
        out_interferogram: &Path,
        out_coherence: &Path,
    ) -> InsarResult<()> {
        write_radar_raster(
            out_interferogram,
            &Array2::zeros((RADAR_LINES, RADAR_SAMPLES)),
        )?;
        // Low-coherence scene with one reliable block
        let mut coherence = Array2::from_elem((RADAR_LINES, RADAR_SAMPLES), 0.1f32);
        for i in 40..60 {
            for j in 40..60 {
                coherence[[i, j]] = 0.9;
            }
        }
        write_radar_raster(out_coherence, &coherence)
    }

    fn adf_filter(&self, _interferogram: &Path, _alpha: f64, out: &Path) -> InsarResult<()> {
        write_radar_raster(out, &Array2::zeros((RADAR_LINES, RADAR_SAMPLES)))
    }

    fn unwrap(
        &self,
        _interferogram: &Path,
        _coherence: &Path,
        _validity_mask: &Path,
        _anchor: (usize, usize),
        out_phase: &Path,
    ) -> InsarResult<()> {
        write_radar_raster(
            out_phase,
            &Array2::from_elem((RADAR_LINES, RADAR_SAMPLES), 6.28f32),
        )
    }
}

/// No precise orbit anywhere: the pipeline falls back to the
/// annotation's predicted state vectors
struct NoOrbit;

impl OrbitSource for NoOrbit {
    fn fetch_orbit(&self, _scene: &Scene) -> InsarResult<Option<PathBuf>> {
        Ok(None)
    }
}

fn orbit_list_xml(date: &str) -> String {
    // Straight pass over the equator at ~700 km, one state vector per
    // second around 17:00:05
    let mut entries = String::new();
    for i in 0..11 {
        entries.push_str(&format!(
            "<orbit><time>{date}T17:00:{i:02}.000000</time>\
             <position><x>7078137.0</x><y>{y:.1}</y><z>0.0</z></position>\
             <velocity><x>0.0</x><y>7500.0</y><z>0.0</z></velocity></orbit>",
            date = date,
            i = i,
            y = (i as f64 - 5.0) * 7500.0,
        ));
    }
    format!("<orbitList>{}</orbitList>", entries)
}

fn annotation_xml(date: &str, swath: &str, burst_offset: f64) -> String {
    let mut bursts = String::new();
    for b in 0..3 {
        let seconds = 4.0 + burst_offset + b as f64 * 2.758277;
        bursts.push_str(&format!(
            "<burst><azimuthTime>{}T17:00:{:09.6}</azimuthTime><byteOffset>0</byteOffset></burst>",
            date, seconds
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<product>
  <adsHeader>
    <missionId>S1A</missionId>
    <productType>SLC</productType>
    <polarisation>VV</polarisation>
    <swath>{swath}</swath>
    <startTime>{date}T17:00:00.000000</startTime>
  </adsHeader>
  <generalAnnotation>{orbits}</generalAnnotation>
  <swathTiming><burstList count="3">{bursts}</burstList></swathTiming>
  <geolocationGrid>
    <geolocationGridPointList count="2">
      <geolocationGridPoint>
        <line>0</line><pixel>0</pixel>
        <latitude>0.005</latitude><longitude>-0.005</longitude><height>0.0</height>
      </geolocationGridPoint>
      <geolocationGridPoint>
        <line>100</line><pixel>100</pixel>
        <latitude>-0.005</latitude><longitude>0.005</longitude><height>0.0</height>
      </geolocationGridPoint>
    </geolocationGridPointList>
  </geolocationGrid>
</product>"#,
        swath = swath.to_uppercase(),
        date = date,
        orbits = orbit_list_xml(date),
        bursts = bursts,
    )
}

/// Minimal SAFE archive: three annotation XMLs, nothing else
fn build_safe_archive(dir: &Path, granule_id: &str, date: &str, burst_offset: f64) -> PathBuf {
    let path = dir.join(format!("{}.zip", granule_id));
    let file = File::create(&path).unwrap();
    let mut archive = zip::ZipWriter::new(file);

    for swath in ["iw1", "iw2", "iw3"] {
        let name = format!(
            "{}.SAFE/annotation/s1a-{}-slc-vv-{}t170000.xml",
            granule_id,
            swath,
            date.replace('-', "")
        );
        archive
            .start_file(name, FileOptions::default())
            .unwrap();
        archive
            .write_all(annotation_xml(date, swath, burst_offset).as_bytes())
            .unwrap();
    }
    archive.finish().unwrap();
    path
}

fn build_dem(dir: &Path) -> PathBuf {
    let path = dir.join("dem.tif");
    let dem = Array2::zeros((4, 4));
    let transform = GeoTransform {
        top_left_x: -0.005,
        pixel_width: 0.0025,
        rotation_x: 0.0,
        top_left_y: 0.005,
        rotation_y: 0.0,
        pixel_height: -0.0025,
    };
    write_geotiff(&path, &dem, &transform, 4326, Some(-32768.0)).unwrap();
    path
}

fn test_geometry() -> RadarGeometry {
    RadarGeometry {
        samples: 0,
        lines: 0,
        near_range: 690_000.0,
        range_pixel_spacing: 100.0,
        azimuth_pixel_spacing: 14.1,
        azimuth_time_interval: 0.05,
        start_seconds_of_day: 17.0 * 3600.0,
        wavelength: 0.055465763,
    }
}

fn test_params() -> InsarParams {
    InsarParams {
        geometry: test_geometry(),
        options: ProductOptions {
            include_wrapped_phase: true,
            include_dem: true,
            include_look_vectors: true,
            include_displacement: true,
        },
        ..InsarParams::default()
    }
}

fn setup(dir: &Path) -> (PathBuf, PathBuf, FileDemSource) {
    let reference = build_safe_archive(
        dir,
        "S1A_IW_SLC__1SDV_20200103T170000_20200103T170027_030639_0382D5_AAAA",
        "2020-01-03",
        0.0,
    );
    let secondary = build_safe_archive(
        dir,
        "S1A_IW_SLC__1SDV_20200115T170000_20200115T170027_030814_038869_BBBB",
        "2020-01-15",
        0.05,
    );
    let dem_source = FileDemSource::new(build_dem(dir));
    (reference, secondary, dem_source)
}

#[test]
fn test_pair_processing_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let (reference, secondary, dem_source) = setup(dir.path());
    let engine = MockEngine::nominal();

    let collaborators = Collaborators {
        engine: &engine,
        orbit_source: &NoOrbit,
        dem_source: &dem_source,
        water_source: None,
    };

    let product = process_insar_pair(
        &reference,
        &secondary,
        &test_params(),
        &collaborators,
        &dir.path().join("run"),
    )
    .expect("pipeline should complete");

    for name in [
        "amp.tif",
        "corr.tif",
        "unw_phase.tif",
        "wrapped_phase.tif",
        "los_disp.tif",
        "dem.tif",
        "lv_theta.tif",
        "lv_phi.tif",
        "ref_point.json",
        "pair_metadata.json",
    ] {
        assert!(
            product.product_dir.join(name).exists(),
            "missing product {}",
            name
        );
    }

    let metadata = &product.metadata;
    assert!(!metadata.dead_reckoning);
    assert_eq!(metadata.reference_orbit, OrbitQuality::Predicted);
    assert_eq!(metadata.secondary_orbit, OrbitQuality::Predicted);
    // Cumulative range offset: 5 estimates of 0.1 samples
    assert!((metadata.offsets.range[0] - 0.5).abs() < 1e-9);
    // The anchor landed inside the high-coherence block
    let point = &metadata.reference_point;
    assert!(point.row_s >= 40 && point.row_s < 60, "row {}", point.row_s);
    assert!(point.col_s >= 40 && point.col_s < 60, "col {}", point.col_s);

    // The unwrapped map product carries the engine's constant phase
    // wherever the lookup table had a solution
    let unwrapped = insardine::io::read_geotiff(product.product_dir.join("unw_phase.tif")).unwrap();
    let valid: Vec<f32> = unwrapped
        .data
        .iter()
        .cloned()
        .filter(|v| v.is_finite())
        .collect();
    assert!(!valid.is_empty());
    assert!(valid.iter().all(|&v| (v - 6.28).abs() < 1e-3));
}

#[test]
fn test_rejected_offsets_fall_back_to_dead_reckoning() {
    let dir = tempfile::tempdir().unwrap();
    let (reference, secondary, dem_source) = setup(dir.path());
    let engine = MockEngine {
        stddev: 3.0,
        azimuth_c0: 0.001,
    };

    let collaborators = Collaborators {
        engine: &engine,
        orbit_source: &NoOrbit,
        dem_source: &dem_source,
        water_source: None,
    };

    let product = process_insar_pair(
        &reference,
        &secondary,
        &test_params(),
        &collaborators,
        &dir.path().join("run"),
    )
    .expect("dead reckoning should recover the run");

    assert!(product.metadata.dead_reckoning);
    // The empirical offsets were discarded with the fine-offset file
    assert_eq!(product.metadata.offsets, OffsetPolynomial::zero());
    assert!(product.product_dir.join("unw_phase.tif").exists());
}

#[test]
fn test_rejection_is_fatal_without_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let (reference, secondary, dem_source) = setup(dir.path());
    let engine = MockEngine {
        stddev: 3.0,
        azimuth_c0: 0.001,
    };

    let collaborators = Collaborators {
        engine: &engine,
        orbit_source: &NoOrbit,
        dem_source: &dem_source,
        water_source: None,
    };

    let params = InsarParams {
        allow_dead_reckoning: false,
        ..test_params()
    };
    let result = process_insar_pair(
        &reference,
        &secondary,
        &params,
        &collaborators,
        &dir.path().join("run"),
    );
    assert!(matches!(
        result,
        Err(InsarError::CoregistrationFailed { .. })
    ));
}

#[test]
fn test_gross_azimuth_offset_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let (reference, secondary, dem_source) = setup(dir.path());
    // 5 estimates of 0.01 accumulate to 0.05, past the 0.02 limit
    let engine = MockEngine {
        stddev: 0.1,
        azimuth_c0: 0.01,
    };

    let collaborators = Collaborators {
        engine: &engine,
        orbit_source: &NoOrbit,
        dem_source: &dem_source,
        water_source: None,
    };

    let result = process_insar_pair(
        &reference,
        &secondary,
        &test_params(),
        &collaborators,
        &dir.path().join("run"),
    );
    assert!(matches!(
        result,
        Err(InsarError::AzimuthOffsetExceeded { .. })
    ));
}

#[test]
fn test_grd_granule_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (_, secondary, dem_source) = setup(dir.path());

    // A GRD archive: correct structure, wrong product type
    let grd = build_safe_archive(
        dir.path(),
        "S1A_IW_GRDH_1SDV_20200103T170000_20200103T170027_030639_0382D5_CCCC",
        "2020-01-03",
        0.0,
    );

    let engine = MockEngine::nominal();
    let collaborators = Collaborators {
        engine: &engine,
        orbit_source: &NoOrbit,
        dem_source: &dem_source,
        water_source: None,
    };

    let result = process_insar_pair(
        &grd,
        &secondary,
        &test_params(),
        &collaborators,
        &dir.path().join("run"),
    );
    assert!(matches!(result, Err(InsarError::GranuleType(_))));
}

#[test]
fn test_water_masking_produces_mask_product() {
    let dir = tempfile::tempdir().unwrap();
    let (reference, secondary, dem_source) = setup(dir.path());

    // Land polygon covering the western half of the footprint
    let geojson = dir.path().join("land.geojson");
    std::fs::write(
        &geojson,
        r#"{"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {},
             "geometry": {"type": "Polygon", "coordinates":
               [[[-0.02, -0.02], [0.0, -0.02], [0.0, 0.02], [-0.02, 0.02], [-0.02, -0.02]]]}}
        ]}"#,
    )
    .unwrap();
    let water_source = insardine::core::OgrWaterBodySource::new(&geojson);

    let engine = MockEngine::nominal();
    let collaborators = Collaborators {
        engine: &engine,
        orbit_source: &NoOrbit,
        dem_source: &dem_source,
        water_source: Some(&water_source),
    };

    let params = InsarParams {
        apply_water_mask: true,
        ..test_params()
    };
    let product = process_insar_pair(
        &reference,
        &secondary,
        &params,
        &collaborators,
        &dir.path().join("run"),
    )
    .expect("water-masked run should complete");

    let mask = insardine::io::read_geotiff(product.product_dir.join("water_mask.tif")).unwrap();
    // Western cells touch land, the eastern edge is open water
    assert_eq!(mask.data[[0, 0]], 1.0);
    assert_eq!(mask.data[[0, 3]], 0.0);
}
