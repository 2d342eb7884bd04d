use crate::core::geocode::LookupTable;
use crate::engine::RadarEngine;
use crate::io::dem::FramedDem;
use crate::io::raster::GeoRaster;
use crate::types::{
    CoregistrationReport, InsarError, InsarResult, OffsetPolynomial, OrbitData, SarRealImage,
    StateVector,
};
use chrono::Timelike;
use ndarray::Array2;
use std::fs;
use std::path::{Path, PathBuf};

const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Radar timing and sampling of the multi-looked reference geometry
#[derive(Debug, Clone)]
pub struct RadarGeometry {
    /// Radar raster dimensions (multi-looked)
    pub samples: usize,
    pub lines: usize,
    /// Slant range to the first sample, meters
    pub near_range: f64,
    /// Slant-range sample spacing, meters
    pub range_pixel_spacing: f64,
    /// Azimuth line spacing on ground, meters
    pub azimuth_pixel_spacing: f64,
    /// Time between azimuth lines, seconds
    pub azimuth_time_interval: f64,
    /// Azimuth time of the first line, seconds of day
    pub start_seconds_of_day: f64,
    /// Radar wavelength, meters
    pub wavelength: f64,
}

impl Default for RadarGeometry {
    fn default() -> Self {
        // Sentinel-1 IW typical, 20x4 looks
        Self {
            samples: 0,
            lines: 0,
            near_range: 815_000.0,
            range_pixel_spacing: 2.33 * 20.0,
            azimuth_pixel_spacing: 14.1 * 4.0,
            azimuth_time_interval: 4.0 / 486.5,
            start_seconds_of_day: 0.0,
            wavelength: 0.055465763,
        }
    }
}

/// Iteration and correlation-window policy for offset refinement.
/// The iteration count is fixed by configuration, not by a convergence
/// criterion on the residual.
#[derive(Debug, Clone)]
pub struct CoregistrationConfig {
    pub refine_iterations: usize,
    pub coarse_window: (usize, usize),
    pub fine_window: (usize, usize),
}

impl Default for CoregistrationConfig {
    fn default() -> Self {
        Self {
            refine_iterations: 3,
            coarse_window: (256, 64),
            fine_window: (128, 32),
        }
    }
}

/// Per-map-cell look direction: elevation angle above the local horizon
/// and heading of the ground-to-satellite vector
#[derive(Debug, Clone)]
pub struct LookVectors {
    pub theta: SarRealImage,
    pub phi: SarRealImage,
}

/// Everything the refinement run produced; frozen once the validator
/// accepts the offsets
pub struct CoregistrationOutcome {
    pub lookup_table: LookupTable,
    /// Geometry-only table from step 0, the dead-reckoning fallback
    pub initial_lookup_table: LookupTable,
    pub offsets: OffsetPolynomial,
    pub reports: Vec<CoregistrationReport>,
    pub look_vectors: LookVectors,
    pub lut_path: PathBuf,
    pub simulated_phase: PathBuf,
    pub resampled_secondary: PathBuf,
}

/// Iterative derivation of the lookup table and offset polynomial
/// aligning the secondary acquisition to the reference geometry
pub struct Coregistrator<'a, E: RadarEngine> {
    engine: &'a E,
    work_dir: PathBuf,
    config: CoregistrationConfig,
}

impl<'a, E: RadarEngine> Coregistrator<'a, E> {
    pub fn new<P: AsRef<Path>>(engine: &'a E, work_dir: P, config: CoregistrationConfig) -> Self {
        Self {
            engine,
            work_dir: work_dir.as_ref().to_path_buf(),
            config,
        }
    }

    /// Run the four-step refinement sequence. Strictly sequential, no
    /// loop-back: init, coarse, fixed-count refine, final fine pass.
    pub fn run(
        &self,
        dem: &FramedDem,
        orbit: &OrbitData,
        geometry: &RadarGeometry,
        reference_image: &Path,
        secondary_image: &Path,
    ) -> InsarResult<CoregistrationOutcome> {
        // Step 0: geometry-only lookup table and simulated phase
        if !dem.path.exists() {
            return Err(InsarError::DemMissing(dem.path.clone()));
        }
        log::info!("Coregistration step 0: geometric lookup table");
        let (mut lut, look_vectors) = build_lookup_table(&dem.raster, orbit, geometry)?;
        let initial_lookup_table = lut.clone();

        let lut_path = self.work_dir.join("lookup_table.tif");
        lut.write(&lut_path)?;

        let simulated_phase = self.work_dir.join("sim_unw_phase.tif");
        self.engine
            .simulate_phase(&dem.path, &lut_path, &simulated_phase)?;

        let resampled_secondary = self.work_dir.join("secondary_resampled.tif");
        let mut reports = Vec::new();

        // Step 1: coarse pass; the running polynomial starts as a copy
        // of the first estimate
        log::info!("Coregistration step 1: coarse offset estimate");
        let report = self.match_pass(
            reference_image,
            secondary_image,
            &lut_path,
            &resampled_secondary,
            self.config.coarse_window,
        )?;
        let mut offsets = report.offsets.clone();
        lut.apply_offsets(&report.offsets);
        lut.write(&lut_path)?;
        self.write_report_log("step1", &report)?;
        reports.push(report);

        // Step 2: fixed number of coarse refinement iterations, each
        // accumulated into the running polynomial
        for iteration in 1..=self.config.refine_iterations {
            log::info!(
                "Coregistration step 2: refinement {}/{}",
                iteration,
                self.config.refine_iterations
            );
            let report = self.match_pass(
                reference_image,
                secondary_image,
                &lut_path,
                &resampled_secondary,
                self.config.coarse_window,
            )?;
            offsets.accumulate(&report.offsets);
            lut.apply_offsets(&report.offsets);
            lut.write(&lut_path)?;
            self.write_report_log(&format!("iter{}", iteration), &report)?;
            reports.push(report);
        }

        // Step 3: final pass with the fine correlation window
        log::info!("Coregistration step 3: fine offset estimate");
        let report = self.match_pass(
            reference_image,
            secondary_image,
            &lut_path,
            &resampled_secondary,
            self.config.fine_window,
        )?;
        offsets.accumulate(&report.offsets);
        lut.apply_offsets(&report.offsets);
        lut.write(&lut_path)?;
        self.write_report_log("step3", &report)?;
        reports.push(report);

        let offsets_file = self.work_dir.join("offsets_final.json");
        fs::write(&offsets_file, serde_json::to_string_pretty(&offsets).map_err(
            |e| InsarError::Processing(format!("Failed to serialize offsets: {}", e)),
        )?)?;

        log::info!(
            "Coregistration complete: cumulative offset ({:.4}, {:.4}) samples at origin",
            offsets.range[0],
            offsets.azimuth[0]
        );

        Ok(CoregistrationOutcome {
            lookup_table: lut,
            initial_lookup_table,
            offsets,
            reports,
            look_vectors,
            lut_path,
            simulated_phase,
            resampled_secondary,
        })
    }

    /// One coregister + cross-correlate + fit pass
    fn match_pass(
        &self,
        reference_image: &Path,
        secondary_image: &Path,
        lut_path: &Path,
        resampled: &Path,
        window: (usize, usize),
    ) -> InsarResult<CoregistrationReport> {
        self.engine
            .coregister(secondary_image, lut_path, resampled)?;
        self.engine
            .estimate_offset(reference_image, resampled, window)
    }

    /// Persist one step's report in the engine's own textual format so
    /// diagnostics can re-read it with the same patterns
    fn write_report_log(&self, tag: &str, report: &CoregistrationReport) -> InsarResult<()> {
        let path = self.work_dir.join(format!("offset_{}.log", tag));
        let mut content = String::new();
        content.push_str(&format!(
            "range offset polynomial: {}\n",
            format_coefficients(&report.offsets.range)
        ));
        content.push_str(&format!(
            "azimuth offset polynomial: {}\n",
            format_coefficients(&report.offsets.azimuth)
        ));
        content.push_str(&format!(
            "final model fit std. dev. (samples) range: {:.4} azimuth: {:.4}\n",
            report.stddev_range, report.stddev_azimuth
        ));
        fs::write(path, content)?;
        Ok(())
    }
}

fn format_coefficients(coefficients: &[f64; 6]) -> String {
    coefficients
        .iter()
        .map(|c| format!("{:.6e}", c))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the map-grid to radar-coordinate lookup table from orbit and
/// DEM geometry, together with per-cell look vectors.
///
/// For every DEM cell the zero-doppler azimuth time is solved on the
/// state-vector timeline, the slant range gives the sample coordinate,
/// and the timing gives the line coordinate. Cells without a solution
/// or outside the radar raster are NaN.
pub fn build_lookup_table(
    dem: &GeoRaster,
    orbit: &OrbitData,
    geometry: &RadarGeometry,
) -> InsarResult<(LookupTable, LookVectors)> {
    if dem.epsg != 4326 {
        return Err(InsarError::Processing(format!(
            "lookup table expects a geographic DEM grid, got EPSG:{}",
            dem.epsg
        )));
    }
    if orbit.state_vectors.len() < 2 {
        return Err(InsarError::Processing(
            "orbit carries fewer than two state vectors".to_string(),
        ));
    }

    let (lines, samples) = dem.dim();
    let nodata = dem.nodata.unwrap_or(-32768.0) as f32;

    let mut range = Array2::from_elem((lines, samples), f64::NAN);
    let mut azimuth = Array2::from_elem((lines, samples), f64::NAN);
    let mut theta = Array2::from_elem((lines, samples), f32::NAN);
    let mut phi = Array2::from_elem((lines, samples), f32::NAN);

    let timeline: Vec<(f64, &StateVector)> = orbit
        .state_vectors
        .iter()
        .map(|sv| (seconds_of_day(&sv.time), sv))
        .collect();

    let mut solved = 0usize;
    for i in 0..lines {
        for j in 0..samples {
            let elevation = dem.data[[i, j]];
            if !elevation.is_finite() || elevation == nodata {
                continue;
            }

            let (lon, lat) = dem.transform.pixel_to_map(i as f64, j as f64);
            let ground = latlon_to_ecef(lat, lon, elevation as f64);

            let Some((time, sat_pos)) = zero_doppler_solve(&timeline, &ground) else {
                continue;
            };

            let slant_range = distance(&sat_pos, &ground);
            let sample = (slant_range - geometry.near_range) / geometry.range_pixel_spacing;
            let line = (time - geometry.start_seconds_of_day) / geometry.azimuth_time_interval;

            if sample < 0.0
                || line < 0.0
                || sample >= geometry.samples as f64
                || line >= geometry.lines as f64
            {
                continue;
            }

            range[[i, j]] = sample;
            azimuth[[i, j]] = line;
            solved += 1;

            let (elevation_angle, heading) = look_angles(lat, lon, &ground, &sat_pos);
            theta[[i, j]] = elevation_angle as f32;
            phi[[i, j]] = heading as f32;
        }
    }

    let coverage = solved as f64 / (lines * samples) as f64 * 100.0;
    log::info!(
        "Lookup table: {}x{} map cells, {:.1}% with a radar solution",
        samples,
        lines,
        coverage
    );

    Ok((
        LookupTable {
            range,
            azimuth,
            transform: dem.transform.clone(),
            epsg: dem.epsg,
            radar_samples: geometry.samples,
            radar_lines: geometry.lines,
        },
        LookVectors { theta, phi },
    ))
}

/// Convert lat/lon/elevation to ECEF coordinates (WGS84)
fn latlon_to_ecef(lat: f64, lon: f64, elevation: f64) -> [f64; 3] {
    let a = 6_378_137.0; // WGS84 semi-major axis
    let e2 = 0.00669437999014; // WGS84 first eccentricity squared

    let lat_rad = lat.to_radians();
    let lon_rad = lon.to_radians();

    let n = a / (1.0 - e2 * lat_rad.sin().powi(2)).sqrt();

    let x = (n + elevation) * lat_rad.cos() * lon_rad.cos();
    let y = (n + elevation) * lat_rad.cos() * lon_rad.sin();
    let z = (n * (1.0 - e2) + elevation) * lat_rad.sin();

    [x, y, z]
}

fn seconds_of_day(time: &chrono::DateTime<chrono::Utc>) -> f64 {
    time.hour() as f64 * 3600.0
        + time.minute() as f64 * 60.0
        + time.second() as f64
        + time.nanosecond() as f64 * 1e-9
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Find the zero-doppler azimuth time for a ground point: the time at
/// which the satellite velocity is perpendicular to the line of sight.
/// Linear interpolation between the bracketing state vectors.
fn zero_doppler_solve(
    timeline: &[(f64, &StateVector)],
    ground: &[f64; 3],
) -> Option<(f64, [f64; 3])> {
    let doppler = |sv: &StateVector| {
        let los = [
            ground[0] - sv.position[0],
            ground[1] - sv.position[1],
            ground[2] - sv.position[2],
        ];
        dot(&sv.velocity, &los)
    };

    for pair in timeline.windows(2) {
        let (t0, sv0) = pair[0];
        let (t1, sv1) = pair[1];
        let f0 = doppler(sv0);
        let f1 = doppler(sv1);

        if f0 == 0.0 {
            return Some((t0, sv0.position));
        }
        if f0 * f1 < 0.0 {
            let fraction = f0 / (f0 - f1);
            let time = t0 + fraction * (t1 - t0);
            let position = [
                sv0.position[0] + fraction * (sv1.position[0] - sv0.position[0]),
                sv0.position[1] + fraction * (sv1.position[1] - sv0.position[1]),
                sv0.position[2] + fraction * (sv1.position[2] - sv0.position[2]),
            ];
            return Some((time, position));
        }
    }

    None
}

/// Elevation angle above the local horizon and heading (from north,
/// clockwise) of the ground-to-satellite vector
fn look_angles(lat: f64, lon: f64, ground: &[f64; 3], sat: &[f64; 3]) -> (f64, f64) {
    let lat_rad = lat.to_radians();
    let lon_rad = lon.to_radians();

    let up = [
        lat_rad.cos() * lon_rad.cos(),
        lat_rad.cos() * lon_rad.sin(),
        lat_rad.sin(),
    ];
    let east = [-lon_rad.sin(), lon_rad.cos(), 0.0];
    let north = [
        -lat_rad.sin() * lon_rad.cos(),
        -lat_rad.sin() * lon_rad.sin(),
        lat_rad.cos(),
    ];

    let mut los = [sat[0] - ground[0], sat[1] - ground[1], sat[2] - ground[2]];
    let magnitude = (los[0] * los[0] + los[1] * los[1] + los[2] * los[2]).sqrt();
    if magnitude > 0.0 {
        los[0] /= magnitude;
        los[1] /= magnitude;
        los[2] /= magnitude;
    }

    let elevation_angle = dot(&los, &up).clamp(-1.0, 1.0).asin();
    let heading = dot(&los, &east).atan2(dot(&los, &north));
    (elevation_angle, heading)
}

/// Line-of-sight displacement from unwrapped phase: one phase cycle is
/// half a wavelength of two-way path
pub fn phase_to_displacement(unwrapped: &SarRealImage, wavelength: f64) -> SarRealImage {
    let scale = (wavelength / (4.0 * std::f64::consts::PI)) as f32;
    unwrapped.mapv(|p| if p.is_finite() { p * scale } else { f32::NAN })
}
