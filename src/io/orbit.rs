use crate::io::annotation::AnnotationRoot;
use crate::types::{InsarError, InsarResult, OrbitData, OrbitQuality, Scene, StateVector};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

/// Provider of precise orbit files for a scene.
///
/// Retrieval (download, archive lookup) lives outside this crate; an
/// implementation only has to answer with a local EOF path, or `None`
/// when no precise solution exists for the acquisition.
pub trait OrbitSource {
    fn fetch_orbit(&self, scene: &Scene) -> InsarResult<Option<PathBuf>>;
}

/// Orbit source backed by a directory of already-retrieved EOF files
pub struct DirectoryOrbitSource {
    dir: PathBuf,
}

impl DirectoryOrbitSource {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl OrbitSource for DirectoryOrbitSource {
    fn fetch_orbit(&self, scene: &Scene) -> InsarResult<Option<PathBuf>> {
        if !self.dir.exists() {
            return Ok(None);
        }

        let platform = scene.granule_id.split('_').next().unwrap_or("");
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".EOF") || !name.starts_with(platform) {
                continue;
            }
            if orbit_file_covers(name, scene.start_time) {
                log::debug!("Orbit candidate for {}: {}", scene.granule_id, name);
                return Ok(Some(path));
            }
        }
        Ok(None)
    }
}

/// Check the validity window encoded in an EOF filename,
/// S1A_OPER_AUX_POEORB_OPOD_[prod]_V[start]_[end].EOF
fn orbit_file_covers(filename: &str, target_time: DateTime<Utc>) -> bool {
    let parts: Vec<&str> = filename.split('_').collect();
    for (i, part) in parts.iter().enumerate() {
        let Some(start_str) = part.strip_prefix('V') else {
            continue;
        };
        let Ok(start) = parse_orbit_filename_time(start_str) else {
            continue;
        };
        let Some(end_str) = parts.get(i + 1) else {
            continue;
        };
        if let Ok(end) = parse_orbit_filename_time(end_str.trim_end_matches(".EOF")) {
            return target_time >= start && target_time <= end;
        }
    }
    false
}

/// Parse time from orbit filename format (YYYYMMDDTHHMMSS)
fn parse_orbit_filename_time(time_str: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(time_str, "%Y%m%dT%H%M%S")
        .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
}

/// Precise orbit file reader for Sentinel-1
pub struct OrbitReader;

impl OrbitReader {
    /// Read a precise orbit file (EOF format)
    pub fn read_orbit_file<P: AsRef<Path>>(path: P) -> InsarResult<OrbitData> {
        log::info!("Reading orbit file: {}", path.as_ref().display());

        let content = fs::read_to_string(&path)?;
        Self::parse_eof_content(&content)
    }

    /// Parse EOF XML content into state vectors.
    /// Scans for <OSV> blocks; each carries a UTC timestamp plus ECEF
    /// position and velocity components.
    pub fn parse_eof_content(content: &str) -> InsarResult<OrbitData> {
        let component =
            Regex::new(r"<(X|Y|Z|VX|VY|VZ)\s[^>]*>\s*([-+0-9.eE]+)\s*</").map_err(|e| {
                InsarError::Processing(format!("Bad component pattern: {}", e))
            })?;

        let mut state_vectors = Vec::new();
        let mut time: Option<DateTime<Utc>> = None;
        let mut position = [f64::NAN; 3];
        let mut velocity = [f64::NAN; 3];

        for line in content.lines() {
            let line = line.trim();

            if line.contains("<OSV>") {
                time = None;
                position = [f64::NAN; 3];
                velocity = [f64::NAN; 3];
                continue;
            }

            if line.starts_with("<UTC>") {
                // Format: <UTC>UTC=2020-01-03T17:00:00.000000</UTC>
                let value = line
                    .trim_start_matches("<UTC>")
                    .trim_end_matches("</UTC>")
                    .trim_start_matches("UTC=");
                let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                    .map_err(|e| {
                        InsarError::XmlParsing(format!("Bad OSV timestamp '{}': {}", value, e))
                    })?;
                time = Some(DateTime::from_naive_utc_and_offset(naive, Utc));
                continue;
            }

            if let Some(cap) = component.captures(line) {
                let value: f64 = cap[2].parse().map_err(|e| {
                    InsarError::XmlParsing(format!("Bad OSV component '{}': {}", line, e))
                })?;
                match &cap[1] {
                    "X" => position[0] = value,
                    "Y" => position[1] = value,
                    "Z" => position[2] = value,
                    "VX" => velocity[0] = value,
                    "VY" => velocity[1] = value,
                    "VZ" => velocity[2] = value,
                    _ => {}
                }
                continue;
            }

            if line.contains("</OSV>") {
                if let Some(t) = time.take() {
                    if position.iter().chain(velocity.iter()).all(|v| v.is_finite()) {
                        state_vectors.push(StateVector {
                            time: t,
                            position,
                            velocity,
                        });
                    }
                }
            }
        }

        if state_vectors.is_empty() {
            return Err(InsarError::OrbitUnavailable(
                "no valid state vectors found in orbit file".to_string(),
            ));
        }

        state_vectors.sort_by_key(|sv| sv.time);
        let reference_time = state_vectors[0].time;

        log::info!("Parsed {} orbit state vectors", state_vectors.len());
        Ok(OrbitData {
            state_vectors,
            reference_time,
            quality: OrbitQuality::Precise,
        })
    }
}

/// Build predicted orbit data from the annotation's onboard orbit list
pub fn predicted_from_annotation(annotation: &AnnotationRoot) -> InsarResult<Option<OrbitData>> {
    let Some(list) = annotation
        .general_annotation
        .as_ref()
        .and_then(|g| g.orbit_list.as_ref())
    else {
        return Ok(None);
    };

    let mut state_vectors = Vec::with_capacity(list.orbits.len());
    for entry in &list.orbits {
        let naive = NaiveDateTime::parse_from_str(&entry.time, "%Y-%m-%dT%H:%M:%S%.f")
            .map_err(|e| {
                InsarError::XmlParsing(format!("Bad orbit timestamp '{}': {}", entry.time, e))
            })?;
        state_vectors.push(StateVector {
            time: DateTime::from_naive_utc_and_offset(naive, Utc),
            position: [entry.position.x, entry.position.y, entry.position.z],
            velocity: [entry.velocity.x, entry.velocity.y, entry.velocity.z],
        });
    }

    if state_vectors.is_empty() {
        return Ok(None);
    }

    state_vectors.sort_by_key(|sv| sv.time);
    let reference_time = state_vectors[0].time;
    Ok(Some(OrbitData {
        state_vectors,
        reference_time,
        quality: OrbitQuality::Predicted,
    }))
}

/// Resolve the best available orbit for a scene.
///
/// A missing or unreadable precise orbit degrades to the scene's onboard
/// predicted state vectors with a warning; it never aborts the run.
pub fn resolve_orbit(scene: &Scene, source: &dyn OrbitSource) -> InsarResult<OrbitData> {
    match source.fetch_orbit(scene) {
        Ok(Some(path)) => match OrbitReader::read_orbit_file(&path) {
            Ok(orbit) => return Ok(orbit),
            Err(e) => {
                log::warn!(
                    "{}: unreadable orbit file {}: {}. Falling back to predicted orbit",
                    scene.granule_id,
                    path.display(),
                    e
                );
            }
        },
        Ok(None) => {
            log::warn!(
                "{}: no precise orbit found. Falling back to predicted orbit",
                scene.granule_id
            );
        }
        Err(e) => {
            log::warn!(
                "{}: orbit lookup failed: {}. Falling back to predicted orbit",
                scene.granule_id,
                e
            );
        }
    }

    scene.orbit.clone().ok_or_else(|| {
        InsarError::OrbitUnavailable(format!(
            "{}: no precise orbit and no predicted state vectors",
            scene.granule_id
        ))
    })
}
