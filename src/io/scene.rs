use crate::io::annotation::{AnnotationParser, AnnotationRoot};
use crate::types::{
    BoundingBox, InsarError, InsarResult, Polarization, ProductType, Scene, SwathTiming,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

const SUB_SWATHS: [&str; 3] = ["iw1", "iw2", "iw3"];

/// Reader for Sentinel-1 SLC SAFE archives.
///
/// Only the annotation side of the archive is touched here; measurement
/// rasters are mosaicked by the external ingestion collaborator.
pub struct SceneReader {
    zip_path: PathBuf,
    archive: Option<ZipArchive<File>>,
}

impl SceneReader {
    /// Create a new scene reader for a Sentinel-1 product
    pub fn new<P: AsRef<Path>>(zip_path: P) -> InsarResult<Self> {
        let zip_path = zip_path.as_ref().to_path_buf();

        if !zip_path.exists() {
            return Err(InsarError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {}", zip_path.display()),
            )));
        }

        Ok(Self {
            zip_path,
            archive: None,
        })
    }

    /// Open the ZIP archive
    fn open_archive(&mut self) -> InsarResult<&mut ZipArchive<File>> {
        if self.archive.is_none() {
            let file = File::open(&self.zip_path)?;
            let archive = ZipArchive::new(file)
                .map_err(|e| InsarError::InvalidFormat(format!("Failed to open ZIP: {}", e)))?;
            self.archive = Some(archive);
        }
        Ok(self.archive.as_mut().unwrap())
    }

    /// List all files in the archive
    pub fn list_files(&mut self) -> InsarResult<Vec<String>> {
        let archive = self.open_archive()?;
        let mut files = Vec::new();

        for i in 0..archive.len() {
            let file = archive.by_index(i).map_err(|e| {
                InsarError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to access file {}: {}", i, e),
                ))
            })?;
            files.push(file.name().to_string());
        }

        Ok(files)
    }

    /// Find the annotation XML for one sub-swath and polarization
    fn find_annotation_file(
        &mut self,
        swath: &str,
        pol: Polarization,
    ) -> InsarResult<Option<String>> {
        let pol_token = format!("-{}-", pol.to_string().to_lowercase());
        let swath_token = format!("-{}-", swath);

        let files = self.list_files()?;
        Ok(files.into_iter().find(|name| {
            name.contains("/annotation/")
                && !name.contains("/calibration/")
                && name.ends_with(".xml")
                && name.contains(&swath_token)
                && name.contains(&pol_token)
        }))
    }

    /// Read one archive member into a string
    fn read_archive_text(&mut self, name: &str) -> InsarResult<String> {
        let archive = self.open_archive()?;
        let mut file = archive.by_name(name).map_err(|e| {
            InsarError::InvalidFormat(format!("Missing archive member {}: {}", name, e))
        })?;
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        Ok(content)
    }

    /// Read and parse the annotation for one sub-swath
    pub fn read_annotation(
        &mut self,
        swath: &str,
        pol: Polarization,
    ) -> InsarResult<AnnotationRoot> {
        let name = self.find_annotation_file(swath, pol)?.ok_or_else(|| {
            InsarError::InvalidFormat(format!(
                "No annotation for {} {} in {}",
                swath,
                pol,
                self.zip_path.display()
            ))
        })?;
        let content = self.read_archive_text(&name)?;
        AnnotationParser::parse_annotation(&content)
    }

    /// Assemble the scene description used by the pipeline.
    ///
    /// Rejects anything that is not a single-look-complex product: the
    /// interferometric chain needs phase, which GRD/OCN no longer carry.
    pub fn read_scene(&mut self, pol: Polarization) -> InsarResult<Scene> {
        let granule_id = granule_id_from_path(&self.zip_path);
        let product_type = product_type_from_granule(&granule_id)
            .ok_or_else(|| InsarError::GranuleType(granule_id.clone()))?;
        if product_type != ProductType::Slc {
            return Err(InsarError::GranuleType(granule_id));
        }

        let mut swaths = Vec::with_capacity(SUB_SWATHS.len());
        let mut footprint: Option<BoundingBox> = None;
        let mut start_time: Option<DateTime<Utc>> = None;
        let mut predicted_orbit = None;

        for swath in SUB_SWATHS {
            let annotation = self.read_annotation(swath, pol)?;
            let burst_times = AnnotationParser::extract_burst_times(&annotation)?;
            log::debug!("{}: {} bursts in {}", granule_id, burst_times.len(), swath);

            if predicted_orbit.is_none() {
                predicted_orbit = crate::io::orbit::predicted_from_annotation(&annotation)?;
            }

            if let Some(ref header) = annotation.ads_header {
                if start_time.is_none() {
                    start_time = Some(parse_header_time(&header.start_time)?);
                }
            }

            match AnnotationParser::extract_bounding_box(&annotation) {
                Ok(bbox) => {
                    footprint = Some(match footprint {
                        None => bbox,
                        Some(acc) => BoundingBox {
                            min_lon: acc.min_lon.min(bbox.min_lon),
                            max_lon: acc.max_lon.max(bbox.max_lon),
                            min_lat: acc.min_lat.min(bbox.min_lat),
                            max_lat: acc.max_lat.max(bbox.max_lat),
                        },
                    });
                }
                Err(e) => log::warn!("{}: no geolocation grid in {}: {}", granule_id, swath, e),
            }

            swaths.push(SwathTiming {
                id: swath.to_uppercase(),
                burst_count: burst_times.len(),
                burst_times,
            });
        }

        let footprint = footprint.ok_or_else(|| {
            InsarError::InvalidFormat(format!("{}: no usable geolocation grid", granule_id))
        })?;
        let start_time = start_time.ok_or_else(|| {
            InsarError::InvalidFormat(format!("{}: no adsHeader start time", granule_id))
        })?;

        Ok(Scene {
            granule_id,
            polarization: pol,
            product_type,
            start_time,
            footprint,
            swaths,
            orbit: predicted_orbit,
        })
    }
}

/// Granule identifier from an archive path (file stem without .SAFE)
pub fn granule_id_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .trim_end_matches(".SAFE")
        .to_string()
}

/// Product type from the granule identifier's third underscore field,
/// e.g. S1A_IW_SLC__1SDV_...
pub fn product_type_from_granule(granule_id: &str) -> Option<ProductType> {
    let token = granule_id.split('_').nth(2)?;
    ProductType::from_granule_token(token)
}

fn parse_header_time(timestamp: &str) -> InsarResult<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| InsarError::XmlParsing(format!("Bad header timestamp '{}': {}", timestamp, e)))?;
    Ok(DateTime::from_naive_utc_and_offset(naive, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granule_product_type() {
        assert_eq!(
            product_type_from_granule(
                "S1A_IW_SLC__1SDV_20200103T170815_20200103T170842_030639_0382D5_DADE"
            ),
            Some(ProductType::Slc)
        );
        assert_eq!(
            product_type_from_granule(
                "S1A_IW_GRDH_1SDV_20200103T170815_20200103T170842_030639_0382D5_DADE"
            ),
            Some(ProductType::Grd)
        );
        assert_eq!(product_type_from_granule("BOGUS"), None);
    }

    #[test]
    fn test_granule_id_from_path() {
        let id = granule_id_from_path(Path::new(
            "/data/S1A_IW_SLC__1SDV_20200103T170815_20200103T170842_030639_0382D5_DADE.zip",
        ));
        assert!(id.starts_with("S1A_IW_SLC__1SDV"));
        assert!(!id.ends_with(".zip"));
    }
}
