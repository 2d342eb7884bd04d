use crate::io::raster::{read_geotiff, GeoRaster};
use crate::types::{BoundingBox, InsarError, InsarResult};
use std::path::{Path, PathBuf};

/// Provider of a DEM mosaic covering a footprint.
///
/// Tile download and mosaic assembly happen outside this crate; an
/// implementation answers with the path of a ready GeoTIFF.
pub trait DemSource {
    fn prepare_dem(&self, footprint: &BoundingBox, pixel_size: f64) -> InsarResult<PathBuf>;
}

/// DEM source backed by a single pre-assembled mosaic file
pub struct FileDemSource {
    path: PathBuf,
}

impl FileDemSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl DemSource for FileDemSource {
    fn prepare_dem(&self, _footprint: &BoundingBox, _pixel_size: f64) -> InsarResult<PathBuf> {
        Ok(self.path.clone())
    }
}

/// A DEM framed for one scene footprint, ready for lookup-table building
#[derive(Debug, Clone)]
pub struct FramedDem {
    pub path: PathBuf,
    pub raster: GeoRaster,
}

/// Geometric framing of the DEM for a scene pair: coordinate-system
/// selection and footprint buffering. The mosaic itself comes from the
/// collaborator.
pub struct DemProjector {
    pixel_size: f64,
    footprint_buffer_deg: f64,
}

impl DemProjector {
    /// Create a projector with the output DEM pixel size in meters
    pub fn new(pixel_size: f64) -> Self {
        Self {
            pixel_size,
            footprint_buffer_deg: 0.1,
        }
    }

    /// Coordinate system of the framed DEM grid. The lookup table and
    /// every geocoded product share this grid, so the whole chain stays
    /// in geographic coordinates.
    pub fn grid_epsg(&self) -> u32 {
        4326
    }

    /// Footprint grown by the framing buffer on all sides
    pub fn buffered_footprint(&self, footprint: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_lon: footprint.min_lon - self.footprint_buffer_deg,
            max_lon: footprint.max_lon + self.footprint_buffer_deg,
            min_lat: footprint.min_lat - self.footprint_buffer_deg,
            max_lat: footprint.max_lat + self.footprint_buffer_deg,
        }
    }

    /// Obtain the DEM for a footprint from the collaborator and load it.
    /// A missing mosaic file is a hard error: lookup-table construction
    /// cannot start without geometry.
    pub fn frame_dem(
        &self,
        footprint: &BoundingBox,
        source: &dyn DemSource,
    ) -> InsarResult<FramedDem> {
        let buffered = self.buffered_footprint(footprint);
        log::info!(
            "Preparing DEM for footprint lon [{:.3}, {:.3}] lat [{:.3}, {:.3}] at {:.0} m",
            buffered.min_lon,
            buffered.max_lon,
            buffered.min_lat,
            buffered.max_lat,
            self.pixel_size
        );

        let path = source.prepare_dem(&buffered, self.pixel_size)?;
        if !path.exists() {
            return Err(InsarError::DemMissing(path));
        }

        let raster = read_geotiff(&path)?;
        if raster.epsg != self.grid_epsg() {
            return Err(InsarError::Processing(format!(
                "DEM mosaic is EPSG:{}, expected EPSG:{}",
                raster.epsg,
                self.grid_epsg()
            )));
        }
        let (lines, samples) = raster.dim();
        log::info!("DEM framed: {}x{} pixels, EPSG:{}", samples, lines, raster.epsg);

        Ok(FramedDem { path, raster })
    }
}
