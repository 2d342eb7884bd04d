//! I/O modules for reading scenes, orbits, DEMs and geocoded rasters

pub mod annotation;
pub mod dem;
pub mod orbit;
pub mod raster;
pub mod scene;

pub use dem::{DemProjector, DemSource, FileDemSource, FramedDem};
pub use orbit::{DirectoryOrbitSource, OrbitReader, OrbitSource};
pub use raster::{read_geotiff, write_geotiff, write_mask_geotiff, GeoRaster};
pub use scene::SceneReader;
