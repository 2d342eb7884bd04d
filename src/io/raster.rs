use crate::types::{GeoTransform, InsarError, InsarResult, MaskImage, SarRealImage};
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use std::path::Path;

/// A raster with its georeferencing, as read from or written to disk
#[derive(Debug, Clone)]
pub struct GeoRaster {
    pub data: SarRealImage,
    pub transform: GeoTransform,
    pub epsg: u32,
    pub nodata: Option<f64>,
}

impl GeoRaster {
    /// (lines, samples) of the raster
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }
}

/// Read band 1 of a geocoded raster into memory
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> InsarResult<GeoRaster> {
    let dataset = Dataset::open(path.as_ref())?;
    let geo_transform = dataset.geo_transform()?;
    let (width, height) = dataset.raster_size();

    let rasterband = dataset.rasterband(1)?;
    let nodata = rasterband.no_data_value();
    let band_data = rasterband.read_as::<f32>((0, 0), (width, height), (width, height), None)?;

    let data = Array2::from_shape_vec((height, width), band_data.data).map_err(|e| {
        InsarError::Processing(format!(
            "Failed to reshape raster {}: {}",
            path.as_ref().display(),
            e
        ))
    })?;

    let epsg = dataset
        .spatial_ref()
        .ok()
        .and_then(|sr| sr.auth_code().ok())
        .unwrap_or(4326) as u32;

    Ok(GeoRaster {
        data,
        transform: GeoTransform::from_gdal(&geo_transform),
        epsg,
        nodata,
    })
}

/// Write a float raster as GeoTIFF
pub fn write_geotiff<P: AsRef<Path>>(
    path: P,
    data: &SarRealImage,
    transform: &GeoTransform,
    epsg: u32,
    nodata: Option<f64>,
) -> InsarResult<()> {
    log::debug!("Writing GeoTIFF: {}", path.as_ref().display());

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let (height, width) = data.dim();

    let mut dataset = driver.create_with_band_type::<f32, _>(
        path.as_ref(),
        width as isize,
        height as isize,
        1,
    )?;

    dataset.set_geo_transform(&transform.to_gdal())?;
    dataset.set_spatial_ref(&SpatialRef::from_epsg(epsg)?)?;

    let mut rasterband = dataset.rasterband(1)?;
    let flat_data: Vec<f32> = data.iter().cloned().collect();
    let buffer = Buffer::new((width, height), flat_data);
    rasterband.write((0, 0), (width, height), &buffer)?;

    if let Some(nd) = nodata {
        rasterband.set_no_data_value(Some(nd))?;
    }

    Ok(())
}

/// Write a binary mask as byte GeoTIFF (1 = valid/land, 0 = invalid/water)
pub fn write_mask_geotiff<P: AsRef<Path>>(
    path: P,
    mask: &MaskImage,
    transform: &GeoTransform,
    epsg: u32,
) -> InsarResult<()> {
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let (height, width) = mask.dim();

    let mut dataset = driver.create_with_band_type::<u8, _>(
        path.as_ref(),
        width as isize,
        height as isize,
        1,
    )?;

    dataset.set_geo_transform(&transform.to_gdal())?;
    dataset.set_spatial_ref(&SpatialRef::from_epsg(epsg)?)?;

    let mut rasterband = dataset.rasterband(1)?;
    let flat_data: Vec<u8> = mask.iter().cloned().collect();
    let buffer = Buffer::new((width, height), flat_data);
    rasterband.write((0, 0), (width, height), &buffer)?;
    rasterband.set_no_data_value(Some(255.0))?;

    Ok(())
}
