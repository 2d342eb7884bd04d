use crate::types::{GeoTransform, InsarError, InsarResult, OffsetPolynomial, SarRealImage};
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::DriverManager;
use ndarray::{Array2, Axis};
use rayon::prelude::*;
use std::path::Path;

/// Per-map-pixel mapping into radar (sample, line) coordinates.
///
/// Built once per reference scene from orbit and DEM geometry, then
/// refined in place as offset estimates accumulate. Cells with no radar
/// solution hold NaN in both planes.
#[derive(Debug, Clone)]
pub struct LookupTable {
    pub range: Array2<f64>,
    pub azimuth: Array2<f64>,
    pub transform: GeoTransform,
    pub epsg: u32,
    /// Radar raster dimensions this table maps into
    pub radar_samples: usize,
    pub radar_lines: usize,
}

impl LookupTable {
    /// Map-grid dimensions (lines, samples)
    pub fn dim(&self) -> (usize, usize) {
        self.range.dim()
    }

    /// Fold an offset estimate into the table. Each valid cell moves by
    /// the polynomial evaluated at its current radar position.
    pub fn apply_offsets(&mut self, offsets: &OffsetPolynomial) {
        ndarray::Zip::from(&mut self.range)
            .and(&mut self.azimuth)
            .for_each(|s, l| {
                if s.is_finite() && l.is_finite() {
                    let (dr, da) = offsets.evaluate(*s, *l);
                    *s += dr;
                    *l += da;
                }
            });
    }

    /// Every radar raster geocoded through this table must share the
    /// dimensions the table was built for
    fn check_radar_dims(&self, raster: &SarRealImage) -> InsarResult<()> {
        let (lines, samples) = raster.dim();
        if lines != self.radar_lines || samples != self.radar_samples {
            return Err(InsarError::Processing(format!(
                "radar raster is {}x{}, lookup table maps {}x{}",
                samples, lines, self.radar_samples, self.radar_lines
            )));
        }
        Ok(())
    }

    /// Write the table as a two-band float64 GeoTIFF (range, azimuth)
    /// for the radar engine
    pub fn write<P: AsRef<Path>>(&self, path: P) -> InsarResult<()> {
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let (height, width) = self.dim();

        let mut dataset = driver.create_with_band_type::<f64, _>(
            path.as_ref(),
            width as isize,
            height as isize,
            2,
        )?;
        dataset.set_geo_transform(&self.transform.to_gdal())?;
        dataset.set_spatial_ref(&SpatialRef::from_epsg(self.epsg)?)?;

        for (band_index, plane) in [(1, &self.range), (2, &self.azimuth)] {
            let mut band = dataset.rasterband(band_index)?;
            let flat: Vec<f64> = plane.iter().cloned().collect();
            let buffer = Buffer::new((width, height), flat);
            band.write((0, 0), (width, height), &buffer)?;
            band.set_no_data_value(Some(f64::NAN))?;
        }

        Ok(())
    }
}

/// Bidirectional transform between radar and map geometry through one
/// lookup table
pub struct Geocoder<'a> {
    lut: &'a LookupTable,
}

impl<'a> Geocoder<'a> {
    pub fn new(lut: &'a LookupTable) -> Self {
        Self { lut }
    }

    /// Backward geocoding: sample a radar-geometry raster at each map
    /// cell's lookup coordinates. Cells without a radar solution or
    /// outside the radar raster become NaN.
    pub fn geocode_back(&self, radar: &SarRealImage) -> InsarResult<SarRealImage> {
        self.lut.check_radar_dims(radar)?;
        let (map_lines, map_samples) = self.lut.dim();
        let mut output = Array2::from_elem((map_lines, map_samples), f32::NAN);

        output
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(i, mut row)| {
                for j in 0..map_samples {
                    let s = self.lut.range[[i, j]];
                    let l = self.lut.azimuth[[i, j]];
                    if !s.is_finite() || !l.is_finite() {
                        continue;
                    }
                    row[j] = bilinear_interpolate(radar, s, l);
                }
            });

        Ok(output)
    }

    /// Forward geocoding: carry a map-geometry raster into radar
    /// geometry. Each map cell contributes its value to the nearest
    /// radar pixel; pixels reached more than once take the mean, pixels
    /// never reached stay NaN.
    pub fn geocode(&self, map: &SarRealImage) -> InsarResult<SarRealImage> {
        let (map_lines, map_samples) = self.lut.dim();
        let (in_lines, in_samples) = map.dim();
        if in_lines != map_lines || in_samples != map_samples {
            return Err(InsarError::Processing(format!(
                "map raster is {}x{}, lookup table grid is {}x{}",
                in_samples, in_lines, map_samples, map_lines
            )));
        }

        let dims = (self.lut.radar_lines, self.lut.radar_samples);
        let mut sum = Array2::<f64>::zeros(dims);
        let mut count = Array2::<u32>::zeros(dims);

        for i in 0..map_lines {
            for j in 0..map_samples {
                let value = map[[i, j]];
                if !value.is_finite() {
                    continue;
                }
                let s = self.lut.range[[i, j]];
                let l = self.lut.azimuth[[i, j]];
                if !s.is_finite() || !l.is_finite() {
                    continue;
                }
                let sample = s.round();
                let line = l.round();
                if sample < 0.0
                    || line < 0.0
                    || sample >= self.lut.radar_samples as f64
                    || line >= self.lut.radar_lines as f64
                {
                    continue;
                }
                sum[[line as usize, sample as usize]] += value as f64;
                count[[line as usize, sample as usize]] += 1;
            }
        }

        let mut output = Array2::from_elem(dims, f32::NAN);
        ndarray::Zip::from(&mut output)
            .and(&sum)
            .and(&count)
            .for_each(|out, &s, &n| {
                if n > 0 {
                    *out = (s / n as f64) as f32;
                }
            });

        Ok(output)
    }
}

/// Bilinear interpolation at fractional (sample, line); NaN when the
/// 2x2 neighborhood leaves the raster or touches a NaN value
pub fn bilinear_interpolate(image: &SarRealImage, x: f64, y: f64) -> f32 {
    let (lines, samples) = image.dim();
    if x < 0.0 || y < 0.0 {
        return f32::NAN;
    }

    let x1 = x.floor() as usize;
    let y1 = y.floor() as usize;
    if x1 >= samples || y1 >= lines {
        return f32::NAN;
    }
    let x2 = (x1 + 1).min(samples - 1);
    let y2 = (y1 + 1).min(lines - 1);

    let dx = x - x1 as f64;
    let dy = y - y1 as f64;

    let v11 = image[[y1, x1]] as f64;
    let v12 = image[[y2, x1]] as f64;
    let v21 = image[[y1, x2]] as f64;
    let v22 = image[[y2, x2]] as f64;

    let interpolated = v11 * (1.0 - dx) * (1.0 - dy)
        + v21 * dx * (1.0 - dy)
        + v12 * (1.0 - dx) * dy
        + v22 * dx * dy;

    interpolated as f32
}
