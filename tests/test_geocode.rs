use insardine::core::{Geocoder, LookupTable};
use insardine::types::GeoTransform;
use ndarray::Array2;

/// Lookup table with a constant sub-pixel-free shift between the map
/// grid and radar coordinates
fn shifted_lut(lines: usize, samples: usize, shift: (f64, f64)) -> LookupTable {
    let mut range = Array2::from_elem((lines, samples), f64::NAN);
    let mut azimuth = Array2::from_elem((lines, samples), f64::NAN);
    for i in 0..lines {
        for j in 0..samples {
            let s = j as f64 + shift.0;
            let l = i as f64 + shift.1;
            if s >= 0.0 && l >= 0.0 && s < samples as f64 && l < lines as f64 {
                range[[i, j]] = s;
                azimuth[[i, j]] = l;
            }
        }
    }
    LookupTable {
        range,
        azimuth,
        transform: GeoTransform {
            top_left_x: 10.0,
            pixel_width: 0.00027,
            rotation_x: 0.0,
            top_left_y: 47.0,
            rotation_y: 0.0,
            pixel_height: -0.00027,
        },
        epsg: 4326,
        radar_samples: samples,
        radar_lines: lines,
    }
}

fn ramp(lines: usize, samples: usize) -> Array2<f32> {
    Array2::from_shape_fn((lines, samples), |(i, j)| (i * samples + j) as f32)
}

#[test]
fn test_round_trip_identity_on_valid_pixels() {
    let lut = shifted_lut(16, 20, (0.0, 0.0));
    let radar = ramp(16, 20);
    let geocoder = Geocoder::new(&lut);

    let map = geocoder.geocode_back(&radar).unwrap();
    let back = geocoder.geocode(&map).unwrap();

    for ((i, j), &value) in back.indexed_iter() {
        if value.is_finite() {
            assert!(
                (value - radar[[i, j]]).abs() < 1e-3,
                "round trip diverged at ({}, {}): {} vs {}",
                i,
                j,
                value,
                radar[[i, j]]
            );
        }
    }
}

#[test]
fn test_round_trip_with_integer_shift() {
    // A whole-pixel shift resamples without interpolation error, so the
    // round trip must reproduce every pixel that stays in bounds
    let lut = shifted_lut(16, 20, (3.0, 2.0));
    let radar = ramp(16, 20);
    let geocoder = Geocoder::new(&lut);

    let map = geocoder.geocode_back(&radar).unwrap();
    let back = geocoder.geocode(&map).unwrap();

    let mut checked = 0;
    for ((i, j), &value) in back.indexed_iter() {
        if value.is_finite() {
            assert!((value - radar[[i, j]]).abs() < 1e-3);
            checked += 1;
        }
    }
    assert!(checked > 100, "too few valid round-trip pixels: {}", checked);
}

#[test]
fn test_round_trip_fractional_shift_within_tolerance() {
    // Sub-pixel shifts interpolate; the round trip holds within the
    // resampling tolerance of a smooth field
    let lut = shifted_lut(16, 20, (0.5, 0.5));
    let radar = Array2::from_shape_fn((16, 20), |(i, j)| (i as f32 * 0.05 + j as f32 * 0.08).sin());
    let geocoder = Geocoder::new(&lut);

    let map = geocoder.geocode_back(&radar).unwrap();
    let back = geocoder.geocode(&map).unwrap();

    for ((i, j), &value) in back.indexed_iter() {
        if value.is_finite() {
            assert!(
                (value - radar[[i, j]]).abs() < 0.1,
                "interpolation error too large at ({}, {})",
                i,
                j
            );
        }
    }
}

#[test]
fn test_same_lut_consistent_dimensions() {
    // Every raster geocoded through one table shares the radar
    // dimensions the table was built for
    let lut = shifted_lut(16, 20, (0.0, 0.0));
    let geocoder = Geocoder::new(&lut);

    assert!(geocoder.geocode_back(&ramp(16, 20)).is_ok());
    assert!(geocoder.geocode_back(&ramp(16, 21)).is_err());
    assert!(geocoder.geocode_back(&ramp(15, 20)).is_err());
}
