use insardine::core::unwrap::{reference_pixel, select_reference_pixel, UnwrapConfig};
use ndarray::Array2;

const THRESHOLD: f32 = 0.3;

/// Deterministic pseudo-random coherence field
fn synthetic_coherence(lines: usize, samples: usize, seed: u32) -> Array2<f32> {
    let mut state = seed;
    Array2::from_shape_fn((lines, samples), |_| {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (state >> 8) as f32 / (1u32 << 24) as f32
    })
}

#[test]
fn test_single_pixel_window_respects_threshold() {
    for seed in 0..20 {
        let mask = synthetic_coherence(12, 17, seed);
        match reference_pixel(&mask, (1, 1), THRESHOLD) {
            Some((i, j)) => assert!(mask[[i, j]] > THRESHOLD),
            None => assert!(mask.iter().all(|&c| c <= THRESHOLD)),
        }
    }
}

#[test]
fn test_window_entirely_above_threshold() {
    for seed in 0..20 {
        let mask = synthetic_coherence(15, 15, seed);
        if let Some((i, j)) = reference_pixel(&mask, (5, 5), THRESHOLD) {
            for wi in i - 2..=i + 2 {
                for wj in j - 2..=j + 2 {
                    assert!(
                        mask[[wi, wj]] > THRESHOLD,
                        "window pixel ({}, {}) below threshold",
                        wi,
                        wj
                    );
                }
            }
        }
    }
}

#[test]
fn test_shrinking_window_never_moves_candidate_later() {
    for seed in 0..20 {
        let mask = synthetic_coherence(15, 15, seed);
        let wide = reference_pixel(&mask, (5, 5), THRESHOLD);
        let narrow = reference_pixel(&mask, (3, 3), THRESHOLD);
        let single = reference_pixel(&mask, (1, 1), THRESHOLD);

        // Smaller windows admit more candidates, so in row-major order
        // the winner can only stay or move earlier
        if let (Some(w), Some(n)) = (wide, narrow) {
            assert!(n <= w, "3x3 candidate {:?} after 5x5 candidate {:?}", n, w);
        }
        if let (Some(n), Some(s)) = (narrow, single) {
            assert!(s <= n, "1x1 candidate {:?} after 3x3 candidate {:?}", s, n);
        }
        // A qualifying wide window implies a qualifying narrow one
        if wide.is_some() {
            assert!(narrow.is_some() && single.is_some());
        }
    }
}

#[test]
fn test_hopeless_mask_anchors_at_origin() {
    let mask = Array2::from_elem((10, 10), 0.01f32);
    let config = UnwrapConfig::default();
    assert_eq!(select_reference_pixel(&mask, &config), (0, 0));
}
