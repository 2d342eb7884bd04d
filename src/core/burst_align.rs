use crate::types::{InsarError, InsarResult, Scene, SwathTiming};
use std::fs;
use std::path::{Path, PathBuf};

/// Two bursts are the same ground burst when their azimuth anchor times
/// agree within this tolerance (seconds)
pub const BURST_TIME_TOLERANCE: f64 = 0.20;

/// Common burst index range between two acquisitions of one sub-swath.
/// Indices are 1-based, matching the burst numbering of the annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurstOverlapWindow {
    pub start_reference: usize,
    pub start_secondary: usize,
    pub length: usize,
}

impl BurstOverlapWindow {
    /// Last overlapping burst index in the reference acquisition
    pub fn end_reference(&self) -> usize {
        self.start_reference + self.length - 1
    }

    /// Last overlapping burst index in the secondary acquisition
    pub fn end_secondary(&self) -> usize {
        self.start_secondary + self.length - 1
    }
}

/// Outcome of the overlap search. Acquisitions that share no burst within
/// tolerance are a distinguishable outcome, not a zero-offset guess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BurstOverlap {
    Matched(BurstOverlapWindow),
    NoOverlapFound,
}

/// Find the overlapping burst range between two timing sequences.
///
/// The first reference burst time is scanned against every secondary
/// burst time; if nothing matches within tolerance the scan is repeated
/// the other way around (secondary leads reference). The overlap length
/// is whatever both acquisitions can still supply from their respective
/// start bursts.
pub fn align_bursts(reference: &SwathTiming, secondary: &SwathTiming) -> BurstOverlap {
    let (Some(&first_ref), Some(&first_sec)) =
        (reference.burst_times.first(), secondary.burst_times.first())
    else {
        return BurstOverlap::NoOverlapFound;
    };

    let (start_reference, start_secondary) = if let Some(j) = secondary
        .burst_times
        .iter()
        .position(|&y| (first_ref - y).abs() < BURST_TIME_TOLERANCE)
    {
        (1, j + 1)
    } else if let Some(i) = reference
        .burst_times
        .iter()
        .position(|&x| (first_sec - x).abs() < BURST_TIME_TOLERANCE)
    {
        (i + 1, 1)
    } else {
        return BurstOverlap::NoOverlapFound;
    };

    let remaining_reference = reference.burst_count - start_reference + 1;
    let remaining_secondary = secondary.burst_count - start_secondary + 1;
    let length = remaining_reference.min(remaining_secondary);

    BurstOverlap::Matched(BurstOverlapWindow {
        start_reference,
        start_secondary,
        length,
    })
}

/// Determines the overlapping burst ranges of a scene pair, per sub-swath
pub struct BurstAligner;

impl BurstAligner {
    /// Align every sub-swath of the pair. A sub-swath with no overlap
    /// fails the pair: proceeding would mosaic misaligned bursts.
    pub fn align_pair(
        reference: &Scene,
        secondary: &Scene,
    ) -> InsarResult<Vec<(String, BurstOverlapWindow)>> {
        let mut overlaps = Vec::with_capacity(reference.swaths.len());

        for ref_swath in &reference.swaths {
            let sec_swath = secondary.swath(&ref_swath.id).ok_or_else(|| {
                InsarError::NoBurstOverlap {
                    swath: ref_swath.id.clone(),
                }
            })?;

            match align_bursts(ref_swath, sec_swath) {
                BurstOverlap::Matched(window) => {
                    log::info!(
                        "{}: bursts {}..{} (reference) / {}..{} (secondary)",
                        ref_swath.id,
                        window.start_reference,
                        window.end_reference(),
                        window.start_secondary,
                        window.end_secondary()
                    );
                    overlaps.push((ref_swath.id.clone(), window));
                }
                BurstOverlap::NoOverlapFound => {
                    return Err(InsarError::NoBurstOverlap {
                        swath: ref_swath.id.clone(),
                    });
                }
            }
        }

        Ok(overlaps)
    }

    /// Write the burst-selection tables consumed by the mosaicking
    /// collaborator: one line per sub-swath, `<swath> <start> <end>`
    pub fn write_burst_tables(
        overlaps: &[(String, BurstOverlapWindow)],
        dir: &Path,
    ) -> InsarResult<(PathBuf, PathBuf)> {
        let reference_table = dir.join("burst_tab_reference");
        let secondary_table = dir.join("burst_tab_secondary");

        let mut reference_lines = String::new();
        let mut secondary_lines = String::new();
        for (swath, window) in overlaps {
            reference_lines.push_str(&format!(
                "{} {} {}\n",
                swath,
                window.start_reference,
                window.end_reference()
            ));
            secondary_lines.push_str(&format!(
                "{} {} {}\n",
                swath,
                window.start_secondary,
                window.end_secondary()
            ));
        }

        fs::write(&reference_table, reference_lines)?;
        fs::write(&secondary_table, secondary_lines)?;

        Ok((reference_table, secondary_table))
    }
}
