use crate::types::{CoregistrationReport, InsarError, InsarResult, OffsetPolynomial};
use regex::Regex;

/// Fixed textual patterns the engine prints for an offset fit. The
/// engine's stdout is the only channel for these numbers.
const RANGE_POLY_PATTERN: &str = r"(?m)^range offset polynomial:\s*(.+)$";
const AZIMUTH_POLY_PATTERN: &str = r"(?m)^azimuth offset polynomial:\s*(.+)$";
const STDDEV_PATTERN: &str =
    r"final model fit std\. dev\. \(samples\) range:\s*([-+0-9.eE]+)\s+azimuth:\s*([-+0-9.eE]+)";

/// Parse one offset-fit report from engine output
pub fn parse_coregistration_report(output: &str) -> InsarResult<CoregistrationReport> {
    let range = parse_polynomial_line(output, RANGE_POLY_PATTERN, "range")?;
    let azimuth = parse_polynomial_line(output, AZIMUTH_POLY_PATTERN, "azimuth")?;

    let stddev_re = Regex::new(STDDEV_PATTERN)
        .map_err(|e| InsarError::Processing(format!("Bad stddev pattern: {}", e)))?;
    let caps = stddev_re.captures(output).ok_or_else(|| {
        InsarError::InvalidFormat("engine output carries no model fit std. dev. line".to_string())
    })?;

    let stddev_range: f64 = caps[1]
        .parse()
        .map_err(|e| InsarError::InvalidFormat(format!("Bad range stddev: {}", e)))?;
    let stddev_azimuth: f64 = caps[2]
        .parse()
        .map_err(|e| InsarError::InvalidFormat(format!("Bad azimuth stddev: {}", e)))?;

    Ok(CoregistrationReport {
        offsets: OffsetPolynomial { range, azimuth },
        stddev_range,
        stddev_azimuth,
    })
}

/// Parse up to 6 polynomial coefficients from one report line; trailing
/// coefficients the engine omits are zero
fn parse_polynomial_line(output: &str, pattern: &str, axis: &str) -> InsarResult<[f64; 6]> {
    let re = Regex::new(pattern)
        .map_err(|e| InsarError::Processing(format!("Bad polynomial pattern: {}", e)))?;
    let caps = re.captures(output).ok_or_else(|| {
        InsarError::InvalidFormat(format!(
            "engine output carries no {} offset polynomial line",
            axis
        ))
    })?;

    let mut coefficients = [0.0f64; 6];
    let values: Vec<&str> = caps[1].split_whitespace().collect();
    if values.is_empty() || values.len() > 6 {
        return Err(InsarError::InvalidFormat(format!(
            "{} offset polynomial has {} coefficients, expected 1..=6",
            axis,
            values.len()
        )));
    }
    for (i, value) in values.iter().enumerate() {
        coefficients[i] = value.parse().map_err(|e| {
            InsarError::InvalidFormat(format!("Bad {} coefficient '{}': {}", axis, value, e))
        })?;
    }
    Ok(coefficients)
}
