//! Interface to the external radar processing engine.
//!
//! The engine is an opaque numeric executable invoked per operation. Every
//! call is synchronous and blocking, runs under a deadline, and is not
//! retried; a nonzero exit or an expired deadline is fatal at the call
//! site. Offset estimates come back through the engine's stdout and are
//! parsed against fixed textual patterns.

pub mod report;

use crate::types::{CoregistrationReport, InsarResult, InsarError, Polarization};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

pub use report::parse_coregistration_report;

/// Operations consumed from the radar engine
pub trait RadarEngine {
    /// Mosaic the selected bursts of an acquisition into a multi-looked
    /// intensity image in radar geometry
    fn ingest(
        &self,
        archive: &Path,
        burst_table: &Path,
        pol: Polarization,
        looks: (u32, u32),
        out_image: &Path,
    ) -> InsarResult<()>;

    /// Simulate the unwrapped topographic phase from DEM and orbit
    /// geometry through a lookup table
    fn simulate_phase(&self, dem: &Path, lut: &Path, out_phase: &Path) -> InsarResult<()>;

    /// Resample the secondary image into reference geometry through the
    /// current lookup table
    fn coregister(&self, secondary: &Path, lut: &Path, out_image: &Path) -> InsarResult<()>;

    /// Cross-correlate reference and resampled secondary over a matching
    /// window and fit an incremental offset polynomial
    fn estimate_offset(
        &self,
        reference: &Path,
        secondary: &Path,
        window: (usize, usize),
    ) -> InsarResult<CoregistrationReport>;

    /// Difference coregistered imagery against the simulated phase,
    /// producing the raw differential interferogram and coherence
    fn form_interferogram(
        &self,
        reference: &Path,
        secondary: &Path,
        simulated_phase: &Path,
        out_interferogram: &Path,
        out_coherence: &Path,
    ) -> InsarResult<()>;

    /// Adaptive phase filter with the given filter strength
    fn adf_filter(&self, interferogram: &Path, alpha: f64, out: &Path) -> InsarResult<()>;

    /// Minimum-cost-flow phase unwrapping anchored at a reference pixel
    fn unwrap(
        &self,
        interferogram: &Path,
        coherence: &Path,
        validity_mask: &Path,
        anchor: (usize, usize),
        out_phase: &Path,
    ) -> InsarResult<()>;
}

/// Engine implementation shelling out to an external executable.
///
/// Each operation is one subprocess run with a hard deadline; on expiry
/// the child is killed and the call reports failure.
pub struct ProcessEngine {
    program: PathBuf,
    timeout: Duration,
}

impl ProcessEngine {
    pub fn new<P: AsRef<Path>>(program: P, timeout: Duration) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            timeout,
        }
    }

    /// Run one engine subcommand to completion, capturing stdout
    fn run(&self, args: &[String]) -> InsarResult<String> {
        let command_line = format!("{} {}", self.program.display(), args.join(" "));
        log::info!("Engine: {}", command_line);

        let mut child = Command::new(&self.program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| InsarError::Engine {
                command: command_line.clone(),
                detail: format!("spawn failed: {}", e),
            })?;

        // Drain pipes on their own threads so a chatty child cannot
        // deadlock against a full pipe buffer while we poll for exit.
        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();
        let stdout_thread = std::thread::spawn(move || read_pipe(stdout_handle));
        let stderr_thread = std::thread::spawn(move || read_pipe(stderr_handle));

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(InsarError::Engine {
                            command: command_line,
                            detail: format!("timed out after {:?}", self.timeout),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    return Err(InsarError::Engine {
                        command: command_line,
                        detail: format!("wait failed: {}", e),
                    });
                }
            }
        };

        let stdout = stdout_thread.join().unwrap_or_default();
        let stderr = stderr_thread.join().unwrap_or_default();

        if !status.success() {
            return Err(InsarError::Engine {
                command: command_line,
                detail: format!(
                    "exit status {}: {}",
                    status.code().map_or("signal".to_string(), |c| c.to_string()),
                    stderr.trim()
                ),
            });
        }

        log::debug!("Engine output: {} bytes", stdout.len());
        Ok(stdout)
    }
}

fn read_pipe<R: Read>(handle: Option<R>) -> String {
    let mut content = String::new();
    if let Some(mut pipe) = handle {
        let _ = pipe.read_to_string(&mut content);
    }
    content
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

impl RadarEngine for ProcessEngine {
    fn ingest(
        &self,
        archive: &Path,
        burst_table: &Path,
        pol: Polarization,
        looks: (u32, u32),
        out_image: &Path,
    ) -> InsarResult<()> {
        self.run(&[
            "ingest".to_string(),
            path_arg(archive),
            path_arg(burst_table),
            pol.to_string(),
            looks.0.to_string(),
            looks.1.to_string(),
            path_arg(out_image),
        ])
        .map(|_| ())
    }

    fn simulate_phase(&self, dem: &Path, lut: &Path, out_phase: &Path) -> InsarResult<()> {
        self.run(&[
            "simulate-phase".to_string(),
            path_arg(dem),
            path_arg(lut),
            path_arg(out_phase),
        ])
        .map(|_| ())
    }

    fn coregister(&self, secondary: &Path, lut: &Path, out_image: &Path) -> InsarResult<()> {
        self.run(&[
            "coregister".to_string(),
            path_arg(secondary),
            path_arg(lut),
            path_arg(out_image),
        ])
        .map(|_| ())
    }

    fn estimate_offset(
        &self,
        reference: &Path,
        secondary: &Path,
        window: (usize, usize),
    ) -> InsarResult<CoregistrationReport> {
        let output = self.run(&[
            "estimate-offset".to_string(),
            path_arg(reference),
            path_arg(secondary),
            window.0.to_string(),
            window.1.to_string(),
        ])?;
        parse_coregistration_report(&output)
    }

    fn form_interferogram(
        &self,
        reference: &Path,
        secondary: &Path,
        simulated_phase: &Path,
        out_interferogram: &Path,
        out_coherence: &Path,
    ) -> InsarResult<()> {
        self.run(&[
            "interferogram".to_string(),
            path_arg(reference),
            path_arg(secondary),
            path_arg(simulated_phase),
            path_arg(out_interferogram),
            path_arg(out_coherence),
        ])
        .map(|_| ())
    }

    fn adf_filter(&self, interferogram: &Path, alpha: f64, out: &Path) -> InsarResult<()> {
        self.run(&[
            "adf".to_string(),
            path_arg(interferogram),
            format!("{:.3}", alpha),
            path_arg(out),
        ])
        .map(|_| ())
    }

    fn unwrap(
        &self,
        interferogram: &Path,
        coherence: &Path,
        validity_mask: &Path,
        anchor: (usize, usize),
        out_phase: &Path,
    ) -> InsarResult<()> {
        self.run(&[
            "unwrap".to_string(),
            path_arg(interferogram),
            path_arg(coherence),
            path_arg(validity_mask),
            anchor.0.to_string(),
            anchor.1.to_string(),
            path_arg(out_phase),
        ])
        .map(|_| ())
    }
}
