use crate::error::{KatError, Result};
use crate::process;
use serde::Deserialize;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

const KIB: f64 = 1024.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub format_name: String,
    pub size: u64,
    /// bits per second
    pub bitrate: u64,
    /// whole seconds
    pub duration: u64,
}

impl MediaInfo {
    pub fn size_kb(&self) -> f64 {
        round2(self.size as f64 / KIB)
    }

    pub fn size_mb(&self) -> f64 {
        round2(self.size as f64 / KIB.powi(2))
    }

    pub fn size_gb(&self) -> f64 {
        round2(self.size as f64 / KIB.powi(3))
    }

    pub fn duration_str(&self) -> String {
        format_duration(self.duration)
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

impl fmt::Display for MediaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let size = if self.size as f64 > KIB.powi(3) {
            format!("{} gb", self.size_gb())
        } else if self.size as f64 > KIB.powi(2) {
            format!("{} mb", self.size_mb())
        } else {
            format!("{} kb", self.size_kb())
        };
        writeln!(f, "MediaInfo:")?;
        writeln!(f, "    Path: {}", self.path.display())?;
        writeln!(f, "    Format: {}", self.format_name)?;
        writeln!(f, "    Size: {size}")?;
        writeln!(f, "    Bitrate: {} kb/s", self.bitrate / 1000)?;
        write!(f, "    Duration: {}", self.duration_str())
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// `HH:MM:SS`; hours keep growing past 99.
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    filename: String,
    format_name: String,
    duration: NumberOrString,
    bit_rate: NumberOrString,
    size: NumberOrString,
}

/// ffprobe prints numbers as strings; tolerate either.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(serde_json::Number),
    String(String),
}

impl NumberOrString {
    fn as_f64(&self) -> Option<f64> {
        let v = match self {
            NumberOrString::Number(n) => n.as_f64(),
            NumberOrString::String(s) => s.trim().parse().ok(),
        };
        v.filter(|v: &f64| v.is_finite() && *v >= 0.0)
    }

    fn as_u64(&self) -> Option<u64> {
        match self {
            NumberOrString::Number(n) => n.as_u64(),
            NumberOrString::String(s) => s.trim().parse().ok(),
        }
    }
}

pub fn probe_args(path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-v", "quiet", "-print_format", "json", "-show_format"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(path.as_os_str().to_owned());
    args
}

/// Runs `prober` on `path` and reads the format section of its JSON.
pub fn probe(prober: &Path, path: &Path) -> Result<MediaInfo> {
    let res = process::run(prober, &probe_args(path))?;
    if !res.success() {
        return Err(KatError::probe(
            path,
            format!("{} exited with {}", prober.display(), res.exit_code),
        ));
    }
    parse_probe_output(path, &res.stdout)
}

pub fn parse_probe_output(path: &Path, stdout: &[u8]) -> Result<MediaInfo> {
    let out: FfprobeOutput = serde_json::from_slice(stdout)
        .map_err(|e| KatError::probe(path, format!("malformed output: {e}")))?;
    let format = out.format;

    let duration = format
        .duration
        .as_f64()
        .ok_or_else(|| KatError::probe(path, "duration is not a number"))?;
    let bitrate = format
        .bit_rate
        .as_u64()
        .ok_or_else(|| KatError::probe(path, "bit_rate is not an integer"))?;
    let size = format
        .size
        .as_u64()
        .ok_or_else(|| KatError::probe(path, "size is not an integer"))?;

    Ok(MediaInfo {
        path: PathBuf::from(format.filename),
        format_name: format.format_name,
        size,
        bitrate,
        duration: duration.round() as u64,
    })
}
