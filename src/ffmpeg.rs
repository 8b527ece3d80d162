use crate::error::{KatError, Result};
use crate::process::{self, ProcessResult};
use crate::progress::{ProgressParser, ProgressReporter, Record, RecordKind};
use clap::ValueEnum;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use tracing::debug;
use which::which;

#[derive(Debug, Clone)]
pub struct Tools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

pub fn resolve_tools(ffmpeg: Option<PathBuf>, ffprobe: Option<PathBuf>) -> Result<Tools> {
    Ok(Tools {
        ffmpeg: resolve_bin(ffmpeg, "ffmpeg")?,
        ffprobe: resolve_bin(ffprobe, "ffprobe")?,
    })
}

fn resolve_bin(bin_opt: Option<PathBuf>, default: &str) -> Result<PathBuf> {
    if let Some(path) = bin_opt {
        if path.is_file() {
            return Ok(path);
        }
        return Err(KatError::not_found(path));
    }

    which(default)
        .or_else(|_| {
            if cfg!(windows) {
                which(format!("{default}.exe"))
            } else {
                Err(which::Error::CannotFindBinaryPath)
            }
        })
        .map_err(|_| KatError::not_found(default))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VideoFormat {
    H264,
    H265,
}

impl VideoFormat {
    /// NVENC encoder name handed to `-c:v`.
    pub fn codec(self) -> &'static str {
        match self {
            VideoFormat::H265 => "hevc_nvenc",
            VideoFormat::H264 => "h264_nvenc",
        }
    }
}

/// Fixed CUDA profile: 3M target, 4M cap, 8M buffer, audio copied.
pub fn encode_args(src: &Path, dest: &Path, format: VideoFormat) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(22);
    args.extend(["-hwaccel", "cuda", "-nostdin", "-i"].map(OsString::from));
    args.push(src.as_os_str().to_owned());
    args.extend(
        [
            "-c:v",
            format.codec(),
            "-b:v",
            "3M",
            "-maxrate:v",
            "4M",
            "-bufsize:v",
            "8M",
            "-preset",
            "slow",
            "-c:a",
            "copy",
        ]
        .map(OsString::from),
    );
    args.push(dest.as_os_str().to_owned());
    args
}

/// Runs the encoder, feeding its stderr through the parser into `reporter`.
///
/// Non-progress records go to the debug log. The reporter is always
/// finished before returning, whatever the exit code.
pub fn run_encoder(
    encoder: &Path,
    args: &[OsString],
    reporter: &mut ProgressReporter,
    cancel: Option<&AtomicBool>,
) -> Result<ProcessResult> {
    let name = encoder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| encoder.display().to_string());
    let mut parser = ProgressParser::new();

    let res = process::run_streaming(encoder, args, cancel, |chunk| {
        for record in parser.feed(chunk) {
            handle_record(&name, &record, reporter);
        }
    });
    if let Some(record) = parser.finish() {
        handle_record(&name, &record, reporter);
    }
    if !reporter.is_active() {
        debug!("{name} reported no progress");
    }
    reporter.finish();
    res
}

fn handle_record(name: &str, record: &Record, reporter: &mut ProgressReporter) {
    if let Some(event) = record.event() {
        reporter.update(&event);
        return;
    }
    let text = record.text.trim_end();
    if text.is_empty() {
        return;
    }
    match record.kind {
        RecordKind::Log => reporter.suspend(|| debug!("{name}: {text}")),
        RecordKind::Progress => reporter.suspend(|| debug!("{name}: {text} (status)")),
    }
}
