use crate::error::{KatError, Result};
use crate::ffmpeg::VideoFormat;
use crate::library::{DEFAULT_MIN_SIZE, RenameOptions};
use crate::workflow::{OverwritePolicy, STAGING_DIR_NAME};
use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "kat",
    version,
    about = "Rename, file and re-encode a media library by its ABC-123 codes"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rename media to the standard code name
    #[command(visible_alias = "rn")]
    Rename(RenameArgs),

    /// Move media into per-code folders
    #[command(visible_alias = "mv")]
    Move(MoveArgs),

    /// Encode raw media with the NVENC encoder
    #[command(visible_alias = "en")]
    Encode(EncodeArgs),
}

impl Command {
    pub fn shared(&self) -> &SharedArgs {
        match self {
            Command::Rename(a) => &a.shared,
            Command::Move(a) => &a.shared,
            Command::Encode(a) => &a.shared,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SharedArgs {
    /// Media path
    #[arg(short = 'i', long, value_hint = ValueHint::AnyPath)]
    pub input: PathBuf,

    /// Path to write
    #[arg(short = 'o', long, value_hint = ValueHint::AnyPath)]
    pub out: PathBuf,

    /// Show debug logs, including raw encoder output
    #[arg(short = 'v', long, action = ArgAction::SetTrue)]
    pub verbose: bool,
}

#[derive(Args, Debug)]
pub struct RenameArgs {
    #[command(flatten)]
    pub shared: SharedArgs,

    /// Prefix for file
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// Suffix for file, placed before the extension (ABC-1<suffix>.mp4).
    /// Older kat releases appended it after the extension instead.
    #[arg(long, default_value = "")]
    pub suffix: String,

    /// Skip files smaller than this many bytes
    #[arg(long, default_value_t = DEFAULT_MIN_SIZE)]
    pub min_size: u64,
}

impl RenameArgs {
    pub fn options(&self) -> RenameOptions {
        RenameOptions {
            prefix: self.prefix.clone(),
            suffix: self.suffix.clone(),
            min_size: self.min_size,
        }
    }
}

#[derive(Args, Debug)]
pub struct MoveArgs {
    #[command(flatten)]
    pub shared: SharedArgs,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    #[command(flatten)]
    pub shared: SharedArgs,

    /// Recursive scan the input path
    #[arg(short = 'r', long, action = ArgAction::SetTrue)]
    pub recursive: bool,

    /// Maximum number of encoding
    #[arg(long, default_value_t = 4)]
    pub max: usize,

    /// Target video codec
    #[arg(long, value_enum, default_value_t = VideoFormat::H265)]
    pub codec: VideoFormat,

    /// What to do with an existing destination (default: prompt with -r, reject without)
    #[arg(long, value_enum)]
    pub on_exists: Option<OverwritePolicy>,

    /// Keep the source file after a successful encode
    #[arg(long, action = ArgAction::SetTrue)]
    pub keep_source: bool,

    /// Path to ffmpeg binary (overrides PATH lookup)
    #[arg(long, value_hint = ValueHint::ExecutablePath)]
    pub ffmpeg: Option<PathBuf>,

    /// Path to ffprobe binary (overrides PATH lookup)
    #[arg(long, value_hint = ValueHint::ExecutablePath)]
    pub ffprobe: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct EncodeConfig {
    pub input: PathBuf,
    pub out: PathBuf,
    pub recursive: bool,
    pub limit: usize,
    pub format: VideoFormat,
    pub policy: OverwritePolicy,
    pub keep_source: bool,
    pub ffmpeg: Option<PathBuf>,
    pub ffprobe: Option<PathBuf>,
}

impl EncodeConfig {
    /// Where staged output lives for this run.
    pub fn staging_dir(&self) -> PathBuf {
        if self.recursive {
            self.out.join(STAGING_DIR_NAME)
        } else {
            self.out
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."))
                .join(STAGING_DIR_NAME)
        }
    }
}

impl EncodeArgs {
    pub fn into_config(self) -> Result<EncodeConfig> {
        let SharedArgs { input, out, .. } = self.shared;
        if self.recursive {
            if !input.is_dir() {
                return Err(KatError::InvalidInput(format!(
                    "input {} must be a folder in recursive mode",
                    input.display()
                )));
            }
            if !out.is_dir() {
                return Err(KatError::InvalidInput(format!(
                    "output {} must be a folder in recursive mode",
                    out.display()
                )));
            }
        } else {
            if out.is_dir() {
                return Err(KatError::InvalidInput(format!(
                    "output {} folder not allowed in non-recursive mode",
                    out.display()
                )));
            }
            if !input.is_file() {
                return Err(KatError::not_found(input));
            }
        }

        let policy = self.on_exists.unwrap_or(if self.recursive {
            OverwritePolicy::Prompt
        } else {
            OverwritePolicy::Reject
        });

        Ok(EncodeConfig {
            input,
            out,
            recursive: self.recursive,
            limit: self.max,
            format: self.codec,
            policy,
            keep_source: self.keep_source,
            ffmpeg: self.ffmpeg,
            ffprobe: self.ffprobe,
        })
    }
}
