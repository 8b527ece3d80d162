use crate::error::{KatError, Result};
use crate::ffmpeg::{self, Tools, VideoFormat};
use crate::probe::{self, MediaInfo};
use crate::progress::ProgressReporter;
use clap::ValueEnum;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Largest source/output duration difference, in seconds, still accepted.
pub const TOLERANCE_SECS: u64 = 2;

pub const STAGING_DIR_NAME: &str = "_tmp";

/// What to do when the destination file is already there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OverwritePolicy {
    /// Fail with `AlreadyExists`.
    Reject,
    /// Replace it.
    Overwrite,
    /// Ask on the terminal; declining skips the file.
    Prompt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Validating,
    Probing,
    Encoding,
    ValidatingOutput,
    Committed,
    RolledBack,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Validating => "validating",
            JobState::Probing => "probing",
            JobState::Encoding => "encoding",
            JobState::ValidatingOutput => "validating output",
            JobState::Committed => "committed",
            JobState::RolledBack => "rolled back",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeJob {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub format: VideoFormat,
    /// Where the encoder writes; only renamed onto `destination` once the
    /// output has been validated.
    pub staging: PathBuf,
}

impl TranscodeJob {
    pub fn new(source: PathBuf, destination: PathBuf, format: VideoFormat, staging: PathBuf) -> Self {
        Self {
            source,
            destination,
            format,
            staging,
        }
    }
}

pub fn output_accepted(source_secs: u64, output_secs: u64) -> bool {
    source_secs.abs_diff(output_secs) <= TOLERANCE_SECS
}

/// Promotes the staged output to the destination. The source is left alone.
pub fn commit(job: &TranscodeJob) -> Result<()> {
    fs::rename(&job.staging, &job.destination)?;
    Ok(())
}

/// Final step of a successful job; only called after [`commit`].
pub fn remove_source(job: &TranscodeJob) -> Result<()> {
    fs::remove_file(&job.source)?;
    Ok(())
}

fn rollback(job: &TranscodeJob) {
    if job.staging.is_file() {
        match fs::remove_file(&job.staging) {
            Ok(()) => debug!("removed partial output {}", job.staging.display()),
            Err(e) => warn!("cannot remove partial output {}: {e}", job.staging.display()),
        }
    }
    debug!("{}: {}", job.source.display(), JobState::RolledBack);
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Runs jobs one at a time against a fixed encoder/prober pair.
pub struct Transcoder<'a> {
    tools: &'a Tools,
    keep_source: bool,
    show_progress: bool,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Transcoder<'a> {
    pub fn new(tools: &'a Tools) -> Self {
        Self {
            tools,
            keep_source: false,
            show_progress: true,
            cancel: None,
        }
    }

    pub fn keep_source(mut self, keep: bool) -> Self {
        self.keep_source = keep;
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn cancel_on(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|c| c.load(Ordering::SeqCst))
    }

    /// A child killed by the same signal fails in its own way; once the
    /// flag is up the failure is reported as an interrupt.
    fn interrupted_or(&self, err: KatError) -> KatError {
        if self.cancelled() {
            KatError::Interrupted
        } else {
            err
        }
    }

    /// Encodes `job.source` into `job.destination` by way of `job.staging`.
    ///
    /// Nothing is written before the source has been probed. Any failure
    /// after the encoder starts removes the staged file. On success the
    /// destination is committed first and the source deleted last.
    pub fn transcode(&self, job: &TranscodeJob, overwrite: bool) -> Result<MediaInfo> {
        let src = job.source.display();
        debug!("{src}: {}", JobState::Validating);
        if !job.source.is_file() {
            return Err(KatError::not_found(&job.source));
        }
        if job.destination.is_dir() {
            return Err(KatError::InvalidInput(format!(
                "destination {} is a directory",
                job.destination.display()
            )));
        }
        if job.destination.is_file() && !overwrite {
            return Err(KatError::already_exists(&job.destination));
        }
        let replaces_source = same_file(&job.source, &job.destination);

        debug!("{src}: {}", JobState::Probing);
        let media =
            probe::probe(&self.tools.ffprobe, &job.source).map_err(|e| self.interrupted_or(e))?;
        println!("{media}");

        info!("{src}: {} as {:?}", JobState::Encoding, job.format);
        if job.staging.exists() {
            return Err(KatError::already_exists(&job.staging));
        }
        let args = ffmpeg::encode_args(&job.source, &job.staging, job.format);
        let mut reporter = if self.show_progress {
            ProgressReporter::new(media.duration, media.name())
        } else {
            ProgressReporter::hidden(media.duration, media.name())
        };
        let res = match ffmpeg::run_encoder(&self.tools.ffmpeg, &args, &mut reporter, self.cancel) {
            Ok(res) => res,
            Err(e) => {
                rollback(job);
                return Err(self.interrupted_or(e));
            }
        };
        debug!("{src}: encoder exited with {} at {}s", res.exit_code, reporter.position());
        if self.cancelled() {
            rollback(job);
            return Err(KatError::Interrupted);
        }
        if !res.success() {
            let stderr = String::from_utf8_lossy(&res.stderr);
            if let Some(last) = stderr.rsplit(['\r', '\n']).map(str::trim).find(|l| !l.is_empty()) {
                warn!("{}: {last}", self.tools.ffmpeg.display());
            }
            rollback(job);
            return Err(KatError::Encode {
                source_path: job.source.clone(),
                code: res.exit_code,
            });
        }

        debug!("{src}: {}", JobState::ValidatingOutput);
        let output = match probe::probe(&self.tools.ffprobe, &job.staging) {
            Ok(output) => output,
            Err(e) => {
                rollback(job);
                return Err(self.interrupted_or(e));
            }
        };
        if !output_accepted(media.duration, output.duration) {
            rollback(job);
            return Err(KatError::Validation {
                path: job.destination.clone(),
                expected: media.duration,
                actual: output.duration,
            });
        }

        if let Err(e) = commit(job) {
            rollback(job);
            return Err(e);
        }
        if !self.keep_source && !replaces_source {
            remove_source(job)?;
        }
        info!("{src}: {} to {}", JobState::Committed, job.destination.display());
        Ok(output)
    }
}

/// Holds encoder output until it is committed.
///
/// Only files handed out by [`stage`] are ever removed by [`cleanup`];
/// the directory itself goes only when it ends up empty.
///
/// [`stage`]: StagingDir::stage
/// [`cleanup`]: StagingDir::cleanup
#[derive(Debug)]
pub struct StagingDir {
    path: PathBuf,
    staged: Vec<PathBuf>,
}

impl StagingDir {
    pub fn create(path: PathBuf) -> Result<Self> {
        if !path.is_dir() {
            fs::create_dir_all(&path)?;
            debug!("created staging dir {}", path.display());
        }
        Ok(Self {
            path,
            staged: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Staging path for `destination`. A file already sitting there that
    /// this run did not stage is never claimed.
    pub fn stage(&mut self, destination: &Path) -> Result<PathBuf> {
        let name = destination.file_name().ok_or_else(|| {
            KatError::InvalidInput(format!("destination {} has no file name", destination.display()))
        })?;
        let staged = self.path.join(name);
        if self.staged.contains(&staged) {
            return Ok(staged);
        }
        if staged.exists() {
            return Err(KatError::already_exists(staged));
        }
        self.staged.push(staged.clone());
        Ok(staged)
    }

    pub fn cleanup(&mut self) {
        for f in self.staged.drain(..) {
            if f.is_file() {
                debug!("remove: {}", f.display());
                if let Err(e) = fs::remove_file(&f) {
                    warn!("cannot remove {}: {e}", f.display());
                }
            }
        }
        let empty = fs::read_dir(&self.path)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if empty {
            match fs::remove_dir(&self.path) {
                Ok(()) => debug!("removed staging dir {}", self.path.display()),
                Err(e) => info!("leaving staging dir {}: {e}", self.path.display()),
            }
        } else if self.path.is_dir() {
            info!("leaving non-empty staging dir {}", self.path.display());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub limit: usize,
    pub policy: OverwritePolicy,
    pub format: VideoFormat,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub encoded: usize,
    pub skipped: usize,
}

/// Encodes `pairs` in order, at most `opts.limit` of them.
///
/// `confirm` is asked before encoding over an existing destination when the
/// policy is `Prompt`; a "no" skips the pair without using up the limit.
/// The first failing job ends the batch, and an interrupt seen at any
/// point turns the outcome into `Interrupted`.
pub fn run_batch<C>(
    transcoder: &Transcoder,
    staging: &mut StagingDir,
    pairs: &[(PathBuf, PathBuf)],
    opts: BatchOptions,
    interrupted: &AtomicBool,
    mut confirm: C,
) -> Result<BatchSummary>
where
    C: FnMut(&Path) -> Result<bool>,
{
    let mut summary = BatchSummary::default();
    let mut remaining = opts.limit;

    for (source, destination) in pairs {
        if remaining == 0 {
            debug!("limit of {} reached", opts.limit);
            break;
        }
        if interrupted.load(Ordering::SeqCst) {
            return Err(KatError::Interrupted);
        }

        let exists = destination.is_file();
        if exists {
            match opts.policy {
                OverwritePolicy::Reject => return Err(KatError::already_exists(destination)),
                OverwritePolicy::Overwrite => {}
                OverwritePolicy::Prompt => {
                    if !confirm(destination)? {
                        info!("{} kept, skipping {}", destination.display(), source.display());
                        summary.skipped += 1;
                        continue;
                    }
                }
            }
        }

        let job = TranscodeJob::new(
            source.clone(),
            destination.clone(),
            opts.format,
            staging.stage(destination)?,
        );
        remaining -= 1;
        transcoder.transcode(&job, exists)?;
        summary.encoded += 1;
    }

    if interrupted.load(Ordering::SeqCst) {
        return Err(KatError::Interrupted);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerance_window() {
        assert!(output_accepted(3661, 3661));
        assert!(output_accepted(3661, 3660));
        assert!(output_accepted(3661, 3663));
        assert!(!output_accepted(3661, 3658));
        assert!(!output_accepted(3661, 3664));
        // pure: same inputs, same answer
        assert_eq!(output_accepted(3661, 3658), output_accepted(3661, 3658));
    }

    #[test]
    fn test_job_state_display() {
        assert_eq!(JobState::ValidatingOutput.to_string(), "validating output");
    }

    #[cfg(unix)]
    mod fake_tools {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        const SOURCE_SECS: &str = "3661.0";

        fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        /// Prober reporting `out_secs` for staged files and the source
        /// duration for everything else.
        fn prober(dir: &Path, out_secs: &str) -> PathBuf {
            script(
                dir,
                "ffprobe",
                &format!(
                    r#"for a; do last="$a"; done
[ -f "$last" ] || exit 1
case "$last" in
  */{STAGING_DIR_NAME}/*) d={out_secs} ;;
  *) d={SOURCE_SECS} ;;
esac
printf '{{"format":{{"filename":"%s","format_name":"mp4","duration":"%s","size":"%s","bit_rate":"3000000"}}}}' "$last" "$d" "$(wc -c < "$last" | tr -d ' ')""#
                ),
            )
        }

        fn encoder(dir: &Path, exit: i32) -> PathBuf {
            script(
                dir,
                "ffmpeg",
                &format!(
                    r#"for a; do last="$a"; done
printf 'Input #0, mpegts\n' >&2
printf 'frame=10 time=00:30:00.00 bitrate=3000.0kbits/s speed=9x\r' >&2
printf 'encoded' > "$last"
printf 'frame=20 time=01:01:00.00 bitrate=3000.0kbits/s speed=9x\r' >&2
exit {exit}"#
                ),
            )
        }

        struct Fixture {
            dir: TempDir,
            tools: Tools,
            staging: StagingDir,
        }

        impl Fixture {
            fn new(out_secs: &str, exit: i32) -> Self {
                let dir = TempDir::new().unwrap();
                let bin = dir.path().join("bin");
                fs::create_dir(&bin).unwrap();
                let tools = Tools {
                    ffmpeg: encoder(&bin, exit),
                    ffprobe: prober(&bin, out_secs),
                };
                let staging = StagingDir::create(dir.path().join(STAGING_DIR_NAME)).unwrap();
                Self {
                    dir,
                    tools,
                    staging,
                }
            }

            fn source(&self, name: &str) -> PathBuf {
                let p = self.dir.path().join(name);
                fs::write(&p, "raw").unwrap();
                p
            }

            fn job(&mut self, source: &Path, dest: &str) -> TranscodeJob {
                let dest = self.dir.path().join(dest);
                let staged = self.staging.stage(&dest).unwrap();
                TranscodeJob::new(source.to_path_buf(), dest, VideoFormat::H265, staged)
            }
        }

        fn quiet(tools: &Tools) -> Transcoder<'_> {
            Transcoder::new(tools).show_progress(false)
        }

        #[test]
        fn test_success_commits_then_removes_source() {
            let mut fx = Fixture::new("3660.4", 0);
            let src = fx.source("My.Movie.ABC-1234.Part.raw");
            let job = fx.job(&src, "ABC-1234.mp4");

            let out = quiet(&fx.tools).transcode(&job, false).unwrap();
            assert_eq!(out.duration, 3660);
            assert_eq!(fs::read_to_string(&job.destination).unwrap(), "encoded");
            assert!(!job.staging.exists());
            assert!(!src.exists());

            fx.staging.cleanup();
            assert!(!fx.dir.path().join(STAGING_DIR_NAME).exists());
        }

        #[test]
        fn test_keep_source() {
            let mut fx = Fixture::new("3661", 0);
            let src = fx.source("ABC-1.raw");
            let job = fx.job(&src, "ABC-1.mp4");
            quiet(&fx.tools).keep_source(true).transcode(&job, false).unwrap();
            assert!(src.exists());
            assert!(job.destination.exists());
        }

        #[test]
        fn test_encoder_failure_rolls_back() {
            let mut fx = Fixture::new("3661", 1);
            let src = fx.source("ABC-1.raw");
            let job = fx.job(&src, "ABC-1.mp4");

            let err = quiet(&fx.tools).transcode(&job, false).unwrap_err();
            assert!(matches!(err, KatError::Encode { code: 1, .. }));
            assert!(!job.staging.exists());
            assert!(!job.destination.exists());
            assert_eq!(fs::read_to_string(&src).unwrap(), "raw");
        }

        #[test]
        fn test_short_output_rejected() {
            let mut fx = Fixture::new("3658", 0);
            let src = fx.source("ABC-1.raw");
            let job = fx.job(&src, "ABC-1.mp4");

            let err = quiet(&fx.tools).transcode(&job, false).unwrap_err();
            assert!(matches!(
                err,
                KatError::Validation {
                    expected: 3661,
                    actual: 3658,
                    ..
                }
            ));
            assert!(!job.staging.exists());
            assert!(!job.destination.exists());
            assert!(src.exists());
        }

        #[test]
        fn test_missing_source_and_existing_destination() {
            let mut fx = Fixture::new("3661", 0);
            let missing = fx.dir.path().join("gone.raw");
            let job = fx.job(&missing, "ABC-1.mp4");
            let err = quiet(&fx.tools).transcode(&job, false).unwrap_err();
            assert!(matches!(err, KatError::NotFound { .. }));

            let src = fx.source("ABC-2.raw");
            let job = fx.job(&src, "ABC-2.mp4");
            fs::write(&job.destination, "old").unwrap();
            let err = quiet(&fx.tools).transcode(&job, false).unwrap_err();
            assert!(matches!(err, KatError::AlreadyExists { .. }));
            assert_eq!(fs::read_to_string(&job.destination).unwrap(), "old");

            quiet(&fx.tools).transcode(&job, true).unwrap();
            assert_eq!(fs::read_to_string(&job.destination).unwrap(), "encoded");
        }

        #[test]
        fn test_probe_failure_writes_nothing() {
            let mut fx = Fixture::new("3661", 0);
            fx.tools.ffprobe = script(&fx.dir.path().join("bin"), "badprobe", "exit 1");
            let src = fx.source("ABC-1.raw");
            let job = fx.job(&src, "ABC-1.mp4");
            let err = quiet(&fx.tools).transcode(&job, false).unwrap_err();
            assert!(matches!(err, KatError::Probe { .. }));
            assert!(!job.staging.exists());
            assert!(src.exists());
        }

        #[test]
        fn test_commit_keeps_source_until_removed() {
            let mut fx = Fixture::new("3661", 0);
            let src = fx.source("ABC-1.raw");
            let job = fx.job(&src, "ABC-1.mp4");
            fs::write(&job.staging, "encoded").unwrap();

            commit(&job).unwrap();
            assert!(job.destination.exists());
            assert!(src.exists());

            remove_source(&job).unwrap();
            assert!(!src.exists());
            assert!(job.destination.exists());
        }

        #[test]
        fn test_batch_limit_and_declined_prompt() {
            let mut fx = Fixture::new("3661", 0);
            let pairs: Vec<(PathBuf, PathBuf)> = ["ABC-1", "ABC-2", "ABC-3", "ABC-4"]
                .iter()
                .map(|c| {
                    (
                        fx.source(&format!("{c}.raw")),
                        fx.dir.path().join(format!("{c}.mp4")),
                    )
                })
                .collect();
            fs::write(&pairs[0].1, "old").unwrap();

            let tools = fx.tools.clone();
            let opts = BatchOptions {
                limit: 2,
                policy: OverwritePolicy::Prompt,
                format: VideoFormat::H265,
            };
            let mut asked = Vec::new();
            let summary = run_batch(
                &quiet(&tools),
                &mut fx.staging,
                &pairs,
                opts,
                &AtomicBool::new(false),
                |d| {
                    asked.push(d.to_path_buf());
                    Ok(false)
                },
            )
            .unwrap();

            assert_eq!(summary, BatchSummary { encoded: 2, skipped: 1 });
            assert_eq!(asked, vec![pairs[0].1.clone()]);
            assert_eq!(fs::read_to_string(&pairs[0].1).unwrap(), "old");
            assert!(pairs[1].1.exists() && pairs[2].1.exists());
            assert!(!pairs[3].1.exists());
            assert!(pairs[3].0.exists());

            fx.staging.cleanup();
            assert!(!fx.dir.path().join(STAGING_DIR_NAME).exists());
        }

        #[test]
        fn test_batch_stops_on_interrupt_and_failure() {
            let mut fx = Fixture::new("3661", 0);
            let pairs = vec![(fx.source("ABC-1.raw"), fx.dir.path().join("ABC-1.mp4"))];
            let tools = fx.tools.clone();
            let opts = BatchOptions {
                limit: 4,
                policy: OverwritePolicy::Reject,
                format: VideoFormat::H264,
            };
            let err = run_batch(
                &quiet(&tools),
                &mut fx.staging,
                &pairs,
                opts,
                &AtomicBool::new(true),
                |_| Ok(true),
            )
            .unwrap_err();
            assert!(matches!(err, KatError::Interrupted));
            assert!(pairs[0].0.exists());

            fs::write(&pairs[0].1, "old").unwrap();
            let err = run_batch(
                &quiet(&tools),
                &mut fx.staging,
                &pairs,
                opts,
                &AtomicBool::new(false),
                |_| Ok(true),
            )
            .unwrap_err();
            assert!(matches!(err, KatError::AlreadyExists { .. }));
        }

        #[test]
        fn test_cleanup_leaves_foreign_files() {
            let mut fx = Fixture::new("3661", 0);
            let staged = fx.staging.stage(Path::new("/out/ABC-1.mp4")).unwrap();
            fs::write(&staged, "partial").unwrap();
            let foreign = fx.staging.path().join("notes.txt");
            fs::write(&foreign, "keep me").unwrap();

            fx.staging.cleanup();
            assert!(!staged.exists());
            assert!(foreign.exists());
            assert!(fx.staging.path().is_dir());
        }

        #[test]
        fn test_foreign_file_at_staging_path_is_left_alone() {
            let mut fx = Fixture::new("3661", 0);
            let src = fx.source("ABC-1.raw");
            let dest = fx.dir.path().join("ABC-1.mp4");
            let foreign = fx.staging.path().join("ABC-1.mp4");
            fs::write(&foreign, "someone else's").unwrap();

            let err = fx.staging.stage(&dest).unwrap_err();
            assert!(matches!(err, KatError::AlreadyExists { .. }));

            let job = TranscodeJob::new(src.clone(), dest.clone(), VideoFormat::H265, foreign.clone());
            let err = quiet(&fx.tools).transcode(&job, false).unwrap_err();
            assert!(matches!(err, KatError::AlreadyExists { .. }));

            fx.staging.cleanup();
            assert_eq!(fs::read_to_string(&foreign).unwrap(), "someone else's");
            assert!(src.exists());
            assert!(!dest.exists());
        }

        #[test]
        fn test_interrupted_encode_rolls_back() {
            let mut fx = Fixture::new("3661", 0);
            fx.tools.ffmpeg = script(
                &fx.dir.path().join("bin"),
                "ffmpeg-interrupted",
                r#"for a; do last="$a"; done
printf 'encoded' > "$last"
printf 'frame=1 time=00:00:01.00 bitrate=1.0kbits/s speed=1x\r' >&2
exit 255"#,
            );
            let src = fx.source("ABC-1.raw");
            let job = fx.job(&src, "ABC-1.mp4");
            let cancel = AtomicBool::new(true);

            let err = quiet(&fx.tools).cancel_on(&cancel).transcode(&job, false).unwrap_err();
            assert!(matches!(err, KatError::Interrupted));
            assert_eq!(err.exit_code(), 130);
            assert!(!job.staging.exists());
            assert!(!job.destination.exists());
            assert_eq!(fs::read_to_string(&src).unwrap(), "raw");
        }

        #[test]
        fn test_prober_killed_by_interrupt() {
            let mut fx = Fixture::new("3661", 0);
            fx.tools.ffprobe = script(&fx.dir.path().join("bin"), "ffprobe-sigint", "kill -INT $$");
            let src = fx.source("ABC-1.raw");
            let job = fx.job(&src, "ABC-1.mp4");
            let cancel = AtomicBool::new(true);

            let err = quiet(&fx.tools).cancel_on(&cancel).transcode(&job, false).unwrap_err();
            assert!(matches!(err, KatError::Interrupted));
            assert!(!job.staging.exists());
            assert!(src.exists());

            // without the flag the same failure is an ordinary probe error
            let err = quiet(&fx.tools).transcode(&job, false).unwrap_err();
            assert!(matches!(err, KatError::Probe { .. }));
        }

        #[test]
        fn test_interrupt_during_batch_stops_schedule() {
            let mut fx = Fixture::new("3661", 0);
            let pairs: Vec<(PathBuf, PathBuf)> = ["ABC-1", "ABC-2"]
                .iter()
                .map(|c| {
                    (
                        fx.source(&format!("{c}.raw")),
                        fx.dir.path().join(format!("{c}.mp4")),
                    )
                })
                .collect();
            fs::write(&pairs[0].1, "old").unwrap();

            let tools = fx.tools.clone();
            let flag = AtomicBool::new(false);
            let opts = BatchOptions {
                limit: 4,
                policy: OverwritePolicy::Prompt,
                format: VideoFormat::H265,
            };
            let err = run_batch(
                &quiet(&tools).cancel_on(&flag),
                &mut fx.staging,
                &pairs,
                opts,
                &flag,
                |_| {
                    flag.store(true, Ordering::SeqCst);
                    Ok(true)
                },
            )
            .unwrap_err();

            assert!(matches!(err, KatError::Interrupted));
            assert_eq!(fs::read_to_string(&pairs[0].1).unwrap(), "old");
            assert!(pairs[0].0.exists());
            assert!(pairs[1].0.exists());
            assert!(!pairs[1].1.exists());

            fx.staging.cleanup();
            assert!(!fx.staging.path().exists());
        }

        #[test]
        fn test_interrupt_after_last_job_is_reported() {
            let mut fx = Fixture::new("3661", 0);
            let pairs = vec![(fx.source("ABC-1.raw"), fx.dir.path().join("ABC-1.mp4"))];
            fs::write(&pairs[0].1, "old").unwrap();

            let tools = fx.tools.clone();
            let flag = AtomicBool::new(false);
            let opts = BatchOptions {
                limit: 4,
                policy: OverwritePolicy::Prompt,
                format: VideoFormat::H265,
            };
            let err = run_batch(&quiet(&tools), &mut fx.staging, &pairs, opts, &flag, |_| {
                flag.store(true, Ordering::SeqCst);
                Ok(true)
            })
            .unwrap_err();

            assert!(matches!(err, KatError::Interrupted));
            assert_eq!(fs::read_to_string(&pairs[0].1).unwrap(), "encoded");
            assert!(!pairs[0].0.exists());
        }
    }
}
