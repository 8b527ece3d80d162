use crate::error::{KatError, Result};
use std::ffi::OsStr;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Size of a single stderr read. The encoder's progress records are far
/// shorter, so one chunk usually holds a few of them.
pub const CHUNK_SIZE: usize = 1024;

const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Everything a finished child left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: i32,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs `program` to completion, collecting both output streams.
pub fn run<S: AsRef<OsStr>>(program: &Path, args: &[S]) -> Result<ProcessResult> {
    run_streaming(program, args, None, |_| {})
}

/// Runs `program` and hands every stderr chunk to `on_stderr` while the
/// child is still running.
///
/// stdout is drained on a helper thread at the same time, so a child that
/// fills one pipe while we are blocked on the other cannot stall. The
/// result is only produced after both pipes hit EOF and the child has been
/// reaped.
///
/// If `cancel` becomes true the child is killed, whether or not it is
/// still writing; draining still runs to EOF so the exit status is real.
pub fn run_streaming<S, F>(
    program: &Path,
    args: &[S],
    cancel: Option<&AtomicBool>,
    mut on_stderr: F,
) -> Result<ProcessResult>
where
    S: AsRef<OsStr>,
    F: FnMut(&[u8]),
{
    debug!(
        "exec: {} {}",
        program.display(),
        args.iter()
            .map(|a| a.as_ref().to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| KatError::Spawn {
            program: program.display().to_string(),
            source,
        })?;

    let (Some(mut stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
        let _ = child.kill();
        let _ = child.wait();
        return Err(io::Error::other("child pipes were not captured").into());
    };

    let stdout_reader = thread::spawn(move || -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf)?;
        Ok(buf)
    });

    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    let stderr_reader = thread::spawn(move || -> io::Result<()> {
        let mut chunk = [0u8; CHUNK_SIZE];
        loop {
            let n = match stderr.read(&mut chunk) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if tx.send(chunk[..n].to_vec()).is_err() {
                return Ok(());
            }
        }
    });

    // A child that has gone quiet still has to notice a cancel, so the
    // flag is polled between chunks as well.
    let mut captured = Vec::new();
    let mut killed = false;
    loop {
        match rx.recv_timeout(CANCEL_POLL) {
            Ok(chunk) => {
                captured.extend_from_slice(&chunk);
                on_stderr(&chunk);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if !killed && cancel.is_some_and(|c| c.load(Ordering::SeqCst)) {
            debug!("cancel requested, killing {} ({})", program.display(), child.id());
            let _ = child.kill();
            killed = true;
        }
    }

    let stderr_result = stderr_reader
        .join()
        .map_err(|_| io::Error::other("stderr reader thread panicked"))?;
    if let Err(e) = stderr_result {
        let _ = child.kill();
        let _ = child.wait();
        let _ = stdout_reader.join();
        return Err(e.into());
    }
    let stdout = stdout_reader
        .join()
        .map_err(|_| io::Error::other("stdout reader thread panicked"))??;
    let status = child.wait()?;

    Ok(ProcessResult {
        stdout,
        stderr: captured,
        exit_code: exit_code(status),
    })
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
