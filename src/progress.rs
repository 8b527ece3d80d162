use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use regex::Regex;
use std::sync::LazyLock;

static TIME_RX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time=(\d{2}):(\d{2}):(\d{2})\.\d{2}").expect("time regex"));
static BITRATE_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"bitrate=\s*([0-9]+(?:\.[0-9]+)?)kbits/s").expect("bitrate regex")
});
static SPEED_RX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"speed=\s*([0-9]+(?:\.[0-9]+)?)x").expect("speed regex"));

/// How a record was terminated on the encoder's stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// `\r`: an in-place status update.
    Progress,
    /// `\n`, or whatever was left when the stream closed.
    Log,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub text: String,
    pub kind: RecordKind,
}

impl Record {
    pub fn event(&self) -> Option<ProgressEvent> {
        parse_record(&self.text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    /// Whole seconds of output written so far.
    pub elapsed: u64,
    /// kb/s, `None` when the encoder printed `N/A`.
    pub bitrate: Option<u64>,
    pub speed: Option<f64>,
}

/// Reassembles `\r`/`\n` delimited records from arbitrarily split chunks.
#[derive(Debug, Default)]
pub struct ProgressParser {
    pending: Vec<u8>,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every record completed by `chunk`; an unterminated tail is
    /// held back until a later chunk supplies its delimiter.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Record> {
        self.pending.extend_from_slice(chunk);

        let mut records = Vec::new();
        let mut start = 0;
        for (i, &b) in self.pending.iter().enumerate() {
            let kind = match b {
                b'\r' => RecordKind::Progress,
                b'\n' => RecordKind::Log,
                _ => continue,
            };
            records.push(Record {
                text: String::from_utf8_lossy(&self.pending[start..i]).into_owned(),
                kind,
            });
            start = i + 1;
        }
        self.pending.drain(..start);
        records
    }

    /// Flushes whatever is still buffered once the stream has ended.
    pub fn finish(&mut self) -> Option<Record> {
        if self.pending.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(Record {
            text,
            kind: RecordKind::Log,
        })
    }
}

pub fn parse_record(text: &str) -> Option<ProgressEvent> {
    let caps = TIME_RX.captures(text)?;
    let field = |i: usize| caps[i].parse::<u64>().unwrap_or(0);
    let elapsed = (field(1) * 60 + field(2)) * 60 + field(3);

    let bitrate = BITRATE_RX
        .captures(text)
        .and_then(|c| c[1].parse::<f64>().ok())
        .map(|kbps| kbps.round() as u64);
    let speed = SPEED_RX
        .captures(text)
        .and_then(|c| c[1].parse::<f64>().ok());

    Some(ProgressEvent {
        elapsed,
        bitrate,
        speed,
    })
}

/// Terminal progress bar for one encode, measured in seconds of output.
///
/// The bar is created on the first event and released by [`finish`];
/// a job that never reports progress never draws anything.
///
/// [`finish`]: ProgressReporter::finish
pub struct ProgressReporter {
    total: u64,
    label: String,
    hidden: bool,
    bar: Option<ProgressBar>,
    last: u64,
    shown: u64,
}

impl ProgressReporter {
    pub fn new(total: u64, label: impl Into<String>) -> Self {
        Self {
            total,
            label: label.into(),
            hidden: false,
            bar: None,
            last: 0,
            shown: 0,
        }
    }

    /// Same bookkeeping, nothing drawn.
    pub fn hidden(total: u64, label: impl Into<String>) -> Self {
        Self {
            hidden: true,
            ..Self::new(total, label)
        }
    }

    pub fn is_active(&self) -> bool {
        self.bar.is_some()
    }

    /// Last position put on the bar.
    pub fn position(&self) -> u64 {
        self.shown
    }

    pub fn update(&mut self, event: &ProgressEvent) {
        let bar = self.bar.get_or_insert_with(|| {
            let target = if self.hidden {
                ProgressDrawTarget::hidden()
            } else {
                ProgressDrawTarget::stdout()
            };
            let bar = ProgressBar::with_draw_target(Some(self.total), target);
            bar.set_style(
                ProgressStyle::with_template(
                    "{prefix} [{elapsed_precise}] [{bar:50.green/bright-black}] {percent:>3}%  {pos}/{len} secs  ETA:{eta_precise}  {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
            );
            bar.set_prefix(format!("Encoding {}", self.label));
            bar
        });

        // The encoder has been seen to report a smaller time after a larger
        // one; never move the bar backwards.
        let delta = event.elapsed.saturating_sub(self.last);
        self.last = self.last.max(event.elapsed);
        bar.inc(delta);
        let bitrate = match event.bitrate {
            Some(kbps) => format!("{kbps} kb/s"),
            None => "N/A kb/s".to_string(),
        };
        bar.set_message(match event.speed {
            Some(speed) => format!("{bitrate} {speed}x"),
            None => bitrate,
        });
        self.shown = bar.position();
    }

    /// Jumps to 100% and releases the bar.
    pub fn finish(&mut self) {
        let Some(bar) = self.bar.take() else {
            return;
        };
        bar.inc(self.total.saturating_sub(self.last));
        if bar.position() > self.total {
            bar.set_position(self.total);
        }
        self.shown = bar.position();
        bar.finish();
    }

    /// Runs `f` with the bar hidden, so log output does not tear it.
    pub fn suspend<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.bar {
            Some(bar) => bar.suspend(f),
            None => f(),
        }
    }
}
