//! Remaining-time display shown while a macro runs. Purely cosmetic: it never
//! influences playback timing.

use std::{
    io::{self, Write},
    time::Duration,
};
use tokio::{sync::oneshot, task::JoinHandle, time::Instant};
use tracing::debug;

/// A surface that can show how much of a playback is left
pub trait Countdown: Send + 'static {
    fn show_remaining(&mut self, remaining: Duration);
    fn hide(&mut self);
}

/// Format whole seconds as `MM:SS`, or `HH:MM:SS` from one hour up
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_secs_f64().round() as u64;
    let (h, rem) = (secs / 3600, secs % 3600);
    let (m, s) = (rem / 60, rem % 60);
    if h > 0 {
        format!("{:02}:{:02}:{:02}", h, m, s)
    } else {
        format!("{:02}:{:02}", m, s)
    }
}

/// Single status line rewritten in place, on stderr by default
pub struct TerminalCountdown<W: Write + Send + 'static> {
    out: W,
    last_width: usize,
}

impl TerminalCountdown<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send + 'static> TerminalCountdown<W> {
    pub fn new(out: W) -> Self {
        Self { out, last_width: 0 }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send + 'static> Countdown for TerminalCountdown<W> {
    fn show_remaining(&mut self, remaining: Duration) {
        let line = format!("⏳ remaining {}", format_remaining(remaining));
        let width = line.chars().count();
        let pad = self.last_width.saturating_sub(width);
        self.last_width = width;
        let _ = write!(self.out, "\r{}{}", line, " ".repeat(pad));
        let _ = self.out.flush();
    }

    fn hide(&mut self) {
        if self.last_width == 0 {
            return;
        }
        let _ = write!(self.out, "\r{}\r", " ".repeat(self.last_width));
        let _ = self.out.flush();
        self.last_width = 0;
    }
}

/// A countdown ticking on its own task
pub struct CountdownTask<C: Countdown> {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<C>,
}

impl<C: Countdown> CountdownTask<C> {
    /// Start counting down from `total`, refreshing every `refresh`.
    /// Once the time is up the display keeps showing `00:00` until stopped.
    pub fn spawn(mut display: C, total: Duration, refresh: Duration) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = tokio::time::interval(refresh);
            let mut expired = false;
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick(), if !expired => {
                        let remaining = total.saturating_sub(started.elapsed());
                        display.show_remaining(remaining);
                        expired = remaining.is_zero();
                    }
                }
            }
            display.hide();
            display
        });
        Self { stop_tx, task }
    }

    /// Stop the countdown, clear it and hand the display back.
    pub async fn stop(self) -> Option<C> {
        let _ = self.stop_tx.send(());
        match self.task.await {
            Ok(display) => Some(display),
            Err(e) => {
                debug!("Countdown task failed: {}", e);
                None
            }
        }
    }
}
