//! Wiring of a complete playback: player, abort watcher and countdown.

use crate::{
    countdown::{Countdown, CountdownTask},
    hotkey::{abort_channel, spawn_abort_watcher},
    input::{InputSink, InputSource, Subscription},
    MacroLog, MacroPlayer, PlaybackOutcome, PlayerConfig, Result,
};
use std::future::{self, Future};
use tracing::{debug, info};

/// Play `log` through `sink` while `source` is watched for the abort key.
///
/// The speed is validated before `source` is subscribed to.
pub async fn run_macro<I, S, C>(
    log: &MacroLog,
    source: &I,
    sink: S,
    config: PlayerConfig,
    countdown: Option<C>,
) -> Result<PlaybackOutcome>
where
    I: InputSource + ?Sized,
    S: InputSink,
    C: Countdown,
{
    let player = MacroPlayer::new(sink, config)?;
    let subscription = source.subscribe()?;
    play_session(log, player, subscription, countdown, future::pending()).await
}

/// Play `log` on an already acquired subscription. Playback also stops, as an
/// abort, once `interrupt` resolves.
pub async fn run_macro_with<S, C, F>(
    log: &MacroLog,
    subscription: Subscription,
    sink: S,
    config: PlayerConfig,
    countdown: Option<C>,
    interrupt: F,
) -> Result<PlaybackOutcome>
where
    S: InputSink,
    C: Countdown,
    F: Future<Output = ()> + Send + 'static,
{
    let player = MacroPlayer::new(sink, config)?;
    play_session(log, player, subscription, countdown, interrupt).await
}

/// The abort watcher owns the session's only input subscription and is torn
/// down on every exit path, including dispatch failures. The countdown, when
/// given, is only shown for macros that take any time at all.
async fn play_session<S, C, F>(
    log: &MacroLog,
    mut player: MacroPlayer<S>,
    subscription: Subscription,
    countdown: Option<C>,
    interrupt: F,
) -> Result<PlaybackOutcome>
where
    S: InputSink,
    C: Countdown,
    F: Future<Output = ()> + Send + 'static,
{
    let (handle, signal) = abort_channel();
    let watcher = spawn_abort_watcher(
        subscription,
        player.config().abort_key,
        handle.clone(),
        player.injection_marker(),
    );
    let interrupter = tokio::spawn(async move {
        interrupt.await;
        info!("Playback interrupted");
        handle.abort();
    });

    let total = log.scaled_duration(player.config().speed);
    let countdown = countdown
        .filter(|_| !total.is_zero())
        .map(|display| CountdownTask::spawn(display, total, player.config().countdown_refresh));

    let outcome = player.play(log, signal).await;

    if let Some(countdown) = countdown {
        countdown.stop().await;
    }
    interrupter.abort();
    watcher.abort();
    if let Err(e) = watcher.await {
        debug!("Abort watcher ended: {}", e);
    }

    outcome
}
