#[cfg(test)]
mod session_tests {
    use crate::countdown::Countdown;
    use crate::input::{capture_channel, CaptureFeed, InputSink, InputSource, Subscription};
    use crate::*;
    use rdev::Key;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    /// Hands out one pre-built subscription, then reports capture as unavailable
    struct ScriptedSource {
        subscription: Mutex<Option<Subscription>>,
    }

    impl ScriptedSource {
        fn new() -> (CaptureFeed, Self) {
            let (feed, subscription) = capture_channel();
            let source = Self {
                subscription: Mutex::new(Some(subscription)),
            };
            (feed, source)
        }
    }

    impl InputSource for ScriptedSource {
        fn subscribe(&self) -> Result<Subscription> {
            self.subscription
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| MacroError::CaptureUnavailable("already subscribed".to_string()))
        }
    }

    struct Unavailable;

    impl InputSource for Unavailable {
        fn subscribe(&self) -> Result<Subscription> {
            Err(MacroError::CaptureUnavailable("permission denied".to_string()))
        }
    }

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<(Instant, InputAction)>>>);

    impl SharedSink {
        fn actions(&self) -> Vec<InputAction> {
            self.0.lock().unwrap().iter().map(|(_, a)| a.clone()).collect()
        }
    }

    impl InputSink for SharedSink {
        fn dispatch(&mut self, action: &InputAction) -> Result<()> {
            self.0.lock().unwrap().push((Instant::now(), action.clone()));
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct CountingDisplay(Arc<Mutex<usize>>, Arc<Mutex<bool>>);

    impl CountingDisplay {
        fn hidden(&self) -> bool {
            *self.1.lock().unwrap()
        }
    }

    impl Countdown for CountingDisplay {
        fn show_remaining(&mut self, _remaining: Duration) {
            *self.0.lock().unwrap() += 1;
        }

        fn hide(&mut self) {
            *self.1.lock().unwrap() = true;
        }
    }

    /// Feeds every dispatched action back into the capture hook after a delay,
    /// like a desktop hook observing synthetic input
    struct EchoSink {
        feed: CaptureFeed,
        latency: Duration,
        sent: SharedSink,
    }

    impl InputSink for EchoSink {
        fn dispatch(&mut self, action: &InputAction) -> Result<()> {
            self.sent.dispatch(action)?;
            let (feed, action, latency) = (self.feed.clone(), action.clone(), self.latency);
            tokio::spawn(async move {
                tokio::time::sleep(latency).await;
                feed.push(action);
            });
            Ok(())
        }
    }

    fn mv(x: f64, y: f64) -> InputAction {
        InputAction::MouseMove { x, y }
    }

    fn feed_stream(feed: &CaptureFeed, t0: Instant) {
        for i in 1..=5u64 {
            feed.push_at(mv(i as f64, 2.0 * i as f64), t0 + Duration::from_millis(20 * i));
        }
        feed.push_at(InputAction::KeyDown { key: Key::KeyA }, t0 + Duration::from_millis(200));
        feed.push_at(InputAction::KeyDown { key: Key::Escape }, t0 + Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_recording_with_compaction() {
        let (feed, source) = ScriptedSource::new();
        let recorder = MacroRecorder::new(RecorderConfig {
            motion: MotionCapture::Compact,
            ..Default::default()
        });
        let subscription = source.subscribe().unwrap();
        let t0 = Instant::now();
        feed_stream(&feed, t0);

        let log = recorder.record_from(subscription, t0).await.unwrap();

        assert_eq!(log.len(), 2);
        assert_eq!(log.events()[0], MacroEvent::new(Duration::from_millis(100), mv(5.0, 10.0)));
        assert_eq!(
            log.events()[1],
            MacroEvent::new(Duration::from_millis(100), InputAction::KeyDown { key: Key::KeyA })
        );
        assert!(!feed.is_active(), "subscription must be released after recording");
    }

    #[tokio::test]
    async fn test_recording_full_motion() {
        let (feed, source) = ScriptedSource::new();
        let recorder = MacroRecorder::new(RecorderConfig::default());
        let subscription = source.subscribe().unwrap();
        let t0 = Instant::now();
        feed_stream(&feed, t0);

        let log = recorder.record_from(subscription, t0).await.unwrap();
        assert_eq!(log.len(), 6);
        assert!(log.events().iter().all(|e| !e.action.involves_key(Key::Escape)));
        assert_eq!(log.total_duration(), Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_abort_key_release_is_not_recorded() {
        let (feed, source) = ScriptedSource::new();
        let recorder = MacroRecorder::new(RecorderConfig::default());
        feed.push(InputAction::KeyUp { key: Key::Escape });
        feed.push(InputAction::KeyDown { key: Key::KeyB });
        feed.push(InputAction::KeyDown { key: Key::Escape });

        let log = recorder.record(&source).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.events()[0].action, InputAction::KeyDown { key: Key::KeyB });
    }

    #[tokio::test]
    async fn test_capture_unavailable_is_fatal() {
        let recorder = MacroRecorder::new(RecorderConfig::default());
        let err = recorder.record(&Unavailable).await.unwrap_err();
        assert!(matches!(err, MacroError::CaptureUnavailable(_)));
    }

    #[tokio::test]
    async fn test_lost_capture_discards_partial_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        let (feed, source) = ScriptedSource::new();
        feed.push(InputAction::KeyDown { key: Key::KeyA });
        drop(feed);

        let recorder = MacroRecorder::new(RecorderConfig::default());
        let err = recorder.record_to_file(&source, &path).await.unwrap_err();
        assert!(matches!(err, MacroError::CaptureLost(_)));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_record_to_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macro.json");
        let (feed, source) = ScriptedSource::new();
        let t0 = Instant::now();
        feed_stream(&feed, t0);

        let recorder = MacroRecorder::new(RecorderConfig::default());
        let recorded = recorder.record_to_file(&source, &path).await.unwrap();
        let loaded = MacroLog::load(&path).unwrap();

        assert_eq!(loaded, recorded);
    }

    #[tokio::test]
    async fn test_abort_during_long_wait_is_prompt() {
        let log = MacroLog::new(vec![
            MacroEvent::new(Duration::ZERO, InputAction::KeyDown { key: Key::KeyA }),
            MacroEvent::new(Duration::from_secs(5), InputAction::KeyUp { key: Key::KeyA }),
            MacroEvent::new(Duration::ZERO, InputAction::KeyDown { key: Key::KeyB }),
        ]);
        let (feed, source) = ScriptedSource::new();
        let sink = SharedSink::default();

        let pressed_at = Arc::new(Mutex::new(None));
        let pressed = Arc::clone(&pressed_at);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            *pressed.lock().unwrap() = Some(Instant::now());
            feed.push(InputAction::KeyDown { key: Key::Escape });
        });

        let outcome = run_macro(&log, &source, sink.clone(), PlayerConfig::default(), None::<CountingDisplay>)
            .await
            .unwrap();
        let stopped_at = Instant::now();

        assert!(outcome.is_aborted());
        assert_eq!(outcome.dispatched(), 1);
        assert_eq!(sink.actions(), vec![InputAction::KeyDown { key: Key::KeyA }]);
        let pressed_at = pressed_at.lock().unwrap().expect("abort key was pressed");
        assert!(stopped_at.duration_since(pressed_at) <= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_zero_delays_dispatch_promptly() {
        let events = (0..200)
            .map(|i| MacroEvent::new(Duration::ZERO, mv(i as f64, 0.0)))
            .collect();
        let log = MacroLog::new(events);
        let (_feed, source) = ScriptedSource::new();
        let sink = SharedSink::default();
        let display = CountingDisplay::default();

        let started = Instant::now();
        let outcome = run_macro(&log, &source, sink.clone(), PlayerConfig::default(), Some(display.clone()))
            .await
            .unwrap();

        assert_eq!(outcome, PlaybackOutcome::Completed { dispatched: 200 });
        assert_eq!(sink.actions().len(), 200);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(*display.0.lock().unwrap(), 0, "no countdown for an instant macro");
    }

    #[tokio::test]
    async fn test_speed_scaling_wall_clock() {
        let log = MacroLog::new(vec![
            MacroEvent::new(Duration::ZERO, InputAction::KeyDown { key: Key::KeyA }),
            MacroEvent::new(Duration::from_millis(100), InputAction::KeyUp { key: Key::KeyA }),
            MacroEvent::new(Duration::from_millis(200), InputAction::KeyDown { key: Key::KeyB }),
        ]);
        let (_feed, source) = ScriptedSource::new();
        let sink = SharedSink::default();
        let config = PlayerConfig { speed: 2.0, ..Default::default() };

        let started = Instant::now();
        run_macro(&log, &source, sink.clone(), config, None::<CountingDisplay>)
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(150), "too fast: {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(280), "too slow: {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_run_requires_hotkey_subscription() {
        let log = MacroLog::new(vec![MacroEvent::new(Duration::ZERO, InputAction::KeyDown { key: Key::KeyA })]);
        let sink = SharedSink::default();
        let err = run_macro(&log, &Unavailable, sink.clone(), PlayerConfig::default(), None::<CountingDisplay>)
            .await
            .unwrap_err();
        assert!(matches!(err, MacroError::CaptureUnavailable(_)));
        assert!(sink.actions().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_speed_rejected_before_subscribing() {
        let log = MacroLog::default();
        let (feed, source) = ScriptedSource::new();
        let config = PlayerConfig { speed: 0.0, ..Default::default() };
        let err = run_macro(&log, &source, SharedSink::default(), config, None::<CountingDisplay>)
            .await
            .unwrap_err();
        assert!(matches!(err, MacroError::InvalidSpeed(_)));
        assert!(feed.is_active());
    }

    #[tokio::test]
    async fn test_hotkey_subscription_released_after_run() {
        let log = MacroLog::new(vec![MacroEvent::new(
            Duration::from_millis(10),
            InputAction::MouseScroll { dx: 0, dy: -1 },
        )]);
        let (feed, source) = ScriptedSource::new();
        let display = CountingDisplay::default();
        let outcome = run_macro(&log, &source, SharedSink::default(), PlayerConfig::default(), Some(display.clone()))
            .await
            .unwrap();

        assert!(!outcome.is_aborted());
        assert!(!feed.is_active());
        assert!(*display.0.lock().unwrap() >= 1);
    }

    #[tokio::test]
    async fn test_recorded_abort_key_does_not_abort_playback() {
        // ESC down and up at the same instant: the release is dispatched
        // before the hook reports the press back
        let log = MacroLog::new(vec![
            MacroEvent::new(Duration::ZERO, InputAction::KeyDown { key: Key::Escape }),
            MacroEvent::new(Duration::ZERO, InputAction::KeyUp { key: Key::Escape }),
            MacroEvent::new(Duration::from_millis(100), InputAction::KeyDown { key: Key::KeyA }),
        ]);
        let (feed, source) = ScriptedSource::new();
        let sent = SharedSink::default();
        let sink = EchoSink {
            feed: feed.clone(),
            latency: Duration::from_millis(20),
            sent: sent.clone(),
        };

        let outcome = run_macro(&log, &source, sink, PlayerConfig::default(), None::<CountingDisplay>)
            .await
            .unwrap();

        assert_eq!(outcome, PlaybackOutcome::Completed { dispatched: 3 });
        assert_eq!(sent.actions().len(), 3);
    }

    #[tokio::test]
    async fn test_user_abort_key_still_works_after_recorded_one() {
        let log = MacroLog::new(vec![
            MacroEvent::new(Duration::ZERO, InputAction::KeyDown { key: Key::Escape }),
            MacroEvent::new(Duration::ZERO, InputAction::KeyUp { key: Key::Escape }),
            MacroEvent::new(Duration::from_secs(5), InputAction::KeyDown { key: Key::KeyA }),
        ]);
        let (feed, source) = ScriptedSource::new();
        let sink = EchoSink {
            feed: feed.clone(),
            latency: Duration::from_millis(20),
            sent: SharedSink::default(),
        };
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            feed.push(InputAction::KeyDown { key: Key::Escape });
        });

        let outcome = run_macro(&log, &source, sink, PlayerConfig::default(), None::<CountingDisplay>)
            .await
            .unwrap();

        assert!(outcome.is_aborted());
        assert_eq!(outcome.dispatched(), 2);
    }

    #[tokio::test]
    async fn test_interrupt_aborts_and_clears_countdown() {
        let log = MacroLog::new(vec![
            MacroEvent::new(Duration::ZERO, InputAction::KeyDown { key: Key::KeyA }),
            MacroEvent::new(Duration::from_secs(5), InputAction::KeyUp { key: Key::KeyA }),
        ]);
        let (feed, subscription) = capture_channel();
        let display = CountingDisplay::default();
        let sink = SharedSink::default();

        let started = Instant::now();
        let outcome = run_macro_with(
            &log,
            subscription,
            sink.clone(),
            PlayerConfig::default(),
            Some(display.clone()),
            tokio::time::sleep(Duration::from_millis(150)),
        )
        .await
        .unwrap();

        assert!(outcome.is_aborted());
        assert_eq!(sink.actions(), vec![InputAction::KeyDown { key: Key::KeyA }]);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(*display.0.lock().unwrap() >= 1);
        assert!(display.hidden(), "countdown must be cleared when interrupted");
        assert!(!feed.is_active());
    }
}
