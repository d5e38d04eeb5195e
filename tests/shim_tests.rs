use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tau_probe::decoder::ReadySignal;
use tau_probe::shim::Flow;
use tokio::sync::mpsc;
use tau_probe::{
    PageRelay, RelayConfig, RelayEvent,
    DecoderConfig, DecoderError, DecoderFactory, DecoderHandle, EventShim, ListenerConfig, LogLine,
    MemoryConsole, Payload, ShimError, SocketEvent, SpeechEnhancement, WorkerDecoderFactory,
};

fn shim_with_console() -> (EventShim, MemoryConsole) {
    let console = MemoryConsole::new();
    (EventShim::new(Arc::new(console.clone())), console)
}

/// Factory whose readiness is fired by the test.
struct ManualFactory {
    signal: ReadySignal,
}

impl DecoderFactory for ManualFactory {
    fn construct(&self, config: &DecoderConfig) -> Result<DecoderHandle, DecoderError> {
        Ok(DecoderHandle::detached(config.clone(), self.signal.clone()))
    }
}

/* -------------------------------------------------------------------------- */
/* 1. Startup sequence                                                        */
/* -------------------------------------------------------------------------- */
#[test]
fn print_sequence_emits_zero_to_ninety_nine_in_order() {
    let (shim, console) = shim_with_console();
    shim.print_sequence();

    let lines = console.lines();
    assert_eq!(lines.len(), 100);
    for (pos, line) in lines.iter().enumerate() {
        assert_eq!(*line, LogLine::Sequence(pos as u32));
    }
}

/* -------------------------------------------------------------------------- */
/* 2. Message handling                                                        */
/* -------------------------------------------------------------------------- */
#[test]
fn three_frames_log_payload_then_pre_increment_count() {
    let (mut shim, console) = shim_with_console();
    assert_eq!(shim.counter().value(), 0);

    for frame in ["a", "b", "c"] {
        let flow = shim.dispatch(SocketEvent::Message(Payload::from(frame))).unwrap();
        assert_eq!(flow, Flow::Continue);
    }

    assert_eq!(
        console.lines(),
        vec![
            LogLine::Payload(Payload::from("a")),
            LogLine::Count(0),
            LogLine::Payload(Payload::from("b")),
            LogLine::Count(1),
            LogLine::Payload(Payload::from("c")),
            LogLine::Count(2),
        ]
    );
    assert_eq!(shim.counter().value(), 3);
}

#[test]
fn binary_frames_are_logged_verbatim() {
    let (mut shim, console) = shim_with_console();
    let raw = Bytes::from_static(b"\x00\x01OggS");
    shim.dispatch(SocketEvent::Message(Payload::Binary(raw.clone()))).unwrap();

    assert_eq!(console.lines(), vec![LogLine::Payload(Payload::Binary(raw)), LogLine::Count(0)]);
}

/* -------------------------------------------------------------------------- */
/* 3. Open / close / connection                                               */
/* -------------------------------------------------------------------------- */
#[test]
fn open_logs_exactly_one_line_and_keeps_counter() {
    let (mut shim, console) = shim_with_console();
    assert_eq!(shim.dispatch(SocketEvent::Open).unwrap(), Flow::Continue);

    assert_eq!(console.lines(), vec![LogLine::Opened]);
    assert_eq!(shim.counter().value(), 0);
}

#[test]
fn close_stops_without_logging() {
    let (mut shim, console) = shim_with_console();
    let flow = shim.dispatch(SocketEvent::Closed { reason: None }).unwrap();

    assert_eq!(flow, Flow::Stop);
    assert!(console.lines().is_empty());
}

#[test]
fn connection_event_is_fatal_on_a_client() {
    let (mut shim, console) = shim_with_console();
    let res = shim.dispatch(SocketEvent::Connection);

    assert!(matches!(res, Err(ShimError::UnexpectedEvent("connection"))));
    assert!(console.lines().is_empty());
}

#[tokio::test]
async fn pump_stops_on_first_error() {
    let (mut shim, console) = shim_with_console();
    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    tx.send(SocketEvent::Message(Payload::from("x"))).await.unwrap();
    tx.send(SocketEvent::Connection).await.unwrap();
    tx.send(SocketEvent::Message(Payload::from("never"))).await.unwrap();

    assert!(shim.pump(&mut rx).await.is_err());
    assert_eq!(console.lines(), vec![LogLine::Payload(Payload::from("x")), LogLine::Count(0)]);
}

/* -------------------------------------------------------------------------- */
/* 4. Decoder                                                                 */
/* -------------------------------------------------------------------------- */
#[test]
fn default_decoder_config() {
    let cfg = DecoderConfig::default();
    assert!(!cfg.force_stereo);
    assert_eq!(cfg.speech_quality_enhancement, SpeechEnhancement::NoLace);
    assert_eq!(cfg.sample_rate, 48_000);
}

#[test]
fn readiness_logs_once_even_if_signalled_twice() {
    let (mut shim, console) = shim_with_console();
    let factory = ManualFactory { signal: ReadySignal::new() };

    shim.init_decoder(&factory, &DecoderConfig::default()).unwrap();
    shim.watch_decoder().unwrap();
    assert!(console.lines().is_empty());

    factory.signal.complete();
    factory.signal.complete();
    assert_eq!(console.lines(), vec![LogLine::DecoderReady]);
}

#[tokio::test]
async fn worker_decoder_reports_ready() {
    let (mut shim, console) = shim_with_console();
    let handle = shim.init_decoder(&WorkerDecoderFactory, &DecoderConfig::default()).unwrap();
    assert_eq!(handle.config().sample_rate, 48_000);
    shim.watch_decoder().unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while console.lines().is_empty() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(console.lines(), vec![LogLine::DecoderReady]);
    assert!(shim.decoder().unwrap().ready().is_ready());
}

#[tokio::test]
async fn decoder_failure_propagates_before_anything_else() {
    let (mut shim, console) = shim_with_console();
    let bad = DecoderConfig::default().with_sample_rate(22_050);
    // Port 9 on loopback: nothing should be listening, but the run must fail before connecting.
    let listener = ListenerConfig::new("ws://127.0.0.1:9".into());

    let res = shim.run(&WorkerDecoderFactory, &bad, &listener).await;
    assert!(matches!(res, Err(ShimError::Decoder(DecoderError::UnsupportedSampleRate(22_050)))));
    assert!(console.lines().is_empty());
}

#[test]
fn decoder_ready_during_sequence_logs_after_it() {
    let (mut shim, console) = shim_with_console();
    let factory = ManualFactory { signal: ReadySignal::new() };

    shim.init_decoder(&factory, &DecoderConfig::default()).unwrap();
    // Worker finished before the startup loop even ran.
    factory.signal.complete();
    shim.print_sequence();
    shim.watch_decoder().unwrap();

    let lines = console.lines();
    assert_eq!(lines.len(), 101);
    assert!(lines[..100].iter().all(|l| matches!(l, LogLine::Sequence(_))));
    assert_eq!(lines[100], LogLine::DecoderReady);
}

/* -------------------------------------------------------------------------- */
/* 5. Full lifecycle                                                          */
/* -------------------------------------------------------------------------- */
#[tokio::test]
async fn run_counts_frames_until_relay_closes() {
    let relay = Arc::new(PageRelay::bind(RelayConfig::new("127.0.0.1:0".into(), true)).await.unwrap());
    let (tx, mut relay_rx) = mpsc::channel::<RelayEvent>(100);
    tokio::spawn(Arc::clone(&relay).run(tx));

    let (mut shim, console) = shim_with_console();
    let listener = ListenerConfig::new(relay.url());

    let drive = async {
        let peer_id = match tokio::time::timeout(Duration::from_secs(2), relay_rx.recv()).await {
            Ok(Some(RelayEvent::Joined { peer_id })) => peer_id,
            other => panic!("listener never joined: {other:?}"),
        };
        for frame in ["a", "b", "c"] {
            relay.publish(Bytes::from_static(frame.as_bytes())).await.unwrap();
        }
        relay.close_peer(&peer_id).await.unwrap();
    };

    let decoder_config = DecoderConfig::default();
    let (res, ()) = tokio::join!(
        tokio::time::timeout(
            Duration::from_secs(5),
            shim.run(&WorkerDecoderFactory, &decoder_config, &listener),
        ),
        drive,
    );
    let counter = res.expect("run did not finish").expect("run failed");
    assert_eq!(counter.value(), 3);

    // The ready line comes from the worker thread; its exact spot after the sequence is not fixed.
    let lines: Vec<_> = console
        .lines()
        .into_iter()
        .filter(|l| *l != LogLine::DecoderReady)
        .collect();
    let sequence: Vec<_> = (0..100).map(LogLine::Sequence).collect();
    assert_eq!(&lines[..100], sequence.as_slice());

    let bin = |s: &'static str| LogLine::Payload(Payload::Binary(Bytes::from_static(s.as_bytes())));
    assert_eq!(
        &lines[100..],
        &[
            LogLine::Opened,
            bin("a"),
            LogLine::Count(0),
            bin("b"),
            LogLine::Count(1),
            bin("c"),
            LogLine::Count(2),
        ]
    );
}
