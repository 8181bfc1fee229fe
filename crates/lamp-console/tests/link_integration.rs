//! Integration tests for the device link over the in-memory port.
//!
//! Each test drives a real `DeviceLink` (blocking workers, read loop,
//! watch channel) against `MockPortOpener`, so everything but the OS serial
//! driver is exercised.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use lamp_console::application::control_lamp::ControlLampUseCase;
use lamp_console::infrastructure::device_link::mock::{MockPortOpener, ReadStep};
use lamp_console::infrastructure::device_link::{
    DeviceLink, DisconnectReason, LinkError, LinkEvent, LinkState, PortSettings,
};
use lamp_core::{Effect, Mode, PanelGesture, Rgb, TemperatureReading};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};

const WAIT: Duration = Duration::from_secs(2);

fn settings() -> PortSettings {
    PortSettings {
        read_timeout: Duration::from_millis(10),
        ..PortSettings::new("mock0")
    }
}

fn new_link() -> (Arc<MockPortOpener>, DeviceLink, mpsc::UnboundedReceiver<LinkEvent>) {
    let opener = Arc::new(MockPortOpener::new());
    let (link, events) = DeviceLink::new(opener.clone());
    (opener, link, events)
}

async fn next_event(events: &mut mpsc::UnboundedReceiver<LinkEvent>) -> LinkEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("link event in time")
        .expect("event channel open")
}

async fn next_reading(rx: &mut watch::Receiver<TemperatureReading>) -> TemperatureReading {
    timeout(WAIT, rx.changed())
        .await
        .expect("reading in time")
        .expect("temperature sender alive");
    rx.borrow_and_update().clone()
}

// ── Write path ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_send_line_while_disconnected_is_a_no_op() {
    // Arrange
    let (opener, link, _events) = new_link();

    // Act
    assert_ok!(link.send_line("AUTO\n"));

    // Assert
    assert_eq!(link.state(), LinkState::Disconnected);
    assert!(opener.written_text().is_empty());
    assert_eq!(opener.open_count(), 0);
}

#[tokio::test]
async fn test_open_then_send_writes_line() {
    // Arrange
    let (opener, link, mut events) = new_link();

    // Act
    assert_ok!(link.open(settings()).await);
    assert_ok!(link.send_line("MANUAL\n"));

    // Assert
    assert_eq!(link.state(), LinkState::Connected);
    assert_eq!(
        next_event(&mut events).await,
        LinkEvent::Connected {
            port: "mock0".into()
        }
    );
    assert_eq!(opener.written_lines(), vec!["MANUAL"]);

    assert_ok!(link.close().await);
}

#[tokio::test]
async fn test_write_failure_is_returned_and_link_stays_connected() {
    let (opener, link, _events) = new_link();
    assert_ok!(link.open(settings()).await);
    opener.set_fail_writes(true);

    let err = assert_err!(link.send_line("AUTO\n"));

    assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    assert_eq!(link.state(), LinkState::Connected);
    assert_ok!(link.close().await);
}

#[tokio::test]
async fn test_concurrent_senders_never_interleave_lines() {
    // Arrange
    let (opener, link, _events) = new_link();
    assert_ok!(link.open(settings()).await);
    let link = Arc::new(link);

    // Act – four threads each send 50 full lines
    let workers: Vec<_> = (0..4u8)
        .map(|n| {
            let link = Arc::clone(&link);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    link.send_line(&format!("RGB:{n},{n},{n}\n")).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    // Assert
    let lines = opener.written_lines();
    assert_eq!(lines.len(), 200);
    for line in &lines {
        let n = &line["RGB:".len()..line.find(',').unwrap()];
        assert_eq!(*line, format!("RGB:{n},{n},{n}"));
    }
    assert_ok!(link.close().await);
}

#[tokio::test]
async fn test_stalled_write_does_not_block_state_queries() {
    // Arrange
    let (opener, link, _events) = new_link();
    assert_ok!(link.open(settings()).await);
    let link = Arc::new(link);
    opener.set_write_delay(Duration::from_millis(400));

    // Act – one sender is stuck in the port while the state is queried
    let writer = {
        let link = Arc::clone(&link);
        std::thread::spawn(move || link.send_line("AUTO\n"))
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let started = std::time::Instant::now();
    let state = link.state();
    let waited = started.elapsed();

    // Assert
    assert_eq!(state, LinkState::Connected);
    assert!(waited < Duration::from_millis(200), "state() waited {waited:?}");
    assert_ok!(writer.join().unwrap());
    assert_eq!(opener.written_lines(), vec!["AUTO"]);
    opener.set_write_delay(Duration::ZERO);
    assert_ok!(link.close().await);
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_second_open_fails_with_already_open() {
    let (opener, link, _events) = new_link();
    assert_ok!(link.open(settings()).await);

    let err = assert_err!(link.open(settings()).await);

    assert!(matches!(err, LinkError::AlreadyOpen));
    assert_eq!(opener.open_count(), 1);
    assert_ok!(link.close().await);
}

#[tokio::test]
async fn test_open_failure_returns_to_disconnected_without_retry() {
    // Arrange
    let (opener, link, mut events) = new_link();
    opener.fail_next_open(io::ErrorKind::NotFound);

    // Act
    let err = assert_err!(link.open(settings()).await);

    // Assert
    match err {
        LinkError::Connection {
            port,
            baud_rate,
            source,
        } => {
            assert_eq!(port, "mock0");
            assert_eq!(baud_rate, 9600);
            assert_eq!(source.kind(), io::ErrorKind::NotFound);
        }
        other => panic!("expected connection error, got {other:?}"),
    }
    assert_eq!(link.state(), LinkState::Disconnected);
    assert!(events.try_recv().is_err(), "no event for a failed open");
    assert_eq!(opener.open_count(), 1);

    // A later open is allowed.
    assert_ok!(link.open(settings()).await);
    assert_ok!(link.close().await);
}

#[tokio::test]
async fn test_abandoned_open_returns_to_disconnected() {
    // Arrange
    let (opener, link, mut events) = new_link();
    opener.delay_next_open(Duration::from_millis(200));

    // Act – stop waiting while the port is still being opened
    let attempt = timeout(Duration::from_millis(20), link.open(settings())).await;

    // Assert
    assert!(attempt.is_err(), "open should still have been pending");
    assert_eq!(link.state(), LinkState::Disconnected);
    assert!(events.try_recv().is_err(), "no event for an abandoned open");

    // Once the abandoned worker is done, a new open goes through.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_ok!(link.open(settings()).await);
    assert_eq!(opener.open_count(), 2);
    assert!(matches!(next_event(&mut events).await, LinkEvent::Connected { .. }));
    assert_ok!(link.close().await);
}

#[tokio::test]
async fn test_close_stops_reader_and_disables_writes() {
    // Arrange
    let (opener, link, mut events) = new_link();
    assert_ok!(link.open(settings()).await);
    assert!(matches!(next_event(&mut events).await, LinkEvent::Connected { .. }));

    // Act
    assert_ok!(link.close().await);
    assert_ok!(link.send_line("AUTO\n"));

    // Assert
    assert_eq!(link.state(), LinkState::Disconnected);
    assert_eq!(
        next_event(&mut events).await,
        LinkEvent::Disconnected {
            reason: DisconnectReason::Closed
        }
    );
    assert!(opener.written_text().is_empty());
    assert!(!opener.feed_text("TEMP:30\n"), "reader must be gone after close");
}

#[tokio::test]
async fn test_close_when_disconnected_is_a_no_op() {
    let (_opener, link, mut events) = new_link();

    assert_ok!(link.close().await);

    assert_eq!(link.state(), LinkState::Disconnected);
    assert!(events.try_recv().is_err());
}

// ── Read path ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reading_is_extracted_from_noisy_chunk() {
    // Arrange
    let (opener, link, _events) = new_link();
    let mut temperature = link.temperature();
    assert_ok!(link.open(settings()).await);

    // Act
    assert!(opener.feed_text("noise TEMP:23.5 extra"));

    // Assert
    assert_eq!(
        next_reading(&mut temperature).await,
        TemperatureReading::Value("23.5".into())
    );
    assert_ok!(link.close().await);
}

#[tokio::test]
async fn test_tag_split_across_reads_is_reassembled() {
    let (opener, link, _events) = new_link();
    let mut temperature = link.temperature();
    assert_ok!(link.open(settings()).await);

    assert!(opener.feed_text("TE"));
    assert!(opener.feed_text("MP:21.5\n"));

    assert_eq!(
        next_reading(&mut temperature).await,
        TemperatureReading::Value("21.5".into())
    );
    assert_ok!(link.close().await);
}

#[tokio::test]
async fn test_malformed_tag_leaves_reading_unchanged() {
    // Arrange
    let (opener, link, mut events) = new_link();
    let temperature = link.temperature();
    assert_ok!(link.open(settings()).await);
    next_event(&mut events).await;

    // Act – the end-of-stream event proves the chunk was consumed first
    assert!(opener.feed_text("TEMP:abc\r\n"));
    assert!(opener.feed(ReadStep::Eof));

    // Assert
    assert_eq!(
        next_event(&mut events).await,
        LinkEvent::Disconnected {
            reason: DisconnectReason::EndOfStream
        }
    );
    assert!(!temperature.has_changed().unwrap());
    assert_eq!(*temperature.borrow(), TemperatureReading::Unknown);
    assert_eq!(link.state(), LinkState::Disconnected);
}

#[tokio::test]
async fn test_read_failure_ends_session_and_publishes_nothing_more() {
    // Arrange
    let (opener, link, mut events) = new_link();
    let mut temperature = link.temperature();
    assert_ok!(link.open(settings()).await);
    next_event(&mut events).await;
    assert!(opener.feed_text("TEMP:20\n"));
    assert_eq!(
        next_reading(&mut temperature).await,
        TemperatureReading::Value("20".into())
    );

    // Act
    assert!(opener.feed(ReadStep::Fail(io::ErrorKind::BrokenPipe)));

    // Assert
    match next_event(&mut events).await {
        LinkEvent::Disconnected {
            reason: DisconnectReason::ReadFailed(_),
        } => {}
        other => panic!("expected read failure, got {other:?}"),
    }
    assert_eq!(link.state(), LinkState::Disconnected);
    assert!(!opener.feed_text("TEMP:99\n"), "stale reader must not be re-entered");
    assert!(!temperature.has_changed().unwrap());
    assert_eq!(*temperature.borrow(), TemperatureReading::Value("20".into()));
    assert_ok!(link.send_line("AUTO\n"));
    assert!(opener.written_text().is_empty());

    // The user may connect again.
    assert_ok!(link.open(settings()).await);
    assert_eq!(opener.open_count(), 2);
    assert_ok!(link.close().await);
}

#[tokio::test]
async fn test_loopback_port_reads_back_what_was_sent() {
    // Arrange
    let opener = Arc::new(MockPortOpener::loopback());
    let (link, _events) = DeviceLink::new(opener.clone());
    let mut temperature = link.temperature();
    assert_ok!(link.open(settings()).await);

    // Act
    assert_ok!(link.send_line("AUTO\n"));
    assert_ok!(link.send_line("TEMP:22.5\n"));

    // Assert – the echo is read like board output, and nothing is kept
    assert_eq!(
        next_reading(&mut temperature).await,
        TemperatureReading::Value("22.5".into())
    );
    assert!(opener.written_text().is_empty());
    assert!(opener.feed_text("TEMP:23.0\r\n"));
    assert_eq!(
        next_reading(&mut temperature).await,
        TemperatureReading::Value("23.0".into())
    );
    assert_ok!(link.close().await);
}

// ── Panel to wire ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_panel_gestures_reach_the_port_in_order() {
    // Arrange
    let (opener, link, _events) = new_link();
    assert_ok!(link.open(settings()).await);
    let link = Arc::new(link);
    let mut control = ControlLampUseCase::new(link.clone());

    // Act
    assert_ok!(control.handle(PanelGesture::SelectEffect(Effect::Strobe)));
    assert_ok!(control.handle(PanelGesture::SelectMode(Mode::Manual)));
    assert_ok!(control.handle(PanelGesture::SelectEffect(Effect::Breathing)));
    assert_ok!(control.handle(PanelGesture::PickColor(Rgb::new(1, 2, 3))));
    assert_ok!(control.handle(PanelGesture::SelectMode(Mode::Auto)));
    assert_ok!(control.handle(PanelGesture::PickColor(Rgb::new(9, 9, 9))));

    // Assert – gestures in auto mode send nothing
    assert_eq!(
        opener.written_lines(),
        vec!["MANUAL", "EFFECT:BREATH", "RGB:1,2,3", "EFFECT:BREATH", "AUTO"]
    );
    assert_ok!(link.close().await);
}
