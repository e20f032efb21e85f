use std::io;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use thermolog::{
    unit_channel, ChannelSource, ConvertedValue, PipelineConfig, ReaderSource, SessionState,
    SessionHandle, StreamError, StreamPipeline, Unit, UnitSignal,
};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

const WINDOW_MS: u64 = 50;

fn settle() -> Duration {
    Duration::from_millis(WINDOW_MS * 3)
}

fn recorder() -> (
    Arc<Mutex<Vec<ConvertedValue>>>,
    impl Fn(ConvertedValue) + Send + Sync + 'static,
) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |value: ConvertedValue| sink.lock().unwrap().push(value))
}

fn values(seen: &Arc<Mutex<Vec<ConvertedValue>>>) -> Vec<f64> {
    seen.lock().unwrap().iter().map(|v| v.value).collect()
}

fn native_pipeline() -> StreamPipeline {
    StreamPipeline::new(
        PipelineConfig::default().with_debounce_ms(WINDOW_MS),
        UnitSignal::fixed(Unit::Celsius),
    )
}

async fn send(tx: &mpsc::Sender<String>, chunk: &str) {
    tx.send(chunk.to_string()).await.unwrap();
}

/// Repeats are dropped before they reach the debouncer
#[tokio::test(start_paused = true)]
async fn test_duplicate_suppression_spaced_chunks() {
    let pipeline = native_pipeline();
    let (tx, source) = ChannelSource::pair(8);
    let (seen, subscriber) = recorder();
    let session = pipeline.open(source, subscriber).unwrap();

    for chunk in ["23.5\r\n", "23.5\r\n", "23.6\r\n"] {
        send(&tx, chunk).await;
        sleep(settle()).await;
    }
    drop(tx);

    let stats = session.join().await.unwrap();
    assert_eq!(values(&seen), vec![23.5, 23.6]);
    assert_eq!(stats.lines, 3);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(stats.submitted, 2);
}

/// A single burst collapses into the latest value
#[tokio::test(start_paused = true)]
async fn test_burst_in_one_chunk_delivers_latest() {
    let pipeline = native_pipeline();
    let (tx, source) = ChannelSource::pair(8);
    let (seen, subscriber) = recorder();
    let session = pipeline.open(source, subscriber).unwrap();

    send(&tx, "23.5\r\n23.5\r\n23.6\r\n").await;
    sleep(settle()).await;
    drop(tx);

    let stats = session.join().await.unwrap();
    assert_eq!(stats.submitted, 2);
    assert_eq!(stats.duplicates, 1);
    assert_eq!(values(&seen), vec![23.6]);
}

/// Values split across chunks mid-number and mid-terminator
#[tokio::test(start_paused = true)]
async fn test_fragmented_stream() {
    let pipeline = native_pipeline();
    let (tx, source) = ChannelSource::pair(8);
    let (seen, subscriber) = recorder();
    let session = pipeline.open(source, subscriber).unwrap();

    for chunk in ["2", "3.", "5\r", "\n"] {
        send(&tx, chunk).await;
    }
    sleep(settle()).await;
    for chunk in ["24", ".1\r\n"] {
        send(&tx, chunk).await;
    }
    sleep(settle()).await;
    drop(tx);

    session.join().await.unwrap();
    assert_eq!(values(&seen), vec![23.5, 24.1]);
}

/// Malformed lines are skipped, zero and negative values are readings
#[tokio::test(start_paused = true)]
async fn test_malformed_lines_skipped() {
    let pipeline = native_pipeline();
    let (tx, source) = ChannelSource::pair(8);
    let (seen, subscriber) = recorder();
    let session = pipeline.open(source, subscriber).unwrap();

    for chunk in ["hello\r\n0\r\n", "\r\n", "23.5 ok\r\n-4.25\r\n"] {
        send(&tx, chunk).await;
        sleep(settle()).await;
    }
    drop(tx);

    let stats = session.join().await.unwrap();
    assert_eq!(values(&seen), vec![0.0, -4.25]);
    assert_eq!(stats.malformed, 3);
    assert_eq!(stats.lines, 5);
}

/// The unit is read at conversion time, not at session start
#[tokio::test(start_paused = true)]
async fn test_unit_change_mid_stream() {
    let (units, signal) = unit_channel(Unit::Celsius);
    let pipeline = StreamPipeline::new(PipelineConfig::default().with_debounce_ms(WINDOW_MS), signal);
    let (tx, source) = ChannelSource::pair(8);
    let (seen, subscriber) = recorder();
    let session = pipeline.open(source, subscriber).unwrap();

    send(&tx, "100\r\n").await;
    sleep(settle()).await;
    units.set(Unit::Fahrenheit);
    send(&tx, "100\r\n").await;
    sleep(settle()).await;
    drop(tx);

    session.join().await.unwrap();
    let delivered = seen.lock().unwrap().clone();
    assert_eq!(
        delivered,
        vec![
            ConvertedValue::new(100.0, Unit::Celsius),
            ConvertedValue::new(212.0, Unit::Fahrenheit),
        ]
    );
}

/// Closing with a delivery pending means it is never delivered
#[tokio::test(start_paused = true)]
async fn test_teardown_cancels_pending_delivery() {
    let pipeline = native_pipeline();
    let mut state = pipeline.subscribe_state();
    let (tx, source) = ChannelSource::pair(8);
    let (seen, subscriber) = recorder();
    let session = pipeline.open(source, subscriber).unwrap();
    let handle = session.handle();

    send(&tx, "23.5\r\n").await;
    sleep(Duration::from_millis(WINDOW_MS / 5)).await;
    handle.close();
    sleep(settle()).await;

    assert!(seen.lock().unwrap().is_empty());
    let stats = session.join().await.unwrap();
    assert_eq!(stats.submitted, 1);

    state.wait_for(|s| *s == SessionState::Idle).await.unwrap();
    assert_eq!(pipeline.state(), SessionState::Idle);

    // Chunks sent after close go nowhere
    assert!(tx.send("24.0\r\n".to_string()).await.is_err());
}

/// A new session starts with no last value and an empty buffer
#[tokio::test(start_paused = true)]
async fn test_restart_clears_session_state() {
    let pipeline = native_pipeline();
    let (seen, subscriber) = recorder();
    let subscriber = Arc::new(subscriber);

    let (tx, source) = ChannelSource::pair(8);
    let sink = Arc::clone(&subscriber);
    let session = pipeline.open(source, move |v| (*sink)(v)).unwrap();
    send(&tx, "23.5\r\n99").await;
    sleep(settle()).await;
    session.close().await.unwrap();

    let (tx, source) = ChannelSource::pair(8);
    let sink = Arc::clone(&subscriber);
    let session = pipeline.open(source, move |v| (*sink)(v)).unwrap();
    send(&tx, "23.5\r\n").await;
    sleep(settle()).await;
    drop(tx);
    session.join().await.unwrap();

    assert_eq!(values(&seen), vec![23.5, 23.5]);
}

/// Duplicate suppression can be switched off
#[tokio::test(start_paused = true)]
async fn test_keep_duplicates() {
    let pipeline = StreamPipeline::new(
        PipelineConfig::default()
            .with_debounce_ms(WINDOW_MS)
            .with_duplicate_suppression(false),
        UnitSignal::fixed(Unit::Celsius),
    );
    let (tx, source) = ChannelSource::pair(8);
    let (seen, subscriber) = recorder();
    let session = pipeline.open(source, subscriber).unwrap();

    for _ in 0..2 {
        send(&tx, "21\r\n").await;
        sleep(settle()).await;
    }
    drop(tx);

    let stats = session.join().await.unwrap();
    assert_eq!(stats.duplicates, 0);
    assert_eq!(values(&seen), vec![21.0, 21.0]);
}

/// A read failure ends the session and is surfaced to the owner
#[tokio::test]
async fn test_read_failure_ends_session() {
    let pipeline = StreamPipeline::new(
        PipelineConfig::default().with_debounce_ms(10_000),
        UnitSignal::fixed(Unit::Celsius),
    );
    let mock = tokio_test::io::Builder::new()
        .read(b"23.5\r\n")
        .read_error(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
        .build();
    let (seen, subscriber) = recorder();

    let err = pipeline
        .run(ReaderSource::new(mock), subscriber)
        .await
        .unwrap_err();

    assert!(matches!(err, StreamError::SourceRead(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
    assert_eq!(pipeline.state(), SessionState::Idle);
    // The pending value belonged to the failed session
    sleep(Duration::from_millis(20)).await;
    assert!(seen.lock().unwrap().is_empty());
}

/// End of stream is an orderly teardown, not an error
#[tokio::test(start_paused = true)]
async fn test_end_of_stream_from_reader() {
    let pipeline = native_pipeline();
    let mock = tokio_test::io::Builder::new()
        .read(b"23.5\r")
        .read(b"\n24")
        .read(b".1\r\n")
        .build();
    let (seen, subscriber) = recorder();

    let stats = pipeline.run(ReaderSource::new(mock), subscriber).await.unwrap();
    assert_eq!(stats.chunks, 3);
    assert_eq!(stats.submitted, 2);
    assert_eq!(pipeline.state(), SessionState::Idle);
    // Stream ended inside the debounce window, so the last value is not delivered
    sleep(settle()).await;
    assert!(seen.lock().unwrap().is_empty());
}

/// A subscriber may close its own session from inside the delivery
#[tokio::test(start_paused = true)]
async fn test_subscriber_closes_its_own_session() {
    let pipeline = native_pipeline();
    let (tx, source) = ChannelSource::pair(8);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let own_handle: Arc<OnceLock<SessionHandle>> = Arc::new(OnceLock::new());

    let sink = Arc::clone(&seen);
    let closer = Arc::clone(&own_handle);
    let session = pipeline
        .open(source, move |value: ConvertedValue| {
            sink.lock().unwrap().push(value);
            if let Some(handle) = closer.get() {
                handle.close();
            }
        })
        .unwrap();
    own_handle.set(session.handle()).unwrap();

    send(&tx, "23.5\r\n").await;
    let stats = timeout(Duration::from_secs(3), session.join())
        .await
        .expect("session should end after the subscriber closes it")
        .unwrap();

    assert_eq!(values(&seen), vec![23.5]);
    assert_eq!(stats.submitted, 1);
    assert_eq!(pipeline.state(), SessionState::Idle);
    assert!(tx.send("24.0\r\n".to_string()).await.is_err());
}

/// Readings whose conversion leaves the f64 range are dropped as invalid
#[tokio::test(start_paused = true)]
async fn test_out_of_range_conversion_is_skipped() {
    let pipeline = StreamPipeline::new(
        PipelineConfig::default().with_debounce_ms(WINDOW_MS),
        UnitSignal::fixed(Unit::Fahrenheit),
    );
    let (tx, source) = ChannelSource::pair(8);
    let (seen, subscriber) = recorder();
    let session = pipeline.open(source, subscriber).unwrap();

    for chunk in ["1e308\r\n", "1e307\r\n"] {
        send(&tx, chunk).await;
        sleep(settle()).await;
    }
    drop(tx);

    let stats = session.join().await.unwrap();
    assert_eq!(stats.malformed, 1);
    let delivered = values(&seen);
    assert_eq!(delivered.len(), 1);
    assert!((delivered[0] / 1.8e307 - 1.0).abs() < 1e-12);
}

/// With a zero window a capture read in one go is delivered in full
#[tokio::test]
async fn test_zero_window_delivers_whole_capture() {
    let pipeline = StreamPipeline::new(
        PipelineConfig::default().with_debounce_ms(0),
        UnitSignal::fixed(Unit::Celsius),
    );
    let mock = tokio_test::io::Builder::new()
        .read(b"23.5\r\n23.5\r\n23.6\r\n24.1\r\n")
        .build();
    let (seen, subscriber) = recorder();

    let stats = pipeline.run(ReaderSource::new(mock), subscriber).await.unwrap();
    assert_eq!(stats.duplicates, 1);
    assert_eq!(values(&seen), vec![23.5, 23.6, 24.1]);
}
