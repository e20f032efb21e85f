//! Session lifecycle and the chunk-processing loop.

use crate::error::{Result, StreamError};
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::debounce::Debouncer;
use crate::pipeline::source::ByteSource;
use crate::reading::{convert, parse, ConvertedValue, LineFramer, UnitSignal};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Lifecycle state of the pipeline's current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No byte source attached
    Idle,
    /// Reading chunks and delivering values
    Open,
    /// Tearing down: pending delivery cancelled, no further reads
    Closing,
}

/// Counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Chunks received from the source
    pub chunks: u64,
    /// Complete lines framed
    pub lines: u64,
    /// Lines rejected by the parser
    pub malformed: u64,
    /// Readings dropped as repeats of the last value
    pub duplicates: u64,
    /// Values handed to the debouncer
    pub submitted: u64,
}

/// Composes framing, parsing, conversion, duplicate suppression and debounce
/// over one byte source at a time.
pub struct StreamPipeline {
    config: PipelineConfig,
    units: UnitSignal,
    state: Arc<watch::Sender<SessionState>>,
}

impl StreamPipeline {
    /// Create a pipeline that converts into whatever `units` reports at the
    /// moment each reading arrives.
    pub fn new(config: PipelineConfig, units: UnitSignal) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            config,
            units,
            state: Arc::new(state),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch session state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Start a session over an already-open `source`, delivering debounced
    /// values to `subscriber`.
    ///
    /// Fails if a session is already running or if called outside a tokio
    /// runtime.
    pub fn open<S, F>(&self, source: S, subscriber: F) -> Result<Session>
    where
        S: ByteSource + 'static,
        F: Fn(ConvertedValue) + Send + Sync + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| StreamError::session_error(format!("No tokio runtime: {}", e)))?;

        let opened = self.state.send_if_modified(|state| {
            if *state == SessionState::Idle {
                *state = SessionState::Open;
                true
            } else {
                false
            }
        });
        if !opened {
            return Err(StreamError::session_error(format!(
                "Session already running ({:?})",
                self.state()
            )));
        }

        let (closed, _) = watch::channel(false);
        let handle = SessionHandle {
            closed: Arc::new(closed),
            debouncer: Debouncer::new(),
        };

        let worker = SessionWorker {
            source,
            framer: LineFramer::new(),
            last_value: None,
            debouncer: handle.debouncer.clone(),
            units: self.units.clone(),
            config: self.config.clone(),
            subscriber: Arc::new(subscriber),
            stats: SessionStats::default(),
        };

        info!(
            "Session opened (debounce {}ms, duplicate suppression {})",
            self.config.debounce_ms, self.config.suppress_duplicates
        );
        let task = runtime.spawn(worker.run(Arc::clone(&handle.closed), Arc::clone(&self.state)));

        Ok(Session { handle, task })
    }

    /// Run a session to completion.
    pub async fn run<S, F>(&self, source: S, subscriber: F) -> Result<SessionStats>
    where
        S: ByteSource + 'static,
        F: Fn(ConvertedValue) + Send + Sync + 'static,
    {
        self.open(source, subscriber)?.join().await
    }
}

/// A running session.
#[derive(Debug)]
pub struct Session {
    handle: SessionHandle,
    task: JoinHandle<Result<SessionStats>>,
}

impl Session {
    /// A cloneable handle that can close this session from anywhere.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Wait for the session to end on its own (end of stream or read failure).
    pub async fn join(self) -> Result<SessionStats> {
        self.task
            .await
            .map_err(|e| StreamError::session_error(format!("Session task failed: {}", e)))?
    }

    /// Close the session and wait for teardown to finish.
    pub async fn close(self) -> Result<SessionStats> {
        self.handle.close();
        self.join().await
    }
}

/// Closes a session. Safe to call from any task, at any time, repeatedly.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    closed: Arc<watch::Sender<bool>>,
    debouncer: Debouncer,
}

impl SessionHandle {
    /// Stop the session. Once this returns the subscriber receives nothing
    /// more from it, including any delivery that was pending. The subscriber
    /// itself may call this.
    pub fn close(&self) {
        self.debouncer.shutdown();
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// Resolves once the session is marked closed. The worker keeps the sender
/// alive, so this never resolves for any other reason.
async fn wait_closed(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|closed| *closed).await;
}

struct SessionWorker<S, F> {
    source: S,
    framer: LineFramer,
    last_value: Option<ConvertedValue>,
    debouncer: Debouncer,
    units: UnitSignal,
    config: PipelineConfig,
    subscriber: Arc<F>,
    stats: SessionStats,
}

impl<S, F> SessionWorker<S, F>
where
    S: ByteSource,
    F: Fn(ConvertedValue) + Send + Sync + 'static,
{
    async fn run(
        mut self,
        closed: Arc<watch::Sender<bool>>,
        state: Arc<watch::Sender<SessionState>>,
    ) -> Result<SessionStats> {
        let mut close_rx = closed.subscribe();

        let outcome = loop {
            tokio::select! {
                biased;

                _ = wait_closed(&mut close_rx) => {
                    info!("Session closed by owner");
                    break Ok(());
                }
                read = self.source.read_chunk() => match read {
                    Ok(Some(chunk)) => self.process_chunk(&chunk),
                    Ok(None) => {
                        info!("Stream closed");
                        break Ok(());
                    }
                    Err(e) => {
                        error!("Error reading data: {}", e);
                        break Err(StreamError::SourceRead(e));
                    }
                },
            }
        };

        state.send_replace(SessionState::Closing);
        self.debouncer.shutdown();
        if let Err(e) = self.source.close().await {
            warn!("Failed to close byte source: {}", e);
        }
        self.framer.reset();
        self.last_value = None;
        state.send_replace(SessionState::Idle);

        info!(
            "Session ended: {} lines, {} malformed, {} duplicates, {} submitted",
            self.stats.lines, self.stats.malformed, self.stats.duplicates, self.stats.submitted
        );
        outcome.map(|()| self.stats)
    }

    fn process_chunk(&mut self, chunk: &str) {
        self.stats.chunks += 1;
        trace!("Received chunk of {} bytes", chunk.len());

        let lines = self.framer.feed(chunk);
        for line in lines {
            self.process_line(&line);
        }
    }

    fn process_line(&mut self, line: &str) {
        self.stats.lines += 1;

        let reading = match parse(line) {
            Ok(reading) => reading,
            Err(e) => {
                self.stats.malformed += 1;
                warn!("Invalid data: {}", e);
                return;
            }
        };

        let unit = self.units.current();
        let value = convert(reading.value, unit);
        if !value.is_finite() {
            self.stats.malformed += 1;
            warn!("Invalid data: {} is out of range in {}", line, unit);
            return;
        }
        let converted = ConvertedValue::new(value, unit);

        if self.config.suppress_duplicates && self.last_value == Some(converted) {
            self.stats.duplicates += 1;
            trace!("Dropping repeated value {}", converted);
            return;
        }

        debug!("Accepted {}", converted);
        self.last_value = Some(converted);
        self.stats.submitted += 1;

        let subscriber = Arc::clone(&self.subscriber);
        self.debouncer
            .submit(converted, self.config.debounce(), move |value| (*subscriber)(value));
    }
}
