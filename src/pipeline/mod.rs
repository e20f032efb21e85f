//! The running stream-to-reading pipeline.
//!
//! A session pulls chunks from a [`ByteSource`], frames and parses them,
//! converts each reading into the current target unit, drops repeats of the
//! last value and hands the rest to a [`Debouncer`] that delivers to the
//! subscriber.

pub mod config;
pub mod debounce;
pub mod session;
pub mod source;

// Re-export commonly used items
pub use config::PipelineConfig;
pub use debounce::Debouncer;
pub use session::{Session, SessionHandle, SessionState, SessionStats, StreamPipeline};
pub use source::{ByteSource, ChannelSource, ReaderSource};
