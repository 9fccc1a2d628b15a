// Progress reporting
//
// - sinks.rs: ProgressEvent, the ProgressSink seam and the non-terminal sinks
// - progress.rs: terminal progress bar used by the CLI

pub mod progress;
pub mod sinks;


pub use progress::{human_bytes, ProgressBar, TerminalProgress};
pub use sinks::{
    progress_channel, Fanout, NullProgress, ProgressEvent, ProgressFile, ProgressPublisher,
    ProgressReceiver, ProgressSink,
};
