//! Stream dispatch for the rules stage.
//!
//! 1. **Classification** (`classify`): `RawEvent` -> rule path or work item
//! 2. **Dispatchers** (`dispatcher`, `batch`): per-mode request handling
//! 3. **Driver** (`stream`): the per-stream loop with phase timing
//! 4. **Concurrency** (`pool`): bounded number of active streams
//! 5. **Background workers** (`worker`, `aggregate`): server-wide metrics

pub mod aggregate;
pub mod batch;
pub mod classify;
pub mod config;
pub mod dispatcher;
pub mod operation;
pub mod pool;
pub mod stage;
pub mod stream;
pub mod worker;

pub use aggregate::{AggregateSnapshot, MetricsAggregator, SnapshotHandle, StreamClosed};
pub use batch::BatchDispatcher;
pub use classify::{classify, ClassifiedEvent};
pub use config::StageConfig;
pub use dispatcher::EventDispatcher;
pub use operation::{DispatchError, DispatchState, StreamMode, StreamReport};
pub use pool::{StreamPermit, StreamPool};
pub use stage::Stage;
pub use stream::{run_stream, StreamHandler};
pub use worker::{BackgroundRunnable, BackgroundWorker, TaskSender};
