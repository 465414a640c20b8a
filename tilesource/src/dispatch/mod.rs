//! Worker dispatch: actor handles, messages and the worker pool.
//!
//! # Architecture
//!
//! ```text
//! TileCoordinator ──► Dispatcher::get_actor() ──► Actor (mailbox handle)
//!                                                   │  Envelope
//!                                                   ▼
//!                                          Worker task (one per actor)
//!                                            ├─ fetch (unless bytes supplied)
//!                                            └─ decode on blocking pool
//!                                                   │  WorkerReply
//!                                                   ▼
//!                                          oneshot back to the coordinator
//! ```

mod actor;
mod decoder;
mod message;
mod pool;
mod worker;

pub use actor::{Actor, ActorId, Dispatcher};
pub use decoder::{DecodedTile, PassthroughDecoder, TileDecoder};
pub use message::{
    Envelope, ResourceTiming, TileParams, WorkerMessage, WorkerReply, WorkerTileResult,
};
pub use pool::{
    default_worker_count, WorkerPool, WorkerPoolConfig, DEFAULT_CHANNEL_CAPACITY,
    MAX_DEFAULT_WORKERS,
};
pub use worker::WorkerContext;

#[cfg(test)]
pub use actor::tests::RecordingDispatcher;
