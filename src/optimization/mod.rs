//! Optimization Substrate (C6): the bloom filter, LRU cache, heat
//! tracker, bounded worker pool, and batched writer that sit between
//! the retriever/writer and the graph store's raw storage.

pub mod batched_writer;
pub mod bloom;
pub mod heat_tracker;
pub mod lru;
pub mod worker_pool;

pub use batched_writer::BatchedWriter;
pub use bloom::{BloomFilter, EntityFilter};
pub use heat_tracker::{AccessPattern, HeatTracker, Trend};
pub use lru::{CacheStats, LruCache};
pub use worker_pool::{WorkerPool, WorkerPoolStats};
