//! The Graph Store (C1): schema, storage engine, migrations, vector
//! index, and the typed query surface built on top of it.

pub mod migrations;
pub mod query;
pub mod schema;
pub mod store;
pub mod vector_index;

pub use query::{execute, GraphQuery, QueryRows};
pub use schema::*;
pub use store::{open, GraphStore, InMemoryGraphStore, TxHandle, WriteBatch};
pub use vector_index::{VectorHit, VectorIndex};
