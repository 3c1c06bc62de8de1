//! SQLite persistence for the tile cache.
//!
//! The store holds the four layer tables, the Tile Completion Index and the
//! [`SessionPool`] through which every read and write is made.

mod pool;
mod schema;
mod tiles;

pub use pool::{PoolConfig, PoolError, Session, SessionPool};
pub use schema::{SCHEMA_VERSION, SchemaError, initialise_schema};
pub use tiles::{
    IndexError, complete_if_covered, is_complete, layers_present, load_tile, record_layer,
};
