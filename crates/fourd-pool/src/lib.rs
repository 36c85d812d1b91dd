//! # fourd-pool
//!
//! Thin connection pool for the 4D SQL server driver.
//!
//! The pool hands out logged-in [`fourd_client::Connection`]s, bounded at a
//! configurable maximum. A handle returned on drop goes back to the idle
//! set when its connection is still live; dead connections are discarded
//! and replaced lazily.
//!
//! ## Example
//!
//! ```rust,ignore
//! use fourd_client::{Config, Params};
//! use fourd_pool::{Pool, PoolConfig};
//!
//! let pool = Pool::new(
//!     Config::new().with_host("db.example.net"),
//!     PoolConfig::new().max_connections(4),
//! );
//!
//! let mut conn = pool.get().await?;
//! let result = conn.query("SELECT * FROM T", &Params::None).await?;
//! // Connection automatically returned to pool on drop.
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod pool;

pub use config::PoolConfig;
pub use error::PoolError;
pub use pool::{Pool, PoolStatus, PooledConnection};
