//! # fourd-client
//!
//! High-level async client for the 4D SQL server's line-based TCP protocol.
//!
//! This is the primary public API surface for the rust-4d-driver project.
//! A [`Connection`] owns one TCP session: it logs in on establishment,
//! substitutes statement parameters, executes statements, and transparently
//! drives FETCH-RESULT pagination until a result set is complete.
//!
//! ## Example
//!
//! ```rust,ignore
//! use fourd_client::{Config, Connection, Params};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new()
//!         .with_host("db.example.net")
//!         .with_credentials("Administrator", "");
//!
//!     let mut conn = Connection::connect(config).await?;
//!
//!     let result = conn
//!         .query(
//!             "SELECT * FROM Artikel WHERE Omschrijving LIKE $0",
//!             &Params::positional(["Noppies%"]),
//!         )
//!         .await?;
//!
//!     for row in &result.rows {
//!         println!("{:?}", row.get_str("Omschrijving"));
//!     }
//!
//!     conn.close().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod result;
pub mod statement;

pub use config::{Config, TimeoutConfig};
pub use connection::Connection;
pub use error::{Error, Result};
pub use result::{ResultSet, Row};
pub use statement::{Param, Params};

pub use fourd_protocol::header::{ColumnDef, ResultKind, ServerError};
pub use fourd_protocol::types::{Value, WireType};
