//! # fourd-testing
//!
//! Test infrastructure for 4D SQL driver development.
//!
//! This crate provides a mock 4D SQL server for driver tests: it speaks
//! the real wire protocol over TCP (textual header blocks, binary row
//! runs, FETCH-RESULT pagination) against configurable canned responses,
//! so no database instance is required.
//!
//! The driver's end-to-end tests live in this crate's `tests/` directory;
//! keeping them here avoids a circular dev-dependency between the client
//! and its test server.
//!
//! ## Example
//!
//! ```rust,ignore
//! use fourd_testing::{Mock4dServer, MockColumn, MockResponse, MockValue, config_for};
//!
//! #[tokio::test]
//! async fn test_with_mock_server() {
//!     let server = Mock4dServer::builder()
//!         .with_response(
//!             "SELECT * FROM users",
//!             MockResponse::result_set(
//!                 vec![MockColumn::long("id"), MockColumn::string("name")],
//!                 vec![vec![MockValue::Long(1), MockValue::Text("Alice".into())]],
//!             ),
//!         )
//!         .build()
//!         .await
//!         .unwrap();
//!
//!     let mut conn = fourd_client::Connection::connect(config_for(&server)).await.unwrap();
//!     // ...
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod fixtures;
pub mod mock_server;

pub use fixtures::config_for;
pub use mock_server::{
    Mock4dServer, MockColumn, MockResponse, MockServerBuilder, MockServerConfig, MockServerError,
    MockValue,
};
