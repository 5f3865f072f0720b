//! # socrata-publisher
//!
//! Client library for the Socrata publisher API: create datasets, import
//! files into them, copy and publish them, and read or write their rows.
//!
//! Long-running server jobs (imports, copies, publishing) are driven by a
//! ticket-polling loop with a configurable interval, a deadline and a
//! cancellation token. Rows are keyed by column id in memory and mapped to
//! the service's derived field names at the boundary.
//!
//! ```no_run
//! use socrata_publisher::{SocrataClient, config::load_config};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config(None, None)?;
//! let client = SocrataClient::from_config(&config)?;
//! let view = client.find_view("abcd-1234").await?;
//! let published = client.publish(&view).await?;
//! println!("published as {:?}", published.id);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod response;
pub mod strings;
pub mod transport;
pub mod workflow;

pub use client::SocrataClient;
pub use config::{SocrataConfig, load_config};
pub use error::{FailureKind, Result, SocrataError};
pub use model::{Blueprint, BulkResult, Column, NewRow, Row, View, rows_from_records};
pub use response::Outcome;
pub use transport::{HttpTransport, Request, Response, ScriptedTransport, Transport};
pub use workflow::imports::ImportMode;
pub use workflow::publication::CopyMethod;
pub use workflow::{Completed, PollPolicy, TicketPoller};
