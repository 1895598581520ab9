//! Incremental static site deploys to a hosting REST API.
//!
//! Local files are gzipped and addressed by the SHA-256 of the compressed
//! bytes. The file set of a new version is the local tree merged over the
//! live manifest, and only the payloads the backend does not hold yet are
//! uploaded before the version is finalized and released.

pub mod auth;
pub mod client;
pub mod collector;
pub mod config;
pub mod error;
pub mod hash;
pub mod manifest;
pub mod protocol;
pub mod session;

pub use error::{DeployError, DeployResult};
pub use session::{DeployReport, DeploySession};
