//! Shared testing utilities for the clusterops workspace.
//!
//! Provides in-memory mock implementations of the collaborator ports
//! and the task log repository, plus builders for test entities. Add as
//! a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! clusterops-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;
