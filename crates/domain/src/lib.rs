pub mod entities;
pub mod errors;
pub mod ports;
pub mod repositories;
pub mod snapshot;

pub use entities::*;
pub use errors::{OpsError, OpsResult, GENERIC_DISPATCH_FAILURE, POLL_TIMEOUT_DIAGNOSTIC};
pub use ports::*;
pub use repositories::*;
pub use snapshot::*;
