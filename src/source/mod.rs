// ABOUTME: Local side of a deployment: the git working tree and its build context.
// ABOUTME: Exposes source acquisition and Dockerfile discovery.

mod acquire;
mod context;
mod error;

pub use acquire::{Checkout, SourceRequest, acquire, acquire_blocking};
pub use context::{BUILD_FILE, BuildContext, locate, parse_exposed_port};
pub use error::{AcquisitionError, NoBuildContextError};
