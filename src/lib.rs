mod buffer;
mod config;
mod error;
mod logger;
mod protocol;
mod pump;
mod registry;
mod transport;
mod types;
mod writer;

pub use buffer::{SetpointBuffer, SetpointSink};
pub use config::Config;
pub use error::{Error, Result};
pub use pump::{S30Sync, SyncBuilder};
pub use registry::HoldScheduleRegistry;
pub use transport::Session;
pub use types::*;
pub use writer::{HoldArmMethod, SetpointWriter, WriteOutcome};
