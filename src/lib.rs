mod control;
mod diff;
mod error;
mod host;
mod logger;
mod protocol;
mod types;

pub use control::{NumberValueControl, NumberValueControlBuilder};
pub use diff::{evaluate, ChangedField, GateDecision};
pub use error::{Error, Result};
pub use host::{EntityPredicates, FormatResolver, HassFormats, HassPredicates};
pub use logger::{ProbeLogMode, DEFAULT_DIAG_INTERVAL};
pub use protocol::{service_domain, ServiceCall, SERVICE_SET_VALUE};
pub use types::*;
