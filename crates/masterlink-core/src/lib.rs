pub mod config;
pub mod logging;

pub mod cache;
pub mod connector;
pub mod control;
pub mod factory;
pub mod identity;
pub mod memory;
pub mod remote;
pub mod retry;
pub mod service;
pub mod transport;

mod session;

pub use cache::{ConnectorCache, IdentityKey};
pub use connector::{Connector, LinkSettings};
pub use control::{CallControl, CancelToken};
pub use factory::ConnectorFactory;
pub use identity::{Credential, Identity};
pub use remote::RecordKey;
pub use retry::{LinkError, LinkErrorKind, RetryPolicy};
pub use service::{IntService, Service, ServiceKey, StrService};
