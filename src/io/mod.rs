//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `relay` - the role-based relay broker (TCP listener + registry)
//! - `relay_client` - reconnecting relay connection for both peers
//! - `feed` - TCP listener for tracker frames (JSON lines)
//! - `wire` - state message codec (`zone_<name>=<0|1>` tokens)
//! - `output` - boolean output drivers (log, sysfs-style file)

pub mod feed;
pub mod output;
pub mod relay;
pub mod relay_client;
pub mod wire;

// Re-export commonly used types
pub use feed::{start_feed_listener, FeedListenerConfig};
pub use output::{FileOutput, LogOutput, OutputDriver};
pub use relay::RelayServer;
pub use relay_client::{ClientEvent, RelayClient, RelayClientConfig};
