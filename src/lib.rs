// Core modules for report_ip
pub mod error; // Error taxonomy + exit codes
pub mod config; // YAML config loading and validation
pub mod resolver; // first non-loopback IPv4 address
pub mod protocol; // RESP command encoder + reply parser
pub mod store; // KeyValueStore trait + lazily connected StoreClient
pub mod report; // ReportRecord + report/read

pub use config::{Config, RedisConfig};
pub use error::{Error, Result, StoreFault};
pub use protocol::{Cmd, Reply};
pub use report::{read, report, report_at, run, Mode, ReportRecord};
pub use resolver::{local_ipv4, select_ipv4};
pub use store::{KeyValueStore, StoreClient};
