/*!
 * Reporting and Reading
 *
 * The value stored under the IP key is a JSON envelope:
 *
 * ```text
 * {"reportTime":1700000000,"IP":"192.168.1.10"}
 * ```
 *
 * A value that is just a dotted-quad string is still read, as written by
 * older reporters that stored the bare address with no timestamp.
 */

use crate::error::{Error, Result, StoreFault};
use crate::store::KeyValueStore;
use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// What gets written to, and read back from, the IP key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    /// Unix seconds at write time; `None` only for legacy bare-address values
    #[serde(rename = "reportTime", default, skip_serializing_if = "Option::is_none")]
    pub report_time: Option<i64>,
    #[serde(rename = "IP")]
    pub ip: Ipv4Addr,
}

impl ReportRecord {
    pub fn new(ip: Ipv4Addr, report_time: i64) -> Self {
        Self {
            report_time: Some(report_time),
            ip,
        }
    }

    /// Canonical JSON encoding
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Error::Serialization)
    }

    /// Decode a stored value: the JSON envelope, or a bare legacy address
    pub fn decode(raw: &[u8]) -> Result<ReportRecord> {
        let json_err = match serde_json::from_slice::<ReportRecord>(raw) {
            Ok(rec) => return Ok(rec),
            Err(e) => e,
        };

        let legacy = std::str::from_utf8(raw)
            .ok()
            .and_then(|s| s.trim().parse::<Ipv4Addr>().ok());
        match legacy {
            Some(ip) => Ok(ReportRecord {
                report_time: None,
                ip,
            }),
            None => Err(Error::Deserialization {
                value: String::from_utf8_lossy(raw).into_owned(),
                reason: json_err.to_string(),
            }),
        }
    }
}

impl fmt::Display for ReportRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let local = self
            .report_time
            .and_then(|t| Local.timestamp_opt(t, 0).single());
        match local {
            Some(t) => write!(f, "Time: {}\t\t\tIP: {}", t.format("%Y-%m-%d %H:%M:%S %z"), self.ip),
            None => write!(f, "Time: unknown\t\t\tIP: {}", self.ip),
        }
    }
}

/// Current wall-clock time in unix seconds
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Publish `ip` under `key`, stamped with the current time
pub fn report<S: KeyValueStore + ?Sized>(store: &S, key: &str, ip: Ipv4Addr) -> Result<ReportRecord> {
    report_at(store, key, ip, now_unix())
}

/// Publish `ip` under `key` with an explicit timestamp. Overwrites any prior value.
pub fn report_at<S: KeyValueStore + ?Sized>(
    store: &S,
    key: &str,
    ip: Ipv4Addr,
    report_time: i64,
) -> Result<ReportRecord> {
    let rec = ReportRecord::new(ip, report_time);
    let bytes = rec.encode()?;

    store.set(key, &bytes)?;
    log::info!("set {} to {} successfully", key, rec.ip);
    Ok(rec)
}

/// Read back the record published under `key`
///
/// # Errors
/// * `StoreRead` - the key does not exist, or the read failed
/// * `StoreConnect` - the store could not be reached
/// * `Deserialization` - the stored value is neither encoding
pub fn read<S: KeyValueStore + ?Sized>(store: &S, key: &str) -> Result<ReportRecord> {
    let raw = store.get(key)?.ok_or_else(|| Error::StoreRead {
        key: key.to_string(),
        source: StoreFault::KeyMissing,
    })?;
    ReportRecord::decode(&raw)
}

/// Which of the two flows a run performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Resolve the local address and publish it
    Server,
    /// Read back the last published address
    Client,
}

impl Mode {
    /// `--server` selects [`Mode::Server`]; its absence selects [`Mode::Client`]
    pub fn from_flag(server: bool) -> Mode {
        if server {
            Mode::Server
        } else {
            Mode::Client
        }
    }
}

/// Perform one run in `mode` against `store`.
///
/// `resolve` supplies the local address and is only called in server mode.
/// Returns the record written (server) or read (client).
pub fn run<S, F>(mode: Mode, store: &S, key: &str, resolve: F) -> Result<ReportRecord>
where
    S: KeyValueStore + ?Sized,
    F: FnOnce() -> Result<Ipv4Addr>,
{
    match mode {
        Mode::Server => {
            log::info!("server mode");
            let ip = resolve()?;
            log::info!("Local IP: {}", ip);
            report(store, key, ip)
        }
        Mode::Client => {
            log::info!("client mode, read ip from store");
            let rec = read(store, key)?;
            log::info!("Ret: {}", rec);
            Ok(rec)
        }
    }
}
