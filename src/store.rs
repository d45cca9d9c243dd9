/*!
 * Store Client
 *
 * A blocking RESP client holding at most one TCP connection to the
 * store. The connection is opened on first use, reused for every later
 * call, and dropped after an I/O failure so the next call starts fresh.
 * Connecting is bounded by the configured timeout, and so is each whole
 * command round trip, however slowly the reply trickles in.
 */

use crate::config::RedisConfig;
use crate::error::{Error, Result, StoreFault};
use crate::protocol::{parse_reply, Cmd, Reply};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// Size of read buffer for incoming replies
const READ_BUF: usize = 4096;

/// The two operations Reporter and Reader need from a store
pub trait KeyValueStore {
    /// Overwrite `key` with `value`, no expiry
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Current value at `key`, `None` if the key does not exist
    fn get(&self, key: &str) -> Result<Option<Bytes>>;
}

/// Lazily connected client for a Redis-compatible store
pub struct StoreClient {
    addr: String,
    timeout: Duration,
    password: Option<String>,
    db: i64,
    conn: Mutex<Option<Connection>>,
}

/// One open socket plus the bytes read but not yet parsed
struct Connection {
    sock: TcpStream,
    timeout: Duration,
    rbuf: BytesMut,
    wbuf: BytesMut,
}

impl StoreClient {
    /// Build a client; no connection is made until the first command
    pub fn new(conf: &RedisConfig) -> Self {
        Self {
            addr: conf.address(),
            timeout: Duration::from_millis(conf.timeout_ms),
            password: conf.password.clone(),
            db: conf.db,
            conn: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Whether a connection is currently held
    pub fn is_connected(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Run one command, connecting first if needed.
    ///
    /// The outer `Result` carries connection setup failures; the inner one
    /// carries failures of the command itself, left for the caller to tag
    /// with the key it was working on.
    fn request(&self, cmd: &Cmd) -> Result<std::result::Result<Reply, StoreFault>> {
        let mut slot = self.conn.lock();

        let conn = match slot.take() {
            Some(conn) => conn,
            None => self.connect()?,
        };
        let conn = slot.insert(conn);

        log::debug!("-> {} {}", self.addr, cmd.name());
        let res = conn.round_trip(cmd);
        if let Err(StoreFault::Io(_)) | Err(StoreFault::Protocol(_)) = &res {
            // stream state is unknown after a transport or framing failure
            *slot = None;
        }
        Ok(res)
    }

    fn connect(&self) -> Result<Connection> {
        let connect_err = |source: StoreFault| Error::StoreConnect {
            addr: self.addr.clone(),
            source,
        };

        let sock = self.open_socket().map_err(|e| connect_err(e.into()))?;
        let mut conn = Connection {
            sock,
            timeout: self.timeout,
            rbuf: BytesMut::with_capacity(READ_BUF),
            wbuf: BytesMut::new(),
        };

        if let Some(password) = &self.password {
            let reply = conn
                .round_trip(&Cmd::Auth(Bytes::copy_from_slice(password.as_bytes())))
                .map_err(connect_err)?;
            expect_ok(reply).map_err(connect_err)?;
        }
        if self.db != 0 {
            let reply = conn.round_trip(&Cmd::Select(self.db)).map_err(connect_err)?;
            expect_ok(reply).map_err(connect_err)?;
        }

        log::debug!("connected to {}", self.addr);
        Ok(conn)
    }

    fn open_socket(&self) -> std::io::Result<TcpStream> {
        let mut last_err = None;
        for addr in self.addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(sock) => {
                    sock.set_nodelay(true).ok();
                    return Ok(sock);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "address resolved to nothing")
        }))
    }
}

impl KeyValueStore for StoreClient {
    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let cmd = Cmd::Set(
            Bytes::copy_from_slice(key.as_bytes()),
            Bytes::copy_from_slice(value),
        );
        self.request(&cmd)?
            .and_then(expect_ok)
            .map_err(|source| Error::StoreWrite {
                key: key.to_string(),
                source,
            })
    }

    fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let cmd = Cmd::Get(Bytes::copy_from_slice(key.as_bytes()));
        let read_err = |source: StoreFault| Error::StoreRead {
            key: key.to_string(),
            source,
        };

        match self.request(&cmd)?.map_err(read_err)? {
            Reply::Bulk(v) => Ok(v),
            Reply::Error(msg) => Err(read_err(StoreFault::Reply(msg))),
            other => Err(read_err(StoreFault::UnexpectedReply(format!("{:?}", other)))),
        }
    }
}

impl Connection {
    /// Send one command and block until its reply is fully read,
    /// giving up once `timeout` has elapsed since the call started
    fn round_trip(&mut self, cmd: &Cmd) -> std::result::Result<Reply, StoreFault> {
        let deadline = Instant::now() + self.timeout;

        self.wbuf.clear();
        cmd.encode(&mut self.wbuf);
        self.sock.set_write_timeout(Some(remaining(deadline)?))?;
        self.sock.write_all(&self.wbuf).map_err(timed_out)?;

        let mut tmp_buf = [0u8; READ_BUF];
        loop {
            match parse_reply(&self.rbuf).map_err(|e| StoreFault::Protocol(e.to_string()))? {
                Some((consumed, reply)) => {
                    let _ = self.rbuf.split_to(consumed);
                    return Ok(reply);
                }
                None => {
                    self.sock.set_read_timeout(Some(remaining(deadline)?))?;
                    let n = self.sock.read(&mut tmp_buf).map_err(timed_out)?;
                    if n == 0 {
                        return Err(StoreFault::Io(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "connection closed by server",
                        )));
                    }
                    self.rbuf.extend_from_slice(&tmp_buf[..n]);
                }
            }
        }
    }
}

/// Time left before `deadline`, or a `TimedOut` fault if none is left
fn remaining(deadline: Instant) -> std::result::Result<Duration, StoreFault> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        return Err(StoreFault::Io(std::io::ErrorKind::TimedOut.into()));
    }
    Ok(left)
}

/// Socket timeouts surface as `WouldBlock` on unix; report them as `TimedOut`
fn timed_out(e: std::io::Error) -> StoreFault {
    match e.kind() {
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => {
            StoreFault::Io(std::io::ErrorKind::TimedOut.into())
        }
        _ => StoreFault::Io(e),
    }
}

fn expect_ok(reply: Reply) -> std::result::Result<(), StoreFault> {
    match reply {
        Reply::Simple(s) if s.eq_ignore_ascii_case("OK") => Ok(()),
        Reply::Error(msg) => Err(StoreFault::Reply(msg)),
        other => Err(StoreFault::UnexpectedReply(format!("{:?}", other))),
    }
}
