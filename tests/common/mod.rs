//! In-process RESP server for integration tests.
//!
//! Understands AUTH, SELECT, GET and SET, keeps one map per logical
//! database, and counts accepted connections. Carries its own command
//! parser and reply encoders; the library only speaks the client side.

#![allow(dead_code)]

use bytes::{Buf, BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use report_ip::protocol::write_bulk;
use report_ip::{Cmd, RedisConfig};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct State {
    dbs: Mutex<HashMap<i64, HashMap<Bytes, Bytes>>>,
    password: Option<String>,
    pub connections: AtomicUsize,
}

pub struct TestServer {
    pub port: u16,
    pub state: Arc<State>,
}

impl TestServer {
    pub fn start() -> Self {
        Self::spawn(State::default())
    }

    /// Server that rejects every command until `AUTH password` succeeds
    pub fn with_password(password: &str) -> Self {
        Self::spawn(State {
            password: Some(password.to_string()),
            ..State::default()
        })
    }

    fn spawn(state: State) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
        let port = listener.local_addr().expect("local addr").port();
        let state = Arc::new(state);

        let accept_state = state.clone();
        std::thread::spawn(move || {
            for sock in listener.incoming() {
                let sock = match sock {
                    Ok(sock) => sock,
                    Err(_) => break,
                };
                accept_state.connections.fetch_add(1, Ordering::SeqCst);
                let state = accept_state.clone();
                std::thread::spawn(move || serve(sock, state));
            }
        });

        Self { port, state }
    }

    pub fn redis_config(&self) -> RedisConfig {
        RedisConfig {
            host: "127.0.0.1".into(),
            port: self.port,
            password: None,
            db: 0,
            timeout_ms: 2000,
        }
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub fn value(&self, db: i64, key: &str) -> Option<Bytes> {
        self.state
            .dbs
            .lock()
            .get(&db)
            .and_then(|m| m.get(key.as_bytes()).cloned())
    }

    pub fn insert(&self, db: i64, key: &str, value: &[u8]) {
        self.state
            .dbs
            .lock()
            .entry(db)
            .or_default()
            .insert(Bytes::copy_from_slice(key.as_bytes()), Bytes::copy_from_slice(value));
    }
}

/// Accept one connection and hand the raw socket to `handle`
pub fn spawn_raw<F>(handle: F) -> RedisConfig
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind raw server");
    let port = listener.local_addr().expect("local addr").port();
    std::thread::spawn(move || {
        if let Ok((sock, _)) = listener.accept() {
            handle(sock);
        }
    });
    RedisConfig {
        host: "127.0.0.1".into(),
        port,
        password: None,
        db: 0,
        timeout_ms: 2000,
    }
}

/// A port nothing is listening on
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    listener.local_addr().expect("local addr").port()
}

fn serve(mut sock: TcpStream, state: Arc<State>) {
    let mut rbuf = BytesMut::new();
    let mut wbuf = BytesMut::new();
    let mut cmds = Vec::new();
    let mut tmp_buf = [0u8; 4096];
    let mut authed = state.password.is_none();
    let mut db = 0i64;

    loop {
        let n = match sock.read(&mut tmp_buf) {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        rbuf.extend_from_slice(&tmp_buf[..n]);

        cmds.clear();
        if let Err(e) = parse_many(&mut rbuf, &mut cmds) {
            write_error(&format!("ERR {}", e), &mut wbuf);
            rbuf.clear();
        }

        for cmd in cmds.drain(..) {
            match cmd {
                Cmd::Auth(p) => {
                    if state.password.as_deref().map(str::as_bytes) == Some(&p[..]) {
                        authed = true;
                        write_simple("OK", &mut wbuf);
                    } else {
                        write_error("WRONGPASS invalid password", &mut wbuf);
                    }
                }
                _ if !authed => write_error("NOAUTH Authentication required.", &mut wbuf),
                Cmd::Select(n) => {
                    db = n;
                    write_simple("OK", &mut wbuf);
                }
                Cmd::Get(k) => match state.dbs.lock().get(&db).and_then(|m| m.get(&k)) {
                    Some(v) => write_bulk(v, &mut wbuf),
                    None => write_null(&mut wbuf),
                },
                Cmd::Set(k, v) => {
                    state.dbs.lock().entry(db).or_default().insert(k, v);
                    write_simple("OK", &mut wbuf);
                }
            }
        }

        if !wbuf.is_empty() {
            if sock.write_all(&wbuf).is_err() {
                return;
            }
            wbuf.clear();
        }
    }
}

/// Parse one command (array of bulk strings) from the front of `data`
pub fn parse_command(data: &[u8]) -> Result<Option<(usize, Cmd)>, String> {
    let mut cursor = 0;
    let n = match read_header(data, &mut cursor, b'*')? {
        Some(n) if n > 0 => n as usize,
        Some(_) => return Err("empty array".into()),
        None => return Ok(None),
    };

    let mut items: Vec<Bytes> = Vec::with_capacity(n.min(16));
    for _ in 0..n {
        let len = match read_header(data, &mut cursor, b'$')? {
            Some(len) if len >= 0 => len as usize,
            Some(_) => return Err("nil bulk inside command".into()),
            None => return Ok(None),
        };
        if cursor + len + 2 > data.len() {
            return Ok(None);
        }
        items.push(Bytes::copy_from_slice(&data[cursor..cursor + len]));
        cursor += len + 2;
    }

    let cmd = if items[0].eq_ignore_ascii_case(b"AUTH") && items.len() == 2 {
        Cmd::Auth(items[1].clone())
    } else if items[0].eq_ignore_ascii_case(b"SELECT") && items.len() == 2 {
        let db = std::str::from_utf8(&items[1])
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or("invalid DB index")?;
        Cmd::Select(db)
    } else if items[0].eq_ignore_ascii_case(b"GET") && items.len() == 2 {
        Cmd::Get(items[1].clone())
    } else if items[0].eq_ignore_ascii_case(b"SET") && items.len() == 3 {
        Cmd::Set(items[1].clone(), items[2].clone())
    } else {
        return Err("unknown/invalid command".into());
    };

    Ok(Some((cursor, cmd)))
}

/// Drain every complete command from `buf` into `out`
pub fn parse_many(buf: &mut BytesMut, out: &mut Vec<Cmd>) -> Result<(), String> {
    while let Some((consumed, cmd)) = parse_command(&buf[..])? {
        buf.advance(consumed);
        out.push(cmd);
    }
    Ok(())
}

/// `<prefix><decimal>\r\n` at `cursor`; advances past it when complete
fn read_header(data: &[u8], cursor: &mut usize, prefix: u8) -> Result<Option<i64>, String> {
    let rest = &data[*cursor..];
    if rest.is_empty() {
        return Ok(None);
    }
    if rest[0] != prefix {
        return Err(format!("expected {:?}", prefix as char));
    }
    let end = match rest.windows(2).position(|w| w == b"\r\n") {
        Some(end) => end,
        None => return Ok(None),
    };
    let n = std::str::from_utf8(&rest[1..end])
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or("bad length")?;
    *cursor += end + 2;
    Ok(Some(n))
}

pub fn write_simple(s: &str, out: &mut BytesMut) {
    out.put_u8(b'+');
    out.put_slice(s.as_bytes());
    out.put_slice(b"\r\n");
}

pub fn write_error(msg: &str, out: &mut BytesMut) {
    out.put_u8(b'-');
    out.put_slice(msg.as_bytes());
    out.put_slice(b"\r\n");
}

pub fn write_null(out: &mut BytesMut) {
    out.put_slice(b"$-1\r\n");
}
