/*!
 * Redis RESP Protocol Implementation
 *
 * The client half of the Redis Serialization Protocol (RESP2) report_ip
 * needs: encoding the handful of commands it sends and parsing the
 * replies a server sends back.
 */

use anyhow::{anyhow, bail, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Largest bulk string accepted, the same limit Redis enforces
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Nesting limit for array replies
pub const MAX_DEPTH: usize = 8;

/// Commands report_ip sends to the store
///
/// Keys and values are raw bytes; RESP is binary safe.
#[derive(Debug, Clone, PartialEq)]
pub enum Cmd {
    /// AUTH password
    Auth(Bytes),
    /// SELECT db
    Select(i64),
    /// GET key
    Get(Bytes),
    /// SET key value, no expiry
    Set(Bytes, Bytes),
}

/// A reply read off the wire
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// +OK
    Simple(String),
    /// -ERR message
    Error(String),
    /// :42
    Integer(i64),
    /// $<len> payload, `None` for the nil bulk `$-1`
    Bulk(Option<Bytes>),
    /// *<count> items, `None` for the nil array `*-1`
    Array(Option<Vec<Reply>>),
}

impl Cmd {
    /// Command name as sent on the wire, also used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            Cmd::Auth(_) => "AUTH",
            Cmd::Select(_) => "SELECT",
            Cmd::Get(_) => "GET",
            Cmd::Set(_, _) => "SET",
        }
    }

    /// Append this command as a RESP array of bulk strings
    ///
    /// `SET k v` becomes `*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n`.
    pub fn encode(&self, out: &mut BytesMut) {
        let name = self.name().as_bytes();
        match self {
            Cmd::Auth(arg) | Cmd::Get(arg) => {
                write_array_len(2, out);
                write_bulk(name, out);
                write_bulk(arg, out);
            }
            Cmd::Select(db) => {
                write_array_len(2, out);
                write_bulk(name, out);
                write_bulk(db.to_string().as_bytes(), out);
            }
            Cmd::Set(k, v) => {
                write_array_len(3, out);
                write_bulk(name, out);
                write_bulk(k, out);
                write_bulk(v, out);
            }
        }
    }
}

/// Parse a single reply from the front of `data`
///
/// # Returns
/// * `Ok(Some((consumed_bytes, reply)))` - a complete reply
/// * `Ok(None)` - incomplete data, need more bytes
/// * `Err(...)` - bytes are not valid RESP, a bulk string is longer than
///   [`MAX_BULK_LEN`], or arrays nest deeper than [`MAX_DEPTH`]
pub fn parse_reply(data: &[u8]) -> Result<Option<(usize, Reply)>> {
    parse_nested(data, 0)
}

fn parse_nested(data: &[u8], depth: usize) -> Result<Option<(usize, Reply)>> {
    if data.is_empty() {
        return Ok(None);
    }

    match data[0] {
        b'+' | b'-' => {
            let end = match find_crlf(&data[1..]) {
                Some(end) => end,
                None => return Ok(None),
            };
            let line = String::from_utf8_lossy(&data[1..1 + end]).into_owned();
            let reply = if data[0] == b'+' {
                Reply::Simple(line)
            } else {
                Reply::Error(line)
            };
            Ok(Some((1 + end + 2, reply)))
        }
        b':' => Ok(read_decimal_line(&data[1..])?.map(|(i, n)| (1 + i, Reply::Integer(n)))),
        b'$' => {
            let (i, len) = match read_decimal_line(&data[1..])? {
                Some(x) => x,
                None => return Ok(None),
            };
            let cursor = 1 + i;
            if len < 0 {
                return Ok(Some((cursor, Reply::Bulk(None))));
            }
            if len > MAX_BULK_LEN {
                bail!("bulk string of {} bytes exceeds limit", len);
            }

            let len = len as usize;
            if cursor + len + 2 > data.len() {
                return Ok(None);
            }
            if &data[cursor + len..cursor + len + 2] != b"\r\n" {
                bail!("bulk string not terminated by CRLF");
            }
            let payload = Bytes::copy_from_slice(&data[cursor..cursor + len]);
            Ok(Some((cursor + len + 2, Reply::Bulk(Some(payload)))))
        }
        b'*' => {
            if depth >= MAX_DEPTH {
                bail!("array reply nested deeper than {}", MAX_DEPTH);
            }
            let (i, n) = match read_decimal_line(&data[1..])? {
                Some(x) => x,
                None => return Ok(None),
            };
            let mut cursor = 1 + i;
            if n < 0 {
                return Ok(Some((cursor, Reply::Array(None))));
            }

            let mut items = Vec::with_capacity(n.min(64) as usize);
            for _ in 0..n {
                match parse_nested(&data[cursor..], depth + 1)? {
                    Some((used, item)) => {
                        cursor += used;
                        items.push(item);
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((cursor, Reply::Array(Some(items)))))
        }
        other => bail!("protocol error: unexpected reply type byte {:?}", other as char),
    }
}

/// Read an optionally signed decimal number followed by \r\n
///
/// # Returns
/// * `Some((bytes_consumed, parsed_number))`, or `None` if the line is incomplete
fn read_decimal_line(s: &[u8]) -> Result<Option<(usize, i64)>> {
    let mut i = 0;
    let mut sign: i64 = 1;

    if i < s.len() && s[i] == b'-' {
        sign = -1;
        i += 1;
    }

    let start = i;
    let mut num: i64 = 0;
    while i < s.len() && s[i].is_ascii_digit() {
        num = num
            .checked_mul(10)
            .and_then(|n| n.checked_add((s[i] - b'0') as i64))
            .ok_or_else(|| anyhow!("integer overflow"))?;
        i += 1;
    }

    if i == s.len() {
        return Ok(None);
    }
    if s[i] != b'\r' {
        bail!("expected CRLF");
    }
    if i + 1 == s.len() {
        return Ok(None);
    }
    if s[i + 1] != b'\n' {
        bail!("expected CRLF");
    }
    if i == start {
        bail!("expected integer");
    }

    Ok(Some((i + 2, num * sign)))
}

fn find_crlf(s: &[u8]) -> Option<usize> {
    s.windows(2).position(|w| w == b"\r\n")
}

/// $<len>\r\n<data>\r\n
pub fn write_bulk(b: &[u8], out: &mut BytesMut) {
    let len_str = b.len().to_string();
    out.reserve(1 + len_str.len() + 2 + b.len() + 2);
    out.put_u8(b'$');
    out.put_slice(len_str.as_bytes());
    out.put_slice(b"\r\n");
    out.put_slice(b);
    out.put_slice(b"\r\n");
}

/// *<n>\r\n, to be followed by n encoded items
pub fn write_array_len(n: usize, out: &mut BytesMut) {
    out.put_u8(b'*');
    out.put_slice(n.to_string().as_bytes());
    out.put_slice(b"\r\n");
}
