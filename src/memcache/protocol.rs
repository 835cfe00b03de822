//! Memcached Text Protocol
//!
//! Encodes the `get`, `set` and `version` commands and parses the
//! server's replies over any blocking reader/writer pair.

use std::io::{BufRead, Read, Write};

/// Longest key memcached accepts
pub const MAX_KEY_LENGTH: usize = 250;

/// Largest value accepted in a `VALUE` reply (memcached's default item size)
pub const MAX_VALUE_LENGTH: usize = 1024 * 1024;

/// Flag bit marking an LZ4-compressed value
pub const FLAG_COMPRESSED: u32 = 0x02;

/// A value as stored on the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    /// Client flags stored alongside the value
    pub flags: u32,
    /// Raw value bytes
    pub data: Vec<u8>,
}

/// Protocol-level failures, mapped to crate errors by the caller
#[derive(Debug)]
pub enum ProtocolError {
    /// Transport failure
    Io(std::io::Error),
    /// Reply did not follow the protocol
    Malformed(String),
    /// Key cannot be sent; nothing was written
    InvalidKey(String),
    /// `ERROR`, `CLIENT_ERROR` or `SERVER_ERROR` reply
    Server(String),
    /// `NOT_STORED` reply to a `set`
    NotStored,
}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        ProtocolError::Io(e)
    }
}

pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// Check that `key` can be sent on a command line
pub fn validate_key(key: &str) -> ProtocolResult<()> {
    if key.is_empty() || key.len() > MAX_KEY_LENGTH {
        return Err(ProtocolError::InvalidKey(format!(
            "key length {} outside 1..={}",
            key.len(),
            MAX_KEY_LENGTH
        )));
    }
    if key.bytes().any(|b| b <= b' ' || b == 0x7f) {
        return Err(ProtocolError::InvalidKey(format!(
            "key {:?} contains whitespace or control characters",
            key
        )));
    }
    Ok(())
}

/// Send `get <key>`
pub fn write_get<W: Write>(writer: &mut W, key: &str) -> ProtocolResult<()> {
    validate_key(key)?;
    writer.write_all(format!("get {}\r\n", key).as_bytes())?;
    writer.flush()?;
    Ok(())
}

/// Read the reply to a single-key `get`
pub fn read_get<R: BufRead>(reader: &mut R, key: &str) -> ProtocolResult<Option<StoredValue>> {
    let line = read_line(reader)?;
    if line == "END" {
        return Ok(None);
    }
    check_error_reply(&line)?;

    let mut parts = line.split(' ');
    if parts.next() != Some("VALUE") {
        return Err(ProtocolError::Malformed(format!("unexpected reply {:?}", line)));
    }
    let returned_key = parts
        .next()
        .ok_or_else(|| ProtocolError::Malformed("VALUE line without key".into()))?;
    if returned_key != key {
        return Err(ProtocolError::Malformed(format!(
            "asked for {:?}, server returned {:?}",
            key, returned_key
        )));
    }
    let flags = parse_field::<u32>(parts.next(), "flags")?;
    let length = parse_field::<usize>(parts.next(), "length")?;
    if length > MAX_VALUE_LENGTH {
        return Err(ProtocolError::Malformed(format!(
            "value length {} exceeds {}",
            length, MAX_VALUE_LENGTH
        )));
    }

    let block = length
        .checked_add(2)
        .ok_or_else(|| ProtocolError::Malformed("value length overflows".into()))?;
    let mut data = vec![0u8; block];
    reader.read_exact(&mut data)?;
    if !data.ends_with(b"\r\n") {
        return Err(ProtocolError::Malformed("value block not terminated".into()));
    }
    data.truncate(length);

    let end = read_line(reader)?;
    if end != "END" {
        return Err(ProtocolError::Malformed(format!("expected END, got {:?}", end)));
    }

    Ok(Some(StoredValue { flags, data }))
}

/// Send `set <key> <flags> <exptime> <bytes>` followed by the data block
pub fn write_set<W: Write>(
    writer: &mut W,
    key: &str,
    flags: u32,
    exptime: u32,
    data: &[u8],
) -> ProtocolResult<()> {
    validate_key(key)?;
    let header = format!("set {} {} {} {}\r\n", key, flags, exptime, data.len());
    writer.write_all(header.as_bytes())?;
    writer.write_all(data)?;
    writer.write_all(b"\r\n")?;
    writer.flush()?;
    Ok(())
}

/// Read the reply to a `set`
pub fn read_set<R: BufRead>(reader: &mut R) -> ProtocolResult<()> {
    let line = read_line(reader)?;
    match line.as_str() {
        "STORED" => Ok(()),
        "NOT_STORED" => Err(ProtocolError::NotStored),
        _ => {
            check_error_reply(&line)?;
            Err(ProtocolError::Malformed(format!("unexpected reply {:?}", line)))
        }
    }
}

/// Send `version`
pub fn write_version<W: Write>(writer: &mut W) -> ProtocolResult<()> {
    writer.write_all(b"version\r\n")?;
    writer.flush()?;
    Ok(())
}

/// Read the reply to `version`
pub fn read_version<R: BufRead>(reader: &mut R) -> ProtocolResult<String> {
    let line = read_line(reader)?;
    check_error_reply(&line)?;
    line.strip_prefix("VERSION ")
        .map(|v| v.to_string())
        .ok_or_else(|| ProtocolError::Malformed(format!("unexpected reply {:?}", line)))
}

/// Read one CRLF-terminated line without the terminator
fn read_line<R: BufRead>(reader: &mut R) -> ProtocolResult<String> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Err(ProtocolError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed by server",
        )));
    }
    if !buf.ends_with(b"\r\n") {
        return Err(ProtocolError::Malformed("line not terminated by CRLF".into()));
    }
    buf.truncate(buf.len() - 2);
    String::from_utf8(buf).map_err(|_| ProtocolError::Malformed("reply is not UTF-8".into()))
}

fn check_error_reply(line: &str) -> ProtocolResult<()> {
    if line == "ERROR" || line.starts_with("CLIENT_ERROR") || line.starts_with("SERVER_ERROR") {
        return Err(ProtocolError::Server(line.to_string()));
    }
    Ok(())
}

fn parse_field<T: std::str::FromStr>(field: Option<&str>, what: &str) -> ProtocolResult<T> {
    field
        .and_then(|f| f.parse::<T>().ok())
        .ok_or_else(|| ProtocolError::Malformed(format!("invalid {} in VALUE line", what)))
}
