//! RESP2 (REdis Serialization Protocol) framing
//!
//! Parsing is incremental: an incomplete frame yields `Ok(None)` and leaves the
//! buffer untouched so the caller can read more and retry.

use bytes::{Buf, BytesMut};
use thiserror::Error;

/// Maximum bulk string size (512MB) - prevents DoS via memory exhaustion
const MAX_BULK_STRING_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array size (1M elements) - prevents DoS via array bomb
const MAX_ARRAY_SIZE: usize = 1024 * 1024;

/// Malformed input; the connection's buffer should be discarded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown RESP type byte {0:?}")]
    UnknownType(char),
    #[error("invalid length {0:?}")]
    InvalidLength(String),
    #[error("bulk string too large: {0} bytes (max: {MAX_BULK_STRING_SIZE} bytes)")]
    BulkTooLarge(usize),
    #[error("array too large: {0} elements (max: {MAX_ARRAY_SIZE} elements)")]
    ArrayTooLarge(usize),
    #[error("expected \\r\\n after bulk string")]
    MissingTerminator,
    #[error("line is not valid UTF-8")]
    InvalidUtf8,
}

/// RESP data types
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Simple string: +OK\r\n
    SimpleString(String),
    /// Error: -Error message\r\n
    Error(String),
    /// Integer: :1000\r\n
    Integer(i64),
    /// Bulk string: $6\r\nfoobar\r\n
    BulkString(Option<Vec<u8>>),
    /// Array: *2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// `+OK`
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// `-ERR <msg>`
    pub fn err(msg: impl std::fmt::Display) -> Self {
        RespValue::Error(format!("ERR {msg}"))
    }

    /// Non-null bulk string
    pub fn bulk(data: impl Into<Vec<u8>>) -> Self {
        RespValue::BulkString(Some(data.into()))
    }

    /// Payload of a non-null bulk or simple string
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RespValue::BulkString(Some(data)) => Some(data),
            RespValue::SimpleString(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    /// Payload as UTF-8 text
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Serialize to RESP format
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(s) => write_line(out, b'+', s.as_bytes()),
            RespValue::Error(e) => write_line(out, b'-', e.as_bytes()),
            RespValue::Integer(i) => write_line(out, b':', i.to_string().as_bytes()),
            RespValue::BulkString(None) => out.extend_from_slice(b"$-1\r\n"),
            RespValue::BulkString(Some(data)) => {
                write_line(out, b'$', data.len().to_string().as_bytes());
                out.extend_from_slice(data);
                out.extend_from_slice(b"\r\n");
            }
            RespValue::Array(None) => out.extend_from_slice(b"*-1\r\n"),
            RespValue::Array(Some(items)) => {
                write_line(out, b'*', items.len().to_string().as_bytes());
                for item in items {
                    item.write_to(out);
                }
            }
        }
    }

    /// Parse one frame from the front of `buf`, consuming it on success
    pub fn parse(buf: &mut BytesMut) -> Result<Option<RespValue>, ProtocolError> {
        let mut parser = Parser { input: &buf[..], pos: 0 };
        match parser.value()? {
            Some(value) => {
                let consumed = parser.pos;
                buf.advance(consumed);
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

fn write_line(out: &mut Vec<u8>, prefix: u8, body: &[u8]) {
    out.push(prefix);
    out.extend_from_slice(body);
    out.extend_from_slice(b"\r\n");
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn value(&mut self) -> Result<Option<RespValue>, ProtocolError> {
        let Some(&type_byte) = self.input.get(self.pos) else {
            return Ok(None);
        };
        self.pos += 1;

        match type_byte {
            b'+' => Ok(self.text()?.map(RespValue::SimpleString)),
            b'-' => Ok(self.text()?.map(RespValue::Error)),
            b':' => match self.text()? {
                Some(line) => line
                    .parse()
                    .map(|n| Some(RespValue::Integer(n)))
                    .map_err(|_| ProtocolError::InvalidLength(line)),
                None => Ok(None),
            },
            b'$' => self.bulk_string(),
            b'*' => self.array(),
            other => Err(ProtocolError::UnknownType(other as char)),
        }
    }

    fn bulk_string(&mut self) -> Result<Option<RespValue>, ProtocolError> {
        let Some(len) = self.length()? else {
            return Ok(None);
        };
        let Some(len) = len else {
            return Ok(Some(RespValue::BulkString(None)));
        };
        if len > MAX_BULK_STRING_SIZE {
            return Err(ProtocolError::BulkTooLarge(len));
        }

        let end = self.pos + len;
        if self.input.len() < end + 2 {
            return Ok(None);
        }
        if &self.input[end..end + 2] != b"\r\n" {
            return Err(ProtocolError::MissingTerminator);
        }

        let data = self.input[self.pos..end].to_vec();
        self.pos = end + 2;
        Ok(Some(RespValue::BulkString(Some(data))))
    }

    fn array(&mut self) -> Result<Option<RespValue>, ProtocolError> {
        let Some(len) = self.length()? else {
            return Ok(None);
        };
        let Some(len) = len else {
            return Ok(Some(RespValue::Array(None)));
        };
        if len > MAX_ARRAY_SIZE {
            return Err(ProtocolError::ArrayTooLarge(len));
        }

        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            match self.value()? {
                Some(item) => items.push(item),
                None => return Ok(None),
            }
        }
        Ok(Some(RespValue::Array(Some(items))))
    }

    /// `Some(None)` for the null marker `-1`
    fn length(&mut self) -> Result<Option<Option<usize>>, ProtocolError> {
        let Some(line) = self.text()? else {
            return Ok(None);
        };
        if line == "-1" {
            return Ok(Some(None));
        }
        line.parse::<usize>()
            .map(|n| Some(Some(n)))
            .map_err(|_| ProtocolError::InvalidLength(line))
    }

    fn text(&mut self) -> Result<Option<String>, ProtocolError> {
        let rest = &self.input[self.pos..];
        let Some(at) = rest.windows(2).position(|w| w == b"\r\n") else {
            return Ok(None);
        };

        let line = std::str::from_utf8(&rest[..at]).map_err(|_| ProtocolError::InvalidUtf8)?;
        self.pos += at + 2;
        Ok(Some(line.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(data: &[u8]) -> RespValue {
        let mut buf = BytesMut::from(data);
        let value = RespValue::parse(&mut buf).unwrap().unwrap();
        assert!(buf.is_empty());
        value
    }

    #[test]
    fn test_scalars() {
        assert_eq!(parse_all(b"+OK\r\n"), RespValue::ok());
        assert_eq!(
            parse_all(b"-ERR boom\r\n"),
            RespValue::Error("ERR boom".to_string())
        );
        assert_eq!(parse_all(b":-12\r\n"), RespValue::Integer(-12));
        assert_eq!(RespValue::Integer(1000).serialize(), b":1000\r\n");
    }

    #[test]
    fn test_bulk_strings() {
        assert_eq!(parse_all(b"$6\r\nfoobar\r\n"), RespValue::bulk("foobar"));
        assert_eq!(parse_all(b"$-1\r\n"), RespValue::BulkString(None));
        assert_eq!(parse_all(b"$0\r\n\r\n"), RespValue::bulk(""));
        assert_eq!(RespValue::bulk("foobar").serialize(), b"$6\r\nfoobar\r\n");
    }

    #[test]
    fn test_command_array() {
        let value = parse_all(b"*3\r\n$10\r\nTWEET.POST\r\n$1\r\n7\r\n$5\r\nhello\r\n");

        let RespValue::Array(Some(items)) = value else {
            panic!("expected array");
        };
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_str(), Some("TWEET.POST"));
        assert_eq!(items[2].as_str(), Some("hello"));
    }

    #[test]
    fn test_nested_serialize() {
        let value = RespValue::Array(Some(vec![RespValue::bulk("a"), RespValue::Integer(1)]));
        assert_eq!(value.serialize(), b"*2\r\n$1\r\na\r\n:1\r\n");
        assert_eq!(RespValue::Array(None).serialize(), b"*-1\r\n");
    }

    #[test]
    fn test_incomplete_leaves_buffer() {
        let mut buf = BytesMut::from(&b"*2\r\n$3\r\nfoo\r\n$3\r\nba"[..]);
        assert_eq!(RespValue::parse(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 20);

        buf.extend_from_slice(b"r\r\n");
        assert!(RespValue::parse(&mut buf).unwrap().is_some());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_pipelined_frames() {
        let mut buf = BytesMut::from(&b"+A\r\n+B\r\n"[..]);
        assert_eq!(
            RespValue::parse(&mut buf).unwrap(),
            Some(RespValue::SimpleString("A".to_string()))
        );
        assert_eq!(
            RespValue::parse(&mut buf).unwrap(),
            Some(RespValue::SimpleString("B".to_string()))
        );
        assert_eq!(RespValue::parse(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_malformed() {
        let mut buf = BytesMut::from(&b"?x\r\n"[..]);
        assert_eq!(RespValue::parse(&mut buf), Err(ProtocolError::UnknownType('?')));

        let mut buf = BytesMut::from(&b"$-5\r\n"[..]);
        assert!(matches!(
            RespValue::parse(&mut buf),
            Err(ProtocolError::InvalidLength(_))
        ));

        let mut buf = BytesMut::from(&b"$3\r\nfooXY"[..]);
        assert_eq!(RespValue::parse(&mut buf), Err(ProtocolError::MissingTerminator));
    }

    #[test]
    fn test_size_limits() {
        let mut buf = BytesMut::from(&b"$999999999999\r\n"[..]);
        assert!(matches!(
            RespValue::parse(&mut buf),
            Err(ProtocolError::BulkTooLarge(_))
        ));

        let mut buf = BytesMut::from(&b"*2000000\r\n"[..]);
        assert!(matches!(
            RespValue::parse(&mut buf),
            Err(ProtocolError::ArrayTooLarge(_))
        ));
    }
}
