//! # RESP2 Encoding and Parsing
//!
//! Purpose: Encode commands and parse server replies, then turn raw replies
//! into the typed values callers expect.
//!
//! ## Design Principles
//! 1. **State-Free Parsing**: Replies are parsed top-down with minimal state.
//! 2. **Buffer Reuse**: Caller provides buffers to avoid per-call allocations.
//! 3. **Binary-Safe**: Bulk strings are treated as raw bytes.
//! 4. **Fail Fast**: Invalid framing returns protocol errors immediately.
//! 5. **Typed Decoders**: `into_*` helpers are plain `fn(RespValue)` so they
//!    can be stored next to a deferred reply and applied after a flush.

use std::io::BufRead;

use bytes::Bytes;

use crate::error::{ClientError, ClientResult};

/// RESP reply value.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// +OK or +PONG style replies.
    Simple(Vec<u8>),
    /// -ERR ... replies.
    Error(Vec<u8>),
    /// :123 replies.
    Integer(i64),
    /// $... bulk strings, with None for null.
    Bulk(Option<Vec<u8>>),
    /// *... arrays.
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Converts an error reply into `ClientError::Server`, passing every other
    /// reply through untouched.
    pub fn into_result(self) -> ClientResult<RespValue> {
        match self {
            RespValue::Error(message) => Err(ClientError::server(&message)),
            other => Ok(other),
        }
    }

    pub fn into_integer(self) -> ClientResult<i64> {
        match self.into_result()? {
            RespValue::Integer(value) => Ok(value),
            _ => Err(ClientError::UnexpectedResponse { expected: "integer" }),
        }
    }

    /// Integer replies where any non-zero value means true (GETBIT, SISMEMBER,
    /// EXPIRE, SETNX...).
    pub fn into_bool(self) -> ClientResult<bool> {
        Ok(self.into_integer()? != 0)
    }

    /// `+OK` is true; a null bulk (SET NX/XX that did not apply) is false.
    pub fn into_ok(self) -> ClientResult<bool> {
        match self.into_result()? {
            RespValue::Simple(_) => Ok(true),
            RespValue::Bulk(None) => Ok(false),
            _ => Err(ClientError::UnexpectedResponse { expected: "status" }),
        }
    }

    pub fn into_bytes(self) -> ClientResult<Option<Vec<u8>>> {
        match self.into_result()? {
            RespValue::Bulk(data) => Ok(data),
            RespValue::Simple(data) => Ok(Some(data)),
            _ => Err(ClientError::UnexpectedResponse { expected: "bulk" }),
        }
    }

    pub fn into_string(self) -> ClientResult<Option<String>> {
        match self.into_bytes()? {
            Some(data) => String::from_utf8(data)
                .map(Some)
                .map_err(|_| ClientError::UnexpectedResponse { expected: "utf-8 text" }),
            None => Ok(None),
        }
    }

    /// Non-null text reply (PING, ECHO, INFO).
    pub fn into_text(self) -> ClientResult<String> {
        self.into_string()?
            .ok_or(ClientError::UnexpectedResponse { expected: "text" })
    }

    /// Bulk float reply such as ZSCORE; null stays `None`.
    pub fn into_float(self) -> ClientResult<Option<f64>> {
        match self.into_string()? {
            Some(text) => parse_score(&text).map(Some),
            None => Ok(None),
        }
    }

    pub fn into_array(self) -> ClientResult<Vec<RespValue>> {
        match self.into_result()? {
            RespValue::Array(items) => Ok(items),
            RespValue::Bulk(None) => Ok(Vec::new()),
            _ => Err(ClientError::UnexpectedResponse { expected: "array" }),
        }
    }

    pub fn into_strings(self) -> ClientResult<Vec<String>> {
        self.into_array()?
            .into_iter()
            .map(|item| {
                item.into_string()?
                    .ok_or(ClientError::UnexpectedResponse { expected: "non-null element" })
            })
            .collect()
    }

    pub fn into_byte_strings(self) -> ClientResult<Vec<Vec<u8>>> {
        self.into_array()?
            .into_iter()
            .map(|item| {
                item.into_bytes()?
                    .ok_or(ClientError::UnexpectedResponse { expected: "non-null element" })
            })
            .collect()
    }

    /// Flat `[field, value, field, value, ...]` arrays (HGETALL, HSCAN pages).
    pub fn into_string_pairs(self) -> ClientResult<Vec<(String, String)>> {
        let items = self.into_strings()?;
        if items.len() % 2 != 0 {
            return Err(ClientError::UnexpectedResponse { expected: "even-length array" });
        }
        let mut pairs = Vec::with_capacity(items.len() / 2);
        let mut iter = items.into_iter();
        while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
            pairs.push((field, value));
        }
        Ok(pairs)
    }

    /// Flat `[member, score, ...]` arrays (ZSCAN pages, WITHSCORES replies).
    pub fn into_scored(self) -> ClientResult<Vec<(String, f64)>> {
        self.into_string_pairs()?
            .into_iter()
            .map(|(member, score)| Ok((member, parse_score(&score)?)))
            .collect()
    }

    /// Splits a `[cursor, [elements...]]` SCAN-family reply.
    pub fn into_scan_page(self) -> ClientResult<(String, RespValue)> {
        let mut items = self.into_array()?;
        if items.len() != 2 {
            return Err(ClientError::UnexpectedResponse { expected: "scan page" });
        }
        let elements = items.pop().unwrap_or(RespValue::Array(Vec::new()));
        let cursor = items
            .pop()
            .map(RespValue::into_text)
            .transpose()?
            .unwrap_or_default();
        Ok((cursor, elements))
    }
}

/// Parses a sorted-set score, accepting the `inf` spellings servers emit.
fn parse_score(text: &str) -> ClientResult<f64> {
    match text {
        "inf" | "+inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        _ => text
            .parse()
            .map_err(|_| ClientError::UnexpectedResponse { expected: "float" }),
    }
}

/// Encodes a RESP2 array command into the provided buffer.
pub fn encode_command(args: &[Bytes], out: &mut Vec<u8>) {
    out.push(b'*');
    push_usize(out, args.len());
    out.extend_from_slice(b"\r\n");
    for arg in args {
        out.push(b'$');
        push_usize(out, arg.len());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

/// Reads one RESP value from the buffered reader.
pub fn read_response<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ClientResult<RespValue> {
    read_line(reader, line_buf)?;
    if line_buf.is_empty() {
        return Err(ClientError::Protocol);
    }

    match line_buf[0] {
        b'+' => Ok(RespValue::Simple(line_buf[1..].to_vec())),
        b'-' => Ok(RespValue::Error(line_buf[1..].to_vec())),
        b':' => Ok(RespValue::Integer(parse_i64(&line_buf[1..])?)),
        b'$' => {
            let len = parse_i64(&line_buf[1..])?;
            parse_bulk_len(reader, len, line_buf)
        }
        b'*' => {
            let len = parse_i64(&line_buf[1..])?;
            parse_array_len(reader, len, line_buf)
        }
        _ => Err(ClientError::Protocol),
    }
}

fn parse_bulk_len<R: BufRead>(
    reader: &mut R,
    len: i64,
    line_buf: &mut Vec<u8>,
) -> ClientResult<RespValue> {
    if len < 0 {
        return Ok(RespValue::Bulk(None));
    }
    let mut data = vec![0u8; len as usize];
    reader.read_exact(&mut data)?;

    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf)?;
    if crlf != *b"\r\n" {
        return Err(ClientError::Protocol);
    }

    line_buf.clear();
    Ok(RespValue::Bulk(Some(data)))
}

fn parse_array_len<R: BufRead>(
    reader: &mut R,
    len: i64,
    line_buf: &mut Vec<u8>,
) -> ClientResult<RespValue> {
    if len <= 0 {
        return Ok(RespValue::Array(Vec::new()));
    }

    let mut items = Vec::with_capacity(len as usize);
    for _ in 0..len {
        items.push(read_response(reader, line_buf)?);
    }
    Ok(RespValue::Array(items))
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> ClientResult<()> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Err(ClientError::Protocol);
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(ClientError::Protocol);
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_i64(data: &[u8]) -> ClientResult<i64> {
    let (negative, digits) = match data.split_first() {
        Some((b'-', rest)) => (true, rest),
        Some(_) => (false, data),
        None => return Err(ClientError::Protocol),
    };
    if digits.is_empty() {
        return Err(ClientError::Protocol);
    }

    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(ClientError::Protocol);
        }
        value = value.saturating_mul(10).saturating_add((b - b'0') as i64);
    }

    Ok(if negative { -value } else { value })
}

fn push_usize(out: &mut Vec<u8>, value: usize) {
    // itoa-style formatting into a stack buffer.
    let mut buf = [0u8; 20];
    let mut len = 0;
    let mut rest = value;
    loop {
        buf[len] = b'0' + (rest % 10) as u8;
        rest /= 10;
        len += 1;
        if rest == 0 {
            break;
        }
    }
    out.extend(buf[..len].iter().rev());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(raw: &[u8]) -> RespValue {
        let mut reader = Cursor::new(raw.to_vec());
        let mut line = Vec::new();
        read_response(&mut reader, &mut line).unwrap()
    }

    #[test]
    fn encodes_command() {
        let mut buf = Vec::new();
        encode_command(&[Bytes::from_static(b"GETBIT"), Bytes::from_static(b"k_0"), Bytes::from_static(b"10")], &mut buf);
        assert_eq!(&buf, b"*3\r\n$6\r\nGETBIT\r\n$3\r\nk_0\r\n$2\r\n10\r\n");
    }

    #[test]
    fn parses_simple_and_error() {
        assert_eq!(parse(b"+OK\r\n"), RespValue::Simple(b"OK".to_vec()));
        assert_eq!(parse(b"-ERR bad\r\n"), RespValue::Error(b"ERR bad".to_vec()));
    }

    #[test]
    fn parses_bulk_and_null_bulk() {
        assert_eq!(parse(b"$5\r\nhello\r\n"), RespValue::Bulk(Some(b"hello".to_vec())));
        assert_eq!(parse(b"$-1\r\n"), RespValue::Bulk(None));
    }

    #[test]
    fn parses_negative_integer() {
        assert_eq!(parse(b":-2\r\n"), RespValue::Integer(-2));
        let mut reader = Cursor::new(b":-\r\n".to_vec());
        let mut line = Vec::new();
        assert!(matches!(read_response(&mut reader, &mut line), Err(ClientError::Protocol)));
    }

    #[test]
    fn decodes_scan_page() {
        let reply = parse(b"*2\r\n$2\r\n17\r\n*2\r\n$1\r\na\r\n$1\r\nb\r\n");
        let (cursor, elements) = reply.into_scan_page().unwrap();
        assert_eq!(cursor, "17");
        assert_eq!(elements.into_strings().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn decodes_scored_pairs() {
        let reply = RespValue::Array(vec![
            RespValue::Bulk(Some(b"m1".to_vec())),
            RespValue::Bulk(Some(b"1.5".to_vec())),
            RespValue::Bulk(Some(b"m2".to_vec())),
            RespValue::Bulk(Some(b"-inf".to_vec())),
        ]);
        let scored = reply.into_scored().unwrap();
        assert_eq!(scored[0], ("m1".to_string(), 1.5));
        assert_eq!(scored[1].1, f64::NEG_INFINITY);
    }

    #[test]
    fn error_reply_becomes_server_error() {
        let err = RespValue::Error(b"WRONGTYPE nope".to_vec()).into_integer().unwrap_err();
        assert!(matches!(err, ClientError::Server { ref message } if message == "WRONGTYPE nope"));
    }

    #[test]
    fn mismatched_reply_is_unexpected() {
        let err = RespValue::Simple(b"OK".to_vec()).into_integer().unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedResponse { expected: "integer" }));
    }

    #[test]
    fn ok_reply_distinguishes_null() {
        assert!(RespValue::Simple(b"OK".to_vec()).into_ok().unwrap());
        assert!(!RespValue::Bulk(None).into_ok().unwrap());
    }
}
