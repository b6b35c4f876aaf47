//! Incremental frame parser.
//!
//! [`parse`] looks at the front of a byte buffer and reports whether it holds
//! a complete frame, the beginning of one, or something that is not a frame
//! at all. It never consumes input itself; callers keep the raw bytes of an
//! incomplete frame and parse them again once more data arrives.

use crate::command::Command;
use crate::error::ProtocolError;
use crate::frame::{Frame, NUL};
use crate::header::decode_value;
use bytes::Bytes;

/// Outcome of parsing the front of a buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseResult<'a> {
    /// A full frame was found. `remainder` holds the bytes after it, with one
    /// frame separator already skipped.
    Complete { frame: Frame, remainder: &'a [u8] },
    /// More bytes are needed. The partial frame is diagnostic only.
    Incomplete(PartialFrame),
    /// The buffer does not start with a known command.
    Invalid,
}

/// Whatever could be decoded from an incomplete frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialFrame {
    pub command: Option<Command>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

/// Parses one frame from the front of `buf`.
///
/// Returns `Err` only for inputs that started with a valid command and then
/// broke the grammar: a header line without `:`, non-UTF-8 header bytes, or
/// a `content-length` body not followed by NUL.
pub fn parse(buf: &[u8]) -> Result<ParseResult<'_>, ProtocolError> {
    let (token, mut rest) = match split_line(buf) {
        Some(split) => split,
        None if Command::is_token_prefix(buf) => {
            return Ok(ParseResult::Incomplete(PartialFrame::default()))
        }
        None => return Ok(ParseResult::Invalid),
    };

    let Some(command) = Command::from_token(token) else {
        return Ok(ParseResult::Invalid);
    };

    let mut partial = PartialFrame {
        command: Some(command),
        ..PartialFrame::default()
    };

    loop {
        let Some((line, next)) = split_line(rest) else {
            return Ok(ParseResult::Incomplete(partial));
        };
        rest = next;

        if line.is_empty() {
            break;
        }

        let Some(colon) = line.iter().position(|&b| b == b':') else {
            return Err(ProtocolError::MalformedHeader(
                String::from_utf8_lossy(line).into_owned(),
            ));
        };
        let key = to_string(line[..colon].to_vec())?;
        let value = to_string(decode_value(&line[colon + 1..]))?;
        partial.headers.push((key, value));
    }

    let content_length = partial
        .headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.trim().parse::<usize>().ok());

    let (body, after) = match content_length {
        Some(len) => {
            if rest.len() <= len {
                partial.body = non_empty(rest);
                return Ok(ParseResult::Incomplete(partial));
            }
            if rest[len] != NUL {
                return Err(ProtocolError::MissingTerminator { expected_at: len });
            }
            (&rest[..len], &rest[len + 1..])
        }
        None => match rest.iter().position(|&b| b == NUL) {
            Some(pos) => (&rest[..pos], &rest[pos + 1..]),
            None => {
                partial.body = non_empty(rest);
                return Ok(ParseResult::Incomplete(partial));
            }
        },
    };

    let frame = Frame {
        command,
        headers: partial.headers,
        body: non_empty(body),
    };

    Ok(ParseResult::Complete {
        frame,
        remainder: skip_separator(after),
    })
}

/// Splits at the next LF, dropping a CR that precedes it.
fn split_line(buf: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = buf.iter().position(|&b| b == b'\n')?;
    let line = &buf[..pos];
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    Some((line, &buf[pos + 1..]))
}

/// Skips exactly one CRLF or LF.
fn skip_separator(buf: &[u8]) -> &[u8] {
    buf.strip_prefix(b"\r\n")
        .or_else(|| buf.strip_prefix(b"\n"))
        .unwrap_or(buf)
}

fn non_empty(bytes: &[u8]) -> Option<Bytes> {
    if bytes.is_empty() {
        None
    } else {
        Some(Bytes::copy_from_slice(bytes))
    }
}

fn to_string(bytes: Vec<u8>) -> Result<String, ProtocolError> {
    String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(buf: &[u8]) -> (Frame, &[u8]) {
        match parse(buf).unwrap() {
            ParseResult::Complete { frame, remainder } => (frame, remainder),
            other => panic!("expected complete frame, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_complete_frame() {
        let (frame, remainder) = complete(b"CONNECT\r\nkey:value\r\n\r\ntest\x00");

        assert_eq!(frame.command, Command::Connect);
        assert_eq!(frame.headers, vec![("key".to_string(), "value".to_string())]);
        assert_eq!(frame.body.as_deref(), Some(&b"test"[..]));
        assert!(remainder.is_empty());
    }

    #[test]
    fn test_parse_missing_terminator_is_incomplete() {
        let result = parse(b"CONNECT\r\nkey:value\r\n\r\ntest").unwrap();
        match result {
            ParseResult::Incomplete(partial) => {
                assert_eq!(partial.command, Some(Command::Connect));
                assert_eq!(partial.headers.len(), 1);
                assert_eq!(partial.body.as_deref(), Some(&b"test"[..]));
            }
            other => panic!("expected incomplete, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_garbage_is_invalid() {
        assert_eq!(parse(b"garbage").unwrap(), ParseResult::Invalid);
        assert_eq!(parse(b"garbage\r\nmore\r\n\r\n\x00").unwrap(), ParseResult::Invalid);
        assert_eq!(parse(b"\r\nSEND\r\n\r\n\x00").unwrap(), ParseResult::Invalid);
    }

    #[test]
    fn test_parse_truncated_command_is_incomplete() {
        assert!(matches!(parse(b"").unwrap(), ParseResult::Incomplete(_)));
        assert!(matches!(parse(b"MESS").unwrap(), ParseResult::Incomplete(_)));
        assert!(matches!(parse(b"MESSAGE\r").unwrap(), ParseResult::Incomplete(_)));
        assert!(matches!(parse(b"MESSAGE\r\nsubscr").unwrap(), ParseResult::Incomplete(_)));
    }

    #[test]
    fn test_parse_accepts_bare_lf() {
        let (frame, remainder) = complete(b"MESSAGE\ndestination:/topic/a\n\nhi\x00");
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.header("destination"), Some("/topic/a"));
        assert_eq!(frame.body_bytes(), b"hi");
        assert!(remainder.is_empty());
    }

    #[test]
    fn test_parse_splits_on_first_colon_only() {
        let (frame, _) = complete(b"MESSAGE\r\nurl:http://host:8080/x\r\n\r\n\x00");
        assert_eq!(frame.header("url"), Some("http://host:8080/x"));
    }

    #[test]
    fn test_parse_decodes_header_values() {
        let (frame, _) = complete(b"ERROR\r\nmessage:line1\\nline2\\cend\\\\\r\n\r\n\x00");
        assert_eq!(frame.header("message"), Some("line1\nline2:end\\"));
    }

    #[test]
    fn test_parse_malformed_header_is_fatal() {
        let result = parse(b"MESSAGE\r\nno-colon-here\r\n\r\n\x00");
        assert!(matches!(result, Err(ProtocolError::MalformedHeader(line)) if line == "no-colon-here"));
    }

    #[test]
    fn test_parse_invalid_utf8_header_is_fatal() {
        let result = parse(b"MESSAGE\r\nkey:\xff\xfe\r\n\r\n\x00");
        assert!(matches!(result, Err(ProtocolError::InvalidUtf8)));
    }

    #[test]
    fn test_parse_content_length_body_with_nul() {
        let (frame, remainder) = complete(b"MESSAGE\r\ncontent-length:5\r\n\r\nab\x00cd\x00rest");
        assert_eq!(frame.body_bytes(), b"ab\x00cd");
        assert_eq!(remainder, b"rest");
    }

    #[test]
    fn test_parse_content_length_incomplete() {
        let result = parse(b"MESSAGE\r\ncontent-length:5\r\n\r\nab\x00cd").unwrap();
        assert!(matches!(result, ParseResult::Incomplete(_)));
    }

    #[test]
    fn test_parse_content_length_without_terminator_is_fatal() {
        let result = parse(b"MESSAGE\r\ncontent-length:2\r\n\r\nabc\x00");
        assert!(matches!(
            result,
            Err(ProtocolError::MissingTerminator { expected_at: 2 })
        ));
    }

    #[test]
    fn test_parse_content_length_zero() {
        let (frame, remainder) = complete(b"MESSAGE\r\ncontent-length:0\r\n\r\n\x00");
        assert!(frame.body.is_none());
        assert!(remainder.is_empty());
    }

    #[test]
    fn test_parse_unparseable_content_length_scans_for_nul() {
        let (frame, _) = complete(b"MESSAGE\r\ncontent-length:abc\r\n\r\nbody\x00");
        assert_eq!(frame.body_bytes(), b"body");
    }

    #[test]
    fn test_parse_empty_body_is_none() {
        let (frame, _) = complete(b"RECEIPT\r\nreceipt-id:7\r\n\r\n\x00");
        assert!(frame.body.is_none());
    }

    #[test]
    fn test_parse_skips_exactly_one_separator() {
        let (_, remainder) = complete(b"RECEIPT\r\n\r\n\x00\r\nSEND");
        assert_eq!(remainder, b"SEND");

        let (_, remainder) = complete(b"RECEIPT\r\n\r\n\x00\n\nSEND");
        assert_eq!(remainder, b"\nSEND");
    }

    #[test]
    fn test_parse_returns_following_frames_as_remainder() {
        let buf = b"RECEIPT\r\nreceipt-id:1\r\n\r\n\x00MESSAGE\r\ndestination:/topic/a\r\n\r\nx\x00";
        let (first, remainder) = complete(buf);
        assert_eq!(first.header("receipt-id"), Some("1"));

        let (second, remainder) = complete(remainder);
        assert_eq!(second.command, Command::Message);
        assert_eq!(second.body_bytes(), b"x");
        assert!(remainder.is_empty());
    }

    #[test]
    fn test_parse_keeps_duplicate_headers_in_order() {
        let (frame, _) = complete(b"MESSAGE\r\nfoo:1\r\nfoo:2\r\n\r\n\x00");
        assert_eq!(
            frame.headers,
            vec![
                ("foo".to_string(), "1".to_string()),
                ("foo".to_string(), "2".to_string()),
            ]
        );
        assert_eq!(frame.header("foo"), Some("1"));
    }

    #[test]
    fn test_roundtrip_through_encode() {
        let frame = Frame::new(Command::Send)
            .with_header("destination", "/queue/orders")
            .with_header("content-type", "text/plain")
            .with_body("order #1");

        let encoded = frame.encode().unwrap();
        let (decoded, remainder) = complete(&encoded);
        assert_eq!(decoded, frame);
        assert!(remainder.is_empty());
    }
}
