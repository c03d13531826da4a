//! RTSP/HTTP-shaped response parsing.

use std::collections::HashMap;

use mediaremote_core::error::{Error, ProtocolError, Result};

/// Parsed response.
#[derive(Debug, Clone)]
pub struct RtspResponse {
    pub status_code: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl RtspResponse {
    /// Try to parse one complete response from the front of `buf`.
    ///
    /// Returns `Ok(None)` while the headers or the declared body are still
    /// incomplete; on success the response and the bytes consumed.
    pub fn try_parse(buf: &[u8]) -> Result<Option<(Self, usize)>> {
        let header_end = match buf.windows(4).position(|w| w == b"\r\n\r\n") {
            Some(pos) => pos,
            None => return Ok(None),
        };
        let body_start = header_end + 4;

        let header_text = std::str::from_utf8(&buf[..header_end]).map_err(|_| {
            ProtocolError::InvalidFormat("invalid UTF-8 in response headers".to_string())
        })?;
        let mut lines = header_text.lines();

        let status_line = lines
            .next()
            .ok_or_else(|| ProtocolError::InvalidFormat("missing status line".to_string()))?;
        let (status_code, status_text) = parse_status_line(status_line)?;

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((key, value)) = line.split_once(':') {
                headers.insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap_or(0);

        if buf.len() < body_start + content_length {
            return Ok(None);
        }
        let body = if content_length > 0 {
            Some(buf[body_start..body_start + content_length].to_vec())
        } else {
            None
        };

        Ok(Some((
            Self {
                status_code,
                status_text,
                headers,
                body,
            },
            body_start + content_length,
        )))
    }

    /// Parse a buffer expected to hold exactly one complete response.
    pub fn parse(data: &[u8]) -> Result<Self> {
        match Self::try_parse(data)? {
            Some((response, _)) => Ok(response),
            None => {
                Err(ProtocolError::InvalidFormat("truncated response".to_string()).into())
            }
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Header lookup, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn cseq(&self) -> Option<u32> {
        self.header("CSeq").and_then(|v| v.parse().ok())
    }

    /// Error out on a non-2xx status.
    pub fn ensure_success(&self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(Error::Protocol(ProtocolError::InvalidFormat(format!(
                "unexpected status {} {}",
                self.status_code, self.status_text
            ))))
        }
    }

    /// Decode the body as a binary plist.
    pub fn body_as_plist<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let body = self
            .body
            .as_deref()
            .ok_or(ProtocolError::MissingField("response body"))?;
        crate::plist_codec::decode(body)
    }
}

/// Parse "RTSP/1.0 200 OK" (HTTP/1.1 responses arrive on the pairing
/// endpoints and parse identically).
fn parse_status_line(line: &str) -> Result<(u16, String)> {
    let mut parts = line.splitn(3, ' ');
    let protocol = parts
        .next()
        .ok_or_else(|| ProtocolError::InvalidFormat("empty status line".to_string()))?;
    if !protocol.starts_with("RTSP/") && !protocol.starts_with("HTTP/") {
        return Err(ProtocolError::InvalidFormat(format!(
            "not a response status line: {}",
            line
        ))
        .into());
    }

    let code = parts
        .next()
        .and_then(|c| c.parse().ok())
        .ok_or_else(|| ProtocolError::InvalidFormat(format!("bad status code: {}", line)))?;
    let text = parts.next().unwrap_or("").to_string();
    Ok((code, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_response() {
        let data = b"RTSP/1.0 200 OK\r\nCSeq: 2\r\n\r\n";
        let response = RtspResponse::parse(data).unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.status_text, "OK");
        assert_eq!(response.cseq(), Some(2));
        assert!(response.body.is_none());
        assert!(response.is_success());
    }

    #[test]
    fn parses_http_status_lines_from_pairing_endpoints() {
        let data = b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabc";
        let response = RtspResponse::parse(data).unwrap();
        assert_eq!(response.body.as_deref(), Some(&b"abc"[..]));
    }

    #[test]
    fn try_parse_waits_for_the_full_body() {
        let data = b"RTSP/1.0 200 OK\r\nContent-Length: 5\r\n\r\nab";
        assert!(RtspResponse::try_parse(data).unwrap().is_none());

        let data = b"RTSP/1.0 200 OK\r\nContent-Length: 5\r\n\r\nabcde";
        let (response, consumed) = RtspResponse::try_parse(data).unwrap().unwrap();
        assert_eq!(consumed, data.len());
        assert_eq!(response.body.as_deref(), Some(&b"abcde"[..]));
    }

    #[test]
    fn try_parse_waits_for_headers() {
        assert!(RtspResponse::try_parse(b"RTSP/1.0 200 OK\r\nCSeq")
            .unwrap()
            .is_none());
    }

    #[test]
    fn try_parse_reports_trailing_bytes() {
        let data = b"RTSP/1.0 200 OK\r\n\r\nRTSP/1.0 404";
        let (_, consumed) = RtspResponse::try_parse(data).unwrap().unwrap();
        assert_eq!(consumed, 19);
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let data = b"RTSP/1.0 200 OK\r\ncontent-length: 0\r\nServer: AirTunes/366.0\r\n\r\n";
        let response = RtspResponse::parse(data).unwrap();
        assert_eq!(response.header("SERVER"), Some("AirTunes/366.0"));
    }

    #[test]
    fn ensure_success_rejects_errors() {
        let data = b"RTSP/1.0 470 Connection Authorization Required\r\n\r\n";
        let response = RtspResponse::parse(data).unwrap();
        assert!(!response.is_success());
        assert!(response.ensure_success().is_err());
    }

    #[test]
    fn garbage_status_line_is_an_error() {
        assert!(RtspResponse::parse(b"NOPE 200 OK\r\n\r\n").is_err());
    }
}
