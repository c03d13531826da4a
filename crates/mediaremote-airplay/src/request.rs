//! RTSP/HTTP-shaped request formatting.

use std::collections::HashMap;
use std::io::Write;

/// Content type for binary-plist bodies.
pub const CONTENT_TYPE_BPLIST: &str = "application/x-apple-binary-plist";

/// Content type for pairing TLV bodies.
pub const CONTENT_TYPE_TLV: &str = "application/octet-stream";

/// Request methods used after verify, plus the pairing POSTs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtspMethod {
    Setup,
    Record,
    Post,
    Get,
}

impl RtspMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "SETUP",
            Self::Record => "RECORD",
            Self::Post => "POST",
            Self::Get => "GET",
        }
    }
}

/// Request builder.
#[derive(Debug, Clone)]
pub struct RtspRequest {
    pub method: RtspMethod,
    pub uri: String,
    /// Protocol token on the request line; pairing endpoints use HTTP/1.1,
    /// everything after verify uses RTSP/1.0.
    pub protocol: &'static str,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
}

impl RtspRequest {
    pub fn new(method: RtspMethod, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            protocol: "RTSP/1.0",
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize to wire format:
    ///
    /// ```text
    /// METHOD URI PROTO\r\n
    /// CSeq: N\r\n
    /// Content-Length: M\r\n   (if body present)
    /// Header: Value\r\n ...
    /// \r\n
    /// [body]
    /// ```
    pub fn serialize(&self, cseq: u32) -> Vec<u8> {
        let mut out = Vec::new();

        write!(
            &mut out,
            "{} {} {}\r\n",
            self.method.as_str(),
            self.uri,
            self.protocol
        )
        .expect("write to Vec is infallible");
        write!(&mut out, "CSeq: {}\r\n", cseq).expect("write to Vec is infallible");

        if let Some(ref body) = self.body {
            write!(&mut out, "Content-Length: {}\r\n", body.len())
                .expect("write to Vec is infallible");
        }

        // Sorted for deterministic output.
        let mut sorted: Vec<_> = self.headers.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in sorted {
            write!(&mut out, "{}: {}\r\n", key, value).expect("write to Vec is infallible");
        }

        out.extend_from_slice(b"\r\n");
        if let Some(ref body) = self.body {
            out.extend_from_slice(body);
        }
        out
    }

    // Factories for the method surface this transport speaks.

    /// Channel SETUP with a binary-plist body.
    pub fn setup(uri: impl Into<String>, body: Vec<u8>) -> Self {
        Self::new(RtspMethod::Setup, uri)
            .header("Content-Type", CONTENT_TYPE_BPLIST)
            .body(body)
    }

    /// RECORD, marking the client ready to receive.
    pub fn record(uri: impl Into<String>) -> Self {
        Self::new(RtspMethod::Record, uri)
    }

    /// Heartbeat POST; no body.
    pub fn feedback() -> Self {
        Self::new(RtspMethod::Post, "/feedback")
    }

    /// Pairing PIN trigger; plaintext HTTP, empty body.
    pub fn pair_pin_start() -> Self {
        let mut request = Self::new(RtspMethod::Post, "/pair-pin-start");
        request.protocol = "HTTP/1.1";
        request
    }

    /// Pair-setup TLV exchange; plaintext HTTP.
    pub fn pair_setup(tlv: Vec<u8>) -> Self {
        let mut request = Self::new(RtspMethod::Post, "/pair-setup")
            .header("Content-Type", CONTENT_TYPE_TLV)
            .body(tlv);
        request.protocol = "HTTP/1.1";
        request
    }

    /// Pair-verify TLV exchange; plaintext HTTP on the same connection
    /// that will be upgraded.
    pub fn pair_verify(tlv: Vec<u8>) -> Self {
        let mut request = Self::new(RtspMethod::Post, "/pair-verify")
            .header("Content-Type", CONTENT_TYPE_TLV)
            .body(tlv);
        request.protocol = "HTTP/1.1";
        request
    }
}
