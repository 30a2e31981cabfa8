/// HTTP response model and HTTP/1.1 serialization.
///
/// Every connection carries exactly one response and is closed afterwards,
/// so the serialized form always ends with `Connection: close`.

/// Banner the transport would announce on its own, before any spoofing.
pub const NATIVE_SERVER: &str = concat!("decoy-httpd/", env!("CARGO_PKG_VERSION"));

/// Content type sent when the resolver didn't pick one.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

pub const METHOD_NOT_ALLOWED_BODY: &[u8] = b"<html><body>Method not allowed</body></html>";
pub const NOT_FOUND_BODY: &[u8] = b"<html><body>Not Found</body></html>";
pub const INTERNAL_ERROR_BODY: &[u8] = b"<html><body>Internal Server Error</body></html>";
pub const BAD_REQUEST_BODY: &[u8] = b"<html><body>Bad Request</body></html>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: vec![("Server".into(), NATIVE_SERVER.into())],
            body: Vec::new(),
        }
    }

    pub fn with_body(status: u16, body: impl Into<Vec<u8>>) -> Self {
        let mut response = Self::new(status);
        response.body = body.into();
        response
    }

    pub fn method_not_allowed() -> Self {
        Self::with_body(405, METHOD_NOT_ALLOWED_BODY)
    }

    pub fn not_found() -> Self {
        Self::with_body(404, NOT_FOUND_BODY)
    }

    pub fn internal_error() -> Self {
        Self::with_body(500, INTERNAL_ERROR_BODY)
    }

    pub fn bad_request() -> Self {
        Self::with_body(400, BAD_REQUEST_BODY)
    }

    /// First value of `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Set `name`, replacing any existing values.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.remove_header(name);
        self.headers.push((name.to_string(), value.to_string()));
    }

    pub fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    /// Serialize to an HTTP/1.1 response.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, reason_phrase(self.status));
        for (name, value) in &self.headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        if self.content_type().is_none() {
            head.push_str(&format!("Content-Type: {}\r\n", DEFAULT_CONTENT_TYPE));
        }
        head.push_str(&format!(
            "Content-Length: {}\r\n\
             Connection: close\r\n\
             \r\n",
            self.body.len()
        ));

        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
