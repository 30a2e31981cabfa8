/// Inbound request model and HTTP/1.x request-head parsing.
use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;

/// Maximum number of header lines accepted in a request head.
const MAX_HEADERS: usize = 64;

/// One request as seen by the resolver. Bodies are never read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    pub method: String,
    /// Raw path component, query stripped.
    pub path: String,
    /// Query arguments; repeated names keep every value in order.
    pub args: BTreeMap<String, Vec<String>>,
    pub peer: SocketAddr,
    /// Header lines in arrival order, names as sent.
    pub headers: Vec<(String, String)>,
}

impl InboundRequest {
    /// Build a request from a method and request target (`/path?query`).
    pub fn new(method: &str, target: &str, peer: SocketAddr) -> Self {
        let (path, query) = split_target(target);
        Self {
            method: method.to_string(),
            path,
            args: parse_query(query),
            peer,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Try to parse a request head from `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed, otherwise the request and
    /// the number of bytes the head occupied.
    pub fn parse(buf: &[u8], peer: SocketAddr) -> io::Result<Option<(Self, usize)>> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);

        let consumed = match req.parse(buf) {
            Ok(httparse::Status::Complete(len)) => len,
            Ok(httparse::Status::Partial) => return Ok(None),
            Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string())),
        };

        let (Some(method), Some(target)) = (req.method, req.path) else {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "incomplete request line"));
        };

        let mut request = Self::new(method, target, peer);
        request.headers = req
            .headers
            .iter()
            .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
            .collect();

        Ok(Some((request, consumed)))
    }

    /// First value of header `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Headers keyed by lowercase name; repeated headers are joined with `,`.
    pub fn header_map(&self) -> BTreeMap<String, String> {
        let mut map: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in &self.headers {
            map.entry(name.to_ascii_lowercase())
                .and_modify(|existing| {
                    existing.push(',');
                    existing.push_str(value);
                })
                .or_insert_with(|| value.clone());
        }
        map
    }

    /// Client address for logging. With `forwarded` set, proxy headers win
    /// over the socket peer.
    pub fn client_ip(&self, forwarded: bool) -> String {
        if forwarded {
            let from_proxy = self
                .header("X-Forwarded-For")
                .and_then(|v| v.split(',').next())
                .or_else(|| self.header("X-Real-IP"))
                .map(str::trim)
                .filter(|v| !v.is_empty());
            if let Some(ip) = from_proxy {
                return ip.to_string();
            }
        }
        self.peer.ip().to_string()
    }
}

/// Split a request target into its path and query string. Absolute-form
/// targets (`http://host/path`) are reduced to their path.
fn split_target(target: &str) -> (String, &str) {
    let target = match target.find("://").filter(|_| !target.starts_with('/')) {
        Some(scheme_end) => {
            let rest = &target[scheme_end + 3..];
            match rest.find(|c: char| c == '/' || c == '?') {
                Some(i) => &rest[i..],
                None => "/",
            }
        }
        None => target,
    };
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    let path = path.split('#').next().unwrap_or_default();
    (path.to_string(), query.split('#').next().unwrap_or_default())
}

fn parse_query(query: &str) -> BTreeMap<String, Vec<String>> {
    let mut args: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
        args.entry(name.into_owned()).or_default().push(value.into_owned());
    }
    args
}
