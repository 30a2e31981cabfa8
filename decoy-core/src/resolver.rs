/// Request resolver: turns one inbound request into an observation record and
/// a response served from the content index.
///
/// Resolution order for `GET`:
///   1. `sitemap.xml` is always synthesized from the index
///   2. exact index match
///   3. index match with `.html` appended (`/about` -> `about.html`)
///   4. 404, using `404.html` from the index when there is one
use crate::config::RuntimeOptions;
use crate::identity::ServerIdentity;
use crate::index::ContentIndex;
use crate::observation::{ObservationRecord, ObservationSink};
use crate::request::InboundRequest;
use crate::response::Response;
use std::io;
use std::path::{Path, PathBuf};

const INDEX_PAGE: &str = "index.html";
const SITEMAP: &str = "sitemap.xml";
const NOT_FOUND_PAGE: &str = "404.html";

const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// Compression suffixes reported as an encoding next to the media type.
const ENCODINGS: &[(&str, &str)] = &[
    (".gz", "gzip"),
    (".Z", "compress"),
    (".bz2", "bzip2"),
    (".xz", "xz"),
    (".br", "br"),
];

/// Shared, read-only state of the emulated web server. Safe to share across
/// tasks; nothing changes after construction.
pub struct Responder {
    root: PathBuf,
    index: ContentIndex,
    identity: ServerIdentity,
    options: RuntimeOptions,
    sink: Box<dyn ObservationSink>,
}

impl Responder {
    /// Index `root` and build a responder around it. Fails if the root can't
    /// be read.
    pub fn new(
        root: impl Into<PathBuf>,
        identity: ServerIdentity,
        options: RuntimeOptions,
        sink: impl ObservationSink + 'static,
    ) -> io::Result<Self> {
        let root = root.into();
        let index = ContentIndex::build(&root)?;
        Ok(Self::with_index(root, index, identity, options, sink))
    }

    /// Build a responder around an already built index of `root`.
    pub fn with_index(
        root: impl Into<PathBuf>,
        index: ContentIndex,
        identity: ServerIdentity,
        options: RuntimeOptions,
        sink: impl ObservationSink + 'static,
    ) -> Self {
        Self {
            root: root.into(),
            index,
            identity,
            options,
            sink: Box::new(sink),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index(&self) -> &ContentIndex {
        &self.index
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    pub fn options(&self) -> RuntimeOptions {
        self.options
    }

    /// Observe `request`, then answer it.
    pub fn handle(&self, request: &InboundRequest) -> Response {
        let record = ObservationRecord::from_request(request, self.options);
        self.sink.record(&record);

        let mut response = self.resolve(request);
        self.identity.apply(&mut response);

        tracing::debug!(
            "{}:{} {} {} -> {}",
            record.src_ip,
            record.src_port,
            request.method,
            request.path,
            response.status
        );
        response
    }

    /// Response for a request head that couldn't be parsed. Nothing is
    /// observed since there is no method or path to record.
    pub fn bad_request(&self) -> Response {
        let mut response = Response::bad_request();
        self.identity.apply(&mut response);
        response
    }

    fn resolve(&self, request: &InboundRequest) -> Response {
        if request.method != "GET" {
            return Response::method_not_allowed();
        }

        let name = normalize_path(&request.path);
        if name == SITEMAP {
            let mut response = Response::with_body(200, render_sitemap(&self.index));
            response.set_header("Content-Type", XML_CONTENT_TYPE);
            return response;
        }

        let name = if self.index.contains(&name) {
            name
        } else {
            format!("{}.html", name)
        };
        if !self.index.contains(&name) {
            return self.not_found();
        }

        match self.read(&name) {
            Ok(body) => {
                let mut response = Response::with_body(200, body);
                if let Some(content_type) = guess_content_type(&name) {
                    response.set_header("Content-Type", &content_type);
                }
                response
            }
            Err(e) => {
                tracing::error!("Indexed file {:?} could not be read: {}", name, e);
                Response::internal_error()
            }
        }
    }

    fn not_found(&self) -> Response {
        if !self.index.contains(NOT_FOUND_PAGE) {
            return Response::not_found();
        }
        match self.read(NOT_FOUND_PAGE) {
            Ok(body) => {
                let mut response = Response::with_body(404, body);
                response.set_header("Content-Type", HTML_CONTENT_TYPE);
                response
            }
            Err(e) => {
                tracing::error!("Indexed file {:?} could not be read: {}", NOT_FOUND_PAGE, e);
                Response::internal_error()
            }
        }
    }

    /// `name` must come from the index.
    fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.root.join(name))
    }
}

/// Strip surrounding slashes; the bare root maps to the index page.
fn normalize_path(path: &str) -> String {
    match path.trim_matches('/') {
        "" => INDEX_PAGE.to_string(),
        name => name.to_string(),
    }
}

/// Media type for `name`, with a compression encoding appended after `; `.
fn guess_content_type(name: &str) -> Option<String> {
    let (stem, encoding) = ENCODINGS
        .iter()
        .find_map(|(suffix, enc)| name.strip_suffix(suffix).map(|stem| (stem, Some(*enc))))
        .unwrap_or((name, None));

    let media_type = mime_guess::from_path(stem).first_raw()?;
    Some(match encoding {
        Some(enc) => format!("{}; {}", media_type, enc),
        None => media_type.to_string(),
    })
}

fn render_sitemap(index: &ContentIndex) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for name in index.iter() {
        xml.push_str("<url><loc>/");
        xml.push_str(&escape_xml(name));
        xml.push_str("</loc></url>\n");
    }
    xml.push_str("</urlset>");
    xml
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
