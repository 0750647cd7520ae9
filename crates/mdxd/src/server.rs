//! Dictionary server
//!
//! One HTTP listener per dictionary. Every `GET /<key>` is handed to the
//! dictionary's `LookupResolver` and the result rendered as a page, a
//! resource, a static file, or a bare 404.

use crate::html::PageAssembler;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    Router,
};
use mdx_common::{
    ArchiveError, ArchiveOpener, DictionaryDescriptor, DictionaryInfo, FileInfo, LookupResolver,
    Resolution,
};
use once_cell::sync::OnceCell;
use percent_encoding::percent_decode_str;
use std::path::Path;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

/// A dictionary whose archives are open, not yet bound to a port
pub struct Dictionary {
    descriptor: DictionaryDescriptor,
    resolver: LookupResolver,
    pages: PageAssembler,
}

impl Dictionary {
    /// Open the entry and resource archives of `descriptor`.
    ///
    /// An unreadable injection fragment is logged and left out.
    pub fn open(
        descriptor: DictionaryDescriptor,
        opener: &dyn ArchiveOpener,
        shared_script: Arc<str>,
    ) -> Result<Self, ArchiveError> {
        let entries = opener.open(&descriptor.entry_archive_path())?;
        let resources = descriptor
            .resource_archive_paths()
            .iter()
            .map(|path| opener.open(path))
            .collect::<Result<Vec<_>, _>>()?;

        let fragment = descriptor
            .injection_fragment_path()
            .and_then(|path| read_fragment(&path));

        let title = descriptor.title();
        let resolver = LookupResolver::new(descriptor.root_dir.clone(), entries, resources);
        Ok(Self {
            pages: PageAssembler::new(shared_script, fragment, title),
            descriptor,
            resolver,
        })
    }

    /// Assemble from parts already at hand
    pub fn from_parts(descriptor: DictionaryDescriptor, resolver: LookupResolver, pages: PageAssembler) -> Self {
        Self {
            descriptor,
            resolver,
            pages,
        }
    }

    pub fn descriptor(&self) -> &DictionaryDescriptor {
        &self.descriptor
    }

    pub fn title(&self) -> String {
        self.descriptor.title()
    }
}

fn read_fragment(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(fragment) => Some(fragment),
        Err(e) => {
            warn!("Ignoring injection fragment {}: {}", path.display(), e);
            None
        }
    }
}

/// A dictionary bound to a port
pub struct DictionaryServer {
    dictionary: Dictionary,
    port: u16,
    info: OnceCell<DictionaryInfo>,
}

impl DictionaryServer {
    pub fn new(dictionary: Dictionary, port: u16) -> Self {
        Self {
            dictionary,
            port,
            info: OnceCell::new(),
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn descriptor(&self) -> &DictionaryDescriptor {
        &self.dictionary.descriptor
    }

    /// Info projection, computed on first use
    pub fn info(&self) -> &DictionaryInfo {
        self.info.get_or_init(|| {
            let descriptor = &self.dictionary.descriptor;
            DictionaryInfo {
                mdx_dir: descriptor.root_dir.clone(),
                file_info: FileInfo::from(descriptor),
                mdx_header: self.dictionary.resolver.header(),
                port: self.port,
                title: descriptor.title(),
            }
        })
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .fallback(lookup)
            .with_state(self)
            .layer(TraceLayer::new_for_http())
    }

    async fn render(&self, resolution: Resolution) -> Response {
        match resolution {
            Resolution::StaticFile { path, mime } => send_file(&path, &mime).await,
            Resolution::Entry { definition } => {
                Html(self.dictionary.pages.assemble(&definition)).into_response()
            }
            Resolution::Resource { key, bytes, mime } => {
                let mut response = (content_type(&mime), bytes).into_response();
                match content_disposition(&key) {
                    Some(value) => {
                        response
                            .headers_mut()
                            .insert(header::CONTENT_DISPOSITION, value);
                    }
                    None => warn!(key = %key, "Resource key not usable as a file name"),
                }
                response
            }
            Resolution::NotFound => not_found(),
        }
    }
}

async fn lookup(
    State(server): State<Arc<DictionaryServer>>,
    method: Method,
    uri: Uri,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    // The root belongs to the gateway; undecodable keys cannot be headwords
    let Some(key) = lookup_key(uri.path()) else {
        return not_found();
    };

    let task_server = server.clone();
    let task_key = key.clone();
    let resolved =
        tokio::task::spawn_blocking(move || task_server.dictionary.resolver.resolve(&task_key)).await;

    let title = server.info().title.as_str();
    match resolved {
        Ok(Ok(resolution)) => {
            debug!(dictionary = title, key = %key, ?resolution, "Resolved");
            server.render(resolution).await
        }
        Ok(Err(e)) => {
            error!(dictionary = title, key = %key, "Lookup failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            error!(dictionary = title, key = %key, "Lookup task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// URL-decoded path without its leading slash. `None` for the root and for
/// paths that do not decode to UTF-8.
pub fn lookup_key(path: &str) -> Option<String> {
    let decoded = percent_decode_str(path).decode_utf8().ok()?;
    let key = decoded.strip_prefix('/').unwrap_or(&decoded);
    (!key.is_empty()).then(|| key.to_string())
}

/// Stream a file from disk
pub(crate) async fn send_file(path: &Path, mime: &str) -> Response {
    match tokio::fs::File::open(path).await {
        Ok(file) => {
            let body = Body::from_stream(ReaderStream::new(file));
            (content_type(mime), body).into_response()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => not_found(),
        Err(e) => {
            error!("Failed to open {}: {}", path.display(), e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn content_type(mime: &str) -> [(header::HeaderName, HeaderValue); 1] {
    let value = HeaderValue::from_str(mime)
        .unwrap_or_else(|_| HeaderValue::from_static(mdx_common::mime::FALLBACK_MIME));
    [(header::CONTENT_TYPE, value)]
}

fn content_disposition(key: &str) -> Option<HeaderValue> {
    let escaped = key.replace('\\', "\\\\").replace('"', "\\\"");
    HeaderValue::from_bytes(format!("inline; filename=\"{}\"", escaped).as_bytes()).ok()
}

fn not_found() -> Response {
    StatusCode::NOT_FOUND.into_response()
}
