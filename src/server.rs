use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hyper::header::{self, HeaderValue};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use mime_guess::MimeGuess;
use percent_encoding::percent_decode_str;
use tokio::fs;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::augment::AugmentOptions;
use crate::error::{Error, Result};
use crate::injector;

pub async fn run(doc_dir: &Path, addr: SocketAddr, options: AugmentOptions) -> Result<()> {
    let state = Arc::new(ServerState::new(doc_dir, options).await?);

    let server = Server::try_bind(&addr)?;
    println!("Serving docs from {} at http://{}", state.doc_root.display(), addr);
    println!("Press Ctrl+C to stop.");

    let make_service = make_service_fn(move |_conn| {
        let state = state.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let state = state.clone();
                async move { handle_request(state, req).await }
            }))
        }
    });

    server.serve(make_service).await?;
    Ok(())
}

struct ServerState {
    doc_root: PathBuf,
    canonical_root: PathBuf,
    options: AugmentOptions,
}

impl ServerState {
    async fn new(doc_dir: &Path, options: AugmentOptions) -> Result<Self> {
        let canonical_root = fs::canonicalize(doc_dir)
            .await
            .map_err(|e| Error::io(doc_dir, e))?;
        Ok(Self {
            doc_root: doc_dir.to_path_buf(),
            canonical_root,
            options,
        })
    }

    fn join(&self, uri_path: &str) -> Option<PathBuf> {
        let mut buf = self.doc_root.clone();

        for segment in uri_path.split('/') {
            if segment.is_empty() || segment == "." {
                continue;
            }
            let decoded = percent_decode_str(segment).decode_utf8().ok()?;
            if decoded.contains('\\') || decoded.contains('\0') || decoded == ".." {
                return None;
            }
            buf.push(decoded.as_ref());
        }

        Some(buf)
    }

    async fn locate(&self, uri_path: &str) -> io::Result<Option<PathBuf>> {
        let Some(mut candidate) = self.join(uri_path) else {
            return Ok(None);
        };

        let mut metadata = match fs::metadata(&candidate).await {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };

        if metadata.is_dir() {
            candidate.push(&self.options.index_file);
            metadata = match fs::metadata(&candidate).await {
                Ok(meta) => meta,
                Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(err) => return Err(err),
            };
        }

        if !metadata.is_file() {
            return Ok(None);
        }

        let canonical = fs::canonicalize(&candidate).await?;
        if !canonical.starts_with(&self.canonical_root) {
            return Ok(None);
        }

        Ok(Some(candidate))
    }
}

async fn handle_request(
    state: Arc<ServerState>,
    req: Request<Body>,
) -> std::result::Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let mut response = match method {
        Method::GET | Method::HEAD => match serve_path(&state, &path).await {
            Ok(resp) => resp,
            Err(err) => err.into_response(),
        },
        _ => method_not_allowed(),
    };
    debug!(%method, path = %path, status = response.status().as_u16(), "request");

    if method == Method::HEAD {
        response = response.map(|_| Body::empty());
    }

    Ok(response)
}

async fn serve_path(
    state: &ServerState,
    path: &str,
) -> std::result::Result<Response<Body>, ServerError> {
    let resolved = state.locate(path).await?.ok_or(ServerError::NotFound)?;

    let extension = resolved
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();

    if extension.eq_ignore_ascii_case("html") {
        serve_html(state, &resolved, path).await
    } else {
        serve_file(&resolved).await
    }
}

// The request path stands in for the page location, so `/` and
// `/docs/index.html` both count as the index.
async fn serve_html(
    state: &ServerState,
    file: &Path,
    page_path: &str,
) -> std::result::Result<Response<Body>, ServerError> {
    let content = fs::read_to_string(file).await?;
    let body = injector::inject(&content, page_path, &state.options).unwrap_or(content);

    Ok(with_content_type(
        Response::new(Body::from(body)),
        "text/html; charset=utf-8",
    ))
}

async fn serve_file(path: &Path) -> std::result::Result<Response<Body>, ServerError> {
    let file = fs::File::open(path).await?;
    let stream = ReaderStream::new(file);

    let mime = MimeGuess::from_path(path).first_or_octet_stream();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime.as_ref())
        .body(Body::wrap_stream(stream))
        .map_err(|err| ServerError::Internal(err.to_string()))
}

#[derive(Debug)]
enum ServerError {
    NotFound,
    Internal(String),
    Io(io::Error),
}

impl ServerError {
    fn into_response(self) -> Response<Body> {
        match self {
            ServerError::NotFound => simple_text(StatusCode::NOT_FOUND, "Not Found"),
            ServerError::Io(err) => match err.kind() {
                io::ErrorKind::NotFound => simple_text(StatusCode::NOT_FOUND, "Not Found"),
                io::ErrorKind::PermissionDenied => {
                    simple_text(StatusCode::FORBIDDEN, "Permission Denied")
                }
                _ => simple_text(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            },
            ServerError::Internal(message) => {
                simple_text(StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        }
    }
}

impl From<io::Error> for ServerError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

fn with_content_type(mut response: Response<Body>, content_type: &'static str) -> Response<Body> {
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn simple_text(status: StatusCode, body: impl Into<String>) -> Response<Body> {
    let mut response = Response::new(Body::from(body.into()));
    *response.status_mut() = status;
    with_content_type(response, "text/plain; charset=utf-8")
}

fn method_not_allowed() -> Response<Body> {
    simple_text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const TOC_PAGE: &str = "<html><head></head><body><div id=\"toc\"><div id=\"toctitle\">Contents</div>\
        <ul></ul></div></body></html>";

    async fn state_for(dir: &TempDir) -> Arc<ServerState> {
        Arc::new(
            ServerState::new(dir.path(), AugmentOptions::default())
                .await
                .expect("state"),
        )
    }

    async fn get(state: Arc<ServerState>, method: Method, uri: &str) -> (StatusCode, String) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .expect("request");
        let response = handle_request(state, req).await.expect("infallible");
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body())
            .await
            .expect("body");
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[test]
    fn join_rejects_traversal() {
        let state = ServerState {
            doc_root: PathBuf::from("/srv/docs"),
            canonical_root: PathBuf::from("/srv/docs"),
            options: AugmentOptions::default(),
        };
        assert_eq!(
            state.join("/guide/my%20page.html"),
            Some(PathBuf::from("/srv/docs/guide/my page.html"))
        );
        assert_eq!(state.join("/guide/../../etc/passwd"), None);
        assert_eq!(state.join("/a%5Cb"), None);
    }

    #[tokio::test]
    async fn serves_augmented_pages() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("guide")).expect("mkdir");
        std::fs::write(dir.path().join("index.html"), TOC_PAGE).expect("write");
        std::fs::write(dir.path().join("guide/setup.html"), TOC_PAGE).expect("write");
        std::fs::write(dir.path().join("site.css"), "body {}").expect("write");
        let state = state_for(&dir).await;

        let (status, body) = get(state.clone(), Method::GET, "/guide/setup.html").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("header-spring"));
        assert!(body.contains("back-action"));

        let (status, body) = get(state.clone(), Method::GET, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("header-spring"));
        assert!(!body.contains("back-action"));

        let (status, body) = get(state.clone(), Method::GET, "/site.css").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "body {}");

        let (status, body) = get(state.clone(), Method::HEAD, "/guide/setup.html").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "");
    }

    #[tokio::test]
    async fn reports_missing_files_and_bad_methods() {
        let dir = TempDir::new().expect("tempdir");
        let state = state_for(&dir).await;

        let (status, _) = get(state.clone(), Method::GET, "/missing.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get(state, Method::POST, "/index.html").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}
