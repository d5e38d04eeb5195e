//! HTTP side of the relay: the listener page and the live mount.

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::{StreamExt, stream};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;

use crate::relay::{PageRelay, RelayError};
use crate::{tau_debug, tau_error, tau_info, tau_warn};

pub type HttpBody = UnsyncBoxBody<Bytes, io::Error>;

pub const OGG_MIME: &str = "audio/ogg";

pub struct HttpFrontend {
    relay: Arc<PageRelay>,
    listener: TcpListener,
    local_addr: SocketAddr,
    mount: String,
    static_dir: PathBuf,
}

impl HttpFrontend {
    /// Binds `addr`; mount and static directory come from the relay's config.
    pub async fn bind(addr: &str, relay: Arc<PageRelay>) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::Bind(addr.to_string(), e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| RelayError::Bind(addr.to_string(), e))?;
        let mount = relay.config().mount().to_string();
        let static_dir = relay.config().static_dir().to_path_buf();

        Ok(Self { relay, listener, local_addr, mount, static_dir })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn mount_url(&self) -> String {
        format!("http://{}/{}", self.local_addr, self.mount)
    }

    pub async fn run(self: Arc<Self>) {
        tau_info!("Serving HTTP on {} (mount /{})", self.local_addr, self.mount);

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(sp) => sp,
                Err(e) => {
                    tau_error!("Error accepting HTTP connection: {:?}", e);
                    continue;
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                tau_warn!("Failed to set TCP_NODELAY: {:?}", e);
            }

            let frontend = Arc::clone(&self);
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let frontend = Arc::clone(&frontend);
                    async move { frontend.handle(req).await }
                });
                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    tau_debug!("HTTP connection from {} ended: {}", peer, e);
                }
            });
        }
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Result<Response<HttpBody>, Infallible> {
        if req.method() != Method::GET {
            return Ok(status(StatusCode::METHOD_NOT_ALLOWED));
        }

        let path = req.uri().path();
        // Refuse anything that could climb out of the static directory.
        if path.contains("..") {
            return Ok(status(StatusCode::NOT_FOUND));
        }

        let relative = path.trim_start_matches('/');
        if relative == self.mount {
            return Ok(self.stream_mount());
        }

        let relative = if relative.is_empty() { "index.html" } else { relative };
        Ok(send_file(&self.static_dir.join(relative)).await)
    }

    /// Cached header pages first, then every page published after subscribing.
    fn stream_mount(&self) -> Response<HttpBody> {
        let rx = self.relay.subscribe();
        let head = stream::iter(self.relay.cached_headers().map(Ok::<_, io::Error>));

        let pages = stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(page) => return Some((Ok(page), rx)),
                    Err(RecvError::Lagged(skipped)) => {
                        tau_warn!("Mount listener lagged, skipped {} pages", skipped);
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        });

        let body = StreamBody::new(head.chain(pages).map(|page| page.map(Frame::data)));
        let mut resp = Response::new(BodyExt::boxed_unsync(body));
        let headers = resp.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(OGG_MIME));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        resp
    }
}

async fn send_file(path: &Path) -> Response<HttpBody> {
    let contents = match tokio::fs::read(path).await {
        Ok(c) => c,
        Err(e) => {
            tau_warn!("Unable to open file {}: {}", path.display(), e);
            return status(StatusCode::NOT_FOUND);
        }
    };

    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let mut resp = Response::new(full(Bytes::from(contents)));
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        resp.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    resp
}

fn full(bytes: Bytes) -> HttpBody {
    Full::new(bytes).map_err(|never| match never {}).boxed_unsync()
}

fn status(code: StatusCode) -> Response<HttpBody> {
    let reason = code.canonical_reason().unwrap_or("").as_bytes();
    let mut resp = Response::new(full(Bytes::copy_from_slice(reason)));
    *resp.status_mut() = code;
    resp
}
