//! HTTP proxy request handling
//!
//! `CONNECT host:port` opens a raw tunnel once the client connection is
//! upgraded. Any other method names an absolute `http://` URI which is
//! requested from the origin on the client's behalf.

use super::auth::check_proxy_auth;
use crate::context::ProxyContext;
use crate::error::ProxyError;
use crate::relay::relay_tcp;
use crate::request::{ProxyRequest, RequestKind};
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE, HOST, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION};
use http::uri::PathAndQuery;
use http::{Method, Request, Response, StatusCode, Uri};
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::body::Body;
use hyper::client::conn::http1 as client_http1;
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Response body produced by the proxy
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Default port for forwarded `http://` requests
const DEFAULT_HTTP_PORT: u16 = 80;

/// Header some clients send in place of `Connection` when talking to a proxy
const PROXY_CONNECTION: &str = "proxy-connection";

/// Serve one proxy request.
///
/// Every request is judged on its own: a `407` leaves the connection open so
/// the client can retry with credentials.
pub async fn handle_request<B>(
    req: Request<B>,
    ctx: Arc<ProxyContext>,
) -> Result<Response<ProxyBody>, hyper::Error>
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    if let Err(e) = check_proxy_auth(req.headers(), &ctx.policy) {
        warn!("HTTP {} {} rejected: {}", req.method(), req.uri(), e);
        return Ok(proxy_auth_required());
    }

    if req.method() == Method::CONNECT {
        handle_connect(req, ctx).await
    } else {
        handle_forward(req, ctx).await
    }
}

async fn handle_connect<B>(
    req: Request<B>,
    ctx: Arc<ProxyContext>,
) -> Result<Response<ProxyBody>, hyper::Error>
where
    B: Body + Send + 'static,
{
    let request = match connect_target(req.uri()) {
        Ok(request) => request,
        Err(e) => {
            warn!("Bad CONNECT target {}: {}", req.uri(), e);
            return Ok(text_response(StatusCode::BAD_REQUEST, e.to_string()));
        }
    };

    if !ctx.policy.permits(&request) {
        warn!("HTTP CONNECT destination {} not allowed", request);
        return Ok(text_response(
            StatusCode::FORBIDDEN,
            "Destination not allowed",
        ));
    }

    let target = match ctx.transport.connect(request.host(), request.port()).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Failed to connect to {}: {}", request, e);
            return Ok(text_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()));
        }
    };

    info!("HTTP CONNECT tunnel established to {}", request);

    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => match relay_tcp(TokioIo::new(upgraded), target).await {
                Ok(stats) => debug!("HTTP CONNECT tunnel to {} closed: {:?}", request, stats),
                Err(e) => debug!("HTTP CONNECT tunnel to {} ended: {}", request, e),
            },
            Err(e) => warn!("Upgrade failed for CONNECT to {}: {}", request, e),
        }
    });

    Ok(Response::new(empty()))
}

async fn handle_forward<B>(
    mut req: Request<B>,
    ctx: Arc<ProxyContext>,
) -> Result<Response<ProxyBody>, hyper::Error>
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    let request = match forward_target(req.uri()) {
        Ok(request) => request,
        Err(e) => {
            warn!("Bad forward target {}: {}", req.uri(), e);
            return Ok(text_response(StatusCode::BAD_REQUEST, e.to_string()));
        }
    };

    if !ctx.policy.permits(&request) {
        warn!("HTTP forward destination {} not allowed", request);
        return Ok(text_response(
            StatusCode::FORBIDDEN,
            "Destination not allowed",
        ));
    }

    if let Err(e) = to_origin_form(&mut req) {
        return Ok(text_response(StatusCode::BAD_REQUEST, e.to_string()));
    }

    let target = match ctx.transport.connect(request.host(), request.port()).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Failed to connect to {}: {}", request, e);
            return Ok(text_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()));
        }
    };

    let (mut sender, conn) = match client_http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(true)
        .handshake(TokioIo::new(target))
        .await
    {
        Ok(parts) => parts,
        Err(e) => {
            warn!("HTTP handshake with {} failed: {}", request, e);
            return Ok(text_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()));
        }
    };

    tokio::spawn(async move {
        if let Err(err) = conn.await {
            debug!("Origin connection ended: {:?}", err);
        }
    });

    debug!("Forwarding {} {} to {}", req.method(), req.uri(), request);

    match sender.send_request(req).await {
        Ok(resp) => Ok(resp.map(|b| b.boxed())),
        Err(e) => {
            warn!("Request to {} failed: {}", request, e);
            Ok(text_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
        }
    }
}

/// Target of a `CONNECT host:port` request; the port is mandatory
pub fn connect_target(uri: &Uri) -> Result<ProxyRequest, ProxyError> {
    let authority = uri
        .authority()
        .ok_or_else(|| ProxyError::Protocol("CONNECT target must be host:port".to_string()))?;
    let port = authority.port_u16().ok_or_else(|| {
        ProxyError::Protocol(format!("CONNECT target {} has no port", authority))
    })?;

    ProxyRequest::new(authority.host(), port, RequestKind::HttpConnect)
}

/// Target of a forwarded request; only absolute `http://` URIs qualify
pub fn forward_target(uri: &Uri) -> Result<ProxyRequest, ProxyError> {
    match uri.scheme_str() {
        Some(scheme) if scheme.eq_ignore_ascii_case("http") => {}
        Some(scheme) => {
            return Err(ProxyError::Protocol(format!(
                "Unsupported scheme: {}",
                scheme
            )))
        }
        None => {
            return Err(ProxyError::Protocol(
                "Request target must be an absolute URI".to_string(),
            ))
        }
    }

    let host = uri
        .host()
        .ok_or_else(|| ProxyError::Protocol("Request URI has no host".to_string()))?;
    let port = uri.port_u16().unwrap_or(DEFAULT_HTTP_PORT);

    ProxyRequest::new(host, port, RequestKind::HttpForward)
}

/// Rewrite an absolute-form request for the origin server.
///
/// The request line becomes `/path?query`, `Host` names the target and the
/// proxy-only headers are dropped.
fn to_origin_form<B>(req: &mut Request<B>) -> Result<(), ProxyError> {
    let host = match (req.uri().host(), req.uri().port_u16()) {
        (Some(host), Some(port)) => format!("{}:{}", host, port),
        (Some(host), None) => host.to_string(),
        (None, _) => return Err(ProxyError::Protocol("Request URI has no host".to_string())),
    };
    let host = HeaderValue::from_str(&host)
        .map_err(|e| ProxyError::Protocol(format!("Invalid host: {}", e)))?;

    let path_and_query = req
        .uri()
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));
    *req.uri_mut() = Uri::builder()
        .path_and_query(path_and_query)
        .build()
        .map_err(|e| ProxyError::Protocol(format!("Invalid request target: {}", e)))?;

    let headers = req.headers_mut();
    headers.insert(HOST, host);
    headers.remove(PROXY_AUTHORIZATION);
    headers.remove(PROXY_CONNECTION);

    Ok(())
}

fn proxy_auth_required() -> Response<ProxyBody> {
    let mut resp = text_response(
        StatusCode::PROXY_AUTHENTICATION_REQUIRED,
        "Proxy authentication required",
    );
    resp.headers_mut()
        .insert(PROXY_AUTHENTICATE, HeaderValue::from_static("Basic"));
    resp
}

fn text_response<T: Into<String>>(status: StatusCode, message: T) -> Response<ProxyBody> {
    let mut body = message.into();
    body.push('\n');

    let mut resp = Response::new(full(body));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    resp
}

fn empty() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

fn full<T: Into<Bytes>>(chunk: T) -> ProxyBody {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}
