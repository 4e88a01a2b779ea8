use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use engine_logging::{engine_debug, engine_error};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use mux_core::{MultiplexError, MultiplexRequest, Reply};
use mux_engine::{CancellationToken, Multiplexer};

pub const MULTIPLEX_PATH: &str = "/multiplex";

/// Shared by every connection of one server.
#[derive(Debug)]
pub struct AppState {
    pub multiplexer: Multiplexer,
    /// Parent of every request's cancellation scope; fired when the
    /// shutdown grace period runs out.
    pub abort: CancellationToken,
}

pub async fn handle(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    if parts.uri.path() != MULTIPLEX_PATH {
        return Ok(into_response(Reply::not_found()));
    }
    if parts.method != Method::POST {
        return Ok(into_response(Reply::method_not_allowed()));
    }
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            engine_debug!("Failed to read request body: {}", err);
            return Ok(into_response(Reply::bad_request()));
        }
    };

    // Dropped with this future when the client goes away.
    let cancel = state.abort.child_token();
    let _cancel_on_drop = cancel.clone().drop_guard();
    let reply = multiplex_reply(&state.multiplexer, &body, &cancel, parts.uri.path()).await;
    Ok(into_response(reply))
}

/// Decodes a `MultiplexRequest`, runs the batch and renders the outcome.
pub async fn multiplex_reply(
    multiplexer: &Multiplexer,
    body: &[u8],
    cancel: &CancellationToken,
    route: &str,
) -> Reply {
    let request: MultiplexRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(err) => {
            engine_debug!("Rejected request body at {}: {}", route, err);
            return Reply::bad_request();
        }
    };

    match multiplexer.multiplex(&request.urls, cancel).await {
        Ok(results) => Reply::from_results(&results).unwrap_or_else(|err| {
            engine_error!("Internal error at handler url={} error={}", route, err);
            Reply::internal_error()
        }),
        Err(err) => {
            if let MultiplexError::Unclassified { url, cause } = &err {
                engine_error!(
                    "Internal error at handler url={} fetch={:?} error={}",
                    route,
                    url,
                    cause
                );
            }
            Reply::from_error(&err)
        }
    }
}

fn into_response(reply: Reply) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(reply.body)));
    *response.status_mut() =
        StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(reply.content_type));
    response
}
