// HTTP surface and WebSocket live channel

use crate::error::RelayError;
use crate::event::Event;
use crate::handlers::Relay;
use anyhow::{Context, Result};
use futures::{Future, SinkExt, StreamExt};
use hyper::header::{HeaderValue, CONNECTION, CONTENT_TYPE, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, UPGRADE};
use hyper::server::conn::AddrIncoming;
use hyper::service::{make_service_fn, service_fn};
use hyper::upgrade::Upgraded;
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

#[derive(Debug, Deserialize)]
struct SubmitBody {
    nick: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct DeleteBody {
    #[serde(rename = "messageId")]
    message_id: i64,
    adminkey: String,
}

/// The relay's network front: four routes on one listener.
pub struct RelayServer {
    local_addr: SocketAddr,
    relay: Arc<Relay>,
    builder: hyper::server::Builder<AddrIncoming>,
}

impl RelayServer {
    /// Bind the listener. Port 0 picks an ephemeral port; the bound
    /// address is available from `local_addr`.
    pub fn bind(addr: SocketAddr, relay: Arc<Relay>) -> Result<Self> {
        let incoming = AddrIncoming::bind(&addr)
            .with_context(|| format!("failed to bind {}", addr))?;
        let local_addr = incoming.local_addr();

        Ok(Self {
            local_addr,
            relay,
            builder: Server::builder(incoming),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until the shutdown future resolves.
    pub async fn run_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let relay = self.relay;
        let make_svc = make_service_fn(move |_conn| {
            let relay = relay.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| route(req, relay.clone())))
            }
        });

        tracing::info!("listening on http://{}", self.local_addr);

        self.builder
            .serve(make_svc)
            .with_graceful_shutdown(shutdown)
            .await
            .context("server error")
    }

    /// Serve until the process ends.
    pub async fn run(self) -> Result<()> {
        self.run_with_shutdown(std::future::pending()).await
    }
}

async fn route(req: Request<Body>, relay: Arc<Relay>) -> Result<Response<Body>, Infallible> {
    let result = match (req.method(), req.uri().path()) {
        (&Method::POST, "/send-message") => handle_submit(req, relay).await,
        (&Method::POST, "/delete-message") => handle_delete(req, relay).await,
        (&Method::GET, "/messages") => handle_fetch(relay),
        (&Method::GET, "/ws") => return Ok(handle_ws_upgrade(req, relay)),
        _ => Ok(plain_response(StatusCode::NOT_FOUND, "not found")),
    };

    Ok(result.unwrap_or_else(error_response))
}

async fn handle_submit(
    req: Request<Body>,
    relay: Arc<Relay>,
) -> Result<Response<Body>, RelayError> {
    let body: SubmitBody = read_body(req).await?;
    let message = relay.submit(&body.nick, &body.message).await?;
    json_response(StatusCode::CREATED, &message)
}

async fn handle_delete(
    req: Request<Body>,
    relay: Arc<Relay>,
) -> Result<Response<Body>, RelayError> {
    let body: DeleteBody = read_body(req).await?;
    relay.delete(body.message_id, &body.adminkey).await?;
    json_response(
        StatusCode::OK,
        &serde_json::json!({ "deleted": body.message_id }),
    )
}

fn handle_fetch(relay: Arc<Relay>) -> Result<Response<Body>, RelayError> {
    let history = relay.history()?;
    json_response(StatusCode::OK, &history)
}

/// Decode a request body as JSON or urlencoded form, by content type.
async fn read_body<T: DeserializeOwned>(req: Request<Body>) -> Result<T, RelayError> {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = hyper::body::to_bytes(req.into_body())
        .await
        .map_err(|e| RelayError::Validation(format!("unreadable body: {}", e)))?;

    parse_payload(content_type.as_deref(), &bytes)
}

fn parse_payload<T: DeserializeOwned>(
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<T, RelayError> {
    let is_json = content_type
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);

    if is_json {
        serde_json::from_slice(bytes)
            .map_err(|e| RelayError::Validation(format!("invalid JSON body: {}", e)))
    } else {
        serde_urlencoded::from_bytes(bytes)
            .map_err(|e| RelayError::Validation(format!("invalid form body: {}", e)))
    }
}

fn json_response<T: serde::Serialize>(
    status: StatusCode,
    value: &T,
) -> Result<Response<Body>, RelayError> {
    // Serialization of our own wire types cannot fail; fall back to a
    // bare status if it somehow does.
    let body = serde_json::to_string(value).unwrap_or_default();

    let mut res = Response::new(Body::from(body));
    *res.status_mut() = status;
    res.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Ok(res)
}

fn plain_response(status: StatusCode, text: &'static str) -> Response<Body> {
    let mut res = Response::new(Body::from(text));
    *res.status_mut() = status;
    res
}

fn error_response(err: RelayError) -> Response<Body> {
    if let RelayError::Storage(ref cause) = err {
        tracing::error!("storage failure: {}", cause);
    }

    let status = err.status();
    let body = serde_json::json!({ "error": err.to_string() }).to_string();

    let mut res = Response::new(Body::from(body));
    *res.status_mut() = status;
    res.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    res
}

/// Complete the WebSocket handshake and hand the connection to a
/// listener task. The 101 response goes back on the HTTP connection;
/// the upgraded stream is served until either side closes.
fn handle_ws_upgrade(mut req: Request<Body>, relay: Arc<Relay>) -> Response<Body> {
    let accept_key = match req.headers().get(SEC_WEBSOCKET_KEY) {
        Some(key) => derive_accept_key(key.as_bytes()),
        None => return plain_response(StatusCode::BAD_REQUEST, "missing Sec-WebSocket-Key"),
    };
    let accept_value = match HeaderValue::from_str(&accept_key) {
        Ok(value) => value,
        Err(_) => return plain_response(StatusCode::BAD_REQUEST, "bad Sec-WebSocket-Key"),
    };

    tokio::spawn(async move {
        match hyper::upgrade::on(&mut req).await {
            Ok(upgraded) => {
                let ws =
                    WebSocketStream::from_raw_socket(upgraded, Role::Server, None).await;
                if let Err(e) = serve_listener(ws, relay).await {
                    tracing::debug!("live channel closed: {}", e);
                }
            }
            Err(e) => tracing::warn!("websocket upgrade failed: {}", e),
        }
    });

    let mut res = Response::new(Body::empty());
    *res.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    res.headers_mut()
        .insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    res.headers_mut()
        .insert(UPGRADE, HeaderValue::from_static("websocket"));
    res.headers_mut().insert(SEC_WEBSOCKET_ACCEPT, accept_value);
    res
}

/// Drive one live listener.
///
/// The listener registers with the hub BEFORE the history snapshot is
/// read, then receives the snapshot as ordinary message events followed
/// by live events, with snapshot duplicates filtered by id. A message
/// landing between registration and the snapshot read is therefore seen
/// exactly once. Unregistration runs on every exit path.
async fn serve_listener(ws: WebSocketStream<Upgraded>, relay: Arc<Relay>) -> Result<()> {
    let (mut sink, mut stream) = ws.split();

    let (listener_id, mut events) = relay.subscribe().await;

    let session = async {
        let mut snapshot_high = 0i64;
        for message in relay.history()? {
            snapshot_high = message.id;
            let frame = Event::Message(message).to_json()?;
            sink.send(WsMessage::Text(frame)).await?;
        }

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(Event::Message(m)) if m.id <= snapshot_high => {
                            // Already delivered in the snapshot.
                        }
                        Some(event) => {
                            sink.send(WsMessage::Text(event.to_json()?)).await?;
                        }
                        // The hub dropped this listener (queue overflow).
                        None => break,
                    }
                }
                frame = stream.next() => {
                    match frame {
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Ok(WsMessage::Ping(data))) => {
                            sink.send(WsMessage::Pong(data)).await?;
                        }
                        // No client-to-server traffic is expected.
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
            }
        }

        Ok::<(), anyhow::Error>(())
    }
    .await;

    relay.unsubscribe(&listener_id).await;
    session
}
