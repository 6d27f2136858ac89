//! Upstream dial for the OpenAI Realtime API.

use http::HeaderValue;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::core::relay::base::{RelayError, RelayResult, UpstreamSessionSettings};

/// Live socket to the realtime service.
pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Build the WebSocket URL with the model query parameter.
///
/// An existing `model` parameter in the configured URL is replaced.
pub fn build_ws_url(settings: &UpstreamSessionSettings) -> RelayResult<Url> {
    let mut url = Url::parse(&settings.url)
        .map_err(|e| RelayError::InvalidRequest(format!("{}: {}", settings.url, e)))?;

    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(RelayError::InvalidRequest(format!(
                "unsupported upstream scheme '{}'",
                other
            )));
        }
    }

    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "model")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair("model", &settings.model);

    Ok(url)
}

/// Open the authenticated WebSocket to the realtime service.
///
/// The handshake is bounded by `settings.connect_timeout`. No retry is
/// attempted; a failed dial aborts the session before it starts.
pub async fn connect(settings: &UpstreamSessionSettings, api_key: &str) -> RelayResult<UpstreamSocket> {
    let url = build_ws_url(settings)?;

    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| RelayError::InvalidRequest(e.to_string()))?;

    let bearer = HeaderValue::from_str(&format!("Bearer {}", api_key))
        .map_err(|_| RelayError::InvalidRequest("API key is not a valid header value".to_string()))?;
    request.headers_mut().insert(http::header::AUTHORIZATION, bearer);

    let (ws_stream, response) = tokio::time::timeout(
        settings.connect_timeout,
        tokio_tungstenite::connect_async(request),
    )
    .await
    .map_err(|_| {
        RelayError::UpstreamConnect(format!(
            "handshake timed out after {:?}",
            settings.connect_timeout
        ))
    })?
    .map_err(|e| RelayError::UpstreamConnect(e.to_string()))?;

    tracing::info!(
        status = %response.status(),
        model = %settings.model,
        "Connected to OpenAI Realtime API"
    );

    Ok(ws_stream)
}
