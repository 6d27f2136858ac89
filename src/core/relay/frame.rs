//! Transport-neutral WebSocket frame abstraction.
//!
//! The client socket is an axum `WebSocket` and the upstream socket is a
//! tokio-tungstenite stream. Both carry their own `Message` type; the relay
//! engine is written once against [`WsFrame`] and instantiated for each.

use axum::extract::ws::Message as AxumMessage;
use bytes::Bytes;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;

/// Classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Binary(Bytes),
    Ping,
    Pong,
    Close,
    /// Raw or otherwise uninteresting frames
    Other,
}

/// A WebSocket message type the relay can read and write.
pub trait WsFrame: Sized + Send + 'static {
    fn text(payload: String) -> Self;
    fn binary(payload: Bytes) -> Self;
    fn ping() -> Self;
    fn into_inbound(self) -> Inbound;
}

impl WsFrame for AxumMessage {
    fn text(payload: String) -> Self {
        AxumMessage::Text(payload.into())
    }

    fn binary(payload: Bytes) -> Self {
        AxumMessage::Binary(payload)
    }

    fn ping() -> Self {
        AxumMessage::Ping(Bytes::new())
    }

    fn into_inbound(self) -> Inbound {
        match self {
            AxumMessage::Text(text) => Inbound::Text(text.as_str().to_owned()),
            AxumMessage::Binary(data) => Inbound::Binary(data),
            AxumMessage::Ping(_) => Inbound::Ping,
            AxumMessage::Pong(_) => Inbound::Pong,
            AxumMessage::Close(_) => Inbound::Close,
        }
    }
}

impl WsFrame for TungsteniteMessage {
    fn text(payload: String) -> Self {
        TungsteniteMessage::Text(payload.into())
    }

    fn binary(payload: Bytes) -> Self {
        TungsteniteMessage::Binary(payload)
    }

    fn ping() -> Self {
        TungsteniteMessage::Ping(Bytes::new())
    }

    fn into_inbound(self) -> Inbound {
        match self {
            TungsteniteMessage::Text(text) => Inbound::Text(text.as_str().to_owned()),
            TungsteniteMessage::Binary(data) => Inbound::Binary(data),
            TungsteniteMessage::Ping(_) => Inbound::Ping,
            TungsteniteMessage::Pong(_) => Inbound::Pong,
            TungsteniteMessage::Close(_) => Inbound::Close,
            TungsteniteMessage::Frame(_) => Inbound::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axum_classification() {
        assert_eq!(
            AxumMessage::text("cancel".to_string()).into_inbound(),
            Inbound::Text("cancel".to_string())
        );
        assert_eq!(
            <AxumMessage as WsFrame>::binary(Bytes::from_static(&[1, 2])).into_inbound(),
            Inbound::Binary(Bytes::from_static(&[1, 2]))
        );
        assert_eq!(<AxumMessage as WsFrame>::ping().into_inbound(), Inbound::Ping);
        assert_eq!(AxumMessage::Close(None).into_inbound(), Inbound::Close);
    }

    #[test]
    fn test_tungstenite_classification() {
        assert_eq!(
            <TungsteniteMessage as WsFrame>::text("{}".to_string()).into_inbound(),
            Inbound::Text("{}".to_string())
        );
        assert_eq!(
            TungsteniteMessage::Pong(Bytes::new()).into_inbound(),
            Inbound::Pong
        );
        assert_eq!(TungsteniteMessage::Close(None).into_inbound(), Inbound::Close);
    }
}
