//! UDPデータグラム配送
//!
//! サンプル1件につき1データグラム（JSON）を送る。到達確認はしない。

use super::{Delivery, Sink};
use crate::error::SinkError;
use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::trace;

/// UDP配送先
pub struct UdpSink {
    name: String,
    addr: String,
    socket: UdpSocket,
}

impl UdpSink {
    /// 送信用ソケットをバインドして配送先を作成
    pub async fn bind(addr: impl Into<String>) -> Result<Self, SinkError> {
        let addr = addr.into();
        let local = if addr.starts_with('[') {
            "[::]:0"
        } else {
            "0.0.0.0:0"
        };
        let socket = UdpSocket::bind(local).await?;
        Ok(Self {
            name: format!("udp:{addr}"),
            addr,
            socket,
        })
    }
}

#[async_trait]
impl Sink for UdpSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, delivery: &Delivery) -> Result<(), SinkError> {
        for sample in delivery.samples() {
            let datagram = serde_json::to_vec(sample)?;
            let sent = self.socket.send_to(&datagram, self.addr.as_str()).await?;
            trace!(sink = %self.name, bytes = sent, check_id = %sample.check_id, "Datagram sent");
        }
        Ok(())
    }
}
