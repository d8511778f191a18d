//! Receives telemetry uploads over UDP and serves them over HTTP.

pub mod store;
pub mod web;

use anyhow::{bail, Result};
use greenhouse_control::uplink::{UploadMessage, MAX_UPLOAD_SIZE};
use std::env;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{info, warn};
use web::SharedStore;

const DEFAULT_UDP_ADDR: &str = "0.0.0.0:4000";
const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";

async fn handle_datagram(store: &SharedStore, src: SocketAddr, buf: &[u8]) -> Result<()> {
    let msg: UploadMessage = serde_json::from_slice(buf)?;
    if !msg.path.starts_with('/') {
        bail!("path is not absolute: {}", msg.path);
    }
    let path = msg.path.clone();
    let mut store = store.write().await;
    let replaced = store.insert(msg);
    info!(
        "{}: {}{} ({} stored)",
        src,
        path,
        if replaced { " replaced" } else { "" },
        store.len()
    );
    Ok(())
}

async fn receive_loop(store: SharedStore, bind_addr: &str) -> Result<()> {
    let socket = UdpSocket::bind(bind_addr).await?;
    info!("collecting uploads on {}", socket.local_addr()?);
    let mut buf = [0; MAX_UPLOAD_SIZE];
    loop {
        let (sz, src) = socket.recv_from(&mut buf).await?;
        if let Err(e) = handle_datagram(&store, src, &buf[..sz]).await {
            warn!("{}: bad upload: {:#}", src, e);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let udp_addr = env::var("COLLECTOR_UDP").unwrap_or_else(|_| DEFAULT_UDP_ADDR.to_string());
    let http_addr = env::var("COLLECTOR_HTTP").unwrap_or_else(|_| DEFAULT_HTTP_ADDR.to_string());

    let store = SharedStore::default();
    tokio::select! {
        res = web::serve(store.clone(), &http_addr) => res,
        res = receive_loop(store, &udp_addr) => res,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src() -> SocketAddr {
        "127.0.0.1:5000".parse().unwrap()
    }

    #[tokio::test]
    async fn valid_upload_is_stored() {
        let store = SharedStore::default();
        let body = br#"{"path":"/UsersData/a/readings/10:0 1-1-2024","fields":{"temperature":"25.50"}}"#;
        handle_datagram(&store, src(), body).await.unwrap();
        let store = store.read().await;
        assert_eq!(store.latest().unwrap().fields["temperature"], "25.50");
    }

    #[tokio::test]
    async fn malformed_upload_is_rejected() {
        let store = SharedStore::default();
        assert!(handle_datagram(&store, src(), b"not json").await.is_err());
        assert!(handle_datagram(&store, src(), br#"{"path":"rel","fields":{}}"#)
            .await
            .is_err());
        assert_eq!(store.read().await.len(), 0);
    }

    #[tokio::test]
    async fn receives_from_device_uplink() {
        use greenhouse_control::uplink::{Fields, UdpUplink, UplinkSink};
        use std::time::Duration;

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap().to_string();
        let mut uplink = UdpUplink::new(&addr, Duration::from_secs(1)).unwrap();
        let fields: Fields = [("time".to_string(), "10:0 1-1-2024".to_string())]
            .into_iter()
            .collect();
        uplink.set_record("/UsersData/a/readings/10:0 1-1-2024", &fields).unwrap();

        let mut buf = [0; MAX_UPLOAD_SIZE];
        let (sz, from) = socket.recv_from(&mut buf).await.unwrap();
        let store = SharedStore::default();
        handle_datagram(&store, from, &buf[..sz]).await.unwrap();
        assert_eq!(store.read().await.latest().unwrap().fields, fields);
    }
}
