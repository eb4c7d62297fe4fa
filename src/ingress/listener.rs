//! Newline-delimited JSON listener.
//!
//! Each accepted connection is read line by line; every decoded [`Frame`] is
//! queued for the scheduler. Undecodable lines are skipped.

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::Sender;

use crate::ingress::{Frame, IngressError};

/// TCP listener feeding bus frames to the connector.
pub struct IngressListener {
    listener: TcpListener,
}

impl IngressListener {
    /// Bind to `bind:port`. Port 0 picks a free port.
    pub async fn bind(bind: &str, port: u16) -> Result<Self, IngressError> {
        let addr = format!("{bind}:{port}");
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| IngressError::Bind { addr, source })?;
        Ok(Self { listener })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> Result<SocketAddr, IngressError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the frame receiver goes away.
    pub async fn run(self, frames: Sender<Frame>) {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(%addr, "Ingress listening");
        }

        loop {
            tokio::select! {
                _ = frames.closed() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "Ingress connection accepted");
                        tokio::spawn(read_frames(stream, peer, frames.clone()));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept ingress connection");
                    }
                },
            }
        }

        tracing::info!("Ingress stopped");
    }
}

async fn read_frames(stream: TcpStream, peer: SocketAddr, frames: Sender<Frame>) {
    let mut lines = BufReader::new(stream).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "Ingress connection failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match Frame::from_line(&line) {
            Ok(frame) => {
                if frames.send(frame).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(%peer, error = %e, "Skipping malformed frame");
            }
        }
    }

    tracing::debug!(%peer, "Ingress connection closed");
}
