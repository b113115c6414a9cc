//! Coordinated shutdown of the control server.
//!
//! Two tasks talk over single-use channels: one serves HTTP, the other waits
//! for the shutdown signal. On signal the server stops accepting connections
//! and drains in-flight requests, after which a completion message is sent
//! to whoever holds the [`ServerHandle`].

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Handle to a running control server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    done: oneshot::Receiver<io::Result<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the server to finish draining after the shutdown signal.
    ///
    /// Errors only if the server stopped without being asked to.
    pub async fn wait(self) -> io::Result<()> {
        match self.done.await {
            Ok(result) => result,
            Err(_) => Err(io::Error::other("shutdown coordinator exited without reporting")),
        }
    }
}

/// Serve `router` on `listener` until `signal` resolves.
pub fn spawn_server<F>(listener: TcpListener, router: Router, signal: F) -> io::Result<ServerHandle>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener.local_addr()?;
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let (done_tx, done_rx) = oneshot::channel();

    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::spawn(async move {
        let result = tokio::select! {
            _ = signal => {
                info!("Stopping control server, waiting for in-flight requests");
                let _ = stop_tx.send(());
                match server.await {
                    Ok(Ok(())) => info!("Control server drained"),
                    Ok(Err(e)) => warn!("Control server failed while draining: {}", e),
                    Err(e) => warn!("Control server task failed while draining: {}", e),
                }
                Ok(())
            }
            joined = &mut server => match joined {
                Ok(Ok(())) => Err(io::Error::other("control server stopped unexpectedly")),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(io::Error::other(e)),
            },
        };
        let _ = done_tx.send(result);
    });

    info!("Control server listening on {}", local_addr);
    Ok(ServerHandle { local_addr, done: done_rx })
}

/// Resolves on the first OS interrupt (Ctrl-C / SIGINT).
pub async fn interrupt_signal() {
    signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl-C handler");
    info!("Received Ctrl-C");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[tokio::test]
    async fn test_drains_in_flight_request() {
        let (entered_tx, entered_rx) = oneshot::channel::<()>();
        let entered_tx = Arc::new(Mutex::new(Some(entered_tx)));
        let router = Router::new().route(
            "/slow",
            get(move || {
                if let Some(tx) = entered_tx.lock().unwrap().take() {
                    let _ = tx.send(());
                }
                async {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    "done"
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (signal_tx, signal_rx) = oneshot::channel::<()>();
        let handle = spawn_server(listener, router, async {
            let _ = signal_rx.await;
        })
        .unwrap();
        let addr = handle.local_addr();

        let request = tokio::spawn(async move {
            reqwest::get(format!("http://{addr}/slow"))
                .await
                .unwrap()
                .text()
                .await
                .unwrap()
        });

        entered_rx.await.unwrap();
        signal_tx.send(()).unwrap();

        handle.wait().await.unwrap();
        assert_eq!(request.await.unwrap(), "done");

        // Listener is gone
        let err = reqwest::Client::new()
            .get(format!("http://{addr}/slow"))
            .send()
            .await
            .unwrap_err();
        assert!(err.is_connect());
    }

    #[tokio::test]
    async fn test_idle_server_stops_on_signal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let handle = spawn_server(listener, Router::new(), async {}).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .unwrap()
            .unwrap();
    }
}
