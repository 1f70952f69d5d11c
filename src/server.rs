use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::api::{router, ApiState};
use crate::config::ServerConfig;
use crate::scheduler::{Dispatcher, RetryPolicy};

/// The dispatch server: one in-memory job store exposed over HTTP.
pub struct Server {
    pub config: ServerConfig,
    pub dispatcher: Dispatcher,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        let dispatcher = Dispatcher::new(RetryPolicy::new(config.max_retries));
        Self { config, dispatcher }
    }

    /// Bind the configured address and serve until `shutdown` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or the server fails.
    pub async fn run(self, shutdown: CancellationToken) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` is cancelled.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> std::io::Result<()> {
        let app = router(ApiState {
            dispatcher: self.dispatcher.clone(),
        });

        tracing::info!(
            addr = %listener.local_addr()?,
            max_retries = self.config.max_retries,
            "Dispatch server listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        let stats = self.dispatcher.stats().await;
        tracing::info!(
            queued = stats.queued,
            running = stats.running,
            passed = stats.passed,
            failed = stats.failed,
            "Dispatch server stopped; in-memory jobs discarded"
        );
        Ok(())
    }
}
