//! Process signal handling

use tracing::warn;

/// Wait for Ctrl+C, or SIGTERM on Unix
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let term_signal = match signal(SignalKind::terminate()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!(
                    "Failed to install SIGTERM handler: {}. Only Ctrl+C will stop fluxgate",
                    e
                );
                None
            },
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                match term_signal {
                    Some(mut sig) => { sig.recv().await; },
                    None => std::future::pending::<()>().await,
                }
            } => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// SIGHUP listener used to trigger a configuration reload
///
/// On platforms without SIGHUP, or if the handler cannot be installed,
/// `recv` never completes.
pub struct ReloadSignal {
    #[cfg(unix)]
    inner: Option<tokio::signal::unix::Signal>,
}

impl ReloadSignal {
    pub fn new() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let inner = match signal(SignalKind::hangup()) {
                Ok(sig) => Some(sig),
                Err(e) => {
                    warn!("Failed to create SIGHUP listener: {}", e);
                    None
                },
            };
            Self { inner }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    pub async fn recv(&mut self) {
        #[cfg(unix)]
        if let Some(sig) = self.inner.as_mut() {
            if sig.recv().await.is_some() {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}

impl Default for ReloadSignal {
    fn default() -> Self {
        Self::new()
    }
}
