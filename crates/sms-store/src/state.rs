//! Connection state machine shared by all store backends.

use crate::error::StoreError;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Lifecycle of the connection to the backing medium.
///
/// ```text
/// Connecting ──ok──▶ Ready ◀──reconnect── Degraded
///     │                │ ──failure──────────▶ │
///     └──failure──▶ Fatal ◀──auth rejected────┘
/// ```
///
/// `Fatal` and `Closed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Ready,
    Degraded,
    Fatal,
    Closed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Fatal | ConnectionState::Closed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Ready => "ready",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Fatal => "fatal",
            ConnectionState::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable holder of a [`ConnectionState`].
#[derive(Clone)]
pub struct ConnectionMonitor {
    tx: Arc<watch::Sender<ConnectionState>>,
}

impl ConnectionMonitor {
    pub fn new(initial: ConnectionState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Move to `next`. Returns false if the state did not change, which
    /// includes any attempt to leave a terminal state.
    pub fn transition(&self, next: ConnectionState) -> bool {
        let mut previous = next;
        let changed = self.tx.send_if_modified(|current| {
            if current.is_terminal() || *current == next {
                return false;
            }
            previous = *current;
            *current = next;
            true
        });

        if changed {
            match next {
                ConnectionState::Ready => info!(from = %previous, "Store connection ready"),
                ConnectionState::Degraded => {
                    warn!(from = %previous, "Store connection degraded, reconnecting")
                }
                ConnectionState::Fatal => error!(from = %previous, "Store connection failed fatally"),
                ConnectionState::Closed => info!(from = %previous, "Store connection closed"),
                ConnectionState::Connecting => info!(from = %previous, "Store connecting"),
            }
        }

        changed
    }

    /// Succeeds only while `Ready`; otherwise the error callers should see.
    pub fn ensure_ready(&self) -> Result<(), StoreError> {
        match self.state() {
            ConnectionState::Ready => Ok(()),
            state @ (ConnectionState::Connecting | ConnectionState::Degraded) => {
                Err(StoreError::Unavailable(format!("store is {}", state)))
            }
            ConnectionState::Fatal => Err(StoreError::Fatal("store connection failed".into())),
            ConnectionState::Closed => Err(StoreError::Closed),
        }
    }

    /// Wait until the state becomes terminal and return it.
    pub async fn terminated(&self) -> ConnectionState {
        let mut rx = self.subscribe();
        let state = match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            // The sender lives as long as self, so this is unreachable in practice.
            Err(_) => ConnectionState::Closed,
        };
        state
    }
}

impl fmt::Debug for ConnectionMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionMonitor")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transitions() {
        let monitor = ConnectionMonitor::new(ConnectionState::Connecting);

        assert!(monitor.transition(ConnectionState::Ready));
        assert_eq!(monitor.state(), ConnectionState::Ready);

        // Same state is not a change
        assert!(!monitor.transition(ConnectionState::Ready));

        assert!(monitor.transition(ConnectionState::Degraded));
        assert!(monitor.transition(ConnectionState::Ready));
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        let monitor = ConnectionMonitor::new(ConnectionState::Ready);

        assert!(monitor.transition(ConnectionState::Fatal));
        assert!(!monitor.transition(ConnectionState::Ready));
        assert!(!monitor.transition(ConnectionState::Closed));
        assert_eq!(monitor.state(), ConnectionState::Fatal);
    }

    #[test]
    fn test_ensure_ready() {
        let monitor = ConnectionMonitor::new(ConnectionState::Connecting);
        assert!(matches!(monitor.ensure_ready(), Err(StoreError::Unavailable(_))));

        monitor.transition(ConnectionState::Ready);
        assert!(monitor.ensure_ready().is_ok());

        monitor.transition(ConnectionState::Degraded);
        assert!(matches!(monitor.ensure_ready(), Err(StoreError::Unavailable(_))));

        monitor.transition(ConnectionState::Closed);
        assert_eq!(monitor.ensure_ready(), Err(StoreError::Closed));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Ready.to_string(), "ready");
        assert_eq!(ConnectionState::Degraded.to_string(), "degraded");
    }

    #[tokio::test]
    async fn test_terminated_resolves_on_fatal() {
        let monitor = ConnectionMonitor::new(ConnectionState::Ready);

        let watcher = monitor.clone();
        let handle = tokio::spawn(async move { watcher.terminated().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        monitor.transition(ConnectionState::Degraded);
        monitor.transition(ConnectionState::Fatal);

        assert_eq!(handle.await.unwrap(), ConnectionState::Fatal);
    }

    #[tokio::test]
    async fn test_terminated_when_already_closed() {
        let monitor = ConnectionMonitor::new(ConnectionState::Ready);
        monitor.transition(ConnectionState::Closed);

        let state = tokio::time::timeout(Duration::from_secs(1), monitor.terminated())
            .await
            .unwrap();
        assert_eq!(state, ConnectionState::Closed);
    }
}
