//! Process wiring: one listener, one dialer, two routers.
//!
//! ```text
//!  chat gateway ──▶ listener pool ──▶ QqToMcRouter ──▶ dialer channel ──▶ game server
//!  chat gateway ◀── listener pool ◀── McToQqRouter ◀── dialer channel ◀── game server
//! ```
//!
//! The listener accept loop and the dialer reconnect loop run as two Tokio
//! tasks.  The bridge stops when the accept loop ends: either the `running`
//! flag was cleared or the listener failed to bind.  The dialer task is then
//! aborted, since an established game-server session does not watch the flag.

use std::sync::{atomic::AtomicBool, Arc};

use anyhow::Context;
use async_trait::async_trait;
use relay_core::event::queqiao;
use relay_core::protocol::Params;
use relay_core::InboundDispatcher;
use relay_dialer::{DialerChannel, ReconnectingClient};
use relay_listener::{serve, ConnectionPool, ListenerConfig};
use serde_json::Value;
use tokio::net::TcpListener;
use tracing::info;

use crate::application::router::{ChatOutbound, GameOutbound, McToQqRouter, QqToMcRouter};
use crate::domain::BridgeConfig;

#[async_trait]
impl ChatOutbound for ConnectionPool {
    async fn notify(&self, payload: Value) -> bool {
        ConnectionPool::notify(self, payload).await
    }
}

#[async_trait]
impl GameOutbound for DialerChannel {
    async fn notify(&self, kind: &str, params: &Params) -> bool {
        DialerChannel::notify(self, kind, params).await
    }
}

/// Every long-lived component of a running bridge.
pub struct Bridge {
    listener_config: ListenerConfig,
    pool: Arc<ConnectionPool>,
    listener_dispatcher: Arc<InboundDispatcher>,
    channel: Arc<DialerChannel>,
    client: Arc<ReconnectingClient>,
}

impl Bridge {
    /// Builds and connects all components; nothing runs until [`run`](Self::run).
    ///
    /// # Errors
    ///
    /// Fails if a template override does not compile or the dialer settings
    /// cannot form a handshake request.
    pub fn new(config: &BridgeConfig) -> anyhow::Result<Self> {
        let registry = config
            .game_templates()
            .context("failed to build game-server templates")?;

        let pool = Arc::new(ConnectionPool::new(config.listener.enable_echo));
        let channel = Arc::new(DialerChannel::new(registry));

        let qq_to_mc = QqToMcRouter::new(
            config.forwarding.target_group_id,
            Arc::clone(&channel) as Arc<dyn GameOutbound>,
        );
        let mc_to_qq = McToQqRouter::new(
            config.forwarding.clone(),
            queqiao::normalizer(),
            Arc::clone(&pool) as Arc<dyn ChatOutbound>,
        );

        let listener_dispatcher = Arc::new(pool.inbound_dispatcher().with_handler(Arc::new(qq_to_mc)));
        let dialer_dispatcher = Arc::new(channel.inbound_dispatcher().with_handler(Arc::new(mc_to_qq)));

        let client = ReconnectingClient::new(
            config.dialer.to_dialer_config(),
            Arc::clone(&channel),
            dialer_dispatcher,
        )
        .context("invalid [dialer] settings")?;

        Ok(Self {
            listener_config: config.listener.to_listener_config(),
            pool,
            listener_dispatcher,
            channel,
            client: Arc::new(client),
        })
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn channel(&self) -> &Arc<DialerChannel> {
        &self.channel
    }

    pub fn client(&self) -> &Arc<ReconnectingClient> {
        &self.client
    }

    /// Binds the configured listener address and runs until `running` is cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind.
    pub async fn run(self, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        let address = self.listener_config.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .with_context(|| format!("failed to bind WebSocket listener on {address}"))?;
        self.serve(listener, running).await
    }

    /// Runs both sides on an already-bound listener.
    pub async fn serve(self, listener: TcpListener, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        let dialer = {
            let client = Arc::clone(&self.client);
            let running = Arc::clone(&running);
            tokio::spawn(async move { client.run(running).await })
        };

        let result = serve(
            listener,
            self.listener_config,
            self.pool,
            self.listener_dispatcher,
            running,
        )
        .await;

        dialer.abort();
        info!("bridge stopped");
        result
    }
}
