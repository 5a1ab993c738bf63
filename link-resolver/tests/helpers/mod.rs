use std::{
    net::SocketAddr,
    sync::{Arc, Once},
};

use link_resolver::state::State;
use link_resolver::store::memory::MemoryStore;
use link_resolver::{config::Config, server::serve};
use tokio::{net::TcpListener, sync::Notify};

pub const CUSTOMER_HEADER: &str = "x-customer-id";

static TRACING_INIT: Once = Once::new();
pub fn setup_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_writer(tracing_subscriber::fmt::TestWriter::new())
            .init()
    });
}

pub struct ServerHandle {
    pub addr: SocketAddr,
    pub shutdown: Arc<Notify>,
}

impl ServerHandle {
    pub async fn for_config(config: Config) -> Self {
        let state = State::from_config(&config).await.unwrap();
        Self::for_state(state).await
    }

    pub async fn for_store(store: Arc<MemoryStore>) -> Self {
        let state = State::with_store(store, &Config::default_for_test()).unwrap();
        Self::for_state(state).await
    }

    async fn for_state(state: State) -> Self {
        setup_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let notify = Arc::new(Notify::new());
        let shutdown = notify.clone();

        tokio::spawn(async move {
            serve(state, listener, async move { notify.notified().await }).await
        });

        Self { addr, shutdown }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.notify_one()
    }
}
