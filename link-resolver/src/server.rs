use std::{future::Future, net::SocketAddr, time::Duration};

use health::HealthHandle;
use tokio::net::TcpListener;

use crate::{router::router, state::State};

pub async fn serve<F>(state: State, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let simple_loop = state
        .liveness
        .register("simple_loop".to_string(), Duration::from_secs(30));
    simple_loop.report_healthy();
    tokio::spawn(liveness_loop(simple_loop));

    match listener.local_addr() {
        Ok(addr) => tracing::info!("listening on {addr}"),
        Err(e) => tracing::warn!(error = %e, "listening on unknown address"),
    }

    let app = router(state);
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    {
        tracing::error!(error = %e, "Server error");
    }
}

async fn liveness_loop(handle: HealthHandle) {
    loop {
        handle.report_healthy();
        tokio::time::sleep(Duration::from_secs(10)).await;
    }
}
