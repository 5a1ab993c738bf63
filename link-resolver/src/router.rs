use std::future::ready;

use axum::{
    http::{HeaderName, Method, StatusCode},
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    api::endpoints::{
        create_team_link, delete_team_link, legacy_open_link, open_link, resolve_url,
        team_analytics, team_links, update_team_link,
    },
    metrics_utils::{setup_metrics_recorder, track_metrics},
    resolution::resolution_service::LinkResolver,
    state::State,
    store::LinkStoreRef,
};

#[derive(Clone)]
pub struct AppState {
    pub store: LinkStoreRef,
    pub resolver: LinkResolver,
    pub customer_id_header: HeaderName,
}

pub fn router(state: State) -> Router {
    let liveness = state.liveness.clone();
    let app_state = AppState {
        store: state.store,
        resolver: state.resolver,
        customer_id_header: state.customer_id_header,
    };

    // Short links are opened from arbitrary branded domains
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .allow_origin(AllowOrigin::mirror_request());

    let status_router = Router::new()
        .route("/_readiness", get(|| ready(StatusCode::OK)))
        .route("/_liveness", get(move || ready(liveness.get_status())));

    let open_router = Router::new()
        .route("/open/resolve", post(resolve_url))
        .route("/open/:identifier", get(open_link))
        .route("/v0/open/:identifier", get(legacy_open_link));

    let teams_router = Router::new()
        .route(
            "/teams/:team_id/links",
            get(team_links).post(create_team_link),
        )
        .route(
            "/teams/:team_id/links/:link_id",
            patch(update_team_link).delete(delete_team_link),
        )
        .route("/teams/:team_id/analytics", get(team_analytics));

    let router = Router::new()
        .merge(status_router)
        .merge(open_router)
        .merge(teams_router)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(track_metrics))
        .layer(cors)
        .with_state(app_state);

    if !state.enable_metrics {
        return router;
    }

    match setup_metrics_recorder() {
        Ok(recorder_handle) => {
            router.route("/metrics", get(move || ready(recorder_handle.render())))
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install metrics recorder, /metrics disabled");
            router
        }
    }
}
