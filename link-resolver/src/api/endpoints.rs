use axum::{
    extract::{rejection::JsonRejection, Path, RawQuery, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{NaiveTime, Utc};
use metrics::counter;
use url::Url;

use crate::{
    analytics::report::{build_report, normalize_days, window_start, AnalyticsReport},
    api::{
        errors::ResolveError,
        types::{
            CreateLinkRequest, DeleteLinkResponse, LegacyOpenLinkResponse, OpenLinkResponse,
            ResolveUrlRequest, TeamLinkResponse, UpdateLinkRequest,
        },
    },
    identifier::ParsedIdentifier,
    metrics_utils::LINKS_CREATED_COUNTER,
    resolution::{
        links_model::{LinkUpdate, NewLink},
        resolution_service::{ClickContext, Resolution},
    },
    router::AppState,
    store::StoreError,
    teams::team_models::Team,
};

const MAX_CREATE_ATTEMPTS: usize = 3;

const LOAD_LINKS_FAILED: &str = "Failed to load links";
const CREATE_LINK_FAILED: &str = "Failed to create link";
const UPDATE_LINK_FAILED: &str = "Failed to update link";
const DELETE_LINK_FAILED: &str = "Failed to delete link";
const LOAD_ANALYTICS_FAILED: &str = "Failed to load analytics";

/// `GET /open/:identifier?id=`
pub async fn open_link(
    state: State<AppState>,
    Path(identifier): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Json<OpenLinkResponse>, ResolveError> {
    let query_id = first_query_value(query.as_deref(), "id");
    let parsed = ParsedIdentifier::parse(&identifier, query_id.as_deref())?;

    let resolution = state
        .resolver
        .resolve(&parsed, true, &click_context(&headers))
        .await?;
    Ok(Json(resolution.into()))
}

/// `POST /open/resolve` with `{ "url": "https://host/open/acme-42?id=7" }`
pub async fn resolve_url(
    state: State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ResolveUrlRequest>, JsonRejection>,
) -> Result<Json<OpenLinkResponse>, ResolveError> {
    let Json(request) = body.map_err(|rejection| {
        tracing::debug!(error = %rejection, "Rejected resolve body");
        ResolveError::InvalidRequest("Invalid request body".to_string())
    })?;
    let parsed = ParsedIdentifier::from_url(request.url.as_deref().unwrap_or_default())?;

    let resolution = state
        .resolver
        .resolve(&parsed, true, &click_context(&headers))
        .await?;
    Ok(Json(resolution.into()))
}

/// `GET /v0/open/:identifier?id=`, the flat payload of the first revision.
/// A bare slug is looked up as a link id rather than listed.
pub async fn legacy_open_link(
    state: State<AppState>,
    Path(identifier): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Json<LegacyOpenLinkResponse>, ResolveError> {
    let query_id = first_query_value(query.as_deref(), "id");
    let parsed = ParsedIdentifier::parse(&identifier, query_id.as_deref())?;

    match state
        .resolver
        .resolve(&parsed, false, &click_context(&headers))
        .await?
    {
        Resolution::Single { link, team } => Ok(Json(LegacyOpenLinkResponse::new(link, team))),
        Resolution::List { .. } => Err(ResolveError::LinkNotFound),
    }
}

/// `GET /teams/:team_id/links`, backfilling missing short ids first.
pub async fn team_links(
    state: State<AppState>,
    Path(team_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<TeamLinkResponse>>, ResolveError> {
    let customer_id = customer_id(&headers, &state.customer_id_header)?;
    let (team, _role) = Team::for_member(&*state.store, &team_id, &customer_id)
        .await
        .map_err(failed(LOAD_LINKS_FAILED))?;

    let links = state
        .store
        .list_team_links_with_backfill(&team.id)
        .await
        .map_err(failed(LOAD_LINKS_FAILED))?;
    Ok(Json(links.into_iter().map(TeamLinkResponse::from).collect()))
}

/// `POST /teams/:team_id/links` with `{ "targetUrl": ..., "title": ... }`
pub async fn create_team_link(
    state: State<AppState>,
    Path(team_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<CreateLinkRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ResolveError> {
    let customer_id = customer_id(&headers, &state.customer_id_header)?;
    let (team, role) = Team::for_member(&*state.store, &team_id, &customer_id)
        .await
        .map_err(failed(CREATE_LINK_FAILED))?;
    if !role.can_manage_links() {
        return Err(ResolveError::Forbidden);
    }

    let Json(request) = body
        .map_err(|_| ResolveError::InvalidRequest("Invalid request body".to_string()))?;
    let new_link = validate_new_link(request)?;

    let mut attempt = 1;
    let link = loop {
        match state.store.create_link(&team.id, new_link.clone()).await {
            Ok(link) => break link,
            Err(StoreError::UniqueViolation(detail)) if attempt < MAX_CREATE_ATTEMPTS => {
                tracing::warn!(team_id = %team.id, attempt, detail = %detail, "Short id taken, retrying");
                attempt += 1;
            }
            Err(StoreError::UniqueViolation(_)) => {
                return Err(ResolveError::Conflict(
                    "Could not assign a short id, please retry".to_string(),
                ));
            }
            Err(error) => return Err(failed(CREATE_LINK_FAILED)(error)),
        }
    };

    counter!(LINKS_CREATED_COUNTER).increment(1);
    tracing::info!(team_id = %team.id, link_id = %link.id, short_id = ?link.short_id, "Created link");

    Ok((StatusCode::CREATED, Json(TeamLinkResponse::from(link))))
}

/// `PATCH /teams/:team_id/links/:link_id` with `{ "targetUrl"?, "title"? }`
pub async fn update_team_link(
    state: State<AppState>,
    Path((team_id, link_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Result<Json<UpdateLinkRequest>, JsonRejection>,
) -> Result<Json<TeamLinkResponse>, ResolveError> {
    let customer_id = customer_id(&headers, &state.customer_id_header)?;
    let (team, role) = Team::for_member(&*state.store, &team_id, &customer_id)
        .await
        .map_err(failed(UPDATE_LINK_FAILED))?;
    if !role.can_manage_links() {
        return Err(ResolveError::Forbidden);
    }

    let existing = state
        .store
        .find_link_by_id(&link_id)
        .await
        .map_err(failed(UPDATE_LINK_FAILED))?;
    if !existing.is_some_and(|link| link.team_id == team.id) {
        return Err(ResolveError::LinkNotFound);
    }

    let Json(request) = body
        .map_err(|_| ResolveError::InvalidRequest("Invalid request body".to_string()))?;
    let update = validate_link_update(request)?;

    let link = state
        .store
        .update_link(&team.id, &link_id, update)
        .await
        .map_err(failed(UPDATE_LINK_FAILED))?
        .ok_or(ResolveError::LinkNotFound)?;

    tracing::info!(team_id = %team.id, link_id = %link.id, "Updated link");
    Ok(Json(TeamLinkResponse::from(link)))
}

/// `DELETE /teams/:team_id/links/:link_id`. The short id of the deleted link
/// is retired, not handed out again.
pub async fn delete_team_link(
    state: State<AppState>,
    Path((team_id, link_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<DeleteLinkResponse>, ResolveError> {
    let customer_id = customer_id(&headers, &state.customer_id_header)?;
    let (team, role) = Team::for_member(&*state.store, &team_id, &customer_id)
        .await
        .map_err(failed(DELETE_LINK_FAILED))?;
    if !role.can_manage_links() {
        return Err(ResolveError::Forbidden);
    }

    let deleted = state
        .store
        .delete_link(&team.id, &link_id)
        .await
        .map_err(failed(DELETE_LINK_FAILED))?;
    if !deleted {
        return Err(ResolveError::LinkNotFound);
    }

    tracing::info!(team_id = %team.id, link_id = %link_id, "Deleted link");
    Ok(Json(DeleteLinkResponse { success: true }))
}

/// `GET /teams/:team_id/analytics?days=`
pub async fn team_analytics(
    state: State<AppState>,
    Path(team_id): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Json<AnalyticsReport>, ResolveError> {
    let customer_id = customer_id(&headers, &state.customer_id_header)?;
    let (team, _role) = Team::for_member(&*state.store, &team_id, &customer_id)
        .await
        .map_err(failed(LOAD_ANALYTICS_FAILED))?;

    let days = normalize_days(first_query_value(query.as_deref(), "days").as_deref());
    let today = Utc::now().date_naive();
    let since = window_start(today, days).and_time(NaiveTime::MIN).and_utc();

    let events = state
        .store
        .list_team_analytics_since(&team.id, since)
        .await
        .map_err(failed(LOAD_ANALYTICS_FAILED))?;
    Ok(Json(build_report(days, today, &events)))
}

/// Converts an error, naming `context` as the failed operation when storage
/// is at fault.
fn failed<E: Into<ResolveError>>(context: &'static str) -> impl Fn(E) -> ResolveError {
    move |error| error.into().with_context(context)
}

/// First value of `key`, trimmed. Empty values count as absent.
fn first_query_value(query: Option<&str>, key: &str) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn header_value(headers: &HeaderMap, name: impl header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn click_context(headers: &HeaderMap) -> ClickContext {
    ClickContext {
        user_agent: header_value(headers, header::USER_AGENT),
        referrer: header_value(headers, header::REFERER)
            .or_else(|| header_value(headers, "referrer")),
    }
}

fn customer_id(headers: &HeaderMap, header_name: &HeaderName) -> Result<String, ResolveError> {
    header_value(headers, header_name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(ResolveError::Unauthorized)
}

fn validate_new_link(request: CreateLinkRequest) -> Result<NewLink, ResolveError> {
    let raw_url = request
        .target_url
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ResolveError::InvalidRequest("targetUrl is required".to_string()))?;

    let target_url = Url::parse(raw_url)
        .map_err(|_| ResolveError::InvalidRequest("targetUrl must be an absolute URL".to_string()))?;

    let title = request
        .title
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty());

    Ok(NewLink {
        target_url: target_url.to_string(),
        title,
    })
}

fn validate_link_update(request: UpdateLinkRequest) -> Result<LinkUpdate, ResolveError> {
    let target_url = match request.target_url {
        Some(raw_url) => {
            let target_url = raw_url
                .as_deref()
                .map(str::trim)
                .and_then(|value| Url::parse(value).ok())
                .ok_or_else(|| {
                    ResolveError::InvalidRequest("A valid target URL is required".to_string())
                })?;
            Some(target_url.to_string())
        }
        None => None,
    };

    let title = request.title.map(|title| {
        title
            .map(|title| title.trim().to_string())
            .filter(|title| !title.is_empty())
    });

    let update = LinkUpdate { target_url, title };
    if update.is_empty() {
        return Err(ResolveError::InvalidRequest(
            "No updates provided".to_string(),
        ));
    }
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_first_query_value() {
        assert_eq!(first_query_value(None, "id"), None);
        assert_eq!(first_query_value(Some("id=7&id=9"), "id").as_deref(), Some("7"));
        assert_eq!(first_query_value(Some("x=1&id=%20abc%20"), "id").as_deref(), Some("abc"));
        assert_eq!(first_query_value(Some("id="), "id"), None);
        assert_eq!(first_query_value(Some("days=30"), "id"), None);
    }

    #[test]
    fn test_click_context_accepts_both_referrer_spellings() {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8.0"));
        headers.insert("referrer", HeaderValue::from_static("https://a.example"));
        let click = click_context(&headers);
        assert_eq!(click.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(click.referrer.as_deref(), Some("https://a.example"));

        headers.insert(header::REFERER, HeaderValue::from_static("https://b.example"));
        assert_eq!(
            click_context(&headers).referrer.as_deref(),
            Some("https://b.example")
        );
    }

    #[test]
    fn test_customer_id() {
        let name = HeaderName::from_static("x-customer-id");
        let mut headers = HeaderMap::new();
        assert!(matches!(
            customer_id(&headers, &name),
            Err(ResolveError::Unauthorized)
        ));

        headers.insert(name.clone(), HeaderValue::from_static("  "));
        assert!(matches!(
            customer_id(&headers, &name),
            Err(ResolveError::Unauthorized)
        ));

        headers.insert(name.clone(), HeaderValue::from_static("cus_123"));
        assert_eq!(customer_id(&headers, &name).unwrap(), "cus_123");
    }

    #[test]
    fn test_validate_new_link() {
        let link = validate_new_link(CreateLinkRequest {
            target_url: Some(" https://Example.com ".to_string()),
            title: Some("   ".to_string()),
        })
        .unwrap();
        assert_eq!(link.target_url, "https://example.com/");
        assert_eq!(link.title, None);

        for bad in [None, Some(""), Some("example.com/path"), Some("not a url")] {
            let result = validate_new_link(CreateLinkRequest {
                target_url: bad.map(str::to_string),
                title: None,
            });
            assert!(matches!(result, Err(ResolveError::InvalidRequest(_))));
        }
    }

    #[test]
    fn test_validate_link_update() {
        let update = validate_link_update(UpdateLinkRequest {
            target_url: Some(Some(" https://Example.com/new ".to_string())),
            title: Some(Some("  ".to_string())),
        })
        .unwrap();
        assert_eq!(update.target_url.as_deref(), Some("https://example.com/new"));
        assert_eq!(update.title, Some(None));

        let title_only = validate_link_update(UpdateLinkRequest {
            target_url: None,
            title: Some(Some(" Docs ".to_string())),
        })
        .unwrap();
        assert_eq!(title_only.target_url, None);
        assert_eq!(title_only.title, Some(Some("Docs".to_string())));

        for target_url in [Some(None), Some(Some("".to_string())), Some(Some("nope".to_string()))] {
            let result = validate_link_update(UpdateLinkRequest {
                target_url,
                title: None,
            });
            assert!(matches!(result, Err(ResolveError::InvalidRequest(msg)) if msg == "A valid target URL is required"));
        }

        let empty = validate_link_update(UpdateLinkRequest::default());
        assert!(matches!(empty, Err(ResolveError::InvalidRequest(msg)) if msg == "No updates provided"));
    }

    #[test]
    fn test_failed_names_the_operation() {
        let error = failed(LOAD_LINKS_FAILED)(StoreError::Internal("boom".to_string()));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.public_message(), "Failed to load links");

        let not_found = failed::<ResolveError>(LOAD_LINKS_FAILED)(ResolveError::TeamNotFound);
        assert!(matches!(not_found, ResolveError::TeamNotFound));
    }
}
