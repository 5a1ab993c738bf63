use metrics::counter;

use crate::analytics::recorder::AnalyticsRecorder;
use crate::api::errors::ResolveError;
use crate::identifier::{AddressingIntent, ParsedIdentifier};
use crate::metrics_utils::LINK_RESOLUTIONS_COUNTER;
use crate::resolution::links_model::LinkRow;
use crate::store::{LinkStoreRef, StoreError};
use crate::teams::team_models::Team;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Single { link: LinkRow, team: Team },
    List { links: Vec<LinkRow>, team: Team },
}

impl Resolution {
    pub fn team(&self) -> &Team {
        match self {
            Resolution::Single { team, .. } | Resolution::List { team, .. } => team,
        }
    }
}

/// Request details stored with a click.
#[derive(Debug, Clone, Default)]
pub struct ClickContext {
    pub user_agent: Option<String>,
    pub referrer: Option<String>,
}

#[derive(Clone)]
pub struct LinkResolver {
    store: LinkStoreRef,
    recorder: AnalyticsRecorder,
}

impl LinkResolver {
    pub fn new(store: LinkStoreRef, recorder: AnalyticsRecorder) -> Self {
        Self { store, recorder }
    }

    /// Resolves a parsed identifier through exactly one addressing scheme.
    ///
    /// A single-link match records a click before returning. Listings never
    /// do, and nothing is written when resolution fails.
    pub async fn resolve(
        &self,
        parsed: &ParsedIdentifier,
        allow_listing: bool,
        click: &ClickContext,
    ) -> Result<Resolution, ResolveError> {
        let intent = parsed.intent(allow_listing);
        let scheme = scheme_label(&intent);

        let result = self.dispatch(parsed, intent).await;

        let outcome = match &result {
            Ok(Resolution::Single { .. }) => "single",
            Ok(Resolution::List { .. }) => "list",
            Err(error) => error.error_code(),
        };
        counter!(
            LINK_RESOLUTIONS_COUNTER,
            &[
                ("scheme", scheme.to_string()),
                ("outcome", outcome.to_string()),
            ]
        )
        .increment(1);

        let resolution = result?;
        if let Resolution::Single { link, team } = &resolution {
            self.recorder
                .record(
                    &link.id,
                    &team.id,
                    click.user_agent.as_deref(),
                    click.referrer.as_deref(),
                )
                .await;
        }
        Ok(resolution)
    }

    async fn dispatch(
        &self,
        parsed: &ParsedIdentifier,
        intent: AddressingIntent,
    ) -> Result<Resolution, ResolveError> {
        let store = &*self.store;
        let storage_error = |error: StoreError| log_storage_error(parsed, error);

        match intent {
            AddressingIntent::BySlugAndShortId { slug, short_id } => {
                let team = Team::resolve_by_slug(store, &slug)
                    .await
                    .map_err(storage_error)?
                    .ok_or(ResolveError::TeamNotFound)?;

                let link = store
                    .find_link_by_team_short_id(&team.id, short_id)
                    .await
                    .map_err(storage_error)?
                    .ok_or(ResolveError::LinkNotFound)?;

                Ok(Resolution::Single { link, team })
            }
            AddressingIntent::ByQueryId { link_id } | AddressingIntent::ByRawId { link_id } => {
                self.single_by_id(parsed, &link_id).await
            }
            AddressingIntent::BySlugListing { slug, link_id } => {
                let Some(team) = Team::resolve_by_slug(store, &slug)
                    .await
                    .map_err(storage_error)?
                else {
                    return self.single_by_id(parsed, &link_id).await;
                };

                let links = store
                    .list_team_links(&team.id)
                    .await
                    .map_err(storage_error)?;
                if links.is_empty() {
                    return Err(ResolveError::NoLinksForTeam);
                }

                Ok(Resolution::List { links, team })
            }
        }
    }

    async fn single_by_id(
        &self,
        parsed: &ParsedIdentifier,
        link_id: &str,
    ) -> Result<Resolution, ResolveError> {
        let storage_error = |error: StoreError| log_storage_error(parsed, error);

        let link = self
            .store
            .find_link_by_id(link_id)
            .await
            .map_err(storage_error)?
            .ok_or(ResolveError::LinkNotFound)?;

        let team = self
            .store
            .find_team_by_id(&link.team_id)
            .await
            .map_err(storage_error)?
            .ok_or(ResolveError::TeamNotFound)?;

        Ok(Resolution::Single { link, team })
    }
}

fn scheme_label(intent: &AddressingIntent) -> &'static str {
    match intent {
        AddressingIntent::BySlugAndShortId { .. } => "slug_short_id",
        AddressingIntent::ByQueryId { .. } => "query_id",
        AddressingIntent::BySlugListing { .. } => "slug_listing",
        AddressingIntent::ByRawId { .. } => "raw_id",
    }
}

fn log_storage_error(parsed: &ParsedIdentifier, error: StoreError) -> ResolveError {
    match &error {
        StoreError::Unavailable(_) => tracing::warn!(
            identifier = %parsed.raw_identifier,
            query_id = ?parsed.query_id,
            error = %error,
            "Storage unavailable while resolving link"
        ),
        _ => tracing::error!(
            identifier = %parsed.raw_identifier,
            query_id = ?parsed.query_id,
            error = %error,
            "Storage failure while resolving link"
        ),
    }
    error.into()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;

    use super::*;
    use crate::analytics::device::DeviceType;
    use crate::store::memory::MemoryStore;
    use crate::utils::test_utils::{insert_link, insert_link_with_id, insert_team};

    fn resolver(store: &Arc<MemoryStore>) -> LinkResolver {
        let recorder = AnalyticsRecorder::new(store.clone(), Duration::from_millis(500));
        LinkResolver::new(store.clone(), recorder)
    }

    fn browser() -> ClickContext {
        ClickContext {
            user_agent: Some("Mozilla/5.0 (Windows NT 10.0; Win64; x64)".to_string()),
            referrer: Some("https://news.example.com".to_string()),
        }
    }

    async fn resolve(
        store: &Arc<MemoryStore>,
        identifier: &str,
        query_id: Option<&str>,
    ) -> Result<Resolution, ResolveError> {
        let parsed = ParsedIdentifier::parse(identifier, query_id)?;
        resolver(store).resolve(&parsed, true, &browser()).await
    }

    fn single_target(resolution: &Resolution) -> &str {
        match resolution {
            Resolution::Single { link, .. } => &link.target_url,
            other => panic!("expected a single link, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slug_and_short_id() {
        let store = Arc::new(MemoryStore::new());
        let team = insert_team(&store, "Acme", Some("acme"));
        insert_link(&store, &team.id, Some(41), "https://example.com/41");
        let link = insert_link(&store, &team.id, Some(42), "https://example.com/42");

        let resolution = resolve(&store, "acme-42", None).await.unwrap();
        assert_eq!(single_target(&resolution), "https://example.com/42");
        assert_eq!(resolution.team().id, team.id);

        let events = store.analytics_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].link_id, link.id);
        assert_eq!(events[0].team_id, team.id);
        assert_eq!(events[0].device, DeviceType::Desktop);
        assert_eq!(
            events[0].referrer.as_deref(),
            Some("https://news.example.com")
        );
    }

    #[tokio::test]
    async fn test_slug_part_is_case_insensitive() {
        let store = Arc::new(MemoryStore::new());
        let team = insert_team(&store, "Acme", Some("acme"));
        insert_link(&store, &team.id, Some(42), "https://example.com/42");

        let resolution = resolve(&store, "ACME-42", None).await.unwrap();
        assert_eq!(single_target(&resolution), "https://example.com/42");
    }

    #[tokio::test]
    async fn test_team_without_persisted_slug() {
        let store = Arc::new(MemoryStore::new());
        let team = insert_team(&store, "Acme", None);
        insert_link(&store, &team.id, Some(42), "https://example.com/42");

        let resolution = resolve(&store, "acme-42", None).await.unwrap();
        assert_eq!(single_target(&resolution), "https://example.com/42");
    }

    #[tokio::test]
    async fn test_team_matched_by_legacy_derivation() {
        let store = Arc::new(MemoryStore::new());
        let team = insert_team(&store, "Acme Corp!", None);
        insert_link(&store, &team.id, Some(3), "https://example.com/3");

        let legacy = resolve(&store, "acme-corp-3", None).await.unwrap();
        assert_eq!(single_target(&legacy), "https://example.com/3");

        let primary = resolve(&store, "acmecorp-3", None).await.unwrap();
        assert_eq!(single_target(&primary), "https://example.com/3");
    }

    #[tokio::test]
    async fn test_bare_link_id() {
        let store = Arc::new(MemoryStore::new());
        let team = insert_team(&store, "Acme", Some("acme"));
        insert_link_with_id(
            &store,
            "xk3fa9",
            &team.id,
            None,
            "https://example.com/raw",
            Utc::now(),
        );

        let resolution = resolve(&store, "xk3fa9", None).await.unwrap();
        assert_eq!(single_target(&resolution), "https://example.com/raw");
        assert_eq!(resolution.team().id, team.id);
        assert_eq!(store.analytics_events().len(), 1);
    }

    #[tokio::test]
    async fn test_slug_listing_newest_first_without_analytics() {
        let store = Arc::new(MemoryStore::new());
        let team = insert_team(&store, "Acme", Some("acme"));
        let first = insert_link(&store, &team.id, Some(1), "https://example.com/1");
        let second = insert_link(&store, &team.id, Some(2), "https://example.com/2");
        let third = insert_link(&store, &team.id, None, "https://example.com/3");

        let resolution = resolve(&store, "acme", None).await.unwrap();
        match resolution {
            Resolution::List { links, team: listed } => {
                let ids: Vec<_> = links.iter().map(|l| l.id.clone()).collect();
                assert_eq!(ids, vec![third.id, second.id, first.id]);
                assert_eq!(listed.id, team.id);
            }
            other => panic!("expected a list, got {other:?}"),
        }

        assert!(store.analytics_events().is_empty());
        // listing through the open endpoint never backfills
        assert_eq!(store.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_slug_listing_with_no_links() {
        let store = Arc::new(MemoryStore::new());
        insert_team(&store, "Acme", Some("acme"));

        let result = resolve(&store, "acme", None).await;
        assert!(matches!(result, Err(ResolveError::NoLinksForTeam)));
    }

    #[tokio::test]
    async fn test_unknown_team_is_terminal_and_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let team = insert_team(&store, "Acme", Some("acme"));
        // A link whose primary key equals the identifier must not be reached
        insert_link_with_id(
            &store,
            "unknown-99",
            &team.id,
            None,
            "https://example.com/pk",
            Utc::now(),
        );

        let result = resolve(&store, "unknown-99", None).await;
        assert!(matches!(result, Err(ResolveError::TeamNotFound)));
        assert_eq!(store.mutation_count(), 0);
        assert!(store.analytics_events().is_empty());
    }

    #[tokio::test]
    async fn test_missing_short_id_is_terminal() {
        let store = Arc::new(MemoryStore::new());
        let team = insert_team(&store, "Acme", Some("acme"));
        insert_link(&store, &team.id, Some(1), "https://example.com/1");

        let result = resolve(&store, "acme-5", None).await;
        assert!(matches!(result, Err(ResolveError::LinkNotFound)));
    }

    #[tokio::test]
    async fn test_path_short_id_beats_query_id() {
        let store = Arc::new(MemoryStore::new());
        let team = insert_team(&store, "Acme", Some("acme"));
        insert_link(&store, &team.id, Some(7), "https://example.com/7");
        insert_link(&store, &team.id, Some(42), "https://example.com/42");

        let resolution = resolve(&store, "acme-42", Some("7")).await.unwrap();
        assert_eq!(single_target(&resolution), "https://example.com/42");
    }

    #[tokio::test]
    async fn test_numeric_query_id_acts_as_short_id() {
        let store = Arc::new(MemoryStore::new());
        let team = insert_team(&store, "Acme", Some("acme"));
        insert_link(&store, &team.id, Some(7), "https://example.com/7");

        let resolution = resolve(&store, "acme", Some("7")).await.unwrap();
        assert_eq!(single_target(&resolution), "https://example.com/7");
    }

    #[tokio::test]
    async fn test_query_id_as_primary_key() {
        let store = Arc::new(MemoryStore::new());
        let team = insert_team(&store, "Acme", Some("acme"));
        insert_link_with_id(
            &store,
            "lnkqueryid",
            &team.id,
            Some(1),
            "https://example.com/1",
            Utc::now(),
        );

        let resolution = resolve(&store, "whatever", Some(" lnkqueryid "))
            .await
            .unwrap();
        assert_eq!(single_target(&resolution), "https://example.com/1");
    }

    #[tokio::test]
    async fn test_query_id_miss_does_not_fall_back_to_listing() {
        let store = Arc::new(MemoryStore::new());
        let team = insert_team(&store, "Acme", Some("acme"));
        insert_link(&store, &team.id, Some(1), "https://example.com/1");

        let result = resolve(&store, "acme", Some("not-a-link")).await;
        assert!(matches!(result, Err(ResolveError::LinkNotFound)));
    }

    #[tokio::test]
    async fn test_listing_disabled_goes_to_primary_key() {
        let store = Arc::new(MemoryStore::new());
        let team = insert_team(&store, "Acme", Some("acme"));
        insert_link(&store, &team.id, Some(1), "https://example.com/1");

        let parsed = ParsedIdentifier::parse("acme", None).unwrap();
        let result = resolver(&store).resolve(&parsed, false, &browser()).await;
        assert!(matches!(result, Err(ResolveError::LinkNotFound)));
    }

    #[tokio::test]
    async fn test_storage_unavailable() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);

        let result = resolve(&store, "acme-42", None).await;
        assert!(matches!(result, Err(ResolveError::StorageUnavailable)));
    }

    #[tokio::test]
    async fn test_analytics_failure_does_not_fail_resolution() {
        let store = Arc::new(MemoryStore::new());
        let team = insert_team(&store, "Acme", Some("acme"));
        insert_link(&store, &team.id, Some(42), "https://example.com/42");
        store.fail_analytics_writes(true);

        let resolution = resolve(&store, "acme-42", None).await.unwrap();
        assert_eq!(single_target(&resolution), "https://example.com/42");
        assert!(store.analytics_events().is_empty());
    }
}
