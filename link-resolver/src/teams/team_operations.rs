use crate::api::errors::ResolveError;
use crate::slug::name_matches_slug;
use crate::store::{LinkStore, StoreError};
use crate::teams::team_models::{Team, TeamRole};

impl Team {
    /// Finds the team a lowercased slug refers to.
    ///
    /// A persisted slug wins outright. Only when none matches are the teams
    /// without a stored slug scanned, comparing against both derivations of
    /// their name.
    pub async fn resolve_by_slug(
        store: &(dyn LinkStore + Send + Sync),
        slug: &str,
    ) -> Result<Option<Team>, StoreError> {
        if let Some(team) = store.find_team_by_slug(slug).await? {
            return Ok(Some(team));
        }

        let legacy_teams = store.list_teams_without_slug().await?;
        let matched = legacy_teams
            .into_iter()
            .find(|team| name_matches_slug(&team.name, slug));

        if let Some(team) = &matched {
            tracing::debug!(team_id = %team.id, slug, "Matched team by derived slug");
        }
        Ok(matched)
    }

    /// Loads a team on behalf of a caller, who must be one of its members.
    /// Non-members get the same answer as for a missing team.
    pub async fn for_member(
        store: &(dyn LinkStore + Send + Sync),
        team_id: &str,
        customer_id: &str,
    ) -> Result<(Team, TeamRole), ResolveError> {
        let role = store
            .find_member_role(team_id, customer_id)
            .await?
            .ok_or(ResolveError::TeamNotFound)?;

        let team = store
            .find_team_by_id(team_id)
            .await?
            .ok_or(ResolveError::TeamNotFound)?;

        Ok((team, role))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::utils::test_utils::{add_member, insert_team};

    #[tokio::test]
    async fn test_resolve_by_persisted_slug() {
        let store = Arc::new(MemoryStore::new());
        let team = insert_team(&store, "Acme", Some("acme"));
        insert_team(&store, "Other", Some("other"));

        let found = Team::resolve_by_slug(&*store, "acme").await.unwrap();
        assert_eq!(found.map(|t| t.id), Some(team.id));
    }

    #[tokio::test]
    async fn test_resolve_legacy_team_by_either_derivation() {
        let store = Arc::new(MemoryStore::new());
        let team = insert_team(&store, "Acme Corp", None);

        let primary = Team::resolve_by_slug(&*store, "acmecorp").await.unwrap();
        assert_eq!(primary.map(|t| t.id), Some(team.id.clone()));

        let legacy = Team::resolve_by_slug(&*store, "acme-corp").await.unwrap();
        assert_eq!(legacy.map(|t| t.id), Some(team.id));
    }

    #[tokio::test]
    async fn test_persisted_slug_is_never_rederived() {
        let store = Arc::new(MemoryStore::new());
        // Name derives to "acmecorp" but the stored slug is something else
        insert_team(&store, "Acme Corp", Some("acme"));

        let found = Team::resolve_by_slug(&*store, "acmecorp").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_persisted_slug_beats_legacy_match() {
        let store = Arc::new(MemoryStore::new());
        insert_team(&store, "Acme", None);
        let persisted = insert_team(&store, "Acme Rockets", Some("acme"));

        let found = Team::resolve_by_slug(&*store, "acme").await.unwrap();
        assert_eq!(found.map(|t| t.id), Some(persisted.id));
    }

    #[tokio::test]
    async fn test_resolve_unknown_slug() {
        let store = Arc::new(MemoryStore::new());
        insert_team(&store, "Acme", None);

        let found = Team::resolve_by_slug(&*store, "unknown").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_for_member() {
        let store = Arc::new(MemoryStore::new());
        let team = insert_team(&store, "Acme", Some("acme"));
        add_member(&store, &team, "cus_owner", TeamRole::Owner);

        let (loaded, role) = Team::for_member(&*store, &team.id, "cus_owner")
            .await
            .unwrap();
        assert_eq!(loaded.id, team.id);
        assert_eq!(role, TeamRole::Owner);

        let outsider = Team::for_member(&*store, &team.id, "cus_stranger").await;
        assert!(matches!(outsider, Err(ResolveError::TeamNotFound)));
    }
}
