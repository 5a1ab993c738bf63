use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common_database::{is_timeout_error, is_unavailable_error, is_unique_violation, CustomDatabaseError};
use thiserror::Error;

use crate::analytics::recorder::NewLinkAnalytics;
use crate::analytics::report::AnalyticsEvent;
use crate::resolution::links_model::{LinkRow, LinkUpdate, NewLink};
use crate::teams::team_models::{Team, TeamRole};

pub mod memory;
pub mod postgres;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("database error: {0}")]
    Database(sqlx::Error),
    #[error("internal storage error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        if is_unavailable_error(&error) || is_timeout_error(&error) {
            StoreError::Unavailable(error.to_string())
        } else if is_unique_violation(&error) {
            StoreError::UniqueViolation(error.to_string())
        } else {
            StoreError::Database(error)
        }
    }
}

impl From<CustomDatabaseError> for StoreError {
    fn from(error: CustomDatabaseError) -> Self {
        match error {
            CustomDatabaseError::Other(e) => e.into(),
            CustomDatabaseError::Timeout(e) => StoreError::Unavailable(e.to_string()),
        }
    }
}

/// Everything the resolution engine and the team endpoints need from storage.
///
/// Implementations must make `list_team_links_with_backfill` and
/// `create_link` atomic and serialized per team, so no two links of a team
/// ever share a short id. A short id is never handed out twice, even after
/// the link holding it was deleted.
#[async_trait]
pub trait LinkStore {
    async fn find_team_by_slug(&self, slug: &str) -> Result<Option<Team>, StoreError>;

    async fn find_team_by_id(&self, team_id: &str) -> Result<Option<Team>, StoreError>;

    async fn list_teams_without_slug(&self) -> Result<Vec<Team>, StoreError>;

    async fn find_link_by_id(&self, link_id: &str) -> Result<Option<LinkRow>, StoreError>;

    async fn find_link_by_team_short_id(
        &self,
        team_id: &str,
        short_id: i32,
    ) -> Result<Option<LinkRow>, StoreError>;

    /// Newest first. Read only.
    async fn list_team_links(&self, team_id: &str) -> Result<Vec<LinkRow>, StoreError>;

    /// Newest first, after giving every link without a short id the next
    /// free one. All assignments commit together or not at all.
    async fn list_team_links_with_backfill(
        &self,
        team_id: &str,
    ) -> Result<Vec<LinkRow>, StoreError>;

    async fn create_link(&self, team_id: &str, link: NewLink) -> Result<LinkRow, StoreError>;

    /// `None` when the team has no link with that id.
    async fn update_link(
        &self,
        team_id: &str,
        link_id: &str,
        update: LinkUpdate,
    ) -> Result<Option<LinkRow>, StoreError>;

    /// Removes the link and its recorded clicks. `false` when the team has
    /// no link with that id.
    async fn delete_link(&self, team_id: &str, link_id: &str) -> Result<bool, StoreError>;

    async fn find_member_role(
        &self,
        team_id: &str,
        customer_id: &str,
    ) -> Result<Option<TeamRole>, StoreError>;

    async fn insert_link_analytics(&self, event: NewLinkAnalytics) -> Result<(), StoreError>;

    async fn list_team_analytics_since(
        &self,
        team_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<AnalyticsEvent>, StoreError>;
}

pub type LinkStoreRef = Arc<dyn LinkStore + Send + Sync>;

/// Stand-in used when no database is configured. Every call reports the
/// storage as unavailable.
pub struct UnconfiguredStore;

const NOT_CONFIGURED: &str = "database not configured";

#[async_trait]
impl LinkStore for UnconfiguredStore {
    async fn find_team_by_slug(&self, _slug: &str) -> Result<Option<Team>, StoreError> {
        Err(StoreError::Unavailable(NOT_CONFIGURED.to_string()))
    }

    async fn find_team_by_id(&self, _team_id: &str) -> Result<Option<Team>, StoreError> {
        Err(StoreError::Unavailable(NOT_CONFIGURED.to_string()))
    }

    async fn list_teams_without_slug(&self) -> Result<Vec<Team>, StoreError> {
        Err(StoreError::Unavailable(NOT_CONFIGURED.to_string()))
    }

    async fn find_link_by_id(&self, _link_id: &str) -> Result<Option<LinkRow>, StoreError> {
        Err(StoreError::Unavailable(NOT_CONFIGURED.to_string()))
    }

    async fn find_link_by_team_short_id(
        &self,
        _team_id: &str,
        _short_id: i32,
    ) -> Result<Option<LinkRow>, StoreError> {
        Err(StoreError::Unavailable(NOT_CONFIGURED.to_string()))
    }

    async fn list_team_links(&self, _team_id: &str) -> Result<Vec<LinkRow>, StoreError> {
        Err(StoreError::Unavailable(NOT_CONFIGURED.to_string()))
    }

    async fn list_team_links_with_backfill(
        &self,
        _team_id: &str,
    ) -> Result<Vec<LinkRow>, StoreError> {
        Err(StoreError::Unavailable(NOT_CONFIGURED.to_string()))
    }

    async fn create_link(&self, _team_id: &str, _link: NewLink) -> Result<LinkRow, StoreError> {
        Err(StoreError::Unavailable(NOT_CONFIGURED.to_string()))
    }

    async fn update_link(
        &self,
        _team_id: &str,
        _link_id: &str,
        _update: LinkUpdate,
    ) -> Result<Option<LinkRow>, StoreError> {
        Err(StoreError::Unavailable(NOT_CONFIGURED.to_string()))
    }

    async fn delete_link(&self, _team_id: &str, _link_id: &str) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable(NOT_CONFIGURED.to_string()))
    }

    async fn find_member_role(
        &self,
        _team_id: &str,
        _customer_id: &str,
    ) -> Result<Option<TeamRole>, StoreError> {
        Err(StoreError::Unavailable(NOT_CONFIGURED.to_string()))
    }

    async fn insert_link_analytics(&self, _event: NewLinkAnalytics) -> Result<(), StoreError> {
        Err(StoreError::Unavailable(NOT_CONFIGURED.to_string()))
    }

    async fn list_team_analytics_since(
        &self,
        _team_id: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<AnalyticsEvent>, StoreError> {
        Err(StoreError::Unavailable(NOT_CONFIGURED.to_string()))
    }
}
