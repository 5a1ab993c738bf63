use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::teams::team_models::TeamId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LinkRow {
    pub id: String,
    pub team_id: TeamId,
    /// Team-scoped sequence number, assigned lazily for older links.
    pub short_id: Option<i32>,
    pub target_url: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLink {
    pub target_url: String,
    pub title: Option<String>,
}

/// Fields to change on an existing link. `title: Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkUpdate {
    pub target_url: Option<String>,
    pub title: Option<Option<String>>,
}

impl LinkUpdate {
    pub fn is_empty(&self) -> bool {
        self.target_url.is_none() && self.title.is_none()
    }

    pub fn apply_to(self, link: &mut LinkRow) {
        if let Some(target_url) = self.target_url {
            link.target_url = target_url;
        }
        if let Some(title) = self.title {
            link.title = title;
        }
    }
}
