use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::slug::normalize_slug;

pub type TeamId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    /// Absent for teams created before slugs were persisted.
    pub slug: Option<String>,
    pub logo_url: Option<String>,
    pub background_color: Option<String>,
    pub text_color: Option<String>,
    pub highlight_color: Option<String>,
    pub font: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Team {
    /// The persisted slug, or the current derivation of the name for teams
    /// that never had one stored.
    pub fn effective_slug(&self) -> String {
        match &self.slug {
            Some(slug) => slug.clone(),
            None => normalize_slug(&self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TeamRole {
    Owner,
    Admin,
    Member,
}

impl TeamRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamRole::Owner => "OWNER",
            TeamRole::Admin => "ADMIN",
            TeamRole::Member => "MEMBER",
        }
    }

    pub fn can_manage_links(&self) -> bool {
        !matches!(self, TeamRole::Member)
    }
}

impl FromStr for TeamRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OWNER" => Ok(TeamRole::Owner),
            "ADMIN" => Ok(TeamRole::Admin),
            "MEMBER" => Ok(TeamRole::Member),
            other => Err(format!("unknown team role: {other}")),
        }
    }
}
