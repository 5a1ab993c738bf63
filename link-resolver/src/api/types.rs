use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::resolution::links_model::LinkRow;
use crate::resolution::resolution_service::Resolution;
use crate::teams::team_models::Team;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicLink {
    pub id: String,
    pub short_id: Option<i32>,
    pub title: Option<String>,
    pub target_url: String,
}

impl From<LinkRow> for PublicLink {
    fn from(link: LinkRow) -> Self {
        Self {
            id: link.id,
            short_id: link.short_id,
            title: link.title,
            target_url: link.target_url,
        }
    }
}

/// Branding shown around a resolved link. Carries no team id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamTheme {
    pub logo_url: Option<String>,
    pub team_name: String,
    pub team_slug: String,
    pub background_color: Option<String>,
    pub text_color: Option<String>,
    pub highlight_color: Option<String>,
}

impl From<Team> for TeamTheme {
    fn from(team: Team) -> Self {
        Self {
            team_slug: team.effective_slug(),
            logo_url: team.logo_url,
            team_name: team.name,
            background_color: team.background_color,
            text_color: team.text_color,
            highlight_color: team.highlight_color,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Single,
    List,
}

/// `{ type, link | links, ...theme }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenLinkResponse {
    #[serde(rename = "type")]
    pub kind: ResponseKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<PublicLink>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<PublicLink>>,
    #[serde(flatten)]
    pub theme: TeamTheme,
}

impl From<Resolution> for OpenLinkResponse {
    fn from(resolution: Resolution) -> Self {
        match resolution {
            Resolution::Single { link, team } => Self {
                kind: ResponseKind::Single,
                link: Some(link.into()),
                links: None,
                theme: team.into(),
            },
            Resolution::List { links, team } => Self {
                kind: ResponseKind::List,
                link: None,
                links: Some(links.into_iter().map(PublicLink::from).collect()),
                theme: team.into(),
            },
        }
    }
}

/// Flat single-link payload served on the `/v0` routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyOpenLinkResponse {
    pub target_url: String,
    pub logo_url: Option<String>,
    pub team_name: String,
    pub background_color: Option<String>,
    pub text_color: Option<String>,
    pub highlight_color: Option<String>,
}

impl LegacyOpenLinkResponse {
    pub fn new(link: LinkRow, team: Team) -> Self {
        Self {
            target_url: link.target_url,
            logo_url: team.logo_url,
            team_name: team.name,
            background_color: team.background_color,
            text_color: team.text_color,
            highlight_color: team.highlight_color,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamLinkResponse {
    pub id: String,
    pub short_id: Option<i32>,
    pub title: Option<String>,
    pub target_url: String,
    pub created_at: DateTime<Utc>,
}

impl From<LinkRow> for TeamLinkResponse {
    fn from(link: LinkRow) -> Self {
        Self {
            id: link.id,
            short_id: link.short_id,
            title: link.title,
            target_url: link.target_url,
            created_at: link.created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolveUrlRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLinkRequest {
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Every field is optional. A field sent as `null` is present, which tells
/// "clear the title" apart from "leave the title alone".
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLinkRequest {
    #[serde(default, deserialize_with = "present")]
    pub target_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub title: Option<Option<String>>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteLinkResponse {
    pub success: bool,
}
