use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};

use crate::resolution::links_model::LinkRow;
use crate::store::memory::MemoryStore;
use crate::teams::team_models::{Team, TeamRole};
use crate::utils::generator::generate_link_id;

pub fn random_string(prefix: &str, length: usize) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(Alphanumeric)
        .take(length)
        .map(char::from)
        .collect();
    format!("{}{}", prefix, suffix)
}

pub fn new_team(name: &str, slug: Option<&str>) -> Team {
    Team {
        id: random_string("team_", 10),
        name: name.to_string(),
        slug: slug.map(str::to_string),
        logo_url: Some(format!("https://cdn.example.com/{}.png", name.to_lowercase())),
        background_color: Some("#ffffff".to_string()),
        text_color: Some("#111111".to_string()),
        highlight_color: Some("#ff6600".to_string()),
        font: None,
        created_at: Utc::now(),
    }
}

pub fn insert_team(store: &Arc<MemoryStore>, name: &str, slug: Option<&str>) -> Team {
    let team = new_team(name, slug);
    store.insert_team(team.clone());
    team
}

/// Seeds a link created strictly after every other link of the team, so
/// listings come back in insertion order reversed.
pub fn insert_link(
    store: &Arc<MemoryStore>,
    team_id: &str,
    short_id: Option<i32>,
    target_url: &str,
) -> LinkRow {
    let newest = store
        .links_snapshot(team_id)
        .first()
        .map(|link| link.created_at);
    let created_at = next_timestamp(newest);

    insert_link_at(store, team_id, short_id, target_url, created_at)
}

pub fn insert_link_at(
    store: &Arc<MemoryStore>,
    team_id: &str,
    short_id: Option<i32>,
    target_url: &str,
    created_at: DateTime<Utc>,
) -> LinkRow {
    insert_link_with_id(store, &generate_link_id(), team_id, short_id, target_url, created_at)
}

pub fn insert_link_with_id(
    store: &Arc<MemoryStore>,
    link_id: &str,
    team_id: &str,
    short_id: Option<i32>,
    target_url: &str,
    created_at: DateTime<Utc>,
) -> LinkRow {
    let link = LinkRow {
        id: link_id.to_string(),
        team_id: team_id.to_string(),
        short_id,
        target_url: target_url.to_string(),
        title: Some(format!("Link to {target_url}")),
        created_at,
        updated_at: created_at,
    };
    store
        .insert_link(link.clone())
        .expect("Failed to seed link");
    link
}

pub fn add_member(store: &Arc<MemoryStore>, team: &Team, customer_id: &str, role: TeamRole) {
    store.add_member(&team.id, customer_id, role);
}

fn next_timestamp(after: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match after {
        Some(previous) if previous >= now => previous + Duration::milliseconds(1),
        _ => now,
    }
}
