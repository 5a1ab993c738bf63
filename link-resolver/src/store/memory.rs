use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::analytics::recorder::NewLinkAnalytics;
use crate::analytics::report::AnalyticsEvent;
use crate::resolution::backfill::{
    apply_backfill, high_water_mark, next_short_id, plan_short_id_backfill,
};
use crate::resolution::links_model::{LinkRow, LinkUpdate, NewLink};
use crate::store::{LinkStore, StoreError};
use crate::teams::team_models::{Team, TeamRole};
use crate::utils::generator::generate_link_id;

#[derive(Default)]
struct MemoryState {
    teams: Vec<Team>,
    links: Vec<LinkRow>,
    members: HashMap<(String, String), TeamRole>,
    analytics: Vec<NewLinkAnalytics>,
    /// Per team, the last short id handed out. Mirrors `teams.last_short_id`.
    last_short_ids: HashMap<String, i32>,
}

impl MemoryState {
    fn high_water(&self, team_id: &str, links: &[LinkRow]) -> i32 {
        high_water_mark(
            self.last_short_ids.get(team_id).copied().unwrap_or(0),
            links,
        )
    }

    fn record_high_water(&mut self, team_id: &str, short_id: i32) {
        let last = self.last_short_ids.entry(team_id.to_string()).or_insert(0);
        *last = (*last).max(short_id);
    }
}

/// In-process store with the same constraints as the Postgres schema.
/// The whole state sits behind one lock that is never held across an
/// await, which makes every operation atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    unavailable: AtomicBool,
    fail_analytics: AtomicBool,
    mutations: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_state(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        } else {
            Ok(())
        }
    }

    /// Makes every subsequent call fail as if the database went away.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn fail_analytics_writes(&self, fail: bool) {
        self.fail_analytics.store(fail, Ordering::SeqCst);
    }

    /// Number of writes applied since creation, seeding excluded.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn insert_team(&self, team: Team) {
        self.lock_state().teams.push(team);
    }

    /// Seeds a link, enforcing the `(team_id, short_id)` uniqueness.
    pub fn insert_link(&self, link: LinkRow) -> Result<(), StoreError> {
        let mut state = self.lock_state();
        if link.short_id.is_some()
            && state
                .links
                .iter()
                .any(|l| l.team_id == link.team_id && l.short_id == link.short_id)
        {
            return Err(StoreError::UniqueViolation(format!(
                "links_team_id_short_id_key ({}, {:?})",
                link.team_id, link.short_id
            )));
        }
        state.links.push(link);
        Ok(())
    }

    pub fn add_member(&self, team_id: &str, customer_id: &str, role: TeamRole) {
        self.lock_state()
            .members
            .insert((team_id.to_string(), customer_id.to_string()), role);
    }

    pub fn analytics_events(&self) -> Vec<NewLinkAnalytics> {
        self.lock_state().analytics.clone()
    }

    pub fn links_snapshot(&self, team_id: &str) -> Vec<LinkRow> {
        sorted_team_links(&self.lock_state(), team_id)
    }
}

fn sorted_team_links(state: &MemoryState, team_id: &str) -> Vec<LinkRow> {
    let mut links: Vec<LinkRow> = state
        .links
        .iter()
        .filter(|link| link.team_id == team_id)
        .cloned()
        .collect();
    links.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    links
}

#[async_trait]
impl LinkStore for MemoryStore {
    async fn find_team_by_slug(&self, slug: &str) -> Result<Option<Team>, StoreError> {
        self.check_available()?;
        Ok(self
            .lock_state()
            .teams
            .iter()
            .find(|team| team.slug.as_deref() == Some(slug))
            .cloned())
    }

    async fn find_team_by_id(&self, team_id: &str) -> Result<Option<Team>, StoreError> {
        self.check_available()?;
        Ok(self
            .lock_state()
            .teams
            .iter()
            .find(|team| team.id == team_id)
            .cloned())
    }

    async fn list_teams_without_slug(&self) -> Result<Vec<Team>, StoreError> {
        self.check_available()?;
        Ok(self
            .lock_state()
            .teams
            .iter()
            .filter(|team| team.slug.is_none())
            .cloned()
            .collect())
    }

    async fn find_link_by_id(&self, link_id: &str) -> Result<Option<LinkRow>, StoreError> {
        self.check_available()?;
        Ok(self
            .lock_state()
            .links
            .iter()
            .find(|link| link.id == link_id)
            .cloned())
    }

    async fn find_link_by_team_short_id(
        &self,
        team_id: &str,
        short_id: i32,
    ) -> Result<Option<LinkRow>, StoreError> {
        self.check_available()?;
        Ok(self
            .lock_state()
            .links
            .iter()
            .find(|link| link.team_id == team_id && link.short_id == Some(short_id))
            .cloned())
    }

    async fn list_team_links(&self, team_id: &str) -> Result<Vec<LinkRow>, StoreError> {
        self.check_available()?;
        Ok(sorted_team_links(&self.lock_state(), team_id))
    }

    async fn list_team_links_with_backfill(
        &self,
        team_id: &str,
    ) -> Result<Vec<LinkRow>, StoreError> {
        self.check_available()?;
        let mut state = self.lock_state();
        let mut links = sorted_team_links(&state, team_id);
        let plan = plan_short_id_backfill(state.high_water(team_id, &links), &links)?;

        for (link_id, short_id) in &plan {
            if let Some(stored) = state.links.iter_mut().find(|l| &l.id == link_id) {
                stored.short_id = Some(*short_id);
                stored.updated_at = Utc::now();
            }
        }
        if let Some((_, assigned)) = plan.last() {
            state.record_high_water(team_id, *assigned);
        }
        self.mutations.fetch_add(plan.len(), Ordering::SeqCst);

        apply_backfill(&mut links, &plan);
        Ok(links)
    }

    async fn create_link(&self, team_id: &str, link: NewLink) -> Result<LinkRow, StoreError> {
        self.check_available()?;
        let mut state = self.lock_state();
        let links = sorted_team_links(&state, team_id);
        let short_id = next_short_id(state.high_water(team_id, &links))?;
        let now = Utc::now();
        let row = LinkRow {
            id: generate_link_id(),
            team_id: team_id.to_string(),
            short_id: Some(short_id),
            target_url: link.target_url,
            title: link.title,
            created_at: now,
            updated_at: now,
        };
        state.links.push(row.clone());
        state.record_high_water(team_id, short_id);
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(row)
    }

    async fn update_link(
        &self,
        team_id: &str,
        link_id: &str,
        update: LinkUpdate,
    ) -> Result<Option<LinkRow>, StoreError> {
        self.check_available()?;
        let mut state = self.lock_state();
        let Some(link) = state
            .links
            .iter_mut()
            .find(|link| link.id == link_id && link.team_id == team_id)
        else {
            return Ok(None);
        };

        update.apply_to(link);
        link.updated_at = Utc::now();
        let updated = link.clone();
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(Some(updated))
    }

    async fn delete_link(&self, team_id: &str, link_id: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        let mut state = self.lock_state();
        let before = state.links.len();
        state
            .links
            .retain(|link| !(link.id == link_id && link.team_id == team_id));
        if state.links.len() == before {
            return Ok(false);
        }

        state.analytics.retain(|event| event.link_id != link_id);
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn find_member_role(
        &self,
        team_id: &str,
        customer_id: &str,
    ) -> Result<Option<TeamRole>, StoreError> {
        self.check_available()?;
        Ok(self
            .lock_state()
            .members
            .get(&(team_id.to_string(), customer_id.to_string()))
            .copied())
    }

    async fn insert_link_analytics(&self, event: NewLinkAnalytics) -> Result<(), StoreError> {
        self.check_available()?;
        if self.fail_analytics.load(Ordering::SeqCst) {
            return Err(StoreError::Internal(
                "link_analytics insert rejected".to_string(),
            ));
        }
        self.lock_state().analytics.push(event);
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_team_analytics_since(
        &self,
        team_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<AnalyticsEvent>, StoreError> {
        self.check_available()?;
        Ok(self
            .lock_state()
            .analytics
            .iter()
            .filter(|event| event.team_id == team_id && event.created_at >= since)
            .map(|event| AnalyticsEvent {
                created_at: event.created_at,
                device: event.device,
            })
            .collect())
    }
}
