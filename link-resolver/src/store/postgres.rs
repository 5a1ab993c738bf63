use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common_database::PostgresClient;
use metrics::counter;
use sqlx::{Acquire, PgConnection};
use tracing::instrument;

use crate::analytics::device::DeviceType;
use crate::analytics::recorder::NewLinkAnalytics;
use crate::analytics::report::AnalyticsEvent;
use crate::metrics_utils::BACKFILL_ASSIGNED_COUNTER;
use crate::resolution::backfill::{
    apply_backfill, high_water_mark, next_short_id, plan_short_id_backfill,
};
use crate::resolution::links_model::{LinkRow, LinkUpdate, NewLink};
use crate::store::{LinkStore, StoreError};
use crate::teams::team_models::{Team, TeamRole};
use crate::utils::generator::generate_link_id;

const TEAM_COLUMNS: &str = "id, name, slug, logo_url, background_color, text_color, \
                            highlight_color, font, created_at";

const LINK_COLUMNS: &str = "id, team_id, short_id, target_url, title, created_at, updated_at";

pub struct PgLinkStore {
    client: PostgresClient,
}

impl PgLinkStore {
    pub fn new(client: PostgresClient) -> Self {
        Self { client }
    }
}

/// Locks the team row until the surrounding transaction ends, which
/// serializes short id assignment per team. Returns the last short id the
/// team handed out.
async fn lock_team_short_ids(conn: &mut PgConnection, team_id: &str) -> Result<i32, StoreError> {
    let row: Option<(i32,)> =
        sqlx::query_as("SELECT last_short_id FROM teams WHERE id = $1 FOR UPDATE")
            .bind(team_id)
            .fetch_optional(&mut *conn)
            .await?;
    row.map(|(last_short_id,)| last_short_id)
        .ok_or_else(|| StoreError::Internal(format!("team {team_id} does not exist")))
}

/// Rows outside the `device` CHECK constraint are counted as desktop.
fn stored_device(team_id: &str, device: &str) -> DeviceType {
    device.parse::<DeviceType>().unwrap_or_else(|_| {
        tracing::warn!(team_id, device, "Unknown device in link_analytics, counting as desktop");
        DeviceType::Desktop
    })
}

async fn record_short_id_high_water(
    conn: &mut PgConnection,
    team_id: &str,
    last_short_id: i32,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE teams SET last_short_id = GREATEST(last_short_id, $2) WHERE id = $1")
        .bind(team_id)
        .bind(last_short_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

#[async_trait]
impl LinkStore for PgLinkStore {
    #[instrument(skip(self))]
    async fn find_team_by_slug(&self, slug: &str) -> Result<Option<Team>, StoreError> {
        let mut conn = self.client.get_connection().await?;
        let query = format!("SELECT {TEAM_COLUMNS} FROM teams WHERE slug = $1");
        let team = sqlx::query_as::<_, Team>(&query)
            .bind(slug)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(team)
    }

    #[instrument(skip(self))]
    async fn find_team_by_id(&self, team_id: &str) -> Result<Option<Team>, StoreError> {
        let mut conn = self.client.get_connection().await?;
        let query = format!("SELECT {TEAM_COLUMNS} FROM teams WHERE id = $1");
        let team = sqlx::query_as::<_, Team>(&query)
            .bind(team_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(team)
    }

    #[instrument(skip(self))]
    async fn list_teams_without_slug(&self) -> Result<Vec<Team>, StoreError> {
        let mut conn = self.client.get_connection().await?;
        let query =
            format!("SELECT {TEAM_COLUMNS} FROM teams WHERE slug IS NULL ORDER BY created_at ASC");
        let teams = sqlx::query_as::<_, Team>(&query)
            .fetch_all(&mut *conn)
            .await?;
        Ok(teams)
    }

    #[instrument(skip(self))]
    async fn find_link_by_id(&self, link_id: &str) -> Result<Option<LinkRow>, StoreError> {
        let mut conn = self.client.get_connection().await?;
        let query = format!("SELECT {LINK_COLUMNS} FROM links WHERE id = $1");
        let link = sqlx::query_as::<_, LinkRow>(&query)
            .bind(link_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(link)
    }

    #[instrument(skip(self))]
    async fn find_link_by_team_short_id(
        &self,
        team_id: &str,
        short_id: i32,
    ) -> Result<Option<LinkRow>, StoreError> {
        let mut conn = self.client.get_connection().await?;
        let query = format!("SELECT {LINK_COLUMNS} FROM links WHERE team_id = $1 AND short_id = $2");
        let link = sqlx::query_as::<_, LinkRow>(&query)
            .bind(team_id)
            .bind(short_id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(link)
    }

    #[instrument(skip(self))]
    async fn list_team_links(&self, team_id: &str) -> Result<Vec<LinkRow>, StoreError> {
        let mut conn = self.client.get_connection().await?;
        let query = format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE team_id = $1 ORDER BY created_at DESC"
        );
        let links = sqlx::query_as::<_, LinkRow>(&query)
            .bind(team_id)
            .fetch_all(&mut *conn)
            .await?;
        Ok(links)
    }

    #[instrument(skip(self))]
    async fn list_team_links_with_backfill(
        &self,
        team_id: &str,
    ) -> Result<Vec<LinkRow>, StoreError> {
        let mut conn = self.client.get_connection().await?;
        let mut transaction = conn.begin().await?;

        let last_short_id = lock_team_short_ids(&mut *transaction, team_id).await?;

        let query = format!(
            "SELECT {LINK_COLUMNS} FROM links WHERE team_id = $1 ORDER BY created_at DESC"
        );
        let mut links = sqlx::query_as::<_, LinkRow>(&query)
            .bind(team_id)
            .fetch_all(&mut *transaction)
            .await?;

        let plan = plan_short_id_backfill(high_water_mark(last_short_id, &links), &links)?;
        for (link_id, short_id) in &plan {
            sqlx::query("UPDATE links SET short_id = $1, updated_at = NOW() WHERE id = $2")
                .bind(short_id)
                .bind(link_id)
                .execute(&mut *transaction)
                .await?;
        }
        if let Some((_, assigned)) = plan.last() {
            record_short_id_high_water(&mut *transaction, team_id, *assigned).await?;
        }
        transaction.commit().await?;

        if !plan.is_empty() {
            counter!(BACKFILL_ASSIGNED_COUNTER).increment(plan.len() as u64);
            tracing::info!(team_id, assigned = plan.len(), "Backfilled link short ids");
        }
        apply_backfill(&mut links, &plan);
        Ok(links)
    }

    #[instrument(skip(self, link))]
    async fn create_link(&self, team_id: &str, link: NewLink) -> Result<LinkRow, StoreError> {
        let mut conn = self.client.get_connection().await?;
        let mut transaction = conn.begin().await?;

        let last_short_id = lock_team_short_ids(&mut *transaction, team_id).await?;

        let (max_short_id,): (i32,) =
            sqlx::query_as("SELECT COALESCE(MAX(short_id), 0) FROM links WHERE team_id = $1")
                .bind(team_id)
                .fetch_one(&mut *transaction)
                .await?;
        let short_id = next_short_id(last_short_id.max(max_short_id))?;

        let query = format!(
            "INSERT INTO links (id, team_id, short_id, target_url, title, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
             RETURNING {LINK_COLUMNS}"
        );
        let row = sqlx::query_as::<_, LinkRow>(&query)
            .bind(generate_link_id())
            .bind(team_id)
            .bind(short_id)
            .bind(&link.target_url)
            .bind(&link.title)
            .fetch_one(&mut *transaction)
            .await?;
        record_short_id_high_water(&mut *transaction, team_id, short_id).await?;
        transaction.commit().await?;

        Ok(row)
    }

    #[instrument(skip(self, update))]
    async fn update_link(
        &self,
        team_id: &str,
        link_id: &str,
        update: LinkUpdate,
    ) -> Result<Option<LinkRow>, StoreError> {
        let mut conn = self.client.get_connection().await?;
        let LinkUpdate { target_url, title } = update;
        let query = format!(
            "UPDATE links
             SET target_url = COALESCE($3, target_url),
                 title = CASE WHEN $4 THEN $5 ELSE title END,
                 updated_at = NOW()
             WHERE id = $1 AND team_id = $2
             RETURNING {LINK_COLUMNS}"
        );
        let link = sqlx::query_as::<_, LinkRow>(&query)
            .bind(link_id)
            .bind(team_id)
            .bind(target_url)
            .bind(title.is_some())
            .bind(title.flatten())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(link)
    }

    #[instrument(skip(self))]
    async fn delete_link(&self, team_id: &str, link_id: &str) -> Result<bool, StoreError> {
        let mut conn = self.client.get_connection().await?;
        // link_analytics rows go with it through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM links WHERE id = $1 AND team_id = $2")
            .bind(link_id)
            .bind(team_id)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn find_member_role(
        &self,
        team_id: &str,
        customer_id: &str,
    ) -> Result<Option<TeamRole>, StoreError> {
        let mut conn = self.client.get_connection().await?;
        let role: Option<(String,)> = sqlx::query_as(
            "SELECT role FROM team_members WHERE team_id = $1 AND customer_id = $2",
        )
        .bind(team_id)
        .bind(customer_id)
        .fetch_optional(&mut *conn)
        .await?;

        role.map(|(role,)| role.parse::<TeamRole>().map_err(StoreError::Internal))
            .transpose()
    }

    #[instrument(skip(self, event), fields(link_id = %event.link_id))]
    async fn insert_link_analytics(&self, event: NewLinkAnalytics) -> Result<(), StoreError> {
        let mut conn = self.client.get_connection().await?;
        sqlx::query(
            "INSERT INTO link_analytics (id, link_id, team_id, device, user_agent, referrer, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(event.id)
        .bind(&event.link_id)
        .bind(&event.team_id)
        .bind(event.device.as_str())
        .bind(&event.user_agent)
        .bind(&event.referrer)
        .bind(event.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_team_analytics_since(
        &self,
        team_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<AnalyticsEvent>, StoreError> {
        let mut conn = self.client.get_connection().await?;
        let rows: Vec<(DateTime<Utc>, String)> = sqlx::query_as(
            "SELECT created_at, device FROM link_analytics WHERE team_id = $1 AND created_at >= $2",
        )
        .bind(team_id)
        .bind(since)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(created_at, device)| AnalyticsEvent {
                created_at,
                device: stored_device(team_id, &device),
            })
            .collect())
    }
}
