use crate::resolution::links_model::LinkRow;
use crate::store::StoreError;

/// Highest short id a team has handed out. `last_assigned` is the team's
/// stored mark, which still counts links deleted since.
pub fn high_water_mark(last_assigned: i32, links: &[LinkRow]) -> i32 {
    links
        .iter()
        .filter_map(|link| link.short_id)
        .fold(last_assigned, i32::max)
}

/// The short id following `high_water`. Ids are never reused, so running
/// out of them is an error rather than a wrap.
pub fn next_short_id(high_water: i32) -> Result<i32, StoreError> {
    high_water.checked_add(1).ok_or_else(|| {
        StoreError::Internal(format!("short id space exhausted after {high_water}"))
    })
}

/// Short ids to hand out to links that have none, as `(link_id, short_id)`.
///
/// Links are numbered in the order given (the listing order, newest first),
/// starting after `high_water`. Ids already assigned are never touched, so
/// running the plan twice is a no-op the second time.
pub fn plan_short_id_backfill(
    high_water: i32,
    links: &[LinkRow],
) -> Result<Vec<(String, i32)>, StoreError> {
    let mut last = high_water;
    let mut plan = Vec::new();
    for link in links.iter().filter(|link| link.short_id.is_none()) {
        last = next_short_id(last)?;
        plan.push((link.id.clone(), last));
    }
    Ok(plan)
}

/// Mirrors committed assignments onto an in-memory listing.
pub fn apply_backfill(links: &mut [LinkRow], plan: &[(String, i32)]) {
    for (link_id, short_id) in plan {
        if let Some(link) = links.iter_mut().find(|link| &link.id == link_id) {
            link.short_id = Some(*short_id);
        }
    }
}
