//! crates/reading_tracker_core/src/goals.rs
//!
//! Advances a user's active goals of one type in response to a reading event.

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{Goal, GoalType};
use crate::ports::{PortResult, ReadingTransaction};

/// Applies `delta` to a single goal, clamping at the target.
///
/// Completed goals and non-positive deltas leave the goal untouched.
pub fn advance_goal(goal: &Goal, delta: i32, now: DateTime<Utc>) -> Goal {
    if !goal.is_active() || delta <= 0 {
        return goal.clone();
    }

    let mut advanced = goal.clone();
    let new_progress = goal.progress.saturating_add(delta).min(goal.target);
    if new_progress >= goal.target {
        advanced.progress = goal.target;
        advanced.completed_at = Some(now);
    } else {
        advanced.progress = new_progress;
    }
    advanced
}

/// Advances every active goal of `goal_type` for the user as one batch inside `tx`.
///
/// The goals stay locked until the caller's transaction ends. Returns the goals as saved.
pub async fn advance_goals(
    tx: &mut dyn ReadingTransaction,
    user_id: Uuid,
    goal_type: GoalType,
    delta: i32,
    now: DateTime<Utc>,
) -> PortResult<Vec<Goal>> {
    if delta <= 0 {
        return Ok(Vec::new());
    }

    let goals = tx.lock_active_goals(user_id, goal_type).await?;
    if goals.is_empty() {
        debug!(%user_id, %goal_type, "No active goals to advance");
        return Ok(goals);
    }

    let advanced: Vec<Goal> = goals.iter().map(|g| advance_goal(g, delta, now)).collect();
    tx.save_goals(&advanced).await?;

    for goal in advanced.iter().filter(|g| g.completed_at == Some(now)) {
        info!(%user_id, goal_id = %goal.id, %goal_type, target = goal.target, "Goal completed");
    }
    Ok(advanced)
}
