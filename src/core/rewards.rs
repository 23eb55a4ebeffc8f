//! Reward aggregation: XP, level, and user-wide streak derivation.
//!
//! The user aggregate's derived fields (`total_xp`, `level`,
//! `current_streak`, `longest_streak`) are mutated here and nowhere else.
//! `apply_completion_reward` expects to run inside the completion
//! recorder's transaction so a concurrent reader never observes XP without
//! the completion that earned it.

use crate::core::error::HabitError;
use rusqlite::Connection;

/// XP granted per completion, manual or auto.
pub const XP_PER_COMPLETION: i64 = 10;

/// `level = floor(sqrt(total_xp / 100)) + 1`; monotonic in XP.
pub fn level_for_xp(total_xp: i64) -> i64 {
    ((total_xp.max(0) as f64) / 100.0).sqrt().floor() as i64 + 1
}

/// Credit one completion to the owning user and refresh the user-wide
/// streak maxima over their non-archived habits. O(number of habits).
pub fn apply_completion_reward(conn: &Connection, user_id: &str) -> Result<(), HabitError> {
    let total_xp: i64 = conn.query_row(
        "SELECT total_xp FROM users WHERE id = ?1",
        [user_id],
        |row| row.get(0),
    )?;
    let new_xp = total_xp + XP_PER_COMPLETION;
    let new_level = level_for_xp(new_xp);

    let (max_current, max_longest): (i64, i64) = conn.query_row(
        "SELECT COALESCE(MAX(current_streak), 0), COALESCE(MAX(longest_streak), 0)
         FROM habits WHERE user_id = ?1 AND is_active = 1",
        [user_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    conn.execute(
        "UPDATE users
         SET total_xp = ?2,
             level = ?3,
             current_streak = ?4,
             longest_streak = MAX(longest_streak, ?5),
             updated_at = ?6
         WHERE id = ?1",
        rusqlite::params![
            user_id,
            new_xp,
            new_level,
            max_current,
            max_longest,
            crate::core::time::now_rfc3339()
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_thresholds() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(90), 1);
        assert_eq!(level_for_xp(100), 2);
        assert_eq!(level_for_xp(390), 2);
        assert_eq!(level_for_xp(400), 3);
        assert_eq!(level_for_xp(900), 4);
    }

    #[test]
    fn test_level_is_monotonic() {
        let mut prev = level_for_xp(0);
        for xp in (0..=2000).step_by(10) {
            let level = level_for_xp(xp);
            assert!(level >= prev, "level dropped at xp={}", xp);
            prev = level;
        }
    }

    #[test]
    fn test_negative_xp_clamps_to_level_one() {
        assert_eq!(level_for_xp(-50), 1);
    }
}
