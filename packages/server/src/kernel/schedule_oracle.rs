//! ScheduleOracle: the retry-window rulebook (spec §2.5, §4.3).
//!
//! Loaded from YAML at startup and hot-reloaded hourly from
//! `RETRY_SCHEDULE_PATH`, following the same `RwLock<Arc<...>>` swap pattern
//! the spec's redesign notes call for (§9) in place of the original's
//! per-process restart-to-reload behavior.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Timelike, Utc, Weekday};
use serde::Deserialize;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A single retry rule, the Rust mirror of the original's `RetryRule`
/// Django model (day_of_week, start_time, end_time, max_attempts,
/// retry_interval_minutes, optional campaign scope, is_active).
#[derive(Debug, Clone, Deserialize)]
pub struct RetryRule {
    pub day_of_week: Weekday,
    /// `HH:MM`, inclusive.
    pub start_time: String,
    /// `HH:MM`, inclusive.
    pub end_time: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_interval_minutes")]
    pub retry_interval_minutes: i64,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_retry_interval_minutes() -> i64 {
    60
}
fn default_is_active() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct Defaults {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_interval_minutes")]
    pub retry_interval_minutes: i64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_interval_minutes: default_retry_interval_minutes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ScheduleConfigFile {
    #[serde(default)]
    defaults: Defaults,
    #[serde(default)]
    global_rules: Vec<RetryRule>,
    #[serde(default)]
    campaign_rules: std::collections::HashMap<Uuid, Vec<RetryRule>>,
}

struct ScheduleState {
    defaults: Defaults,
    global_rules: Vec<RetryRule>,
    campaign_rules: std::collections::HashMap<Uuid, Vec<RetryRule>>,
}

/// Holds the current rule set behind a lock so the hourly reload task can
/// swap it in without readers ever seeing a half-updated config.
pub struct ScheduleOracle {
    path: PathBuf,
    state: RwLock<Arc<ScheduleState>>,
}

impl ScheduleOracle {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = Self::read_state(&path).await?;
        Ok(Self {
            path,
            state: RwLock::new(Arc::new(state)),
        })
    }

    async fn read_state(path: &PathBuf) -> Result<ScheduleState> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading retry schedule at {}", path.display()))?;
        let parsed: ScheduleConfigFile =
            serde_yaml::from_str(&raw).context("parsing retry schedule YAML")?;
        Ok(ScheduleState {
            defaults: parsed.defaults,
            global_rules: parsed.global_rules,
            campaign_rules: parsed.campaign_rules,
        })
    }

    /// Re-read the YAML file from disk and swap it in. Campaign rules fully
    /// replace the prior set for that campaign; they never merge.
    pub async fn reload(&self) -> Result<()> {
        let state = Self::read_state(&self.path).await?;
        let mut guard = self.state.write().await;
        *guard = Arc::new(state);
        Ok(())
    }

    /// The rule set that applies to `campaign_id`: that campaign's own rules
    /// if it has any, else the global fallback rules.
    async fn rules_for(&self, campaign_id: Uuid) -> (Arc<ScheduleState>, Vec<RetryRule>) {
        let state = self.state.read().await.clone();
        let rules = state
            .campaign_rules
            .get(&campaign_id)
            .cloned()
            .unwrap_or_else(|| state.global_rules.clone());
        (state, rules)
    }

    /// Whether `t` falls inside any active window for `campaign_id`, at
    /// minute granularity, both endpoints inclusive. Ties among overlapping
    /// rules resolve by declaration order (first match wins).
    pub async fn in_window(&self, t: DateTime<Utc>, campaign_id: Uuid) -> bool {
        let (_, rules) = self.rules_for(campaign_id).await;
        rules.iter().any(|r| rule_in_window(r, t))
    }

    /// The maximum retry attempts in effect for `campaign_id`, falling back
    /// to the configured defaults if no rule applies.
    pub async fn max_attempts(&self, campaign_id: Uuid) -> u32 {
        let (state, rules) = self.rules_for(campaign_id).await;
        rules
            .iter()
            .find(|r| r.is_active)
            .map(|r| r.max_attempts)
            .unwrap_or(state.defaults.max_attempts)
    }

    /// Closed-form search for the next time at or after `t` that falls
    /// inside a window, searching forward up to 7 days. Always returns
    /// `Some`: if no rule ever opens a window in that span, falls back to
    /// `t + defaults.retry_interval_minutes` (spec §4.3) rather than leaving
    /// the call stuck with no `next_retry_at`.
    pub async fn next_retry(&self, t: DateTime<Utc>, campaign_id: Uuid) -> Option<DateTime<Utc>> {
        let (state, rules) = self.rules_for(campaign_id).await;

        if !rules.is_empty() {
            let interval = rules
                .iter()
                .find(|r| r.is_active)
                .map(|r| r.retry_interval_minutes)
                .unwrap_or(state.defaults.retry_interval_minutes);

            let mut candidate = t + Duration::minutes(interval);
            let deadline = t + Duration::days(7);

            while candidate <= deadline {
                if rules.iter().any(|r| rule_in_window(r, candidate)) {
                    return Some(candidate);
                }
                candidate += Duration::minutes(1);
            }
        }

        Some(t + Duration::minutes(state.defaults.retry_interval_minutes))
    }
}

fn parse_hhmm(s: &str) -> Option<(u32, u32)> {
    let mut parts = s.splitn(2, ':');
    let h: u32 = parts.next()?.parse().ok()?;
    let m: u32 = parts.next()?.parse().ok()?;
    Some((h, m))
}

fn rule_in_window(rule: &RetryRule, t: DateTime<Utc>) -> bool {
    if !rule.is_active || t.weekday() != rule.day_of_week {
        return false;
    }
    let (Some((sh, sm)), Some((eh, em))) =
        (parse_hhmm(&rule.start_time), parse_hhmm(&rule.end_time))
    else {
        return false;
    };
    let minute_of_day = t.hour() * 60 + t.minute();
    let start = sh * 60 + sm;
    let end = eh * 60 + em;
    minute_of_day >= start && minute_of_day <= end
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rule(day: Weekday, start: &str, end: &str) -> RetryRule {
        RetryRule {
            day_of_week: day,
            start_time: start.to_string(),
            end_time: end.to_string(),
            max_attempts: 3,
            retry_interval_minutes: 60,
            is_active: true,
        }
    }

    #[test]
    fn in_window_is_inclusive_on_both_ends() {
        let r = rule(Weekday::Mon, "09:00", "17:00");
        let start = Utc.with_ymd_and_hms(2026, 8, 3, 9, 0, 0).unwrap(); // a Monday
        let end = Utc.with_ymd_and_hms(2026, 8, 3, 17, 0, 0).unwrap();
        assert!(rule_in_window(&r, start));
        assert!(rule_in_window(&r, end));
    }

    #[test]
    fn out_of_window_is_rejected() {
        let r = rule(Weekday::Mon, "09:00", "17:00");
        let before = Utc.with_ymd_and_hms(2026, 8, 3, 8, 59, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 8, 3, 17, 1, 0).unwrap();
        assert!(!rule_in_window(&r, before));
        assert!(!rule_in_window(&r, after));
    }

    #[test]
    fn wrong_day_is_rejected() {
        let r = rule(Weekday::Mon, "09:00", "17:00");
        let tuesday = Utc.with_ymd_and_hms(2026, 8, 4, 12, 0, 0).unwrap();
        assert!(!rule_in_window(&r, tuesday));
    }

    #[test]
    fn inactive_rule_never_matches() {
        let mut r = rule(Weekday::Mon, "09:00", "17:00");
        r.is_active = false;
        let monday = Utc.with_ymd_and_hms(2026, 8, 3, 12, 0, 0).unwrap();
        assert!(!rule_in_window(&r, monday));
    }
}
