//! Per-user, per-rule cooldown registry

use super::event::AlertKind;
use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

/// Default gap between two firings of the same rule for one user
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct CooldownConfig {
    pub window: Duration,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_COOLDOWN,
        }
    }
}

/// Last allowed firing per (user, rule).
///
/// Only allowed firings move the clock; suppressed attempts leave it alone.
#[derive(Debug)]
pub struct CooldownRegistry {
    window: Duration,
    last_fired: HashMap<String, HashMap<AlertKind, Instant>>,
}

impl Default for CooldownRegistry {
    fn default() -> Self {
        Self::new(CooldownConfig::default())
    }
}

impl CooldownRegistry {
    pub fn new(config: CooldownConfig) -> Self {
        Self {
            window: config.window,
            last_fired: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Gate a firing at `now`. `Err` carries the remaining cooldown.
    pub fn try_fire_at(&mut self, user: &str, kind: AlertKind, now: Instant) -> Result<(), Duration> {
        let user_entries = self.last_fired.entry(user.to_string()).or_default();

        if let Some(last) = user_entries.get(&kind) {
            let elapsed = now.saturating_duration_since(*last);
            if elapsed < self.window {
                return Err(self.window - elapsed);
            }
        }

        user_entries.insert(kind, now);
        Ok(())
    }

    pub fn try_fire(&mut self, user: &str, kind: AlertKind) -> Result<(), Duration> {
        self.try_fire_at(user, kind, Instant::now())
    }

    /// Remaining cooldown per rule for a user, zero once expired
    pub fn remaining_at(&self, user: &str, now: Instant) -> BTreeMap<AlertKind, Duration> {
        self.last_fired
            .get(user)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(kind, last)| {
                        let elapsed = now.saturating_duration_since(*last);
                        (*kind, self.window.saturating_sub(elapsed))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn remaining(&self, user: &str) -> BTreeMap<AlertKind, Duration> {
        self.remaining_at(user, Instant::now())
    }

    pub fn clear_user(&mut self, user: &str) -> bool {
        self.last_fired.remove(user).is_some()
    }

    pub fn clear_all(&mut self) {
        self.last_fired.clear();
    }

    /// Number of users with at least one recorded firing
    pub fn tracked_users(&self) -> usize {
        self.last_fired.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_firing_within_window_is_suppressed() {
        let mut registry = CooldownRegistry::new(CooldownConfig::default());
        let start = Instant::now();

        assert!(registry.try_fire_at("SUNNY", AlertKind::MtmBelow, start).is_ok());
        let remaining = registry
            .try_fire_at("SUNNY", AlertKind::MtmBelow, start + Duration::from_secs(60))
            .unwrap_err();
        assert_eq!(remaining, Duration::from_secs(240));

        // Other rules and other users are independent
        assert!(registry.try_fire_at("SUNNY", AlertKind::RoiBelow, start).is_ok());
        assert!(registry.try_fire_at("RAVI", AlertKind::MtmBelow, start).is_ok());
    }

    #[test]
    fn test_firing_after_window_is_allowed() {
        let mut registry = CooldownRegistry::new(CooldownConfig::default());
        let start = Instant::now();

        assert!(registry.try_fire_at("SUNNY", AlertKind::CallsSell, start).is_ok());
        assert!(registry
            .try_fire_at("SUNNY", AlertKind::CallsSell, start + Duration::from_secs(300))
            .is_ok());
    }

    #[test]
    fn test_suppressed_attempts_do_not_extend_cooldown() {
        let mut registry = CooldownRegistry::new(CooldownConfig::default());
        let start = Instant::now();

        registry.try_fire_at("SUNNY", AlertKind::MarginAbove, start).unwrap();
        for secs in [100, 200, 299] {
            assert!(registry
                .try_fire_at("SUNNY", AlertKind::MarginAbove, start + Duration::from_secs(secs))
                .is_err());
        }
        assert!(registry
            .try_fire_at("SUNNY", AlertKind::MarginAbove, start + Duration::from_secs(301))
            .is_ok());
    }

    #[test]
    fn test_remaining_and_clear() {
        let mut registry = CooldownRegistry::new(CooldownConfig {
            window: Duration::from_secs(10),
        });
        let start = Instant::now();
        registry.try_fire_at("SUNNY", AlertKind::PutsNet, start).unwrap();
        registry.try_fire_at("RAVI", AlertKind::PutsNet, start).unwrap();

        let remaining = registry.remaining_at("SUNNY", start + Duration::from_secs(4));
        assert_eq!(remaining[&AlertKind::PutsNet], Duration::from_secs(6));
        let remaining = registry.remaining_at("SUNNY", start + Duration::from_secs(40));
        assert_eq!(remaining[&AlertKind::PutsNet], Duration::ZERO);
        assert!(registry.remaining_at("NOBODY", start).is_empty());

        assert!(registry.clear_user("SUNNY"));
        assert!(!registry.clear_user("SUNNY"));
        assert!(registry.try_fire_at("SUNNY", AlertKind::PutsNet, start).is_ok());

        registry.clear_all();
        assert_eq!(registry.tracked_users(), 0);
        assert!(registry.try_fire_at("RAVI", AlertKind::PutsNet, start).is_ok());
    }
}
