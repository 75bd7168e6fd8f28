//! Run configuration.
//!
//! [`PipelineConfig`] is a plain struct: build it by hand, start from [`Default`], or read the
//! handful of supported environment variables with [`PipelineConfig::from_env`].
//!
//! # Example
//!
//! ```rust
//! use deliberation::{AnalystRole, PipelineConfig};
//!
//! let config = PipelineConfig::default()
//!     .with_roles(vec![AnalystRole::Market, AnalystRole::News])
//!     .with_max_debate_rounds(2);
//! assert!(config.validate().is_ok());
//! assert_eq!(config.max_recur_limit, 100);
//! ```

use crate::deliberation::error::PipelineError;
use crate::deliberation::roles::AnalystRole;
use std::collections::HashSet;

/// Accepted range for both debate round settings.
pub const MAX_ROUNDS_RANGE: std::ops::RangeInclusive<usize> = 1..=10;

pub const ENV_ANALYSTS: &str = "DELIBERATION_ANALYSTS";
pub const ENV_MAX_DEBATE_ROUNDS: &str = "DELIBERATION_MAX_DEBATE_ROUNDS";
pub const ENV_MAX_RISK_DISCUSS_ROUNDS: &str = "DELIBERATION_MAX_RISK_DISCUSS_ROUNDS";
pub const ENV_MAX_RECUR_LIMIT: &str = "DELIBERATION_MAX_RECUR_LIMIT";

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Analysts fanned out in parallel, in this order.
    pub selected_roles: Vec<AnalystRole>,
    /// Bull/Bear rounds; one round is one turn per side.
    pub max_debate_rounds: usize,
    /// Risk rounds; one round is one turn per debater.
    pub max_risk_discuss_rounds: usize,
    /// Ceiling on node invocations across the whole run.
    pub max_recur_limit: usize,
    /// How many memories researchers, judges and the trader ask for.
    pub memory_matches: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            selected_roles: AnalystRole::ALL.to_vec(),
            max_debate_rounds: 1,
            max_risk_discuss_rounds: 1,
            max_recur_limit: 100,
            memory_matches: 2,
        }
    }
}

impl PipelineConfig {
    pub fn with_roles(mut self, roles: Vec<AnalystRole>) -> Self {
        self.selected_roles = roles;
        self
    }

    pub fn with_max_debate_rounds(mut self, rounds: usize) -> Self {
        self.max_debate_rounds = rounds;
        self
    }

    pub fn with_max_risk_discuss_rounds(mut self, rounds: usize) -> Self {
        self.max_risk_discuss_rounds = rounds;
        self
    }

    pub fn with_max_recur_limit(mut self, limit: usize) -> Self {
        self.max_recur_limit = limit;
        self
    }

    pub fn with_memory_matches(mut self, matches: usize) -> Self {
        self.memory_matches = matches;
        self
    }

    /// Check every bound. Called by the pipeline before any node runs.
    pub fn validate(&self) -> Result<(), PipelineError> {
        validate_roles(&self.selected_roles)?;
        if !MAX_ROUNDS_RANGE.contains(&self.max_debate_rounds) {
            return Err(PipelineError::InvalidConfig(format!(
                "max_debate_rounds must be between 1 and 10, got {}",
                self.max_debate_rounds
            )));
        }
        if !MAX_ROUNDS_RANGE.contains(&self.max_risk_discuss_rounds) {
            return Err(PipelineError::InvalidConfig(format!(
                "max_risk_discuss_rounds must be between 1 and 10, got {}",
                self.max_risk_discuss_rounds
            )));
        }
        if self.max_recur_limit == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_recur_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Defaults overridden by any of the `DELIBERATION_*` variables that are set.
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(list) = lookup(ENV_ANALYSTS) {
            config.selected_roles = AnalystRole::parse_list(&list)?;
        }
        if let Some(value) = lookup(ENV_MAX_DEBATE_ROUNDS) {
            config.max_debate_rounds = parse_number(ENV_MAX_DEBATE_ROUNDS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_RISK_DISCUSS_ROUNDS) {
            config.max_risk_discuss_rounds = parse_number(ENV_MAX_RISK_DISCUSS_ROUNDS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_RECUR_LIMIT) {
            config.max_recur_limit = parse_number(ENV_MAX_RECUR_LIMIT, &value)?;
        }
        config.validate()?;
        Ok(config)
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize, PipelineError> {
    value.trim().parse().map_err(|_| {
        PipelineError::InvalidConfig(format!("{} must be a positive integer, got '{}'", key, value))
    })
}

/// Non-empty and free of duplicates.
pub(crate) fn validate_roles(roles: &[AnalystRole]) -> Result<(), PipelineError> {
    if roles.is_empty() {
        return Err(PipelineError::NoRolesSelected);
    }
    let mut seen = HashSet::new();
    for role in roles {
        if !seen.insert(*role) {
            return Err(PipelineError::DuplicateRole(role.key().to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.selected_roles.len(), 4);
        assert_eq!(config.max_debate_rounds, 1);
        assert_eq!(config.max_risk_discuss_rounds, 1);
        assert_eq!(config.max_recur_limit, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_round_bounds() {
        let err = PipelineConfig::default()
            .with_max_debate_rounds(11)
            .validate()
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(PipelineConfig::default()
            .with_max_risk_discuss_rounds(0)
            .validate()
            .is_err());
        assert!(PipelineConfig::default()
            .with_max_recur_limit(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_roles_must_be_non_empty_and_unique() {
        assert_eq!(
            PipelineConfig::default().with_roles(vec![]).validate(),
            Err(PipelineError::NoRolesSelected)
        );
        assert_eq!(
            PipelineConfig::default()
                .with_roles(vec![AnalystRole::News, AnalystRole::News])
                .validate(),
            Err(PipelineError::DuplicateRole("news".into()))
        );
    }

    #[test]
    fn test_from_lookup() {
        let config = PipelineConfig::from_lookup(lookup(&[
            (ENV_ANALYSTS, "market,fundamentals"),
            (ENV_MAX_DEBATE_ROUNDS, "3"),
            (ENV_MAX_RECUR_LIMIT, "250"),
        ]))
        .unwrap();
        assert_eq!(
            config.selected_roles,
            vec![AnalystRole::Market, AnalystRole::Fundamentals]
        );
        assert_eq!(config.max_debate_rounds, 3);
        assert_eq!(config.max_risk_discuss_rounds, 1);
        assert_eq!(config.max_recur_limit, 250);

        let err = PipelineConfig::from_lookup(lookup(&[(ENV_ANALYSTS, "market,macro")]))
            .unwrap_err();
        assert_eq!(err, PipelineError::UnknownRole("macro".into()));

        assert!(PipelineConfig::from_lookup(lookup(&[(ENV_MAX_DEBATE_ROUNDS, "many")])).is_err());
    }
}
