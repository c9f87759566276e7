use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::TimeDelta;

use crate::availability::BusinessRules;
use crate::models::{Config, RulesConfig, Snapshot};

pub fn load_config(path: &Path) -> Result<Config> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let config = parse_config(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(config)
}

fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)?;
    config.rules.business_rules()?;
    config.rules.slot_step()?;
    Ok(config)
}

/// Read a JSON export of services, employees and appointments.
pub fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let snapshot: Snapshot = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse snapshot {}", path.display()))?;
    Ok(snapshot)
}

impl RulesConfig {
    pub fn business_rules(&self) -> Result<BusinessRules> {
        if self.opening >= self.closing {
            bail!(
                "opening ({}) must be before closing ({})",
                self.opening,
                self.closing
            );
        }
        if self.last_start < self.opening || self.last_start >= self.closing {
            bail!(
                "last_start ({}) must lie between opening ({}) and closing ({})",
                self.last_start,
                self.opening,
                self.closing
            );
        }
        if self.min_lead_minutes < 0 {
            bail!("min_lead_minutes cannot be negative");
        }
        Ok(BusinessRules {
            opening: self.opening,
            last_start: self.last_start,
            closing: self.closing,
            min_lead_time: TimeDelta::try_minutes(self.min_lead_minutes)
                .ok_or_else(|| anyhow!("min_lead_minutes ({}) is out of range", self.min_lead_minutes))?,
        })
    }

    pub fn slot_step(&self) -> Result<TimeDelta> {
        if self.slot_step_minutes <= 0 {
            bail!("slot_step_minutes must be positive");
        }
        TimeDelta::try_minutes(self.slot_step_minutes)
            .ok_or_else(|| anyhow!("slot_step_minutes ({}) is out of range", self.slot_step_minutes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    const MINIMAL: &str = r#"
        [app]
        base_url = "http://localhost:4000/api"
        timezone = "America/Bogota"
    "#;

    #[test]
    fn test_defaults_match_shop_rules() {
        let config = parse_config(MINIMAL).unwrap();
        assert_eq!(config.app.timezone, chrono_tz::America::Bogota);
        assert_eq!(config.rules.business_rules().unwrap(), BusinessRules::default());
        assert_eq!(config.rules.slot_step().unwrap(), TimeDelta::minutes(15));
    }

    #[test]
    fn test_custom_rules() {
        let content = format!(
            "{MINIMAL}\n[rules]\nopening = \"09:30\"\nlast_start = \"19:00:00\"\nclosing = \"20:00\"\nmin_lead_minutes = 60\n"
        );
        let rules = parse_config(&content).unwrap().rules.business_rules().unwrap();
        assert_eq!(rules.opening, NaiveTime::from_hms_opt(9, 30, 0).unwrap());
        assert_eq!(rules.last_start, NaiveTime::from_hms_opt(19, 0, 0).unwrap());
        assert_eq!(rules.min_lead_time, TimeDelta::hours(1));
    }

    #[test]
    fn test_rejects_bad_rules() {
        let last_start_at_closing = format!("{MINIMAL}\n[rules]\nlast_start = \"22:00\"\n");
        assert!(parse_config(&last_start_at_closing).is_err());

        let bad_step = format!("{MINIMAL}\n[rules]\nslot_step_minutes = 0\n");
        assert!(parse_config(&bad_step).is_err());

        let huge_lead = format!("{MINIMAL}\n[rules]\nmin_lead_minutes = {}\n", i64::MAX);
        assert!(parse_config(&huge_lead).is_err());

        let huge_step = format!("{MINIMAL}\n[rules]\nslot_step_minutes = {}\n", i64::MAX);
        assert!(parse_config(&huge_step).is_err());

        let bad_time = format!("{MINIMAL}\n[rules]\nopening = \"8am\"\n");
        assert!(parse_config(&bad_time).is_err());
    }

    #[test]
    fn test_rejects_unknown_timezone() {
        let content = MINIMAL.replace("America/Bogota", "Mars/Olympus");
        assert!(parse_config(&content).is_err());
    }
}
