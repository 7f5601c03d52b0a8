//! dbgrid.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

/// Fixed requeue delays used by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequeueDelays {
    /// Generic retry after a failed or pending step.
    pub default: Duration,
    /// Re-observe quickly after a status write.
    pub status_update: Duration,
    pub tenant_creation: Duration,
    pub storage_await: Duration,
    pub shared_database_await: Duration,
}

impl Default for RequeueDelays {
    fn default() -> Self {
        Self {
            default: Duration::from_secs(10),
            status_update: Duration::from_secs(1),
            tenant_creation: Duration::from_secs(30),
            storage_await: Duration::from_secs(60),
            shared_database_await: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub requeue: Option<RequeueConfig>,
    pub cluster: Option<ClusterConfig>,
    pub daemon: Option<DaemonConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequeueConfig {
    pub default: Option<String>,
    pub status_update: Option<String>,
    pub tenant_creation: Option<String>,
    pub storage_await: Option<String>,
    pub shared_database_await: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// DNS suffix used when deriving storage endpoints.
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// How long a converged database waits before its next pass.
    pub resync: Option<String>,
    /// Scheduler tick.
    pub tick: Option<String>,
}

pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

impl ControllerConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: ControllerConfig = toml::from_str(content)?;
        // Surface bad durations at load time rather than on first use.
        config.requeue_delays()?;
        config.resync_interval()?;
        config.tick_interval()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Requeue delays with unset entries taken from the defaults.
    pub fn requeue_delays(&self) -> anyhow::Result<RequeueDelays> {
        let defaults = RequeueDelays::default();
        let Some(requeue) = &self.requeue else {
            return Ok(defaults);
        };
        Ok(RequeueDelays {
            default: duration_or("requeue.default", &requeue.default, defaults.default)?,
            status_update: duration_or(
                "requeue.status_update",
                &requeue.status_update,
                defaults.status_update,
            )?,
            tenant_creation: duration_or(
                "requeue.tenant_creation",
                &requeue.tenant_creation,
                defaults.tenant_creation,
            )?,
            storage_await: duration_or(
                "requeue.storage_await",
                &requeue.storage_await,
                defaults.storage_await,
            )?,
            shared_database_await: duration_or(
                "requeue.shared_database_await",
                &requeue.shared_database_await,
                defaults.shared_database_await,
            )?,
        })
    }

    pub fn cluster_domain(&self) -> String {
        self.cluster
            .as_ref()
            .and_then(|c| c.domain.clone())
            .unwrap_or_else(|| DEFAULT_CLUSTER_DOMAIN.to_string())
    }

    pub fn resync_interval(&self) -> anyhow::Result<Duration> {
        let resync = self.daemon.as_ref().and_then(|d| d.resync.clone());
        duration_or("daemon.resync", &resync, Duration::from_secs(300))
    }

    pub fn tick_interval(&self) -> anyhow::Result<Duration> {
        let tick = self.daemon.as_ref().and_then(|d| d.tick.clone());
        duration_or("daemon.tick", &tick, Duration::from_secs(1))
    }
}

fn duration_or(field: &str, value: &Option<String>, default: Duration) -> anyhow::Result<Duration> {
    match value {
        None => Ok(default),
        Some(raw) => match parse_duration(raw) {
            Some(d) => Ok(d),
            None => bail!("invalid duration for {field}: {raw:?}"),
        },
    }
}

/// Parse a duration string like "30s", "5m", "1h", or bare seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (digits, multiplier) = if let Some(secs) = s.strip_suffix('s') {
        (secs, 1)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60)
    } else if let Some(hours) = s.strip_suffix('h') {
        (hours, 3600)
    } else {
        (s, 1)
    };
    let value = digits.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(value.checked_mul(multiplier)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = ControllerConfig::parse("").unwrap();
        let delays = config.requeue_delays().unwrap();
        assert_eq!(delays, RequeueDelays::default());
        assert_eq!(delays.default, Duration::from_secs(10));
        assert_eq!(delays.status_update, Duration::from_secs(1));
        assert_eq!(delays.tenant_creation, Duration::from_secs(30));
        assert_eq!(delays.storage_await, Duration::from_secs(60));
        assert_eq!(delays.shared_database_await, Duration::from_secs(60));
        assert_eq!(config.cluster_domain(), "cluster.local");
        assert_eq!(config.resync_interval().unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn partial_requeue_section_overrides_only_named_delays() {
        let config = ControllerConfig::parse(
            r#"
[requeue]
default = "5s"
storage_await = "2m"

[cluster]
domain = "corp.internal"
"#,
        )
        .unwrap();
        let delays = config.requeue_delays().unwrap();
        assert_eq!(delays.default, Duration::from_secs(5));
        assert_eq!(delays.storage_await, Duration::from_secs(120));
        assert_eq!(delays.tenant_creation, Duration::from_secs(30));
        assert_eq!(config.cluster_domain(), "corp.internal");
    }

    #[test]
    fn invalid_duration_is_rejected() {
        let err = ControllerConfig::parse("[daemon]\ntick = \"soon\"\n").unwrap_err();
        assert!(err.to_string().contains("daemon.tick"));
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("0s"), Some(Duration::ZERO));
        assert_eq!(parse_duration("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration("invalid"), None);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = ControllerConfig {
            daemon: Some(DaemonConfig {
                resync: Some("10m".to_string()),
                tick: None,
            }),
            ..Default::default()
        };
        let text = config.to_toml_string().unwrap();
        let back = ControllerConfig::parse(&text).unwrap();
        assert_eq!(back.resync_interval().unwrap(), Duration::from_secs(600));
    }
}
