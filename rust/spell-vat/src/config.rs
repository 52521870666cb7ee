use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use spell_capability::VatId;
use spell_sandbox::Budget;

use crate::VatError;

/// Name of the optional configuration file inside a vat's basedir.
pub const CONFIG_FILE: &str = "spellserver.json";

/// Tunables of a vat. Every field may be left out of the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VatConfig {
    /// Pin the vat id instead of generating one on first start
    pub vat_id: Option<VatId>,
    /// Step allowance of a single Turn
    pub max_steps: u64,
    /// Wall-clock allowance of a single Turn
    pub max_turn_millis: u64,
    /// Allocation allowance of a single Turn, see [`Budget::max_allocation`]
    pub max_allocation: u64,
    /// How long held-back messages wait for a missing predecessor before a
    /// gap is reported
    pub gap_timeout_millis: u64,
    /// How often unacknowledged messages are retransmitted
    pub resend_interval_millis: u64,
    /// Out of order messages held back per sending vat; the furthest ahead
    /// are dropped beyond this and arrive again with a later retransmission
    pub max_held_messages: usize,
    /// How often the event loop runs housekeeping
    pub tick_millis: u64,
}

impl Default for VatConfig {
    fn default() -> Self {
        Self {
            vat_id: None,
            max_steps: 100_000,
            max_turn_millis: 1_000,
            max_allocation: Budget::default().max_allocation,
            gap_timeout_millis: 5_000,
            resend_interval_millis: 1_000,
            max_held_messages: 1_024,
            tick_millis: 100,
        }
    }
}

impl VatConfig {
    /// Read `<basedir>/spellserver.json`, falling back to the defaults when
    /// the file does not exist.
    pub async fn load(basedir: impl AsRef<Path>) -> Result<Self, VatError> {
        let path = basedir.as_ref().join(CONFIG_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|error| VatError::Config(format!("{}: {error}", path.display()))),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(VatError::Config(format!("{}: {error}", path.display()))),
        }
    }

    /// The budget every Turn runs under.
    pub fn budget(&self) -> Budget {
        Budget {
            max_steps: self.max_steps,
            max_duration: Some(Duration::from_millis(self.max_turn_millis)),
            max_allocation: self.max_allocation,
        }
    }

    /// See [`VatConfig::gap_timeout_millis`].
    pub fn gap_timeout(&self) -> Duration {
        Duration::from_millis(self.gap_timeout_millis)
    }

    /// See [`VatConfig::resend_interval_millis`].
    pub fn resend_interval(&self) -> Duration {
        Duration::from_millis(self.resend_interval_millis)
    }

    /// See [`VatConfig::tick_millis`].
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_millis.max(1))
    }
}
