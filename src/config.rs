// CLASSIFICATION: COMMUNITY
// Filename: config.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Static platform configuration for a CrashCat engine.
//!
//! The L0 wayfinder offset and the scratch group table are properties of the
//! platform, not protocol data. Engines load them from JSON; the defaults
//! describe the reference layout used by the simulated engine.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crashcat_wire::ScratchGroupId;
use serde::{Deserialize, Serialize};

use crate::error::{CrashCatError, CrashCatResult};

/// Environment variable naming a JSON config file.
pub const CONFIG_ENV: &str = "CRASHCAT_CONFIG";
/// Environment variable that disables CrashCat when set to `1` or `true`.
pub const DISABLE_ENV: &str = "CRASHCAT_DISABLE";

/// Maximum registers in one scratch group.
pub const MAX_SCRATCH_REGISTERS: usize = 4;

/// Platform description of one engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Whether the consumer should probe this engine at all.
    pub enabled: bool,
    /// Offset of the L0 wayfinder register.
    pub wfl0_offset: u32,
    /// Register offsets for each scratch group.
    pub scratch_groups: BTreeMap<ScratchGroupId, Vec<u32>>,
    /// Dump undecodable queue bytes as hex at debug level.
    pub log_raw_on_error: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut scratch_groups = BTreeMap::new();
        scratch_groups.insert(ScratchGroupId::A, vec![0x110, 0x114]);
        scratch_groups.insert(ScratchGroupId::B, vec![0x120, 0x124, 0x128, 0x12C]);
        Self {
            enabled: true,
            wfl0_offset: 0x100,
            scratch_groups,
            log_raw_on_error: true,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config.
    pub fn from_json_str(data: &str) -> CrashCatResult<Self> {
        let cfg: EngineConfig =
            serde_json::from_str(data).map_err(|e| CrashCatError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load and validate a JSON config file.
    pub fn from_path(path: &Path) -> CrashCatResult<Self> {
        let data = fs::read_to_string(path)
            .map_err(|e| CrashCatError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&data)
    }

    /// Load the config named by `CRASHCAT_CONFIG`, or the defaults, then
    /// apply `CRASHCAT_DISABLE`.
    pub fn from_env() -> CrashCatResult<Self> {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_path(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        if std::env::var(DISABLE_ENV).is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true")) {
            cfg.enabled = false;
        }
        Ok(cfg)
    }

    /// Check the scratch group table: at most four registers per group, no
    /// zero offsets, nothing mapped for `None`.
    pub fn validate(&self) -> CrashCatResult<()> {
        for (group, offsets) in &self.scratch_groups {
            if *group == ScratchGroupId::None && !offsets.is_empty() {
                return Err(CrashCatError::Config(
                    "scratch group None cannot hold registers".into(),
                ));
            }
            if offsets.len() > MAX_SCRATCH_REGISTERS {
                return Err(CrashCatError::Config(format!(
                    "scratch group {group:?} lists {} registers, at most {MAX_SCRATCH_REGISTERS} allowed",
                    offsets.len()
                )));
            }
            if offsets.contains(&0) {
                return Err(CrashCatError::Config(format!(
                    "scratch group {group:?} contains a zero offset"
                )));
            }
        }
        Ok(())
    }

    /// Register offsets of `group`, empty when absent.
    #[must_use]
    pub fn scratch_offsets(&self, group: ScratchGroupId) -> &[u32] {
        self.scratch_groups
            .get(&group)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
