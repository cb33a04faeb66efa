//! Runtime configuration for OpenCL kernel tuning.
//!
//! [`TuneConfig`] is loaded from a TOML file with an `[opencl]` table, or
//! from defaults, and then overridden by `LITE_ACCEL_OPENCL_*` environment
//! variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `LITE_ACCEL_OPENCL_PROFILING` | `profiling_enabled` |
//! | `LITE_ACCEL_OPENCL_TUNING_MODE` | `tuning_mode` |
//! | `LITE_ACCEL_OPENCL_FP16` | `fp16_enabled` |
//! | `LITE_ACCEL_OPENCL_TUNING_CACHE` | `cache_path` |

use std::path::{Path, PathBuf};
use std::{env, fmt, fs};

use serde::{Deserialize, Serialize};

use crate::op::OperatorKind;

pub const ENV_PROFILING: &str = "LITE_ACCEL_OPENCL_PROFILING";
pub const ENV_TUNING_MODE: &str = "LITE_ACCEL_OPENCL_TUNING_MODE";
pub const ENV_FP16: &str = "LITE_ACCEL_OPENCL_FP16";
pub const ENV_TUNING_CACHE: &str = "LITE_ACCEL_OPENCL_TUNING_CACHE";

// ── Errors ──────────────────────────────────────────────────────────

/// Errors produced by configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unknown tuning mode: {0}")]
    UnknownTuningMode(String),

    #[error("invalid environment variable value for {key}: {value}")]
    InvalidEnvVar { key: String, value: String },
}

// ── TuningMode ──────────────────────────────────────────────────────

/// How aggressively kernels are tuned on first execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TuningMode {
    /// Never tune; kernels run with their baseline local size.
    #[default]
    #[serde(alias = "default")]
    Disabled,
    /// Tune every kernel.
    Exhaustive,
    /// Tune only the compute-heavy operators in [`OperatorKind::FAST_TUNING`].
    Fast,
}

impl fmt::Display for TuningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::Exhaustive => write!(f, "exhaustive"),
            Self::Fast => write!(f, "fast"),
        }
    }
}

impl std::str::FromStr for TuningMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "disabled" | "default" | "off" => Ok(Self::Disabled),
            "exhaustive" => Ok(Self::Exhaustive),
            "fast" => Ok(Self::Fast),
            other => Err(ConfigError::UnknownTuningMode(other.to_string())),
        }
    }
}

// ── Precision ───────────────────────────────────────────────────────

/// Floating-point width of the kernel execution path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    F16,
    F32,
}

impl Precision {
    /// Size of one element in bytes.
    pub const fn size_of(self) -> usize {
        match self {
            Self::F16 => 2,
            Self::F32 => 4,
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::F16 => write!(f, "f16"),
            Self::F32 => write!(f, "f32"),
        }
    }
}

// ── TuneDecision ────────────────────────────────────────────────────

/// Outcome of the tuning gate for one operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuneDecision {
    /// Search the work-group space.
    Tune,
    /// Device-side profiling is off, so trials cannot be timed.
    ProfilingDisabled,
    /// The tuning mode is [`TuningMode::Disabled`].
    ModeDisabled,
    /// Fast mode and the operator is not on the allow-list.
    NotInFastList,
}

impl TuneDecision {
    pub fn should_tune(self) -> bool {
        self == Self::Tune
    }
}

// ── TOML wrapper ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TomlWrapper {
    opencl: TuneConfig,
}

// ── TuneConfig ──────────────────────────────────────────────────────

/// Tuning and precision switches for the OpenCL runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TuneConfig {
    /// Command queues are created with profiling so kernel events carry
    /// start/end timestamps.
    pub profiling_enabled: bool,
    pub tuning_mode: TuningMode,
    /// Run kernels (and restore quantized weights) in half precision.
    pub fp16_enabled: bool,
    /// JSON file that persists tuning results across sessions.
    pub cache_path: Option<PathBuf>,
}

impl TuneConfig {
    /// Config with profiling on and the given tuning mode.
    pub fn with_tuning(mode: TuningMode) -> Self {
        Self { profiling_enabled: true, tuning_mode: mode, ..Default::default() }
    }

    /// Load from a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse a TOML string with an `[opencl]` table, then apply environment
    /// overrides.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let wrapper: TomlWrapper = toml::from_str(toml_str)?;
        let mut cfg = wrapper.opencl;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize back to the `[opencl]` TOML form.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let wrapper = TomlWrapper { opencl: self.clone() };
        Ok(toml::to_string_pretty(&wrapper)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.cache_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Validation("cache_path must not be empty".into()));
            }
        }
        Ok(())
    }

    /// Apply `LITE_ACCEL_OPENCL_*` overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = env::var(ENV_PROFILING) {
            self.profiling_enabled = parse_bool(ENV_PROFILING, &val)?;
        }
        if let Ok(val) = env::var(ENV_TUNING_MODE) {
            self.tuning_mode = val.parse()?;
        }
        if let Ok(val) = env::var(ENV_FP16) {
            self.fp16_enabled = parse_bool(ENV_FP16, &val)?;
        }
        if let Ok(val) = env::var(ENV_TUNING_CACHE) {
            self.cache_path = if val.is_empty() { None } else { Some(PathBuf::from(val)) };
        }
        Ok(())
    }

    /// Precision of the execution path.
    pub fn precision(&self) -> Precision {
        if self.fp16_enabled { Precision::F16 } else { Precision::F32 }
    }

    /// Decide whether a kernel implementing `op` should be tuned.
    pub fn tune_decision(&self, op: OperatorKind) -> TuneDecision {
        if !self.profiling_enabled {
            return TuneDecision::ProfilingDisabled;
        }
        match self.tuning_mode {
            TuningMode::Disabled => TuneDecision::ModeDisabled,
            TuningMode::Exhaustive => TuneDecision::Tune,
            TuningMode::Fast if op.is_fast_tuning_candidate() => TuneDecision::Tune,
            TuningMode::Fast => TuneDecision::NotInFastList,
        }
    }

    pub fn should_tune(&self, op: OperatorKind) -> bool {
        self.tune_decision(op).should_tune()
    }
}

fn parse_bool(key: &str, val: &str) -> Result<bool, ConfigError> {
    match val.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvVar { key: key.to_string(), value: val.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_VARS: [&str; 4] = [ENV_PROFILING, ENV_TUNING_MODE, ENV_FP16, ENV_TUNING_CACHE];

    fn without_env<R>(f: impl FnOnce() -> R) -> R {
        temp_env::with_vars_unset(ALL_VARS, f)
    }

    #[test]
    fn default_disables_tuning() {
        let cfg = TuneConfig::default();
        assert!(!cfg.profiling_enabled);
        assert_eq!(cfg.tuning_mode, TuningMode::Disabled);
        assert_eq!(cfg.precision(), Precision::F32);
        assert!(!cfg.should_tune(OperatorKind::Conv2D));
    }

    #[test]
    fn gate_requires_profiling() {
        let cfg = TuneConfig { tuning_mode: TuningMode::Exhaustive, ..Default::default() };
        assert_eq!(cfg.tune_decision(OperatorKind::Conv2D), TuneDecision::ProfilingDisabled);
    }

    #[test]
    fn gate_fast_mode_allow_list() {
        let cfg = TuneConfig::with_tuning(TuningMode::Fast);
        assert_eq!(cfg.tune_decision(OperatorKind::Conv2D), TuneDecision::Tune);
        assert_eq!(cfg.tune_decision(OperatorKind::DeConv2D), TuneDecision::Tune);
        assert_eq!(cfg.tune_decision(OperatorKind::MatMul), TuneDecision::NotInFastList);
    }

    #[test]
    fn gate_exhaustive_tunes_everything() {
        let cfg = TuneConfig::with_tuning(TuningMode::Exhaustive);
        assert!(cfg.should_tune(OperatorKind::Softmax));
        assert!(cfg.should_tune(OperatorKind::Other));
    }

    #[test]
    fn gate_mode_disabled() {
        let cfg = TuneConfig::with_tuning(TuningMode::Disabled);
        assert_eq!(cfg.tune_decision(OperatorKind::Conv2D), TuneDecision::ModeDisabled);
    }

    #[test]
    fn tuning_mode_from_str() {
        assert_eq!("FAST".parse::<TuningMode>().unwrap(), TuningMode::Fast);
        assert_eq!("default".parse::<TuningMode>().unwrap(), TuningMode::Disabled);
        assert_eq!("exhaustive".parse::<TuningMode>().unwrap(), TuningMode::Exhaustive);
        assert!(matches!("slow".parse::<TuningMode>(), Err(ConfigError::UnknownTuningMode(_))));
    }

    #[test]
    fn from_toml_full() {
        without_env(|| {
            let cfg = TuneConfig::from_toml(
                r#"
[opencl]
profiling_enabled = true
tuning_mode = "fast"
fp16_enabled = true
cache_path = "/tmp/tune.json"
"#,
            )
            .unwrap();
            assert!(cfg.profiling_enabled);
            assert_eq!(cfg.tuning_mode, TuningMode::Fast);
            assert_eq!(cfg.precision(), Precision::F16);
            assert_eq!(cfg.cache_path.as_deref(), Some(Path::new("/tmp/tune.json")));
        });
    }

    #[test]
    fn from_toml_partial_uses_defaults() {
        without_env(|| {
            let cfg = TuneConfig::from_toml("[opencl]\ntuning_mode = \"exhaustive\"\n").unwrap();
            assert_eq!(cfg.tuning_mode, TuningMode::Exhaustive);
            assert!(!cfg.profiling_enabled);
            assert!(cfg.cache_path.is_none());
        });
    }

    #[test]
    fn toml_round_trip() {
        without_env(|| {
            let cfg = TuneConfig::with_tuning(TuningMode::Fast);
            let text = cfg.to_toml().unwrap();
            assert_eq!(TuneConfig::from_toml(&text).unwrap(), cfg);
        });
    }

    #[test]
    fn env_overrides() {
        temp_env::with_vars(
            [
                (ENV_PROFILING, Some("1")),
                (ENV_TUNING_MODE, Some("exhaustive")),
                (ENV_FP16, Some("true")),
                (ENV_TUNING_CACHE, Some("/var/cache/tune.json")),
            ],
            || {
                let cfg = TuneConfig::from_env().unwrap();
                assert!(cfg.profiling_enabled);
                assert_eq!(cfg.tuning_mode, TuningMode::Exhaustive);
                assert!(cfg.fp16_enabled);
                assert_eq!(cfg.cache_path, Some(PathBuf::from("/var/cache/tune.json")));
            },
        );
    }

    #[test]
    fn env_invalid_bool_is_rejected() {
        temp_env::with_var(ENV_PROFILING, Some("maybe"), || {
            let err = TuneConfig::from_env().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));
        });
    }

    #[test]
    fn empty_cache_path_fails_validation() {
        let cfg = TuneConfig { cache_path: Some(PathBuf::new()), ..Default::default() };
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }
}
