//! Lowering options

use serde::{Deserialize, Serialize};

/// When a `for (let ...)` head gets a fresh environment record per iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerIterationPolicy {
    /// Fresh whenever a head binding lives in an environment for any reason, including
    /// visibility to a direct `eval`
    #[default]
    Conservative,
    /// Fresh only when a nested closure captures a head binding
    CaptureOnly,
}

/// Options controlling lowering of one module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LowerOptions {
    /// Emit dynamic TDZ checks on reads of block-scoped bindings
    pub tdz_checks: bool,
    /// Run the IR verifier on every lowered function
    pub verify: bool,
    /// Emit best-effort compile-time warnings
    pub warnings: bool,
    /// Per-iteration environment policy for loop heads
    pub per_iteration_environments: PerIterationPolicy,
    /// Step budget for comparing recursive type keys
    pub max_type_key_fuel: usize,
    /// Name of the emitted module and of its init function
    pub module_name: String,
    /// Compilation unit recorded on specializations this module lowers; defaults to
    /// the module name. Sessions sharing a specialization cache use distinct units.
    pub unit_name: Option<String>,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self {
            tdz_checks: true,
            verify: true,
            warnings: true,
            per_iteration_environments: PerIterationPolicy::Conservative,
            max_type_key_fuel: 10_000,
            module_name: "main".to_string(),
            unit_name: None,
        }
    }
}

impl LowerOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn with_tdz_checks(mut self, enabled: bool) -> Self {
        self.tdz_checks = enabled;
        self
    }

    pub fn with_verify(mut self, enabled: bool) -> Self {
        self.verify = enabled;
        self
    }

    pub fn with_warnings(mut self, enabled: bool) -> Self {
        self.warnings = enabled;
        self
    }

    pub fn with_per_iteration_environments(mut self, policy: PerIterationPolicy) -> Self {
        self.per_iteration_environments = policy;
        self
    }

    pub fn with_max_type_key_fuel(mut self, fuel: usize) -> Self {
        self.max_type_key_fuel = fuel;
        self
    }

    pub fn with_module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = name.into();
        self
    }

    pub fn with_unit_name(mut self, name: impl Into<String>) -> Self {
        self.unit_name = Some(name.into());
        self
    }

    /// Unit that owns the specializations lowered by this module
    pub fn unit(&self) -> &str {
        self.unit_name.as_deref().unwrap_or(&self.module_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = LowerOptions::default();
        assert!(options.tdz_checks);
        assert!(options.verify);
        assert_eq!(options.per_iteration_environments, PerIterationPolicy::Conservative);
        assert_eq!(options.max_type_key_fuel, 10_000);
        assert_eq!(options.module_name, "main");
    }

    #[test]
    fn test_from_json_partial() {
        let options =
            LowerOptions::from_json(r#"{ "tdz_checks": false, "per_iteration_environments": "capture_only" }"#)
                .unwrap();
        assert!(!options.tdz_checks);
        assert!(options.verify);
        assert_eq!(options.per_iteration_environments, PerIterationPolicy::CaptureOnly);
    }

    #[test]
    fn test_builder() {
        let options = LowerOptions::new().with_verify(false).with_module_name("app");
        assert!(!options.verify);
        assert_eq!(options.module_name, "app");
        assert_eq!(options.unit(), "app");
        assert_eq!(options.with_unit_name("worker-1").unit(), "worker-1");
    }
}
