//! Run configuration, loadable from a TOML file and overridable by CLI
//! flags.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// Compile routines on first call and run the cached units.
    Jit,
    /// Direct decode-and-dispatch loop.
    Step,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Evaluation stack capacity in words.
    pub stack_capacity: usize,
    /// Bound on nested routine calls. The compiled path realizes the
    /// story's call stack on the native stack, so this also bounds
    /// native recursion.
    pub call_depth_limit: usize,
    pub mode: ExecMode,
    /// Operand-reuse (push/pop fusion) in generated code.
    pub reuse_operands: bool,
    /// Fixed RNG seed for deterministic replay.
    pub seed: Option<u64>,
    /// The cooperative stop token is polled every this many executed
    /// operations.
    pub stop_check_interval: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            stack_capacity: 1024,
            call_depth_limit: 256,
            mode: ExecMode::Jit,
            reuse_operands: true,
            seed: None,
            stop_check_interval: 1000,
        }
    }
}

impl RunConfig {
    pub fn from_toml(text: &str) -> Result<RunConfig, String> {
        toml::from_str(text).map_err(|e| format!("bad configuration: {e}"))
    }
}
