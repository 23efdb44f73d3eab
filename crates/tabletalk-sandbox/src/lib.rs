//! Tabletalk Chart Sandbox - Capability-Limited Program Execution
//!
//! Runs generated chart programs with exactly two capabilities in
//! scope: the input table, bound to a fixed name, and the chart
//! constructor, bound to a fixed name. There is no filesystem or
//! network reachable from a program, and every run is bounded by a
//! wall-clock timeout; expiry is reported as an ordinary execution
//! failure so the orchestrator can retry it.

mod program;

use std::time::Duration;

use tabletalk_core::config::DEFAULT_SANDBOX_TIMEOUT_MS;
use tabletalk_core::engine::ChartSandbox;
use tabletalk_core::error::SandboxError;
use tabletalk_core::types::{ChartSpec, TabularResult};

pub use program::spec_has_chart;

/// Sandbox that interprets declarative chart programs.
#[derive(Debug, Clone)]
pub struct ProgramSandbox {
    /// Wall-clock bound for one run, in milliseconds
    timeout_ms: u64,
}

impl ProgramSandbox {
    /// Create a sandbox with the default timeout.
    pub fn new() -> Self {
        Self {
            timeout_ms: DEFAULT_SANDBOX_TIMEOUT_MS,
        }
    }

    /// Set the wall-clock bound for a single run.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

impl Default for ProgramSandbox {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ChartSandbox for ProgramSandbox {
    async fn run(&self, code: &str, table: &TabularResult) -> Result<ChartSpec, SandboxError> {
        let code = code.to_string();
        let table = table.clone();
        let handle = tokio::task::spawn_blocking(move || program::interpret(&code, &table));

        match tokio::time::timeout(Duration::from_millis(self.timeout_ms), handle).await {
            // A run that outlives the bound is abandoned; the worker
            // finishes in the background while the orchestrator moves
            // on to the next attempt.
            Err(_elapsed) => {
                tracing::warn!(timeout_ms = self.timeout_ms, "chart program timed out");
                Err(SandboxError::Timeout(self.timeout_ms))
            }
            // A panic inside interpretation surfaces as a join error,
            // not as a crash of the orchestrator.
            Ok(Err(join_error)) => Err(SandboxError::Execution(join_error.to_string())),
            Ok(Ok(result)) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabletalk_core::types::Scalar;

    fn table() -> TabularResult {
        TabularResult::new(
            vec!["Sector".to_string(), "Amount".to_string()],
            vec![
                vec![Scalar::Text("Salud".to_string()), Scalar::Integer(100)],
                vec![Scalar::Text("Educacion".to_string()), Scalar::Integer(40)],
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn run_builds_a_spec_with_data_inlined() {
        let sandbox = ProgramSandbox::new();
        let code = r#"{"chart": {"kind": "bar", "x": "Sector", "y": "Amount", "title": "Spend"}}"#;

        let spec = sandbox.run(code, &table()).await.unwrap();

        assert_eq!(spec.0["kind"], "bar");
        assert_eq!(spec.0["title"], "Spend");
        assert_eq!(spec.0["data"]["values"].as_array().unwrap().len(), 2);
        assert!(spec_has_chart(&spec));
    }

    #[tokio::test]
    async fn run_reports_missing_chart_binding() {
        let sandbox = ProgramSandbox::new();
        let err = sandbox.run("{}", &table()).await.unwrap_err();
        assert!(matches!(err, SandboxError::MissingChart));
    }

    #[tokio::test]
    async fn run_reports_interpretation_failures() {
        let sandbox = ProgramSandbox::new();
        let code = r#"{"chart": {"kind": "bar", "x": "Region", "y": "Amount"}}"#;
        let err = sandbox.run(code, &table()).await.unwrap_err();
        assert!(matches!(err, SandboxError::UnknownColumn(_)));
    }

    #[tokio::test]
    async fn spec_serializes_for_the_envelope() {
        let sandbox = ProgramSandbox::new();
        let code = r#"{"chart": {"kind": "line", "x": "Sector", "y": "Amount"}}"#;
        let spec = sandbox.run(code, &table()).await.unwrap();

        let json = serde_json::to_string(&spec).unwrap();
        let parsed: ChartSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, parsed);
    }
}
