//! The retry orchestrator
//!
//! `Engine::process` drives one question through classification and
//! then through a bounded generate-execute-retry loop: generation is
//! conditioned on the previous attempt's execution failure, execution
//! goes to the tabular store or the chart sandbox, and the outcome is
//! packaged into exactly one [`ResultEnvelope`]. The same loop
//! primitive backs the data path, the chart data sub-loop and the
//! chart build sub-loop, so their retry semantics cannot drift.

use std::future::Future;
use std::sync::Arc;

use crate::classifier::IntentClassifier;
use crate::error::{SandboxError, StoreError};
use crate::generate::{ChartCodeGenerator, QueryGenerator};
use crate::llm::LanguageModel;
use crate::types::{ChartSpec, Intent, ResultEnvelope, TabularResult};

/// Fixed count of tries allotted to a generate-execute loop before
/// giving up: one initial try plus two retries.
pub const ATTEMPT_BUDGET: usize = 3;

/// Rows of a table shown to the chart generator as a preview.
pub const DEFAULT_SAMPLE_ROWS: usize = 5;

/// Last-error recorded when the chart data sub-loop gets a successful
/// but empty result.
const EMPTY_CHART_DATA: &str = "query returned no rows; a chart needs a non-empty result";

/// Executes queries against the tabular datasets.
///
/// Implementations acquire and release their own connection per call,
/// on every exit path, so one store instance can serve concurrent
/// questions.
#[async_trait::async_trait]
pub trait TabularStore: Send + Sync {
    async fn execute(&self, query: &str) -> Result<TabularResult, StoreError>;
}

/// Runs a generated chart program against a fixed table binding.
///
/// Implementations must bound every run with a wall-clock timeout;
/// expiry surfaces as an ordinary execution failure.
#[async_trait::async_trait]
pub trait ChartSandbox: Send + Sync {
    async fn run(&self, code: &str, table: &TabularResult) -> Result<ChartSpec, SandboxError>;
}

/// Drive one bounded generate-execute loop.
///
/// The generator receives the previous attempt's failure message
/// (absent on the first attempt); the executor receives the generated
/// text. Generation failures and execution failures are treated the
/// same: the message becomes the next attempt's context. Returns the
/// executor's output paired with the text that produced it, or the
/// last recorded failure once the budget is spent.
pub(crate) async fn retry_loop<T, G, GF, X, XF>(
    mut generate: G,
    mut execute: X,
) -> Result<(String, T), String>
where
    G: FnMut(Option<String>) -> GF,
    GF: Future<Output = Result<String, String>>,
    X: FnMut(String) -> XF,
    XF: Future<Output = Result<T, String>>,
{
    let mut last_error: Option<String> = None;

    for attempt in 0..ATTEMPT_BUDGET {
        let text = match generate(last_error.clone()).await {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(attempt, error = %e, "generation failed");
                last_error = Some(e);
                continue;
            }
        };

        match execute(text.clone()).await {
            Ok(output) => return Ok((text, output)),
            Err(e) => {
                tracing::debug!(attempt, error = %e, "execution failed");
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| "attempt budget spent without an error".to_string()))
}

/// The core entry point consumed by the gateway and the CLI.
///
/// Owns no per-question state: attempt counters and last-error context
/// live on the stack of each `process` call, so concurrent questions
/// never share loop state.
pub struct Engine {
    store: Arc<dyn TabularStore>,
    sandbox: Arc<dyn ChartSandbox>,
    classifier: IntentClassifier,
    query_generator: QueryGenerator,
    chart_generator: ChartCodeGenerator,
    sample_rows: usize,
}

impl Engine {
    /// Create an engine around the three collaborators. The language
    /// model client is constructed once by the caller and shared into
    /// the classifier and both generators.
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        store: Arc<dyn TabularStore>,
        sandbox: Arc<dyn ChartSandbox>,
    ) -> Self {
        Self {
            store,
            sandbox,
            classifier: IntentClassifier::new(Arc::clone(&llm)),
            query_generator: QueryGenerator::new(Arc::clone(&llm)),
            chart_generator: ChartCodeGenerator::new(llm),
            sample_rows: DEFAULT_SAMPLE_ROWS,
        }
    }

    /// Set how many rows of a table the chart generator gets to see.
    pub fn with_sample_rows(mut self, sample_rows: usize) -> Self {
        self.sample_rows = sample_rows;
        self
    }

    /// Process one question into exactly one envelope.
    ///
    /// Never returns an error and never panics on collaborator
    /// failures: every internal failure kind resolves to an `Error`
    /// or `Unknown` envelope.
    pub async fn process(&self, question: &str) -> ResultEnvelope {
        let intent = self.classifier.classify(question).await;
        tracing::info!(?intent, "processing question");

        match intent {
            Intent::Data => self.data_path(question).await,
            Intent::Chart => self.chart_path(question).await,
            #[allow(unreachable_patterns)]
            other => ResultEnvelope::Unknown {
                message: format!("unsupported intent: {other:?}"),
            },
        }
    }

    /// Data path: generate a query, execute it, retry on failure.
    async fn data_path(&self, question: &str) -> ResultEnvelope {
        match self.fetch_table(question, false).await {
            Ok((query, table)) => {
                let summary = format!("Found {} results.", table.row_count());
                ResultEnvelope::Data {
                    rows: table.records(),
                    query,
                    summary,
                }
            }
            Err(last_error) => ResultEnvelope::Error {
                message: format!(
                    "query failed after {ATTEMPT_BUDGET} attempts: {last_error}"
                ),
            },
        }
    }

    /// Chart path: obtain a non-empty table, then build a chart from
    /// it. Two sub-loops, each with its own attempt budget and its own
    /// last-error tracking.
    async fn chart_path(&self, question: &str) -> ResultEnvelope {
        let wrapped = format!("Get data to plot: {question}");
        let table = match self.fetch_table(&wrapped, true).await {
            Ok((_, table)) => table,
            Err(last_error) => {
                return ResultEnvelope::Error {
                    message: format!("could not retrieve data for chart: {last_error}"),
                };
            }
        };

        match self.build_chart(question, &table).await {
            Ok((code, spec)) => ResultEnvelope::Chart {
                spec,
                code,
                summary: "Here is the visualization.".to_string(),
            },
            Err(last_error) => ResultEnvelope::Error {
                message: format!(
                    "failed to build chart after {ATTEMPT_BUDGET} attempts: {last_error}"
                ),
            },
        }
    }

    /// One bounded query loop. With `reject_empty`, a successful but
    /// zero-row result is recorded as a failure and retried, since the
    /// chart path cannot do anything with an empty table.
    async fn fetch_table(
        &self,
        question: &str,
        reject_empty: bool,
    ) -> Result<(String, TabularResult), String> {
        let generator = &self.query_generator;
        let store = &self.store;

        retry_loop(
            move |prior: Option<String>| async move {
                generator
                    .generate(question, prior.as_deref())
                    .await
                    .map_err(|e| e.to_string())
            },
            move |query: String| async move {
                let table = store.execute(&query).await.map_err(|e| e.to_string())?;
                if reject_empty && table.is_empty() {
                    return Err(EMPTY_CHART_DATA.to_string());
                }
                Ok(table)
            },
        )
        .await
    }

    /// One bounded chart-build loop over an already-obtained table.
    async fn build_chart(
        &self,
        question: &str,
        table: &TabularResult,
    ) -> Result<(String, ChartSpec), String> {
        let sample = table.sample_text(self.sample_rows);
        let sample = sample.as_str();
        let generator = &self.chart_generator;
        let sandbox = &self.sandbox;

        retry_loop(
            move |prior: Option<String>| async move {
                generator
                    .generate(question, sample, prior.as_deref())
                    .await
                    .map_err(|e| e.to_string())
            },
            move |code: String| async move {
                sandbox.run(&code, table).await.map_err(|e| e.to_string())
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LlmError, SandboxError, StoreError};
    use crate::types::Scalar;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted language model: pops one canned outcome per call and
    /// records every prompt it saw.
    #[derive(Debug, Default)]
    struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn push(self, reply: Result<String, LlmError>) -> Self {
            self.replies.lock().unwrap().push_back(reply);
            self
        }

        fn ok(self, reply: &str) -> Self {
            self.push(Ok(reply.to_string()))
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl crate::llm::LanguageModel for ScriptedLlm {
        async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Transport("script exhausted".to_string())))
        }
    }

    /// Scripted store: pops one canned outcome per call and counts calls.
    #[derive(Default)]
    struct ScriptedStore {
        outcomes: Mutex<VecDeque<Result<TabularResult, StoreError>>>,
        queries: Mutex<Vec<String>>,
    }

    impl ScriptedStore {
        fn push(self, outcome: Result<TabularResult, StoreError>) -> Self {
            self.outcomes.lock().unwrap().push_back(outcome);
            self
        }

        fn calls(&self) -> usize {
            self.queries.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl TabularStore for ScriptedStore {
        async fn execute(&self, query: &str) -> Result<TabularResult, StoreError> {
            self.queries.lock().unwrap().push(query.to_string());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(StoreError::Query("script exhausted".to_string())))
        }
    }

    /// Scripted sandbox: pops one canned outcome per call.
    #[derive(Default)]
    struct ScriptedSandbox {
        outcomes: Mutex<VecDeque<Result<ChartSpec, SandboxError>>>,
        codes: Mutex<Vec<String>>,
    }

    impl ScriptedSandbox {
        fn push(self, outcome: Result<ChartSpec, SandboxError>) -> Self {
            self.outcomes.lock().unwrap().push_back(outcome);
            self
        }

        fn calls(&self) -> usize {
            self.codes.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl ChartSandbox for ScriptedSandbox {
        async fn run(&self, code: &str, _table: &TabularResult) -> Result<ChartSpec, SandboxError> {
            self.codes.lock().unwrap().push(code.to_string());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(SandboxError::MissingChart))
        }
    }

    fn table_with_rows(n: usize) -> TabularResult {
        let rows = (0..n)
            .map(|i| {
                vec![
                    Scalar::Text(format!("sector-{i}")),
                    Scalar::Integer(i as i64 * 100),
                ]
            })
            .collect();
        TabularResult::new(vec!["Sector".to_string(), "Amount".to_string()], rows).unwrap()
    }

    fn spec() -> ChartSpec {
        ChartSpec(serde_json::json!({"kind": "bar"}))
    }

    fn engine(
        llm: Arc<ScriptedLlm>,
        store: Arc<ScriptedStore>,
        sandbox: Arc<ScriptedSandbox>,
    ) -> Engine {
        Engine::new(llm, store, sandbox)
    }

    #[tokio::test]
    async fn data_path_succeeds_on_first_attempt() {
        let llm = Arc::new(
            ScriptedLlm::default()
                .ok("DATA")
                .ok("SELECT Sector FROM proyectos"),
        );
        let store = Arc::new(ScriptedStore::default().push(Ok(table_with_rows(2))));
        let sandbox = Arc::new(ScriptedSandbox::default());

        let envelope = engine(llm, store.clone(), sandbox)
            .process("list sectors")
            .await;

        match envelope {
            ResultEnvelope::Data {
                rows,
                query,
                summary,
            } => {
                assert_eq!(rows.len(), 2);
                assert_eq!(query, "SELECT Sector FROM proyectos");
                assert_eq!(summary, "Found 2 results.");
            }
            other => panic!("expected data envelope, got {other:?}"),
        }
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn data_path_recovers_on_third_attempt_with_prior_error_context() {
        let llm = Arc::new(
            ScriptedLlm::default()
                .ok("DATA")
                .ok("Q0")
                .ok("Q1")
                .ok("Q2"),
        );
        let store = Arc::new(
            ScriptedStore::default()
                .push(Err(StoreError::Query("no such table: gasto".to_string())))
                .push(Err(StoreError::Query("no such column: monto".to_string())))
                .push(Ok(table_with_rows(1))),
        );
        let sandbox = Arc::new(ScriptedSandbox::default());

        let envelope = engine(llm.clone(), store.clone(), sandbox)
            .process("total spend")
            .await;

        match envelope {
            ResultEnvelope::Data { query, .. } => assert_eq!(query, "Q2"),
            other => panic!("expected data envelope, got {other:?}"),
        }

        let prompts = llm.prompts();
        // prompts[0] is classification; generation attempts follow.
        assert!(!prompts[1].contains("Previous error"));
        assert!(prompts[2].contains("no such table: gasto"));
        assert!(prompts[3].contains("no such column: monto"));
        assert!(!prompts[3].contains("no such table: gasto"));
        assert_eq!(store.calls(), 3);
    }

    #[tokio::test]
    async fn data_path_reports_last_error_after_exhaustion() {
        let llm = Arc::new(ScriptedLlm::default().ok("DATA").ok("Q0").ok("Q1").ok("Q2"));
        let store = Arc::new(
            ScriptedStore::default()
                .push(Err(StoreError::Query("err-0".to_string())))
                .push(Err(StoreError::Query("err-1".to_string())))
                .push(Err(StoreError::Query("err-2".to_string()))),
        );
        let sandbox = Arc::new(ScriptedSandbox::default());

        let envelope = engine(llm.clone(), store.clone(), sandbox)
            .process("total spend")
            .await;

        match envelope {
            ResultEnvelope::Error { message } => {
                assert!(message.contains("err-2"));
                assert!(!message.contains("err-1"));
            }
            other => panic!("expected error envelope, got {other:?}"),
        }
        // Exactly three store calls and three generation calls; a
        // fourth attempt is never made.
        assert_eq!(store.calls(), 3);
        assert_eq!(llm.prompts().len(), 4);
    }

    #[tokio::test]
    async fn generation_failures_consume_attempts_like_execution_failures() {
        let llm = Arc::new(
            ScriptedLlm::default()
                .ok("DATA")
                .push(Err(LlmError::Transport("rate limited".to_string())))
                .push(Err(LlmError::Transport("rate limited".to_string())))
                .push(Err(LlmError::Transport("rate limited".to_string()))),
        );
        let store = Arc::new(ScriptedStore::default());
        let sandbox = Arc::new(ScriptedSandbox::default());

        let envelope = engine(llm, store.clone(), sandbox)
            .process("anything")
            .await;

        assert!(matches!(envelope, ResultEnvelope::Error { .. }));
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn failing_classification_falls_back_to_data_path() {
        // Every LLM call fails: classification defaults to the data
        // path, generation then burns its budget, and the caller still
        // gets an envelope rather than an error.
        let llm = Arc::new(ScriptedLlm::default());
        let store = Arc::new(ScriptedStore::default());
        let sandbox = Arc::new(ScriptedSandbox::default());

        let envelope = engine(llm, store.clone(), sandbox.clone())
            .process("plot something")
            .await;

        match envelope {
            ResultEnvelope::Error { message } => {
                assert!(message.contains("query failed"));
            }
            other => panic!("expected error envelope, got {other:?}"),
        }
        assert_eq!(sandbox.calls(), 0);
    }

    #[tokio::test]
    async fn data_path_accepts_an_empty_table_as_success() {
        let llm = Arc::new(ScriptedLlm::default().ok("DATA").ok("Q0"));
        let store = Arc::new(ScriptedStore::default().push(Ok(table_with_rows(0))));
        let sandbox = Arc::new(ScriptedSandbox::default());

        let envelope = engine(llm, store.clone(), sandbox)
            .process("any deadlines this week?")
            .await;

        match envelope {
            ResultEnvelope::Data { rows, summary, .. } => {
                assert!(rows.is_empty());
                assert_eq!(summary, "Found 0 results.");
            }
            other => panic!("expected data envelope, got {other:?}"),
        }
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn chart_path_never_builds_from_empty_tables() {
        let llm = Arc::new(
            ScriptedLlm::default()
                .ok("CHART")
                .ok("Q0")
                .ok("Q1")
                .ok("Q2"),
        );
        let store = Arc::new(
            ScriptedStore::default()
                .push(Ok(table_with_rows(0)))
                .push(Ok(table_with_rows(0)))
                .push(Ok(table_with_rows(0))),
        );
        let sandbox = Arc::new(ScriptedSandbox::default());

        let envelope = engine(llm.clone(), store.clone(), sandbox.clone())
            .process("chart of spending")
            .await;

        match envelope {
            ResultEnvelope::Error { message } => {
                assert!(message.contains("could not retrieve data for chart"));
            }
            other => panic!("expected error envelope, got {other:?}"),
        }
        assert_eq!(store.calls(), 3);
        assert_eq!(sandbox.calls(), 0);
        // The empty result was recorded as retry context for the next
        // generation attempt.
        assert!(llm.prompts()[2].contains("no rows"));
    }

    #[tokio::test]
    async fn chart_path_end_to_end_with_sandbox_retry() {
        let llm = Arc::new(
            ScriptedLlm::default()
                .ok("CHART")
                .ok("SELECT Sector, Amount FROM proyectos")
                .ok("C0")
                .ok("C1"),
        );
        let store = Arc::new(ScriptedStore::default().push(Ok(table_with_rows(5))));
        let sandbox = Arc::new(
            ScriptedSandbox::default()
                .push(Err(SandboxError::Execution(
                    "unknown column: amount".to_string(),
                )))
                .push(Ok(spec())),
        );

        let envelope = engine(llm.clone(), store.clone(), sandbox.clone())
            .process("bar chart of spending by sector")
            .await;

        match envelope {
            ResultEnvelope::Chart { code, summary, .. } => {
                assert_eq!(code, "C1");
                assert_eq!(summary, "Here is the visualization.");
            }
            other => panic!("expected chart envelope, got {other:?}"),
        }

        let prompts = llm.prompts();
        // Data sub-loop question is wrapped to signal chart data.
        assert!(prompts[1].contains("Get data to plot:"));
        // First chart attempt has no prior error; the second carries
        // the sandbox failure.
        assert!(!prompts[2].contains("Previous error"));
        assert!(prompts[3].contains("unknown column: amount"));
        assert_eq!(sandbox.calls(), 2);
    }

    #[tokio::test]
    async fn chart_sub_loop_errors_never_leak_from_data_sub_loop() {
        let llm = Arc::new(
            ScriptedLlm::default()
                .ok("CHART")
                .ok("Q0")
                .ok("Q1")
                .ok("C0"),
        );
        let store = Arc::new(
            ScriptedStore::default()
                .push(Err(StoreError::Query("data-loop-error".to_string())))
                .push(Ok(table_with_rows(3))),
        );
        let sandbox = Arc::new(ScriptedSandbox::default().push(Ok(spec())));

        let envelope = engine(llm.clone(), store, sandbox)
            .process("chart it")
            .await;

        assert!(matches!(envelope, ResultEnvelope::Chart { .. }));
        // The chart generator's first attempt starts with fresh error
        // context even though the data sub-loop retried.
        assert!(!llm.prompts()[3].contains("data-loop-error"));
    }

    #[tokio::test]
    async fn chart_sub_loop_reports_last_error_after_exhaustion() {
        let llm = Arc::new(
            ScriptedLlm::default()
                .ok("CHART")
                .ok("Q0")
                .ok("C0")
                .ok("C1")
                .ok("C2"),
        );
        let store = Arc::new(ScriptedStore::default().push(Ok(table_with_rows(2))));
        let sandbox = Arc::new(
            ScriptedSandbox::default()
                .push(Err(SandboxError::Execution("bad-0".to_string())))
                .push(Err(SandboxError::MissingChart))
                .push(Err(SandboxError::Timeout(2000))),
        );

        let envelope = engine(llm, store, sandbox.clone()).process("chart it").await;

        match envelope {
            ResultEnvelope::Error { message } => {
                assert!(message.contains("timed out"));
            }
            other => panic!("expected error envelope, got {other:?}"),
        }
        assert_eq!(sandbox.calls(), 3);
    }

    #[tokio::test]
    async fn retry_loop_makes_exactly_budget_attempts() {
        let generated = Mutex::new(0usize);
        let executed = Mutex::new(0usize);

        let outcome: Result<(String, ()), String> = retry_loop(
            |_prior| {
                *generated.lock().unwrap() += 1;
                async { Ok("text".to_string()) }
            },
            |_text| {
                *executed.lock().unwrap() += 1;
                async { Err("always fails".to_string()) }
            },
        )
        .await;

        assert_eq!(outcome.unwrap_err(), "always fails");
        assert_eq!(*generated.lock().unwrap(), ATTEMPT_BUDGET);
        assert_eq!(*executed.lock().unwrap(), ATTEMPT_BUDGET);
    }

    #[tokio::test]
    async fn retry_loop_passes_previous_failure_to_next_generation() {
        let seen = Mutex::new(Vec::new());
        let mut replies = VecDeque::from([
            Err("exec-0".to_string()),
            Err("exec-1".to_string()),
            Ok(()),
        ]);

        let outcome = retry_loop(
            |prior| {
                seen.lock().unwrap().push(prior);
                async { Ok("text".to_string()) }
            },
            |_text| {
                let reply = replies.pop_front().unwrap();
                async move { reply }
            },
        )
        .await;

        assert!(outcome.is_ok());
        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![None, Some("exec-0".to_string()), Some("exec-1".to_string())]);
    }
}
