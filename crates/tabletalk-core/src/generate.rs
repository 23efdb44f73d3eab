//! Query and chart program generation
//!
//! Both generators build a prompt, make one language-model call, and
//! clean the response. Neither validates what the model produced;
//! validation is delegated to execution, and execution failures come
//! back through the retry loop as `prior_error` context.

use std::sync::Arc;

use crate::error::LlmError;
use crate::llm::LanguageModel;

/// Fixed name the generated program must bind its chart object to.
pub const CHART_BINDING: &str = "chart";

/// Fixed name the input table is bound to inside the sandbox.
pub const TABLE_BINDING: &str = "table";

/// Static schema summary embedded in every query-generation prompt.
///
/// The engine does no schema introspection; this description is the
/// model's whole view of the database.
pub const SCHEMA_SUMMARY: &str = "\
Database tables:
1. proyectos (columns: \"Activity Name\", \"Sector\", \"Status\", \"Amount\")
2. licitaciones (columns: \"Process Name\", \"Description\", \"Deadline\", \"Amount\")
3. adjudicaciones (columns: \"Contractor\", \"Project\", \"Amount\", \"Date\")";

/// Strip markdown code-fence wrapper tokens wherever they occur.
///
/// Removes every triple-backtick fence together with a language tag
/// attached to it, leaving the payload otherwise untouched, then trims
/// surrounding whitespace. Idempotent: the output never contains a
/// fence, so a second pass only re-trims.
pub fn strip_code_fences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(idx) = rest.find("```") {
        out.push_str(&rest[..idx]);
        rest = &rest[idx + 3..];
        rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// Produces a SQL query from a question and optional prior-error context.
pub struct QueryGenerator {
    llm: Arc<dyn LanguageModel>,
}

impl QueryGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Generate a query for the question. When `prior_error` is
    /// present the prompt frames it as "fix the query".
    pub async fn generate(
        &self,
        question: &str,
        prior_error: Option<&str>,
    ) -> Result<String, LlmError> {
        let prompt = build_query_prompt(question, prior_error);
        let response = self.llm.generate(&prompt).await?;
        Ok(strip_code_fences(&response))
    }
}

fn build_query_prompt(question: &str, prior_error: Option<&str>) -> String {
    let error_context = match prior_error {
        Some(err) => format!("\nPrevious error: {err}. Fix the query.\n"),
        None => String::new(),
    };
    format!(
        "You are a SQLite expert.\n\
         Schema:\n{SCHEMA_SUMMARY}\n\n\
         User question: \"{question}\"\n\
         {error_context}\n\
         Return ONLY the raw SQL query. Do not use markdown blocks like ```sql.\n\
         Ensure the SQL is valid for SQLite."
    )
}

/// Produces a chart program from a question, a table sample and
/// optional prior-error context.
pub struct ChartCodeGenerator {
    llm: Arc<dyn LanguageModel>,
}

impl ChartCodeGenerator {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Generate a chart program for the question.
    ///
    /// `table_sample` is a first-rows text preview of the data the
    /// chart will be built from; it gives the model column names and
    /// value shapes, never the full dataset.
    pub async fn generate(
        &self,
        question: &str,
        table_sample: &str,
        prior_error: Option<&str>,
    ) -> Result<String, LlmError> {
        let prompt = build_chart_prompt(question, table_sample, prior_error);
        let response = self.llm.generate(&prompt).await?;
        Ok(strip_code_fences(&response))
    }
}

fn build_chart_prompt(question: &str, table_sample: &str, prior_error: Option<&str>) -> String {
    let error_context = match prior_error {
        Some(err) => format!("\nPrevious error: {err}. Fix the program.\n"),
        None => String::new(),
    };
    format!(
        "You are a data visualization expert.\n\
         A table named `{TABLE_BINDING}` already exists with these first rows:\n\
         {table_sample}\n\n\
         User question: \"{question}\"\n\
         {error_context}\n\
         Write a JSON chart program that builds exactly one chart object bound to the name \
         `{CHART_BINDING}`, operating on `{TABLE_BINDING}`. The program must have the form:\n\
         {{\"{CHART_BINDING}\": {{\"kind\": \"bar|line|scatter|pie|area\", \"x\": \"<column>\", \
         \"y\": \"<column>\", \"series\": \"<column or null>\", \
         \"aggregate\": \"sum|avg|count|min|max or null\", \"title\": \"<text>\"}}}}\n\
         Use only columns that exist in `{TABLE_BINDING}`. Do not render or display the chart.\n\
         Return ONLY the JSON document. Do not use markdown blocks."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use proptest::prelude::*;

    /// Client that records the prompt it was given and replies with a
    /// canned completion.
    #[derive(Debug)]
    struct EchoClient {
        reply: String,
        seen: std::sync::Mutex<Vec<String>>,
    }

    impl EchoClient {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                seen: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl LanguageModel for EchoClient {
        async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
            self.seen.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    #[test]
    fn strips_fenced_sql_block() {
        assert_eq!(strip_code_fences("```sql\nSELECT 1\n```"), "SELECT 1");
    }

    #[test]
    fn strips_bare_fences_and_trims() {
        assert_eq!(strip_code_fences("```\nSELECT 1\n```  "), "SELECT 1");
        assert_eq!(strip_code_fences("  SELECT 1  "), "SELECT 1");
    }

    #[test]
    fn strips_fences_in_the_middle_of_text() {
        let input = "SELECT a FROM t```sql\n-- trailing commentary```done";
        let stripped = strip_code_fences(input);
        assert!(!stripped.contains("```"));
        assert!(stripped.starts_with("SELECT a FROM t"));
        assert!(stripped.ends_with("done"));
    }

    #[test]
    fn leaves_plain_text_untouched() {
        assert_eq!(
            strip_code_fences("SELECT Sector FROM proyectos"),
            "SELECT Sector FROM proyectos"
        );
    }

    proptest! {
        #[test]
        fn stripping_is_idempotent(input in ".{0,200}") {
            let once = strip_code_fences(&input);
            let twice = strip_code_fences(&once);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn stripped_output_contains_no_fence(input in ".{0,200}") {
            prop_assert!(!strip_code_fences(&input).contains("```"));
        }
    }

    #[tokio::test]
    async fn query_prompt_carries_schema_and_question() {
        let client = Arc::new(EchoClient::new("SELECT 1"));
        let generator = QueryGenerator::new(client.clone());
        generator.generate("total per sector", None).await.unwrap();

        let prompts = client.seen.lock().unwrap();
        assert!(prompts[0].contains("proyectos"));
        assert!(prompts[0].contains("total per sector"));
        assert!(!prompts[0].contains("Previous error"));
    }

    #[tokio::test]
    async fn query_prompt_frames_prior_error_as_fix_request() {
        let client = Arc::new(EchoClient::new("SELECT 1"));
        let generator = QueryGenerator::new(client.clone());
        generator
            .generate("total per sector", Some("no such column: sector"))
            .await
            .unwrap();

        let prompts = client.seen.lock().unwrap();
        assert!(prompts[0].contains("Previous error: no such column: sector"));
        assert!(prompts[0].contains("Fix the query"));
    }

    #[tokio::test]
    async fn query_response_is_fence_stripped() {
        let client = Arc::new(EchoClient::new("```sql\nSELECT Sector FROM proyectos\n```"));
        let generator = QueryGenerator::new(client);
        let query = generator.generate("sectors", None).await.unwrap();
        assert_eq!(query, "SELECT Sector FROM proyectos");
    }

    #[tokio::test]
    async fn chart_prompt_carries_sample_and_bindings() {
        let client = Arc::new(EchoClient::new("{}"));
        let generator = ChartCodeGenerator::new(client.clone());
        generator
            .generate("spending by sector", "Sector | Amount\nSalud | 12", None)
            .await
            .unwrap();

        let prompts = client.seen.lock().unwrap();
        assert!(prompts[0].contains("Sector | Amount"));
        assert!(prompts[0].contains("`chart`"));
        assert!(prompts[0].contains("`table`"));
        assert!(prompts[0].contains("Do not render"));
    }

    #[tokio::test]
    async fn chart_prompt_includes_prior_error() {
        let client = Arc::new(EchoClient::new("{}"));
        let generator = ChartCodeGenerator::new(client.clone());
        generator
            .generate("spending", "Sector", Some("unknown column: amount"))
            .await
            .unwrap();

        let prompts = client.seen.lock().unwrap();
        assert!(prompts[0].contains("Previous error: unknown column: amount"));
    }
}
