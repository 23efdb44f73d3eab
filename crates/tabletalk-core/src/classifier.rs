//! Intent classification
//!
//! One request, one response: the question is classified as either a
//! data retrieval or a chart request. Classification failures are
//! never surfaced; the engine falls back to the data path instead.

use std::sync::Arc;

use crate::llm::LanguageModel;
use crate::types::Intent;

/// Classifies a question into one of the two supported intents.
pub struct IntentClassifier {
    llm: Arc<dyn LanguageModel>,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    /// Classify a question.
    ///
    /// Sends a single classification prompt and maps the trimmed,
    /// case-normalized response to an intent. A client failure or a
    /// response matching neither label resolves to [`Intent::Data`].
    pub async fn classify(&self, question: &str) -> Intent {
        let prompt = build_classification_prompt(question);

        match self.llm.generate(&prompt).await {
            Ok(response) => match Intent::from_label(&response) {
                Some(intent) => intent,
                None => {
                    tracing::warn!(
                        label = response.trim(),
                        "unrecognized classification label, defaulting to data"
                    );
                    Intent::Data
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "classification failed, defaulting to data");
                Intent::Data
            }
        }
    }
}

fn build_classification_prompt(question: &str) -> String {
    format!(
        "User question: \"{question}\"\n\n\
         Classify the intent into one of:\n\
         - \"DATA\": the user asks for data retrieval, a list, filtered items, or simple numbers.\n\
         - \"CHART\": the user asks for a chart, graph, visualization, or trend.\n\n\
         Return ONLY the word DATA or CHART."
    )
}
