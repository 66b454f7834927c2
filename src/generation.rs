use anyhow::Result;

/// Anything that can complete a prompt
#[allow(async_fn_in_trait)]
pub trait Generator {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

const NO_CONTEXT: &str = "No specific medical context is available.";

/// Prompt for answering a patient question from retrieved context
pub fn medical_prompt(context: &str, question: &str) -> String {
    let context = if context.trim().is_empty() {
        NO_CONTEXT
    } else {
        context
    };

    format!(
        "You are a specialised medical assistant. Your job is to provide educational medical \
information and general suggestions.\n\
\n\
IMPORTANT: Always remind the user that:\n\
1. This information is for educational purposes only\n\
2. It does not replace a consultation with a medical professional\n\
3. They should seek medical attention if they have severe symptoms\n\
\n\
If the context does not contain enough information, state the limitations clearly.\n\
\n\
Relevant medical context:\n{}\n\
\n\
User question: {}\n\
\n\
Answer:",
        context, question
    )
}

/// Safe reply used when the language model cannot be reached
pub fn fallback_response(message: &str) -> String {
    format!(
        "As a medical assistant I can help you with information about '{}'. However, this \
information is for educational purposes only and does not replace a consultation with a \
medical professional. Please see a doctor for a complete evaluation of your situation.",
        message
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_context_and_question() {
        let prompt = medical_prompt("Migraine causes pulsating pain.", "Why does my head throb?");
        assert!(prompt.contains("Migraine causes pulsating pain."));
        assert!(prompt.contains("User question: Why does my head throb?"));
        assert!(prompt.contains("does not replace a consultation"));
        assert!(prompt.trim_end().ends_with("Answer:"));
    }

    #[test]
    fn test_prompt_marks_missing_context() {
        assert!(medical_prompt("  ", "fever?").contains(NO_CONTEXT));
    }

    #[test]
    fn test_fallback_mentions_message() {
        assert!(fallback_response("chest pain").contains("'chest pain'"));
    }
}
