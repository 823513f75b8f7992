//! System prompts for the hosted model.

pub const REWRITE_SYSTEM_PROMPT: &str = "You are a question-rewriting assistant. \
Given the chat history and the latest user query, rewrite the query as a single, \
self-contained question. Do NOT answer - only restate it clearly as if the history \
were not available.";

const QA_SYSTEM_TEMPLATE: &str = "You are an AI assistant. Use the following retrieved passages. \
Check for the answer in the retrieved passages first. If it is not there, you may answer \
from your own knowledge. If you need more context, ask the user a clarifying question \
instead of guessing; never make facts up. \
Answer in at most {max_sentences}.\n\n\
{context}";

/// Fill the answering prompt with the retrieved passages.
pub fn qa_system_prompt(passages: &[&str], max_sentences: usize) -> String {
    let context = if passages.is_empty() {
        "(no passages were retrieved)".to_string()
    } else {
        passages.join("\n\n")
    };
    QA_SYSTEM_TEMPLATE
        .replace("{max_sentences}", &sentence_limit(max_sentences))
        .replace("{context}", &context)
}

fn sentence_limit(n: usize) -> String {
    let count = match n {
        1 => return "one sentence".into(),
        2 => "two".into(),
        3 => "three".into(),
        4 => "four".into(),
        5 => "five".into(),
        n => n.to_string(),
    };
    format!("{count} sentences")
}
