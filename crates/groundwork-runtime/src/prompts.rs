//! Prompts for the three generation call sites.
//!
//! System prompts are constant so providers can cache them; only the user
//! prompt carries per-call content. Every prompt asks for JSON that the
//! matching schema in [`crate::schema`] accepts.

/// Bumped whenever a prompt changes in a way that changes output.
/// Part of the decomposition cache key.
pub const PROMPT_VERSION: &str = "decompose-v1";

/// Stage 1: summary decomposition.
pub const DECOMPOSE_SYSTEM_PROMPT: &str = r#"
You decompose a conversation summary into atomic facts.

## Rules
1. Each fact is ONE declarative sentence stating ONE thing.
2. Never join two claims with "and", "but", "or", "because" or a semicolon. Split them.
3. Refer to the person the summary is about as "User".
4. Keep the summary's polarity. "User did not sleep" stays negative.
5. Do not add anything the summary does not say. Do not infer causes.
6. Avoid vague words such as "something", "things", "stuff", "etc".
7. Each fact is between 10 and 500 characters.

## Output Format (JSON only, no prose)
{
  "facts": [
    { "text": "User has a headache.", "certainty": 0.0-1.0 }
  ]
}

"certainty" is how sure you are the summary states the fact. Omit it if unsure.
Return {"facts": []} when the summary states nothing factual.
"#;

/// CoVe Plan: one closed question per fact.
pub const PLAN_SYSTEM_PROMPT: &str = r#"
You write a verification question for a single claim.

## Rules
1. Ask ONE closed question whose answer is yes or no.
2. A "yes" answer must confirm the claim exactly as stated.
3. Ask about the speaker in the second or third person, never "User".
4. Do not include the answer in the question.

## Output Format (JSON only, no prose)
{ "question": "Did the speaker report a headache?" }
"#;

/// CoVe Execute: answer from the transcript alone.
pub const EXECUTE_SYSTEM_PROMPT: &str = r#"
You answer a yes/no question using ONLY the transcript you are given.

## Rules
1. Use no outside knowledge. Do not guess.
2. Answer "yes" or "no" only if the transcript states it.
3. Otherwise answer "not_stated".
4. When you answer "yes" or "no", quote the exact transcript words that show it.

## Output Format (JSON only, no prose)
{ "answer": "yes" | "no" | "not_stated", "quote": "exact words from the transcript" }
"#;

/// User prompt for decomposition.
pub fn decompose_prompt(summary: &str) -> String {
    format!("## Summary\n{}\n\nDecompose the summary into atomic facts.", summary.trim())
}

/// User prompt for planning. `previous` is the question that went unanswered
/// in an earlier round, so the generator rephrases rather than repeats it.
pub fn plan_prompt(fact_text: &str, previous: Option<&str>) -> String {
    match previous {
        None => format!("## Claim\n{}\n\nWrite the verification question.", fact_text),
        Some(question) => format!(
            "## Claim\n{}\n\nThe question \"{}\" could not be answered from the transcript. \
             Rephrase it more narrowly, using words a speaker would use.",
            fact_text, question
        ),
    }
}

/// User prompt for answering from the transcript.
pub fn execute_prompt(question: &str, transcript: &str) -> String {
    format!(
        "## Transcript\n{}\n\n## Question\n{}\n\nAnswer from the transcript only.",
        transcript, question
    )
}
