//! Text utilities: char-offset slicing, sentence segmentation and the
//! normalized similarity used to ground claims in transcripts.
//!
//! ## Similarity
//!
//! Summaries are written about the speaker ("User took ibuprofen") while
//! transcripts are in the speaker's own voice ("I took ibuprofen for it").
//! The metric therefore compares normalized content tokens:
//!
//! 1. contractions expanded, narrative referents folded to `i`
//! 2. irregular verb forms lemmatized, plural `s` stripped
//! 3. stopwords and negators dropped (polarity is checked elsewhere)
//! 4. tokens match when equal or within a small edit distance
//!
//! The score is an F2 measure of token precision and recall, so a claim
//! fully covered by a slightly longer span still scores high.

use std::collections::HashSet;

/// Minimum edit similarity for two tokens to count as the same word.
pub const TOKEN_MATCH_THRESHOLD: f64 = 0.8;

/// Recall weight of the F-measure.
const BETA: f64 = 2.0;

/// Slice `text` by char offsets `[start, end)`.
///
/// Returns `None` when the range is inverted or past the end.
pub fn char_slice(text: &str, start: usize, end: usize) -> Option<&str> {
    if start > end {
        return None;
    }

    let mut boundaries = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()));

    let start_byte = boundaries.nth(start)?;
    let end_byte = if end == start {
        start_byte
    } else {
        boundaries.nth(end - start - 1)?
    };

    Some(&text[start_byte..end_byte])
}

/// A sentence located by char offsets, trimmed of surrounding whitespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sentence {
    pub start: usize,
    pub end: usize,
}

/// Split text into sentences.
///
/// A sentence ends at `.`, `!`, `?` (followed by whitespace or end of text)
/// or at a line break. Offsets are char offsets into `text`.
pub fn sentences(text: &str) -> Vec<Sentence> {
    let chars: Vec<char> = text.chars().collect();
    let mut result = Vec::new();
    let mut start = 0;

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let terminal = matches!(c, '.' | '!' | '?')
            && chars.get(i + 1).map_or(true, |next| next.is_whitespace() || *next == '"');

        if terminal || c == '\n' {
            // Absorb runs of terminal punctuation ("?!", "...")
            let mut end = i + 1;
            while end < chars.len() && matches!(chars[end], '.' | '!' | '?' | '"') {
                end += 1;
            }
            push_trimmed(&chars, start, end, &mut result);
            start = end;
            i = end;
            continue;
        }
        i += 1;
    }
    push_trimmed(&chars, start, chars.len(), &mut result);

    result
}

fn push_trimmed(chars: &[char], mut start: usize, mut end: usize, out: &mut Vec<Sentence>) {
    while start < end && chars[start].is_whitespace() {
        start += 1;
    }
    while end > start && chars[end - 1].is_whitespace() {
        end -= 1;
    }
    if end > start && chars[start..end].iter().any(|c| c.is_alphanumeric()) {
        out.push(Sentence { start, end });
    }
}

/// Narrative referents folded to the first person.
const PERSPECTIVE: &[&str] = &[
    "user", "speaker", "patient", "caller", "client", "customer", "participant", "he", "she",
    "him", "his", "her", "hers", "me", "my", "mine", "myself", "himself", "herself",
];

/// Irregular forms mapped to a shared lemma.
const LEMMAS: &[(&str, &str)] = &[
    ("has", "have"),
    ("had", "have"),
    ("having", "have"),
    ("is", "be"),
    ("am", "be"),
    ("are", "be"),
    ("was", "be"),
    ("were", "be"),
    ("been", "be"),
    ("being", "be"),
    ("does", "do"),
    ("did", "do"),
    ("done", "do"),
    ("took", "take"),
    ("taken", "take"),
    ("takes", "take"),
    ("taking", "take"),
    ("felt", "feel"),
    ("feels", "feel"),
    ("feeling", "feel"),
    ("went", "go"),
    ("goes", "go"),
    ("gone", "go"),
    ("said", "say"),
    ("says", "say"),
    ("told", "tell"),
    ("got", "get"),
    ("gets", "get"),
    ("made", "make"),
    ("saw", "see"),
    ("seen", "see"),
    ("ate", "eat"),
    ("eaten", "eat"),
    ("slept", "sleep"),
    ("bought", "buy"),
    ("thought", "think"),
];

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "for", "it", "its", "of", "to", "in", "on", "at", "this", "that", "these",
    "those", "with", "also", "just", "really", "very", "definitely", "actually", "so", "some",
    "and", "or", "but", "um", "uh", "like", "well", "oh", "yeah", "today", "then", "there",
    "about", "by", "from", "as", "too", "quite", "pretty", "literally", "honestly", "basically",
    "mentioned", "stated", "reported", "noted", "indicated", "explained",
];

/// Words that flip the polarity of a clause.
pub const NEGATORS: &[&str] = &[
    "no", "not", "never", "none", "nor", "neither", "without", "cannot", "nothing", "nobody",
    "nowhere", "denies", "denied", "deny",
];

/// Cues that the speaker is unsure of what they assert.
pub const HEDGES: &[&str] = &[
    "maybe", "perhaps", "possibly", "probably", "might", "unsure", "guess", "suppose", "apparently",
    "kinda", "sorta",
];

/// Multi-word hedge cues (matched on normalized text).
const HEDGE_PHRASES: &[&str] = &[
    "not sure",
    "i think",
    "i believe",
    "kind of",
    "sort of",
    "don't know",
    "do not know",
];

/// Raw lowercase word stream, with contractions split off.
///
/// `don't` becomes `do` + `not`, `I'm` becomes `i` + `am`.
pub fn words(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase().replace('’', "'");
    let mut out = Vec::new();

    for raw in lowered.split(|c: char| !(c.is_alphanumeric() || c == '\'')) {
        let raw = raw.trim_matches('\'');
        if raw.is_empty() {
            continue;
        }

        if raw == "can't" || raw == "cant" {
            out.push("can".to_string());
            out.push("not".to_string());
        } else if raw == "won't" {
            out.push("will".to_string());
            out.push("not".to_string());
        } else if let Some(stem) = raw.strip_suffix("n't") {
            out.push(stem.to_string());
            out.push("not".to_string());
        } else if let Some((stem, suffix)) = raw.split_once('\'') {
            out.push(stem.to_string());
            match suffix {
                "m" => out.push("am".to_string()),
                "ve" => out.push("have".to_string()),
                "re" => out.push("are".to_string()),
                "ll" => out.push("will".to_string()),
                // possessive 's and 'd carry no content of their own
                _ => {}
            }
        } else {
            out.push(raw.to_string());
        }
    }

    out
}

fn normalize_word(word: &str) -> Option<String> {
    if NEGATORS.contains(&word) || STOPWORDS.contains(&word) {
        return None;
    }
    if PERSPECTIVE.contains(&word) || word == "i" {
        return Some("i".to_string());
    }
    if let Some((_, lemma)) = LEMMAS.iter().find(|(form, _)| *form == word) {
        return Some((*lemma).to_string());
    }
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("us") {
        return Some(word[..word.len() - 1].to_string());
    }
    Some(word.to_string())
}

/// Normalized content tokens used for similarity.
pub fn content_tokens(text: &str) -> Vec<String> {
    words(text)
        .iter()
        .filter_map(|w| normalize_word(w))
        .collect()
}

/// Content tokens excluding the folded first-person referent.
///
/// Used when two texts must share a topic, not merely a speaker.
pub fn topic_tokens(text: &str) -> HashSet<String> {
    content_tokens(text)
        .into_iter()
        .filter(|t| t != "i" && t != "be" && t != "have" && t != "do")
        .collect()
}

/// Number of negators in the text.
pub fn negation_count(text: &str) -> usize {
    words(text)
        .iter()
        .filter(|w| NEGATORS.contains(&w.as_str()))
        .count()
}

/// Whether the clause asserts absence (odd number of negators).
pub fn is_negated(text: &str) -> bool {
    negation_count(text) % 2 == 1
}

/// Whether the text contains a hedge cue.
pub fn is_hedged(text: &str) -> bool {
    let tokens = words(text);
    if tokens.iter().any(|w| HEDGES.contains(&w.as_str())) {
        return true;
    }
    let joined = tokens.join(" ");
    HEDGE_PHRASES.iter().any(|phrase| {
        let phrase_words = words(phrase).join(" ");
        joined.contains(&phrase_words)
    })
}

/// Levenshtein distance over chars.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Edit similarity in [0, 1].
pub fn edit_similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

fn tokens_match(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    a.chars().count() >= 4
        && b.chars().count() >= 4
        && edit_similarity(a, b) >= TOKEN_MATCH_THRESHOLD
}

/// Normalized similarity of a claim to a candidate source passage, in [0, 1].
pub fn similarity(claim: &str, source: &str) -> f64 {
    let claim_tokens: HashSet<String> = content_tokens(claim).into_iter().collect();
    let source_tokens: HashSet<String> = content_tokens(source).into_iter().collect();
    token_similarity(&claim_tokens, &source_tokens)
}

/// F2 similarity of two pre-tokenized sets.
pub fn token_similarity(claim: &HashSet<String>, source: &HashSet<String>) -> f64 {
    if claim.is_empty() || source.is_empty() {
        return 0.0;
    }

    let claim_hits = claim
        .iter()
        .filter(|c| source.iter().any(|s| tokens_match(c, s)))
        .count();
    let source_hits = source
        .iter()
        .filter(|s| claim.iter().any(|c| tokens_match(c, s)))
        .count();

    let recall = claim_hits as f64 / claim.len() as f64;
    let precision = source_hits as f64 / source.len() as f64;
    if recall == 0.0 || precision == 0.0 {
        return 0.0;
    }

    let beta_sq = BETA * BETA;
    let score = (1.0 + beta_sq) * precision * recall / (beta_sq * precision + recall);
    score.clamp(0.0, 1.0)
}

/// Collapse runs of whitespace to single spaces.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
