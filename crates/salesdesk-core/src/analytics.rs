//! Usage analytics over the chat log.
//!
//! Produces an [`AnalysisReport`] with message totals, a word-list sentiment
//! score, frequent words, bigrams and trigrams (overall and split between
//! model answers and every other source), a per-segment breakdown and a user
//! ranking. All counting is deterministic: ties are broken alphabetically.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::models::{ChatLogEntry, Source};

/// Number of entries kept in each top-N list.
pub const TOP_N: usize = 20;

/// Segment assigned when no keyword matches the question.
pub const OTHER_SEGMENT: &str = "OUTRO";

const STOPWORDS: &[&str] = &[
    "a", "o", "e", "de", "da", "do", "que", "em", "um", "uma", "para", "com", "os", "as", "na",
    "no", "se", "é", "foi", "ser", "ao", "à", "n", "mais", "marca", "linha", "unidade", "família",
    "status", "indicação", "segmento", "undefined", "qual", "melhor", "boa", "bem", "muito",
    "algum", "haver", "ter", "saber", "como", "ppa", "favor", "the", "and", "of", "to", "is",
];

const POSITIVE_WORDS: &[&str] = &[
    "bom", "ótimo", "excelente", "perfeito", "ajudou", "obrigado", "sucesso", "solução", "rápido",
    "good", "great", "thanks",
];

const NEGATIVE_WORDS: &[&str] = &[
    "ruim", "péssimo", "erro", "problema", "lento", "demora", "não", "impossível", "horrível",
    "bad", "error", "slow",
];

/// Keyword table used to assign a question to a catalog segment. Order
/// matters: the first segment with a matching keyword wins.
const SEGMENT_KEYWORDS: &[(&str, &[&str])] = &[
    ("COMUNICACAO", &["telefone", "ip", "ramal"]),
    ("CONSUMO", &["lâmpada", "tomada", "energia"]),
    ("CONTROLE DE ACESSOS", &["porteiro", "facial", "acesso"]),
    ("ENERGIA", &["nobreak", "bateria"]),
    ("ENERGIA SOLAR", &["painel solar", "sol", "energia solar"]),
    ("REDES", &["roteador", "switch", "cabo", "wifi"]),
    ("SEGURANCA ELETRONICA", &["cftv", "camera", "alarme", "sensor"]),
];

/// Words whose presence is counted separately in [`AnalysisReport::keyword_hits`].
pub const TRACKED_KEYWORDS: &[&str] = &["intelbras", "código"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SentimentCounts {
    pub positive: usize,
    pub negative: usize,
    pub neutral: usize,
}

impl SentimentCounts {
    fn add(&mut self, s: Sentiment) {
        match s {
            Sentiment::Positive => self.positive += 1,
            Sentiment::Negative => self.negative += 1,
            Sentiment::Neutral => self.neutral += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermCount {
    pub term: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserCount {
    pub username: String,
    pub count: usize,
}

/// Top words, bigrams and trigrams of one slice of the log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TermReport {
    pub top_words: Vec<TermCount>,
    pub top_bigrams: Vec<TermCount>,
    pub top_trigrams: Vec<TermCount>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SegmentReport {
    pub messages: usize,
    pub sentiment: SentimentCounts,
    pub top_words: Vec<TermCount>,
    pub top_bigrams: Vec<TermCount>,
    pub top_trigrams: Vec<TermCount>,
    /// Terms from entries answered by the model alone.
    pub model_terms: TermReport,
    /// Terms from entries answered by any other source.
    pub other_terms: TermReport,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisReport {
    pub total_messages: usize,
    pub keyword_hits: BTreeMap<String, usize>,
    pub sentiment: SentimentCounts,
    /// Keyed by UTC date (`YYYY-MM-DD`).
    pub sentiment_by_day: BTreeMap<String, SentimentCounts>,
    pub by_source: BTreeMap<String, usize>,
    pub top_words: Vec<TermCount>,
    pub top_bigrams: Vec<TermCount>,
    pub top_trigrams: Vec<TermCount>,
    pub model_terms: TermReport,
    pub other_terms: TermReport,
    pub by_segment: BTreeMap<String, SegmentReport>,
    pub most_active_user: Option<UserCount>,
    pub user_ranking: Vec<UserCount>,
}

/// Lowercases and replaces everything but letters, digits and whitespace
/// with spaces.
pub fn clean_text(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect()
}

/// Tokens of `text` with stop words and single characters removed.
pub fn tokenize(text: &str) -> Vec<String> {
    clean_text(text)
        .split_whitespace()
        .filter(|w| w.chars().count() > 1 && !STOPWORDS.contains(w))
        .map(str::to_string)
        .collect()
}

pub fn sentiment_of(text: &str) -> Sentiment {
    let cleaned = clean_text(text);
    let words: HashSet<&str> = cleaned.split_whitespace().collect();
    let positive = POSITIVE_WORDS.iter().filter(|w| words.contains(*w)).count();
    let negative = NEGATIVE_WORDS.iter().filter(|w| words.contains(*w)).count();
    match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => Sentiment::Positive,
        std::cmp::Ordering::Less => Sentiment::Negative,
        std::cmp::Ordering::Equal => Sentiment::Neutral,
    }
}

pub fn classify_segment(question: &str) -> &'static str {
    let cleaned = clean_text(question);
    SEGMENT_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| cleaned.contains(k)))
        .map(|(segment, _)| *segment)
        .unwrap_or(OTHER_SEGMENT)
}

fn top_terms(counts: HashMap<String, usize>, n: usize) -> Vec<TermCount> {
    let mut items: Vec<TermCount> = counts
        .into_iter()
        .map(|(term, count)| TermCount { term, count })
        .collect();
    items.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.term.cmp(&b.term)));
    items.truncate(n);
    items
}

#[derive(Default)]
struct TermTally {
    words: HashMap<String, usize>,
    bigrams: HashMap<String, usize>,
    trigrams: HashMap<String, usize>,
}

impl TermTally {
    fn add(&mut self, tokens: &[String]) {
        for t in tokens {
            *self.words.entry(t.clone()).or_default() += 1;
        }
        for pair in tokens.windows(2) {
            *self.bigrams.entry(pair.join(" ")).or_default() += 1;
        }
        for triple in tokens.windows(3) {
            *self.trigrams.entry(triple.join(" ")).or_default() += 1;
        }
    }

    fn report(self) -> TermReport {
        TermReport {
            top_words: top_terms(self.words, TOP_N),
            top_bigrams: top_terms(self.bigrams, TOP_N),
            top_trigrams: top_terms(self.trigrams, TOP_N),
        }
    }
}

/// Overall, model-answered and other-source tallies for one slice.
#[derive(Default)]
struct SplitTally {
    all: TermTally,
    model: TermTally,
    other: TermTally,
}

impl SplitTally {
    fn add(&mut self, source: Source, tokens: &[String]) {
        self.all.add(tokens);
        match source {
            Source::Model => self.model.add(tokens),
            _ => self.other.add(tokens),
        }
    }
}

/// Builds the report for `entries`.
pub fn analyze(entries: &[ChatLogEntry]) -> AnalysisReport {
    let mut report = AnalysisReport {
        total_messages: entries.len(),
        ..Default::default()
    };
    for k in TRACKED_KEYWORDS {
        report.keyword_hits.insert((*k).to_string(), 0);
    }

    let mut terms = SplitTally::default();
    let mut segment_terms: HashMap<&'static str, SplitTally> = HashMap::new();
    let mut users: HashMap<String, usize> = HashMap::new();

    for entry in entries {
        let text = format!("{} {}", entry.question, entry.answer);
        let sentiment = sentiment_of(&text);
        report.sentiment.add(sentiment);
        report
            .sentiment_by_day
            .entry(entry.timestamp.date_naive().to_string())
            .or_default()
            .add(sentiment);
        *report
            .by_source
            .entry(entry.source.as_str().to_string())
            .or_default() += 1;

        if let Some(user) = entry.username.as_deref().filter(|u| !u.is_empty()) {
            *users.entry(user.to_string()).or_default() += 1;
        }

        let tokens = tokenize(&text);
        for k in TRACKED_KEYWORDS {
            if tokens.iter().any(|t| t == k) {
                *report.keyword_hits.entry((*k).to_string()).or_default() += 1;
            }
        }

        let segment = classify_segment(&entry.question);
        let seg = report.by_segment.entry(segment.to_string()).or_default();
        seg.messages += 1;
        seg.sentiment.add(sentiment);

        terms.add(entry.source, &tokens);
        segment_terms
            .entry(segment)
            .or_default()
            .add(entry.source, &tokens);
    }

    let all = terms.all.report();
    report.top_words = all.top_words;
    report.top_bigrams = all.top_bigrams;
    report.top_trigrams = all.top_trigrams;
    report.model_terms = terms.model.report();
    report.other_terms = terms.other.report();
    for (segment, tally) in segment_terms {
        if let Some(seg) = report.by_segment.get_mut(segment) {
            let all = tally.all.report();
            seg.top_words = all.top_words;
            seg.top_bigrams = all.top_bigrams;
            seg.top_trigrams = all.top_trigrams;
            seg.model_terms = tally.model.report();
            seg.other_terms = tally.other.report();
        }
    }

    let mut ranking: Vec<UserCount> = users
        .into_iter()
        .map(|(username, count)| UserCount { username, count })
        .collect();
    ranking.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.username.cmp(&b.username)));
    report.most_active_user = ranking.first().cloned();
    report.user_ranking = ranking;

    report
}
