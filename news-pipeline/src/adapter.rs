use crate::articles::ArticleStore;
use crate::cache::TtlCache;
use crate::index::VectorIndex;
use crate::text::{capitalize_first, smart_truncate, split_sentences, terminate, tidy, word_count};
use crate::traits::Completer;
use crate::types::{AdaptedContent, AgeTier, Article, ArticleId, PipelineError, Result};
use regex::{Captures, Regex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

// Every replacement is a single word, so substitution never changes a word count.
const LIGHT_SWAPS: &[(&str, &str)] = &[
    ("additionally", "also"),
    ("approximately", "about"),
    ("assist", "help"),
    ("commence", "start"),
    ("consequently", "so"),
    ("demonstrate", "show"),
    ("demonstrates", "shows"),
    ("facilitate", "help"),
    ("however", "but"),
    ("initiative", "plan"),
    ("initiatives", "plans"),
    ("methodology", "method"),
    ("numerous", "many"),
    ("objective", "goal"),
    ("purchase", "buy"),
    ("subsequently", "later"),
    ("sufficient", "enough"),
    ("therefore", "so"),
    ("utilize", "use"),
    ("utilizes", "uses"),
    ("utilized", "used"),
];

// Consulted before the light table for the youngest readers.
const STRONG_SWAPS: &[(&str, &str)] = &[
    ("absorb", "soak"),
    ("absorbing", "soaking"),
    ("analyze", "study"),
    ("astronomers", "scientists"),
    ("atmosphere", "air"),
    ("autonomous", "self-driving"),
    ("capabilities", "skills"),
    ("combating", "fighting"),
    ("conservation", "protection"),
    ("construct", "build"),
    ("debris", "trash"),
    ("develop", "make"),
    ("developed", "made"),
    ("devastating", "terrible"),
    ("discovered", "found"),
    ("discovery", "find"),
    ("emissions", "pollution"),
    ("enormous", "huge"),
    ("environmental", "nature"),
    ("extraordinary", "amazing"),
    ("innovative", "new"),
    ("investigate", "study"),
    ("mechanical", "machine"),
    ("observe", "watch"),
    ("observing", "watching"),
    ("organisms", "creatures"),
    ("particularly", "very"),
    ("potential", "possible"),
    ("researchers", "scientists"),
    ("significant", "big"),
    ("substantial", "large"),
    ("sustainable", "lasting"),
];

const CLAUSE_CONJUNCTIONS: &[&str] = &["and", "but", "so", "because", "while", "which"];

// Sentences longer than this are split for 9-11 readers.
const LONG_SENTENCE_WORDS: usize = 14;
const MIN_PIECE_WORDS: usize = 4;
const YOUNG_MAX_CLAUSES: usize = 3;
const YOUNG_MAX_SENTENCES: usize = 3;
const PROMPT_CONTENT_CHARS: usize = 2000;

fn swap_pattern(tables: &[&[(&str, &str)]]) -> Regex {
    let mut words: Vec<&str> = tables.iter().flat_map(|t| t.iter().map(|(from, _)| *from)).collect();
    words.sort_unstable_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    words.dedup();
    Regex::new(&format!(r"(?i)\b(?:{})\b", words.join("|"))).expect("static regex")
}

fn light_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| swap_pattern(&[LIGHT_SWAPS]))
}

fn strong_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| swap_pattern(&[STRONG_SWAPS, LIGHT_SWAPS]))
}

fn find_swap(table: &'static [(&'static str, &'static str)], word: &str) -> Option<&'static str> {
    table.iter().find(|(from, _)| *from == word).map(|(_, to)| *to)
}

fn lookup(word: &str, strong: bool) -> Option<&'static str> {
    if strong {
        find_swap(STRONG_SWAPS, word).or_else(|| find_swap(LIGHT_SWAPS, word))
    } else {
        find_swap(LIGHT_SWAPS, word)
    }
}

fn match_case(original: &str, replacement: &str) -> String {
    let letters: Vec<char> = original.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        replacement.to_uppercase()
    } else if original.chars().next().is_some_and(char::is_uppercase) {
        capitalize_first(replacement)
    } else {
        replacement.to_string()
    }
}

/// Whole-word, case-preserving vocabulary substitution.
pub fn substitute(text: &str, strong: bool) -> String {
    let re = if strong { strong_re() } else { light_re() };
    re.replace_all(text, |caps: &Captures| {
        let word = &caps[0];
        match lookup(&word.to_lowercase(), strong) {
            Some(replacement) => match_case(word, replacement),
            None => word.to_string(),
        }
    })
    .into_owned()
}

/// Group a sentence's words into clauses. A clause ends at a word carrying a semicolon,
/// or at a comma when the next word is a joining conjunction.
fn clauses(sentence: &str) -> Vec<Vec<&str>> {
    let words: Vec<&str> = sentence.split_whitespace().collect();
    let mut clauses = Vec::new();
    let mut current = Vec::new();

    for (i, word) in words.iter().enumerate() {
        current.push(*word);
        let Some(next) = words.get(i + 1) else { break };
        let joins = CLAUSE_CONJUNCTIONS.contains(&next.to_lowercase().as_str());
        if word.ends_with(';') || (word.ends_with(',') && joins) {
            clauses.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        clauses.push(current);
    }
    clauses
}

/// Break a long sentence into shorter ones at clause boundaries, keeping every word.
fn split_long_sentence(sentence: &str) -> Vec<String> {
    let total = word_count(sentence);
    if total <= LONG_SENTENCE_WORDS {
        return vec![sentence.to_string()];
    }

    let mut pieces: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut consumed = 0;
    for clause in clauses(sentence) {
        consumed += clause.len();
        current.extend(clause);
        if current.len() >= MIN_PIECE_WORDS && total - consumed >= MIN_PIECE_WORDS {
            pieces.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }

    let last = pieces.len() - 1;
    pieces
        .iter()
        .enumerate()
        .map(|(i, piece)| {
            let text = piece.join(" ");
            let text = if i > 0 { capitalize_first(&text) } else { text };
            if i < last {
                terminate(&text)
            } else {
                text
            }
        })
        .collect()
}

/// Keep at most the first three clauses of a sentence.
fn cap_clauses(sentence: &str) -> String {
    let clauses = clauses(sentence);
    if clauses.len() <= YOUNG_MAX_CLAUSES {
        return sentence.to_string();
    }
    terminate(&clauses[..YOUNG_MAX_CLAUSES].concat().join(" "))
}

/// Deterministic tier transform of the cleaned paragraphs.
pub fn rule_based(article: &Article, tier: AgeTier) -> AdaptedContent {
    let (title, paragraphs) = match tier {
        AgeTier::Ages15To17 | AgeTier::Ages12To14 => (
            tidy(&article.title),
            article.cleaned.iter().map(|p| tidy(p)).collect::<Vec<_>>(),
        ),
        AgeTier::Ages9To11 => (
            substitute(&tidy(&article.title), false),
            article
                .cleaned
                .iter()
                .map(|p| {
                    split_sentences(&substitute(&tidy(p), false))
                        .iter()
                        .flat_map(|s| split_long_sentence(s))
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .collect(),
        ),
        AgeTier::Ages6To8 => {
            let mut remaining = YOUNG_MAX_SENTENCES;
            let mut paragraphs = Vec::new();
            for paragraph in &article.cleaned {
                if remaining == 0 {
                    break;
                }
                let sentences: Vec<String> = split_sentences(&substitute(&tidy(paragraph), true))
                    .iter()
                    .take(remaining)
                    .map(|s| cap_clauses(s))
                    .collect();
                remaining -= sentences.len();
                paragraphs.push(sentences.join(" "));
            }
            (substitute(&tidy(&article.title), true), paragraphs)
        }
    };

    AdaptedContent {
        article_id: article.id,
        tier,
        title,
        paragraphs: paragraphs.into_iter().filter(|p| !p.is_empty()).collect(),
        llm_assisted: false,
    }
}

fn tier_guidance(tier: AgeTier) -> &'static str {
    match tier {
        AgeTier::Ages6To8 => {
            "- Use very simple words (replace complex words with simple ones)\n\
             - Use short sentences (10 words or less)\n\
             - Explain things like you're talking to a young child\n\
             - Keep the main facts but make them easy to understand"
        }
        AgeTier::Ages9To11 => {
            "- Use age-appropriate vocabulary (explain technical terms simply)\n\
             - Use clear, medium-length sentences\n\
             - Include interesting facts that would engage this age group"
        }
        AgeTier::Ages12To14 => {
            "- Use more sophisticated vocabulary but explain complex concepts\n\
             - Include scientific or technical details that are educational"
        }
        AgeTier::Ages15To17 => {
            "- Use advanced vocabulary and concepts\n\
             - Make connections to real-world implications"
        }
    }
}

fn build_prompt(article: &Article, tier: AgeTier, related: &[Article], max_words: usize) -> String {
    let mut prompt = format!("Rewrite this news article for readers aged {} years old:\n{}\n", tier, tier_guidance(tier));
    prompt.push_str(&format!("- Use at most {} words\n", max_words));
    if tier == AgeTier::Ages6To8 {
        prompt.push_str(&format!("- Use at most {} sentences\n", YOUNG_MAX_SENTENCES));
    }

    if !related.is_empty() {
        prompt.push_str("\nRelated stories for background (do not rewrite these):\n");
        for other in related {
            let summary = other.cleaned.first().map(|p| smart_truncate(p, 200)).unwrap_or_default();
            prompt.push_str(&format!("- {}: {}\n", other.title, summary));
        }
    }

    prompt.push_str(&format!(
        "\nOriginal article:\nTitle: {}\nContent: {}\n\nRewritten article for ages {}:\n",
        article.title,
        smart_truncate(&article.cleaned_text(), PROMPT_CONTENT_CHARS),
        tier
    ));
    prompt
}

/// Pull an optional `Title:` line and the paragraphs out of a completion.
fn parse_rewrite(response: &str, default_title: &str) -> (String, Vec<String>) {
    let mut title = default_title.to_string();
    let mut body = Vec::new();
    for line in response.lines() {
        let trimmed = line.trim();
        if let Some(t) = trimmed.strip_prefix("Title:") {
            let t = tidy(t);
            if !t.is_empty() {
                title = t;
            }
        } else if body.iter().all(|l: &&str| l.trim().is_empty()) && trimmed.ends_with(':') {
            // Echoed headings like "Rewritten article for ages 6-8:".
            continue;
        } else {
            body.push(line);
        }
    }

    let paragraphs = body
        .join("\n")
        .split("\n\n")
        .map(tidy)
        .filter(|p| !p.is_empty())
        .collect();
    (title, paragraphs)
}

fn llm_eligible(tier: AgeTier) -> bool {
    // The two oldest tiers are already the cleaned text; a rewrite there cannot
    // be simpler than the tier below without breaking the ordering.
    matches!(tier, AgeTier::Ages6To8 | AgeTier::Ages9To11)
}

/// Produces tier-specific reading versions of articles, optionally through an LLM
/// grounded with similar articles from the index. Results are cached per (article, tier).
pub struct ContentAdapter {
    index: Arc<VectorIndex>,
    articles: Arc<ArticleStore>,
    completer: Option<Arc<dyn Completer>>,
    llm_timeout: Duration,
    retrieval_top_k: usize,
    cache: RwLock<TtlCache<(ArticleId, AgeTier), AdaptedContent>>,
    generation: Arc<AtomicU64>,
}

impl ContentAdapter {
    pub fn new(index: Arc<VectorIndex>, articles: Arc<ArticleStore>, cache_ttl: Duration) -> Self {
        Self {
            index,
            articles,
            completer: None,
            llm_timeout: Duration::from_secs(30),
            retrieval_top_k: 3,
            cache: RwLock::new(TtlCache::new(cache_ttl)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Share the working-set generation counter. Results computed from an article read under
    /// an older generation are returned but never cached.
    pub fn with_generation(mut self, generation: Arc<AtomicU64>) -> Self {
        self.generation = generation;
        self
    }

    pub fn with_completer(mut self, completer: Arc<dyn Completer>, timeout: Duration) -> Self {
        info!("LLM-assisted adaptation enabled with {}", completer.model_name());
        self.completer = Some(completer);
        self.llm_timeout = timeout;
        self
    }

    pub fn with_retrieval_top_k(mut self, k: usize) -> Self {
        self.retrieval_top_k = k;
        self
    }

    pub fn llm_enabled(&self) -> bool {
        self.completer.is_some()
    }

    pub async fn adapt(&self, article: &Article, tier: AgeTier) -> Result<AdaptedContent> {
        let generation = self.generation.load(Ordering::Acquire);
        self.adapt_as_of(article, tier, generation).await
    }

    /// Adapt an article that was read while the working set was at `generation`.
    pub async fn adapt_as_of(&self, article: &Article, tier: AgeTier, generation: u64) -> Result<AdaptedContent> {
        let key = (article.id, tier);
        if let Some(hit) = self.cache.read().await.get(&key) {
            debug!("Adaptation cache hit for {} ({})", article.id, tier);
            return Ok(hit.clone());
        }

        let adapted = self.compute(article, tier).await?;

        let mut cache = self.cache.write().await;
        if self.generation.load(Ordering::Acquire) != generation {
            debug!("Working set replaced while adapting {}; result not cached", article.id);
            return Ok(adapted);
        }
        // A concurrent caller may have filled the slot first; serve the same value.
        if let Some(existing) = cache.get(&key) {
            return Ok(existing.clone());
        }
        cache.insert(key, adapted.clone());
        Ok(adapted)
    }

    async fn compute(&self, article: &Article, tier: AgeTier) -> Result<AdaptedContent> {
        let rule = rule_based(article, tier);
        let Some(completer) = self.completer.as_ref().filter(|_| llm_eligible(tier)) else {
            return Ok(rule);
        };

        let floor = tier
            .younger()
            .map(|younger| rule_based(article, younger).word_count())
            .unwrap_or(1);

        match self.rewrite(&**completer, article, tier, &rule, floor).await {
            Ok(adapted) => Ok(adapted),
            Err(e @ PipelineError::IndexDimensionMismatch { .. }) => Err(e),
            Err(e) => {
                let degraded = PipelineError::AdaptationDegraded(e.to_string());
                warn!("{} (article {}, tier {})", degraded, article.id, tier);
                Ok(rule)
            }
        }
    }

    async fn related(&self, article: &Article) -> Result<Vec<Article>> {
        if self.retrieval_top_k == 0 {
            return Ok(Vec::new());
        }
        let query = format!("{} {}", article.title, article.cleaned.first().map(String::as_str).unwrap_or(""));
        let hits = self.index.query(&query, self.retrieval_top_k + 1).await?;
        let ids: Vec<ArticleId> = hits
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| *id != article.id)
            .take(self.retrieval_top_k)
            .collect();
        Ok(self.articles.get_many(&ids).await)
    }

    async fn rewrite(
        &self,
        completer: &dyn Completer,
        article: &Article,
        tier: AgeTier,
        rule: &AdaptedContent,
        floor: usize,
    ) -> Result<AdaptedContent> {
        let related = self.related(article).await?;
        let ceiling = rule.word_count();
        let prompt = build_prompt(article, tier, &related, ceiling);

        let response = tokio::time::timeout(self.llm_timeout, completer.complete(&prompt))
            .await
            .map_err(|_| PipelineError::Timeout(self.llm_timeout.as_millis() as u64))??;

        let (title, paragraphs) = parse_rewrite(&response, &rule.title);
        let adapted = AdaptedContent {
            article_id: article.id,
            tier,
            title,
            paragraphs,
            llm_assisted: true,
        };

        let words = adapted.word_count();
        if adapted.paragraphs.is_empty() {
            return Err(PipelineError::Llm("empty rewrite".to_string()));
        }
        if words < floor.max(1) || words > ceiling {
            return Err(PipelineError::Llm(format!(
                "rewrite has {} words, expected {}..={}",
                words, floor, ceiling
            )));
        }
        if tier == AgeTier::Ages6To8 {
            let sentences: usize = adapted.paragraphs.iter().map(|p| split_sentences(p).len()).sum();
            if sentences > YOUNG_MAX_SENTENCES {
                return Err(PipelineError::Llm(format!("rewrite has {} sentences", sentences)));
            }
        }

        debug!("Accepted {}-word LLM rewrite for {} ({})", words, article.id, tier);
        Ok(adapted)
    }

    pub async fn clear(&self) {
        self.cache.write().await.clear();
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }
}
