use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use news_pipeline::config::FeedConfig;
use news_pipeline::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const MOON: &str = "<p>Scientists found water ice at the Moon's south pole in 2024. The ice hides inside \
                    deep craters that never see sunlight.</p><p>Future astronauts could melt the ice for \
                    drinking water and could also split it into oxygen and hydrogen to make rocket fuel.</p>";

const WIND: &str = "<p>A town installed 12 new wind turbines on the hills above the harbor, and together they \
                    now produce enough electricity for about 3,000 homes.</p><p>Engineers say the turbines \
                    turn even in light breezes, which helps the town rely less on fuel shipped in by boat.</p>";

const RIVER: &str = "<p>Volunteers removed 40 percent of the plastic litter from a polluted river in a single \
                     summer, and the fish and birds that depend on the water returned within weeks.</p>\
                     <p>The cleanup shows how a healthy ecosystem can recover when people protect it.</p>";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

fn entry(source: &str, slug: &str, title: &str, body: &str, day: u32) -> ParsedEntry {
    ParsedEntry {
        guid: None,
        url: format!("https://news.test/{}/{}", source, slug),
        title: title.to_string(),
        description: None,
        content: Some(body.to_string()),
        published_at: Utc.with_ymd_and_hms(2024, 6, day, 9, 0, 0).single(),
    }
}

enum Behaviour {
    Entries(Vec<ParsedEntry>),
    Hang,
}

/// Scripted feeds keyed by source name; unknown sources fail.
struct FakePuller {
    behaviour: HashMap<String, Behaviour>,
    delay: Duration,
    pulls: AtomicUsize,
}

impl FakePuller {
    fn new() -> Self {
        Self {
            behaviour: HashMap::new(),
            delay: Duration::ZERO,
            pulls: AtomicUsize::new(0),
        }
    }

    fn entries(mut self, source: &str, entries: Vec<ParsedEntry>) -> Self {
        self.behaviour.insert(source.to_string(), Behaviour::Entries(entries));
        self
    }

    fn hang(mut self, source: &str) -> Self {
        self.behaviour.insert(source.to_string(), Behaviour::Hang);
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PullFeed for FakePuller {
    async fn pull(&self, source: &SourceSpec) -> Result<Vec<ParsedEntry>> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match self.behaviour.get(&source.name) {
            Some(Behaviour::Entries(entries)) => Ok(entries.clone()),
            Some(Behaviour::Hang) => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Vec::new())
            }
            None => Err(PipelineError::Parse(format!("no script for {}", source.name))),
        }
    }
}

struct BrokenEmbedder;

#[async_trait]
impl Embedder for BrokenEmbedder {
    fn model_name(&self) -> String {
        "broken".to_string()
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(PipelineError::Embedding("model not loaded".to_string()))
    }
}

/// Returns 3-dimensional vectors for ice stories and 4-dimensional ones otherwise.
struct InconsistentEmbedder;

#[async_trait]
impl Embedder for InconsistentEmbedder {
    fn model_name(&self) -> String {
        "inconsistent".to_string()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(if text.contains("ice") { vec![1.0; 3] } else { vec![1.0; 4] })
    }
}

fn source(name: &str, category: Category) -> SourceSpec {
    SourceSpec {
        name: name.to_string(),
        url: format!("https://news.test/{}/rss", name),
        category,
    }
}

fn sources() -> Vec<SourceSpec> {
    vec![
        source("ScienceDaily", Category::Science),
        source("LunarWire", Category::Science),
        source("Wired", Category::Technology),
        source("EcoNews", Category::Environment),
    ]
}

fn standard_puller() -> FakePuller {
    FakePuller::new()
        .entries("LunarWire", vec![entry("lunar", "moon-ice", "Ice at the lunar pole", MOON, 3)])
        .entries("Wired", vec![entry("wired", "turbines", "Town powers homes with wind", WIND, 4)])
        .entries("EcoNews", vec![entry("eco", "river", "River cleanup brings fish back", RIVER, 5)])
}

fn test_config() -> AppConfig {
    AppConfig {
        sources: BTreeMap::new(),
        embedding_model: "hashing-128".to_string(),
        source_timeout_secs: 1,
        ..AppConfig::default()
    }
}

async fn service_with(puller: Arc<FakePuller>) -> KnowledgeService {
    KnowledgeService::builder(test_config())
        .with_puller(puller)
        .with_embedder(Arc::new(HashingEmbedder::new(128)))
        .build()
        .await
        .unwrap()
}

async fn find(service: &KnowledgeService, title: &str) -> Article {
    service
        .articles(None)
        .await
        .unwrap()
        .into_iter()
        .find(|a| a.title == title)
        .unwrap_or_else(|| panic!("no article titled {}", title))
}

#[tokio::test]
async fn timed_out_source_is_flagged_and_replaced_by_fallback() -> Result<()> {
    init_tracing();
    let puller = Arc::new(standard_puller().hang("ScienceDaily"));
    let service = service_with(puller).await;

    let summary = service.refresh_feeds(&sources()).await?;
    info!("Refresh summary: {:?}", summary);

    assert_eq!(summary.failures.get("ScienceDaily"), Some(&true));
    assert_eq!(summary.failures.get("Wired"), Some(&false));
    assert_eq!(summary.failed_sources(), vec!["ScienceDaily"]);
    assert_eq!(summary.article_count, 4);

    let fallback = service
        .articles(Some(Category::Science))
        .await?
        .into_iter()
        .find(|a| a.is_fallback)
        .expect("fallback science article");
    for tier in AgeTier::ALL {
        let adapted = service.get_adapted_article(fallback.id, tier).await?;
        assert_eq!(adapted.article_id, fallback.id);
        assert!(!adapted.paragraphs.is_empty());
    }
    Ok(())
}

#[tokio::test]
async fn adapted_word_counts_never_grow_for_younger_tiers() -> Result<()> {
    init_tracing();
    let service = service_with(Arc::new(standard_puller())).await;
    service.refresh_feeds(&sources()).await?;

    for article in service.articles(None).await? {
        let mut counts = Vec::new();
        for tier in AgeTier::ALL {
            counts.push(service.get_adapted_article(article.id, tier).await?.word_count());
        }
        assert!(
            counts.windows(2).all(|w| w[0] <= w[1]),
            "{}: word counts {:?}",
            article.title,
            counts
        );
    }
    Ok(())
}

#[tokio::test]
async fn young_readers_never_get_more_sentences_than_nine_to_eleven() -> Result<()> {
    init_tracing();
    let service = service_with(Arc::new(standard_puller())).await;
    service.refresh_feeds(&sources()).await?;

    let sentences = |adapted: &AdaptedContent| -> usize {
        adapted.paragraphs.iter().map(|p| news_pipeline::text::split_sentences(p).len()).sum()
    };
    for article in service.articles(None).await? {
        let young = sentences(&service.get_adapted_article(article.id, AgeTier::Ages6To8).await?);
        let middle = sentences(&service.get_adapted_article(article.id, AgeTier::Ages9To11).await?);
        assert!(young > 0 && young <= 3, "{}: {} sentences at 6-8", article.title, young);
        assert!(young <= middle, "{}: 6-8 has {} sentences, 9-11 has {}", article.title, young, middle);
    }
    Ok(())
}

#[tokio::test]
async fn adaptation_is_stable_within_ttl() -> Result<()> {
    init_tracing();
    let service = service_with(Arc::new(standard_puller())).await;
    service.refresh_feeds(&sources()).await?;
    let article = find(&service, "Ice at the lunar pole").await;

    let first = service.get_adapted_article(article.id, AgeTier::Ages9To11).await?;
    let second = service.get_adapted_article(article.id, AgeTier::Ages9To11).await?;
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn every_article_gets_one_question_per_subject() -> Result<()> {
    init_tracing();
    let service = service_with(Arc::new(standard_puller())).await;
    service.refresh_feeds(&sources()).await?;

    for article in service.articles(None).await? {
        for tier in AgeTier::ALL {
            let questions = service.get_questions(article.id, tier).await?;
            assert_eq!(questions.len(), 3);
            assert_eq!(
                questions.iter().map(|q| q.subject).collect::<Vec<_>>(),
                vec![Subject::Math, Subject::Science, Subject::Ela]
            );
            for q in &questions {
                assert_eq!(q.tier, tier);
                assert!(!q.prompt.is_empty() && !q.answer.is_empty());
                assert!(!q.hint.is_empty() && !q.reasoning.is_empty());
                assert!(q.options.len() >= 2 && q.options.contains(&q.answer));
            }
            assert_eq!(service.get_questions(article.id, tier).await?, questions);
        }
    }
    Ok(())
}

#[tokio::test]
async fn young_readers_get_simple_math_from_the_moon_story() -> Result<()> {
    init_tracing();
    let service = service_with(Arc::new(standard_puller())).await;
    service.refresh_feeds(&sources()).await?;
    let article = find(&service, "Ice at the lunar pole").await;

    let questions = service.get_questions(article.id, AgeTier::Ages6To8).await?;
    let math = &questions[0];
    assert!(math.prompt.contains("2024"), "prompt: {}", math.prompt);
    assert_eq!(math.answer, "2025");
    Ok(())
}

#[tokio::test]
async fn answer_state_machine_through_the_service() -> Result<()> {
    init_tracing();
    let service = service_with(Arc::new(standard_puller())).await;
    service.refresh_feeds(&sources()).await?;
    let article = find(&service, "Town powers homes with wind").await;
    let questions = service.get_questions(article.id, AgeTier::Ages9To11).await?;
    let wrong = |q: &Question| q.options.iter().find(|o| **o != q.answer).cloned().unwrap();

    let mut session = LearningSession::new();

    // Miss then miss: resolved with effort points and the answer revealed.
    let math = &questions[0];
    let first = service.submit_answer(&mut session, math.id, &wrong(math)).await;
    assert_eq!(first.state, AnswerState::HintShown);
    assert_eq!(first.points_awarded, 0);
    assert!(!first.feedback.is_empty());
    let second = service.submit_answer(&mut session, math.id, &wrong(math)).await;
    assert_eq!(second.state, AnswerState::Resolved);
    assert_eq!(second.points_awarded, 5);
    assert_eq!(second.correct_answer.as_deref(), Some(math.answer.as_str()));

    // Resolved questions never resolve again.
    let again = service.submit_answer(&mut session, math.id, &math.answer).await;
    assert_eq!(again.status, SubmissionStatus::AlreadyResolved);
    assert_eq!(again.points_awarded, 0);

    // Correct on the first try.
    let science = &questions[1];
    let outcome = service.submit_answer(&mut session, science.id, &science.answer).await;
    assert_eq!(outcome.state, AnswerState::Resolved);
    assert_eq!(outcome.points_awarded, 10);

    assert_eq!(session.total_score(), 15);
    assert_eq!(session.questions_answered(), 2);
    assert!(session.achievements().contains(&Achievement::FirstQuestion));
    Ok(())
}

#[tokio::test]
async fn refresh_retires_previous_questions() -> Result<()> {
    init_tracing();
    let service = service_with(Arc::new(standard_puller())).await;
    service.refresh_feeds(&sources()).await?;
    let article = find(&service, "River cleanup brings fish back").await;
    let question = service.get_questions(article.id, AgeTier::Ages12To14).await?.remove(2);

    service.refresh_feeds(&sources()).await?;

    let mut session = LearningSession::new();
    let outcome = service.submit_answer(&mut session, question.id, &question.answer).await;
    assert_eq!(outcome.status, SubmissionStatus::UnknownQuestion);
    assert_eq!(outcome.points_awarded, 0);
    assert_eq!(session.total_score(), 0);
    Ok(())
}

#[tokio::test]
async fn unknown_article_is_reported() -> Result<()> {
    init_tracing();
    let service = service_with(Arc::new(standard_puller())).await;
    service.refresh_feeds(&sources()).await?;

    let missing = ArticleId::derive("https://news.test/missing", &Utc::now());
    let err = service.get_adapted_article(missing, AgeTier::Ages6To8).await.unwrap_err();
    assert!(matches!(err, PipelineError::ArticleNotFound { id } if id == missing));
    Ok(())
}

#[tokio::test]
async fn concurrent_refreshes_coalesce() -> Result<()> {
    init_tracing();
    let puller = Arc::new(standard_puller().with_delay(Duration::from_millis(100)));
    let service = service_with(puller.clone()).await;
    let list = sources();

    let (a, b) = tokio::join!(service.refresh_feeds(&list), service.refresh_feeds(&list));
    let (a, b) = (a?, b?);

    assert_eq!(puller.pulls(), list.len());
    assert_eq!(service.generation(), 1);
    assert_eq!(a.article_ids, b.article_ids);
    Ok(())
}

#[tokio::test]
async fn stale_store_refreshes_configured_sources_on_read() -> Result<()> {
    init_tracing();
    let mut config = test_config();
    config.sources.insert(
        "technology".to_string(),
        vec![FeedConfig {
            name: "Wired".to_string(),
            url: "https://news.test/wired/rss".to_string(),
        }],
    );
    let service = KnowledgeService::builder(config)
        .with_puller(Arc::new(standard_puller()))
        .with_embedder(Arc::new(HashingEmbedder::new(128)))
        .build()
        .await?;
    assert_eq!(service.configured_sources().len(), 1);
    assert_eq!(service.generation(), 0);

    let articles = service.articles(None).await?;
    assert_eq!(service.generation(), 1);
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].title, "Town powers homes with wind");

    // Fresh store: a second read does not refresh again.
    service.articles(None).await?;
    assert_eq!(service.generation(), 1);
    Ok(())
}

#[tokio::test]
async fn embedding_failures_leave_articles_readable() -> Result<()> {
    init_tracing();
    let service = KnowledgeService::builder(test_config())
        .with_puller(Arc::new(standard_puller()))
        .with_embedder(Arc::new(BrokenEmbedder))
        .build()
        .await?;

    let summary = service.refresh_feeds(&sources()).await?;
    assert!(service.index().is_empty().await);

    let id = summary.article_ids[0];
    let adapted = service.get_adapted_article(id, AgeTier::Ages6To8).await?;
    assert!(!adapted.paragraphs.is_empty());
    Ok(())
}

#[tokio::test]
async fn dimension_mismatch_fails_the_refresh() {
    init_tracing();
    let service = KnowledgeService::builder(test_config())
        .with_puller(Arc::new(standard_puller()))
        .with_embedder(Arc::new(InconsistentEmbedder))
        .build()
        .await
        .unwrap();

    let err = service.refresh_feeds(&sources()).await.unwrap_err();
    assert!(matches!(err, PipelineError::IndexDimensionMismatch { .. }));
}

#[tokio::test]
async fn llm_rewrites_are_kept_only_inside_the_tier_window() -> Result<()> {
    init_tracing();
    let completer = Arc::new(MockCompleter::new("mock").with_default("Title: Ice on the Moon\n\nThe Moon has ice. It is cold."));
    let service = KnowledgeService::builder(test_config())
        .with_puller(Arc::new(standard_puller()))
        .with_embedder(Arc::new(HashingEmbedder::new(128)))
        .with_completer(completer.clone())
        .build()
        .await?;
    service.refresh_feeds(&sources()).await?;
    let article = find(&service, "Ice at the lunar pole").await;

    let young = service.get_adapted_article(article.id, AgeTier::Ages6To8).await?;
    assert!(young.llm_assisted);
    assert_eq!(young.title, "Ice on the Moon");

    // Seven words is simpler than the youngest rule-based text allows for 9-11.
    let middle = service.get_adapted_article(article.id, AgeTier::Ages9To11).await?;
    assert!(!middle.llm_assisted);
    assert!(young.word_count() <= middle.word_count());

    let prompts = completer.prompts();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[0].contains("Ice at the lunar pole"));

    // Older tiers never reach the model.
    service.get_adapted_article(article.id, AgeTier::Ages15To17).await?;
    assert_eq!(completer.prompts().len(), 2);
    Ok(())
}

#[tokio::test]
async fn persisted_vectors_survive_restart() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let config = AppConfig {
        vector_store_path: Some(dir.path().join("vectors.db")),
        ..test_config()
    };

    let first = KnowledgeService::builder(config.clone())
        .with_puller(Arc::new(standard_puller()))
        .build()
        .await?;
    let summary = first.refresh_feeds(&sources()).await?;
    assert_eq!(first.index().len().await, summary.article_count);

    let second = KnowledgeService::builder(config)
        .with_puller(Arc::new(FakePuller::new()))
        .build()
        .await?;
    assert_eq!(second.index().len().await, summary.article_count);
    assert_eq!(second.index().model_name(), "hashing-128");
    Ok(())
}

#[tokio::test]
async fn topic_search_ranks_the_matching_story_first() -> Result<()> {
    init_tracing();
    let service = service_with(Arc::new(standard_puller())).await;
    service.refresh_feeds(&sources()).await?;
    let wind = find(&service, "Town powers homes with wind").await;

    let results = service.search_articles(Some("wind turbines"), AgeTier::Ages9To11, 1).await?;
    assert_eq!(results.len(), 1);
    let (adapted, questions) = &results[0];
    assert_eq!(adapted.article_id, wind.id);
    assert_eq!(questions.len(), 3);

    // Served from the same caches as the single-article reads.
    assert_eq!(adapted, &service.get_adapted_article(wind.id, AgeTier::Ages9To11).await?);
    let ids: Vec<QuestionId> = service.get_questions(wind.id, AgeTier::Ages9To11).await?.iter().map(|q| q.id).collect();
    assert_eq!(ids, questions.iter().map(|q| q.id).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn general_search_is_bounded_by_count() -> Result<()> {
    init_tracing();
    let service = service_with(Arc::new(standard_puller())).await;
    let summary = service.refresh_feeds(&sources()).await?;

    assert_eq!(service.search_articles(None, AgeTier::Ages12To14, 2).await?.len(), 2);
    assert_eq!(
        service.search_articles(Some("  "), AgeTier::Ages12To14, 50).await?.len(),
        summary.article_count
    );
    assert!(service.search_articles(Some("wind"), AgeTier::Ages12To14, 0).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn search_without_an_index_serves_the_working_set() -> Result<()> {
    init_tracing();
    let service = KnowledgeService::builder(test_config())
        .with_puller(Arc::new(standard_puller()))
        .with_embedder(Arc::new(BrokenEmbedder))
        .build()
        .await?;
    service.refresh_feeds(&sources()).await?;

    let results = service.search_articles(Some("moon ice"), AgeTier::Ages6To8, 2).await?;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|(adapted, questions)| !adapted.paragraphs.is_empty() && questions.len() == 3));
    Ok(())
}

/// Serves the lunar story, revised on every pull after the first. Other sources fail.
struct RevisingPuller {
    pulls: AtomicUsize,
}

#[async_trait]
impl PullFeed for RevisingPuller {
    async fn pull(&self, source: &SourceSpec) -> Result<Vec<ParsedEntry>> {
        if source.name != "LunarWire" {
            return Err(PipelineError::Parse(format!("no script for {}", source.name)));
        }
        Ok(match self.pulls.fetch_add(1, Ordering::SeqCst) {
            0 => vec![entry("lunar", "moon-ice", "Ice at the lunar pole", MOON, 3)],
            _ => vec![entry("lunar", "moon-ice", "Rovers map frozen craters", MOON_REVISED, 3)],
        })
    }
}

const MOON_REVISED: &str = "<p>Rovers mapped 7 frozen craters near the Moon's north pole in 2031. Each crater \
                            holds enough ice to fill a small lake.</p><p>Mission planners now want to land \
                            a base right beside the largest crater.</p>";

#[tokio::test]
async fn reads_racing_a_refresh_do_not_cache_the_replaced_article() -> Result<()> {
    init_tracing();
    let service = Arc::new(
        KnowledgeService::builder(test_config())
            .with_puller(Arc::new(RevisingPuller { pulls: AtomicUsize::new(0) }))
            .with_embedder(Arc::new(HashingEmbedder::new(128)))
            .with_completer(Arc::new(MockCompleter::new("slow").with_delay(150)))
            .build()
            .await?,
    );
    service.refresh_feeds(&sources()).await?;
    let id = find(&service, "Ice at the lunar pole").await.id;

    // The slow completer holds this read open while the story is replaced underneath it.
    let stale_read = {
        let service = service.clone();
        tokio::spawn(async move { service.get_questions(id, AgeTier::Ages6To8).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    service.refresh_feeds(&sources()).await?;
    let stale = stale_read.await.expect("read task")?;

    let adapted = service.get_adapted_article(id, AgeTier::Ages6To8).await?;
    assert!(adapted.paragraphs.join(" ").contains("Rovers"), "{:?}", adapted.paragraphs);
    let fresh = service.get_questions(id, AgeTier::Ages6To8).await?;
    assert_ne!(fresh, stale);
    Ok(())
}
