use anyhow::Context;
use clap::{Parser, Subcommand};
use news_pipeline::{AgeTier, AppConfig, ArticleId, Category, KnowledgeService, LearningSession, SubmissionStatus};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "news-pipeline", about = "Age-adapted news articles with comprehension questions")]
struct Cli {
    /// Configuration file (defaults to knowledge.toml in the working directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch every configured source and print the per-source status
    Refresh,
    /// List articles in the working set
    List {
        #[arg(long)]
        category: Option<Category>,
    },
    /// Print an article adapted for an age tier
    Read {
        id: ArticleId,
        #[arg(long, default_value = "9-11")]
        age: AgeTier,
    },
    /// Find stories on a topic (or a general science selection) with their questions
    Search {
        topic: Option<String>,
        #[arg(long, default_value = "9-11")]
        age: AgeTier,
        #[arg(long, default_value_t = 3)]
        count: usize,
    },
    /// Answer the article's questions interactively
    Quiz {
        id: ArticleId,
        #[arg(long, default_value = "9-11")]
        age: AgeTier,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    }
    .context("loading configuration")?;

    let service = KnowledgeService::from_config(config)
        .await
        .context("starting knowledge service")?;

    match cli.command {
        Command::Refresh => {
            let summary = service.refresh_configured().await?;
            println!("{} articles", summary.article_count);
            for (source, failed) in &summary.failures {
                println!("  {:<24} {}", source, if *failed { "FAILED (fallback used)" } else { "ok" });
            }
        }
        Command::List { category } => {
            for article in service.articles(category).await? {
                let marker = if article.is_fallback { " [fallback]" } else { "" };
                println!("{}  {:<11} {}{}", article.id, article.category, article.title, marker);
            }
        }
        Command::Read { id, age } => {
            let adapted = service.get_adapted_article(id, age).await?;
            println!("{}\n", adapted.title);
            for paragraph in &adapted.paragraphs {
                println!("{}\n", paragraph);
            }
        }
        Command::Search { topic, age, count } => {
            for (adapted, questions) in service.search_articles(topic.as_deref(), age, count).await? {
                println!("{}  {}", adapted.article_id, adapted.title);
                for question in &questions {
                    println!("    [{}] {}", question.subject, question.prompt);
                }
            }
        }
        Command::Quiz { id, age } => quiz(&service, id, age).await?,
    }

    Ok(())
}

async fn quiz(service: &KnowledgeService, id: ArticleId, age: AgeTier) -> anyhow::Result<()> {
    let questions = service.get_questions(id, age).await?;
    let mut session = LearningSession::new();
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    for question in &questions {
        println!("\n[{}] {}", question.subject, question.prompt);
        for (i, option) in question.options.iter().enumerate() {
            println!("  {}. {}", i + 1, option);
        }

        loop {
            print!("> ");
            io::stdout().flush()?;
            let Some(line) = lines.next() else {
                return Ok(());
            };
            let line = line?;
            // Accept either the option number or the answer text.
            let answer = line
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|n| question.options.get(n).cloned())
                .unwrap_or(line);

            let outcome = service.submit_answer(&mut session, question.id, &answer).await;
            if outcome.status != SubmissionStatus::Accepted {
                break;
            }
            match (outcome.correct, outcome.points_awarded) {
                (true, points) => println!("Correct! +{} points. {}", points, outcome.feedback),
                (false, 0) => println!("Not quite. Hint: {}", outcome.feedback),
                (false, points) => println!(
                    "The answer was {}. {} (+{} points for trying)",
                    outcome.correct_answer.unwrap_or_default(),
                    outcome.feedback,
                    points
                ),
            }
            for achievement in &outcome.new_achievements {
                println!("Achievement unlocked: {}", achievement.title());
            }
            if outcome.state == news_pipeline::AnswerState::Resolved {
                break;
            }
        }
    }

    let quest = session.daily_quest();
    info!("Quiz finished for {}", id);
    println!(
        "\nScore: {}  Answered: {}  Daily quest: {}/{}",
        session.total_score(),
        session.questions_answered(),
        quest.progress.min(quest.target),
        quest.target
    );
    Ok(())
}
