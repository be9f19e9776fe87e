use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use uuid::Uuid;

use dx_discuss::config::{AppConfig, DEFAULT_CONFIG_FILE, DEFAULT_CONFIG_TOML};
use dx_discuss::directory::DirectorySeed;
use dx_discuss::model::{Discussion, DiscussionFilter, DiscussionKind, DiscussionSummary};
use dx_discuss::{logging, server, storage, Deadline};

const CLI_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "discuss")]
#[command(about = "Course-scoped discussions: threads, messages, reactions and presence", version)]
struct Cli {
    /// Config file (defaults to ./discuss.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, schema, config file and an empty directory seed
    Init {
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
    },

    /// Start the HTTP API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List active discussions of a course
    List {
        course: String,

        #[arg(long)]
        lesson: Option<String>,

        /// general, question or announcement
        #[arg(long = "type")]
        kind: Option<DiscussionKind>,

        #[arg(long, default_value = "1")]
        page: i64,

        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Show a discussion with its messages
    Show { discussion: Uuid },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Serve { port: None });

    match command {
        Commands::Init { path } => init(&path).await,
        command => run(command, cli.config.as_deref()).await,
    }
}

async fn run(command: Commands, config_path: Option<&Path>) -> Result<()> {
    let mut config = AppConfig::load(config_path)?;
    let _guard = logging::init(&config.logging)?;

    match command {
        Commands::Init { path } => init(&path).await?,

        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            println!(
                "{}",
                format!("🌐 Starting discussion server on port {}...", config.server.port)
                    .cyan()
                    .bold()
            );
            server::start(&config).await?;
        }

        Commands::List {
            course,
            lesson,
            kind,
            page,
            limit,
        } => {
            let state = server::build_state(&config)?;
            let filter = DiscussionFilter {
                lesson_id: lesson,
                kind,
            };
            let page = state
                .service
                .list_discussions(&course, filter, page, limit, Deadline::after(CLI_TIMEOUT))
                .await?;

            println!(
                "{} {} discussions in {} (page {}/{})\n",
                "📜".bright_white(),
                page.total,
                course.bright_white(),
                page.current_page,
                page.total_pages
            );
            for summary in &page.items {
                print_summary(summary);
            }
        }

        Commands::Show { discussion } => {
            let state = server::build_state(&config)?;
            let discussion = state
                .service
                .get_discussion(discussion, None, Deadline::after(CLI_TIMEOUT))
                .await?;
            print_discussion(&discussion);
        }
    }

    Ok(())
}

async fn init(path: &Path) -> Result<()> {
    println!("{}", "🚀 Initializing discussion store...".cyan().bold());

    let config_path = path.join(DEFAULT_CONFIG_FILE);
    if !config_path.exists() {
        tokio::fs::create_dir_all(path).await?;
        tokio::fs::write(&config_path, DEFAULT_CONFIG_TOML)
            .await
            .with_context(|| format!("failed to write {}", config_path.display()))?;
    }

    let config = AppConfig::from_file(&config_path)?;
    let data_dir = path.join(&config.storage.data_dir);
    storage::init(&data_dir).await?;

    if let Some(seed_path) = &config.directory.path {
        let seed_path = path.join(seed_path);
        if !seed_path.exists() {
            let seed = serde_json::to_string_pretty(&DirectorySeed::default())?;
            tokio::fs::write(&seed_path, seed)
                .await
                .with_context(|| format!("failed to write {}", seed_path.display()))?;
        }
    }

    println!("{}", "✓ Discussion store initialized successfully!".green());
    println!("\n{}", "Next steps:".yellow());
    println!(
        "  1. {} - Add courses and users",
        "edit .dx/discuss/directory.json".bright_white()
    );
    println!("  2. {} - Start the API", "discuss serve".bright_white());
    println!(
        "  3. {} - Browse a course",
        "discuss list <course-id>".bright_white()
    );
    Ok(())
}

fn print_summary(summary: &DiscussionSummary) {
    let pin = if summary.is_pinned { "📌 " } else { "" };
    println!(
        "{}{} {} [{}]",
        pin,
        summary.id.to_string()[..8].bright_yellow(),
        summary.title.bright_white(),
        summary.kind.as_str().cyan()
    );
    println!(
        "  {} messages, {} participants, last activity {}",
        summary.message_count,
        summary.participant_count,
        summary
            .last_activity
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .bright_black()
    );
}

fn print_discussion(discussion: &Discussion) {
    println!(
        "{} {} [{}]",
        discussion.id.to_string().bright_yellow(),
        discussion.title.bright_white().bold(),
        discussion.kind.as_str().cyan()
    );
    if !discussion.description.is_empty() {
        println!("  {}", discussion.description);
    }
    let author = discussion
        .creator
        .as_ref()
        .map(|c| c.username.as_str())
        .unwrap_or(&discussion.created_by);
    println!(
        "  by {} in {}{}",
        author.green(),
        discussion.course_id,
        discussion
            .lesson_id
            .as_ref()
            .map(|l| format!(" / {l}"))
            .unwrap_or_default()
    );
    println!(
        "  {} messages, {} participants\n",
        discussion.message_count,
        discussion.participants.len()
    );

    for message in &discussion.messages {
        let author = message
            .author
            .as_ref()
            .map(|a| a.username.as_str())
            .unwrap_or(&message.user);
        println!(
            "{} {}",
            message
                .timestamp
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
                .bright_black(),
            author.green()
        );
        match (&message.file_name, &message.file_url) {
            (Some(name), Some(url)) => println!("  📎 {} ({})", name, url.bright_blue()),
            _ => println!("  {}", message.content),
        }
        if !message.reactions.is_empty() {
            let emojis: Vec<&str> = message.reactions.iter().map(|r| r.emoji.as_str()).collect();
            println!("  {}", emojis.join(" "));
        }
    }
}
