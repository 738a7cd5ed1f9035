// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Crew main entry point - CLI and command dispatch.

use std::collections::HashSet;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::Colorize;

use crew::config;
use crew::context::{context_percentage, rollover, trim_transcript};
use crew::issue::{parse_github_url, parse_issue_arg, parse_jira_key};
use crew::prompt::generate_worker_prompt;
use crew::store::{NewCompletion, NewWorker, WorkStore};

/// Crew - coordination for fleets of AI coding workers.
#[derive(Parser)]
#[command(name = "crew")]
#[command(author, version, about = "Coordinate AI coding workers against a shared store", long_about = None)]
struct Cli {
    /// Directory holding the shared database (overrides config)
    #[arg(long, env = "CREW_BASE", global = true)]
    base: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Subcommands for crew.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the shared database and a starter config file
    Init,

    /// Register this process as a worker (upserts on repo + branch)
    Register {
        /// Absolute path to the main repository
        #[arg(long)]
        repo_path: PathBuf,

        /// Branch this worker owns
        #[arg(long)]
        branch: String,

        /// Worktree directory the worker operates in
        #[arg(long)]
        worktree: PathBuf,

        /// Issue reference: number, repo:number, GitHub URL, or JIRA key
        #[arg(long)]
        issue: Option<String>,

        /// Short repository name (defaults to the repo directory name)
        #[arg(long)]
        repo_name: Option<String>,

        /// Worker process id (defaults to this process)
        #[arg(long)]
        pid: Option<i64>,
    },

    /// Update a worker's status (and optionally its phase)
    Status {
        worker_id: i64,
        status: String,
        #[arg(long)]
        phase: Option<String>,
    },

    /// Update a worker's activity stage
    Stage { worker_id: i64, stage: String },

    /// Record a worker's pull request
    Pr {
        worker_id: i64,
        number: i64,
        url: String,
    },

    /// Append an audit event for a worker
    Event {
        worker_id: i64,
        event_type: String,
        message: String,
    },

    /// Queue a message for a worker
    Send {
        worker_id: i64,
        message_type: String,
        payload: String,
    },

    /// Read a worker's unread messages
    Messages {
        worker_id: i64,
        /// Leave messages unread instead of marking them consumed
        #[arg(long)]
        peek: bool,
        /// Emit JSON instead of human-readable output
        #[arg(long)]
        json: bool,
    },

    /// Record a worker's completion and mark it done
    Done {
        worker_id: i64,
        #[arg(long)]
        summary: String,
        #[arg(long, default_value = "")]
        files_changed: String,
        #[arg(long, default_value = "")]
        tests_added: String,
        #[arg(long)]
        pr_url: Option<String>,
        #[arg(long)]
        merged: bool,
        #[arg(long, default_value = "")]
        follow_up_issues: String,
        #[arg(long, default_value = "")]
        lessons_learned: String,
    },

    /// Find the worker handling an issue
    Lookup {
        /// Issue reference: number, repo:number, GitHub URL, or JIRA key
        issue: String,
        #[arg(long)]
        repo: Option<String>,
    },

    /// Report context utilization for a transcript
    Context { transcript: PathBuf },

    /// Trim oversized tool outputs out of a transcript
    Trim {
        input: PathBuf,
        output: PathBuf,
        /// Character threshold (defaults to the configured value)
        #[arg(long)]
        threshold: Option<usize>,
        /// Tool names to trim (defaults to the configured set)
        #[arg(long)]
        tool: Vec<String>,
    },

    /// Close a context-exhausted session and print the hand-off prompt
    Rollover {
        worker_id: i64,
        /// Session id of the exhausted run
        #[arg(long)]
        from: String,
        /// Session id of the successor run
        #[arg(long)]
        to: String,
        #[arg(long)]
        summary: String,
        /// Transcript of the exhausted run
        #[arg(long)]
        transcript: PathBuf,
        #[arg(long)]
        issue: Option<String>,
    },

    /// List a worker's sessions
    Sessions {
        worker_id: i64,
        #[arg(long)]
        json: bool,
    },

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print the opening prompt for a new worker
    Prompt {
        task_ref: String,
        #[arg(long)]
        jira: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the resolved configuration
    Show,
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let workspace_root = std::env::current_dir()?;
    let config = config::resolve_config(&workspace_root);
    let base = cli.base.unwrap_or_else(|| config.worktree_base.clone());

    match cli.command {
        Commands::Init => {
            std::fs::create_dir_all(&base)?;
            let store = WorkStore::open(&base)?;
            let config_path = config::init_config(&workspace_root, None)?;
            println!(
                "{} store at {}, config at {}",
                "initialized".green(),
                store.path().display(),
                config_path.display()
            );
        }

        Commands::Register {
            repo_path,
            branch,
            worktree,
            issue,
            repo_name,
            pid,
        } => {
            let repo_name = repo_name.unwrap_or_else(|| {
                repo_path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default()
            });

            let mut new = NewWorker {
                repo_path: repo_path.to_string_lossy().to_string(),
                repo_name,
                branch,
                worktree_path: worktree.to_string_lossy().to_string(),
                pid: pid.unwrap_or_else(|| std::process::id() as i64),
                ..Default::default()
            };
            if let Some(issue) = issue {
                apply_issue_ref(&mut new, &issue);
            }

            let store = WorkStore::open(&base)?;
            let worker_id = store.register_worker(&new)?;
            println!("{} worker {}", "registered".green(), worker_id);
        }

        Commands::Status {
            worker_id,
            status,
            phase,
        } => {
            let store = WorkStore::open(&base)?;
            store.update_status(worker_id, &status, phase.as_deref())?;
            println!("{} worker {} -> {}", "status".green(), worker_id, status);
        }

        Commands::Stage { worker_id, stage } => {
            let store = WorkStore::open(&base)?;
            store.update_stage(worker_id, &stage)?;
            println!("{} worker {} -> {}", "stage".green(), worker_id, stage);
        }

        Commands::Pr {
            worker_id,
            number,
            url,
        } => {
            let store = WorkStore::open(&base)?;
            store.update_pr(worker_id, number, &url)?;
            println!("{} worker {} -> PR #{}", "pr".green(), worker_id, number);
        }

        Commands::Event {
            worker_id,
            event_type,
            message,
        } => {
            let store = WorkStore::open(&base)?;
            store.log_event(worker_id, &event_type, &message)?;
        }

        Commands::Send {
            worker_id,
            message_type,
            payload,
        } => {
            let store = WorkStore::open(&base)?;
            store.send_message(worker_id, &message_type, &payload)?;
            println!("{} message for worker {}", "queued".green(), worker_id);
        }

        Commands::Messages {
            worker_id,
            peek,
            json,
        } => {
            let store = WorkStore::open(&base)?;
            let messages = store.receive_messages(worker_id, !peek)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&messages)?);
            } else if messages.is_empty() {
                println!("no unread messages");
            } else {
                for msg in &messages {
                    println!(
                        "{} [{}] {}",
                        msg.created_at.dimmed(),
                        msg.message_type.cyan(),
                        msg.payload
                    );
                }
            }
        }

        Commands::Done {
            worker_id,
            summary,
            files_changed,
            tests_added,
            pr_url,
            merged,
            follow_up_issues,
            lessons_learned,
        } => {
            let store = WorkStore::open(&base)?;
            store.store_completion(
                worker_id,
                &NewCompletion {
                    summary,
                    files_changed,
                    tests_added,
                    pr_url,
                    merged,
                    follow_up_issues,
                    lessons_learned,
                },
            )?;
            println!("{} worker {}", "completed".green(), worker_id);
        }

        Commands::Lookup { issue, repo } => {
            let store = WorkStore::open(&base)?;
            let (mut issue_ref, parsed_repo) = parse_issue_arg(&issue);
            let mut repo = repo.or(parsed_repo);
            if let Some(parsed) = parse_github_url(&issue_ref) {
                issue_ref = parsed.number.to_string();
                repo = repo.or(Some(parsed.repo));
            } else if let Some(key) = parse_jira_key(&issue_ref) {
                issue_ref = key;
            }
            match store.find_worker_by_issue(&issue_ref, repo.as_deref())? {
                Some(worker_id) => println!("{}", worker_id),
                None => {
                    println!("{}", "no worker found".yellow());
                }
            }
        }

        Commands::Context { transcript } => match context_percentage(&transcript) {
            Some(pct) => println!("{}%", pct),
            None => println!("{}", "no usage reported".yellow()),
        },

        Commands::Trim {
            input,
            output,
            threshold,
            tool,
        } => {
            let threshold = threshold.unwrap_or(config.trim_threshold);
            let tools: HashSet<String> = if tool.is_empty() {
                config.trim_target_tools.iter().cloned().collect()
            } else {
                tool.into_iter().collect()
            };
            let stats = trim_transcript(&input, &output, threshold, &tools)?;
            println!(
                "{} {} outputs, {} -> {} chars",
                "trimmed".green(),
                stats.trimmed_count,
                stats.original_chars,
                stats.trimmed_chars
            );
        }

        Commands::Rollover {
            worker_id,
            from,
            to,
            summary,
            transcript,
            issue,
        } => {
            let store = WorkStore::open(&base)?;
            let result = rollover(
                &store,
                worker_id,
                &from,
                &to,
                &summary,
                &transcript,
                issue.as_deref(),
            )?;
            eprintln!(
                "{} session {} for worker {}",
                "started".green(),
                result.session_number,
                worker_id
            );
            println!("{}", result.prompt);
        }

        Commands::Sessions { worker_id, json } => {
            let store = WorkStore::open(&base)?;
            let sessions = store.sessions_for_worker(worker_id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sessions)?);
            } else if sessions.is_empty() {
                println!("no sessions");
            } else {
                for session in &sessions {
                    let state = if session.is_open() {
                        "open".green().to_string()
                    } else {
                        session
                            .end_reason
                            .clone()
                            .unwrap_or_else(|| "closed".to_string())
                    };
                    println!(
                        "#{} {} started {} [{}]",
                        session.session_number,
                        session.session_id.cyan(),
                        session.started_at.dimmed(),
                        state
                    );
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        },

        Commands::Prompt { task_ref, jira } => {
            let jira_key = jira.or_else(|| parse_jira_key(&task_ref));
            println!(
                "{}",
                generate_worker_prompt(&task_ref, jira_key.as_deref(), &config)
            );
        }
    }

    Ok(())
}

/// Fill issue fields on a registration from a raw issue reference.
fn apply_issue_ref(new: &mut NewWorker, issue: &str) {
    if let Some(parsed) = parse_github_url(issue) {
        new.issue_number = Some(parsed.number);
        new.issue_source = Some("github".to_string());
        return;
    }
    if let Some(key) = parse_jira_key(issue) {
        new.jira_key = Some(key);
        new.issue_source = Some("jira".to_string());
        return;
    }
    let (issue_ref, _repo) = parse_issue_arg(issue);
    if let Ok(number) = issue_ref.parse::<i64>() {
        new.issue_number = Some(number);
        new.issue_source = Some("github".to_string());
    }
}

fn init_tracing() {
    // Only initialize if trace or debug is enabled
    if std::env::var("RUST_LOG").is_ok() {
        // Let env var control logging
        tracing_subscriber::fmt::init();
    } else {
        // Default to WARN level
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .init();
    }
}
