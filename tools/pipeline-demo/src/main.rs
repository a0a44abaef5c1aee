//! CLI for pipeline-demo: pick a pipeline, stream its progress, print the result.
//!
//! Loads config via `pipeline_demo::Config`; `--offline` runs on the scripted
//! generator.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use stagegraph::{HistoryChat, InMemoryHistory, SessionHistory};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pipeline_demo::render::{final_artifact, retry_hint, step_lines, unreviewed_note};
use pipeline_demo::support::SupportDesk;
use pipeline_demo::weather::{self, WeatherDesk};
use pipeline_demo::{content, drive, llm_for, prompts, require_topic, research, Config, Overrides};

/// Tutor input that forgets the conversation so far.
const RESET_COMMAND: &str = "/reset";

#[derive(Parser)]
#[command(name = "pipeline-demo")]
#[command(about = "Run revising LLM pipelines: research, content, support, weather, tutor")]
struct Args {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan, research, analyze, write and review a report
    Research {
        /// Research topic
        topic: String,
    },
    /// Write an article, check and optimize it, adapt it per platform
    Content {
        topic: String,

        /// professional, casual or humorous
        #[arg(long, default_value = "professional")]
        style: String,
    },
    /// Customer-service desk; reads messages from stdin when none are given
    Support {
        /// Customer messages, answered in order
        messages: Vec<String>,
    },
    /// Punny weather assistant with tool lookups and conversation memory
    Weather {
        /// Messages, answered in order; reads stdin when none are given
        messages: Vec<String>,

        /// User id for the location lookup ("1" lives in Florida)
        #[arg(long, default_value = weather::DEFAULT_USER_ID)]
        user_id: String,
    },
    /// Tutor chat with session history and streamed replies; `/reset` forgets
    /// the conversation
    Tutor {
        /// Questions, answered in order; reads stdin when none are given
        questions: Vec<String>,
    },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "pipeline_demo=info,stagegraph=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_step(step: &stagegraph::StepUpdate) {
    step_lines(step).iter().for_each(|line| println!("{line}"));
}

/// Inputs from the command line, or stdin lines when there are none.
async fn inputs(args: Vec<String>) -> Result<Vec<String>> {
    if !args.is_empty() {
        return Ok(args);
    }
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = Vec::new();
    while let Some(line) = lines.next_line().await.context("read stdin")? {
        if !line.trim().is_empty() {
            out.push(line);
        }
    }
    Ok(out)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();

    let cfg = Config::from_env_and_args(&args.overrides)?;
    let llm = llm_for(&cfg);
    info!(backend = cfg.backend.label(), max_steps = cfg.max_steps, "configured");

    match args.command {
        Command::Research { topic } => {
            let topic = require_topic(&topic)?;
            let pipeline = research::build(llm, &cfg)?;
            let state = drive(&pipeline, research::initial_state(topic), print_step).await;
            println!();
            println!(
                "{}",
                final_artifact(&state, research::fields::FINAL_REPORT, "report")
            );
        }
        Command::Content { topic, style } => {
            let topic = require_topic(&topic)?;
            let pipeline = content::build(llm, &cfg)?;
            let state = drive(&pipeline, content::initial_state(topic, &style), print_step).await;
            println!();
            match state.get_as::<content::PlatformVersions>(content::fields::PLATFORM_VERSIONS) {
                Some(v) => {
                    println!(
                        "== WeChat: {}\n{}\n\n{}\n",
                        v.wechat.title, v.wechat.summary, v.wechat.content
                    );
                    println!("== Weibo: {}\n{}\n", v.weibo.title, v.weibo.content);
                    println!(
                        "== Xiaohongshu: {}\n{}",
                        v.xiaohongshu.title, v.xiaohongshu.content
                    );
                    if let Some(note) = unreviewed_note(&state) {
                        println!("\n{note}");
                    }
                }
                None => println!("{}", retry_hint("article")),
            }
        }
        Command::Support { messages } => {
            let history: Arc<dyn SessionHistory> = Arc::new(InMemoryHistory::new());
            let desk = SupportDesk::new(llm, history, &cfg)?;
            for message in inputs(messages).await? {
                let reply = desk.handle(&cfg.session_id, &message).await?;
                println!("> {message}");
                println!("[{}] {}", reply.intent, reply.response);
                for line in &reply.debug_info {
                    println!("   · {line}");
                }
                println!();
            }
        }
        Command::Weather { messages, user_id } => {
            let history: Arc<dyn SessionHistory> = Arc::new(InMemoryHistory::new());
            let desk = WeatherDesk::new(llm, history, &cfg)?;
            for message in inputs(messages).await? {
                let turn = desk.handle(&cfg.session_id, &user_id, &message).await?;
                println!("> {message}");
                println!("{}", turn.reply.punny_response);
                if let Some(conditions) = &turn.reply.weather_conditions {
                    println!("   conditions: {conditions}");
                }
                for line in &turn.debug_info {
                    println!("   · {line}");
                }
                println!();
            }
        }
        Command::Tutor { questions } => {
            let chat = HistoryChat::new(llm, Arc::new(InMemoryHistory::new()), prompts::TUTOR)
                .with_temperature(cfg.writer_temperature)
                .with_history_limit(20);
            for question in inputs(questions).await? {
                if question.trim() == RESET_COMMAND {
                    chat.reset(&cfg.session_id).await?;
                    println!("(conversation cleared)\n");
                    continue;
                }
                println!("> {question}");
                let (mut thought, mut said) = (0, 0);
                let mut replies = chat.reply_stream(&cfg.session_id, &question);
                while let Some(partial) = replies.next().await {
                    let partial = partial?;
                    if partial.reasoning.len() > thought {
                        if thought == 0 {
                            print!("[thinking] ");
                        }
                        print!("{}", &partial.reasoning[thought..]);
                        thought = partial.reasoning.len();
                    }
                    if partial.answer.len() > said {
                        if said == 0 && thought > 0 {
                            println!("\n");
                        }
                        print!("{}", &partial.answer[said..]);
                        said = partial.answer.len();
                    }
                    std::io::stdout().flush().ok();
                }
                println!("\n");
            }
        }
    }
    Ok(())
}
