use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use quill::cli::Cli;
use quill::config;
use quill::knowledge::MemoryKnowledge;
use quill::orchestration::TaskSupervisor;
use quill::provider::ProviderClient;
use quill::session::ChatSession;
use quill::tools::ToolRegistry;
use quill::watch::WatchService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli)?;
    tracing::debug!(provider = %config.provider.name, model = %config.provider.model_name, "Config loaded");

    let supervisor = TaskSupervisor::new(CancellationToken::new());
    let knowledge = Arc::new(MemoryKnowledge::new());
    let cwd = std::env::current_dir()?;
    let watch = WatchService::new(knowledge.clone(), cwd.clone());
    let registry = ToolRegistry::new(
        supervisor.clone(),
        watch,
        knowledge,
        config.provider.clone(),
        Duration::from_secs(config.command_timeout_secs),
        &cwd,
    );

    let client = ProviderClient::new(config.provider.clone())?;
    let mut session = ChatSession::new(client, registry, &config.provider.system_prompt);

    // Ctrl-C shuts down all supervised tasks before exit. The bounded joins
    // in shutdown_all let the command monitors SIGKILL their process groups
    // so no background children outlive us.
    let shutdown_supervisor = supervisor.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown_supervisor.shutdown_all().await;
            std::process::exit(130);
        }
    });

    let result = if cli.query.is_empty() {
        run_interactive(&mut session, config.stream_responses).await
    } else {
        let query = cli.query.join(" ");
        run_query(&mut session, &query, config.stream_responses).await
    };

    supervisor.shutdown_all().await;
    result
}

/// Run one query and print the answer.
///
/// Streaming backends print incrementally through the callback; the
/// tool-calling path never invokes it, so the answer is printed whole.
async fn run_query(
    session: &mut ChatSession,
    query: &str,
    stream: bool,
) -> anyhow::Result<()> {
    if !stream {
        let answer = session.query(query, None).await?;
        println!("{answer}");
        return Ok(());
    }

    let printed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let printer = {
        let printed = printed.clone();
        move |accumulated: &str| {
            let already = printed.swap(accumulated.len(), std::sync::atomic::Ordering::SeqCst);
            if accumulated.len() > already {
                print!("{}", &accumulated[already..]);
                let _ = std::io::stdout().flush();
            }
        }
    };
    let answer = session.query(query, Some(&printer)).await?;

    if printed.load(std::sync::atomic::Ordering::SeqCst) == 0 {
        println!("{answer}");
    } else {
        println!();
    }
    Ok(())
}

/// Read-eval-print loop on stdin. `exit`/`quit` leave, `clear` resets the
/// conversation.
async fn run_interactive(session: &mut ChatSession, stream: bool) -> anyhow::Result<()> {
    println!("quill ({}). Type 'exit' to quit, 'clear' to reset.", session.model_name());

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        match line {
            "" => continue,
            "exit" | "quit" => break,
            "clear" => {
                session.clear();
                println!("Conversation cleared.");
                continue;
            }
            query => {
                if let Err(e) = run_query(session, query, stream).await {
                    eprintln!("Error: {e}");
                }
            }
        }
    }

    Ok(())
}

