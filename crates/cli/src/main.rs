use std::io::Read;
use std::time::Duration;

use clap::{Parser, Subcommand};
use htmlsplice_core::sim::{self, Resource, ScriptRun, SimHost};
use htmlsplice_core::{
    append_html, count_scripts, split_fragment, AppendOptions, AppendReport, Segment,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "htmlsplice",
    about = "Append HTML fragments with in-order script execution"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a fragment into markup and script segments
    Split {
        /// The HTML file to split (use - for stdin)
        file: String,

        /// Output as JSON instead of compact format
        #[arg(long)]
        json: bool,
    },
    /// Append a fragment into a simulated page and trace its scripts
    Run {
        /// The HTML file to append (use - for stdin)
        file: String,

        /// Per-script wait limit in milliseconds
        #[arg(long, default_value_t = 2000)]
        timeout: u64,

        /// How a script URL answers, as SRC=RULE with RULE one of
        /// load[:ms], fail[:ms] or hang (repeatable)
        #[arg(long = "resource", value_name = "SRC=RULE", value_parser = sim::parse_rule)]
        resources: Vec<(String, Resource)>,

        /// Rule for script URLs without a --resource entry
        #[arg(long, default_value = "hang")]
        fallback: Resource,

        /// Tag of the container element
        #[arg(long, default_value = "div")]
        container: String,

        /// Let async and timed-out fetches finish before printing
        #[arg(long)]
        drain: bool,

        /// Output as JSON instead of compact format
        #[arg(long)]
        json: bool,
    },
}

/// Everything `run` prints.
#[derive(Debug, Serialize)]
struct RunOutput {
    html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<AppendReport>,
    runs: Vec<ScriptRun>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

struct RunSettings {
    timeout: Duration,
    resources: Vec<(String, Resource)>,
    fallback: Resource,
    container: String,
    drain: bool,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Split { file, json } => {
            let html = read_input(&file);
            print_segments(&split_fragment(&html), json);
        }
        Commands::Run {
            file,
            timeout,
            resources,
            fallback,
            container,
            drain,
            json,
        } => {
            let html = read_input(&file);
            let settings = RunSettings {
                timeout: Duration::from_millis(timeout),
                resources,
                fallback,
                container,
                drain,
            };

            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };

            let output = runtime.block_on(simulate(&html, settings));
            print_run(&output, json);
            if output.error.is_some() {
                std::process::exit(1);
            }
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn read_input(file: &str) -> String {
    let result = if file == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).map(|_| buf)
    } else {
        std::fs::read_to_string(file)
    };

    match result {
        Ok(html) => html,
        Err(e) => {
            eprintln!("Error: failed to read {}: {}", file, e);
            std::process::exit(1);
        }
    }
}

async fn simulate(html: &str, settings: RunSettings) -> RunOutput {
    let mut host = SimHost::new().with_fallback(settings.fallback);
    for (src, resource) in settings.resources {
        host = host.with_resource(src, resource);
    }

    let container = match host.container(&settings.container) {
        Ok(container) => container,
        Err(e) => {
            return RunOutput {
                html: String::new(),
                report: None,
                runs: Vec::new(),
                error: Some(e.to_string()),
            };
        }
    };

    let options = AppendOptions {
        timeout: settings.timeout,
    };
    let result = append_html(&host, html, &container, &options).await;
    if settings.drain {
        let drained = host.drain().await;
        tracing::debug!(drained, "drained pending fetches");
    }

    let (report, error) = match result {
        Ok(report) => (Some(report), None),
        Err(e) => (None, Some(e.to_string())),
    };
    RunOutput {
        html: host.inner_html(container),
        report,
        runs: host.runs(),
        error,
    }
}

fn print_segments(segments: &[Segment<'_>], as_json: bool) {
    if as_json {
        match serde_json::to_string_pretty(segments) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error: {}", e),
        }
        return;
    }

    println!("{}", summary(segments));
    println!("---");
    for (index, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        let kind = if segment.is_script() { "script" } else { "markup" };
        println!("[{}] {} @{}: {}", index, kind, segment.offset, compact(segment.text));
    }
}

fn print_run(output: &RunOutput, as_json: bool) {
    if as_json {
        match serde_json::to_string_pretty(output) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error: {}", e),
        }
        return;
    }

    println!("{}", output.html);
    println!("---");
    for run in &output.runs {
        let what = match (&run.src, &run.source) {
            (Some(src), _) => src.clone(),
            (None, Some(source)) => format!("inline: {}", compact(source)),
            (None, None) => "inline".to_string(),
        };
        println!("#{} {:?} @{}ms {}", run.order, run.outcome, run.at_ms, what);
    }
    if let Some(report) = &output.report {
        println!("---");
        for script in &report.scripts {
            println!(
                "segment {}: {:?}{}",
                script.segment,
                script.wait,
                script
                    .src
                    .as_deref()
                    .map(|src| format!(" ({})", src))
                    .unwrap_or_default()
            );
        }
        println!("appended: {} nodes", report.nodes_appended);
    }
    if let Some(error) = &output.error {
        eprintln!("Error: {}", error);
    }
}

fn summary(segments: &[Segment<'_>]) -> String {
    format!(
        "segments: {} ({} scripts)",
        segments.len(),
        count_scripts(segments)
    )
}

/// Single-line preview of a segment.
fn compact(text: &str) -> String {
    const LIMIT: usize = 72;
    let line: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match line.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None => line,
    }
}
