use std::env;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use semdex_core::config::{Config, FailurePolicy};
use semdex_engine::{JobState, JobStatus, Preview, SearchPage, SearchRequest, Semdex};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: semdex [--json] <command> [args...]

Commands:
  dirs                                   list configured directories
  index <dir> [--slow-ms N] [--abort-on-error]
                                         reindex a directory, showing progress
  search <query> [--dir NAME]... [--page N] [--page-size N] [--max-distance D]
  preview <path>                         show a bounded preview of a file";

fn usage_exit() -> ! {
    eprintln!("{}", USAGE);
    std::process::exit(1)
}

fn value<T: std::str::FromStr>(args: &[String], i: usize, flag: &str) -> T {
    match args.get(i + 1).map(|v| v.parse::<T>()) {
        Some(Ok(v)) => v,
        _ => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let json = if let Some(pos) = args.iter().position(|a| a == "--json") { args.remove(pos); true } else { false };
    if args.is_empty() { usage_exit(); }
    let cmd = args.remove(0);

    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings = config.settings()?;
    let engine = Semdex::open(settings).await?;

    match cmd.as_str() {
        "dirs" => {
            let dirs = engine.directories();
            if json { println!("{}", serde_json::to_string_pretty(&dirs)?); return Ok(()); }
            for d in dirs {
                let chunks = chunks_label(engine.indexed_chunks(&d.name).await);
                println!("{:<16} {}{}  ({})", d.name, d.root.display(), if d.exists { "" } else { "  [missing]" }, chunks);
            }
        }
        "index" => {
            let mut options = engine.jobs().default_options();
            let mut directory = None;
            let mut i = 0;
            while i < args.len() {
                match args[i].as_str() {
                    "--slow-ms" => { options.slow_ms = value(&args, i, "--slow-ms"); i += 1; }
                    "--abort-on-error" => options.failure_policy = FailurePolicy::Abort,
                    a if !a.starts_with('-') => directory = Some(a.to_string()),
                    other => { eprintln!("Unknown flag: {}", other); usage_exit(); }
                }
                i += 1;
            }
            let directory = directory.unwrap_or_else(|| usage_exit());
            let job_id = engine.start_reindex(&directory, Some(options))?;
            let status = if json { engine.wait(&job_id).await? } else { follow(&engine, &job_id).await? };
            if json { println!("{}", serde_json::to_string_pretty(&status)?); } else { print_summary(&status); }
            if status.status == JobState::Error { anyhow::bail!("reindex of '{}' failed", directory); }
        }
        "search" => {
            let mut request = SearchRequest::new(String::new());
            let mut words = Vec::new();
            let mut i = 0;
            while i < args.len() {
                match args[i].as_str() {
                    "--dir" => { request.directories.push(value(&args, i, "--dir")); i += 1; }
                    "--page" => { request.page = value(&args, i, "--page"); i += 1; }
                    "--page-size" => { request.page_size = Some(value(&args, i, "--page-size")); i += 1; }
                    "--max-distance" => { request.max_distance = Some(value(&args, i, "--max-distance")); i += 1; }
                    a if !a.starts_with('-') => words.push(a.to_string()),
                    other => { eprintln!("Unknown flag: {}", other); usage_exit(); }
                }
                i += 1;
            }
            request.query = words.join(" ");
            let page = engine.search(&request).await?;
            if json { println!("{}", serde_json::to_string_pretty(&page)?); } else { print_page(&page); }
        }
        "preview" => {
            let path = args.first().cloned().unwrap_or_else(|| usage_exit());
            let preview = engine.preview(&path).await?;
            if json { println!("{}", serde_json::to_string_pretty(&preview)?); } else { print_preview(&preview); }
        }
        _ => { eprintln!("Unknown command: {}", cmd); usage_exit(); }
    }
    Ok(())
}

/// Poll the job into a progress bar until it finishes. Ctrl-C cancels it.
async fn follow(engine: &Semdex, job_id: &str) -> anyhow::Result<JobStatus> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );
    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut ctrl_c => {
                pb.set_message("cancelling...");
                engine.cancel(job_id)?;
                break;
            }
        }
        let s = engine.job_status(job_id)?;
        pb.set_length(s.total as u64);
        pb.set_position(s.current as u64);
        let phase = format!("{:?}", s.phase).to_lowercase();
        pb.set_message(format!("{} {}", phase, s.current_file.as_deref().unwrap_or("")));
        if s.status != JobState::Indexing { break; }
    }
    let status = engine.wait(job_id).await?;
    pb.finish_and_clear();
    Ok(status)
}

fn chunks_label(count: semdex_core::error::Result<usize>) -> String {
    match count {
        Ok(n) => format!("{} chunks", n),
        Err(e) => format!("index error: {}", e),
    }
}

fn print_summary(s: &JobStatus) {
    match s.status {
        JobState::Completed => println!("✅ Indexed '{}': {} files, {} chunks", s.directory, s.current, s.chunks_indexed),
        JobState::Cancelled => println!("⚠️  Cancelled '{}' after {}/{} files", s.directory, s.current, s.total),
        JobState::Error => println!("❌ Reindex of '{}' failed: {}", s.directory, s.error.as_deref().unwrap_or("unknown error")),
        JobState::Indexing => println!("… '{}' still indexing ({}/{})", s.directory, s.current, s.total),
    }
    if s.capped > 0 { println!("   {} files over the scan limit were not indexed", s.capped); }
    for skipped in &s.skipped { println!("   skipped {}: {}", skipped.path, skipped.reason); }
}

fn print_page(page: &SearchPage) {
    println!("🔍 '{}' in [{}] - page {}", page.query, page.directories.join(", "), page.page);
    if page.results.is_empty() { println!("No results."); }
    let offset = page.page.saturating_sub(1).saturating_mul(page.page_size);
    for (i, hit) in page.results.iter().enumerate() {
        println!("{:>3}. {:.3}  [{}] {}", offset.saturating_add(i + 1), hit.distance, hit.directory, hit.path);
    }
    if page.has_next { println!("(more results: --page {})", page.page.saturating_add(1)); }
}

fn print_preview(p: &Preview) {
    match (p.pages, p.preview_pages) {
        (Some(total), Some(shown)) => println!("📄 {} ({} bytes, showing {} of {} pages)", p.name, p.size, shown, total),
        _ => println!("📄 {} ({} bytes{})", p.name, p.size, if p.truncated { ", truncated" } else { "" }),
    }
    println!("{}", p.content);
}

#[cfg(test)]
mod tests {
    use super::*;
    use semdex_core::error::Error;

    #[test]
    fn store_errors_are_shown_not_counted_as_zero() {
        assert_eq!(chunks_label(Ok(12)), "12 chunks");
        let label = chunks_label(Err(Error::IndexStore("table missing".to_string())));
        assert!(label.starts_with("index error:"), "{label}");
        assert!(label.contains("table missing"), "{label}");
    }
}
