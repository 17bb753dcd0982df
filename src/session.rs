//! Interactive session: an editable URL list plus a command loop.
//!
//! [`UrlList`] mirrors the interactive model of the tool: a list of URL
//! entry slots that always holds at least one slot, so there is always
//! somewhere to type. `add` appends an empty slot, `remove` deletes one
//! but refuses to go below a single slot, and `edit` overwrites a slot in
//! place.
//!
//! [`run_session`] drives the whole pipeline from stdin commands and
//! renders every outcome through the same helpers the one-shot CLI
//! commands use.

use std::io::{self, BufRead, Write};

use anyhow::Context;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::error::LoadError;
use crate::fetch::HttpFetcher;
use crate::generation::create_generator;
use crate::index::{read_meta, read_sources};
use crate::pipeline::{ask, process_urls, AskOutcome, ProcessOutcome};

/// The editable list of URL entry slots. Never empty.
#[derive(Debug, Clone)]
pub struct UrlList {
    entries: Vec<String>,
}

impl UrlList {
    /// Starts with a single empty slot.
    pub fn new() -> Self {
        Self {
            entries: vec![String::new()],
        }
    }

    /// Append an empty slot at the end.
    pub fn add(&mut self) {
        self.entries.push(String::new());
    }

    /// Drop the last slot. Refuses when only one slot remains; returns
    /// whether a slot was removed.
    pub fn remove_last(&mut self) -> bool {
        self.remove(self.entries.len().saturating_sub(1))
    }

    /// Remove the slot at `index`. Refuses when only one slot remains or
    /// the index is out of range; returns whether a slot was removed.
    pub fn remove(&mut self, index: usize) -> bool {
        if self.entries.len() <= 1 || index >= self.entries.len() {
            return false;
        }
        self.entries.remove(index);
        true
    }

    /// Overwrite the slot at `index`. Returns whether the index was in
    /// range.
    pub fn edit(&mut self, index: usize, value: &str) -> bool {
        match self.entries.get_mut(index) {
            Some(slot) => {
                *slot = value.trim().to_string();
                true
            }
            None => false,
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// The entries worth fetching.
    pub fn non_blank(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect()
    }
}

impl Default for UrlList {
    fn default() -> Self {
        Self::new()
    }
}

/// Print a processing outcome as user-facing status text.
pub fn render_process_outcome(outcome: &ProcessOutcome) {
    match outcome {
        ProcessOutcome::NoUrls => {
            println!("Please enter at least one valid URL before processing.");
        }
        ProcessOutcome::NothingFetched { failures } => {
            for failure in failures {
                println!("  skipped: {failure}");
            }
            println!("No valid text found in the provided URLs.");
        }
        ProcessOutcome::Indexed { summary, failures } => {
            for failure in failures {
                println!("  skipped: {failure}");
            }
            println!(
                "Processed {} chunks from {} source(s).",
                summary.chunks,
                summary.sources.len()
            );
            for source in &summary.sources {
                println!("  - {source}");
            }
        }
    }
}

/// Print an ask outcome as user-facing status text.
pub fn render_ask_outcome(outcome: &AskOutcome) {
    match outcome {
        AskOutcome::BlankQuestion => {
            println!("Please enter a question.");
        }
        AskOutcome::NoIndex(LoadError::Incompatible { .. }) => {
            println!("The index was built with a different embedding model.");
            println!("Re-process your URLs with the current configuration.");
        }
        AskOutcome::NoIndex(_) => {
            println!("Please process URLs before asking a question.");
        }
        AskOutcome::Answered(result) => {
            println!("\n{}", result.answer);
            if !result.sources.is_empty() {
                println!("\nSources:");
                for source in &result.sources {
                    println!("  - {source}");
                }
            }
            println!();
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  add                append an empty URL slot");
    println!("  edit <n> <url>     set URL slot n (1-based)");
    println!("  remove [n]         remove URL slot n, or the last slot (keeps at least one)");
    println!("  list               show the URL slots");
    println!("  process            fetch, chunk, and index the listed URLs");
    println!("  ask <question>     answer a question from the index");
    println!("  status             show what the index currently holds");
    println!("  help               this message");
    println!("  quit               exit");
}

fn print_list(urls: &UrlList) {
    for (i, entry) in urls.entries().iter().enumerate() {
        if entry.is_empty() {
            println!("  {}. <empty>", i + 1);
        } else {
            println!("  {}. {entry}", i + 1);
        }
    }
}

/// Parse a 1-based slot number from a command argument.
fn parse_slot(arg: &str, len: usize) -> Option<usize> {
    let n: usize = arg.trim().parse().ok()?;
    if n == 0 || n > len {
        return None;
    }
    Some(n - 1)
}

/// Run the interactive loop until `quit` or end of input.
pub async fn run_session(config: &Config) -> anyhow::Result<()> {
    let fetcher = HttpFetcher::new(&config.fetch).context("failed to build HTTP client")?;
    let mut urls = UrlList::new();

    println!("Enter URLs, then `process` and `ask`. Type `help` for commands.");

    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let (command, rest) = match input.split_once(char::is_whitespace) {
            Some((c, r)) => (c, r.trim()),
            None => (input, ""),
        };

        match command {
            "quit" | "exit" => break,
            "help" => print_help(),
            "add" => {
                urls.add();
                print_list(&urls);
            }
            "list" => print_list(&urls),
            "edit" => {
                let parsed = rest
                    .split_once(char::is_whitespace)
                    .map(|(n, url)| (n, url.trim()));
                match parsed {
                    Some((n, url)) if !url.is_empty() => match parse_slot(n, urls.len()) {
                        Some(index) => {
                            urls.edit(index, url);
                            print_list(&urls);
                        }
                        None => println!("No such slot: {n}"),
                    },
                    _ => println!("Usage: edit <n> <url>"),
                }
            }
            "remove" => {
                let removed = if rest.is_empty() {
                    Some(urls.remove_last())
                } else {
                    parse_slot(rest, urls.len()).map(|index| urls.remove(index))
                };
                match removed {
                    Some(true) => print_list(&urls),
                    Some(false) => println!("At least one URL slot must remain."),
                    None => println!("Usage: remove [n]"),
                }
            }
            "process" => {
                if urls.non_blank().is_empty() {
                    render_process_outcome(&ProcessOutcome::NoUrls);
                    continue;
                }
                let embedder = match create_embedder(&config.embedding) {
                    Ok(e) => e,
                    Err(e) => {
                        println!("Cannot process: {e}");
                        continue;
                    }
                };
                match process_urls(config, &fetcher, embedder.as_ref(), &urls.non_blank()).await {
                    Ok(outcome) => render_process_outcome(&outcome),
                    Err(e) => println!("Processing failed: {e}"),
                }
            }
            "ask" => {
                if rest.is_empty() {
                    render_ask_outcome(&AskOutcome::BlankQuestion);
                    continue;
                }
                let embedder = match create_embedder(&config.embedding) {
                    Ok(e) => e,
                    Err(e) => {
                        println!("Cannot ask: {e}");
                        continue;
                    }
                };
                let generator = match create_generator(&config.generation) {
                    Ok(g) => g,
                    Err(e) => {
                        println!("Cannot ask: {e}");
                        continue;
                    }
                };
                match ask(config, embedder.as_ref(), generator.as_ref(), rest).await {
                    Ok(outcome) => render_ask_outcome(&outcome),
                    Err(e) => println!("Failed to answer: {e}"),
                }
            }
            "status" => match read_meta(config).await {
                Ok(meta) => {
                    println!(
                        "Index at {} holds {} chunks ({}, {} dims).",
                        config.index.path.display(),
                        meta.chunk_count,
                        meta.model,
                        meta.dims
                    );
                    if let Ok(sources) = read_sources(config).await {
                        for source in &sources {
                            println!("  - {source}");
                        }
                    }
                }
                Err(LoadError::NotFound { path }) => {
                    println!("No index at {} yet.", path.display());
                }
                Err(e) => println!("Could not read index: {e}"),
            },
            other => println!("Unknown command: {other} (try `help`)"),
        }
    }

    Ok(())
}
