use std::io::{self, Write};

use serde::Serialize;

use crate::app::{ClearResult, FetchResult, InfoResult, ListResult, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_list(result: &ListResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_info(result: &InfoResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_fetch(result: &FetchResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_clear(result: &ClearResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Human-readable progress on stderr, summaries on stdout.
pub struct ConsoleOutput;

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        let mut stderr = io::stderr().lock();
        let _ = match event.elapsed {
            Some(elapsed) => writeln!(
                stderr,
                "{DIM}[{:>6.2}s]{RESET} {}",
                elapsed.as_secs_f64(),
                event.message
            ),
            None => writeln!(stderr, "{DIM}{:>10}{RESET} {}", "", event.message),
        };
    }
}

impl ConsoleOutput {
    pub fn print_fetch(result: &FetchResult) {
        println!("{CYAN}corrbench summary{RESET}");
        for item in &result.items {
            let color = match item.action.as_str() {
                "download" => GREEN,
                "present" => CYAN,
                _ => YELLOW,
            };
            match item.archive_bytes {
                Some(bytes) => println!(
                    "{color}{} ({}) {} [{bytes} bytes]{RESET}",
                    item.benchmark, item.action, item.path
                ),
                None => println!(
                    "{color}{} ({}) {}{RESET}",
                    item.benchmark, item.action, item.path
                ),
            }
        }
    }

    pub fn print_list(result: &ListResult) {
        println!("{CYAN}datapath: {}{RESET}", result.datapath);
        for entry in &result.datasets {
            let status = if entry.present {
                format!("{GREEN}present{RESET}")
            } else if entry.manual {
                format!("{YELLOW}manual{RESET}")
            } else {
                format!("{DIM}missing{RESET}")
            };
            println!("{:<10} {:<16} {status}", entry.benchmark, entry.dirname);
        }
    }

    pub fn print_info(result: &InfoResult) {
        println!("{CYAN}{}{RESET}", result.benchmark);
        println!("  dirname:   {}", result.dirname);
        println!("  path:      {}", result.path);
        println!("  present:   {}", result.present);
        if let Some(remote_id) = &result.remote_id {
            println!("  remote id: {remote_id}");
        }
        println!(
            "  loader:    thres={} split={} feature_size={} sub_class={}",
            result.loader.thres,
            result.loader.split,
            result.loader.feature_size,
            result.loader.sub_class
        );
        if let Some(metadata) = &result.metadata {
            println!("  fetched:   {}", metadata.downloaded_at);
            println!("  archive:   {} bytes", metadata.archive_bytes);
            println!("  tool:      {}", metadata.tool);
        }
    }

    pub fn print_clear(result: &ClearResult) {
        if result.cleared {
            println!("{GREEN}cleared {}{RESET}", result.benchmark);
        } else {
            println!("{DIM}nothing to clear for {}{RESET}", result.benchmark);
        }
    }
}
