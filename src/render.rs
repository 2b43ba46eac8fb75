//! Snapshot rendering
//!
//! Turns an aggregate read into one of three textual views. Rendering is a
//! pure function of `(aggregate content, filter, format)`: byte-identical
//! output for identical inputs, which is what makes the per-generation
//! cache sound. Hosts appear in configured order regardless of which poller
//! wrote last; failing hosts render their status tag and diagnostic in
//! place of data rather than disappearing.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};

use regex::Regex;

use crate::HostStatus;
use crate::filter::NodeFilter;
use crate::store::{Aggregate, AggregateEntry};

/// Matches ANSI escape sequences for the plain-text view.
static RE_ANSI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("ANSI pattern is valid")
});

const ANSI_WHITE: &str = "\x1b[37m";
const ANSI_RED: &str = "\x1b[31m";
const ANSI_YELLOW: &str = "\x1b[33m";
const ANSI_RESET: &str = "\x1b[0m";

/// Output representation of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Terminal-colored text, colors passed through from the remote command.
    Ansi,
    /// ANSI stripped.
    Plain,
    /// Escaped plain text wrapped for page display.
    Html,
}

impl Format {
    pub fn content_type(&self) -> &'static str {
        match self {
            Format::Ansi => "text/ansi; charset=utf-8",
            Format::Plain => "text/plain; charset=utf-8",
            Format::Html => "text/html; charset=utf-8",
        }
    }
}

/// Immutable rendering of one aggregate state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedSnapshot {
    pub generation: u64,
    pub format: Format,
    pub body: String,
}

/// Render an aggregate, optionally restricted to a host subset.
///
/// Hosts not matching the filter are silently omitted; a filter matching
/// nothing yields an empty body.
pub fn render(
    aggregate: &Aggregate,
    filter: Option<&NodeFilter>,
    format: Format,
) -> RenderedSnapshot {
    let mut body = String::new();

    for entry in &aggregate.entries {
        if let Some(filter) = filter
            && !filter.matches(&entry.host)
        {
            continue;
        }

        body.push_str(&render_entry(entry));
        body.push('\n');
    }

    let body = match format {
        Format::Ansi => body,
        Format::Plain => strip_ansi(&body),
        Format::Html => format!(
            "<pre class=\"gpustat\">{}</pre>\n",
            html_escape(&strip_ansi(&body))
        ),
    };

    RenderedSnapshot {
        generation: aggregate.generation,
        format,
        body,
    }
}

fn render_entry(entry: &AggregateEntry) -> String {
    let host = &entry.host;

    match &entry.result {
        None => format!("{ANSI_WHITE}({host}){ANSI_RESET} Loading ...\n"),
        Some(result) if result.status.is_ok() => format!("{}\n", result.payload),
        Some(result) => {
            let color = match result.status {
                HostStatus::Timeout => ANSI_YELLOW,
                _ => ANSI_RED,
            };
            format!(
                "{ANSI_WHITE}({host}){ANSI_RESET} {color}[{}] {}{ANSI_RESET}\n",
                status_tag(result.status),
                result.payload
            )
        }
    }
}

fn status_tag(status: HostStatus) -> &'static str {
    match status {
        HostStatus::Ok => "ok",
        HostStatus::Unreachable => "unreachable",
        HostStatus::CommandFailed => "error",
        HostStatus::Timeout => "timeout",
    }
}

fn strip_ansi(text: &str) -> String {
    RE_ANSI.replace_all(text, "").into_owned()
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Cache of rendered snapshots keyed by `(generation, filter, format)`.
///
/// Concurrent viewers sharing a filter cost one render per generation.
/// Entries from superseded generations are pruned on insert.
pub struct RenderCache {
    entries: Mutex<HashMap<(u64, String, Format), Arc<RenderedSnapshot>>>,
}

impl RenderCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn render(
        &self,
        aggregate: &Aggregate,
        filter: Option<&NodeFilter>,
        format: Format,
    ) -> Arc<RenderedSnapshot> {
        let key = (
            aggregate.generation,
            filter.map(NodeFilter::cache_key).unwrap_or_default(),
            format,
        );

        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(snapshot) = entries.get(&key) {
            return snapshot.clone();
        }

        // Keep the current and previous generation; anything older can no
        // longer be requested by a live broadcast.
        let generation = aggregate.generation;
        entries.retain(|(cached, _, _), _| cached + 1 >= generation);

        let snapshot = Arc::new(render(aggregate, filter, format));
        entries.insert(key, snapshot.clone());
        snapshot
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new()
    }
}
