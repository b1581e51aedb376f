//! Live preview rendering with throttled writes
//!
//! Fragments arrive far faster than a preview can usefully reload, so writes
//! go through a `Debouncer`: at most one leading render per interval, plus a
//! trailing render once fragments stop, so the last fragment is always shown.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::client::StreamEvent;

pub const DEFAULT_RENDER_INTERVAL: Duration = Duration::from_millis(1000);

/// Script tag that makes Tailwind classes work inside the preview
pub const TAILWIND_SCRIPT: &str = r#"<script src="https://cdn.tailwindcss.com"></script>"#;

/// Wrap generated markup in a complete HTML document
pub fn preview_document(markup: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8">
    <title>Tailwind Generator</title>
    {TAILWIND_SCRIPT}
  </head>
  <body>
    {markup}
  </body>
</html>
"#
    )
}

/// Where generated markup is shown. Each render replaces everything.
pub trait PreviewSurface {
    fn render(&mut self, markup: &str) -> Result<()>;
}

/// Preview written to an HTML file on disk
#[derive(Debug)]
pub struct FilePreview {
    path: PathBuf,
    renders: usize,
}

impl FilePreview {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        Ok(Self { path, renders: 0 })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn renders(&self) -> usize {
        self.renders
    }
}

impl PreviewSurface for FilePreview {
    fn render(&mut self, markup: &str) -> Result<()> {
        // Write aside and rename so a reloading browser never sees half a file
        let tmp = self.path.with_extension("html.tmp");
        fs::write(&tmp, preview_document(markup))
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        self.renders += 1;
        tracing::debug!(path = %self.path.display(), bytes = markup.len(), "preview rendered");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
// DEBOUNCER
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    Idle,
    Armed { deadline: Instant },
}

/// Render throttle: leading renders spaced by `interval`, plus one trailing
/// render `interval` after the latest fragment.
#[derive(Debug)]
pub struct Debouncer {
    interval: Duration,
    last_commit: Instant,
    timer: Timer,
}

impl Debouncer {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_commit: now,
            timer: Timer::Idle,
        }
    }

    pub fn timer(&self) -> Timer {
        self.timer
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.timer {
            Timer::Idle => None,
            Timer::Armed { deadline } => Some(deadline),
        }
    }

    /// A fragment arrived. Returns whether to render right away.
    pub fn on_fragment(&mut self, now: Instant) -> bool {
        let render_now = now.saturating_duration_since(self.last_commit) > self.interval;
        if render_now {
            self.last_commit = now;
        }
        self.timer = Timer::Armed { deadline: now + self.interval };
        render_now
    }

    /// Returns whether the trailing render is due
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.timer {
            Timer::Armed { deadline } if now >= deadline => {
                self.timer = Timer::Idle;
                self.last_commit = now;
                true
            }
            _ => false,
        }
    }

    /// Upstream finished: returns whether a trailing render is still owed
    pub fn flush(&mut self, now: Instant) -> bool {
        match self.timer {
            Timer::Armed { .. } => {
                self.timer = Timer::Idle;
                self.last_commit = now;
                true
            }
            Timer::Idle => false,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
// STREAM CONSUMER
// ═══════════════════════════════════════════════════════════════

/// Accumulates fragments from one completion stream and paints them
pub struct StreamingRenderer {
    buffer: String,
    debouncer: Debouncer,
}

impl StreamingRenderer {
    pub fn new(interval: Duration) -> Self {
        Self {
            buffer: String::new(),
            debouncer: Debouncer::new(interval, Instant::now()),
        }
    }

    /// Consume `events` until upstream finishes, returning the full text.
    ///
    /// On an upstream error the partial text is still rendered before the
    /// error is returned.
    pub async fn run<S: PreviewSurface>(
        &mut self,
        events: &mut mpsc::Receiver<StreamEvent>,
        surface: &mut S,
    ) -> Result<String> {
        loop {
            let deadline = self.debouncer.deadline();

            tokio::select! {
                biased;

                event = events.recv() => match event {
                    Some(StreamEvent::Token(fragment)) => {
                        self.buffer.push_str(&fragment);
                        if self.debouncer.on_fragment(Instant::now()) {
                            surface.render(&self.buffer)?;
                        }
                    }
                    Some(StreamEvent::Done(reason)) => {
                        self.finish(surface)?;
                        tracing::debug!(finish_reason = ?reason, bytes = self.buffer.len(), "stream complete");
                        return Ok(std::mem::take(&mut self.buffer));
                    }
                    Some(StreamEvent::Error(e)) => {
                        self.finish(surface)?;
                        anyhow::bail!("Completion stream failed: {}", e);
                    }
                    None => {
                        self.finish(surface)?;
                        anyhow::bail!("Completion stream closed before finishing");
                    }
                },

                _ = sleep_until(deadline), if deadline.is_some() => {
                    if self.debouncer.poll(Instant::now()) {
                        surface.render(&self.buffer)?;
                    }
                }
            }
        }
    }

    fn finish<S: PreviewSurface>(&mut self, surface: &mut S) -> Result<()> {
        if self.debouncer.flush(Instant::now()) {
            surface.render(&self.buffer)?;
        }
        Ok(())
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}
