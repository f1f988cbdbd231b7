// Text and JSON rendering of targets, probe results, stat samples, daemon events and log lines.

use serde::Serialize;
use std::io::{self, Write};

use crate::models::{Classification, DaemonEvent, LogLine, ProbeResult, StatSample, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct Presenter<W> {
    out: W,
    mode: OutputMode,
}

impl Presenter<io::Stdout> {
    pub fn stdout(mode: OutputMode) -> Self {
        Self::new(io::stdout(), mode)
    }
}

impl<W: Write> Presenter<W> {
    pub fn new(out: W, mode: OutputMode) -> Self {
        Self { out, mode }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// ANSI clear + home. No-op in JSON mode so the output stays parseable.
    pub fn clear_screen(&mut self) -> io::Result<()> {
        if self.mode == OutputMode::Json {
            return Ok(());
        }
        write!(self.out, "\x1b[2J\x1b[H")?;
        self.out.flush()
    }

    pub fn targets(&mut self, targets: &[Target]) -> io::Result<()> {
        if self.mode == OutputMode::Json {
            return self.json(&targets);
        }
        if targets.is_empty() {
            return self.line("no running containers");
        }
        let width = name_width(targets.iter().map(|t| t.name.as_str()));
        for t in targets {
            let ports = t
                .ports
                .iter()
                .map(|p| match p.host_port {
                    Some(host) => format!("{}->{}/{}", host, p.container_port, p.protocol),
                    None => format!("{}/{}", p.container_port, p.protocol),
                })
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(
                self.out,
                "{:<width$}  {:<10}  {}",
                t.name,
                t.state().to_string(),
                ports
            )?;
        }
        self.out.flush()
    }

    pub fn probes(&mut self, results: &[ProbeResult]) -> io::Result<()> {
        if self.mode == OutputMode::Json {
            return self.json(&results);
        }
        if results.is_empty() {
            return self.line("no published tcp ports");
        }
        let mut sorted: Vec<&ProbeResult> = results.iter().collect();
        sorted.sort_by(|a, b| a.target.cmp(&b.target).then(a.port.cmp(&b.port)));
        let width = name_width(sorted.iter().map(|r| r.target.as_str()));
        for r in sorted {
            let marker = match r.classification {
                Classification::Available => "✓",
                Classification::Degraded(_) => "!",
                Classification::Unreachable => "✗",
            };
            writeln!(
                self.out,
                "{} {:<width$}  {:>5}  {:<24}  {}ms",
                marker,
                r.target,
                r.port,
                r.classification.label(),
                r.latency.as_millis()
            )?;
        }
        self.out.flush()
    }

    pub fn stats(&mut self, samples: &[StatSample]) -> io::Result<()> {
        if self.mode == OutputMode::Json {
            return self.json(&samples);
        }
        if samples.is_empty() {
            return self.line("no running containers");
        }
        let width = name_width(samples.iter().map(|s| s.target.as_str()));
        writeln!(
            self.out,
            "{:<width$}  {:>7}  {:>23}  {:>6}  {:>10}  {:>10}",
            "NAME", "CPU %", "MEM USAGE / LIMIT", "MEM %", "NET RX", "NET TX"
        )?;
        for s in samples {
            let mem_percent = s
                .mem_percent
                .map(|p| format!("{:.2}%", p))
                .unwrap_or_else(|| "-".into());
            writeln!(
                self.out,
                "{:<width$}  {:>6.2}%  {:>23}  {:>6}  {:>10}  {:>10}",
                s.target,
                s.cpu_percent,
                format!("{} / {}", format_bytes(s.mem_used), format_bytes(s.mem_limit)),
                mem_percent,
                format_bytes(s.net_rx_bytes),
                format_bytes(s.net_tx_bytes)
            )?;
        }
        self.out.flush()
    }

    /// One line per event; JSON mode prints one object per line.
    pub fn event(&mut self, event: &DaemonEvent) -> io::Result<()> {
        if self.mode == OutputMode::Json {
            return self.json(event);
        }
        let when = chrono::DateTime::from_timestamp(event.time, 0)
            .map(|t| {
                t.with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            })
            .unwrap_or_else(|| event.time.to_string());
        writeln!(
            self.out,
            "{}  {:<10} {:<12} {}",
            when, event.kind, event.action, event.actor
        )?;
        self.out.flush()
    }

    /// Human mode passes the text through untouched; JSON mode prints one object per line.
    pub fn log_line(&mut self, line: &LogLine) -> io::Result<()> {
        if self.mode == OutputMode::Json {
            return self.json(line);
        }
        self.out.write_all(line.message.as_bytes())?;
        if !line.message.ends_with('\n') {
            writeln!(self.out)?;
        }
        self.out.flush()
    }

    fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{}", text)?;
        self.out.flush()
    }

    fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, value)?;
        writeln!(self.out)?;
        self.out.flush()
    }
}

fn name_width<'a>(names: impl Iterator<Item = &'a str>) -> usize {
    names.map(|n| n.chars().count()).max().unwrap_or(0).max(4)
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2}GiB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2}MiB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2}KiB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes}B")
    }
}
