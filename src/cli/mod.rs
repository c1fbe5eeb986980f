//! CLI command implementations for the VoltGuard client.
//!
//! Provides subcommand handlers for:
//! - `voltguard feed` — pull frames from the live camera feed
//! - `voltguard listen` — live notification stream with banners and alerts
//! - `voltguard chat` — energy assistant backed by the tool server
//! - `voltguard tools` — list the tools the tool server exposes
//! - `voltguard notify history|send|clear` — backend notification store
//! - `voltguard status` — streak, efficiency level and pet descriptors
//! - `voltguard stats` / `voltguard analyze` — event log summaries
//! - `voltguard health` — check backend, completion endpoint, tool server
//! - `voltguard config show|init|set|reset` — configuration management

use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::Value;

use crate::analytics::logger::EventLog;
use crate::analytics::reporter::{self, Stats, TrendEntry};
use crate::backend::BackendClient;
use crate::chat::{ChatOrchestrator, ChatState, DisplayRole, Entry, TurnObserver, TurnOutcome};
use crate::config::{self, VoltGuardConfig};
use crate::feed::{FeedState, Frame, FrameRequester, RetryPolicy};
use crate::gamification::{self, Pet, Progress};
use crate::llm::{Completer, CompletionClient};
use crate::llm::prompts::GREETING;
use crate::mcp::{McpClient, ToolInvoker};
use crate::notifications::{
    AlertView, DesktopAlerts, Level, Notification, NotificationCenter, NotificationListener,
    NotificationView, Notifier, Permission, Severity,
};
use crate::socket::SocketChannel;

/// Output format for analytics commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl OutputFormat {
    pub fn from_str_opt(s: Option<&str>) -> Self {
        match s {
            Some("json") => Self::Json,
            Some("csv") => Self::Csv,
            _ => Self::Table,
        }
    }
}

/// Open the socket channel, recording the attempt in the event log.
fn connect_socket(cfg: &VoltGuardConfig, log: &EventLog) -> Result<SocketChannel> {
    let result = SocketChannel::connect(&cfg.socket);
    log.connection("socket", result.is_ok());
    let channel = result?;
    println!(
        "{} Connected to {} via {}",
        "✓".green().bold(),
        cfg.socket.url,
        channel.transport_kind()
    );
    Ok(channel)
}

// ---------------------------------------------------------------------------
// voltguard feed
// ---------------------------------------------------------------------------

/// Pull frames from the live feed until `frames` have been shown, the retry
/// policy gives up, or the channel disconnects.
pub fn run_feed(frames: Option<u64>, save: Option<PathBuf>) -> Result<()> {
    let cfg = config::load();
    let log = EventLog::from_config(&cfg.logging);
    let mut channel = connect_socket(&cfg, &log)?;

    let mut shown = 0u64;
    let display = move |frame: &Frame| {
        shown += 1;
        println!(
            "  frame {:>5}  {} {:>3}  {} {:>3}",
            shown,
            "lights on:".bold(),
            frame.stats.lights_on,
            "off:".bold(),
            frame.stats.lights_off,
        );
        if let Some(path) = &save
            && let Err(e) = save_frame(frame, path)
        {
            eprintln!("  {} {e:#}", "save failed:".red());
        }
    };

    let mut requester = FrameRequester::new(RetryPolicy::from(&cfg.feed), display);
    channel.run(&mut requester, |r| {
        r.state() == FeedState::GaveUp || frames.is_some_and(|n| r.frames_received() >= n)
    });

    if requester.errors_total() > 0 {
        log.frame_error(
            requester.last_error().unwrap_or("frame error"),
            requester.errors_total(),
        );
    }

    println!();
    println!(
        "  {} {} frames, {} errors",
        "Done:".bold(),
        requester.frames_received(),
        requester.errors_total()
    );
    match requester.state() {
        FeedState::GaveUp => println!(
            "  {} {}",
            "Gave up after repeated errors:".yellow(),
            requester.last_error().unwrap_or("unknown error")
        ),
        FeedState::Disconnected => println!("  {}", "Connection closed by the backend.".yellow()),
        _ => {}
    }
    Ok(())
}

fn save_frame(frame: &Frame, path: &PathBuf) -> Result<()> {
    let bytes = frame.decode_image()?;
    fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}

// ---------------------------------------------------------------------------
// voltguard listen
// ---------------------------------------------------------------------------

/// Terminal stand-in for OS notifications: bell plus a highlighted line.
pub struct TerminalNotifier;

impl Notifier for TerminalNotifier {
    fn request_permission(&mut self) -> Permission {
        if io::stdout().is_terminal() {
            Permission::Granted
        } else {
            Permission::Denied
        }
    }

    fn notify(&mut self, title: &str, body: &str) {
        print!("\x07");
        println!("  {} {}", format!("[{title}]").on_red().white().bold(), body.bold());
        let _ = io::stdout().flush();
    }
}

/// Prints notification activity and records it in the event log.
struct TerminalView {
    log: EventLog,
}

impl NotificationView for TerminalView {
    fn accepted(&mut self, notification: &Notification) {
        self.log.notification(&notification.level.to_string());
        print_alert_row(&AlertView::from(notification));
        println!("    {}", notification.message);
    }

    fn banner_expired(&mut self, notification: &Notification) {
        println!("  {}", format!("banner cleared: {}", notification.id).dimmed());
    }

    fn malformed(&mut self, error: &anyhow::Error) {
        eprintln!("  {} {error:#}", "ignored:".yellow());
    }
}

/// Listen for live notifications until `limit` events arrive or the channel
/// disconnects.
pub fn run_listen(limit: Option<u64>) -> Result<()> {
    let cfg = config::load();
    let log = EventLog::from_config(&cfg.logging);
    let mut channel = connect_socket(&cfg, &log)?;

    let alerts = cfg
        .notifications
        .desktop_alerts
        .then(|| DesktopAlerts::new(TerminalNotifier, Permission::Default));
    let mut listener = NotificationListener::new(
        NotificationCenter::new(&cfg.notifications),
        TerminalView { log },
        alerts,
    );

    println!("{}", "Listening for notifications…".dimmed());
    channel.run(&mut listener, |l| limit.is_some_and(|n| l.received() >= n));

    let center = listener.center();
    println!();
    println!(
        "  {} {} received, {} duplicates, {} shown",
        "Done:".bold(),
        listener.received(),
        listener.duplicates(),
        center.len()
    );
    Ok(())
}

fn print_alert_row(view: &AlertView) {
    println!(
        "  {} {:<14} {:<28} {}",
        colorize_severity(view.severity),
        truncate(&view.source, 14),
        truncate(&view.headline, 28),
        view.time.dimmed(),
    );
}

// ---------------------------------------------------------------------------
// voltguard chat
// ---------------------------------------------------------------------------

/// Prints turn progress and logs each tool call with its latency.
struct TerminalObserver<'a> {
    log: &'a EventLog,
    tool_started: Option<Instant>,
}

impl TurnObserver for TerminalObserver<'_> {
    fn state_changed(&mut self, state: ChatState, _thinking: bool) {
        match state {
            ChatState::Sending(_) => eprintln!("  {}", "thinking…".dimmed()),
            ChatState::ToolPhase | ChatState::Idle => {}
        }
    }

    fn tool_started(&mut self, name: &str, arguments: &Value) {
        self.tool_started = Some(Instant::now());
        eprintln!("  {} {name} {}", "→".cyan(), arguments.to_string().dimmed());
    }

    fn tool_finished(&mut self, name: &str, result: &Result<String>) {
        let latency = self
            .tool_started
            .take()
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        self.log.tool_call(name, result.is_ok(), latency);
        if let Err(e) = result {
            eprintln!("  {} {name}: {e:#}", "✗".red());
        }
    }
}

/// Chat with the energy assistant. With `message`, runs one turn and exits.
pub fn run_chat(message: Option<String>) -> Result<()> {
    let cfg = config::load();
    let log = EventLog::from_config(&cfg.logging);

    let tools = match McpClient::connect(&cfg.tools) {
        Ok(client) => {
            log.connection("tools", true);
            eprintln!(
                "{} Tool server ready ({} tools)",
                "✓".green().bold(),
                client.tools().len()
            );
            client
        }
        Err(e) => {
            log.connection("tools", false);
            eprintln!("{} {e:#}", "Tool server unavailable:".yellow());
            McpClient::offline()
        }
    };
    let completer = CompletionClient::from_config(&cfg.completion);
    let mut chat = ChatOrchestrator::new(completer, tools, &cfg.completion.system_prompt);

    if let Some(text) = message {
        chat_turn(&mut chat, &text, &log);
        return Ok(());
    }

    println!("{} {}", "VoltGuard:".green().bold(), GREETING);
    let stdin = io::stdin();
    loop {
        print!("{} ", ">".cyan().bold());
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let text = line.trim();
        match text {
            "" => continue,
            "exit" | "quit" => break,
            _ => chat_turn(&mut chat, text, &log),
        }
    }
    Ok(())
}

fn chat_turn<C, T>(chat: &mut ChatOrchestrator<C, T>, text: &str, log: &EventLog)
where
    C: Completer,
    T: ToolInvoker,
{
    let mut observer = TerminalObserver {
        log,
        tool_started: None,
    };
    let report = chat.send(text, &mut observer);

    let outcome = match &report.outcome {
        TurnOutcome::Rejected => "rejected",
        TurnOutcome::Direct => "direct",
        TurnOutcome::WithTools => "with_tools",
        TurnOutcome::Failed { error } => {
            eprintln!("  {}", error.dimmed());
            "failed"
        }
    };
    log.chat_turn(
        outcome,
        report.succeeded(),
        report.latency.as_millis() as u64,
        report.tools.len(),
    );

    if let Some(entry) = chat.transcript().last() {
        print_entry(entry);
    }
}

fn print_entry(entry: &Entry) {
    match entry.role {
        DisplayRole::Assistant if entry.is_error => {
            println!("{} {}", "VoltGuard:".red().bold(), entry.content)
        }
        DisplayRole::Assistant => println!("{} {}", "VoltGuard:".green().bold(), entry.content),
        DisplayRole::User => println!("{} {}", "You:".bold(), entry.content),
        DisplayRole::SystemStatus => println!("  {}", entry.content.dimmed()),
    }
}

// ---------------------------------------------------------------------------
// voltguard tools
// ---------------------------------------------------------------------------

/// Connect to the tool server and list its tools.
pub fn run_tools() -> Result<()> {
    let cfg = config::load();
    let mut client = McpClient::connect(&cfg.tools)?;

    println!("{}", "VoltGuard Tool Server".bold().cyan());
    println!("{}", "=".repeat(60));
    if let Some(info) = client.server_info() {
        println!("  {} {} {}", "Server:".bold(), info.name, info.version.dimmed());
    }
    println!("  {} {}", "Transport:".bold(), cfg.tools.transport);
    println!();

    for tool in client.tools() {
        println!("  {}", tool.name.green());
        if let Some(description) = &tool.description {
            for line in description.lines().map(str::trim).filter(|l| !l.is_empty()) {
                println!("      {}", line.dimmed());
            }
        }
    }
    client.close();
    Ok(())
}

// ---------------------------------------------------------------------------
// voltguard notify history | send | clear
// ---------------------------------------------------------------------------

/// Show the backend's stored notifications, newest first.
pub fn run_notify_history(limit: usize, format: OutputFormat) -> Result<()> {
    let cfg = config::load();
    let notifications = BackendClient::from_config(&cfg.socket).recent_notifications(limit)?;

    if notifications.is_empty() {
        println!("{}", "No notifications stored.".yellow());
        return Ok(());
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&notifications)?),
        OutputFormat::Csv => {
            println!("id,level,device,timestamp,message");
            for n in &notifications {
                println!(
                    "{},{},{},{},\"{}\"",
                    n.id,
                    n.level,
                    n.device.as_deref().unwrap_or(""),
                    n.timestamp,
                    n.message.replace('"', "\"\"")
                );
            }
        }
        OutputFormat::Table => {
            println!("{}", "Alert History".bold().cyan());
            println!("{}", "=".repeat(70));
            println!(
                "  {:<6} {:<14} {:<28} {}",
                "Level", "Source", "Headline", "Time"
            );
            println!("  {}", "-".repeat(68));
            for n in &notifications {
                print_alert_row(&AlertView::from(n));
            }
        }
    }
    Ok(())
}

/// Publish a notification through the backend.
pub fn run_notify_send(message: &str, device: Option<&str>, level: &str) -> Result<()> {
    let level: Level = level.parse()?;
    let cfg = config::load();
    let stored = BackendClient::from_config(&cfg.socket).send_notification(message, device, level)?;
    println!("{} Sent {} ({})", "✓".green().bold(), stored.id.bold(), stored.level);
    Ok(())
}

/// Delete every stored notification on the backend.
pub fn run_notify_clear() -> Result<()> {
    let cfg = config::load();
    BackendClient::from_config(&cfg.socket).clear_notifications()?;
    println!("{} Notifications cleared", "✓".green().bold());
    Ok(())
}

// ---------------------------------------------------------------------------
// voltguard status
// ---------------------------------------------------------------------------

/// Inputs for `voltguard status`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusArgs {
    pub consumption: f64,
    pub previous: Option<f64>,
    pub weekend: bool,
    pub streak: u32,
    pub level: u32,
    pub saved_kwh: f64,
    pub devices: u32,
}

/// Show the streak, efficiency level, pet and achievements.
pub fn run_status(args: StatusArgs) -> Result<()> {
    let level = gamification::efficiency_level(args.consumption);
    let bucket = gamification::consumption_bucket(args.consumption, args.weekend);
    let pet = Pet::default();

    println!("{}", "VoltGuard Energy Status".bold().cyan());
    println!("{}", "=".repeat(50));
    println!("  {} {} days", "Streak:     ".bold(), args.streak);
    println!(
        "  {} {} {}",
        "Efficiency: ".bold(),
        level.tier,
        level.color.dimmed()
    );
    println!("  {} {}", "Today:      ".bold(), bucket);
    if let Some(previous) = args.previous {
        match gamification::improvement_percent(args.consumption, previous) {
            Some(pct) if pct >= 0 => {
                println!("  {} {}", "Improvement:".bold(), format!("{pct}% less").green())
            }
            Some(pct) => {
                println!("  {} {}", "Improvement:".bold(), format!("{}% more", -pct).red())
            }
            None => println!("  {} {}", "Improvement:".bold(), "no previous usage".dimmed()),
        }
    }
    println!("  {}", level.description.dimmed());
    println!();

    println!("{}", "Energy Pet".bold().cyan());
    println!(
        "  Health: {}  Happiness: {}  Energy: {}",
        pet.health,
        pet.happiness(),
        pet.energy
    );
    println!();

    let progress = Progress {
        saved_kwh: args.saved_kwh,
        streak_days: args.streak,
        level: args.level,
        pet_health: pet.health,
        optimized_devices: args.devices,
    };
    println!("{}", "Achievements".bold().cyan());
    for a in gamification::achievements(&progress) {
        let mark = if a.unlocked {
            "★".yellow().bold()
        } else {
            "·".dimmed()
        };
        println!("  {} {:<14} {}", mark, a.title, a.description.dimmed());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// voltguard stats
// ---------------------------------------------------------------------------

/// Show event log statistics.
pub fn run_stats(format: OutputFormat, days: Option<u32>) -> Result<()> {
    let cfg = config::load();
    let stats = reporter::compute_stats(&EventLog::from_config(&cfg.logging), days);

    if stats.total_events == 0 {
        println!(
            "{}",
            "No data yet. Use the feed, listen or chat commands to collect events.".yellow()
        );
        return Ok(());
    }

    match format {
        OutputFormat::Json => print_stats_json(&stats)?,
        OutputFormat::Csv => print_stats_csv(&stats),
        OutputFormat::Table => print_stats_table(&stats),
    }
    Ok(())
}

fn print_stats_table(stats: &Stats) {
    println!("{}", "VoltGuard Activity Report".bold().cyan());
    println!("{}", "=".repeat(60));
    println!();

    println!("  {} {}", "Total events:   ".bold(), stats.total_events);
    println!(
        "  {} {} ({:.1}% answered)",
        "Chat turns:     ".bold(),
        stats.chat_turns,
        stats.chat_success_pct()
    );
    println!(
        "  {} {:.0}ms",
        "Avg turn time:  ".bold(),
        stats.avg_turn_latency_ms
    );
    println!(
        "  {} {} ({:.1}% ok)",
        "Tool calls:     ".bold(),
        stats.tool_calls,
        stats.tool_success_pct()
    );
    println!("  {} {}", "Frame errors:   ".bold(), stats.frame_errors);
    println!(
        "  {} {}",
        "Failed connects:".bold(),
        stats.connection_failures
    );
    println!();

    if !stats.notifications.is_empty() {
        println!("{}", "Notifications by Level".bold().cyan());
        let parts: Vec<String> = stats
            .notifications
            .iter()
            .map(|(level, count)| format!("{level}: {count}"))
            .collect();
        println!("  {}", parts.join("  "));
        println!();
    }

    if !stats.tool_stats.is_empty() {
        println!("{}", "Top Tools".bold().cyan());
        println!(
            "  {:<32} {:>6} {:>8} {:>10}",
            "Tool", "Calls", "Failed", "Avg ms"
        );
        println!("  {}", "-".repeat(58));
        for (i, tool) in stats.tool_stats.iter().take(15).enumerate() {
            let line = format!(
                "  {:<32} {:>6} {:>8} {:>10.0}",
                truncate(&tool.tool, 32),
                tool.calls,
                tool.failures,
                tool.avg_latency_ms,
            );
            if i % 2 == 0 {
                println!("{}", line);
            } else {
                println!("{}", line.dimmed());
            }
        }
    }
}

fn print_stats_json(stats: &Stats) -> Result<()> {
    let value = serde_json::json!({
        "total_events": stats.total_events,
        "chat_turns": stats.chat_turns,
        "chat_failures": stats.chat_failures,
        "avg_turn_latency_ms": stats.avg_turn_latency_ms,
        "tool_calls": stats.tool_calls,
        "tool_failures": stats.tool_failures,
        "frame_errors": stats.frame_errors,
        "connection_failures": stats.connection_failures,
        "notifications": stats.notifications,
        "tools": stats.tool_stats.iter().map(|t| serde_json::json!({
            "tool": t.tool,
            "calls": t.calls,
            "failures": t.failures,
            "avg_latency_ms": t.avg_latency_ms,
        })).collect::<Vec<_>>(),
    });

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_stats_csv(stats: &Stats) {
    println!("tool,calls,failures,avg_latency_ms");
    for t in &stats.tool_stats {
        println!("{},{},{},{:.0}", t.tool, t.calls, t.failures, t.avg_latency_ms);
    }
}

// ---------------------------------------------------------------------------
// voltguard analyze
// ---------------------------------------------------------------------------

/// Show per-day activity.
pub fn run_analyze(days: u32, format: OutputFormat) -> Result<()> {
    let cfg = config::load();
    let trends = reporter::compute_trends(&EventLog::from_config(&cfg.logging), days);

    if trends.is_empty() {
        println!("{}", format!("No data in the last {} days.", days).yellow());
        return Ok(());
    }

    match format {
        OutputFormat::Json => print_trends_json(&trends)?,
        OutputFormat::Csv => print_trends_csv(&trends),
        OutputFormat::Table => print_trends_table(&trends, days),
    }
    Ok(())
}

fn print_trends_table(trends: &[TrendEntry], days: u32) {
    println!(
        "{}",
        format!("VoltGuard Activity, Last {} Days", days).bold().cyan()
    );
    println!("{}", "=".repeat(56));
    println!(
        "  {:<12} {:>8} {:>8} {:>8} {:>12}",
        "Date", "Turns", "Tools", "Alerts", "Frame errs"
    );
    println!("  {}", "-".repeat(54));
    for t in trends {
        println!(
            "  {:<12} {:>8} {:>8} {:>8} {:>12}",
            t.date, t.chat_turns, t.tool_calls, t.notifications, t.frame_errors
        );
    }
}

fn print_trends_json(trends: &[TrendEntry]) -> Result<()> {
    let values: Vec<_> = trends
        .iter()
        .map(|t| {
            serde_json::json!({
                "date": t.date,
                "chat_turns": t.chat_turns,
                "tool_calls": t.tool_calls,
                "notifications": t.notifications,
                "frame_errors": t.frame_errors,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&values)?);
    Ok(())
}

fn print_trends_csv(trends: &[TrendEntry]) {
    println!("date,chat_turns,tool_calls,notifications,frame_errors");
    for t in trends {
        println!(
            "{},{},{},{},{}",
            t.date, t.chat_turns, t.tool_calls, t.notifications, t.frame_errors
        );
    }
}

// ---------------------------------------------------------------------------
// voltguard health
// ---------------------------------------------------------------------------

/// Check config files, backend, completion endpoint, tool server and log.
pub fn run_health() -> Result<()> {
    println!("{}", "VoltGuard Health Check".bold().cyan());
    println!("{}", "=".repeat(40));

    let global = config::global_config_file();
    let global_exists = global.as_ref().is_some_and(|p| p.exists());
    let project = config::project_config_file();
    let project_exists = project.as_ref().is_some_and(|p| p.exists());
    let cfg = config::load();

    print_health_item(
        "Global config",
        global_exists,
        if global_exists {
            "~/.voltguard/config.toml found"
        } else {
            "not found (run `voltguard config init` to create)"
        },
    );
    if let Some(path) = global.filter(|p| config::file_is_malformed(p)) {
        print_health_item("Global config", false, &format!("{} does not parse", path.display()));
    }
    print_health_item(
        "Project config",
        project_exists,
        if project_exists {
            ".voltguard.toml found"
        } else {
            "none (optional)"
        },
    );
    if let Some(path) = project.filter(|p| config::file_is_malformed(p)) {
        print_health_item("Project config", false, &format!("{} does not parse", path.display()));
    }

    match BackendClient::from_config(&cfg.socket).stats() {
        Ok(lights) => print_health_item(
            "Backend",
            true,
            &format!(
                "reachable at {} ({} lights on, {} off)",
                cfg.socket.url, lights.lights_on, lights.lights_off
            ),
        ),
        Err(e) => print_health_item(
            "Backend",
            false,
            &format!("not reachable at {} ({e:#})", cfg.socket.url),
        ),
    }

    let completion = CompletionClient::from_config(&cfg.completion);
    let completion_ok = completion.is_healthy();
    print_health_item(
        "Completion endpoint",
        completion_ok,
        &if completion_ok {
            format!("reachable at {}", cfg.completion.base_url)
        } else {
            "not reachable (is the local model server running?)".to_string()
        },
    );
    print_health_item("Model", true, completion.model_name());

    match McpClient::connect(&cfg.tools) {
        Ok(mut client) => {
            print_health_item(
                "Tool server",
                true,
                &format!("{} tools via {}", client.tools().len(), cfg.tools.transport),
            );
            client.close();
        }
        Err(e) => print_health_item("Tool server", false, &format!("{e:#}")),
    }

    let log = EventLog::from_config(&cfg.logging);
    let log_exists = log.path().is_some_and(|p| p.exists());
    print_health_item(
        "Event log",
        log_exists || !cfg.logging.enabled,
        &if !cfg.logging.enabled {
            "disabled".to_string()
        } else if log_exists {
            format!("{} entries", log.read_all().len())
        } else {
            "no log file yet".to_string()
        },
    );

    Ok(())
}

fn print_health_item(name: &str, ok: bool, detail: &str) {
    let status = if ok {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    println!("  {} {:<22} {}", status, name, detail.dimmed());
}

// ---------------------------------------------------------------------------
// voltguard config show | init | set | reset
// ---------------------------------------------------------------------------

/// Show the effective (merged) configuration as TOML.
pub fn run_config_show() -> Result<()> {
    let toml_str = config::show_effective_config()?;
    println!("{}", "Effective VoltGuard Configuration".bold().cyan());
    println!("{}", "=".repeat(50));
    println!();
    println!("{toml_str}");

    let global_exists = config::global_config_file().is_some_and(|p| p.exists());
    let project_exists = config::project_config_file().is_some_and(|p| p.exists());
    println!("{}", "Sources (highest priority last):".dimmed());
    println!("  {} built-in defaults", "·".dimmed());
    if global_exists {
        println!("  {} {}", "✓".green(), "~/.voltguard/config.toml".dimmed());
    } else {
        println!(
            "  {} {}",
            "·".dimmed(),
            "~/.voltguard/config.toml (not found)".dimmed()
        );
    }
    if project_exists {
        println!("  {} {}", "✓".green(), ".voltguard.toml".dimmed());
    } else {
        println!("  {} {}", "·".dimmed(), ".voltguard.toml (not found)".dimmed());
    }
    println!(
        "  {} {}",
        "·".dimmed(),
        "VOLTGUARD_* environment variables".dimmed()
    );
    Ok(())
}

/// Initialize a default config file at `~/.voltguard/config.toml`.
pub fn run_config_init(force: bool) -> Result<()> {
    let path = config::init_config(force)?;
    println!(
        "{} Config written to {}",
        "✓".green().bold(),
        path.display()
    );
    println!("  {}", "Edit the file to point at your backend.".dimmed());
    Ok(())
}

/// Set a single configuration value in the global config file.
pub fn run_config_set(key: &str, value: &str) -> Result<()> {
    config::set_config_value(key, value)?;
    println!("{} Set {} = {}", "✓".green().bold(), key.bold(), value);
    Ok(())
}

/// Reset configuration to defaults.
pub fn run_config_reset() -> Result<()> {
    let path = config::reset_config()?;
    println!(
        "{} Config reset to defaults at {}",
        "✓".green().bold(),
        path.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// Truncate a string to `max_len` characters, appending "…" if truncated.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{kept}…")
    }
}

fn colorize_severity(severity: Severity) -> colored::ColoredString {
    let label = format!("{:<6}", severity.to_string());
    match severity {
        Severity::High => label.red().bold(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.blue(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
