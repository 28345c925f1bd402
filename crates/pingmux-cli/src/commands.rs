//! Interactive command parsing and frame rendering.

use serde_json::json;

/// One line of user input, parsed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Start {
        description: String,
        targets: Vec<String>,
    },
    Stop(u16),
    List,
    Info(u16),
    WatchResults(u16),
    WatchStatistics(u16),
    Ping,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  start <target> [target...]   start a probe job (host, host:port or IPv4)
  stop <id>                    stop a job
  list                         list running jobs
  info <id>                    show one job in full
  result <id>                  stream per-probe results
  count <id>                   stream rolling success counters
  ping                         check the server
  help                         this text
  quit                         exit";

/// Parse one input line. Empty lines parse to `None`.
pub fn parse(line: &str) -> Result<Option<Command>, String> {
    let mut tokens = line.split_whitespace();
    let Some(verb) = tokens.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = tokens.collect();

    let command = match verb {
        "start" => {
            if rest.is_empty() {
                return Err("start needs at least one target".to_string());
            }
            Command::Start {
                description: rest.join(" "),
                targets: rest.iter().map(|t| t.to_string()).collect(),
            }
        }
        "stop" => Command::Stop(job_id_arg(&rest, "stop")?),
        "list" => Command::List,
        "info" => Command::Info(job_id_arg(&rest, "info")?),
        "result" | "results" => Command::WatchResults(job_id_arg(&rest, "result")?),
        "count" | "stats" => Command::WatchStatistics(job_id_arg(&rest, "count")?),
        "ping" => Command::Ping,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command {other:?}, try `help`")),
    };
    Ok(Some(command))
}

fn job_id_arg(rest: &[&str], verb: &str) -> Result<u16, String> {
    let Some(raw) = rest.first() else {
        return Err(format!("{verb} needs a job id"));
    };
    raw.parse::<u16>()
        .map_err(|_| format!("not a job id: {raw:?}"))
}

impl Command {
    /// The request frame this command sends, if any.
    pub fn frame(&self, id: u64) -> Option<serde_json::Value> {
        let (method, params) = match self {
            Command::Start {
                description,
                targets,
            } => (
                "job.start",
                json!({
                    "description": description,
                    "targets": targets
                        .iter()
                        .map(|address| json!({ "address": address }))
                        .collect::<Vec<_>>(),
                }),
            ),
            Command::Stop(job_id) => ("job.stop", json!({ "jobId": job_id })),
            Command::List => ("job.list", json!({})),
            Command::Info(job_id) => ("job.info", json!({ "jobId": job_id })),
            Command::WatchResults(job_id) => ("job.watchResults", json!({ "jobId": job_id })),
            Command::WatchStatistics(job_id) => {
                ("job.watchStatistics", json!({ "jobId": job_id }))
            }
            Command::Ping => ("system.ping", json!({})),
            Command::Help | Command::Quit => return None,
        };
        Some(json!({ "method": method, "params": params, "id": id }))
    }
}

/// Render one server frame for the terminal.
pub fn render(frame: &serde_json::Value) -> String {
    if let Some(event_type) = frame.get("type").and_then(|v| v.as_str()) {
        return render_event(event_type, frame);
    }
    if frame.get("success").and_then(|v| v.as_bool()) == Some(false) {
        let code = frame["error"]["code"].as_str().unwrap_or("ERROR");
        let message = frame["error"]["message"].as_str().unwrap_or("");
        return format!("error [{code}] {message}");
    }
    match frame.get("result") {
        Some(result) => serde_json::to_string_pretty(result).unwrap_or_default(),
        None => frame.to_string(),
    }
}

fn render_event(event_type: &str, frame: &serde_json::Value) -> String {
    let job_id = frame["jobId"].as_u64().unwrap_or(0);
    match event_type {
        "job.result" => {
            let data = &frame["data"];
            let rtt = match (
                data["sent_at_nanos"].as_u64(),
                data["received_at_nanos"].as_u64(),
            ) {
                (Some(sent), Some(received)) if received > sent => {
                    format!(" rtt={:.3}ms", (received - sent) as f64 / 1_000_000.0)
                }
                _ => String::new(),
            };
            format!(
                "[{job_id}] target={} seq={} {}{rtt}",
                data["target_id"].as_u64().unwrap_or(0),
                data["sequence"].as_u64().unwrap_or(0),
                data["kind"].as_str().unwrap_or("?"),
            )
        }
        "job.statistics" => {
            let counters = frame["data"]["targets"]
                .as_array()
                .map(|targets| {
                    targets
                        .iter()
                        .map(|t| {
                            format!(
                                "{}:{}",
                                t["target_id"].as_u64().unwrap_or(0),
                                t["count"].as_u64().unwrap_or(0)
                            )
                        })
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .unwrap_or_default();
            format!("[{job_id}] counts {counters}")
        }
        "job.streamEnd" => format!(
            "[{job_id}] {} stream ended",
            frame["stream"].as_str().unwrap_or("?")
        ),
        other => format!("[{job_id}] {other}: {frame}"),
    }
}
