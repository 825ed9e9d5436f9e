//! The `vex` binary: tokenizes argv into the four argument shapes spec.md
//! §6 defines, dispatches into [`vex_lib::commands::execute`], and renders
//! the result as either human-readable text or (`--json`) a single
//! canonical JSON document on stdout.

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;
use vex_lib::backend::ArgValue;
use vex_lib::commands;
use vex_lib::commands::CommandOutput;
use vex_lib::errors;
use vex_lib::errors::VexError;
use vex_lib::object_id::ObjectId as _;
use vex_lib::project::Project;

fn init_tracing() {
    let filter = std::env::var("VEX_LOG").map(EnvFilter::new).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// A parsed command line: the canonical command name, its positional
/// operands (collected under the conventional `paths` argument, the way
/// every path-taking command in this crate's registry expects them), and
/// its `--name`/`--name=value` flags.
struct ParsedCommand {
    name: String,
    json: bool,
    args: BTreeMap<String, ArgValue>,
}

/// One raw occurrence of a flag: a bare `--name` (or explicit
/// `--name=true|false`) versus a `--name=value`/`--name value` string.
enum RawFlag {
    Bare(bool),
    Str(String),
}

fn parse_args(mut argv: impl Iterator<Item = String>) -> Result<ParsedCommand, String> {
    let name = argv.next().ok_or_else(|| "usage: vex <command> [args]".to_owned())?;

    let mut json = false;
    let mut positional = Vec::new();
    let mut flags: BTreeMap<String, Vec<RawFlag>> = BTreeMap::new();
    let mut pending_flag: Option<String> = None;

    let tokens: Vec<String> = argv.by_ref().collect();
    let mut i = 0;
    while i < tokens.len() {
        let tok = &tokens[i];
        if let Some(flag) = pending_flag.take() {
            if tok.starts_with("--") {
                flags.entry(flag).or_default().push(RawFlag::Bare(true));
                // fall through: re-process this token below
            } else {
                flags.entry(flag).or_default().push(RawFlag::Str(tok.clone()));
                i += 1;
                continue;
            }
        }

        let Some(rest) = tok.strip_prefix("--") else {
            positional.push(tok.clone());
            i += 1;
            continue;
        };
        if rest.is_empty() {
            return Err("bare `--` is not a valid argument".to_owned());
        }
        if let Some((key, value)) = rest.split_once('=') {
            if key == "json" {
                json = parse_bool(value)?;
            } else if value == "true" || value == "false" {
                flags.entry(key.to_owned()).or_default().push(RawFlag::Bare(value == "true"));
            } else {
                flags.entry(key.to_owned()).or_default().push(RawFlag::Str(value.to_owned()));
            }
        } else if rest == "json" {
            json = true;
        } else {
            pending_flag = Some(rest.to_owned());
        }
        i += 1;
    }
    if let Some(flag) = pending_flag {
        flags.entry(flag).or_default().push(RawFlag::Bare(true));
    }

    let mut args = BTreeMap::new();
    for (key, values) in flags {
        if let [RawFlag::Bare(b)] = values.as_slice() {
            args.insert(key, ArgValue::Bool(*b));
            continue;
        }
        let strings: Vec<String> = values
            .into_iter()
            .map(|v| match v {
                RawFlag::Bare(b) => b.to_string(),
                RawFlag::Str(s) => s,
            })
            .collect();
        if let [single] = strings.as_slice() {
            args.insert(key, ArgValue::Single(single.clone()));
        } else {
            args.insert(key, ArgValue::Repeated(strings));
        }
    }
    if !positional.is_empty() {
        args.insert("paths".to_owned(), ArgValue::Repeated(positional));
    }

    Ok(ParsedCommand { name, json, args })
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(format!("--json expects true or false, got {other:?}")),
    }
}

fn repo_root(cwd: &Path) -> PathBuf {
    std::env::var("VEX_REPO").map(PathBuf::from).unwrap_or_else(|_| cwd.to_path_buf())
}

fn render(output: CommandOutput, json: bool) -> String {
    if json {
        return render_json(&output);
    }
    match output {
        CommandOutput::Unit => String::new(),
        CommandOutput::Message(m) => m,
        CommandOutput::Status(rows) => rows.iter().map(|r| format!("{:?}: {}", r.status, r.path)).collect::<Vec<_>>().join("\n"),
        CommandOutput::Log(lines) => lines.iter().map(|l| format!("{} {}", &l.commit.hex()[..12], l.message)).collect::<Vec<_>>().join("\n"),
        CommandOutput::UndoList(entries) => entries.iter().map(|e| format!("{} (t={})", e.command, e.timestamp)).collect::<Vec<_>>().join("\n"),
        CommandOutput::RedoList(choices) => choices.iter().map(|c| format!("{}: {} ({})", c.choice, c.label, c.command)).collect::<Vec<_>>().join("\n"),
    }
}

fn render_json(output: &CommandOutput) -> String {
    let value = match output {
        CommandOutput::Unit => serde_json::Value::Null,
        CommandOutput::Message(m) => serde_json::json!({ "message": m }),
        CommandOutput::Status(rows) => serde_json::json!(
            rows.iter().map(|r| serde_json::json!({ "path": r.path.to_string(), "status": format!("{:?}", r.status) })).collect::<Vec<_>>()
        ),
        CommandOutput::Log(lines) => serde_json::json!(
            lines
                .iter()
                .map(|l| serde_json::json!({
                    "commit": l.commit.hex(),
                    "message": l.message,
                    "timestamp_applied": l.timestamp_applied,
                }))
                .collect::<Vec<_>>()
        ),
        CommandOutput::UndoList(entries) => serde_json::json!(
            entries.iter().map(|e| serde_json::json!({ "command": e.command, "timestamp": e.timestamp })).collect::<Vec<_>>()
        ),
        CommandOutput::RedoList(choices) => serde_json::json!(
            choices.iter().map(|c| serde_json::json!({ "choice": c.choice, "label": c.label, "command": c.command })).collect::<Vec<_>>()
        ),
    };
    serde_json::to_string(&value).expect("CommandOutput always serializes")
}

fn run() -> Result<ExitCode, VexError> {
    init_tracing();

    let cwd = std::env::current_dir().map_err(|source| VexError::Io { path: PathBuf::new(), source })?;
    let root = repo_root(&cwd);

    let argv = std::env::args().skip(1);
    let parsed = match parse_args(argv) {
        Ok(p) => p,
        Err(msg) => return Err(VexError::Usage(msg)),
    };

    if parsed.name == "init" {
        let target = match parsed.args.get("paths") {
            Some(ArgValue::Repeated(v)) => v.first().map(PathBuf::from).unwrap_or_else(|| cwd.clone()),
            _ => cwd.clone(),
        };
        let project = Project::scaffold(&target)?;
        let mut args = parsed.args.clone();
        args.remove("paths");
        let output = commands::execute(&project, &target, "init", args)?;
        println!("{}", render(output, parsed.json));
        return Ok(ExitCode::SUCCESS);
    }

    let project = Project::open(&root)?;
    let output = commands::execute(&project, &cwd, &parsed.name, parsed.args)?;
    let rendered = render(output, parsed.json);
    if !rendered.is_empty() {
        println!("{rendered}");
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            if !matches!(err, VexError::RecoverableHalt(_)) {
                eprintln!("vex: {err}");
            }
            ExitCode::from(errors::exit_code(&err) as u8)
        }
    }
}
