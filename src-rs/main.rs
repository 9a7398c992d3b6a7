mod box_model;
mod color;
mod dimension;
mod dom;
mod options;
mod overlay;
mod report;
mod session;
mod snapshot;
mod surface;
mod target_size;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{ArgAction, Args, Parser, Subcommand};
use rand::Rng;
use serde_json::{json, Map, Value};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::color::{evaluate_contrast, is_large_text, parse_font_weight, truncate_ratio};
use crate::dimension::{format_mm, mm_to_pixels, round_to, PhysicalSize};
use crate::dom::{DocumentSpec, Page, SameOriginAccessor};
use crate::options::{load_json, load_settings, InspectorOptions, SETTINGS_HELP};
use crate::session::{HostEvent, InspectorSession};
use crate::surface::OverlayState;
use crate::target_size::evaluate_target_size;

const LOG_ENV: &str = "A11Y_LENS_LOG";

#[derive(Parser, Debug)]
#[command(
    name = "a11y-lens",
    version,
    about = "Hover accessibility inspector: box model, physical size, WCAG contrast and target size"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[allow(clippy::enum_variant_names)]
enum Commands {
    /// Print supported commands in JSON
    Commands,
    /// WCAG contrast ratio between two CSS colors
    Contrast(ContrastArgs),
    /// Physical size and target-size verdict for a CSS pixel box
    Measure(MeasureArgs),
    /// Print the effective inspector options for a settings file
    Settings(SettingsArgs),
    /// Replay hover events against a page description and report the overlay
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct ContrastArgs {
    /// Foreground color (rgb(), rgba() or #hex)
    foreground: String,
    /// Background color (rgb(), rgba() or #hex)
    background: String,
    /// Computed font size in px, used to pick large-text thresholds
    #[arg(long)]
    font_size: Option<f64>,
    /// Computed font weight (e.g. 400, 700, bold)
    #[arg(long)]
    font_weight: Option<String>,
}

#[derive(Args, Debug)]
struct MeasureArgs {
    /// Box width in CSS px
    #[arg(long)]
    width: f64,
    /// Box height in CSS px
    #[arg(long)]
    height: f64,
    /// Settings JSON path (or - for stdin)
    #[arg(long)]
    settings: Option<String>,
    /// Monitor diagonal in inches (overrides settings)
    #[arg(long)]
    monitor: Option<f64>,
    /// Reference resolution WIDTHxHEIGHT (overrides settings)
    #[arg(long)]
    resolution: Option<String>,
}

#[derive(Args, Debug)]
struct SettingsArgs {
    /// Settings JSON path (or - for stdin)
    #[arg(long)]
    settings: Option<String>,
    /// Print settings schema and exit
    #[arg(long, action = ArgAction::SetTrue)]
    settings_help: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Page description JSON path
    #[arg(long)]
    page: String,
    /// Event script JSON path (array of events; - for stdin)
    #[arg(long)]
    events: String,
    /// Settings JSON path
    #[arg(long)]
    settings: Option<String>,
    /// Write a PNG of the final overlay state under the output root
    #[arg(long, action = ArgAction::SetTrue)]
    snapshot: bool,
    /// Explicit PNG path for the final overlay state
    #[arg(long)]
    snapshot_out: Option<PathBuf>,
    /// Write the timeline JSON to this path as well as stdout
    #[arg(long)]
    json_out: Option<PathBuf>,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Commands => print_commands(),
        Commands::Contrast(args) => command_contrast(args),
        Commands::Measure(args) => command_measure(args),
        Commands::Settings(args) => command_settings(args),
        Commands::Inspect(args) => command_inspect(args),
    }
}

fn print_commands() -> Result<()> {
    let rows = vec![
        json!({
            "name": "contrast",
            "description": "WCAG 2 contrast ratio with AA/AAA verdicts for normal and large text."
        }),
        json!({
            "name": "measure",
            "description": "Convert a CSS pixel box to millimetres and check WCAG target size."
        }),
        json!({
            "name": "settings",
            "description": "Resolve a settings file into effective inspector options."
        }),
        json!({
            "name": "inspect",
            "description":
                "Replay hover/pause events on a page description and emit the overlay timeline."
        }),
    ];

    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "commands": rows }))?
    );
    Ok(())
}

fn command_contrast(args: ContrastArgs) -> Result<()> {
    let Some(result) = evaluate_contrast(&args.foreground, &args.background) else {
        bail!(
            "could not compute contrast for {} on {}",
            args.foreground,
            args.background
        );
    };
    let large = is_large_text(
        args.font_size.unwrap_or(16.0),
        parse_font_weight(args.font_weight.as_deref().unwrap_or("400")),
    );
    let (aa, aaa) = result.verdict(large);
    let payload = json!({
        "foreground": result.foreground,
        "background": result.background,
        "ratio": truncate_ratio(result.ratio),
        "large_text": large,
        "passes_aa": aa,
        "passes_aaa": aaa,
        "detail": result,
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn resolve_options(path: Option<&str>, overrides: Map<String, Value>) -> Result<InspectorOptions> {
    let mut settings = load_settings(path)?;
    settings.extend(overrides);
    InspectorOptions::from_settings(&settings).context("invalid monitor/resolution settings")
}

fn command_measure(args: MeasureArgs) -> Result<()> {
    let mut overrides = Map::new();
    if let Some(monitor) = args.monitor {
        overrides.insert("monitorInches".to_string(), json!(monitor));
    }
    if let Some(resolution) = args.resolution {
        overrides.insert("referenceResolution".to_string(), json!(resolution));
    }
    let options = resolve_options(args.settings.as_deref(), overrides)?;
    if !(args.width >= 0.0 && args.height >= 0.0) {
        bail!("box size must be non-negative, got {}x{}", args.width, args.height);
    }

    let size = PhysicalSize::measure(args.width, args.height, options.pixel_pitch_mm)?;
    let target = evaluate_target_size(args.width, args.height);
    let payload = json!({
        "monitor_inches": options.monitor.inches,
        "reference_resolution": options.resolution.to_string(),
        "pixel_pitch_mm": options.pixel_pitch_mm,
        "px_per_mm": round_to(mm_to_pixels(1.0, options.pixel_pitch_mm), 3),
        "size": size,
        "display": {
            "width": format_mm(size.width_mm),
            "height": format_mm(size.height_mm),
            "diagonal": format_mm(size.diagonal_mm),
        },
        "target_size": target,
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn command_settings(args: SettingsArgs) -> Result<()> {
    if args.settings_help {
        println!("{}", SETTINGS_HELP.trim());
        return Ok(());
    }
    let options = resolve_options(args.settings.as_deref(), Map::new())?;
    println!("{}", serde_json::to_string_pretty(&options)?);
    Ok(())
}

fn load_page(path: &str) -> Result<Page> {
    let raw = load_json(path)?;
    let spec: DocumentSpec = serde_json::from_value(raw)
        .with_context(|| format!("invalid page description: {path}"))?;
    Ok(Page::from_spec(spec))
}

fn load_events(path: &str) -> Result<Vec<(Value, HostEvent)>> {
    let raw = load_json(path)?;
    let Value::Array(items) = raw else {
        bail!("event script must be a JSON array: {path}");
    };
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            let event: HostEvent = serde_json::from_value(item.clone())
                .with_context(|| format!("invalid event #{idx} in {path}"))?;
            Ok((item, event))
        })
        .collect()
}

fn command_inspect(args: InspectArgs) -> Result<()> {
    let options = resolve_options(args.settings.as_deref(), Map::new())?;
    let page = load_page(&args.page)?;
    let events = load_events(&args.events)?;
    let page_url = page.top.url.clone();

    let (session, timeline) = replay(&page, &options, &events);

    let snapshot_path = match (args.snapshot_out, args.snapshot) {
        (Some(path), _) => Some(path),
        (None, true) => Some(default_snapshot_path(&page_url)),
        (None, false) => None,
    };
    if let Some(path) = &snapshot_path {
        let img = snapshot::render_snapshot(session.page(), session.surface());
        snapshot::save_snapshot(img, path)?;
    }

    let payload = json!({
        "generated_at": timestamp_iso(),
        "page_url": page_url,
        "options": options,
        "timeline": timeline,
        "final": {
            "state": session.state(),
            "overlay": session.surface(),
        },
        "snapshot_path": snapshot_path.as_deref().map(|p| abs_path(p).display().to_string()),
    });

    if let Some(json_out) = &args.json_out {
        write_json_pretty(json_out, &payload)?;
    }
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

type Session = InspectorSession<OverlayState, SameOriginAccessor>;

fn new_session(page: &Page, options: &InspectorOptions) -> Session {
    InspectorSession::new(
        page.clone(),
        OverlayState::default(),
        SameOriginAccessor,
        options.clone(),
    )
}

/// Runs the event script against one session slot; `enable` goes through
/// the re-injection entry point so a repeated enable reuses the session.
fn replay(
    page: &Page,
    options: &InspectorOptions,
    events: &[(Value, HostEvent)],
) -> (Session, Vec<Value>) {
    let mut slot: Option<Session> = None;
    let mut timeline = Vec::with_capacity(events.len());
    for (idx, (raw, event)) in events.iter().enumerate() {
        let (session, outcome) = match event {
            HostEvent::Enable => {
                InspectorSession::attach_or_reuse(&mut slot, || new_session(page, options))
            }
            _ => {
                let session = slot.get_or_insert_with(|| new_session(page, options));
                let outcome = session.dispatch(event);
                (session, outcome)
            }
        };
        timeline.push(timeline_entry(idx, raw, &outcome, session));
    }
    let session = slot.unwrap_or_else(|| new_session(page, options));
    (session, timeline)
}

fn timeline_entry(
    index: usize,
    raw: &Value,
    outcome: &session::EventOutcome,
    session: &Session,
) -> Value {
    let overlay = session.surface();
    let block = overlay
        .block
        .as_ref()
        .filter(|_| overlay.block_visible())
        .map(|b| json!({"x": b.x, "y": b.y, "title": b.lines.first()}));
    let tracking = overlay
        .tracking
        .as_ref()
        .filter(|_| overlay.tracking_visible())
        .map(|t| json!({"target": t.target, "rect": t.rect}));
    json!({
        "index": index,
        "event": raw,
        "result": outcome,
        "state": session.state(),
        "clock_ms": session.clock_ms(),
        "listeners": session.listener_count(),
        "key_listener": session.has_key_listener(),
        "hovered": session
            .controller()
            .and_then(|c| c.tracking().last_hovered.as_ref())
            .map(ToString::to_string),
        "block": block,
        "outline": overlay.outline.as_ref().map(|o| &o.target),
        "tracking": tracking,
        "notice": overlay.notice,
        "render_count": overlay.render_count,
    })
}

fn default_snapshot_path(page_url: &str) -> PathBuf {
    let slug = slugify(page_url);
    let ts = timestamp_compact();
    let rand = rand::thread_rng().gen_range(1000..9999);
    out_root()
        .join("inspect")
        .join(format!("overlay-{slug}-{ts}-{rand}.png"))
}

fn write_json_pretty(path: &Path, value: &Value) -> Result<()> {
    snapshot::ensure_parent_dir(path)?;
    let raw = serde_json::to_string_pretty(value)?;
    fs::write(path, raw).with_context(|| format!("failed to write JSON: {}", path.display()))?;
    Ok(())
}

fn out_root() -> PathBuf {
    env::var("A11Y_LENS_OUT_DIR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".a11y-lens"))
}

fn abs_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_dash = false;
    for ch in input.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() {
            out.push(lower);
            last_dash = false;
        } else if !last_dash && !out.is_empty() {
            out.push('-');
            last_dash = true;
        }
        if out.len() >= 48 {
            break;
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "page".to_string()
    } else {
        trimmed.to_string()
    }
}

fn timestamp_compact() -> String {
    Utc::now().format("%Y%m%d-%H%M%S").to_string()
}

fn timestamp_iso() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn slugify_page_urls() {
        assert_eq!(slugify("https://Shop.example/cart?id=1"), "https-shop-example-cart-id-1");
        assert_eq!(slugify("///"), "page");
    }

    #[test]
    fn writes_json_pretty() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a").join("b.json");
        write_json_pretty(&target, &json!({"ok": true})).unwrap();
        assert!(target.exists());
    }

    #[test]
    fn cli_overrides_beat_settings_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"monitorInches": 17, "referenceResolution": "1366x768"}"#).unwrap();
        let mut overrides = Map::new();
        overrides.insert("monitorInches".to_string(), json!(24));
        overrides.insert("referenceResolution".to_string(), json!("1920x1080"));
        let options = resolve_options(path.to_str(), overrides).unwrap();
        assert_eq!(options.pixel_pitch_mm, 0.277);

        let mut bad = Map::new();
        bad.insert("referenceResolution".to_string(), json!("1920"));
        assert!(resolve_options(None, bad).is_err());
    }

    #[test]
    fn replays_event_script_end_to_end() {
        let dir = tempdir().unwrap();
        let page_path = dir.path().join("page.json");
        let events_path = dir.path().join("events.json");
        fs::write(
            &page_path,
            serde_json::to_string(&json!({
                "url": "https://shop.example/",
                "viewport": {"width": 640, "height": 480},
                "root": {"tag": "html", "children": [{"tag": "body", "children": [
                    {"tag": "a", "id": "cta", "rect": {"x": 20, "y": 20, "width": 100, "height": 40},
                     "children": [{"tag": "span", "id": "cta-text", "rect": {"x": 30, "y": 30, "width": 50, "height": 16}}]}
                ]}]}
            }))
            .unwrap(),
        )
        .unwrap();
        fs::write(
            &events_path,
            serde_json::to_string(&json!([
                {"type": "enable"},
                {"type": "mouseover", "target": "cta-text"},
                {"type": "mousemove", "x": 40, "y": 40},
                {"type": "frame"}
            ]))
            .unwrap(),
        )
        .unwrap();

        let events = load_events(events_path.to_str().unwrap()).unwrap();
        assert_eq!(events.len(), 4);
        let page = load_page(page_path.to_str().unwrap()).unwrap();
        let mut map = Map::new();
        map.insert("interactionMode".to_string(), json!("tracking"));
        let options = InspectorOptions::from_settings(&map).unwrap();
        let (session, outcomes) = replay(&page, &options, &events);

        assert_eq!(outcomes[1]["result"]["outcome"], "hover");
        assert_eq!(outcomes[1]["result"]["result"], "rendered");
        assert_eq!(outcomes[1]["tracking"]["rect"]["width"], 100.0);
        assert_eq!(outcomes[3]["result"]["outcome"], "positioned");
        assert_eq!(outcomes[3]["block"]["title"], "a#cta");
        assert_eq!(session.state(), crate::session::SessionState::Enabled);
    }

    #[test]
    fn repeated_enable_reuses_the_session() {
        let page = Page::from_spec(
            serde_json::from_value(json!({
                "url": "https://shop.example/",
                "root": {"tag": "html", "children": [{"tag": "body", "children": [
                    {"tag": "p", "id": "intro", "rect": {"x": 0, "y": 0, "width": 80, "height": 20}}
                ]}]}
            }))
            .unwrap(),
        );
        let events: Vec<(Value, HostEvent)> = [
            json!({"type": "mouseover", "target": "intro"}),
            json!({"type": "enable"}),
            json!({"type": "mouseover", "target": "intro"}),
            json!({"type": "enable"}),
        ]
        .into_iter()
        .map(|raw| {
            let event = serde_json::from_value(raw.clone()).unwrap();
            (raw, event)
        })
        .collect();
        let options = InspectorOptions::from_settings(&Map::new()).unwrap();
        let (session, outcomes) = replay(&page, &options, &events);

        assert_eq!(outcomes[0]["result"]["outcome"], "ignored");
        assert_eq!(outcomes[1]["result"]["outcome"], "enabled");
        assert_eq!(outcomes[3]["result"]["outcome"], "already-enabled");
        assert_eq!(outcomes[3]["block"]["title"], "p#intro");
        assert_eq!(session.surface().render_count, 1);
    }

    #[test]
    fn rejects_non_array_event_scripts() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.json");
        fs::write(&path, r#"{"type": "enable"}"#).unwrap();
        assert!(load_events(path.to_str().unwrap()).is_err());
    }
}
