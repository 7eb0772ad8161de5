use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::{Value, json};
use tracing::{info, warn};

use appmgr_core::app::{AppBuilder, AppManagerHandle};
use appmgr_core::config::AppMgrConfig;
use appmgr_core::domain::app::{AppDescription, AppType};
use appmgr_core::impls::{JsonFileLaunchPointStore, ScriptedLauncher, TracingEventSink};

/// 開発用のセッション: カタログを読み、アプリを起動して前面に出し、閉じる
#[derive(Debug, Parser)]
#[command(name = "appmgr", version, about = "Run a scripted app manager session")]
struct Args {
    /// TOML 設定ファイル
    #[arg(long)]
    config: Option<PathBuf>,
    /// アプリ記述の JSON 配列。省略時は組み込みのカタログ
    #[arg(long)]
    catalog: Option<PathBuf>,
    /// 起動するアプリ。省略時はカタログの先頭
    #[arg(long = "launch")]
    launch: Vec<String>,
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let config = match &args.config {
        Some(path) => AppMgrConfig::from_file(path)
            .with_context(|| format!("failed to load config: {}", path.display()))?,
        None => AppMgrConfig::default(),
    };
    let catalog = match &args.catalog {
        Some(path) => load_catalog(path)?,
        None => demo_catalog(),
    };
    let targets = if args.launch.is_empty() {
        catalog.iter().take(1).map(|app| app.id.clone()).collect()
    } else {
        args.launch.clone()
    };

    let mut builder = AppBuilder::new()
        .config(config.clone())
        .launcher(Arc::new(ScriptedLauncher::new(AppType::Native)))?
        .launcher(Arc::new(ScriptedLauncher::new(AppType::Web).starting_pid(2000)))?
        .launcher(Arc::new(ScriptedLauncher::booster().starting_pid(3000)))?
        .event_sink(Arc::new(TracingEventSink))
        .expect_runtimes(&[AppType::Native, AppType::Web, AppType::Qml]);
    if let Some(path) = &config.launch_points.db_path {
        let store = JsonFileLaunchPointStore::open(path)
            .with_context(|| format!("failed to open launch point db: {}", path.display()))?;
        builder = builder.store(store);
    }
    let (service, handle) = builder.build().context("failed to build app manager")?;
    let worker = service.spawn();

    let outcome = run_session(&handle, catalog, &targets).await;

    let counts = handle.counts().await?;
    println!("counts: {}", serde_json::to_string(&counts)?);
    handle.shutdown().await?;
    worker.await.context("event loop panicked")?;
    outcome
}

fn init_logging(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_catalog(path: &Path) -> Result<Vec<AppDescription>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog: {}", path.display()))?;
    let apps: Vec<AppDescription> = serde_json::from_str(&content)
        .with_context(|| format!("invalid catalog: {}", path.display()))?;
    if apps.is_empty() {
        bail!("catalog {} has no apps", path.display());
    }
    Ok(apps)
}

fn demo_catalog() -> Vec<AppDescription> {
    vec![
        AppDescription::new("com.example.settings", AppType::Native).with_title("Settings"),
        AppDescription::new("com.example.browser", AppType::Web)
            .with_title("Browser")
            .with_splash(),
        AppDescription::new("com.example.clock", AppType::Qml).with_title("Clock"),
    ]
}

async fn run_session(
    handle: &AppManagerHandle,
    catalog: Vec<AppDescription>,
    targets: &[String],
) -> Result<()> {
    handle.catalog_scanned(catalog)?;
    print_reply("listLaunchPoints", &handle.call("listLaunchPoints", json!({})).await?)?;

    let mut launched = Vec::new();
    for app_id in targets {
        let reply = handle.call("launch", json!({"id": app_id})).await?;
        print_reply("launch", &reply)?;
        if reply["returnValue"] == true {
            launched.push(reply);
        } else {
            warn!(%app_id, "launch failed");
        }
    }

    // 最初に起動したアプリをフルスクリーンのオーナーにする
    let snapshot: Vec<Value> = launched
        .iter()
        .enumerate()
        .map(|(i, reply)| {
            json!({
                "appId": reply["appId"],
                "displayId": reply["displayId"],
                "processId": reply["processId"],
                "windowType": if i == 0 { "_WEBOS_WINDOW_TYPE_CARD" } else { "_WEBOS_WINDOW_TYPE_OVERLAY" },
                "windowGroup": false,
            })
        })
        .collect();
    handle.push_foreground(json!({"foregroundAppInfo": snapshot}))?;
    print_reply(
        "getForegroundAppInfo",
        &handle.call("getForegroundAppInfo", json!({"extraInfo": true})).await?,
    )?;
    print_reply("running", &handle.call("running", json!({})).await?)?;

    for reply in &launched {
        let closed = handle
            .call("close", json!({"instanceId": reply["instanceId"]}))
            .await?;
        print_reply("close", &closed)?;
    }
    info!(launched = launched.len(), "session finished");
    Ok(())
}

fn print_reply(method: &str, reply: &Value) -> Result<()> {
    println!("{method}: {}", serde_json::to_string_pretty(reply)?);
    Ok(())
}
