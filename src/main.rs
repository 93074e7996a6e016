use clap::Parser;
use dremioai::app::App;
use dremioai::services::registry::ModeSet;
use dremioai::services::settings::SettingsOverrides;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dremioai", version, about = "MCP server for a Dremio analytics cluster")]
struct Cli {
    /// Config file (default: $DREMIOAI_CONFIG or ~/.config/dremioai/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tool modes to expose, e.g. FOR_SELF or FOR_SELF,FOR_PROMETHEUS
    #[arg(short, long)]
    mode: Vec<String>,

    #[arg(long)]
    uri: Option<String>,

    /// Personal access token, or @file to read it from a file
    #[arg(long)]
    pat: Option<String>,

    #[arg(long)]
    project_id: Option<String>,

    /// Print the exposed tool names and exit
    #[arg(long)]
    list_tools: bool,

    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn overrides(&self) -> Result<SettingsOverrides, String> {
        let mode = if self.mode.is_empty() {
            None
        } else {
            Some(self.mode.join(",").parse::<ModeSet>()?)
        };
        Ok(SettingsOverrides {
            uri: self.uri.clone(),
            pat: self.pat.clone(),
            project_id: self.project_id.clone(),
            mode,
            log_json: self.log_json,
        })
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let overrides = match cli.overrides() {
        Ok(overrides) => overrides,
        Err(err) => {
            eprintln!("dremioai: --mode: {}", err);
            std::process::exit(2);
        }
    };
    let app = match App::load(cli.config.as_deref(), &overrides) {
        Ok(app) => app,
        Err(err) => {
            eprintln!("dremioai: {}", err);
            std::process::exit(1);
        }
    };

    if cli.list_tools {
        for name in app.exposed_tool_names() {
            println!("{}", name);
        }
        return;
    }

    if let Err(err) = dremioai::mcp::server::run_stdio(app).await {
        eprintln!("dremioai: {}", err);
        std::process::exit(1);
    }
}
