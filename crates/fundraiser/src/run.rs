use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use api::{ApiContext, ApiServer};
use renderer::{
    render_still, ExportRequest, FilterParams, PreviewConfig, DEFAULT_PAPER_SEED,
    KUWAHARA_SECTORS,
};
use siteconfig::SiteConfig;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, ConfigAction, PreviewArgs, RenderArgs, ServeArgs, StyleArgs};
use crate::paths::AppPaths;

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(cli: Cli) -> Result<()> {
    let paths = AppPaths::discover()?;
    let source = paths.resolve_config(cli.config.as_deref());

    match cli.command {
        Command::Config(command) => match command.action {
            ConfigAction::Check => config_check(source.as_deref()),
            ConfigAction::Where => {
                config_where(&paths, source.as_deref());
                Ok(())
            }
        },
        Command::Serve(args) => serve(&load_config(source.as_deref())?, args),
        Command::Preview(args) => preview(&load_config(source.as_deref())?, args),
        Command::Render(args) => render(&load_config(source.as_deref())?, args),
    }
}

fn load_config(source: Option<&Path>) -> Result<SiteConfig> {
    let config = SiteConfig::load(source).with_context(|| match source {
        Some(path) => format!("failed to load configuration from {}", path.display()),
        None => "invalid configuration".to_string(),
    })?;
    tracing::debug!(
        source = %source.map(|path| path.display().to_string()).unwrap_or_else(|| "defaults".into()),
        environment = %config.environment,
        "configuration loaded"
    );
    Ok(config)
}

/// Renderer settings from the config file, overridden by command-line flags.
struct Style {
    stylize: bool,
    filter: FilterParams,
    paper_seed: u64,
}

fn resolve_style(config: &SiteConfig, args: &StyleArgs) -> Result<Style> {
    let defaults = &config.renderer;
    let radius = args.radius.unwrap_or(defaults.radius);
    let alpha = args.alpha.unwrap_or(defaults.alpha);
    let filter = FilterParams::new(radius, alpha, KUWAHARA_SECTORS)
        .context("invalid painterly filter settings")?;
    Ok(Style {
        stylize: defaults.stylize && !args.no_painterly,
        filter,
        paper_seed: args
            .paper_seed
            .or(defaults.paper_seed)
            .unwrap_or(DEFAULT_PAPER_SEED),
    })
}

fn serve(config: &SiteConfig, args: ServeArgs) -> Result<()> {
    let addr = match args.bind {
        Some(addr) => addr,
        None => config.bind_addr()?,
    };
    let context = ApiContext::from_config(config);
    let server = ApiServer::bind(addr, context)
        .with_context(|| format!("failed to start API server on {addr}"))?;
    tracing::info!(
        addr = %server.local_addr(),
        environment = %config.environment,
        "serving fundraiser api"
    );
    server.serve();
    Ok(())
}

fn preview(config: &SiteConfig, args: PreviewArgs) -> Result<()> {
    let style = resolve_style(config, &args.style)?;
    let defaults = PreviewConfig::default();
    let preview = PreviewConfig {
        surface_size: args.size.unwrap_or(defaults.surface_size),
        stylize: style.stylize,
        filter: style.filter,
        target_fps: args.fps.or(config.renderer.fps).filter(|fps| *fps > 0.0),
        paper_seed: style.paper_seed,
        confetti_seed: args.confetti_seed,
    };
    tracing::info!(
        size = %preview.surface_size,
        stylize = preview.stylize,
        radius = preview.filter.radius(),
        alpha = preview.filter.alpha(),
        fps = ?preview.target_fps,
        "opening preview window"
    );
    renderer::run_preview(preview)
}

fn render(config: &SiteConfig, args: RenderArgs) -> Result<()> {
    let style = resolve_style(config, &args.style)?;
    let mut request = ExportRequest::new(args.output, args.size);
    request.time = args.time;
    request.backend = args.backend;
    request.stylize = style.stylize;
    request.filter = style.filter;
    request.paper_seed = style.paper_seed;

    let written = render_still(&request)?;
    println!("{}", written.display());
    Ok(())
}

fn config_check(source: Option<&Path>) -> Result<()> {
    let config = load_config(source)?;
    match source {
        Some(path) => println!("# loaded from {}", path.display()),
        None => println!("# no configuration file; using defaults"),
    }
    for (present, name) in [
        (config.stripe.secret_key.is_some(), "STRIPE_SECRET_KEY"),
        (config.mailchimp.api_key.is_some(), "MAILCHIMP_API_KEY"),
        (config.mailchimp.list_id.is_some(), "MAILCHIMP_LIST_ID"),
    ] {
        if !present {
            println!("# {name} is not set");
        }
    }
    print!("{}", config.redacted().to_toml_string()?);
    Ok(())
}

fn config_where(paths: &AppPaths, source: Option<&Path>) {
    let default_file: PathBuf = paths.config_file();
    let state = if default_file.is_file() {
        "present"
    } else {
        "missing"
    };
    println!("config dir:  {}", paths.config_dir().display());
    println!("config file: {} ({state})", default_file.display());
    match source {
        Some(path) => println!("in use:      {}", path.display()),
        None => println!("in use:      built-in defaults"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_renderer_section() {
        let mut config = SiteConfig::default();
        config.renderer.radius = 3;
        config.renderer.alpha = 10.0;
        config.renderer.paper_seed = Some(9);

        let style = resolve_style(&config, &StyleArgs::default()).unwrap();
        assert!(style.stylize);
        assert_eq!(style.filter.radius(), 3);
        assert_eq!(style.filter.alpha(), 10.0);
        assert_eq!(style.paper_seed, 9);

        let args = StyleArgs {
            no_painterly: true,
            radius: Some(5),
            alpha: None,
            paper_seed: Some(1),
        };
        let style = resolve_style(&config, &args).unwrap();
        assert!(!style.stylize);
        assert_eq!(style.filter.radius(), 5);
        assert_eq!(style.filter.alpha(), 10.0);
        assert_eq!(style.paper_seed, 1);
    }

    #[test]
    fn config_can_disable_stylisation() {
        let mut config = SiteConfig::default();
        config.renderer.stylize = false;
        let style = resolve_style(&config, &StyleArgs::default()).unwrap();
        assert!(!style.stylize);
        assert_eq!(style.paper_seed, DEFAULT_PAPER_SEED);
    }
}
