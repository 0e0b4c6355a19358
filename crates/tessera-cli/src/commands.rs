use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::json;
use tessera_server::{ServerConfig, TesseraServer};
use tessera_shell::{Request, ServiceCatalog, ShellRegistry};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args).await,
        Command::Sites(args) => cmd_sites(args, &cli.format),
        Command::Check(args) => cmd_check(args, &cli.format).await,
        Command::Render(args) => cmd_render(args).await,
    }
}

/// Server configuration from the config file, with command-line overrides.
fn server_config(roots: &SiteRoots) -> anyhow::Result<ServerConfig> {
    let mut config = match &roots.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("reading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(sites) = &roots.sites {
        config.sites_root = sites.clone();
    }
    if !roots.module_roots.is_empty() {
        config.module_roots = roots.module_roots.clone();
    }
    Ok(config)
}

fn open_registry(config: &ServerConfig) -> anyhow::Result<ShellRegistry> {
    ShellRegistry::discover(
        &config.sites_root,
        &config.module_roots,
        Arc::new(ServiceCatalog::new()),
    )
    .with_context(|| format!("opening sites in {}", config.sites_root.display()))
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = server_config(&args.roots)?;
    if let Some(bind) = &args.bind {
        config.bind_addr = bind
            .parse()
            .with_context(|| format!("invalid bind address {bind}"))?;
    }
    config.cors |= args.cors;
    let registry = open_registry(&config)?;
    if registry.is_empty() {
        bail!("no sites found in {}", config.sites_root.display());
    }
    println!(
        "Tessera on {} ({} sites from {})",
        config.bind_addr.to_string().bold(),
        registry.len(),
        config.sites_root.display()
    );
    TesseraServer::new(config, Arc::new(registry)).serve().await?;
    Ok(())
}

fn site_summaries(registry: &ShellRegistry) -> Vec<serde_json::Value> {
    registry
        .shells()
        .iter()
        .map(|shell| {
            let settings = shell.settings();
            let modules: Vec<&str> = shell
                .available_modules()
                .iter()
                .map(|m| m.name.as_str())
                .collect();
            json!({
                "name": shell.name(),
                "hosts": settings.hosts(),
                "port": settings.port,
                "active": shell.is_active(),
                "root": settings.root_path,
                "modules": modules,
            })
        })
        .collect()
}

fn cmd_sites(args: SitesArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let config = server_config(&args.roots)?;
    let registry = open_registry(&config)?;
    let sites = site_summaries(&registry);
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&sites)?);
        return Ok(());
    }
    if sites.is_empty() {
        println!("No sites in {}.", config.sites_root.display());
    }
    for shell in registry.shells() {
        let settings = shell.settings();
        let state = if shell.is_active() {
            "active".green()
        } else {
            "inactive".dimmed()
        };
        let port = settings
            .port
            .map(|p| format!(":{p}"))
            .unwrap_or_default();
        println!(
            "{} [{}] {}{}",
            shell.name().bold(),
            state,
            settings.hosts().join(", ").cyan(),
            port
        );
        for module in shell.available_modules() {
            let theme = if module.theme { " (theme)" } else { "" };
            println!(
                "  {}{} {} services",
                module.name.yellow(),
                theme,
                module.service_count()
            );
        }
    }
    Ok(())
}

async fn cmd_check(args: SitesArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let config = server_config(&args.roots)?;
    let registry = open_registry(&config)?;
    let mut failures = Vec::new();
    let mut report = Vec::new();
    for shell in registry.shells() {
        match shell.load().await {
            Ok(_) => {
                if let OutputFormat::Text = format {
                    println!(
                        "{} {} ({})",
                        "✓".green().bold(),
                        shell.name().bold(),
                        shell.modules().join(", ")
                    );
                }
                report.push(json!({ "name": shell.name(), "ok": true, "modules": shell.modules() }));
            }
            Err(e) => {
                if let OutputFormat::Text = format {
                    println!("{} {}: {}", "✗".red().bold(), shell.name().bold(), e);
                }
                report.push(json!({ "name": shell.name(), "ok": false, "error": e.to_string() }));
                failures.push(shell.name().to_string());
            }
        }
    }
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    if !failures.is_empty() {
        bail!("{} site(s) failed to load: {}", failures.len(), failures.join(", "));
    }
    Ok(())
}

async fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let body = render(&args).await?;
    println!("{body}");
    Ok(())
}

async fn render(args: &RenderArgs) -> anyhow::Result<String> {
    let config = server_config(&args.roots)?;
    let registry = open_registry(&config)?;
    let Some(shell) = registry.get(&args.site) else {
        bail!("no site named {}", args.site);
    };
    let response = shell.handle_request(Request::get(args.path.clone())).await;
    if !response.is_success() {
        bail!("{} answered {} for {}", args.site, response.status, args.path);
    }
    Ok(response.body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn sites() -> tempfile::TempDir {
        let root = tempfile::tempdir().unwrap();
        let acme = root.path().join("acme");
        std::fs::create_dir_all(acme.join("content")).unwrap();
        std::fs::create_dir_all(acme.join("modules/theme")).unwrap();
        std::fs::write(acme.join("settings.toml"), "host = \"acme.test\"\nport = 8080\n").unwrap();
        std::fs::write(acme.join("modules/theme/module.toml"), "theme = true\n").unwrap();
        std::fs::write(
            acme.join("content/index.json"),
            r#"{ "meta": { "type": "page" } }"#,
        )
        .unwrap();
        root
    }

    fn roots(dir: &Path) -> SiteRoots {
        SiteRoots {
            config: None,
            sites: Some(dir.to_path_buf()),
            module_roots: vec![dir.join("shared")],
        }
    }

    #[test]
    fn overrides_apply_over_defaults() {
        let config = server_config(&roots(Path::new("/srv"))).unwrap();
        assert_eq!(config.sites_root, Path::new("/srv"));
        assert_eq!(config.module_roots, vec![Path::new("/srv/shared").to_path_buf()]);
    }

    #[test]
    fn summaries_list_sites_and_modules() {
        let dir = sites();
        let registry = open_registry(&server_config(&roots(dir.path())).unwrap()).unwrap();
        let sites = site_summaries(&registry);
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0]["name"], "acme");
        assert_eq!(sites[0]["port"], 8080);
        assert_eq!(sites[0]["modules"], json!(["theme"]));
    }

    #[tokio::test]
    async fn check_passes_for_valid_sites() {
        let dir = sites();
        let args = SitesArgs { roots: roots(dir.path()) };
        cmd_check(args, &OutputFormat::Json).await.unwrap();
    }

    #[tokio::test]
    async fn render_returns_the_page() {
        let dir = sites();
        let mut args = RenderArgs {
            roots: roots(dir.path()),
            site: "acme".into(),
            path: "/".into(),
        };
        let body = render(&args).await.unwrap();
        assert!(body.starts_with("<!DOCTYPE html>"));

        args.path = "/missing".into();
        assert!(render(&args).await.unwrap_err().to_string().contains("404"));
        args.site = "nope".into();
        assert!(render(&args).await.is_err());
    }
}
