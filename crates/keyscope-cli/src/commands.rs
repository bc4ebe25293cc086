use std::sync::Arc;

use bytes::Bytes;
use colored::Colorize;
use keyscope_projection::{ProjectionConfig, ProjectionService};
use keyscope_server::{KeyscopeServer, ServerConfig};
use keyscope_store::GatewayConnector;
use keyscope_types::{Identity, Node};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Serve(args) => cmd_serve(args).await,
        Command::Tree(args) => cmd_tree(args, format).await,
        Command::Get(args) => cmd_get(args, format).await,
        Command::Put(args) => cmd_put(args, format).await,
        Command::Rm(args) => cmd_rm(args).await,
        Command::Info(args) => cmd_info(args, format).await,
    }
}

async fn cmd_serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    apply_overrides(&mut config, args);
    let server = KeyscopeServer::from_config(config)?;
    println!(
        "{} keyscope listening on {} ({} backend)",
        "✓".green().bold(),
        server.config().bind_addr.to_string().bold(),
        server.config().backend
    );
    server.serve(shutdown_signal()).await?;
    Ok(())
}

fn apply_overrides(config: &mut ServerConfig, args: ServeArgs) {
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(endpoint) = args.endpoint {
        config.default_endpoint = endpoint;
    }
    if let Some(separator) = args.separator {
        config.projection.separator = separator;
    }
    if args.root_password.is_some() {
        config.projection.root_secret = args.root_password;
    }
    if args.no_auth {
        config.projection.use_auth = false;
    }
    if let Some(ca_file) = args.tls.ca_file {
        config.tls.ca_file = Some(ca_file);
    }
    if let (Some(cert_file), Some(key_file)) = (args.tls.cert_file, args.tls.key_file) {
        config.tls.cert_file = Some(cert_file);
        config.tls.key_file = Some(key_file);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
    tracing::info!("shutdown signal received");
}

async fn cmd_tree(args: TreeArgs, format: OutputFormat) -> anyhow::Result<()> {
    let (service, identity) = open(&args.conn)?;
    let result = service.project(&identity, &args.key, true).await;
    service.shutdown().await;
    let node = result?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&node)?),
        OutputFormat::Text => {
            for (depth, node) in tree_lines(&node) {
                print_line(depth, node, service.separator());
            }
        }
    }
    Ok(())
}

async fn cmd_get(args: GetArgs, format: OutputFormat) -> anyhow::Result<()> {
    let (service, identity) = open(&args.conn)?;
    let result = service.project(&identity, &args.key, false).await;
    service.shutdown().await;
    print_node(&result?, format)
}

async fn cmd_put(args: PutArgs, format: OutputFormat) -> anyhow::Result<()> {
    let (service, identity) = open(&args.conn)?;
    let result = service
        .write(&identity, &args.key, Bytes::from(args.value), args.ttl)
        .await;
    service.shutdown().await;
    let node = result?;
    if format == OutputFormat::Text {
        print!("{} ", "✓".green().bold());
    }
    print_node(&node, format)
}

async fn cmd_rm(args: RmArgs) -> anyhow::Result<()> {
    let (service, identity) = open(&args.conn)?;
    let result = service.remove(&identity, &args.key, args.recursive).await;
    service.shutdown().await;
    result?;
    let scope = if args.recursive { " and everything under it" } else { "" };
    println!("{} Deleted {}{scope}", "✓".green().bold(), args.key.yellow());
    Ok(())
}

async fn cmd_info(args: InfoArgs, format: OutputFormat) -> anyhow::Result<()> {
    let (service, identity) = open(&args.conn)?;
    let result = service.info(&identity).await;
    service.shutdown().await;
    let info = result?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
        OutputFormat::Text => {
            println!("Endpoint: {}", identity.endpoint.bold());
            println!("  Version: {}", info.version.cyan());
            println!("  Size: {}", info.size);
            println!("  Leader: {}", info.name.yellow());
        }
    }
    Ok(())
}

fn projection_config(conn: &ConnectionArgs) -> ProjectionConfig {
    ProjectionConfig {
        separator: conn.separator.clone(),
        use_auth: !conn.no_auth,
        root_secret: conn.root_password.clone(),
        connect_timeout_secs: conn.timeout,
        request_timeout_secs: conn.timeout,
        ..Default::default()
    }
}

fn identity(conn: &ConnectionArgs) -> Identity {
    match &conn.user {
        Some(user) => Identity::new(
            conn.endpoint.clone(),
            user.clone(),
            conn.password.clone().unwrap_or_default(),
        ),
        None => Identity::anonymous(conn.endpoint.clone()),
    }
}

fn open(conn: &ConnectionArgs) -> anyhow::Result<(ProjectionService, Identity)> {
    let config = projection_config(conn);
    let connector = GatewayConnector::new(
        config.connect_timeout(),
        config.request_timeout(),
        &conn.tls.to_config(),
    )?;
    let service = ProjectionService::new(config, Arc::new(connector))?;
    Ok((service, identity(conn)))
}

/// Pre-order walk paired with each node's depth below `root`.
fn tree_lines(root: &Node) -> Vec<(usize, &Node)> {
    let mut out = Vec::new();
    let mut stack = vec![(0, root)];
    while let Some((depth, node)) = stack.pop() {
        out.push((depth, node));
        stack.extend(node.children.iter().rev().map(|c| (depth + 1, c)));
    }
    out
}

/// The last path segment of `key`, or the whole key at the top.
fn label<'a>(key: &'a str, separator: &str, depth: usize) -> &'a str {
    if depth == 0 {
        return key;
    }
    key.rsplit(separator).next().unwrap_or(key)
}

fn print_line(depth: usize, node: &Node, separator: &str) {
    let indent = "  ".repeat(depth);
    let name = label(&node.key, separator, depth);
    let name = if node.is_directory {
        format!("{name}{separator}").blue().bold().to_string()
    } else {
        name.to_string()
    };
    let mut line = format!("{indent}{name}");
    if let Some(value) = node.value_text() {
        line.push_str(&format!(" = {}", value.green()));
    }
    if let Some(ttl) = node.ttl_seconds {
        line.push_str(&format!(" {}", format!("(ttl {ttl}s)").dimmed()));
    }
    println!("{line}");
}

fn print_node(node: &Node, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(node)?),
        OutputFormat::Text => {
            let value = node.value_text().unwrap_or_default();
            println!("{} = {}", node.key.bold(), value.green());
            if let Some(revision) = node.modified_revision {
                println!("  Revision: {}", revision.to_string().yellow());
            }
            if let Some(ttl) = node.ttl_seconds {
                println!("  TTL: {ttl}s");
            }
        }
    }
    Ok(())
}
