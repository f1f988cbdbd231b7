use anyhow::{Context, Result};
use clap::Parser;
use dockwatch::cli::{Cli, Command, View, WatchArgs};
use dockwatch::config::{AppConfig, HostKeyMode};
use dockwatch::output::{OutputMode, Presenter};
use dockwatch::transport::ssh_config::{SshConfigFile, parse_user_host, resolve_alias};
use dockwatch::transport::{HostKeyPolicy, LocalTransport, RemoteTransport, Transport};
use dockwatch::*;
use futures_util::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

/// Grace period for webhook deliveries when a command finishes.
const ALERT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

/// Where the docker queries run and which host the probes hit.
struct Backend {
    source: Arc<dyn source::TargetSource>,
    probe_host: String,
    remote: bool,
}

/// Prober plus the webhook alerter behind it, if any.
struct Probing {
    prober: Arc<probe::Prober>,
    alerter: Option<Arc<alert::WebhookAlerter>>,
}

impl Probing {
    async fn flush(&self) {
        if let Some(alerter) = &self.alerter {
            alerter.flush(ALERT_FLUSH_TIMEOUT).await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut app_config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    cli.apply(&mut app_config);
    app_config.validate()?;

    let mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Received shutdown signal");
        let _ = shutdown_tx.send(());
    });

    let command = cli.subcommand();
    let needs_daemon = matches!(command, Command::Stats | Command::Events | Command::Logs(_))
        || matches!(&command, Command::Watch(w) if w.view == View::Stats);
    if needs_daemon && (cli.host.is_some() || cli.remote.is_some()) {
        anyhow::bail!("stats, events and logs read the local docker daemon; drop --host/--remote");
    }

    match command {
        Command::State => {
            let backend = backend(&cli, &app_config).await?;
            let targets = backend.source.list_targets().await?;
            Presenter::stdout(mode).targets(&targets)?;
        }
        Command::Service(_) => {
            let backend = backend(&cli, &app_config).await?;
            let probing = probing(&app_config, &backend)?;
            let targets = backend.source.list_targets().await?;
            let results = probing
                .prober
                .probe_all(&targets, app_config.probe.threshold())
                .await;
            Presenter::stdout(mode).probes(&results)?;
            probing.flush().await;
        }
        Command::Stats => {
            let repo = docker_repo::DockerRepo::connect(app_config.docker.socket.as_deref())?
                .with_filters(cli.filters.clone());
            let samples = repo.sample_stats().await?;
            Presenter::stdout(mode).stats(&samples)?;
        }
        Command::Watch(args) => {
            watch(&cli, &app_config, &args, mode, shutdown_rx).await?;
        }
        Command::Events => {
            let repo = docker_repo::DockerRepo::connect(app_config.docker.socket.as_deref())?;
            let mut presenter = Presenter::stdout(mode);
            let mut events = std::pin::pin!(repo.stream_events());
            let mut shutdown_rx = shutdown_rx;
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    next = events.next() => match next {
                        Some(Ok(event)) => presenter.event(&event)?,
                        Some(Err(e)) => {
                            return Err(anyhow::Error::from(e).context("docker event stream"));
                        }
                        None => break,
                    },
                }
            }
        }
        Command::Logs(args) => {
            let repo = docker_repo::DockerRepo::connect(app_config.docker.socket.as_deref())?;
            let mut out = Presenter::stdout(mode);
            let mut err = Presenter::new(std::io::stderr(), mode);
            let mut lines = std::pin::pin!(repo.stream_logs(&args.container, args.tail, args.follow));
            let mut shutdown_rx = shutdown_rx;
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    next = lines.next() => match next {
                        Some(Ok(line)) => match (line.stream, mode) {
                            (models::LogStream::Stderr, OutputMode::Human) => err.log_line(&line)?,
                            _ => out.log_line(&line)?,
                        },
                        Some(Err(e)) => {
                            return Err(anyhow::Error::from(e)
                                .context(format!("logs of {}", args.container)));
                        }
                        None => break,
                    },
                }
            }
        }
        Command::Serve { .. } => {
            let backend = backend(&cli, &app_config).await?;
            let probing = probing(&app_config, &backend)?;
            let metrics = metrics::Metrics::new().context("cannot register metrics")?;
            let stats: Option<Arc<dyn stats::StatsSource>> = if backend.remote {
                tracing::info!("container stats are not exported for remote hosts");
                None
            } else {
                match docker_repo::DockerRepo::connect(app_config.docker.socket.as_deref()) {
                    Ok(repo) => Some(Arc::new(repo.with_filters(cli.filters.clone()))),
                    Err(e) => {
                        tracing::warn!(error = %e, "docker daemon unavailable, /metrics without stats");
                        None
                    }
                }
            };
            let app = routes::app(
                backend.source.clone(),
                probing.prober.clone(),
                app_config.probe.threshold(),
                metrics,
                stats,
            );
            let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
            let listener = tokio::net::TcpListener::bind(&addr)
                .await
                .with_context(|| format!("cannot bind {}", addr))?;
            tracing::warn!("Listening on http://{}", addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await?;
            probing.flush().await;
        }
    }

    Ok(())
}

async fn watch(
    cli: &Cli,
    config: &AppConfig,
    args: &WatchArgs,
    mode: OutputMode,
    shutdown_rx: oneshot::Receiver<()>,
) -> Result<()> {
    let interval = args
        .interval
        .unwrap_or(Duration::from_secs(config.watch.interval_secs));
    anyhow::ensure!(!interval.is_zero(), "--interval must be > 0");
    let refresh = refresh::RefreshLoop::new(interval).stop_on_error(config.watch.stop_on_error);
    let mut presenter = Presenter::stdout(mode);

    let report = match args.view {
        View::State => {
            let backend = backend(cli, config).await?;
            let source = backend.source.as_ref();
            refresh
                .run(
                    || async move { Ok::<_, anyhow::Error>(source.list_targets().await?) },
                    |targets: &Vec<models::Target>| {
                        presenter.clear_screen()?;
                        presenter.targets(targets)?;
                        Ok(())
                    },
                    shutdown_rx,
                )
                .await?
        }
        View::Service => {
            let backend = backend(cli, config).await?;
            let probing = probing(config, &backend)?;
            let source = backend.source.as_ref();
            let prober = probing.prober.as_ref();
            let threshold = config.probe.threshold();
            let report = refresh
                .run(
                    || async move {
                        let targets = source.list_targets().await?;
                        Ok::<_, anyhow::Error>(prober.probe_all(&targets, threshold).await)
                    },
                    |results: &Vec<models::ProbeResult>| {
                        presenter.clear_screen()?;
                        presenter.probes(results)?;
                        Ok(())
                    },
                    shutdown_rx,
                )
                .await;
            probing.flush().await;
            report?
        }
        View::Stats => {
            let repo = docker_repo::DockerRepo::connect(config.docker.socket.as_deref())?
                .with_filters(cli.filters.clone());
            let repo = &repo;
            refresh
                .run(
                    || async move { repo.sample_stats().await },
                    |samples: &Vec<models::StatSample>| {
                        presenter.clear_screen()?;
                        presenter.stats(samples)?;
                        Ok(())
                    },
                    shutdown_rx,
                )
                .await?
        }
    };
    tracing::info!(
        cycles = report.cycles,
        failed = report.failed_cycles,
        "watch finished"
    );
    Ok(())
}

async fn backend(cli: &Cli, config: &AppConfig) -> Result<Backend> {
    let endpoint = match (&cli.host, &cli.remote, &cli.identity) {
        (Some(alias), _, _) => {
            let lookup = SshConfigFile::new(&config.ssh.config_path);
            Some(resolve_alias(&lookup, alias).await?)
        }
        (None, Some(user_host), Some(key)) => Some(parse_user_host(user_host, key)?),
        _ => None,
    };

    let (transport, probe_host, remote): (Arc<dyn Transport>, String, bool) = match endpoint {
        Some(endpoint) => {
            let policy = match config.ssh.host_key_policy {
                HostKeyMode::Strict => HostKeyPolicy::Strict {
                    known_hosts: config
                        .ssh
                        .known_hosts
                        .as_deref()
                        .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned())),
                },
                HostKeyMode::AcceptAny => HostKeyPolicy::AcceptAny,
            };
            let host = endpoint.host.clone();
            let transport = RemoteTransport::new(
                endpoint,
                policy,
                &config.ssh,
                Duration::from_secs(config.docker.command_timeout_secs),
            );
            (Arc::new(transport), host, true)
        }
        None => (
            Arc::new(LocalTransport::new(&config.docker)),
            config.probe.host.clone(),
            false,
        ),
    };
    tracing::info!(transport = %transport.describe(), remote, "using transport");

    let source = source::DockerCliSource::new(transport).with_filters(cli.filters.clone());
    Ok(Backend {
        source: Arc::new(source),
        probe_host,
        remote,
    })
}

fn probing(config: &AppConfig, backend: &Backend) -> Result<Probing> {
    let client = reqwest::Client::builder()
        .build()
        .context("cannot build http client")?;
    let mut prober =
        probe::Prober::from_config(client.clone(), &config.probe).with_host(&backend.probe_host);
    let mut alerter = None;
    if let Some(url) = &config.alert.webhook_url {
        let webhook = Arc::new(alert::WebhookAlerter::new(client, url.clone()));
        let dispatcher = alert::AlertDispatcher::new(webhook.clone(), config.alert.policy);
        prober = prober.with_alerts(Arc::new(dispatcher));
        alerter = Some(webhook);
    }
    Ok(Probing {
        prober: Arc::new(prober),
        alerter,
    })
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
