use super::config::{default_config_path, default_database_path, ChamaConfig, StorageBackend};
use super::logging;
use chama::clock::SystemClock;
use chama::notify::{LogNotifier, Notifier};
use chama::persistence::{GroupStore, MemoryGroupStore, SqliteGroupStore};
use chama::protocol::handle_line;
use chama::service::ChamaService;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::info;

/// Run the group service
///
/// Reads one JSON request per line on stdin and writes one JSON response
/// per line on stdout until stdin closes.
///
/// ## Configuration Loading
///
/// 1. `--config` flag if provided
/// 2. Default config at `~/.local/share/chama/config.toml`
///
/// If the config file doesn't exist, a default one is generated.
/// `--database` and `--memory` override `[storage]`.
pub async fn execute(
    config_path: Option<String>,
    database: Option<String>,
    memory: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        ChamaConfig::create_default(&config_path, &default_database_path())?;
        eprintln!("Created default config: {}", config_path.display());
    }
    let mut config = ChamaConfig::load(&config_path)?;
    if let Some(path) = database {
        config.storage.backend = StorageBackend::Sqlite;
        config.storage.path = PathBuf::from(path);
    }
    if memory {
        config.storage.backend = StorageBackend::Memory;
    }

    logging::init(&config.logging)?;
    let rules = config.rules.resolve()?;

    let store: Arc<dyn GroupStore> = match config.storage.backend {
        StorageBackend::Sqlite => {
            if let Some(parent) = config.storage.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Arc::new(SqliteGroupStore::open(&config.storage.path, config.storage.max_connections).await?)
        }
        StorageBackend::Memory => Arc::new(MemoryGroupStore::new()),
    };

    let notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
    let service = ChamaService::new(rules, store, Arc::new(SystemClock), notifiers);
    let restored = service.restore().await?;
    info!(
        config = %config_path.display(),
        backend = ?config.storage.backend,
        groups = restored,
        "chama service ready"
    );

    let handled = serve_lines(&service, tokio::io::stdin(), tokio::io::stdout()).await?;
    info!(requests = handled, "input closed, shutting down");
    Ok(())
}

/// Answer each non-empty input line. Returns the number of requests.
pub async fn serve_lines<R, W>(
    service: &ChamaService,
    reader: R,
    mut writer: W,
) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut handled = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let reply = handle_line(service, line).await;
        writer.write_all(reply.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        handled += 1;
    }
    Ok(handled)
}
