use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;

use strata_state::{BackendConfig, BackendError, LockInfo, StateBackend, create_backend};

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Remote state storage with locking", long_about = None)]
struct Cli {
    /// Path to the backend configuration (JSON)
    #[arg(long, short, global = true, default_value = "backend.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current state to stdout
    Pull,
    /// Upload a state file, replacing the remote copy
    Push {
        /// Path to the state file
        file: PathBuf,

        /// Hold the state lock while uploading
        #[arg(long)]
        lock: bool,

        /// Operation recorded in the lock
        #[arg(long, default_value = "push")]
        operation: String,
    },
    /// Delete the remote state
    Delete,
    /// Acquire the state lock and print its ID
    Lock {
        /// Operation recorded in the lock
        #[arg(long, default_value = "lock")]
        operation: String,

        /// Free-form reason shown to anyone blocked by the lock
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Release the state lock held under ID
    ///
    /// Locks never expire; use `lock-info` to find the ID of a stale lock.
    Unlock {
        /// Lock ID
        id: String,
    },
    /// Show who holds the state lock
    LockInfo,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = run(cli).await;

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let backend = load_backend(&cli.config).await?;

    match cli.command {
        Commands::Pull => run_pull(backend.as_ref()).await,
        Commands::Push {
            file,
            lock,
            operation,
        } => run_push(backend.as_ref(), &file, lock, &operation).await,
        Commands::Delete => run_delete(backend.as_ref()).await,
        Commands::Lock { operation, reason } => {
            run_lock(backend.as_ref(), &operation, &reason).await
        }
        Commands::Unlock { id } => run_unlock(backend.as_ref(), &id).await,
        Commands::LockInfo => run_lock_info(backend.as_ref()).await,
    }
}

async fn load_backend(path: &Path) -> Result<Box<dyn StateBackend>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    let config = BackendConfig::from_json(&content).map_err(|e| e.to_string())?;

    log::debug!("Using {} backend from {}", config.backend_type, path.display());

    create_backend(&config).await.map_err(|e| e.to_string())
}

async fn run_pull(backend: &dyn StateBackend) -> Result<(), String> {
    match backend.get().await.map_err(|e| e.to_string())? {
        Some(payload) => {
            let mut stdout = std::io::stdout();
            stdout
                .write_all(payload.as_bytes())
                .and_then(|_| stdout.flush())
                .map_err(|e| format!("Failed to write state: {}", e))
        }
        None => {
            eprintln!("{}", "No state found.".yellow());
            Ok(())
        }
    }
}

async fn run_push(
    backend: &dyn StateBackend,
    file: &Path,
    lock: bool,
    operation: &str,
) -> Result<(), String> {
    let data = fs::read(file).map_err(|e| format!("Failed to read {}: {}", file.display(), e))?;

    let lock_id = if lock {
        let mut info = LockInfo::new(operation);
        Some(backend.lock(&mut info).await.map_err(describe_error)?)
    } else {
        None
    };

    let pushed = backend.put(&data).await;

    // Release even when the upload failed, and report both failures
    if let Some(id) = lock_id
        && let Err(e) = backend.unlock(&id).await
    {
        let mut message = describe_error(e);
        if let Err(push_err) = &pushed {
            message = format!("{}\n{}", push_err, message);
        }
        return Err(message);
    }

    pushed.map_err(|e| e.to_string())?;
    println!(
        "{} {} ({} bytes)",
        "Pushed".green().bold(),
        file.display(),
        data.len()
    );
    Ok(())
}

async fn run_delete(backend: &dyn StateBackend) -> Result<(), String> {
    backend.delete().await.map_err(|e| e.to_string())?;
    println!("{}", "State deleted.".green());
    Ok(())
}

async fn run_lock(
    backend: &dyn StateBackend,
    operation: &str,
    reason: &str,
) -> Result<(), String> {
    let mut info = LockInfo::new(operation).with_info(reason);
    let id = backend.lock(&mut info).await.map_err(describe_error)?;

    if id.is_empty() {
        println!("{}", "Locking is not configured for this backend.".yellow());
    } else {
        println!("{}", id);
    }
    Ok(())
}

async fn run_unlock(backend: &dyn StateBackend, id: &str) -> Result<(), String> {
    backend.unlock(id).await.map_err(describe_error)?;
    println!("{}", "State unlocked.".green());
    Ok(())
}

async fn run_lock_info(backend: &dyn StateBackend) -> Result<(), String> {
    match backend.lock_info().await {
        Ok(info) => {
            println!("{}", info);
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            println!("{}", "State is not locked.".green());
            Ok(())
        }
        Err(e) => Err(e.to_string()),
    }
}

/// Format a lock error, pointing at `unlock` when another holder is known
fn describe_error(err: BackendError) -> String {
    match &err {
        BackendError::LockConflict {
            info: Some(info), ..
        } => format!(
            "{}\n\n{} if this lock is stale, release it with `strata unlock {}`",
            err,
            "Hint:".yellow().bold(),
            info.id
        ),
        _ => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_state::TransportError;

    #[test]
    fn test_cli_parses_push() {
        let cli = Cli::parse_from([
            "strata",
            "--config",
            "prod.json",
            "push",
            "state.json",
            "--lock",
        ]);

        assert_eq!(cli.config, PathBuf::from("prod.json"));
        match cli.command {
            Commands::Push {
                file,
                lock,
                operation,
            } => {
                assert_eq!(file, PathBuf::from("state.json"));
                assert!(lock);
                assert_eq!(operation, "push");
            }
            _ => panic!("Expected push command"),
        }
    }

    #[test]
    fn test_cli_default_config() {
        let cli = Cli::parse_from(["strata", "lock-info"]);
        assert_eq!(cli.config, PathBuf::from("backend.json"));
        assert!(matches!(cli.command, Commands::LockInfo));
    }

    #[test]
    fn test_describe_error_names_holder() {
        let mut holder = LockInfo::new("apply").with_id("lock-1");
        holder.who = "alice@ci".to_string();
        let err = BackendError::LockConflict {
            info: Some(Box::new(holder)),
            source: Box::new(TransportError::ConditionFailed.into()),
        };

        let text = describe_error(err);
        assert!(text.contains("Who:       alice@ci"));
        assert!(text.contains("strata unlock lock-1"));
    }

    #[tokio::test]
    async fn test_push_with_lock_against_memory_backend() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("state.json");
        fs::write(&file, b"{\"serial\": 3}").unwrap();

        let config =
            BackendConfig::from_json(r#"{"backend": "memory", "lock_table": "locks"}"#).unwrap();
        let backend = create_backend(&config).await.unwrap();

        run_push(backend.as_ref(), &file, true, "push").await.unwrap();
        let payload = backend.get().await.unwrap().unwrap();
        assert_eq!(payload.as_bytes(), b"{\"serial\": 3}");

        // The lock taken for the push was released
        assert!(backend.lock_info().await.unwrap_err().is_not_found());
    }
}
