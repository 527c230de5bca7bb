use introspection_proxy::{CachingIntrospector, IntrospectionConfig, TokenIntrospector};
use log::{error, info, warn};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    // Load configuration
    let config = match IntrospectionConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let introspector = match CachingIntrospector::from_config(&config) {
        Ok(introspector) => introspector,
        Err(e) => {
            error!("Failed to initialize introspector: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Introspecting tokens against {}, one token per line on stdin, press Ctrl+C to stop",
        config.uri
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            _ = &mut shutdown => break,
            line = lines.next_line() => line,
        };
        let token = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read from stdin: {}", e);
                break;
            }
        };
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        let output = match introspector.introspect(token).await {
            Ok(principal) => serde_json::to_string(&principal),
            Err(e) if e.is_invalid_token() => {
                serde_json::to_string(&json!({ "active": false, "error": e.to_string() }))
            }
            Err(e) => {
                error!("Introspection failed: {}", e);
                serde_json::to_string(&json!({ "error": e.to_string() }))
            }
        };
        match output {
            Ok(output) => println!("{output}"),
            Err(e) => warn!("Failed to serialize introspection result: {}", e),
        }
    }

    let stats = introspector.stats();
    info!(
        "Shutdown complete: {} requests, {} hits, {} misses, {} load failures (hit rate {:.2})",
        stats.request_count(),
        stats.hits,
        stats.misses,
        stats.load_failures,
        stats.hit_rate()
    );
}

// Simple signal handler that works on all platforms
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
