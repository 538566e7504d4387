/// Installs the global tracing subscriber.
///
/// `RUST_LOG` overrides the filter; `LOG_FORMAT=json` switches to JSON lines.
/// Calling this more than once is not an error.
pub fn init() -> anyhow::Result<()> {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "atlantis_portal=debug".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    let res = if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).try_init()
    };

    if let Err(e) = res {
        tracing::debug!(error = %e, "tracing subscriber already installed");
    }
    Ok(())
}
