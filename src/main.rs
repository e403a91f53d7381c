/// Parlor server binary
use parlor::{config::ServerConfig, context::AppContext, error::ParlorResult, server};

#[tokio::main]
async fn main() -> ParlorResult<()> {
    let config = ServerConfig::from_env()?;

    init_tracing(&config);
    print_banner();

    let ctx = AppContext::new(config).await?;
    server::serve(ctx).await?;

    Ok(())
}

fn init_tracing(config: &ServerConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| config.logging.level.parse::<tracing_subscriber::EnvFilter>())
        .unwrap_or_else(|e| {
            eprintln!(
                "WARN: log filter '{}' is invalid ({}); falling back to 'info'",
                config.logging.level, e
            );
            tracing_subscriber::EnvFilter::new("info")
        });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn print_banner() {
    println!(
        r#"
    ____             __
   / __ \____ ______/ /___  _____
  / /_/ / __ `/ ___/ / __ \/ ___/
 / ____/ /_/ / /  / / /_/ / /
/_/    \__,_/_/  /_/\____/_/

        Personal chatbot backend v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
