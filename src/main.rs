use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use treeledger::orchestration::Registrar;
use treeledger::{
    api, db::init_db, Config, Dispatcher, NoopNotifier, Notifier, Repository, TimeMs, WebhookNotifier,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("configuration error")?;
    let port = config.port;

    let pool = init_db(&config.database_path)
        .await
        .with_context(|| format!("failed to initialize database at {}", config.database_path))?;
    let repo = Arc::new(Repository::new(pool));

    let notifier: Arc<dyn Notifier> = match WebhookNotifier::from_config(&config.notify)
        .context("invalid notification webhook")?
    {
        Some(webhook) => {
            tracing::info!("Webhook notifications enabled");
            Arc::new(webhook)
        }
        None => Arc::new(NoopNotifier),
    };
    let notifications = Dispatcher::spawn(notifier);

    if let Some(root) = &config.root {
        let registrar = Registrar::new(repo.clone(), notifications.clone(), &config);
        if let Some(member) = registrar
            .bootstrap_root(root, TimeMs::now())
            .await
            .context("failed to create root member")?
        {
            tracing::info!(
                member_id = %member.id,
                referral_code = %member.referral_code,
                "Bootstrapped empty tree"
            );
        }
    }

    let app = api::create_router(api::AppState::new(repo, config, notifications));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
