use anyhow::Context;
use marquee_api::{app, worker, AppState, AuthConfig};
use marquee_catalog::InMemoryBackend;
use marquee_core::{Clock, SystemClock};
use marquee_order::MockPaymentAdapter;
use marquee_store::{Config, RedisSeatStore};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "marquee_api=debug,marquee_catalog=info,marquee_order=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Marquee API on port {}", config.server.port);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let payments = Arc::new(MockPaymentAdapter::new());
    let auth = AuthConfig {
        secret: config.auth.jwt_secret.clone(),
        expiration: config.auth.jwt_expiration_seconds,
    };

    let state = match &config.redis {
        Some(redis) => {
            let store = RedisSeatStore::new(&redis.url, clock.clone())
                .await
                .context("Failed to connect to Redis")?;
            for showtime in &config.showtimes {
                store.register_showtime(showtime).await?;
            }
            tracing::info!("Seat leases stored in Redis at {}", redis.url);
            AppState::new(Arc::new(store), payments, clock, auth, config.business_rules.clone())
        }
        None => {
            let memory = InMemoryBackend::new(clock.clone());
            for showtime in config.showtimes.iter().cloned() {
                memory.register(showtime)?;
            }
            tracing::info!("Seat leases kept in process memory");
            AppState::new(Arc::new(memory), payments, clock, auth, config.business_rules.clone())
        }
    };
    tracing::info!("{} showtime(s) registered", config.showtimes.len());

    let sweep_every = Duration::from_secs(config.business_rules.sweep_interval_seconds.max(1));
    tokio::spawn(worker::start_lease_sweeper(state.clone(), sweep_every));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app(state)).await.context("Server error")?;

    Ok(())
}
