use std::sync::Arc;

use anyhow::Context;
use crypto_watch::{
    alert_checker::AlertChecker,
    api::{ self, AppState },
    bot::TelegramNotifier,
    credentials::CredentialRotator,
    db::{ KeyValueStore, MemoryKeyValueStore, SeaOrmKeyValueStore },
    notify::{ LogNotifier, NotificationDispatcher, Notifier },
    providers::{
        http_client,
        BinanceProvider,
        CoinGeckoProvider,
        MempoolProvider,
        MoralisProvider,
        PriceProvider,
        PriceProviders,
        TransactionProvider,
    },
    scheduler::MonitorScheduler,
    services::{ Poller, PriceAlertService, WatchlistService },
    store::StateStore,
    Config,
};
use sea_orm_migration::MigratorTrait;
use tracing_subscriber::{ layer::SubscriberExt, util::SubscriberInitExt };

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber
        ::registry()
        .with(
            tracing_subscriber::EnvFilter
                ::try_from_default_env()
                .unwrap_or_else(|_| "crypto_watch=debug,tower_http=debug".into())
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    tracing::info!(source = %config.data_source, "Starting crypto-watch");

    let backend: Arc<dyn KeyValueStore> = match &config.database_url {
        Some(url) => {
            let db = sea_orm::Database::connect(url).await.context("Failed to connect to database")?;
            tracing::info!("Database connected successfully");

            migration::Migrator::up(&db, None).await.context("Failed to run migrations")?;
            tracing::info!("Migrations completed successfully");

            Arc::new(SeaOrmKeyValueStore::new(db))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, state will not survive a restart");
            Arc::new(MemoryKeyValueStore::new())
        }
    };

    let store = Arc::new(StateStore::load(backend, config.data_source).await);

    let client = http_client(config.request_timeout)?;
    let coingecko = Arc::new(
        CoinGeckoProvider::new(
            client.clone(),
            &config.endpoints.coingecko,
            config.coingecko_api_key.clone()
        )
    );
    let binance = Arc::new(BinanceProvider::new(client.clone(), &config.endpoints.binance));
    let price_providers = PriceProviders::new(
        vec![coingecko.clone() as Arc<dyn PriceProvider>, binance as Arc<dyn PriceProvider>]
    );

    let mut transaction_providers: Vec<Arc<dyn TransactionProvider>> = vec![
        Arc::new(MempoolProvider::new(client.clone(), &config.endpoints.mempool))
    ];
    let credentials = if config.moralis_api_keys.is_empty() {
        tracing::warn!("MORALIS_API_KEYS not set, EVM wallets will not be monitored");
        None
    } else {
        let pool = Arc::new(CredentialRotator::new("moralis", config.moralis_api_keys.clone())?);
        tracing::info!(keys = pool.status().await.total, "Moralis credential pool initialized");
        transaction_providers.push(
            Arc::new(MoralisProvider::new(client.clone(), &config.endpoints.moralis, pool.clone()))
        );
        Some(pool)
    };

    let poller = Arc::new(Poller::new(price_providers, transaction_providers));

    let mut sinks: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
    if let Some(telegram) = &config.telegram {
        sinks.push(Arc::new(TelegramNotifier::new(&telegram.bot_token, telegram.chat_id)));
        tracing::info!("Telegram notifications enabled");
    }
    let dispatcher = NotificationDispatcher::new(sinks);

    let checker = Arc::new(
        AlertChecker::new(store.clone(), poller, dispatcher, config.warning_interval)
    );
    let scheduler = Arc::new(MonitorScheduler::new(checker.clone(), config.poll_intervals));
    scheduler.start().await;

    let app_state = AppState::new(
        store.clone(),
        Arc::new(WatchlistService::new(store.clone(), coingecko)),
        Arc::new(PriceAlertService::new(store.clone())),
        checker,
        scheduler.clone(),
        credentials
    );

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener
        ::bind(&addr).await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    axum
        ::serve(listener, api::router(app_state))
        .with_graceful_shutdown(shutdown_signal()).await
        .context("Server error")?;

    scheduler.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
