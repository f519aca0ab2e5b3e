use countersign::config::Config;
use countersign::db;
use countersign::storage::LocalBlobStore;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let config = Config::from_env().expect("Failed to load configuration");

    let pool = db::init_pool(&config)
        .await
        .expect("Failed to connect to database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let store = LocalBlobStore::open(config.storage_root.clone())
        .await
        .expect("Failed to prepare storage root");

    log::info!(
        "Ready: schema migrated, documents stored under {}, sign links point at {}",
        store.root().display(),
        config.frontend_url
    );
}
