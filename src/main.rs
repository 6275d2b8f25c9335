use std::sync::Arc;

use anyhow::Context;
use medikiosk::{
    case::{CaseStorePersistence, CaseStorePort, MemoryCaseStore},
    catalog::{MedicineCatalogPort, StaticCatalog, SymptomCatalogPort},
    cli::config_path_from_args,
    config::Config,
    dispense::{DeviceGatewayPort, DispenseOrchestrator, HttpDeviceGateway},
    kiosk::Kiosk,
    logging::init_tracing,
    server,
    triage::TriageEngine,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = config_path_from_args()?;
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let _logging_guard = init_tracing(&config.logging)?;

    let catalog = Arc::new(
        StaticCatalog::load(&config.catalog.path)
            .with_context(|| format!("failed to load catalog {}", config.catalog.path.display()))?,
    );
    let store: Arc<dyn CaseStorePort> = Arc::new(
        MemoryCaseStore::open(
            CaseStorePersistence::new(config.store.state_path.clone()),
            config.store.initial_stock.clone(),
        )
        .with_context(|| format!("failed to open {}", config.store.state_path.display()))?,
    );
    let gateway: Arc<dyn DeviceGatewayPort> = Arc::new(
        HttpDeviceGateway::new(
            config.device.base_url.clone(),
            config.device.dispense_timeout(),
            config.device.status_timeout(),
        )
        .context("failed to build dispenser gateway")?,
    );

    let symptoms: Arc<dyn SymptomCatalogPort> = catalog.clone();
    let medicines: Arc<dyn MedicineCatalogPort> = catalog;
    let triage = TriageEngine::new(
        Arc::clone(&symptoms),
        Arc::clone(&medicines),
        Arc::clone(&store),
        config.triage_settings(),
    );
    let dispense = DispenseOrchestrator::new(
        Arc::clone(&medicines),
        store,
        gateway,
        config.dispense_settings(),
    );
    let kiosk = Arc::new(Kiosk::new(symptoms, medicines, triage, dispense));

    tracing::info!(
        target: "server",
        config = %config_path.display(),
        dispenser = %config.device.base_url,
        "medikiosk_starting"
    );
    server::run(&config.server.socket_path, kiosk).await
}
