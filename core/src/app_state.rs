use std::path::PathBuf;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use crate::api::client::ApiClient;
use crate::config_store::{AppConfig, ConfigStore};
use crate::errors::{WalletError, WalletResult};
use crate::rates::ExchangeRateService;
use crate::session::{AuthHandle, SessionManager};
use crate::storage::{SessionStore, StoragePaths};
use crate::transfer::TransferWorkflow;
use crate::wallet::WalletService;

/// Owns every service in the wallet core and wires them together.
///
/// Nothing here is ambient: consumers receive the services they need
/// from this context instead of importing globals, so tests can build a
/// context over a throwaway directory and fake backend.
pub struct WalletContext {
    paths: StoragePaths,
    config_store: ConfigStore,
    client: Arc<ApiClient>,
    session: SessionManager,
    rates: ExchangeRateService,
    transfer: TransferWorkflow,
    wallet: WalletService,
    environment: String,
}

impl WalletContext {
    pub fn initialize(root_dir: PathBuf) -> WalletResult<Self> {
        let environment =
            std::env::var("RIPPLEPAY_ENV").unwrap_or_else(|_| "development".to_string());
        let paths = StoragePaths::new(&root_dir)?;
        paths.ensure_directories()?;

        let config_store = ConfigStore::from_paths(&paths);
        let config = config_store.load_or_default(environment.clone())?;

        let auth = AuthHandle::default();
        let client = Arc::new(ApiClient::new(
            config.network.base_url.clone(),
            Duration::from_secs(config.network.request_timeout_secs),
            auth.clone(),
        )?);

        let session = SessionManager::new(
            auth,
            Arc::clone(&client),
            SessionStore::from_paths(&paths),
        );
        session.initialize();

        let rates = ExchangeRateService::new(
            Arc::clone(&client),
            Duration::from_secs(config.rates.refresh_interval_secs),
        );
        let transfer = TransferWorkflow::new(
            Arc::clone(&client),
            Duration::from_millis(config.transfer.scan_debounce_ms),
        );
        let wallet = WalletService::new(Arc::clone(&client));

        log::info!("Wallet core initialized for environment '{}'", environment);

        Ok(Self {
            paths,
            config_store,
            client,
            session,
            rates,
            transfer,
            wallet,
            environment,
        })
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn rates(&self) -> &ExchangeRateService {
        &self.rates
    }

    pub fn transfer(&self) -> &TransferWorkflow {
        &self.transfer
    }

    pub fn wallet(&self) -> &WalletService {
        &self.wallet
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.config_store
    }

    pub fn api_client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn load_config(&self) -> WalletResult<AppConfig> {
        self.config_store.load_or_default(self.environment.clone())
    }

    /// Persist a config change and rebuild the services that depend on it.
    ///
    /// Auth state survives the rebuild; the polling timer does not and
    /// must be restarted by the caller if it was running.
    pub fn update_config<F>(&mut self, updater: F) -> WalletResult<AppConfig>
    where
        F: FnOnce(&mut AppConfig) -> WalletResult<()>,
    {
        let updated = self
            .config_store
            .update(self.environment.clone(), updater)?;
        self.rebuild(&updated)?;
        Ok(updated)
    }

    /// Stop background work before teardown.
    pub fn shutdown(&self) {
        self.rates.stop_auto_update();
    }

    fn rebuild(&mut self, config: &AppConfig) -> WalletResult<()> {
        self.rates.stop_auto_update();

        let auth = self.session.auth_handle();
        let client = Arc::new(ApiClient::new(
            config.network.base_url.clone(),
            Duration::from_secs(config.network.request_timeout_secs),
            auth.clone(),
        )?);

        self.session = SessionManager::new(
            auth,
            Arc::clone(&client),
            SessionStore::from_paths(&self.paths),
        );
        self.rates = ExchangeRateService::new(
            Arc::clone(&client),
            Duration::from_secs(config.rates.refresh_interval_secs),
        );
        self.transfer = TransferWorkflow::new(
            Arc::clone(&client),
            Duration::from_millis(config.transfer.scan_debounce_ms),
        );
        self.wallet = WalletService::new(Arc::clone(&client));
        self.client = client;
        Ok(())
    }
}

/// Shared wallet context exposed to the embedding application layer.
#[derive(Clone)]
pub struct SharedWalletContext(pub Arc<RwLock<WalletContext>>);

impl SharedWalletContext {
    pub fn new(inner: WalletContext) -> Self {
        Self(Arc::new(RwLock::new(inner)))
    }

    pub fn read<F, T>(&self, op: F) -> WalletResult<T>
    where
        F: FnOnce(&WalletContext) -> WalletResult<T>,
    {
        let guard = self
            .0
            .read()
            .map_err(|_| WalletError::Unknown("Poisoned wallet context".into()))?;
        op(&guard)
    }

    pub fn write<F, T>(&self, op: F) -> WalletResult<T>
    where
        F: FnOnce(&mut WalletContext) -> WalletResult<T>,
    {
        let mut guard = self
            .0
            .write()
            .map_err(|_| WalletError::Unknown("Poisoned wallet context".into()))?;
        op(&mut guard)
    }
}
