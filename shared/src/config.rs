use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::api::RecipeApi;
use crate::capabilities::{
    HttpClient, HttpError, HttpTransport, KeyValueStore, KvError, ValidatedUrl, MAX_TIMEOUT_MS,
};
use crate::chat::ChatSession;
use crate::debounce::Debouncer;
use crate::list::ListController;
use crate::prefs::Preferences;
use crate::recipe::RecipeController;
use crate::rpc_client::RpcClient;
use crate::toast::Toasts;
use crate::upload::{ImageUploader, Uploader};

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_RPC_PATH: &str = "/api/trpc";
pub const DEFAULT_UPLOAD_PATH: &str = "/api/upload";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_RECIPE_CACHE_CAPACITY: usize = 64;
pub const DEFAULT_SEARCH_DEBOUNCE_MS: u64 = 300;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid base URL: {0}")]
    BaseUrl(String),
    #[error("{field} must start with '/'")]
    RelativePath { field: &'static str },
    #[error("{field} must be between 1 and {max} ms")]
    Timeout { field: &'static str, max: u64 },
    #[error("recipe_cache_capacity must be at least 1")]
    CacheCapacity,
}

/// Where the backend lives and how the client paces itself. Missing fields
/// take their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub rpc_path: String,
    pub upload_path: String,
    pub request_timeout_ms: u64,
    pub upload_timeout_ms: u64,
    pub recipe_cache_capacity: usize,
    pub search_debounce_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            rpc_path: DEFAULT_RPC_PATH.into(),
            upload_path: DEFAULT_UPLOAD_PATH.into(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            upload_timeout_ms: DEFAULT_UPLOAD_TIMEOUT_MS,
            recipe_cache_capacity: DEFAULT_RECIPE_CACHE_CAPACITY,
            search_debounce_ms: DEFAULT_SEARCH_DEBOUNCE_MS,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base = ValidatedUrl::new(self.base_url.clone())
            .map_err(|e| ConfigError::BaseUrl(e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ConfigError::BaseUrl(format!(
                "unsupported scheme '{}'",
                base.scheme()
            )));
        }
        for (field, path) in [("rpc_path", &self.rpc_path), ("upload_path", &self.upload_path)] {
            if !path.starts_with('/') {
                return Err(ConfigError::RelativePath { field });
            }
        }
        for (field, ms) in [
            ("request_timeout_ms", self.request_timeout_ms),
            ("upload_timeout_ms", self.upload_timeout_ms),
        ] {
            if ms == 0 || ms > MAX_TIMEOUT_MS {
                return Err(ConfigError::Timeout {
                    field,
                    max: MAX_TIMEOUT_MS,
                });
            }
        }
        if self.recipe_cache_capacity == 0 {
            return Err(ConfigError::CacheCapacity);
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    pub fn recipe_cache_capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.recipe_cache_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Storage(#[from] KvError),
}

/// Everything a shell drives, wired against one backend.
pub struct ListyCore {
    pub config: ClientConfig,
    pub toasts: Arc<Toasts>,
    pub list: ListController,
    pub recipes: Arc<RecipeController>,
    pub chat: ChatSession,
}

impl ListyCore {
    /// Talks to the HTTP backend named by `config` through `transport`.
    /// `local` holds preferences that outlive the app, `session` holds state
    /// for the current app session only.
    pub fn connect(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
        local: Arc<dyn KeyValueStore>,
        session: Arc<dyn KeyValueStore>,
        authenticated: bool,
    ) -> Result<Self, SetupError> {
        config.validate()?;
        let http = HttpClient::new(
            transport,
            ValidatedUrl::new(config.base_url.clone())?,
            config.request_timeout(),
        );
        let api = Arc::new(RpcClient::new(http.clone(), config.rpc_path.clone()));
        let uploader = Arc::new(Uploader::new(
            http,
            config.upload_path.clone(),
            config.upload_timeout(),
        ));
        info!(base_url = %config.base_url, "connecting to backend");
        Self::assemble(config, api, uploader, local, session, authenticated)
    }

    /// Runs against any procedure implementation, e.g. the in-memory backend
    /// in offline mode.
    pub fn assemble(
        config: ClientConfig,
        api: Arc<dyn RecipeApi>,
        uploader: Arc<dyn ImageUploader>,
        local: Arc<dyn KeyValueStore>,
        session: Arc<dyn KeyValueStore>,
        authenticated: bool,
    ) -> Result<Self, SetupError> {
        config.validate()?;
        let toasts = Arc::new(Toasts::new());
        let capacity = config.recipe_cache_capacity();
        let list = ListController::new(Arc::clone(&api), Preferences::new(local)?, Arc::clone(&toasts));
        let recipes = Arc::new(RecipeController::new(
            Arc::clone(&api),
            uploader,
            capacity,
            Arc::clone(&toasts),
        ));
        let chat = ChatSession::new(
            api,
            Arc::clone(&recipes),
            session,
            capacity,
            Arc::clone(&toasts),
            authenticated,
        )?;
        Ok(Self {
            config,
            toasts,
            list,
            recipes,
            chat,
        })
    }

    /// A debouncer for search-as-you-type, paced by the configured window.
    pub fn search_debouncer<A: Send + 'static>(
        &self,
        search: impl Fn(A) + Send + Sync + 'static,
    ) -> Debouncer<A> {
        Debouncer::new(self.config.search_debounce(), search)
    }
}
