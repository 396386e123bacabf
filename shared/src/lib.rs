#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! Headless core of the Listy recipe and grocery-list app. Shells render
//! what the controllers expose and forward user intents to them.

pub mod api;
pub mod cache;
pub mod capabilities;
pub mod chat;
pub mod config;
pub mod debounce;
pub mod error;
pub mod extract;
pub mod list;
pub mod memory_backend;
pub mod model;
pub mod optimistic;
pub mod prefs;
pub mod recipe;
pub mod rpc_client;
pub mod toast;
pub mod transaction;
pub mod upload;
pub mod validation;

pub use api::{Procedure, RecipeApi, RpcError, RpcErrorCode, RpcResult};
pub use cache::{FetchToken, QueryCache};
pub use chat::{recipe_link, ChatSession};
pub use config::{ClientConfig, ConfigError, ListyCore, SetupError};
pub use debounce::Debouncer;
pub use error::{AppError, AppResult, ErrorKind, ErrorSeverity};
pub use extract::{extract_recipe, ExtractedRecipe};
pub use list::{IngredientGroup, ListController};
pub use memory_backend::InMemoryBackend;
pub use model::{
    Chat, ChatId, ChatMessage, Ingredient, IngredientId, Instruction, List, ListId, MessageId,
    Recipe, RecipeId, RecipeIngredient, RecipeSummary, Role, User, UserId,
};
pub use recipe::{IngredientSelection, RecipeController};
pub use rpc_client::RpcClient;
pub use toast::{ToastKind, ToastMessage, ToastView, Toasts};
pub use transaction::CacheTransaction;
pub use upload::{ImageUploader, UploadError, UploadedAsset, Uploader};

pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[must_use]
pub fn get_current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
