//! The remote procedures the app consumes, as one async seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::HttpError;
use crate::model::{
    Chat, ChatId, ChatMessage, Ingredient, IngredientId, List, MessageId, Recipe, RecipeId,
    RecipeIngredient, RecipeSummary, User,
};
use crate::validation::SignUp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Procedure {
    ListByUserId,
    ListAdd,
    ListClear,
    ListCheck,
    ListCheckMany,
    ListUpsert,
    RecipeById,
    RecipeByIds,
    RecipeUpdateImgUrl,
    RecipeAddNotes,
    RecipeCreate,
    ChatCreate,
    ChatAddMessages,
    ChatGetMessagesByChatId,
    ChatGetChats,
    AuthSignUp,
}

impl Procedure {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ListByUserId => "list.byUserId",
            Self::ListAdd => "list.add",
            Self::ListClear => "list.clear",
            Self::ListCheck => "list.check",
            Self::ListCheckMany => "list.checkMany",
            Self::ListUpsert => "list.upsert",
            Self::RecipeById => "recipe.byId",
            Self::RecipeByIds => "recipe.byIds",
            Self::RecipeUpdateImgUrl => "recipe.updateImgUrl",
            Self::RecipeAddNotes => "recipe.addNotes",
            Self::RecipeCreate => "recipe.create",
            Self::ChatCreate => "chat.create",
            Self::ChatAddMessages => "chat.addMessages",
            Self::ChatGetMessagesByChatId => "chat.getMessagesByChatId",
            Self::ChatGetChats => "chat.getChats",
            Self::AuthSignUp => "auth.signUp",
        }
    }

    /// Queries are sent as GET with the input in the query string.
    pub const fn is_query(self) -> bool {
        matches!(
            self,
            Self::ListByUserId
                | Self::RecipeById
                | Self::RecipeByIds
                | Self::ChatGetMessagesByChatId
                | Self::ChatGetChats
        )
    }
}

impl std::fmt::Display for Procedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcErrorCode {
    BadRequest,
    ParseError,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Timeout,
    TooManyRequests,
    Network,
    InternalServerError,
    #[serde(other)]
    Unknown,
}

impl RpcErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BadRequest => "BAD_REQUEST",
            Self::ParseError => "PARSE_ERROR",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Timeout => "TIMEOUT",
            Self::TooManyRequests => "TOO_MANY_REQUESTS",
            Self::Network => "NETWORK",
            Self::InternalServerError => "INTERNAL_SERVER_ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            408 => Self::Timeout,
            409 => Self::Conflict,
            429 => Self::TooManyRequests,
            500..=599 => Self::InternalServerError,
            _ => Self::Unknown,
        }
    }
}

/// A typed failure raised by a remote procedure. `message` is meant for the user.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct RpcError {
    pub code: RpcErrorCode,
    pub message: String,
}

impl RpcError {
    pub fn new(code: RpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::new(RpcErrorCode::NotFound, format!("{what} not found"))
    }
}

impl From<HttpError> for RpcError {
    fn from(e: HttpError) -> Self {
        let code = match &e {
            HttpError::Timeout { .. } => RpcErrorCode::Timeout,
            HttpError::ConnectionError { .. } | HttpError::Cancelled { .. } => RpcErrorCode::Network,
            HttpError::HttpStatus { status, .. } => RpcErrorCode::from_status(*status),
            HttpError::InvalidResponse { .. } => RpcErrorCode::ParseError,
            HttpError::InvalidUrl { .. }
            | HttpError::InvalidHeader { .. }
            | HttpError::TooManyHeaders { .. }
            | HttpError::BodyTooLarge { .. }
            | HttpError::InvalidRequest { .. }
            | HttpError::SerializationError { .. } => RpcErrorCode::BadRequest,
        };
        Self::new(code, e.to_string())
    }
}

pub type RpcResult<T> = Result<T, RpcError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemInput {
    pub new_ingredient_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInput {
    pub id: IngredientId,
    pub checked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdInput<T> {
    pub id: T,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateImgUrlInput {
    pub id: RecipeId,
    pub img_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddNotesInput {
    pub id: RecipeId,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecipeInput {
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prep_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cook_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
    /// Chat message the recipe was generated from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateChatInput {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMessagesInput {
    pub chat_id: ChatId,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatIdInput {
    pub chat_id: ChatId,
}

/// Server procedures, scoped to the signed-in user where relevant.
#[async_trait]
pub trait RecipeApi: Send + Sync {
    async fn list_by_user_id(&self) -> RpcResult<List>;
    async fn list_add(&self, input: AddItemInput) -> RpcResult<Ingredient>;
    async fn list_clear(&self, ids: Vec<IngredientId>) -> RpcResult<()>;
    async fn list_check(&self, input: CheckInput) -> RpcResult<()>;
    async fn list_check_many(&self, input: Vec<CheckInput>) -> RpcResult<()>;
    /// Copies recipe ingredients onto the list as new items.
    async fn list_upsert(&self, ingredients: Vec<RecipeIngredient>) -> RpcResult<()>;

    async fn recipe_by_id(&self, id: RecipeId) -> RpcResult<Option<Recipe>>;
    async fn recipe_by_ids(&self, ids: Vec<RecipeId>) -> RpcResult<Vec<RecipeSummary>>;
    async fn recipe_update_img_url(&self, input: UpdateImgUrlInput) -> RpcResult<()>;
    async fn recipe_add_notes(&self, input: AddNotesInput) -> RpcResult<()>;
    async fn recipe_create(&self, input: CreateRecipeInput) -> RpcResult<Recipe>;

    async fn chat_create(&self, input: CreateChatInput) -> RpcResult<Chat>;
    async fn chat_add_messages(&self, input: AddMessagesInput) -> RpcResult<Vec<ChatMessage>>;
    async fn chat_get_messages_by_chat_id(&self, chat_id: ChatId) -> RpcResult<Vec<ChatMessage>>;
    async fn chat_get_chats(&self) -> RpcResult<Vec<Chat>>;

    async fn auth_sign_up(&self, input: SignUp) -> RpcResult<User>;
}
