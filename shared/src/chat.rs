//! The recipe assistant conversation: transcript, persisted chat selection
//! and saving assistant replies as recipes.

use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::api::{AddMessagesInput, CreateChatInput, RecipeApi};
use crate::cache::QueryCache;
use crate::capabilities::{KeyValueStore, KvError};
use crate::error::{AppError, AppResult};
use crate::extract::extract_recipe;
use crate::model::{Chat, ChatId, ChatMessage, MessageId, Recipe, RecipeId};
use crate::prefs::SessionState;
use crate::recipe::RecipeController;
use crate::toast::{ToastKind, Toasts};
use crate::validation;

pub const RECIPE_SAVED_MESSAGE: &str = "Recipe saved successfully!";

/// Rejects prompts too short to be worth sending.
pub fn check_prompt(input: &str) -> AppResult<()> {
    validation::validate_prompt(input).map_err(AppError::from)
}

/// Prompt text for a suggestion chip.
pub fn suggestion_prompt(label: &str) -> String {
    label.to_lowercase()
}

/// Relative route of a saved recipe's page.
pub fn recipe_link(id: &RecipeId, name: &str) -> String {
    let name: String = url::form_urlencoded::byte_serialize(name.as_bytes()).collect();
    format!("recipes/{id}?name={name}")
}

pub struct ChatSession {
    api: Arc<dyn RecipeApi>,
    recipes: Arc<RecipeController>,
    session: SessionState,
    cache: QueryCache<ChatId, Vec<ChatMessage>>,
    toasts: Arc<Toasts>,
    authenticated: bool,
    chat_id: Option<ChatId>,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    /// Restores the chat selected earlier in this app session, if any.
    pub fn new(
        api: Arc<dyn RecipeApi>,
        recipes: Arc<RecipeController>,
        store: Arc<dyn KeyValueStore>,
        cache_capacity: NonZeroUsize,
        toasts: Arc<Toasts>,
        authenticated: bool,
    ) -> Result<Self, KvError> {
        let session = SessionState::new(store)?;
        let chat_id = match session.current_chat_id() {
            Ok(stored) => stored.flatten(),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable chat selection");
                None
            }
        };
        Ok(Self {
            api,
            recipes,
            session,
            cache: QueryCache::new(cache_capacity),
            toasts,
            authenticated,
            chat_id,
            messages: Vec::new(),
        })
    }

    pub fn chat_id(&self) -> Option<&ChatId> {
        self.chat_id.as_ref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn set_authenticated(&mut self, authenticated: bool) {
        self.authenticated = authenticated;
    }

    fn select(&mut self, id: Option<ChatId>) {
        if let Err(e) = self.session.set_current_chat_id(id.as_ref()) {
            warn!(error = %e, "chat selection not persisted");
        }
        self.chat_id = id;
    }

    /// Records a completed prompt and reply. Signed-in users get the pair
    /// stored on the server, in a new chat when none is selected; the
    /// server's transcript then replaces the local one.
    #[instrument(skip_all, fields(chat = ?self.chat_id))]
    pub async fn finish_exchange(
        &mut self,
        user_input: &str,
        assistant: ChatMessage,
    ) -> AppResult<()> {
        let exchange = vec![ChatMessage::user(user_input), assistant];
        self.messages.extend(exchange.iter().cloned());
        if !self.authenticated {
            return Ok(());
        }

        let stored = match self.chat_id.clone() {
            Some(chat_id) => {
                let input = AddMessagesInput {
                    chat_id: chat_id.clone(),
                    messages: exchange,
                };
                self.api
                    .chat_add_messages(input)
                    .await
                    .map(|messages| (chat_id, messages))
            }
            None => self
                .api
                .chat_create(CreateChatInput { messages: exchange })
                .await
                .map(|chat| {
                    info!(chat = %chat.id, "chat created");
                    (chat.id, chat.messages)
                }),
        };

        match stored {
            Ok((chat_id, messages)) => {
                self.cache.store_fresh(&chat_id, Some(messages.clone())).await;
                if self.chat_id.as_ref() != Some(&chat_id) {
                    self.select(Some(chat_id));
                }
                self.messages = messages;
                Ok(())
            }
            Err(e) => {
                let error = AppError::from(e);
                self.toasts.error(&error);
                Err(error)
            }
        }
    }

    /// Loads the selected chat's transcript, from the cache when it is
    /// fresh. Does nothing when signed out or no chat is selected.
    #[instrument(skip(self), fields(chat = ?self.chat_id))]
    pub async fn load_messages(&mut self) -> AppResult<()> {
        let Some(chat_id) = self.chat_id.clone().filter(|_| self.authenticated) else {
            return Ok(());
        };

        if self.cache.is_stale(&chat_id).await {
            let api = Arc::clone(&self.api);
            let request_id = chat_id.clone();
            self.cache
                .fetch_with(&chat_id, || async move {
                    api.chat_get_messages_by_chat_id(request_id).await.map(Some)
                })
                .await
                .map_err(|e| {
                    warn!(error = %e, "chat messages fetch failed");
                    AppError::from(e)
                })?;
        }

        // another selection may have been made while fetching
        if self.chat_id.as_ref() == Some(&chat_id) {
            if let Some(messages) = self.cache.get(&chat_id).await {
                self.messages = messages;
            }
        }
        Ok(())
    }

    /// The user's chats, newest first.
    pub async fn chats(&self) -> AppResult<Vec<Chat>> {
        Ok(self.api.chat_get_chats().await?)
    }

    /// Selects the newest chat unless a selection, even a cleared one, was
    /// already made this session. Returns whether a chat was adopted.
    pub fn adopt_latest_chat(&mut self, chats: &[Chat]) -> bool {
        let never_selected = matches!(self.session.current_chat_id(), Ok(None));
        match chats.first() {
            Some(latest) if never_selected => {
                self.select(Some(latest.id.clone()));
                true
            }
            _ => false,
        }
    }

    #[instrument(skip(self, id), fields(chat = %id))]
    pub async fn change_chat(&mut self, id: ChatId) -> AppResult<()> {
        self.select(Some(id));
        self.load_messages().await
    }

    pub fn start_new_chat(&mut self) {
        self.messages.clear();
        self.select(None);
    }

    /// Turns an assistant reply into a saved recipe linked to that reply.
    /// Messages that are unknown or empty are ignored.
    #[instrument(skip(self, message_id), fields(message = %message_id))]
    pub async fn save_recipe(&mut self, message_id: &MessageId) -> AppResult<Option<Recipe>> {
        let Some(content) = self
            .messages
            .iter()
            .find(|m| &m.id == message_id)
            .map(|m| m.content.clone())
            .filter(|content| !content.is_empty())
        else {
            return Ok(None);
        };

        let input = extract_recipe(&content).into_create_input(Some(message_id.clone()));
        match self.api.recipe_create(input).await {
            Ok(recipe) => {
                self.recipes.invalidate_all().await;
                if let Some(chat_id) = &self.chat_id {
                    self.cache.invalidate(chat_id).await;
                }
                if let Some(message) = self.messages.iter_mut().find(|m| &m.id == message_id) {
                    message.recipe_id = Some(recipe.id.clone());
                }
                info!(recipe = %recipe.id, "recipe saved from chat");
                self.toasts.push(RECIPE_SAVED_MESSAGE, ToastKind::Success);
                Ok(Some(recipe))
            }
            Err(e) => {
                self.toasts
                    .push(format!("Error: {}", e.message), ToastKind::Error);
                Err(e.into())
            }
        }
    }
}
