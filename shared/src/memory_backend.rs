//! In-process implementation of the procedure surface, for offline/demo mode
//! and tests. Supports injected failures and response latency.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::api::{
    AddItemInput, AddMessagesInput, AddNotesInput, CheckInput, CreateChatInput, CreateRecipeInput,
    Procedure, RecipeApi, RpcError, RpcErrorCode, RpcResult, UpdateImgUrlInput,
};
use crate::model::{
    Chat, ChatId, ChatMessage, Ingredient, IngredientId, Instruction, List, ListId, Recipe,
    RecipeId, RecipeIngredient, RecipeSummary, User, UserId,
};
use crate::upload::{validate_filename, validate_image, ImageUploader, UploadError, UploadedAsset};
use crate::validation::{self, SignUp};

#[derive(Debug, Default)]
struct BackendState {
    current_user: Option<User>,
    users: Vec<User>,
    lists: HashMap<UserId, List>,
    recipes: BTreeMap<RecipeId, Recipe>,
    chats: Vec<Chat>,
    next_id: u64,
    failures: HashMap<Procedure, VecDeque<RpcError>>,
    calls: Vec<Procedure>,
}

impl BackendState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn user(&self) -> RpcResult<&User> {
        self.current_user
            .as_ref()
            .ok_or_else(|| RpcError::new(RpcErrorCode::Unauthorized, "You must be signed in"))
    }

    fn list_mut(&mut self) -> RpcResult<&mut List> {
        let user_id = self.user()?.id.clone();
        let list_id = ListId::new(format!("list-{user_id}"));
        Ok(self
            .lists
            .entry(user_id)
            .or_insert_with(|| List::new(list_id, Vec::new())))
    }

    fn recipe_mut(&mut self, id: &RecipeId) -> RpcResult<&mut Recipe> {
        self.recipes
            .get_mut(id)
            .ok_or_else(|| RpcError::not_found(format_args!("Recipe {id}")))
    }

    fn chat_mut(&mut self, id: &ChatId) -> RpcResult<&mut Chat> {
        let user_id = self.user()?.id.clone();
        self.chats
            .iter_mut()
            .find(|c| &c.id == id && c.user_id == user_id)
            .ok_or_else(|| RpcError::not_found(format_args!("Chat {id}")))
    }
}

pub struct InMemoryBackend {
    state: Mutex<BackendState>,
    latency: Option<Duration>,
    delays: HashMap<Procedure, Duration>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    /// A backend with one signed-in demo user.
    pub fn new() -> Self {
        let user = User {
            id: UserId::new("user-1"),
            username: "demo@listy.app".into(),
        };
        let state = BackendState {
            current_user: Some(user.clone()),
            users: vec![user],
            ..BackendState::default()
        };
        Self {
            state: Mutex::new(state),
            latency: None,
            delays: HashMap::new(),
        }
    }

    pub fn signed_out() -> Self {
        Self {
            state: Mutex::new(BackendState::default()),
            latency: None,
            delays: HashMap::new(),
        }
    }

    /// Every response is delivered `latency` after the request is handled.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Overrides the latency of one procedure.
    pub fn with_delay(mut self, procedure: Procedure, latency: Duration) -> Self {
        self.delays.insert(procedure, latency);
        self
    }

    /// Makes the next call of `procedure` fail with `error` without touching state.
    pub async fn fail_next(&self, procedure: Procedure, error: RpcError) {
        self.state
            .lock()
            .await
            .failures
            .entry(procedure)
            .or_default()
            .push_back(error);
    }

    pub async fn call_count(&self, procedure: Procedure) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|p| **p == procedure)
            .count()
    }

    pub async fn seed_list(&self, names: &[&str]) -> RpcResult<List> {
        let mut state = self.state.lock().await;
        for name in names {
            let id = IngredientId::new(state.next_id("ing"));
            let list = state.list_mut()?;
            let list_id = list.id.clone().unwrap_or_else(|| ListId::new("list"));
            list.ingredients.push(Ingredient {
                id,
                list_id,
                recipe_id: None,
                name: (*name).to_string(),
                checked: false,
            });
        }
        Ok(state.list_mut()?.clone())
    }

    pub async fn seed_recipe(&self, input: CreateRecipeInput) -> RpcResult<Recipe> {
        let mut state = self.state.lock().await;
        Self::create_recipe(&mut state, input)
    }

    pub async fn recipe(&self, id: &RecipeId) -> Option<Recipe> {
        self.state.lock().await.recipes.get(id).cloned()
    }

    pub async fn chat(&self, id: &ChatId) -> Option<Chat> {
        self.state.lock().await.chats.iter().find(|c| &c.id == id).cloned()
    }

    /// Runs `handler` against the state unless a failure was queued, then
    /// waits out the configured latency.
    async fn handle<T>(
        &self,
        procedure: Procedure,
        handler: impl FnOnce(&mut BackendState) -> RpcResult<T>,
    ) -> RpcResult<T> {
        let result = {
            let mut state = self.state.lock().await;
            state.calls.push(procedure);
            let injected = state
                .failures
                .get_mut(&procedure)
                .and_then(VecDeque::pop_front);
            match injected {
                Some(error) => Err(error),
                None => handler(&mut *state),
            }
        };
        debug!(%procedure, ok = result.is_ok(), "in-memory call handled");

        if let Some(latency) = self.delays.get(&procedure).copied().or(self.latency) {
            tokio::time::sleep(latency).await;
        }
        result
    }

    fn create_recipe(state: &mut BackendState, input: CreateRecipeInput) -> RpcResult<Recipe> {
        state.user()?;
        if input.name.trim().is_empty() {
            return Err(RpcError::new(RpcErrorCode::BadRequest, "Recipe name is required"));
        }

        let recipe_id = RecipeId::new(state.next_id("recipe"));
        let ingredients = input
            .ingredients
            .into_iter()
            .map(|name| RecipeIngredient {
                id: IngredientId::new(state.next_id("ring")),
                recipe_id: recipe_id.clone(),
                name,
            })
            .collect();
        let instructions = input
            .instructions
            .into_iter()
            .zip(1u32..)
            .map(|(content, step)| Instruction {
                id: state.next_id("step"),
                recipe_id: recipe_id.clone(),
                step,
                content,
            })
            .collect();

        let recipe = Recipe {
            id: recipe_id.clone(),
            name: input.name,
            description: input.description,
            img_url: input.img_url,
            address: None,
            author: None,
            notes: input.notes,
            prep_time: input.prep_time,
            cook_time: input.cook_time,
            ingredients,
            instructions,
        };
        state.recipes.insert(recipe_id.clone(), recipe.clone());

        if let Some(message_id) = input.message_id {
            let message = state
                .chats
                .iter_mut()
                .flat_map(|c| c.messages.iter_mut())
                .find(|m| m.id == message_id);
            if let Some(message) = message {
                message.recipe_id = Some(recipe_id);
            }
        }
        Ok(recipe)
    }
}

#[async_trait]
impl RecipeApi for InMemoryBackend {
    async fn list_by_user_id(&self) -> RpcResult<List> {
        self.handle(Procedure::ListByUserId, |state| Ok(state.list_mut()?.clone()))
            .await
    }

    async fn list_add(&self, input: AddItemInput) -> RpcResult<Ingredient> {
        self.handle(Procedure::ListAdd, |state| {
            validation::validate_ingredient_name(&input.new_ingredient_name)
                .map_err(|e| RpcError::new(RpcErrorCode::BadRequest, e.to_string()))?;
            let id = IngredientId::new(state.next_id("ing"));
            let list = state.list_mut()?;
            let ingredient = Ingredient {
                id,
                list_id: list.id.clone().unwrap_or_else(|| ListId::new("list")),
                recipe_id: None,
                name: input.new_ingredient_name,
                checked: false,
            };
            list.ingredients.push(ingredient.clone());
            Ok(ingredient)
        })
        .await
    }

    async fn list_clear(&self, ids: Vec<IngredientId>) -> RpcResult<()> {
        self.handle(Procedure::ListClear, |state| {
            state.list_mut()?.ingredients.retain(|i| !ids.contains(&i.id));
            Ok(())
        })
        .await
    }

    async fn list_check(&self, input: CheckInput) -> RpcResult<()> {
        self.handle(Procedure::ListCheck, |state| {
            let ingredient = state
                .list_mut()?
                .ingredients
                .iter_mut()
                .find(|i| i.id == input.id)
                .ok_or_else(|| RpcError::not_found(format_args!("Ingredient {}", input.id)))?;
            ingredient.checked = input.checked;
            Ok(())
        })
        .await
    }

    async fn list_check_many(&self, input: Vec<CheckInput>) -> RpcResult<()> {
        self.handle(Procedure::ListCheckMany, |state| {
            let list = state.list_mut()?;
            for check in input {
                if let Some(ingredient) = list.ingredients.iter_mut().find(|i| i.id == check.id) {
                    ingredient.checked = check.checked;
                }
            }
            Ok(())
        })
        .await
    }

    async fn list_upsert(&self, ingredients: Vec<RecipeIngredient>) -> RpcResult<()> {
        self.handle(Procedure::ListUpsert, |state| {
            for ingredient in ingredients {
                let id = IngredientId::new(state.next_id("ing"));
                let list = state.list_mut()?;
                let list_id = list.id.clone().unwrap_or_else(|| ListId::new("list"));
                list.ingredients.push(Ingredient {
                    id,
                    list_id,
                    recipe_id: Some(ingredient.recipe_id),
                    name: ingredient.name,
                    checked: false,
                });
            }
            Ok(())
        })
        .await
    }

    async fn recipe_by_id(&self, id: RecipeId) -> RpcResult<Option<Recipe>> {
        self.handle(Procedure::RecipeById, |state| Ok(state.recipes.get(&id).cloned()))
            .await
    }

    async fn recipe_by_ids(&self, ids: Vec<RecipeId>) -> RpcResult<Vec<RecipeSummary>> {
        self.handle(Procedure::RecipeByIds, |state| {
            Ok(ids
                .iter()
                .filter_map(|id| state.recipes.get(id).map(Recipe::summary))
                .collect())
        })
        .await
    }

    async fn recipe_update_img_url(&self, input: UpdateImgUrlInput) -> RpcResult<()> {
        self.handle(Procedure::RecipeUpdateImgUrl, |state| {
            state.recipe_mut(&input.id)?.img_url = Some(input.img_url);
            Ok(())
        })
        .await
    }

    async fn recipe_add_notes(&self, input: AddNotesInput) -> RpcResult<()> {
        self.handle(Procedure::RecipeAddNotes, |state| {
            state.recipe_mut(&input.id)?.notes = Some(input.notes);
            Ok(())
        })
        .await
    }

    async fn recipe_create(&self, input: CreateRecipeInput) -> RpcResult<Recipe> {
        self.handle(Procedure::RecipeCreate, |state| Self::create_recipe(state, input))
            .await
    }

    async fn chat_create(&self, input: CreateChatInput) -> RpcResult<Chat> {
        self.handle(Procedure::ChatCreate, |state| {
            let user_id = state.user()?.id.clone();
            let chat = Chat {
                id: ChatId::new(state.next_id("chat")),
                user_id,
                messages: input.messages,
            };
            state.chats.push(chat.clone());
            Ok(chat)
        })
        .await
    }

    async fn chat_add_messages(&self, input: AddMessagesInput) -> RpcResult<Vec<ChatMessage>> {
        self.handle(Procedure::ChatAddMessages, |state| {
            let chat = state.chat_mut(&input.chat_id)?;
            chat.messages.extend(input.messages);
            Ok(chat.messages.clone())
        })
        .await
    }

    async fn chat_get_messages_by_chat_id(&self, chat_id: ChatId) -> RpcResult<Vec<ChatMessage>> {
        self.handle(Procedure::ChatGetMessagesByChatId, |state| {
            Ok(state.chat_mut(&chat_id)?.messages.clone())
        })
        .await
    }

    async fn chat_get_chats(&self) -> RpcResult<Vec<Chat>> {
        self.handle(Procedure::ChatGetChats, |state| {
            let user_id = state.user()?.id.clone();
            // newest first
            Ok(state
                .chats
                .iter()
                .rev()
                .filter(|c| c.user_id == user_id)
                .cloned()
                .collect())
        })
        .await
    }

    async fn auth_sign_up(&self, input: SignUp) -> RpcResult<User> {
        self.handle(Procedure::AuthSignUp, |state| {
            input
                .validate()
                .map_err(|e| RpcError::new(RpcErrorCode::BadRequest, e.to_string()))?;
            let username = input.username();
            if state.users.iter().any(|u| u.username == username) {
                return Err(RpcError::new(RpcErrorCode::Conflict, "User already exists."));
            }
            let user = User {
                id: UserId::new(state.next_id("user")),
                username,
            };
            state.users.push(user.clone());
            Ok(user)
        })
        .await
    }
}

/// Accepts any valid image and hands back a `memory://` URL for it.
#[async_trait]
impl ImageUploader for InMemoryBackend {
    async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadedAsset, UploadError> {
        validate_filename(filename)?;
        validate_image(&bytes)?;
        let mut state = self.state.lock().await;
        let id = state.next_id("upload");
        Ok(UploadedAsset {
            url: format!("memory://uploads/{id}/{filename}"),
        })
    }
}
