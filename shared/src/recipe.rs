//! Recipe detail: cached recipes, image and notes edits, and picking
//! ingredients to copy onto the shopping list.

use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::api::{AddNotesInput, RecipeApi, UpdateImgUrlInput};
use crate::cache::QueryCache;
use crate::error::{AppError, AppResult};
use crate::list::ListController;
use crate::model::{IngredientId, Recipe, RecipeId, RecipeIngredient};
use crate::optimistic::{self, MutationError};
use crate::toast::Toasts;
use crate::upload::ImageUploader;
use crate::validation;

/// Ingredient lines ending with this are section headings, not ingredients.
const HEADING_SUFFIX: char = ':';

pub fn is_heading(ingredient: &RecipeIngredient) -> bool {
    ingredient.name.ends_with(HEADING_SUFFIX)
}

pub fn with_img_url(recipe: Option<Recipe>, url: &str) -> Option<Recipe> {
    recipe.map(|mut recipe| {
        recipe.img_url = Some(url.to_string());
        recipe
    })
}

/// Which of a recipe's ingredients the user wants on the list. Everything
/// except headings starts selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientSelection {
    items: Vec<(IngredientId, bool)>,
}

impl IngredientSelection {
    pub fn for_recipe(recipe: &Recipe) -> Self {
        Self {
            items: recipe
                .ingredients
                .iter()
                .filter(|i| !is_heading(i))
                .map(|i| (i.id.clone(), true))
                .collect(),
        }
    }

    pub fn is_selected(&self, id: &IngredientId) -> bool {
        self.items
            .iter()
            .any(|(item, selected)| item == id && *selected)
    }

    /// Returns false for ids that are not selectable.
    pub fn set(&mut self, id: &IngredientId, selected: bool) -> bool {
        match self.items.iter_mut().find(|(item, _)| item == id) {
            Some((_, state)) => {
                *state = selected;
                true
            }
            None => false,
        }
    }

    pub fn toggle(&mut self, id: &IngredientId) -> bool {
        let selected = self.is_selected(id);
        self.set(id, !selected)
    }

    pub fn all_selected(&self) -> bool {
        self.items.iter().all(|(_, selected)| *selected)
    }

    pub fn none_selected(&self) -> bool {
        self.items.iter().all(|(_, selected)| !*selected)
    }

    /// Deselects everything when all items are selected, selects everything
    /// otherwise.
    pub fn select_all(&mut self) {
        let target = !self.all_selected();
        for (_, selected) in &mut self.items {
            *selected = target;
        }
    }

    /// The selected ingredient lines, in recipe order.
    pub fn selected(&self, recipe: &Recipe) -> Vec<RecipeIngredient> {
        recipe
            .ingredients
            .iter()
            .filter(|i| self.is_selected(&i.id))
            .cloned()
            .collect()
    }
}

pub struct RecipeController {
    api: Arc<dyn RecipeApi>,
    uploader: Arc<dyn ImageUploader>,
    cache: QueryCache<RecipeId, Recipe>,
    toasts: Arc<Toasts>,
}

impl RecipeController {
    pub fn new(
        api: Arc<dyn RecipeApi>,
        uploader: Arc<dyn ImageUploader>,
        capacity: NonZeroUsize,
        toasts: Arc<Toasts>,
    ) -> Self {
        Self {
            api,
            uploader,
            cache: QueryCache::new(capacity),
            toasts,
        }
    }

    pub async fn recipe(&self, id: &RecipeId) -> Option<Recipe> {
        self.cache.get(id).await
    }

    pub async fn is_stale(&self, id: &RecipeId) -> bool {
        self.cache.is_stale(id).await
    }

    /// Fetches `recipe.byId`. `None` means the server has no such recipe.
    #[instrument(skip(self, id), fields(id = %id))]
    pub async fn load(&self, id: &RecipeId) -> AppResult<Option<Recipe>> {
        let api = Arc::clone(&self.api);
        let request_id = id.clone();
        let stored = self
            .cache
            .fetch_with(id, || async move { api.recipe_by_id(request_id).await })
            .await
            .map_err(|e| {
                warn!(error = %e, "recipe fetch failed");
                AppError::from(e)
            })?;
        if !stored {
            info!("recipe fetch superseded");
        }
        Ok(self.recipe(id).await)
    }

    /// Shows the new image immediately. An uncached recipe is left uncached
    /// until the refetch.
    #[instrument(skip(self, id, url), fields(id = %id))]
    pub async fn update_img_url(&self, id: &RecipeId, url: &str) -> AppResult<()> {
        let input = UpdateImgUrlInput {
            id: id.clone(),
            img_url: url.to_string(),
        };
        let outcome = optimistic::run(
            &self.cache,
            id.clone(),
            "recipe.updateImgUrl",
            |recipe| with_img_url(recipe, url),
            self.api.recipe_update_img_url(input),
        )
        .await;
        self.settle(id, outcome).await
    }

    #[instrument(skip(self, id, notes), fields(id = %id))]
    pub async fn add_notes(&self, id: &RecipeId, notes: &str) -> AppResult<()> {
        validation::validate_notes(notes)?;

        let input = AddNotesInput {
            id: id.clone(),
            notes: notes.to_string(),
        };
        let outcome = self.api.recipe_add_notes(input).await;
        if outcome.is_ok() {
            self.cache.invalidate(id).await;
        }
        self.settle(id, outcome.map_err(MutationError::settled)).await
    }

    /// Uploads the image, then points the recipe at it. Returns the hosted
    /// URL.
    #[instrument(skip(self, id, bytes), fields(id = %id, size = bytes.len()))]
    pub async fn upload_image(
        &self,
        id: &RecipeId,
        filename: &str,
        bytes: Vec<u8>,
    ) -> AppResult<String> {
        let asset = match self.uploader.upload(filename, bytes).await {
            Ok(asset) => asset,
            Err(e) => {
                let error = AppError::from(e);
                self.toasts.error(&error);
                return Err(error);
            }
        };
        self.update_img_url(id, &asset.url).await?;
        Ok(asset.url)
    }

    /// Marks every cached recipe stale, e.g. after a recipe was created
    /// elsewhere.
    pub async fn invalidate_all(&self) {
        self.cache.invalidate_all().await;
    }

    /// Copies the selected ingredient lines onto the shopping list.
    #[instrument(skip_all, fields(recipe = %recipe.id))]
    pub async fn add_selection_to_list(
        &self,
        list: &ListController,
        recipe: &Recipe,
        selection: &IngredientSelection,
    ) -> AppResult<()> {
        list.add_recipe_ingredients(selection.selected(recipe)).await
    }

    async fn settle<E: Into<AppError>>(
        &self,
        id: &RecipeId,
        outcome: Result<(), MutationError<E>>,
    ) -> AppResult<()> {
        match outcome {
            Ok(()) => {
                self.refetch(id).await;
                Ok(())
            }
            Err(MutationError {
                error,
                needs_refetch,
            }) => {
                let error = error.into();
                self.toasts.error(&error);
                if needs_refetch {
                    self.refetch(id).await;
                }
                Err(error)
            }
        }
    }

    async fn refetch(&self, id: &RecipeId) {
        if let Err(e) = self.load(id).await {
            warn!(error = %e, "refetch after mutation failed, recipe left stale");
        }
    }
}
