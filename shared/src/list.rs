//! The shopping list: cached state, optimistic edits and grouping.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::api::{AddItemInput, CheckInput, RecipeApi};
use crate::cache::QueryCache;
use crate::capabilities::KvError;
use crate::error::{AppError, AppResult};
use crate::model::{Ingredient, IngredientId, List, ListId, RecipeId, RecipeIngredient};
use crate::optimistic::{self, MutationError};
use crate::prefs::Preferences;
use crate::toast::Toasts;
use crate::validation;

/// Cache key of `list.byUserId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListQuery;

// --- Speculative transforms ---

/// Appends an unsaved item with a fresh placeholder id.
pub fn append_placeholder(mut list: List, name: &str) -> List {
    let list_id = list.id.clone().unwrap_or_else(|| ListId::new(""));
    list.ingredients.push(Ingredient {
        id: IngredientId::placeholder(),
        list_id,
        recipe_id: None,
        name: name.to_string(),
        checked: false,
    });
    list
}

pub fn set_checked(mut list: List, id: &IngredientId, checked: bool) -> List {
    for ingredient in list.ingredients.iter_mut().filter(|i| &i.id == id) {
        ingredient.checked = checked;
    }
    list
}

pub fn set_checked_many(mut list: List, ids: &[IngredientId], checked: bool) -> List {
    for ingredient in list.ingredients.iter_mut().filter(|i| ids.contains(&i.id)) {
        ingredient.checked = checked;
    }
    list
}

pub fn remove_ids(mut list: List, ids: &[IngredientId]) -> List {
    list.ingredients.retain(|i| !ids.contains(&i.id));
    list
}

/// What "check all" sets every item to: unchecked when everything is
/// already checked, checked otherwise.
pub fn check_all_target(list: &List) -> bool {
    !list.all_checked()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngredientGroup {
    /// `None` for items added by hand.
    pub recipe_id: Option<RecipeId>,
    pub ingredients: Vec<Ingredient>,
}

/// Groups items by originating recipe, in order of first appearance.
pub fn group_by_recipe(list: &List) -> Vec<IngredientGroup> {
    let mut groups: Vec<IngredientGroup> = Vec::new();
    for ingredient in &list.ingredients {
        match groups
            .iter_mut()
            .find(|g| g.recipe_id == ingredient.recipe_id)
        {
            Some(group) => group.ingredients.push(ingredient.clone()),
            None => groups.push(IngredientGroup {
                recipe_id: ingredient.recipe_id.clone(),
                ingredients: vec![ingredient.clone()],
            }),
        }
    }
    groups
}

// --- Controller ---

pub struct ListController {
    api: Arc<dyn RecipeApi>,
    cache: QueryCache<ListQuery, List>,
    prefs: Preferences,
    toasts: Arc<Toasts>,
}

impl ListController {
    pub fn new(api: Arc<dyn RecipeApi>, prefs: Preferences, toasts: Arc<Toasts>) -> Self {
        Self {
            api,
            cache: QueryCache::new(NonZeroUsize::MIN),
            prefs,
            toasts,
        }
    }

    pub async fn list(&self) -> Option<List> {
        self.cache.get(&ListQuery).await
    }

    pub async fn is_stale(&self) -> bool {
        self.cache.is_stale(&ListQuery).await
    }

    /// Fetches the list and stores it unless a mutation cancelled the fetch
    /// meanwhile. Returns what the cache holds afterwards.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> AppResult<List> {
        let api = Arc::clone(&self.api);
        let stored = self
            .cache
            .fetch_with(&ListQuery, || async move { api.list_by_user_id().await.map(Some) })
            .await
            .map_err(|e| {
                warn!(error = %e, "list refresh failed");
                AppError::from(e)
            })?;
        if !stored {
            info!("list refresh superseded");
        }
        Ok(self.list().await.unwrap_or_default())
    }

    #[instrument(skip(self))]
    pub async fn add_item(&self, name: &str) -> AppResult<()> {
        validation::validate_ingredient_name(name)?;

        let input = AddItemInput {
            new_ingredient_name: name.to_string(),
        };
        let outcome = optimistic::run(
            &self.cache,
            ListQuery,
            "list.add",
            |list| Some(append_placeholder(list.unwrap_or_default(), name)),
            self.api.list_add(input),
        )
        .await;
        self.settle(outcome.map(|_| ())).await
    }

    /// Deletes every checked item. Does nothing when none are checked.
    #[instrument(skip(self))]
    pub async fn remove_checked(&self) -> AppResult<()> {
        let ids = self.list().await.unwrap_or_default().checked_ids();
        if ids.is_empty() {
            return Ok(());
        }

        let outcome = optimistic::run(
            &self.cache,
            ListQuery,
            "list.clear",
            |list| Some(remove_ids(list.unwrap_or_default(), &ids)),
            self.api.list_clear(ids.clone()),
        )
        .await;
        self.settle(outcome).await
    }

    #[instrument(skip(self, id), fields(id = %id))]
    pub async fn check(&self, id: &IngredientId, checked: bool) -> AppResult<()> {
        let input = CheckInput {
            id: id.clone(),
            checked,
        };
        let outcome = optimistic::run(
            &self.cache,
            ListQuery,
            "list.check",
            |list| Some(set_checked(list.unwrap_or_default(), id, checked)),
            self.api.list_check(input),
        )
        .await;
        self.settle(outcome).await
    }

    /// Toggles every item of the list as the user currently sees it. The
    /// target is computed once from `observed`, so repeating the call with
    /// the same observation sends the same batch.
    #[instrument(skip(self, observed), fields(items = observed.len()))]
    pub async fn check_all(&self, observed: &List) -> AppResult<()> {
        let target = check_all_target(observed);
        let ids: Vec<IngredientId> = observed.ingredients.iter().map(|i| i.id.clone()).collect();
        self.check_many(ids, target).await
    }

    /// Sets every cached item to `target` in one batch.
    #[instrument(skip(self))]
    pub async fn set_all_checked(&self, target: bool) -> AppResult<()> {
        let ids: Vec<IngredientId> = self
            .list()
            .await
            .unwrap_or_default()
            .ingredients
            .into_iter()
            .map(|i| i.id)
            .collect();
        self.check_many(ids, target).await
    }

    async fn check_many(&self, ids: Vec<IngredientId>, target: bool) -> AppResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let batch = ids
            .iter()
            .map(|id| CheckInput {
                id: id.clone(),
                checked: target,
            })
            .collect();
        let outcome = optimistic::run(
            &self.cache,
            ListQuery,
            "list.checkMany",
            |list| Some(set_checked_many(list.unwrap_or_default(), &ids, target)),
            self.api.list_check_many(batch),
        )
        .await;
        self.settle(outcome).await
    }

    /// Copies recipe ingredients onto the list. Not optimistic: the list is
    /// refetched once the server has created the items.
    #[instrument(skip(self, ingredients), fields(count = ingredients.len()))]
    pub async fn add_recipe_ingredients(&self, ingredients: Vec<RecipeIngredient>) -> AppResult<()> {
        if ingredients.is_empty() {
            return Ok(());
        }
        match self.api.list_upsert(ingredients).await {
            Ok(()) => {
                self.cache.invalidate(&ListQuery).await;
                self.settle::<AppError>(Ok(())).await
            }
            Err(e) => {
                let error = AppError::from(e);
                self.toasts.error(&error);
                Err(error)
            }
        }
    }

    /// Names of the recipes the list items came from, for group headings.
    #[instrument(skip(self))]
    pub async fn recipe_names(&self) -> AppResult<HashMap<RecipeId, String>> {
        let ids = self.list().await.unwrap_or_default().recipe_ids();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let summaries = self.api.recipe_by_ids(ids).await?;
        Ok(summaries.into_iter().map(|s| (s.id, s.name)).collect())
    }

    pub async fn groups(&self) -> Vec<IngredientGroup> {
        group_by_recipe(&self.list().await.unwrap_or_default())
    }

    pub fn by_recipe(&self) -> bool {
        self.prefs.by_recipe()
    }

    pub fn set_by_recipe(&self, value: bool) -> Result<(), KvError> {
        self.prefs.set_by_recipe(value)
    }

    /// Refetches after a successful mutation; reports a failed one, and
    /// refetches too when its rollback restored a list older than the server's.
    async fn settle<E: Into<AppError>>(
        &self,
        outcome: Result<(), MutationError<E>>,
    ) -> AppResult<()> {
        match outcome {
            Ok(()) => {
                self.refetch().await;
                Ok(())
            }
            Err(MutationError {
                error,
                needs_refetch,
            }) => {
                let error = error.into();
                self.toasts.error(&error);
                if needs_refetch {
                    self.refetch().await;
                }
                Err(error)
            }
        }
    }

    async fn refetch(&self) {
        if let Err(e) = self.refresh().await {
            warn!(error = %e, "refetch after mutation failed, list left stale");
        }
    }
}
