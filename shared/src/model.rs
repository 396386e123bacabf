use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(IngredientId);
typed_id!(ListId);
typed_id!(RecipeId);
typed_id!(ChatId);
typed_id!(MessageId);
typed_id!(UserId);

const PLACEHOLDER_PREFIX: &str = "optimistic-";

impl IngredientId {
    /// Client-side id for an ingredient the server has not acknowledged yet.
    pub fn placeholder() -> Self {
        Self(format!("{PLACEHOLDER_PREFIX}{}", Uuid::new_v4()))
    }

    pub fn is_placeholder(&self) -> bool {
        self.0.starts_with(PLACEHOLDER_PREFIX)
    }
}

impl MessageId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

// --- Shopping list ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Ingredient {
    pub id: IngredientId,
    pub list_id: ListId,
    #[serde(default)]
    pub recipe_id: Option<RecipeId>,
    pub name: String,
    #[serde(default)]
    pub checked: bool,
}

/// The single shopping list of a user. Ingredient order carries no meaning.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct List {
    #[serde(default)]
    pub id: Option<ListId>,
    pub ingredients: Vec<Ingredient>,
}

impl List {
    pub fn new(id: ListId, ingredients: Vec<Ingredient>) -> Self {
        Self {
            id: Some(id),
            ingredients,
        }
    }

    pub fn get(&self, id: &IngredientId) -> Option<&Ingredient> {
        self.ingredients.iter().find(|i| &i.id == id)
    }

    pub fn contains(&self, id: &IngredientId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.ingredients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ingredients.is_empty()
    }

    /// True for an empty list, matching `Iterator::all`.
    pub fn all_checked(&self) -> bool {
        self.ingredients.iter().all(|i| i.checked)
    }

    pub fn none_checked(&self) -> bool {
        self.ingredients.iter().all(|i| !i.checked)
    }

    pub fn checked_ids(&self) -> Vec<IngredientId> {
        self.ingredients
            .iter()
            .filter(|i| i.checked)
            .map(|i| i.id.clone())
            .collect()
    }

    /// Recipe ids referenced by list items, deduplicated, in first-seen order.
    pub fn recipe_ids(&self) -> Vec<RecipeId> {
        let mut ids: Vec<RecipeId> = Vec::new();
        for id in self.ingredients.iter().filter_map(|i| i.recipe_id.as_ref()) {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }
}

// --- Recipes ---

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecipeIngredient {
    pub id: IngredientId,
    pub recipe_id: RecipeId,
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Instruction {
    pub id: String,
    pub recipe_id: RecipeId,
    /// 1-based position inside the recipe.
    pub step: u32,
    pub content: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Recipe {
    pub id: RecipeId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub img_url: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub prep_time: Option<String>,
    #[serde(default)]
    pub cook_time: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<RecipeIngredient>,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
}

impl Recipe {
    pub fn instructions_in_order(&self) -> Vec<&Instruction> {
        let mut steps: Vec<&Instruction> = self.instructions.iter().collect();
        steps.sort_by_key(|i| i.step);
        steps
    }

    /// Steps are exactly 1..=N with no gaps or duplicates.
    pub fn has_contiguous_steps(&self) -> bool {
        self.instructions_in_order()
            .iter()
            .zip(1u32..)
            .all(|(instruction, expected)| instruction.step == expected)
    }

    pub fn summary(&self) -> RecipeSummary {
        RecipeSummary {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RecipeSummary {
    pub id: RecipeId,
    pub name: String,
}

// --- Chat ---

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub recipe_id: Option<RecipeId>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            role: Role::User,
            content: content.into(),
            recipe_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            role: Role::Assistant,
            content: content.into(),
            recipe_id: None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    pub user_id: UserId,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
}
