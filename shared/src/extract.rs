//! Best-effort recovery of recipe fields from assistant replies.
//!
//! Fields are found by searching for `"<label>:"` without regard to case.
//! Single-line fields end at the next newline, the instructions block ends at
//! the next blank line and the ingredients block ends where the instructions
//! label starts. Labels are expected in the order name, description,
//! preparation time, cook time, ingredients, instructions; text that reorders
//! them extracts partially. Nothing here fails: a missing label yields an
//! empty value.

use serde::{Deserialize, Serialize};

use crate::api::CreateRecipeInput;
use crate::model::MessageId;

const NAME: &str = "name:";
const DESCRIPTION: &str = "description:";
const PREP_TIME: &str = "preparation time:";
const COOK_TIME: &str = "cook time:";
const INGREDIENTS: &str = "ingredients:";
const INSTRUCTIONS: &str = "instructions:";

const LIST_MARKER: &str = "- ";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRecipe {
    pub name: String,
    pub description: String,
    pub prep_time: String,
    pub cook_time: String,
    pub ingredients: Vec<String>,
    pub instructions: Vec<String>,
}

impl ExtractedRecipe {
    /// Payload for `recipe.create`, linked to the message it came from.
    pub fn into_create_input(self, message_id: Option<MessageId>) -> CreateRecipeInput {
        CreateRecipeInput {
            name: self.name,
            description: self.description,
            prep_time: non_empty(self.prep_time),
            cook_time: non_empty(self.cook_time),
            img_url: None,
            notes: None,
            ingredients: self.ingredients,
            instructions: self.instructions,
            message_id,
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

/// ASCII lowercasing keeps byte offsets identical to the original text.
struct Haystack<'a> {
    original: &'a str,
    folded: String,
}

impl<'a> Haystack<'a> {
    fn new(original: &'a str) -> Self {
        Self {
            original,
            folded: original.to_ascii_lowercase(),
        }
    }

    fn find_label(&self, label: &str, from: usize) -> Option<usize> {
        self.folded
            .get(from..)
            .and_then(|rest| rest.find(label))
            .map(|offset| from + offset)
    }

    /// Text between the end of the label at `start` and the next `terminator`.
    fn value_until(&self, start: usize, label: &str, terminator: &str) -> &'a str {
        let value_start = start + label.len();
        self.original
            .get(value_start..)
            .and_then(|rest| rest.find(terminator).map(|end| &rest[..end]))
            .unwrap_or("")
    }

    fn single_line(&self, start: Option<usize>, label: &str) -> String {
        start
            .map(|s| self.value_until(s, label, "\n").trim().to_string())
            .unwrap_or_default()
    }
}

pub fn extract_recipe(content: &str) -> ExtractedRecipe {
    let text = Haystack::new(content);

    let name_at = text.find_label(NAME, 0);
    let description_at = text.find_label(DESCRIPTION, name_at.unwrap_or(0));
    let prep_at = text.find_label(PREP_TIME, 0);
    let cook_at = text.find_label(COOK_TIME, 0);
    let ingredients_at = text.find_label(INGREDIENTS, 0);
    let instructions_at = text.find_label(INSTRUCTIONS, 0);

    let instructions = instructions_at
        .map(|at| text.value_until(at, INSTRUCTIONS, "\n\n"))
        .unwrap_or("");

    let ingredients = match (ingredients_at, instructions_at) {
        (Some(start), Some(end)) => content.get(start + INGREDIENTS.len()..end).unwrap_or(""),
        _ => "",
    };

    ExtractedRecipe {
        name: text.single_line(name_at, NAME),
        description: text.single_line(description_at, DESCRIPTION),
        prep_time: text.single_line(prep_at, PREP_TIME),
        cook_time: text.single_line(cook_at, COOK_TIME),
        ingredients: split_items(ingredients),
        instructions: split_items(instructions),
    }
}

/// One entry per non-empty line, with a leading `"- "` removed.
fn split_items(block: &str) -> Vec<String> {
    block
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.strip_prefix(LIST_MARKER).unwrap_or(line).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const REPLY: &str = "Here is a recipe for you!\n\n\
        Name: Tomato Soup\n\
        Description: A warm, simple soup.\n\
        Preparation Time: 10 minutes\n\
        Cook Time: 25 minutes\n\
        Ingredients:\n\
        - 4 tomatoes\n\
        - 1 onion\n\
        - Salt\n\n\
        Instructions:\n\
        1. Chop the vegetables.\n\
        2. Simmer for 20 minutes.\n\
        3. Blend and season.\n\n\
        Enjoy!";

    #[test]
    fn test_minimal_round_trip() {
        let recipe = extract_recipe(
            "Name: Soup\nDescription: Hot\nIngredients:\n- Water\n- Salt\n\nInstructions:\nBoil\n\n",
        );
        assert_eq!(recipe.name, "Soup");
        assert_eq!(recipe.description, "Hot");
        assert_eq!(recipe.ingredients, vec!["Water", "Salt"]);
        assert_eq!(recipe.instructions, vec!["Boil"]);
        assert_eq!(recipe.prep_time, "");
        assert_eq!(recipe.cook_time, "");
    }

    #[test]
    fn test_full_reply() {
        let recipe = extract_recipe(REPLY);
        assert_eq!(recipe.name, "Tomato Soup");
        assert_eq!(recipe.description, "A warm, simple soup.");
        assert_eq!(recipe.prep_time, "10 minutes");
        assert_eq!(recipe.cook_time, "25 minutes");
        assert_eq!(recipe.ingredients, vec!["4 tomatoes", "1 onion", "Salt"]);
        assert_eq!(
            recipe.instructions,
            vec![
                "1. Chop the vegetables.",
                "2. Simmer for 20 minutes.",
                "3. Blend and season."
            ]
        );
    }

    #[test]
    fn test_labels_are_case_insensitive() {
        let recipe = extract_recipe("NAME: Stew\nINGREDIENTS:\n- Beef\nINSTRUCTIONS:\nCook\n\n");
        assert_eq!(recipe.name, "Stew");
        assert_eq!(recipe.ingredients, vec!["Beef"]);
        assert_eq!(recipe.instructions, vec!["Cook"]);
    }

    #[test]
    fn test_missing_instructions_skips_ingredients() {
        let recipe = extract_recipe("Name: Soup\nIngredients:\n- Water\n- Salt\n");
        assert!(recipe.ingredients.is_empty());
        assert!(recipe.instructions.is_empty());
        assert_eq!(recipe.name, "Soup");
    }

    #[test]
    fn test_unterminated_fields_are_empty() {
        let recipe = extract_recipe("Name: Soup");
        assert_eq!(recipe.name, "");

        let recipe = extract_recipe("Ingredients:\n- Water\nInstructions:\nBoil\n");
        assert_eq!(recipe.ingredients, vec!["Water"]);
        assert!(recipe.instructions.is_empty());
    }

    #[test]
    fn test_reordered_labels_do_not_panic() {
        let recipe = extract_recipe("Instructions:\nBoil\n\nIngredients:\n- Water\n\n");
        assert!(recipe.ingredients.is_empty());
        assert_eq!(recipe.instructions, vec!["Boil"]);
    }

    #[test]
    fn test_only_leading_marker_is_stripped() {
        let recipe = extract_recipe("Ingredients:\n- half-and-half\n-- odd\nsalt - pinch\nInstructions:\n- Stir\n\n");
        assert_eq!(recipe.ingredients, vec!["half-and-half", "-- odd", "salt - pinch"]);
        assert_eq!(recipe.instructions, vec!["Stir"]);
    }

    #[test]
    fn test_non_ascii_text() {
        let recipe = extract_recipe("Name: Crème brûlée\nDescription: Süß\nIngredients:\n- Œufs\nInstructions:\nCuire\n\n");
        assert_eq!(recipe.name, "Crème brûlée");
        assert_eq!(recipe.description, "Süß");
        assert_eq!(recipe.ingredients, vec!["Œufs"]);
    }

    #[test]
    fn test_no_labels() {
        assert_eq!(extract_recipe("I can't help with that."), ExtractedRecipe::default());
    }

    #[test]
    fn test_into_create_input() {
        let message_id = MessageId::new("m1");
        let input = extract_recipe(REPLY).into_create_input(Some(message_id.clone()));
        assert_eq!(input.name, "Tomato Soup");
        assert_eq!(input.prep_time.as_deref(), Some("10 minutes"));
        assert_eq!(input.message_id, Some(message_id));

        let input = extract_recipe("Name: Soup\n").into_create_input(None);
        assert_eq!(input.prep_time, None);
        assert_eq!(input.cook_time, None);
    }

    proptest! {
        #[test]
        fn never_panics_on_arbitrary_text(content in any::<String>()) {
            let _ = extract_recipe(&content);
        }

        #[test]
        fn never_panics_on_shuffled_labels(
            parts in prop::collection::vec(
                prop::sample::select(vec![
                    "Name:", "description:", "Preparation Time:", "COOK TIME:",
                    "Ingredients:", "Instructions:", "\n", "\n\n", "- ", "é", "x",
                ]),
                0..30,
            )
        ) {
            let content: String = parts.concat();
            let recipe = extract_recipe(&content);
            prop_assert!(recipe.ingredients.iter().all(|i| !i.is_empty()));
            prop_assert!(recipe.instructions.iter().all(|i| !i.is_empty()));
        }
    }
}
