use std::sync::Arc;

use listy_shared::capabilities::MemoryStore;
use listy_shared::chat::RECIPE_SAVED_MESSAGE;
use listy_shared::{
    recipe_link, ChatMessage, ClientConfig, IngredientSelection, InMemoryBackend, ListyCore,
    Procedure,
};

const REPLY: &str = "Sure! Here is something warming.\n\n\
    Name: Lentil Soup\n\
    Description: Hearty and cheap.\n\
    Preparation Time: 15 minutes\n\
    Cook Time: 40 minutes\n\
    Ingredients:\n\
    - 1 cup lentils\n\
    - 1 carrot\n\
    - 1 onion\n\n\
    Instructions:\n\
    1. Chop the vegetables.\n\
    2. Simmer everything for 40 minutes.\n\n\
    Enjoy!";

#[tokio::test]
async fn test_chat_reply_to_shopping_list() {
    let backend = Arc::new(InMemoryBackend::new());
    let mut core = ListyCore::assemble(
        ClientConfig::default(),
        backend.clone(),
        backend.clone(),
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
        true,
    )
    .unwrap();

    listy_shared::chat::check_prompt("something with lentils").unwrap();
    core.chat
        .finish_exchange("something with lentils", ChatMessage::assistant(REPLY))
        .await
        .unwrap();
    let reply_id = core.chat.messages()[1].id.clone();

    let recipe = core.chat.save_recipe(&reply_id).await.unwrap().unwrap();
    assert_eq!(recipe.name, "Lentil Soup");
    assert_eq!(recipe.prep_time.as_deref(), Some("15 minutes"));
    assert!(recipe.has_contiguous_steps());
    assert_eq!(
        recipe_link(&recipe.id, &recipe.name),
        format!("recipes/{}?name=Lentil+Soup", recipe.id)
    );
    assert_eq!(core.toasts.drain()[0].message, RECIPE_SAVED_MESSAGE);

    // open the recipe, skip the carrot, add the rest
    let loaded = core.recipes.load(&recipe.id).await.unwrap().unwrap();
    let mut selection = IngredientSelection::for_recipe(&loaded);
    selection.toggle(&loaded.ingredients[1].id);
    core.recipes
        .add_selection_to_list(&core.list, &loaded, &selection)
        .await
        .unwrap();

    let groups = core.list.groups().await;
    assert_eq!(groups.len(), 1);
    let names: Vec<_> = groups[0].ingredients.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["1 cup lentils", "1 onion"]);
    let headings = core.list.recipe_names().await.unwrap();
    assert_eq!(headings.get(&recipe.id).map(String::as_str), Some("Lentil Soup"));
    assert_eq!(backend.call_count(Procedure::ListUpsert).await, 1);
}

#[tokio::test]
async fn test_reopening_app_restores_chat() {
    let backend = Arc::new(InMemoryBackend::new());
    let session_store = Arc::new(MemoryStore::new());
    let open = || {
        ListyCore::assemble(
            ClientConfig::default(),
            backend.clone(),
            backend.clone(),
            Arc::new(MemoryStore::new()),
            session_store.clone(),
            true,
        )
        .unwrap()
    };

    let mut first = open();
    first
        .chat
        .finish_exchange("quick pasta idea", ChatMessage::assistant("Try aglio e olio."))
        .await
        .unwrap();
    let chat_id = first.chat.chat_id().cloned().unwrap();
    drop(first);

    let mut second = open();
    let chats = second.chat.chats().await.unwrap();
    assert!(!second.chat.adopt_latest_chat(&chats));
    assert_eq!(second.chat.chat_id(), Some(&chat_id));
    second.chat.load_messages().await.unwrap();
    assert_eq!(second.chat.messages()[1].content, "Try aglio e olio.");
}
