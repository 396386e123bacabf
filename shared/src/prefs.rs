//! Client-local state kept in the shell's key-value storage.

use std::sync::Arc;
use tracing::warn;

use crate::capabilities::{KeyNamespace, KeyValueStore, KvError, KvKey, TypedKvStore};
use crate::model::ChatId;

pub const BY_RECIPE_KEY: &str = "byRecipe";
pub const CURRENT_CHAT_ID_KEY: &str = "currentChatId";

/// Persistent display preferences.
pub struct Preferences {
    by_recipe: TypedKvStore<bool>,
}

impl Preferences {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Result<Self, KvError> {
        Ok(Self {
            by_recipe: TypedKvStore::new(store, KvKey::new(KeyNamespace::Local, BY_RECIPE_KEY)?),
        })
    }

    /// Whether the list is grouped by recipe. Unset or unreadable means no.
    pub fn by_recipe(&self) -> bool {
        match self.by_recipe.get() {
            Ok(value) => value.unwrap_or(false),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable byRecipe preference");
                false
            }
        }
    }

    pub fn set_by_recipe(&self, value: bool) -> Result<(), KvError> {
        self.by_recipe.set(&value)
    }
}

/// State scoped to the current app session.
pub struct SessionState {
    current_chat_id: TypedKvStore<Option<ChatId>>,
}

impl SessionState {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Result<Self, KvError> {
        Ok(Self {
            current_chat_id: TypedKvStore::new(
                store,
                KvKey::new(KeyNamespace::Session, CURRENT_CHAT_ID_KEY)?,
            ),
        })
    }

    /// `None` when nothing was ever stored this session, `Some(None)` when a
    /// chat selection was explicitly cleared.
    pub fn current_chat_id(&self) -> Result<Option<Option<ChatId>>, KvError> {
        self.current_chat_id.get()
    }

    /// Stored as a JSON string, or `null` when cleared.
    pub fn set_current_chat_id(&self, id: Option<&ChatId>) -> Result<(), KvError> {
        self.current_chat_id.set(&id.cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::MemoryStore;

    fn store() -> Arc<dyn KeyValueStore> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn test_by_recipe_defaults_to_false() {
        let prefs = Preferences::new(store()).unwrap();
        assert!(!prefs.by_recipe());
    }

    #[test]
    fn test_by_recipe_round_trips_as_json_text() {
        let store = store();
        let prefs = Preferences::new(store.clone()).unwrap();
        prefs.set_by_recipe(true).unwrap();

        let key = KvKey::new(KeyNamespace::Local, BY_RECIPE_KEY).unwrap();
        assert_eq!(store.get(&key).unwrap().as_deref(), Some("true"));
        assert!(Preferences::new(store).unwrap().by_recipe());
    }

    #[test]
    fn test_garbage_by_recipe_reads_as_false() {
        let store = store();
        let key = KvKey::new(KeyNamespace::Local, BY_RECIPE_KEY).unwrap();
        store.set(&key, "yes please".into()).unwrap();
        assert!(!Preferences::new(store).unwrap().by_recipe());
    }

    #[test]
    fn test_chat_id_distinguishes_unset_from_cleared() {
        let store = store();
        let session = SessionState::new(store.clone()).unwrap();
        assert_eq!(session.current_chat_id().unwrap(), None);

        session.set_current_chat_id(Some(&ChatId::new("c1"))).unwrap();
        let key = KvKey::new(KeyNamespace::Session, CURRENT_CHAT_ID_KEY).unwrap();
        assert_eq!(store.get(&key).unwrap().as_deref(), Some("\"c1\""));
        assert_eq!(
            session.current_chat_id().unwrap(),
            Some(Some(ChatId::new("c1")))
        );

        session.set_current_chat_id(None).unwrap();
        assert_eq!(store.get(&key).unwrap().as_deref(), Some("null"));
        assert_eq!(session.current_chat_id().unwrap(), Some(None));
    }
}
