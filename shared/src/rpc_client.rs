use async_trait::async_trait;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::api::{
    AddItemInput, AddMessagesInput, AddNotesInput, ChatIdInput, CheckInput, CreateChatInput,
    CreateRecipeInput, IdInput, Procedure, RecipeApi, RpcError, RpcErrorCode, RpcResult,
    UpdateImgUrlInput,
};
use crate::capabilities::{HttpClient, HttpMethod, HttpRequest, ValidatedUrl};
use crate::model::{
    Chat, ChatId, ChatMessage, Ingredient, IngredientId, List, Recipe, RecipeId, RecipeIngredient,
    RecipeSummary, User,
};
use crate::validation::SignUp;

#[derive(Deserialize)]
struct SuccessEnvelope<T> {
    result: ResultData<T>,
}

#[derive(Deserialize)]
struct ResultData<T> {
    data: T,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorShape,
}

#[derive(Deserialize)]
struct ErrorShape {
    message: String,
    #[serde(default)]
    data: Option<ErrorData>,
}

#[derive(Deserialize)]
struct ErrorData {
    code: RpcErrorCode,
}

/// JSON-over-HTTP client for the procedure router.
#[derive(Clone)]
pub struct RpcClient {
    http: HttpClient,
    rpc_path: String,
}

impl RpcClient {
    pub fn new(http: HttpClient, rpc_path: impl Into<String>) -> Self {
        Self {
            http,
            rpc_path: rpc_path.into(),
        }
    }

    fn endpoint(&self, procedure: Procedure, query_input: Option<&str>) -> RpcResult<ValidatedUrl> {
        let path = format!("{}/{}", self.rpc_path.trim_end_matches('/'), procedure);
        let mut url = self.http.base_url().join(&path)?.to_url()?;
        if let Some(input) = query_input {
            url.query_pairs_mut().append_pair("input", input);
        }
        Ok(ValidatedUrl::new(url.to_string())?)
    }

    #[instrument(skip_all, fields(procedure = %procedure))]
    async fn call<I, O>(&self, procedure: Procedure, input: &I) -> RpcResult<O>
    where
        I: Serialize + Sync + ?Sized,
        O: DeserializeOwned,
    {
        let value = serde_json::to_value(input)
            .map_err(|e| RpcError::new(RpcErrorCode::BadRequest, e.to_string()))?;

        let request = if procedure.is_query() {
            let encoded = (!value.is_null()).then(|| value.to_string());
            HttpRequest::new(HttpMethod::Get, self.endpoint(procedure, encoded.as_deref())?)
        } else {
            HttpRequest::new(HttpMethod::Post, self.endpoint(procedure, None)?).with_json(&value)?
        };
        let request = request.with_timeout(self.http.timeout())?;

        let response = self.http.transport().execute(request).await?;
        debug!(status = response.status(), "rpc response");

        if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(response.body()) {
            let code = envelope
                .error
                .data
                .map(|d| d.code)
                .unwrap_or_else(|| RpcErrorCode::from_status(response.status()));
            return Err(RpcError::new(code, envelope.error.message));
        }

        if !response.is_success() {
            return Err(RpcError::new(
                RpcErrorCode::from_status(response.status()),
                String::from_utf8_lossy(response.body()).into_owned(),
            ));
        }

        serde_json::from_slice::<SuccessEnvelope<O>>(response.body())
            .map(|envelope| envelope.result.data)
            .map_err(|e| RpcError::new(RpcErrorCode::ParseError, e.to_string()))
    }

    async fn mutate<I: Serialize + Sync + ?Sized>(&self, procedure: Procedure, input: &I) -> RpcResult<()> {
        self.call::<I, IgnoredAny>(procedure, input).await.map(|_| ())
    }
}

#[async_trait]
impl RecipeApi for RpcClient {
    async fn list_by_user_id(&self) -> RpcResult<List> {
        self.call(Procedure::ListByUserId, &()).await
    }

    async fn list_add(&self, input: AddItemInput) -> RpcResult<Ingredient> {
        self.call(Procedure::ListAdd, &input).await
    }

    async fn list_clear(&self, ids: Vec<IngredientId>) -> RpcResult<()> {
        let input: Vec<IdInput<IngredientId>> = ids.into_iter().map(|id| IdInput { id }).collect();
        self.mutate(Procedure::ListClear, &input).await
    }

    async fn list_check(&self, input: CheckInput) -> RpcResult<()> {
        self.mutate(Procedure::ListCheck, &input).await
    }

    async fn list_check_many(&self, input: Vec<CheckInput>) -> RpcResult<()> {
        self.mutate(Procedure::ListCheckMany, &input).await
    }

    async fn list_upsert(&self, ingredients: Vec<RecipeIngredient>) -> RpcResult<()> {
        self.mutate(Procedure::ListUpsert, &ingredients).await
    }

    async fn recipe_by_id(&self, id: RecipeId) -> RpcResult<Option<Recipe>> {
        self.call(Procedure::RecipeById, &IdInput { id }).await
    }

    async fn recipe_by_ids(&self, ids: Vec<RecipeId>) -> RpcResult<Vec<RecipeSummary>> {
        self.call(Procedure::RecipeByIds, &ids).await
    }

    async fn recipe_update_img_url(&self, input: UpdateImgUrlInput) -> RpcResult<()> {
        self.mutate(Procedure::RecipeUpdateImgUrl, &input).await
    }

    async fn recipe_add_notes(&self, input: AddNotesInput) -> RpcResult<()> {
        self.mutate(Procedure::RecipeAddNotes, &input).await
    }

    async fn recipe_create(&self, input: CreateRecipeInput) -> RpcResult<Recipe> {
        self.call(Procedure::RecipeCreate, &input).await
    }

    async fn chat_create(&self, input: CreateChatInput) -> RpcResult<Chat> {
        self.call(Procedure::ChatCreate, &input).await
    }

    async fn chat_add_messages(&self, input: AddMessagesInput) -> RpcResult<Vec<ChatMessage>> {
        self.call(Procedure::ChatAddMessages, &input).await
    }

    async fn chat_get_messages_by_chat_id(&self, chat_id: ChatId) -> RpcResult<Vec<ChatMessage>> {
        self.call(Procedure::ChatGetMessagesByChatId, &ChatIdInput { chat_id })
            .await
    }

    async fn chat_get_chats(&self) -> RpcResult<Vec<Chat>> {
        self.call(Procedure::ChatGetChats, &()).await
    }

    async fn auth_sign_up(&self, input: SignUp) -> RpcResult<User> {
        self.call(Procedure::AuthSignUp, &input).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{HttpError, HttpHeaders, HttpResponse, HttpResult, HttpTransport};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct ScriptedTransport {
        status: u16,
        body: serde_json::Value,
        seen: Mutex<Vec<HttpRequest>>,
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn execute(&self, request: HttpRequest) -> HttpResult {
            self.seen.lock().unwrap().push(request);
            Ok(HttpResponse::new(
                self.status,
                HttpHeaders::new(),
                self.body.to_string().into_bytes(),
                "req".into(),
            ))
        }
    }

    fn client(status: u16, body: serde_json::Value) -> (RpcClient, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport {
            status,
            body,
            seen: Mutex::new(Vec::new()),
        });
        let http = HttpClient::new(
            transport.clone(),
            ValidatedUrl::new("http://localhost:3000").unwrap(),
            Duration::from_secs(10),
        );
        (RpcClient::new(http, "/api/trpc"), transport)
    }

    #[tokio::test]
    async fn test_query_uses_get_with_input_param() {
        let (client, transport) = client(
            200,
            serde_json::json!({"result": {"data": [{"id": "m1", "role": "user", "content": "hi"}]}}),
        );

        let messages = client
            .chat_get_messages_by_chat_id(ChatId::new("c1"))
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hi");

        let seen = transport.seen.lock().unwrap();
        let url = seen[0].url().to_url().unwrap();
        assert_eq!(seen[0].method(), HttpMethod::Get);
        assert_eq!(url.path(), "/api/trpc/chat.getMessagesByChatId");
        let input: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(input, vec![("input".to_string(), r#"{"chatId":"c1"}"#.to_string())]);
    }

    #[tokio::test]
    async fn test_query_without_input_has_no_param() {
        let (client, transport) = client(
            200,
            serde_json::json!({"result": {"data": {"id": "l1", "ingredients": []}}}),
        );
        let list = client.list_by_user_id().await.unwrap();
        assert!(list.is_empty());
        assert_eq!(transport.seen.lock().unwrap()[0].url().to_url().unwrap().query(), None);
    }

    #[tokio::test]
    async fn test_mutation_posts_json_body() {
        let (client, transport) = client(200, serde_json::json!({"result": {"data": {"count": 2}}}));
        client
            .list_check_many(vec![
                CheckInput { id: IngredientId::new("a"), checked: true },
                CheckInput { id: IngredientId::new("b"), checked: true },
            ])
            .await
            .unwrap();

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].method(), HttpMethod::Post);
        assert_eq!(seen[0].url().as_str(), "http://localhost:3000/api/trpc/list.checkMany");
        let body: serde_json::Value = serde_json::from_slice(seen[0].body().unwrap()).unwrap();
        assert_eq!(
            body,
            serde_json::json!([{"id": "a", "checked": true}, {"id": "b", "checked": true}])
        );
    }

    #[tokio::test]
    async fn test_error_envelope_keeps_code_and_message() {
        let (client, _) = client(
            409,
            serde_json::json!({"error": {"message": "User already exists.", "data": {"code": "CONFLICT"}}}),
        );
        let err = client
            .auth_sign_up(SignUp {
                email: "a@b.co".into(),
                password: "secret1".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err, RpcError::new(RpcErrorCode::Conflict, "User already exists."));
    }

    #[tokio::test]
    async fn test_non_envelope_failure_uses_status() {
        let (client, _) = client(502, serde_json::json!("bad gateway"));
        let err = client.list_by_user_id().await.unwrap_err();
        assert_eq!(err.code, RpcErrorCode::InternalServerError);
    }

    #[tokio::test]
    async fn test_transport_failure_maps_to_network() {
        struct Offline;

        #[async_trait]
        impl HttpTransport for Offline {
            async fn execute(&self, _request: HttpRequest) -> HttpResult {
                Err(HttpError::ConnectionError {
                    host: "localhost".into(),
                    message: "refused".into(),
                })
            }
        }

        let http = HttpClient::new(
            Arc::new(Offline),
            ValidatedUrl::new("http://localhost:3000").unwrap(),
            Duration::from_secs(1),
        );
        let err = RpcClient::new(http, "/api/trpc")
            .list_check(CheckInput { id: IngredientId::new("a"), checked: false })
            .await
            .unwrap_err();
        assert_eq!(err.code, RpcErrorCode::Network);
    }
}
