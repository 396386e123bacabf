mod http;
mod kv;

#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
mod sqlite_kv;

pub use self::http::{
    HttpClient, HttpError, HttpHeaders, HttpMethod, HttpRequest, HttpResponse, HttpResult,
    HttpTransport, ValidatedUrl, DEFAULT_TIMEOUT_MS, JSON_CONTENT_TYPE, MAX_REQUEST_BODY_SIZE,
    MAX_TIMEOUT_MS, MAX_URL_LENGTH,
};
pub use self::kv::{
    KeyNamespace, KeyValueStore, KvError, KvKey, MemoryStore, StorageErrorCode, TypedKvStore,
    MAX_KEY_LENGTH, MAX_VALUE_SIZE,
};

#[cfg(all(feature = "sqlite", not(target_arch = "wasm32")))]
pub use self::sqlite_kv::SqliteStore;
