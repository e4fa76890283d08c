//! # gcli Core
//!
//! Credential pool and dispatch engine for the gcli gateway.
//!
//! ```text
//! gcli-core/src/
//! ├── storage/      # key-value contract, memory + file stores, credential repository
//! ├── credentials/  # credential JSON import, GCLI_CREDS_* autoload
//! ├── pool/         # per-scope LRU selection, cooldown and disable transitions
//! ├── refresh/      # access-token refresh (OAuth refresh token, service-account JWT)
//! ├── upstream/     # Code Assist v1internal backend, retry-hint parsing
//! ├── dispatch/     # retry loop across credentials with backoff
//! ├── translate/    # model directives, OpenAI <-> Gemini mapping
//! ├── stream/       # Real / Fake / anti-truncation stream shaping, SSE framing
//! ├── usage/        # per-attempt usage events, recent error log
//! └── gateway.rs    # one logical request end to end
//! ```

#![allow(
    clippy::significant_drop_tightening,
    reason = "DashMap guards are dropped explicitly before every await"
)]
#![allow(clippy::implicit_clone, reason = "Explicit .clone() vs .to_string() is stylistic")]
#![cfg_attr(
    test,
    allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        reason = "Test code"
    )
)]

pub mod credentials;
pub mod dispatch;
pub mod gateway;
pub mod pool;
pub mod refresh;
pub mod storage;
pub mod stream;
pub mod translate;
pub mod upstream;
pub mod usage;

pub use dispatch::{DispatchRequest, DispatchResponse, Dispatcher};
pub use gateway::{Gateway, GatewayOutput};
pub use pool::{CredentialPool, CredentialStatus};
pub use refresh::{GoogleTokenExchanger, TokenExchanger, TokenRefresher};
pub use storage::{CredentialRepository, FileStore, KeyValueStore, MemoryStore};
pub use stream::{StreamItem, StreamMode};
pub use translate::ModelDirectives;
pub use upstream::{Backend, CodeAssistBackend};
pub use usage::{ErrorLog, TracingUsageSink, UsageEvent, UsageSink};
