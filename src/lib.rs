/*!
# oidc-server

An HTTP-host-agnostic OAuth 2.0 / OpenID Connect authorization server
core.

The crate accepts protocol requests at the well-known endpoints
(authorization, token, introspection, revocation, userinfo, logout,
discovery, JWKS), validates them against registered clients and persisted
state, and returns protocol-compliant responses carrying grants or errors.

Three layers do the work:

- A generic, ordered, filter-gated **event pipeline** dispatching each
  transaction through extract → validate → handle → apply stages.
- Per-endpoint **protocol state machines** implemented as the default
  handler tables: response-type and grant-type legality, PKCE, nonce,
  scope and audience enforcement, client authentication, redirect URI
  matching, prompt handling.
- **Entity managers** (applications, authorizations, tokens, scopes)
  wrapping a pluggable store, layering a sliding-expiration cache and
  enforcing case-sensitivity independent of backend collation.

Concrete HTTP bindings, storage backends and crypto policy stay outside:
the host adapter feeds a [`Transaction`] in and renders the response
message that comes back out.

## Quick start

```rust,no_run
use oidc_server::{AuthorizationServer, ServerOptions, SigningCredentials};
use oidc_server::entities::{ApplicationDescriptor, ClientType};
use oidc_server::stores::MemoryStore;
use std::sync::Arc;

# #[tokio::main]
# async fn main() -> Result<(), Box<dyn std::error::Error>> {
let options = ServerOptions::new()
    .issuer("https://id.example.com".parse()?)
    .add_signing_credentials(SigningCredentials::hmac(
        b"a-32-byte-minimum-signing-secret!",
        "key-1",
    ));

let server = AuthorizationServer::builder(options)
    .with_memory_store(Arc::new(MemoryStore::new()))
    .build()?;

// Register a confidential client.
let applications = server.applications().expect("store registered");
applications
    .create(&ApplicationDescriptor {
        client_id: Some("c1".into()),
        client_secret: Some("a-sufficiently-long-client-secret".into()),
        client_type: Some(ClientType::Confidential),
        redirect_uris: vec!["https://app/cb".into()],
        ..Default::default()
    })
    .await?;

// An HTTP adapter builds a transaction per request and calls
// `server.process(transaction)`.
# Ok(())
# }
```
*/

pub mod constants;
pub mod entities;
pub mod errors;
pub mod events;
pub mod managers;
pub mod message;
pub mod options;
pub mod pipeline;
pub mod principal;
pub mod serialization;
pub mod server;
pub mod stores;
pub mod transaction;

pub(crate) mod handlers;

pub use errors::{Result, ServerError, StorageError, ValidationError};
pub use message::{Message, Parameter, Request, Response};
pub use options::{ServerOptions, SigningCredentials};
pub use principal::Principal;
pub use serialization::{JwtTokenSerializer, TokenSerializer};
pub use server::{AuthorizationServer, AuthorizationServerBuilder, Registries};
pub use transaction::{EndpointType, HttpMethod, Transaction, Transport};

/// Commonly used types, importable in one line.
pub mod prelude {
    pub use crate::entities::{
        Application, ApplicationDescriptor, Authorization, AuthorizationDescriptor,
        AuthorizationStatus, AuthorizationType, ClientType, ConsentType, Scope, ScopeDescriptor,
        Token, TokenDescriptor, TokenStatus, TokenType,
    };
    pub use crate::errors::{Result, ServerError};
    pub use crate::managers::{
        ApplicationManager, AuthorizationManager, ScopeManager, TokenManager,
    };
    pub use crate::message::{Message, Parameter, Request, Response};
    pub use crate::options::{ServerOptions, SigningCredentials};
    pub use crate::pipeline::{EventHandler, EventRegistry, HandlerDescriptor};
    pub use crate::principal::Principal;
    pub use crate::serialization::TokenSerializer;
    pub use crate::server::AuthorizationServer;
    pub use crate::stores::MemoryStore;
    pub use crate::transaction::{EndpointType, Transaction, Transport};
}
