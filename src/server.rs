//! The authorization server: default handler tables and the outer
//! decision semantics.

use std::sync::Arc;

use crate::errors::{Result, ServerError};
use crate::events::{
    ApplyAuthorizationResponseContext, ApplyConfigurationResponseContext,
    ApplyIntrospectionResponseContext, ApplyJwksResponseContext, ApplyLogoutResponseContext,
    ApplyRevocationResponseContext, ApplyTokenResponseContext, ApplyUserinfoResponseContext,
    ExtractAuthorizationRequestContext, ExtractConfigurationRequestContext,
    ExtractIntrospectionRequestContext, ExtractJwksRequestContext, ExtractLogoutRequestContext,
    ExtractRevocationRequestContext, ExtractTokenRequestContext, ExtractUserinfoRequestContext,
    HandleAuthorizationRequestContext, HandleConfigurationRequestContext,
    HandleIntrospectionRequestContext, HandleJwksRequestContext, HandleLogoutRequestContext,
    HandleRevocationRequestContext, HandleTokenRequestContext, HandleUserinfoRequestContext,
    ProcessErrorContext, ProcessRequestContext, ProcessSigninContext, ProcessSignoutContext,
    ValidateAuthorizationRequestContext, ValidateIntrospectionRequestContext,
    ValidateLogoutRequestContext, ValidateRevocationRequestContext, ValidateTokenRequestContext,
    ValidateUserinfoRequestContext,
};
use crate::handlers::Services;
use crate::managers::{ApplicationManager, AuthorizationManager, ScopeManager, TokenManager};
use crate::options::ServerOptions;
use crate::pipeline::{
    EventRegistry, HandlerDescriptor, RequireAuthorizationPassthroughDisabled,
    RequireAuthorizationStorageEnabled, RequireDegradedModeDisabled,
    RequireEndpointPermissionsEnabled, RequireGrantTypePermissionsEnabled, RequireHttpRequest,
    RequireLogoutPassthroughDisabled, RequireResponseTypePermissionsEnabled,
    RequireScopePermissionsEnabled, RequireScopeValidationEnabled, RequireTokenStorageEnabled,
    RequireUserinfoPassthroughDisabled, Resolution, ValidationState,
};
use crate::principal::Principal;
use crate::serialization::{JwtTokenSerializer, TokenSerializer};
use crate::stores::{ApplicationStore, AuthorizationStore, MemoryStore, ScopeStore, TokenStore};
use crate::transaction::{EndpointType, Transaction, property_keys};

/// The descriptor tables, one per event type. Host handlers are registered
/// here before the server is built.
#[derive(Default)]
pub struct Registries {
    pub process_request: EventRegistry<ProcessRequestContext>,
    pub process_error: EventRegistry<ProcessErrorContext>,
    pub process_signin: EventRegistry<ProcessSigninContext>,
    pub process_signout: EventRegistry<ProcessSignoutContext>,

    pub extract_authorization: EventRegistry<ExtractAuthorizationRequestContext>,
    pub validate_authorization: EventRegistry<ValidateAuthorizationRequestContext>,
    pub handle_authorization: EventRegistry<HandleAuthorizationRequestContext>,
    pub apply_authorization: EventRegistry<ApplyAuthorizationResponseContext>,

    pub extract_token: EventRegistry<ExtractTokenRequestContext>,
    pub validate_token: EventRegistry<ValidateTokenRequestContext>,
    pub handle_token: EventRegistry<HandleTokenRequestContext>,
    pub apply_token: EventRegistry<ApplyTokenResponseContext>,

    pub extract_introspection: EventRegistry<ExtractIntrospectionRequestContext>,
    pub validate_introspection: EventRegistry<ValidateIntrospectionRequestContext>,
    pub handle_introspection: EventRegistry<HandleIntrospectionRequestContext>,
    pub apply_introspection: EventRegistry<ApplyIntrospectionResponseContext>,

    pub extract_revocation: EventRegistry<ExtractRevocationRequestContext>,
    pub validate_revocation: EventRegistry<ValidateRevocationRequestContext>,
    pub handle_revocation: EventRegistry<HandleRevocationRequestContext>,
    pub apply_revocation: EventRegistry<ApplyRevocationResponseContext>,

    pub extract_userinfo: EventRegistry<ExtractUserinfoRequestContext>,
    pub validate_userinfo: EventRegistry<ValidateUserinfoRequestContext>,
    pub handle_userinfo: EventRegistry<HandleUserinfoRequestContext>,
    pub apply_userinfo: EventRegistry<ApplyUserinfoResponseContext>,

    pub extract_logout: EventRegistry<ExtractLogoutRequestContext>,
    pub validate_logout: EventRegistry<ValidateLogoutRequestContext>,
    pub handle_logout: EventRegistry<HandleLogoutRequestContext>,
    pub apply_logout: EventRegistry<ApplyLogoutResponseContext>,

    pub extract_configuration: EventRegistry<ExtractConfigurationRequestContext>,
    pub handle_configuration: EventRegistry<HandleConfigurationRequestContext>,
    pub apply_configuration: EventRegistry<ApplyConfigurationResponseContext>,

    pub extract_jwks: EventRegistry<ExtractJwksRequestContext>,
    pub handle_jwks: EventRegistry<HandleJwksRequestContext>,
    pub apply_jwks: EventRegistry<ApplyJwksResponseContext>,
}

/// Assembles an [`AuthorizationServer`].
pub struct AuthorizationServerBuilder {
    options: ServerOptions,
    applications: Option<Arc<dyn ApplicationStore>>,
    authorizations: Option<Arc<dyn AuthorizationStore>>,
    tokens: Option<Arc<dyn TokenStore>>,
    scopes: Option<Arc<dyn ScopeStore>>,
    serializer: Option<Arc<dyn TokenSerializer>>,
    registries: Registries,
}

impl AuthorizationServerBuilder {
    pub fn new(options: ServerOptions) -> Self {
        Self {
            options,
            applications: None,
            authorizations: None,
            tokens: None,
            scopes: None,
            serializer: None,
            registries: Registries::default(),
        }
    }

    /// Use one backend for all four entity stores.
    pub fn with_memory_store(mut self, store: Arc<MemoryStore>) -> Self {
        self.applications = Some(store.clone());
        self.authorizations = Some(store.clone());
        self.tokens = Some(store.clone());
        self.scopes = Some(store);
        self
    }

    pub fn with_application_store(mut self, store: Arc<dyn ApplicationStore>) -> Self {
        self.applications = Some(store);
        self
    }

    pub fn with_authorization_store(mut self, store: Arc<dyn AuthorizationStore>) -> Self {
        self.authorizations = Some(store);
        self
    }

    pub fn with_token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.tokens = Some(store);
        self
    }

    pub fn with_scope_store(mut self, store: Arc<dyn ScopeStore>) -> Self {
        self.scopes = Some(store);
        self
    }

    /// Replace the default JWT serializer.
    pub fn with_serializer(mut self, serializer: Arc<dyn TokenSerializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Access the descriptor tables to register or remove handlers before
    /// the defaults are installed. Host descriptors with orders between the
    /// built-in values (spaced by 1000) interleave with them.
    pub fn registries(&mut self) -> &mut Registries {
        &mut self.registries
    }

    pub fn build(self) -> Result<AuthorizationServer> {
        let options = Arc::new(self.options);

        if !options.enable_degraded_mode
            && (self.applications.is_none() || self.tokens.is_none())
        {
            return Err(ServerError::config(
                "an application store and a token store are required unless degraded mode is enabled",
            ));
        }

        let serializer = match self.serializer {
            Some(serializer) => serializer,
            None => {
                let credentials = options.active_signing_credentials().cloned().ok_or_else(
                    || {
                        ServerError::config(
                            "signing credentials are required to build the default token serializer",
                        )
                    },
                )?;
                Arc::new(JwtTokenSerializer::new(credentials, options.issuer.clone()))
            }
        };

        let services = Arc::new(Services {
            options: options.clone(),
            applications: self
                .applications
                .map(|store| Arc::new(ApplicationManager::new(store, &options))),
            authorizations: self
                .authorizations
                .map(|store| Arc::new(AuthorizationManager::new(store, &options))),
            tokens: self
                .tokens
                .map(|store| Arc::new(TokenManager::new(store, &options))),
            scopes: self
                .scopes
                .map(|store| Arc::new(ScopeManager::new(store, &options))),
            serializer,
        });

        let mut registries = self.registries;
        install_default_handlers(&mut registries, &services);

        Ok(AuthorizationServer {
            options,
            services,
            registries,
        })
    }
}

/// HTTP-host-agnostic OAuth 2.0 / OpenID Connect authorization server
/// core.
///
/// An adapter builds a [`Transaction`] from the incoming request, calls
/// [`process`](Self::process) and renders the resulting response message
/// (plus the `response_destination` property for redirect-based flows).
pub struct AuthorizationServer {
    options: Arc<ServerOptions>,
    services: Arc<Services>,
    registries: Registries,
}

impl AuthorizationServer {
    pub fn builder(options: ServerOptions) -> AuthorizationServerBuilder {
        AuthorizationServerBuilder::new(options)
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// The descriptor tables, for late registration or removal of
    /// handlers. Removal of required built-ins is refused.
    pub fn registries_mut(&mut self) -> &mut Registries {
        &mut self.registries
    }

    /// Create a transaction bound to this server's options snapshot.
    pub fn create_transaction(&self) -> Transaction {
        Transaction::new(self.options.clone())
    }

    /// The application manager, when a store was registered.
    pub fn applications(&self) -> Option<Arc<ApplicationManager>> {
        self.services.applications.clone()
    }

    pub fn authorizations(&self) -> Option<Arc<AuthorizationManager>> {
        self.services.authorizations.clone()
    }

    pub fn tokens(&self) -> Option<Arc<TokenManager>> {
        self.services.tokens.clone()
    }

    pub fn scopes(&self) -> Option<Arc<ScopeManager>> {
        self.services.scopes.clone()
    }

    /// Run a transaction through the pipeline.
    ///
    /// Outer decision semantics: a handled or skipped sub-event propagates
    /// as-is, a rejection dispatches the error event, and success
    /// dispatches the endpoint's apply-response event.
    pub async fn process(&self, transaction: Transaction) -> Result<Transaction> {
        let mut context = ProcessRequestContext::new(transaction);
        self.registries.process_request.dispatch(&mut context).await?;
        let resolution = context.state.resolution();
        let transaction = context.transaction;
        if matches!(resolution, Resolution::Handled | Resolution::Skipped) {
            return Ok(transaction);
        }

        match transaction.endpoint_type {
            EndpointType::Authorization => self.process_authorization(transaction).await,
            EndpointType::Token => self.process_token(transaction).await,
            EndpointType::Introspection => self.process_introspection(transaction).await,
            EndpointType::Revocation => self.process_revocation(transaction).await,
            EndpointType::Userinfo => self.process_userinfo(transaction).await,
            EndpointType::Logout => self.process_logout(transaction).await,
            EndpointType::Configuration => self.process_configuration(transaction).await,
            EndpointType::Cryptography => self.process_cryptography(transaction).await,
            // Not one of ours: hand the transaction back untouched.
            EndpointType::Unknown => Ok(transaction),
        }
    }

    async fn process_error(
        &self,
        transaction: Transaction,
        validation: &ValidationState,
    ) -> Result<Transaction> {
        let mut context = ProcessErrorContext::new(
            transaction,
            validation.error().map(str::to_string),
            validation.error_description().map(str::to_string),
            validation.error_uri().map(str::to_string),
        );
        self.registries.process_error.dispatch(&mut context).await?;
        Ok(context.transaction)
    }

    async fn process_signin(
        &self,
        transaction: Transaction,
        principal: Principal,
    ) -> Result<Transaction> {
        let mut context = ProcessSigninContext::new(transaction, principal);
        self.registries.process_signin.dispatch(&mut context).await?;
        let transaction = context.transaction;

        match transaction.endpoint_type {
            EndpointType::Authorization => {
                let mut apply = ApplyAuthorizationResponseContext::new(transaction);
                self.registries.apply_authorization.dispatch(&mut apply).await?;
                Ok(apply.transaction)
            }
            EndpointType::Token => {
                let mut apply = ApplyTokenResponseContext::new(transaction);
                self.registries.apply_token.dispatch(&mut apply).await?;
                Ok(apply.transaction)
            }
            _ => Ok(transaction),
        }
    }

    async fn process_authorization(&self, transaction: Transaction) -> Result<Transaction> {
        let mut extract = ExtractAuthorizationRequestContext::new(transaction);
        self.registries.extract_authorization.dispatch(&mut extract).await?;
        if matches!(
            extract.state.resolution(),
            Resolution::Handled | Resolution::Skipped
        ) {
            return Ok(extract.transaction);
        }

        let mut validate = ValidateAuthorizationRequestContext::new(extract.transaction);
        self.registries.validate_authorization.dispatch(&mut validate).await?;
        if validate.validation.is_rejected() {
            let validation = validate.validation.clone();
            return self.process_error(validate.transaction, &validation).await;
        }
        let mut transaction = validate.transaction;
        if let Some(redirect_uri) = validate.redirect_uri {
            transaction.set_property(property_keys::VALIDATED_REDIRECT_URI, redirect_uri);
        }

        let mut handle = HandleAuthorizationRequestContext::new(transaction);
        self.registries.handle_authorization.dispatch(&mut handle).await?;
        if handle.validation.is_rejected() {
            let validation = handle.validation.clone();
            return self.process_error(handle.transaction, &validation).await;
        }
        if let Some(principal) = handle.principal.take() {
            return self.process_signin(handle.transaction, principal).await;
        }
        match handle.state.resolution() {
            Resolution::Handled | Resolution::Skipped => Ok(handle.transaction),
            _ => Err(ServerError::config(
                "no handler produced a principal for the authorization request; \
                 attach a handler to the handle-authorization event",
            )),
        }
    }

    async fn process_token(&self, transaction: Transaction) -> Result<Transaction> {
        let mut extract = ExtractTokenRequestContext::new(transaction);
        self.registries.extract_token.dispatch(&mut extract).await?;
        if matches!(
            extract.state.resolution(),
            Resolution::Handled | Resolution::Skipped
        ) {
            return Ok(extract.transaction);
        }

        let mut validate = ValidateTokenRequestContext::new(extract.transaction);
        self.registries.validate_token.dispatch(&mut validate).await?;
        if validate.validation.is_rejected() {
            let validation = validate.validation.clone();
            return self.process_error(validate.transaction, &validation).await;
        }

        let mut handle = HandleTokenRequestContext::new(
            validate.transaction,
            validate.application,
            validate.principal,
            validate.token_entry,
        );
        self.registries.handle_token.dispatch(&mut handle).await?;
        if handle.validation.is_rejected() {
            let validation = handle.validation.clone();
            return self.process_error(handle.transaction, &validation).await;
        }
        if let Some(principal) = handle.principal.take() {
            return self.process_signin(handle.transaction, principal).await;
        }
        match handle.state.resolution() {
            Resolution::Handled | Resolution::Skipped => Ok(handle.transaction),
            _ => Err(ServerError::config(
                "no handler produced a principal for the token request; the requested grant \
                 requires a host-attached handler",
            )),
        }
    }

    async fn process_introspection(&self, transaction: Transaction) -> Result<Transaction> {
        let mut extract = ExtractIntrospectionRequestContext::new(transaction);
        self.registries.extract_introspection.dispatch(&mut extract).await?;
        if matches!(
            extract.state.resolution(),
            Resolution::Handled | Resolution::Skipped
        ) {
            return Ok(extract.transaction);
        }

        let mut validate = ValidateIntrospectionRequestContext::new(extract.transaction);
        self.registries.validate_introspection.dispatch(&mut validate).await?;
        if validate.validation.is_rejected() {
            let validation = validate.validation.clone();
            return self.process_error(validate.transaction, &validation).await;
        }

        let mut handle = HandleIntrospectionRequestContext::new(
            validate.transaction,
            validate.application,
            validate.principal,
            validate.token_entry,
        );
        self.registries.handle_introspection.dispatch(&mut handle).await?;

        let mut apply = ApplyIntrospectionResponseContext::new(handle.transaction);
        self.registries.apply_introspection.dispatch(&mut apply).await?;
        Ok(apply.transaction)
    }

    async fn process_revocation(&self, transaction: Transaction) -> Result<Transaction> {
        let mut extract = ExtractRevocationRequestContext::new(transaction);
        self.registries.extract_revocation.dispatch(&mut extract).await?;
        if matches!(
            extract.state.resolution(),
            Resolution::Handled | Resolution::Skipped
        ) {
            return Ok(extract.transaction);
        }

        let mut validate = ValidateRevocationRequestContext::new(extract.transaction);
        self.registries.validate_revocation.dispatch(&mut validate).await?;
        if validate.validation.is_rejected() {
            let validation = validate.validation.clone();
            return self.process_error(validate.transaction, &validation).await;
        }

        let mut handle = HandleRevocationRequestContext::new(
            validate.transaction,
            validate.application,
            validate.token_entry,
        );
        self.registries.handle_revocation.dispatch(&mut handle).await?;

        let mut apply = ApplyRevocationResponseContext::new(handle.transaction);
        self.registries.apply_revocation.dispatch(&mut apply).await?;
        Ok(apply.transaction)
    }

    async fn process_userinfo(&self, transaction: Transaction) -> Result<Transaction> {
        let mut extract = ExtractUserinfoRequestContext::new(transaction);
        self.registries.extract_userinfo.dispatch(&mut extract).await?;
        if matches!(
            extract.state.resolution(),
            Resolution::Handled | Resolution::Skipped
        ) {
            return Ok(extract.transaction);
        }

        let mut validate = ValidateUserinfoRequestContext::new(extract.transaction);
        self.registries.validate_userinfo.dispatch(&mut validate).await?;
        if validate.validation.is_rejected() {
            let validation = validate.validation.clone();
            return self.process_error(validate.transaction, &validation).await;
        }

        let mut handle = HandleUserinfoRequestContext::new(
            validate.transaction,
            validate.principal,
            validate.application,
        );
        self.registries.handle_userinfo.dispatch(&mut handle).await?;

        let mut apply = ApplyUserinfoResponseContext::new(handle.transaction);
        self.registries.apply_userinfo.dispatch(&mut apply).await?;
        Ok(apply.transaction)
    }

    async fn process_logout(&self, transaction: Transaction) -> Result<Transaction> {
        let mut extract = ExtractLogoutRequestContext::new(transaction);
        self.registries.extract_logout.dispatch(&mut extract).await?;
        if matches!(
            extract.state.resolution(),
            Resolution::Handled | Resolution::Skipped
        ) {
            return Ok(extract.transaction);
        }

        let mut validate = ValidateLogoutRequestContext::new(extract.transaction);
        self.registries.validate_logout.dispatch(&mut validate).await?;
        if validate.validation.is_rejected() {
            let validation = validate.validation.clone();
            return self.process_error(validate.transaction, &validation).await;
        }

        let mut handle = HandleLogoutRequestContext::new(validate.transaction);
        self.registries.handle_logout.dispatch(&mut handle).await?;
        if matches!(
            handle.state.resolution(),
            Resolution::Handled | Resolution::Skipped
        ) {
            return Ok(handle.transaction);
        }
        // The host decides the demand via `allow_logout()`. A demand
        // nobody allowed is denied: no sign-out, no redirect; the host
        // renders its own response.
        if !handle.is_logout_allowed {
            tracing::debug!("logout demand was not allowed by any handler");
            return Ok(handle.transaction);
        }
        handle
            .transaction
            .set_property(property_keys::LOGOUT_ALLOWED, true);

        let mut signout = ProcessSignoutContext::new(handle.transaction);
        self.registries.process_signout.dispatch(&mut signout).await?;

        let mut apply = ApplyLogoutResponseContext::new(signout.transaction);
        self.registries.apply_logout.dispatch(&mut apply).await?;
        Ok(apply.transaction)
    }

    async fn process_configuration(&self, transaction: Transaction) -> Result<Transaction> {
        let mut extract = ExtractConfigurationRequestContext::new(transaction);
        self.registries.extract_configuration.dispatch(&mut extract).await?;

        let mut handle = HandleConfigurationRequestContext::new(extract.transaction);
        self.registries.handle_configuration.dispatch(&mut handle).await?;

        let mut apply = ApplyConfigurationResponseContext::new(handle.transaction);
        self.registries.apply_configuration.dispatch(&mut apply).await?;
        Ok(apply.transaction)
    }

    async fn process_cryptography(&self, transaction: Transaction) -> Result<Transaction> {
        let mut extract = ExtractJwksRequestContext::new(transaction);
        self.registries.extract_jwks.dispatch(&mut extract).await?;

        let mut handle = HandleJwksRequestContext::new(extract.transaction);
        self.registries.handle_jwks.dispatch(&mut handle).await?;

        let mut apply = ApplyJwksResponseContext::new(handle.transaction);
        self.registries.apply_jwks.dispatch(&mut apply).await?;
        Ok(apply.transaction)
    }
}

/// Install the built-in descriptor tables. Orders are spaced by 1000 so
/// host descriptors can interleave anywhere.
fn install_default_handlers(registries: &mut Registries, services: &Arc<Services>) {
    use crate::handlers::{
        authorization as authz, discovery, exchange, introspection, logout, protocol, revocation,
        token, userinfo,
    };

    let r = registries;

    r.process_request.register(
        HandlerDescriptor::singleton("infer_issuer_from_host", 1000, protocol::InferIssuerFromHost)
            .with_filter(RequireHttpRequest)
            .required(),
    );
    r.process_request.register(
        HandlerDescriptor::singleton("infer_endpoint_type", 2000, protocol::InferEndpointType)
            .with_filter(RequireHttpRequest)
            .required(),
    );

    r.process_error.register(
        HandlerDescriptor::singleton("attach_error_parameters", 1000, protocol::AttachErrorParameters)
            .required(),
    );
    r.process_error.register(
        HandlerDescriptor::singleton(
            "attach_error_destination",
            2000,
            protocol::AttachErrorDestination {
                services: services.clone(),
            },
        )
        .required(),
    );

    // Authorization endpoint.
    r.extract_authorization.register(
        HandlerDescriptor::singleton(
            "extract_authorization_request",
            1000,
            authz::ExtractAuthorizationRequest,
        )
        .required(),
    );
    r.validate_authorization.register(
        HandlerDescriptor::singleton("validate_request_parameter", 1000, authz::ValidateRequestParameter)
            .required(),
    );
    r.validate_authorization.register(
        HandlerDescriptor::singleton(
            "validate_request_uri_parameter",
            2000,
            authz::ValidateRequestUriParameter,
        )
        .required(),
    );
    r.validate_authorization.register(
        HandlerDescriptor::singleton(
            "validate_client_id_parameter",
            3000,
            authz::ValidateClientIdParameter,
        )
        .required(),
    );
    r.validate_authorization.register(
        HandlerDescriptor::singleton(
            "validate_redirect_uri_parameter",
            4000,
            authz::ValidateRedirectUriParameter,
        )
        .required(),
    );
    r.validate_authorization.register(
        HandlerDescriptor::singleton(
            "validate_response_type_parameter",
            5000,
            authz::ValidateResponseTypeParameter,
        )
        .required(),
    );
    r.validate_authorization.register(
        HandlerDescriptor::singleton(
            "validate_response_mode_parameter",
            6000,
            authz::ValidateResponseModeParameter,
        )
        .required(),
    );
    r.validate_authorization.register(
        HandlerDescriptor::singleton("validate_nonce_parameter", 7000, authz::ValidateNonceParameter)
            .required(),
    );
    r.validate_authorization.register(
        HandlerDescriptor::singleton("validate_prompt_parameter", 8000, authz::ValidatePromptParameter)
            .required(),
    );
    r.validate_authorization.register(
        HandlerDescriptor::singleton("validate_pkce_parameters", 9000, authz::ValidatePkceParameters)
            .required(),
    );
    r.validate_authorization.register(
        HandlerDescriptor::singleton(
            "validate_scopes",
            10000,
            authz::ValidateScopes {
                services: services.clone(),
            },
        )
        .with_filter(RequireScopeValidationEnabled)
        .with_filter(RequireDegradedModeDisabled),
    );
    r.validate_authorization.register(
        HandlerDescriptor::singleton(
            "validate_client_identity",
            11000,
            authz::ValidateClientIdentity {
                services: services.clone(),
            },
        )
        .with_filter(RequireDegradedModeDisabled)
        .required(),
    );
    r.validate_authorization.register(
        HandlerDescriptor::singleton("validate_client_type", 12000, authz::ValidateClientType)
            .with_filter(RequireDegradedModeDisabled)
            .required(),
    );
    r.validate_authorization.register(
        HandlerDescriptor::singleton(
            "validate_client_redirect_uri",
            13000,
            authz::ValidateClientRedirectUri,
        )
        .with_filter(RequireDegradedModeDisabled)
        .required(),
    );
    r.validate_authorization.register(
        HandlerDescriptor::singleton(
            "validate_endpoint_permissions",
            14000,
            authz::ValidateEndpointPermissions,
        )
        .with_filter(RequireDegradedModeDisabled)
        .with_filter(RequireEndpointPermissionsEnabled),
    );
    r.validate_authorization.register(
        HandlerDescriptor::singleton(
            "validate_grant_type_permissions",
            15000,
            authz::ValidateGrantTypePermissions,
        )
        .with_filter(RequireDegradedModeDisabled)
        .with_filter(RequireGrantTypePermissionsEnabled),
    );
    r.validate_authorization.register(
        HandlerDescriptor::singleton(
            "validate_response_type_permissions",
            16000,
            authz::ValidateResponseTypePermissions,
        )
        .with_filter(RequireDegradedModeDisabled)
        .with_filter(RequireResponseTypePermissionsEnabled),
    );
    r.validate_authorization.register(
        HandlerDescriptor::singleton(
            "validate_scope_permissions",
            17000,
            authz::ValidateScopePermissions,
        )
        .with_filter(RequireDegradedModeDisabled)
        .with_filter(RequireScopePermissionsEnabled),
    );
    r.apply_authorization.register(
        HandlerDescriptor::singleton(
            "attach_authorization_response_destination",
            1000,
            authz::AttachAuthorizationResponseDestination,
        )
        .with_filter(RequireAuthorizationPassthroughDisabled)
        .required(),
    );

    // Token endpoint.
    r.extract_token.register(
        HandlerDescriptor::singleton("extract_token_request", 1000, token::ExtractTokenRequest)
            .required(),
    );
    r.validate_token.register(
        HandlerDescriptor::singleton(
            "validate_grant_type_parameter",
            1000,
            token::ValidateGrantTypeParameter,
        )
        .required(),
    );
    r.validate_token.register(
        HandlerDescriptor::singleton(
            "validate_client_id_parameter",
            2000,
            token::ValidateClientIdParameter,
        )
        .required(),
    );
    r.validate_token.register(
        HandlerDescriptor::singleton(
            "validate_client_identity",
            3000,
            token::ValidateClientIdentity {
                services: services.clone(),
            },
        )
        .with_filter(RequireDegradedModeDisabled)
        .required(),
    );
    r.validate_token.register(
        HandlerDescriptor::singleton(
            "validate_client_authentication",
            4000,
            token::ValidateClientAuthentication {
                services: services.clone(),
            },
        )
        .with_filter(RequireDegradedModeDisabled)
        .required(),
    );
    r.validate_token.register(
        HandlerDescriptor::singleton(
            "validate_grant_type_permission",
            5000,
            token::ValidateGrantTypePermission,
        )
        .with_filter(RequireDegradedModeDisabled)
        .with_filter(RequireGrantTypePermissionsEnabled),
    );
    r.validate_token.register(
        HandlerDescriptor::singleton(
            "validate_authorization_code_parameter",
            6000,
            token::ValidateAuthorizationCodeParameter {
                services: services.clone(),
            },
        )
        .required(),
    );
    r.validate_token.register(
        HandlerDescriptor::singleton(
            "validate_refresh_token_parameter",
            7000,
            token::ValidateRefreshTokenParameter {
                services: services.clone(),
            },
        )
        .required(),
    );
    r.validate_token.register(
        HandlerDescriptor::singleton(
            "validate_resource_owner_credentials",
            8000,
            token::ValidateResourceOwnerCredentials,
        )
        .required(),
    );
    r.validate_token.register(
        HandlerDescriptor::singleton("validate_scope_subset", 9000, token::ValidateScopeSubset)
            .required(),
    );
    r.validate_token.register(
        HandlerDescriptor::singleton(
            "validate_requested_scopes",
            10000,
            token::ValidateRequestedScopes {
                services: services.clone(),
            },
        )
        .with_filter(RequireScopeValidationEnabled)
        .with_filter(RequireDegradedModeDisabled),
    );
    r.handle_token.register(
        HandlerDescriptor::singleton(
            "redeem_authorization_code_entry",
            1000,
            token::RedeemAuthorizationCodeEntry {
                services: services.clone(),
            },
        )
        .with_filter(RequireTokenStorageEnabled)
        .required(),
    );
    r.handle_token.register(
        HandlerDescriptor::singleton(
            "redeem_refresh_token_entry",
            2000,
            token::RedeemRefreshTokenEntry {
                services: services.clone(),
            },
        )
        .with_filter(RequireTokenStorageEnabled)
        .required(),
    );
    r.handle_token.register(
        HandlerDescriptor::singleton(
            "prepare_exchange_principal",
            3000,
            token::PrepareExchangePrincipal,
        )
        .required(),
    );
    r.handle_token.register(
        HandlerDescriptor::singleton(
            "prepare_client_credentials_principal",
            4000,
            token::PrepareClientCredentialsPrincipal,
        )
        .required(),
    );

    // Introspection endpoint.
    r.extract_introspection.register(
        HandlerDescriptor::singleton(
            "extract_introspection_request",
            1000,
            introspection::ExtractIntrospectionRequest,
        )
        .required(),
    );
    r.validate_introspection.register(
        HandlerDescriptor::singleton("validate_http_method", 1000, introspection::ValidateHttpMethod)
            .required(),
    );
    r.validate_introspection.register(
        HandlerDescriptor::singleton(
            "validate_token_parameter",
            2000,
            introspection::ValidateTokenParameter,
        )
        .required(),
    );
    r.validate_introspection.register(
        HandlerDescriptor::singleton(
            "validate_client_authentication",
            3000,
            introspection::ValidateClientAuthentication {
                services: services.clone(),
            },
        )
        .with_filter(RequireDegradedModeDisabled)
        .required(),
    );
    r.validate_introspection.register(
        HandlerDescriptor::singleton(
            "resolve_introspected_token",
            4000,
            introspection::ResolveIntrospectedToken {
                services: services.clone(),
            },
        )
        .with_filter(RequireDegradedModeDisabled),
    );
    r.handle_introspection.register(
        HandlerDescriptor::singleton(
            "attach_introspection_claims",
            1000,
            introspection::AttachIntrospectionClaims,
        )
        .required(),
    );

    // Revocation endpoint.
    r.extract_revocation.register(
        HandlerDescriptor::singleton(
            "extract_revocation_request",
            1000,
            revocation::ExtractRevocationRequest,
        )
        .required(),
    );
    r.validate_revocation.register(
        HandlerDescriptor::singleton("validate_http_method", 1000, revocation::ValidateHttpMethod)
            .required(),
    );
    r.validate_revocation.register(
        HandlerDescriptor::singleton(
            "validate_token_parameter",
            2000,
            revocation::ValidateTokenParameter,
        )
        .required(),
    );
    r.validate_revocation.register(
        HandlerDescriptor::singleton(
            "validate_client_authentication",
            3000,
            revocation::ValidateClientAuthentication {
                services: services.clone(),
            },
        )
        .with_filter(RequireDegradedModeDisabled)
        .required(),
    );
    r.validate_revocation.register(
        HandlerDescriptor::singleton(
            "resolve_revocable_token",
            4000,
            revocation::ResolveRevocableToken {
                services: services.clone(),
            },
        )
        .with_filter(RequireDegradedModeDisabled),
    );
    r.handle_revocation.register(
        HandlerDescriptor::singleton(
            "revoke_token_entry",
            1000,
            revocation::RevokeTokenEntry {
                services: services.clone(),
            },
        )
        .with_filter(RequireTokenStorageEnabled)
        .required(),
    );

    // Userinfo endpoint.
    r.extract_userinfo.register(
        HandlerDescriptor::singleton(
            "extract_userinfo_request",
            1000,
            userinfo::ExtractUserinfoRequest,
        )
        .required(),
    );
    r.validate_userinfo.register(
        HandlerDescriptor::singleton(
            "validate_access_token",
            1000,
            userinfo::ValidateAccessToken {
                services: services.clone(),
            },
        )
        .required(),
    );
    r.handle_userinfo.register(
        HandlerDescriptor::singleton(
            "attach_userinfo_claims",
            1000,
            userinfo::AttachUserinfoClaims,
        )
        .required(),
    );
    r.apply_userinfo.register(
        HandlerDescriptor::singleton("attach_signed_userinfo", 1000, userinfo::AttachSignedUserinfo)
            .with_filter(RequireUserinfoPassthroughDisabled)
            .required(),
    );

    // Logout endpoint.
    r.extract_logout.register(
        HandlerDescriptor::singleton("extract_logout_request", 1000, logout::ExtractLogoutRequest)
            .required(),
    );
    r.validate_logout.register(
        HandlerDescriptor::singleton(
            "validate_post_logout_redirect_uri",
            1000,
            logout::ValidatePostLogoutRedirectUri {
                services: services.clone(),
            },
        )
        .with_filter(RequireDegradedModeDisabled)
        .required(),
    );
    r.apply_logout.register(
        HandlerDescriptor::singleton(
            "attach_logout_response_destination",
            1000,
            logout::AttachLogoutResponseDestination,
        )
        .with_filter(RequireLogoutPassthroughDisabled)
        .required(),
    );

    // Discovery endpoints.
    r.handle_configuration.register(
        HandlerDescriptor::singleton(
            "attach_configuration_metadata",
            1000,
            discovery::AttachConfigurationMetadata {
                services: services.clone(),
            },
        )
        .required(),
    );
    r.handle_jwks.register(
        HandlerDescriptor::singleton("attach_json_web_keys", 1000, discovery::AttachJsonWebKeys)
            .required(),
    );

    // Sign-in processing.
    r.process_signin.register(
        HandlerDescriptor::singleton("validate_signin_demand", 1000, exchange::ValidateSigninDemand)
            .required(),
    );
    r.process_signin.register(
        HandlerDescriptor::singleton(
            "resolve_signin_application",
            2000,
            exchange::ResolveSigninApplication {
                services: services.clone(),
            },
        )
        .with_filter(RequireDegradedModeDisabled)
        .required(),
    );
    r.process_signin.register(
        HandlerDescriptor::singleton(
            "attach_audiences",
            3000,
            exchange::AttachAudiences {
                services: services.clone(),
            },
        )
        .with_filter(RequireDegradedModeDisabled),
    );
    r.process_signin.register(
        HandlerDescriptor::singleton(
            "attach_authorization_entry",
            4000,
            exchange::AttachAuthorizationEntry {
                services: services.clone(),
            },
        )
        .with_filter(RequireAuthorizationStorageEnabled)
        .required(),
    );
    r.process_signin.register(
        HandlerDescriptor::singleton(
            "attach_authorization_code",
            5000,
            exchange::AttachAuthorizationCode {
                services: services.clone(),
            },
        )
        .required(),
    );
    r.process_signin.register(
        HandlerDescriptor::singleton(
            "attach_access_token",
            6000,
            exchange::AttachAccessToken {
                services: services.clone(),
            },
        )
        .required(),
    );
    r.process_signin.register(
        HandlerDescriptor::singleton(
            "attach_refresh_token",
            7000,
            exchange::AttachRefreshToken {
                services: services.clone(),
            },
        )
        .required(),
    );
    r.process_signin.register(
        HandlerDescriptor::singleton(
            "attach_identity_token",
            8000,
            exchange::AttachIdentityToken {
                services: services.clone(),
            },
        )
        .required(),
    );
}
