//! Protocol string constants shared across endpoints.

/// RFC 6749 §5.2 error codes plus the OpenID Connect Core additions.
pub mod errors {
    pub const ACCESS_DENIED: &str = "access_denied";
    pub const CONSENT_REQUIRED: &str = "consent_required";
    pub const INTERACTION_REQUIRED: &str = "interaction_required";
    pub const INVALID_CLIENT: &str = "invalid_client";
    pub const INVALID_GRANT: &str = "invalid_grant";
    pub const INVALID_REQUEST: &str = "invalid_request";
    pub const INVALID_SCOPE: &str = "invalid_scope";
    pub const INVALID_TOKEN: &str = "invalid_token";
    pub const LOGIN_REQUIRED: &str = "login_required";
    pub const REGISTRATION_NOT_SUPPORTED: &str = "registration_not_supported";
    pub const REQUEST_NOT_SUPPORTED: &str = "request_not_supported";
    pub const REQUEST_URI_NOT_SUPPORTED: &str = "request_uri_not_supported";
    pub const SERVER_ERROR: &str = "server_error";
    pub const TEMPORARILY_UNAVAILABLE: &str = "temporarily_unavailable";
    pub const UNAUTHORIZED_CLIENT: &str = "unauthorized_client";
    pub const UNSUPPORTED_GRANT_TYPE: &str = "unsupported_grant_type";
    pub const UNSUPPORTED_RESPONSE_TYPE: &str = "unsupported_response_type";
}

pub mod grant_types {
    pub const AUTHORIZATION_CODE: &str = "authorization_code";
    pub const CLIENT_CREDENTIALS: &str = "client_credentials";
    pub const DEVICE_CODE: &str = "urn:ietf:params:oauth:grant-type:device_code";
    pub const IMPLICIT: &str = "implicit";
    pub const PASSWORD: &str = "password";
    pub const REFRESH_TOKEN: &str = "refresh_token";
}

pub mod response_types {
    pub const CODE: &str = "code";
    pub const ID_TOKEN: &str = "id_token";
    pub const NONE: &str = "none";
    pub const TOKEN: &str = "token";
}

pub mod response_modes {
    pub const FORM_POST: &str = "form_post";
    pub const FRAGMENT: &str = "fragment";
    pub const QUERY: &str = "query";
}

pub mod scopes {
    pub const ADDRESS: &str = "address";
    pub const EMAIL: &str = "email";
    pub const OFFLINE_ACCESS: &str = "offline_access";
    pub const OPENID: &str = "openid";
    pub const PHONE: &str = "phone";
    pub const PROFILE: &str = "profile";
    pub const ROLES: &str = "roles";
}

pub mod prompts {
    pub const CONSENT: &str = "consent";
    pub const LOGIN: &str = "login";
    pub const NONE: &str = "none";
    pub const SELECT_ACCOUNT: &str = "select_account";
}

pub mod code_challenge_methods {
    pub const PLAIN: &str = "plain";
    pub const S256: &str = "S256";
}

pub mod token_type_hints {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const AUTHORIZATION_CODE: &str = "authorization_code";
    pub const DEVICE_CODE: &str = "device_code";
    pub const ID_TOKEN: &str = "id_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const USER_CODE: &str = "user_code";
}

pub mod token_types {
    pub const BEARER: &str = "Bearer";
}

/// Standard and private claim names carried by issued tokens.
pub mod claims {
    pub const ADDRESS: &str = "address";
    pub const AUDIENCE: &str = "aud";
    pub const AUTHORIZATION_ID: &str = "authorization_id";
    pub const BIRTHDATE: &str = "birthdate";
    pub const CLIENT_ID: &str = "client_id";
    pub const CODE_CHALLENGE: &str = "code_challenge";
    pub const CODE_CHALLENGE_METHOD: &str = "code_challenge_method";
    pub const EMAIL: &str = "email";
    pub const EMAIL_VERIFIED: &str = "email_verified";
    pub const EXPIRES_AT: &str = "exp";
    pub const FAMILY_NAME: &str = "family_name";
    pub const GIVEN_NAME: &str = "given_name";
    pub const ISSUED_AT: &str = "iat";
    pub const ISSUER: &str = "iss";
    pub const JWT_ID: &str = "jti";
    pub const NAME: &str = "name";
    pub const NONCE: &str = "nonce";
    pub const PHONE_NUMBER: &str = "phone_number";
    pub const PHONE_NUMBER_VERIFIED: &str = "phone_number_verified";
    pub const PREFERRED_USERNAME: &str = "preferred_username";
    pub const PROFILE: &str = "profile";
    pub const REDIRECT_URI: &str = "redirect_uri";
    pub const SCOPE: &str = "scope";
    pub const SUBJECT: &str = "sub";
    pub const TOKEN_USAGE: &str = "token_usage";
    pub const WEBSITE: &str = "website";
}

/// Request/response parameter names.
pub mod params {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const ACTIVE: &str = "active";
    pub const ASSERTION: &str = "assertion";
    pub const AUDIENCE: &str = "audience";
    pub const CLIENT_ASSERTION: &str = "client_assertion";
    pub const CLIENT_ID: &str = "client_id";
    pub const CLIENT_SECRET: &str = "client_secret";
    pub const CODE: &str = "code";
    pub const CODE_CHALLENGE: &str = "code_challenge";
    pub const CODE_CHALLENGE_METHOD: &str = "code_challenge_method";
    pub const CODE_VERIFIER: &str = "code_verifier";
    pub const ERROR: &str = "error";
    pub const ERROR_DESCRIPTION: &str = "error_description";
    pub const ERROR_URI: &str = "error_uri";
    pub const EXPIRES_IN: &str = "expires_in";
    pub const GRANT_TYPE: &str = "grant_type";
    pub const ID_TOKEN: &str = "id_token";
    pub const ID_TOKEN_HINT: &str = "id_token_hint";
    pub const NONCE: &str = "nonce";
    pub const PASSWORD: &str = "password";
    pub const POST_LOGOUT_REDIRECT_URI: &str = "post_logout_redirect_uri";
    pub const PROMPT: &str = "prompt";
    pub const REDIRECT_URI: &str = "redirect_uri";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const REQUEST: &str = "request";
    pub const REQUEST_URI: &str = "request_uri";
    pub const RESOURCE: &str = "resource";
    pub const RESPONSE_MODE: &str = "response_mode";
    pub const RESPONSE_TYPE: &str = "response_type";
    pub const SCOPE: &str = "scope";
    pub const STATE: &str = "state";
    pub const TOKEN: &str = "token";
    pub const TOKEN_TYPE: &str = "token_type";
    pub const TOKEN_TYPE_HINT: &str = "token_type_hint";
    pub const USERNAME: &str = "username";
}

/// Permission strings attached to registered applications. Prefixed so a
/// single set column can hold endpoint, grant-type, response-type and scope
/// permissions side by side.
pub mod permissions {
    pub mod endpoints {
        pub const AUTHORIZATION: &str = "ept:authorization";
        pub const INTROSPECTION: &str = "ept:introspection";
        pub const LOGOUT: &str = "ept:logout";
        pub const REVOCATION: &str = "ept:revocation";
        pub const TOKEN: &str = "ept:token";
    }

    pub mod grant_types {
        pub const AUTHORIZATION_CODE: &str = "gt:authorization_code";
        pub const CLIENT_CREDENTIALS: &str = "gt:client_credentials";
        pub const IMPLICIT: &str = "gt:implicit";
        pub const PASSWORD: &str = "gt:password";
        pub const REFRESH_TOKEN: &str = "gt:refresh_token";
    }

    pub mod prefixes {
        pub const ENDPOINT: &str = "ept:";
        pub const GRANT_TYPE: &str = "gt:";
        pub const RESPONSE_TYPE: &str = "rst:";
        pub const SCOPE: &str = "scp:";
    }

    pub mod response_types {
        pub const CODE: &str = "rst:code";
        pub const ID_TOKEN: &str = "rst:id_token";
        pub const TOKEN: &str = "rst:token";
    }
}

/// Well-known application property keys.
pub mod properties {
    /// When set on an application, userinfo responses are returned as a JWT
    /// signed with the configured credentials instead of plain JSON.
    pub const USERINFO_SIGNED_RESPONSE_ALG: &str = "userinfo_signed_response_alg";
}
