//! OAuth token acquisition for Google APIs.
//!
//! Two flows are in play: vendor and warehouse calls authenticate with a
//! service account key pulled from Secret Manager, while the Secret
//! Manager call itself runs on application default credentials (the
//! runtime's own identity).

use hyper::client::HttpConnector;
use hyper_rustls::HttpsConnector;
use snafu::prelude::*;
use yup_oauth2::authenticator::{ApplicationDefaultCredentialsTypes, Authenticator};
use yup_oauth2::{
    ApplicationDefaultCredentialsAuthenticator, ApplicationDefaultCredentialsFlowOpts,
    ServiceAccountAuthenticator,
};

use crate::error::{
    AuthError, AuthenticatorBuildSnafu, EmptyTokenSnafu, InvalidKeySnafu, TokenRequestSnafu,
};

/// The authenticator type shared by both flows.
pub type GoogleAuthenticator = Authenticator<HttpsConnector<HttpConnector>>;

/// Build an authenticator from a service account key JSON string.
pub async fn service_account_authenticator(
    key_json: &str,
) -> Result<GoogleAuthenticator, AuthError> {
    let key = yup_oauth2::parse_service_account_key(key_json).context(InvalidKeySnafu)?;
    ServiceAccountAuthenticator::builder(key)
        .build()
        .await
        .context(AuthenticatorBuildSnafu)
}

/// Build an authenticator from application default credentials.
pub async fn adc_authenticator() -> Result<GoogleAuthenticator, AuthError> {
    let opts = ApplicationDefaultCredentialsFlowOpts::default();
    match ApplicationDefaultCredentialsAuthenticator::builder(opts).await {
        ApplicationDefaultCredentialsTypes::ServiceAccount(builder) => {
            builder.build().await.context(AuthenticatorBuildSnafu)
        }
        ApplicationDefaultCredentialsTypes::InstanceMetadata(builder) => {
            builder.build().await.context(AuthenticatorBuildSnafu)
        }
    }
}

/// Fetch a bearer token for the given scopes.
pub async fn access_token(
    auth: &GoogleAuthenticator,
    scopes: &[&str],
) -> Result<String, AuthError> {
    let token = auth.token(scopes).await.context(TokenRequestSnafu)?;
    token
        .token()
        .map(String::from)
        .context(EmptyTokenSnafu)
}
