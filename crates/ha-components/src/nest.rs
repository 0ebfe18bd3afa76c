//! Nest integration
//!
//! Provides the config flow that links a Nest account. The flow asks for
//! the OAuth client credentials, then for the authorization code the user
//! gets from Nest, and exchanges that code for an access token.

use std::sync::Arc;

use async_trait::async_trait;
use ha_config::NestConfig;
use ha_config_flow::{
    ConfigFlowHandler, DataSchema, FieldType, FlowError, FlowResult, HandlerRegistry, StepResult,
    UserInput,
};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Domain name for the nest component
pub const DOMAIN: &str = "nest";

/// Nest OAuth token endpoint
pub const TOKEN_URL: &str = "https://api.home.nest.com/oauth2/access_token";

/// Page where the user authorizes the client
pub const AUTHORIZE_URL: &str = "https://home.nest.com/login/oauth2";

const STEP_INIT: &str = "init";
const STEP_AUTHORIZE: &str = "authorize";

const CONF_CLIENT_ID: &str = "client_id";
const CONF_CLIENT_SECRET: &str = "client_secret";
const CONF_AUTH_CODE: &str = "auth_code";

/// Errors talking to the Nest token endpoint
#[derive(Debug, Error)]
pub enum NestError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Tokens returned for an authorization code
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NestTokens {
    pub access_token: String,
    /// Seconds until the token expires
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Exchanges authorization codes for tokens
#[async_trait]
pub trait NestAuth: Send + Sync {
    async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
    ) -> Result<NestTokens, NestError>;
}

/// [`NestAuth`] against the Nest OAuth endpoint
pub struct NestOAuthClient {
    http: reqwest::Client,
    token_url: String,
}

impl NestOAuthClient {
    pub fn new() -> Result<Self, NestError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            token_url: TOKEN_URL.to_string(),
        })
    }

    /// Use a different token endpoint
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }
}

#[async_trait]
impl NestAuth for NestOAuthClient {
    async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
    ) -> Result<NestTokens, NestError> {
        debug!("Requesting Nest access token");
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NestError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<NestTokens>().await?)
    }
}

/// Link to the page where the user authorizes `client_id`
pub fn authorize_url(client_id: &str) -> FlowResult<reqwest::Url> {
    reqwest::Url::parse_with_params(
        AUTHORIZE_URL,
        &[(CONF_CLIENT_ID, client_id), ("state", "STATE")],
    )
    .map_err(|e| FlowError::StepFailed(format!("invalid authorize URL: {}", e)))
}

/// Config flow linking a Nest account
///
/// With client credentials from `configuration.yaml` the first form is
/// skipped.
pub struct NestConfigFlow {
    auth: Arc<dyn NestAuth>,
    configured: Option<NestConfig>,
    /// Credentials collected in `init`
    client: Option<NestConfig>,
}

impl NestConfigFlow {
    pub fn new(auth: Arc<dyn NestAuth>, configured: Option<NestConfig>) -> Self {
        Self {
            auth,
            configured,
            client: None,
        }
    }

    async fn step_init(&mut self, user_input: Option<UserInput>) -> FlowResult<StepResult> {
        let client = match user_input {
            Some(input) => {
                let input = client_schema().validate(&input)?;
                Some(NestConfig {
                    client_id: string_field(&input, CONF_CLIENT_ID)?,
                    client_secret: string_field(&input, CONF_CLIENT_SECRET)?,
                })
            }
            None => self.configured.clone(),
        };

        match client {
            Some(client) => {
                self.client = Some(client);
                self.step_authorize(None).await
            }
            None => Ok(StepResult::form(STEP_INIT)
                .with_title("Client information")
                .with_description("Enter the client ID and secret of your Nest developer product.")
                .with_schema(client_schema())),
        }
    }

    async fn step_authorize(&mut self, user_input: Option<UserInput>) -> FlowResult<StepResult> {
        let client = self
            .client
            .clone()
            .ok_or_else(|| FlowError::StepFailed("no client credentials".to_string()))?;

        let Some(input) = user_input else {
            return authorize_form(&client.client_id);
        };

        let input = code_schema().validate(&input)?;
        let code = string_field(&input, CONF_AUTH_CODE)?;

        match self
            .auth
            .exchange_code(&client.client_id, &client.client_secret, &code)
            .await
        {
            Ok(tokens) => {
                info!("Linked Nest account");
                let mut data = UserInput::new();
                data.insert(CONF_CLIENT_ID.to_string(), json!(client.client_id));
                data.insert(CONF_CLIENT_SECRET.to_string(), json!(client.client_secret));
                data.insert("access_token".to_string(), json!(tokens.access_token));
                data.insert("expires_in".to_string(), json!(tokens.expires_in));
                Ok(StepResult::create_entry("Nest", data))
            }
            Err(e) => {
                warn!("Nest authorization failed: {}", e);
                Ok(authorize_form(&client.client_id)?.with_errors([("base", "invalid_code")]))
            }
        }
    }
}

#[async_trait]
impl ConfigFlowHandler for NestConfigFlow {
    fn step_ids(&self) -> &[&'static str] {
        &[STEP_INIT, STEP_AUTHORIZE]
    }

    async fn async_step(
        &mut self,
        step_id: &str,
        user_input: Option<UserInput>,
    ) -> FlowResult<StepResult> {
        match step_id {
            STEP_INIT => self.step_init(user_input).await,
            STEP_AUTHORIZE => self.step_authorize(user_input).await,
            other => Err(FlowError::UnknownStep {
                handler: DOMAIN.to_string(),
                step_id: other.to_string(),
            }),
        }
    }
}

fn client_schema() -> DataSchema {
    DataSchema::new()
        .required(CONF_CLIENT_ID, FieldType::String)
        .required(CONF_CLIENT_SECRET, FieldType::String)
}

fn code_schema() -> DataSchema {
    DataSchema::new().required(CONF_AUTH_CODE, FieldType::String)
}

fn authorize_form(client_id: &str) -> FlowResult<StepResult> {
    Ok(StepResult::form(STEP_AUTHORIZE)
        .with_title("Authorize account")
        .with_description(format!(
            "Next step is to authorize your account. Click the following link and put the auth code below.\n\n[Authorize account]({})",
            authorize_url(client_id)?
        ))
        .with_schema(code_schema()))
}

fn string_field(input: &UserInput, key: &str) -> FlowResult<String> {
    input
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| FlowError::InvalidInput(format!("missing {}", key)))
}

/// Register the Nest config flow
pub fn register_flows(
    registry: &HandlerRegistry,
    auth: Arc<dyn NestAuth>,
    conf: Option<NestConfig>,
) -> FlowResult<()> {
    registry.register(DOMAIN, move || {
        Box::new(NestConfigFlow::new(auth.clone(), conf.clone())) as Box<dyn ConfigFlowHandler>
    })
}
