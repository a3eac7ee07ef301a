// AI Provider Service
// OpenAI-compatible chat completion client (Groq) and the answer generator

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::AnswerRequest;
use crate::services::config_store::{ConfigStore, GeneratorConfig};

const GROQ_DEFAULT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const ANSWER_ERROR_PREFIX: &str = "Error generando respuesta con IA";

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Missing content in response")]
    MissingContent,
    #[error("JSON parse error: {0}")]
    JsonError(String),
    #[error("API key not configured")]
    MissingApiKey,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: i32,
    temperature: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageResponse>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResult {
    pub content: String,
    pub latency_ms: i64,
}

pub struct ProviderClient {
    client: Client,
    groq_url: String,
}

impl Default for ProviderClient {
    fn default() -> Self {
        Self::new()
    }
}

fn groq_url(base_url: Option<&str>) -> String {
    base_url
        .map(str::to_string)
        .or_else(|| env::var("GROQ_API_URL").ok())
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| GROQ_DEFAULT_URL.to_string())
}

impl ProviderClient {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();

        Self {
            client,
            groq_url: groq_url(None),
        }
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            groq_url: groq_url(Some(base_url)),
            ..Self::new()
        }
    }

    pub fn with_proxy(proxy_url: &str, base_url: Option<&str>) -> Result<Self, ProviderError> {
        let proxy = reqwest::Proxy::all(proxy_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .proxy(proxy)
            .build()?;

        Ok(Self {
            client,
            groq_url: groq_url(base_url),
        })
    }

    pub fn url(&self) -> &str {
        &self.groq_url
    }

    pub async fn call_groq(
        &self,
        model: &str,
        api_key: &str,
        user: &str,
        max_tokens: i32,
        temperature: f64,
    ) -> Result<ChatResult, ProviderError> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: user.to_string(),
            }],
            max_tokens,
            temperature,
        };

        let start = Instant::now();

        let response = self
            .client
            .post(&self.groq_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let latency_ms = start.elapsed().as_millis() as i64;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::JsonError(e.to_string()))?;

        let content = data
            .choices
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.as_ref())
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(ProviderError::MissingContent)?;

        Ok(ChatResult { content, latency_ms })
    }
}

/// Get API key from environment or config file
pub fn get_api_key(provider: &str) -> Option<String> {
    // Try environment variables first
    let env_keys = match provider {
        "groq" => vec!["GROQ_API_KEY", "DENTALBOT_GROQ_API_KEY"],
        _ => vec![],
    };

    for key in env_keys {
        if let Ok(val) = env::var(key) {
            let v = val.trim();
            if !v.is_empty() {
                return Some(v.to_string());
            }
        }
    }

    // Try config file
    if let Some(config_dir) = ConfigStore::default_config_dir() {
        let store = ConfigStore::new(config_dir);
        if let Ok(Some(key)) = store.get_api_key(provider) {
            return Some(key);
        }
    }

    None
}

// ============ Answer Generation ============

/// Turns a verdict hand-off into user-facing text. Implementations never
/// fail; problems are reported inside the returned text.
pub trait AnswerGenerator: Send + Sync {
    fn generate(&self, request: &AnswerRequest) -> impl Future<Output = String> + Send;
}

pub fn domain_prompt(question: &str) -> String {
    format!(
        "Eres un experto en anatomía dental. Responde de forma clara y concisa la siguiente pregunta sobre anatomía dental.\n\
Si la pregunta es sobre procedimientos clínicos o tratamientos, menciona que solo respondes sobre anatomía.\n\n\
Pregunta: {}\n\n\
Responde en máximo 150 palabras, enfocándote solo en aspectos anatómicos.",
        question
    )
}

pub fn decline_prompt(question: &str) -> String {
    format!(
        "La siguiente pregunta NO es sobre anatomía dental: \"{}\"\n\n\
Responde amablemente indicando que eres un asistente especializado en anatomía dental y no puedes responder preguntas sobre otros temas.\n\
Sugiere reformular la pregunta si tiene relación con anatomía dental.\n\n\
Responde en máximo 50 palabras.",
        question
    )
}

pub fn failure_answer(reason: impl std::fmt::Display) -> String {
    format!("{}: {}", ANSWER_ERROR_PREFIX, reason)
}

pub struct GroqAnswerGenerator {
    client: ProviderClient,
    api_key: Option<String>,
    model: String,
    temperature: f64,
    max_tokens: i32,
}

impl GroqAnswerGenerator {
    pub fn new(client: ProviderClient, api_key: Option<String>, config: &GeneratorConfig) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Client and key resolved from config, environment and proxy settings.
    pub fn from_config(config: &crate::services::config_store::AppConfig) -> Self {
        let base_url = config.generator.base_url.as_deref();
        let client = match config.proxy.as_ref().filter(|p| p.enabled) {
            Some(proxy) => {
                let url = proxy.https.as_deref().or(proxy.http.as_deref());
                match url.map(|u| ProviderClient::with_proxy(u, base_url)) {
                    Some(Ok(client)) => client,
                    Some(Err(e)) => {
                        warn!("[providers] Invalid proxy configuration: {}", e);
                        base_url.map(ProviderClient::with_base_url).unwrap_or_default()
                    }
                    None => base_url.map(ProviderClient::with_base_url).unwrap_or_default(),
                }
            }
            None => base_url.map(ProviderClient::with_base_url).unwrap_or_default(),
        };
        let api_key = get_api_key(&config.generator.provider)
            .or_else(|| config.api_keys.get(&config.generator.provider).cloned());
        if api_key.is_none() {
            warn!("[providers] No API key for {}; answers will report the missing key", config.generator.provider);
        }
        Self::new(client, api_key, &config.generator)
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

impl AnswerGenerator for GroqAnswerGenerator {
    async fn generate(&self, request: &AnswerRequest) -> String {
        let Some(api_key) = self.api_key.as_deref() else {
            return failure_answer(ProviderError::MissingApiKey);
        };

        let prompt = if request.is_domain {
            domain_prompt(&request.original_question)
        } else {
            decline_prompt(&request.original_question)
        };

        match self
            .client
            .call_groq(&self.model, api_key, &prompt, self.max_tokens, self.temperature)
            .await
        {
            Ok(result) => {
                info!("[providers] Groq answer in {} ms", result.latency_ms);
                result.content
            }
            Err(e) => {
                warn!("[providers] Groq call failed: {}", e);
                failure_answer(e)
            }
        }
    }
}
