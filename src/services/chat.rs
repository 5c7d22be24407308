//! Website chatbot.
//!
//! Answers come from, in order: the emergency short-circuit, an OpenAI
//! compatible chat completions API, a keyword FAQ built from [`ClinicInfo`],
//! and finally a pointer to the clinic phone number.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ChatbotConfig, ClinicInfo};
use crate::constants::limits;

const EMERGENCY_KEYWORDS: &[&str] = &[
    "uncontrolled bleeding",
    "bleeding won't stop",
    "can't stop bleeding",
    "can't breathe",
    "difficulty breathing",
    "trouble breathing",
    "trouble swallowing",
    "difficulty swallowing",
    "choking",
    "severe pain",
    "fever",
    "severe swelling",
    "facial swelling",
];

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Chat API error: {0}")]
    Api(String),
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        Self::Api(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    Prompt,
    Emergency,
    Model,
    Faq,
    Fallback,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub source: ReplySource,
}

impl ChatReply {
    fn new(reply: impl Into<String>, source: ReplySource) -> Self {
        Self {
            reply: reply.into(),
            source,
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Clone)]
pub struct ChatService {
    client: Client,
    config: ChatbotConfig,
    clinic: ClinicInfo,
}

impl ChatService {
    pub fn new(config: ChatbotConfig, clinic: ClinicInfo) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            config,
            clinic,
        })
    }

    pub async fn reply(&self, message: &str) -> Result<ChatReply, ChatError> {
        let message = message.trim();

        if message.is_empty() {
            return Ok(ChatReply::new(
                "Please type a question and I'll help you!",
                ReplySource::Prompt,
            ));
        }
        if message.chars().count() > limits::MAX_CHAT_MESSAGE_CHARS {
            return Err(ChatError::Validation(format!(
                "Message is too long (max {} characters)",
                limits::MAX_CHAT_MESSAGE_CHARS
            )));
        }

        if is_emergency(message) {
            return Ok(ChatReply::new(
                format!(
                    "If this is urgent, please call us immediately at {}. \
                     If you have uncontrolled bleeding, trouble breathing or swallowing, \
                     or severe pain or swelling, please go to urgent care or the ER right away!",
                    self.clinic.phone
                ),
                ReplySource::Emergency,
            ));
        }

        match self.ask_model(message).await {
            Ok(reply) => return Ok(ChatReply::new(reply, ReplySource::Model)),
            Err(e) => tracing::warn!(error = %e, "Chat model unavailable, using FAQ"),
        }

        if let Some(answer) = self.faq_reply(message) {
            return Ok(ChatReply::new(answer, ReplySource::Faq));
        }

        Ok(ChatReply::new(
            format!(
                "I'm having trouble right now. Please call us at {} for assistance!",
                self.clinic.phone
            ),
            ReplySource::Fallback,
        ))
    }

    async fn ask_model(&self, message: &str) -> Result<String, ChatError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            return Err(ChatError::Api("API key not configured".to_string()));
        };

        let system = self.system_prompt();
        let body = CompletionRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: message,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            top_p: 0.9,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ChatError::Api(format!("{status} - {text}")));
        }

        let parsed: CompletionResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ChatError::Api("Empty completion".to_string()))
    }

    fn system_prompt(&self) -> String {
        let clinic = &self.clinic;
        let hours = clinic
            .hours
            .iter()
            .map(|(day, hrs)| format!("{day}: {hrs}"))
            .collect::<Vec<_>>()
            .join("\n");
        let services = clinic
            .services
            .iter()
            .map(|s| format!("- {s}"))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "You are a helpful assistant for {name}.\n\n\
             Name: {name}\nAddress: {address}\nPhone: {phone}\nEmail: {email}\n\n\
             Office hours:\n{hours}\n\nServices:\n{services}\n\nInsurance:\n{insurance}\n\n\
             Keep responses friendly, concise (2-3 sentences), and professional. \
             Never provide medical diagnoses. For health concerns, recommend calling {phone} \
             or requesting an appointment through the contact page. \
             For emergencies, tell the patient to call {phone} immediately.",
            name = clinic.office_name,
            address = clinic.address,
            phone = clinic.phone,
            email = clinic.email,
            insurance = clinic.insurance,
        )
    }

    /// Keyword answers built from clinic info. First matching topic wins.
    #[must_use]
    pub fn faq_reply(&self, message: &str) -> Option<String> {
        let m = message.to_lowercase();
        let clinic = &self.clinic;
        let matches = |patterns: &[&str]| patterns.iter().any(|p| m.contains(p));

        if matches(&["hour", "open"]) && !clinic.hours.is_empty() {
            let hours = clinic
                .hours
                .iter()
                .map(|(day, hrs)| format!("{day}: {hrs}"))
                .collect::<Vec<_>>()
                .join(", ");
            return Some(format!("Our hours are: {hours}"));
        }
        if matches(&["email"]) && !clinic.email.is_empty() {
            return Some(format!("Our email address is: {}", clinic.email));
        }
        if matches(&["address", "location", "where is", "where's"]) && !clinic.address.is_empty() {
            return Some(format!("Our address is {}.", clinic.address));
        }
        if matches(&["phone", "call", "number"]) && !clinic.phone.is_empty() {
            return Some(format!("You can call us at {}.", clinic.phone));
        }
        if matches(&["insurance", "coverage"]) && !clinic.insurance.is_empty() {
            return Some(clinic.insurance.clone());
        }
        if matches(&["appointment", "book", "schedule"]) {
            return Some(format!(
                "To request an appointment, please use our contact form or call us at {}.",
                clinic.phone
            ));
        }
        None
    }
}

fn is_emergency(message: &str) -> bool {
    let m = message.to_lowercase();
    EMERGENCY_KEYWORDS.iter().any(|k| m.contains(k))
}
