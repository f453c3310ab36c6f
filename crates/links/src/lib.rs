//! Outbound messaging deep links.
//!
//! Converts a conversion context (audience, page, product, campaign) into
//! channel-specific links:
//! - WhatsApp `wa.me` click-to-chat
//!
//! Campaign tags are only appended when the caller passes campaign
//! parameters, which the session only hands out with marketing consent.

use m5max_model::{Audience, UtmParams};
use thiserror::Error;

pub const WHATSAPP_BASE_URL: &str = "https://wa.me";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LinkError {
    #[error("Empty phone number")]
    EmptyPhone,
    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),
}

/// What the visitor was doing when they clicked the contact button.
#[derive(Debug, Clone, Default)]
pub struct MessageContext {
    pub audience: Audience,
    pub page: Option<String>,
    pub product: Option<String>,
    /// Campaign parameters allowed to leave the site
    pub utm: Option<UtmParams>,
}

impl MessageContext {
    pub fn new(audience: Audience) -> Self {
        Self {
            audience,
            ..Default::default()
        }
    }

    pub fn with_page(mut self, page: impl Into<String>) -> Self {
        self.page = Some(page.into());
        self
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }

    pub fn with_utm(mut self, utm: Option<&UtmParams>) -> Self {
        self.utm = utm.cloned();
        self
    }
}

/// Trait for translating a message context into a channel link.
pub trait LinkDialect {
    /// The output type (usually a URL string)
    type Output;

    /// Translate a MessageContext to this dialect
    fn translate(&self, context: &MessageContext) -> Result<Self::Output, LinkError>;
}

/// WhatsApp click-to-chat link generator.
#[derive(Debug, Clone)]
pub struct WhatsAppDialect {
    phone: String,
}

impl WhatsAppDialect {
    pub fn new(phone: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
        }
    }
}

impl LinkDialect for WhatsAppDialect {
    type Output = String;

    fn translate(&self, context: &MessageContext) -> Result<String, LinkError> {
        let digits = phone_digits(&self.phone)?;
        let message = compose_message(context);
        Ok(format!(
            "{}/{}?text={}",
            WHATSAPP_BASE_URL,
            digits,
            urlencoding::encode(&message)
        ))
    }
}

/// Keep the digits of an international phone number (E.164 length).
pub fn phone_digits(phone: &str) -> Result<String, LinkError> {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(LinkError::EmptyPhone);
    }
    if !(10..=15).contains(&digits.len()) {
        return Err(LinkError::InvalidPhone(phone.to_string()));
    }
    Ok(digits)
}

/// Opening line of the pre-filled message.
pub fn greeting(audience: Audience) -> &'static str {
    match audience {
        Audience::B2b => "Olá! Gostaria de um orçamento de show pirotécnico para um evento corporativo.",
        Audience::Cha => "Olá! Quero fazer um chá revelação inesquecível.",
        Audience::Kits => "Olá! Tenho interesse nos kits para montar o meu próprio show.",
        Audience::General => "Olá! Gostaria de saber mais sobre os shows pirotécnicos.",
    }
}

/// Build the pre-filled message text.
pub fn compose_message(context: &MessageContext) -> String {
    let mut parts = vec![greeting(context.audience).to_string()];

    if let Some(product) = context.product.as_deref().filter(|p| !p.trim().is_empty()) {
        parts.push(format!("Produto: {}.", product.trim()));
    }
    if let Some(page) = context.page.as_deref().filter(|p| !p.trim().is_empty()) {
        parts.push(format!("Página: {}", page.trim()));
    }
    if let Some(utm) = &context.utm {
        parts.push(format!("[ref: {}/{}]", utm.source, utm.campaign));
    }

    parts.join(" ")
}
