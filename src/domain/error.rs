use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid cache identifier: {message}")]
    Identifier { message: String },
    #[error("invalid cache tag `{tag}`: {message}")]
    Tag { tag: String, message: String },
    #[error("invalid remote locator `{url}`: {message}")]
    Locator { url: String, message: String },
}

impl DomainError {
    pub fn identifier(message: impl Into<String>) -> Self {
        Self::Identifier {
            message: message.into(),
        }
    }

    pub fn tag(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Tag {
            tag: tag.into(),
            message: message.into(),
        }
    }

    pub fn locator(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Locator {
            url: url.into(),
            message: message.into(),
        }
    }
}
