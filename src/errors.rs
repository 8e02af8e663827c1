use colored::*;
use std::fmt;

#[derive(Debug)]
pub enum CommsError {
    // Configuration errors
    ConfigInvalid(String),

    // Jira errors
    Transport { status: Option<u16>, message: String },
    MalformedResponse(String),
    FieldExtraction { field: String, message: String },
    ProjectMismatch { reference: String, expected: String, found: String },

    // Email errors
    Template(String),
    Compose(String),

    // Generic error
    Other(String),
}

impl CommsError {
    pub fn transport(message: impl Into<String>) -> Self {
        CommsError::Transport {
            status: None,
            message: message.into(),
        }
    }

    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        CommsError::FieldExtraction {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for CommsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommsError::ConfigInvalid(msg) => {
                write!(f, "{}\n", "Invalid configuration".red().bold())?;
                write!(f, "   {}\n\n", msg.dimmed())?;
                write!(f, "   To fix:\n")?;
                write!(f, "   1. Check your config file: ~/.commstool/config.toml\n")?;
                write!(f, "   2. Or reinitialize: {}", "commstool init".green())
            }

            CommsError::Transport { status: Some(status), message } => {
                write!(f, "{}\n", format!("Jira API error ({})", status).red().bold())?;
                write!(f, "   {}\n\n", message.dimmed())?;
                write!(f, "   Check the ticket reference and that your certificate has access")
            }
            CommsError::Transport { status: None, message } => {
                write!(f, "{}\n", "Could not reach Jira".red().bold())?;
                write!(f, "   {}\n\n", message.dimmed())?;
                write!(f, "   To fix:\n")?;
                write!(f, "   1. Check your network connection\n")?;
                write!(f, "   2. Verify the client certificate path and that it has not expired")
            }
            CommsError::MalformedResponse(msg) => {
                write!(f, "{}\n", "Unexpected response from Jira".red().bold())?;
                write!(f, "   {}", msg.dimmed())
            }
            CommsError::FieldExtraction { field, message } => {
                write!(f, "{}\n", format!("Could not read ticket field '{}'", field).red().bold())?;
                write!(f, "   {}\n\n", message.dimmed())?;
                write!(f, "   Check the custom field mapping in your configuration")
            }
            CommsError::ProjectMismatch { reference, expected, found } => {
                write!(f, "{}\n", format!("Ticket {} changed project", reference).red().bold())?;
                write!(f, "   {}\n\n", format!("expected {}, Jira now reports {}", expected, found).dimmed())?;
                write!(f, "   Has the ticket moved? Look it up again by its new reference")
            }

            CommsError::Template(msg) => {
                write!(f, "{}\n", "Failed to render email template".red().bold())?;
                write!(f, "   {}", msg.dimmed())
            }
            CommsError::Compose(msg) => {
                write!(f, "{}\n", "Failed to build email".red().bold())?;
                write!(f, "   {}", msg.dimmed())
            }

            CommsError::Other(msg) => {
                write!(f, "{}\n", "Error".red().bold())?;
                write!(f, "   {}", msg.dimmed())
            }
        }
    }
}

impl std::error::Error for CommsError {}

impl From<std::io::Error> for CommsError {
    fn from(err: std::io::Error) -> Self {
        CommsError::Other(err.to_string())
    }
}

impl From<reqwest::Error> for CommsError {
    fn from(err: reqwest::Error) -> Self {
        CommsError::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CommsError>;
