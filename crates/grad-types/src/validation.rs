use serde::{Deserialize, Serialize};

use crate::api::{
    CreateCommentRequest, CreateMemoryRequest, RegisterRequest, SendChatMessageRequest,
    UpdateProfileRequest,
};

/// One rejected input field, returned in the `errors` array of a 400 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub type Validation = Result<(), Vec<FieldError>>;

/// Collects field errors while checking a request.
#[derive(Default)]
struct Checker {
    errors: Vec<FieldError>,
}

impl Checker {
    fn length(&mut self, field: &str, value: &str, min: usize, max: Option<usize>) {
        let len = value.trim().chars().count();
        if len < min {
            self.errors.push(FieldError::new(
                field,
                format!("{} must be at least {} characters", label(field), min),
            ));
        } else if let Some(max) = max {
            if len > max {
                self.errors.push(FieldError::new(
                    field,
                    format!("{} must be at most {} characters", label(field), max),
                ));
            }
        }
    }

    fn check(&mut self, field: &str, ok: bool, message: &str) {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
    }

    fn finish(self) -> Validation {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

fn label(field: &str) -> String {
    let mut chars = field.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Loose address check: one `@`, a non-empty local part and a dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// Absolute http(s) URLs, or root-relative paths such as `/uploads/x.png`
/// returned by the upload endpoint.
pub fn is_valid_image_url(url: &str) -> bool {
    if url.chars().any(char::is_whitespace) {
        return false;
    }
    if let Some(rest) = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
    {
        let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
        return !host.is_empty();
    }
    url.starts_with('/') && !url.starts_with("//") && url.len() > 1
}

impl RegisterRequest {
    pub fn validate(&self) -> Validation {
        let mut c = Checker::default();
        c.length("name", &self.name, 2, None);
        c.check("email", is_valid_email(&self.email), "Please enter a valid email address");
        c.check(
            "password",
            self.password.chars().count() >= 6,
            "Password must be at least 6 characters",
        );
        c.finish()
    }
}

impl CreateMemoryRequest {
    pub fn validate(&self) -> Validation {
        let mut c = Checker::default();
        c.length("title", &self.title, 3, Some(100));
        c.length("description", &self.description, 10, Some(1000));
        c.check("imageUrl", is_valid_image_url(&self.image_url), "Image URL is invalid");
        c.finish()
    }
}

impl CreateCommentRequest {
    pub fn validate(&self) -> Validation {
        let mut c = Checker::default();
        c.length("content", &self.content, 1, Some(500));
        c.finish()
    }
}

impl SendChatMessageRequest {
    pub fn validate(&self) -> Validation {
        let mut c = Checker::default();
        c.length("content", &self.content, 1, Some(2000));
        c.length("sender.name", &self.sender.name, 1, None);
        if let Some(id) = &self.id {
            c.length("id", id, 1, Some(128));
        }
        c.finish()
    }
}

impl UpdateProfileRequest {
    pub fn validate(&self) -> Validation {
        let mut c = Checker::default();
        if let Some(name) = &self.name {
            c.length("name", name, 2, None);
        }
        if let Some(image) = &self.image {
            c.check(
                "image",
                image.is_empty() || is_valid_image_url(image),
                "Image URL is invalid",
            );
        }
        if let Some(bio) = &self.bio {
            c.length("bio", bio, 0, Some(500));
        }
        c.finish()
    }
}
