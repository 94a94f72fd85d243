//! HTML views
//!
//! Templates are embedded into the binary at build time and compiled by Tera
//! once at startup. Every page extends `layout.html`, which shows the
//! navigation for the current user.

use rust_embed::RustEmbed;
use serde::Serialize;
use std::error::Error as StdError;
use tera::{Context as TeraContext, Tera};

use crate::models::User;

mod error;

pub use error::ViewError;

#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct Templates;

/// Page templates
pub mod pages {
    pub const INDEX: &str = "index.html";
    pub const BOOKED: &str = "booked.html";
    pub const LOGIN: &str = "login.html";
    pub const ADD_DATE: &str = "add_date.html";
    pub const ADD_USER: &str = "add_user.html";
    pub const ASSIGNED: &str = "assigned.html";
    pub const ERROR: &str = "error.html";
}

/// Navigation data every page gets
#[derive(Debug, Serialize)]
struct Viewer<'a> {
    name: &'a str,
    username: &'a str,
    is_admin: bool,
    is_employee: bool,
}

pub struct ViewEngine {
    tera: Tera,
}

impl ViewEngine {
    /// Compile the embedded templates.
    pub fn new() -> Result<Self, ViewError> {
        let mut sources = Vec::new();
        for name in Templates::iter() {
            let Some(file) = Templates::get(&name) else {
                continue;
            };
            let body = String::from_utf8(file.data.into_owned())
                .map_err(|_| ViewError::Encoding(name.to_string()))?;
            sources.push((name.to_string(), body));
        }

        let mut tera = Tera::default();
        tera.add_raw_templates(sources)
            .map_err(|e| ViewError::InvalidTemplate {
                name: "templates/".to_string(),
                reason: error_chain(&e),
            })?;

        tracing::debug!(templates = tera.get_template_names().count(), "Loaded views");
        Ok(Self { tera })
    }

    /// Start a context carrying the current user for the layout.
    pub fn context(&self, user: Option<&User>) -> TeraContext {
        let mut context = TeraContext::new();
        if let Some(user) = user {
            context.insert(
                "viewer",
                &Viewer {
                    name: &user.name,
                    username: &user.username,
                    is_admin: user.is_admin(),
                    is_employee: user.is_employee_or_above(),
                },
            );
        }
        context
    }

    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String, ViewError> {
        self.tera
            .render(template, context)
            .map_err(|e| ViewError::Render {
                name: template.to_string(),
                reason: error_chain(&e),
            })
    }

    /// Render the status page. Never fails; falls back to plain HTML.
    pub fn render_error(&self, code: u16, reason: &str, message: &str, user: Option<&User>) -> String {
        let mut context = self.context(user);
        context.insert("code", &code);
        context.insert("reason", reason);
        context.insert("message", message);

        match self.render(pages::ERROR, &context) {
            Ok(html) => html,
            Err(e) => {
                tracing::error!("Failed to render error page: {}", e);
                format!(
                    "<!DOCTYPE html><html><body><h1>{}: {}</h1></body></html>",
                    code, reason
                )
            }
        }
    }
}

/// Tera nests the useful message in the source chain
fn error_chain(e: &tera::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(&format!(": {}", cause));
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn user(role: Role) -> User {
        User {
            id: 7,
            name: "Andrzej".into(),
            username: "pracownik".into(),
            password_hash: String::new(),
            role,
        }
    }

    #[test]
    fn test_all_pages_compile() {
        let views = ViewEngine::new().unwrap();
        for page in [
            pages::INDEX,
            pages::BOOKED,
            pages::LOGIN,
            pages::ADD_DATE,
            pages::ADD_USER,
            pages::ASSIGNED,
            pages::ERROR,
        ] {
            assert!(
                views.tera.get_template_names().any(|n| n == page),
                "missing {}",
                page
            );
        }
    }

    #[test]
    fn test_index_for_anonymous_offers_sign_in() {
        let views = ViewEngine::new().unwrap();
        let mut context = views.context(None);
        context.insert("slots", &Vec::<crate::models::SlotListing>::new());

        let html = views.render(pages::INDEX, &context).unwrap();
        assert!(html.contains("Available dates:"));
        assert!(html.contains("Sign in"));
    }

    #[test]
    fn test_layout_shows_employee_links() {
        let views = ViewEngine::new().unwrap();
        let mut context = views.context(Some(&user(Role::Employee)));
        context.insert("slots", &Vec::<crate::models::SlotListing>::new());

        let html = views.render(pages::INDEX, &context).unwrap();
        assert!(html.contains("/add-date/"));
        assert!(html.contains("/assigned/"));
        assert!(!html.contains("/add-user/"));
        assert!(!html.contains("Sign in"));
    }

    #[test]
    fn test_error_page_shows_status() {
        let views = ViewEngine::new().unwrap();
        let html = views.render_error(403, "Forbidden", "your role does not allow this", None);

        assert!(html.contains("403: Forbidden"));
        assert!(html.contains("your role does not allow this"));
    }

    #[test]
    fn test_unknown_template_is_render_error() {
        let views = ViewEngine::new().unwrap();
        let result = views.render("missing.html", &TeraContext::new());
        assert!(matches!(result, Err(ViewError::Render { .. })));
    }
}
