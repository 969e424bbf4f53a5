//! Theme engine
//!
//! HTML pages are rendered with Tera. The built-in templates are embedded in
//! the binary from `templates/`; a directory can be layered on top to replace
//! individual templates by name.

use anyhow::{Context, Result};
use chrono::Datelike;
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fs;
use std::path::Path;
use tera::{Context as TeraContext, Tera};

use crate::models::User;

mod error;

pub use error::ThemeError;

/// Built-in page templates
#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct EmbeddedTemplates;

/// Theme engine for rendering templates
pub struct ThemeEngine {
    tera: Tera,
}

impl ThemeEngine {
    /// Engine with the built-in templates only
    pub fn new() -> Result<Self> {
        Self::from_templates(embedded_templates())
    }

    /// Built-in templates, with any `.html` file under `dir` replacing the
    /// template of the same relative name.
    pub fn with_overrides(dir: &Path) -> Result<Self> {
        let mut templates = embedded_templates();
        let mut overrides = Vec::new();
        collect_templates_from_dir(dir, dir, &mut overrides)?;

        for (name, content) in overrides {
            tracing::debug!("Template override: {}", name);
            match templates.iter_mut().find(|(n, _)| *n == name) {
                Some(existing) => existing.1 = content,
                None => templates.push((name, content)),
            }
        }
        Self::from_templates(templates)
    }

    /// Engine from explicit `(name, source)` pairs
    pub fn from_templates(mut templates: Vec<(String, String)>) -> Result<Self> {
        // Base templates first so `extends` resolves while adding
        templates.sort_by(|a, b| {
            let a_is_base = a.0 == "base.html" || a.0.ends_with("/base.html");
            let b_is_base = b.0 == "base.html" || b.0.ends_with("/base.html");
            b_is_base.cmp(&a_is_base)
        });

        let mut tera = Tera::default();
        for (name, content) in &templates {
            tera.add_raw_template(name, content).map_err(|e| {
                ThemeError::TemplateError(format!("Failed to add template {}: {}", name, e))
            })?;
        }
        tera.build_inheritance_chains().map_err(|e| {
            ThemeError::TemplateError(format!("Failed to build template inheritance: {}", e))
        })?;

        tracing::debug!("Loaded {} templates", templates.len());
        Ok(Self { tera })
    }

    /// Whether a template with this name is loaded
    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }

    /// Render a template. Errors carry Tera's full cause chain.
    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String> {
        if !self.has_template(template) {
            return Err(ThemeError::NotFound(template.to_string()).into());
        }

        self.tera.render(template, context).map_err(|e| {
            let mut error_msg = format!("Failed to render '{}': {}", template, e);
            let mut source = e.source();
            while let Some(s) = source {
                error_msg.push_str(&format!("\n  Caused by: {}", s));
                source = s.source();
            }
            ThemeError::TemplateError(error_msg).into()
        })
    }

    /// Render with the per-page standard variables added to `context`
    pub fn render_with_standard_vars(
        &self,
        template: &str,
        context: &TeraContext,
        standard_vars: &StandardTemplateVars,
    ) -> Result<String> {
        let mut full_context = context.clone();
        standard_vars.apply(&mut full_context);
        self.render(template, &full_context)
    }

    /// Render a full page: standard variables added, errors rendered as the
    /// error page.
    pub fn render_page(
        &self,
        template: &str,
        context: &TeraContext,
        standard_vars: &StandardTemplateVars,
    ) -> String {
        let mut full_context = context.clone();
        standard_vars.apply(&mut full_context);
        self.render_with_fallback(template, &full_context)
    }

    /// Render a template, never failing.
    ///
    /// On error this tries `error.html` with `error_message` set, and if that
    /// fails too, a plain built-in page.
    pub fn render_with_fallback(&self, template: &str, context: &TeraContext) -> String {
        match self.render(template, context) {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!(
                    "Failed to render template '{}': {:#}, trying error template",
                    template,
                    e
                );

                let mut error_context = context.clone();
                error_context.insert("error_title", "Something went wrong");
                error_context.insert("error_message", &e.to_string());
                error_context.insert("requested_template", template);

                match self.render("error.html", &error_context) {
                    Ok(html) => html,
                    Err(error_template_err) => {
                        tracing::warn!(
                            "Failed to render error template: {:#}, returning plain error page",
                            error_template_err
                        );
                        simple_error_page(template, &e.to_string())
                    }
                }
            }
        }
    }
}

fn embedded_templates() -> Vec<(String, String)> {
    EmbeddedTemplates::iter()
        .filter_map(|name| {
            let file = EmbeddedTemplates::get(&name)?;
            let content = String::from_utf8_lossy(&file.data).into_owned();
            Some((name.into_owned(), content))
        })
        .collect()
}

fn collect_templates_from_dir(
    base_path: &Path,
    current_path: &Path,
    templates: &mut Vec<(String, String)>,
) -> Result<()> {
    if !current_path.exists() {
        return Ok(());
    }

    for entry in fs::read_dir(current_path).map_err(ThemeError::from)? {
        let path = entry.map_err(ThemeError::from)?.path();

        if path.is_dir() {
            collect_templates_from_dir(base_path, &path, templates)?;
        } else if path.extension().is_some_and(|ext| ext == "html") {
            let relative_path = path.strip_prefix(base_path).map_err(|_| {
                ThemeError::TemplateError("Failed to get relative path".to_string())
            })?;
            let template_name = relative_path.to_string_lossy().replace('\\', "/");
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read template: {:?}", path))?;

            templates.push((template_name, content));
        }
    }

    Ok(())
}

/// Last-resort page when neither the template nor `error.html` renders
fn simple_error_page(template: &str, error: &str) -> String {
    use crate::services::markdown::html_escape;

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Template Error</title>
</head>
<body style="font-family: sans-serif; max-width: 600px; margin: 50px auto;">
    <h1>Template Error</h1>
    <p>Failed to render template: <code>{}</code></p>
    <pre>{}</pre>
</body>
</html>"#,
        html_escape(template),
        html_escape(error)
    )
}

/// Variables every page gets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardTemplateVars {
    pub site_name: String,
    pub site_description: String,
    /// Signed-in user, if any
    pub current_user: Option<CurrentUser>,
    pub request_path: String,
    /// For the footer copyright
    pub year: i32,
}

/// Signed-in user as templates see it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: i64,
    pub name: String,
    pub email: String,
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.author_name(),
            email: user.email.clone(),
        }
    }
}

impl StandardTemplateVars {
    pub fn new(
        site_name: impl Into<String>,
        site_description: impl Into<String>,
        request_path: impl Into<String>,
    ) -> Self {
        Self {
            site_name: site_name.into(),
            site_description: site_description.into(),
            current_user: None,
            request_path: request_path.into(),
            year: chrono::Utc::now().year(),
        }
    }

    pub fn with_user(mut self, user: CurrentUser) -> Self {
        self.current_user = Some(user);
        self
    }

    fn apply(&self, context: &mut TeraContext) {
        context.insert("site_name", &self.site_name);
        context.insert("site_description", &self.site_description);
        context.insert("request_path", &self.request_path);
        context.insert("year", &self.year);
        context.insert("current_user", &self.current_user);
    }
}
