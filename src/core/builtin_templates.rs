use crate::core::studio::{Template, TemplateError};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct BuiltinTemplateConfig {
    templates: Vec<Template>,
}

pub fn load_builtin_templates() -> Result<Vec<Template>, TemplateError> {
    const CONFIG_CONTENT: &str = include_str!("../builtins/templates.toml");
    let config: BuiltinTemplateConfig = toml::from_str(CONFIG_CONTENT)
        .map_err(|err| TemplateError::Parse(format!("builtins/templates.toml: {err}")))?;
    Ok(config.templates)
}

pub fn find_builtin_template(id: &str) -> Result<Template, TemplateError> {
    load_builtin_templates()?
        .into_iter()
        .find(|template| {
            template
                .id
                .as_deref()
                .is_some_and(|candidate| candidate.eq_ignore_ascii_case(id))
        })
        .ok_or_else(|| TemplateError::UnknownBuiltin(id.to_string()))
}
