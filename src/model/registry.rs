use crate::{
    error::{Result, StemError},
    types::ModelSpec,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Registry {
    pub default: String,
    pub models: Vec<ModelSpec>,
}

const REGISTRY_JSON: &str = include_str!("../../models/registry.json");

pub fn load_registry() -> Result<Registry> {
    Ok(serde_json::from_str(REGISTRY_JSON)?)
}

/// Look up a model by name; an empty name selects the registry default.
pub fn resolve_model(model_name: &str) -> Result<ModelSpec> {
    let reg = load_registry()?;
    let target = if model_name.is_empty() {
        reg.default
    } else {
        model_name.to_string()
    };

    reg.models
        .into_iter()
        .find(|m| m.name == target)
        .ok_or_else(|| StemError::Registry(format!("Model `{target}` not found in registry")))
}

/// `(name, is_default)` for every registered model.
pub fn list_models() -> Result<Vec<(String, bool)>> {
    let reg = load_registry()?;
    Ok(reg
        .models
        .into_iter()
        .map(|m| {
            let is_default = m.name == reg.default;
            (m.name, is_default)
        })
        .collect())
}
