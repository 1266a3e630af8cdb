use crate::sync::FromResource;
use anyhow::{bail, ensure, Context, Result};
use kanali_gateway_core::{
    path, ApiKeyBinding, KeyBinding, Rate, RateUnit, ResourceId, Rule, SubpathRule,
};
use kanali_gateway_k8s_api::{api_key_binding as api, ApiKeyBindingSpec, ResourceExt};
use std::num::NonZeroU32;

impl FromResource<kanali_gateway_k8s_api::ApiKeyBinding> for ApiKeyBinding {
    fn from_resource(binding: kanali_gateway_k8s_api::ApiKeyBinding) -> Result<Self> {
        let namespace = binding.namespace().unwrap_or_default();
        decode(&namespace, &binding.name_unchecked(), binding.spec)
    }
}

pub fn decode(namespace: &str, name: &str, spec: ApiKeyBindingSpec) -> Result<ApiKeyBinding> {
    let keys = spec
        .keys
        .into_iter()
        .map(|key| {
            let name = key.name.clone();
            key_binding(key).with_context(|| format!("invalid key {name}"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ApiKeyBinding {
        id: ResourceId::new(namespace, name),
        keys,
    })
}

fn key_binding(key: api::Key) -> Result<KeyBinding> {
    ensure!(!key.name.is_empty(), "key name must not be empty");
    let subpaths = key
        .subpaths
        .into_iter()
        .map(|sp| {
            Ok(SubpathRule {
                path: path::normalize_prefix(&sp.path),
                rule: rule(sp.rule.unwrap_or_default())?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(KeyBinding {
        key: key.name,
        rate: key.rate.map(rate).transpose()?.flatten(),
        default_rule: rule(key.default_rule.unwrap_or_default())?,
        subpaths,
    })
}

/// A missing or zero amount leaves the key unlimited.
fn rate(rate: api::Rate) -> Result<Option<Rate>> {
    let Some(amount) = rate.amount.and_then(NonZeroU32::new) else {
        return Ok(None);
    };
    let unit = match rate.unit.as_deref() {
        Some(unit) if !unit.is_empty() => unit.parse::<RateUnit>()?,
        _ => bail!("rate unit must be set when an amount is given"),
    };
    Ok(Some(Rate { amount, unit }))
}

fn rule(rule: api::Rule) -> Result<Rule> {
    if rule.global {
        return Ok(Rule::Global);
    }
    let methods = rule
        .granular
        .map(|g| g.verbs)
        .unwrap_or_default()
        .iter()
        .map(|verb| crate::method(verb))
        .collect::<Result<Vec<_>>>()?;
    Ok(Rule::Granular(methods))
}
