use crate::{path, ResourceId};
use http::Method;
use std::{num::NonZeroU32, str::FromStr, time::Duration};

/// A decoded `ApiKeyBinding`: grants a set of API keys access to the proxies in its namespace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiKeyBinding {
    pub id: ResourceId,
    pub keys: Vec<KeyBinding>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyBinding {
    pub key: String,

    /// `None` when the key is unlimited.
    pub rate: Option<Rate>,
    pub default_rule: Rule,
    pub subpaths: Vec<SubpathRule>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rule {
    /// Any method is permitted.
    Global,

    /// Only the listed methods are permitted.
    Granular(Vec<Method>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubpathRule {
    /// Normalized with [`path::normalize_prefix`].
    pub path: String,
    pub rule: Rule,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Rate {
    pub amount: NonZeroU32,
    pub unit: RateUnit,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RateUnit {
    Second,
    Minute,
    Hour,
    Day,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown rate unit: {0}")]
pub struct InvalidRateUnit(String);

// === impl ApiKeyBinding ===

impl ApiKeyBinding {
    pub fn key(&self, name: &str) -> Option<&KeyBinding> {
        self.keys.iter().find(|k| k.key == name)
    }
}

// === impl KeyBinding ===

impl KeyBinding {
    /// Returns the rule governing `subpath`: the longest matching subpath rule, or the default
    /// rule when none match. Equally long matches resolve to the first declared.
    pub fn rule_for(&self, subpath: &str) -> &Rule {
        self.subpaths
            .iter()
            .filter(|sp| path::strip_prefix(subpath, &sp.path).is_some())
            .fold(None::<&SubpathRule>, |best, sp| match best {
                Some(b) if b.path.len() >= sp.path.len() => Some(b),
                _ => Some(sp),
            })
            .map(|sp| &sp.rule)
            .unwrap_or(&self.default_rule)
    }

    pub fn permits(&self, method: &Method, subpath: &str) -> bool {
        self.rule_for(subpath).permits(method)
    }
}

// === impl Rule ===

impl Rule {
    pub fn permits(&self, method: &Method) -> bool {
        match self {
            Self::Global => true,
            Self::Granular(methods) => methods.contains(method),
        }
    }
}

// === impl RateUnit ===

impl RateUnit {
    pub fn window(&self) -> Duration {
        match self {
            Self::Second => Duration::from_secs(1),
            Self::Minute => Duration::from_secs(60),
            Self::Hour => Duration::from_secs(60 * 60),
            Self::Day => Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl FromStr for RateUnit {
    type Err = InvalidRateUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "second" | "seconds" => Ok(Self::Second),
            "minute" | "minutes" => Ok(Self::Minute),
            "hour" | "hours" => Ok(Self::Hour),
            "day" | "days" => Ok(Self::Day),
            _ => Err(InvalidRateUnit(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding() -> KeyBinding {
        KeyBinding {
            key: "key-0".to_string(),
            rate: None,
            default_rule: Rule::Granular(vec![Method::GET]),
            subpaths: vec![SubpathRule {
                path: path::normalize_prefix("/admin"),
                rule: Rule::Global,
            }],
        }
    }

    #[test]
    fn default_rule_lists_methods() {
        let binding = binding();
        assert!(binding.permits(&Method::GET, "/items"));
        assert!(!binding.permits(&Method::DELETE, "/items"));
    }

    #[test]
    fn global_subpath_allows_everything() {
        let binding = binding();
        for method in [Method::GET, Method::DELETE, Method::PATCH] {
            assert!(binding.permits(&method, "/admin/x"), "{method}");
        }
        assert!(
            !binding.permits(&Method::DELETE, "/administrators"),
            "subpaths match whole segments"
        );
    }

    #[test]
    fn longest_subpath_wins() {
        let mut binding = binding();
        binding.subpaths.push(SubpathRule {
            path: path::normalize_prefix("/admin/audit"),
            rule: Rule::Granular(vec![Method::GET]),
        });
        assert!(binding.permits(&Method::DELETE, "/admin/users"));
        assert!(!binding.permits(&Method::DELETE, "/admin/audit/1"));
        assert!(binding.permits(&Method::GET, "/admin/audit/1"));
    }

    #[test]
    fn parses_rate_units() {
        assert_eq!("minute".parse::<RateUnit>().unwrap(), RateUnit::Minute);
        assert_eq!("Hours".parse::<RateUnit>().unwrap(), RateUnit::Hour);
        assert!("fortnight".parse::<RateUnit>().is_err());
        assert_eq!(RateUnit::Day.window(), Duration::from_secs(86_400));
    }
}
