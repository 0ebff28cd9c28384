//! Some deployment environments inject secrets (broker credentials, hot-store
//! passwords) directly into the process environment rather than into the
//! config file. This lets a config field be satisfied from either source:
//! a value prefixed with `%` is resolved by reading that environment
//! variable instead of being used literally.

use {
    serde::{Deserialize, Deserializer},
    std::str::FromStr,
    url::{ParseError, Url},
};

const ENV_VAR_PREFIX: char = '%';

/// Returns a deserialization error mentioning that the target environment
/// variable could not be found.
fn invalid_value_env_var_missing<E: serde::de::Error>(var_name: &str) -> E {
    serde::de::Error::invalid_value(
        serde::de::Unexpected::Str(var_name),
        &"expected environment variable to be available",
    )
}

/// Returns a deserialization error mentioning that either the environment
/// variable contents or the field value is not a valid URL.
fn invalid_value_unable_to_parse_url<E: serde::de::Error>(err: ParseError) -> E {
    serde::de::Error::invalid_value(
        serde::de::Unexpected::Other(err.to_string().as_str()),
        &"expected environment variable contents or passed field value to be a valid URL",
    )
}

fn resolve<E: serde::de::Error>(raw: String) -> Result<String, E> {
    match raw.strip_prefix(ENV_VAR_PREFIX) {
        Some(env_var_name) => std::env::var(env_var_name)
            .inspect_err(|err| {
                tracing::error!(%err, %env_var_name, "failed to load env var");
            })
            .map_err(|_| invalid_value_env_var_missing(env_var_name)),
        None => Ok(raw),
    }
}

/// Deserializes an URL from *either* an environment variable — with the format
/// `%<ENV_VAR_NAME>` — or interpreting a String as a URL.
pub fn deserialize_url_from_env<'de, D>(deserializer: D) -> Result<Url, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = resolve::<D::Error>(String::deserialize(deserializer)?)?;
    Url::from_str(&raw).map_err(invalid_value_unable_to_parse_url)
}

/// Deserializes an optional URL from *either* an environment variable — with
/// the format `%<ENV_VAR_NAME>` — or interpreting a String as a URL.
pub fn deserialize_optional_url_from_env<'de, D>(deserializer: D) -> Result<Option<Url>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let raw = resolve::<D::Error>(raw)?;
    Ok(Some(
        Url::from_str(raw.as_str()).map_err(invalid_value_unable_to_parse_url)?,
    ))
}

/// Deserializes a plain secret string (API key, token) from *either* an
/// environment variable or the field's literal value.
pub fn deserialize_string_from_env<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    resolve::<D::Error>(String::deserialize(deserializer)?)
}
