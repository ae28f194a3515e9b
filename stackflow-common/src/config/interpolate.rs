use std::{collections::HashMap, sync::LazyLock};

use regex::{Captures, Regex};

use crate::error::Error;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Replaces every `${NAME}` token in `value` with the matching variable.
/// ---
/// `owner` names the config element being interpolated and only
/// appears in the error raised for an unset variable.
pub fn interpolate(
    value: &str,
    variables: &HashMap<String, String>,
    owner: &str,
) -> Result<String, Error> {
    let mut missing: Option<String> = None;

    let replaced = PLACEHOLDER.replace_all(value, |caps: &Captures| {
        let name = &caps[1];
        match variables.get(name) {
            Some(resolved) => resolved.clone(),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    if let Some(name) = missing {
        return Err(Error::Validation(format!(
            "{} references environment variable '{}', which is not set",
            owner, name
        )));
    }

    Ok(replaced.into_owned())
}

pub fn interpolate_in_place(
    value: &mut String,
    variables: &HashMap<String, String>,
    owner: &str,
) -> Result<(), Error> {
    if value.contains("${") {
        *value = interpolate(value, variables, owner)?;
    }
    Ok(())
}
