///! Input validation
///! Everything here runs before any remote call is made

use kubetcd_common::etcd::MAX_KEY_LIMIT;
use kubetcd_common::Error;

pub const MAX_NAME_LENGTH: usize = 255;
pub const MAX_DESCRIPTION_LENGTH: usize = 1000;

/// Validation result type
pub type ValidationResult<T> = Result<T, Error>;

/// etcd key: non-empty, no control characters
pub fn validate_key(key: &str) -> ValidationResult<()> {
    if key.is_empty() {
        return Err(Error::Validation("Key cannot be empty".to_string()));
    }

    if key.chars().any(char::is_control) {
        return Err(Error::Validation(
            "Key cannot contain control characters".to_string(),
        ));
    }

    Ok(())
}

/// Key prefix for listings; may be empty, same character rules as keys
pub fn validate_prefix(prefix: &str) -> ValidationResult<()> {
    if prefix.chars().any(char::is_control) {
        return Err(Error::Validation(
            "Prefix cannot contain control characters".to_string(),
        ));
    }

    Ok(())
}

/// etcd value: newlines and tabs allowed, other control characters rejected
pub fn validate_value(value: &str) -> ValidationResult<()> {
    if value
        .chars()
        .any(|c| c.is_control() && c != '\n' && c != '\t')
    {
        return Err(Error::Validation(
            "Value cannot contain control characters other than newline and tab".to_string(),
        ));
    }

    Ok(())
}

pub fn validate_limit(limit: u32) -> ValidationResult<()> {
    if limit == 0 || limit > MAX_KEY_LIMIT {
        return Err(Error::Validation(format!(
            "Limit must be between 1 and {}",
            MAX_KEY_LIMIT
        )));
    }

    Ok(())
}

pub fn validate_cluster_name(name: &str) -> ValidationResult<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation("Cluster name cannot be empty".to_string()));
    }

    if name.len() > MAX_NAME_LENGTH {
        return Err(Error::Validation(format!(
            "Cluster name too long (max {} characters)",
            MAX_NAME_LENGTH
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(Error::Validation(
            "Cluster name cannot contain control characters".to_string(),
        ));
    }

    Ok(())
}

pub fn validate_description(description: &str) -> ValidationResult<()> {
    if description.len() > MAX_DESCRIPTION_LENGTH {
        return Err(Error::Validation(format!(
            "Description too long (max {} characters)",
            MAX_DESCRIPTION_LENGTH
        )));
    }

    Ok(())
}

/// Kubeconfig must be a non-empty YAML mapping
pub fn validate_kubeconfig(kubeconfig: &str) -> ValidationResult<()> {
    if kubeconfig.trim().is_empty() {
        return Err(Error::Validation("Kubeconfig cannot be empty".to_string()));
    }

    let parsed: serde_yaml::Value = serde_yaml::from_str(kubeconfig)
        .map_err(|e| Error::Validation(format!("Invalid kubeconfig format: {}", e)))?;

    if !parsed.is_mapping() {
        return Err(Error::Validation(
            "Invalid kubeconfig format: expected a YAML mapping".to_string(),
        ));
    }

    Ok(())
}
