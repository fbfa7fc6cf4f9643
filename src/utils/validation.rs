use url::Url;

use crate::utils::error::{Result, TransitError};

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(TransitError::Validation {
            field: field_name.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(TransitError::Validation {
                field: field_name.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(TransitError::Validation {
            field: field_name.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(TransitError::Validation {
            field: field_name.to_string(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.contains('\0') {
        return Err(TransitError::Validation {
            field: field_name.to_string(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

/// The Bus Tracker API accepts at most 10 comma-delimited stop or vehicle
/// identifiers per request.
pub fn validate_id_list(field_name: &str, ids: &str) -> Result<()> {
    let count = ids.split(',').filter(|s| !s.trim().is_empty()).count();
    if count == 0 {
        return Err(TransitError::Validation {
            field: field_name.to_string(),
            reason: "At least one identifier is required".to_string(),
        });
    }
    if count > 10 {
        return Err(TransitError::Validation {
            field: field_name.to_string(),
            reason: format!("At most 10 identifiers allowed, got {}", count),
        });
    }
    Ok(())
}
