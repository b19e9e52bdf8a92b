//! Target validation helpers shared by the built-in strategies.
//!
//! Runs at config-save time as part of [`crate::strategy::Strategy::check_config`];
//! a target that fails here never reaches execution.

use url::Url;

/// Validate an HTTP/HTTPS URL target
pub fn validate_http_target(target: &str) -> Result<(), String> {
    if target.trim().is_empty() {
        return Err("target URL cannot be empty".into());
    }
    let url = Url::parse(target).map_err(|err| {
        if target.contains("://") {
            format!("invalid URL: {err}")
        } else {
            "URL must include scheme (http:// or https://)".to_string()
        }
    })?;
    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(format!("invalid scheme '{scheme}', must be http or https")),
    }
    if url.host_str().is_none() {
        return Err("URL must have a valid host".into());
    }
    Ok(())
}

/// Validate an HTTP method name
pub fn validate_http_method(method: &str) -> Result<(), String> {
    match method.to_uppercase().as_str() {
        "GET" | "POST" | "PUT" | "DELETE" | "HEAD" | "OPTIONS" | "PATCH" => Ok(()),
        other => Err(format!("unsupported HTTP method: {other}")),
    }
}

/// Validate a hostname for connect-style probes
pub fn validate_host(host: &str) -> Result<(), String> {
    if host.trim().is_empty() {
        return Err("host cannot be empty".into());
    }
    if host.contains(' ') {
        return Err("host cannot contain spaces".into());
    }
    if host.starts_with('-') || host.ends_with('-') {
        return Err("hostname cannot start or end with a hyphen".into());
    }
    if host.chars().all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']')) {
        Ok(())
    } else {
        Err("invalid host, use an IP address or valid hostname".into())
    }
}

/// Validate a port for connect-style probes
pub fn validate_port(port: u16) -> Result<(), String> {
    if port == 0 {
        return Err("port must be between 1 and 65535".into());
    }
    Ok(())
}
